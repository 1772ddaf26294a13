//! Loop fusion pass.
//!
//! Merges textually adjacent loops that run the same number of times into one
//! loop, so both bodies execute in a single pass over the iteration space.
//!
//! # Motivation
//!
//! Producer/consumer loops over the same range are common after inlining and
//! unrolling cleanups:
//!
//! ```text
//! for i in 0..n { a[i] = f(i) }          for i in 0..n {
//! for j in 0..n { b[j] = a[j] + 1 }  =>      a[i] = f(i)
//!                                            b[i] = a[i] + 1
//!                                        }
//! ```
//!
//! The fused loop pays the loop overhead once, and `a[i]` is consumed while
//! still hot.
//!
//! # Algorithm
//!
//! The top-level loops are walked in program order with a single candidate
//! cursor. For each next loop:
//!
//! 1. The pair `(candidate, next)` is checked by [`LegalityChecker`]:
//!    adjacency, trip-count equivalence, control-flow equivalence,
//!    independence, then the structural preconditions of the merge.
//! 2. If every check passes, [`LoopMerger`] splices `next` into the candidate,
//!    which stays the candidate for the loop after.
//! 3. Otherwise `next` becomes the candidate and the old one is final.
//!
//! Every cached analysis is dropped after each merge. The pass reports
//! [`PreservedAnalyses::None`] if any merge happened.

mod induction;
mod legality;
mod merge;
mod shape;

pub use induction::{resolve_induction_variable, ResolvedIv};
pub use legality::{inter_loop_region, FusionVerdict, LegalityChecker};
pub use merge::{LoopMerger, MergeOutcome};
pub use shape::{GuardBranch, LoopBlocks, LoopShape};

use log::debug;

use crate::{
    analysis::{AnalysisManager, LoopId, SsaFunction},
    compiler::{
        config::FusionConfig, CompilerContext, EventKind, EventLog, PreservedAnalyses, SsaPass,
    },
    Result,
};

/// Loop fusion pass.
///
/// Fuses pairs of adjacent top-level loops with equal trip counts whose
/// memory accesses only meet within the same iteration.
///
/// # Example
///
/// ```rust,ignore
/// use loopfuse::compiler::{FusionConfig, LoopFusionPass};
///
/// let pass = LoopFusionPass::new();
/// let preserved = pass.run_function(&mut ssa, &FusionConfig::default(), &events)?;
/// ```
pub struct LoopFusionPass;

impl Default for LoopFusionPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopFusionPass {
    /// Creates a new loop fusion pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Fuses the loops of one function.
    ///
    /// Events for every fusion and every rejected pair are recorded into
    /// `events`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvariantViolation`] if a merge found the
    /// function in a state the legality checks ruled out, and
    /// [`crate::Error::Malformed`] if `config.verify_after_merge` is set and a
    /// merge produced an invalid function.
    pub fn run_function(
        &self,
        ssa: &mut SsaFunction,
        config: &FusionConfig,
        events: &EventLog,
    ) -> Result<PreservedAnalyses> {
        let name = ssa.name().to_string();
        let mut forest = ssa.analyze_loops();
        let mut analyses = AnalysisManager::new();

        let mut candidate: Option<LoopId> = None;
        let mut fused = 0usize;

        for next in forest.top_level_loops().into_iter().rev() {
            let Some(prev) = candidate else {
                candidate = Some(next);
                continue;
            };
            let location = forest.get(prev).map_or(0, |info| info.header.index());

            let verdict = LegalityChecker::new(ssa, &forest, &analyses, config).check(prev, next);
            if !verdict.is_fusible() {
                debug!("{}: not fusing {} with {}: {}", name, prev, next, verdict);
                events
                    .record(EventKind::FusionRejected)
                    .function(&name)
                    .location(location)
                    .message(format!("{prev} + {next}: {verdict}"))
                    .pass(self.name());
                candidate = Some(next);
                continue;
            }

            let outcome = LoopMerger::new(ssa, &mut forest).merge(prev, next)?;
            analyses.invalidate();
            if config.verify_after_merge {
                ssa.validate()?;
            }

            debug!(
                "{}: fused {} into {} ({} blocks removed)",
                name,
                next,
                prev,
                outcome.removed_blocks.len()
            );
            self.record_merge(events, &name, location, &outcome);
            fused += 1;
            candidate = Some(prev);
        }

        Ok(PreservedAnalyses::from(fused > 0))
    }

    fn record_merge(&self, events: &EventLog, name: &str, location: usize, outcome: &MergeOutcome) {
        let record = |kind: EventKind, location: usize, message: String| {
            events
                .record(kind)
                .function(name)
                .location(location)
                .message(message)
                .pass(self.name());
        };

        record(
            EventKind::LoopsFused,
            location,
            format!("{} absorbed {}", outcome.fused, outcome.absorbed),
        );
        if let Some((old, new)) = outcome.unified_iv {
            record(
                EventKind::InductionVariableUnified,
                location,
                format!("{old} replaced by {new}"),
            );
        }
        for phi in &outcome.relocated_phis {
            record(
                EventKind::PhiRelocated,
                location,
                format!("{phi} moved into B{location}"),
            );
        }
        for value in &outcome.hoisted {
            record(
                EventKind::InstructionHoisted,
                location,
                format!("{value} hoisted ahead of {}", outcome.fused),
            );
        }
        for &block in &outcome.removed_blocks {
            record(EventKind::BlockRemoved, block, format!("B{block} unreachable"));
        }
    }
}

impl SsaPass for LoopFusionPass {
    fn name(&self) -> &'static str {
        "loop-fusion"
    }

    fn description(&self) -> &'static str {
        "Fuses adjacent loops with equal trip counts and no reversed dependences"
    }

    fn should_run(&self, ssa: &SsaFunction, _ctx: &CompilerContext) -> bool {
        ssa.block_count() > 1
    }

    fn run_on_function(&self, ssa: &mut SsaFunction, ctx: &CompilerContext) -> Result<bool> {
        let changes = EventLog::new();
        let result = self.run_function(ssa, &ctx.config.fusion, &changes);
        ctx.events.merge(&changes);
        Ok(result?.changed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Argument, CmpKind, SsaEvaluator, SsaFunctionBuilder};

    /// `count` loops over `0..n`, loop `k` storing `k` into `a[i]`... each into
    /// its own array parameter.
    fn chain(count: usize) -> SsaFunction {
        SsaFunctionBuilder::new("chain").build_with(|f| {
            let arrays: Vec<_> = (0..count).map(|_| f.param()).collect();
            let n = f.param();
            let (zero, one) = f.block(0, |b| {
                let consts = (b.const_i64(0), b.const_i64(1));
                b.jump(1);
                consts
            });
            for (k, &array) in arrays.iter().enumerate() {
                // header 4k+1, body 4k+2, latch 4k+3, exit/next preheader 4k+4
                let base = 4 * k;
                let next = f.var();
                let i = f.block(base + 1, |b| {
                    let i = b.phi(&[(base, zero), (base + 3, next)]);
                    let c = b.cmp(CmpKind::Lt, i, n);
                    b.branch(c, base + 2, base + 4);
                    i
                });
                f.block(base + 2, |b| {
                    b.store(array, i, i);
                    b.jump(base + 3);
                });
                f.block(base + 3, |b| {
                    b.add_into(next, i, one);
                    b.jump(base + 1);
                });
                if k + 1 < count {
                    f.block(base + 4, |b| b.jump(base + 5));
                }
            }
            f.block(4 * count, |b| b.ret());
        })
    }

    #[test]
    fn test_fuses_chain() {
        let mut ssa = chain(3);
        let events = EventLog::new();
        let preserved = LoopFusionPass::new()
            .run_function(&mut ssa, &FusionConfig::default(), &events)
            .expect("pass");

        assert_eq!(preserved, PreservedAnalyses::None);
        assert_eq!(events.count_kind(EventKind::LoopsFused), 2);
        assert_eq!(events.count_kind(EventKind::InductionVariableUnified), 2);
        assert_eq!(ssa.analyze_loops().len(), 1);
        ssa.validate().expect("valid");

        let args = [
            Argument::Array(vec![0; 4]),
            Argument::Array(vec![0; 4]),
            Argument::Array(vec![0; 4]),
            Argument::Int(4),
        ];
        let result = SsaEvaluator::new(&ssa).run(&args).expect("runs");
        let expected = SsaEvaluator::new(&chain(3)).run(&args).expect("runs");
        assert_eq!(result.memory, expected.memory);
    }

    #[test]
    fn test_second_run_is_stable() {
        let mut ssa = chain(2);
        let pass = LoopFusionPass::new();
        let config = FusionConfig::default();

        let first = pass.run_function(&mut ssa, &config, &EventLog::new());
        assert_eq!(first.expect("pass"), PreservedAnalyses::None);
        let second = pass.run_function(&mut ssa, &config, &EventLog::new());
        assert_eq!(second.expect("pass"), PreservedAnalyses::All);
    }

    #[test]
    fn test_single_loop_untouched() {
        let mut ssa = chain(1);
        let before = ssa.clone();
        let events = EventLog::new();
        let preserved = LoopFusionPass::new()
            .run_function(&mut ssa, &FusionConfig::default(), &events)
            .expect("pass");

        assert_eq!(preserved, PreservedAnalyses::All);
        assert!(events.is_empty());
        assert_eq!(ssa.blocks(), before.blocks());
    }
}
