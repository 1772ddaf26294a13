//! Legality checks for fusing two adjacent loops.
//!
//! Four predicates gate every fusion: adjacency, trip-count equivalence,
//! control-flow equivalence and independence. Each is read-only and fails
//! closed. Past those, a pair must also be *mergeable*: both loops guarded the
//! same way, the code between them hoistable, and no value of the first loop
//! used by the second.

use std::{collections::HashSet, fmt};

use log::trace;

use crate::{
    analysis::{
        AnalysisManager, DefSite, Direction, LoopForest, LoopId, LoopInfo, ScalarEvolution,
        SsaFunction, SsaOp, SsaVarId,
    },
    compiler::{
        config::FusionConfig,
        passes::fusion::{
            induction::resolve_induction_variable,
            shape::{GuardBranch, LoopShape},
        },
    },
    utils::graph::NodeId,
};

/// Outcome of checking one loop pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FusionVerdict {
    /// All checks passed.
    Fusible,
    /// A loop does not have a shape the merger supports.
    UnsupportedShape,
    /// A loop has no resolvable induction variable.
    NoInductionVariable,
    /// Control does not fall from the first loop directly into the second.
    NotAdjacent,
    /// The trip counts are unknown or not provably equal.
    TripCountMismatch,
    /// One loop can run without the other.
    NotControlFlowEquivalent,
    /// A memory dependence would be reversed, or could not be ruled out.
    Dependent,
    /// The loops are not guarded by equivalent branches.
    GuardMismatch,
    /// The code between the loops cannot be hoisted in front of the first one.
    RegionNotHoistable,
    /// The second loop reads a value computed inside the first.
    ScalarDependence,
}

impl FusionVerdict {
    /// Returns `true` for [`FusionVerdict::Fusible`].
    #[must_use]
    pub fn is_fusible(self) -> bool {
        self == FusionVerdict::Fusible
    }
}

impl fmt::Display for FusionVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FusionVerdict::Fusible => "fusible",
            FusionVerdict::UnsupportedShape => "unsupported loop shape",
            FusionVerdict::NoInductionVariable => "no induction variable",
            FusionVerdict::NotAdjacent => "loops are not adjacent",
            FusionVerdict::TripCountMismatch => "trip counts not provably equal",
            FusionVerdict::NotControlFlowEquivalent => "loops are not control-flow equivalent",
            FusionVerdict::Dependent => "memory dependence between loops",
            FusionVerdict::GuardMismatch => "loop guards differ",
            FusionVerdict::RegionNotHoistable => "code between loops cannot be hoisted",
            FusionVerdict::ScalarDependence => "second loop uses a value of the first",
        };
        f.write_str(text)
    }
}

/// Returns the blocks between the first loop's exit and the second loop's
/// header, in execution order.
///
/// The walk follows single successors from the exit, then the second loop's
/// guard and preheader. Returns `None` if that path branches or cycles.
#[must_use]
pub fn inter_loop_region(
    ssa: &SsaFunction,
    prev: &LoopShape,
    next: &LoopShape,
) -> Option<Vec<NodeId>> {
    let next_blocks = next.blocks();
    let next_guard = next.guard().map(|g| g.block);

    let mut region = Vec::new();
    let mut current = prev.blocks().exit;
    while current != next_blocks.header {
        if region.contains(&current) {
            return None;
        }
        region.push(current);
        current = if current == next_blocks.preheader {
            next_blocks.header
        } else if Some(current) == next_guard {
            next_blocks.preheader
        } else {
            match ssa.block(current.index())?.successors().as_slice() {
                [single] => NodeId::new(*single),
                _ => return None,
            }
        };
    }
    Some(region)
}

/// Read-only legality checks over one function.
pub struct LegalityChecker<'a> {
    ssa: &'a SsaFunction,
    forest: &'a LoopForest,
    analyses: &'a AnalysisManager,
    config: &'a FusionConfig,
}

impl<'a> LegalityChecker<'a> {
    /// Creates a checker answering from `analyses`.
    #[must_use]
    pub fn new(
        ssa: &'a SsaFunction,
        forest: &'a LoopForest,
        analyses: &'a AnalysisManager,
        config: &'a FusionConfig,
    ) -> Self {
        Self {
            ssa,
            forest,
            analyses,
            config,
        }
    }

    /// Runs every check on the pair `(prev, next)`, cheapest first, stopping at
    /// the first failure.
    #[must_use]
    pub fn check(&self, prev: LoopId, next: LoopId) -> FusionVerdict {
        let (Some(prev_shape), Some(next_shape)) = (
            LoopShape::resolve(self.ssa, self.forest, prev),
            LoopShape::resolve(self.ssa, self.forest, next),
        ) else {
            return FusionVerdict::UnsupportedShape;
        };
        let (Some(prev_info), Some(next_info)) = (self.forest.get(prev), self.forest.get(next))
        else {
            return FusionVerdict::UnsupportedShape;
        };

        let scev = ScalarEvolution::new(self.ssa, self.forest);
        if resolve_induction_variable(self.ssa, &scev, prev_info).is_none()
            || resolve_induction_variable(self.ssa, &scev, next_info).is_none()
        {
            return FusionVerdict::NoInductionVariable;
        }

        if !self.adjacent(&prev_shape, &next_shape) {
            return FusionVerdict::NotAdjacent;
        }
        if !self.trip_counts_equivalent(prev, next) {
            return FusionVerdict::TripCountMismatch;
        }
        if !self.control_flow_equivalent(&prev_shape, &next_shape) {
            return FusionVerdict::NotControlFlowEquivalent;
        }
        if !self.independent(prev_info, next_info) {
            return FusionVerdict::Dependent;
        }

        if !self.guards_match(&prev_shape, &next_shape) {
            return FusionVerdict::GuardMismatch;
        }
        if !self.region_hoistable(&prev_shape, &next_shape) {
            return FusionVerdict::RegionNotHoistable;
        }
        if self.uses_values_of(next_info, prev_info) {
            return FusionVerdict::ScalarDependence;
        }

        FusionVerdict::Fusible
    }

    /// Returns `true` if control leaves `prev` straight into `next`'s entry.
    ///
    /// A guarded loop whose skip target is undetermined is never adjacent.
    #[must_use]
    pub fn adjacent(&self, prev: &LoopShape, next: &LoopShape) -> bool {
        let exit = prev.fusion_exit();
        let entry = next.entry_block();
        trace!("adjacency: exit {:?}, entry {}", exit, entry);
        exit == Some(entry)
    }

    /// Returns `true` if `prev`'s entry dominates `next`'s entry and `next`'s
    /// entry post-dominates `prev`'s.
    #[must_use]
    pub fn control_flow_equivalent(&self, prev: &LoopShape, next: &LoopShape) -> bool {
        let (a, b) = (prev.entry_block(), next.entry_block());
        let dominates = self.analyses.dominates(self.ssa, a, b);
        let post_dominates = self.analyses.post_dominates(self.ssa, b, a);
        trace!(
            "control-flow equivalence {} / {}: dom {}, postdom {}",
            a,
            b,
            dominates,
            post_dominates
        );
        dominates && post_dominates
    }

    /// Returns `true` if both trip counts are known and provably equal.
    #[must_use]
    pub fn trip_counts_equivalent(&self, prev: LoopId, next: LoopId) -> bool {
        let prev_count = self.analyses.trip_count(self.ssa, self.forest, prev);
        let next_count = self.analyses.trip_count(self.ssa, self.forest, next);
        trace!("trip counts {}: {}, {}: {}", prev, prev_count, next, next_count);
        prev_count.provably_equal(&next_count)
    }

    /// Returns `true` if no access pair spanning the loops, with at least one
    /// write, has a dependence other than a same-iteration one.
    ///
    /// Pairs beyond the configured budget count as dependent.
    #[must_use]
    pub fn independent(&self, prev: &LoopInfo, next: &LoopInfo) -> bool {
        let prev_accesses = self.analyses.accesses(self.ssa, self.forest, prev);
        let next_accesses = self.analyses.accesses(self.ssa, self.forest, next);

        let next_writes = next_accesses.iter().filter(|a| a.is_write()).count();
        let pairs: usize = prev_accesses
            .iter()
            .map(|a| if a.is_write() { next_accesses.len() } else { next_writes })
            .sum();
        if pairs > self.config.max_dependence_pairs {
            trace!(
                "independence: {} access pairs exceed the budget of {}",
                pairs,
                self.config.max_dependence_pairs
            );
            return false;
        }

        for src in &prev_accesses {
            for dst in &next_accesses {
                let Some(dependence) =
                    self.analyses
                        .dependence(self.ssa, self.forest, (src, prev), (dst, next))
                else {
                    continue;
                };
                trace!(
                    "dependence {} -> {}: {:?} {:?} distance {:?}",
                    src.site,
                    dst.site,
                    dependence.kind,
                    dependence.direction,
                    dependence.distance
                );
                if dependence.direction != Direction::Equal {
                    return false;
                }
            }
        }
        true
    }

    /// Returns `true` if both loops are unguarded, or both are guarded by
    /// branches on equivalent conditions with the same polarity.
    #[must_use]
    pub fn guards_match(&self, prev: &LoopShape, next: &LoopShape) -> bool {
        match (prev.guard(), next.guard()) {
            (None, None) => true,
            (Some(a), Some(b)) => self.equivalent_guards(a, b),
            _ => false,
        }
    }

    fn equivalent_guards(&self, a: GuardBranch, b: GuardBranch) -> bool {
        let (Some((cond_a, enter_a)), Some((cond_b, enter_b))) =
            (a.condition(self.ssa), b.condition(self.ssa))
        else {
            return false;
        };
        if enter_a != enter_b {
            return false;
        }
        if cond_a == cond_b {
            return true;
        }

        let (
            Some(SsaOp::Cmp {
                kind: kind_a,
                left: left_a,
                right: right_a,
                ..
            }),
            Some(SsaOp::Cmp {
                kind: kind_b,
                left: left_b,
                right: right_b,
                ..
            }),
        ) = (self.ssa.defining_op(cond_a), self.ssa.defining_op(cond_b))
        else {
            return false;
        };

        let scev = ScalarEvolution::new(self.ssa, self.forest);
        let same = |x: SsaVarId, y: SsaVarId| scev.affine(x) == scev.affine(y);
        (kind_a == kind_b && same(*left_a, *left_b) && same(*right_a, *right_b))
            || (*kind_a == kind_b.swapped() && same(*left_a, *right_b) && same(*right_a, *left_b))
    }

    /// Returns `true` if the blocks between the loops hold no phis and only
    /// pure instructions whose operands are available in `prev`'s entry block.
    #[must_use]
    pub fn region_hoistable(&self, prev: &LoopShape, next: &LoopShape) -> bool {
        let Some(region) = inter_loop_region(self.ssa, prev, next) else {
            return false;
        };
        let entry = prev.entry_block();

        let mut hoisted: HashSet<SsaVarId> = HashSet::new();
        for block_id in region {
            let Some(block) = self.ssa.block(block_id.index()) else {
                return false;
            };
            if !block.phi_nodes().is_empty() {
                return false;
            }
            for op in block.body() {
                if !op.is_pure() {
                    trace!("region block {} holds impure {}", block_id, op);
                    return false;
                }
                if !op.uses().into_iter().all(|v| self.available_at(v, entry, &hoisted)) {
                    trace!("region block {}: operand of {} unavailable", block_id, op);
                    return false;
                }
                hoisted.extend(op.dest());
            }
        }
        true
    }

    fn available_at(&self, var: SsaVarId, entry: NodeId, hoisted: &HashSet<SsaVarId>) -> bool {
        if hoisted.contains(&var) {
            return true;
        }
        match self.ssa.definition(var) {
            Some(DefSite::Param(_)) => true,
            Some(site) => site
                .block()
                .is_some_and(|b| self.analyses.dominates(self.ssa, NodeId::new(b), entry)),
            None => false,
        }
    }

    /// Returns `true` if any block of `user` reads a value defined in `producer`.
    #[must_use]
    pub fn uses_values_of(&self, user: &LoopInfo, producer: &LoopInfo) -> bool {
        let defined_in_producer = |var: SsaVarId| {
            self.ssa
                .definition(var)
                .and_then(DefSite::block)
                .is_some_and(|b| producer.contains(NodeId::new(b)))
        };

        user.body.iter().any(|&block_id| {
            self.ssa.block(block_id.index()).is_some_and(|block| {
                block
                    .phi_nodes()
                    .iter()
                    .flat_map(|phi| phi.used_variables())
                    .chain(block.instructions().iter().flat_map(SsaOp::uses))
                    .any(&defined_in_producer)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CmpKind, SsaFunctionBuilder};

    /// `for i in 0..n { a[i] = i }` followed by `for j in 0..m { b[j + off] = a[j] }`.
    ///
    /// Block layout: B0 preheader, B1-B3 first loop, B4 exit/preheader, B5-B7
    /// second loop, B8 exit.
    fn sequential(same_bound: bool, second_array: bool, offset: i64) -> SsaFunction {
        SsaFunctionBuilder::new("sequential").build_with(|f| {
            let a = f.param();
            let b_arr = f.param();
            let n = f.param();
            let m = f.param();
            let i_next = f.var();
            let j_next = f.var();
            let (zero, one) = f.block(0, |b| {
                let consts = (b.const_i64(0), b.const_i64(1));
                b.jump(1);
                consts
            });
            let i = f.block(1, |b| {
                let i = b.phi(&[(0, zero), (3, i_next)]);
                let c = b.cmp(CmpKind::Lt, i, n);
                b.branch(c, 2, 4);
                i
            });
            f.block(2, |b| {
                b.store(a, i, i);
                b.jump(3);
            });
            f.block(3, |b| {
                b.add_into(i_next, i, one);
                b.jump(1);
            });
            let shift = f.block(4, |b| {
                let shift = b.const_i64(offset);
                b.jump(5);
                shift
            });
            let j = f.block(5, |b| {
                let j = b.phi(&[(4, zero), (7, j_next)]);
                let c = b.cmp(CmpKind::Lt, j, if same_bound { n } else { m });
                b.branch(c, 6, 8);
                j
            });
            f.block(6, |b| {
                let v = b.load(a, j);
                let k = b.add(j, shift);
                b.store(if second_array { b_arr } else { a }, k, v);
                b.jump(7);
            });
            f.block(7, |b| {
                b.add_into(j_next, j, one);
                b.jump(5);
            });
            f.block(8, |b| b.ret());
        })
    }

    fn verdict(ssa: &SsaFunction) -> FusionVerdict {
        let forest = ssa.analyze_loops();
        let order: Vec<LoopId> = forest.top_level_loops().into_iter().rev().collect();
        let analyses = AnalysisManager::new();
        let config = FusionConfig::default();
        LegalityChecker::new(ssa, &forest, &analyses, &config).check(order[0], order[1])
    }

    #[test]
    fn test_fusible_pair() {
        assert_eq!(verdict(&sequential(true, true, 0)), FusionVerdict::Fusible);
    }

    #[test]
    fn test_trip_count_mismatch() {
        assert_eq!(
            verdict(&sequential(false, true, 0)),
            FusionVerdict::TripCountMismatch
        );
    }

    #[test]
    fn test_cross_iteration_dependence() {
        // the second loop overwrites a[j + 1] after reading a[j]: the first
        // loop's store to a[i] meets it at distance -1
        assert_eq!(
            verdict(&sequential(true, false, 1)),
            FusionVerdict::Dependent
        );
    }

    #[test]
    fn test_same_iteration_dependence_allowed() {
        assert_eq!(verdict(&sequential(true, false, 0)), FusionVerdict::Fusible);
    }

    #[test]
    fn test_dependence_budget_fails_closed() {
        let ssa = sequential(true, true, 0);
        let forest = ssa.analyze_loops();
        let order: Vec<LoopId> = forest.top_level_loops().into_iter().rev().collect();
        let analyses = AnalysisManager::new();
        let config = FusionConfig {
            max_dependence_pairs: 1,
            ..FusionConfig::default()
        };
        assert_eq!(
            LegalityChecker::new(&ssa, &forest, &analyses, &config).check(order[0], order[1]),
            FusionVerdict::Dependent
        );
    }

    #[test]
    fn test_inter_loop_region() {
        let ssa = sequential(true, true, 0);
        let forest = ssa.analyze_loops();
        let order: Vec<LoopId> = forest.top_level_loops().into_iter().rev().collect();
        let prev = LoopShape::resolve(&ssa, &forest, order[0]).expect("shape");
        let next = LoopShape::resolve(&ssa, &forest, order[1]).expect("shape");

        assert_eq!(
            inter_loop_region(&ssa, &prev, &next),
            Some(vec![NodeId::new(4)])
        );
        // the reverse direction never reaches the other header
        assert_eq!(inter_loop_region(&ssa, &next, &prev), None);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(FusionVerdict::NotAdjacent.to_string(), "loops are not adjacent");
        assert!(FusionVerdict::Fusible.is_fusible());
        assert!(!FusionVerdict::Dependent.is_fusible());
    }
}
