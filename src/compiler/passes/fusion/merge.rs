//! The structural transformation that splices one loop into another.
//!
//! ```text
//!  before                                  after
//!
//!  PP -> PH <-------- PL                   PP -> PH <--------------- PL
//!        |  \         ^                          |  \                 ^
//!        |   PBE .. PPB                          |   PBE .. PPB        |
//!        v                                       |           \         |
//!        PE (= region) -> NP -> NH <-- NL        |            NBE .. NPB
//!                               | \    ^         v
//!                               |  NBE .. NPB    NE
//!                               v
//!                               NE
//! ```
//!
//! The first loop (`prev`) absorbs the second (`next`): its header keeps the
//! exit test, its latch the back edge, and the second body runs right after the
//! first in every iteration. The second loop's header, latch, preheader and the
//! blocks between the loops become unreachable and are removed.

use log::trace;

use crate::{
    analysis::{LoopExit, LoopForest, LoopId, ScalarEvolution, SsaFunction, SsaOp, SsaVarId},
    compiler::passes::fusion::{
        induction::{resolve_induction_variable, ResolvedIv},
        legality::inter_loop_region,
        shape::LoopShape,
    },
    utils::graph::NodeId,
    Result,
};

/// What one merge did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The surviving loop.
    pub fused: LoopId,
    /// The loop that was absorbed and erased.
    pub absorbed: LoopId,
    /// The shared induction variable, if the absorbed loop's one was replaced.
    pub unified_iv: Option<(SsaVarId, SsaVarId)>,
    /// Header phis moved from the absorbed loop.
    pub relocated_phis: Vec<SsaVarId>,
    /// Values whose definitions were hoisted out of the blocks between the loops.
    pub hoisted: Vec<SsaVarId>,
    /// Blocks that became unreachable and were removed.
    pub removed_blocks: Vec<usize>,
}

/// Performs merges on one function and its loop forest.
///
/// The merger trusts that the pair passed every legality check; it only
/// verifies the structural facts it relies on and reports an invariant
/// violation when one does not hold.
pub struct LoopMerger<'a> {
    ssa: &'a mut SsaFunction,
    forest: &'a mut LoopForest,
}

impl<'a> LoopMerger<'a> {
    /// Creates a merger.
    pub fn new(ssa: &'a mut SsaFunction, forest: &'a mut LoopForest) -> Self {
        Self { ssa, forest }
    }

    /// Fuses `next` into `prev`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvariantViolation`] if either loop is erased,
    /// has no supported shape or no induction variable, or if an edge the
    /// merge rewires does not exist. The function must then be considered
    /// corrupt.
    pub fn merge(&mut self, prev: LoopId, next: LoopId) -> Result<MergeOutcome> {
        let prev_shape = LoopShape::resolve(self.ssa, self.forest, prev)
            .ok_or_else(|| invariant_error!("loop {} has no fusible shape", prev))?;
        let next_shape = LoopShape::resolve(self.ssa, self.forest, next)
            .ok_or_else(|| invariant_error!("loop {} has no fusible shape", next))?;
        let (prev_iv, next_iv) = self.induction_variables(prev, next)?;
        let region = inter_loop_region(self.ssa, &prev_shape, &next_shape)
            .ok_or_else(|| invariant_error!("no straight path from {} into {}", prev, next))?;

        let p = *prev_shape.blocks();
        let n = *next_shape.blocks();

        // Code between the loops runs once, ahead of the fused loop.
        let entry = prev_shape.entry_block().index();
        let mut hoisted = Vec::new();
        for block in &region {
            if let Some(b) = self.ssa.block(block.index()) {
                hoisted.extend(b.body().iter().filter_map(SsaOp::dest));
            }
            self.ssa.move_body_before_terminator(block.index(), entry);
        }

        let unified_iv = if prev_iv.same_sequence(&next_iv) {
            self.ssa.replace_uses(next_iv.phi, prev_iv.phi);
            self.ssa
                .remove_phi(n.header.index(), next_iv.phi)
                .ok_or_else(|| invariant_error!("{} is not a phi of {}", next_iv.phi, n.header))?;
            Some((next_iv.phi, prev_iv.phi))
        } else {
            None
        };

        let relocated_phis = self.relocate_phis(
            n.header,
            p.header,
            (n.preheader, p.preheader),
            (n.latch, p.latch),
        )?;

        self.ssa
            .move_body_before_terminator(n.header.index(), p.header.index());
        self.ssa
            .move_body_before_terminator(n.latch.index(), p.latch.index());

        self.redirect(p.header, p.exit, n.exit)?;
        self.redirect(p.pre_latch, p.latch, n.body_entry)?;
        self.redirect(n.pre_latch, n.latch, p.latch)?;
        self.redirect(n.header, n.body_entry, n.latch)?;
        if let Some(guard) = prev_shape.guard() {
            let (Some(prev_skip), Some(next_skip)) = (guard.skip, next_shape.fusion_exit()) else {
                return Err(invariant_error!("guard of {} has no skip target", prev));
            };
            self.redirect(guard.block, prev_skip, next_skip)?;
            if let (Some(next_guard), Some(block)) =
                (next_shape.guard(), self.ssa.block_mut(next_skip.index()))
            {
                for phi in block.phi_nodes_mut() {
                    phi.replace_predecessor(next_guard.block.index(), guard.block.index());
                }
            }
        }

        self.update_membership(prev, next, n.header, n.latch)?;

        let removed_blocks = self.ssa.remove_unreachable_blocks();
        let removed_nodes: Vec<NodeId> =
            removed_blocks.iter().copied().map(NodeId::new).collect();
        self.forest.prune_blocks(&removed_nodes);
        if let Some(info) = self.forest.get_mut(prev) {
            info.exits = vec![LoopExit {
                exiting_block: p.header,
                exit_block: n.exit,
            }];
        }

        Ok(MergeOutcome {
            fused: prev,
            absorbed: next,
            unified_iv,
            relocated_phis,
            hoisted,
            removed_blocks,
        })
    }

    fn induction_variables(
        &self,
        prev: LoopId,
        next: LoopId,
    ) -> Result<(ResolvedIv, ResolvedIv)> {
        let scev = ScalarEvolution::new(self.ssa, self.forest);
        let resolve = |id: LoopId| {
            self.forest
                .get(id)
                .and_then(|info| resolve_induction_variable(self.ssa, &scev, info))
                .ok_or_else(|| {
                    invariant_error!("loop {} reached the merger without an induction variable", id)
                })
        };
        Ok((resolve(prev)?, resolve(next)?))
    }

    /// Moves every phi of header `from` into header `to`. Incoming blocks are
    /// renamed along `preheaders` and `latches`, each an `(old, new)` pair.
    fn relocate_phis(
        &mut self,
        from: NodeId,
        to: NodeId,
        preheaders: (NodeId, NodeId),
        latches: (NodeId, NodeId),
    ) -> Result<Vec<SsaVarId>> {
        let phis = match self.ssa.block_mut(from.index()) {
            Some(block) => std::mem::take(block.phi_nodes_mut()),
            None => return Err(invariant_error!("header {} does not exist", from)),
        };
        let mut relocated = Vec::with_capacity(phis.len());
        for mut phi in phis {
            let entry = phi.replace_predecessor(preheaders.0.index(), preheaders.1.index());
            let back = phi.replace_predecessor(latches.0.index(), latches.1.index());
            if !entry || !back {
                return Err(invariant_error!(
                    "phi {} in {} does not merge preheader and latch",
                    phi.result(),
                    from
                ));
            }
            trace!("relocating {} from {} to {}", phi.result(), from, to);
            relocated.push(phi.result());
            self.ssa
                .block_mut(to.index())
                .ok_or_else(|| invariant_error!("header {} does not exist", to))?
                .add_phi(phi);
        }
        Ok(relocated)
    }

    fn redirect(&mut self, block: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        let redirected = self
            .ssa
            .block_mut(block.index())
            .is_some_and(|b| b.redirect_target(old.index(), new.index()));
        if redirected {
            trace!("{}: {} -> {}", block, old, new);
            Ok(())
        } else {
            Err(invariant_error!("{} has no edge to {}", block, old))
        }
    }

    /// Moves the absorbed loop's body (minus header and latch) and child loops
    /// into the surviving loop, then erases the absorbed loop.
    fn update_membership(
        &mut self,
        prev: LoopId,
        next: LoopId,
        next_header: NodeId,
        next_latch: NodeId,
    ) -> Result<()> {
        let absorbed = self
            .forest
            .get(next)
            .cloned()
            .ok_or_else(|| invariant_error!("loop {} was already erased", next))?;

        for &block in &absorbed.body {
            self.forest.remove_block_from_loop(next, block);
            if block == next_header || block == next_latch {
                continue;
            }
            if !self.forest.add_block_to_loop(prev, block) {
                return Err(invariant_error!("loop {} was already erased", prev));
            }
        }
        for &child in &absorbed.children {
            self.forest.reparent(child, prev);
        }
        self.forest.erase(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{Argument, CmpKind, SsaEvaluator, SsaFunctionBuilder, Value},
        Error,
    };

    /// `for i in 0..n { a[i] = i }; for j in 0..n { s += a[j] }; return s`
    fn store_then_sum() -> SsaFunction {
        SsaFunctionBuilder::new("store_then_sum").build_with(|f| {
            let a = f.param();
            let n = f.param();
            let i_next = f.var();
            let j_next = f.var();
            let s_next = f.var();
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
            f.block(4, |b| b.jump(5));
            let (j, s) = f.block(5, |b| {
                let j = b.phi(&[(4, zero), (7, j_next)]);
                let s = b.phi(&[(4, zero), (7, s_next)]);
                let c = b.cmp(CmpKind::Lt, j, n);
                b.branch(c, 6, 8);
                (j, s)
            });
            f.block(6, |b| {
                let v = b.load(a, j);
                b.add_into(s_next, s, v);
                b.jump(7);
            });
            f.block(7, |b| {
                b.add_into(j_next, j, one);
                b.jump(5);
            });
            f.block(8, |b| b.ret_val(s));
        })
    }

    fn run(ssa: &SsaFunction, n: i64) -> Option<Value> {
        SsaEvaluator::new(ssa)
            .run(&[Argument::Array(vec![0; 8]), Argument::Int(n)])
            .expect("runs")
            .return_value
    }

    #[test]
    fn test_merge_preserves_result() {
        let mut ssa = store_then_sum();
        let mut forest = ssa.analyze_loops();
        let order: Vec<LoopId> = forest.top_level_loops().into_iter().rev().collect();

        let outcome = LoopMerger::new(&mut ssa, &mut forest)
            .merge(order[0], order[1])
            .expect("merge");
        assert_eq!(outcome.fused, order[0]);
        assert!(outcome.unified_iv.is_some());
        assert_eq!(outcome.relocated_phis.len(), 1);
        assert!(outcome.hoisted.is_empty());
        assert_eq!(outcome.removed_blocks, vec![4, 5, 7]);

        ssa.validate().expect("valid");
        assert_eq!(forest.len(), 1);
        let fused = forest.get(order[0]).expect("fused");
        let body: Vec<usize> = fused.body.iter().map(|b| b.index()).collect();
        assert_eq!(body, vec![1, 2, 3, 6]);
        assert_eq!(fused.single_exit().map(|e| e.exit_block), Some(NodeId::new(8)));

        for n in [0, 1, 5, 8] {
            assert_eq!(run(&ssa, n), run(&store_then_sum(), n));
        }
        // the re-detected loop matches the maintained registry
        assert_eq!(ssa.analyze_loops().len(), 1);
    }

    #[test]
    fn test_erased_loop_is_invariant_violation() {
        let mut ssa = store_then_sum();
        let mut forest = ssa.analyze_loops();
        let order: Vec<LoopId> = forest.top_level_loops().into_iter().rev().collect();
        forest.erase(order[1]);

        let result = LoopMerger::new(&mut ssa, &mut forest).merge(order[0], order[1]);
        assert!(matches!(result, Err(Error::InvariantViolation { .. })));
    }
}
