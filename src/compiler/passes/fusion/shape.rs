//! Loop shapes the fusion pass can reason about.
//!
//! A loop from the [`LoopForest`] is resolved once into a [`LoopShape`], which
//! names every block the legality checks and the merger touch. Loops that do not
//! fit one of the shapes below are never fused.
//!
//! ```text
//!   [guard] ------------+        (Guarded only)
//!      |                |
//!   [preheader]         |
//!      |                |
//!   [header] <-----+    |        exits from the header only
//!      |   \       |    |
//!      |  [body_entry]  |
//!      |     ...   |    |
//!      |  [pre_latch]   |
//!      |     |     |    |
//!      |  [latch] -+    |
//!      v                |
//!   [exit] <------------+ (or the exit's successor)
//! ```

use std::collections::BTreeSet;

use crate::{
    analysis::{LoopForest, LoopId, SsaFunction, SsaOp, SsaVarId},
    utils::graph::NodeId,
};

/// The blocks of a loop in fusible shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBlocks {
    /// The loop in the registry.
    pub id: LoopId,
    /// Loop header; the only exiting block.
    pub header: NodeId,
    /// Single out-of-loop predecessor of the header.
    pub preheader: NodeId,
    /// Single back edge source.
    pub latch: NodeId,
    /// Single predecessor of the latch.
    pub pre_latch: NodeId,
    /// In-loop successor of the header.
    pub body_entry: NodeId,
    /// Out-of-loop successor of the header.
    pub exit: NodeId,
}

/// A conditional branch outside a loop that can skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardBranch {
    /// Block ending in the guard branch.
    pub block: NodeId,
    /// Target taken when the loop is skipped, or `None` if the block does not
    /// end in a two-way branch into the preheader.
    pub skip: Option<NodeId>,
}

impl GuardBranch {
    /// Reads the guard branch of `block` for a loop entered through `preheader`.
    #[must_use]
    pub fn resolve(ssa: &SsaFunction, block: NodeId, preheader: NodeId) -> Self {
        let skip = match ssa.block(block.index()).and_then(|b| b.terminator()) {
            Some(SsaOp::Branch {
                true_target,
                false_target,
                ..
            }) if true_target != false_target => {
                if *true_target == preheader.index() {
                    Some(NodeId::new(*false_target))
                } else if *false_target == preheader.index() {
                    Some(NodeId::new(*true_target))
                } else {
                    None
                }
            }
            _ => None,
        };
        Self { block, skip }
    }

    /// Returns the branch condition and whether the loop is entered when it
    /// holds.
    #[must_use]
    pub fn condition(&self, ssa: &SsaFunction) -> Option<(SsaVarId, bool)> {
        let skip = self.skip?;
        match ssa.block(self.block.index())?.terminator()? {
            SsaOp::Branch {
                condition,
                false_target,
                ..
            } => Some((*condition, *false_target == skip.index())),
            _ => None,
        }
    }
}

/// A loop resolved into one of the shapes fusion supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopShape {
    /// A loop entered directly through its preheader.
    Unguarded(LoopBlocks),
    /// A loop whose preheader is only reached through a guard branch.
    Guarded {
        /// The loop's blocks.
        blocks: LoopBlocks,
        /// The guard in front of the preheader.
        guard: GuardBranch,
    },
}

impl LoopShape {
    /// Resolves loop `id`, or returns `None` if it has an unsupported shape.
    ///
    /// A loop resolves when it has a preheader, a single latch that only jumps
    /// back to the header, a single exit edge leaving from the header, and a
    /// body of at least one block between header and latch. The exit block
    /// must have no phis and be entered only from the header (and the guard).
    /// Header and latch may only hold pure instructions besides their
    /// terminators, and neither the latch nor the body entry may hold phis.
    #[must_use]
    pub fn resolve(ssa: &SsaFunction, forest: &LoopForest, id: LoopId) -> Option<Self> {
        let info = forest.get(id)?;
        let header = info.header;
        let preheader = info.preheader?;
        let latch = info.single_latch()?;

        let latch_block = ssa.block(latch.index())?;
        if latch_block.successors() != [header.index()] || !latch_block.phi_nodes().is_empty() {
            return None;
        }

        let exit_edge = info.single_exit()?;
        if exit_edge.exiting_block != header {
            return None;
        }
        let exit = exit_edge.exit_block;

        let header_block = ssa.block(header.index())?;
        let body_entry = match header_block.successors().as_slice() {
            [a, b] if *a == exit.index() && *b != exit.index() => NodeId::new(*b),
            [a, b] if *b == exit.index() && *a != exit.index() => NodeId::new(*a),
            _ => return None,
        };
        if body_entry == latch || !info.contains(body_entry) {
            return None;
        }
        if !ssa.block(body_entry.index())?.phi_nodes().is_empty() {
            return None;
        }

        let pre_latch = match ssa.predecessors(latch.index()).as_slice() {
            [single] if *single != header.index() => NodeId::new(*single),
            _ => return None,
        };

        let guard = info
            .guard
            .map(|block| GuardBranch::resolve(ssa, block, preheader));

        let exit_block = ssa.block(exit.index())?;
        if !exit_block.phi_nodes().is_empty() {
            return None;
        }
        let exit_preds: BTreeSet<usize> = ssa.predecessors(exit.index()).into_iter().collect();
        let allowed_pred =
            |pred: usize| pred == header.index() || guard.is_some_and(|g| g.block.index() == pred);
        if !exit_preds.contains(&header.index()) || !exit_preds.iter().all(|&p| allowed_pred(p)) {
            return None;
        }

        if !header_block.body().iter().all(SsaOp::is_pure)
            || !latch_block.body().iter().all(SsaOp::is_pure)
        {
            return None;
        }

        let blocks = LoopBlocks {
            id,
            header,
            preheader,
            latch,
            pre_latch,
            body_entry,
            exit,
        };
        Some(match guard {
            Some(guard) => LoopShape::Guarded { blocks, guard },
            None => LoopShape::Unguarded(blocks),
        })
    }

    /// Returns the loop's blocks.
    #[must_use]
    pub fn blocks(&self) -> &LoopBlocks {
        match self {
            LoopShape::Unguarded(blocks) | LoopShape::Guarded { blocks, .. } => blocks,
        }
    }

    /// Returns the loop id.
    #[must_use]
    pub fn id(&self) -> LoopId {
        self.blocks().id
    }

    /// Returns the guard branch, if any.
    #[must_use]
    pub fn guard(&self) -> Option<GuardBranch> {
        match self {
            LoopShape::Unguarded(_) => None,
            LoopShape::Guarded { guard, .. } => Some(*guard),
        }
    }

    /// Returns the first block executed on the way into the loop: the guard
    /// block if guarded, else the preheader.
    #[must_use]
    pub fn entry_block(&self) -> NodeId {
        match self {
            LoopShape::Unguarded(blocks) => blocks.preheader,
            LoopShape::Guarded { guard, .. } => guard.block,
        }
    }

    /// Returns the block control reaches once the loop (and its guard) is
    /// done, or `None` if a guarded loop's skip target is undetermined.
    #[must_use]
    pub fn fusion_exit(&self) -> Option<NodeId> {
        match self {
            LoopShape::Unguarded(blocks) => Some(blocks.exit),
            LoopShape::Guarded { guard, .. } => guard.skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CmpKind, SsaFunctionBuilder};

    /// `if n > 0 { for i in 0..n { a[i] = i } }` with the guard skipping to the
    /// loop exit.
    fn guarded() -> SsaFunction {
        SsaFunctionBuilder::new("guarded").build_with(|f| {
            let a = f.param();
            let n = f.param();
            let next = f.var();
            let (zero, one) = f.block(0, |b| {
                let zero = b.const_i64(0);
                let one = b.const_i64(1);
                let c = b.cmp(CmpKind::Gt, n, zero);
                b.branch(c, 1, 5);
                (zero, one)
            });
            f.block(1, |b| b.jump(2));
            let i = f.block(2, |b| {
                let i = b.phi(&[(1, zero), (4, next)]);
                let c = b.cmp(CmpKind::Lt, i, n);
                b.branch(c, 3, 5);
                i
            });
            f.block(3, |b| {
                b.store(a, i, i);
                b.jump(4);
            });
            f.block(4, |b| {
                b.add_into(next, i, one);
                b.jump(2);
            });
            f.block(5, |b| b.ret());
        })
    }

    #[test]
    fn test_guarded_shape() {
        let ssa = guarded();
        let forest = ssa.analyze_loops();
        let id = forest.top_level_loops()[0];

        let shape = LoopShape::resolve(&ssa, &forest, id).expect("resolves");
        let blocks = shape.blocks();
        assert_eq!(blocks.header, NodeId::new(2));
        assert_eq!(blocks.preheader, NodeId::new(1));
        assert_eq!(blocks.body_entry, NodeId::new(3));
        assert_eq!(blocks.pre_latch, NodeId::new(3));
        assert_eq!(blocks.latch, NodeId::new(4));
        assert_eq!(blocks.exit, NodeId::new(5));

        assert_eq!(shape.entry_block(), NodeId::new(0));
        assert_eq!(shape.fusion_exit(), Some(NodeId::new(5)));
        let guard = shape.guard().expect("guarded");
        assert!(matches!(guard.condition(&ssa), Some((_, true))));
    }

    #[test]
    fn test_undetermined_guard_exit() {
        let ssa = guarded();
        let forest = ssa.analyze_loops();
        let id = forest.top_level_loops()[0];
        let shape = LoopShape::resolve(&ssa, &forest, id).expect("resolves");

        // A guard block that does not branch into the preheader leaves the exit
        // undetermined.
        let bogus = GuardBranch::resolve(&ssa, NodeId::new(1), NodeId::new(1));
        assert_eq!(bogus.skip, None);
        let shape = LoopShape::Guarded {
            blocks: *shape.blocks(),
            guard: bogus,
        };
        assert_eq!(shape.fusion_exit(), None);
        assert_eq!(shape.entry_block(), NodeId::new(1));
    }

    #[test]
    fn test_rotated_loop_rejected() {
        // do { a[i] = i; i += 1 } while i < n: the latch exits, not the header
        let ssa = SsaFunctionBuilder::new("rotated").build_with(|f| {
            let a = f.param();
            let n = f.param();
            let next = f.var();
            let (zero, one) = f.block(0, |b| {
                let consts = (b.const_i64(0), b.const_i64(1));
                b.jump(1);
                consts
            });
            f.block(1, |b| {
                let i = b.phi(&[(0, zero), (1, next)]);
                b.store(a, i, i);
                b.add_into(next, i, one);
                let c = b.cmp(CmpKind::Lt, next, n);
                b.branch(c, 1, 2);
            });
            f.block(2, |b| b.ret());
        });
        let forest = ssa.analyze_loops();
        let id = forest.top_level_loops()[0];
        assert_eq!(LoopShape::resolve(&ssa, &forest, id), None);
    }
}
