//! Control-flow graph view over an [`SsaFunction`].
//!
//! [`SsaCfg`] borrows a function and exposes it through the graph traits so the
//! generic algorithms (dominators, traversal, loop detection) can run on it.
//! Successor and predecessor lists are computed once from the block terminators;
//! dead blocks have no edges.

use crate::{
    analysis::ssa::SsaFunction,
    utils::graph::{
        algorithms::{compute_dominators, compute_post_dominators, DominatorTree},
        GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
};

/// A borrowed control-flow graph of an SSA function.
#[derive(Debug, Clone)]
pub struct SsaCfg<'a> {
    ssa: &'a SsaFunction,
    successors: Vec<Vec<NodeId>>,
    predecessors: Vec<Vec<NodeId>>,
}

impl<'a> SsaCfg<'a> {
    /// Builds the view.
    #[must_use]
    pub fn from_ssa(ssa: &'a SsaFunction) -> Self {
        let count = ssa.block_count();
        let mut successors = vec![Vec::new(); count];
        let mut predecessors = vec![Vec::new(); count];

        for (id, block) in ssa.iter_blocks() {
            for target in block.successors() {
                if target >= count {
                    continue;
                }
                successors[id].push(NodeId::new(target));
                predecessors[target].push(NodeId::new(id));
            }
        }

        Self {
            ssa,
            successors,
            predecessors,
        }
    }

    /// Returns the underlying function.
    #[must_use]
    pub fn ssa(&self) -> &'a SsaFunction {
        self.ssa
    }

    /// Returns `true` if `node` is a live block.
    #[must_use]
    pub fn is_live(&self, node: NodeId) -> bool {
        self.ssa.is_live(node.index())
    }

    /// Returns the number of distinct successors of `node`.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.successors.get(node.index()).map_or(0, Vec::len)
    }

    /// Returns the number of predecessor edges of `node`.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.predecessors.get(node.index()).map_or(0, Vec::len)
    }

    /// Computes the dominator tree rooted at the entry block.
    #[must_use]
    pub fn dominators(&self) -> DominatorTree {
        compute_dominators(self, self.entry())
    }

    /// Computes the post-dominator tree (rooted at a virtual exit).
    #[must_use]
    pub fn post_dominators(&self) -> DominatorTree {
        compute_post_dominators(self, |node| self.is_live(node))
    }
}

impl GraphBase for SsaCfg<'_> {
    fn node_count(&self) -> usize {
        self.successors.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.successors.len()).map(NodeId::new)
    }
}

impl Successors for SsaCfg<'_> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.successors
            .get(node.index())
            .into_iter()
            .flat_map(|succs| succs.iter().copied())
    }
}

impl Predecessors for SsaCfg<'_> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors
            .get(node.index())
            .into_iter()
            .flat_map(|preds| preds.iter().copied())
    }
}

impl RootedGraph for SsaCfg<'_> {
    fn entry(&self) -> NodeId {
        NodeId::new(self.ssa.entry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::{CmpKind, SsaFunctionBuilder};

    #[test]
    fn test_cfg_edges_and_dominance() {
        // B0 -> B1 | B2 -> B3
        let ssa = SsaFunctionBuilder::new("diamond").build_with(|f| {
            let x = f.param();
            f.block(0, |b| {
                let zero = b.const_i64(0);
                let c = b.cmp(CmpKind::Gt, x, zero);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| b.jump(3));
            f.block(2, |b| b.jump(3));
            f.block(3, |b| b.ret());
        });
        let cfg = SsaCfg::from_ssa(&ssa);

        assert_eq!(cfg.out_degree(NodeId::new(0)), 2);
        assert_eq!(cfg.in_degree(NodeId::new(3)), 2);

        let dom = cfg.dominators();
        assert!(dom.dominates(NodeId::new(0), NodeId::new(3)));
        assert!(!dom.dominates(NodeId::new(1), NodeId::new(3)));

        let pdom = cfg.post_dominators();
        assert!(pdom.dominates(NodeId::new(3), NodeId::new(0)));
        assert!(!pdom.dominates(NodeId::new(2), NodeId::new(0)));
    }

    #[test]
    fn test_dead_blocks_have_no_edges() {
        let mut ssa = SsaFunctionBuilder::new("dead").build_with(|f| {
            f.block(0, |b| b.jump(2));
            f.block(1, |b| b.jump(2));
            f.block(2, |b| b.ret());
        });
        ssa.remove_unreachable_blocks();
        let cfg = SsaCfg::from_ssa(&ssa);

        assert!(!cfg.is_live(NodeId::new(1)));
        assert_eq!(cfg.in_degree(NodeId::new(2)), 1);
        assert_eq!(cfg.node_count(), 3);
    }
}
