//! Dominator and post-dominator trees.
//!
//! Node `A` dominates node `B` when every path from the root to `B` passes through
//! `A`. Post-dominance is the same relation on the reversed graph, rooted at a
//! virtual exit (see [`ReverseCfg`]).
//!
//! # Algorithm
//!
//! The tree is computed with the iterative scheme of Cooper, Harvey and Kennedy
//! ("A Simple, Fast Dominance Algorithm"): nodes are processed in reverse
//! post-order and each immediate dominator is refined by intersecting the
//! dominators of already-processed predecessors until nothing changes. For the
//! reducible graphs produced by structured code this converges in two passes.
//!
//! ```text
//!        B0                 idom(B1) = B0
//!       /  \                idom(B2) = B0
//!     B1    B2              idom(B3) = B0   (neither B1 nor B2 alone)
//!       \  /
//!        B3
//! ```
//!
//! # Unreachable nodes
//!
//! Nodes not reachable from the root have no immediate dominator. Every query
//! involving them answers `false`/`None` instead of panicking, which matters for
//! post-dominance where blocks that never reach a return are common.

use crate::utils::graph::{
    algorithms::traversal::reverse_postorder, NodeId, Predecessors, ReverseCfg, RootedGraph,
    Successors,
};

/// A dominator tree over the nodes of a graph.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    root: NodeId,
    /// Immediate dominator per node. The root and unreachable nodes have `None`.
    idom: Vec<Option<NodeId>>,
    reachable: Vec<bool>,
    depth: Vec<usize>,
    children: Vec<Vec<NodeId>>,
}

impl DominatorTree {
    /// Returns the root of the tree.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns `true` if `node` is reachable from the root.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.reachable.get(node.index()).copied().unwrap_or(false)
    }

    /// Returns the immediate dominator of `node`, or `None` for the root and for
    /// unreachable nodes.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns `true` if `a` dominates `b`. Every reachable node dominates itself.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        if self.depth[a.index()] > self.depth[b.index()] {
            return false;
        }

        let mut current = b;
        while self.depth[current.index()] > self.depth[a.index()] {
            match self.idom[current.index()] {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        current == a
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the depth of `node` in the tree (root is 0).
    #[must_use]
    pub fn depth(&self, node: NodeId) -> usize {
        self.depth.get(node.index()).copied().unwrap_or(0)
    }

    /// Returns the nodes immediately dominated by `node`.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children
            .get(node.index())
            .map_or(&[], Vec::as_slice)
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let count = graph.node_count();
    let rpo = reverse_postorder(graph, entry);

    let mut order = vec![usize::MAX; count];
    for (position, node) in rpo.iter().enumerate() {
        order[node.index()] = position;
    }

    let mut idom: Vec<Option<NodeId>> = vec![None; count];
    if entry.index() < count {
        idom[entry.index()] = Some(entry);
    }

    let mut changed = true;
    while changed {
        changed = false;
        for &node in rpo.iter().skip(1) {
            let mut new_idom: Option<NodeId> = None;
            for pred in graph.predecessors(node) {
                if pred.index() >= count || idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, &order, pred, current),
                });
            }
            if new_idom.is_some() && idom[node.index()] != new_idom {
                idom[node.index()] = new_idom;
                changed = true;
            }
        }
    }

    let reachable: Vec<bool> = (0..count).map(|i| order[i] != usize::MAX).collect();
    if entry.index() < count {
        idom[entry.index()] = None;
    }

    let mut children = vec![Vec::new(); count];
    for &node in &rpo {
        if let Some(parent) = idom[node.index()] {
            children[parent.index()].push(node);
        }
    }

    // rpo visits parents before children, so one pass fills depths
    let mut depth = vec![0usize; count];
    for &node in &rpo {
        if let Some(parent) = idom[node.index()] {
            depth[node.index()] = depth[parent.index()] + 1;
        }
    }

    DominatorTree {
        root: entry,
        idom,
        reachable,
        depth,
        children,
    }
}

/// Computes the post-dominator tree of `graph`.
///
/// The returned tree is rooted at the virtual exit of [`ReverseCfg`]; its id is
/// `graph.node_count()`. `is_live` excludes dead blocks from the sink set.
pub fn compute_post_dominators<G, F>(graph: &G, is_live: F) -> DominatorTree
where
    G: Successors + Predecessors,
    F: Fn(NodeId) -> bool,
{
    let reversed = ReverseCfg::new(graph, is_live);
    compute_dominators(&reversed, reversed.entry())
}

fn intersect(
    idom: &[Option<NodeId>],
    order: &[usize],
    mut left: NodeId,
    mut right: NodeId,
) -> NodeId {
    while left != right {
        while order[left.index()] > order[right.index()] {
            match idom[left.index()] {
                Some(parent) => left = parent,
                None => return right,
            }
        }
        while order[right.index()] > order[left.index()] {
            match idom[right.index()] {
                Some(parent) => right = parent,
                None => return left,
            }
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::GraphBase;

    struct TestGraph {
        succs: Vec<Vec<usize>>,
        preds: Vec<Vec<usize>>,
    }

    impl TestGraph {
        fn new(edges: &[(usize, usize)], count: usize) -> Self {
            let mut succs = vec![Vec::new(); count];
            let mut preds = vec![Vec::new(); count];
            for &(from, to) in edges {
                succs[from].push(to);
                preds[to].push(from);
            }
            Self { succs, preds }
        }
    }

    impl GraphBase for TestGraph {
        fn node_count(&self) -> usize {
            self.succs.len()
        }

        fn node_ids(&self) -> impl Iterator<Item = NodeId> {
            (0..self.succs.len()).map(NodeId::new)
        }
    }

    impl Successors for TestGraph {
        fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.succs[node.index()].iter().copied().map(NodeId::new)
        }
    }

    impl Predecessors for TestGraph {
        fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
            self.preds[node.index()].iter().copied().map(NodeId::new)
        }
    }

    fn n(index: usize) -> NodeId {
        NodeId::new(index)
    }

    #[test]
    fn test_diamond_dominators() {
        let graph = TestGraph::new(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        let dom = compute_dominators(&graph, n(0));

        assert_eq!(dom.immediate_dominator(n(0)), None);
        assert_eq!(dom.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom.immediate_dominator(n(3)), Some(n(0)));
        assert!(dom.dominates(n(0), n(3)));
        assert!(!dom.dominates(n(1), n(3)));
        assert!(dom.dominates(n(3), n(3)));
        assert!(!dom.strictly_dominates(n(3), n(3)));
        assert_eq!(dom.depth(n(3)), 1);
        assert_eq!(dom.children(n(0)).len(), 3);
    }

    #[test]
    fn test_loop_dominators() {
        // 0 -> 1 (header) -> 2 (body) -> 1, 1 -> 3 (exit)
        let graph = TestGraph::new(&[(0, 1), (1, 2), (2, 1), (1, 3)], 4);
        let dom = compute_dominators(&graph, n(0));

        assert!(dom.dominates(n(1), n(2)));
        assert!(dom.dominates(n(1), n(3)));
        assert!(!dom.dominates(n(2), n(3)));
        assert_eq!(dom.depth(n(2)), 2);
    }

    #[test]
    fn test_unreachable_nodes_never_dominate() {
        let graph = TestGraph::new(&[(0, 1), (2, 1)], 3);
        let dom = compute_dominators(&graph, n(0));

        assert!(!dom.is_reachable(n(2)));
        assert!(!dom.dominates(n(2), n(1)));
        assert!(!dom.dominates(n(0), n(2)));
        assert!(dom.dominates(n(0), n(1)));
    }

    #[test]
    fn test_post_dominators_diamond() {
        let graph = TestGraph::new(&[(0, 1), (0, 2), (1, 3), (2, 3)], 4);
        let pdom = compute_post_dominators(&graph, |_| true);

        assert_eq!(pdom.root(), n(4));
        assert!(pdom.dominates(n(3), n(0)));
        assert!(pdom.dominates(n(3), n(1)));
        assert!(!pdom.dominates(n(1), n(0)));
    }

    #[test]
    fn test_post_dominators_multiple_returns() {
        // 0 -> 1 (ret), 0 -> 2 (ret)
        let graph = TestGraph::new(&[(0, 1), (0, 2)], 3);
        let pdom = compute_post_dominators(&graph, |_| true);

        assert!(!pdom.dominates(n(1), n(0)));
        assert!(!pdom.dominates(n(2), n(0)));
        assert!(pdom.dominates(n(0), n(0)));
    }

    #[test]
    fn test_post_dominators_infinite_loop() {
        // 0 -> 1 -> 1, 0 -> 2 (ret): block 1 never reaches the exit
        let graph = TestGraph::new(&[(0, 1), (1, 1), (0, 2)], 3);
        let pdom = compute_post_dominators(&graph, |_| true);

        assert!(!pdom.is_reachable(n(1)));
        assert!(!pdom.dominates(n(2), n(1)));
        assert!(!pdom.dominates(n(1), n(0)));
    }
}
