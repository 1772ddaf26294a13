//! Reversed graph view with a virtual exit node.
//!
//! Post-dominance is dominance on the reversed graph. A function can have several
//! returning blocks, so the view adds one synthetic node (index `node_count` of the
//! underlying graph) with an edge to every node that has no successors. The
//! synthetic node is the root.
//!
//! ```text
//!   forward:  B0 -> B1 -> B3(ret)        reversed:  X -> B3 -> B1 -> B0
//!             B0 -> B2(ret)                         X -> B2 -> B0
//! ```
//!
//! Nodes that cannot reach any returning block (for example the body of an
//! infinite loop) are unreachable from the root and are post-dominated by nothing.

use crate::utils::graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors};

/// A reversed view of a graph, rooted at a virtual exit node.
#[derive(Debug, Clone)]
pub struct ReverseCfg {
    /// Reversed adjacency: `succs[n]` are the forward predecessors of `n`,
    /// plus for the virtual exit every forward sink.
    succs: Vec<Vec<NodeId>>,
    /// Reversed predecessors: forward successors, plus the virtual exit for sinks.
    preds: Vec<Vec<NodeId>>,
    exit: NodeId,
}

impl ReverseCfg {
    /// Builds the reversed view of `graph`.
    ///
    /// `is_live` filters which nodes are considered at all; dead (cleared) blocks
    /// are skipped so they do not count as sinks.
    pub fn new<G, F>(graph: &G, is_live: F) -> Self
    where
        G: Successors + Predecessors,
        F: Fn(NodeId) -> bool,
    {
        let count = graph.node_count();
        let exit = NodeId::new(count);
        let mut succs = vec![Vec::new(); count + 1];
        let mut preds = vec![Vec::new(); count + 1];

        for node in graph.node_ids() {
            if !is_live(node) {
                continue;
            }
            let mut is_sink = true;
            for succ in graph.successors(node) {
                is_sink = false;
                // forward edge node -> succ becomes succ -> node
                succs[succ.index()].push(node);
                preds[node.index()].push(succ);
            }
            if is_sink {
                succs[exit.index()].push(node);
                preds[node.index()].push(exit);
            }
        }

        Self { succs, preds, exit }
    }

    /// Returns the virtual exit node.
    #[must_use]
    pub fn exit(&self) -> NodeId {
        self.exit
    }
}

impl GraphBase for ReverseCfg {
    fn node_count(&self) -> usize {
        self.succs.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.succs.len()).map(NodeId::new)
    }
}

impl Successors for ReverseCfg {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.succs
            .get(node.index())
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }
}

impl Predecessors for ReverseCfg {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.preds
            .get(node.index())
            .into_iter()
            .flat_map(|p| p.iter().copied())
    }
}

impl RootedGraph for ReverseCfg {
    fn entry(&self) -> NodeId {
        self.exit
    }
}
