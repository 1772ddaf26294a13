//! Trait definitions for graph abstractions.
//!
//! Graph algorithms in this crate are written against these traits rather than a
//! concrete representation, so the same dominator and traversal code runs on the
//! forward CFG view ([`SsaCfg`](crate::analysis::SsaCfg)) and on the reversed view
//! used for post-dominance ([`ReverseCfg`](crate::utils::graph::ReverseCfg)).
//!
//! - [`GraphBase`] - node count and node iteration
//! - [`Successors`] - outgoing edges
//! - [`Predecessors`] - incoming edges
//! - [`RootedGraph`] - a designated entry node

use crate::utils::graph::NodeId;

/// Core graph properties.
pub trait GraphBase {
    /// Returns the number of nodes. Node ids range over `0..node_count()`.
    fn node_count(&self) -> usize;

    /// Returns an iterator over all node ids.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward edge traversal.
pub trait Successors: GraphBase {
    /// Returns the direct successors of `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Returns the direct predecessors of `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a designated entry node.
pub trait RootedGraph: GraphBase {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}
