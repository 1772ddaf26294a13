//! Graph primitives shared by the control-flow analyses.
//!
//! The module is deliberately small: a node id, a handful of traits describing what
//! an algorithm needs from a graph, a reversed view for post-dominance, and the
//! algorithms themselves under [`algorithms`].

pub mod algorithms;
mod node;
mod reversed;
mod traits;

pub use node::NodeId;
pub use reversed::ReverseCfg;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
