//! Node identifier for the graph views used by the analyses.
//!
//! Basic blocks are addressed by their position in [`SsaFunction::blocks`](crate::analysis::SsaFunction::blocks),
//! so a [`NodeId`] and a block index are interchangeable. The newtype keeps the two
//! apart in signatures where mixing them up would be easy.

use std::fmt;

/// A strongly-typed identifier for a node (basic block) in a control-flow graph.
///
/// # Examples
///
/// ```rust
/// use loopfuse::utils::graph::NodeId;
/// use std::collections::HashMap;
///
/// let header = NodeId::new(2);
/// assert_eq!(header.index(), 2);
///
/// let mut depth: HashMap<NodeId, usize> = HashMap::new();
/// depth.insert(header, 1);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversions() {
        let node = NodeId::new(7);
        assert_eq!(node.index(), 7);
        assert_eq!(usize::from(node), 7);
        assert_eq!(NodeId::from(7), node);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(3);
        assert_eq!(format!("{node:?}"), "NodeId(3)");
        assert_eq!(format!("{node}"), "B3");
    }

    #[test]
    fn test_node_id_ordering() {
        assert!(NodeId::new(1) < NodeId::new(2));
        assert_eq!(NodeId::new(4).max(NodeId::new(2)), NodeId::new(4));
    }
}
