//! Depth-first traversal orders.
//!
//! All traversals are iterative (explicit stack), so deeply nested or very long
//! control-flow graphs cannot overflow the call stack.

use crate::utils::graph::{NodeId, Successors};

/// Returns the nodes reachable from `entry` in depth-first post-order.
///
/// Successors are visited in the order the graph yields them.
pub fn postorder<G: Successors>(graph: &G, entry: NodeId) -> Vec<NodeId> {
    let count = graph.node_count();
    let mut order = Vec::with_capacity(count);
    if entry.index() >= count {
        return order;
    }

    let mut visited = vec![false; count];
    // (node, successors not yet explored)
    let mut stack: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
    visited[entry.index()] = true;
    stack.push((entry, successors_reversed(graph, entry)));

    while let Some((node, pending)) = stack.last_mut() {
        if let Some(next) = pending.pop() {
            if next.index() < count && !visited[next.index()] {
                visited[next.index()] = true;
                let succs = successors_reversed(graph, next);
                stack.push((next, succs));
            }
        } else {
            order.push(*node);
            stack.pop();
        }
    }

    order
}

/// Returns the nodes reachable from `entry` in reverse post-order.
///
/// In reverse post-order every node appears before its successors, except along
/// back edges. This is the iteration order for forward dataflow problems.
pub fn reverse_postorder<G: Successors>(graph: &G, entry: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, entry);
    order.reverse();
    order
}

/// Returns a bitmap of which nodes are reachable from `entry`.
pub fn reachable_from<G: Successors>(graph: &G, entry: NodeId) -> Vec<bool> {
    let mut reachable = vec![false; graph.node_count()];
    for node in postorder(graph, entry) {
        reachable[node.index()] = true;
    }
    reachable
}

// Popping from the end of the pending list must yield successors in graph order.
fn successors_reversed<G: Successors>(graph: &G, node: NodeId) -> Vec<NodeId> {
    let mut succs: Vec<NodeId> = graph.successors(node).collect();
    succs.reverse();
    succs
}
