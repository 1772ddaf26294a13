//! Graph algorithms.
//!
//! - [`compute_dominators`] / [`compute_post_dominators`] - dominance relations
//! - [`postorder`] / [`reverse_postorder`] / [`reachable_from`] - traversal orders

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, compute_post_dominators, DominatorTree};
pub use traversal::{postorder, reachable_from, reverse_postorder};
