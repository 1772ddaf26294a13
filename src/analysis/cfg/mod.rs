//! Loop structure of a control-flow graph.
//!
//! Loop detection is generic over the graph traits in [`crate::utils::graph`], so
//! it runs on [`crate::analysis::SsaCfg`] as well as on any synthetic graph a test
//! builds.
//!
//! # Key Components
//!
//! - [`detect_loops`] - natural loop discovery from back edges
//! - [`LoopForest`] - the loop-nest registry, addressed by [`LoopId`]
//! - [`LoopInfo`] - header, body, latches, preheader, exits and guard of one loop

mod loops;

pub use loops::{detect_loops, LoopExit, LoopForest, LoopId, LoopInfo};
