//! Built-in SSA optimization passes.
//!
//! Each pass implements [`SsaPass`](crate::compiler::SsaPass) and records what
//! it changed into the context's [`EventLog`](crate::compiler::EventLog).
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`LoopFusionPass`] | Fuses adjacent loops with equal trip counts into one loop |

mod fusion;

pub use fusion::{
    inter_loop_region, resolve_induction_variable, FusionVerdict, GuardBranch, LegalityChecker,
    LoopBlocks, LoopFusionPass, LoopMerger, LoopShape, MergeOutcome, ResolvedIv,
};
