//! Compiler infrastructure for SSA-based loop transformations.
//!
//! This module sits on top of [`crate::analysis`]:
//!
//! - [`crate::analysis`] - SSA IR, loops, trip counts, dependences
//! - [`compiler`](self) - passes, the scheduler that runs them, events, configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CompilerContext              Shared state of one compilation    │
//! │    ├─ SSA functions           (DashMap keyed by name)            │
//! │    ├─ Changed set                                                │
//! │    ├─ CompilerConfig                                             │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Fixpoint execution                  │
//! │    └─ run all passes over all functions (rayon), repeat until    │
//! │       nothing changes or max_iterations is reached               │
//! │                                                                  │
//! │  SsaPass trait               Interface for all passes            │
//! │    ├─ run_on_function()       Per-function transformation        │
//! │    ├─ initialize()            One-time setup before the pass     │
//! │    └─ finalize()              Cleanup after the pass             │
//! │                                                                  │
//! │  LoopFusionPass              Adjacent loop fusion                │
//! │    ├─ LoopShape               Fusible loop shapes                │
//! │    ├─ LegalityChecker         Adjacency, TCE, CFE, independence  │
//! │    └─ LoopMerger              CFG splice of two loops            │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use loopfuse::analysis::{CmpKind, SsaFunctionBuilder};
//! use loopfuse::compiler::{CompilerContext, LoopFusionPass, PassScheduler};
//!
//! let ssa = SsaFunctionBuilder::new("twice").build_with(|f| {
//!     let (a, b, n) = (f.param(), f.param(), f.param());
//!     let (i_next, j_next) = (f.var(), f.var());
//!     let (zero, one) = f.block(0, |bb| {
//!         let consts = (bb.const_i64(0), bb.const_i64(1));
//!         bb.jump(1);
//!         consts
//!     });
//!     let i = f.block(1, |bb| {
//!         let i = bb.phi(&[(0, zero), (3, i_next)]);
//!         let c = bb.cmp(CmpKind::Lt, i, n);
//!         bb.branch(c, 2, 4);
//!         i
//!     });
//!     f.block(2, |bb| {
//!         bb.store(a, i, i);
//!         bb.jump(3);
//!     });
//!     f.block(3, |bb| {
//!         bb.add_into(i_next, i, one);
//!         bb.jump(1);
//!     });
//!     f.block(4, |bb| bb.jump(5));
//!     let j = f.block(5, |bb| {
//!         let j = bb.phi(&[(4, zero), (7, j_next)]);
//!         let c = bb.cmp(CmpKind::Lt, j, n);
//!         bb.branch(c, 6, 8);
//!         j
//!     });
//!     f.block(6, |bb| {
//!         bb.store(b, j, j);
//!         bb.jump(7);
//!     });
//!     f.block(7, |bb| {
//!         bb.add_into(j_next, j, one);
//!         bb.jump(5);
//!     });
//!     f.block(8, |bb| bb.ret());
//! });
//!
//! let ctx = CompilerContext::default();
//! ctx.add_function(ssa);
//!
//! let mut scheduler = PassScheduler::from_context(&ctx);
//! scheduler.add_pass(Box::new(LoopFusionPass::new()));
//! scheduler.run_pipeline(&ctx)?;
//!
//! assert!(ctx.was_changed("twice"));
//! assert_eq!(ctx.with_function("twice", |f| f.analyze_loops().len()), Some(1));
//! # Ok::<(), loopfuse::Error>(())
//! ```

mod config;
mod context;
mod events;
mod pass;
mod passes;
mod scheduler;

pub use config::{CompilerConfig, FusionConfig};
pub use context::CompilerContext;
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use pass::{PreservedAnalyses, SsaPass};
pub use passes::{
    inter_loop_region, resolve_induction_variable, FusionVerdict, GuardBranch, LegalityChecker,
    LoopBlocks, LoopFusionPass, LoopMerger, LoopShape, MergeOutcome, ResolvedIv,
};
pub use scheduler::PassScheduler;
