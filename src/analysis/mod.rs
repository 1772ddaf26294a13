//! Program analysis infrastructure.
//!
//! This module provides the IR and the analyses the loop transformations in
//! [`crate::compiler`] query. It builds upon the generic graph infrastructure in
//! [`crate::utils::graph`].
//!
//! # Architecture
//!
//! - [`ssa`] - the SSA function representation, builder, CFG view and interpreter
//! - [`cfg`] - natural loop detection and the loop-nest registry
//! - [`scev`] - affine expressions, add-recurrences and trip counts
//! - [`dependence`] - memory access collection and dependence testing
//! - [`manager`] - per-function memoization of the above
//!
//! # Usage
//!
//! ```rust
//! use loopfuse::analysis::{CmpKind, ScalarEvolution, SsaFunctionBuilder, TripCount};
//!
//! let ssa = SsaFunctionBuilder::new("count").build_with(|f| {
//!     let n = f.param();
//!     let next = f.var();
//!     let (zero, one) = f.block(0, |b| {
//!         let consts = (b.const_i64(0), b.const_i64(1));
//!         b.jump(1);
//!         consts
//!     });
//!     let i = f.block(1, |b| {
//!         let i = b.phi(&[(0, zero), (2, next)]);
//!         let c = b.cmp(CmpKind::Lt, i, n);
//!         b.branch(c, 2, 3);
//!         i
//!     });
//!     f.block(2, |b| {
//!         b.add_into(next, i, one);
//!         b.jump(1);
//!     });
//!     f.block(3, |b| b.ret());
//! });
//!
//! let forest = ssa.analyze_loops();
//! let (_, info) = forest.iter().next().unwrap();
//! let count = ScalarEvolution::new(&ssa, &forest).trip_count(info);
//! assert!(matches!(count, TripCount::Known(_)));
//! assert_eq!(count.to_string(), "max(0, v0)");
//! ```

pub mod cfg;
pub mod dependence;
pub mod manager;
pub mod scev;
pub mod ssa;

pub use cfg::{detect_loops, LoopExit, LoopForest, LoopId, LoopInfo};
pub use dependence::{
    AliasResult, Dependence, DependenceAnalysis, DependenceKind, Direction, InstrRef,
    MemoryAccess,
};
pub use manager::AnalysisManager;
pub use scev::{
    AffineExpr, InductionVar, LinearEvolution, Recurrence, ScalarEvolution, TripCount,
    TripCountExpr,
};
pub use ssa::{
    Argument, CmpKind, DefSite, ExecutionResult, MemoryEffects, MemoryEvent, MemoryEventKind,
    PhiNode, PhiOperand, SsaBlock, SsaBlockBuilder, SsaCfg, SsaEvaluator, SsaFunction,
    SsaFunctionBuilder, SsaFunctionContext, SsaOp, SsaVarId, Value,
};
