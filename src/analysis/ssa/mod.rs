//! Static Single Assignment (SSA) form.
//!
//! The IR every analysis and transformation in this crate operates on.
//!
//! # Architecture
//!
//! ```text
//! SsaFunction
//!   ├─ params: [SsaVarId]
//!   └─ blocks: [SsaBlock]          (index = block id, cleared = dead)
//!        ├─ phi_nodes: [PhiNode]   (merge points, evaluated on entry)
//!        └─ instructions: [SsaOp]  (last one is the terminator)
//! ```
//!
//! - [`SsaFunctionBuilder`] - closure-based construction, used by tests and benches
//! - [`SsaCfg`] - graph-trait view for dominators and loop detection
//! - [`SsaEvaluator`] - concrete interpreter used to check semantic preservation

mod block;
mod builder;
mod cfg;
mod evaluator;
mod function;
mod ops;
mod phi;
mod variable;

pub use block::SsaBlock;
pub use builder::{SsaBlockBuilder, SsaFunctionBuilder, SsaFunctionContext};
pub use cfg::SsaCfg;
pub use evaluator::{
    Argument, ExecutionResult, MemoryEvent, MemoryEventKind, SsaEvaluator, Value,
};
pub use function::SsaFunction;
pub use ops::{CmpKind, MemoryEffects, SsaOp};
pub use phi::{PhiNode, PhiOperand};
pub use variable::{DefSite, SsaVarId};
