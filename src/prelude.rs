//! # loopfuse Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the loopfuse library. Import this module to get quick access to the SSA builder,
//! the analyses and the fusion pass.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all loopfuse operations
pub use crate::Error;

/// The result type used throughout loopfuse
pub use crate::Result;

// ================================================================================================
// SSA Representation
// ================================================================================================

/// Functions, blocks, phis and operations
pub use crate::analysis::{
    CmpKind, DefSite, PhiNode, PhiOperand, SsaBlock, SsaFunction, SsaOp, SsaVarId,
};

/// Closure-based construction of SSA functions
pub use crate::analysis::{SsaBlockBuilder, SsaFunctionBuilder, SsaFunctionContext};

/// Reference interpreter
pub use crate::analysis::{
    Argument, ExecutionResult, MemoryEvent, MemoryEventKind, SsaEvaluator, Value,
};

// ================================================================================================
// Analyses
// ================================================================================================

/// Loop nest
pub use crate::analysis::{LoopExit, LoopForest, LoopId, LoopInfo};

/// Scalar evolution and trip counts
pub use crate::analysis::{AffineExpr, Recurrence, ScalarEvolution, TripCount};

/// Memory dependence
pub use crate::analysis::{DependenceAnalysis, Direction, MemoryAccess};

/// Per-function analysis cache
pub use crate::analysis::AnalysisManager;

// ================================================================================================
// Compiler Pipeline
// ================================================================================================

/// Passes and scheduling
pub use crate::compiler::{PassScheduler, PreservedAnalyses, SsaPass};

/// Shared state and configuration
pub use crate::compiler::{CompilerConfig, CompilerContext, FusionConfig};

/// Event recording
pub use crate::compiler::{DerivedStats, Event, EventKind, EventLog};

/// Loop fusion
pub use crate::compiler::{FusionVerdict, LegalityChecker, LoopFusionPass, LoopMerger};

// ================================================================================================
// Graph Infrastructure
// ================================================================================================

/// Node identifier shared by every graph
pub use crate::utils::graph::NodeId;
