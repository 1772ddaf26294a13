//! SSA variable identifiers.
//!
//! Every value in an [`SsaFunction`](crate::analysis::SsaFunction) is defined exactly
//! once: by a function parameter, by a phi node, or by an instruction. Variables
//! are dense indices allocated by the owning function, so analyses can key side
//! tables on them cheaply.

use std::fmt;

/// Identifier of an SSA variable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SsaVarId(u32);

impl SsaVarId {
    /// Creates a variable id from a raw index.
    ///
    /// Normally ids come from [`SsaFunction::new_var`](crate::analysis::SsaFunction::new_var).
    #[must_use]
    pub const fn new(index: usize) -> Self {
        SsaVarId(index as u32)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a variable is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefSite {
    /// Function parameter with the given position.
    Param(usize),
    /// Phi node in the given block.
    Phi {
        /// Block holding the phi.
        block: usize,
    },
    /// Instruction at `index` in `block`.
    Instruction {
        /// Block holding the instruction.
        block: usize,
        /// Position within the block's instruction list.
        index: usize,
    },
}

impl DefSite {
    /// Returns the defining block, or `None` for parameters (which are available
    /// on entry to the function).
    #[must_use]
    pub fn block(self) -> Option<usize> {
        match self {
            DefSite::Param(_) => None,
            DefSite::Phi { block } | DefSite::Instruction { block, .. } => Some(block),
        }
    }
}
