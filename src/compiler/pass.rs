//! Pass traits for the compiler pipeline.
//!
//! This module defines the [`SsaPass`] trait every transformation implements and
//! the [`PreservedAnalyses`] signal a pass reports to the surrounding pipeline.

use crate::{analysis::SsaFunction, compiler::context::CompilerContext, Result};

/// Which cached analyses survive a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreservedAnalyses {
    /// Nothing changed; dominators, trip counts and dependences remain valid.
    All,
    /// The function changed; every analysis must be recomputed.
    None,
}

impl PreservedAnalyses {
    /// Returns `true` if the pass changed the function.
    #[must_use]
    pub fn changed(self) -> bool {
        self == PreservedAnalyses::None
    }

    /// Combines the results of two passes.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        if self.changed() || other.changed() {
            PreservedAnalyses::None
        } else {
            PreservedAnalyses::All
        }
    }
}

impl From<bool> for PreservedAnalyses {
    fn from(changed: bool) -> Self {
        if changed {
            PreservedAnalyses::None
        } else {
            PreservedAnalyses::All
        }
    }
}

/// A transformation that operates on SSA form.
///
/// All passes must be thread-safe (Send + Sync) to allow parallel execution.
/// Passes receive mutable access to one SSA function and shared access to the
/// compiler context.
pub trait SsaPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific function?
    ///
    /// Called before `run_on_function`. Override to skip functions that
    /// don't need this pass.
    fn should_run(&self, _ssa: &SsaFunction, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Run the pass on a single function.
    ///
    /// Returns `true` if any changes were made, `false` otherwise.
    /// Events should be recorded directly to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass hit an internal invariant violation. The
    /// function must then be considered corrupt.
    fn run_on_function(&self, ssa: &mut SsaFunction, ctx: &CompilerContext) -> Result<bool>;

    /// Called once before the pass runs over all functions.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass ran over all functions.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserved_analyses() {
        assert!(!PreservedAnalyses::All.changed());
        assert!(PreservedAnalyses::None.changed());
        assert_eq!(PreservedAnalyses::from(true), PreservedAnalyses::None);
        assert_eq!(
            PreservedAnalyses::All.intersect(PreservedAnalyses::None),
            PreservedAnalyses::None
        );
        assert_eq!(
            PreservedAnalyses::All.intersect(PreservedAnalyses::All),
            PreservedAnalyses::All
        );
    }
}
