//! Configuration for the compiler pipeline and the loop fusion pass.
//!
//! No option can switch off a legality check: the knobs here bound how much
//! work the checks may do, and a check that runs out of budget fails closed.

/// Configuration for the pass pipeline.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Maximum pipeline iterations before the scheduler gives up on reaching a
    /// fixpoint (default: 10).
    pub max_iterations: usize,

    /// Loop fusion settings.
    pub fusion: FusionConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            fusion: FusionConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that validates the function after every merge.
    #[must_use]
    pub fn verifying() -> Self {
        Self {
            fusion: FusionConfig {
                verify_after_merge: true,
                ..FusionConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Configuration for [`crate::compiler::LoopFusionPass`].
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Maximum number of cross-loop access pairs the independence check may
    /// test for one loop pair (default: 4096). A pair of loops needing more is
    /// treated as dependent.
    pub max_dependence_pairs: usize,

    /// Run [`crate::analysis::SsaFunction::validate`] after each merge and fail
    /// the pass on a malformed result (default: false).
    pub verify_after_merge: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_dependence_pairs: 4096,
            verify_after_merge: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::new();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.fusion.max_dependence_pairs, 4096);
        assert!(!config.fusion.verify_after_merge);
        assert!(CompilerConfig::verifying().fusion.verify_after_merge);
    }
}
