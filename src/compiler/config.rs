//! Configuration for graph construction, inlining and the compile pipeline.

/// Configuration for the control flow passes.
///
/// One value is shared read-only by every scope a [`Pipeline`](crate::Pipeline)
/// compiles. Graph construction reads the clean-up switches, the inliner reads the
/// inlining limits, and the pipeline reads the pass limit and the parallelism switch.
///
/// # Examples
///
/// ```rust
/// use irflow::CompilerConfig;
///
/// let config = CompilerConfig::default()
///     .with_inlining(true, 16)
///     .with_max_inline_passes(2)
///     .with_parallel(false);
/// assert_eq!(config.inline_threshold, 16);
/// assert!(config.prune_exception_edges);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Remove exception edges from blocks that cannot raise (default: true).
    pub prune_exception_edges: bool,

    /// Delete blocks unreachable from the entry after building and inlining
    /// (default: true). When disabled, such blocks are only marked dead.
    pub remove_unreachable_blocks: bool,

    /// Merge every legal straight-line block pair after building (default: false).
    pub collapse_straight_line: bool,

    /// Enable method inlining (default: true).
    pub enable_inlining: bool,

    /// Maximum instruction count for an inlined callee (default: 64).
    pub inline_threshold: usize,

    /// Enable inlining of literal closures at their single yield site (default: true).
    pub enable_closure_inlining: bool,

    /// Maximum number of inlining passes per scope (default: 4).
    pub max_inline_passes: usize,

    /// Compile independent scopes on the rayon thread pool (default: true).
    pub parallel: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            prune_exception_edges: true,
            remove_unreachable_blocks: true,
            collapse_straight_line: false,
            enable_inlining: true,
            inline_threshold: 64,
            enable_closure_inlining: true,
            max_inline_passes: 4,
            parallel: true,
        }
    }
}

impl CompilerConfig {
    /// Creates a configuration that only builds and linearizes.
    #[must_use]
    pub fn no_inlining() -> Self {
        Self {
            enable_inlining: false,
            enable_closure_inlining: false,
            ..Self::default()
        }
    }

    /// Enables or disables exception edge pruning.
    #[must_use]
    pub fn with_prune_exception_edges(mut self, enable: bool) -> Self {
        self.prune_exception_edges = enable;
        self
    }

    /// Chooses between deleting unreachable blocks and marking them dead.
    #[must_use]
    pub fn with_remove_unreachable_blocks(mut self, enable: bool) -> Self {
        self.remove_unreachable_blocks = enable;
        self
    }

    /// Enables or disables straight-line collapsing after construction.
    #[must_use]
    pub fn with_collapse_straight_line(mut self, enable: bool) -> Self {
        self.collapse_straight_line = enable;
        self
    }

    /// Enables or disables method inlining.
    ///
    /// # Arguments
    ///
    /// * `enable` - Whether to enable method inlining.
    /// * `threshold` - Maximum instruction count for inlined callees.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_inlining(mut self, enable: bool, threshold: usize) -> Self {
        self.enable_inlining = enable;
        self.inline_threshold = threshold;
        self
    }

    /// Enables or disables closure inlining.
    #[must_use]
    pub fn with_closure_inlining(mut self, enable: bool) -> Self {
        self.enable_closure_inlining = enable;
        self
    }

    /// Sets the maximum number of inlining passes per scope.
    #[must_use]
    pub fn with_max_inline_passes(mut self, max: usize) -> Self {
        self.max_inline_passes = max;
        self
    }

    /// Enables or disables parallel compilation of independent scopes.
    #[must_use]
    pub fn with_parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert!(config.prune_exception_edges);
        assert!(config.remove_unreachable_blocks);
        assert!(!config.collapse_straight_line);
        assert!(config.enable_inlining);
        assert_eq!(config.inline_threshold, 64);
        assert!(config.enable_closure_inlining);
        assert_eq!(config.max_inline_passes, 4);
        assert!(config.parallel);
    }

    #[test]
    fn test_builders() {
        let config = CompilerConfig::no_inlining()
            .with_collapse_straight_line(true)
            .with_remove_unreachable_blocks(false);
        assert!(!config.enable_inlining);
        assert!(!config.enable_closure_inlining);
        assert!(config.collapse_straight_line);
        assert!(!config.remove_unreachable_blocks);
        assert_eq!(config.inline_threshold, 64);
    }
}
