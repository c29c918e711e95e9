//! Reconciliation limits and strategy.

/// Default edit distance limit for the Myers search before it gives up on a
/// minimal script.
pub const DEFAULT_MAX_EDIT_DISTANCE: usize = 512;

/// Default maximum number of patch operations before fallback to full reload.
pub const DEFAULT_MAX_OPS: usize = 2000;

/// How a new snapshot is brought onto the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Diff old against new and emit incremental patch ops
    #[default]
    Diff,
    /// Skip diffing and reload the whole target every time
    Reload,
}

/// Configuration for reconciliation limits.
///
/// Use this to tune behavior for specific list shapes:
/// - Increase limits for long, heavily edited lists
/// - Decrease limits for faster fallback on large reshuffles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Diff or always reload.
    /// Default: `Strategy::Diff`
    pub strategy: Strategy,
    /// Maximum edit distance explored by the sequence differ. Past it,
    /// unmatched middles degrade to moves instead of a minimal script.
    /// Default: 512
    pub max_edit_distance: usize,
    /// Maximum number of patch operations before fallback to full reload.
    /// Default: 2000
    pub max_ops: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Diff,
            max_edit_distance: DEFAULT_MAX_EDIT_DISTANCE,
            max_ops: DEFAULT_MAX_OPS,
        }
    }
}

impl ReconcileConfig {
    /// Create config with custom limits.
    pub fn new(max_edit_distance: usize, max_ops: usize) -> Self {
        Self {
            strategy: Strategy::Diff,
            max_edit_distance,
            max_ops,
        }
    }

    /// Create config for long lists (higher limits).
    pub fn large() -> Self {
        Self::new(2048, 10_000)
    }

    /// Create config for short lists (lower limits, faster fallback).
    pub fn small() -> Self {
        Self::new(64, 200)
    }

    /// Create config that never diffs.
    pub fn reload_only() -> Self {
        Self::default().with_strategy(Strategy::Reload)
    }

    /// Replace the strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}
