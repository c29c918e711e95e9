//! tola-sections - Keyed reconciliation for sectioned lists
//!
//! Given the committed list of sections and a new one, compute the minimal
//! set of positional edits that turns one into the other, and hand them to a
//! batch-update target in the order such targets require.
//!
//! ## Core Concepts
//!
//! **Identity vs content**: every section and item has a stable key
//! ([`Identifiable`]) and a content check ([`ContentEq`]). Keys decide
//! insert/delete/move; content decides replace.
//!
//! **Two phases**: structural ops (insert, delete, move) form one atomic
//! batch in mixed coordinates. Replacements are in new coordinates and run
//! only after the batch commits.
//!
//! ## Modules
//! - `algo`: Myers LCS and the keyed sequence diff
//! - `reconcile`: section diff plus per-section item diffs
//! - `plan`: translation into an index-path [`PatchPlan`]
//! - `target`: the [`PatchTarget`] boundary and an in-memory [`MirrorTarget`]
//! - `state`: [`ListState`], the committed snapshot and transaction lifecycle
//!
//! ## Usage
//!
//! ```ignore
//! use tola_sections::prelude::*;
//!
//! let mut state = ListState::from_sections(current);
//! let txn = state.begin(&mut table, next)?;
//! // table reports the batch committed
//! state.complete(&mut table, txn)?;
//! ```

// =============================================================================
// Modules
// =============================================================================

/// Algorithms: sequence diff, myers
pub mod algo;

/// Engine configuration
pub mod config;

/// Identity and content traits
pub mod element;

/// Error types
pub mod error;

/// Patch plan and index paths
pub mod plan;

/// Prelude for common imports
pub mod prelude;

/// Two-level reconciliation
pub mod reconcile;

/// Committed snapshot and transactions
pub mod state;

/// Patch targets
pub mod target;

// =============================================================================
// Re-exports
// =============================================================================

// Algorithms
pub use algo::{diff, diff_with_limit, Change, DiffStats, Match, SequenceDiff};

// Config
pub use config::{ReconcileConfig, Strategy};

// Element traits
pub use element::{ContentEq, Identifiable, Section, Sectionable};

// Error types
pub use error::{ReconcileError, ReconcileResult, Side};

// Plan
pub use plan::{build, IndexPath, PatchOp, PatchPlan};

// Reconciler
pub use reconcile::{
    reconcile, reconcile_with_config, ItemChanges, ReconcileStats, Reconciliation, SectionSlot,
};

// State
pub use state::{CompletionFn, ListState, SharedListState, Transaction};

// Targets
pub use target::{snapshot, MirrorError, MirrorOf, MirrorSection, MirrorTarget, PatchTarget};
