//! Error types for tola-sections.
//!
//! The pure pipeline surfaces a single error, [`ReconcileError::DuplicateIdentity`].
//! Index translation failures are recovered inside the reconciler; the
//! remaining variants belong to the [`ListState`](crate::ListState) lifecycle.

use std::fmt;

use thiserror::Error;

/// Which input sequence an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The previously committed sequence
    Old,
    /// The incoming sequence
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => f.write_str("old"),
            Self::New => f.write_str("new"),
        }
    }
}

/// Errors that can occur while reconciling or applying a patch plan.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Two elements of one sequence share an identity key
    #[error("duplicate identity {key} in {side} sequence at indices {first} and {second}")]
    DuplicateIdentity {
        /// Sequence containing the duplicate
        side: Side,
        /// Debug rendering of the offending key
        key: String,
        /// Index of the first occurrence
        first: usize,
        /// Index of the second occurrence
        second: usize,
    },

    /// A matched section points at an old index that does not exist
    #[error("slot {slot} maps to old section {from}, but only {len} old sections exist")]
    IndexTranslation {
        /// Reconciler slot being resolved
        slot: usize,
        /// Recorded old index
        from: usize,
        /// Number of old sections
        len: usize,
    },

    /// A structural transaction has not completed yet
    #[error("transaction {id} is still in flight")]
    TransactionInProgress {
        /// Id of the in-flight transaction
        id: u64,
    },

    /// `complete`/`abort` was called with a transaction that is not the pending one
    #[error("stale transaction: expected {expected}, found {found}")]
    StaleTransaction {
        /// Id of the pending transaction
        expected: u64,
        /// Id that was passed in
        found: u64,
    },

    /// `complete`/`abort` was called with nothing pending
    #[error("no transaction in flight")]
    NoTransaction,
}

/// Result type alias for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

impl ReconcileError {
    /// Create a duplicate identity error, rendering the key with `Debug`.
    pub fn duplicate(side: Side, key: &impl fmt::Debug, first: usize, second: usize) -> Self {
        Self::DuplicateIdentity {
            side,
            key: format!("{key:?}"),
            first,
            second,
        }
    }

    /// Whether this error reports a caller contract violation.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::DuplicateIdentity { .. })
    }
}
