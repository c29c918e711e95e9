//! Algorithm implementations for sequence reconciliation.
//!
//! - `diff`: keyed sequence diff producing insert/delete/move/replace changes
//! - `myers`: Myers diff algorithm for efficient LCS

mod diff;
mod myers;

pub use diff::{diff, diff_with_limit, Change, DiffStats, Match, SequenceDiff};
pub use myers::lcs_pairs;
