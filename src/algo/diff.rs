//! Keyed sequence diff
//!
//! Computes the edit script between two ordered sequences of
//! [`Identifiable`] + [`ContentEq`] elements.
//! This is a **pure algorithm module**: no state, no positions to maintain.
//!
//! # Algorithm
//!
//! 1. Index both sides by identity key (duplicates are rejected)
//! 2. Run Myers LCS over the key sequences
//! 3. Matched keys inside the LCS are kept, matched keys outside it move,
//!    unmatched keys are inserted or deleted
//! 4. Every matched pair whose content differs is also replaced
//!
//! # Coordinates
//!
//! | Change | Index frame |
//! |--------|-------------|
//! | `Delete` | old |
//! | `Insert` | new |
//! | `Move` | old → new |
//! | `Replace` | new |
//!
//! # Complexity
//!
//! - Time: O((n + m) * d) where d is the edit distance
//! - Space: O(n + m) for the index maps, O(d * (n + m)) for the Myers trace

use std::ops::AddAssign;

use rustc_hash::FxHashMap;

use crate::config::DEFAULT_MAX_EDIT_DISTANCE;
use crate::element::{ContentEq, Identifiable};
use crate::error::{ReconcileError, ReconcileResult, Side};

use super::myers::lcs_pairs;

// =============================================================================
// Public Types
// =============================================================================

/// One atomic edit, borrowing the elements it describes.
#[derive(Debug)]
pub enum Change<'a, T> {
    /// `item` appears at `index` in the new sequence
    Insert { item: &'a T, index: usize },
    /// `item` at `index` in the old sequence is gone
    Delete { item: &'a T, index: usize },
    /// Matched pair whose content changed, addressed at its new `index`
    Replace { old: &'a T, new: &'a T, index: usize },
    /// Matched element whose relative order changed
    Move { item: &'a T, from: usize, to: usize },
}

impl<T> Clone for Change<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Change<'_, T> {}

impl<'a, T> Change<'a, T> {
    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    pub fn is_replace(&self) -> bool {
        matches!(self, Self::Replace { .. })
    }

    pub fn is_move(&self) -> bool {
        matches!(self, Self::Move { .. })
    }

    /// The element this change is about (the new side for replaces).
    pub fn item(&self) -> &'a T {
        match *self {
            Self::Insert { item, .. } | Self::Delete { item, .. } | Self::Move { item, .. } => item,
            Self::Replace { new, .. } => new,
        }
    }

    /// `(from, to)` for moves.
    pub fn move_indices(&self) -> Option<(usize, usize)> {
        match *self {
            Self::Move { from, to, .. } => Some((from, to)),
            _ => None,
        }
    }
}

/// An identity match between the two sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub old: usize,
    pub new: usize,
    /// Outside the LCS, so a `Move` was emitted
    pub moved: bool,
}

/// Statistics from diff computation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct DiffStats {
    pub kept: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub moved: usize,
    pub replaced: usize,
}

impl DiffStats {
    pub fn edit_count(&self) -> usize {
        self.inserted + self.deleted + self.moved + self.replaced
    }

    pub fn is_empty(&self) -> bool {
        self.edit_count() == 0
    }
}

impl AddAssign for DiffStats {
    fn add_assign(&mut self, rhs: Self) {
        self.kept += rhs.kept;
        self.inserted += rhs.inserted;
        self.deleted += rhs.deleted;
        self.moved += rhs.moved;
        self.replaced += rhs.replaced;
    }
}

/// Result of a sequence diff.
#[derive(Debug)]
pub struct SequenceDiff<'a, T> {
    /// Deletes (by old index), then inserts, moves and replaces (by new index)
    pub changes: Vec<Change<'a, T>>,
    /// Every identity match, ordered by new index
    pub matches: Vec<Match>,
    pub stats: DiffStats,
}

impl<T> Default for SequenceDiff<'_, T> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            matches: Vec::new(),
            stats: DiffStats::default(),
        }
    }
}

impl<'a, T> SequenceDiff<'a, T> {
    /// Check if any changes were detected
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Old index of the element now at `new_index`, if it was matched.
    pub fn old_index_of(&self, new_index: usize) -> Option<usize> {
        self.matches
            .binary_search_by_key(&new_index, |m| m.new)
            .ok()
            .map(|i| self.matches[i].old)
    }
}

// =============================================================================
// Main API
// =============================================================================

/// Diff two sequences by identity and content.
///
/// Fails only when a sequence contains the same identity key twice.
pub fn diff<'a, T>(old: &'a [T], new: &'a [T]) -> ReconcileResult<SequenceDiff<'a, T>>
where
    T: Identifiable + ContentEq,
{
    diff_with_limit(old, new, DEFAULT_MAX_EDIT_DISTANCE)
}

/// Diff two sequences with a custom Myers edit distance limit.
pub fn diff_with_limit<'a, T>(
    old: &'a [T],
    new: &'a [T],
    max_edit_distance: usize,
) -> ReconcileResult<SequenceDiff<'a, T>>
where
    T: Identifiable + ContentEq,
{
    let old_keys: Vec<T::Key> = old.iter().map(Identifiable::identity).collect();
    let new_keys: Vec<T::Key> = new.iter().map(Identifiable::identity).collect();

    let old_map = index_keys(&old_keys, Side::Old)?;
    let new_map = index_keys(&new_keys, Side::New)?;

    // Quick paths
    if old.is_empty() && new.is_empty() {
        return Ok(SequenceDiff::default());
    }

    if old.is_empty() {
        return Ok(SequenceDiff {
            changes: new
                .iter()
                .enumerate()
                .map(|(index, item)| Change::Insert { item, index })
                .collect(),
            matches: Vec::new(),
            stats: DiffStats {
                inserted: new.len(),
                ..Default::default()
            },
        });
    }

    if new.is_empty() {
        return Ok(SequenceDiff {
            changes: old
                .iter()
                .enumerate()
                .map(|(index, item)| Change::Delete { item, index })
                .collect(),
            matches: Vec::new(),
            stats: DiffStats {
                deleted: old.len(),
                ..Default::default()
            },
        });
    }

    let lcs = lcs_pairs(&old_keys, &new_keys, max_edit_distance);
    let mut in_lcs = vec![false; old.len()];
    for &(old_idx, _) in &lcs {
        in_lcs[old_idx] = true;
    }

    let mut stats = DiffStats::default();
    let mut deletes = Vec::new();
    let mut moves = Vec::new();
    let mut replaces = Vec::new();
    let mut matches = Vec::with_capacity(old.len().min(new.len()));

    for (old_idx, key) in old_keys.iter().enumerate() {
        let Some(&new_idx) = new_map.get(key) else {
            deletes.push(Change::Delete {
                item: &old[old_idx],
                index: old_idx,
            });
            stats.deleted += 1;
            continue;
        };

        let moved = !in_lcs[old_idx];
        if moved {
            moves.push(Change::Move {
                item: &new[new_idx],
                from: old_idx,
                to: new_idx,
            });
            stats.moved += 1;
        } else {
            stats.kept += 1;
        }

        if !old[old_idx].content_eq(&new[new_idx]) {
            replaces.push(Change::Replace {
                old: &old[old_idx],
                new: &new[new_idx],
                index: new_idx,
            });
            stats.replaced += 1;
        }

        matches.push(Match {
            old: old_idx,
            new: new_idx,
            moved,
        });
    }

    let inserts: Vec<_> = new_keys
        .iter()
        .enumerate()
        .filter(|(_, key)| !old_map.contains_key(key))
        .map(|(index, _)| Change::Insert {
            item: &new[index],
            index,
        })
        .collect();
    stats.inserted = inserts.len();

    // Sort for consistent ordering
    moves.sort_unstable_by_key(|c| c.move_indices().map(|(_, to)| to));
    replaces.sort_unstable_by_key(|c| match c {
        Change::Replace { index, .. } => *index,
        _ => 0,
    });
    matches.sort_unstable_by_key(|m| m.new);

    let mut changes = deletes;
    changes.reserve(inserts.len() + moves.len() + replaces.len());
    changes.extend(inserts);
    changes.extend(moves);
    changes.extend(replaces);

    Ok(SequenceDiff {
        changes,
        matches,
        stats,
    })
}

/// Map every key to its index, rejecting duplicates.
fn index_keys<K>(keys: &[K], side: Side) -> ReconcileResult<FxHashMap<&K, usize>>
where
    K: Eq + std::hash::Hash + std::fmt::Debug,
{
    let mut map = FxHashMap::with_capacity_and_hasher(keys.len(), Default::default());
    for (idx, key) in keys.iter().enumerate() {
        if let Some(first) = map.insert(key, idx) {
            return Err(ReconcileError::duplicate(side, key, first, idx));
        }
    }
    Ok(map)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Row {
        id: char,
        rev: u8,
    }

    impl Identifiable for Row {
        type Key = char;
        fn identity(&self) -> char {
            self.id
        }
    }

    impl ContentEq for Row {
        fn content_eq(&self, other: &Self) -> bool {
            self.rev == other.rev
        }
    }

    fn rows(ids: &str) -> Vec<Row> {
        ids.chars().map(|id| Row { id, rev: 0 }).collect()
    }

    fn count(diff: &SequenceDiff<'_, Row>, pred: impl Fn(&Change<'_, Row>) -> bool) -> usize {
        diff.changes.iter().filter(|c| pred(*c)).count()
    }

    #[test]
    fn test_empty_sequences() {
        let result = diff::<Row>(&[], &[]).unwrap();
        assert!(result.changes.is_empty());
        assert!(result.stats.is_empty());
    }

    #[test]
    fn test_identical_sequences() {
        let old = rows("abcd");
        let new = old.clone();
        let result = diff(&old, &new).unwrap();
        assert!(!result.has_changes());
        assert_eq!(result.stats.kept, 4);
        assert_eq!(result.matches.len(), 4);
    }

    #[test]
    fn test_insert_all() {
        let new = rows("abc");
        let result = diff(&[], &new).unwrap();
        assert_eq!(result.stats.inserted, 3);
        let indices: Vec<_> = result
            .changes
            .iter()
            .map(|c| match c {
                Change::Insert { index, .. } => *index,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_delete_all() {
        let old = rows("abc");
        let result = diff(&old, &[]).unwrap();
        assert_eq!(result.stats.deleted, 3);
        assert!(result.changes.iter().all(Change::is_delete));
    }

    #[test]
    fn test_shifted_elements_are_not_moves() {
        // x is deleted, y inserted; a and b shift but keep their order
        let old = rows("xab");
        let new = rows("aby");
        let result = diff(&old, &new).unwrap();
        assert_eq!(result.stats.kept, 2);
        assert_eq!(result.stats.moved, 0);
        assert!(matches!(result.changes[0], Change::Delete { index: 0, .. }));
        assert!(matches!(result.changes[1], Change::Insert { index: 2, .. }));
    }

    #[test]
    fn test_item_move_with_insert() {
        let old = rows("abc");
        let new = rows("acbd");
        let result = diff(&old, &new).unwrap();

        assert_eq!(count(&result, |c| c.is_delete()), 0);
        assert_eq!(count(&result, |c| c.is_replace()), 0);
        assert_eq!(count(&result, |c| c.is_move()), 1);

        let inserted: Vec<_> = result
            .changes
            .iter()
            .filter(|c| c.is_insert())
            .map(|c| c.item().id)
            .collect();
        assert_eq!(inserted, vec!['d']);

        let (from, to) = result
            .changes
            .iter()
            .find_map(Change::move_indices)
            .unwrap();
        let moved = result.changes.iter().find(|c| c.is_move()).unwrap().item().id;
        assert!(
            (moved == 'b' && (from, to) == (1, 2)) || (moved == 'c' && (from, to) == (2, 1)),
            "unexpected move {moved} {from}->{to}"
        );
    }

    #[test]
    fn test_replace_without_move() {
        let old = rows("abc");
        let mut new = rows("abc");
        new[1].rev = 1;

        let result = diff(&old, &new).unwrap();
        assert_eq!(result.changes.len(), 1);
        match result.changes[0] {
            Change::Replace { old, new, index } => {
                assert_eq!(index, 1);
                assert_eq!(old.rev, 0);
                assert_eq!(new.rev, 1);
            }
            ref other => panic!("expected replace, got {other:?}"),
        }
    }

    #[test]
    fn test_replace_and_move_are_independent() {
        let old = rows("ab");
        let mut new = rows("ba");
        new[0].rev = 7;
        new[1].rev = 7;

        let result = diff(&old, &new).unwrap();
        assert_eq!(result.stats.moved, 1);
        assert_eq!(result.stats.replaced, 2);
        // Replaces are addressed in the new frame
        let replaced: Vec<_> = result
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::Replace { index, new, .. } => Some((*index, new.id)),
                _ => None,
            })
            .collect();
        assert_eq!(replaced, vec![(0, 'b'), (1, 'a')]);
    }

    #[test]
    fn test_old_index_of() {
        let old = rows("abc");
        let new = rows("cza");
        let result = diff(&old, &new).unwrap();
        assert_eq!(result.old_index_of(0), Some(2));
        assert_eq!(result.old_index_of(1), None);
        assert_eq!(result.old_index_of(2), Some(0));
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let old = rows("abca");
        let err = diff(&old, &rows("abc")).unwrap_err();
        match err {
            ReconcileError::DuplicateIdentity {
                side,
                first,
                second,
                ..
            } => {
                assert_eq!(side, Side::Old);
                assert_eq!((first, second), (0, 3));
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = diff(&rows("ab"), &rows("bb")).unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateIdentity { side: Side::New, .. }));
    }

    #[test]
    fn test_duplicate_rejected_even_when_other_side_empty() {
        assert!(diff(&[], &rows("aa")).is_err());
    }

    #[test]
    fn test_limit_degrades_to_moves() {
        let old: Vec<Row> = "abcdefghijklmnop".chars().map(|id| Row { id, rev: 0 }).collect();
        let new: Vec<Row> = old.iter().rev().cloned().collect();
        let result = diff_with_limit(&old, &new, 1).unwrap();
        assert_eq!(result.stats.moved, old.len());
        assert_eq!(result.stats.inserted + result.stats.deleted, 0);
    }

    #[test]
    fn test_deterministic_output() {
        let old = rows("qwertyuiopasdf");
        let new = rows("wqtreyiuposadg");
        let a = diff(&old, &new).unwrap();
        let b = diff(&old, &new).unwrap();
        assert_eq!(a.matches, b.matches);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn test_stats_add_assign() {
        let mut total = DiffStats::default();
        total += DiffStats {
            kept: 1,
            moved: 2,
            ..Default::default()
        };
        total += DiffStats {
            inserted: 3,
            ..Default::default()
        };
        assert_eq!(total.edit_count(), 5);
        assert_eq!(total.kept, 1);
    }
}
