//! Section reconciler
//!
//! Runs the sequence diff twice: once over the sections, then once per
//! section over its items.
//!
//! # Re-targeting
//!
//! A section's new items are diffed against the items of its *twin*: the old
//! section with the same identity. The twin is found through the section
//! diff's identity matches, so it is correct for moved sections, for sections
//! whose raw index shifted because something before them was inserted or
//! deleted, and for sections that were both replaced and moved.
//!
//! ```text
//! old: [A(1,2,3), B(1,2,3)]        new: [B(1,2,3), A(1,2,3)]
//!
//! slot 0 ── B ── twin old[1] ── diff B.items vs B.items = []
//! slot 1 ── A ── twin old[0] ── diff A.items vs A.items = []
//! ```
//!
//! Diffing by raw position instead would pair A with B and report a
//! maximal edit script for both.
//!
//! # Slots
//!
//! The output has one slot per index in `0..max(old.len(), new.len())`.
//! Slot `i < new.len()` describes new section `i`; later slots are trailing
//! and never carry item changes.

use smallvec::SmallVec;

use crate::algo::{diff_with_limit, Change, DiffStats};
use crate::config::{ReconcileConfig, Strategy};
use crate::element::Sectionable;
use crate::error::{ReconcileError, ReconcileResult};

/// Item changes of one slot. Most sections see only a few edits.
pub type ItemChanges<'a, T> = SmallVec<[Change<'a, T>; 4]>;

// =============================================================================
// Public Types
// =============================================================================

/// Index bookkeeping for one reconciler slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionSlot {
    /// Governing section number: the new index, or the slot index for
    /// trailing slots
    pub section: usize,
    /// Index of the old twin whose items were diffed against
    pub old: Option<usize>,
    /// Index in the new sequence; `None` for trailing slots
    pub new: Option<usize>,
    /// Twin lookup failed; the section is reloaded as a whole
    pub degraded: bool,
}

impl SectionSlot {
    fn matched(old: usize, new: usize) -> Self {
        Self {
            section: new,
            old: Some(old),
            new: Some(new),
            degraded: false,
        }
    }

    fn inserted(new: usize) -> Self {
        Self {
            section: new,
            old: None,
            new: Some(new),
            degraded: false,
        }
    }

    fn degraded(new: usize) -> Self {
        Self {
            degraded: true,
            ..Self::inserted(new)
        }
    }

    /// `old` is set only when old section `slot` was deleted.
    fn trailing(slot: usize, deleted: bool) -> Self {
        Self {
            section: slot,
            old: deleted.then_some(slot),
            new: None,
            degraded: false,
        }
    }

    /// New section with no old twin.
    pub fn is_inserted(&self) -> bool {
        self.new.is_some() && self.old.is_none() && !self.degraded
    }

    /// Slot past the end of the new sequence.
    pub fn is_trailing(&self) -> bool {
        self.new.is_none()
    }
}

/// Statistics from a reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct ReconcileStats {
    /// Section-level diff
    pub sections: DiffStats,
    /// Item-level diffs, summed over all slots
    pub items: DiffStats,
    /// Slots that fell back to a full section reload
    pub degraded: usize,
}

/// Output of [`reconcile`].
///
/// `item_changes` and `section_index_map` are parallel: entry `s` of one
/// describes the same slot as entry `s` of the other.
#[derive(Debug)]
pub struct Reconciliation<'a, S: Sectionable> {
    pub section_changes: Vec<Change<'a, S>>,
    pub item_changes: Vec<ItemChanges<'a, S::Item>>,
    pub section_index_map: Vec<SectionSlot>,
    /// Fast path taken: nothing was diffed and the target should reload
    pub full_reload: bool,
    pub stats: ReconcileStats,
}

impl<S: Sectionable> Reconciliation<'_, S> {
    /// Number of slots (`max(old.len(), new.len())`).
    pub fn slot_count(&self) -> usize {
        self.section_index_map.len()
    }

    /// Check if nothing changed at either level.
    pub fn is_noop(&self) -> bool {
        !self.full_reload
            && self.section_changes.is_empty()
            && self.item_changes.iter().all(|changes| changes.is_empty())
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Reconcile two section lists with the default configuration.
pub fn reconcile<'a, S: Sectionable>(
    old: &'a [S],
    new: &'a [S],
) -> ReconcileResult<Reconciliation<'a, S>> {
    reconcile_with_config(old, new, &ReconcileConfig::default())
}

/// Reconcile two section lists.
///
/// An empty `old` (or [`Strategy::Reload`]) takes the fast path: nothing is
/// diffed and every new section and item is reported as inserted. Two empty
/// lists under [`Strategy::Diff`] are a no-op, not a reload.
pub fn reconcile_with_config<'a, S: Sectionable>(
    old: &'a [S],
    new: &'a [S],
    config: &ReconcileConfig,
) -> ReconcileResult<Reconciliation<'a, S>> {
    if old.is_empty() && new.is_empty() && config.strategy == Strategy::Diff {
        return Ok(Reconciliation {
            section_changes: Vec::new(),
            item_changes: Vec::new(),
            section_index_map: Vec::new(),
            full_reload: false,
            stats: ReconcileStats::default(),
        });
    }

    if old.is_empty() || config.strategy == Strategy::Reload {
        tracing::debug!(
            old = old.len(),
            new = new.len(),
            strategy = ?config.strategy,
            "skipping diff, full reload"
        );
        return Ok(reload_everything(old, new));
    }

    let sections = diff_with_limit(old, new, config.max_edit_distance)?;

    let mut deleted = vec![false; old.len()];
    for change in &sections.changes {
        if let Change::Delete { index, .. } = change {
            deleted[*index] = true;
        }
    }

    let slot_count = old.len().max(new.len());
    let mut item_changes = Vec::with_capacity(slot_count);
    let mut section_index_map = Vec::with_capacity(slot_count);
    let mut stats = ReconcileStats {
        sections: sections.stats,
        ..Default::default()
    };

    for slot in 0..slot_count {
        let Some(new_section) = new.get(slot) else {
            item_changes.push(ItemChanges::new());
            section_index_map.push(SectionSlot::trailing(slot, deleted[slot]));
            continue;
        };

        let (old_items, entry) = match resolve_twin(sections.old_index_of(slot), slot, old.len()) {
            Ok(Some(twin)) => (old[twin].items(), SectionSlot::matched(twin, slot)),
            Ok(None) => (&[][..], SectionSlot::inserted(slot)),
            Err(err) => {
                tracing::warn!(%err, "falling back to a full reload of the section");
                stats.degraded += 1;
                (&[][..], SectionSlot::degraded(slot))
            }
        };

        let items = diff_with_limit(old_items, new_section.items(), config.max_edit_distance)?;
        tracing::trace!(
            slot,
            twin = ?entry.old,
            changes = items.changes.len(),
            "diffed section items"
        );

        stats.items += items.stats;
        item_changes.push(items.changes.into_iter().collect());
        section_index_map.push(entry);
    }

    tracing::debug!(
        slots = slot_count,
        section_edits = stats.sections.edit_count(),
        item_edits = stats.items.edit_count(),
        degraded = stats.degraded,
        "reconciled sections"
    );

    Ok(Reconciliation {
        section_changes: sections.changes,
        item_changes,
        section_index_map,
        full_reload: false,
        stats,
    })
}

/// Check a twin index against the old length.
fn resolve_twin(twin: Option<usize>, slot: usize, len: usize) -> ReconcileResult<Option<usize>> {
    match twin {
        Some(from) if from >= len => Err(ReconcileError::IndexTranslation { slot, from, len }),
        twin => Ok(twin),
    }
}

/// Fast path: delete everything old, insert everything new, diff nothing.
fn reload_everything<'a, S: Sectionable>(old: &'a [S], new: &'a [S]) -> Reconciliation<'a, S> {
    let mut section_changes: Vec<_> = old
        .iter()
        .enumerate()
        .map(|(index, item)| Change::Delete { item, index })
        .collect();
    section_changes.extend(
        new.iter()
            .enumerate()
            .map(|(index, item)| Change::Insert { item, index }),
    );

    let mut stats = ReconcileStats {
        sections: DiffStats {
            deleted: old.len(),
            inserted: new.len(),
            ..Default::default()
        },
        ..Default::default()
    };

    let slot_count = old.len().max(new.len());
    let mut item_changes = Vec::with_capacity(slot_count);
    let mut section_index_map = Vec::with_capacity(slot_count);

    for slot in 0..slot_count {
        match new.get(slot) {
            Some(section) => {
                let changes: ItemChanges<'a, S::Item> = section
                    .items()
                    .iter()
                    .enumerate()
                    .map(|(index, item)| Change::Insert { item, index })
                    .collect();
                stats.items.inserted += changes.len();
                item_changes.push(changes);
                section_index_map.push(SectionSlot::inserted(slot));
            }
            None => {
                item_changes.push(ItemChanges::new());
                section_index_map.push(SectionSlot::trailing(slot, true));
            }
        }
    }

    Reconciliation {
        section_changes,
        item_changes,
        section_index_map,
        full_reload: true,
        stats,
    }
}

// =============================================================================
// Tests
// =============================================================================
