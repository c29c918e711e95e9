//! Patch plan builder
//!
//! Translates section and item changes into position-addressed [`PatchOp`]s,
//! split into two plans that must never be mixed:
//!
//! ```text
//! begin_batch ─► structural ops (delete / insert / move) ─► end_batch
//!                                                              │
//!                                                   commit signal
//!                                                              ▼
//!                                        replacement ops (reload section / item)
//! ```
//!
//! # Coordinates
//!
//! Structural ops follow batch-update rules: deletes and move sources are
//! addressed in the old frame, inserts and move targets in the new frame.
//! Replacement ops run after the batch commits, so they are always addressed
//! in the new frame.
//!
//! For an item change in slot `s`, the old section number is the slot's twin
//! and the new section number is its new index. They differ when the section
//! itself moved.
//!
//! # What is not emitted
//!
//! - Item ops of inserted sections (`InsertSection` already brings the rows)
//! - Item ops of trailing slots
//! - Item ops of degraded slots, which get one `ReloadSection` instead
//! - `ReloadItem` inside a section that is reloaded anyway

use std::fmt;

use rustc_hash::FxHashSet;

use crate::algo::Change;
use crate::config::ReconcileConfig;
use crate::element::Sectionable;
use crate::reconcile::{Reconciliation, SectionSlot};

// =============================================================================
// Public Types
// =============================================================================

/// Row address inside a sectioned list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPath {
    pub section: usize,
    pub row: usize,
}

impl IndexPath {
    #[inline]
    pub const fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.row)
    }
}

/// Position-addressed operation ready to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchOp {
    /// Remove section at old index
    DeleteSection(usize),
    /// Insert section at new index
    InsertSection(usize),
    /// Move section from old index to new index
    MoveSection { from: usize, to: usize },
    /// Reload section at new index
    ReloadSection(usize),
    /// Remove row at old path
    DeleteItem(IndexPath),
    /// Insert row at new path
    InsertItem(IndexPath),
    /// Move row from old path to new path
    MoveItem { from: IndexPath, to: IndexPath },
    /// Reload row at new path
    ReloadItem(IndexPath),
}

impl PatchOp {
    /// Belongs in the atomic batch.
    pub fn is_structural(&self) -> bool {
        !self.is_replacement()
    }

    /// Belongs after the batch commits.
    pub fn is_replacement(&self) -> bool {
        matches!(self, Self::ReloadSection(_) | Self::ReloadItem(_))
    }

    /// Addresses a whole section.
    pub fn is_section_op(&self) -> bool {
        matches!(
            self,
            Self::DeleteSection(_) | Self::InsertSection(_) | Self::MoveSection { .. } | Self::ReloadSection(_)
        )
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteSection(i) => write!(f, "delete section {i}"),
            Self::InsertSection(i) => write!(f, "insert section {i}"),
            Self::MoveSection { from, to } => write!(f, "move section {from} -> {to}"),
            Self::ReloadSection(i) => write!(f, "reload section {i}"),
            Self::DeleteItem(path) => write!(f, "delete item {path}"),
            Self::InsertItem(path) => write!(f, "insert item {path}"),
            Self::MoveItem { from, to } => write!(f, "move item {from} -> {to}"),
            Self::ReloadItem(path) => write!(f, "reload item {path}"),
        }
    }
}

/// The two-phase patch plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct PatchPlan {
    /// Applied as one atomic transaction
    pub structural: Vec<PatchOp>,
    /// Applied after the transaction commits
    pub replacement: Vec<PatchOp>,
    /// Skip the ops and reload the whole target
    pub full_reload: bool,
    /// Reason for reload (if full_reload is true)
    pub reload_reason: Option<String>,
}

impl PatchPlan {
    /// Create a plan that reloads everything.
    pub fn reload(reason: impl Into<String>) -> Self {
        Self {
            structural: Vec::new(),
            replacement: Vec::new(),
            full_reload: true,
            reload_reason: Some(reason.into()),
        }
    }

    /// Nothing to apply; the caller skips the transaction.
    pub fn is_empty(&self) -> bool {
        !self.full_reload && self.structural.is_empty() && self.replacement.is_empty()
    }

    /// Check if any changes were detected
    pub fn has_changes(&self) -> bool {
        !self.is_empty()
    }

    /// Total number of ops in both phases.
    pub fn op_count(&self) -> usize {
        self.structural.len() + self.replacement.len()
    }

    /// Build the plan for a reconciliation, applying the config's op limit.
    pub fn from_reconciliation<S: Sectionable>(
        reconciliation: &Reconciliation<'_, S>,
        config: &ReconcileConfig,
    ) -> Self {
        if reconciliation.full_reload {
            return Self::reload("reconciler took the full reload path");
        }

        let plan = build(
            &reconciliation.section_changes,
            &reconciliation.item_changes,
            &reconciliation.section_index_map,
        );

        if plan.op_count() > config.max_ops {
            tracing::warn!(
                ops = plan.op_count(),
                max_ops = config.max_ops,
                "patch plan exceeds op limit, falling back to full reload"
            );
            return Self::reload(format!(
                "{} ops exceed limit of {}",
                plan.op_count(),
                config.max_ops
            ));
        }

        tracing::debug!(
            structural = plan.structural.len(),
            replacement = plan.replacement.len(),
            "built patch plan"
        );
        plan
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Translate changes into a [`PatchPlan`].
///
/// `item_changes[s]` is governed by `section_index_map[s]`; the two slices
/// must be parallel. Replace changes only ever land in `replacement`.
pub fn build<'a, S, I, C>(
    section_changes: &[Change<'a, S>],
    item_changes: &[C],
    section_index_map: &[SectionSlot],
) -> PatchPlan
where
    I: 'a,
    C: AsRef<[Change<'a, I>]>,
{
    let mut section_deletes = Vec::new();
    let mut section_inserts = Vec::new();
    let mut section_moves = Vec::new();
    let mut reloaded: FxHashSet<usize> = FxHashSet::default();
    let mut replacement = Vec::new();

    for change in section_changes {
        match *change {
            Change::Delete { index, .. } => section_deletes.push(PatchOp::DeleteSection(index)),
            Change::Insert { index, .. } => section_inserts.push(PatchOp::InsertSection(index)),
            Change::Move { from, to, .. } => section_moves.push(PatchOp::MoveSection { from, to }),
            Change::Replace { index, .. } => {
                if reloaded.insert(index) {
                    replacement.push(PatchOp::ReloadSection(index));
                }
            }
        }
    }

    for slot in section_index_map.iter().filter(|slot| slot.degraded) {
        if reloaded.insert(slot.section) {
            replacement.push(PatchOp::ReloadSection(slot.section));
        }
    }

    let mut item_deletes = Vec::new();
    let mut item_inserts = Vec::new();
    let mut item_moves = Vec::new();

    for (changes, slot) in item_changes.iter().zip(section_index_map) {
        let (Some(old_section), Some(new_section)) = (slot.old, slot.new) else {
            continue;
        };
        if slot.degraded {
            continue;
        }

        for change in changes.as_ref() {
            match *change {
                Change::Delete { index, .. } => {
                    item_deletes.push(PatchOp::DeleteItem(IndexPath::new(old_section, index)));
                }
                Change::Insert { index, .. } => {
                    item_inserts.push(PatchOp::InsertItem(IndexPath::new(new_section, index)));
                }
                Change::Move { from, to, .. } => item_moves.push(PatchOp::MoveItem {
                    from: IndexPath::new(old_section, from),
                    to: IndexPath::new(new_section, to),
                }),
                Change::Replace { index, .. } => {
                    if !reloaded.contains(&new_section) {
                        replacement.push(PatchOp::ReloadItem(IndexPath::new(new_section, index)));
                    }
                }
            }
        }
    }

    let mut structural = section_deletes;
    structural.extend(section_inserts);
    structural.extend(section_moves);
    structural.extend(item_deletes);
    structural.extend(item_inserts);
    structural.extend(item_moves);

    PatchPlan {
        structural,
        replacement,
        full_reload: false,
        reload_reason: None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ContentEq, Identifiable, Section};
    use crate::reconcile::reconcile;

    #[derive(Debug, Clone)]
    struct Row {
        id: u32,
        rev: u32,
    }

    impl Identifiable for Row {
        type Key = u32;
        fn identity(&self) -> u32 {
            self.id
        }
    }

    impl ContentEq for Row {
        fn content_eq(&self, other: &Self) -> bool {
            self.rev == other.rev
        }
    }

    fn section(id: char, rows: &[u32]) -> Section<char, Row> {
        Section::new(id, rows.iter().map(|&id| Row { id, rev: 0 }).collect())
    }

    fn plan_for(old: &[Section<char, Row>], new: &[Section<char, Row>]) -> PatchPlan {
        let result = reconcile(old, new).unwrap();
        PatchPlan::from_reconciliation(&result, &ReconcileConfig::default())
    }

    #[test]
    fn test_identical_input_is_empty_plan() {
        let sections = vec![section('a', &[1, 2]), section('b', &[3])];
        let plan = plan_for(&sections, &sections);
        assert!(plan.is_empty());
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_empty_old_is_full_reload() {
        let plan = plan_for(&[], &[section('a', &[1])]);
        assert!(plan.full_reload);
        assert!(plan.reload_reason.is_some());
        assert!(plan.has_changes());
        assert_eq!(plan.op_count(), 0);
    }

    #[test]
    fn test_section_ops() {
        let old = vec![section('a', &[]), section('b', &[]), section('c', &[])];
        let new = vec![section('c', &[]), section('a', &[]), section('n', &[])];
        let plan = plan_for(&old, &new);

        assert!(plan.structural.contains(&PatchOp::DeleteSection(1)));
        assert!(plan.structural.contains(&PatchOp::InsertSection(2)));
        assert_eq!(
            plan.structural.iter().filter(|op| matches!(op, PatchOp::MoveSection { .. })).count(),
            1
        );
        assert!(plan.replacement.is_empty());
    }

    #[test]
    fn test_item_ops_use_old_and_new_section_numbers() {
        // b moves from 1 to 0; inside it, 5 is deleted and 6 inserted
        let old = vec![section('a', &[1]), section('b', &[4, 5])];
        let new = vec![section('b', &[4, 6]), section('a', &[1])];
        let plan = plan_for(&old, &new);

        assert!(plan.structural.contains(&PatchOp::DeleteItem(IndexPath::new(1, 1))));
        assert!(plan.structural.contains(&PatchOp::InsertItem(IndexPath::new(0, 1))));
    }

    #[test]
    fn test_item_move_paths() {
        let old = vec![section('x', &[]), section('s', &[1, 2, 3])];
        let new = vec![section('s', &[1, 3, 2])];
        let plan = plan_for(&old, &new);

        let item_move = plan
            .structural
            .iter()
            .find_map(|op| match op {
                PatchOp::MoveItem { from, to } => Some((*from, *to)),
                _ => None,
            })
            .unwrap();
        assert_eq!(item_move.0.section, 1);
        assert_eq!(item_move.1.section, 0);
    }

    #[test]
    fn test_replacements_never_structural() {
        let old = vec![section('a', &[1, 2]).with_title("A"), section('b', &[3])];
        let mut new = vec![section('b', &[3, 9]), section('a', &[2, 1])];
        new[0].items[0].rev = 1;
        new[1].items[1].rev = 1;
        let plan = plan_for(&old, &new);

        assert!(plan.structural.iter().all(PatchOp::is_structural));
        assert!(plan.replacement.iter().all(PatchOp::is_replacement));
        // a lost its title: whole section reload, no item reloads inside it
        assert!(plan.replacement.contains(&PatchOp::ReloadSection(1)));
        assert!(!plan.replacement.iter().any(|op| matches!(op, PatchOp::ReloadItem(p) if p.section == 1)));
        // b's row 3 changed content at new path [0, 0]
        assert!(plan.replacement.contains(&PatchOp::ReloadItem(IndexPath::new(0, 0))));
    }

    #[test]
    fn test_inserted_section_has_no_item_ops() {
        let old = vec![section('a', &[1])];
        let new = vec![section('a', &[1]), section('n', &[2, 3])];
        let plan = plan_for(&old, &new);
        assert_eq!(plan.structural, vec![PatchOp::InsertSection(1)]);
    }

    #[test]
    fn test_degraded_slot_reloads_section() {
        let new = [section('a', &[1, 2])];
        let item_changes = vec![vec![Change::Insert {
            item: &new[0].items[1],
            index: 1,
        }]];
        let slots = [SectionSlot {
            section: 0,
            old: None,
            new: Some(0),
            degraded: true,
        }];
        let plan = build::<Section<char, Row>, Row, _>(&[], &item_changes, &slots);

        assert!(plan.structural.is_empty());
        assert_eq!(plan.replacement, vec![PatchOp::ReloadSection(0)]);
    }

    #[test]
    fn test_op_limit_falls_back_to_reload() {
        let old = vec![section('a', &[1, 2, 3, 4])];
        let new = vec![section('a', &[4, 3, 2, 1, 5, 6])];
        let result = reconcile(&old, &new).unwrap();
        let plan = PatchPlan::from_reconciliation(&result, &ReconcileConfig::new(512, 2));

        assert!(plan.full_reload);
        assert!(plan.reload_reason.unwrap().contains("exceed"));
    }

    #[test]
    fn test_display() {
        assert_eq!(PatchOp::MoveSection { from: 1, to: 0 }.to_string(), "move section 1 -> 0");
        assert_eq!(
            PatchOp::ReloadItem(IndexPath::new(2, 5)).to_string(),
            "reload item [2, 5]"
        );
        assert!(PatchOp::ReloadSection(0).is_section_op());
        assert!(!PatchOp::InsertItem(IndexPath::new(0, 0)).is_section_op());
    }
}
