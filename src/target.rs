//! Patch targets
//!
//! [`PatchTarget`] is the boundary to whatever owns the positionally indexed
//! view: a table widget, a terminal list, a remote client. The engine never
//! mutates anything itself; it hands ops to a target in two phases.
//!
//! [`MirrorTarget`] is an in-memory target that keeps only identity keys. It
//! applies each batch the way batch-update APIs do, and checks the result
//! against the data source, so an inconsistent plan is caught instead of
//! silently corrupting the mirror.
//!
//! # Batch semantics
//!
//! Within one batch, every op refers to a single fixed "before" state:
//!
//! 1. Deletes and move sources free old positions
//! 2. Inserts and move targets claim new positions
//! 3. Untouched old elements fill the remaining positions in their old order
//!
//! The same three steps run for sections, then for rows inside each
//! surviving section.

use std::fmt;

use thiserror::Error;

use crate::element::{Identifiable, Sectionable};
use crate::plan::PatchOp;

// =============================================================================
// PatchTarget
// =============================================================================

/// The stateful view a [`PatchPlan`](crate::PatchPlan) is applied to.
///
/// Calls always arrive in this order for one transaction:
/// `begin_batch`, `apply_structural`*, `end_batch`, then, once the owner has
/// seen the batch commit, `apply_replacement`*. A full reload replaces the
/// whole sequence with a single `reload_all`.
pub trait PatchTarget {
    /// Drop the current contents and re-read everything.
    fn reload_all(&mut self);

    /// Open an atomic batch.
    fn begin_batch(&mut self);

    /// Record one structural op in the open batch.
    fn apply_structural(&mut self, op: PatchOp);

    /// Close the batch. The commit may finish asynchronously.
    fn end_batch(&mut self);

    /// Apply one replacement op outside any batch.
    fn apply_replacement(&mut self, op: PatchOp);
}

impl<T: PatchTarget + ?Sized> PatchTarget for &mut T {
    fn reload_all(&mut self) {
        (**self).reload_all();
    }

    fn begin_batch(&mut self) {
        (**self).begin_batch();
    }

    fn apply_structural(&mut self, op: PatchOp) {
        (**self).apply_structural(op);
    }

    fn end_batch(&mut self) {
        (**self).end_batch();
    }

    fn apply_replacement(&mut self, op: PatchOp) {
        (**self).apply_replacement(op);
    }
}

// =============================================================================
// Mirror
// =============================================================================

/// Errors detected by [`MirrorTarget`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("{op} issued outside a batch")]
    OutsideBatch { op: PatchOp },

    #[error("end_batch without begin_batch")]
    NoBatch,

    #[error("begin_batch while a batch is open")]
    NestedBatch,

    #[error("{op} issued inside a batch")]
    ReplacementDuringBatch { op: PatchOp },

    #[error("{op} is not a {expected} op")]
    WrongPhase { op: PatchOp, expected: &'static str },

    #[error("{op} addresses a section outside 0..{len}")]
    SectionOutOfRange { op: PatchOp, len: usize },

    #[error("{op} addresses a row outside 0..{len}")]
    RowOutOfRange { op: PatchOp, len: usize },

    #[error("{op} claims a position already claimed in this batch")]
    SlotConflict { op: PatchOp },

    #[error("{op} addresses rows of a section that is inserted or deleted in the same batch")]
    DetachedSection { op: PatchOp },

    #[error("count mismatch{}: expected {expected}, found {found}", section_suffix(*section))]
    CountMismatch {
        section: Option<usize>,
        expected: usize,
        found: usize,
    },

    #[error("mirror diverged from source at section {section}{}", row_suffix(*row))]
    Diverged { section: usize, row: Option<usize> },

    #[error("{op} targets a different element than the source holds there")]
    IdentityMismatch { op: PatchOp },
}

fn section_suffix(section: Option<usize>) -> String {
    section.map(|s| format!(" in section {s}")).unwrap_or_default()
}

fn row_suffix(row: Option<usize>) -> String {
    row.map(|r| format!(", row {r}")).unwrap_or_default()
}

/// Key-only copy of one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSection<SK, IK> {
    pub key: SK,
    pub rows: Vec<IK>,
}

/// Mirror section type for a [`Sectionable`].
pub type MirrorOf<S> =
    MirrorSection<<S as Identifiable>::Key, <<S as Sectionable>::Item as Identifiable>::Key>;

/// Project sections down to their identity keys.
pub fn snapshot<S: Sectionable>(sections: &[S]) -> Vec<MirrorOf<S>> {
    sections
        .iter()
        .map(|section| MirrorSection {
            key: section.identity(),
            rows: section.items().iter().map(Identifiable::identity).collect(),
        })
        .collect()
}

/// In-memory [`PatchTarget`] over identity keys.
///
/// `source` plays the data source: inserted and reloaded positions read from
/// it, and every committed batch must reproduce it exactly. Errors are
/// recorded rather than panicking; the first one is kept for
/// [`take_error`](Self::take_error).
#[derive(Debug, Clone)]
pub struct MirrorTarget<SK, IK> {
    committed: Vec<MirrorSection<SK, IK>>,
    source: Vec<MirrorSection<SK, IK>>,
    batch: Option<Vec<PatchOp>>,
    last_batch: Vec<PatchOp>,
    replaced: Vec<PatchOp>,
    batches: usize,
    reloads: usize,
    error: Option<MirrorError>,
}

impl<SK, IK> MirrorTarget<SK, IK>
where
    SK: Clone + Eq + fmt::Debug,
    IK: Clone + Eq + fmt::Debug,
{
    /// Create a mirror whose committed state and source are both `committed`.
    pub fn new(committed: Vec<MirrorSection<SK, IK>>) -> Self {
        Self {
            source: committed.clone(),
            committed,
            batch: None,
            last_batch: Vec::new(),
            replaced: Vec::new(),
            batches: 0,
            reloads: 0,
            error: None,
        }
    }

    /// Replace what the data source reports.
    pub fn set_source(&mut self, source: Vec<MirrorSection<SK, IK>>) {
        self.source = source;
    }

    /// The state after the last committed batch or reload.
    pub fn committed(&self) -> &[MirrorSection<SK, IK>] {
        &self.committed
    }

    /// Structural ops of the last closed batch.
    pub fn last_batch(&self) -> &[PatchOp] {
        &self.last_batch
    }

    /// Replacement ops applied so far.
    pub fn replaced(&self) -> &[PatchOp] {
        &self.replaced
    }

    /// Number of committed batches.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Number of full reloads.
    pub fn reloads(&self) -> usize {
        self.reloads
    }

    /// Whether a batch is open.
    pub fn in_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Take the first recorded error.
    pub fn take_error(&mut self) -> Option<MirrorError> {
        self.error.take()
    }

    fn fail(&mut self, err: MirrorError) {
        tracing::warn!(%err, "mirror rejected op");
        self.error.get_or_insert(err);
    }

    fn reload_section(&mut self, index: usize, op: PatchOp) -> Result<(), MirrorError> {
        let len = self.committed.len();
        let (Some(current), Some(fresh)) = (self.committed.get(index), self.source.get(index)) else {
            return Err(MirrorError::SectionOutOfRange { op, len });
        };
        if current.key != fresh.key {
            return Err(MirrorError::IdentityMismatch { op });
        }
        self.committed[index] = fresh.clone();
        Ok(())
    }

    fn reload_row(&mut self, section: usize, row: usize, op: PatchOp) -> Result<(), MirrorError> {
        let len = self.committed.len();
        let (Some(current), Some(fresh)) = (self.committed.get(section), self.source.get(section)) else {
            return Err(MirrorError::SectionOutOfRange { op, len });
        };
        let (Some(current_row), Some(fresh_row)) = (current.rows.get(row), fresh.rows.get(row)) else {
            return Err(MirrorError::RowOutOfRange {
                op,
                len: current.rows.len(),
            });
        };
        if current_row != fresh_row {
            return Err(MirrorError::IdentityMismatch { op });
        }
        Ok(())
    }
}

impl<SK, IK> PatchTarget for MirrorTarget<SK, IK>
where
    SK: Clone + Eq + fmt::Debug,
    IK: Clone + Eq + fmt::Debug,
{
    fn reload_all(&mut self) {
        if self.batch.is_some() {
            self.fail(MirrorError::NestedBatch);
            return;
        }
        self.committed = self.source.clone();
        self.reloads += 1;
    }

    fn begin_batch(&mut self) {
        if self.batch.is_some() {
            self.fail(MirrorError::NestedBatch);
            return;
        }
        self.batch = Some(Vec::new());
    }

    fn apply_structural(&mut self, op: PatchOp) {
        if op.is_replacement() {
            self.fail(MirrorError::WrongPhase {
                op,
                expected: "structural",
            });
            return;
        }
        match &mut self.batch {
            Some(batch) => batch.push(op),
            None => self.fail(MirrorError::OutsideBatch { op }),
        }
    }

    fn end_batch(&mut self) {
        let Some(ops) = self.batch.take() else {
            self.fail(MirrorError::NoBatch);
            return;
        };
        match apply_batch(&self.committed, &self.source, &ops) {
            Ok(next) => {
                self.committed = next;
                self.batches += 1;
            }
            Err(err) => self.fail(err),
        }
        self.last_batch = ops;
    }

    fn apply_replacement(&mut self, op: PatchOp) {
        if self.batch.is_some() {
            self.fail(MirrorError::ReplacementDuringBatch { op });
            return;
        }
        let result = match op {
            PatchOp::ReloadSection(index) => self.reload_section(index, op),
            PatchOp::ReloadItem(path) => self.reload_row(path.section, path.row, op),
            _ => Err(MirrorError::WrongPhase {
                op,
                expected: "replacement",
            }),
        };
        match result {
            Ok(()) => self.replaced.push(op),
            Err(err) => self.fail(err),
        }
    }
}

// =============================================================================
// Batch application
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Old(usize),
    Inserted,
}

#[derive(Debug, Clone, Copy)]
enum RowOrigin {
    Old { section: usize, row: usize },
    Inserted,
}

/// Mark `index` as taken, rejecting out-of-range and double claims.
fn claim(taken: &mut [bool], index: usize, op: PatchOp, section_level: bool) -> Result<(), MirrorError> {
    let len = taken.len();
    match taken.get_mut(index) {
        None if section_level => Err(MirrorError::SectionOutOfRange { op, len }),
        None => Err(MirrorError::RowOutOfRange { op, len }),
        Some(true) => Err(MirrorError::SlotConflict { op }),
        Some(slot) => {
            *slot = true;
            Ok(())
        }
    }
}

/// Apply one batch to `old`, reading inserted content from `source`.
fn apply_batch<SK, IK>(
    old: &[MirrorSection<SK, IK>],
    source: &[MirrorSection<SK, IK>],
    ops: &[PatchOp],
) -> Result<Vec<MirrorSection<SK, IK>>, MirrorError>
where
    SK: Clone + Eq,
    IK: Clone + Eq,
{
    // Sections
    let mut taken = vec![false; old.len()];
    let mut deleted = vec![false; old.len()];
    let mut placed: Vec<(usize, Origin, PatchOp)> = Vec::new();

    for &op in ops {
        match op {
            PatchOp::DeleteSection(index) => {
                claim(&mut taken, index, op, true)?;
                deleted[index] = true;
            }
            PatchOp::MoveSection { from, to } => {
                claim(&mut taken, from, op, true)?;
                placed.push((to, Origin::Old(from), op));
            }
            PatchOp::InsertSection(index) => placed.push((index, Origin::Inserted, op)),
            _ => {}
        }
    }

    let new_len = taken.iter().filter(|t| !**t).count() + placed.len();
    if new_len != source.len() {
        return Err(MirrorError::CountMismatch {
            section: None,
            expected: source.len(),
            found: new_len,
        });
    }

    let mut slots: Vec<Option<Origin>> = vec![None; new_len];
    for &(to, origin, op) in &placed {
        match slots.get_mut(to) {
            None => return Err(MirrorError::SectionOutOfRange { op, len: new_len }),
            Some(Some(_)) => return Err(MirrorError::SlotConflict { op }),
            Some(slot) => *slot = Some(origin),
        }
    }
    let mut untouched = (0..old.len()).filter(|&i| !taken[i]).map(Origin::Old);
    let origins: Vec<Origin> = slots
        .into_iter()
        .map(|slot| slot.or_else(|| untouched.next()))
        .collect::<Option<_>>()
        .ok_or(MirrorError::CountMismatch {
            section: None,
            expected: new_len,
            found: old.len(),
        })?;

    // Rows
    let live_old = |section: usize, op: PatchOp| match deleted.get(section) {
        None => Err(MirrorError::SectionOutOfRange { op, len: old.len() }),
        Some(true) => Err(MirrorError::DetachedSection { op }),
        Some(false) => Ok(()),
    };
    let live_new = |section: usize, op: PatchOp| match origins.get(section) {
        None => Err(MirrorError::SectionOutOfRange { op, len: new_len }),
        Some(Origin::Inserted) => Err(MirrorError::DetachedSection { op }),
        Some(Origin::Old(_)) => Ok(()),
    };

    let mut taken_rows: Vec<Vec<bool>> = old.iter().map(|s| vec![false; s.rows.len()]).collect();
    let mut placed_rows: Vec<Vec<(usize, RowOrigin, PatchOp)>> = vec![Vec::new(); new_len];

    for &op in ops {
        match op {
            PatchOp::DeleteItem(path) => {
                live_old(path.section, op)?;
                claim(&mut taken_rows[path.section], path.row, op, false)?;
            }
            PatchOp::InsertItem(path) => {
                live_new(path.section, op)?;
                placed_rows[path.section].push((path.row, RowOrigin::Inserted, op));
            }
            PatchOp::MoveItem { from, to } => {
                live_old(from.section, op)?;
                claim(&mut taken_rows[from.section], from.row, op, false)?;
                live_new(to.section, op)?;
                let origin = RowOrigin::Old {
                    section: from.section,
                    row: from.row,
                };
                placed_rows[to.section].push((to.row, origin, op));
            }
            _ => {}
        }
    }

    let mut next = Vec::with_capacity(new_len);
    for (index, origin) in origins.iter().enumerate() {
        let Origin::Old(twin) = *origin else {
            next.push(source[index].clone());
            continue;
        };

        let kept = taken_rows[twin].iter().filter(|t| !**t).count();
        let count = kept + placed_rows[index].len();
        let mut rows: Vec<Option<IK>> = vec![None; count];

        for &(row, row_origin, op) in &placed_rows[index] {
            let key = match row_origin {
                RowOrigin::Old { section, row } => old[section].rows[row].clone(),
                RowOrigin::Inserted => source[index]
                    .rows
                    .get(row)
                    .cloned()
                    .ok_or(MirrorError::RowOutOfRange {
                        op,
                        len: source[index].rows.len(),
                    })?,
            };
            match rows.get_mut(row) {
                None => return Err(MirrorError::RowOutOfRange { op, len: count }),
                Some(Some(_)) => return Err(MirrorError::SlotConflict { op }),
                Some(slot) => *slot = Some(key),
            }
        }

        let mut untouched = old[twin]
            .rows
            .iter()
            .zip(&taken_rows[twin])
            .filter(|(_, taken)| !**taken)
            .map(|(key, _)| key.clone());
        let rows: Vec<IK> = rows
            .into_iter()
            .map(|slot| slot.or_else(|| untouched.next()))
            .collect::<Option<_>>()
            .ok_or(MirrorError::CountMismatch {
                section: Some(index),
                expected: count,
                found: kept,
            })?;

        next.push(MirrorSection {
            key: old[twin].key.clone(),
            rows,
        });
    }

    // The batch must land exactly on the source
    for (index, (got, want)) in next.iter().zip(source).enumerate() {
        if got.key != want.key {
            return Err(MirrorError::Diverged {
                section: index,
                row: None,
            });
        }
        if got.rows.len() != want.rows.len() {
            return Err(MirrorError::CountMismatch {
                section: Some(index),
                expected: want.rows.len(),
                found: got.rows.len(),
            });
        }
        if let Some(row) = got.rows.iter().zip(&want.rows).position(|(a, b)| a != b) {
            return Err(MirrorError::Diverged {
                section: index,
                row: Some(row),
            });
        }
    }

    Ok(next)
}

// =============================================================================
// Tests
// =============================================================================
