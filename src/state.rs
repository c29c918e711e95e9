//! Committed snapshot and transaction lifecycle.
//!
//! [`ListState`] owns the sections the target currently shows. A
//! reconciliation starts with [`ListState::begin`], which pushes the
//! structural batch to the target and hands back a [`Transaction`]. Once the
//! target reports that the batch has committed, [`ListState::complete`]
//! applies the replacement ops, swaps in the new snapshot and runs the
//! completion callback.
//!
//! Only one transaction may be in flight at a time.
//!
//! ```ignore
//! let mut state = ListState::from_sections(initial);
//! let txn = state.begin(&mut target, next)?;
//! // ... target commits the batch, possibly later ...
//! state.complete(&mut target, txn)?;
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ReconcileConfig;
use crate::element::Sectionable;
use crate::error::{ReconcileError, ReconcileResult};
use crate::plan::{PatchOp, PatchPlan};
use crate::reconcile::reconcile_with_config;
use crate::target::PatchTarget;

/// Callback run after a transaction completes.
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

// =============================================================================
// Transaction
// =============================================================================

/// Handle for one in-flight reconciliation.
///
/// Holds the replacement ops that must wait for the structural commit.
#[must_use = "an in-flight transaction blocks further reconciliation until completed or aborted"]
pub struct Transaction {
    id: u64,
    replacement: Vec<PatchOp>,
    full_reload: bool,
    on_complete: Option<CompletionFn>,
}

impl Transaction {
    /// Transaction id, unique per [`ListState`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ops that will be applied on completion.
    pub fn replacement_ops(&self) -> &[PatchOp] {
        &self.replacement
    }

    /// Whether the target was told to reload everything.
    pub fn is_full_reload(&self) -> bool {
        self.full_reload
    }

    /// Run `f` once the transaction completes.
    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("replacement", &self.replacement)
            .field("full_reload", &self.full_reload)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

// =============================================================================
// ListState
// =============================================================================

#[derive(Debug)]
struct Pending<S> {
    id: u64,
    sections: Vec<S>,
}

/// Single-owner holder of the committed sections.
#[derive(Debug)]
pub struct ListState<S> {
    sections: Vec<S>,
    config: ReconcileConfig,
    pending: Option<Pending<S>>,
    next_id: u64,
}

impl<S> Default for ListState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ListState<S> {
    /// Empty state with the default config.
    pub fn new() -> Self {
        Self::with_config(ReconcileConfig::default())
    }

    /// Empty state with a custom config.
    pub fn with_config(config: ReconcileConfig) -> Self {
        Self {
            sections: Vec::new(),
            config,
            pending: None,
            next_id: 1,
        }
    }

    /// State whose committed snapshot is `sections`.
    ///
    /// The target is assumed to already show them.
    pub fn from_sections(sections: Vec<S>) -> Self {
        Self {
            sections,
            ..Self::new()
        }
    }

    /// The committed sections.
    pub fn sections(&self) -> &[S] {
        &self.sections
    }

    /// Sections that become committed when the in-flight transaction completes.
    pub fn pending_sections(&self) -> Option<&[S]> {
        self.pending.as_ref().map(|p| p.sections.as_slice())
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Whether a transaction is waiting for completion.
    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    fn check_pending(&self, txn: &Transaction) -> ReconcileResult<()> {
        match &self.pending {
            None => Err(ReconcileError::NoTransaction),
            Some(pending) if pending.id != txn.id => Err(ReconcileError::StaleTransaction {
                expected: pending.id,
                found: txn.id,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Drop the in-flight transaction and keep the old snapshot.
    ///
    /// The target is not rolled back; reload it if the batch was applied.
    pub fn abort(&mut self, txn: Transaction) -> ReconcileResult<()> {
        self.check_pending(&txn)?;
        self.pending = None;
        tracing::debug!(id = txn.id, "transaction aborted");
        Ok(())
    }

    /// Swap the snapshot and apply replacements, returning the callback.
    fn finish<T>(&mut self, target: &mut T, mut txn: Transaction) -> ReconcileResult<Option<CompletionFn>>
    where
        T: PatchTarget + ?Sized,
    {
        self.check_pending(&txn)?;
        if let Some(pending) = self.pending.take() {
            self.sections = pending.sections;
        }
        for op in txn.replacement.drain(..) {
            target.apply_replacement(op);
        }
        tracing::debug!(id = txn.id, "transaction completed");
        Ok(txn.on_complete.take())
    }

    /// Finish a transaction after the target committed its batch.
    pub fn complete<T>(&mut self, target: &mut T, txn: Transaction) -> ReconcileResult<()>
    where
        T: PatchTarget + ?Sized,
    {
        if let Some(callback) = self.finish(target, txn)? {
            callback();
        }
        Ok(())
    }
}

impl<S: Sectionable> ListState<S> {
    /// Reconcile `new` against the committed snapshot and start applying it.
    ///
    /// Full-reload plans call [`PatchTarget::reload_all`]; otherwise the
    /// structural ops go out as one batch. An empty structural list skips
    /// the batch entirely.
    pub fn begin<T>(&mut self, target: &mut T, new: Vec<S>) -> ReconcileResult<Transaction>
    where
        T: PatchTarget + ?Sized,
    {
        if let Some(pending) = &self.pending {
            return Err(ReconcileError::TransactionInProgress { id: pending.id });
        }

        let plan = {
            let reconciliation = reconcile_with_config(&self.sections, &new, &self.config)?;
            PatchPlan::from_reconciliation(&reconciliation, &self.config)
        };

        let id = self.next_id;
        self.next_id += 1;

        if plan.full_reload {
            tracing::debug!(id, reason = ?plan.reload_reason, "reloading target");
            target.reload_all();
        } else if !plan.structural.is_empty() {
            target.begin_batch();
            for &op in &plan.structural {
                target.apply_structural(op);
            }
            target.end_batch();
        }

        tracing::debug!(
            id,
            structural = plan.structural.len(),
            replacement = plan.replacement.len(),
            "transaction started"
        );

        self.pending = Some(Pending { id, sections: new });
        Ok(Transaction {
            id,
            // A full reload already shows the new content
            replacement: if plan.full_reload { Vec::new() } else { plan.replacement },
            full_reload: plan.full_reload,
            on_complete: None,
        })
    }

    /// `begin` + `complete` for targets that commit synchronously.
    pub fn apply<T>(&mut self, target: &mut T, new: Vec<S>) -> ReconcileResult<()>
    where
        T: PatchTarget + ?Sized,
    {
        let txn = self.begin(target, new)?;
        self.complete(target, txn)
    }

    /// [`apply`](Self::apply) with a completion callback.
    pub fn apply_with<T>(
        &mut self,
        target: &mut T,
        new: Vec<S>,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> ReconcileResult<()>
    where
        T: PatchTarget + ?Sized,
    {
        let txn = self.begin(target, new)?.on_complete(on_complete);
        self.complete(target, txn)
    }
}

// =============================================================================
// SharedListState
// =============================================================================

/// Thread-safe [`ListState`].
///
/// Uses `parking_lot::Mutex`. Completion callbacks run after the lock is
/// released, so they may call back into the state.
#[derive(Debug)]
pub struct SharedListState<S> {
    inner: Arc<Mutex<ListState<S>>>,
}

impl<S> Clone for SharedListState<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Default for SharedListState<S> {
    fn default() -> Self {
        Self::new(ListState::new())
    }
}

impl<S> SharedListState<S> {
    pub fn new(state: ListState<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Execute a closure with access to the state.
    pub fn with<R>(&self, f: impl FnOnce(&mut ListState<S>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.lock().is_in_flight()
    }

    pub fn complete<T>(&self, target: &mut T, txn: Transaction) -> ReconcileResult<()>
    where
        T: PatchTarget + ?Sized,
    {
        let callback = self.inner.lock().finish(target, txn)?;
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }

    pub fn abort(&self, txn: Transaction) -> ReconcileResult<()> {
        self.inner.lock().abort(txn)
    }
}

impl<S: Sectionable> SharedListState<S> {
    pub fn begin<T>(&self, target: &mut T, new: Vec<S>) -> ReconcileResult<Transaction>
    where
        T: PatchTarget + ?Sized,
    {
        self.inner.lock().begin(target, new)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::element::{ContentEq, Identifiable, Section};
    use crate::target::{snapshot, MirrorTarget};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        label: &'static str,
    }

    impl Identifiable for Row {
        type Key = u32;
        fn identity(&self) -> u32 {
            self.id
        }
    }

    impl ContentEq for Row {
        fn content_eq(&self, other: &Self) -> bool {
            self.label == other.label
        }
    }

    type Sec = Section<char, Row>;

    fn row(id: u32, label: &'static str) -> Row {
        Row { id, label }
    }

    fn sec(id: char, rows: &[(u32, &'static str)]) -> Sec {
        Section::new(id, rows.iter().map(|&(i, l)| row(i, l)).collect())
    }

    fn mirror_for(sections: &[Sec]) -> MirrorTarget<char, u32> {
        MirrorTarget::new(snapshot(sections))
    }

    assert_impl_all!(ListState<Sec>: Send, Sync);
    assert_impl_all!(SharedListState<Sec>: Send, Sync, Clone);
    assert_impl_all!(Transaction: Send);

    #[test]
    fn test_apply_commits_snapshot() {
        let old = vec![sec('a', &[(1, "x"), (2, "y")])];
        let new = vec![sec('a', &[(2, "y"), (1, "x"), (3, "z")])];
        let mut target = mirror_for(&old);
        target.set_source(snapshot(&new));

        let mut state = ListState::from_sections(old);
        state.apply(&mut target, new.clone()).unwrap();

        assert_eq!(target.take_error(), None);
        assert_eq!(target.batches(), 1);
        assert_eq!(state.sections(), new.as_slice());
        assert!(!state.is_in_flight());
    }

    #[test]
    fn test_second_begin_rejected() {
        let old = vec![sec('a', &[(1, "x")])];
        let new = vec![sec('a', &[(1, "x"), (2, "y")])];
        let mut target = mirror_for(&old);
        target.set_source(snapshot(&new));

        let mut state = ListState::from_sections(old);
        let txn = state.begin(&mut target, new.clone()).unwrap();
        assert!(state.is_in_flight());

        let err = state.begin(&mut target, new.clone()).unwrap_err();
        assert!(matches!(err, ReconcileError::TransactionInProgress { id } if id == txn.id()));

        state.complete(&mut target, txn).unwrap();
        assert_eq!(state.sections(), new.as_slice());
    }

    #[test]
    fn test_replacements_wait_for_complete() {
        let old = vec![sec('a', &[(1, "x"), (2, "y")])];
        let new = vec![sec('a', &[(1, "changed"), (2, "y"), (3, "z")])];
        let mut target = mirror_for(&old);
        target.set_source(snapshot(&new));

        let mut state = ListState::from_sections(old.clone());
        let txn = state.begin(&mut target, new.clone()).unwrap();
        assert_eq!(txn.replacement_ops().len(), 1);
        assert!(target.replaced().is_empty());
        // Snapshot swaps only on completion
        assert_eq!(state.sections(), old.as_slice());
        assert_eq!(state.pending_sections(), Some(new.as_slice()));

        state.complete(&mut target, txn).unwrap();
        assert_eq!(target.replaced().len(), 1);
        assert_eq!(target.take_error(), None);
    }

    #[test]
    fn test_callback_runs_after_replacements() {
        let old = vec![sec('a', &[(1, "x")])];
        let new = vec![sec('a', &[(1, "y")])];
        let mut target = mirror_for(&old);
        target.set_source(snapshot(&new));

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut state = ListState::from_sections(old);
        state
            .apply_with(&mut target, new, move || {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Content-only change: no batch, one replacement
        assert_eq!(target.batches(), 0);
        assert_eq!(target.replaced().len(), 1);
    }

    #[test]
    fn test_stale_and_missing_transaction() {
        let old = vec![sec('a', &[(1, "x")])];
        let new = vec![sec('b', &[])];
        let mut target = mirror_for(&old);
        target.set_source(snapshot(&new));

        let mut state = ListState::from_sections(old.clone());
        let first = state.begin(&mut target, new.clone()).unwrap();
        state.abort(first).unwrap();
        assert_eq!(state.sections(), old.as_slice());

        let second = state.begin(&mut target, new.clone()).unwrap();
        let stale = Transaction {
            id: second.id() - 1,
            replacement: Vec::new(),
            full_reload: false,
            on_complete: None,
        };
        let err = state.complete(&mut target, stale).unwrap_err();
        assert!(matches!(err, ReconcileError::StaleTransaction { expected, found } if found + 1 == expected));

        state.complete(&mut target, second).unwrap();
        let orphan = Transaction {
            id: 99,
            replacement: Vec::new(),
            full_reload: false,
            on_complete: None,
        };
        assert!(matches!(
            state.complete(&mut target, orphan),
            Err(ReconcileError::NoTransaction)
        ));
    }

    #[test]
    fn test_first_apply_reloads() {
        let new = vec![sec('a', &[(1, "x")]), sec('b', &[(2, "y")])];
        let mut target = mirror_for(&[]);
        target.set_source(snapshot(&new));

        let mut state = ListState::new();
        let txn = state.begin(&mut target, new.clone()).unwrap();
        assert!(txn.is_full_reload());
        assert!(txn.replacement_ops().is_empty());
        state.complete(&mut target, txn).unwrap();

        assert_eq!(target.reloads(), 1);
        assert_eq!(target.committed(), snapshot(&new).as_slice());
    }

    #[test]
    fn test_empty_to_empty_touches_nothing() {
        let mut target = mirror_for(&[]);
        let mut state = ListState::<Sec>::new();

        let txn = state.begin(&mut target, Vec::new()).unwrap();
        assert!(!txn.is_full_reload());
        state.complete(&mut target, txn).unwrap();

        assert_eq!(target.reloads(), 0);
        assert_eq!(target.batches(), 0);
        assert!(target.replaced().is_empty());
        assert_eq!(target.take_error(), None);
    }

    #[test]
    fn test_duplicate_leaves_state_idle() {
        let old = vec![sec('a', &[(1, "x")])];
        let new = vec![sec('a', &[(1, "x"), (1, "y")])];
        let mut target = mirror_for(&old);

        let mut state = ListState::from_sections(old);
        let err = state.begin(&mut target, new).unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateIdentity { .. }));
        assert!(!state.is_in_flight());
        assert!(!target.in_batch());
    }

    #[test]
    fn test_shared_complete_from_other_thread() {
        let old = vec![sec('a', &[(1, "x")])];
        let new = vec![sec('b', &[(2, "y")]), sec('a', &[(1, "x")])];
        let mut target = mirror_for(&old);
        target.set_source(snapshot(&new));

        let shared = SharedListState::new(ListState::from_sections(old));
        let txn = shared.begin(&mut target, new.clone()).unwrap();
        assert!(shared.is_in_flight());

        let handle = {
            let shared = shared.clone();
            let reentrant = shared.clone();
            std::thread::spawn(move || {
                // Callback may lock the state again
                let txn = txn.on_complete(move || assert!(!reentrant.is_in_flight()));
                shared.complete(&mut target, txn).map(|()| target)
            })
        };
        let mut target = handle.join().unwrap().unwrap();

        assert_eq!(target.take_error(), None);
        assert_eq!(shared.with(|state| state.sections().len()), 2);
    }
}
