//! # Checkout
//!
//! One replica's working copy: the latest sequenced view plus local edits
//! that are applied optimistically on top of it.
//!
//! ```text
//!   base_view ──edit₁──▶ ──edit₂──▶ … ──editₙ──▶ current_view
//!             (pending local edits, in submission order)
//! ```
//!
//! When the sequencing service reports the next edit, the checkout either
//! promotes its own front pending edit (the content is identical and was
//! applied to the same base, so nothing needs recomputing) or applies the
//! sequenced edit to the base and rebases every pending edit on top of it.
//! Pending edits that no longer apply are dropped and reported.

use crate::errors::EditorError;
use arbor_common::EditId;
use arbor_tree::{
    apply_edit, Change, Delta, Edit, EditStatus, EditingResult, RevisionView, Transaction,
    TransactionFailure, TransactionView,
};
use tracing::{debug, instrument, warn};

/// A local edit applied optimistically, with the views around it.
#[derive(Debug, Clone)]
pub struct PendingLocalEdit {
    pub edit: Edit,
    pub before: RevisionView,
    pub after: RevisionView,
}

/// A pending edit that failed to rebase.
#[derive(Debug, Clone)]
pub struct DroppedEdit {
    pub edit: Edit,
    pub status: EditStatus,
    pub failure: TransactionFailure,
}

#[derive(Debug, Clone, Default)]
pub struct RebaseOutcome {
    pub dropped: Vec<DroppedEdit>,
    /// Difference between the current view before and after.
    pub delta: Delta,
}

/// Effect of one sequenced edit on the checkout.
#[derive(Debug, Clone)]
pub struct SequencedOutcome {
    pub status: EditStatus,
    pub failure: Option<TransactionFailure>,
    /// The edit was the front pending edit and was promoted without replay.
    pub promoted: bool,
    pub rebase: RebaseOutcome,
}

#[derive(Debug, Clone)]
pub struct Checkout {
    base_view: RevisionView,
    base_seq: u64,
    pending: Vec<PendingLocalEdit>,
}

impl Checkout {
    pub fn new(base_view: RevisionView, base_seq: u64) -> Self {
        Self {
            base_view,
            base_seq,
            pending: Vec::new(),
        }
    }

    pub fn base_view(&self) -> &RevisionView {
        &self.base_view
    }

    pub fn base_seq(&self) -> u64 {
        self.base_seq
    }

    /// Base view with every pending edit applied.
    pub fn current_view(&self) -> &RevisionView {
        self.pending.last().map(|p| &p.after).unwrap_or(&self.base_view)
    }

    pub fn pending_edits(&self) -> &[PendingLocalEdit] {
        &self.pending
    }

    pub fn pending_edit(&self, id: EditId) -> Option<&PendingLocalEdit> {
        self.pending.iter().find(|p| p.edit.id == id)
    }

    /// Apply `edit` to the current view. Only valid edits are kept.
    pub fn submit_edit(&mut self, edit: Edit) -> Result<Delta, EditorError> {
        let result = apply_edit(self.current_view(), edit.changes.iter().cloned())?;
        self.commit_result(edit.id, result)
    }

    /// Incremental edit against the current view.
    pub fn open_edit(&mut self) -> CheckoutTransaction<'_> {
        let transaction = Transaction::new(self.current_view());
        CheckoutTransaction {
            checkout: self,
            transaction,
        }
    }

    /// Close `transaction` and keep it as the pending edit `id`.
    pub fn commit_transaction(&mut self, id: EditId, transaction: Transaction) -> Result<(Edit, Delta), EditorError> {
        let result = transaction.close()?;
        let edit = Edit::with_id(id, result.changes().to_vec());
        let delta = self.commit_result(id, result)?;
        Ok((edit, delta))
    }

    fn commit_result(&mut self, id: EditId, result: EditingResult) -> Result<Delta, EditorError> {
        match result {
            EditingResult::Valid {
                changes,
                before,
                after,
            } => {
                let delta = before.delta(&after);
                debug!(edit_id = %id, pending = self.pending.len() + 1, "local edit applied");
                self.pending.push(PendingLocalEdit {
                    edit: Edit::with_id(id, changes),
                    before,
                    after,
                });
                Ok(delta)
            }
            EditingResult::Failed { status, failure, .. } => Err(EditorError::Rejected {
                edit_id: id,
                status,
                failure,
            }),
        }
    }

    /// Inverse of a pending edit relative to the view it was applied to.
    pub fn revert_pending(&self, id: EditId) -> Option<Vec<Change>> {
        let pending = self.pending_edit(id)?;
        arbor_tree::revert(&pending.edit.changes, &pending.before)
    }

    /// Advance the base past the edit sequenced at `seq`.
    #[instrument(level = "debug", skip(self, edit), fields(edit_id = %edit.id))]
    pub fn on_sequenced(&mut self, edit: &Edit, seq: u64) -> Result<SequencedOutcome, EditorError> {
        if seq != self.base_seq + 1 {
            return Err(EditorError::Fatal(format!(
                "checkout at {} cannot apply edit sequenced at {seq}",
                self.base_seq
            )));
        }
        self.base_seq = seq;

        if self.pending.first().map(|p| p.edit.id) == Some(edit.id) {
            let front = self.pending.remove(0);
            debug!("promoted front pending edit");
            self.base_view = front.after;
            return Ok(SequencedOutcome {
                status: EditStatus::Valid,
                failure: None,
                promoted: true,
                rebase: RebaseOutcome::default(),
            });
        }

        let previous = self.current_view().clone();
        let result = apply_edit(&self.base_view, edit.changes.iter().cloned())?;
        let status = result.status();
        let failure = result.failure().cloned();
        self.base_view = result.view().clone();

        let pending = std::mem::take(&mut self.pending);
        let remaining = pending.into_iter().filter(|p| p.edit.id != edit.id).collect();
        let rebase = self.rebase(remaining, &previous)?;
        Ok(SequencedOutcome {
            status,
            failure,
            promoted: false,
            rebase,
        })
    }

    /// Drop a pending edit and rebase the ones after it.
    pub fn cancel(&mut self, id: EditId) -> Result<RebaseOutcome, EditorError> {
        let index = self
            .pending
            .iter()
            .position(|p| p.edit.id == id)
            .ok_or(EditorError::UnknownEdit(id))?;
        let previous = self.current_view().clone();
        let mut pending = std::mem::take(&mut self.pending);
        let rest = pending.split_off(index + 1);
        pending.pop();
        self.pending = pending;
        self.rebase(rest, &previous)
    }

    /// Reapply `edits` in order on top of the current view.
    fn rebase(&mut self, edits: Vec<PendingLocalEdit>, previous: &RevisionView) -> Result<RebaseOutcome, EditorError> {
        let mut dropped = Vec::new();
        for pending in edits {
            let before = self.current_view().clone();
            match apply_edit(&before, pending.edit.changes.iter().cloned())? {
                EditingResult::Valid { after, .. } => self.pending.push(PendingLocalEdit {
                    edit: pending.edit,
                    before,
                    after,
                }),
                EditingResult::Failed { status, failure, .. } => {
                    warn!(edit_id = %pending.edit.id, ?status, %failure, "pending edit dropped during rebase");
                    dropped.push(DroppedEdit {
                        edit: pending.edit,
                        status,
                        failure,
                    });
                }
            }
        }
        Ok(RebaseOutcome {
            dropped,
            delta: previous.delta(self.current_view()),
        })
    }
}

/// An edit built one change at a time against a checkout's current view.
pub struct CheckoutTransaction<'c> {
    checkout: &'c mut Checkout,
    transaction: Transaction,
}

impl CheckoutTransaction<'_> {
    pub fn apply_change(&mut self, change: Change) -> EditStatus {
        self.transaction.apply_change(change)
    }

    pub fn apply_changes(&mut self, changes: impl IntoIterator<Item = Change>) -> EditStatus {
        self.transaction.apply_changes(changes)
    }

    pub fn status(&self) -> EditStatus {
        self.transaction.status()
    }

    pub fn view(&self) -> &TransactionView {
        self.transaction.view()
    }

    pub fn commit(self) -> Result<(Edit, Delta), EditorError> {
        self.checkout.commit_transaction(EditId::random(), self.transaction)
    }
}
