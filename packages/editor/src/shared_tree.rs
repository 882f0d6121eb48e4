//! # Shared Tree
//!
//! One replica of a collaboratively edited document.
//!
//! ```text
//!   submit_edit ──▶ Checkout (optimistic) ──▶ outbox ──flush──▶ EditSequencer
//!                                                                   │
//!   deliver_* ◀──────────── sequencing service (total order) ◀──────┘
//!       │
//!       ▼
//!   reorder buffer ──▶ IdCompressor.finalize ──▶ EditLog ──▶ Checkout.on_sequenced
//! ```
//!
//! ## Id spaces
//!
//! Views and local edits hold ids in session space. At flush, edits are
//! normalized to op space and carry the creation range of every id this
//! session generated since its previous flush. Inbound edits are normalized
//! back to session space after their range has been finalized.
//!
//! ## Failure
//!
//! Anything that means this replica can no longer converge with its peers
//! (out of order ids, a conflicting duplicate sequence number, a forest
//! invariant violation) poisons the replica. Every later call that reads
//! or mutates sequenced state returns [`EditorError::Poisoned`].

use crate::checkout::{Checkout, DroppedEdit, RebaseOutcome, SequencedOutcome};
use crate::config::{FlushMode, SharedTreeOptions};
use crate::edit_log::{EditLocation, EditLog};
use crate::errors::EditorError;
use crate::events::{Listener, SharedTreeEvent, Subscribers, SubscriptionId};
use crate::merge_health::MergeHealthStats;
use crate::summary::{self, Summary, WriteFormat};
use crate::transport::{EditSequencer, SerializedEdit};
use crate::undo_stack::{EditBatch, UndoStack};
use arbor_common::{EditId, IdCompressor, IdCreationRange, IdRange, NodeId, SessionId};
use arbor_tree::{
    Change, Delta, Edit, EditStatus, FailureKind, RevisionView, Transaction, TransactionFailure, TransactionView,
};
use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use tracing::{debug, error, info, instrument, warn};

/// Something the transport delivered for a sequence number.
#[derive(Debug, Clone)]
enum Inbound {
    Sequenced(SerializedEdit),
    /// Our own edit, sequenced without echoing its content.
    Ack(EditId),
}

impl Inbound {
    fn edit_id(&self) -> EditId {
        match self {
            Inbound::Sequenced(serialized) => serialized.edit.id,
            Inbound::Ack(id) => *id,
        }
    }
}

pub struct SharedTree {
    options: SharedTreeOptions,
    compressor: IdCompressor,
    edit_log: EditLog,
    checkout: Checkout,
    sequencer: Box<dyn EditSequencer + Send>,
    /// Local edits not yet handed to the sequencer, in submission order.
    outbox: VecDeque<EditId>,
    /// Flushed edits awaiting sequencing.
    in_flight: BTreeMap<EditId, SerializedEdit>,
    /// Creation range of an edit the sequencer refused. Sent with the next
    /// edit that gets through.
    unsent_range: Option<IdCreationRange>,
    /// Deliveries that arrived ahead of a gap.
    reorder: BTreeMap<u64, Inbound>,
    subscribers: Subscribers,
    undo: UndoStack,
    merge_health: MergeHealthStats,
    poisoned: Option<String>,
}

impl SharedTree {
    /// A replica of a new, empty document.
    pub fn new(options: SharedTreeOptions, sequencer: Box<dyn EditSequencer + Send>) -> Self {
        let compressor = IdCompressor::with_cluster_capacity(SessionId::random(), options.id_cluster_capacity);
        let base = RevisionView::initial();
        let edit_log = EditLog::new(base.clone(), options.revision_cache_size);
        Self::from_parts(options, compressor, edit_log, base, sequencer)
    }

    /// A replica resuming from a summary.
    pub fn load(
        summary: &Summary,
        options: SharedTreeOptions,
        sequencer: Box<dyn EditSequencer + Send>,
    ) -> Result<Self, EditorError> {
        let mut loaded = summary::load(summary, SessionId::random(), &options)?;
        let base = loaded.edit_log.view_at(loaded.edit_log.latest_seq())?;
        Ok(Self::from_parts(options, loaded.compressor, loaded.edit_log, base, sequencer))
    }

    /// `base` must be the view after the latest edit of `edit_log`.
    fn from_parts(
        options: SharedTreeOptions,
        compressor: IdCompressor,
        mut edit_log: EditLog,
        base: RevisionView,
        sequencer: Box<dyn EditSequencer + Send>,
    ) -> Self {
        let latest = edit_log.latest_seq();
        edit_log.pin_view(latest, base.clone());
        let undo = UndoStack::with_max_levels(options.undo_levels);
        Self {
            options,
            compressor,
            edit_log,
            checkout: Checkout::new(base, latest),
            sequencer,
            outbox: VecDeque::new(),
            in_flight: BTreeMap::new(),
            unsent_range: None,
            reorder: BTreeMap::new(),
            subscribers: Subscribers::new(),
            undo,
            merge_health: MergeHealthStats::new(),
            poisoned: None,
        }
    }

    pub fn options(&self) -> &SharedTreeOptions {
        &self.options
    }

    pub fn session_id(&self) -> SessionId {
        self.compressor.local_session()
    }

    pub fn compressor(&self) -> &IdCompressor {
        &self.compressor
    }

    pub fn edit_log(&self) -> &EditLog {
        &self.edit_log
    }

    pub fn checkout(&self) -> &Checkout {
        &self.checkout
    }

    /// Latest sequenced view with local edits applied on top.
    pub fn current_view(&self) -> &RevisionView {
        self.checkout.current_view()
    }

    pub fn latest_seq(&self) -> u64 {
        self.edit_log.latest_seq()
    }

    /// Sequenced view after the edit at `seq`, without local edits.
    pub fn view_at(&mut self, seq: u64) -> Result<RevisionView, EditorError> {
        self.edit_log.view_at(seq)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Number of deliveries waiting for an earlier sequence number.
    pub fn buffered_deliveries(&self) -> usize {
        self.reorder.len()
    }

    fn ensure_live(&self) -> Result<(), EditorError> {
        match self.poisoned {
            Some(_) => Err(EditorError::Poisoned),
            None => Ok(()),
        }
    }

    fn poison(&mut self, err: EditorError) -> EditorError {
        if err.is_fatal() && self.poisoned.is_none() {
            error!(session = %self.session_id(), error = %err, "shared tree poisoned");
            self.poisoned = Some(err.to_string());
        }
        err
    }

    fn emit(&mut self, event: SharedTreeEvent) {
        self.subscribers.emit(&event);
    }

    fn emit_delta(&mut self, delta: Delta) {
        if !delta.is_empty() {
            self.emit(SharedTreeEvent::ViewChange { delta });
        }
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Allocate an id for a node this replica is about to build.
    pub fn generate_node_id(&mut self) -> NodeId {
        self.compressor.generate_compressed_id()
    }

    /// Apply `changes` locally as one edit and queue it for sequencing.
    pub fn submit_edit(&mut self, changes: Vec<Change>) -> Result<EditId, EditorError> {
        self.ensure_live()?;
        let edit = Edit::new(changes);
        let id = edit.id;
        self.check_id_spaces(id, &edit.changes)?;
        let delta = self.checkout.submit_edit(edit.clone())?;
        self.commit_local(edit, delta, true);
        Ok(id)
    }

    /// Every id an outbound edit names must have been allocated by some
    /// session, or no replica can normalize it.
    fn check_id_spaces(&self, edit_id: EditId, changes: &[Change]) -> Result<(), EditorError> {
        let compressor = &self.compressor;
        for (change_index, change) in changes.iter().enumerate() {
            let checked = change.try_map_node_ids(&mut |id| if compressor.is_known(id) { Ok(id) } else { Err(id) });
            if let Err(id) = checked {
                let kind = FailureKind::UnknownIdSpace(id);
                warn!(%edit_id, change_index, %id, "edit names an id no session allocated");
                return Err(EditorError::Rejected {
                    edit_id,
                    status: kind.status(),
                    failure: TransactionFailure { change_index, kind },
                });
            }
        }
        Ok(())
    }

    /// Build an edit one change at a time against the current view.
    pub fn open_edit(&mut self) -> Result<TreeEdit<'_>, EditorError> {
        self.ensure_live()?;
        let transaction = Transaction::new(self.checkout.current_view());
        Ok(TreeEdit { tree: self, transaction })
    }

    fn commit_local(&mut self, edit: Edit, delta: Delta, undoable: bool) {
        self.record_local(edit, delta, undoable);
        self.flush_if_immediate();
    }

    fn record_local(&mut self, edit: Edit, delta: Delta, undoable: bool) {
        let id = edit.id;
        self.edit_log.add_local_edit(edit);
        self.outbox.push_back(id);
        if undoable {
            self.undo.record(id);
        }
        self.emit(SharedTreeEvent::EditCommitted { edit_id: id });
        self.emit_delta(delta);
    }

    /// A refused send leaves the edit queued; the next `flush` reports it.
    fn flush_if_immediate(&mut self) {
        if self.options.flush_mode == FlushMode::Immediate {
            if let Err(err) = self.flush() {
                warn!(error = %err, queued = self.outbox.len(), "edit kept in the outbox");
            }
        }
    }

    /// Hand every queued edit to the sequencer, in submission order.
    ///
    /// If the sequencer refuses an edit, it and everything after it stay in
    /// the outbox and can still be cancelled.
    pub fn flush(&mut self) -> Result<(), EditorError> {
        self.ensure_live()?;
        while let Some(id) = self.outbox.pop_front() {
            let Some(edit) = self.edit_log.get_edit(id).cloned() else {
                continue;
            };
            let id_range = self.next_creation_range();
            let compressor = &self.compressor;
            let op_edit = edit.try_map_node_ids(|node| Ok::<_, Infallible>(compressor.normalize_to_op_space(node)))
                .unwrap_or_else(|never| match never {});
            let serialized = SerializedEdit {
                session_id: compressor.local_session(),
                id_range,
                edit: op_edit,
            };
            if let Err(err) = self.sequencer.submit_for_sequencing(serialized.clone()) {
                self.unsent_range = Some(id_range);
                self.outbox.push_front(id);
                return Err(err);
            }
            debug!(edit_id = %id, ids = ?id_range.ids, "edit flushed");
            self.in_flight.insert(id, serialized);
        }
        Ok(())
    }

    /// Ids allocated since the last edit the sequencer accepted.
    fn next_creation_range(&mut self) -> IdCreationRange {
        let taken = self.compressor.take_next_creation_range();
        let Some(unsent) = self.unsent_range.take() else {
            return taken;
        };
        let ids = match (unsent.ids, taken.ids) {
            (Some(earlier), Some(later)) => Some(IdRange {
                first_gen_count: earlier.first_gen_count,
                last_gen_count: later.last_gen_count,
            }),
            (earlier, later) => earlier.or(later),
        };
        IdCreationRange { ids, ..taken }
    }

    /// Switch to a new connection to the sequencing service and send
    /// everything still queued.
    pub fn reconnect(&mut self, sequencer: Box<dyn EditSequencer + Send>) -> Result<(), EditorError> {
        self.sequencer = sequencer;
        info!(session = %self.session_id(), queued = self.outbox.len(), "sequencer replaced");
        self.flush()
    }

    /// Withdraw a local edit that has not been flushed yet.
    pub fn cancel_edit(&mut self, id: EditId) -> Result<(), EditorError> {
        self.ensure_live()?;
        if self.in_flight.contains_key(&id) {
            return Err(EditorError::AlreadySubmitted(id));
        }
        let Some(position) = self.outbox.iter().position(|queued| *queued == id) else {
            return Err(EditorError::UnknownEdit(id));
        };
        self.outbox.remove(position);
        self.edit_log.remove_local_edit(id);
        self.undo.forget(id);
        let outcome = self.checkout.cancel(id)?;
        debug!(edit_id = %id, "edit cancelled");
        self.report_rebase(outcome);
        Ok(())
    }

    /// Submit the inverse of an earlier edit.
    pub fn revert_edit(&mut self, id: EditId) -> Result<EditId, EditorError> {
        self.ensure_live()?;
        let edit = Edit::new(self.inverse_of(id)?);
        let reverted = edit.id;
        let delta = self.checkout.submit_edit(edit.clone())?;
        debug!(edit_id = %id, revert = %reverted, "edit reverted");
        self.commit_local(edit, delta, true);
        Ok(reverted)
    }

    /// Changes undoing `id`, computed against the view it was applied to.
    fn inverse_of(&mut self, id: EditId) -> Result<Vec<Change>, EditorError> {
        match self.edit_log.location_of(id) {
            Some(EditLocation::Local(_)) => self.checkout.revert_pending(id),
            Some(EditLocation::Sequenced(seq)) => {
                let before = self.edit_log.view_at(seq - 1)?;
                let edit = self.edit_log.get_edit(id).ok_or(EditorError::UnknownEdit(id))?;
                arbor_tree::revert(&edit.changes, &before)
            }
            None => return Err(EditorError::UnknownEdit(id)),
        }
        .ok_or(EditorError::NotRevertible(id))
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    /// Group the following edits into one undo step.
    pub fn begin_undo_batch(&mut self, description: impl Into<String>) {
        self.undo.begin_batch();
        self.undo.set_batch_description(description);
    }

    pub fn end_undo_batch(&mut self) {
        self.undo.end_batch();
    }

    /// Revert the most recent undo batch. Returns false if there is none.
    ///
    /// If any edit of the batch can no longer be reverted, nothing is
    /// applied and the batch stays on the undo stack.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        let Some(batch) = self.undo.take_undo() else {
            return Ok(false);
        };
        match self.revert_batch(&batch) {
            Ok(reverted) => self.undo.push_undone(reverted),
            Err(err) => {
                self.undo.restore_undo(batch);
                return Err(err);
            }
        }
        self.flush_if_immediate();
        Ok(true)
    }

    /// Reapply the most recently undone batch. Returns false if there is none.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        let Some(batch) = self.undo.take_redo() else {
            return Ok(false);
        };
        match self.revert_batch(&batch) {
            Ok(reverted) => self.undo.push_redone(reverted),
            Err(err) => {
                self.undo.restore_redo(batch);
                return Err(err);
            }
        }
        self.flush_if_immediate();
        Ok(true)
    }

    /// Revert every edit of `batch`, newest first. The inverses are applied
    /// to a staged copy of the checkout and kept only if all of them apply.
    fn revert_batch(&mut self, batch: &EditBatch) -> Result<EditBatch, EditorError> {
        self.ensure_live()?;
        let mut staged = self.checkout.clone();
        let mut reverts = Vec::with_capacity(batch.edits.len());
        for id in batch.edits.iter().rev() {
            let edit = Edit::new(self.inverse_of(*id)?);
            self.check_id_spaces(edit.id, &edit.changes)?;
            let delta = staged.submit_edit(edit.clone())?;
            reverts.push((edit, delta));
        }

        self.checkout = staged;
        let mut edits = Vec::with_capacity(reverts.len());
        for (edit, delta) in reverts {
            edits.push(edit.id);
            self.record_local(edit, delta, false);
        }
        debug!(edits = edits.len(), "undo batch reverted");
        Ok(EditBatch {
            edits,
            description: batch.description.clone(),
        })
    }

    /// An edit sequenced at `seq`, from any replica including this one.
    pub fn deliver_sequenced_edit(&mut self, edit: SerializedEdit, seq: u64) -> Result<(), EditorError> {
        self.ensure_live()?;
        self.receive(seq, Inbound::Sequenced(edit)).map_err(|e| self.poison(e))
    }

    /// This replica's edit `id` was sequenced at `seq`.
    pub fn deliver_ack(&mut self, id: EditId, seq: u64) -> Result<(), EditorError> {
        self.ensure_live()?;
        self.receive(seq, Inbound::Ack(id)).map_err(|e| self.poison(e))
    }

    /// A batch of sequenced edits, in any order.
    pub fn deliver_edit_chunk(&mut self, edits: Vec<(SerializedEdit, u64)>) -> Result<(), EditorError> {
        self.ensure_live()?;
        for (edit, seq) in edits {
            self.receive(seq, Inbound::Sequenced(edit)).map_err(|e| self.poison(e))?;
        }
        Ok(())
    }

    fn receive(&mut self, seq: u64, inbound: Inbound) -> Result<(), EditorError> {
        let latest = self.edit_log.latest_seq();
        if seq <= latest {
            return self.check_duplicate(seq, inbound.edit_id());
        }
        if seq > latest + 1 {
            if let Some(buffered) = self.reorder.get(&seq) {
                if buffered.edit_id() != inbound.edit_id() {
                    return Err(EditorError::Fatal(format!(
                        "conflicting deliveries for sequence number {seq}"
                    )));
                }
                return Ok(());
            }
            debug!(seq, latest, "delivery buffered until the gap is filled");
            self.reorder.insert(seq, inbound);
            return Ok(());
        }

        self.process(seq, inbound)?;
        while let Some(next) = self.reorder.remove(&(self.edit_log.latest_seq() + 1)) {
            let next_seq = self.edit_log.latest_seq() + 1;
            self.process(next_seq, next)?;
        }
        Ok(())
    }

    fn check_duplicate(&self, seq: u64, id: EditId) -> Result<(), EditorError> {
        match self.edit_log.sequenced_edit_at(seq) {
            Some(existing) if existing.id != id => Err(EditorError::Fatal(format!(
                "sequence number {seq} redelivered with edit {id}, already holds {}",
                existing.id
            ))),
            Some(_) => {
                debug!(seq, edit_id = %id, "duplicate delivery ignored");
                Ok(())
            }
            None => {
                debug!(seq, edit_id = %id, "delivery below the retained window ignored");
                Ok(())
            }
        }
    }

    #[instrument(level = "debug", skip(self, inbound), fields(edit_id = %inbound.edit_id()))]
    fn process(&mut self, seq: u64, inbound: Inbound) -> Result<(), EditorError> {
        let serialized = match inbound {
            Inbound::Sequenced(serialized) => {
                self.in_flight.remove(&serialized.edit.id);
                serialized
            }
            Inbound::Ack(id) => self.in_flight.remove(&id).ok_or(EditorError::UnknownEdit(id))?,
        };

        self.compressor.finalize_creation_range(&serialized.id_range)?;
        let origin = serialized.session_id;
        let compressor = &self.compressor;
        let edit = serialized
            .edit
            .try_map_node_ids(|id| compressor.normalize_to_session_space(id, origin))?;
        let was_local = origin == compressor.local_session();
        let edit_id = edit.id;

        self.edit_log.add_sequenced_edit(edit.clone(), seq)?;
        let SequencedOutcome {
            status,
            failure,
            promoted,
            rebase,
        } = self.checkout.on_sequenced(&edit, seq)?;
        self.edit_log.pin_view(seq, self.checkout.base_view().clone());

        self.merge_health.record_sequenced(status, failure.as_ref(), was_local);
        if let Some(failure) = &failure {
            warn!(%edit_id, seq, ?status, kind = failure.kind.name(), "sequenced edit did not apply");
        }
        debug!(%edit_id, seq, was_local, promoted, "sequenced edit applied");
        self.emit(SharedTreeEvent::SequencedEditApplied {
            edit_id,
            seq,
            was_local,
            status,
            failure,
        });
        self.report_rebase(rebase);
        Ok(())
    }

    fn report_rebase(&mut self, outcome: RebaseOutcome) {
        for DroppedEdit { edit, status, failure } in outcome.dropped {
            self.merge_health.record_dropped_rebase();
            self.outbox.retain(|queued| *queued != edit.id);
            self.edit_log.remove_local_edit(edit.id);
            self.undo.forget(edit.id);
            self.emit(SharedTreeEvent::EditFailed {
                edit_id: edit.id,
                status,
                failure,
            });
        }
        self.emit_delta(outcome.delta);
    }

    /// Merge counters accumulated since the last [`take_merge_health`](Self::take_merge_health).
    pub fn merge_health(&self) -> &MergeHealthStats {
        &self.merge_health
    }

    /// Drain the merge counters and log them.
    pub fn take_merge_health(&mut self) -> MergeHealthStats {
        let stats = std::mem::take(&mut self.merge_health);
        if !stats.is_empty() {
            info!(
                session = %self.session_id(),
                edits = stats.edit_count,
                local_edits = stats.local_edit_count,
                invalid = stats.invalid_count,
                malformed = stats.malformed_count,
                dropped_rebases = stats.dropped_rebases,
                failures = ?stats.failures_by_kind,
                "merge health"
            );
        }
        stats
    }

    /// Persist the sequenced state in the configured format.
    pub fn summarize(&mut self) -> Result<Summary, EditorError> {
        self.summarize_as(self.options.write_format)
    }

    pub fn summarize_as(&mut self, format: WriteFormat) -> Result<Summary, EditorError> {
        self.ensure_live()?;
        let summary = summary::write(
            format,
            &self.compressor,
            &mut self.edit_log,
            self.options.summary_edit_window,
        )?;
        info!(session = %self.session_id(), version = %format, "shared tree summarized");
        Ok(summary)
    }
}

impl std::fmt::Debug for SharedTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTree")
            .field("session", &self.session_id())
            .field("latest_seq", &self.latest_seq())
            .field("pending", &self.checkout.pending_edits().len())
            .field("outbox", &self.outbox.len())
            .field("in_flight", &self.in_flight.len())
            .field("merge_health", &self.merge_health)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

/// An edit under construction on a [`SharedTree`].
pub struct TreeEdit<'t> {
    tree: &'t mut SharedTree,
    transaction: Transaction,
}

impl TreeEdit<'_> {
    pub fn generate_node_id(&mut self) -> NodeId {
        self.tree.generate_node_id()
    }

    pub fn apply_change(&mut self, change: Change) -> EditStatus {
        self.transaction.apply_change(change)
    }

    pub fn status(&self) -> EditStatus {
        self.transaction.status()
    }

    /// State with every change so far applied.
    pub fn view(&self) -> &TransactionView {
        self.transaction.view()
    }

    /// Keep the edit if every change applied.
    pub fn commit(self) -> Result<EditId, EditorError> {
        let id = EditId::random();
        self.tree.check_id_spaces(id, self.transaction.changes())?;
        let (edit, delta) = self.tree.checkout.commit_transaction(id, self.transaction)?;
        self.tree.commit_local(edit, delta, true);
        Ok(id)
    }
}
