//! # Transport
//!
//! The seam between a replica and whatever service imposes a total order on
//! edits. A replica hands outbound edits to an [`EditSequencer`] and later
//! receives them back, with every other replica's edits, through
//! `SharedTree::deliver_*`.
//!
//! [`LocalSequencingService`] is an in-process service for hosts that run
//! several replicas side by side, and for tests.

use crate::errors::EditorError;
use arbor_common::{IdCreationRange, SessionId};
use arbor_tree::Edit;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::{debug, warn};

/// An edit as sent on the wire. Node ids are in op space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedEdit {
    pub session_id: SessionId,
    /// Ids the sender allocated since its previous outbound edit.
    pub id_range: IdCreationRange,
    pub edit: Edit,
}

impl SerializedEdit {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Outbound half of the transport.
pub trait EditSequencer {
    /// Hand an edit over for ordering. Once this returns `Ok`, delivery is
    /// assumed to be reliable.
    fn submit_for_sequencing(&mut self, edit: SerializedEdit) -> Result<(), EditorError>;
}

/// Drops everything. For replicas that never collaborate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSequencer;

impl EditSequencer for NullSequencer {
    fn submit_for_sequencing(&mut self, edit: SerializedEdit) -> Result<(), EditorError> {
        debug!(edit_id = %edit.edit.id, "edit discarded by null sequencer");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSequencer {
    sender: Sender<SerializedEdit>,
}

impl ChannelSequencer {
    pub fn new(sender: Sender<SerializedEdit>) -> Self {
        Self { sender }
    }

    /// A sequencer and the receiving end of its channel.
    pub fn channel() -> (Self, Receiver<SerializedEdit>) {
        let (sender, receiver) = channel();
        (Self::new(sender), receiver)
    }
}

impl EditSequencer for ChannelSequencer {
    fn submit_for_sequencing(&mut self, edit: SerializedEdit) -> Result<(), EditorError> {
        let id = edit.edit.id;
        self.sender.send(edit).map_err(|_| {
            warn!(edit_id = %id, "sequencing service disconnected");
            EditorError::SequencerDisconnected(id)
        })
    }
}

/// Assigns sequence numbers in arrival order.
#[derive(Debug)]
pub struct LocalSequencingService {
    sender: Sender<SerializedEdit>,
    inbox: Receiver<SerializedEdit>,
    log: Vec<SerializedEdit>,
}

impl LocalSequencingService {
    pub fn new() -> Self {
        let (sender, inbox) = channel();
        Self {
            sender,
            inbox,
            log: Vec::new(),
        }
    }

    /// A sequencer feeding this service.
    pub fn connect(&self) -> ChannelSequencer {
        ChannelSequencer::new(self.sender.clone())
    }

    /// Sequence everything received so far. Returns the newly sequenced
    /// edits with their sequence numbers.
    pub fn sequence_pending(&mut self) -> Vec<(SerializedEdit, u64)> {
        let start = self.log.len();
        self.log.extend(self.inbox.try_iter());
        self.log_since(start as u64)
    }

    /// Sequenced edits after `seq`.
    pub fn log_since(&self, seq: u64) -> Vec<(SerializedEdit, u64)> {
        self.log
            .iter()
            .enumerate()
            .skip(seq as usize)
            .map(|(index, edit)| (edit.clone(), index as u64 + 1))
            .collect()
    }

    pub fn latest_seq(&self) -> u64 {
        self.log.len() as u64
    }
}

impl Default for LocalSequencingService {
    fn default() -> Self {
        Self::new()
    }
}
