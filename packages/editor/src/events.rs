//! Notifications emitted by a shared tree.
//!
//! Listeners get a shared reference to each event and cannot reach the tree
//! that emitted it, so they cannot re-enter it mid-rebase.

use arbor_common::EditId;
use arbor_tree::{Delta, EditStatus, TransactionFailure};

#[derive(Debug, Clone, PartialEq)]
pub enum SharedTreeEvent {
    /// A local edit was applied to the current view.
    EditCommitted { edit_id: EditId },

    /// An edit was sequenced and applied to the base view.
    SequencedEditApplied {
        edit_id: EditId,
        seq: u64,
        was_local: bool,
        status: EditStatus,
        failure: Option<TransactionFailure>,
    },

    /// A local edit no longer applies and was dropped.
    EditFailed {
        edit_id: EditId,
        status: EditStatus,
        failure: TransactionFailure,
    },

    /// The current view changed.
    ViewChange { delta: Delta },
}

pub type Listener = Box<dyn FnMut(&SharedTreeEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct Subscribers {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: &SharedTreeEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
