//! # Edit Log
//!
//! The ordered history of a document: sequenced edits, which are frozen once
//! added, followed by local edits that have not been sequenced yet.
//!
//! ```text
//!   base_seq │ seq base+1 … latest (sequenced, immutable) │ local 0 … n (replaceable)
//! ```
//!
//! The log may start after sequence number 0 when it was loaded from a
//! summary that only retains a trailing window of history. Views below
//! `base_seq` are unavailable.
//!
//! ## Design
//!
//! `view_at(seq)` replays forward from the nearest cached view. Edits that
//! were invalid when sequenced stay in the log but leave the view unchanged,
//! so replay reproduces exactly what every replica computed.

use crate::errors::EditorError;
use crate::revision_cache::RevisionCache;
use arbor_common::EditId;
use arbor_tree::{apply_edit, Edit, RevisionView};
use tracing::debug;

/// Where an edit lives in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditLocation {
    Sequenced(u64),
    Local(usize),
}

#[derive(Debug, Clone)]
pub struct EditLog {
    base_seq: u64,
    base_view: RevisionView,
    sequenced: Vec<Edit>,
    local: Vec<Edit>,
    cache: RevisionCache<RevisionView>,
    pinned: Option<u64>,
}

impl EditLog {
    /// Empty log starting from `initial_view` at sequence number 0.
    pub fn new(initial_view: RevisionView, cache_size: usize) -> Self {
        Self::from_snapshot(0, initial_view, Vec::new(), cache_size)
    }

    /// Log whose history starts at `base_seq` with the given view, followed
    /// by `edits` sequenced at `base_seq + 1`, `base_seq + 2`, ...
    pub fn from_snapshot(base_seq: u64, base_view: RevisionView, edits: Vec<Edit>, cache_size: usize) -> Self {
        Self {
            base_seq,
            base_view,
            sequenced: edits,
            local: Vec::new(),
            cache: RevisionCache::new(cache_size),
            pinned: None,
        }
    }

    /// Sequence number of the oldest retained view.
    pub fn earliest_seq(&self) -> u64 {
        self.base_seq
    }

    pub fn latest_seq(&self) -> u64 {
        self.base_seq + self.sequenced.len() as u64
    }

    pub fn sequenced_edits(&self) -> &[Edit] {
        &self.sequenced
    }

    pub fn local_edits(&self) -> &[Edit] {
        &self.local
    }

    /// Sequenced edit at `seq`, if retained.
    pub fn sequenced_edit_at(&self, seq: u64) -> Option<&Edit> {
        if seq <= self.base_seq {
            return None;
        }
        self.sequenced.get((seq - self.base_seq - 1) as usize)
    }

    pub fn location_of(&self, id: EditId) -> Option<EditLocation> {
        if let Some(index) = self.local.iter().position(|e| e.id == id) {
            return Some(EditLocation::Local(index));
        }
        self.sequenced
            .iter()
            .position(|e| e.id == id)
            .map(|index| EditLocation::Sequenced(self.base_seq + 1 + index as u64))
    }

    pub fn get_edit(&self, id: EditId) -> Option<&Edit> {
        match self.location_of(id)? {
            EditLocation::Local(index) => self.local.get(index),
            EditLocation::Sequenced(seq) => self.sequenced_edit_at(seq),
        }
    }

    pub fn add_local_edit(&mut self, edit: Edit) {
        debug!(edit_id = %edit.id, "local edit added");
        self.local.push(edit);
    }

    /// Append a sequenced edit. `seq` must directly follow the latest one.
    ///
    /// A local edit with the same id is removed: it is now sequenced.
    pub fn add_sequenced_edit(&mut self, edit: Edit, seq: u64) -> Result<(), EditorError> {
        let expected = self.latest_seq() + 1;
        if seq != expected {
            return Err(EditorError::Fatal(format!(
                "edit {} sequenced at {seq}, expected {expected}",
                edit.id
            )));
        }
        self.local.retain(|e| e.id != edit.id);
        debug!(edit_id = %edit.id, seq, "sequenced edit added");
        self.sequenced.push(edit);
        Ok(())
    }

    pub fn remove_local_edit(&mut self, id: EditId) -> Option<Edit> {
        let index = self.local.iter().position(|e| e.id == id)?;
        Some(self.local.remove(index))
    }

    pub fn cache_view(&mut self, seq: u64, view: RevisionView) {
        self.cache.insert(seq, view);
    }

    /// Cache `view` at `seq` and keep it until another view is pinned.
    pub fn pin_view(&mut self, seq: u64, view: RevisionView) {
        self.cache.insert(seq, view);
        if let Some(previous) = self.pinned.replace(seq) {
            if previous != seq {
                self.cache.unpin(previous);
            }
        }
        self.cache.pin(seq);
    }

    /// View after applying every sequenced edit up to and including `seq`.
    pub fn view_at(&mut self, seq: u64) -> Result<RevisionView, EditorError> {
        let latest = self.latest_seq();
        if seq < self.base_seq || seq > latest {
            return Err(EditorError::RevisionUnavailable {
                requested: seq,
                earliest: self.base_seq,
            });
        }

        let (mut at, mut view) = match self.cache.closest_at_or_before(seq) {
            Some((cached, view)) if cached >= self.base_seq => (cached, view.clone()),
            _ => (self.base_seq, self.base_view.clone()),
        };
        if at == seq {
            return Ok(view);
        }

        while at < seq {
            at += 1;
            let edit = &self.sequenced[(at - self.base_seq - 1) as usize];
            let result = apply_edit(&view, edit.changes.iter().cloned())?;
            if let Some(after) = result.after() {
                view = after.clone();
            }
        }
        debug!(seq, "replayed view");
        self.cache.insert(seq, view.clone());
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_common::NodeId;
    use arbor_tree::{BuildTreeNode, Change, StablePlace, StableRange, TraitLocation, TreeView};

    fn root_children() -> TraitLocation {
        TraitLocation::new(NodeId(0), "children")
    }

    fn insert(id: i64) -> Edit {
        Edit::new(Change::insert_tree(
            vec![BuildTreeNode::new(NodeId(id), "Node").into()],
            StablePlace::at_end_of(root_children()),
        ))
    }

    #[test]
    fn test_add_and_locate_edits() {
        let mut log = EditLog::new(RevisionView::initial(), 4);
        let a = insert(100);
        let b = insert(101);
        log.add_local_edit(a.clone());
        log.add_local_edit(b.clone());
        assert_eq!(log.location_of(b.id), Some(EditLocation::Local(1)));

        log.add_sequenced_edit(a.clone(), 1).unwrap();
        assert_eq!(log.location_of(a.id), Some(EditLocation::Sequenced(1)));
        assert_eq!(log.location_of(b.id), Some(EditLocation::Local(0)));
        assert_eq!(log.local_edits().len(), 1);
        assert_eq!(log.get_edit(a.id), Some(&a));
        assert_eq!(log.latest_seq(), 1);

        assert!(log.remove_local_edit(b.id).is_some());
        assert_eq!(log.location_of(b.id), None);
    }

    #[test]
    fn test_out_of_order_sequence_is_fatal() {
        let mut log = EditLog::new(RevisionView::initial(), 4);
        let err = log.add_sequenced_edit(insert(100), 2).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_view_at_replays_and_skips_invalid_edits() {
        let mut log = EditLog::new(RevisionView::initial(), 2);
        log.add_sequenced_edit(insert(100), 1).unwrap();
        log.add_sequenced_edit(Edit::new(vec![Change::delete(StableRange::only(NodeId(555)))]), 2)
            .unwrap();
        log.add_sequenced_edit(insert(101), 3).unwrap();

        let v0 = log.view_at(0).unwrap();
        let v1 = log.view_at(1).unwrap();
        let v2 = log.view_at(2).unwrap();
        let v3 = log.view_at(3).unwrap();
        assert_eq!(v0, RevisionView::initial());
        assert_eq!(v1.trait_children(&root_children()), &[NodeId(100)]);
        assert_eq!(v1, v2);
        assert_eq!(v3.trait_children(&root_children()), &[NodeId(100), NodeId(101)]);
        assert!(log.view_at(4).is_err());
    }

    #[test]
    fn test_windowed_log_rejects_older_revisions() {
        let mut log = EditLog::new(RevisionView::initial(), 2);
        log.add_sequenced_edit(insert(100), 1).unwrap();
        let base = log.view_at(1).unwrap();

        let mut windowed = EditLog::from_snapshot(1, base.clone(), vec![insert(101)], 2);
        assert_eq!(windowed.earliest_seq(), 1);
        assert_eq!(windowed.latest_seq(), 2);
        assert!(matches!(
            windowed.view_at(0),
            Err(EditorError::RevisionUnavailable { requested: 0, earliest: 1 })
        ));
        assert_eq!(windowed.view_at(1).unwrap(), base);
        assert_eq!(windowed.view_at(2).unwrap().size(), 3);
    }
}
