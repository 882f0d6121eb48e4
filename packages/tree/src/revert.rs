//! Inverse of an applied edit.
//!
//! [`revert`] replays an edit against the view it was applied to and emits
//! the changes that undo it, in reverse order:
//!
//! - an `Insert` of built nodes becomes a delete of the inserted range
//! - an `Insert` of moved nodes becomes a detach back into a sequence
//! - a `Detach` becomes a re-insert at the place the range used to start,
//!   rebuilding the removed subtrees from a snapshot when they were deleted
//! - a `SetValue` becomes a `SetValue` of the previous payload
//!
//! Constraints have no inverse and are skipped.

use crate::anchors::{place_before_range, resolve_range, StablePlace, StableRange};
use crate::change::Change;
use crate::node::BuildNode;
use crate::transaction::{EditStatus, Transaction};
use crate::view::{RevisionView, TreeView};
use arbor_common::DetachedSequenceId;
use std::collections::BTreeMap;
use tracing::debug;

/// What a detached sequence held by the replay came from.
enum Origin {
    Built,
    /// Detached from the tree. `slot` indexes the inverse of that detach;
    /// `fresh` is the sequence id the inverse re-inserts from.
    Moved { slot: usize, fresh: DetachedSequenceId },
}

/// Changes that undo `changes`, which were applied to `before`.
///
/// Returns `None` when the changes do not apply cleanly to `before`, or when
/// they build new nodes around a detached sequence.
pub fn revert(changes: &[Change], before: &RevisionView) -> Option<Vec<Change>> {
    let mut next_id = changes
        .iter()
        .flat_map(Change::detached_sequence_ids)
        .map(|id| id.0 + 1)
        .max()
        .unwrap_or(0);
    let mut fresh = || {
        let id = DetachedSequenceId(next_id);
        next_id += 1;
        id
    };

    let mut transaction = Transaction::new(before);
    let mut inverses: Vec<Vec<Change>> = Vec::with_capacity(changes.len());
    let mut origins: BTreeMap<DetachedSequenceId, Origin> = BTreeMap::new();
    let mut unconsumed: BTreeMap<usize, (DetachedSequenceId, Vec<BuildNode>)> = BTreeMap::new();

    for change in changes {
        let view = transaction.view();
        let inverse = match change {
            Change::Build {
                destination,
                source,
            } => {
                if source.iter().any(|n| matches!(n, BuildNode::Detached(_))) {
                    debug!("edit builds around a detached sequence, not revertible");
                    return None;
                }
                origins.insert(*destination, Origin::Built);
                Vec::new()
            }
            Change::Insert {
                destination: _,
                source,
            } => {
                let ids = transaction.detached_sequence(*source)?.to_vec();
                let (first, last) = (*ids.first()?, *ids.last()?);
                let range = StableRange::from(StablePlace::before(first)).to(StablePlace::after(last));
                match origins.remove(source)? {
                    Origin::Built => vec![Change::delete(range)],
                    Origin::Moved { slot, fresh } => {
                        unconsumed.remove(&slot);
                        vec![Change::detach(range, Some(fresh))]
                    }
                }
            }
            Change::Detach {
                source,
                destination,
            } => {
                let range = resolve_range(view, source).ok()?;
                let place = place_before_range(view, &range);
                let ids = view.trait_children(&range.trait_location)[range.start..range.end].to_vec();
                let snapshot = ids
                    .iter()
                    .map(|id| view.to_tree(*id).map(BuildNode::from))
                    .collect::<Option<Vec<_>>>()?;
                let slot_id = fresh();
                let slot = inverses.len();
                match destination {
                    Some(d) => {
                        origins.insert(*d, Origin::Moved { slot, fresh: slot_id });
                        unconsumed.insert(slot, (slot_id, snapshot));
                        vec![Change::insert(slot_id, place)]
                    }
                    None if ids.is_empty() => Vec::new(),
                    None => vec![Change::build(snapshot, slot_id), Change::insert(slot_id, place)],
                }
            }
            Change::SetValue { node, .. } => {
                let previous = view.get(*node)?.payload.clone();
                vec![Change::SetValue {
                    node: *node,
                    payload: previous,
                }]
            }
            Change::Constraint(_) => Vec::new(),
        };
        inverses.push(inverse);
        if transaction.apply_change(change.clone()) != EditStatus::Valid {
            return None;
        }
    }

    // Moved ranges never re-inserted were deleted at close; rebuild them.
    for (slot, (slot_id, snapshot)) in unconsumed {
        if let Some(Change::Insert { destination, .. }) = inverses[slot].first().cloned() {
            inverses[slot] = vec![Change::build(snapshot, slot_id), Change::insert(slot_id, destination)];
        }
    }

    Some(inverses.into_iter().rev().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::TraitLocation;
    use crate::node::{BuildTreeNode, ChangeNode};
    use crate::transaction::apply_edit;
    use arbor_common::NodeId;
    use serde_json::json;

    fn abc() -> RevisionView {
        let root = ChangeNode::new(NodeId(0), "root")
            .with_child("children", ChangeNode::new(NodeId(1), "A").with_payload(json!("a")))
            .with_child(
                "children",
                ChangeNode::new(NodeId(2), "B").with_child("kids", ChangeNode::new(NodeId(4), "D")),
            )
            .with_child("children", ChangeNode::new(NodeId(3), "C"));
        RevisionView::from_tree(&root).unwrap()
    }

    fn round_trip(changes: Vec<Change>) {
        let before = abc();
        let after = apply_edit(&before, changes.clone()).unwrap().after().unwrap().clone();
        let inverse = revert(&changes, &before).expect("revertible");
        let restored = apply_edit(&after, inverse).unwrap();
        assert_eq!(restored.after().unwrap(), &before);
    }

    #[test]
    fn test_revert_insert() {
        round_trip(Change::insert_tree(
            vec![BuildTreeNode::new(NodeId(10), "X").into()],
            StablePlace::after(NodeId(1)),
        ));
    }

    #[test]
    fn test_revert_delete_restores_subtree() {
        round_trip(vec![Change::delete(StableRange::only(NodeId(2)))]);
    }

    #[test]
    fn test_revert_move() {
        round_trip(Change::move_to(
            StableRange::only(NodeId(1)),
            StablePlace::at_end_of(TraitLocation::new(NodeId(3), "kids")),
        ));
    }

    #[test]
    fn test_revert_detach_without_reinsert() {
        round_trip(vec![Change::detach(
            StableRange::all(TraitLocation::new(NodeId(0), "children")),
            Some(DetachedSequenceId(4)),
        )]);
    }

    #[test]
    fn test_revert_set_value() {
        round_trip(vec![
            Change::set_payload(NodeId(1), json!("changed")),
            Change::set_payload(NodeId(3), json!(3)),
        ]);
    }

    #[test]
    fn test_revert_of_inapplicable_edit_is_none() {
        let changes = vec![Change::delete(StableRange::only(NodeId(77)))];
        assert!(revert(&changes, &abc()).is_none());
    }
}
