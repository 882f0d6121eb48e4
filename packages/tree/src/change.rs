//! # Changes
//!
//! The closed set of primitive mutations, and the [`Edit`] that batches
//! them.
//!
//! ```text
//!   Build    literal nodes   ──▶ detached sequence
//!   Insert   detached seq    ──▶ live place
//!   Detach   live range      ──▶ detached sequence (or deleted)
//!   SetValue node            ──▶ new payload
//!   Constraint               ──▶ precondition on a range
//! ```
//!
//! Detached sequences are scratch slots scoped to one edit. They let an edit
//! build a subtree and then insert it, or detach a range and insert it
//! elsewhere (a move).

use crate::anchors::{StablePlace, StableRange, TraitLocation};
use crate::node::BuildNode;
use crate::payload::Payload;
use arbor_common::{DetachedSequenceId, EditId, NodeId, TraitLabel};
use serde::{Deserialize, Serialize};

/// What happens to an edit whose constraint does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintEffect {
    /// The edit is invalid and should not be retried.
    InvalidAndDiscard,
    /// The edit is invalid; the author may retry it against fresh state.
    InvalidRetry,
    /// The violation is ignored and the edit proceeds.
    ValidRetry,
}

/// Precondition on the shape of a range at apply time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint<Id = NodeId> {
    pub to_constrain: StableRange<Id>,
    /// Exact ordered node ids the range must span.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub identity: Option<Vec<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub parent_node: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<TraitLabel>,
    pub effect: ConstraintEffect,
}

impl<Id> Constraint<Id> {
    pub fn new(to_constrain: StableRange<Id>, effect: ConstraintEffect) -> Self {
        Self {
            to_constrain,
            identity: None,
            length: None,
            parent_node: None,
            label: None,
            effect,
        }
    }

    pub fn with_identity(mut self, ids: Vec<Id>) -> Self {
        self.identity = Some(ids);
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_parent(mut self, parent: Id) -> Self {
        self.parent_node = Some(parent);
        self
    }

    pub fn with_label(mut self, label: impl Into<TraitLabel>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Change<Id = NodeId> {
    Build {
        destination: DetachedSequenceId,
        source: Vec<BuildNode<Id>>,
    },
    Insert {
        destination: StablePlace<Id>,
        source: DetachedSequenceId,
    },
    Detach {
        source: StableRange<Id>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<DetachedSequenceId>,
    },
    /// `payload: None` clears the payload.
    SetValue {
        node: Id,
        #[serde(default)]
        payload: Option<Payload>,
    },
    Constraint(Constraint<Id>),
}

impl<Id: Copy> Change<Id> {
    pub fn build(source: Vec<BuildNode<Id>>, destination: DetachedSequenceId) -> Self {
        Change::Build {
            destination,
            source,
        }
    }

    pub fn insert(source: DetachedSequenceId, destination: StablePlace<Id>) -> Self {
        Change::Insert {
            destination,
            source,
        }
    }

    pub fn detach(source: StableRange<Id>, destination: Option<DetachedSequenceId>) -> Self {
        Change::Detach {
            source,
            destination,
        }
    }

    /// Detach a range and drop it.
    pub fn delete(range: StableRange<Id>) -> Self {
        Change::detach(range, None)
    }

    pub fn set_payload(node: Id, payload: Payload) -> Self {
        Change::SetValue {
            node,
            payload: Some(payload),
        }
    }

    pub fn clear_payload(node: Id) -> Self {
        Change::SetValue { node, payload: None }
    }

    pub fn constraint(constraint: Constraint<Id>) -> Self {
        Change::Constraint(constraint)
    }

    /// Build `nodes` and insert them at `place`.
    pub fn insert_tree(nodes: Vec<BuildNode<Id>>, place: StablePlace<Id>) -> Vec<Change<Id>> {
        let slot = DetachedSequenceId(0);
        vec![Change::build(nodes, slot), Change::insert(slot, place)]
    }

    /// Replace everything in `trait_location` with `nodes`.
    pub fn set_trait(trait_location: TraitLocation<Id>, nodes: Vec<BuildNode<Id>>) -> Vec<Change<Id>> {
        let slot = DetachedSequenceId(0);
        vec![
            Change::delete(StableRange::all(trait_location.clone())),
            Change::build(nodes, slot),
            Change::insert(slot, StablePlace::at_start_of(trait_location)),
        ]
    }

    /// Move `range` to `place`.
    pub fn move_to(range: StableRange<Id>, place: StablePlace<Id>) -> Vec<Change<Id>> {
        let slot = DetachedSequenceId(0);
        vec![Change::detach(range, Some(slot)), Change::insert(slot, place)]
    }

    pub fn try_map_node_ids<U, E>(
        &self,
        f: &mut impl FnMut(Id) -> Result<U, E>,
    ) -> Result<Change<U>, E> {
        Ok(match self {
            Change::Build {
                destination,
                source,
            } => Change::Build {
                destination: *destination,
                source: source
                    .iter()
                    .map(|node| node.try_map_node_ids(f))
                    .collect::<Result<_, E>>()?,
            },
            Change::Insert {
                destination,
                source,
            } => Change::Insert {
                destination: destination.try_map_node_ids(f)?,
                source: *source,
            },
            Change::Detach {
                source,
                destination,
            } => Change::Detach {
                source: source.try_map_node_ids(f)?,
                destination: *destination,
            },
            Change::SetValue { node, payload } => Change::SetValue {
                node: f(*node)?,
                payload: payload.clone(),
            },
            Change::Constraint(c) => Change::Constraint(Constraint {
                to_constrain: c.to_constrain.try_map_node_ids(f)?,
                identity: match &c.identity {
                    Some(ids) => Some(ids.iter().map(|id| f(*id)).collect::<Result<_, E>>()?),
                    None => None,
                },
                length: c.length,
                parent_node: c.parent_node.map(&mut *f).transpose()?,
                label: c.label.clone(),
                effect: c.effect,
            }),
        })
    }

    /// Detached sequence ids this change mentions.
    pub fn detached_sequence_ids(&self) -> Vec<DetachedSequenceId> {
        fn collect<Id>(node: &BuildNode<Id>, out: &mut Vec<DetachedSequenceId>) {
            match node {
                BuildNode::Detached(id) => out.push(*id),
                BuildNode::Tree(tree) => tree.traits.values().flatten().for_each(|c| collect(c, out)),
            }
        }
        let mut out = Vec::new();
        match self {
            Change::Build {
                destination,
                source,
            } => {
                out.push(*destination);
                source.iter().for_each(|n| collect(n, &mut out));
            }
            Change::Insert { source, .. } => out.push(*source),
            Change::Detach {
                destination: Some(d),
                ..
            } => out.push(*d),
            _ => {}
        }
        out
    }
}

/// An atomic batch of changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit<Id = NodeId> {
    pub id: EditId,
    pub changes: Vec<Change<Id>>,
}

impl<Id: Copy> Edit<Id> {
    /// New edit with a random id.
    pub fn new(changes: Vec<Change<Id>>) -> Self {
        Self::with_id(EditId::random(), changes)
    }

    pub fn with_id(id: EditId, changes: Vec<Change<Id>>) -> Self {
        Self { id, changes }
    }

    pub fn try_map_node_ids<U, E>(&self, mut f: impl FnMut(Id) -> Result<U, E>) -> Result<Edit<U>, E> {
        Ok(Edit {
            id: self.id,
            changes: self
                .changes
                .iter()
                .map(|c| c.try_map_node_ids(&mut f))
                .collect::<Result<_, E>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BuildTreeNode;
    use serde_json::json;

    #[test]
    fn test_change_json_shape() {
        let change = Change::set_payload(NodeId(4), json!({"x": 1}));
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value, json!({"type": "setValue", "node": 4, "payload": {"x": 1}}));

        let detach = Change::delete(StableRange::only(NodeId(2)));
        let value = serde_json::to_value(&detach).unwrap();
        assert_eq!(
            value,
            json!({"type": "detach", "source": {"start": {"before": 2}, "end": {"after": 2}}})
        );
    }

    #[test]
    fn test_constraint_json_round_trip() {
        let change = Change::constraint(
            Constraint::new(
                StableRange::all(TraitLocation::new(NodeId(0), "children")),
                ConstraintEffect::InvalidRetry,
            )
            .with_length(2)
            .with_parent(NodeId(0)),
        );
        let text = serde_json::to_string(&change).unwrap();
        let back: Change = serde_json::from_str(&text).unwrap();
        assert_eq!(back, change);
    }

    #[test]
    fn test_map_node_ids_covers_every_reference() {
        let place = StablePlace::at_index(TraitLocation::new(NodeId(0), "children"), 0);
        let mut changes = Change::insert_tree(vec![BuildTreeNode::new(NodeId(-1), "Foo").into()], place);
        changes.push(Change::constraint(
            Constraint::new(StableRange::only(NodeId(-1)), ConstraintEffect::ValidRetry)
                .with_identity(vec![NodeId(-1)])
                .with_parent(NodeId(0)),
        ));
        let edit = Edit::with_id(EditId::from_u128(1), changes);
        let mapped = edit.try_map_node_ids(|id| Ok::<_, ()>(NodeId(id.0 + 10))).unwrap();

        let text = serde_json::to_string(&mapped).unwrap();
        assert!(!text.contains("-1"));
        assert_eq!(mapped.id, edit.id);
    }

    #[test]
    fn test_move_uses_one_detached_slot() {
        let changes = Change::move_to(StableRange::only(NodeId(3)), StablePlace::after(NodeId(5)));
        assert_eq!(changes[0].detached_sequence_ids(), vec![DetachedSequenceId(0)]);
        assert_eq!(changes[1].detached_sequence_ids(), vec![DetachedSequenceId(0)]);
    }
}
