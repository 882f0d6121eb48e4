//! # Transaction Engine
//!
//! Applies the changes of one edit, in order, to a view.
//!
//! ```text
//!            apply_change (while Valid)
//!   Open ──────────────────────────────▶ Open
//!     │                                    │
//!     │ close                              │ first failing change
//!     ▼                                    ▼
//!   Valid(new view)             Invalid / Malformed (view discarded)
//! ```
//!
//! ## Design
//!
//! Every change sees the effect of the changes before it. The first failing
//! change fixes the outcome; later changes are ignored. Failures are values,
//! never errors: a [`ForestError`] only comes out of [`Transaction::close`]
//! when the forest itself rejects an operation that validation allowed.
//!
//! Classification:
//! - *Malformed*: the edit contradicts itself regardless of tree state
//!   (unknown or reused detached sequence ids, duplicate ids in a build,
//!   ids colliding with existing nodes, places naming an empty trait label,
//!   ids no session ever allocated).
//! - *Invalid*: well formed, but the current tree does not support it
//!   (anchors whose nodes are gone, cycles, failed constraints).
//!
//! Application is a pure function of the input view and change list.

use crate::anchors::{
    resolve_place, resolve_range, PlaceValidationResult, RangeValidationResult, TreeViewRange,
};
use crate::change::{Change, Constraint, ConstraintEffect};
use crate::error::ForestError;
use crate::forest::ForestNode;
use crate::node::BuildNode;
use crate::payload::Payload;
use crate::view::{RevisionView, TransactionView, TreeView};
use arbor_common::{DetachedSequenceId, NodeId, TraitLabel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Outcome class of applying an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditStatus {
    Malformed,
    Invalid,
    Valid,
}

/// Which assertion of a constraint did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintViolation {
    BadRange(RangeValidationResult),
    Identity,
    Length { expected: usize, actual: usize },
    ParentNode { expected: NodeId, actual: NodeId },
    Label { expected: TraitLabel, actual: TraitLabel },
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    #[error("Detached sequence {0:?} already in use")]
    DetachedSequenceIdAlreadyInUse(DetachedSequenceId),

    #[error("Detached sequence {0:?} not found")]
    DetachedSequenceNotFound(DetachedSequenceId),

    #[error("Build declares {0} more than once")]
    DuplicateIdInBuild(NodeId),

    #[error("Build declares {0}, which already exists")]
    IdAlreadyInUse(NodeId),

    #[error("Place does not resolve: {0:?}")]
    BadPlace(PlaceValidationResult),

    #[error("Range does not resolve: {0:?}")]
    BadRange(RangeValidationResult),

    #[error("Unknown node {0}")]
    UnknownId(NodeId),

    #[error("Inserting under {0} would create a cycle")]
    CycleDetected(NodeId),

    #[error("Constraint violated: {0:?}")]
    ConstraintViolation(ConstraintViolation),

    #[error("{0} was never allocated by any session")]
    UnknownIdSpace(NodeId),
}

impl FailureKind {
    pub fn status(&self) -> EditStatus {
        match self {
            FailureKind::DetachedSequenceIdAlreadyInUse(_)
            | FailureKind::DetachedSequenceNotFound(_)
            | FailureKind::DuplicateIdInBuild(_)
            | FailureKind::IdAlreadyInUse(_)
            | FailureKind::UnknownIdSpace(_) => EditStatus::Malformed,
            FailureKind::BadPlace(PlaceValidationResult::Malformed) => EditStatus::Malformed,
            FailureKind::BadRange(range) if range.is_malformed() => EditStatus::Malformed,
            _ => EditStatus::Invalid,
        }
    }

    /// Stable label for counting failures by kind.
    pub fn name(&self) -> &'static str {
        match self {
            FailureKind::DetachedSequenceIdAlreadyInUse(_) => "detachedSequenceIdAlreadyInUse",
            FailureKind::DetachedSequenceNotFound(_) => "detachedSequenceNotFound",
            FailureKind::DuplicateIdInBuild(_) => "duplicateIdInBuild",
            FailureKind::IdAlreadyInUse(_) => "idAlreadyInUse",
            FailureKind::BadPlace(_) => "badPlace",
            FailureKind::BadRange(_) => "badRange",
            FailureKind::UnknownId(_) => "unknownId",
            FailureKind::CycleDetected(_) => "cycleDetected",
            FailureKind::ConstraintViolation(_) => "constraintViolation",
            FailureKind::UnknownIdSpace(_) => "unknownIdSpace",
        }
    }
}

/// The first change of an edit that failed, and why.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("change {change_index} failed: {kind}")]
#[serde(rename_all = "camelCase")]
pub struct TransactionFailure {
    pub change_index: usize,
    pub kind: FailureKind,
}

/// Result of closing a transaction.
#[derive(Debug, Clone)]
pub enum EditingResult {
    Valid {
        changes: Vec<Change>,
        before: RevisionView,
        after: RevisionView,
    },
    Failed {
        status: EditStatus,
        failure: TransactionFailure,
        changes: Vec<Change>,
        before: RevisionView,
    },
}

impl EditingResult {
    pub fn status(&self) -> EditStatus {
        match self {
            EditingResult::Valid { .. } => EditStatus::Valid,
            EditingResult::Failed { status, .. } => *status,
        }
    }

    pub fn after(&self) -> Option<&RevisionView> {
        match self {
            EditingResult::Valid { after, .. } => Some(after),
            EditingResult::Failed { .. } => None,
        }
    }

    pub fn before(&self) -> &RevisionView {
        match self {
            EditingResult::Valid { before, .. } | EditingResult::Failed { before, .. } => before,
        }
    }

    pub fn changes(&self) -> &[Change] {
        match self {
            EditingResult::Valid { changes, .. } | EditingResult::Failed { changes, .. } => changes,
        }
    }

    pub fn failure(&self) -> Option<&TransactionFailure> {
        match self {
            EditingResult::Valid { .. } => None,
            EditingResult::Failed { failure, .. } => Some(failure),
        }
    }

    /// The resulting view, or the starting view if the edit failed.
    pub fn view(&self) -> &RevisionView {
        self.after().unwrap_or_else(|| self.before())
    }
}

/// Incremental application of one edit.
#[derive(Debug, Clone)]
pub struct Transaction {
    before: RevisionView,
    view: TransactionView,
    changes: Vec<Change>,
    detached: BTreeMap<DetachedSequenceId, Vec<NodeId>>,
    status: EditStatus,
    failure: Option<TransactionFailure>,
    fatal: Option<ForestError>,
}

impl Transaction {
    pub fn new(view: &RevisionView) -> Self {
        Self {
            before: view.clone(),
            view: view.open_for_transaction(),
            changes: Vec::new(),
            detached: BTreeMap::new(),
            status: EditStatus::Valid,
            failure: None,
            fatal: None,
        }
    }

    pub fn status(&self) -> EditStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&TransactionFailure> {
        self.failure.as_ref()
    }

    /// Intermediate state, including nodes held in detached sequences.
    pub fn view(&self) -> &TransactionView {
        &self.view
    }

    pub fn before(&self) -> &RevisionView {
        &self.before
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Top-level nodes currently held by a detached sequence.
    pub fn detached_sequence(&self, id: DetachedSequenceId) -> Option<&[NodeId]> {
        self.detached.get(&id).map(|ids| ids.as_slice())
    }

    /// Apply one change. Does nothing once the transaction has failed.
    pub fn apply_change(&mut self, change: Change) -> EditStatus {
        let index = self.changes.len();
        if self.status == EditStatus::Valid && self.fatal.is_none() {
            match self.dispatch(&change) {
                Ok(Ok(())) => {}
                Ok(Err(kind)) => {
                    debug!(change_index = index, failure = %kind, "change failed");
                    self.status = kind.status();
                    self.failure = Some(TransactionFailure {
                        change_index: index,
                        kind,
                    });
                }
                Err(fatal) => self.fatal = Some(fatal),
            }
        }
        self.changes.push(change);
        self.status
    }

    pub fn apply_changes(&mut self, changes: impl IntoIterator<Item = Change>) -> EditStatus {
        for change in changes {
            self.apply_change(change);
        }
        self.status
    }

    /// Finish the edit. Detached sequences nobody re-inserted are deleted.
    #[instrument(level = "debug", skip_all)]
    pub fn close(mut self) -> Result<EditingResult, ForestError> {
        if let Some(fatal) = self.fatal {
            return Err(fatal);
        }
        if let Some(failure) = self.failure {
            return Ok(EditingResult::Failed {
                status: self.status,
                failure,
                changes: self.changes,
                before: self.before,
            });
        }

        let orphans: Vec<NodeId> = std::mem::take(&mut self.detached).into_values().flatten().collect();
        if !orphans.is_empty() {
            debug!(count = orphans.len(), "deleting orphaned detached nodes");
            self.view.delete_nodes(&orphans)?;
        }
        debug!(changes = self.changes.len(), "edit valid");
        Ok(EditingResult::Valid {
            changes: self.changes,
            before: self.before,
            after: self.view.close(),
        })
    }

    fn dispatch(&mut self, change: &Change) -> Result<Result<(), FailureKind>, ForestError> {
        match change {
            Change::Build {
                destination,
                source,
            } => self.apply_build(*destination, source),
            Change::Insert {
                destination,
                source,
            } => {
                let Some(ids) = self.detached.get(source) else {
                    return Ok(Err(FailureKind::DetachedSequenceNotFound(*source)));
                };
                let place = match resolve_place(&self.view, destination) {
                    Ok(place) => place,
                    Err(bad) => return Ok(Err(FailureKind::BadPlace(bad))),
                };
                let moving: BTreeSet<NodeId> = ids.iter().copied().collect();
                let mut ancestor = Some(place.trait_location.parent);
                while let Some(current) = ancestor {
                    if moving.contains(&current) {
                        return Ok(Err(FailureKind::CycleDetected(current)));
                    }
                    ancestor = self.view.forest().parent_of(current).map(|p| p.parent);
                }
                let ids = self.detached.remove(source).unwrap_or_default();
                self.view.attach_range(&place, &ids)?;
                Ok(Ok(()))
            }
            Change::Detach {
                source,
                destination,
            } => {
                if let Some(d) = destination {
                    if self.detached.contains_key(d) {
                        return Ok(Err(FailureKind::DetachedSequenceIdAlreadyInUse(*d)));
                    }
                }
                let range = match resolve_range(&self.view, source) {
                    Ok(range) => range,
                    Err(bad) => return Ok(Err(FailureKind::BadRange(bad))),
                };
                let ids = self.view.detach_range(&range)?;
                match destination {
                    Some(d) => {
                        self.detached.insert(*d, ids);
                    }
                    None => self.view.delete_nodes(&ids)?,
                }
                Ok(Ok(()))
            }
            Change::SetValue { node, payload } => {
                if !self.view.has_node(*node) {
                    return Ok(Err(FailureKind::UnknownId(*node)));
                }
                self.view.set_node_value(*node, normalized(payload))?;
                Ok(Ok(()))
            }
            Change::Constraint(constraint) => Ok(self.check_constraint(constraint)),
        }
    }

    fn apply_build(
        &mut self,
        destination: DetachedSequenceId,
        source: &[BuildNode],
    ) -> Result<Result<(), FailureKind>, ForestError> {
        if self.detached.contains_key(&destination) {
            return Ok(Err(FailureKind::DetachedSequenceIdAlreadyInUse(destination)));
        }

        let mut builder = Builder {
            view: &self.view,
            detached: &mut self.detached,
            declared: BTreeSet::new(),
            nodes: Vec::new(),
        };
        let top = match builder.build_sequence(source) {
            Ok(top) => top,
            Err(kind) => return Ok(Err(kind)),
        };
        let nodes = builder.nodes;
        self.view.add_nodes(nodes)?;
        self.detached.insert(destination, top);
        Ok(Ok(()))
    }

    fn check_constraint(&self, constraint: &Constraint) -> Result<(), FailureKind> {
        let violation = match resolve_range(&self.view, &constraint.to_constrain) {
            Err(bad) if bad.is_malformed() => return Err(FailureKind::BadRange(bad)),
            Err(bad) => Some(ConstraintViolation::BadRange(bad)),
            Ok(range) => self.constraint_violation(constraint, &range),
        };
        match (violation, constraint.effect) {
            (None, _) => Ok(()),
            (Some(violation), ConstraintEffect::ValidRetry) => {
                debug!(?violation, "constraint violation ignored");
                Ok(())
            }
            (Some(violation), _) => Err(FailureKind::ConstraintViolation(violation)),
        }
    }

    fn constraint_violation(&self, constraint: &Constraint, range: &TreeViewRange) -> Option<ConstraintViolation> {
        if let Some(length) = constraint.length {
            if length != range.len() {
                return Some(ConstraintViolation::Length {
                    expected: length,
                    actual: range.len(),
                });
            }
        }
        if let Some(identity) = &constraint.identity {
            let actual = &self.view.trait_children(&range.trait_location)[range.start..range.end];
            if identity.as_slice() != actual {
                return Some(ConstraintViolation::Identity);
            }
        }
        if let Some(parent) = constraint.parent_node {
            if parent != range.trait_location.parent {
                return Some(ConstraintViolation::ParentNode {
                    expected: parent,
                    actual: range.trait_location.parent,
                });
            }
        }
        if let Some(label) = &constraint.label {
            if *label != range.trait_location.label {
                return Some(ConstraintViolation::Label {
                    expected: label.clone(),
                    actual: range.trait_location.label.clone(),
                });
            }
        }
        None
    }
}

/// Flattens `Build` sources into forest nodes.
struct Builder<'a> {
    view: &'a TransactionView,
    detached: &'a mut BTreeMap<DetachedSequenceId, Vec<NodeId>>,
    declared: BTreeSet<NodeId>,
    nodes: Vec<ForestNode>,
}

impl Builder<'_> {
    fn build_sequence(&mut self, source: &[BuildNode]) -> Result<Vec<NodeId>, FailureKind> {
        let mut ids = Vec::with_capacity(source.len());
        for node in source {
            match node {
                BuildNode::Detached(seq) => {
                    let spliced = self
                        .detached
                        .remove(seq)
                        .ok_or(FailureKind::DetachedSequenceNotFound(*seq))?;
                    ids.extend(spliced);
                }
                BuildNode::Tree(tree) => {
                    if !self.declared.insert(tree.identifier) {
                        return Err(FailureKind::DuplicateIdInBuild(tree.identifier));
                    }
                    if self.view.has_node(tree.identifier) {
                        return Err(FailureKind::IdAlreadyInUse(tree.identifier));
                    }
                    let mut forest_node =
                        ForestNode::new(tree.identifier, tree.definition.clone(), normalized(&tree.payload));
                    for (label, children) in &tree.traits {
                        let child_ids = self.build_sequence(children)?;
                        if !child_ids.is_empty() {
                            forest_node.traits.insert(label.clone(), Arc::new(child_ids));
                        }
                    }
                    self.nodes.push(forest_node);
                    ids.push(tree.identifier);
                }
            }
        }
        Ok(ids)
    }
}

/// A null payload is stored as no payload.
fn normalized(payload: &Option<Payload>) -> Option<Payload> {
    payload.clone().filter(|p| !p.is_null())
}

/// Apply a whole change list to `view`.
pub fn apply_edit(
    view: &RevisionView,
    changes: impl IntoIterator<Item = Change>,
) -> Result<EditingResult, ForestError> {
    let mut transaction = Transaction::new(view);
    transaction.apply_changes(changes);
    transaction.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::{StablePlace, StableRange, TraitLocation};
    use crate::node::{BuildTreeNode, ChangeNode};
    use serde_json::json;

    fn children() -> TraitLocation {
        TraitLocation::new(NodeId(0), "children")
    }

    fn abc() -> RevisionView {
        let root = ChangeNode::new(NodeId(0), "root")
            .with_child("children", ChangeNode::new(NodeId(1), "A"))
            .with_child("children", ChangeNode::new(NodeId(2), "B"))
            .with_child("children", ChangeNode::new(NodeId(3), "C"));
        RevisionView::from_tree(&root).unwrap()
    }

    fn ids_under_root(view: &RevisionView) -> Vec<NodeId> {
        view.trait_children(&children()).to_vec()
    }

    fn leaf(id: i64) -> BuildNode {
        BuildTreeNode::new(NodeId(id), "X").into()
    }

    #[test]
    fn test_insert_tree() {
        let view = abc();
        let result = apply_edit(&view, Change::insert_tree(vec![leaf(10)], StablePlace::after(NodeId(1)))).unwrap();
        assert_eq!(result.status(), EditStatus::Valid);
        assert_eq!(
            ids_under_root(result.after().unwrap()),
            vec![NodeId(1), NodeId(10), NodeId(2), NodeId(3)]
        );
    }

    #[test]
    fn test_set_trait_replaces_contents() {
        let view = abc();
        let result = apply_edit(&view, Change::set_trait(children(), vec![leaf(10), leaf(11)])).unwrap();
        let after = result.after().unwrap();
        assert_eq!(ids_under_root(after), vec![NodeId(10), NodeId(11)]);
        assert!(!after.has_node(NodeId(2)));

        let inner = TraitLocation::new(NodeId(3), "inner");
        let result = apply_edit(&view, Change::set_trait(inner.clone(), vec![leaf(12)])).unwrap();
        assert_eq!(result.status(), EditStatus::Valid);
        assert_eq!(result.after().unwrap().trait_children(&inner), &[NodeId(12)]);
    }

    #[test]
    fn test_move_between_traits() {
        let view = abc();
        let dest = StablePlace::at_start_of(TraitLocation::new(NodeId(3), "inner"));
        let result = apply_edit(&view, Change::move_to(StableRange::only(NodeId(1)), dest)).unwrap();
        let after = result.after().unwrap();
        assert_eq!(ids_under_root(after), vec![NodeId(2), NodeId(3)]);
        assert_eq!(after.parent_of(NodeId(1)), Some(TraitLocation::new(NodeId(3), "inner")));
        assert_eq!(after.size(), 4);
    }

    #[test]
    fn test_delete_removes_subtree() {
        let view = apply_edit(
            &abc(),
            vec![
                Change::build(vec![leaf(20)], DetachedSequenceId(0)),
                Change::insert(DetachedSequenceId(0), StablePlace::at_start_of(TraitLocation::new(NodeId(2), "x"))),
                Change::delete(StableRange::only(NodeId(2))),
            ],
        )
        .unwrap();
        let after = view.after().unwrap();
        assert!(!after.has_node(NodeId(2)));
        assert!(!after.has_node(NodeId(20)));
        assert_eq!(after.size(), 3);
    }

    #[test]
    fn test_orphaned_detached_sequences_are_deleted() {
        let result = apply_edit(
            &abc(),
            vec![Change::detach(StableRange::only(NodeId(3)), Some(DetachedSequenceId(7)))],
        )
        .unwrap();
        assert!(!result.after().unwrap().has_node(NodeId(3)));
    }

    #[test]
    fn test_build_with_existing_id_is_malformed() {
        let result = apply_edit(&abc(), Change::insert_tree(vec![leaf(2)], StablePlace::after(NodeId(1)))).unwrap();
        assert_eq!(result.status(), EditStatus::Malformed);
        assert_eq!(result.failure().unwrap().kind, FailureKind::IdAlreadyInUse(NodeId(2)));
    }

    #[test]
    fn test_build_with_duplicate_ids_is_malformed() {
        let result = apply_edit(&abc(), vec![Change::build(vec![leaf(9), leaf(9)], DetachedSequenceId(0))]).unwrap();
        assert_eq!(result.status(), EditStatus::Malformed);
    }

    #[test]
    fn test_insert_of_unknown_sequence_is_malformed() {
        let result = apply_edit(&abc(), vec![Change::insert(DetachedSequenceId(3), StablePlace::after(NodeId(1)))]).unwrap();
        assert_eq!(result.status(), EditStatus::Malformed);
    }

    #[test]
    fn test_missing_sibling_is_invalid_and_atomic() {
        let mut changes = vec![Change::set_payload(NodeId(1), json!(1))];
        changes.extend(Change::insert_tree(vec![leaf(10)], StablePlace::before(NodeId(99))));
        let result = apply_edit(&abc(), changes).unwrap();
        assert_eq!(result.status(), EditStatus::Invalid);
        assert_eq!(result.failure().unwrap().change_index, 2);
        assert_eq!(result.view(), &abc());
    }

    #[test]
    fn test_set_value_and_clear() {
        let result = apply_edit(&abc(), vec![Change::set_payload(NodeId(2), json!({"k": true}))]).unwrap();
        let view = result.after().unwrap().clone();
        assert_eq!(view.get(NodeId(2)).unwrap().payload, Some(json!({"k": true})));

        let cleared = apply_edit(&view, vec![Change::clear_payload(NodeId(2))]).unwrap();
        assert_eq!(cleared.after().unwrap().get(NodeId(2)).unwrap().payload, None);

        let unknown = apply_edit(&view, vec![Change::clear_payload(NodeId(50))]).unwrap();
        assert_eq!(unknown.failure().unwrap().kind, FailureKind::UnknownId(NodeId(50)));
    }

    #[test]
    fn test_cycle_is_invalid() {
        let view = apply_edit(
            &abc(),
            Change::insert_tree(vec![leaf(5)], StablePlace::at_start_of(TraitLocation::new(NodeId(1), "kids"))),
        )
        .unwrap()
        .after()
        .unwrap()
        .clone();
        let result = apply_edit(
            &view,
            Change::move_to(
                StableRange::only(NodeId(1)),
                StablePlace::at_end_of(TraitLocation::new(NodeId(5), "kids")),
            ),
        )
        .unwrap();
        assert_eq!(result.status(), EditStatus::Invalid);
        assert_eq!(result.failure().unwrap().kind, FailureKind::CycleDetected(NodeId(1)));
    }

    #[test]
    fn test_constraints() {
        let range = StableRange::from(StablePlace::before(NodeId(1))).to(StablePlace::after(NodeId(2)));
        let holds = Constraint::new(range.clone(), ConstraintEffect::InvalidAndDiscard)
            .with_identity(vec![NodeId(1), NodeId(2)])
            .with_length(2)
            .with_parent(NodeId(0))
            .with_label("children");
        assert_eq!(
            apply_edit(&abc(), vec![Change::constraint(holds)]).unwrap().status(),
            EditStatus::Valid
        );

        let broken = Constraint::new(range.clone(), ConstraintEffect::InvalidRetry).with_length(3);
        let result = apply_edit(&abc(), vec![Change::constraint(broken.clone())]).unwrap();
        assert_eq!(
            result.failure().unwrap().kind,
            FailureKind::ConstraintViolation(ConstraintViolation::Length { expected: 3, actual: 2 })
        );

        let ignored = Constraint {
            effect: ConstraintEffect::ValidRetry,
            ..broken
        };
        assert_eq!(
            apply_edit(&abc(), vec![Change::constraint(ignored)]).unwrap().status(),
            EditStatus::Valid
        );
    }

    #[test]
    fn test_build_can_splice_detached_sequence() {
        let wrapper = BuildTreeNode::new(NodeId(30), "Wrapper").with_child("items", DetachedSequenceId(1));
        let result = apply_edit(
            &abc(),
            vec![
                Change::detach(StableRange::all(children()), Some(DetachedSequenceId(1))),
                Change::build(vec![wrapper.into()], DetachedSequenceId(2)),
                Change::insert(DetachedSequenceId(2), StablePlace::at_start_of(children())),
            ],
        )
        .unwrap();
        let after = result.after().unwrap();
        assert_eq!(ids_under_root(after), vec![NodeId(30)]);
        assert_eq!(
            after.trait_children(&TraitLocation::new(NodeId(30), "items")),
            &[NodeId(1), NodeId(2), NodeId(3)]
        );
    }

    #[test]
    fn test_application_is_deterministic() {
        let changes = Change::insert_tree(vec![leaf(10), leaf(11)], StablePlace::before(NodeId(3)));
        let a = apply_edit(&abc(), changes.clone()).unwrap();
        let b = apply_edit(&abc(), changes).unwrap();
        assert_eq!(a.after(), b.after());
        assert!(a.after().unwrap().delta(b.after().unwrap()).is_empty());
    }
}
