//! # Views
//!
//! Immutable snapshots of a whole tree.
//!
//! A [`RevisionView`] is the state after some prefix of an edit log. A
//! [`TransactionView`] is the scratch state of one edit being applied: it
//! may hold detached nodes and is turned back into a `RevisionView` by
//! [`TransactionView::close`]. Both are cheap to clone and share all
//! unchanged structure with the view they were derived from.
//!
//! ## Design
//!
//! Read access goes through the [`TreeView`] trait so anchor resolution and
//! cursors work on either kind of view. Mutation is only available on
//! `TransactionView`, which only the transaction engine creates.

use crate::anchors::{TraitLocation, TreeViewPlace, TreeViewRange};
use crate::cursor::{Cursor, TreeNodeHandle};
use crate::error::ForestError;
use crate::forest::{Delta, Forest, ForestNode};
use crate::node::ChangeNode;
use crate::payload::{compare_payloads, Payload};
use arbor_common::{Definition, IdCompressor, NodeId, StableId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Definition of the root node every document starts with.
pub const INITIAL_TREE_DEFINITION: &str = "SharedTree.root";

/// The tree every document starts from: a lone root with final id 0.
pub fn initial_tree() -> ChangeNode {
    ChangeNode::new(NodeId::from_final(0), INITIAL_TREE_DEFINITION)
}

/// Read access shared by every kind of view.
pub trait TreeView {
    fn root(&self) -> NodeId;

    fn forest(&self) -> &Forest;

    fn has_node(&self, id: NodeId) -> bool {
        self.forest().has(id)
    }

    fn get(&self, id: NodeId) -> Option<&ForestNode> {
        self.forest().get(id)
    }

    fn try_get(&self, id: NodeId) -> Result<&ForestNode, ForestError> {
        self.forest().try_get(id)
    }

    fn parent_of(&self, id: NodeId) -> Option<TraitLocation> {
        self.forest().parent_of(id).map(|p| TraitLocation {
            parent: p.parent,
            label: p.label.clone(),
        })
    }

    fn trait_children(&self, location: &TraitLocation) -> &[NodeId] {
        self.get(location.parent)
            .map(|node| node.children(&location.label))
            .unwrap_or(&[])
    }

    fn index_in_trait(&self, id: NodeId) -> Option<usize> {
        let location = self.parent_of(id)?;
        self.trait_children(&location).iter().position(|c| *c == id)
    }

    fn size(&self) -> usize {
        self.forest().size()
    }

    /// Whether `id` is reachable from the root.
    fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root() {
                return true;
            }
            match self.forest().parent_of(current) {
                Some(p) => current = p.parent,
                None => return false,
            }
        }
    }

    /// Owned snapshot of the subtree under `id`.
    fn to_tree(&self, id: NodeId) -> Option<ChangeNode> {
        let node = self.get(id)?;
        let mut traits = BTreeMap::new();
        for (label, children) in &node.traits {
            let built = children
                .iter()
                .map(|child| self.to_tree(*child))
                .collect::<Option<Vec<_>>>()?;
            traits.insert(label.clone(), built);
        }
        Some(ChangeNode {
            identifier: node.identifier,
            definition: node.definition.clone(),
            payload: node.payload.clone(),
            traits,
        })
    }

    fn cursor(&self, id: NodeId) -> Option<Cursor<'_>> {
        Cursor::new(self.forest(), id)
    }

    fn handle(&self, id: NodeId) -> Option<TreeNodeHandle<'_>> {
        TreeNodeHandle::new(self.forest(), id)
    }
}

fn flatten(tree: &ChangeNode, out: &mut Vec<ForestNode>) {
    let mut node = ForestNode::new(tree.identifier, tree.definition.clone(), tree.payload.clone());
    for (label, children) in &tree.traits {
        if children.is_empty() {
            continue;
        }
        node.traits.insert(
            label.clone(),
            Arc::new(children.iter().map(|c| c.identifier).collect()),
        );
        for child in children {
            flatten(child, out);
        }
    }
    out.push(node);
}

/// Forest nodes for an owned subtree, rejecting repeated ids.
pub(crate) fn forest_nodes_of(tree: &ChangeNode) -> Result<Vec<ForestNode>, ForestError> {
    let mut nodes = Vec::with_capacity(tree.size());
    flatten(tree, &mut nodes);
    let mut seen = std::collections::BTreeSet::new();
    for node in &nodes {
        if !seen.insert(node.identifier) {
            return Err(ForestError::DuplicateNode(node.identifier));
        }
    }
    Ok(nodes)
}

/// Authoritative snapshot of the tree at some revision.
#[derive(Debug, Clone)]
pub struct RevisionView {
    root: NodeId,
    forest: Forest,
}

impl RevisionView {
    pub fn from_tree(root: &ChangeNode) -> Result<Self, ForestError> {
        let mut forest = Forest::new();
        forest.add_nodes(forest_nodes_of(root)?)?;
        Ok(Self {
            root: root.identifier,
            forest,
        })
    }

    /// View of [`initial_tree`].
    pub fn initial() -> Self {
        let mut forest = Forest::new();
        let root = initial_tree();
        // A single node with no children cannot fail to insert.
        let _ = forest.add_nodes([ForestNode::new(root.identifier, root.definition, None)]);
        Self {
            root: root.identifier,
            forest,
        }
    }

    pub fn open_for_transaction(&self) -> TransactionView {
        TransactionView {
            root: self.root,
            forest: self.forest.clone(),
        }
    }

    /// Nodes that differ from `self` to `other`.
    pub fn delta(&self, other: &RevisionView) -> Delta {
        self.forest.delta(&other.forest)
    }

    /// Owned snapshot of the whole tree.
    pub fn snapshot(&self) -> ChangeNode {
        self.to_tree(self.root)
            .unwrap_or_else(|| ChangeNode::new(self.root, Definition::new(INITIAL_TREE_DEFINITION)))
    }
}

impl TreeView for RevisionView {
    fn root(&self) -> NodeId {
        self.root
    }

    fn forest(&self) -> &Forest {
        &self.forest
    }
}

impl PartialEq for RevisionView {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.forest == other.forest
    }
}

/// Scratch view mutated while one edit is applied.
#[derive(Debug, Clone)]
pub struct TransactionView {
    root: NodeId,
    forest: Forest,
}

impl TransactionView {
    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = ForestNode>) -> Result<(), ForestError> {
        self.forest.add_nodes(nodes)
    }

    pub fn attach_range(&mut self, place: &TreeViewPlace, ids: &[NodeId]) -> Result<(), ForestError> {
        self.forest.attach_range(
            place.trait_location.parent,
            &place.trait_location.label,
            place.index,
            ids,
        )
    }

    pub fn detach_range(&mut self, range: &TreeViewRange) -> Result<Vec<NodeId>, ForestError> {
        self.forest.detach_range(
            range.trait_location.parent,
            &range.trait_location.label,
            range.start,
            range.end,
        )
    }

    pub fn delete_nodes(&mut self, roots: &[NodeId]) -> Result<(), ForestError> {
        self.forest.delete_subtrees(roots)
    }

    pub fn set_node_value(&mut self, id: NodeId, payload: Option<Payload>) -> Result<(), ForestError> {
        self.forest.set_value(id, payload)
    }

    pub fn close(self) -> RevisionView {
        RevisionView {
            root: self.root,
            forest: self.forest,
        }
    }
}

impl TreeView for TransactionView {
    fn root(&self) -> NodeId {
        self.root
    }

    fn forest(&self) -> &Forest {
        &self.forest
    }
}

/// Maps session-space ids to stable identities.
pub trait NodeIdConverter {
    fn stable_id_of(&self, id: NodeId) -> Option<StableId>;
}

impl NodeIdConverter for IdCompressor {
    fn stable_id_of(&self, id: NodeId) -> Option<StableId> {
        self.decompress(id).ok()
    }
}

/// Compare views held by different replicas.
///
/// Ids are compared by stable identity, so the same node expressed as a
/// local id on one replica and a final id on another compares equal.
pub fn views_semantically_equal(
    a: &impl TreeView,
    a_ids: &impl NodeIdConverter,
    b: &impl TreeView,
    b_ids: &impl NodeIdConverter,
) -> bool {
    fn same_node(
        a: &impl TreeView,
        a_ids: &impl NodeIdConverter,
        a_id: NodeId,
        b: &impl TreeView,
        b_ids: &impl NodeIdConverter,
        b_id: NodeId,
    ) -> bool {
        let (Some(x), Some(y)) = (a.get(a_id), b.get(b_id)) else {
            return false;
        };
        let (Some(xs), Some(ys)) = (a_ids.stable_id_of(a_id), b_ids.stable_id_of(b_id)) else {
            return false;
        };
        if xs != ys
            || x.definition != y.definition
            || !compare_payloads(x.payload.as_ref(), y.payload.as_ref())
            || x.traits.len() != y.traits.len()
        {
            return false;
        }
        x.traits.iter().zip(y.traits.iter()).all(|((lx, cx), (ly, cy))| {
            lx == ly
                && cx.len() == cy.len()
                && cx
                    .iter()
                    .zip(cy.iter())
                    .all(|(ca, cb)| same_node(a, a_ids, *ca, b, b_ids, *cb))
        })
    }

    a.size() == b.size() && same_node(a, a_ids, a.root(), b, b_ids, b.root())
}
