//! # Forest
//!
//! The node store behind every view: a persistent map from node id to node,
//! plus a reverse index from child to parent.
//!
//! ## Design
//!
//! Nodes are held behind `Arc`, and each trait's child list is its own
//! `Arc<Vec<NodeId>>`. Changing one child list of one node therefore copies
//! that list, that node, and the trie path to it. Every other node and list
//! stays shared with the forest it was derived from.
//!
//! A node is either *parented* (it appears in exactly one trait of exactly
//! one other node), the root, or *detached*. The forest does not know which
//! node is the root; views track that.

use crate::error::ForestError;
use crate::payload::{compare_payloads, Payload};
use crate::persistent_map::{DiffEntry, PersistentMap};
use arbor_common::{Definition, NodeId, TraitLabel};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A node as stored in the forest.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestNode {
    pub identifier: NodeId,
    pub definition: Definition,
    pub payload: Option<Payload>,
    /// Never contains an empty child list.
    pub traits: BTreeMap<TraitLabel, Arc<Vec<NodeId>>>,
}

impl ForestNode {
    pub fn new(identifier: NodeId, definition: Definition, payload: Option<Payload>) -> Self {
        Self {
            identifier,
            definition,
            payload,
            traits: BTreeMap::new(),
        }
    }

    pub fn children(&self, label: &TraitLabel) -> &[NodeId] {
        self.traits.get(label).map(|c| c.as_slice()).unwrap_or(&[])
    }

    fn same_content(&self, other: &ForestNode) -> bool {
        self.definition == other.definition
            && compare_payloads(self.payload.as_ref(), other.payload.as_ref())
            && self.traits.len() == other.traits.len()
            && self
                .traits
                .iter()
                .zip(other.traits.iter())
                .all(|((la, a), (lb, b))| la == lb && (Arc::ptr_eq(a, b) || a == b))
    }
}

/// Where a parented node lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentData {
    pub parent: NodeId,
    pub label: TraitLabel,
}

/// Node-level differences between two forests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub changed: Vec<NodeId>,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Forest {
    nodes: PersistentMap<Arc<ForestNode>>,
    parents: PersistentMap<ParentData>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn has(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id.0)
    }

    pub fn get(&self, id: NodeId) -> Option<&ForestNode> {
        self.nodes.get(id.0).map(|n| n.as_ref())
    }

    pub fn try_get(&self, id: NodeId) -> Result<&ForestNode, ForestError> {
        self.get(id).ok_or(ForestError::NodeNotFound(id))
    }

    pub fn parent_of(&self, id: NodeId) -> Option<&ParentData> {
        self.parents.get(id.0)
    }

    /// All node ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|(k, _)| NodeId(k))
    }

    /// Add a batch of nodes.
    ///
    /// Children named by a node's traits must either be part of the batch or
    /// already exist detached. Each gets its parent recorded.
    pub fn add_nodes(&mut self, batch: impl IntoIterator<Item = ForestNode>) -> Result<(), ForestError> {
        let batch: Vec<ForestNode> = batch.into_iter().collect();
        for node in &batch {
            if self.has(node.identifier) {
                return Err(ForestError::IdAlreadyInUse(node.identifier));
            }
            self.nodes.insert(node.identifier.0, Arc::new(node.clone()));
        }
        for node in &batch {
            for (label, children) in &node.traits {
                for child in children.iter() {
                    if !self.has(*child) {
                        return Err(ForestError::NodeNotFound(*child));
                    }
                    if self.parents.contains_key(child.0) {
                        return Err(ForestError::AlreadyParented(*child));
                    }
                    self.parents.insert(
                        child.0,
                        ParentData {
                            parent: node.identifier,
                            label: label.clone(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Splice detached nodes into `parent.label` at `index`.
    pub fn attach_range(
        &mut self,
        parent: NodeId,
        label: &TraitLabel,
        index: usize,
        ids: &[NodeId],
    ) -> Result<(), ForestError> {
        let node = self.try_get(parent)?;
        let len = node.children(label).len();
        if index > len {
            return Err(ForestError::RangeOutOfBounds {
                parent,
                label: label.clone(),
                start: index,
                end: index,
                len,
            });
        }
        for id in ids {
            if !self.has(*id) {
                return Err(ForestError::NodeNotFound(*id));
            }
            if self.parents.contains_key(id.0) {
                return Err(ForestError::AlreadyParented(*id));
            }
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut updated = node.clone();
        let children = Arc::make_mut(updated.traits.entry(label.clone()).or_default());
        children.splice(index..index, ids.iter().copied());
        self.nodes.insert(parent.0, Arc::new(updated));
        for id in ids {
            self.parents.insert(
                id.0,
                ParentData {
                    parent,
                    label: label.clone(),
                },
            );
        }
        Ok(())
    }

    /// Remove `start..end` from `parent.label` and return the removed ids,
    /// which are left detached.
    pub fn detach_range(
        &mut self,
        parent: NodeId,
        label: &TraitLabel,
        start: usize,
        end: usize,
    ) -> Result<Vec<NodeId>, ForestError> {
        let node = self.try_get(parent)?;
        let len = node.children(label).len();
        if start > end || end > len {
            return Err(ForestError::RangeOutOfBounds {
                parent,
                label: label.clone(),
                start,
                end,
                len,
            });
        }
        if start == end {
            return Ok(Vec::new());
        }

        let mut updated = node.clone();
        let detached = match updated.traits.get_mut(label) {
            Some(children) => {
                let detached: Vec<NodeId> = Arc::make_mut(children).drain(start..end).collect();
                if children.is_empty() {
                    updated.traits.remove(label);
                }
                detached
            }
            None => Vec::new(),
        };
        self.nodes.insert(parent.0, Arc::new(updated));
        for id in &detached {
            self.parents.remove(id.0);
        }
        Ok(detached)
    }

    /// Delete detached nodes together with all their descendants.
    pub fn delete_subtrees(&mut self, roots: &[NodeId]) -> Result<(), ForestError> {
        for id in roots {
            if self.parents.contains_key(id.0) {
                return Err(ForestError::NotDetached(*id));
            }
        }
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(id.0).cloned().ok_or(ForestError::NodeNotFound(id))?;
            for children in node.traits.values() {
                stack.extend(children.iter().copied());
            }
            self.nodes.remove(id.0);
            self.parents.remove(id.0);
        }
        Ok(())
    }

    /// Replace or clear a node's payload.
    pub fn set_value(&mut self, id: NodeId, payload: Option<Payload>) -> Result<(), ForestError> {
        let mut updated = self.try_get(id)?.clone();
        updated.payload = payload;
        self.nodes.insert(id.0, Arc::new(updated));
        Ok(())
    }

    /// Ids whose node differs between `self` and `other`, phrased as the
    /// changes that turn `self` into `other`. Each list is sorted.
    pub fn delta(&self, other: &Forest) -> Delta {
        let mut delta = Delta::default();
        let diff = self
            .nodes
            .diff(&other.nodes, |a, b| Arc::ptr_eq(a, b) || a.same_content(b));
        for entry in diff {
            match entry {
                DiffEntry::Added(k, _) => delta.added.push(NodeId(k)),
                DiffEntry::Removed(k, _) => delta.removed.push(NodeId(k)),
                DiffEntry::Changed(k, _, _) => delta.changed.push(NodeId(k)),
            }
        }
        delta
    }

    /// Structural equality of stored content.
    pub fn equals(&self, other: &Forest) -> bool {
        self.nodes.ptr_eq(&other.nodes) || (self.size() == other.size() && self.delta(other).is_empty())
    }
}

impl PartialEq for Forest {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: i64, def: &str) -> ForestNode {
        ForestNode::new(NodeId(id), Definition::from(def), None)
    }

    fn label() -> TraitLabel {
        TraitLabel::from("children")
    }

    fn forest_with_children(n: i64) -> Forest {
        let mut forest = Forest::new();
        let mut root = node(0, "root");
        let kids: Vec<NodeId> = (1..=n).map(NodeId).collect();
        root.traits.insert(label(), Arc::new(kids.clone()));
        forest
            .add_nodes((1..=n).map(|i| node(i, "leaf")).chain(std::iter::once(root)))
            .unwrap();
        forest
    }

    #[test]
    fn test_add_nodes_records_parents() {
        let forest = forest_with_children(3);
        assert_eq!(forest.size(), 4);
        assert_eq!(forest.parent_of(NodeId(2)).unwrap().parent, NodeId(0));
        assert!(forest.parent_of(NodeId(0)).is_none());
    }

    #[test]
    fn test_add_nodes_rejects_duplicates() {
        let mut forest = forest_with_children(1);
        assert_eq!(
            forest.add_nodes(vec![node(1, "dup")]),
            Err(ForestError::IdAlreadyInUse(NodeId(1)))
        );
    }

    #[test]
    fn test_detach_and_attach_range() {
        let mut forest = forest_with_children(4);
        let detached = forest.detach_range(NodeId(0), &label(), 1, 3).unwrap();
        assert_eq!(detached, vec![NodeId(2), NodeId(3)]);
        assert_eq!(forest.get(NodeId(0)).unwrap().children(&label()), &[NodeId(1), NodeId(4)]);
        assert!(forest.parent_of(NodeId(2)).is_none());

        forest.attach_range(NodeId(0), &label(), 0, &detached).unwrap();
        assert_eq!(
            forest.get(NodeId(0)).unwrap().children(&label()),
            &[NodeId(2), NodeId(3), NodeId(1), NodeId(4)]
        );
        assert_eq!(
            forest.attach_range(NodeId(0), &label(), 0, &[NodeId(1)]),
            Err(ForestError::AlreadyParented(NodeId(1)))
        );
    }

    #[test]
    fn test_emptied_trait_is_removed() {
        let mut forest = forest_with_children(2);
        forest.detach_range(NodeId(0), &label(), 0, 2).unwrap();
        assert!(forest.get(NodeId(0)).unwrap().traits.is_empty());
    }

    #[test]
    fn test_delete_subtrees_requires_detached() {
        let mut forest = forest_with_children(2);
        assert_eq!(
            forest.delete_subtrees(&[NodeId(1)]),
            Err(ForestError::NotDetached(NodeId(1)))
        );
        let detached = forest.detach_range(NodeId(0), &label(), 0, 1).unwrap();
        forest.delete_subtrees(&detached).unwrap();
        assert!(!forest.has(NodeId(1)));
        assert_eq!(forest.size(), 2);
    }

    #[test]
    fn test_derived_forest_leaves_original_untouched() {
        let base = forest_with_children(3);
        let mut derived = base.clone();
        derived.set_value(NodeId(2), Some(json!("x"))).unwrap();
        derived.detach_range(NodeId(0), &label(), 0, 1).unwrap();

        assert_eq!(base.get(NodeId(2)).unwrap().payload, None);
        assert_eq!(base.get(NodeId(0)).unwrap().children(&label()).len(), 3);

        let delta = base.delta(&derived);
        assert_eq!(delta.changed, vec![NodeId(0), NodeId(2)]);
        assert!(delta.added.is_empty() && delta.removed.is_empty());
        assert_ne!(base, derived);
    }

    #[test]
    fn test_equal_content_built_separately() {
        assert_eq!(forest_with_children(5), forest_with_children(5));
    }
}
