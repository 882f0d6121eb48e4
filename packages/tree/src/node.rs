//! Owned tree literals.
//!
//! [`ChangeNode`] is a fully materialized subtree, used for snapshots,
//! summaries and comparisons. [`BuildNode`] is the input of a `Build`
//! change: a literal subtree whose leaves may splice in a sequence detached
//! earlier in the same edit.

use crate::payload::Payload;
use arbor_common::{Definition, DetachedSequenceId, NodeId, TraitLabel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A materialized subtree.
///
/// Generic over the id type so persisted formats can carry stable ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNode<Id = NodeId> {
    pub identifier: Id,
    pub definition: Definition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default = "BTreeMap::new", skip_serializing_if = "BTreeMap::is_empty")]
    pub traits: BTreeMap<TraitLabel, Vec<ChangeNode<Id>>>,
}

impl<Id: Copy> ChangeNode<Id> {
    pub fn new(identifier: Id, definition: impl Into<Definition>) -> Self {
        Self {
            identifier,
            definition: definition.into(),
            payload: None,
            traits: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_child(mut self, label: impl Into<TraitLabel>, child: ChangeNode<Id>) -> Self {
        self.traits.entry(label.into()).or_default().push(child);
        self
    }

    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self
            .traits
            .values()
            .flat_map(|children| children.iter())
            .map(ChangeNode::size)
            .sum::<usize>()
    }

    pub fn try_map_node_ids<U, E>(
        &self,
        f: &mut impl FnMut(Id) -> Result<U, E>,
    ) -> Result<ChangeNode<U>, E> {
        let mut traits = BTreeMap::new();
        for (label, children) in &self.traits {
            let mapped = children
                .iter()
                .map(|child| child.try_map_node_ids(f))
                .collect::<Result<Vec<_>, E>>()?;
            traits.insert(label.clone(), mapped);
        }
        Ok(ChangeNode {
            identifier: f(self.identifier)?,
            definition: self.definition.clone(),
            payload: self.payload.clone(),
            traits,
        })
    }
}

/// Literal node declared by a `Build` change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTreeNode<Id = NodeId> {
    pub identifier: Id,
    pub definition: Definition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default = "BTreeMap::new", skip_serializing_if = "BTreeMap::is_empty")]
    pub traits: BTreeMap<TraitLabel, Vec<BuildNode<Id>>>,
}

impl<Id: Copy> BuildTreeNode<Id> {
    pub fn new(identifier: Id, definition: impl Into<Definition>) -> Self {
        Self {
            identifier,
            definition: definition.into(),
            payload: None,
            traits: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_child(mut self, label: impl Into<TraitLabel>, child: impl Into<BuildNode<Id>>) -> Self {
        self.traits.entry(label.into()).or_default().push(child.into());
        self
    }
}

/// Source of a `Build`: a literal subtree or a previously detached sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildNode<Id = NodeId> {
    Tree(BuildTreeNode<Id>),
    Detached(DetachedSequenceId),
}

impl<Id: Copy> BuildNode<Id> {
    pub fn try_map_node_ids<U, E>(
        &self,
        f: &mut impl FnMut(Id) -> Result<U, E>,
    ) -> Result<BuildNode<U>, E> {
        match self {
            BuildNode::Detached(id) => Ok(BuildNode::Detached(*id)),
            BuildNode::Tree(node) => {
                let mut traits = BTreeMap::new();
                for (label, children) in &node.traits {
                    let mapped = children
                        .iter()
                        .map(|child| child.try_map_node_ids(f))
                        .collect::<Result<Vec<_>, E>>()?;
                    traits.insert(label.clone(), mapped);
                }
                Ok(BuildNode::Tree(BuildTreeNode {
                    identifier: f(node.identifier)?,
                    definition: node.definition.clone(),
                    payload: node.payload.clone(),
                    traits,
                }))
            }
        }
    }
}

impl<Id> From<BuildTreeNode<Id>> for BuildNode<Id> {
    fn from(node: BuildTreeNode<Id>) -> Self {
        BuildNode::Tree(node)
    }
}

impl<Id> From<DetachedSequenceId> for BuildNode<Id> {
    fn from(id: DetachedSequenceId) -> Self {
        BuildNode::Detached(id)
    }
}

impl<Id: Copy> From<&ChangeNode<Id>> for BuildTreeNode<Id> {
    fn from(node: &ChangeNode<Id>) -> Self {
        BuildTreeNode {
            identifier: node.identifier,
            definition: node.definition.clone(),
            payload: node.payload.clone(),
            traits: node
                .traits
                .iter()
                .map(|(label, children)| {
                    let built = children
                        .iter()
                        .map(|child| BuildNode::Tree(BuildTreeNode::from(child)))
                        .collect();
                    (label.clone(), built)
                })
                .collect(),
        }
    }
}

impl<Id: Copy> From<ChangeNode<Id>> for BuildNode<Id> {
    fn from(node: ChangeNode<Id>) -> Self {
        BuildNode::Tree(BuildTreeNode::from(&node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_node_size_and_mapping() {
        let tree = ChangeNode::new(NodeId(0), "root")
            .with_child("children", ChangeNode::new(NodeId(-1), "Foo"))
            .with_child("children", ChangeNode::new(NodeId(-2), "Bar").with_payload(json!(3)));
        assert_eq!(tree.size(), 3);

        let mapped = tree
            .try_map_node_ids(&mut |id| Ok::<_, ()>(NodeId(id.0 + 100)))
            .unwrap();
        assert_eq!(mapped.identifier, NodeId(100));
        assert_eq!(mapped.traits[&TraitLabel::from("children")][1].identifier, NodeId(98));
    }

    #[test]
    fn test_build_node_from_change_node() {
        let tree = ChangeNode::new(NodeId(-1), "Foo").with_child("x", ChangeNode::new(NodeId(-2), "Bar"));
        let BuildNode::Tree(built) = BuildNode::<NodeId>::from(tree) else {
            panic!("expected literal build node");
        };
        assert_eq!(built.identifier, NodeId(-1));
        assert!(matches!(built.traits[&TraitLabel::from("x")][0], BuildNode::Tree(_)));
    }
}
