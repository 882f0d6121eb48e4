//! Borrowing read access to nodes of a view.
//!
//! Handles and cursors borrow the forest of the view they came from, so the
//! borrow checker rules out using one after the view is gone.

use crate::forest::{Forest, ForestNode};
use crate::payload::Payload;
use arbor_common::{Definition, NodeId, TraitLabel};

/// Read-only handle to one node.
#[derive(Debug, Clone, Copy)]
pub struct TreeNodeHandle<'v> {
    forest: &'v Forest,
    node: &'v ForestNode,
}

impl<'v> TreeNodeHandle<'v> {
    pub fn new(forest: &'v Forest, id: NodeId) -> Option<Self> {
        forest.get(id).map(|node| Self { forest, node })
    }

    pub fn identifier(&self) -> NodeId {
        self.node.identifier
    }

    pub fn definition(&self) -> &'v Definition {
        &self.node.definition
    }

    pub fn payload(&self) -> Option<&'v Payload> {
        self.node.payload.as_ref()
    }

    pub fn trait_labels(&self) -> impl Iterator<Item = &'v TraitLabel> + 'v {
        self.node.traits.keys()
    }

    pub fn child_ids(&self, label: &TraitLabel) -> &'v [NodeId] {
        self.node.children(label)
    }

    pub fn children(&self, label: &TraitLabel) -> impl Iterator<Item = TreeNodeHandle<'v>> + 'v {
        let forest = self.forest;
        self.node
            .children(label)
            .iter()
            .filter_map(move |id| TreeNodeHandle::new(forest, *id))
    }

    pub fn parent(&self) -> Option<TreeNodeHandle<'v>> {
        let data = self.forest.parent_of(self.node.identifier)?;
        TreeNodeHandle::new(self.forest, data.parent)
    }
}

/// Movable position in a view.
///
/// Every `move_to_*` returns false and leaves the cursor in place when the
/// target does not exist.
#[derive(Debug, Clone)]
pub struct Cursor<'v> {
    forest: &'v Forest,
    node: &'v ForestNode,
}

impl<'v> Cursor<'v> {
    pub fn new(forest: &'v Forest, id: NodeId) -> Option<Self> {
        forest.get(id).map(|node| Self { forest, node })
    }

    pub fn id(&self) -> NodeId {
        self.node.identifier
    }

    pub fn definition(&self) -> &'v Definition {
        &self.node.definition
    }

    pub fn payload(&self) -> Option<&'v Payload> {
        self.node.payload.as_ref()
    }

    pub fn trait_labels(&self) -> impl Iterator<Item = &'v TraitLabel> + 'v {
        self.node.traits.keys()
    }

    pub fn handle(&self) -> TreeNodeHandle<'v> {
        TreeNodeHandle {
            forest: self.forest,
            node: self.node,
        }
    }

    fn jump(&mut self, id: NodeId) -> bool {
        match self.forest.get(id) {
            Some(node) => {
                self.node = node;
                true
            }
            None => false,
        }
    }

    pub fn move_to_parent(&mut self) -> bool {
        match self.forest.parent_of(self.node.identifier) {
            Some(data) => {
                let parent = data.parent;
                self.jump(parent)
            }
            None => false,
        }
    }

    pub fn move_to_first_child(&mut self, label: &TraitLabel) -> bool {
        self.move_to_child(label, 0)
    }

    pub fn move_to_child(&mut self, label: &TraitLabel, index: usize) -> bool {
        match self.node.children(label).get(index) {
            Some(id) => {
                let id = *id;
                self.jump(id)
            }
            None => false,
        }
    }

    fn siblings(&self) -> Option<(&'v [NodeId], usize)> {
        let data = self.forest.parent_of(self.node.identifier)?;
        let siblings = self.forest.get(data.parent)?.children(&data.label);
        let index = siblings.iter().position(|id| *id == self.node.identifier)?;
        Some((siblings, index))
    }

    pub fn move_to_next_sibling(&mut self) -> bool {
        match self.siblings() {
            Some((siblings, index)) => match siblings.get(index + 1) {
                Some(id) => self.jump(*id),
                None => false,
            },
            None => false,
        }
    }

    pub fn move_to_prev_sibling(&mut self) -> bool {
        match self.siblings() {
            Some((siblings, index)) if index > 0 => self.jump(siblings[index - 1]),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::ChangeNode;
    use crate::view::{RevisionView, TreeView};
    use arbor_common::{NodeId, TraitLabel};
    use serde_json::json;

    fn view() -> RevisionView {
        let root = ChangeNode::new(NodeId(0), "root")
            .with_child("children", ChangeNode::new(NodeId(1), "A").with_payload(json!("a")))
            .with_child("children", ChangeNode::new(NodeId(2), "B"))
            .with_child("children", ChangeNode::new(NodeId(3), "C"));
        RevisionView::from_tree(&root).unwrap()
    }

    #[test]
    fn test_cursor_walks_siblings_and_parent() {
        let view = view();
        let children = TraitLabel::from("children");
        let mut cursor = view.cursor(NodeId(0)).unwrap();

        assert!(cursor.move_to_first_child(&children));
        assert_eq!(cursor.id(), NodeId(1));
        assert_eq!(cursor.payload(), Some(&json!("a")));
        assert!(!cursor.move_to_prev_sibling());
        assert!(cursor.move_to_next_sibling());
        assert!(cursor.move_to_next_sibling());
        assert_eq!(cursor.id(), NodeId(3));
        assert!(!cursor.move_to_next_sibling());
        assert!(cursor.move_to_prev_sibling());
        assert_eq!(cursor.definition().as_str(), "B");
        assert!(cursor.move_to_parent());
        assert_eq!(cursor.id(), NodeId(0));
        assert!(!cursor.move_to_parent());
        assert!(!cursor.move_to_child(&children, 10));
    }

    #[test]
    fn test_handles_enumerate_children() {
        let view = view();
        let root = view.handle(NodeId(0)).unwrap();
        let defs: Vec<&str> = root
            .children(&TraitLabel::from("children"))
            .map(|h| h.definition().as_str())
            .collect();
        assert_eq!(defs, vec!["A", "B", "C"]);
        let b = view.handle(NodeId(2)).unwrap();
        assert_eq!(b.parent().unwrap().identifier(), NodeId(0));
    }
}
