//! # Persistent Map
//!
//! A 32-way hash trie keyed by node id, with copy-on-write nodes.
//!
//! Cloning a map is O(1). Mutating a clone copies only the path from the
//! root to the touched leaf (at most 13 levels), so every older clone keeps
//! seeing its own contents. Two maps that share most of their structure can
//! be diffed in time proportional to the shared-prefix divergence, because
//! identical subtrees are skipped by pointer equality.
//!
//! Keys are spread with a bijective mixer, so distinct keys always end up in
//! distinct leaves and no collision buckets are needed.

use std::sync::Arc;

const BITS: u32 = 5;
const WIDTH: usize = 1 << BITS;
const MASK: u64 = (WIDTH - 1) as u64;

type Children<V> = Box<[Option<Arc<Node<V>>>; WIDTH]>;

#[derive(Debug)]
enum Node<V> {
    Leaf { key: i64, hash: u64, value: V },
    Branch(Children<V>),
}

impl<V: Clone> Clone for Node<V> {
    fn clone(&self) -> Self {
        match self {
            Node::Leaf { key, hash, value } => Node::Leaf {
                key: *key,
                hash: *hash,
                value: value.clone(),
            },
            Node::Branch(children) => Node::Branch(children.clone()),
        }
    }
}

fn mix(key: i64) -> u64 {
    let mut z = key as u64;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn slot_index(hash: u64, shift: u32) -> usize {
    ((hash >> shift) & MASK) as usize
}

fn empty_children<V>() -> Children<V> {
    Box::new(std::array::from_fn(|_| None))
}

/// Immutable-by-clone map from node ids to values.
#[derive(Debug)]
pub struct PersistentMap<V> {
    root: Option<Arc<Node<V>>>,
    len: usize,
}

impl<V> Clone for PersistentMap<V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<V> Default for PersistentMap<V> {
    fn default() -> Self {
        Self { root: None, len: 0 }
    }
}

/// One difference reported by [`PersistentMap::diff`].
#[derive(Debug, PartialEq)]
pub enum DiffEntry<'a, V> {
    Added(i64, &'a V),
    Removed(i64, &'a V),
    Changed(i64, &'a V, &'a V),
}

impl<V> PersistentMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: i64) -> Option<&V> {
        let hash = mix(key);
        let mut node = self.root.as_deref()?;
        let mut shift = 0;
        loop {
            match node {
                Node::Leaf { key: k, value, .. } => return (*k == key).then_some(value),
                Node::Branch(children) => {
                    node = children[slot_index(hash, shift)].as_deref()?;
                    shift += BITS;
                }
            }
        }
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Whether both maps share the same root allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Entries in trie order. The order is deterministic but unrelated to
    /// key order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            stack: self.root.as_deref().into_iter().collect(),
        }
    }

    /// Report every key whose presence or value differs between the maps,
    /// phrased as the changes that turn `self` into `other`.
    ///
    /// `same` decides value equality for keys present in both. Entries are
    /// reported in ascending key order.
    pub fn diff<'a, F>(&'a self, other: &'a Self, same: F) -> Vec<DiffEntry<'a, V>>
    where
        F: Fn(&V, &V) -> bool,
    {
        let mut out = Vec::new();
        diff_nodes(self.root.as_ref(), other.root.as_ref(), &same, &mut out);
        out.sort_by_key(|entry| match entry {
            DiffEntry::Added(k, _) | DiffEntry::Removed(k, _) | DiffEntry::Changed(k, _, _) => *k,
        });
        out
    }
}

impl<V: Clone> PersistentMap<V> {
    /// Insert or replace. Returns true if the key was not present before.
    pub fn insert(&mut self, key: i64, value: V) -> bool {
        let added = insert_at(&mut self.root, key, mix(key), value, 0);
        if added {
            self.len += 1;
        }
        added
    }

    /// Remove a key. Returns true if it was present.
    pub fn remove(&mut self, key: i64) -> bool {
        if !self.contains_key(key) {
            return false;
        }
        remove_at(&mut self.root, key, mix(key), 0);
        self.len -= 1;
        true
    }
}

impl<V: PartialEq> PartialEq for PersistentMap<V> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.len == other.len && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

fn insert_at<V: Clone>(
    slot: &mut Option<Arc<Node<V>>>,
    key: i64,
    hash: u64,
    value: V,
    shift: u32,
) -> bool {
    let Some(arc) = slot else {
        *slot = Some(Arc::new(Node::Leaf { key, hash, value }));
        return true;
    };

    // A leaf holding a different key is pushed one level down into a fresh
    // branch; the new key is then inserted into that branch.
    let split = match arc.as_ref() {
        Node::Leaf { key: k, hash: h, .. } if *k != key => Some(*h),
        _ => None,
    };
    if let Some(existing_hash) = split {
        let mut children = empty_children();
        children[slot_index(existing_hash, shift)] = Some(Arc::clone(arc));
        *slot = Some(Arc::new(Node::Branch(children)));
        return insert_at(slot, key, hash, value, shift);
    }

    match Arc::make_mut(arc) {
        Node::Leaf { value: v, .. } => {
            *v = value;
            false
        }
        Node::Branch(children) => {
            insert_at(&mut children[slot_index(hash, shift)], key, hash, value, shift + BITS)
        }
    }
}

/// Caller guarantees the key is present.
fn remove_at<V: Clone>(slot: &mut Option<Arc<Node<V>>>, key: i64, hash: u64, shift: u32) {
    let Some(arc) = slot else {
        return;
    };
    if let Node::Leaf { key: k, .. } = arc.as_ref() {
        if *k == key {
            *slot = None;
        }
        return;
    }

    let collapse = match Arc::make_mut(arc) {
        Node::Branch(children) => {
            remove_at(&mut children[slot_index(hash, shift)], key, hash, shift + BITS);

            // A branch left with a single leaf is replaced by that leaf.
            let mut occupied = children.iter().enumerate().filter_map(|(idx, child)| {
                child
                    .as_ref()
                    .map(|c| (idx, matches!(c.as_ref(), Node::Leaf { .. })))
            });
            let first = occupied.next();
            let more = occupied.next().is_some();
            match (first, more) {
                (None, _) => Some(None),
                (Some((idx, true)), false) => Some(children[idx].take()),
                _ => None,
            }
        }
        Node::Leaf { .. } => None,
    };
    if let Some(replacement) = collapse {
        *slot = replacement;
    }
}

fn collect_leaves<'a, V>(node: &'a Node<V>, out: &mut Vec<(i64, &'a V)>) {
    match node {
        Node::Leaf { key, value, .. } => out.push((*key, value)),
        Node::Branch(children) => {
            for child in children.iter().flatten() {
                collect_leaves(child, out);
            }
        }
    }
}

fn diff_nodes<'a, V, F>(
    a: Option<&'a Arc<Node<V>>>,
    b: Option<&'a Arc<Node<V>>>,
    same: &F,
    out: &mut Vec<DiffEntry<'a, V>>,
) where
    F: Fn(&V, &V) -> bool,
{
    match (a, b) {
        (None, None) => {}
        (Some(x), Some(y)) if Arc::ptr_eq(x, y) => {}
        (Some(x), Some(y)) => match (x.as_ref(), y.as_ref()) {
            (Node::Branch(xc), Node::Branch(yc)) => {
                for i in 0..WIDTH {
                    diff_nodes(xc[i].as_ref(), yc[i].as_ref(), same, out);
                }
            }
            _ => diff_leaf_sets(Some(x), Some(y), same, out),
        },
        _ => diff_leaf_sets(a, b, same, out),
    }
}

fn diff_leaf_sets<'a, V, F>(
    a: Option<&'a Arc<Node<V>>>,
    b: Option<&'a Arc<Node<V>>>,
    same: &F,
    out: &mut Vec<DiffEntry<'a, V>>,
) where
    F: Fn(&V, &V) -> bool,
{
    let mut left = Vec::new();
    let mut right = Vec::new();
    if let Some(node) = a {
        collect_leaves(node, &mut left);
    }
    if let Some(node) = b {
        collect_leaves(node, &mut right);
    }
    left.sort_by_key(|(k, _)| *k);
    right.sort_by_key(|(k, _)| *k);

    let (mut i, mut j) = (0, 0);
    while i < left.len() || j < right.len() {
        match (left.get(i), right.get(j)) {
            (Some(&(lk, lv)), Some(&(rk, rv))) if lk == rk => {
                if !same(lv, rv) {
                    out.push(DiffEntry::Changed(lk, lv, rv));
                }
                i += 1;
                j += 1;
            }
            (Some(&(lk, lv)), Some(&(rk, _))) if lk < rk => {
                out.push(DiffEntry::Removed(lk, lv));
                i += 1;
            }
            (Some(&(lk, lv)), None) => {
                out.push(DiffEntry::Removed(lk, lv));
                i += 1;
            }
            (_, Some(&(rk, rv))) => {
                out.push(DiffEntry::Added(rk, rv));
                j += 1;
            }
            (None, None) => break,
        }
    }
}

pub struct Iter<'a, V> {
    stack: Vec<&'a Node<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (i64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                Node::Leaf { key, value, .. } => return Some((*key, value)),
                Node::Branch(children) => {
                    self.stack.extend(children.iter().rev().flatten().map(|c| c.as_ref()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut map = PersistentMap::new();
        for k in -50..50 {
            assert!(map.insert(k, k * 2));
        }
        assert_eq!(map.len(), 100);
        assert_eq!(map.get(-7), Some(&-14));
        assert!(!map.insert(-7, 0));
        assert_eq!(map.get(-7), Some(&0));

        for k in -50..0 {
            assert!(map.remove(k));
        }
        assert!(!map.remove(-1));
        assert_eq!(map.len(), 50);
        assert_eq!(map.get(-3), None);
        assert_eq!(map.get(3), Some(&6));
        assert_eq!(map.iter().count(), 50);
    }

    #[test]
    fn test_clones_are_isolated() {
        let mut a = PersistentMap::new();
        for k in 0..200 {
            a.insert(k, k);
        }
        let snapshot = a.clone();
        a.insert(5, 500);
        a.remove(6);
        a.insert(1000, 1);

        assert_eq!(snapshot.get(5), Some(&5));
        assert_eq!(snapshot.get(6), Some(&6));
        assert_eq!(snapshot.get(1000), None);
        assert_eq!(snapshot.len(), 200);
        assert_eq!(a.get(5), Some(&500));
        assert_eq!(a.len(), 200);
    }

    #[test]
    fn test_diff_reports_only_changes() {
        let mut a = PersistentMap::new();
        for k in 0..1000 {
            a.insert(k, k);
        }
        let mut b = a.clone();
        b.insert(10, -10);
        b.remove(20);
        b.insert(5000, 1);

        let diff = b.diff(&a, |x, y| x == y);
        assert_eq!(
            diff,
            vec![
                DiffEntry::Changed(10, &-10, &10),
                DiffEntry::Added(20, &20),
                DiffEntry::Removed(5000, &1),
            ]
        );
        assert!(a.diff(&a.clone(), |x, y| x == y).is_empty());
    }

    #[test]
    fn test_equality_ignores_structure_history() {
        let mut a = PersistentMap::new();
        let mut b = PersistentMap::new();
        for k in 0..64 {
            a.insert(k, ());
        }
        for k in (0..64).rev() {
            b.insert(k, ());
        }
        b.insert(99, ());
        b.remove(99);
        assert_eq!(a, b);
    }
}
