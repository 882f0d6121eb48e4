//! # Identifiers
//!
//! Id types shared by every layer of the engine.
//!
//! Node ids are *compressed*: a small signed integer instead of a UUID.
//!
//! ```text
//!   ... -3  -2  -1 │ 0   1   2   3 ...
//!   session-local  │ final (globally unique, compact)
//! ```
//!
//! A local id is only meaningful inside the session that generated it. A
//! final id is assigned once the creating edit has been sequenced and is the
//! same on every replica. Both always decompress to the same [`StableId`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a tree node, expressed as a compressed id.
///
/// Inside a replica (views, pending edits) ids are in *session space*: ids
/// this session created are local (negative), everything else is final.
/// On the wire ids are in *op space* (see [`crate::IdCompressor`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl NodeId {
    /// Build a final id from its non-negative index.
    pub fn from_final(index: u64) -> Self {
        NodeId(index as i64)
    }

    /// Build a local id from its 1-based generation count.
    pub fn from_local(gen_count: u64) -> Self {
        NodeId(-(gen_count as i64))
    }

    pub fn is_local(&self) -> bool {
        self.0 < 0
    }

    pub fn is_final(&self) -> bool {
        self.0 >= 0
    }

    /// Generation count of a local id (1 for the first id a session made).
    pub fn local_gen_count(&self) -> Option<u64> {
        if self.is_local() {
            Some(self.0.unsigned_abs())
        } else {
            None
        }
    }

    pub fn final_index(&self) -> Option<u64> {
        if self.is_final() {
            Some(self.0 as u64)
        } else {
            None
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "L{}", self.0.unsigned_abs())
        } else {
            write!(f, "F{}", self.0)
        }
    }
}

/// Identifier of a replica session. Random per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn random() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// Stable id of the `offset`-th id (0-based) created by this session.
    pub fn stable_id_at(&self, offset: u64) -> StableId {
        StableId(Uuid::from_u128(self.0.as_u128().wrapping_add(offset as u128)))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Uncompressed, globally unique node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(pub Uuid);

impl StableId {
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(StableId)
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an edit. Chosen by the author, carried unchanged through
/// sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditId(pub Uuid);

impl EditId {
    pub fn random() -> Self {
        EditId(Uuid::new_v4())
    }

    pub fn from_u128(value: u128) -> Self {
        EditId(Uuid::from_u128(value))
    }
}

impl fmt::Display for EditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Definition(pub String);

impl Definition {
    pub fn new(name: impl Into<String>) -> Self {
        Definition(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Definition {
    fn from(s: &str) -> Self {
        Definition(s.to_string())
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of an ordered child sequence of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitLabel(pub String);

impl TraitLabel {
    pub fn new(name: impl Into<String>) -> Self {
        TraitLabel(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TraitLabel {
    fn from(s: &str) -> Self {
        TraitLabel(s.to_string())
    }
}

impl fmt::Display for TraitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scratch id naming a detached sequence of nodes within a single edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetachedSequenceId(pub u32);

/// Index into a [`crate::StringInterner`].
pub type InternedStringId = u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_and_final_spaces() {
        let local = NodeId::from_local(3);
        assert!(local.is_local());
        assert_eq!(local.local_gen_count(), Some(3));
        assert_eq!(local.final_index(), None);

        let fin = NodeId::from_final(0);
        assert!(fin.is_final());
        assert_eq!(fin.final_index(), Some(0));
        assert_eq!(format!("{}", local), "L3");
        assert_eq!(format!("{}", fin), "F0");
    }

    #[test]
    fn test_stable_id_offsets_are_distinct() {
        let session = SessionId(Uuid::from_u128(100));
        assert_eq!(session.stable_id_at(0), StableId(Uuid::from_u128(100)));
        assert_eq!(session.stable_id_at(5), StableId(Uuid::from_u128(105)));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&NodeId(-4)).unwrap();
        assert_eq!(json, "-4");
        let label: TraitLabel = serde_json::from_str("\"children\"").unwrap();
        assert_eq!(label.as_str(), "children");
    }
}
