//! Error types for the tree crate

use arbor_common::{NodeId, TraitLabel};
use thiserror::Error;

/// Forest invariant violations.
///
/// The transaction engine validates every change before touching the forest,
/// so any of these surfacing from an edit application is an engine bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForestError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Id already in use: {0}")]
    IdAlreadyInUse(NodeId),

    #[error("Node {0} already has a parent")]
    AlreadyParented(NodeId),

    #[error("Node {0} is not detached")]
    NotDetached(NodeId),

    #[error("Range {start}..{end} out of bounds for trait {label} of {parent} (length {len})")]
    RangeOutOfBounds {
        parent: NodeId,
        label: TraitLabel,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Tree contains node {0} more than once")]
    DuplicateNode(NodeId),
}
