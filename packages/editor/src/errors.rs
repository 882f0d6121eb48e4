//! Error types for the editor

use arbor_common::{CommonError, EditId, IdCompressorError};
use arbor_tree::{EditStatus, ForestError, TransactionFailure};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    /// The replica can no longer be trusted to converge.
    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Shared tree is poisoned by an earlier fatal error")]
    Poisoned,

    #[error("Unknown edit {0}")]
    UnknownEdit(EditId),

    #[error("Edit {0} was already handed to the sequencing service")]
    AlreadySubmitted(EditId),

    #[error("Sequencing service disconnected before edit {0} was sent")]
    SequencerDisconnected(EditId),

    #[error("Edit {0} cannot be reverted")]
    NotRevertible(EditId),

    #[error("Revision {requested} is not retained (earliest is {earliest})")]
    RevisionUnavailable { requested: u64, earliest: u64 },

    #[error("Edit {edit_id} rejected as {status:?}: {failure}")]
    Rejected {
        edit_id: EditId,
        status: EditStatus,
        failure: TransactionFailure,
    },

    #[error("Id compressor error: {0}")]
    IdCompressor(#[from] IdCompressorError),

    #[error("Forest invariant violated: {0}")]
    Forest(#[from] ForestError),

    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EditorError {
    /// Whether the error leaves the replica out of step with its peers.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EditorError::Fatal(_) | EditorError::IdCompressor(_) | EditorError::Forest(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Unsupported summary version {0}")]
    UnsupportedVersion(String),

    #[error("Stable id {0} does not belong to this document")]
    InvalidStableId(String),

    #[error("Replaying the edit history does not reproduce the summarized tree")]
    HistoryMismatch,

    #[error("Full edit history is not available (log starts at {0})")]
    HistoryUnavailable(u64),

    #[error("Corrupt summary: {0}")]
    Corrupt(String),

    #[error("Interned string error: {0}")]
    InternedString(#[from] CommonError),

    #[error("Id compressor error: {0}")]
    IdCompressor(#[from] IdCompressorError),

    #[error("Forest error: {0}")]
    Forest(#[from] ForestError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read options: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid option {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
