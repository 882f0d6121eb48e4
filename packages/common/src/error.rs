use crate::identifiers::SessionId;
use thiserror::Error;

/// Failures of the id compressor. All of them indicate that ids reached the
/// compressor out of sequence order, which callers treat as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdCompressorError {
    #[error("Creation range for session {session} starts at {actual}, expected {expected}")]
    RangeOutOfOrder {
        session: SessionId,
        expected: u64,
        actual: u64,
    },

    #[error("Malformed creation range {first}..={last} for session {session}")]
    MalformedRange { session: SessionId, first: u64, last: u64 },

    #[error("Id {gen_count} of session {session} has not been finalized")]
    UnfinalizedId { session: SessionId, gen_count: u64 },

    #[error("Unknown local id {0}")]
    UnknownLocalId(u64),

    #[error("Unknown final id {0}")]
    UnknownFinalId(u64),

    #[error("Corrupt compressor state: {0}")]
    CorruptState(String),
}

/// Common error type shared by the arbor crates
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Id compressor error: {0}")]
    IdCompressor(#[from] IdCompressorError),

    #[error("Unknown interned string {0}")]
    UnknownInternedString(u32),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl From<String> for CommonError {
    fn from(s: String) -> Self {
        CommonError::Generic(s)
    }
}

impl From<&str> for CommonError {
    fn from(s: &str) -> Self {
        CommonError::Generic(s.to_string())
    }
}
