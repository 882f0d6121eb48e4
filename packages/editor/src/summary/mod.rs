//! # Summaries
//!
//! Persisted snapshots of a shared tree. Two formats are readable:
//!
//! | version | ids                  | strings  | history                    |
//! |---------|----------------------|----------|----------------------------|
//! | `0.0.2` | stable UUID strings  | inline   | every sequenced edit       |
//! | `0.1.1` | final compressed ids | interned | base tree + trailing edits |
//!
//! Writing uses the format configured in [`SharedTreeOptions`]. A `0.0.2`
//! summary upgrades to `0.1.1` without losing history.

mod v0_0_2;
mod v0_1_1;

pub use v0_0_2::SummaryV0_0_2;
pub use v0_1_1::{CompressedNode, SummaryV0_1_1};

use crate::config::SharedTreeOptions;
use crate::edit_log::EditLog;
use crate::errors::{EditorError, SummaryError};
use arbor_common::{IdCompressor, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteFormat {
    #[serde(rename = "0.0.2")]
    V0_0_2,
    #[default]
    #[serde(rename = "0.1.1")]
    V0_1_1,
}

impl WriteFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteFormat::V0_0_2 => "0.0.2",
            WriteFormat::V0_1_1 => "0.1.1",
        }
    }
}

impl fmt::Display for WriteFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum Summary {
    #[serde(rename = "0.0.2")]
    V0_0_2(SummaryV0_0_2),
    #[serde(rename = "0.1.1")]
    V0_1_1(SummaryV0_1_1),
}

impl Summary {
    pub fn format(&self) -> WriteFormat {
        match self {
            Summary::V0_0_2(_) => WriteFormat::V0_0_2,
            Summary::V0_1_1(_) => WriteFormat::V0_1_1,
        }
    }

    /// Sequence number of the newest edit the summary covers.
    pub fn latest_seq(&self) -> u64 {
        match self {
            Summary::V0_0_2(s) => s.sequenced_edits.len() as u64,
            Summary::V0_1_1(s) => s.base_seq + s.edits.len() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        match value.get("version").and_then(|v| v.as_str()) {
            Some("0.0.2") | Some("0.1.1") => Ok(serde_json::from_value(value)?),
            Some(other) => Err(SummaryError::UnsupportedVersion(other.to_string()).into()),
            None => Err(SummaryError::UnsupportedVersion("<missing>".to_string()).into()),
        }
    }

    /// The same document in the `0.1.1` format, with full history.
    pub fn upgrade(&self) -> Result<Summary, EditorError> {
        if let Summary::V0_1_1(_) = self {
            return Ok(self.clone());
        }
        let options = SharedTreeOptions::default();
        let mut loaded = load(self, SessionId::random(), &options)?;
        write(WriteFormat::V0_1_1, &loaded.compressor, &mut loaded.edit_log, None)
    }
}

/// Sequenced state rebuilt from a summary.
#[derive(Debug)]
pub(crate) struct LoadedDocument {
    pub compressor: IdCompressor,
    pub edit_log: EditLog,
}

pub(crate) fn load(
    summary: &Summary,
    session: SessionId,
    options: &SharedTreeOptions,
) -> Result<LoadedDocument, EditorError> {
    let loaded = match summary {
        Summary::V0_0_2(s) => v0_0_2::load(s, session, options)?,
        Summary::V0_1_1(s) => v0_1_1::load(s, session, options)?,
    };
    info!(
        version = %summary.format(),
        latest_seq = loaded.edit_log.latest_seq(),
        "summary loaded"
    );
    Ok(loaded)
}

pub(crate) fn write(
    format: WriteFormat,
    compressor: &IdCompressor,
    edit_log: &mut EditLog,
    edit_window: Option<u64>,
) -> Result<Summary, EditorError> {
    let summary = match format {
        WriteFormat::V0_0_2 => Summary::V0_0_2(v0_0_2::write(compressor, edit_log)?),
        WriteFormat::V0_1_1 => Summary::V0_1_1(v0_1_1::write(compressor, edit_log, edit_window)?),
    };
    info!(version = %format, latest_seq = edit_log.latest_seq(), "summary written");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_tree::RevisionView;

    #[test]
    fn test_write_format_names() {
        assert_eq!(serde_json::to_string(&WriteFormat::V0_0_2).unwrap(), "\"0.0.2\"");
        assert_eq!(WriteFormat::default().to_string(), "0.1.1");
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = Summary::from_json(r#"{"version": "9.9.9"}"#).unwrap_err();
        assert!(matches!(
            err,
            EditorError::Summary(SummaryError::UnsupportedVersion(v)) if v == "9.9.9"
        ));
        assert!(Summary::from_json(r#"{"currentTree": {}}"#).is_err());
    }

    #[test]
    fn test_empty_document_round_trips_in_both_formats() {
        let compressor = IdCompressor::new(SessionId::random());
        for format in [WriteFormat::V0_0_2, WriteFormat::V0_1_1] {
            let mut log = EditLog::new(RevisionView::initial(), 4);
            let summary = write(format, &compressor, &mut log, None).unwrap();
            let json = summary.to_json().unwrap();
            let back = Summary::from_json(&json).unwrap();
            assert_eq!(back, summary);
            assert_eq!(back.format(), format);

            let mut loaded = load(&back, SessionId::random(), &SharedTreeOptions::default()).unwrap();
            assert_eq!(loaded.edit_log.view_at(0).unwrap(), RevisionView::initial());
        }
    }
}
