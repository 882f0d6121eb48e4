use crate::errors::ConfigError;
use crate::summary::WriteFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_OPTIONS_NAME: &str = "arbor.config.json";

/// When submitted edits are handed to the sequencing service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlushMode {
    /// Every edit is sent as soon as it is submitted.
    #[default]
    Immediate,
    /// Edits queue until the host calls `flush`.
    TurnBased,
}

/// Per-document options of a shared tree replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedTreeOptions {
    /// Summary format written by `summarize`
    #[serde(default)]
    pub write_format: WriteFormat,

    /// Number of revision views kept by the edit log
    #[serde(default = "default_revision_cache_size")]
    pub revision_cache_size: usize,

    /// Final ids reserved per session cluster
    #[serde(default = "default_id_cluster_capacity")]
    pub id_cluster_capacity: u64,

    /// Sequenced edits kept in 0.1.1 summaries; `None` keeps the full history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_edit_window: Option<u64>,

    #[serde(default)]
    pub flush_mode: FlushMode,

    /// Maximum undo levels (0 = unlimited)
    #[serde(default = "default_undo_levels")]
    pub undo_levels: usize,
}

fn default_revision_cache_size() -> usize {
    50
}

fn default_id_cluster_capacity() -> u64 {
    arbor_common::INITIAL_CLUSTER_CAPACITY
}

fn default_undo_levels() -> usize {
    100
}

impl SharedTreeOptions {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: SharedTreeOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a directory
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = dir.as_ref().join(DEFAULT_OPTIONS_NAME);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_json(&content)
        } else {
            // Return default options if none exist
            Ok(SharedTreeOptions::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.revision_cache_size == 0 {
            return Err(ConfigError::Invalid {
                field: "revisionCacheSize",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.id_cluster_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "idClusterCapacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SharedTreeOptions {
    fn default() -> Self {
        Self {
            write_format: WriteFormat::default(),
            revision_cache_size: default_revision_cache_size(),
            id_cluster_capacity: default_id_cluster_capacity(),
            summary_edit_window: None,
            flush_mode: FlushMode::default(),
            undo_levels: default_undo_levels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let json = r#"{
            "writeFormat": "0.0.2",
            "revisionCacheSize": 8,
            "idClusterCapacity": 16,
            "summaryEditWindow": 100,
            "flushMode": "turnBased"
        }"#;

        let options = SharedTreeOptions::from_json(json).unwrap();
        assert_eq!(options.write_format, WriteFormat::V0_0_2);
        assert_eq!(options.revision_cache_size, 8);
        assert_eq!(options.id_cluster_capacity, 16);
        assert_eq!(options.summary_edit_window, Some(100));
        assert_eq!(options.flush_mode, FlushMode::TurnBased);
        assert_eq!(options.undo_levels, 100);
    }

    #[test]
    fn test_default_options() {
        let options = SharedTreeOptions::from_json("{}").unwrap();
        assert_eq!(options, SharedTreeOptions::default());
        assert_eq!(options.write_format, WriteFormat::V0_1_1);
        assert_eq!(options.revision_cache_size, 50);
        assert_eq!(options.id_cluster_capacity, 512);
        assert_eq!(options.flush_mode, FlushMode::Immediate);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let err = SharedTreeOptions::from_json(r#"{"revisionCacheSize": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "revisionCacheSize", .. }));
        assert!(SharedTreeOptions::from_json(r#"{"flushMode": "sometimes"}"#).is_err());
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("arbor-options-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert_eq!(SharedTreeOptions::load(&dir).unwrap(), SharedTreeOptions::default());

        std::fs::write(dir.join(DEFAULT_OPTIONS_NAME), r#"{"idClusterCapacity": 4}"#).unwrap();
        assert_eq!(SharedTreeOptions::load(&dir).unwrap().id_cluster_capacity, 4);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
