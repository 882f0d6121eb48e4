//! Counters describing how well concurrent edits are merging.
//!
//! A replica whose sequenced edits keep failing, or whose local edits keep
//! getting dropped on rebase, is seeing conflicts its users will notice.
//! Hosts read the counters with [`SharedTree::merge_health`] or drain them
//! periodically with [`SharedTree::take_merge_health`], which also logs them.
//!
//! [`SharedTree::merge_health`]: crate::SharedTree::merge_health
//! [`SharedTree::take_merge_health`]: crate::SharedTree::take_merge_health

use arbor_tree::{EditStatus, TransactionFailure};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeHealthStats {
    /// Sequenced edits processed, from every replica.
    pub edit_count: u64,
    /// Of those, edits this replica authored.
    pub local_edit_count: u64,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub malformed_count: u64,
    /// Failed sequenced edits, keyed by [`FailureKind::name`].
    ///
    /// [`FailureKind::name`]: arbor_tree::FailureKind::name
    pub failures_by_kind: BTreeMap<String, u64>,
    /// Local edits that stopped applying when rebased and were dropped.
    pub dropped_rebases: u64,
}

impl MergeHealthStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sequenced(&mut self, status: EditStatus, failure: Option<&TransactionFailure>, was_local: bool) {
        self.edit_count += 1;
        if was_local {
            self.local_edit_count += 1;
        }
        match status {
            EditStatus::Valid => self.valid_count += 1,
            EditStatus::Invalid => self.invalid_count += 1,
            EditStatus::Malformed => self.malformed_count += 1,
        }
        if let Some(failure) = failure {
            *self.failures_by_kind.entry(failure.kind.name().to_string()).or_default() += 1;
        }
    }

    pub fn record_dropped_rebase(&mut self) {
        self.dropped_rebases += 1;
    }

    /// Share of sequenced edits that did not apply.
    pub fn failure_rate(&self) -> f64 {
        if self.edit_count == 0 {
            return 0.0;
        }
        (self.invalid_count + self.malformed_count) as f64 / self.edit_count as f64
    }

    pub fn is_empty(&self) -> bool {
        self.edit_count == 0 && self.dropped_rebases == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_common::NodeId;
    use arbor_tree::FailureKind;

    #[test]
    fn test_counts_by_status_and_kind() {
        let mut stats = MergeHealthStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.failure_rate(), 0.0);

        let failure = TransactionFailure {
            change_index: 1,
            kind: FailureKind::UnknownId(NodeId(4)),
        };
        stats.record_sequenced(EditStatus::Valid, None, true);
        stats.record_sequenced(EditStatus::Invalid, Some(&failure), false);
        stats.record_sequenced(EditStatus::Invalid, Some(&failure), true);
        stats.record_dropped_rebase();

        assert_eq!(stats.edit_count, 3);
        assert_eq!(stats.local_edit_count, 2);
        assert_eq!(stats.valid_count, 1);
        assert_eq!(stats.invalid_count, 2);
        assert_eq!(stats.failures_by_kind.get("unknownId"), Some(&2));
        assert_eq!(stats.dropped_rebases, 1);
        assert!((stats.failure_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut stats = MergeHealthStats::new();
        stats.record_dropped_rebase();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["droppedRebases"], 1);
        assert_eq!(json["failuresByKind"], serde_json::json!({}));
    }
}
