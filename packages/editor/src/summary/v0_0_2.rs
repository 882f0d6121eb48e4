//! Legacy format: stable ids and the complete edit history.
//!
//! Loading replays the history from the initial tree and rejects the summary
//! if the result differs from the tree it claims to describe.

use super::LoadedDocument;
use crate::config::SharedTreeOptions;
use crate::edit_log::EditLog;
use crate::errors::{EditorError, SummaryError};
use arbor_common::{IdCompressor, NodeId, SessionId, StableId};
use arbor_tree::{apply_edit, ChangeNode, Edit, RevisionView};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryV0_0_2 {
    pub current_tree: ChangeNode<StableId>,
    pub sequenced_edits: Vec<Edit<StableId>>,
}

pub(super) fn write(compressor: &IdCompressor, edit_log: &mut EditLog) -> Result<SummaryV0_0_2, EditorError> {
    if edit_log.earliest_seq() != 0 {
        return Err(SummaryError::HistoryUnavailable(edit_log.earliest_seq()).into());
    }
    let mut stable = |id: NodeId| compressor.decompress(id).map_err(SummaryError::from);

    let current = edit_log.view_at(edit_log.latest_seq())?;
    let current_tree = current.snapshot().try_map_node_ids(&mut stable)?;
    let sequenced_edits = edit_log
        .sequenced_edits()
        .iter()
        .map(|edit| edit.try_map_node_ids(&mut stable))
        .collect::<Result<Vec<_>, SummaryError>>()?;
    Ok(SummaryV0_0_2 {
        current_tree,
        sequenced_edits,
    })
}

pub(super) fn load(
    summary: &SummaryV0_0_2,
    session: SessionId,
    options: &SharedTreeOptions,
) -> Result<LoadedDocument, SummaryError> {
    let mut compressor = IdCompressor::with_cluster_capacity(session, options.id_cluster_capacity);
    let mut view = RevisionView::initial();
    let mut edits = Vec::with_capacity(summary.sequenced_edits.len());

    for edit in &summary.sequenced_edits {
        let edit = edit.try_map_node_ids(|id| Ok::<_, SummaryError>(compressor.intern_stable_id(id)))?;
        if let Some(after) = apply_edit(&view, edit.changes.iter().cloned())?.after() {
            view = after.clone();
        }
        edits.push(edit);
    }

    let current_tree = summary.current_tree.try_map_node_ids(&mut |id: StableId| {
        compressor
            .recompress(id)
            .ok_or_else(|| SummaryError::InvalidStableId(id.to_string()))
    })?;
    if RevisionView::from_tree(&current_tree)? != view {
        warn!(edits = edits.len(), "summarized tree disagrees with its history");
        return Err(SummaryError::HistoryMismatch);
    }

    let latest = edits.len() as u64;
    let mut edit_log = EditLog::from_snapshot(0, RevisionView::initial(), edits, options.revision_cache_size);
    edit_log.pin_view(latest, view);
    Ok(LoadedDocument { compressor, edit_log })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_tree::{BuildTreeNode, Change, StablePlace, TraitLocation, TreeView};
    use serde_json::json;

    fn history() -> (IdCompressor, EditLog) {
        let session = SessionId::random();
        let mut compressor = IdCompressor::new(session);
        let a = compressor.generate_compressed_id();
        let b = compressor.generate_compressed_id();
        let range = compressor.take_next_creation_range();
        compressor.finalize_creation_range(&range).unwrap();

        let root = TraitLocation::new(NodeId(0), "children");
        let mut log = EditLog::new(RevisionView::initial(), 4);
        log.add_sequenced_edit(
            Edit::new(Change::insert_tree(
                vec![BuildTreeNode::new(a, "Item")
                    .with_payload(json!({"n": 1}))
                    .with_child("tags", BuildTreeNode::new(b, "Tag"))
                    .into()],
                StablePlace::at_start_of(root),
            )),
            1,
        )
        .unwrap();
        log.add_sequenced_edit(Edit::new(vec![Change::set_payload(a, json!({"n": 2}))]), 2)
            .unwrap();
        (compressor, log)
    }

    #[test]
    fn test_write_uses_stable_ids() {
        let (compressor, mut log) = history();
        let summary = write(&compressor, &mut log).unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        let root_id = compressor.decompress(NodeId(0)).unwrap().to_string();
        assert_eq!(json["currentTree"]["identifier"], json!(root_id));
        assert_eq!(summary.sequenced_edits.len(), 2);
    }

    #[test]
    fn test_load_replays_history() {
        let (compressor, mut log) = history();
        let summary = write(&compressor, &mut log).unwrap();
        let loaded = load(&summary, SessionId::random(), &SharedTreeOptions::default()).unwrap();

        let mut edit_log = loaded.edit_log;
        let view = edit_log.view_at(2).unwrap();
        assert_eq!(view.size(), 3);
        let item = view.trait_children(&TraitLocation::new(NodeId(0), "children"))[0];
        assert_eq!(view.get(item).unwrap().payload, Some(json!({"n": 2})));
        assert_eq!(
            loaded.compressor.decompress(item).unwrap(),
            compressor.decompress(NodeId(-1)).unwrap()
        );
    }

    #[test]
    fn test_tampered_tree_is_rejected() {
        let (compressor, mut log) = history();
        let mut summary = write(&compressor, &mut log).unwrap();
        summary.current_tree.payload = Some(json!("tampered"));
        assert!(matches!(
            load(&summary, SessionId::random(), &SharedTreeOptions::default()),
            Err(SummaryError::HistoryMismatch)
        ));
    }

    #[test]
    fn test_windowed_log_cannot_be_written() {
        let (compressor, mut log) = history();
        let base = log.view_at(1).unwrap();
        let mut windowed = EditLog::from_snapshot(1, base, log.sequenced_edits()[1..].to_vec(), 4);
        assert!(matches!(
            write(&compressor, &mut windowed),
            Err(EditorError::Summary(SummaryError::HistoryUnavailable(1)))
        ));
    }
}
