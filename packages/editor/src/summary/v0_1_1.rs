//! Compact format: interned strings, final ids, the id compressor state, and
//! a base tree followed by a trailing window of sequenced edits.

use super::LoadedDocument;
use crate::config::SharedTreeOptions;
use crate::edit_log::EditLog;
use crate::errors::{EditorError, SummaryError};
use arbor_common::{
    IdCompressor, IdCompressorError, InternedStringId, NodeId, SerializedIdCompressor, SessionId,
    StringInterner,
};
use arbor_tree::{ChangeNode, Edit, Payload, RevisionView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryV0_1_1 {
    pub interned_strings: Vec<String>,
    pub id_compressor: SerializedIdCompressor,
    /// Sequence number the base tree corresponds to.
    pub base_seq: u64,
    pub base_tree: CompressedNode,
    /// Edits sequenced at `base_seq + 1`, `base_seq + 2`, ...
    pub edits: Vec<Edit>,
}

/// Tree node whose definition and trait labels are interned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedNode {
    pub id: NodeId,
    pub def: InternedStringId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<(InternedStringId, Vec<CompressedNode>)>,
}

fn to_final(compressor: &IdCompressor, id: NodeId) -> Result<NodeId, SummaryError> {
    let op = compressor.normalize_to_op_space(id);
    if op.is_final() {
        Ok(op)
    } else {
        Err(IdCompressorError::UnfinalizedId {
            session: compressor.local_session(),
            gen_count: op.local_gen_count().unwrap_or_default(),
        }
        .into())
    }
}

fn compress(
    node: &ChangeNode,
    interner: &mut StringInterner,
    compressor: &IdCompressor,
) -> Result<CompressedNode, SummaryError> {
    let mut traits = Vec::with_capacity(node.traits.len());
    for (label, children) in &node.traits {
        let label = interner.get_or_create_intern_id(label.as_str());
        let children = children
            .iter()
            .map(|child| compress(child, interner, compressor))
            .collect::<Result<Vec<_>, _>>()?;
        traits.push((label, children));
    }
    Ok(CompressedNode {
        id: to_final(compressor, node.identifier)?,
        def: interner.get_or_create_intern_id(node.definition.as_str()),
        payload: node.payload.clone(),
        traits,
    })
}

fn expand(node: &CompressedNode, interner: &StringInterner) -> Result<ChangeNode, SummaryError> {
    let mut traits = BTreeMap::new();
    for (label, children) in &node.traits {
        let children = children
            .iter()
            .map(|child| expand(child, interner))
            .collect::<Result<Vec<_>, _>>()?;
        traits.insert(interner.get_string(*label)?.into(), children);
    }
    Ok(ChangeNode {
        identifier: node.id,
        definition: interner.get_string(node.def)?.into(),
        payload: node.payload.clone(),
        traits,
    })
}

pub(super) fn write(
    compressor: &IdCompressor,
    edit_log: &mut EditLog,
    edit_window: Option<u64>,
) -> Result<SummaryV0_1_1, EditorError> {
    let earliest = edit_log.earliest_seq();
    let latest = edit_log.latest_seq();
    let base_seq = match edit_window {
        Some(window) => latest.saturating_sub(window).max(earliest),
        None => earliest,
    };

    let base = edit_log.view_at(base_seq)?;
    let mut interner = StringInterner::new();
    let base_tree = compress(&base.snapshot(), &mut interner, compressor)?;
    let edits = edit_log.sequenced_edits()[(base_seq - earliest) as usize..]
        .iter()
        .map(|edit| edit.try_map_node_ids(|id| to_final(compressor, id)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SummaryV0_1_1 {
        interned_strings: interner.serialize(),
        id_compressor: compressor.serialize(),
        base_seq,
        base_tree,
        edits,
    })
}

pub(super) fn load(
    summary: &SummaryV0_1_1,
    session: SessionId,
    options: &SharedTreeOptions,
) -> Result<LoadedDocument, SummaryError> {
    let compressor = IdCompressor::deserialize(&summary.id_compressor, session)?;
    let interner = StringInterner::from_strings(summary.interned_strings.iter().cloned());
    let base_tree = expand(&summary.base_tree, &interner)?;

    let check = |id: NodeId| {
        if id.is_final() && compressor.is_known(id) {
            Ok(id)
        } else {
            Err(SummaryError::Corrupt(format!("unknown id {id}")))
        }
    };
    let base_tree = base_tree.try_map_node_ids(&mut |id| check(id))?;
    let edits = summary
        .edits
        .iter()
        .map(|edit| edit.try_map_node_ids(check))
        .collect::<Result<Vec<_>, _>>()?;

    let base_view = RevisionView::from_tree(&base_tree)?;
    let edit_log = EditLog::from_snapshot(summary.base_seq, base_view, edits, options.revision_cache_size);
    Ok(LoadedDocument { compressor, edit_log })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_tree::{BuildTreeNode, Change, StablePlace, TraitLocation, TreeView};
    use serde_json::json;

    fn history(edits: usize) -> (IdCompressor, EditLog) {
        let mut compressor = IdCompressor::with_cluster_capacity(SessionId::random(), 4);
        let root = TraitLocation::new(NodeId(0), "children");
        let mut log = EditLog::new(RevisionView::initial(), 4);
        for seq in 1..=edits as u64 {
            let id = compressor.generate_compressed_id();
            let range = compressor.take_next_creation_range();
            compressor.finalize_creation_range(&range).unwrap();
            let edit = Edit::new(Change::insert_tree(
                vec![BuildTreeNode::new(id, "Item").with_payload(json!(seq)).into()],
                StablePlace::at_end_of(root.clone()),
            ));
            log.add_sequenced_edit(edit, seq).unwrap();
        }
        (compressor, log)
    }

    #[test]
    fn test_strings_are_interned_once() {
        let (compressor, mut log) = history(3);
        let summary = write(&compressor, &mut log, Some(0)).unwrap();
        assert_eq!(summary.base_seq, 3);
        assert!(summary.edits.is_empty());
        let mut strings = summary.interned_strings.clone();
        strings.sort();
        assert_eq!(strings, vec!["Item", "SharedTree.root", "children"]);
        assert!(summary.base_tree.traits[0].1.iter().all(|n| n.id.is_final()));
    }

    #[test]
    fn test_window_keeps_trailing_edits() {
        let (compressor, mut log) = history(5);
        let summary = write(&compressor, &mut log, Some(2)).unwrap();
        assert_eq!(summary.base_seq, 3);
        assert_eq!(summary.edits.len(), 2);

        let mut loaded = load(&summary, SessionId::random(), &SharedTreeOptions::default()).unwrap();
        assert_eq!(loaded.edit_log.earliest_seq(), 3);
        assert_eq!(loaded.edit_log.latest_seq(), 5);
        let view = loaded.edit_log.view_at(5).unwrap();
        assert_eq!(view.size(), 6);
        assert!(loaded.edit_log.view_at(2).is_err());
    }

    #[test]
    fn test_full_history_reproduces_every_revision() {
        let (compressor, mut log) = history(4);
        let summary = write(&compressor, &mut log, None).unwrap();
        assert_eq!(summary.base_seq, 0);

        let mut loaded = load(&summary, SessionId::random(), &SharedTreeOptions::default()).unwrap();
        for seq in 0..=4 {
            let ours = log.view_at(seq).unwrap();
            let theirs = loaded.edit_log.view_at(seq).unwrap();
            assert_eq!(ours.size(), theirs.size());
            assert!(arbor_tree::views_semantically_equal(
                &ours,
                &compressor,
                &theirs,
                &loaded.compressor
            ));
        }
    }

    #[test]
    fn test_unknown_ids_are_corrupt() {
        let (compressor, mut log) = history(1);
        let mut summary = write(&compressor, &mut log, Some(0)).unwrap();
        summary.base_tree.traits[0].1[0].id = NodeId(99_999);
        assert!(matches!(
            load(&summary, SessionId::random(), &SharedTreeOptions::default()),
            Err(SummaryError::Corrupt(_))
        ));
    }
}
