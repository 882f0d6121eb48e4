//! # Id Compressor
//!
//! Allocates node ids that are cheap to create locally and become compact,
//! globally agreed final ids once the creating edit is sequenced.
//!
//! ## Allocation
//!
//! ```text
//! generate_compressed_id()      -> L1, L2, L3 ...         (never fails, no I/O)
//! take_next_creation_range()    -> { session, 1..=3 }      (rides on the next outbound edit)
//! finalize_creation_range(r)    -> F10, F11, F12 ...       (called in sequence order, on every replica)
//! ```
//!
//! Final ids are handed out in per-session *clusters* so a session's ids stay
//! contiguous in final space. Every replica finalizes the same ranges in the
//! same order, so every replica computes the same final ids without talking
//! to anyone.

use crate::error::IdCompressorError;
use crate::identifiers::{NodeId, SessionId, StableId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Number of final ids reserved for the ghost session at genesis.
pub const RESERVED_ID_COUNT: u64 = 10;

/// Default number of final ids reserved per cluster.
pub const INITIAL_CLUSTER_CAPACITY: u64 = 512;

/// Session that owns the reserved ids. Its first id is the initial tree root.
pub const GHOST_SESSION_ID: SessionId =
    SessionId(Uuid::from_u128(0x24e2_6f0b_3c1a_47f8_a7a1_e846_1ddb_69ce));

/// Ids created by one session since its previous range, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRange {
    pub first_gen_count: u64,
    pub last_gen_count: u64,
}

impl IdRange {
    pub fn len(&self) -> u64 {
        self.last_gen_count + 1 - self.first_gen_count
    }

    pub fn is_empty(&self) -> bool {
        self.last_gen_count < self.first_gen_count
    }
}

/// Creation range attached to an outbound edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdCreationRange {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<IdRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub base_final: u64,
    /// Generation count of the first id in the cluster (1-based).
    pub base_gen_count: u64,
    pub capacity: u64,
    pub count: u64,
}

impl Cluster {
    fn contains_gen(&self, gen_count: u64) -> bool {
        gen_count >= self.base_gen_count && gen_count < self.base_gen_count + self.count
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    clusters: Vec<Cluster>,
    finalized_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedSession {
    pub session_id: SessionId,
    pub finalized_count: u64,
    pub clusters: Vec<Cluster>,
}

/// Sequenced compressor state. Local, unfinalized ids are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedIdCompressor {
    pub cluster_capacity: u64,
    /// High-water mark of final id allocation.
    pub next_final: u64,
    pub sessions: Vec<SerializedSession>,
    #[serde(default)]
    pub overrides: Vec<(u64, StableId)>,
}

/// Per-replica id allocator.
#[derive(Debug, Clone)]
pub struct IdCompressor {
    local_session: SessionId,
    local_gen_count: u64,
    taken_gen_count: u64,
    cluster_capacity: u64,
    next_final: u64,
    sessions: BTreeMap<SessionId, SessionState>,
    /// Cluster base final id -> owning session and cluster index.
    final_index: BTreeMap<u64, (SessionId, usize)>,
    overrides: BTreeMap<StableId, u64>,
    override_finals: BTreeMap<u64, StableId>,
}

impl IdCompressor {
    pub fn new(local_session: SessionId) -> Self {
        Self::with_cluster_capacity(local_session, INITIAL_CLUSTER_CAPACITY)
    }

    /// Every replica of a document must use the same capacity.
    pub fn with_cluster_capacity(local_session: SessionId, cluster_capacity: u64) -> Self {
        let mut compressor = Self {
            local_session,
            local_gen_count: 0,
            taken_gen_count: 0,
            cluster_capacity: cluster_capacity.max(1),
            next_final: 0,
            sessions: BTreeMap::new(),
            final_index: BTreeMap::new(),
            overrides: BTreeMap::new(),
            override_finals: BTreeMap::new(),
        };

        let ghost = Cluster {
            base_final: 0,
            base_gen_count: 1,
            capacity: RESERVED_ID_COUNT,
            count: RESERVED_ID_COUNT,
        };
        compressor.final_index.insert(0, (GHOST_SESSION_ID, 0));
        compressor.sessions.insert(
            GHOST_SESSION_ID,
            SessionState {
                clusters: vec![ghost],
                finalized_count: RESERVED_ID_COUNT,
            },
        );
        compressor.next_final = RESERVED_ID_COUNT;
        compressor
    }

    pub fn local_session(&self) -> SessionId {
        self.local_session
    }

    pub fn cluster_capacity(&self) -> u64 {
        self.cluster_capacity
    }

    /// First final id that has not been reserved yet.
    pub fn high_water_mark(&self) -> u64 {
        self.next_final
    }

    /// Allocate a session-local id. Never fails.
    pub fn generate_compressed_id(&mut self) -> NodeId {
        self.local_gen_count += 1;
        NodeId::from_local(self.local_gen_count)
    }

    /// Range of ids generated since the previous call.
    pub fn take_next_creation_range(&mut self) -> IdCreationRange {
        let ids = if self.local_gen_count > self.taken_gen_count {
            Some(IdRange {
                first_gen_count: self.taken_gen_count + 1,
                last_gen_count: self.local_gen_count,
            })
        } else {
            None
        };
        self.taken_gen_count = self.local_gen_count;
        IdCreationRange {
            session_id: self.local_session,
            ids,
        }
    }

    /// Assign final ids to a sequenced creation range.
    ///
    /// Must be called in sequence order. Finalizing a range that is already
    /// fully finalized is a no-op, so the resulting final ids never change.
    pub fn finalize_creation_range(&mut self, range: &IdCreationRange) -> Result<(), IdCompressorError> {
        let Some(ids) = range.ids else {
            return Ok(());
        };
        if ids.is_empty() || ids.first_gen_count == 0 {
            return Err(IdCompressorError::MalformedRange {
                session: range.session_id,
                first: ids.first_gen_count,
                last: ids.last_gen_count,
            });
        }

        let session = range.session_id;
        let state = self.sessions.entry(session).or_default();
        if ids.last_gen_count <= state.finalized_count {
            return Ok(());
        }
        if ids.first_gen_count != state.finalized_count + 1 {
            return Err(IdCompressorError::RangeOutOfOrder {
                session,
                expected: state.finalized_count + 1,
                actual: ids.first_gen_count,
            });
        }

        let mut remaining = ids.last_gen_count - state.finalized_count;
        if let Some(open) = state.clusters.last_mut() {
            let take = (open.capacity - open.count).min(remaining);
            open.count += take;
            remaining -= take;
            if remaining > 0 && open.base_final + open.capacity == self.next_final {
                open.capacity += remaining;
                open.count += remaining;
                self.next_final += remaining;
                remaining = 0;
            }
        }
        if remaining > 0 {
            let capacity = remaining.max(self.cluster_capacity);
            let cluster = Cluster {
                base_final: self.next_final,
                base_gen_count: ids.last_gen_count - remaining + 1,
                capacity,
                count: remaining,
            };
            self.final_index
                .insert(cluster.base_final, (session, state.clusters.len()));
            state.clusters.push(cluster);
            self.next_final += capacity;
        }
        state.finalized_count = ids.last_gen_count;
        Ok(())
    }

    /// Final id of a session's `gen_count`-th id, if finalized.
    pub fn final_for(&self, session: SessionId, gen_count: u64) -> Option<u64> {
        let state = self.sessions.get(&session)?;
        let idx = state
            .clusters
            .partition_point(|c| c.base_gen_count <= gen_count)
            .checked_sub(1)?;
        let cluster = &state.clusters[idx];
        if cluster.contains_gen(gen_count) {
            Some(cluster.base_final + (gen_count - cluster.base_gen_count))
        } else {
            None
        }
    }

    /// Session and generation count that produced a final id.
    fn origin_of_final(&self, final_id: u64) -> Option<(SessionId, u64)> {
        let (&base, &(session, idx)) = self.final_index.range(..=final_id).next_back()?;
        let cluster = self.sessions.get(&session)?.clusters.get(idx)?;
        if final_id < base + cluster.count {
            Some((session, cluster.base_gen_count + (final_id - base)))
        } else {
            None
        }
    }

    fn is_known_final(&self, final_id: u64) -> bool {
        self.override_finals.contains_key(&final_id) || self.origin_of_final(final_id).is_some()
    }

    /// Convert a session-space id to the form sent on the wire.
    pub fn normalize_to_op_space(&self, id: NodeId) -> NodeId {
        match id.local_gen_count() {
            Some(gen_count) => self
                .final_for(self.local_session, gen_count)
                .map(NodeId::from_final)
                .unwrap_or(id),
            None => id,
        }
    }

    /// Convert an op-space id authored by `origin` into this session's space.
    pub fn normalize_to_session_space(
        &self,
        id: NodeId,
        origin: SessionId,
    ) -> Result<NodeId, IdCompressorError> {
        if let Some(final_id) = id.final_index() {
            if let Some((session, gen_count)) = self.origin_of_final(final_id) {
                if session == self.local_session {
                    return Ok(NodeId::from_local(gen_count));
                }
                return Ok(id);
            }
            if self.override_finals.contains_key(&final_id) {
                return Ok(id);
            }
            return Err(IdCompressorError::UnknownFinalId(final_id));
        }

        let gen_count = id.local_gen_count().unwrap_or_default();
        if origin == self.local_session {
            if gen_count <= self.local_gen_count {
                return Ok(id);
            }
            return Err(IdCompressorError::UnknownLocalId(gen_count));
        }
        self.final_for(origin, gen_count)
            .map(NodeId::from_final)
            .ok_or(IdCompressorError::UnfinalizedId {
                session: origin,
                gen_count,
            })
    }

    /// Stable identity of a session-space id.
    pub fn decompress(&self, id: NodeId) -> Result<StableId, IdCompressorError> {
        if let Some(gen_count) = id.local_gen_count() {
            if gen_count <= self.local_gen_count {
                return Ok(self.local_session.stable_id_at(gen_count - 1));
            }
            return Err(IdCompressorError::UnknownLocalId(gen_count));
        }
        let final_id = id.0 as u64;
        if let Some(stable) = self.override_finals.get(&final_id) {
            return Ok(*stable);
        }
        self.origin_of_final(final_id)
            .map(|(session, gen_count)| session.stable_id_at(gen_count - 1))
            .ok_or(IdCompressorError::UnknownFinalId(final_id))
    }

    /// Session-space id of a stable id, if this compressor knows it.
    pub fn recompress(&self, stable: StableId) -> Option<NodeId> {
        if let Some(final_id) = self.overrides.get(&stable) {
            return Some(NodeId::from_final(*final_id));
        }
        let local_offset = stable.0.as_u128().wrapping_sub(self.local_session.0.as_u128());
        if local_offset < self.local_gen_count as u128 {
            return Some(NodeId::from_local(local_offset as u64 + 1));
        }
        self.sessions.iter().find_map(|(session, state)| {
            let offset = stable.0.as_u128().wrapping_sub(session.0.as_u128());
            if offset < state.finalized_count as u128 {
                self.final_for(*session, offset as u64 + 1).map(NodeId::from_final)
            } else {
                None
            }
        })
    }

    /// Give an externally minted stable id a final id.
    ///
    /// Used when loading legacy summaries whose ids were never allocated by a
    /// compressor. Deterministic as long as every replica interns the same
    /// ids in the same order.
    pub fn intern_stable_id(&mut self, stable: StableId) -> NodeId {
        if let Some(id) = self.recompress(stable) {
            return id;
        }
        let final_id = self.next_final;
        self.next_final += 1;
        self.overrides.insert(stable, final_id);
        self.override_finals.insert(final_id, stable);
        NodeId::from_final(final_id)
    }

    pub fn is_known(&self, id: NodeId) -> bool {
        match id.local_gen_count() {
            Some(gen_count) => gen_count <= self.local_gen_count,
            None => self.is_known_final(id.0 as u64),
        }
    }

    pub fn serialize(&self) -> SerializedIdCompressor {
        SerializedIdCompressor {
            cluster_capacity: self.cluster_capacity,
            next_final: self.next_final,
            sessions: self
                .sessions
                .iter()
                .map(|(session_id, state)| SerializedSession {
                    session_id: *session_id,
                    finalized_count: state.finalized_count,
                    clusters: state.clusters.clone(),
                })
                .collect(),
            overrides: self
                .override_finals
                .iter()
                .map(|(final_id, stable)| (*final_id, *stable))
                .collect(),
        }
    }

    /// Restore sequenced state into a compressor for `local_session`.
    pub fn deserialize(
        serialized: &SerializedIdCompressor,
        local_session: SessionId,
    ) -> Result<Self, IdCompressorError> {
        let mut compressor = Self {
            local_session,
            local_gen_count: 0,
            taken_gen_count: 0,
            cluster_capacity: serialized.cluster_capacity.max(1),
            next_final: serialized.next_final,
            sessions: BTreeMap::new(),
            final_index: BTreeMap::new(),
            overrides: BTreeMap::new(),
            override_finals: BTreeMap::new(),
        };

        for session in &serialized.sessions {
            for (idx, cluster) in session.clusters.iter().enumerate() {
                if cluster.base_final + cluster.capacity > serialized.next_final {
                    return Err(IdCompressorError::CorruptState(format!(
                        "cluster at {} exceeds high-water mark {}",
                        cluster.base_final, serialized.next_final
                    )));
                }
                compressor
                    .final_index
                    .insert(cluster.base_final, (session.session_id, idx));
            }
            compressor.sessions.insert(
                session.session_id,
                SessionState {
                    clusters: session.clusters.clone(),
                    finalized_count: session.finalized_count,
                },
            );
        }
        for (final_id, stable) in &serialized.overrides {
            compressor.overrides.insert(*stable, *final_id);
            compressor.override_finals.insert(*final_id, *stable);
        }

        // A resumed session continues after its finalized ids.
        if let Some(state) = compressor.sessions.get(&local_session) {
            compressor.local_gen_count = state.finalized_count;
            compressor.taken_gen_count = state.finalized_count;
        }
        Ok(compressor)
    }
}
