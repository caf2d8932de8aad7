//! Synchronizer (C10): status exchange, batched block-range requests and
//! conflict resolution, grounded on
//! `original_source/src/p2p/synchronization.py`'s `ChainSynchronizer`
//! (peer status table + pending-request timeout map + timestamp/reputation
//! tie-break), reimplemented over `parking_lot::RwLock`-guarded state in the
//! teacher's single-writer-per-component idiom.

use axc_core::Block;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const SYNC_BATCH_SIZE: u64 = 100;
pub const MAX_SYNC_PEERS: usize = 5;
pub const MIN_SYNC_REPUTATION: f64 = 0.5;
pub const SYNC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const PARTITION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    Syncing,
    Behind,
    Ahead,
    Conflicted,
    Partitioned,
}

#[derive(Debug, Clone)]
pub struct PeerStatus {
    pub node_id: String,
    pub latest_index: u64,
    pub latest_hash: String,
    pub reputation: f64,
    pub received_at: Instant,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncRequest {
    pub request_id: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncResponse {
    pub request_id: String,
    pub blocks: Vec<Block>,
}

struct PendingRequest {
    peer_id: String,
    issued_at: Instant,
}

/// Owns no chain state directly (§5: the chain has a single writer, the
/// consensus/bootstrap task); this tracks peer status and in-flight
/// requests, and exposes pure decision functions the node container applies
/// against its own chain.
pub struct Synchronizer {
    local_node_id: String,
    peer_statuses: RwLock<HashMap<String, PeerStatus>>,
    pending: RwLock<HashMap<String, PendingRequest>>,
}

impl Synchronizer {
    pub fn new(local_node_id: impl Into<String>) -> Self {
        Synchronizer {
            local_node_id: local_node_id.into(),
            peer_statuses: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_node_id(&self) -> &str {
        &self.local_node_id
    }

    pub fn record_status(&self, status: PeerStatus) {
        self.peer_statuses.write().insert(status.node_id.clone(), status);
    }

    pub fn remove_peer(&self, node_id: &str) {
        self.peer_statuses.write().remove(node_id);
    }

    /// Behind if any known peer's chain is longer than ours; Partitioned if
    /// we have no peers or none has reported status within the timeout;
    /// Ahead if we're strictly longer than every peer; Synced otherwise.
    pub fn evaluate_state(&self, local_latest_index: u64) -> SyncState {
        let statuses = self.peer_statuses.read();
        if statuses.is_empty() {
            return SyncState::Partitioned;
        }
        let now = Instant::now();
        let all_stale = statuses.values().all(|s| now.duration_since(s.received_at) > PARTITION_TIMEOUT);
        if all_stale {
            return SyncState::Partitioned;
        }
        if statuses.values().any(|s| s.latest_index > local_latest_index) {
            return SyncState::Behind;
        }
        if statuses.values().all(|s| s.latest_index < local_latest_index) {
            return SyncState::Ahead;
        }
        SyncState::Synced
    }

    /// Selects up to `MAX_SYNC_PEERS` eligible peers (reputation ≥ 0.5),
    /// ranked by (reputation, latest_index) descending.
    pub fn select_sync_peers(&self) -> Vec<PeerStatus> {
        let mut eligible: Vec<PeerStatus> = self
            .peer_statuses
            .read()
            .values()
            .filter(|s| s.reputation >= MIN_SYNC_REPUTATION)
            .cloned()
            .collect();
        eligible.sort_by(|a, b| {
            b.reputation
                .partial_cmp(&a.reputation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.latest_index.cmp(&a.latest_index))
        });
        eligible.truncate(MAX_SYNC_PEERS);
        eligible
    }

    /// Builds one `SyncRequest` per selected peer and registers it as
    /// pending. `request_id` is caller-supplied (typically a uuid) so the
    /// caller can thread it through the outbound envelope.
    pub fn start_request(&self, peer_id: impl Into<String>, request: SyncRequest) {
        self.pending.write().insert(
            request.request_id.clone(),
            PendingRequest { peer_id: peer_id.into(), issued_at: Instant::now() },
        );
    }

    pub fn build_request(local_latest: u64, peer: &PeerStatus, request_id: impl Into<String>) -> SyncRequest {
        let start = local_latest + 1;
        let end = (local_latest + SYNC_BATCH_SIZE).min(peer.latest_index);
        SyncRequest { request_id: request_id.into(), start, end }
    }

    /// Drops and returns request ids that have exceeded the 30s timeout.
    pub fn expire_timed_out(&self) -> Vec<String> {
        let now = Instant::now();
        let mut pending = self.pending.write();
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, req)| now.duration_since(req.issued_at) > SYNC_REQUEST_TIMEOUT)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            pending.remove(id);
        }
        expired
    }

    pub fn complete_request(&self, request_id: &str) -> Option<String> {
        self.pending.write().remove(request_id).map(|req| req.peer_id)
    }

    /// `timestamp_reputation` conflict rule (§4.9): an incoming block may
    /// replace an existing one at the same index only if its timestamp is
    /// strictly later and the sender's reputation clears the floor.
    pub fn should_replace(existing: &Block, incoming: &Block, sender_reputation: f64) -> bool {
        incoming.timestamp > existing.timestamp && sender_reputation >= MIN_SYNC_REPUTATION
    }

    /// Validates a response block against the block immediately preceding
    /// it in the local view, reusing the chain model's structural rules.
    pub fn validate_against(incoming: &Block, previous: Option<&Block>, now: u64) -> Result<(), axc_core::BlockError> {
        incoming.is_valid(previous, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(node_id: &str, index: u64, reputation: f64) -> PeerStatus {
        PeerStatus {
            node_id: node_id.to_string(),
            latest_index: index,
            latest_hash: "deadbeef".to_string(),
            reputation,
            received_at: Instant::now(),
        }
    }

    #[test]
    fn behind_when_a_peer_has_a_longer_chain() {
        let sync = Synchronizer::new("self");
        sync.record_status(status("peer-a", 10, 0.9));
        assert_eq!(sync.evaluate_state(5), SyncState::Behind);
    }

    #[test]
    fn partitioned_with_no_known_peers() {
        let sync = Synchronizer::new("self");
        assert_eq!(sync.evaluate_state(5), SyncState::Partitioned);
    }

    #[test]
    fn select_sync_peers_excludes_low_reputation_and_ranks_by_reputation_then_index() {
        let sync = Synchronizer::new("self");
        sync.record_status(status("low-rep", 100, 0.2));
        sync.record_status(status("high-rep-short", 5, 0.9));
        sync.record_status(status("high-rep-long", 50, 0.9));
        let selected = sync.select_sync_peers();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].node_id, "high-rep-long");
    }

    #[test]
    fn conflict_resolution_requires_later_timestamp_and_reputation_floor() {
        let genesis = Block::placeholder_genesis();
        let mut later = genesis.clone();
        later.timestamp += 10;
        later.hash = later.compute_hash();

        assert!(Synchronizer::should_replace(&genesis, &later, 0.6));
        assert!(!Synchronizer::should_replace(&genesis, &later, 0.3));
        assert!(!Synchronizer::should_replace(&later, &genesis, 0.9));
    }
}
