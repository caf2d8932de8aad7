//! Status payloads: the per-peer `(latest_index, latest_hash, reputation)`
//! triple §4.9 says every peer exchanges, piggybacked on the existing
//! Heartbeat message type rather than adding a new one to `axc-network`'s
//! catalogue (its `Envelope.payload` is opaque JSON precisely so a
//! downstream crate can do this). Extra fields are optional so a plain
//! liveness heartbeat from the transport's own internal loop (just
//! `node_id`/`timestamp`) still deserializes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub node_id: String,
    pub timestamp: u64,
    pub latest_index: Option<u64>,
    pub latest_hash: Option<String>,
    pub reputation: Option<f64>,
}

/// `node.query_status()` (§6): a read-only snapshot for an external caller.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub node_id: String,
    pub chain_height: u64,
    pub peer_count: usize,
    pub sync_state: String,
    pub fee_distribution: axc_core::FeeDistribution,
    pub current_reward: u64,
    pub halvings_occurred: u64,
    pub is_mining: bool,
    pub genesis_created: bool,
}
