//! Pioneer candidacy announcement (§4.10): broadcast under the existing
//! `MessageType::PeerDiscovery` tag rather than adding a dedicated message
//! type, distinguished from the transport's own peer-exchange beacon
//! (`axc_network::PeerDiscoveryPayload`) by its `validator_address` field.
//! Dispatch tries this shape first and falls back to the beacon shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PioneerAnnouncement {
    pub node_id: String,
    pub validator_address: String,
    pub reward_address: String,
}
