//! Wire envelope (§4.6, §6): a length-prefixed JSON frame carries one
//! `Envelope` per message. Duck-typed payloads on the original wire become a
//! fixed `MessageType` tag plus an opaque JSON `payload` here — downstream
//! crates (sync, bootstrap, consensus, challenge) own the typed payload
//! shapes and deserialize `payload` into them, which keeps this crate from
//! depending back on any of them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Transaction,
    Block,
    Challenge,
    Solution,
    PeerDiscovery,
    AiNodeDiscovery,
    SyncRequest,
    SyncResponse,
    Heartbeat,
    FeeDistributionUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub sender_id: String,
    pub recipient_id: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: u64,
    pub signature: Option<Vec<u8>>,
}

impl Envelope {
    pub fn new(
        msg_type: MessageType,
        sender_id: impl Into<String>,
        recipient_id: Option<String>,
        payload: serde_json::Value,
        timestamp: u64,
    ) -> Self {
        Envelope {
            msg_type,
            sender_id: sender_id.into(),
            recipient_id,
            payload,
            timestamp,
            signature: None,
        }
    }

    /// `message_id = SHA-256(type ‖ canonical_payload)`, used by the
    /// propagation dedup cache (§4.8).
    pub fn message_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.msg_type).as_bytes());
        hasher.update(self.payload.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The bytes an Ed25519 signature is computed over: canonical JSON of
    /// `payload` plus `sender_id` and `timestamp` (§6).
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!("{}:{}:{}", self.sender_id, self.timestamp, self.payload).into_bytes()
    }

    pub fn sign(&mut self, secret_key: &[u8]) -> Result<(), axc_crypto::CryptoError> {
        self.signature = Some(axc_crypto::sign(secret_key, &self.signing_bytes())?);
        Ok(())
    }

    pub fn verify_signature(&self, public_key: &[u8]) -> bool {
        match &self.signature {
            Some(sig) => axc_crypto::verify(public_key, sig, &self.signing_bytes()),
            None => false,
        }
    }
}

/// Handshake payload (§4.6): fixed keys, exchanged by both sides before a
/// peer is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub node_id: String,
    pub network_id: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub node_id: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDiscoveryPayload {
    pub node_id: String,
    pub address: String,
    pub port: u16,
    pub network_id: String,
    pub is_ai_node: bool,
    pub model_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_is_stable_for_identical_content() {
        let a = Envelope::new(MessageType::Heartbeat, "node-a", None, serde_json::json!({"x": 1}), 10);
        let b = Envelope::new(MessageType::Heartbeat, "node-a", None, serde_json::json!({"x": 1}), 20);
        assert_eq!(a.message_id(), b.message_id());
    }

    #[test]
    fn message_id_changes_with_payload() {
        let a = Envelope::new(MessageType::Heartbeat, "node-a", None, serde_json::json!({"x": 1}), 10);
        let b = Envelope::new(MessageType::Heartbeat, "node-a", None, serde_json::json!({"x": 2}), 10);
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn sign_then_verify_roundtrips() {
        let keys = axc_crypto::generate_keypair();
        let mut env = Envelope::new(MessageType::Transaction, "node-a", None, serde_json::json!({"amount": "5"}), 100);
        env.sign(&keys.secret_key).unwrap();
        assert!(env.verify_signature(&keys.public_key));
    }
}
