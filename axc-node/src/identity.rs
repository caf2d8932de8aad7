//! Node identity: the Ed25519 keypair and derived address a node signs
//! wire envelopes and registers itself as a validator with, persisted so
//! it survives restarts (§6's `node_identity.json`, alongside the rest of
//! `axc-storage`'s persisted layout).

use anyhow::Result;
use axc_crypto::KeyMaterial;
use axc_storage::{DataStore, NodeIdentityRecord};

pub struct NodeIdentity {
    pub node_id: String,
    pub keys: KeyMaterial,
    pub address: String,
}

impl NodeIdentity {
    /// Loads the persisted identity for `node_id`, or mints and persists a
    /// fresh one on first run.
    pub fn load_or_create(store: &DataStore, node_id: &str) -> Result<Self> {
        if let Some(record) = store.load_node_identity()? {
            let address = axc_crypto::derive_address(&record.public_key)?;
            return Ok(NodeIdentity {
                node_id: record.node_id,
                keys: KeyMaterial {
                    public_key: record.public_key,
                    secret_key: record.secret_key,
                    mnemonic: String::new(),
                },
                address,
            });
        }
        let keys = axc_crypto::generate_keypair();
        let address = axc_crypto::derive_address(&keys.public_key)?;
        store.save_node_identity(&NodeIdentityRecord {
            node_id: node_id.to_string(),
            public_key: keys.public_key.clone(),
            secret_key: keys.secret_key.clone(),
        })?;
        Ok(NodeIdentity { node_id: node_id.to_string(), keys, address })
    }
}
