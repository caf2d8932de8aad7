//! Atomic JSON persistence for chain, ledger, reputation and fee-schedule
//! state (§5, §6), grounded on the teacher's write-then-commit persistence
//! discipline (its Postgres layer's transactional commit, reimplemented
//! here as the spec's file-based write-to-temp/fsync/rename, since this
//! crate replaces that database-backed store entirely) plus
//! `serde_json` for the on-disk shape.

use axc_bootstrap::DeveloperRecovery;
use axc_core::{Block, FeeDistribution};
use axc_reputation::{NodeScore, ReputationEvent, UserReputation};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Writes `value` to `path` via write-temp/fsync/rename so a crash never
/// leaves a half-written file in place (§5 persistence rule).
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, &bytes)?;
    let file = fs::File::open(&tmp_path)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Returns `None` if the file doesn't exist yet (first run), propagating
/// any other I/O or parse failure.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// A node's long-lived keypair, persisted so its address survives restarts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeIdentityRecord {
    pub node_id: String,
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FeeDistributionRecord {
    pub burn: f64,
    pub developer: f64,
    pub liquidity: f64,
    pub halvings_occurred: u64,
    pub last_block: u64,
}

impl From<(FeeDistribution, u64, u64)> for FeeDistributionRecord {
    fn from((dist, halvings, last_block): (FeeDistribution, u64, u64)) -> Self {
        FeeDistributionRecord {
            burn: dist.burn,
            developer: dist.developer,
            liquidity: dist.liquidity,
            halvings_occurred: halvings,
            last_block,
        }
    }
}

/// Paths for the files named in §6's persisted state layout, rooted at a
/// node's data directory.
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataStore { root: root.into() }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn save_chain(&self, blocks: &[Block]) -> Result<(), StorageError> {
        write_atomic(&self.path("chain.json"), &blocks)
    }

    pub fn load_chain(&self) -> Result<Option<Vec<Block>>, StorageError> {
        read_json(&self.path("chain.json"))
    }

    pub fn save_balances(&self, balances: &std::collections::HashMap<String, u64>) -> Result<(), StorageError> {
        let stringified: std::collections::HashMap<&String, String> =
            balances.iter().map(|(addr, amount)| (addr, amount.to_string())).collect();
        write_atomic(&self.path("balances.json"), &stringified)
    }

    pub fn save_node_reputation(&self, scores: &[NodeScore]) -> Result<(), StorageError> {
        write_atomic(&self.path("reputation/nodes.json"), &scores)
    }

    pub fn load_node_reputation(&self) -> Result<Option<Vec<NodeScore>>, StorageError> {
        read_json(&self.path("reputation/nodes.json"))
    }

    pub fn save_reputation_events(&self, events: &[ReputationEvent]) -> Result<(), StorageError> {
        write_atomic(&self.path("reputation/events.json"), &events)
    }

    pub fn save_user_reputation(&self, users: &[UserReputation]) -> Result<(), StorageError> {
        write_atomic(&self.path("reputation/users.json"), &users)
    }

    pub fn load_user_reputation(&self) -> Result<Option<Vec<UserReputation>>, StorageError> {
        read_json(&self.path("reputation/users.json"))
    }

    pub fn save_fee_distribution(&self, record: &FeeDistributionRecord) -> Result<(), StorageError> {
        write_atomic(&self.path("fee_distribution.json"), record)
    }

    /// Loads the fee distribution record, falling back to the initial
    /// distribution with zero halvings if the sum-to-1 check fails or the
    /// file is absent/unparseable.
    pub fn load_fee_distribution(&self) -> Result<FeeDistributionRecord, StorageError> {
        let loaded = read_json::<FeeDistributionRecord>(&self.path("fee_distribution.json"))?;
        Ok(match loaded {
            Some(record) if (record.burn + record.developer + record.liquidity - 1.0).abs() < 1e-3 => record,
            Some(_) => {
                tracing::warn!("persisted fee distribution failed the sum-to-1 check, resetting to defaults");
                FeeDistributionRecord::from((FeeDistribution::INITIAL, 0, 0))
            }
            None => FeeDistributionRecord::from((FeeDistribution::INITIAL, 0, 0)),
        })
    }

    /// Persisted exactly once, at genesis.
    pub fn save_developer_recovery(&self, recovery: &DeveloperRecovery) -> Result<(), StorageError> {
        write_atomic(&self.path("developer_recovery.json"), recovery)
    }

    pub fn load_developer_recovery(&self) -> Result<Option<DeveloperRecovery>, StorageError> {
        read_json(&self.path("developer_recovery.json"))
    }

    pub fn save_node_identity(&self, identity: &NodeIdentityRecord) -> Result<(), StorageError> {
        write_atomic(&self.path("node_identity.json"), identity)
    }

    pub fn load_node_identity(&self) -> Result<Option<NodeIdentityRecord>, StorageError> {
        read_json(&self.path("node_identity.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_then_read_roundtrips() {
        let dir = std::env::temp_dir().join(format!("axc-storage-test-{}", std::process::id()));
        let store = DataStore::new(&dir);
        let blocks = vec![Block::placeholder_genesis()];
        store.save_chain(&blocks).unwrap();
        let loaded = store.load_chain().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hash, blocks[0].hash);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = std::env::temp_dir().join(format!("axc-storage-test-missing-{}", std::process::id()));
        let store = DataStore::new(&dir);
        assert!(store.load_chain().unwrap().is_none());
    }

    #[test]
    fn invalid_fee_distribution_falls_back_to_default() {
        let dir = std::env::temp_dir().join(format!("axc-storage-test-fee-{}", std::process::id()));
        let store = DataStore::new(&dir);
        let bogus = FeeDistributionRecord { burn: 0.1, developer: 0.1, liquidity: 0.1, halvings_occurred: 5, last_block: 500 };
        store.save_fee_distribution(&bogus).unwrap();
        let loaded = store.load_fee_distribution().unwrap();
        assert_eq!(loaded.burn, FeeDistribution::INITIAL.burn);
        assert_eq!(loaded.halvings_occurred, 0);
        let _ = fs::remove_dir_all(&dir);
    }
}
