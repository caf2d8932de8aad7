//! Bootstrap manager (C11): detects the exactly-two-pioneer condition,
//! mints the genesis block and deterministic system addresses, and gates
//! the one-shot transition, grounded on
//! `original_source/src/consensus/bootstrap_manager.py`'s
//! `BootstrapManager` (pioneer set capped at two by `connected_at`,
//! genesis-once flag, developer recovery file, scheduled first rewards).

use axc_core::{
    AiValidatorEntry, Block, ConsensusProof, FeeDistribution, Hash32, SystemAddresses, Transaction,
    TransactionType,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const LIQUIDITY_POOL_INITIAL: u64 = 1_024_000_000;
pub const INITIAL_BLOCK_REWARD: u64 = 1024;
const PIONEER_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
const REQUIRED_PIONEERS: usize = 2;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("genesis has already been created")]
    AlreadyCreated,
    #[error("exactly two pioneers are required, have {have}")]
    InsufficientPioneers { have: usize },
    #[error("requester is not a recorded pioneer")]
    NotPioneer,
    #[error("reset_blockchain is only permitted on testnet")]
    NotTestnet,
}

#[derive(Debug, Clone)]
pub struct PioneerNode {
    pub node_id: String,
    pub validator_address: String,
    pub reward_address: String,
    pub connected_at: Instant,
    pub last_heartbeat: Instant,
}

/// Developer wallet recovery material, persisted once at genesis for
/// out-of-band delivery (§4.10 step 5).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeveloperRecovery {
    pub address: String,
    pub private_key: String,
    pub mnemonic: String,
    pub generated_at: u64,
}

#[derive(Debug, Clone)]
pub struct GenesisResult {
    pub block: Block,
    pub system_addresses: SystemAddresses,
    pub developer_recovery: DeveloperRecovery,
    pub pending_reward_transactions: Vec<Transaction>,
    pub fee_distribution: FeeDistribution,
}

pub struct BootstrapManager {
    self_node_id: String,
    is_testnet: bool,
    pioneers: RwLock<HashMap<String, PioneerNode>>,
    genesis_created: RwLock<bool>,
}

impl BootstrapManager {
    pub fn new(self_node_id: impl Into<String>, is_testnet: bool) -> Self {
        BootstrapManager {
            self_node_id: self_node_id.into(),
            is_testnet,
            pioneers: RwLock::new(HashMap::new()),
            genesis_created: RwLock::new(false),
        }
    }

    pub fn is_genesis_created(&self) -> bool {
        *self.genesis_created.read()
    }

    /// Registers (or refreshes) a pioneer. If more than two distinct
    /// pioneers are known afterward, keeps the two earliest-connected
    /// (self is never pruned) and drops the rest.
    pub fn register_pioneer(&self, node_id: impl Into<String>, validator_address: impl Into<String>, reward_address: impl Into<String>) {
        let node_id = node_id.into();
        let now = Instant::now();
        {
            let mut pioneers = self.pioneers.write();
            pioneers
                .entry(node_id.clone())
                .and_modify(|p| p.last_heartbeat = now)
                .or_insert(PioneerNode {
                    node_id,
                    validator_address: validator_address.into(),
                    reward_address: reward_address.into(),
                    connected_at: now,
                    last_heartbeat: now,
                });
        }
        self.trim_to_earliest_two();
    }

    fn trim_to_earliest_two(&self) {
        let mut pioneers = self.pioneers.write();
        if pioneers.len() <= REQUIRED_PIONEERS {
            return;
        }
        let self_id = self.self_node_id.clone();
        let mut ranked: Vec<PioneerNode> = pioneers.values().cloned().collect();
        ranked.sort_by_key(|p| p.connected_at);
        let mut keep: Vec<String> = ranked
            .iter()
            .filter(|p| p.node_id != self_id)
            .take(REQUIRED_PIONEERS - 1)
            .map(|p| p.node_id.clone())
            .collect();
        keep.push(self_id);
        pioneers.retain(|id, _| keep.contains(id));
    }

    /// Removes pioneers whose heartbeat is older than 60s; self is never
    /// pruned.
    pub fn evict_stale_pioneers(&self) {
        let now = Instant::now();
        let self_id = self.self_node_id.clone();
        self.pioneers
            .write()
            .retain(|id, p| *id == self_id || now.duration_since(p.last_heartbeat) < PIONEER_HEARTBEAT_TIMEOUT);
    }

    pub fn pioneer_count(&self) -> usize {
        self.pioneers.read().len()
    }

    pub fn is_pioneer(&self, node_id: &str) -> bool {
        self.pioneers.read().contains_key(node_id)
    }

    /// Snapshot of the currently registered pioneers, used after genesis to
    /// register them as the initial consensus validator set.
    pub fn pioneers(&self) -> Vec<PioneerNode> {
        self.pioneers.read().values().cloned().collect()
    }

    fn ready_for_genesis(&self) -> bool {
        self.pioneers.read().len() == REQUIRED_PIONEERS
    }

    /// Derives the three deterministic system addresses (§4.10 step 1).
    fn derive_system_addresses() -> (SystemAddresses, DeveloperRecovery, u64) {
        let now = 0; // caller stamps the real timestamp onto the result
        let liquidity_key = axc_crypto::generate_system_keypair("LIQUIDITY_POOL");
        let burn_key = axc_crypto::generate_system_keypair("BURN_ADDRESS");
        let dev_key = axc_crypto::generate_system_keypair("DEVELOPER");

        let liquidity_pool = axc_crypto::derive_address(&liquidity_key.public_key).expect("system key is 32 bytes");
        let burn = axc_crypto::derive_address(&burn_key.public_key).expect("system key is 32 bytes");
        let developer = axc_crypto::derive_address(&dev_key.public_key).expect("system key is 32 bytes");

        let recovery = DeveloperRecovery {
            address: developer.clone(),
            private_key: hex::encode(&dev_key.secret_key),
            mnemonic: dev_key.mnemonic.clone(),
            generated_at: now,
        };

        (
            SystemAddresses { liquidity_pool, burn, developer },
            recovery,
            now,
        )
    }

    /// Re-derives the three deterministic system addresses without needing
    /// a live `BootstrapManager`, so a restarted node can reconstruct
    /// `Chain::from_blocks`'s `SystemAddresses` argument rather than
    /// persisting them separately.
    pub fn deterministic_system_addresses() -> SystemAddresses {
        Self::derive_system_addresses().0
    }

    /// Builds the genesis block, system addresses, developer recovery
    /// material and the scheduled first-reward transactions (§4.10). Does
    /// not mutate any chain — the caller applies `replace_genesis` and
    /// persists the recovery file, then calls `mark_genesis_created`.
    pub fn build_genesis(&self, now: u64) -> Result<GenesisResult, BootstrapError> {
        if self.is_genesis_created() {
            return Err(BootstrapError::AlreadyCreated);
        }
        let pioneers = self.pioneers.read().clone();
        if pioneers.len() != REQUIRED_PIONEERS {
            return Err(BootstrapError::InsufficientPioneers { have: pioneers.len() });
        }

        let (system_addresses, mut recovery, _) = Self::derive_system_addresses();
        recovery.generated_at = now;

        let mut pioneer_ids: Vec<String> = pioneers.keys().cloned().collect();
        pioneer_ids.sort();

        let genesis_tx = Transaction {
            from: String::new(),
            to: system_addresses.liquidity_pool.clone(),
            amount: LIQUIDITY_POOL_INITIAL,
            fee: 0,
            timestamp: now,
            nonce: 0,
            tx_type: TransactionType::GenesisInit,
            memo: Some("genesis liquidity pool funding".to_string()),
            signature: None,
        };
        let transactions = vec![genesis_tx];
        let merkle_root = axc_core::merkle_root(&transactions);

        let mut block = Block {
            index: 0,
            previous_hash: Hash32::ZERO,
            timestamp: now,
            transactions,
            merkle_root,
            nonce: 0,
            validators: pioneer_ids.clone(),
            ai_validators: Vec::<AiValidatorEntry>::new(),
            consensus_proof: ConsensusProof::default(),
            hash: Hash32::ZERO,
        };
        block.hash = block.compute_hash();

        let reward_per_pioneer = INITIAL_BLOCK_REWARD / 2;
        let pending_reward_transactions = pioneers
            .values()
            .map(|p| Transaction {
                from: system_addresses.liquidity_pool.clone(),
                to: p.reward_address.clone(),
                amount: reward_per_pioneer,
                fee: 0,
                timestamp: now,
                nonce: 0,
                tx_type: TransactionType::MiningReward,
                memo: Some(format!("first reward for pioneer {}", p.node_id)),
                signature: None,
            })
            .collect();

        Ok(GenesisResult {
            block,
            system_addresses,
            developer_recovery: recovery,
            pending_reward_transactions,
            fee_distribution: FeeDistribution::INITIAL,
        })
    }

    pub fn mark_genesis_created(&self) {
        *self.genesis_created.write() = true;
    }

    /// Testnet-only, pioneer-only reset gate (§4.10). Returns `Ok(())` if
    /// the reset is authorized; the caller rebuilds the chain and clears
    /// this manager's genesis flag via `mark_genesis_created(false)`-style
    /// reuse of `reset_genesis_flag`.
    pub fn reset_blockchain(&self, requester_id: &str) -> Result<(), BootstrapError> {
        if !self.is_testnet {
            return Err(BootstrapError::NotTestnet);
        }
        if !self.is_pioneer(requester_id) {
            return Err(BootstrapError::NotPioneer);
        }
        *self.genesis_created.write() = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_requires_exactly_two_pioneers() {
        let manager = BootstrapManager::new("self", true);
        manager.register_pioneer("self", "AXself-v", "AXself-r");
        let err = manager.build_genesis(100).unwrap_err();
        assert!(matches!(err, BootstrapError::InsufficientPioneers { have: 1 }));
    }

    #[test]
    fn genesis_mints_system_addresses_and_first_rewards() {
        let manager = BootstrapManager::new("self", true);
        manager.register_pioneer("self", "AXself-v", "AXself-r");
        manager.register_pioneer("peer", "AXpeer-v", "AXpeer-r");

        let result = manager.build_genesis(1000).unwrap();
        assert_eq!(result.block.index, 0);
        assert_eq!(result.pending_reward_transactions.len(), 2);
        assert!(result
            .pending_reward_transactions
            .iter()
            .all(|tx| tx.amount == INITIAL_BLOCK_REWARD / 2));
        assert_ne!(result.system_addresses.liquidity_pool, result.system_addresses.burn);
        assert_ne!(result.system_addresses.burn, result.system_addresses.developer);
    }

    #[test]
    fn genesis_is_one_shot() {
        let manager = BootstrapManager::new("self", true);
        manager.register_pioneer("self", "AXself-v", "AXself-r");
        manager.register_pioneer("peer", "AXpeer-v", "AXpeer-r");
        manager.build_genesis(1).unwrap();
        manager.mark_genesis_created();
        let err = manager.build_genesis(2).unwrap_err();
        assert!(matches!(err, BootstrapError::AlreadyCreated));
    }

    #[test]
    fn excess_pioneers_are_trimmed_to_earliest_two_keeping_self() {
        let manager = BootstrapManager::new("self", true);
        manager.register_pioneer("peer-a", "va", "ra");
        std::thread::sleep(Duration::from_millis(5));
        manager.register_pioneer("peer-b", "vb", "rb");
        std::thread::sleep(Duration::from_millis(5));
        manager.register_pioneer("self", "vs", "rs");
        assert_eq!(manager.pioneer_count(), 2);
        assert!(manager.is_pioneer("self"));
        assert!(manager.is_pioneer("peer-a"));
        assert!(!manager.is_pioneer("peer-b"));
    }

    #[test]
    fn reset_requires_testnet_and_pioneer_requester() {
        let manager = BootstrapManager::new("self", false);
        manager.register_pioneer("self", "vs", "rs");
        assert!(matches!(manager.reset_blockchain("self"), Err(BootstrapError::NotTestnet)));

        let testnet = BootstrapManager::new("self", true);
        testnet.register_pioneer("self", "vs", "rs");
        assert!(matches!(testnet.reset_blockchain("stranger"), Err(BootstrapError::NotPioneer)));
        assert!(testnet.reset_blockchain("self").is_ok());
    }
}
