//! Node configuration: network profile (testnet/mainnet, per spec §6),
//! consensus/economics parameters and the on-disk data directory.
//!
//! Loaded the way `dxid-config::DxidConfig::load` does it — a layered
//! `config` builder (file, then a prefixed env overlay) — reshaped around
//! the profile this node actually needs instead of a DB/API/AI config
//! section.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Testnet,
    Mainnet,
}

impl NetworkKind {
    pub fn network_id(self) -> &'static str {
        match self {
            NetworkKind::Testnet => "playergold-testnet",
            NetworkKind::Mainnet => "playergold-mainnet",
        }
    }

    pub fn default_p2p_port(self) -> u16 {
        match self {
            NetworkKind::Testnet => 18333,
            NetworkKind::Mainnet => 8333,
        }
    }

    pub fn default_discovery_port(self) -> u16 {
        match self {
            NetworkKind::Testnet => 18080,
            NetworkKind::Mainnet => 8080,
        }
    }

    pub fn allow_private_ips(self) -> bool {
        matches!(self, NetworkKind::Testnet)
    }

    pub fn reset_allowed(self) -> bool {
        matches!(self, NetworkKind::Testnet)
    }

    pub fn faucet_enabled(self) -> bool {
        matches!(self, NetworkKind::Testnet)
    }
}

/// Everything §6 says a network profile fixes: id, ports, IP policy,
/// reset/faucet gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub kind: NetworkKind,
    pub p2p_port: u16,
    pub discovery_port: u16,
    pub bootstrap_addresses: Vec<String>,
}

impl NetworkProfile {
    pub fn new(kind: NetworkKind, bootstrap_addresses: Vec<String>) -> Self {
        NetworkProfile {
            kind,
            p2p_port: kind.default_p2p_port(),
            discovery_port: kind.default_discovery_port(),
            bootstrap_addresses,
        }
    }

    pub fn network_id(&self) -> &'static str {
        self.kind.network_id()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicsConfig {
    pub initial_reward: u64,
    pub halving_interval: u64,
    pub liquidity_pool_initial: u64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        EconomicsConfig {
            initial_reward: 1024,
            halving_interval: 100_000,
            liquidity_pool_initial: 1_024_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusTiming {
    pub block_cadence_secs: u64,
    pub vote_collection_secs: u64,
    pub max_transactions_per_block: usize,
}

impl Default for ConsensusTiming {
    fn default() -> Self {
        ConsensusTiming {
            block_cadence_secs: 10,
            vote_collection_secs: 5,
            max_transactions_per_block: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: String,
    pub data_dir: String,
    pub network: NetworkProfile,
    pub economics: EconomicsConfig,
    pub consensus: ConsensusTiming,
}

impl NodeConfig {
    /// Loads from a file (TOML/JSON/YAML, inferred by `config` from the
    /// extension) overlaid with `AXC__`-prefixed environment variables,
    /// e.g. `AXC__NETWORK__P2P_PORT=18333`.
    pub fn load(path: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("AXC").separator("__"));
        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn testnet(node_id: impl Into<String>, bootstrap_addresses: Vec<String>) -> Self {
        NodeConfig {
            node_id: node_id.into(),
            data_dir: "./data".into(),
            network: NetworkProfile::new(NetworkKind::Testnet, bootstrap_addresses),
            economics: EconomicsConfig::default(),
            consensus: ConsensusTiming::default(),
        }
    }

    pub fn mainnet(node_id: impl Into<String>, bootstrap_addresses: Vec<String>) -> Self {
        NodeConfig {
            node_id: node_id.into(),
            data_dir: "./data".into(),
            network: NetworkProfile::new(NetworkKind::Mainnet, bootstrap_addresses),
            economics: EconomicsConfig::default(),
            consensus: ConsensusTiming::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testnet_profile_matches_spec_constants() {
        let cfg = NodeConfig::testnet("node-a", vec!["127.0.0.1:18333".into()]);
        assert_eq!(cfg.network.network_id(), "playergold-testnet");
        assert_eq!(cfg.network.p2p_port, 18333);
        assert!(cfg.network.kind.allow_private_ips());
        assert!(cfg.network.kind.reset_allowed());
    }

    #[test]
    fn mainnet_profile_disallows_reset_and_private_ips() {
        let cfg = NodeConfig::mainnet("node-a", vec![]);
        assert_eq!(cfg.network.network_id(), "playergold-mainnet");
        assert_eq!(cfg.network.p2p_port, 8333);
        assert!(!cfg.network.kind.allow_private_ips());
        assert!(!cfg.network.kind.reset_allowed());
        assert!(!cfg.network.kind.faucet_enabled());
    }
}
