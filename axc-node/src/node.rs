//! The node container (§6, §9): wires every component crate together
//! behind shared handles and a single inbound-message channel instead of
//! letting the crates hold references to one another. Grounded on the
//! teacher's `run_node` composition root, generalized from a single
//! Postgres-backed service into this crate's multi-component assembly.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use axc_bootstrap::BootstrapManager;
use axc_challenge::{ChallengeGenerator, ChallengeProcessor, CrossValidator};
use axc_config::{NetworkKind, NodeConfig};
use axc_consensus::ConsensusEngine;
use axc_core::{Block, Chain, FeeDistribution, Transaction};
use axc_economics::RewardSchedule;
use axc_network::{NetworkConfig, PeerDiscovery, Propagator, Transport};
use axc_reputation::{NodeReputationStore, UserReputationStore};
use axc_resilience::{AttackDefense, HealthMonitor, LoadBalancer};
use axc_storage::{DataStore, FeeDistributionRecord};
use axc_sync::Synchronizer;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::callbacks::{LoggingMitigationCallbacks, LoggingRecoveryCallbacks};
use crate::identity::NodeIdentity;
use crate::status::StatusReport;

/// Rolling window over which inbound message counts are kept, feeding
/// `axc_resilience::detect_flooding`'s per-peer rate input.
const MESSAGE_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Everything a running node needs, held behind `Arc`/`Mutex` so the
/// dispatch loop and every background task can share it without any
/// component crate depending on another (§9's message-bus pattern).
pub struct Node {
    pub identity: NodeIdentity,
    pub config: NodeConfig,
    pub is_testnet: bool,

    pub transport: Arc<Transport>,
    pub discovery: Arc<PeerDiscovery>,
    pub propagator: Arc<Propagator>,

    pub bootstrap: Arc<BootstrapManager>,
    pub consensus: Arc<ConsensusEngine>,
    pub reward_schedule: Mutex<RewardSchedule>,
    pub chain: Mutex<Chain>,

    pub node_reputation: Arc<NodeReputationStore>,
    pub user_reputation: Arc<UserReputationStore>,

    pub health: Arc<HealthMonitor>,
    pub load_balancer: Arc<LoadBalancer>,
    pub synchronizer: Arc<Synchronizer>,
    pub attack_defense: Arc<AttackDefense>,

    pub challenge_generator: Arc<ChallengeGenerator>,
    pub challenge_processor: Arc<ChallengeProcessor>,
    pub cross_validator: Arc<CrossValidator>,

    pub store: Arc<DataStore>,
    pub recovery_callbacks: Arc<LoggingRecoveryCallbacks>,
    pub mitigation_callbacks: Arc<LoggingMitigationCallbacks>,

    /// Recent inbound-message arrival times per sender, for flooding
    /// detection (§4.15).
    message_activity: Mutex<HashMap<String, VecDeque<Instant>>>,
    /// Set by the resilience loop while this node sits in a minority
    /// network partition (§4.14); checked by the cadence loop before
    /// minting a block.
    production_paused: AtomicBool,

    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<(String, axc_network::Envelope)>>>,
}

impl Node {
    pub async fn new(config: NodeConfig) -> Result<Arc<Self>> {
        let store = Arc::new(DataStore::new(config.data_dir.clone()));
        let identity = NodeIdentity::load_or_create(&store, &config.node_id)
            .context("loading or creating node identity")?;
        let is_testnet = config.network.kind == NetworkKind::Testnet;
        let node_id = config.node_id.clone();

        let chain = match store.load_chain()? {
            Some(blocks) if !blocks.is_empty() => {
                let system_addresses = Some(BootstrapManager::deterministic_system_addresses());
                Chain::from_blocks(blocks, system_addresses)?
            }
            _ => Chain::new(),
        };

        let node_scores = store.load_node_reputation()?.unwrap_or_default();
        let node_reputation = Arc::new(if node_scores.is_empty() {
            NodeReputationStore::new()
        } else {
            NodeReputationStore::load(node_scores)
        });

        let user_scores = store.load_user_reputation()?.unwrap_or_default();
        let user_reputation = Arc::new(if user_scores.is_empty() {
            UserReputationStore::new()
        } else {
            UserReputationStore::load(user_scores)
        });

        let fee_record = store.load_fee_distribution()?;
        let reward_schedule = Mutex::new(RewardSchedule::from_persisted(
            config.economics.initial_reward,
            config.economics.halving_interval,
            fee_record.halvings_occurred,
            fee_record.last_block,
            FeeDistribution {
                burn: fee_record.burn,
                developer: fee_record.developer,
                liquidity: fee_record.liquidity,
            },
        ));

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let network_config = NetworkConfig {
            node_id: config.node_id.clone(),
            network_id: config.network.network_id().to_string(),
            listen_port: config.network.p2p_port,
            bootstrap_addresses: config.network.bootstrap_addresses.clone(),
            allow_private_ips: config.network.kind.allow_private_ips(),
            capabilities: vec!["validator".to_string()],
        };
        let transport = Transport::new(network_config, inbound_tx)
            .context("constructing p2p transport")?;
        let discovery = PeerDiscovery::new(
            config.node_id.clone(),
            config.network.network_id().to_string(),
            config.network.discovery_port,
            false,
        );
        discovery.seed_bootstrap(&config.network.bootstrap_addresses);
        let propagator = Propagator::new(transport.clone());

        let bootstrap = Arc::new(BootstrapManager::new(config.node_id.clone(), is_testnet));
        let consensus = Arc::new(ConsensusEngine::new());
        consensus.set_last_block_time(chain.latest().timestamp);

        let challenge_processor = Arc::new(ChallengeProcessor::new(
            config.node_id.clone(),
            identity.keys.secret_key.clone(),
        ));

        let node = Node {
            identity,
            config,
            is_testnet,
            transport,
            discovery,
            propagator,
            bootstrap,
            consensus,
            reward_schedule,
            chain: Mutex::new(chain),
            node_reputation,
            user_reputation,
            health: Arc::new(HealthMonitor::new()),
            load_balancer: Arc::new(LoadBalancer::new()),
            synchronizer: Arc::new(Synchronizer::new(node_id)),
            attack_defense: Arc::new(AttackDefense::new()),
            challenge_generator: Arc::new(ChallengeGenerator::new()),
            challenge_processor,
            cross_validator: Arc::new(CrossValidator::new()),
            store,
            recovery_callbacks: Arc::new(LoggingRecoveryCallbacks),
            mitigation_callbacks: Arc::new(LoggingMitigationCallbacks),
            message_activity: Mutex::new(HashMap::new()),
            production_paused: AtomicBool::new(false),
            inbound_rx: Mutex::new(Some(inbound_rx)),
        };
        Ok(Arc::new(node))
    }

    /// Starts the transport, discovery and every background task loop.
    /// Returns once all loops are spawned; they run for the lifetime of
    /// the process.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.transport.start().await.context("starting p2p transport")?;
        self.discovery.start().context("starting peer discovery")?;

        let inbound_rx = self
            .inbound_rx
            .lock()
            .take()
            .ok_or_else(|| anyhow!("node already started"))?;

        tokio::spawn(crate::dispatch::run_dispatch_loop(self.clone(), inbound_rx));
        tokio::spawn(crate::tasks::run_bootstrap_loop(self.clone()));
        tokio::spawn(crate::cadence::run_cadence_loop(self.clone()));
        tokio::spawn(crate::tasks::run_recovery_loop(self.clone()));
        tokio::spawn(crate::tasks::run_resilience_loop(self.clone()));
        tokio::spawn(crate::tasks::run_sync_loop(self.clone()));

        tracing::info!(node_id = %self.identity.node_id, address = %self.identity.address, "node started");
        Ok(())
    }

    /// Appends `block` to the chain, splitting its transactions' combined
    /// fee per the current `FeeDistribution` (§4.4) and clearing the
    /// included transactions from the pending pool. Shared by the
    /// producing path, the `Finalize` message handler and sync replay so
    /// every node distributes fees identically.
    pub fn apply_block(&self, block: Block, now: u64) -> Result<()> {
        let included = block.transactions.clone();
        let total_fee: u64 = included.iter().map(|tx| tx.fee).sum();
        let distribution = self.reward_schedule.lock().fee_distribution();
        {
            let mut chain = self.chain.lock();
            chain.add_block(block, now)?;
            if total_fee > 0 {
                chain.distribute_transaction_fee(total_fee, &distribution)?;
            }
        }
        self.consensus.remove_included(&included);
        self.consensus.set_last_block_time(now);
        Ok(())
    }

    /// Accepts a transaction from an external caller (§6 `submit_transaction`),
    /// queuing it for the next cadence tick.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        if !tx.is_structurally_valid() {
            return Err(anyhow!("transaction is not structurally valid"));
        }
        let now = axc_core::now_ts();
        if tx.tx_type == axc_core::TransactionType::Transfer {
            self.user_reputation.record_transaction(&tx.from, now);
        }
        let payload = serde_json::to_value(&tx)?;
        let mut envelope = axc_network::Envelope::new(
            axc_network::MessageType::Transaction,
            self.identity.node_id.clone(),
            None,
            payload,
            now,
        );
        envelope.sign(&self.identity.keys.secret_key).ok();
        self.propagator.propagate(envelope, axc_network::PropagationStrategy::Flood);
        self.consensus.submit_transaction(tx);
        Ok(())
    }

    /// §6 `query_status`: a read-only snapshot for an external caller.
    pub fn query_status(&self) -> StatusReport {
        let chain = self.chain.lock();
        let schedule = self.reward_schedule.lock();
        StatusReport {
            node_id: self.identity.node_id.clone(),
            chain_height: chain.height(),
            peer_count: self.transport.peer_count(),
            sync_state: format!("{:?}", self.synchronizer.evaluate_state(chain.height())),
            fee_distribution: schedule.fee_distribution(),
            current_reward: schedule.current_reward(),
            halvings_occurred: schedule.halvings_occurred(),
            is_mining: self.consensus.is_mining(),
            genesis_created: self.bootstrap.is_genesis_created(),
        }
    }

    /// §6 `reset_blockchain`: testnet-only, pioneer-gated wipe back to the
    /// placeholder genesis.
    pub fn reset_blockchain(&self, requester_id: &str) -> Result<()> {
        self.bootstrap.reset_blockchain(requester_id)?;
        let fresh = Chain::new();
        self.store.save_chain(&fresh.blocks)?;
        self.store.save_balances(&fresh.ledger.balances)?;
        *self.chain.lock() = fresh;
        Ok(())
    }

    /// Records one inbound message from `sender_id`, for the flooding
    /// detector's rolling rate window.
    pub fn record_inbound_message(&self, sender_id: &str) {
        let now = Instant::now();
        let mut activity = self.message_activity.lock();
        let window = activity.entry(sender_id.to_string()).or_default();
        window.push_back(now);
        while window.front().is_some_and(|t| now.duration_since(*t) > MESSAGE_RATE_WINDOW) {
            window.pop_front();
        }
    }

    /// Messages-per-second over the trailing window, per sender.
    pub fn message_rates(&self) -> HashMap<String, f64> {
        let now = Instant::now();
        self.message_activity
            .lock()
            .iter()
            .map(|(id, window)| {
                let count = window.iter().filter(|t| now.duration_since(**t) <= MESSAGE_RATE_WINDOW).count();
                (id.clone(), count as f64 / MESSAGE_RATE_WINDOW.as_secs_f64())
            })
            .collect()
    }

    pub fn is_production_paused(&self) -> bool {
        self.production_paused.load(Ordering::Relaxed)
    }

    pub fn set_production_paused(&self, paused: bool) {
        self.production_paused.store(paused, Ordering::Relaxed);
    }

    pub fn persist_state(&self) -> Result<()> {
        let chain = self.chain.lock();
        self.store.save_chain(&chain.blocks)?;
        self.store.save_balances(&chain.ledger.balances)?;
        let chain_height = chain.height();
        drop(chain);

        self.store.save_node_reputation(&self.node_reputation.snapshot())?;
        self.store.save_user_reputation(&self.user_reputation.snapshot())?;

        let schedule = self.reward_schedule.lock();
        let distribution = schedule.fee_distribution();
        let halvings = schedule.halvings_occurred();
        drop(schedule);
        self.store.save_fee_distribution(&FeeDistributionRecord::from((
            distribution,
            halvings,
            chain_height,
        )))?;
        Ok(())
    }
}
