//! Background task loops spawned once at node startup (§4.9, §4.10,
//! §4.14, §4.15): genesis-watch, fault-tolerance recovery, partition/
//! attack monitoring, and synchronizer status exchange. Each owns its
//! own tick interval and talks to the rest of the node only through
//! `Node`'s shared component handles — no task holds a reference to
//! another (§9's message-bus pattern).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axc_network::{Envelope, MessageType, PropagationStrategy};
use uuid::Uuid;

use crate::node::Node;
use crate::pioneer::PioneerAnnouncement;
use crate::status::StatusPayload;

const BOOTSTRAP_TICK: Duration = Duration::from_secs(1);
const PIONEER_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(5);
const RECOVERY_TICK: Duration = Duration::from_secs(30);
const RESILIENCE_TICK: Duration = Duration::from_secs(15);
const STATUS_BROADCAST_INTERVAL: Duration = Duration::from_secs(10);

/// Registers this node's own pioneer candidacy and runs the exactly-two-
/// pioneer genesis watch until `build_genesis` succeeds once.
pub async fn run_bootstrap_loop(node: Arc<Node>) {
    node.bootstrap.register_pioneer(
        node.identity.node_id.clone(),
        node.identity.address.clone(),
        node.identity.address.clone(),
    );
    node.consensus
        .register_validator(node.identity.node_id.clone(), 100.0, node.identity.address.clone());
    node.node_reputation.register(&node.identity.node_id, axc_core::now_ts());

    if node.bootstrap.is_genesis_created() {
        return;
    }

    let mut ticker = tokio::time::interval(BOOTSTRAP_TICK);
    let mut last_announce = Instant::now() - PIONEER_ANNOUNCE_INTERVAL;
    loop {
        ticker.tick().await;
        if node.bootstrap.is_genesis_created() {
            return;
        }
        node.bootstrap.evict_stale_pioneers();

        if last_announce.elapsed() >= PIONEER_ANNOUNCE_INTERVAL {
            last_announce = Instant::now();
            announce_pioneer(&node);
        }

        if node.bootstrap.pioneer_count() < 2 {
            continue;
        }
        let now = axc_core::now_ts();
        match node.bootstrap.build_genesis(now) {
            Ok(result) => {
                apply_genesis(&node, result, now);
                return;
            }
            Err(axc_bootstrap::BootstrapError::AlreadyCreated) => return,
            Err(err) => tracing::debug!(%err, "genesis not ready yet"),
        }
    }
}

fn announce_pioneer(node: &Arc<Node>) {
    let announcement = PioneerAnnouncement {
        node_id: node.identity.node_id.clone(),
        validator_address: node.identity.address.clone(),
        reward_address: node.identity.address.clone(),
    };
    let Ok(payload) = serde_json::to_value(&announcement) else { return };
    let now = axc_core::now_ts();
    let mut envelope = Envelope::new(MessageType::PeerDiscovery, node.identity.node_id.clone(), None, payload, now);
    envelope.sign(&node.identity.keys.secret_key).ok();
    node.propagator.propagate(envelope, PropagationStrategy::Flood);
}

fn apply_genesis(node: &Arc<Node>, result: axc_bootstrap::GenesisResult, now: u64) {
    {
        let mut chain = node.chain.lock();
        if let Err(err) = chain.replace_genesis(result.block.clone(), result.system_addresses.clone()) {
            tracing::warn!(%err, "failed to apply genesis block");
            return;
        }
    }
    node.bootstrap.mark_genesis_created();

    for pioneer in node.bootstrap.pioneers() {
        if pioneer.node_id != node.identity.node_id {
            node.consensus
                .register_validator(pioneer.node_id.clone(), 100.0, pioneer.reward_address.clone());
            node.node_reputation.register(&pioneer.node_id, now);
        }
    }
    for tx in result.pending_reward_transactions {
        node.consensus.submit_transaction(tx);
    }
    node.consensus.set_last_block_time(now);

    if let Err(err) = node.store.save_developer_recovery(&result.developer_recovery) {
        tracing::error!(%err, "failed to persist developer recovery material");
    }
    if let Err(err) = node.persist_state() {
        tracing::error!(%err, "failed to persist genesis chain state");
    }

    let Ok(payload) = serde_json::to_value(&result.block) else { return };
    let mut envelope = Envelope::new(MessageType::Block, node.identity.node_id.clone(), None, payload, now);
    envelope.sign(&node.identity.keys.secret_key).ok();
    node.propagator.propagate(envelope, PropagationStrategy::Flood);

    tracing::info!(
        liquidity_pool = %result.system_addresses.liquidity_pool,
        burn = %result.system_addresses.burn,
        developer = %result.system_addresses.developer,
        "genesis block created"
    );
}

/// Every 30s (§4.14): redistributes load off nodes already marked down
/// and, once their cooldown has elapsed, attempts recovery via the
/// injected logging callbacks.
pub async fn run_recovery_loop(node: Arc<Node>) {
    let mut ticker = tokio::time::interval(RECOVERY_TICK);
    loop {
        ticker.tick().await;
        let unresponsive: HashSet<String> = node.health.unresponsive_nodes().into_iter().collect();
        let active: Vec<String> = node
            .consensus
            .active_validators()
            .into_iter()
            .map(|v| v.node_id)
            .filter(|id| !unresponsive.contains(id))
            .collect();
        let recovered = axc_resilience::run_recovery_cycle(
            &node.health,
            &node.load_balancer,
            &active,
            node.recovery_callbacks.as_ref(),
            Instant::now(),
        )
        .await;
        for node_id in recovered {
            tracing::info!(node_id, "node recovered");
        }
    }
}

/// Every 15s (§4.15): checks for network partition, Sybil clustering,
/// message flooding and consensus-vote manipulation among discovered
/// peers. A minority partition pauses block production (§4.11) until
/// the node rejoins the majority.
pub async fn run_resilience_loop(node: Arc<Node>) {
    let mut ticker = tokio::time::interval(RESILIENCE_TICK);
    loop {
        ticker.tick().await;

        let known: HashSet<String> = node.discovery.snapshot().into_iter().map(|p| p.node_id).collect();
        let reachable: HashSet<String> = node.transport.peer_ids().into_iter().collect();
        let chain_height = node.chain.lock().height();

        match axc_resilience::detect_partition(&reachable, &known, chain_height) {
            Some(partition) if !partition.is_majority => {
                if !node.is_production_paused() {
                    tracing::warn!(
                        nodes = partition.nodes.len(),
                        "this node appears to be in a minority network partition; pausing block production"
                    );
                }
                node.set_production_paused(true);
            }
            _ => {
                if node.is_production_paused() {
                    tracing::info!("network partition resolved; resuming block production");
                }
                node.set_production_paused(false);
            }
        }

        let message_rates = node.message_rates();
        if let Some(suspicion) = axc_resilience::detect_flooding(&message_rates) {
            node.attack_defense.mitigate(&suspicion, node.mitigation_callbacks.as_ref()).await;
            for offender in &suspicion.offenders {
                node.transport.block_node(offender);
            }
        }

        let vote_records: Vec<axc_resilience::VoteRecord> = node
            .consensus
            .vote_history_counts()
            .into_iter()
            .map(|(node_id, total_votes, alternations, agreements)| axc_resilience::VoteRecord {
                node_id,
                total_votes,
                alternations,
                agreements,
            })
            .collect();
        if let Some(suspicion) = axc_resilience::detect_consensus_manipulation(&vote_records) {
            node.attack_defense.mitigate(&suspicion, node.mitigation_callbacks.as_ref()).await;
        }

        if known.is_empty() {
            continue;
        }
        let external_ratio: HashMap<String, f64> = known
            .iter()
            .map(|id| (id.clone(), if reachable.contains(id) { 1.0 } else { 0.0 }))
            .collect();
        if let Some(suspicion) = axc_resilience::detect_sybil(&external_ratio) {
            node.attack_defense.mitigate(&suspicion, node.mitigation_callbacks.as_ref()).await;
            for offender in &suspicion.offenders {
                node.transport.block_node(offender);
            }
        }
    }
}

/// Every 10s (§4.9): broadcasts this node's own status piggybacked on a
/// heartbeat, expires stale sync requests and, when behind, requests the
/// missing range from the best-known peers.
pub async fn run_sync_loop(node: Arc<Node>) {
    let mut ticker = tokio::time::interval(STATUS_BROADCAST_INTERVAL);
    loop {
        ticker.tick().await;
        let now = axc_core::now_ts();

        let (latest_index, latest_hash) = {
            let chain = node.chain.lock();
            (chain.height(), chain.latest().hash.to_hex())
        };
        let reputation = node
            .node_reputation
            .get(&node.identity.node_id)
            .map(|s| s.current)
            .unwrap_or(100.0);
        let status = StatusPayload {
            node_id: node.identity.node_id.clone(),
            timestamp: now,
            latest_index: Some(latest_index),
            latest_hash: Some(latest_hash),
            reputation: Some(reputation),
        };
        if let Ok(payload) = serde_json::to_value(&status) {
            let mut envelope = Envelope::new(MessageType::Heartbeat, node.identity.node_id.clone(), None, payload, now);
            envelope.sign(&node.identity.keys.secret_key).ok();
            node.propagator.propagate(envelope, PropagationStrategy::Flood);
        }

        for expired in node.synchronizer.expire_timed_out() {
            tracing::debug!(request_id = expired, "sync request timed out");
        }

        if matches!(node.synchronizer.evaluate_state(latest_index), axc_sync::SyncState::Behind) {
            request_missing_blocks(&node, latest_index, now);
        }
    }
}

fn request_missing_blocks(node: &Arc<Node>, local_latest: u64, now: u64) {
    for peer in node.synchronizer.select_sync_peers() {
        let request_id = Uuid::new_v4().to_string();
        let request = axc_sync::Synchronizer::build_request(local_latest, &peer, request_id.clone());
        node.synchronizer.start_request(peer.node_id.clone(), request.clone());
        let Ok(payload) = serde_json::to_value(&request) else { continue };
        let mut envelope = Envelope::new(
            MessageType::SyncRequest,
            node.identity.node_id.clone(),
            Some(peer.node_id.clone()),
            payload,
            now,
        );
        envelope.sign(&node.identity.keys.secret_key).ok();
        node.transport.send_to(&peer.node_id, envelope);
    }
}
