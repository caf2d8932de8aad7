//! Inbound envelope routing (§4.6, §9): the node's single dispatch point,
//! matching each `MessageType` to the component crate that owns its
//! payload shape. Grounded on the same message-bus idea the teacher uses
//! to keep `axc-network` ignorant of `axc-consensus`/`axc-bootstrap`.

use std::sync::Arc;
use std::time::Instant;

use axc_core::{Transaction, TransactionType};
use axc_network::{Envelope, HeartbeatPayload, MessageType, PeerDiscoveryPayload};
use axc_reputation::PenaltyKind;
use axc_sync::{PeerStatus, SyncRequest, SyncResponse, Synchronizer};
use tokio::sync::mpsc;

use crate::node::Node;
use crate::pioneer::PioneerAnnouncement;
use crate::status::StatusPayload;
use crate::wire::BlockWireMessage;

pub async fn run_dispatch_loop(
    node: Arc<Node>,
    mut inbound_rx: mpsc::UnboundedReceiver<(String, Envelope)>,
) {
    while let Some((sender_id, envelope)) = inbound_rx.recv().await {
        if node.attack_defense.is_blocked(&sender_id) {
            continue;
        }
        if let Err(err) = handle_envelope(&node, sender_id.clone(), envelope).await {
            tracing::debug!(%sender_id, %err, "failed to handle inbound envelope");
        }
    }
}

async fn handle_envelope(node: &Arc<Node>, sender_id: String, envelope: Envelope) -> anyhow::Result<()> {
    let now = axc_core::now_ts();
    node.health.update_heartbeat(&sender_id);
    node.record_inbound_message(&sender_id);
    match envelope.msg_type {
        MessageType::Transaction => handle_transaction(node, envelope, now),
        MessageType::Block => handle_block(node, sender_id, envelope, now),
        MessageType::Challenge => handle_vote(node, sender_id, envelope),
        MessageType::Solution => Ok(()),
        MessageType::PeerDiscovery | MessageType::AiNodeDiscovery => handle_discovery(node, envelope),
        MessageType::SyncRequest => handle_sync_request(node, sender_id, envelope, now),
        MessageType::SyncResponse => handle_sync_response(node, sender_id, envelope, now),
        MessageType::Heartbeat => handle_heartbeat(node, sender_id, envelope),
        MessageType::FeeDistributionUpdate => Ok(()),
    }
}

fn handle_transaction(node: &Arc<Node>, envelope: Envelope, now: u64) -> anyhow::Result<()> {
    let tx: Transaction = serde_json::from_value(envelope.payload)?;
    if !tx.is_structurally_valid() {
        anyhow::bail!("structurally invalid transaction");
    }
    if tx.tx_type == TransactionType::Transfer {
        node.user_reputation.record_transaction(&tx.from, now);
    }
    node.consensus.submit_transaction(tx);
    Ok(())
}

fn handle_block(node: &Arc<Node>, sender_id: String, envelope: Envelope, now: u64) -> anyhow::Result<()> {
    let msg: BlockWireMessage = serde_json::from_value(envelope.payload)?;
    match msg {
        BlockWireMessage::Propose { block } => {
            let approve = {
                let chain = node.chain.lock();
                node.consensus.validate_proposal(&block, chain.latest())
            };
            let vote = BlockWireMessage::Vote { block_hash: block.hash.to_hex(), approve };
            let payload = serde_json::to_value(&vote)?;
            let mut reply = Envelope::new(
                MessageType::Challenge,
                node.identity.node_id.clone(),
                Some(sender_id.clone()),
                payload,
                now,
            );
            reply.sign(&node.identity.keys.secret_key).ok();
            node.transport.send_to(&sender_id, reply);
        }
        BlockWireMessage::Finalize { block } => {
            let should_apply = {
                let chain = node.chain.lock();
                block.index == chain.height() + 1
            };
            if should_apply {
                node.apply_block(block, now)?;
            }
        }
        BlockWireMessage::Vote { .. } => {}
    }
    Ok(())
}

fn handle_vote(node: &Arc<Node>, sender_id: String, envelope: Envelope) -> anyhow::Result<()> {
    if let Ok(BlockWireMessage::Vote { approve, .. }) = serde_json::from_value::<BlockWireMessage>(envelope.payload) {
        node.consensus.record_vote(&sender_id, approve);
    }
    Ok(())
}

fn handle_discovery(node: &Arc<Node>, envelope: Envelope) -> anyhow::Result<()> {
    if let Ok(announcement) = serde_json::from_value::<PioneerAnnouncement>(envelope.payload.clone()) {
        if !node.bootstrap.is_genesis_created() {
            node.bootstrap.register_pioneer(
                announcement.node_id,
                announcement.validator_address,
                announcement.reward_address,
            );
        }
        return Ok(());
    }
    let payload: PeerDiscoveryPayload = serde_json::from_value(envelope.payload)?;
    node.discovery.observe(payload);
    Ok(())
}

fn handle_sync_request(node: &Arc<Node>, sender_id: String, envelope: Envelope, now: u64) -> anyhow::Result<()> {
    let request: SyncRequest = serde_json::from_value(envelope.payload)?;
    let blocks = {
        let chain = node.chain.lock();
        chain
            .blocks
            .iter()
            .filter(|b| b.index >= request.start && b.index <= request.end)
            .cloned()
            .collect()
    };
    let response = SyncResponse { request_id: request.request_id, blocks };
    let payload = serde_json::to_value(&response)?;
    let mut reply = Envelope::new(
        MessageType::SyncResponse,
        node.identity.node_id.clone(),
        Some(sender_id.clone()),
        payload,
        now,
    );
    reply.sign(&node.identity.keys.secret_key).ok();
    node.transport.send_to(&sender_id, reply);
    Ok(())
}

fn handle_sync_response(node: &Arc<Node>, sender_id: String, envelope: Envelope, now: u64) -> anyhow::Result<()> {
    let response: SyncResponse = serde_json::from_value(envelope.payload)?;
    let sender_reputation = node
        .node_reputation
        .get(&sender_id)
        .map(|s| (s.current / 1000.0).clamp(0.0, 1.0))
        .unwrap_or(0.0);

    for block in response.blocks {
        let tip_index = node.chain.lock().height();
        if block.index == tip_index + 1 {
            let previous = Some(node.chain.lock().latest().clone());
            if Synchronizer::validate_against(&block, previous.as_ref(), now).is_err() {
                let _ = node.node_reputation.apply_penalty(&sender_id, PenaltyKind::Moderate, now);
                continue;
            }
            if let Err(err) = node.apply_block(block, now) {
                tracing::debug!(%err, "failed to apply synced block");
            }
        } else if block.index <= tip_index {
            let existing = node.chain.lock().blocks.get(block.index as usize).cloned();
            if let Some(existing_block) = existing {
                if Synchronizer::should_replace(&existing_block, &block, sender_reputation) {
                    tracing::warn!(
                        index = block.index,
                        "conflicting block observed during sync; fork-choice replacement is not implemented, keeping local copy"
                    );
                }
            }
        }
    }
    node.synchronizer.complete_request(&response.request_id);
    Ok(())
}

fn handle_heartbeat(node: &Arc<Node>, sender_id: String, envelope: Envelope) -> anyhow::Result<()> {
    if let Ok(status) = serde_json::from_value::<StatusPayload>(envelope.payload.clone()) {
        if let (Some(latest_index), Some(latest_hash), Some(reputation)) =
            (status.latest_index, status.latest_hash.clone(), status.reputation)
        {
            node.synchronizer.record_status(PeerStatus {
                node_id: sender_id,
                latest_index,
                latest_hash,
                reputation,
                received_at: Instant::now(),
            });
            return Ok(());
        }
    }
    let _: HeartbeatPayload = serde_json::from_value(envelope.payload)?;
    Ok(())
}
