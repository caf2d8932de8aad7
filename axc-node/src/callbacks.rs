//! Default external-collaborator callbacks (§6, §9's design note): the
//! recovery and mitigation hooks are genuinely external systems (the
//! orchestration layer that actually restarts a process or throttles a
//! peer), out of scope for this crate. These logging implementations are
//! injected at `Node` construction time so the fault-tolerance and attack-
//! defense loops have something to call; a deployment wires its own.

use async_trait::async_trait;
use axc_resilience::{MitigationCallbacks, RecoveryCallbacks};

pub struct LoggingRecoveryCallbacks;

#[async_trait]
impl RecoveryCallbacks for LoggingRecoveryCallbacks {
    async fn verify_integrity(&self, node_id: &str) -> bool {
        tracing::info!(node_id, "recovery: verify_integrity (no external hook configured)");
        true
    }

    async fn restart_node(&self, node_id: &str) -> bool {
        tracing::info!(node_id, "recovery: restart_node (no external hook configured)");
        true
    }

    async fn verify_responsive(&self, node_id: &str) -> bool {
        tracing::info!(node_id, "recovery: verify_responsive (no external hook configured)");
        true
    }
}

pub struct LoggingMitigationCallbacks;

#[async_trait]
impl MitigationCallbacks for LoggingMitigationCallbacks {
    async fn enable_rate_limiting(&self, node_id: &str) {
        tracing::warn!(node_id, "mitigation: enable_rate_limiting");
    }

    async fn increase_validation_requirements(&self, node_id: &str) {
        tracing::warn!(node_id, "mitigation: increase_validation_requirements");
    }

    async fn increase_consensus_threshold(&self) {
        tracing::warn!("mitigation: increase_consensus_threshold");
    }
}
