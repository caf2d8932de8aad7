//! Auto-recovery loop (C14): runs every 30s, attempting to recover
//! unresponsive nodes via three external async callbacks, grounded on
//! `original_source/src/consensus/fault_tolerance.py`'s recovery cycle
//! (cooldown-gated retries, integrity/restart/responsiveness sequence).

use crate::health::{HealthMonitor, NodeStatus};
use crate::load_balancer::LoadBalancer;
use async_trait::async_trait;
use std::time::{Duration, Instant};

pub const RECOVERY_INTERVAL: Duration = Duration::from_secs(30);
pub const MAX_RECOVERY_ATTEMPTS: u32 = 3;
pub const RECOVERY_COOLDOWN: Duration = Duration::from_secs(300);

/// External recovery actions (§6 callbacks): all async, returning whether
/// the step succeeded.
#[async_trait]
pub trait RecoveryCallbacks: Send + Sync {
    async fn verify_integrity(&self, node_id: &str) -> bool;
    async fn restart_node(&self, node_id: &str) -> bool;
    async fn verify_responsive(&self, node_id: &str) -> bool;
}

/// Runs one recovery pass over every currently-unresponsive node. Returns
/// the node ids that transitioned to `Active` this pass.
pub async fn run_recovery_cycle(
    monitor: &HealthMonitor,
    balancer: &LoadBalancer,
    remaining_active: &[String],
    callbacks: &dyn RecoveryCallbacks,
    now: Instant,
) -> Vec<String> {
    let mut recovered = Vec::new();
    for node_id in monitor.unresponsive_nodes() {
        balancer.redistribute_load(&node_id, remaining_active);

        if monitor.recovery_attempts(&node_id) >= MAX_RECOVERY_ATTEMPTS {
            monitor.mark_failed(&node_id);
            continue;
        }
        let cooldown_cleared = monitor
            .last_recovery_attempt(&node_id)
            .map(|last| now.duration_since(last) >= RECOVERY_COOLDOWN)
            .unwrap_or(true);
        if !cooldown_cleared {
            continue;
        }

        monitor.record_recovery_attempt(&node_id, now);
        let succeeded = callbacks.verify_integrity(&node_id).await
            && callbacks.restart_node(&node_id).await
            && callbacks.verify_responsive(&node_id).await;

        if succeeded {
            monitor.mark_recovered(&node_id);
            recovered.push(node_id);
        } else if monitor.recovery_attempts(&node_id) >= MAX_RECOVERY_ATTEMPTS {
            monitor.mark_failed(&node_id);
        }
    }
    recovered
}

pub fn status_after_cycle(monitor: &HealthMonitor, node_id: &str) -> Option<NodeStatus> {
    monitor.status(node_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysSucceeds;
    #[async_trait]
    impl RecoveryCallbacks for AlwaysSucceeds {
        async fn verify_integrity(&self, _node_id: &str) -> bool {
            true
        }
        async fn restart_node(&self, _node_id: &str) -> bool {
            true
        }
        async fn verify_responsive(&self, _node_id: &str) -> bool {
            true
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl RecoveryCallbacks for AlwaysFails {
        async fn verify_integrity(&self, _node_id: &str) -> bool {
            false
        }
        async fn restart_node(&self, _node_id: &str) -> bool {
            true
        }
        async fn verify_responsive(&self, _node_id: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn recovers_an_unresponsive_node_on_success() {
        let monitor = HealthMonitor::new();
        monitor.register("a");
        monitor.record_failure("a");
        monitor.record_failure("a");
        monitor.record_failure("a");
        let balancer = LoadBalancer::new();
        let recovered = run_recovery_cycle(&monitor, &balancer, &[], &AlwaysSucceeds, Instant::now()).await;
        assert_eq!(recovered, vec!["a".to_string()]);
        assert_eq!(monitor.status("a"), Some(NodeStatus::Active));
    }

    #[tokio::test]
    async fn repeated_failures_eventually_mark_the_node_failed() {
        let monitor = HealthMonitor::new();
        monitor.register("a");
        monitor.record_failure("a");
        monitor.record_failure("a");
        monitor.record_failure("a");
        let balancer = LoadBalancer::new();
        let mut now = Instant::now();
        for _ in 0..MAX_RECOVERY_ATTEMPTS {
            run_recovery_cycle(&monitor, &balancer, &[], &AlwaysFails, now).await;
            now += RECOVERY_COOLDOWN + Duration::from_secs(1);
        }
        assert_eq!(monitor.status("a"), Some(NodeStatus::Failed));
    }
}
