//! Health monitor (C14): heartbeat and challenge-response tracking,
//! grounded on
//! `original_source/src/consensus/fault_tolerance.py`'s `HealthMonitor`
//! (60s heartbeat window, 100-sample response history, 3-strike
//! unresponsive threshold).

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const HEARTBEAT_WINDOW: Duration = Duration::from_secs(60);
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
pub const RESPONSE_HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Active,
    Unresponsive,
    Failed,
}

struct NodeHealth {
    last_heartbeat: Instant,
    consecutive_failures: u32,
    response_times_ms: VecDeque<u64>,
    status: NodeStatus,
    recovery_attempts: u32,
    last_recovery_attempt: Option<Instant>,
}

impl NodeHealth {
    fn new() -> Self {
        NodeHealth {
            last_heartbeat: Instant::now(),
            consecutive_failures: 0,
            response_times_ms: VecDeque::new(),
            status: NodeStatus::Active,
            recovery_attempts: 0,
            last_recovery_attempt: None,
        }
    }
}

pub struct HealthMonitor {
    nodes: RwLock<HashMap<String, NodeHealth>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        HealthMonitor { nodes: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, node_id: &str) {
        self.nodes.write().entry(node_id.to_string()).or_insert_with(NodeHealth::new);
    }

    pub fn update_heartbeat(&self, node_id: &str) {
        let mut nodes = self.nodes.write();
        let health = nodes.entry(node_id.to_string()).or_insert_with(NodeHealth::new);
        health.last_heartbeat = Instant::now();
    }

    pub fn update_challenge_response(&self, node_id: &str, response_ms: u64) {
        let mut nodes = self.nodes.write();
        let health = nodes.entry(node_id.to_string()).or_insert_with(NodeHealth::new);
        health.response_times_ms.push_back(response_ms);
        if health.response_times_ms.len() > RESPONSE_HISTORY_CAP {
            health.response_times_ms.pop_front();
        }
    }

    pub fn average_response_ms(&self, node_id: &str) -> Option<f64> {
        let nodes = self.nodes.read();
        let health = nodes.get(node_id)?;
        if health.response_times_ms.is_empty() {
            return None;
        }
        Some(health.response_times_ms.iter().sum::<u64>() as f64 / health.response_times_ms.len() as f64)
    }

    /// Returns `true` if this failure crossed the node into Unresponsive
    /// (i.e. `mark_unresponsive` should fire).
    pub fn record_failure(&self, node_id: &str) -> bool {
        let mut nodes = self.nodes.write();
        let health = nodes.entry(node_id.to_string()).or_insert_with(NodeHealth::new);
        health.consecutive_failures += 1;
        if health.consecutive_failures >= MAX_CONSECUTIVE_FAILURES && health.status == NodeStatus::Active {
            health.status = NodeStatus::Unresponsive;
            return true;
        }
        false
    }

    pub fn record_success(&self, node_id: &str) {
        let mut nodes = self.nodes.write();
        let health = nodes.entry(node_id.to_string()).or_insert_with(NodeHealth::new);
        health.consecutive_failures = 0;
    }

    pub fn is_active(&self, node_id: &str, now: Instant) -> bool {
        let nodes = self.nodes.read();
        match nodes.get(node_id) {
            Some(health) => {
                now.duration_since(health.last_heartbeat) < HEARTBEAT_WINDOW
                    && health.consecutive_failures < MAX_CONSECUTIVE_FAILURES
            }
            None => false,
        }
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.read().get(node_id).map(|h| h.status)
    }

    pub fn unresponsive_nodes(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .filter(|(_, h)| h.status == NodeStatus::Unresponsive)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn recovery_attempts(&self, node_id: &str) -> u32 {
        self.nodes.read().get(node_id).map(|h| h.recovery_attempts).unwrap_or(0)
    }

    pub fn last_recovery_attempt(&self, node_id: &str) -> Option<Instant> {
        self.nodes.read().get(node_id).and_then(|h| h.last_recovery_attempt)
    }

    pub fn record_recovery_attempt(&self, node_id: &str, now: Instant) {
        let mut nodes = self.nodes.write();
        if let Some(health) = nodes.get_mut(node_id) {
            health.recovery_attempts += 1;
            health.last_recovery_attempt = Some(now);
        }
    }

    pub fn mark_recovered(&self, node_id: &str) {
        let mut nodes = self.nodes.write();
        if let Some(health) = nodes.get_mut(node_id) {
            health.status = NodeStatus::Active;
            health.consecutive_failures = 0;
            health.recovery_attempts = 0;
        }
    }

    pub fn mark_failed(&self, node_id: &str) {
        let mut nodes = self.nodes.write();
        if let Some(health) = nodes.get_mut(node_id) {
            health.status = NodeStatus::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_marks_unresponsive() {
        let monitor = HealthMonitor::new();
        monitor.register("a");
        assert!(!monitor.record_failure("a"));
        assert!(!monitor.record_failure("a"));
        assert!(monitor.record_failure("a"));
        assert_eq!(monitor.status("a"), Some(NodeStatus::Unresponsive));
    }

    #[test]
    fn success_resets_failure_counter() {
        let monitor = HealthMonitor::new();
        monitor.register("a");
        monitor.record_failure("a");
        monitor.record_failure("a");
        monitor.record_success("a");
        assert!(!monitor.record_failure("a"));
    }

    #[test]
    fn response_history_is_capped() {
        let monitor = HealthMonitor::new();
        for i in 0..150 {
            monitor.update_challenge_response("a", i);
        }
        let nodes = monitor.nodes.read();
        assert_eq!(nodes.get("a").unwrap().response_times_ms.len(), RESPONSE_HISTORY_CAP);
    }
}
