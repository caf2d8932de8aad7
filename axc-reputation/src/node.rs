use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;
use thiserror::Error;

const MAX_HISTORY: usize = 1000;
const ELIGIBLE_MIN_SCORE: f64 = 50.0;
const ELIGIBLE_MIN_PARTICIPATION: f64 = 0.1;
const UNREGISTER_CUMULATIVE_PENALTY: f64 = 50.0;
const INITIAL_SCORE: f64 = 100.0;
const MAX_SCORE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyKind {
    Light,
    Moderate,
    Severe,
    Critical,
}

impl PenaltyKind {
    pub fn severity(self) -> f64 {
        match self {
            PenaltyKind::Light => 2.0,
            PenaltyKind::Moderate => 5.0,
            PenaltyKind::Severe => 20.0,
            PenaltyKind::Critical => 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReputationEventKind {
    Registered,
    Reward { amount: f64 },
    Penalty { kind: PenaltyKind },
    ParticipationUpdated { rate: f64 },
    Unregistered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationEvent {
    pub node_id: String,
    pub timestamp: u64,
    pub kind: ReputationEventKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReputationError {
    #[error("node {0} is not registered")]
    NotRegistered(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeScore {
    pub node_id: String,
    pub current: f64,
    pub total_validations: u64,
    pub successful_validations: u64,
    pub failed_validations: u64,
    pub cumulative_penalty: f64,
    pub last_activity: u64,
    pub participation_rate: f64,
    pub history: VecDeque<ReputationEvent>,
}

impl NodeScore {
    fn new(node_id: String, now: u64) -> Self {
        NodeScore {
            node_id,
            current: INITIAL_SCORE,
            total_validations: 0,
            successful_validations: 0,
            failed_validations: 0,
            cumulative_penalty: 0.0,
            last_activity: now,
            participation_rate: 0.0,
            history: VecDeque::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_validations == 0 {
            0.0
        } else {
            self.successful_validations as f64 / self.total_validations as f64
        }
    }

    pub fn reliability(&self) -> f64 {
        0.6 * self.participation_rate + 0.4 * self.success_rate()
    }

    pub fn is_eligible(&self) -> bool {
        self.current >= ELIGIBLE_MIN_SCORE && self.participation_rate >= ELIGIBLE_MIN_PARTICIPATION
    }

    fn push_event(&mut self, event: ReputationEvent) {
        self.history.push_back(event);
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }
}

/// In-memory node reputation store. Mutation is serialized through a single
/// lock, matching the teacher's `parking_lot::RwLock`-guarded consensus
/// state — the store is small enough that per-node locking isn't worth it.
#[derive(Default)]
pub struct NodeReputationStore {
    inner: RwLock<HashMap<String, NodeScore>>,
}

impl NodeReputationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: registering an already-registered node is a no-op.
    pub fn register(&self, node_id: &str, now: u64) -> bool {
        let mut nodes = self.inner.write();
        if nodes.contains_key(node_id) {
            return false;
        }
        let mut score = NodeScore::new(node_id.to_string(), now);
        score.push_event(ReputationEvent {
            node_id: node_id.to_string(),
            timestamp: now,
            kind: ReputationEventKind::Registered,
        });
        nodes.insert(node_id.to_string(), score);
        true
    }

    pub fn unregister(&self, node_id: &str) {
        self.inner.write().remove(node_id);
    }

    pub fn get(&self, node_id: &str) -> Option<NodeScore> {
        self.inner.read().get(node_id).cloned()
    }

    pub fn is_eligible(&self, node_id: &str) -> bool {
        self.inner
            .read()
            .get(node_id)
            .map(NodeScore::is_eligible)
            .unwrap_or(false)
    }

    pub fn record_successful_validation(
        &self,
        node_id: &str,
        reward: f64,
        now: u64,
    ) -> Result<(), ReputationError> {
        let mut nodes = self.inner.write();
        let score = nodes
            .get_mut(node_id)
            .ok_or_else(|| ReputationError::NotRegistered(node_id.to_string()))?;
        score.total_validations += 1;
        score.successful_validations += 1;
        score.current = (score.current + reward).min(MAX_SCORE);
        score.last_activity = now;
        score.push_event(ReputationEvent {
            node_id: node_id.to_string(),
            timestamp: now,
            kind: ReputationEventKind::Reward { amount: reward },
        });
        Ok(())
    }

    pub fn record_failed_validation(&self, node_id: &str, now: u64) -> Result<(), ReputationError> {
        let mut nodes = self.inner.write();
        let score = nodes
            .get_mut(node_id)
            .ok_or_else(|| ReputationError::NotRegistered(node_id.to_string()))?;
        score.total_validations += 1;
        score.failed_validations += 1;
        score.last_activity = now;
        Ok(())
    }

    /// Applies a penalty and, if the node's cumulative penalty has crossed
    /// the unregister threshold, removes it from the store. Returns whether
    /// the node was unregistered as a result.
    pub fn apply_penalty(
        &self,
        node_id: &str,
        kind: PenaltyKind,
        now: u64,
    ) -> Result<bool, ReputationError> {
        let mut nodes = self.inner.write();
        let score = nodes
            .get_mut(node_id)
            .ok_or_else(|| ReputationError::NotRegistered(node_id.to_string()))?;
        score.current = (score.current - kind.severity()).max(0.0);
        score.cumulative_penalty += kind.severity();
        score.last_activity = now;
        score.push_event(ReputationEvent {
            node_id: node_id.to_string(),
            timestamp: now,
            kind: ReputationEventKind::Penalty { kind },
        });
        let should_unregister = score.cumulative_penalty >= UNREGISTER_CUMULATIVE_PENALTY;
        if should_unregister {
            tracing::warn!(node_id, "cumulative penalty threshold crossed, unregistering node");
            nodes.remove(node_id);
        }
        Ok(should_unregister)
    }

    pub fn update_participation_rate(
        &self,
        node_id: &str,
        rate: f64,
        now: u64,
    ) -> Result<(), ReputationError> {
        let mut nodes = self.inner.write();
        let score = nodes
            .get_mut(node_id)
            .ok_or_else(|| ReputationError::NotRegistered(node_id.to_string()))?;
        score.participation_rate = rate.clamp(0.0, 1.0);
        score.last_activity = now;
        score.push_event(ReputationEvent {
            node_id: node_id.to_string(),
            timestamp: now,
            kind: ReputationEventKind::ParticipationUpdated { rate: score.participation_rate },
        });
        Ok(())
    }

    pub fn get_top(&self, n: usize) -> Vec<NodeScore> {
        let nodes = self.inner.read();
        let mut all: Vec<NodeScore> = nodes.values().cloned().collect();
        all.sort_by(|a, b| b.current.partial_cmp(&a.current).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(n);
        all
    }

    pub fn snapshot(&self) -> Vec<NodeScore> {
        self.inner.read().values().cloned().collect()
    }

    pub fn load(scores: Vec<NodeScore>) -> Self {
        let mut map = HashMap::new();
        for score in scores {
            map.insert(score.node_id.clone(), score);
        }
        NodeReputationStore {
            inner: RwLock::new(map),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let store = NodeReputationStore::new();
        assert!(store.register("node-a", 0));
        assert!(!store.register("node-a", 0));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn penalty_crosses_unregister_threshold() {
        let store = NodeReputationStore::new();
        store.register("node-a", 0);
        assert!(!store.apply_penalty("node-a", PenaltyKind::Severe, 1).unwrap());
        assert!(store.get("node-a").is_some());
        assert!(store.apply_penalty("node-a", PenaltyKind::Severe, 2).unwrap());
        assert!(store.get("node-a").is_none());
    }

    #[test]
    fn eligibility_requires_score_and_participation() {
        let store = NodeReputationStore::new();
        store.register("node-a", 0);
        assert!(!store.is_eligible("node-a"));
        store.update_participation_rate("node-a", 0.5, 1).unwrap();
        assert!(store.is_eligible("node-a"));
    }

    #[test]
    fn reliability_blends_participation_and_success_rate() {
        let store = NodeReputationStore::new();
        store.register("node-a", 0);
        store.update_participation_rate("node-a", 1.0, 1).unwrap();
        store.record_successful_validation("node-a", 5.0, 2).unwrap();
        let score = store.get("node-a").unwrap();
        assert!((score.reliability() - (0.6 * 1.0 + 0.4 * 1.0)).abs() < 1e-9);
    }

    #[test]
    fn get_top_orders_descending_by_score() {
        let store = NodeReputationStore::new();
        store.register("a", 0);
        store.register("b", 0);
        store.record_successful_validation("a", 50.0, 1).unwrap();
        let top = store.get_top(2);
        assert_eq!(top[0].node_id, "a");
    }
}
