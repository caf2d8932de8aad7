//! Attack defense (C15): Sybil, flooding, and consensus-manipulation
//! detectors plus an anomaly score and blocked-node mitigation, grounded
//! on `original_source/src/consensus/resilient_consensus.py`'s
//! `AttackDefense` (cluster/ratio thresholds, rate-based flooding check,
//! vote-alternation consensus check).

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::HashSet;

pub const SYBIL_EXTERNAL_RATIO_THRESHOLD: f64 = 0.1;
pub const SYBIL_MIN_CLUSTER_SIZE: usize = 3;
pub const SYBIL_CONFIDENCE: f64 = 0.7;

pub const FLOODING_RATE_MULTIPLIER: f64 = 5.0;
pub const FLOODING_CONFIDENCE: f64 = 0.8;

pub const MANIPULATION_ALTERNATION_THRESHOLD: f64 = 0.7;
pub const MANIPULATION_AGREEMENT_FLOOR: f64 = 0.3;
pub const MANIPULATION_MIN_VOTES: usize = 10;
pub const MANIPULATION_CONFIDENCE: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackKind {
    Sybil,
    Flooding,
    ConsensusManipulation,
}

#[derive(Debug, Clone)]
pub struct AttackSuspicion {
    pub kind: AttackKind,
    pub offenders: Vec<String>,
    pub confidence: f64,
}

/// Flags nodes whose external-connection ratio (distinct peers outside
/// their own declared cluster, over total connections) stays below 10%,
/// when at least `SYBIL_MIN_CLUSTER_SIZE` such nodes share a cluster.
pub fn detect_sybil(external_connection_ratio: &HashMap<String, f64>) -> Option<AttackSuspicion> {
    let offenders: Vec<String> = external_connection_ratio
        .iter()
        .filter(|(_, ratio)| **ratio < SYBIL_EXTERNAL_RATIO_THRESHOLD)
        .map(|(id, _)| id.clone())
        .collect();
    if offenders.len() < SYBIL_MIN_CLUSTER_SIZE {
        return None;
    }
    Some(AttackSuspicion { kind: AttackKind::Sybil, offenders, confidence: SYBIL_CONFIDENCE })
}

/// Flags nodes whose message rate exceeds `FLOODING_RATE_MULTIPLIER`
/// times the mean rate across all observed nodes.
pub fn detect_flooding(message_rates: &HashMap<String, f64>) -> Option<AttackSuspicion> {
    if message_rates.is_empty() {
        return None;
    }
    let mean = message_rates.values().sum::<f64>() / message_rates.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let offenders: Vec<String> = message_rates
        .iter()
        .filter(|(_, rate)| **rate > FLOODING_RATE_MULTIPLIER * mean)
        .map(|(id, _)| id.clone())
        .collect();
    if offenders.is_empty() {
        return None;
    }
    Some(AttackSuspicion { kind: AttackKind::Flooding, offenders, confidence: FLOODING_CONFIDENCE })
}

/// A node's vote history over the observation window: how often it
/// flips its vote between consecutive rounds, and how often it agrees
/// with the eventual majority outcome.
pub struct VoteRecord {
    pub node_id: String,
    pub total_votes: usize,
    pub alternations: usize,
    pub agreements: usize,
}

/// Flags nodes whose vote-alternation rate exceeds 70% or whose
/// agreement-with-majority rate falls below 30%, once at least
/// `MANIPULATION_MIN_VOTES` votes have been observed.
pub fn detect_consensus_manipulation(records: &[VoteRecord]) -> Option<AttackSuspicion> {
    let offenders: Vec<String> = records
        .iter()
        .filter(|r| r.total_votes >= MANIPULATION_MIN_VOTES)
        .filter(|r| {
            let alternation_rate = r.alternations as f64 / r.total_votes as f64;
            let agreement_rate = r.agreements as f64 / r.total_votes as f64;
            alternation_rate > MANIPULATION_ALTERNATION_THRESHOLD || agreement_rate < MANIPULATION_AGREEMENT_FLOOR
        })
        .map(|r| r.node_id.clone())
        .collect();
    if offenders.is_empty() {
        return None;
    }
    Some(AttackSuspicion { kind: AttackKind::ConsensusManipulation, offenders, confidence: MANIPULATION_CONFIDENCE })
}

/// A node's composite anomaly score in `[0, 1]`:
/// `0.3 * 1(avg_response_ms > 100) + 0.4 * min(1, failure_rate / 0.2) + 0.3 * pattern_score`.
pub fn anomaly_score(avg_response_ms: f64, failure_rate: f64, pattern_score: f64) -> f64 {
    let response_term = if avg_response_ms > 100.0 { 0.3 } else { 0.0 };
    let failure_term = 0.4 * (failure_rate / 0.2).min(1.0);
    let pattern_term = 0.3 * pattern_score.clamp(0.0, 1.0);
    (response_term + failure_term + pattern_term).clamp(0.0, 1.0)
}

/// External mitigation actions, dispatched by attack kind.
#[async_trait]
pub trait MitigationCallbacks: Send + Sync {
    async fn enable_rate_limiting(&self, node_id: &str);
    async fn increase_validation_requirements(&self, node_id: &str);
    async fn increase_consensus_threshold(&self);
}

pub struct AttackDefense {
    blocked: RwLock<HashSet<String>>,
    behavior_scores: RwLock<HashMap<String, f64>>,
}

impl Default for AttackDefense {
    fn default() -> Self {
        Self::new()
    }
}

impl AttackDefense {
    pub fn new() -> Self {
        AttackDefense { blocked: RwLock::new(HashSet::new()), behavior_scores: RwLock::new(HashMap::new()) }
    }

    pub fn is_blocked(&self, node_id: &str) -> bool {
        self.blocked.read().contains(node_id)
    }

    pub fn behavior_score(&self, node_id: &str) -> f64 {
        *self.behavior_scores.read().get(node_id).unwrap_or(&1.0)
    }

    pub fn blocked_nodes(&self) -> Vec<String> {
        self.blocked.read().iter().cloned().collect()
    }

    /// Blocks every offender in `suspicion`, zeroes their behavior score,
    /// and dispatches the mitigation callback matching the attack kind.
    pub async fn mitigate(&self, suspicion: &AttackSuspicion, callbacks: &dyn MitigationCallbacks) {
        {
            let mut blocked = self.blocked.write();
            let mut scores = self.behavior_scores.write();
            for offender in &suspicion.offenders {
                blocked.insert(offender.clone());
                scores.insert(offender.clone(), 0.0);
            }
        }
        match suspicion.kind {
            AttackKind::Sybil | AttackKind::Flooding => {
                for offender in &suspicion.offenders {
                    callbacks.enable_rate_limiting(offender).await;
                }
            }
            AttackKind::ConsensusManipulation => {
                for offender in &suspicion.offenders {
                    callbacks.increase_validation_requirements(offender).await;
                }
                callbacks.increase_consensus_threshold().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingCallbacks {
        rate_limited: RwLock<Vec<String>>,
        threshold_raised: RwLock<u32>,
    }

    impl RecordingCallbacks {
        fn new() -> Self {
            RecordingCallbacks { rate_limited: RwLock::new(Vec::new()), threshold_raised: RwLock::new(0) }
        }
    }

    #[async_trait]
    impl MitigationCallbacks for RecordingCallbacks {
        async fn enable_rate_limiting(&self, node_id: &str) {
            self.rate_limited.write().push(node_id.to_string());
        }
        async fn increase_validation_requirements(&self, node_id: &str) {
            self.rate_limited.write().push(node_id.to_string());
        }
        async fn increase_consensus_threshold(&self) {
            *self.threshold_raised.write() += 1;
        }
    }

    #[test]
    fn sybil_requires_a_cluster_of_low_external_ratio_nodes() {
        let mut ratios = HashMap::new();
        ratios.insert("a".to_string(), 0.05);
        ratios.insert("b".to_string(), 0.02);
        assert!(detect_sybil(&ratios).is_none());
        ratios.insert("c".to_string(), 0.01);
        assert!(detect_sybil(&ratios).is_some());
    }

    #[test]
    fn flooding_flags_nodes_far_above_the_mean_rate() {
        let mut rates = HashMap::new();
        rates.insert("a".to_string(), 10.0);
        rates.insert("b".to_string(), 10.0);
        rates.insert("c".to_string(), 100.0);
        let suspicion = detect_flooding(&rates).unwrap();
        assert_eq!(suspicion.offenders, vec!["c".to_string()]);
    }

    #[test]
    fn consensus_manipulation_requires_minimum_vote_count() {
        let records = vec![VoteRecord { node_id: "a".to_string(), total_votes: 5, alternations: 4, agreements: 0 }];
        assert!(detect_consensus_manipulation(&records).is_none());
        let records = vec![VoteRecord { node_id: "a".to_string(), total_votes: 10, alternations: 8, agreements: 1 }];
        assert!(detect_consensus_manipulation(&records).is_some());
    }

    #[test]
    fn anomaly_score_combines_all_three_terms() {
        let score = anomaly_score(150.0, 0.2, 1.0);
        assert!((score - 1.0).abs() < 1e-9);
        let score = anomaly_score(50.0, 0.0, 0.0);
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn mitigation_blocks_offenders_and_dispatches_callback() {
        let defense = AttackDefense::new();
        let suspicion = AttackSuspicion {
            kind: AttackKind::ConsensusManipulation,
            offenders: vec!["a".to_string()],
            confidence: 0.75,
        };
        let callbacks = RecordingCallbacks::new();
        defense.mitigate(&suspicion, &callbacks).await;
        assert!(defense.is_blocked("a"));
        assert_eq!(defense.behavior_score("a"), 0.0);
        assert_eq!(*callbacks.threshold_raised.read(), 1);
    }
}
