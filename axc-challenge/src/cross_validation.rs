//! Cross-validation (C3): aggregates independent re-solves of a challenge
//! solution into a consensus verdict, with reputation deltas applied to
//! participating validators. Grounded on
//! `original_source/src/consensus/cross_validation.py`.

use crate::challenge::Challenge;
use crate::solver::{similarity, solve};
use axc_reputation::{NodeReputationStore, PenaltyKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MIN_VALIDATORS: usize = 3;
const VALID_THRESHOLD: f64 = 0.95;
const SUSPICIOUS_THRESHOLD: f64 = 0.80;
const CONSENSUS_FRACTION: f64 = 0.67;
const CONFIDENCE_FLOOR: f64 = 0.8;
const RESOLVE_TIMEOUT_MS: u64 = 250;
const REWARD_PER_VALID: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Valid,
    Suspicious,
    Invalid,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub validator_id: String,
    pub outcome: ValidationOutcome,
    pub similarity: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    pub outcome: ValidationOutcome,
    pub confidence: f64,
    pub arbitration_required: bool,
    pub entries: Vec<ValidationEntry>,
}

/// A candidate re-validator: id plus the current reputation score used to
/// rank candidates (highest first) and excluded from selecting the
/// submitting node itself.
#[derive(Debug, Clone)]
pub struct ValidatorCandidate {
    pub node_id: String,
    pub reputation: f64,
}

pub struct CrossValidator {
    min_validators: usize,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossValidator {
    pub fn new() -> Self {
        CrossValidator {
            min_validators: MIN_VALIDATORS,
        }
    }

    /// Picks up to `k` validators other than `submitter_id`, highest
    /// reputation first.
    pub fn select_validators(
        &self,
        submitter_id: &str,
        candidates: &[ValidatorCandidate],
    ) -> Vec<ValidatorCandidate> {
        let mut pool: Vec<ValidatorCandidate> = candidates
            .iter()
            .filter(|c| c.node_id != submitter_id)
            .cloned()
            .collect();
        pool.sort_by(|a, b| b.reputation.partial_cmp(&a.reputation).unwrap_or(std::cmp::Ordering::Equal));
        pool.truncate(self.min_validators);
        pool
    }

    /// Re-solves `challenge` independently for each selected validator and
    /// classifies agreement against `submitted_hash`. Applies reputation
    /// deltas to `reputation` for every participating validator.
    pub async fn cross_validate(
        &self,
        challenge: &Challenge,
        submitted_solution: &[f64],
        validators: &[ValidatorCandidate],
        reputation: &NodeReputationStore,
        now: u64,
    ) -> ConsensusVerdict {
        let mut entries = Vec::with_capacity(validators.len());
        for candidate in validators {
            let entry = self
                .revalidate_one(challenge, submitted_solution, &candidate.node_id)
                .await;
            apply_reputation_delta(reputation, &entry, now);
            entries.push(entry);
        }
        consensus_from_entries(entries)
    }

    async fn revalidate_one(
        &self,
        challenge: &Challenge,
        submitted_solution: &[f64],
        validator_id: &str,
    ) -> ValidationEntry {
        let kind = challenge.kind;
        let size = challenge.size;
        let seed = challenge.seed;
        let compute = tokio::task::spawn_blocking(move || solve(kind, size, seed));
        let deadline = Duration::from_millis(RESOLVE_TIMEOUT_MS);
        match tokio::time::timeout(deadline, compute).await {
            Ok(Ok(own_solution)) => {
                let sim = similarity(kind, &own_solution, submitted_solution);
                classify(validator_id, sim)
            }
            Ok(Err(_)) => ValidationEntry {
                validator_id: validator_id.to_string(),
                outcome: ValidationOutcome::Error,
                similarity: 0.0,
                confidence: 0.0,
            },
            Err(_) => ValidationEntry {
                validator_id: validator_id.to_string(),
                outcome: ValidationOutcome::Timeout,
                similarity: 0.0,
                confidence: 0.0,
            },
        }
    }
}

fn classify(validator_id: &str, sim: f64) -> ValidationEntry {
    let outcome = if sim >= VALID_THRESHOLD {
        ValidationOutcome::Valid
    } else if sim >= SUSPICIOUS_THRESHOLD {
        ValidationOutcome::Suspicious
    } else {
        ValidationOutcome::Invalid
    };
    ValidationEntry {
        validator_id: validator_id.to_string(),
        outcome,
        similarity: sim,
        confidence: sim,
    }
}

fn consensus_from_entries(entries: Vec<ValidationEntry>) -> ConsensusVerdict {
    if entries.is_empty() {
        return ConsensusVerdict {
            outcome: ValidationOutcome::Suspicious,
            confidence: 0.0,
            arbitration_required: true,
            entries,
        };
    }
    let total = entries.len() as f64;
    let valid_count = entries.iter().filter(|e| e.outcome == ValidationOutcome::Valid).count();
    let invalid_count = entries
        .iter()
        .filter(|e| matches!(e.outcome, ValidationOutcome::Invalid | ValidationOutcome::Error | ValidationOutcome::Timeout))
        .count();
    let suspicious_present = entries.iter().any(|e| e.outcome == ValidationOutcome::Suspicious);

    let valid_fraction = valid_count as f64 / total;
    let invalid_fraction = invalid_count as f64 / total;

    let outcome = if valid_fraction >= CONSENSUS_FRACTION {
        ValidationOutcome::Valid
    } else if invalid_fraction >= CONSENSUS_FRACTION {
        ValidationOutcome::Invalid
    } else {
        ValidationOutcome::Suspicious
    };

    let agreeing: Vec<&ValidationEntry> = entries.iter().filter(|e| e.outcome == outcome).collect();
    let confidence = if agreeing.is_empty() {
        0.0
    } else {
        agreeing.iter().map(|e| e.confidence).sum::<f64>() / agreeing.len() as f64
    };

    let arbitration_required =
        suspicious_present || (valid_count > 0 && invalid_count > 0) || confidence < CONFIDENCE_FLOOR;

    ConsensusVerdict {
        outcome,
        confidence,
        arbitration_required,
        entries,
    }
}

fn apply_reputation_delta(reputation: &NodeReputationStore, entry: &ValidationEntry, now: u64) {
    match entry.outcome {
        ValidationOutcome::Valid => {
            let _ = reputation.record_successful_validation(&entry.validator_id, REWARD_PER_VALID, now);
        }
        ValidationOutcome::Suspicious => {
            let _ = reputation.apply_penalty(&entry.validator_id, PenaltyKind::Light, now);
        }
        ValidationOutcome::Invalid => {
            let _ = reputation.apply_penalty(&entry.validator_id, PenaltyKind::Moderate, now);
        }
        ValidationOutcome::Error | ValidationOutcome::Timeout => {
            let _ = reputation.apply_penalty(&entry.validator_id, PenaltyKind::Light, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeGenerator;

    fn candidates(names: &[(&str, f64)]) -> Vec<ValidatorCandidate> {
        names
            .iter()
            .map(|(id, rep)| ValidatorCandidate {
                node_id: id.to_string(),
                reputation: *rep,
            })
            .collect()
    }

    #[test]
    fn select_validators_excludes_submitter_and_ranks_by_reputation() {
        let validator = CrossValidator::new();
        let pool = candidates(&[("a", 50.0), ("b", 200.0), ("c", 10.0), ("submitter", 999.0)]);
        let picked = validator.select_validators("submitter", &pool);
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0].node_id, "b");
        assert!(picked.iter().all(|c| c.node_id != "submitter"));
    }

    #[tokio::test]
    async fn matching_submission_reaches_valid_consensus() {
        let gen = ChallengeGenerator::new();
        let challenge = gen.generate(1, 42, 0);
        let submitted = crate::solver::solve(challenge.kind, challenge.size, challenge.seed);
        let reputation = NodeReputationStore::new();
        for id in ["a", "b", "c"] {
            reputation.register(id, 0);
        }
        let validator = CrossValidator::new();
        let pool = candidates(&[("a", 100.0), ("b", 100.0), ("c", 100.0)]);
        let verdict = validator
            .cross_validate(&challenge, &submitted, &pool, &reputation, 0)
            .await;
        assert_eq!(verdict.outcome, ValidationOutcome::Valid);
        assert!(!verdict.arbitration_required);
        assert!(reputation.get("a").unwrap().current > 100.0);
    }

    #[tokio::test]
    async fn forged_submission_reaches_invalid_consensus() {
        let gen = ChallengeGenerator::new();
        let challenge = gen.generate(1, 42, 0);
        let expected = crate::solver::solve(challenge.kind, challenge.size, challenge.seed);
        let forged: Vec<f64> = expected.iter().map(|v| v * -7.0 - 999.0).collect();
        let reputation = NodeReputationStore::new();
        for id in ["a", "b", "c"] {
            reputation.register(id, 0);
        }
        let validator = CrossValidator::new();
        let pool = candidates(&[("a", 100.0), ("b", 100.0), ("c", 100.0)]);
        let verdict = validator
            .cross_validate(&challenge, &forged, &pool, &reputation, 0)
            .await;
        assert_eq!(verdict.outcome, ValidationOutcome::Invalid);
    }
}
