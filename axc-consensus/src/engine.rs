//! Multi-node consensus (C12): the 10-second block-production cadence,
//! proposal/vote/finalize cycle and reputation-weighted approval,
//! grounded on
//! `original_source/src/consensus/multinode_consensus.py`'s
//! `MultiNodeConsensus` (single cooperative production loop, reward
//! distributor selection, vote tally against a 0.66 reputation-weighted
//! threshold).

use crate::quorum;
use axc_core::{
    AiValidatorEntry, Block, ConsensusProof, CrossValidationSummary, FeeDistribution, Hash32,
    SolutionSummary, Transaction, TransactionType,
};
use axc_economics::{HalvingEvent, RewardSchedule};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const BLOCK_CADENCE: Duration = Duration::from_secs(10);
pub const VOTE_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);
pub const CONSENSUS_THRESHOLD: f64 = 0.66;
pub const MAX_TXS_PER_BLOCK: usize = 100;
pub const REWARD_DISTRIBUTOR_MIN_REPUTATION: f64 = 90.0;

/// Per-validator vote history kept for consensus-manipulation detection
/// (§4.15): longer than `axc_resilience::MANIPULATION_MIN_VOTES` needs,
/// trimmed on write.
const VOTE_HISTORY_WINDOW: usize = 64;

#[derive(Debug, Clone)]
pub struct ValidatorInfo {
    pub node_id: String,
    pub reputation: f64,
    pub active: bool,
    pub reward_address: String,
}

pub struct Proposal {
    pub block: Block,
    pub votes: HashMap<String, bool>,
    pub proposed_at: Instant,
}

/// One finalized proposal's outcome for a single validator: whether it
/// voted to approve, and whether that vote matched the tally's outcome.
struct VoteHistoryEntry {
    approve: bool,
    agreed_with_outcome: bool,
}

/// Owns the validator set, pending-transaction pool and in-flight proposal.
/// Holds no reference to the transport or the chain directly — the node
/// container drives it through `ConsensusCallbacks` (§9 message-bus
/// pattern), which is what keeps this crate from depending on
/// `axc-network`/`axc-bootstrap`.
pub struct ConsensusEngine {
    validators: RwLock<HashMap<String, ValidatorInfo>>,
    pending_transactions: RwLock<VecDeque<Transaction>>,
    is_mining: RwLock<bool>,
    last_block_time: RwLock<u64>,
    current_proposal: RwLock<Option<Proposal>>,
    vote_history: RwLock<HashMap<String, VecDeque<VoteHistoryEntry>>>,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusEngine {
    pub fn new() -> Self {
        ConsensusEngine {
            validators: RwLock::new(HashMap::new()),
            pending_transactions: RwLock::new(VecDeque::new()),
            is_mining: RwLock::new(false),
            last_block_time: RwLock::new(0),
            current_proposal: RwLock::new(None),
            vote_history: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_last_block_time(&self, now: u64) {
        *self.last_block_time.write() = now;
    }

    pub fn register_validator(&self, node_id: impl Into<String>, reputation: f64, reward_address: impl Into<String>) {
        let node_id = node_id.into();
        self.validators.write().insert(
            node_id.clone(),
            ValidatorInfo { node_id, reputation, active: true, reward_address: reward_address.into() },
        );
    }

    pub fn set_active(&self, node_id: &str, active: bool) {
        if let Some(v) = self.validators.write().get_mut(node_id) {
            v.active = active;
        }
    }

    pub fn update_reputation(&self, node_id: &str, reputation: f64) {
        if let Some(v) = self.validators.write().get_mut(node_id) {
            v.reputation = reputation;
        }
    }

    pub fn active_validators(&self) -> Vec<ValidatorInfo> {
        self.validators.read().values().filter(|v| v.active).cloned().collect()
    }

    pub fn total_validators(&self) -> usize {
        self.validators.read().len()
    }

    pub fn submit_transaction(&self, tx: Transaction) {
        self.pending_transactions.write().push_back(tx);
    }

    pub fn pending_count(&self) -> usize {
        self.pending_transactions.read().len()
    }

    /// `now − last_block_time ≥ 10s` and not already mining.
    pub fn ready_to_produce(&self, now: u64) -> bool {
        !*self.is_mining.read() && now.saturating_sub(*self.last_block_time.read()) >= BLOCK_CADENCE.as_secs()
    }

    pub fn is_mining(&self) -> bool {
        *self.is_mining.read()
    }

    pub fn begin_mining(&self) {
        *self.is_mining.write() = true;
    }

    pub fn end_mining(&self) {
        *self.is_mining.write() = false;
    }

    /// Takes (without removing) up to `MAX_TXS_PER_BLOCK` pending
    /// transactions, preserving submission order.
    pub fn peek_pending_transactions(&self) -> Vec<Transaction> {
        self.pending_transactions.read().iter().take(MAX_TXS_PER_BLOCK).cloned().collect()
    }

    /// Removes transactions that made it into a finalized block, matched
    /// by content hash.
    pub fn remove_included(&self, included: &[Transaction]) {
        let included_hashes: std::collections::HashSet<Hash32> = included.iter().map(Transaction::hash).collect();
        self.pending_transactions.write().retain(|tx| !included_hashes.contains(&tx.hash()));
    }

    /// Among active validators with reputation ≥ 90, picks one uniformly at
    /// random; if none qualify, falls back to the highest-reputation active
    /// validator.
    pub fn select_reward_distributor(&self) -> Option<ValidatorInfo> {
        let active = self.active_validators();
        if active.is_empty() {
            return None;
        }
        let qualified: Vec<&ValidatorInfo> =
            active.iter().filter(|v| v.reputation >= REWARD_DISTRIBUTOR_MIN_REPUTATION).collect();
        if !qualified.is_empty() {
            let mut rng = rand::thread_rng();
            return qualified.choose(&mut rng).cloned().cloned();
        }
        active
            .iter()
            .max_by(|a, b| a.reputation.partial_cmp(&b.reputation).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
    }

    /// Splits `reward_total` equally across active validators, crediting
    /// each from `pool_address`. Every block is guaranteed to carry at
    /// least these, even if the split leaves the pool's dust remainder
    /// undistributed.
    pub fn build_reward_transactions(&self, reward_total: u64, pool_address: &str, now: u64) -> Vec<Transaction> {
        let active = self.active_validators();
        if active.is_empty() {
            return Vec::new();
        }
        let share = reward_total / active.len() as u64;
        active
            .iter()
            .map(|v| Transaction {
                from: pool_address.to_string(),
                to: v.reward_address.clone(),
                amount: share,
                fee: 0,
                timestamp: now,
                nonce: 0,
                tx_type: TransactionType::MiningReward,
                memo: Some(format!("block reward share for {}", v.node_id)),
                signature: None,
            })
            .collect()
    }

    /// Builds the candidate block for this cadence tick. `ai_validators`
    /// and `consensus_proof` are supplied by the caller (the challenge/
    /// cross-validation pipeline feeding this cadence), since producing
    /// them is outside this crate's scope.
    #[allow(clippy::too_many_arguments)]
    pub fn build_block(
        &self,
        index: u64,
        previous_hash: Hash32,
        now: u64,
        transactions: Vec<Transaction>,
        validators: Vec<String>,
        ai_validators: Vec<AiValidatorEntry>,
        consensus_proof: ConsensusProof,
    ) -> Block {
        let merkle_root = axc_core::merkle_root(&transactions);
        let mut block = Block {
            index,
            previous_hash,
            timestamp: now,
            transactions,
            merkle_root,
            nonce: 0,
            validators,
            ai_validators,
            consensus_proof,
            hash: Hash32::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Starts a new proposal, casting the local node's own approval vote.
    pub fn start_proposal(&self, block: Block, local_node_id: &str) {
        let mut votes = HashMap::new();
        votes.insert(local_node_id.to_string(), true);
        *self.current_proposal.write() =
            Some(Proposal { block, votes, proposed_at: Instant::now() });
    }

    /// Ignored if there's no open proposal or the collection window has
    /// already elapsed (the proposer ignores late votes, §5 ordering rule).
    pub fn record_vote(&self, validator_id: &str, approve: bool) {
        let mut guard = self.current_proposal.write();
        if let Some(proposal) = guard.as_mut() {
            if proposal.proposed_at.elapsed() <= VOTE_COLLECTION_TIMEOUT {
                proposal.votes.insert(validator_id.to_string(), approve);
            }
        }
    }

    pub fn vote_window_elapsed(&self) -> bool {
        self.current_proposal
            .read()
            .as_ref()
            .map(|p| p.proposed_at.elapsed() >= VOTE_COLLECTION_TIMEOUT)
            .unwrap_or(true)
    }

    /// `Σ(vote · reputation) / Σ reputation ≥ 0.66`.
    pub fn tally(&self) -> bool {
        let Some(proposal) = self.current_proposal.read().as_ref().map(|p| p.votes.clone()) else {
            return false;
        };
        let validators = self.validators.read();
        let mut approve_weight = 0.0;
        let mut total_weight = 0.0;
        for (node_id, approve) in &proposal {
            let weight = validators.get(node_id).map(|v| v.reputation).unwrap_or(0.0);
            total_weight += weight;
            if *approve {
                approve_weight += weight;
            }
        }
        if total_weight <= 0.0 {
            return false;
        }
        approve_weight / total_weight >= CONSENSUS_THRESHOLD
    }

    /// Folds the current proposal's votes into each voter's rolling
    /// history against `outcome` (the tally result). Call once per
    /// proposal, before `take_proposal`.
    pub fn record_finalized_votes(&self, outcome: bool) {
        let Some(votes) = self.current_proposal.read().as_ref().map(|p| p.votes.clone()) else {
            return;
        };
        let mut history = self.vote_history.write();
        for (node_id, approve) in votes {
            let entries = history.entry(node_id).or_default();
            entries.push_back(VoteHistoryEntry { approve, agreed_with_outcome: approve == outcome });
            if entries.len() > VOTE_HISTORY_WINDOW {
                entries.pop_front();
            }
        }
    }

    /// Per-validator `(node_id, total_votes, alternations, agreements)`,
    /// the raw counts `axc_resilience::detect_consensus_manipulation`
    /// needs — kept here rather than exposing the history type directly
    /// so this crate stays free of a dependency on `axc-resilience`.
    pub fn vote_history_counts(&self) -> Vec<(String, usize, usize, usize)> {
        self.vote_history
            .read()
            .iter()
            .map(|(node_id, entries)| {
                let total = entries.len();
                let agreements = entries.iter().filter(|e| e.agreed_with_outcome).count();
                let alternations =
                    entries.iter().zip(entries.iter().skip(1)).filter(|(a, b)| a.approve != b.approve).count();
                (node_id.clone(), total, alternations, agreements)
            })
            .collect()
    }

    pub fn take_proposal(&self) -> Option<Proposal> {
        self.current_proposal.write().take()
    }

    pub fn abandon_proposal(&self) {
        *self.current_proposal.write() = None;
    }

    /// Validates a received proposal before voting on it (§4.11): rejects
    /// stale/non-sequential indices, previous-hash mismatches, or any
    /// contained non-reward transaction that fails structural validity.
    pub fn validate_proposal(&self, block: &Block, latest: &Block) -> bool {
        if block.index != latest.index + 1 {
            return false;
        }
        if block.previous_hash != latest.hash {
            return false;
        }
        block
            .transactions
            .iter()
            .filter(|tx| tx.tx_type != TransactionType::MiningReward)
            .all(Transaction::is_structurally_valid)
    }

    /// Advances the reward schedule for the block about to be produced,
    /// returning the halving event if one fired (the caller broadcasts a
    /// FeeDistributionUpdate and persists state when it does).
    pub fn advance_reward_schedule(
        schedule: &mut RewardSchedule,
        next_index: u64,
        next_distribution: FeeDistribution,
    ) -> Option<HalvingEvent> {
        schedule.on_block_produced(next_index, next_distribution)
    }

    pub fn quorum_status(&self) -> Result<quorum::QuorumStatus, quorum::QuorumError> {
        quorum::evaluate(self.active_validators().len(), self.total_validators())
    }
}

fn solution_summary(node_id: &str) -> SolutionSummary {
    SolutionSummary { node_id: node_id.to_string(), solution_hash: Hash32::of(node_id.as_bytes()) }
}

fn cross_validation_summary(validator_id: &str) -> CrossValidationSummary {
    CrossValidationSummary { validator_id: validator_id.to_string(), verdict: "valid".to_string(), confidence: 1.0 }
}

/// Convenience builder for a minimal but structurally valid
/// `ConsensusProof`/`ai_validators` pair when the caller has no richer
/// challenge-pipeline output on hand yet (e.g. tests, or a degraded
/// fallback path).
pub fn placeholder_consensus_material(active_validators: &[ValidatorInfo]) -> (Vec<AiValidatorEntry>, ConsensusProof) {
    let ai_validators = active_validators
        .iter()
        .map(|v| AiValidatorEntry {
            node_id: v.node_id.clone(),
            model_hash: "unspecified".to_string(),
            signature: Vec::new(),
            response_time_ms: 1,
            reputation: v.reputation,
        })
        .collect();
    let proof = ConsensusProof {
        challenge_id: "cadence-tick".to_string(),
        solutions: active_validators.iter().map(|v| solution_summary(&v.node_id)).collect(),
        cross_validations: active_validators.iter().map(|v| cross_validation_summary(&v.node_id)).collect(),
        consensus_timestamp: 0,
    };
    (ai_validators, proof)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            from: "AXsender".into(),
            to: "AXreceiver".into(),
            amount: 10,
            fee: 1,
            timestamp: 1,
            nonce: 0,
            tx_type: TransactionType::Transfer,
            memo: None,
            signature: None,
        }
    }

    #[test]
    fn ready_to_produce_respects_cadence_and_mining_flag() {
        let engine = ConsensusEngine::new();
        engine.set_last_block_time(0);
        assert!(!engine.ready_to_produce(5));
        assert!(engine.ready_to_produce(10));
        engine.begin_mining();
        assert!(!engine.ready_to_produce(10));
    }

    #[test]
    fn reward_is_split_equally_across_active_validators() {
        let engine = ConsensusEngine::new();
        engine.register_validator("a", 50.0, "AXa");
        engine.register_validator("b", 50.0, "AXb");
        let txs = engine.build_reward_transactions(100, "AXpool", 10);
        assert_eq!(txs.len(), 2);
        assert!(txs.iter().all(|tx| tx.amount == 50));
    }

    #[test]
    fn reward_distributor_prefers_high_reputation_qualifiers() {
        let engine = ConsensusEngine::new();
        engine.register_validator("low", 10.0, "AXlow");
        engine.register_validator("high", 95.0, "AXhigh");
        let distributor = engine.select_reward_distributor().unwrap();
        assert_eq!(distributor.node_id, "high");
    }

    #[test]
    fn vote_tally_reaches_consensus_at_threshold() {
        let engine = ConsensusEngine::new();
        engine.register_validator("a", 70.0, "AXa");
        engine.register_validator("b", 30.0, "AXb");
        let genesis = Block::placeholder_genesis();
        engine.start_proposal(genesis, "a");
        engine.record_vote("b", false);
        // weighted: a(true,70) + b(false,30) => 70/100 = 0.70 >= 0.66
        assert!(engine.tally());
    }

    #[test]
    fn submitted_transactions_are_removed_only_after_inclusion() {
        let engine = ConsensusEngine::new();
        engine.submit_transaction(sample_tx());
        assert_eq!(engine.pending_count(), 1);
        let taken = engine.peek_pending_transactions();
        assert_eq!(engine.pending_count(), 1);
        engine.remove_included(&taken);
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn validate_proposal_rejects_non_sequential_index() {
        let engine = ConsensusEngine::new();
        let genesis = Block::placeholder_genesis();
        let mut bad = genesis.clone();
        bad.index = 5;
        assert!(!engine.validate_proposal(&bad, &genesis));
    }

    #[test]
    fn vote_history_counts_alternations_and_agreements() {
        let engine = ConsensusEngine::new();
        engine.register_validator("a", 70.0, "AXa");
        engine.register_validator("b", 30.0, "AXb");
        let genesis = Block::placeholder_genesis();

        // Round 1: both approve, outcome true.
        engine.start_proposal(genesis.clone(), "a");
        engine.record_vote("b", true);
        let outcome = engine.tally();
        engine.record_finalized_votes(outcome);
        engine.take_proposal();

        // Round 2: b flips to disapprove, outcome stays true on a's weight.
        engine.start_proposal(genesis, "a");
        engine.record_vote("b", false);
        let outcome = engine.tally();
        engine.record_finalized_votes(outcome);
        engine.take_proposal();

        let counts = engine.vote_history_counts();
        let b = counts.iter().find(|(id, ..)| id == "b").unwrap();
        assert_eq!(b.1, 2);
        assert_eq!(b.2, 1);
        assert_eq!(b.3, 1);
    }
}
