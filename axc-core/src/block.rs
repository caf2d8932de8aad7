use crate::hash::Hash32;
use crate::merkle::merkle_root;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_CLOCK_SKEW_SECS: u64 = 300;
const MIN_AI_VALIDATORS: usize = 3;
const MAX_RESPONSE_TIME_MS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiValidatorEntry {
    pub node_id: String,
    pub model_hash: String,
    pub signature: Vec<u8>,
    pub response_time_ms: u64,
    pub reputation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionSummary {
    pub node_id: String,
    pub solution_hash: Hash32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationSummary {
    pub validator_id: String,
    pub verdict: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsensusProof {
    pub challenge_id: String,
    pub solutions: Vec<SolutionSummary>,
    pub cross_validations: Vec<CrossValidationSummary>,
    pub consensus_timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: Hash32,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub merkle_root: Hash32,
    pub nonce: u64,
    pub validators: Vec<String>,
    pub ai_validators: Vec<AiValidatorEntry>,
    pub consensus_proof: ConsensusProof,
    pub hash: Hash32,
}

/// Everything in a block except its own hash — what the hash is computed over.
#[derive(Serialize)]
struct HeaderView<'a> {
    index: u64,
    previous_hash: Hash32,
    timestamp: u64,
    transactions: &'a [Transaction],
    merkle_root: Hash32,
    nonce: u64,
    validators: &'a [String],
    ai_validators: &'a [AiValidatorEntry],
    consensus_proof: &'a ConsensusProof,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block hash does not match its canonical header")]
    HashMismatch,
    #[error("merkle root does not match transaction list")]
    MerkleMismatch,
    #[error("previous_hash does not match the chain tip")]
    PreviousHashMismatch,
    #[error("index is not previous index + 1")]
    IndexNotSequential,
    #[error("timestamp is not strictly greater than the previous block's")]
    TimestampNotMonotonic,
    #[error("timestamp is too far in the future")]
    TimestampInFuture,
    #[error("fewer than {MIN_AI_VALIDATORS} ai_validators present")]
    TooFewAiValidators,
    #[error("an ai_validator's response_time_ms is not below {MAX_RESPONSE_TIME_MS}")]
    ResponseTimeTooSlow,
    #[error("consensus_proof.challenge_id is empty")]
    EmptyChallengeId,
    #[error("consensus_proof has no solutions")]
    NoSolutions,
    #[error("consensus_proof has no cross_validations")]
    NoCrossValidations,
}

impl Block {
    pub fn compute_hash(&self) -> Hash32 {
        let view = HeaderView {
            index: self.index,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            transactions: &self.transactions,
            merkle_root: self.merkle_root,
            nonce: self.nonce,
            validators: &self.validators,
            ai_validators: &self.ai_validators,
            consensus_proof: &self.consensus_proof,
        };
        let encoded = serde_json::to_vec(&view).expect("block header always serializes");
        Hash32::of(&encoded)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// The placeholder genesis every chain starts with, replaced at most
    /// once by the bootstrap manager.
    pub fn placeholder_genesis() -> Self {
        let mut block = Block {
            index: 0,
            previous_hash: Hash32::ZERO,
            timestamp: 0,
            transactions: Vec::new(),
            merkle_root: merkle_root(&[]),
            nonce: 0,
            validators: Vec::new(),
            ai_validators: Vec::new(),
            consensus_proof: ConsensusProof::default(),
            hash: Hash32::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Validates structure and, if `previous` is given, chain-continuity
    /// rules. `now` gates the future-timestamp check.
    pub fn is_valid(&self, previous: Option<&Block>, now: u64) -> Result<(), BlockError> {
        if self.hash != self.compute_hash() {
            return Err(BlockError::HashMismatch);
        }
        if self.merkle_root != merkle_root(&self.transactions) {
            return Err(BlockError::MerkleMismatch);
        }
        if let Some(prev) = previous {
            if self.previous_hash != prev.hash {
                return Err(BlockError::PreviousHashMismatch);
            }
            if self.index != prev.index + 1 {
                return Err(BlockError::IndexNotSequential);
            }
            if self.timestamp <= prev.timestamp {
                return Err(BlockError::TimestampNotMonotonic);
            }
        }
        if self.timestamp > now + MAX_CLOCK_SKEW_SECS {
            return Err(BlockError::TimestampInFuture);
        }
        if !self.is_genesis() {
            if self.ai_validators.len() < MIN_AI_VALIDATORS {
                return Err(BlockError::TooFewAiValidators);
            }
            if self
                .ai_validators
                .iter()
                .any(|v| v.response_time_ms >= MAX_RESPONSE_TIME_MS)
            {
                return Err(BlockError::ResponseTimeTooSlow);
            }
            if self.consensus_proof.challenge_id.is_empty() {
                return Err(BlockError::EmptyChallengeId);
            }
            if self.consensus_proof.solutions.is_empty() {
                return Err(BlockError::NoSolutions);
            }
            if self.consensus_proof.cross_validations.is_empty() {
                return Err(BlockError::NoCrossValidations);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;

    fn reward_tx() -> Transaction {
        Transaction {
            from: "AXpool".into(),
            to: "AXvalidator".into(),
            amount: 512,
            fee: 0,
            timestamp: 10,
            nonce: 0,
            tx_type: TransactionType::MiningReward,
            memo: None,
            signature: None,
        }
    }

    fn valid_non_genesis(previous: &Block) -> Block {
        let txs = vec![reward_tx()];
        let mut block = Block {
            index: previous.index + 1,
            previous_hash: previous.hash,
            timestamp: previous.timestamp + 10,
            merkle_root: merkle_root(&txs),
            transactions: txs,
            nonce: 0,
            validators: vec!["node-a".into(), "node-b".into()],
            ai_validators: vec![
                mk_validator("node-a", 50),
                mk_validator("node-b", 60),
                mk_validator("node-c", 70),
            ],
            consensus_proof: ConsensusProof {
                challenge_id: "chal-1".into(),
                solutions: vec![SolutionSummary {
                    node_id: "node-a".into(),
                    solution_hash: Hash32::of(b"solution"),
                }],
                cross_validations: vec![CrossValidationSummary {
                    validator_id: "node-b".into(),
                    verdict: "valid".into(),
                    confidence: 0.95,
                }],
                consensus_timestamp: previous.timestamp + 10,
            },
            hash: Hash32::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    fn mk_validator(id: &str, rt: u64) -> AiValidatorEntry {
        AiValidatorEntry {
            node_id: id.into(),
            model_hash: "hash".into(),
            signature: vec![1, 2, 3],
            response_time_ms: rt,
            reputation: 100.0,
        }
    }

    #[test]
    fn genesis_placeholder_is_self_consistent() {
        let g = Block::placeholder_genesis();
        assert!(g.is_valid(None, 0).is_ok());
    }

    #[test]
    fn non_genesis_requires_three_ai_validators() {
        let genesis = Block::placeholder_genesis();
        let mut block = valid_non_genesis(&genesis);
        block.ai_validators.truncate(2);
        block.hash = block.compute_hash();
        assert_eq!(
            block.is_valid(Some(&genesis), block.timestamp),
            Err(BlockError::TooFewAiValidators)
        );
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let genesis = Block::placeholder_genesis();
        let mut block = valid_non_genesis(&genesis);
        block.nonce += 1; // invalidate without recomputing hash
        assert_eq!(
            block.is_valid(Some(&genesis), block.timestamp),
            Err(BlockError::HashMismatch)
        );
    }

    #[test]
    fn non_monotonic_timestamp_is_rejected() {
        let genesis = Block::placeholder_genesis();
        let mut block = valid_non_genesis(&genesis);
        block.timestamp = genesis.timestamp;
        block.hash = block.compute_hash();
        assert_eq!(
            block.is_valid(Some(&genesis), block.timestamp + 100),
            Err(BlockError::TimestampNotMonotonic)
        );
    }

    #[test]
    fn valid_block_passes() {
        let genesis = Block::placeholder_genesis();
        let block = valid_non_genesis(&genesis);
        assert!(block.is_valid(Some(&genesis), block.timestamp).is_ok());
    }
}
