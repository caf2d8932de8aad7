use crate::block::{Block, BlockError};
use crate::ledger::{Ledger, LedgerError};
use crate::transaction::{Transaction, TransactionType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three deterministic addresses minted once at genesis from fixed
/// labels ("LIQUIDITY_POOL", "BURN_ADDRESS", "DEVELOPER").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAddresses {
    pub liquidity_pool: String,
    pub burn: String,
    pub developer: String,
}

/// Three fractions of a collected fee, summing to 1.0 within 1e-3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeDistribution {
    pub burn: f64,
    pub developer: f64,
    pub liquidity: f64,
}

impl FeeDistribution {
    pub const INITIAL: FeeDistribution = FeeDistribution {
        burn: 0.60,
        developer: 0.30,
        liquidity: 0.10,
    };

    pub fn is_valid(&self) -> bool {
        self.burn >= 0.0
            && self.developer >= 0.0
            && self.liquidity >= 0.0
            && (self.burn + self.developer + self.liquidity - 1.0).abs() < 1e-3
    }
}

impl Default for FeeDistribution {
    fn default() -> Self {
        Self::INITIAL
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block {index} failed validation: {source}")]
    InvalidBlock { index: u64, source: BlockError },
    #[error("genesis has already been replaced once")]
    GenesisAlreadyReplaced,
    #[error("genesis is not replaceable: chain has more than one block or processed transactions")]
    GenesisNotReplaceable,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("no system addresses configured for a system transaction")]
    NoSystemAddresses,
}

/// An ordered vector of blocks starting with a genesis placeholder, plus the
/// balance ledger rebuilt by replaying it.
#[derive(Debug, Clone)]
pub struct Chain {
    pub blocks: Vec<Block>,
    pub ledger: Ledger,
    pub system_addresses: Option<SystemAddresses>,
    genesis_replaced: bool,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Chain {
            blocks: vec![Block::placeholder_genesis()],
            ledger: Ledger::default(),
            system_addresses: None,
            genesis_replaced: false,
        }
    }

    /// Reconstructs a chain from a persisted block list (crash recovery):
    /// replays every transaction to rebuild the ledger from scratch.
    pub fn from_blocks(blocks: Vec<Block>, system_addresses: Option<SystemAddresses>) -> Result<Self, ChainError> {
        let mut chain = Chain {
            blocks: Vec::new(),
            ledger: Ledger::default(),
            system_addresses,
            genesis_replaced: !blocks.is_empty(),
        };
        for block in blocks {
            for tx in &block.transactions {
                chain.process_transaction(tx)?;
            }
            chain.blocks.push(block);
        }
        if chain.blocks.is_empty() {
            chain.blocks.push(Block::placeholder_genesis());
            chain.genesis_replaced = false;
        }
        Ok(chain)
    }

    pub fn latest(&self) -> &Block {
        self.blocks.last().expect("chain always has at least a genesis block")
    }

    pub fn height(&self) -> u64 {
        self.latest().index
    }

    /// Validates `block` against the tip, applies its transactions, and
    /// appends it. Re-adding the current tip's exact hash is a no-op.
    pub fn add_block(&mut self, block: Block, now: u64) -> Result<(), ChainError> {
        let tip = self.latest();
        if block.hash == tip.hash && block.index == tip.index {
            return Ok(());
        }
        block
            .is_valid(Some(tip), now)
            .map_err(|source| ChainError::InvalidBlock {
                index: block.index,
                source,
            })?;
        for tx in &block.transactions {
            self.process_transaction(tx)?;
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Dispatches ledger effects by transaction type.
    pub fn process_transaction(&mut self, tx: &Transaction) -> Result<(), ChainError> {
        match tx.tx_type {
            TransactionType::Transfer => {
                self.ledger.debit(&tx.from, tx.amount + tx.fee)?;
                self.ledger.credit(&tx.to, tx.amount)?;
            }
            TransactionType::GenesisInit => {
                self.ledger.credit(&tx.to, tx.amount)?;
            }
            TransactionType::MiningReward => {
                let pool = self
                    .system_addresses
                    .as_ref()
                    .ok_or(ChainError::NoSystemAddresses)?
                    .liquidity_pool
                    .clone();
                if self.ledger.balance(&pool) == 0 {
                    tracing::warn!(to = %tx.to, "mining reward skipped: liquidity pool is empty");
                    return Ok(());
                }
                self.ledger.debit(&pool, tx.amount)?;
                self.ledger.credit(&tx.to, tx.amount)?;
            }
            TransactionType::NetworkMaintenance
            | TransactionType::TokenBurn
            | TransactionType::LiquidityPool
            | TransactionType::Faucet => {
                self.ledger.credit(&tx.to, tx.amount)?;
            }
        }
        Ok(())
    }

    /// Splits a collected fee into three ledger credits per `distribution`.
    /// The liquidity pool absorbs any rounding remainder so the three
    /// credits always sum exactly to `fee`.
    pub fn distribute_transaction_fee(
        &mut self,
        fee: u64,
        distribution: &FeeDistribution,
    ) -> Result<(), ChainError> {
        let sys = self
            .system_addresses
            .as_ref()
            .ok_or(ChainError::NoSystemAddresses)?
            .clone();
        let burn_amount = (fee as f64 * distribution.burn).round() as u64;
        let dev_amount = (fee as f64 * distribution.developer).round() as u64;
        let pool_amount = fee.saturating_sub(burn_amount).saturating_sub(dev_amount);

        self.ledger.credit(&sys.burn, burn_amount)?;
        self.ledger.credit(&sys.developer, dev_amount)?;
        self.ledger.credit(&sys.liquidity_pool, pool_amount)?;
        Ok(())
    }

    /// Replaces the placeholder genesis exactly once, provided nothing has
    /// been processed yet.
    pub fn replace_genesis(&mut self, block: Block, system_addresses: SystemAddresses) -> Result<(), ChainError> {
        if self.genesis_replaced {
            return Err(ChainError::GenesisAlreadyReplaced);
        }
        if self.blocks.len() != 1 || !self.ledger.balances.is_empty() {
            return Err(ChainError::GenesisNotReplaceable);
        }
        self.system_addresses = Some(system_addresses);
        for tx in &block.transactions {
            self.process_transaction(tx)?;
        }
        self.blocks[0] = block;
        self.genesis_replaced = true;
        Ok(())
    }

    pub fn is_genesis_replaced(&self) -> bool {
        self.genesis_replaced
    }

    /// Full chain-continuity check: every block recomputes its own hash and
    /// links to its predecessor.
    pub fn is_valid(&self, now: u64) -> bool {
        for i in 1..self.blocks.len() {
            if self.blocks[i].is_valid(Some(&self.blocks[i - 1]), now).is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::merkle_root;

    fn system_addresses() -> SystemAddresses {
        SystemAddresses {
            liquidity_pool: "AXpool".into(),
            burn: "AXburn".into(),
            developer: "AXdev".into(),
        }
    }

    fn genesis_init_block(pool: &str, amount: u64) -> Block {
        let tx = Transaction {
            from: String::new(),
            to: pool.to_string(),
            amount,
            fee: 0,
            timestamp: 1,
            nonce: 0,
            tx_type: TransactionType::GenesisInit,
            memo: None,
            signature: None,
        };
        let txs = vec![tx];
        let mut block = Block {
            index: 0,
            previous_hash: crate::hash::Hash32::ZERO,
            timestamp: 1,
            merkle_root: merkle_root(&txs),
            transactions: txs,
            nonce: 0,
            validators: vec!["pioneer-a".into(), "pioneer-b".into()],
            ai_validators: vec![],
            consensus_proof: Default::default(),
            hash: crate::hash::Hash32::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn replace_genesis_applies_once() {
        let mut chain = Chain::new();
        let block = genesis_init_block("AXpool", 1_024_000_000);
        chain.replace_genesis(block, system_addresses()).unwrap();
        assert_eq!(chain.ledger.balance("AXpool"), 1_024_000_000);
        assert!(chain.is_genesis_replaced());

        let second = genesis_init_block("AXpool", 1);
        let err = chain.replace_genesis(second, system_addresses()).unwrap_err();
        assert!(matches!(err, ChainError::GenesisAlreadyReplaced));
    }

    #[test]
    fn fee_distribution_sums_to_fee_exactly() {
        let mut chain = Chain::new();
        chain.system_addresses = Some(system_addresses());
        chain.distribute_transaction_fee(101, &FeeDistribution::INITIAL).unwrap();
        let total = chain.ledger.balance("AXburn") + chain.ledger.balance("AXdev") + chain.ledger.balance("AXpool");
        assert_eq!(total, 101);
    }

    #[test]
    fn mining_reward_is_noop_when_pool_empty() {
        let mut chain = Chain::new();
        chain.system_addresses = Some(system_addresses());
        let tx = Transaction {
            from: String::new(),
            to: "AXvalidator".into(),
            amount: 512,
            fee: 0,
            timestamp: 2,
            nonce: 0,
            tx_type: TransactionType::MiningReward,
            memo: None,
            signature: None,
        };
        chain.process_transaction(&tx).unwrap();
        assert_eq!(chain.ledger.balance("AXvalidator"), 0);
    }

    #[test]
    fn adding_same_tip_twice_is_a_noop() {
        let mut chain = Chain::new();
        let block = genesis_init_block("AXpool", 10);
        chain.replace_genesis(block.clone(), system_addresses()).unwrap();

        // constructing a second block on top, then re-adding it twice
        let txs = vec![];
        let mut next = Block {
            index: 1,
            previous_hash: chain.latest().hash,
            timestamp: chain.latest().timestamp + 10,
            merkle_root: merkle_root(&txs),
            transactions: txs,
            nonce: 0,
            validators: vec![],
            ai_validators: vec![
                super::super::block::AiValidatorEntry {
                    node_id: "a".into(),
                    model_hash: "h".into(),
                    signature: vec![],
                    response_time_ms: 10,
                    reputation: 100.0,
                },
                super::super::block::AiValidatorEntry {
                    node_id: "b".into(),
                    model_hash: "h".into(),
                    signature: vec![],
                    response_time_ms: 10,
                    reputation: 100.0,
                },
                super::super::block::AiValidatorEntry {
                    node_id: "c".into(),
                    model_hash: "h".into(),
                    signature: vec![],
                    response_time_ms: 10,
                    reputation: 100.0,
                },
            ],
            consensus_proof: crate::block::ConsensusProof {
                challenge_id: "c1".into(),
                solutions: vec![crate::block::SolutionSummary {
                    node_id: "a".into(),
                    solution_hash: crate::hash::Hash32::of(b"s"),
                }],
                cross_validations: vec![crate::block::CrossValidationSummary {
                    validator_id: "b".into(),
                    verdict: "valid".into(),
                    confidence: 0.9,
                }],
                consensus_timestamp: chain.latest().timestamp + 10,
            },
            hash: crate::hash::Hash32::ZERO,
        };
        next.hash = next.compute_hash();

        let now = next.timestamp;
        chain.add_block(next.clone(), now).unwrap();
        chain.add_block(next, now).unwrap();
        assert_eq!(chain.blocks.len(), 2);
    }
}
