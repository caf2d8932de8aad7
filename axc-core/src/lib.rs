pub mod block;
pub mod chain;
pub mod decimal;
pub mod hash;
pub mod ledger;
pub mod merkle;
pub mod transaction;

pub use block::{
    AiValidatorEntry, Block, BlockError, ConsensusProof, CrossValidationSummary, SolutionSummary,
};
pub use chain::{Chain, ChainError, FeeDistribution, SystemAddresses};
pub use hash::{Hash32, HashParseError};
pub use ledger::{Ledger, LedgerError};
pub use merkle::merkle_root;
pub use transaction::{Transaction, TransactionType};

pub fn now_ts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs()
}
