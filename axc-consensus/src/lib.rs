//! Multi-node consensus and quorum calculation (C12, C6): replaces the
//! PoW/PoS `HybridConsensus` this crate started from with the reputation-
//! weighted cadence the spec calls for.

pub mod engine;
pub mod quorum;

pub use engine::{
    placeholder_consensus_material, ConsensusEngine, Proposal, ValidatorInfo,
    BLOCK_CADENCE, CONSENSUS_THRESHOLD, MAX_TXS_PER_BLOCK, REWARD_DISTRIBUTOR_MIN_REPUTATION,
    VOTE_COLLECTION_TIMEOUT,
};
pub use quorum::{evaluate, required, QuorumError, QuorumStatus, MIN_NODES, QUORUM_FRACTION};
