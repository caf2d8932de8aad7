pub mod node;
pub mod user;

pub use node::{
    NodeReputationStore, NodeScore, PenaltyKind, ReputationError, ReputationEvent,
    ReputationEventKind,
};
pub use user::{
    priority_level_for_score, priority_multiplier, transaction_fee_discount, UserReputation,
    UserReputationStore,
};
