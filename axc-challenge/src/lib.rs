pub mod challenge;
pub mod cross_validation;
pub mod processor;
pub mod solver;

pub use challenge::{difficulty_for_node_count, Challenge, ChallengeGenerator, ChallengeKind};
pub use cross_validation::{
    ConsensusVerdict, CrossValidator, ValidationEntry, ValidationOutcome, ValidatorCandidate,
};
pub use processor::{ChallengeProcessor, ProcessingResult, ProcessorError};
