use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_TIMEOUT_MS: u64 = 100;
const MAX_MATRIX_SIZE: u32 = 200;
const MIN_DIFFICULTY: u8 = 1;
const MAX_DIFFICULTY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeKind {
    MatrixOps,
    PatternRecognition,
    Optimization,
}

impl ChallengeKind {
    const ROTATION: [ChallengeKind; 3] = [
        ChallengeKind::MatrixOps,
        ChallengeKind::PatternRecognition,
        ChallengeKind::Optimization,
    ];

    fn at(index: u64) -> ChallengeKind {
        Self::ROTATION[(index % Self::ROTATION.len() as u64) as usize]
    }

    /// The scalar size parameter for this kind at a given difficulty,
    /// per the per-kind formulas.
    pub fn size_for_difficulty(self, difficulty: u8) -> u32 {
        let d = difficulty as u32;
        match self {
            ChallengeKind::MatrixOps => (50 + 10 * d).min(MAX_MATRIX_SIZE),
            ChallengeKind::PatternRecognition => 100 + 20 * d,
            ChallengeKind::Optimization => 10 + 5 * d,
        }
    }
}

/// Maps current active-validator count to a challenge difficulty: a busier
/// network gets harder challenges, clamped to the valid range.
pub fn difficulty_for_node_count(active: usize) -> u8 {
    let raw = 1 + (active / 5) as u64;
    raw.clamp(MIN_DIFFICULTY as u64, MAX_DIFFICULTY as u64) as u8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub kind: ChallengeKind,
    pub difficulty: u8,
    pub size: u32,
    pub timeout_ms: u64,
    /// SHA-256 of the canonical expected-solution encoding. Kept so the
    /// verifier never has to recompute the full solution itself.
    pub expected_solution_hash: String,
    pub seed: u64,
    pub created_at: u64,
}

/// Rotates challenge kind across successive calls so no single validator
/// specializes in one algorithm family.
pub struct ChallengeGenerator {
    counter: AtomicU64,
}

impl Default for ChallengeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeGenerator {
    pub fn new() -> Self {
        ChallengeGenerator {
            counter: AtomicU64::new(0),
        }
    }

    pub fn generate(&self, difficulty: u8, seed: u64, now: u64) -> Challenge {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        let kind = ChallengeKind::at(index);
        let difficulty = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        let size = kind.size_for_difficulty(difficulty);
        let expected = crate::solver::solve(kind, size, seed);
        let encoded = crate::solver::canonical_encode(&expected);
        let expected_solution_hash = hex::encode(Sha256::digest(&encoded));
        Challenge {
            id: format!("chal-{index}-{seed:x}"),
            kind,
            difficulty,
            size,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            expected_solution_hash,
            seed,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_rotates_across_calls() {
        let gen = ChallengeGenerator::new();
        let a = gen.generate(1, 1, 0);
        let b = gen.generate(1, 1, 0);
        let c = gen.generate(1, 1, 0);
        assert_eq!(a.kind, ChallengeKind::MatrixOps);
        assert_eq!(b.kind, ChallengeKind::PatternRecognition);
        assert_eq!(c.kind, ChallengeKind::Optimization);
    }

    #[test]
    fn matrix_size_caps_at_200() {
        assert_eq!(ChallengeKind::MatrixOps.size_for_difficulty(20), MAX_MATRIX_SIZE);
    }

    #[test]
    fn difficulty_scales_with_active_nodes_and_clamps() {
        assert_eq!(difficulty_for_node_count(0), 1);
        assert_eq!(difficulty_for_node_count(1000), MAX_DIFFICULTY);
    }

    #[test]
    fn same_seed_yields_same_expected_hash() {
        let gen = ChallengeGenerator::new();
        let a = gen.generate(3, 42, 0);
        let solution = crate::solver::solve(a.kind, a.size, a.seed);
        let encoded = crate::solver::canonical_encode(&solution);
        let hash = hex::encode(Sha256::digest(&encoded));
        assert_eq!(hash, a.expected_solution_hash);
    }
}
