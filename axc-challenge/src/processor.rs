use crate::challenge::Challenge;
use crate::solver::{canonical_encode, solve};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

const ROLLING_WINDOW: usize = 100;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("computation exceeded {0}ms timeout")]
    Timeout(u64),
    #[error("algorithm failed: {0}")]
    AlgorithmError(String),
    #[error(transparent)]
    Crypto(#[from] axc_crypto::CryptoError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub solution_hash: Option<String>,
    pub signature: Option<Vec<u8>>,
    pub computation_time_ms: u64,
    pub timeout_exceeded: bool,
    pub error: Option<String>,
}

/// Runs a challenge's reference algorithm on a separate task, discarding
/// results that land past the challenge's timeout, and signs the solution
/// that does land in time.
pub struct ChallengeProcessor {
    node_id: String,
    secret_key: Vec<u8>,
    processing_times: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl ChallengeProcessor {
    pub fn new(node_id: String, secret_key: Vec<u8>) -> Self {
        ChallengeProcessor {
            node_id,
            secret_key,
            processing_times: Mutex::new(HashMap::new()),
        }
    }

    pub async fn process(&self, challenge: &Challenge, now: u64) -> ProcessingResult {
        let kind = challenge.kind;
        let size = challenge.size;
        let seed = challenge.seed;
        let deadline = Duration::from_millis(challenge.timeout_ms);

        let compute = tokio::task::spawn_blocking(move || solve(kind, size, seed));
        let start = Instant::now();

        match tokio::time::timeout(deadline, compute).await {
            Ok(Ok(solution)) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let encoded = canonical_encode(&solution);
                let solution_hash = hex::encode(Sha256::digest(&encoded));
                let message = format!("{}:{}:{}", self.node_id, now, solution_hash);
                match axc_crypto::sign(&self.secret_key, message.as_bytes()) {
                    Ok(signature) => {
                        self.record_processing_time(elapsed_ms);
                        ProcessingResult {
                            success: true,
                            solution_hash: Some(solution_hash),
                            signature: Some(signature),
                            computation_time_ms: elapsed_ms,
                            timeout_exceeded: false,
                            error: None,
                        }
                    }
                    Err(err) => ProcessingResult {
                        success: false,
                        solution_hash: None,
                        signature: None,
                        computation_time_ms: elapsed_ms,
                        timeout_exceeded: false,
                        error: Some(err.to_string()),
                    },
                }
            }
            Ok(Err(join_err)) => ProcessingResult {
                success: false,
                solution_hash: None,
                signature: None,
                computation_time_ms: start.elapsed().as_millis() as u64,
                timeout_exceeded: false,
                error: Some(format!("algorithm task panicked: {join_err}")),
            },
            Err(_) => {
                tracing::warn!(challenge_id = %challenge.id, "challenge processing timed out");
                ProcessingResult {
                    success: false,
                    solution_hash: None,
                    signature: None,
                    computation_time_ms: challenge.timeout_ms,
                    timeout_exceeded: true,
                    error: Some("timeout".to_string()),
                }
            }
        }
    }

    fn record_processing_time(&self, elapsed_ms: u64) {
        let mut times = self.processing_times.lock();
        let samples = times.entry(self.node_id.clone()).or_default();
        samples.push_back(elapsed_ms);
        if samples.len() > ROLLING_WINDOW {
            samples.pop_front();
        }
    }

    pub fn average_processing_time_ms(&self) -> Option<f64> {
        let times = self.processing_times.lock();
        let samples = times.get(&self.node_id)?;
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<u64>() as f64 / samples.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeGenerator;

    #[tokio::test]
    async fn processes_a_challenge_and_signs_the_solution() {
        let keys = axc_crypto::generate_keypair();
        let processor = ChallengeProcessor::new("node-a".to_string(), keys.secret_key.clone());
        let gen = ChallengeGenerator::new();
        let challenge = gen.generate(1, 1, 0);

        let result = processor.process(&challenge, 0).await;
        assert!(result.success);
        assert_eq!(result.solution_hash.as_deref(), Some(challenge.expected_solution_hash.as_str()));
        let signature = result.signature.unwrap();
        let message = format!("node-a:0:{}", challenge.expected_solution_hash);
        assert!(axc_crypto::verify(&keys.public_key, &signature, message.as_bytes()));
    }

    #[tokio::test]
    async fn tracks_rolling_average_processing_time() {
        let keys = axc_crypto::generate_keypair();
        let processor = ChallengeProcessor::new("node-a".to_string(), keys.secret_key);
        let gen = ChallengeGenerator::new();
        for _ in 0..3 {
            let challenge = gen.generate(1, 1, 0);
            processor.process(&challenge, 0).await;
        }
        assert!(processor.average_processing_time_ms().is_some());
    }
}
