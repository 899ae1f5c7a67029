//! Proof-of-work gate for order submission.
//!
//! A solution is a nonce such that `SHA-256(challenge || hex(nonce))`, read as a
//! big-endian 256-bit integer, is strictly below `2^(256 - 4 * difficulty)`.
//! The nonce is hex-encoded from its minimal big-endian bytes, so nonce 0
//! encodes as the empty string and 256 as `"0100"`.

use chrono::{SecondsFormat, Utc};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{ArbError, Result};

pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const DEFAULT_MAX_ATTEMPTS: u64 = 1_000_000;
/// Each difficulty step is one hex digit (4 bits) of a 256-bit digest.
pub const MAX_DIFFICULTY: u32 = 64;
/// Attempts between cancellation checks in `solve_cancellable`.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleSolution {
    /// Winning nonce, in the exact form that was hashed.
    pub nonce: String,
    pub digest: [u8; 32],
    pub attempts: u64,
}

#[derive(Debug, Clone)]
pub struct PuzzleSolver {
    difficulty: u32,
    max_attempts: u64,
    target: BigUint,
}

impl PuzzleSolver {
    pub fn new(difficulty: u32, max_attempts: u64) -> Result<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ArbError::InvalidDifficulty(difficulty));
        }
        let shift = (256 - 4 * difficulty) as usize;
        Ok(Self {
            difficulty,
            max_attempts,
            target: BigUint::from(1u8) << shift,
        })
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    /// Searches nonces `0..max_attempts` in order and returns the first that
    /// meets the target. Exhausting the budget is an error; retrying is up to
    /// the caller.
    #[instrument(name = "proof_of_work.calculate", skip_all, fields(difficulty = self.difficulty))]
    pub fn solve(&self, challenge: &str) -> Result<PuzzleSolution> {
        self.search(challenge, || false)
    }

    /// Same search as `solve`, giving up with `Cancelled` once `shutdown`
    /// fires. Meant for the blocking pool, where the task cannot be aborted.
    #[instrument(name = "proof_of_work.calculate", skip_all, fields(difficulty = self.difficulty))]
    pub fn solve_cancellable(
        &self,
        challenge: &str,
        shutdown: &CancellationToken,
    ) -> Result<PuzzleSolution> {
        self.search(challenge, || shutdown.is_cancelled())
    }

    fn search(&self, challenge: &str, cancelled: impl Fn() -> bool) -> Result<PuzzleSolution> {
        for candidate in 0..self.max_attempts {
            if candidate % CANCEL_CHECK_INTERVAL == 0 && cancelled() {
                debug!(attempts = candidate, "PoW search cancelled");
                return Err(ArbError::Cancelled);
            }

            let nonce = nonce_hex(candidate);
            let digest = digest(challenge, &nonce);
            if self.meets_target(&digest) {
                debug!(attempts = candidate + 1, nonce = %nonce, "PoW solution found");
                return Ok(PuzzleSolution {
                    nonce,
                    digest,
                    attempts: candidate + 1,
                });
            }
        }

        warn!(attempts = self.max_attempts, "Failed to find PoW solution");
        Err(ArbError::PowExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Checks a solution the same way `solve` accepts one.
    pub fn verify(&self, challenge: &str, nonce: &str) -> bool {
        self.meets_target(&digest(challenge, nonce))
    }

    fn meets_target(&self, digest: &[u8; 32]) -> bool {
        BigUint::from_bytes_be(digest) < self.target
    }
}

/// Hex of the minimal big-endian byte representation of `n`.
pub fn nonce_hex(n: u64) -> String {
    let bytes = n.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    hex::encode(&bytes[first..])
}

pub fn digest(challenge: &str, nonce: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.finalize().into()
}

/// Fresh challenge for one trade attempt: hex of a nanosecond timestamp plus a
/// random id, so two attempts never share a challenge.
pub fn new_challenge() -> String {
    let seed = format!(
        "{}/{}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        uuid::Uuid::new_v4()
    );
    hex::encode(seed.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_hex_uses_minimal_bytes() {
        assert_eq!(nonce_hex(0), "");
        assert_eq!(nonce_hex(1), "01");
        assert_eq!(nonce_hex(255), "ff");
        assert_eq!(nonce_hex(256), "0100");
        assert_eq!(nonce_hex(999_999), "0f423f");
    }

    #[test]
    fn solution_digest_is_below_target() {
        let solver = PuzzleSolver::new(2, DEFAULT_MAX_ATTEMPTS).unwrap();
        let solution = solver.solve("deadbeef").unwrap();

        assert_eq!(solution.digest, digest("deadbeef", &solution.nonce));
        assert!(hex::encode(solution.digest).starts_with("00"));
        assert!(solver.verify("deadbeef", &solution.nonce));
    }

    #[test]
    fn default_difficulty_needs_four_zero_hex_digits() {
        let solver = PuzzleSolver::new(DEFAULT_DIFFICULTY, DEFAULT_MAX_ATTEMPTS).unwrap();
        let challenge = new_challenge();
        let solution = solver.solve(&challenge).unwrap();

        assert!(hex::encode(solution.digest).starts_with("0000"));
        assert!(solution.attempts <= DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn zero_difficulty_accepts_first_nonce() {
        let solver = PuzzleSolver::new(0, 10).unwrap();
        let solution = solver.solve("anything").unwrap();
        assert_eq!(solution.nonce, "");
        assert_eq!(solution.attempts, 1);
    }

    #[test]
    fn exhausted_budget_is_an_error() {
        let solver = PuzzleSolver::new(MAX_DIFFICULTY, 50).unwrap();
        match solver.solve("cafe") {
            Err(ArbError::PowExhausted { attempts }) => assert_eq!(attempts, 50),
            other => panic!("expected PowExhausted, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_search_stops_early() {
        let token = CancellationToken::new();
        token.cancel();
        let solver = PuzzleSolver::new(MAX_DIFFICULTY, u64::MAX).unwrap();
        assert!(matches!(
            solver.solve_cancellable("cafe", &token),
            Err(ArbError::Cancelled)
        ));
    }

    #[test]
    fn cancellable_search_matches_plain_search() {
        let solver = PuzzleSolver::new(2, DEFAULT_MAX_ATTEMPTS).unwrap();
        let plain = solver.solve("beef").unwrap();
        let cancellable = solver
            .solve_cancellable("beef", &CancellationToken::new())
            .unwrap();
        assert_eq!(plain, cancellable);
    }

    #[test]
    fn rejects_difficulty_beyond_digest_width() {
        assert!(matches!(
            PuzzleSolver::new(65, 10),
            Err(ArbError::InvalidDifficulty(65))
        ));
    }

    #[test]
    fn verify_matches_leading_zero_rule() {
        let solver = PuzzleSolver::new(1, 10).unwrap();
        for n in 0..64 {
            let nonce = nonce_hex(n);
            let expected = hex::encode(digest("abc", &nonce)).starts_with('0');
            assert_eq!(solver.verify("abc", &nonce), expected);
        }
    }

    #[test]
    fn challenges_are_unique() {
        assert_ne!(new_challenge(), new_challenge());
    }
}
