//! Proof-of-work puzzle binding each block to its predecessor
//!
//! A proof `p` is valid after a previous proof `q` when the SHA-256 hex digest
//! of the decimal text of `q` followed by the decimal text of `p` starts with
//! `difficulty` zero characters. Finding one costs about `16^difficulty`
//! hashes, checking one costs a single hash.

use crate::crypto::sha256_hex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default number of leading zero hex characters.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// How many candidates are tried between two looks at the cancel flag.
const CANCEL_CHECK_INTERVAL: u64 = 4096;

/// Shared signal telling an in-flight proof search to give up.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// True when both handles refer to the same search.
    pub fn same_as(&self, other: &CancelFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Checks the puzzle predicate between two consecutive proofs.
    pub fn verify(&self, previous_proof: u64, candidate: u64) -> bool {
        let digest = sha256_hex(format!("{}{}", previous_proof, candidate));
        digest.len() >= self.difficulty
            && digest.bytes().take(self.difficulty).all(|b| b == b'0')
    }

    /// Smallest proof that satisfies the puzzle after `previous_proof`, or
    /// `None` when no `u64` does.
    pub fn solve(&self, previous_proof: u64) -> Option<u64> {
        // A flag nobody else holds is never raised.
        self.solve_cancellable(previous_proof, &CancelFlag::new())
    }

    /// Same search as [`solve`](Self::solve), abandoned with `None` once
    /// `cancel` is raised.
    pub fn solve_cancellable(&self, previous_proof: u64, cancel: &CancelFlag) -> Option<u64> {
        let mut candidate = 0u64;
        loop {
            if candidate % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                tracing::debug!(previous_proof, tried = candidate, "proof search cancelled");
                return None;
            }
            if self.verify(previous_proof, candidate) {
                return Some(candidate);
            }
            candidate = candidate.checked_add(1)?;
        }
    }
}
