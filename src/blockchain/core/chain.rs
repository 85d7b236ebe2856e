use crate::crypto::canonical_hash;
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Proof seeded into the genesis block.
pub const GENESIS_PROOF: u64 = 100;
/// Placeholder previous hash of the genesis block, which has no predecessor.
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// A sealed block.
///
/// `index` is 1-based and equals the block's position in the chain.
/// `timestamp` is seconds since the Unix epoch at sealing time. It is kept
/// as the number a peer sent, integer or float, so re-hashing a received
/// block reproduces the sender's digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: Number,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// Builds a block stamped with the current time.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: String,
    ) -> Self {
        Block {
            index,
            timestamp: now_timestamp(),
            transactions,
            proof,
            previous_hash,
        }
    }

    /// Hex SHA-256 of the canonical serialization of this block.
    pub fn hash(&self) -> Result<String, ChainError> {
        canonical_hash(self)
    }
}

/// Fixed parameters of the first block. All peers must agree on them for
/// their chains to be comparable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub proof: u64,
    pub previous_hash: String,
}

impl Default for Genesis {
    fn default() -> Self {
        Self {
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        }
    }
}

fn now_timestamp() -> Number {
    let micros = chrono::Utc::now().timestamp_micros();
    Number::from_f64(micros as f64 / 1_000_000.0).unwrap_or_else(|| Number::from(micros / 1_000_000))
}
