//! Error types for ProofChain

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Caller supplied a missing or malformed value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The chain has no genesis block yet. This is a startup-ordering bug.
    #[error("Precondition violated: the chain is empty, genesis must be seeded first")]
    EmptyChain,
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),
    #[error("Invalid peer response: {0}")]
    InvalidPeerResponse(String),
    #[error("Invalid chain: {0}")]
    InvalidChain(String),
    /// The chain changed underneath a proof search; its result was discarded.
    #[error("Chain changed while mining, proof discarded")]
    StaleChain,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ChainError::InvalidPeerResponse(err.to_string())
        } else {
            ChainError::PeerUnreachable(err.to_string())
        }
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
