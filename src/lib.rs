//! ProofChain - a proof-of-work ledger whose nodes agree by adopting the
//! longest valid chain among their peers
//!
//! # Architecture
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger that owns chain and pending pool, chain validation
//! - [`transaction`] - Transaction type and mining rewards
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work puzzle and cancellable proof search
//! - [`consensus`] - Longest-valid-chain resolution between peers
//!
//! ## Cryptography
//! - [`crypto`] - SHA-256 and canonical block serialization
//!
//! ## Networking & Integration
//! - [`network`] - Peer registry and HTTP chain fetching
//! - [`node`] - Node wiring and lifecycle
//! - [`api`] - REST API
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Networking & Integration
// ============================================================================
pub mod network;
pub mod node;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
