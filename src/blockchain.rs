// Thin re-export module: the block model, the ledger that owns chain state and
// the chain validation rules live in `blockchain/core.rs` and its submodules.

pub mod core;
pub use core::*;
