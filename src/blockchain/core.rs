// core.rs splits responsibilities into submodules: the block model, the ledger
// state and the chain validation rules shared with consensus.
pub mod chain;
pub mod state;
pub mod validation;

pub use chain::*;
pub use state::*;
pub use validation::*;
