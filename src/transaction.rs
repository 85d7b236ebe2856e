//! Transaction type for ProofChain

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Sender used for the reward credited to a node when it mines a block.
pub const REWARD_SENDER: &str = "0";

/// A value transfer waiting in the pending pool or sealed in a block.
///
/// The amount is kept exactly as it was submitted (integer or float) so the
/// canonical hash of a block matches what other nodes compute for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: Number,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: impl Into<Number>) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }

    /// The mining reward for `recipient`.
    pub fn reward(recipient: impl Into<String>, amount: impl Into<Number>) -> Self {
        Self::new(REWARD_SENDER, recipient, amount)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }
}
