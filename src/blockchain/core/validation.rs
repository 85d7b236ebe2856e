use crate::error::ChainError;
use crate::miner::ProofOfWork;

use super::chain::Block;

/// Checks the linkage rules of a whole chain, reporting the first violation.
///
/// Every block's index must equal its 1-based position. Apart from that the
/// genesis block is trusted as-is. Every later block must carry the
/// canonical hash of its predecessor and a proof that satisfies the puzzle
/// against the predecessor's proof.
pub fn check_chain(chain: &[Block], pow: &ProofOfWork) -> Result<(), ChainError> {
    if chain.is_empty() {
        return Err(ChainError::InvalidChain("chain is empty".to_string()));
    }

    for (position, block) in chain.iter().enumerate() {
        if block.index != position as u64 + 1 {
            return Err(ChainError::InvalidChain(format!(
                "block at position {} carries index {}",
                position + 1,
                block.index
            )));
        }
    }

    for pair in chain.windows(2) {
        let (previous, block) = (&pair[0], &pair[1]);

        let expected_hash = previous.hash()?;
        if block.previous_hash != expected_hash {
            return Err(ChainError::InvalidChain(format!(
                "block {} links to {}, expected {}",
                block.index, block.previous_hash, expected_hash
            )));
        }

        if !pow.verify(previous.proof, block.proof) {
            return Err(ChainError::InvalidChain(format!(
                "block {} proof {} does not solve the puzzle after proof {}",
                block.index, block.proof, previous.proof
            )));
        }
    }
    Ok(())
}

pub fn is_valid_chain(chain: &[Block], pow: &ProofOfWork) -> bool {
    check_chain(chain, pow).is_ok()
}
