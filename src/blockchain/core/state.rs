use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::miner::CancelFlag;
use crate::transaction::Transaction;
use parking_lot::{Mutex, RwLock};
use serde_json::Number;
use tracing::{debug, info};

use super::chain::{Block, Genesis};

/// Chain and pending pool, always locked together so that sealing a block
/// and clearing the pool happen in one step.
#[derive(Debug, Default)]
struct LedgerState {
    blocks: Vec<Block>,
    mempool: Mempool,
    /// Bumped on every seal and every replacement.
    generation: u64,
}

impl LedgerState {
    fn last_block(&self) -> Result<&Block, ChainError> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    fn seal(&mut self, proof: u64, previous_hash: Option<String>) -> Result<Block, ChainError> {
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => self.last_block()?.hash()?,
        };
        let index = self.blocks.len() as u64 + 1;
        let block = Block::new(index, self.mempool.take_all(), proof, previous_hash);
        self.blocks.push(block.clone());
        self.generation += 1;
        Ok(block)
    }
}

/// One mining attempt against a fixed chain tip.
///
/// Obtained from [`Ledger::begin_search`] and consumed by
/// [`Ledger::seal_search`]. Replacing the chain raises the cancel flag.
#[derive(Debug)]
pub struct ProofSearch {
    previous: Block,
    generation: u64,
    cancel: CancelFlag,
}

impl ProofSearch {
    pub fn previous_block(&self) -> &Block {
        &self.previous
    }

    pub fn previous_proof(&self) -> u64 {
        self.previous.proof
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
}

impl Drop for ProofSearch {
    // An abandoned search must not keep burning CPU.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sole owner of the chain and the pending pool.
///
/// Every mutation takes the write lock, so at most one mutator is active at a
/// time. Readers get consistent clones.
#[derive(Debug, Default)]
pub struct Ledger {
    state: RwLock<LedgerState>,
    searches: Mutex<Vec<CancelFlag>>,
}

impl Ledger {
    /// A ledger whose chain starts with a freshly sealed genesis block.
    pub fn new(genesis: Genesis) -> Self {
        let block = Block::new(1, Vec::new(), genesis.proof, genesis.previous_hash);
        info!(proof = block.proof, previous_hash = %block.previous_hash, "genesis block sealed");
        Self {
            state: RwLock::new(LedgerState {
                blocks: vec![block],
                mempool: Mempool::new(),
                generation: 1,
            }),
            searches: Mutex::default(),
        }
    }

    /// A ledger with no genesis yet. Everything except sealing the genesis
    /// block fails with [`ChainError::EmptyChain`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Queues a transaction and returns the index of the block it will be
    /// sealed into.
    pub fn submit_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Number>,
    ) -> Result<u64, ChainError> {
        self.add_transaction(Transaction::new(sender, recipient, amount))
    }

    pub fn add_transaction(&self, tx: Transaction) -> Result<u64, ChainError> {
        let mut state = self.state.write();
        let next_index = state.last_block()?.index + 1;
        debug!(sender = %tx.sender, recipient = %tx.recipient, next_index, "transaction queued");
        state.mempool.add_transaction(tx);
        Ok(next_index)
    }

    /// Seals the pending pool into a new block.
    ///
    /// `previous_hash` defaults to the canonical hash of the last block. On an
    /// empty chain an explicit previous hash seeds the genesis block.
    pub fn seal_block(&self, proof: u64, previous_hash: Option<String>) -> Result<Block, ChainError> {
        let block = self.state.write().seal(proof, previous_hash)?;
        info!(index = block.index, proof, transactions = block.transactions.len(), "block sealed");
        Ok(block)
    }

    pub fn last_block(&self) -> Result<Block, ChainError> {
        self.state.read().last_block().cloned()
    }

    /// The block at 1-based `index`.
    pub fn block(&self, index: u64) -> Result<Block, ChainError> {
        let state = self.state.read();
        index
            .checked_sub(1)
            .and_then(|i| state.blocks.get(i as usize))
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("block {}", index)))
    }

    /// Snapshot of the whole chain.
    pub fn chain(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().mempool.get_all_transactions()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Captures the current tip for a proof search and registers its cancel
    /// flag.
    pub fn begin_search(&self) -> Result<ProofSearch, ChainError> {
        let state = self.state.read();
        let search = ProofSearch {
            previous: state.last_block()?.clone(),
            generation: state.generation,
            cancel: CancelFlag::new(),
        };
        let mut searches = self.searches.lock();
        searches.retain(|flag| !flag.is_cancelled());
        searches.push(search.cancel.clone());
        Ok(search)
    }

    /// Seals the block a search was started for, crediting `reward` first.
    ///
    /// Fails with [`ChainError::StaleChain`] when the chain was sealed or
    /// replaced since [`begin_search`](Self::begin_search); nothing is
    /// modified in that case.
    pub fn seal_search(
        &self,
        search: ProofSearch,
        proof: u64,
        reward: Option<Transaction>,
    ) -> Result<Block, ChainError> {
        self.searches.lock().retain(|flag| !flag.same_as(&search.cancel));

        let mut state = self.state.write();
        if search.cancel.is_cancelled() || state.generation != search.generation {
            debug!(
                started_at = search.generation,
                now = state.generation,
                "discarding proof found against a stale chain"
            );
            return Err(ChainError::StaleChain);
        }
        let previous_hash = search.previous.hash()?;
        if let Some(tx) = reward {
            state.mempool.add_transaction(tx);
        }
        let block = state.seal(proof, Some(previous_hash))?;
        drop(state);

        info!(index = block.index, proof, transactions = block.transactions.len(), "block mined");
        Ok(block)
    }

    /// Swaps in `candidate` when it is strictly longer than the current chain.
    ///
    /// The caller is responsible for having validated the candidate. Raises
    /// the cancel flag of every in-flight search. The pending pool is kept.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        let mut state = self.state.write();
        if candidate.len() <= state.blocks.len() {
            debug!(
                local = state.blocks.len(),
                candidate = candidate.len(),
                "candidate chain is not longer, keeping local chain"
            );
            return false;
        }
        let old_len = state.blocks.len();
        state.blocks = candidate;
        state.generation += 1;

        let mut searches = self.searches.lock();
        for flag in searches.drain(..) {
            flag.cancel();
        }
        info!(old_len, new_len = state.blocks.len(), "chain replaced");
        true
    }
}
