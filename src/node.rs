use crate::blockchain::{Block, Ledger};
use crate::config::Config;
use crate::consensus::{ChainSource, ConsensusResolver, Resolution};
use crate::error::ChainError;
use crate::miner::ProofOfWork;
use crate::network::{parse_peer_address, HttpChainSource, PeerRegistry};
use crate::transaction::Transaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Syncing,
    Ready,
}

/// One ledger node: the chain, its peers, and the operations the HTTP layer
/// exposes on top of them.
pub struct Node {
    pub config: Config,
    pub node_id: String,
    pub ledger: Arc<Ledger>,
    pub peers: Arc<PeerRegistry>,
    pub state: Arc<RwLock<NodeState>>,
    resolver: ConsensusResolver<Arc<dyn ChainSource>>,
    /// Serializes "read tip, search, seal".
    mining_lock: Mutex<()>,
    blocks_mined: AtomicU64,
}

impl Node {
    /// Builds a node that talks to its peers over HTTP.
    pub fn new(config: Config) -> Result<Self, ChainError> {
        let source = HttpChainSource::new(config.network.peer_timeout())?;
        Ok(Self::with_source(config, Arc::new(source)))
    }

    /// Builds a node that fetches peer chains from `source`.
    pub fn with_source(config: Config, source: Arc<dyn ChainSource>) -> Self {
        let node_id = config
            .miner
            .node_id
            .clone()
            .unwrap_or_else(|| hex::encode(rand::random::<[u8; 16]>()));
        let ledger = Arc::new(Ledger::new(config.genesis.genesis()));
        let resolver = ConsensusResolver::new(config.miner.proof_of_work(), source)
            .with_peer_timeout(config.network.peer_timeout());

        Self {
            config,
            node_id,
            ledger,
            peers: Arc::new(PeerRegistry::new()),
            state: Arc::new(RwLock::new(NodeState::Booting)),
            resolver,
            mining_lock: Mutex::new(()),
            blocks_mined: AtomicU64::new(0),
        }
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        self.resolver.proof_of_work()
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    pub fn chain(&self) -> Vec<Block> {
        self.ledger.chain()
    }

    pub fn submit_transaction(&self, tx: Transaction) -> Result<u64, ChainError> {
        self.ledger.add_transaction(tx)
    }

    /// Finds a proof for the next block, credits this node's reward and seals.
    ///
    /// Fails with [`ChainError::StaleChain`] if the chain is replaced while the
    /// search runs; nothing is sealed then.
    pub async fn mine(&self) -> Result<Block, ChainError> {
        let _guard = self.mining_lock.lock().await;

        let search = self.ledger.begin_search()?;
        let pow = *self.proof_of_work();
        let previous_proof = search.previous_proof();
        let cancel = search.cancel_flag();
        let started = Instant::now();

        let proof = tokio::task::spawn_blocking(move || pow.solve_cancellable(previous_proof, &cancel))
            .await
            .map_err(|e| ChainError::Internal(format!("proof search task failed: {}", e)))?
            .ok_or(ChainError::StaleChain)?;

        let reward = Transaction::reward(self.node_id.clone(), self.config.miner.reward);
        let block = self.ledger.seal_search(search, proof, Some(reward))?;
        self.blocks_mined.fetch_add(1, Ordering::SeqCst);

        info!(
            index = block.index,
            proof,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "new block forged"
        );
        Ok(block)
    }

    /// Registers a batch of peers. Nothing is registered if any address in
    /// the batch is invalid. Returns every known peer afterwards.
    pub fn register_peers<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<String>, ChainError> {
        if addresses.is_empty() {
            return Err(ChainError::InvalidInput("Please supply a valid list of nodes".to_string()));
        }
        for address in addresses {
            parse_peer_address(address.as_ref())?;
        }
        for address in addresses {
            self.peers.register(address.as_ref())?;
        }
        Ok(self.peers.list())
    }

    /// Runs one round of conflict resolution and applies its outcome.
    pub async fn resolve(&self) -> Resolution {
        let peers = self.peers.list();
        let local = self.ledger.chain();

        match self.resolver.resolve(&peers, &local).await {
            Resolution::Replaced(chain) => {
                if self.ledger.replace_chain(chain.clone()) {
                    Resolution::Replaced(chain)
                } else {
                    // The local chain grew past the candidate while peers were queried.
                    Resolution::Unchanged
                }
            }
            Resolution::Unchanged => Resolution::Unchanged,
        }
    }

    /// Registers bootstrap peers, catches up with them once and serves the API.
    pub async fn start(self: Arc<Self>) -> Result<(), Box<dyn std::error::Error>> {
        info!(node_id = %self.node_id, difficulty = self.proof_of_work().difficulty(), "starting ProofChain node");

        // The chain must be seeded before anything is served.
        let genesis = self.ledger.last_block()?;
        info!(proof = genesis.proof, previous_hash = %genesis.previous_hash, "genesis block seeded");

        for peer in &self.config.network.bootstrap_peers {
            if let Err(e) = self.peers.register(peer) {
                warn!(peer = %peer, error = %e, "ignoring bootstrap peer");
            }
        }

        *self.state.write().await = NodeState::Syncing;
        if !self.peers.is_empty() {
            let resolution = self.resolve().await;
            info!(replaced = resolution.is_replaced(), length = self.ledger.len(), "initial sync finished");
        }
        *self.state.write().await = NodeState::Ready;

        let api_port = self.config.network.api_port;
        let node = self.clone();
        let api_task = tokio::spawn(async move {
            if let Err(e) = Node::start_api(node, api_port).await {
                error!("API server failed: {}", e);
            }
        });

        // Node main loop - health logging
        loop {
            if api_task.is_finished() {
                return Err("API server stopped".into());
            }
            info!(
                height = self.ledger.len(),
                pending = self.ledger.pending_transactions().len(),
                peers = self.peers.len(),
                "node running"
            );
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    #[cfg(feature = "api")]
    async fn start_api(node: Arc<Self>, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        crate::api::run_api_server(node, port).await
    }

    #[cfg(not(feature = "api"))]
    async fn start_api(_node: Arc<Self>, _port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("API feature not enabled in this build".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ChainSnapshot;
    use crate::error::Result;
    use async_trait::async_trait;

    struct FixedSource(Option<Vec<Block>>);

    #[async_trait]
    impl ChainSource for FixedSource {
        async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot> {
            self.0
                .clone()
                .map(ChainSnapshot::new)
                .ok_or_else(|| ChainError::PeerUnreachable(peer.to_string()))
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.miner.difficulty = 2;
        config.miner.node_id = Some("node-under-test".to_string());
        config
    }

    fn node_with(source: FixedSource) -> Node {
        Node::with_source(test_config(), Arc::new(source))
    }

    #[tokio::test]
    async fn test_mine_credits_reward_and_links() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let node = node_with(FixedSource(None));
            node.submit_transaction(Transaction::new("alice", "bob", 3u64)).unwrap();

            let block = node.mine().await.unwrap();
            assert_eq!(block.index, 2);
            assert_eq!(block.transactions.len(), 2);
            let reward = block.transactions.last().unwrap();
            assert!(reward.is_reward());
            assert_eq!(reward.recipient, "node-under-test");
            assert_eq!(reward.amount.as_u64(), Some(1));
            assert!(node.proof_of_work().verify(100, block.proof));
            assert_eq!(node.blocks_mined(), 1);
            assert!(node.ledger.pending_transactions().is_empty());
        })
        .await
        .expect("test_mine_credits_reward_and_links timed out");
    }

    #[tokio::test]
    async fn test_concurrent_mining_produces_distinct_indexes() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let node = Arc::new(node_with(FixedSource(None)));
            let handles: Vec<_> = (0..3)
                .map(|_| {
                    let node = node.clone();
                    tokio::spawn(async move { node.mine().await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
            let chain = node.chain();
            assert_eq!(chain.len(), 4);
            assert!(crate::blockchain::is_valid_chain(&chain, node.proof_of_work()));
        })
        .await
        .expect("test_concurrent_mining_produces_distinct_indexes timed out");
    }

    #[tokio::test]
    async fn test_register_peers_is_all_or_nothing() {
        let node = node_with(FixedSource(None));
        assert!(node.register_peers::<&str>(&[]).is_err());
        assert!(node.register_peers(&["127.0.0.1:5001", ""]).is_err());
        assert!(node.peers.is_empty());

        let peers = node.register_peers(&["http://127.0.0.1:5001", "127.0.0.1:5002"]).unwrap();
        assert_eq!(peers, ["127.0.0.1:5001", "127.0.0.1:5002"]);
    }

    #[tokio::test]
    async fn test_resolve_adopts_longer_peer_chain() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let donor = node_with(FixedSource(None));
            donor.mine().await.unwrap();
            donor.mine().await.unwrap();

            let node = node_with(FixedSource(Some(donor.chain())));
            assert_eq!(node.resolve().await, Resolution::Unchanged);

            node.register_peers(&["donor:5000"]).unwrap();
            let resolution = node.resolve().await;
            assert!(resolution.is_replaced());
            assert_eq!(node.chain(), donor.chain());
            assert_eq!(node.ledger.len(), 3);

            // Mining continues on top of the adopted chain.
            let block = node.mine().await.unwrap();
            assert_eq!(block.index, 4);
        })
        .await
        .expect("test_resolve_adopts_longer_peer_chain timed out");
    }

    #[tokio::test]
    async fn test_mining_is_abandoned_when_chain_is_replaced() {
        tokio::time::timeout(Duration::from_secs(10), async {
            // 64 leading zeros is never found, so only replacement ends the search.
            let mut config = test_config();
            config.miner.difficulty = 64;
            let node = Arc::new(Node::with_source(config, Arc::new(FixedSource(None))));

            let miner = {
                let node = node.clone();
                tokio::spawn(async move { node.mine().await })
            };
            tokio::time::sleep(Duration::from_millis(50)).await;

            let longer = Ledger::new(crate::blockchain::Genesis::default());
            longer.seal_block(1, None).unwrap();
            longer.seal_block(2, None).unwrap();
            assert!(node.ledger.replace_chain(longer.chain()));

            assert_eq!(miner.await.unwrap(), Err(ChainError::StaleChain));
            assert_eq!(node.chain(), longer.chain());
            assert_eq!(node.blocks_mined(), 0);
            assert!(node.ledger.pending_transactions().is_empty());
        })
        .await
        .expect("test_mining_is_abandoned_when_chain_is_replaced timed out");
    }

    #[tokio::test]
    async fn test_unreachable_peers_leave_chain_untouched() {
        let node = node_with(FixedSource(None));
        node.register_peers(&["a:1", "b:2"]).unwrap();
        let before = node.chain();
        assert_eq!(node.resolve().await, Resolution::Unchanged);
        assert_eq!(node.chain(), before);
    }

    #[test]
    fn test_generated_node_id_is_hex() {
        let node = Node::with_source(Config::default(), Arc::new(FixedSource(None)));
        assert_eq!(node.node_id.len(), 32);
        assert!(node.node_id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
