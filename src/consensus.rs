//! Longest-valid-chain conflict resolution between peers

use crate::blockchain::{check_chain, Block};
use crate::error::{ChainError, Result};
use crate::miner::ProofOfWork;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on how long a single peer may take to hand over its chain.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// What a node answers on `GET /chain`. `length` is reported by the peer and
/// is not trusted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub length: u64,
}

impl ChainSnapshot {
    pub fn new(chain: Vec<Block>) -> Self {
        let length = chain.len() as u64;
        Self { chain, length }
    }
}

/// Where remote chains come from.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot>;
}

#[async_trait]
impl<T: ChainSource + ?Sized> ChainSource for Arc<T> {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot> {
        (**self).fetch_chain(peer).await
    }
}

/// Outcome of one resolution round.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Unchanged,
    Replaced(Vec<Block>),
}

impl Resolution {
    pub fn is_replaced(&self) -> bool {
        matches!(self, Resolution::Replaced(_))
    }
}

/// Adjudicates between the local chain and peers' chains.
///
/// Among the peers' chains that validate and are strictly longer than the
/// local one, the longest wins. When several are equally long the first in
/// peer order wins; peers iterating in different orders may therefore settle
/// on different chains of the same length.
pub struct ConsensusResolver<S> {
    pow: ProofOfWork,
    source: S,
    peer_timeout: Duration,
}

impl<S: ChainSource> ConsensusResolver<S> {
    pub fn new(pow: ProofOfWork, source: S) -> Self {
        Self {
            pow,
            source,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }

    pub fn with_peer_timeout(mut self, peer_timeout: Duration) -> Self {
        self.peer_timeout = peer_timeout;
        self
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// True when `chain` is non-empty and every consecutive pair is linked by
    /// hash and by proof.
    pub fn validate_chain(&self, chain: &[Block]) -> bool {
        self.check_chain(chain).is_ok()
    }

    /// Like [`validate_chain`](Self::validate_chain) but says what is wrong.
    pub fn check_chain(&self, chain: &[Block]) -> Result<()> {
        check_chain(chain, &self.pow)
    }

    /// Asks every peer for its chain and picks the longest valid one that is
    /// strictly longer than `local_chain`.
    ///
    /// All peers are queried concurrently and the decision is taken once each
    /// has answered or timed out. Failing peers are skipped.
    pub async fn resolve(&self, peers: &[String], local_chain: &[Block]) -> Resolution {
        let fetches = peers.iter().map(|peer| self.fetch(peer));
        let snapshots = join_all(fetches).await;

        let mut max_length = local_chain.len() as u64;
        let mut best: Option<(&str, Vec<Block>)> = None;

        for (peer, snapshot) in peers.iter().zip(snapshots) {
            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "skipping peer");
                    continue;
                }
            };

            if snapshot.length <= max_length {
                debug!(peer = %peer, length = snapshot.length, max_length, "peer chain is not longer");
                continue;
            }
            if let Err(e) = self.check_chain(&snapshot.chain) {
                warn!(peer = %peer, length = snapshot.length, error = %e, "rejecting invalid peer chain");
                continue;
            }

            max_length = snapshot.length;
            best = Some((peer.as_str(), snapshot.chain));
        }

        match best {
            Some((peer, chain)) => {
                info!(peer = %peer, length = chain.len(), local = local_chain.len(), "found longer valid chain");
                Resolution::Replaced(chain)
            }
            None => {
                debug!(peers = peers.len(), local = local_chain.len(), "local chain is authoritative");
                Resolution::Unchanged
            }
        }
    }

    async fn fetch(&self, peer: &str) -> Result<ChainSnapshot> {
        let snapshot = tokio::time::timeout(self.peer_timeout, self.source.fetch_chain(peer))
            .await
            .map_err(|_| {
                ChainError::PeerUnreachable(format!(
                    "{} did not answer within {:?}",
                    peer, self.peer_timeout
                ))
            })??;

        if snapshot.length != snapshot.chain.len() as u64 {
            return Err(ChainError::InvalidPeerResponse(format!(
                "{} reported length {} but sent {} blocks",
                peer,
                snapshot.length,
                snapshot.chain.len()
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Genesis, Ledger};
    use std::collections::HashMap;

    enum PeerBehavior {
        Serve(ChainSnapshot),
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct MockSource {
        peers: HashMap<String, PeerBehavior>,
    }

    impl MockSource {
        fn serve(mut self, peer: &str, chain: Vec<Block>) -> Self {
            self.peers.insert(peer.to_string(), PeerBehavior::Serve(ChainSnapshot::new(chain)));
            self
        }

        fn serve_snapshot(mut self, peer: &str, snapshot: ChainSnapshot) -> Self {
            self.peers.insert(peer.to_string(), PeerBehavior::Serve(snapshot));
            self
        }

        fn fail(mut self, peer: &str) -> Self {
            self.peers.insert(peer.to_string(), PeerBehavior::Fail);
            self
        }

        fn hang(mut self, peer: &str) -> Self {
            self.peers.insert(peer.to_string(), PeerBehavior::Hang);
            self
        }
    }

    #[async_trait]
    impl ChainSource for MockSource {
        async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot> {
            match self.peers.get(peer) {
                Some(PeerBehavior::Serve(snapshot)) => Ok(snapshot.clone()),
                Some(PeerBehavior::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ChainError::PeerUnreachable(peer.to_string()))
                }
                Some(PeerBehavior::Fail) | None => {
                    Err(ChainError::PeerUnreachable(peer.to_string()))
                }
            }
        }
    }

    fn pow() -> ProofOfWork {
        ProofOfWork::new(2)
    }

    fn chain_of(blocks: usize) -> Vec<Block> {
        chain_from("alice", blocks)
    }

    fn chain_from(sender: &str, blocks: usize) -> Vec<Block> {
        let ledger = Ledger::new(Genesis::default());
        for i in 1..blocks {
            ledger.submit_transaction(sender, "bob", i as u64).unwrap();
            let proof = pow().solve(ledger.last_block().unwrap().proof).unwrap();
            ledger.seal_block(proof, None).unwrap();
        }
        ledger.chain()
    }

    fn peers(names: &[&str]) -> Vec<String> {
        names.iter().map(|p| p.to_string()).collect()
    }

    fn resolver(source: MockSource) -> ConsensusResolver<MockSource> {
        ConsensusResolver::new(pow(), source).with_peer_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_no_peers_is_unchanged() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(2);
            let resolution = resolver(MockSource::default()).resolve(&[], &local).await;
            assert_eq!(resolution, Resolution::Unchanged);
        })
        .await
        .expect("test_no_peers_is_unchanged timed out");
    }

    #[tokio::test]
    async fn test_longer_valid_chain_replaces() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(2);
            let remote = chain_of(4);
            let source = MockSource::default().serve("a:1", remote.clone());
            let resolution = resolver(source).resolve(&peers(&["a:1"]), &local).await;
            assert_eq!(resolution, Resolution::Replaced(remote));
        })
        .await
        .expect("test_longer_valid_chain_replaces timed out");
    }

    #[tokio::test]
    async fn test_longer_invalid_chain_is_ignored() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(2);
            let mut remote = chain_of(5);
            remote[3].previous_hash = "bogus".to_string();
            let source = MockSource::default().serve("a:1", remote);
            let resolution = resolver(source).resolve(&peers(&["a:1"]), &local).await;
            assert_eq!(resolution, Resolution::Unchanged);
        })
        .await
        .expect("test_longer_invalid_chain_is_ignored timed out");
    }

    #[tokio::test]
    async fn test_misnumbered_chain_is_ignored() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(2);
            let mut remote = chain_of(4);
            remote[3].index = 40;
            let source = MockSource::default().serve("a:1", remote);
            let resolution = resolver(source).resolve(&peers(&["a:1"]), &local).await;
            assert_eq!(resolution, Resolution::Unchanged);
        })
        .await
        .expect("test_misnumbered_chain_is_ignored timed out");
    }

    #[tokio::test]
    async fn test_equal_or_shorter_chains_do_not_replace() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(3);
            let source = MockSource::default()
                .serve("same:1", chain_of(3))
                .serve("short:1", chain_of(2));
            let resolution = resolver(source)
                .resolve(&peers(&["same:1", "short:1"]), &local)
                .await;
            assert_eq!(resolution, Resolution::Unchanged);
        })
        .await
        .expect("test_equal_or_shorter_chains_do_not_replace timed out");
    }

    #[tokio::test]
    async fn test_longest_of_several_wins() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(1);
            let longest = chain_of(5);
            let source = MockSource::default()
                .serve("a:1", chain_of(3))
                .serve("b:1", longest.clone())
                .serve("c:1", chain_of(4));
            let resolution = resolver(source)
                .resolve(&peers(&["a:1", "b:1", "c:1"]), &local)
                .await;
            assert_eq!(resolution, Resolution::Replaced(longest));
        })
        .await
        .expect("test_longest_of_several_wins timed out");
    }

    #[tokio::test]
    async fn test_first_seen_wins_ties() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(1);
            let first = chain_from("first", 3);
            let second = chain_from("second", 3);
            let source = MockSource::default()
                .serve("first:1", first.clone())
                .serve("second:1", second.clone());

            let resolution = resolver(source)
                .resolve(&peers(&["first:1", "second:1"]), &local)
                .await;
            assert_eq!(resolution, Resolution::Replaced(first));
        })
        .await
        .expect("test_first_seen_wins_ties timed out");
    }

    #[tokio::test]
    async fn test_failing_and_hanging_peers_are_skipped() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(1);
            let remote = chain_of(3);
            let source = MockSource::default()
                .fail("down:1")
                .hang("slow:1")
                .serve("good:1", remote.clone());
            let resolution = resolver(source)
                .resolve(&peers(&["down:1", "slow:1", "unknown:1", "good:1"]), &local)
                .await;
            assert_eq!(resolution, Resolution::Replaced(remote));
        })
        .await
        .expect("test_failing_and_hanging_peers_are_skipped timed out");
    }

    #[tokio::test]
    async fn test_inflated_length_is_not_trusted() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let local = chain_of(2);
            let mut snapshot = ChainSnapshot::new(chain_of(2));
            snapshot.length = 100;
            let source = MockSource::default().serve_snapshot("liar:1", snapshot);
            let resolution = resolver(source).resolve(&peers(&["liar:1"]), &local).await;
            assert_eq!(resolution, Resolution::Unchanged);
        })
        .await
        .expect("test_inflated_length_is_not_trusted timed out");
    }

    #[test]
    fn test_validate_chain_through_resolver() {
        let resolver = resolver(MockSource::default());
        assert!(!resolver.validate_chain(&[]));
        assert!(resolver.validate_chain(&chain_of(1)));
        assert!(resolver.validate_chain(&chain_of(3)));
        assert_eq!(resolver.proof_of_work().difficulty(), 2);
    }
}
