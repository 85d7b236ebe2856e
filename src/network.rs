//! Peer bookkeeping and the HTTP client used to fetch peers' chains

use crate::consensus::{ChainSnapshot, ChainSource};
use crate::error::{ChainError, Result};
use async_trait::async_trait;
use indexmap::IndexSet;
use parking_lot::RwLock;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Path every node serves its full chain on.
pub const CHAIN_PATH: &str = "/chain";

/// Parses `http://host:port/...` or bare `host:port` into canonical `host:port`.
///
/// Hosts are lowercased and a missing port becomes the scheme's default.
pub fn parse_peer_address(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChainError::InvalidInput("peer address is empty".to_string()));
    }

    let url = if text.contains("://") {
        Url::parse(text)
    } else {
        Url::parse(&format!("http://{}", text))
    }
    .map_err(|e| ChainError::InvalidInput(format!("invalid peer address {:?}: {}", text, e)))?;

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ChainError::InvalidInput(format!("peer address {:?} has no host", text)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ChainError::InvalidInput(format!("peer address {:?} has no port", text)))?;

    Ok(format!("{}:{}", host, port))
}

/// Known peers, in first-registration order.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<IndexSet<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer. Registering a peer twice has no further effect.
    pub fn register(&self, address: &str) -> Result<()> {
        let canonical = parse_peer_address(address)?;
        if self.peers.write().insert(canonical.clone()) {
            info!(peer = %canonical, "peer registered");
        } else {
            debug!(peer = %canonical, "peer already known");
        }
        Ok(())
    }

    /// Snapshot of the known peers.
    pub fn list(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        parse_peer_address(address)
            .map(|canonical| self.peers.read().contains(&canonical))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

/// Fetches `GET http://{peer}/chain` over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainSource {
    client: Client,
}

impl HttpChainSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ChainError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChainSource for HttpChainSource {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot> {
        let url = format!("http://{}{}", peer, CHAIN_PATH);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::InvalidPeerResponse(format!(
                "{} answered {}",
                url, status
            )));
        }
        Ok(response.json::<ChainSnapshot>().await?)
    }
}
