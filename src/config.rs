//! Configuration management for ProofChain

use crate::blockchain::Genesis;
use crate::miner::{ProofOfWork, DEFAULT_DIFFICULTY};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub genesis: GenesisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_reward")]
    pub reward: u64,
    /// Identity credited with mining rewards. Generated at start when unset.
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_genesis_proof")]
    pub proof: u64,
    #[serde(default = "default_genesis_previous_hash")]
    pub previous_hash: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            bootstrap_peers: Vec::new(),
            peer_timeout_ms: default_peer_timeout_ms(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            reward: default_reward(),
            node_id: None,
        }
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            proof: default_genesis_proof(),
            previous_hash: default_genesis_previous_hash(),
        }
    }
}

impl NetworkConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}

impl MinerConfig {
    pub fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork::new(self.difficulty)
    }
}

impl GenesisConfig {
    pub fn genesis(&self) -> Genesis {
        Genesis {
            proof: self.proof,
            previous_hash: self.previous_hash.clone(),
        }
    }
}

/// Loads `config.toml` from the working directory.
pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads a config file, falling back to defaults when it does not exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Rejects values the node cannot run with.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.miner.difficulty > 64 {
            return Err("miner.difficulty cannot exceed the 64 hex characters of a SHA-256 digest".into());
        }

        if self.network.peer_timeout_ms == 0 {
            return Err("network.peer_timeout_ms must be greater than zero".into());
        }

        if self.genesis.previous_hash.is_empty() {
            return Err("genesis.previous_hash must not be empty".into());
        }

        if let Some(node_id) = &self.miner.node_id {
            if node_id.trim().is_empty() {
                return Err("miner.node_id must not be blank".into());
            }
        }

        Ok(())
    }
}

fn default_api_port() -> u16 {
    5000
}

fn default_peer_timeout_ms() -> u64 {
    5_000
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_reward() -> u64 {
    1
}

fn default_genesis_proof() -> u64 {
    crate::blockchain::GENESIS_PROOF
}

fn default_genesis_previous_hash() -> String {
    crate::blockchain::GENESIS_PREVIOUS_HASH.to_string()
}
