#![forbid(unsafe_code)]
//! ProofChain network node

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use proofchain::config::{load_config_from, DEFAULT_CONFIG_PATH};
use proofchain::node::Node;

#[derive(Parser)]
#[command(name = "proofchain-node")]
#[command(about = "Run a ProofChain node and serve its HTTP API")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Port to listen on, overriding `network.api_port`
    #[arg(short, long)]
    port: Option<u16>,

    /// Peer to register at startup; may be repeated
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Proof-of-work difficulty, overriding `miner.difficulty`
    #[arg(long)]
    difficulty: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = load_config_from(&args.config)?;
    if let Some(port) = args.port {
        config.network.api_port = port;
    }
    if let Some(difficulty) = args.difficulty {
        config.miner.difficulty = difficulty;
    }
    config.network.bootstrap_peers.extend(args.peers);
    config.validate()?;

    let node = Arc::new(Node::new(config)?);
    node.start().await
}
