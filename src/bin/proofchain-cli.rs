#![forbid(unsafe_code)]
//! Command-line client for a running ProofChain node

use clap::{Parser, Subcommand};
use colored::*;
use reqwest::{Client, Response};
use serde_json::{json, Number, Value};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "proofchain-cli")]
#[command(about = "Talk to a ProofChain node over its HTTP API")]
#[command(version)]
struct Cli {
    /// Base URL of the node
    #[arg(short, long, default_value = "http://127.0.0.1:5000")]
    node: String,

    /// Request timeout in seconds; mining may take a while
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the node's chain
    Chain,
    /// Mine the pending transactions into a new block
    Mine,
    /// Queue a transaction
    Send {
        sender: String,
        recipient: String,
        /// Integer or decimal amount
        amount: Number,
    },
    /// Register one or more peers with the node
    Register {
        #[arg(required = true)]
        peers: Vec<String>,
    },
    /// Ask the node to reconcile its chain with its peers
    Resolve,
    /// List the node's peers
    Peers,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let base = cli.node.trim_end_matches('/').to_string();

    let client = match Client::builder().timeout(Duration::from_secs(cli.timeout)).build() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {}", "❌ Failed to build HTTP client:".red(), e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Chain => show_chain(&client, &base).await,
        Commands::Mine => mine(&client, &base).await,
        Commands::Send {
            sender,
            recipient,
            amount,
        } => send(&client, &base, sender, recipient, amount).await,
        Commands::Register { peers } => register(&client, &base, peers).await,
        Commands::Resolve => resolve(&client, &base).await,
        Commands::Peers => show_peers(&client, &base).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "❌".red(), e.as_str().red());
        std::process::exit(1);
    }
}

/// Reads a JSON body, turning `{error}` answers into an `Err`.
async fn read_json(response: Response) -> Result<Value, String> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| format!("unreadable response ({}): {}", status, e))?;
    if status.is_success() {
        Ok(body)
    } else {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        Err(format!("{}: {}", status, message))
    }
}

async fn get(client: &Client, url: String) -> Result<Value, String> {
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("cannot reach {}: {}", url, e))?;
    read_json(response).await
}

async fn post(client: &Client, url: String, body: Value) -> Result<Value, String> {
    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("cannot reach {}: {}", url, e))?;
    read_json(response).await
}

fn print_chain(chain: &[Value]) {
    for block in chain {
        let index = block["index"].as_u64().unwrap_or_default();
        let proof = block["proof"].as_u64().unwrap_or_default();
        let previous = block["previous_hash"].as_str().unwrap_or("?");
        println!(
            "{} {}  {} {}  {} {}",
            "Block".bright_cyan().bold(),
            index.to_string().as_str().bright_white(),
            "proof".dimmed(),
            proof,
            "prev".dimmed(),
            previous
        );
        for tx in block["transactions"].as_array().into_iter().flatten() {
            let sender = tx["sender"].as_str().unwrap_or("?");
            let label = if sender == proofchain::transaction::REWARD_SENDER {
                "reward".yellow()
            } else {
                sender.normal()
            };
            println!(
                "    {} → {}  {}",
                label,
                tx["recipient"].as_str().unwrap_or("?"),
                tx["amount"].to_string().as_str().bright_green()
            );
        }
    }
}

async fn show_chain(client: &Client, base: &str) -> Result<(), String> {
    let body = get(client, format!("{}/chain", base)).await?;
    let chain = body["chain"].as_array().cloned().unwrap_or_default();
    println!("{} {}", "⛓  Chain length:".bright_cyan(), body["length"]);
    print_chain(&chain);
    Ok(())
}

async fn mine(client: &Client, base: &str) -> Result<(), String> {
    println!("{}", "⛏  Mining...".yellow());
    let body = get(client, format!("{}/mine", base)).await?;
    println!(
        "{} block {} with proof {}",
        "✅ New block forged:".green().bold(),
        body["index"],
        body["proof"]
    );
    println!(
        "   {} transaction(s), previous hash {}",
        body["transactions"].as_array().map(Vec::len).unwrap_or(0),
        body["previous_hash"].as_str().unwrap_or("?")
    );
    Ok(())
}

async fn send(
    client: &Client,
    base: &str,
    sender: String,
    recipient: String,
    amount: Number,
) -> Result<(), String> {
    let body = post(
        client,
        format!("{}/transactions/new", base),
        json!({ "sender": sender, "recipient": recipient, "amount": amount }),
    )
    .await?;
    println!("{} {}", "✅".green(), body["message"].as_str().unwrap_or("queued"));
    Ok(())
}

async fn register(client: &Client, base: &str, peers: Vec<String>) -> Result<(), String> {
    let body = post(client, format!("{}/nodes/register", base), json!({ "nodes": peers })).await?;
    println!("{} {}", "✅".green(), body["message"].as_str().unwrap_or("registered"));
    for peer in body["total_nodes"].as_array().into_iter().flatten() {
        println!("   🌐 {}", peer.as_str().unwrap_or("?"));
    }
    Ok(())
}

async fn resolve(client: &Client, base: &str) -> Result<(), String> {
    let body = get(client, format!("{}/nodes/resolve", base)).await?;
    let message = body["message"].as_str().unwrap_or("?");
    match body.get("new_chain").and_then(Value::as_array) {
        Some(chain) => {
            println!("{} {}", "🔄".yellow(), message.yellow().bold());
            print_chain(chain);
        }
        None => {
            let length = body["chain"].as_array().map(Vec::len).unwrap_or(0);
            println!("{} {} (length {})", "✅".green(), message.green(), length);
        }
    }
    Ok(())
}

async fn show_peers(client: &Client, base: &str) -> Result<(), String> {
    let body = get(client, format!("{}/nodes", base)).await?;
    println!("{} {}", "🌐 Peers:".bright_cyan(), body["count"]);
    for peer in body["nodes"].as_array().into_iter().flatten() {
        println!("   {}", peer.as_str().unwrap_or("?"));
    }
    Ok(())
}
