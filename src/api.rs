//! REST API server for ProofChain
//!
//! Serves the node's chain to peers and exposes mining, transaction
//! submission, peer registration and conflict resolution over HTTP.

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::blockchain::Block;
use crate::consensus::{ChainSnapshot, Resolution};
use crate::error::ChainError;
use crate::node::{Node, NodeState};
use crate::transaction::Transaction;

const REQUIRED_TRANSACTION_FIELDS: [&str; 3] = ["sender", "recipient", "amount"];

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<Node>,
    stats: Arc<RwLock<ApiStats>>,
}

impl ApiState {
    pub fn new(node: Arc<Node>) -> Self {
        Self {
            node,
            stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }
}

/// API statistics and monitoring
#[derive(Debug, Default)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    transactions_submitted: u64,
    resolutions: u64,
    chains_replaced: u64,
    start_time: Option<Instant>,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::BlockchainError(e) => match e {
                ChainError::InvalidInput(_) | ChainError::InvalidChain(_) => StatusCode::BAD_REQUEST,
                ChainError::NotFound(_) => StatusCode::NOT_FOUND,
                ChainError::StaleChain => StatusCode::CONFLICT,
                ChainError::EmptyChain => StatusCode::SERVICE_UNAVAILABLE,
                ChainError::PeerUnreachable(_) | ChainError::InvalidPeerResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
                ChainError::Serialization(_) | ChainError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BlockchainError(e) => e.to_string(),
            ApiError::InvalidInput(msg) => msg,
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct MinedBlockResponse {
    pub message: String,
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub total_nodes: Vec<String>,
}

#[derive(Serialize)]
pub struct ApiStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub transactions_submitted: u64,
    pub resolutions: u64,
    pub chains_replaced: u64,
    pub blocks_mined: u64,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub peers: usize,
    pub uptime_seconds: u64,
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(api): State<ApiState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    api.stats.write().await.record_request(success);

    response
}

/// Logs method, path, status, duration and the node's lifecycle state.
async fn logging_middleware(State(api): State<ApiState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let node_state = api.node.state.read().await.clone();
    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        node_state = ?node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(node: Arc<Node>) -> Router {
    let state = ApiState::new(node);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    Router::new()
        .route("/mine", get(mine))
        .route("/transactions/new", post(new_transaction))
        .route("/transactions/pending", get(pending_transactions))
        .route("/chain", get(full_chain))
        .route("/blocks/:index", get(block_by_index))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes", get(list_nodes))
        .route("/nodes/resolve", get(resolve_conflicts))
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        // logging before stats so we always record timing and node-state
        .layer(middleware::from_fn_with_state(state.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), stats_middleware))
        .with_state(state)
        .layer(cors)
}

/// Serves the API on an already bound listener.
pub async fn serve(listener: TcpListener, node: Arc<Node>) -> std::io::Result<()> {
    axum::serve(listener, build_api_router(node)).await
}

/// Binds `0.0.0.0:port` and serves the API until the process exits.
pub async fn run_api_server(
    node: Arc<Node>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");

    serve(listener, node).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn mine(State(api): State<ApiState>) -> Result<Json<MinedBlockResponse>, ApiError> {
    let block = api.node.mine().await?;
    let Block {
        index,
        transactions,
        proof,
        previous_hash,
        ..
    } = block;

    Ok(Json(MinedBlockResponse {
        message: "New Block Forged".to_string(),
        index,
        transactions,
        proof,
        previous_hash,
    }))
}

async fn new_transaction(
    State(api): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::InvalidInput(e.body_text()))?;

    if !REQUIRED_TRANSACTION_FIELDS
        .iter()
        .all(|field| body.get(field).is_some_and(|v| !v.is_null()))
    {
        return Err(ApiError::InvalidInput("Missing values".to_string()));
    }
    let tx: Transaction = serde_json::from_value(body)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid transaction: {}", e)))?;

    let index = api.node.submit_transaction(tx)?;
    api.stats.write().await.transactions_submitted += 1;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: format!("Transaction will be added to Block {}", index),
        }),
    ))
}

async fn pending_transactions(State(api): State<ApiState>) -> impl IntoResponse {
    let transactions = api.node.ledger.pending_transactions();
    Json(json!({
        "count": transactions.len(),
        "transactions": transactions
    }))
}

async fn full_chain(State(api): State<ApiState>) -> Json<ChainSnapshot> {
    Json(ChainSnapshot::new(api.node.chain()))
}

async fn block_by_index(
    State(api): State<ApiState>,
    Path(index): Path<u64>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(api.node.ledger.block(index)?))
}

async fn register_nodes(
    State(api): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let invalid = || ApiError::InvalidInput("Error: Please supply a valid list of nodes".to_string());

    let Json(body) = body.map_err(|_| invalid())?;
    let nodes = body
        .get("nodes")
        .and_then(Value::as_array)
        .filter(|nodes| !nodes.is_empty())
        .ok_or_else(invalid)?
        .iter()
        .map(|node| node.as_str().map(str::to_string).ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()?;

    let total_nodes = api.node.register_peers(&nodes)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "New nodes have been added".to_string(),
            total_nodes,
        }),
    ))
}

async fn list_nodes(State(api): State<ApiState>) -> impl IntoResponse {
    let nodes = api.node.peers.list();
    Json(json!({
        "count": nodes.len(),
        "nodes": nodes
    }))
}

async fn resolve_conflicts(State(api): State<ApiState>) -> impl IntoResponse {
    let resolution = api.node.resolve().await;
    {
        let mut stats = api.stats.write().await;
        stats.resolutions += 1;
        if resolution.is_replaced() {
            stats.chains_replaced += 1;
        }
    }

    match resolution {
        Resolution::Replaced(new_chain) => Json(json!({
            "message": "Our chain was replaced",
            "new_chain": new_chain
        })),
        Resolution::Unchanged => Json(json!({
            "message": "Our chain is authoritative",
            "chain": api.node.chain()
        })),
    }
}

async fn health_check(State(api): State<ApiState>) -> impl IntoResponse {
    let state = api.node.state.read().await.clone();
    let (status, label) = match state {
        NodeState::Ready => (StatusCode::OK, "healthy"),
        NodeState::Booting | NodeState::Syncing => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        status,
        Json(json!({
            "status": label,
            "node_state": format!("{:?}", state),
            "chain_length": api.node.ledger.len(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

async fn get_api_stats(State(api): State<ApiState>) -> Json<ApiStatsResponse> {
    let stats = api.stats.read().await;
    let uptime = stats.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0);

    Json(ApiStatsResponse {
        total_requests: stats.total_requests,
        successful_requests: stats.successful_requests,
        failed_requests: stats.failed_requests,
        transactions_submitted: stats.transactions_submitted,
        resolutions: stats.resolutions,
        chains_replaced: stats.chains_replaced,
        blocks_mined: api.node.blocks_mined(),
        chain_length: api.node.ledger.len(),
        pending_transactions: api.node.ledger.pending_transactions().len(),
        peers: api.node.peers.len(),
        uptime_seconds: uptime,
    })
}
