//! HTTP handlers for the peer wire calls and node operations

use crate::core::{Block, Transaction};
use crate::network::{
    BlockMessage, ErrorBody, GossipOutcome, Node, NodeAddr, NodeError, PeerClient,
    TransactionMessage,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state for API handlers
pub type ApiState<C> = Arc<Node<C>>;

/// Error response: status plus `{"error": reason}`
pub type ApiError = (StatusCode, Json<ErrorBody>);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct GossipResponse {
    /// `accepted` or `duplicate`
    pub outcome: String,
}

impl From<GossipOutcome> for GossipResponse {
    fn from(outcome: GossipOutcome) -> Self {
        let outcome = match outcome {
            GossipOutcome::Accepted => "accepted",
            GossipOutcome::Duplicate => "duplicate",
        };
        Self {
            outcome: outcome.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub transaction_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdvertiseResponse {
    /// Whether the advertised node was new to this registry
    pub added: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResponse {
    pub index: u64,
    pub hash: String,
    pub transactions: usize,
    pub reward: u64,
    pub time_ms: u128,
    pub attempts: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub public_key_hash: String,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node: NodeAddr,
    pub length: u64,
    pub public_key_hash: String,
}

fn error(status: StatusCode, reason: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: reason.into(),
        }),
    )
}

/// Validation failures are the caller's fault (4xx); the rest are ours
fn reject(e: NodeError) -> ApiError {
    let status = match &e {
        NodeError::MiningInProgress => StatusCode::CONFLICT,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error(status, e.to_string())
}

// ============================================================================
// Peer wire calls
// ============================================================================

/// POST /transaction - Transaction gossiped by a peer or client
pub async fn receive_transaction<C: PeerClient>(
    State(node): State<ApiState<C>>,
    Json(message): Json<TransactionMessage>,
) -> Result<Json<GossipResponse>, ApiError> {
    node.receive_transaction(message.transaction)
        .await
        .map(|outcome| Json(outcome.into()))
        .map_err(reject)
}

/// POST /block - Block gossiped by a peer
pub async fn receive_block<C: PeerClient>(
    State(node): State<ApiState<C>>,
    Json(message): Json<BlockMessage>,
) -> Result<Json<GossipResponse>, ApiError> {
    node.receive_block(message.block)
        .await
        .map(|outcome| Json(outcome.into()))
        .map_err(reject)
}

/// POST /advertise - A node announcing itself
pub async fn advertise<C: PeerClient>(
    State(node): State<ApiState<C>>,
    Json(peer): Json<NodeAddr>,
) -> Result<Json<AdvertiseResponse>, ApiError> {
    node.receive_advertisement(peer)
        .map(|added| Json(AdvertiseResponse { added }))
        .map_err(reject)
}

/// GET /known_nodes - Peers this node knows about
pub async fn known_nodes<C: PeerClient>(
    State(node): State<ApiState<C>>,
) -> Result<Json<Vec<NodeAddr>>, ApiError> {
    node.known_nodes().map(Json).map_err(reject)
}

/// GET /chain - Every block, newest first
pub async fn chain<C: PeerClient>(State(node): State<ApiState<C>>) -> Json<Vec<Block>> {
    Json(node.chain_blocks().await)
}

// ============================================================================
// Node operations
// ============================================================================

/// POST /transaction/new - Submit a signed transaction from a local client
pub async fn submit_transaction<C: PeerClient>(
    State(node): State<ApiState<C>>,
    Json(message): Json<TransactionMessage>,
) -> Result<Json<SubmitResponse>, ApiError> {
    node.submit_transaction(message.transaction)
        .await
        .map(|transaction_hash| Json(SubmitResponse { transaction_hash }))
        .map_err(reject)
}

/// GET /mempool - Pending transactions
pub async fn mempool<C: PeerClient>(
    State(node): State<ApiState<C>>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    node.pending_transactions().map(Json).map_err(reject)
}

/// POST /mine - Mine the pending pool into a block
pub async fn mine_block<C: PeerClient>(
    State(node): State<ApiState<C>>,
) -> Result<Json<MineResponse>, ApiError> {
    let Some(mined) = node.mine_block().await.map_err(reject)? else {
        return Err(error(
            StatusCode::CONFLICT,
            "Mining cancelled: a peer block extended the chain first",
        ));
    };

    let reward: u64 = mined
        .block
        .coinbase_transactions()
        .map(Transaction::total_output)
        .sum();

    Ok(Json(MineResponse {
        index: mined.block.header.index,
        hash: mined.block.hash(),
        transactions: mined.block.tx_count(),
        reward,
        time_ms: mined.stats.time_ms,
        attempts: mined.stats.hash_attempts,
    }))
}

/// GET /balance/{public_key_hash} - Unspent total locked to a hash
pub async fn balance<C: PeerClient>(
    State(node): State<ApiState<C>>,
    Path(public_key_hash): Path<String>,
) -> Json<BalanceResponse> {
    let balance = node.balance(&public_key_hash).await;
    Json(BalanceResponse {
        public_key_hash,
        balance,
    })
}

/// GET /health - Liveness plus a little node identity
pub async fn health_check<C: PeerClient>(State(node): State<ApiState<C>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        node: node.identity().clone(),
        length: node.length().await,
        public_key_hash: node.wallet().public_key_hash(),
    })
}
