//! HTTP routes configuration

use crate::api::handlers::{self, ApiState};
use crate::network::PeerClient;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the router with all routes
pub fn create_router<C: PeerClient>(state: ApiState<C>) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check::<C>))
        // Peer wire calls
        .route("/transaction", post(handlers::receive_transaction::<C>))
        .route("/block", post(handlers::receive_block::<C>))
        .route("/advertise", post(handlers::advertise::<C>))
        .route("/known_nodes", get(handlers::known_nodes::<C>))
        .route("/chain", get(handlers::chain::<C>))
        // Local clients
        .route("/transaction/new", post(handlers::submit_transaction::<C>))
        .route("/mempool", get(handlers::mempool::<C>))
        .route("/mine", post(handlers::mine_block::<C>))
        .route("/balance/{public_key_hash}", get(handlers::balance::<C>))
        .with_state(state)
        .layer(cors)
}
