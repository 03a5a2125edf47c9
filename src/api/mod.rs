//! HTTP API module
//!
//! Serves the peer wire calls other nodes make, plus a few endpoints for
//! local clients.
//!
//! # Endpoints
//!
//! ## Peer wire calls
//! - `POST /transaction` - Gossiped transaction (`{"transaction": ...}`)
//! - `POST /block` - Gossiped block (`{"block": ...}`)
//! - `POST /advertise` - Node announcing itself (`{"hostname", "port"}`)
//! - `GET /known_nodes` - Known peers
//! - `GET /chain` - Blocks, newest first
//!
//! ## Local clients
//! - `GET /health` - Liveness
//! - `POST /transaction/new` - Submit a signed transaction
//! - `GET /mempool` - Pending transactions
//! - `POST /mine` - Mine a block
//! - `GET /balance/{public_key_hash}` - Balance lookup
//!
//! Failures answer `{"error": reason}`: 400 for invalid input, 409 while a
//! mining attempt is running or was overtaken, 500 for local faults.

pub mod handlers;
pub mod routes;

pub use handlers::{ApiError, ApiState};
pub use routes::create_router;
