//! Gossip wire payloads and message ids
//!
//! Bodies of the peer wire calls:
//! - `POST /transaction` takes `{"transaction": ...}`
//! - `POST /block` takes `{"block": ...}`
//! - `POST /advertise` takes a bare node address
//!
//! A message id is the SHA-256 of the payload re-encoded with its object
//! keys sorted, so two nodes encoding the same message agree on its id.

use crate::core::{Block, Transaction};
use crate::crypto::sha256_hex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub transaction: Transaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMessage {
    pub block: Block,
}

/// Error body returned by a peer rejecting a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Canonical id of a gossip message
pub fn message_id<T: Serialize>(message: &T) -> String {
    // serde_json::Value keeps object keys in sorted order
    let canonical = serde_json::to_value(message)
        .map(|value| value.to_string())
        .unwrap_or_default();
    sha256_hex(canonical.as_bytes())
}

impl TransactionMessage {
    pub fn id(&self) -> String {
        message_id(self)
    }
}

impl BlockMessage {
    pub fn id(&self) -> String {
        message_id(self)
    }
}
