//! Peer-to-peer gossip networking
//!
//! Provides the peer wire client, the gossip network over the known-peers
//! registry, and the node tying chain, mempool and mining together.
//!
//! # Features
//! - Advertise / join with one-hop peer discovery
//! - Transaction and block gossip with message de-duplication
//! - Self-healing membership (unreachable peers are dropped)
//! - Longest valid chain bootstrap

pub mod gossip;
pub mod message;
pub mod node;
pub mod peer;

pub use gossip::{BroadcastReport, Network};
pub use message::{message_id, BlockMessage, ErrorBody, TransactionMessage};
pub use node::{ChainOrigin, GossipOutcome, MinedBlock, Node, NodeError};
pub use peer::{HttpPeerClient, NodeAddr, PeerClient, PeerError};
