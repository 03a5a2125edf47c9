//! Gossip-Ledger: a minimal proof-of-work cryptocurrency ledger in Rust
//!
//! This crate provides:
//! - SHA-256 / RIPEMD-160 hashing and ECDSA signatures (secp256k1)
//! - Merkle roots over block transactions
//! - A small stack-based locking/unlocking script language
//! - UTXO transactions, resolution and validation
//! - Proof of Work mining with cancellation
//! - Peer gossip over HTTP with de-duplication and bootstrap from peers
//!
//! # Example
//!
//! ```no_run
//! use gossip_ledger::config::ConsensusParams;
//! use gossip_ledger::core::Blockchain;
//! use gossip_ledger::mining::Miner;
//! use gossip_ledger::wallet::Wallet;
//!
//! let mut chain = Blockchain::new(ConsensusParams::with_difficulty(2));
//! let wallet = Wallet::new();
//!
//! let miner = Miner::new(wallet.public_key_hash());
//! let (block, stats) = miner.mine_block(&mut chain, vec![]).unwrap();
//! println!("Mined block {} in {}ms", block.header.index, stats.time_ms);
//!
//! println!("Balance: {} coins", wallet.balance(&chain));
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use config::{ConsensusParams, FundsPolicy, NodeConfig};
pub use core::{Block, Blockchain, Transaction};
pub use crypto::KeyPair;
pub use mining::{Miner, ProofOfWork};
pub use network::{HttpPeerClient, Node, NodeAddr};
pub use wallet::Wallet;
