//! Node and consensus configuration
//!
//! All nodes on one network must agree on `ConsensusParams`; everything else
//! in `NodeConfig` is local.

use crate::network::NodeAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Leading zero hex characters required in a header hash
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Hex characters in a SHA-256 digest; no hash can meet a higher difficulty
pub const MAX_DIFFICULTY: usize = 64;

/// Minimum coinbase payout per block
pub const BLOCK_REWARD: u64 = 50;

/// Timeout applied to every outbound peer call
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Gossip message ids remembered for de-duplication
pub const DEFAULT_SEEN_CACHE_SIZE: usize = 10_000;

/// How non-coinbase transactions must balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FundsPolicy {
    /// Inputs may exceed outputs; the difference is the fee
    #[default]
    AllowFee,
    /// Inputs must equal outputs exactly
    Exact,
}

/// Rules every node on the network must share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusParams {
    pub difficulty: usize,
    pub block_reward: u64,
    pub funds_policy: FundsPolicy,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            block_reward: BLOCK_REWARD,
            funds_policy: FundsPolicy::AllowFee,
        }
    }
}

impl ConsensusParams {
    pub fn with_difficulty(difficulty: usize) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }
}

/// Parse a difficulty, rejecting values no header hash could satisfy
pub fn parse_difficulty(s: &str) -> Result<usize, String> {
    let difficulty: usize = s.parse().map_err(|e| format!("invalid difficulty '{}': {}", s, e))?;
    if difficulty > MAX_DIFFICULTY {
        return Err(format!(
            "difficulty {} exceeds the {} hex characters of a hash",
            difficulty, MAX_DIFFICULTY
        ));
    }
    Ok(difficulty)
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host and port this node is reachable on
    pub identity: NodeAddr,
    /// Directory holding the mempool and known-peers files
    pub data_dir: PathBuf,
    pub consensus: ConsensusParams,
    pub peer_timeout: Duration,
    /// Peers seeded into the known-peers store before joining
    pub bootstrap_peers: Vec<NodeAddr>,
    pub seen_cache_size: usize,
    /// Hex private key for the node wallet; a fresh key is generated if absent
    pub private_key: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: NodeAddr::new("127.0.0.1", 5000),
            data_dir: PathBuf::from(".ledger_data"),
            consensus: ConsensusParams::default(),
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            bootstrap_peers: Vec::new(),
            seen_cache_size: DEFAULT_SEEN_CACHE_SIZE,
            private_key: None,
        }
    }
}
