//! Known-peers registry stores

use crate::network::NodeAddr;
use crate::storage::persistence::{JsonFile, StoreError};
use parking_lot::Mutex;
use std::path::PathBuf;

/// File name of the known-peers list inside the data directory
pub const KNOWN_NODES_FILE: &str = "known_nodes.json";

/// Narrow interface to the known-peers registry
pub trait PeerStore: Send + Sync {
    fn list(&self) -> Result<Vec<NodeAddr>, StoreError>;
    /// Add peers not already known; returns the ones that were new
    fn add(&self, peers: &[NodeAddr]) -> Result<Vec<NodeAddr>, StoreError>;
    /// Returns whether the peer was known
    fn remove(&self, peer: &NodeAddr) -> Result<bool, StoreError>;
}

fn merge(known: &mut Vec<NodeAddr>, peers: &[NodeAddr]) -> Vec<NodeAddr> {
    let mut added = Vec::new();
    for peer in peers {
        if !known.contains(peer) {
            known.push(peer.clone());
            added.push(peer.clone());
        }
    }
    added
}

fn discard(known: &mut Vec<NodeAddr>, peer: &NodeAddr) -> bool {
    let before = known.len();
    known.retain(|p| p != peer);
    known.len() != before
}

/// Process-local registry
#[derive(Debug, Default)]
pub struct MemoryPeerStore {
    peers: Mutex<Vec<NodeAddr>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peers(peers: Vec<NodeAddr>) -> Self {
        Self {
            peers: Mutex::new(peers),
        }
    }
}

impl PeerStore for MemoryPeerStore {
    fn list(&self) -> Result<Vec<NodeAddr>, StoreError> {
        Ok(self.peers.lock().clone())
    }

    fn add(&self, peers: &[NodeAddr]) -> Result<Vec<NodeAddr>, StoreError> {
        Ok(merge(&mut self.peers.lock(), peers))
    }

    fn remove(&self, peer: &NodeAddr) -> Result<bool, StoreError> {
        Ok(discard(&mut self.peers.lock(), peer))
    }
}

/// Registry kept in a JSON array on disk
#[derive(Debug)]
pub struct JsonFilePeerStore {
    file: Mutex<JsonFile<Vec<NodeAddr>>>,
}

impl JsonFilePeerStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self {
            file: Mutex::new(JsonFile::new(path)?),
        })
    }

    /// `known_nodes.json` inside `data_dir`
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::new(data_dir.into().join(KNOWN_NODES_FILE))
    }
}

impl PeerStore for JsonFilePeerStore {
    fn list(&self) -> Result<Vec<NodeAddr>, StoreError> {
        self.file.lock().load()
    }

    fn add(&self, peers: &[NodeAddr]) -> Result<Vec<NodeAddr>, StoreError> {
        let file = self.file.lock();
        let mut known = file.load()?;
        let added = merge(&mut known, peers);
        if !added.is_empty() {
            file.save(&known)?;
        }
        Ok(added)
    }

    fn remove(&self, peer: &NodeAddr) -> Result<bool, StoreError> {
        let file = self.file.lock();
        let mut known = file.load()?;
        let removed = discard(&mut known, peer);
        if removed {
            file.save(&known)?;
        }
        Ok(removed)
    }
}
