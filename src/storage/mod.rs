//! Storage module: the mempool and known-peers stores

pub mod mempool;
pub mod peers;
pub mod persistence;

pub use mempool::{JsonFileMempool, MemoryMempool, MempoolStore, MEMPOOL_FILE};
pub use peers::{JsonFilePeerStore, MemoryPeerStore, PeerStore, KNOWN_NODES_FILE};
pub use persistence::{JsonFile, StoreError};
