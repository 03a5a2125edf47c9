//! Ledger node
//!
//! The node that orchestrates chain, mempool, gossip and mining. The chain
//! sits behind a `tokio::sync::RwLock`: validation reads a consistent
//! snapshot, and `add_new_block` runs under the write lock so at most one
//! append completes at a time. Proof of work runs on the blocking pool and
//! is cancelled when a peer's block wins the race.

use crate::config::{ConsensusParams, NodeConfig};
use crate::core::{
    Block, BlockError, Blockchain, OutPoint, Transaction, TransactionError, TransactionValidator,
};
use crate::crypto::KeyError;
use crate::mining::{Miner, MiningStats};
use crate::network::gossip::{BroadcastReport, Network};
use crate::network::message::{BlockMessage, TransactionMessage};
use crate::network::peer::{HttpPeerClient, NodeAddr, PeerClient, PeerError};
use crate::storage::{
    JsonFileMempool, JsonFilePeerStore, MempoolStore, PeerStore, StoreError,
};
use crate::wallet::{Wallet, WalletError, WALLET_FILE};
use log::{debug, info, warn};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Node-level errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("{0}")]
    Transaction(#[from] TransactionError),
    #[error("{0}")]
    Block(#[from] BlockError),
    #[error("Transaction conflicts with a pending transaction spending {0}")]
    MempoolConflict(OutPoint),
    #[error("Coinbase transactions are only created by miners")]
    CoinbaseSubmitted,
    #[error("A block is already being mined")]
    MiningInProgress,
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),
    #[error("Background task failed: {0}")]
    Task(String),
}

impl NodeError {
    /// Whether the error describes bad input rather than a local failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            NodeError::Transaction(_)
                | NodeError::Block(_)
                | NodeError::MempoolConflict(_)
                | NodeError::CoinbaseSubmitted
                | NodeError::MiningInProgress
        )
    }
}

/// Result of handing the node a gossip message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipOutcome {
    /// First sighting: processed and relayed
    Accepted,
    /// Already handled; nothing done
    Duplicate,
}

/// Where the chain came from at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOrigin {
    /// The chain was already populated
    Existing,
    /// Adopted the longest valid chain offered by a peer
    Adopted { peer: NodeAddr, length: u64 },
    /// No usable peer chain; mined a fresh genesis block
    Genesis,
}

/// A freshly mined and appended block
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub stats: MiningStats,
}

/// Clears the in-flight mining slot when a mining attempt ends
struct MiningSlot<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for MiningSlot<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// The main ledger node
pub struct Node<C> {
    params: ConsensusParams,
    chain: RwLock<Blockchain>,
    mempool: Arc<dyn MempoolStore>,
    /// Serialises mempool admission (check-then-append)
    admission: tokio::sync::Mutex<()>,
    network: Network<C>,
    wallet: Wallet,
    seen: Mutex<LruCache<String, ()>>,
    mining: Mutex<Option<CancellationToken>>,
}

impl Node<HttpPeerClient> {
    /// Build a node from configuration with file-backed stores and HTTP peers
    pub fn from_config(config: &NodeConfig) -> Result<Self, NodeError> {
        let mempool = Arc::new(JsonFileMempool::in_dir(&config.data_dir)?);
        let peers = Arc::new(JsonFilePeerStore::in_dir(&config.data_dir)?);
        let wallet = match &config.private_key {
            Some(key) => Wallet::from_private_key(key)?,
            None => Wallet::load_or_create(&config.data_dir.join(WALLET_FILE))?,
        };
        let client = HttpPeerClient::new(config.peer_timeout)?;

        let network = Network::new(config.identity.clone(), peers, client);
        network.add_peers(&config.bootstrap_peers)?;

        Ok(Self::new(
            config.consensus,
            network,
            mempool,
            wallet,
            config.seen_cache_size,
        ))
    }
}

impl<C: PeerClient> Node<C> {
    pub fn new(
        params: ConsensusParams,
        network: Network<C>,
        mempool: Arc<dyn MempoolStore>,
        wallet: Wallet,
        seen_cache_size: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(seen_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            params,
            chain: RwLock::new(Blockchain::new(params)),
            mempool,
            admission: tokio::sync::Mutex::new(()),
            network,
            wallet,
            seen: Mutex::new(LruCache::new(capacity)),
            mining: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &NodeAddr {
        self.network.identity()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn network(&self) -> &Network<C> {
        &self.network
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub async fn length(&self) -> u64 {
        self.chain.read().await.length()
    }

    pub async fn balance(&self, public_key_hash: &str) -> u64 {
        self.chain.read().await.balance(public_key_hash)
    }

    /// The chain, newest block first
    pub async fn chain_blocks(&self) -> Vec<Block> {
        self.chain.read().await.blocks_newest_first()
    }

    /// Whether a mining attempt is in flight
    pub fn is_mining(&self) -> bool {
        self.mining.lock().is_some()
    }

    pub fn pending_transactions(&self) -> Result<Vec<Transaction>, NodeError> {
        Ok(self.mempool.list()?)
    }

    /// Peers this node knows about
    pub fn known_nodes(&self) -> Result<Vec<NodeAddr>, NodeError> {
        Ok(self.network.known_peers()?)
    }

    // =========================================================================
    // Message de-duplication
    // =========================================================================

    /// Record `id`; false if it was already seen
    fn mark_seen(&self, id: &str) -> bool {
        self.seen.lock().put(id.to_string(), ()).is_none()
    }

    fn forget(&self, id: &str) {
        self.seen.lock().pop(id);
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Validate against the chain and the pending pool, then stage
    async fn admit_transaction(&self, tx: &Transaction) -> Result<(), NodeError> {
        if tx.is_coin_base {
            return Err(NodeError::CoinbaseSubmitted);
        }

        let _admission = self.admission.lock().await;
        {
            let chain = self.chain.read().await;
            TransactionValidator::new(&chain).validate(tx)?;
        }

        let pending: HashSet<OutPoint> = self
            .mempool
            .list()?
            .iter()
            .flat_map(|pending| pending.outpoints())
            .collect();
        if let Some(conflict) = tx.outpoints().find(|o| pending.contains(o)) {
            return Err(NodeError::MempoolConflict(conflict));
        }

        self.mempool.append(std::slice::from_ref(tx))?;
        Ok(())
    }

    /// Accept a transaction from a local client and gossip it
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<String, NodeError> {
        self.admit_transaction(&tx).await?;

        let hash = tx.hash();
        let message = TransactionMessage { transaction: tx };
        self.mark_seen(&message.id());
        info!("Transaction {} submitted", hash);

        relayed("transaction", self.network.broadcast_transaction(&message.transaction).await);
        Ok(hash)
    }

    /// Handle a transaction gossiped by a peer
    pub async fn receive_transaction(&self, tx: Transaction) -> Result<GossipOutcome, NodeError> {
        let message = TransactionMessage { transaction: tx };
        let id = message.id();
        if !self.mark_seen(&id) {
            debug!("Duplicate transaction message {}", id);
            return Ok(GossipOutcome::Duplicate);
        }

        if let Err(e) = self.admit_transaction(&message.transaction).await {
            warn!("Rejected transaction {}: {}", message.transaction.hash(), e);
            self.forget(&id);
            return Err(e);
        }

        info!("Transaction {} accepted from peer", message.transaction.hash());
        relayed("transaction", self.network.broadcast_transaction(&message.transaction).await);
        Ok(GossipOutcome::Accepted)
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Append under the write lock and settle the mempool
    async fn append_block(&self, block: Block) -> Result<(), NodeError> {
        let mut chain = self.chain.write().await;
        self.commit(&mut chain, block)
    }

    /// Append to an already write-locked chain and settle the mempool
    fn commit(&self, chain: &mut Blockchain, block: Block) -> Result<(), NodeError> {
        let settled: Vec<String> = block
            .transactions
            .iter()
            .filter(|tx| !tx.is_coin_base)
            .map(Transaction::hash)
            .collect();

        chain.add_new_block(block)?;
        self.mempool.remove(&settled)?;
        Ok(())
    }

    /// Handle a block gossiped by a peer
    pub async fn receive_block(&self, block: Block) -> Result<GossipOutcome, NodeError> {
        let message = BlockMessage { block };
        let id = message.id();
        if !self.mark_seen(&id) {
            debug!("Duplicate block message {}", id);
            return Ok(GossipOutcome::Duplicate);
        }

        let index = message.block.header.index;
        if let Err(e) = self.append_block(message.block.clone()).await {
            warn!("Rejected block #{}: {}", index, e);
            self.forget(&id);
            return Err(e);
        }

        // a local search on the same height is now stale
        if let Some(token) = self.mining.lock().as_ref() {
            token.cancel();
        }

        info!("Block #{} accepted from peer", index);
        relayed("block", self.network.broadcast_block(&message.block).await);
        Ok(GossipOutcome::Accepted)
    }

    /// Register a peer announcing itself; true if it was new
    pub fn receive_advertisement(&self, node: NodeAddr) -> Result<bool, NodeError> {
        Ok(!self.network.add_peers(&[node])?.is_empty())
    }

    // =========================================================================
    // Mining
    // =========================================================================

    /// Mine the pending pool into a block, append it and gossip it.
    ///
    /// Returns `None` if a peer's block was appended while searching.
    pub async fn mine_block(&self) -> Result<Option<MinedBlock>, NodeError> {
        let cancel = CancellationToken::new();
        {
            let mut slot = self.mining.lock();
            if slot.is_some() {
                return Err(NodeError::MiningInProgress);
            }
            *slot = Some(cancel.clone());
        }
        let _slot = MiningSlot(&self.mining);

        let pending = self.mempool.list()?;
        let miner = Miner::new(self.wallet.public_key_hash());
        let template = {
            let chain = self.chain.read().await;
            miner.assemble(&chain, pending)
        };
        if !template.rejected.is_empty() {
            self.mempool.remove(&template.rejected)?;
        }

        let difficulty = self.params.difficulty;
        let search = cancel.clone();
        let mined = tokio::task::spawn_blocking(move || {
            miner.mine(template.block, difficulty, &search)
        })
        .await
        .map_err(|e| NodeError::Task(e.to_string()))?;

        let Some((block, stats)) = mined else {
            return Ok(None);
        };
        {
            // the tip may have moved between the search ending and this lock
            let mut chain = self.chain.write().await;
            let tip = chain.last_block().map(Block::hash);
            if cancel.is_cancelled() || block.header.previous_hash != tip {
                info!("Discarding block #{}: chain moved on", block.header.index);
                return Ok(None);
            }
            self.commit(&mut chain, block.clone())?;
        }

        let message = BlockMessage { block };
        self.mark_seen(&message.id());
        relayed("block", self.network.broadcast_block(&message.block).await);

        Ok(Some(MinedBlock {
            block: message.block,
            stats,
        }))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Join the network and make sure there is a chain to build on
    pub async fn initialize(&self) -> Result<ChainOrigin, NodeError> {
        self.network.join().await?;

        if !self.chain.read().await.is_empty() {
            return Ok(ChainOrigin::Existing);
        }

        for (peer, blocks) in self.network.chain_candidates().await? {
            let offered = blocks.len();
            match Blockchain::from_blocks(blocks, self.params) {
                Ok(candidate) => {
                    let length = candidate.length();
                    let mut chain = self.chain.write().await;
                    if chain.length() >= length {
                        return Ok(ChainOrigin::Existing);
                    }
                    *chain = candidate;
                    info!("Adopted chain of length {} from {}", length, peer);
                    return Ok(ChainOrigin::Adopted { peer, length });
                }
                Err(e) => warn!("Chain of {} blocks from {} is invalid: {}", offered, peer, e),
            }
        }

        info!("No valid peer chain; mining genesis block");
        match self.mine_block().await? {
            Some(_) => Ok(ChainOrigin::Genesis),
            // a peer delivered a block while the genesis search ran
            None => Ok(ChainOrigin::Existing),
        }
    }

    /// Remove this node from the known-peers registry
    pub fn leave(&self) -> Result<(), NodeError> {
        if self.network.leave()? {
            info!("Removed {} from known nodes", self.identity());
        }
        Ok(())
    }
}

/// Relay failures are logged; they never undo the local operation
fn relayed(what: &str, outcome: Result<BroadcastReport, StoreError>) {
    match outcome {
        Ok(report) => debug!(
            "Relayed {} to {} peers ({} rejected, {} removed)",
            what,
            report.delivered,
            report.rejected,
            report.removed.len()
        ),
        Err(e) => warn!("Could not relay {}: {}", what, e),
    }
}
