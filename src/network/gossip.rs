//! Peer gossip network
//!
//! Wraps the known-peers store and a `PeerClient`. Every outbound call
//! fans out to all known peers concurrently; a peer that cannot be reached
//! is dropped from the registry and the call carries on with the rest.

use crate::core::{Block, Transaction};
use crate::network::peer::{NodeAddr, PeerClient, PeerError};
use crate::storage::{PeerStore, StoreError};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;

/// Per-peer delivery outcome of a fan-out
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub rejected: usize,
    /// Peers removed from the registry because they were unreachable
    pub removed: Vec<NodeAddr>,
}

/// Known peers plus the wire client used to reach them
pub struct Network<C> {
    identity: NodeAddr,
    peers: Arc<dyn PeerStore>,
    client: C,
}

impl<C: PeerClient> Network<C> {
    pub fn new(identity: NodeAddr, peers: Arc<dyn PeerStore>, client: C) -> Self {
        Self {
            identity,
            peers,
            client,
        }
    }

    pub fn identity(&self) -> &NodeAddr {
        &self.identity
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Every known peer except this node
    pub fn known_peers(&self) -> Result<Vec<NodeAddr>, StoreError> {
        Ok(self
            .peers
            .list()?
            .into_iter()
            .filter(|peer| *peer != self.identity)
            .collect())
    }

    pub fn other_peers_exist(&self) -> Result<bool, StoreError> {
        Ok(!self.known_peers()?.is_empty())
    }

    /// Register peers, ignoring this node's own identity
    pub fn add_peers(&self, peers: &[NodeAddr]) -> Result<Vec<NodeAddr>, StoreError> {
        let others: Vec<NodeAddr> = peers
            .iter()
            .filter(|peer| **peer != self.identity)
            .cloned()
            .collect();
        let added = self.peers.add(&others)?;
        for peer in &added {
            info!("Learned peer {}", peer);
        }
        Ok(added)
    }

    /// Drop this node from the registry
    pub fn leave(&self) -> Result<bool, StoreError> {
        self.peers.remove(&self.identity)
    }

    /// Announce this node, learn each peer's peers, then announce again so
    /// the newly learned peers hear of this node too
    pub async fn join(&self) -> Result<(), StoreError> {
        if !self.other_peers_exist()? {
            info!("No known peers; starting a standalone network");
            return Ok(());
        }

        self.advertise_to_all().await?;
        self.learn_from_peers().await?;
        self.advertise_to_all().await?;
        Ok(())
    }

    pub async fn advertise_to_all(&self) -> Result<BroadcastReport, StoreError> {
        let identity = &self.identity;
        self.fan_out("advertise", |peer| async move {
            self.client.advertise(&peer, identity).await
        })
        .await
        .map(|(report, _)| report)
    }

    /// Merge every peer's known-peer list into ours (one hop)
    pub async fn learn_from_peers(&self) -> Result<Vec<NodeAddr>, StoreError> {
        let (_, lists) = self
            .fan_out("known_nodes", |peer| async move {
                self.client.known_nodes(&peer).await
            })
            .await?;

        let mut learned = Vec::new();
        for (_, list) in lists {
            learned.extend(self.add_peers(&list)?);
        }
        Ok(learned)
    }

    pub async fn broadcast_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<BroadcastReport, StoreError> {
        self.fan_out("transaction", |peer| async move {
            self.client.send_transaction(&peer, transaction).await
        })
        .await
        .map(|(report, _)| report)
    }

    pub async fn broadcast_block(&self, block: &Block) -> Result<BroadcastReport, StoreError> {
        self.fan_out("block", |peer| async move {
            self.client.send_block(&peer, block).await
        })
        .await
        .map(|(report, _)| report)
    }

    /// Every reachable peer's chain (newest block first), longest first
    pub async fn chain_candidates(&self) -> Result<Vec<(NodeAddr, Vec<Block>)>, StoreError> {
        let (_, mut chains) = self
            .fan_out("chain", |peer| async move { self.client.chain(&peer).await })
            .await?;
        chains.retain(|(_, blocks)| !blocks.is_empty());
        chains.sort_by(|(_, a), (_, b)| b.len().cmp(&a.len()));
        Ok(chains)
    }

    /// Run `call` against every known peer at once.
    ///
    /// Unreachable peers are removed from the registry; other failures,
    /// including a failed removal, are logged. Only listing the peers can
    /// fail the call. Returns the report and the successful results.
    async fn fan_out<T, F, Fut>(
        &self,
        what: &str,
        call: F,
    ) -> Result<(BroadcastReport, Vec<(NodeAddr, T)>), StoreError>
    where
        F: Fn(NodeAddr) -> Fut,
        Fut: Future<Output = Result<T, PeerError>>,
    {
        let peers = self.known_peers()?;
        let calls: Vec<_> = peers
            .into_iter()
            .map(|peer| {
                let pending = call(peer.clone());
                async move { (peer, pending.await) }
            })
            .collect();
        let outcomes = join_all(calls).await;

        let mut report = BroadcastReport::default();
        let mut successes = Vec::new();
        for (peer, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    report.delivered += 1;
                    successes.push((peer, value));
                }
                Err(e) if e.is_unreachable() => {
                    warn!("Removing unreachable peer {} ({}): {}", peer, what, e);
                    match self.peers.remove(&peer) {
                        Ok(_) => report.removed.push(peer),
                        Err(store) => error!("Could not remove peer {}: {}", peer, store),
                    }
                }
                Err(e) => {
                    debug!("Peer {} refused {}: {}", peer, what, e);
                    report.rejected += 1;
                }
            }
        }
        Ok((report, successes))
    }
}
