//! Peer identity and the outbound wire client
//!
//! `PeerClient` is the seam between the gossip logic and the transport.
//! `HttpPeerClient` speaks the HTTP wire calls with a bounded timeout.

use crate::core::{Block, Transaction};
use crate::network::message::{BlockMessage, ErrorBody, TransactionMessage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// A node's network identity; equality is host plus port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub hostname: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Base URL of the node's HTTP surface
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = String;

    /// Parse `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hostname, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{}'", s))?;
        if hostname.is_empty() {
            return Err(format!("missing hostname in '{}'", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in '{}': {}", s, e))?;
        Ok(Self::new(hostname, port))
    }
}

/// Peer call errors
#[derive(Error, Debug)]
pub enum PeerError {
    /// Connection refused, reset or timed out
    #[error("Peer unreachable: {0}")]
    Unreachable(String),
    /// The peer answered but refused the call
    #[error("Peer rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },
    #[error("Malformed peer response: {0}")]
    Malformed(String),
}

impl PeerError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, PeerError::Unreachable(_))
    }
}

/// Outbound half of the peer wire protocol
pub trait PeerClient: Send + Sync + 'static {
    fn send_transaction(
        &self,
        peer: &NodeAddr,
        transaction: &Transaction,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    fn send_block(
        &self,
        peer: &NodeAddr,
        block: &Block,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    /// Announce `node` to `peer`
    fn advertise(
        &self,
        peer: &NodeAddr,
        node: &NodeAddr,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    fn known_nodes(
        &self,
        peer: &NodeAddr,
    ) -> impl Future<Output = Result<Vec<NodeAddr>, PeerError>> + Send;

    /// The peer's chain, newest block first
    fn chain(&self, peer: &NodeAddr) -> impl Future<Output = Result<Vec<Block>, PeerError>> + Send;
}

/// `PeerClient` over HTTP
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| PeerError::Unreachable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        peer: &NodeAddr,
        path: &str,
        body: &T,
    ) -> Result<(), PeerError> {
        let url = format!("{}{}", peer.url(), path);
        let response = self.client.post(&url).json(body).send().await?;
        check_status(response).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, peer: &NodeAddr, path: &str) -> Result<T, PeerError> {
        let url = format!("{}{}", peer.url(), path);
        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| PeerError::Malformed(e.to_string()))
    }
}

impl From<reqwest::Error> for PeerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PeerError::Malformed(e.to_string())
        } else {
            PeerError::Unreachable(e.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PeerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(PeerError::Rejected {
        status: status.as_u16(),
        reason: if reason.is_empty() {
            status.to_string()
        } else {
            reason
        },
    })
}

impl PeerClient for HttpPeerClient {
    async fn send_transaction(
        &self,
        peer: &NodeAddr,
        transaction: &Transaction,
    ) -> Result<(), PeerError> {
        let message = TransactionMessage {
            transaction: transaction.clone(),
        };
        self.post(peer, "/transaction", &message).await
    }

    async fn send_block(&self, peer: &NodeAddr, block: &Block) -> Result<(), PeerError> {
        let message = BlockMessage {
            block: block.clone(),
        };
        self.post(peer, "/block", &message).await
    }

    async fn advertise(&self, peer: &NodeAddr, node: &NodeAddr) -> Result<(), PeerError> {
        self.post(peer, "/advertise", node).await
    }

    async fn known_nodes(&self, peer: &NodeAddr) -> Result<Vec<NodeAddr>, PeerError> {
        self.get(peer, "/known_nodes").await
    }

    async fn chain(&self, peer: &NodeAddr) -> Result<Vec<Block>, PeerError> {
        self.get(peer, "/chain").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_addr_identity() {
        let a = NodeAddr::new("127.0.0.1", 5000);
        assert_eq!(a, NodeAddr::new("127.0.0.1", 5000));
        assert_ne!(a, NodeAddr::new("127.0.0.1", 5001));
        assert_eq!(a.url(), "http://127.0.0.1:5000");
        assert_eq!(a.to_string(), "127.0.0.1:5000");
    }

    #[test]
    fn test_node_addr_wire_shape() {
        let json = serde_json::to_string(&NodeAddr::new("localhost", 8080)).unwrap();
        assert_eq!(json, r#"{"hostname":"localhost","port":8080}"#);
    }

    #[test]
    fn test_node_addr_parse() {
        let addr: NodeAddr = "localhost:5001".parse().unwrap();
        assert_eq!(addr, NodeAddr::new("localhost", 5001));

        assert!("localhost".parse::<NodeAddr>().is_err());
        assert!(":5001".parse::<NodeAddr>().is_err());
        assert!("localhost:99999".parse::<NodeAddr>().is_err());
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        // bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpPeerClient::new(Duration::from_millis(500)).unwrap();
        let err = client
            .known_nodes(&NodeAddr::new("127.0.0.1", port))
            .await
            .unwrap_err();
        assert!(err.is_unreachable());
    }
}
