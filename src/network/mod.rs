//! Peer-to-peer networking
//!
//! The peer registry, transitive peer discovery, and best-effort
//! broadcast fan-out, plus the HTTP client and server speaking the peer
//! protocol.

pub mod api;
pub mod client;
pub mod retry;

pub use client::{HttpClientFactory, HttpNetworkClient, NetworkClient, NetworkClientFactory};

use crate::core::{BlockBundle, BlockHashed, TransactionsBundle, TransactionSigned};
use crate::error::Result;
use crate::feedback::SyncFeedback;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Version of the peer protocol; the handshake rejects any mismatch
pub const PROTOCOL_VERSION: &str = "0.0";

/// Routes of the peer API
pub mod routes {
    /// Version handshake
    pub const ROOT: &str = "api";
    /// Peer registry
    pub const CONNECTIONS: &str = "api/connection";
    /// Transaction submission
    pub const TRANSACTIONS: &str = "api/transaction";
    /// Block submission and retrieval
    pub const BLOCKS: &str = "api/block";
    /// Block identity retrieval
    pub const BLOCK_IDENTITIES: &str = "api/block/identity";
}

/// A connected peer
#[derive(Clone)]
pub struct PeerConnection {
    /// Client for the peer's API
    pub client: Arc<dyn NetworkClient>,
}

impl PeerConnection {
    /// Wrap a client
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self { client }
    }

    /// The peer's address
    pub fn url(&self) -> String {
        self.client.host().to_string()
    }
}

/// Peer registry with transitive discovery and broadcast fan-out.
///
/// Broadcast is best-effort and unordered: sends to all peers run
/// concurrently, and a failing peer is disconnected rather than retried.
#[derive(Clone)]
pub struct P2PNetwork {
    self_url: String,
    peers: Arc<DashMap<String, PeerConnection>>,
    factory: Arc<dyn NetworkClientFactory>,
    feedback: Arc<dyn SyncFeedback>,
}

impl P2PNetwork {
    /// Create a registry for a node reachable at `self_url`
    pub fn new(
        self_url: impl Into<String>,
        factory: Arc<dyn NetworkClientFactory>,
        feedback: Arc<dyn SyncFeedback>,
    ) -> Self {
        Self {
            self_url: self_url.into(),
            peers: Arc::new(DashMap::new()),
            factory,
            feedback,
        }
    }

    /// The address peers reach this node at
    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Addresses of all connected peers
    pub fn peer_urls(&self) -> Vec<String> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of all peer connections
    pub fn connections(&self) -> Vec<PeerConnection> {
        self.peers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of connected peers
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Connect to a peer and, transitively, to every peer it reports.
    ///
    /// Each new peer goes through the version handshake and is told our
    /// own address in return. Unreachable peers are skipped; the node's
    /// own URL is never connected to. Returns the addresses newly
    /// connected.
    pub async fn connect(&self, address: &str) -> Result<Vec<String>> {
        let mut queue = VecDeque::from([address.to_string()]);
        let mut connected = Vec::new();

        while let Some(url) = queue.pop_front() {
            if same_url(&url, &self.self_url) || self.peers.contains_key(&url) {
                continue;
            }
            match self.attach(&url).await {
                Ok(discovered) => {
                    connected.push(url);
                    queue.extend(discovered);
                }
                Err(e) => warn!(%url, error = %e, "peer connection failed"),
            }
        }

        Ok(connected)
    }

    /// Handle an inbound registration: remember the caller, return the
    /// peers we already knew (for its own discovery), and connect back
    /// transitively in the background.
    pub async fn register_peer(&self, address: &str) -> Vec<String> {
        let known = self.peer_urls();
        let network = self.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            if let Err(e) = network.connect(&address).await {
                warn!(url = %address, error = %e, "reverse connection failed");
            }
        });
        known
    }

    /// Drop a peer from the registry
    pub async fn disconnect(&self, url: &str) {
        if let Some((_, peer)) = self.peers.remove(url) {
            let _ = peer.client.disconnect().await;
        }
    }

    /// Broadcast a mined block to every peer, best-effort
    pub async fn broadcast_block(&self, block: &BlockHashed) {
        let bundle = BlockBundle {
            sender: self.self_url.clone(),
            block: block.clone(),
        };
        let sends = self.connections().into_iter().map(|peer| {
            let bundle = bundle.clone();
            let network = self.clone();
            async move {
                if let Err(e) = peer.client.broadcast_block(&bundle).await {
                    warn!(peer = %peer.url(), error = %e, "block broadcast failed");
                    network.disconnect(&peer.url()).await;
                }
            }
        });
        futures::future::join_all(sends).await;
    }

    /// Broadcast pending transactions to every peer, best-effort
    pub async fn broadcast_transactions(&self, transactions: Vec<TransactionSigned>) {
        let bundle = TransactionsBundle {
            sender: self.self_url.clone(),
            transactions,
        };
        let sends = self.connections().into_iter().map(|peer| {
            let bundle = bundle.clone();
            let network = self.clone();
            async move {
                if let Err(e) = peer.client.broadcast_transactions(&bundle).await {
                    warn!(peer = %peer.url(), error = %e, "transaction broadcast failed");
                    network.disconnect(&peer.url()).await;
                }
            }
        });
        futures::future::join_all(sends).await;
    }

    async fn attach(&self, url: &str) -> Result<Vec<String>> {
        let client = self.factory.create(url)?;
        client.check_access().await?;
        let discovered = client.connect(&self.self_url).await?;
        self.peers
            .insert(url.to_string(), PeerConnection::new(client));
        self.feedback.peer_discovered(url);
        Ok(discovered)
    }
}

/// URL equality up to a trailing slash
fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}
