//! Peer client contract and its HTTP implementation

use crate::core::{BlockBundle, BlockHashed, BlockIdentity, TransactionsBundle};
use crate::error::{Error, Result};
use crate::network::retry::retry_get;
use crate::network::{routes, PROTOCOL_VERSION};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything a node can ask of a peer.
///
/// Implemented over HTTP for real peers; tests substitute in-process
/// implementations.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Base URL of the peer
    fn host(&self) -> &Url;

    /// Protocol version the peer speaks
    async fn version(&self) -> Result<String>;

    /// Handshake: fail unless the peer speaks our protocol version
    async fn check_access(&self) -> Result<()> {
        let version = self.version().await?;
        if version != PROTOCOL_VERSION {
            return Err(Error::api(format!(
                "peer {} speaks version {}, expected {}",
                self.host(),
                version,
                PROTOCOL_VERSION
            )));
        }
        Ok(())
    }

    /// Peer addresses known to the peer
    async fn connections(&self) -> Result<Vec<String>>;

    /// Register `self_url` with the peer; returns the peers it already
    /// knows, for transitive discovery
    async fn connect(&self, self_url: &str) -> Result<Vec<String>>;

    /// Send a batch of pending transactions
    async fn broadcast_transactions(&self, bundle: &TransactionsBundle) -> Result<()>;

    /// Send a mined block
    async fn broadcast_block(&self, bundle: &BlockBundle) -> Result<()>;

    /// Retrieve a contiguous page of blocks; a negative `start` means
    /// "from the current tip"
    async fn blocks(&self, start: i64, count: u64) -> Result<Vec<BlockHashed>>;

    /// Retrieve blocks at an explicit index set
    async fn blocks_at(&self, indexes: &[u64]) -> Result<Vec<BlockHashed>>;

    /// Retrieve block identities for a contiguous page
    async fn block_identities(&self, start: i64, count: u64) -> Result<Vec<BlockIdentity>>;

    /// Retrieve block identities at an explicit index set
    async fn block_identities_at(&self, indexes: &[u64]) -> Result<Vec<BlockIdentity>>;

    /// Release any resources held for the peer
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Resolves a peer URL into a usable client
pub trait NetworkClientFactory: Send + Sync {
    /// Build a client for the peer at `url`
    fn create(&self, url: &str) -> Result<Arc<dyn NetworkClient>>;
}

/// HTTP implementation of the peer contract
pub struct HttpNetworkClient {
    host: Url,
    http: Client,
}

impl HttpNetworkClient {
    /// Create a client for the peer at `url`
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let mut host =
            Url::parse(url).map_err(|e| Error::peer(format!("invalid peer url {}: {}", url, e)))?;
        // Joining relative routes needs a directory-style base path.
        if !host.path().ends_with('/') {
            let path = format!("{}/", host.path());
            host.set_path(&path);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { host, http })
    }

    fn endpoint(&self, route: &str) -> Result<Url> {
        self.host
            .join(route)
            .map_err(|e| Error::peer(format!("invalid route {}: {}", route, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.http.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::peer(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    fn indexes_query(indexes: &[u64]) -> String {
        let list: Vec<String> = indexes.iter().map(u64::to_string).collect();
        list.join(",")
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    fn host(&self) -> &Url {
        &self.host
    }

    async fn version(&self) -> Result<String> {
        let url = self.endpoint(routes::ROOT)?;
        retry_get(|| self.get_json(url.clone())).await
    }

    async fn connections(&self) -> Result<Vec<String>> {
        let url = self.endpoint(routes::CONNECTIONS)?;
        retry_get(|| self.get_json(url.clone())).await
    }

    async fn connect(&self, self_url: &str) -> Result<Vec<String>> {
        let url = self.endpoint(routes::CONNECTIONS)?;
        let response = self.http.post(url).json(&self_url).send().await?;
        if !response.status().is_success() {
            return Err(Error::peer(format!(
                "peer {} refused connection: {}",
                self.host,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn broadcast_transactions(&self, bundle: &TransactionsBundle) -> Result<()> {
        let url = self.endpoint(routes::TRANSACTIONS)?;
        let response = self.http.post(url).json(bundle).send().await?;
        if !response.status().is_success() {
            return Err(Error::peer(format!(
                "peer {} rejected transactions: {}",
                self.host,
                response.status()
            )));
        }
        Ok(())
    }

    async fn broadcast_block(&self, bundle: &BlockBundle) -> Result<()> {
        let url = self.endpoint(routes::BLOCKS)?;
        let response = self.http.post(url).json(bundle).send().await?;
        if !response.status().is_success() {
            return Err(Error::peer(format!(
                "peer {} rejected block: {}",
                self.host,
                response.status()
            )));
        }
        Ok(())
    }

    async fn blocks(&self, start: i64, count: u64) -> Result<Vec<BlockHashed>> {
        let mut url = self.endpoint(routes::BLOCKS)?;
        url.query_pairs_mut()
            .append_pair("s", &start.to_string())
            .append_pair("c", &count.to_string());
        retry_get(|| self.get_json(url.clone())).await
    }

    async fn blocks_at(&self, indexes: &[u64]) -> Result<Vec<BlockHashed>> {
        let mut url = self.endpoint(routes::BLOCKS)?;
        url.query_pairs_mut()
            .append_pair("i", &Self::indexes_query(indexes));
        retry_get(|| self.get_json(url.clone())).await
    }

    async fn block_identities(&self, start: i64, count: u64) -> Result<Vec<BlockIdentity>> {
        let mut url = self.endpoint(routes::BLOCK_IDENTITIES)?;
        url.query_pairs_mut()
            .append_pair("s", &start.to_string())
            .append_pair("c", &count.to_string());
        retry_get(|| self.get_json(url.clone())).await
    }

    async fn block_identities_at(&self, indexes: &[u64]) -> Result<Vec<BlockIdentity>> {
        let mut url = self.endpoint(routes::BLOCK_IDENTITIES)?;
        url.query_pairs_mut()
            .append_pair("i", &Self::indexes_query(indexes));
        retry_get(|| self.get_json(url.clone())).await
    }
}

/// Factory producing [`HttpNetworkClient`] instances
pub struct HttpClientFactory {
    timeout: Duration,
}

impl HttpClientFactory {
    /// Create a factory with a per-request timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl NetworkClientFactory for HttpClientFactory {
    fn create(&self, url: &str) -> Result<Arc<dyn NetworkClient>> {
        Ok(Arc::new(HttpNetworkClient::new(url, self.timeout)?))
    }
}
