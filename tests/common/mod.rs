//! Shared helpers for integration tests: chain construction by real
//! mining, and in-process peers implementing the network contract.

#![allow(dead_code)]

use async_trait::async_trait;
use blockforge::chain::ChainData;
use blockforge::core::constants::TICKS_PER_SECOND;
use blockforge::core::{
    genesis, Address, BlockBundle, BlockData, BlockHashed, BlockIdentity, BlockSigned, Hash,
    HashTarget, Recipient, Transaction, TransactionsBundle,
};
use blockforge::crypto::Cryptography;
use blockforge::engine::Engine;
use blockforge::error::{Error, Result};
use blockforge::feedback::NullFeedback;
use blockforge::miner::{MinerFactory, BLOCK_MESSAGE};
use blockforge::network::{NetworkClient, NetworkClientFactory, P2PNetwork};
use blockforge::rules::{self, BLOCK_TIME_TICKS};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Fixed genesis timestamp so test chains are reproducible
pub const GENESIS_TIME: i64 = 1_700_000_000 * TICKS_PER_SECOND;

/// Brute-force a winning nonce for a signed block
pub fn mine(crypto: &Cryptography, signed: BlockSigned) -> BlockHashed {
    let target = signed.hash_target_bits.to_hash();
    let signed_hash = crypto.hash(&signed);
    let mut nonce = Hash::ZERO;
    loop {
        let hash = crypto.hash_with_nonce(signed_hash.as_bytes(), &nonce);
        if hash < target {
            return BlockHashed::new(signed, HashTarget::new(nonce, hash));
        }
        nonce.increment(1).unwrap();
    }
}

/// Mine a chain of `length` blocks (genesis included) paying `miner`,
/// spaced exactly one target block time apart
pub fn build_chain(crypto: &Cryptography, length: usize, miner: Address) -> Vec<BlockHashed> {
    let mut chain = vec![mine(crypto, genesis::signed_block(crypto, GENESIS_TIME))];
    while chain.len() < length {
        let last = chain.last().expect("chain is never empty here");
        let time_stamp = last.signed.data.time_stamp + BLOCK_TIME_TICKS;
        let coinbase = crypto.sign_transaction(Transaction::new(
            *genesis::GOD,
            vec![Recipient::new(miner, rules::block_reward(last))],
            0,
            time_stamp,
        ));
        let data = BlockData::new(
            last.index() + 1,
            time_stamp,
            BLOCK_MESSAGE,
            vec![coinbase],
            *last.hash(),
        );
        let bits = rules::target_bits(last, &data);
        chain.push(mine(crypto, crypto.sign_block(data, miner, bits)));
    }
    chain
}

/// An 11-block chain (heights 0..=10), mined once per test binary
pub static MAIN_CHAIN: Lazy<Vec<BlockHashed>> = Lazy::new(|| {
    build_chain(
        &Cryptography::new(),
        11,
        Address::from_password("main-chain-miner"),
    )
});

/// An independent 8-block chain (heights 0..=7) that shares nothing
/// with [`MAIN_CHAIN`] past its content rules
pub static FORK_CHAIN: Lazy<Vec<BlockHashed>> = Lazy::new(|| {
    build_chain(
        &Cryptography::new(),
        8,
        Address::from_password("fork-chain-miner"),
    )
});

/// In-process peer serving a fixed chain over the network contract
pub struct MockPeer {
    host: Url,
    chain: Vec<BlockHashed>,
    known_peers: Vec<String>,
    fail_blocks: bool,
    fail_identities: bool,
}

impl MockPeer {
    pub fn new(url: &str, chain: Vec<BlockHashed>) -> Self {
        Self {
            host: Url::parse(url).expect("valid mock url"),
            chain,
            known_peers: Vec::new(),
            fail_blocks: false,
            fail_identities: false,
        }
    }

    /// Peers this node reports on registration, for discovery tests
    pub fn with_known_peers(mut self, peers: Vec<String>) -> Self {
        self.known_peers = peers;
        self
    }

    /// Make every block retrieval fail
    pub fn failing_blocks(mut self) -> Self {
        self.fail_blocks = true;
        self
    }

    /// Make every identity query fail
    pub fn failing_identities(mut self) -> Self {
        self.fail_identities = true;
        self
    }

    fn page(&self, start: i64, count: u64) -> Vec<BlockHashed> {
        if count == 0 || self.chain.is_empty() {
            return Vec::new();
        }
        let start = if start < 0 {
            self.chain.len() - 1
        } else {
            start as usize
        };
        if start >= self.chain.len() {
            return Vec::new();
        }
        let end = (start + count as usize).min(self.chain.len());
        self.chain[start..end].to_vec()
    }
}

#[async_trait]
impl NetworkClient for MockPeer {
    fn host(&self) -> &Url {
        &self.host
    }

    async fn version(&self) -> Result<String> {
        Ok("0.0".to_string())
    }

    async fn connections(&self) -> Result<Vec<String>> {
        Ok(self.known_peers.clone())
    }

    async fn connect(&self, _self_url: &str) -> Result<Vec<String>> {
        Ok(self.known_peers.clone())
    }

    async fn broadcast_transactions(&self, _bundle: &TransactionsBundle) -> Result<()> {
        Ok(())
    }

    async fn broadcast_block(&self, _bundle: &BlockBundle) -> Result<()> {
        Ok(())
    }

    async fn blocks(&self, start: i64, count: u64) -> Result<Vec<BlockHashed>> {
        if self.fail_blocks {
            return Err(Error::peer("mock peer refuses block retrieval"));
        }
        Ok(self.page(start, count))
    }

    async fn blocks_at(&self, indexes: &[u64]) -> Result<Vec<BlockHashed>> {
        if self.fail_blocks {
            return Err(Error::peer("mock peer refuses block retrieval"));
        }
        Ok(indexes
            .iter()
            .filter_map(|&i| self.chain.get(i as usize).cloned())
            .collect())
    }

    async fn block_identities(&self, start: i64, count: u64) -> Result<Vec<BlockIdentity>> {
        if self.fail_identities {
            return Err(Error::peer("mock peer refuses identity queries"));
        }
        Ok(self
            .page(start, count)
            .iter()
            .map(BlockHashed::identity)
            .collect())
    }

    async fn block_identities_at(&self, indexes: &[u64]) -> Result<Vec<BlockIdentity>> {
        if self.fail_identities {
            return Err(Error::peer("mock peer refuses identity queries"));
        }
        Ok(indexes
            .iter()
            .filter_map(|&i| self.chain.get(i as usize).map(BlockHashed::identity))
            .collect())
    }
}

/// Factory resolving URLs to registered mock peers
#[derive(Default)]
pub struct MockFactory {
    peers: HashMap<String, Arc<MockPeer>>,
}

impl MockFactory {
    pub fn with_peer(mut self, peer: MockPeer) -> Self {
        self.peers.insert(peer.host.to_string(), Arc::new(peer));
        self
    }
}

impl NetworkClientFactory for MockFactory {
    fn create(&self, url: &str) -> Result<Arc<dyn NetworkClient>> {
        self.peers
            .get(url)
            .cloned()
            .map(|peer| peer as Arc<dyn NetworkClient>)
            .ok_or_else(|| Error::peer(format!("unknown mock peer {}", url)))
    }
}

/// Wire an engine around the given peer network
pub fn build_engine(network: P2PNetwork) -> Arc<Engine> {
    let crypto = Cryptography::new();
    let feedback = Arc::new(NullFeedback);
    let chain = Arc::new(Mutex::new(ChainData::new(crypto, feedback.clone())));
    let factory = MinerFactory::new(crypto, feedback.clone());
    Arc::new(Engine::new(
        chain,
        network,
        factory,
        crypto,
        feedback.clone(),
        feedback.clone(),
        feedback,
    ))
}

/// A network whose factory knows the given mock peers
pub fn mock_network(factory: MockFactory) -> P2PNetwork {
    P2PNetwork::new(
        "http://localhost:9999/",
        Arc::new(factory),
        Arc::new(NullFeedback),
    )
}
