//! Lifecycle telemetry
//!
//! Components report what they are doing through small capability traits
//! instead of logging directly, so the sink can be swapped (structured
//! tracing in the node, a silent sink in tests) without touching the
//! reporting code. Telemetry is purely observational; no control flow
//! depends on it.

use crate::core::{Hash, HashBits, TransactionSigned};
use tracing::{debug, info, warn};

/// Telemetry from the miner and its worker pool
pub trait MiningFeedback: Send + Sync {
    /// A candidate block was assembled and mining begins
    fn mine_new_block(&self, difficulty: f64, target_bits: HashBits);
    /// The worker pool was scaled to `thread_count` workers
    fn start_workers(&self, thread_count: usize);
    /// A worker finished a nonce sub-range, reporting attempts made
    fn hash_progress(&self, hashes: u64);
    /// A locally-mined block was accepted onto the chain
    fn block_mined(&self, height: u64, mine_time_ticks: i64);
    /// The in-flight mining attempt was cancelled
    fn mining_cancelled(&self);
}

/// Telemetry from chain validation
pub trait ChainFeedback: Send + Sync {
    /// A block passed validation and was appended
    fn block_accepted(&self, height: u64, block_time_ticks: i64, hash: &Hash);
    /// A block violated a chain rule and was discarded
    fn block_rejected(&self, height: u64, hash: &Hash, reason: &str);
    /// A transaction entered the pending pool
    fn new_transaction(&self, transaction: &TransactionSigned);
}

/// Telemetry from multi-peer synchronization
pub trait SyncFeedback: Send + Sync {
    /// Synchronization begins against a corroborated peer chain
    fn sync_started(&self, local_height: Option<u64>, target_height: u64);
    /// A page of blocks was requested from a peer
    fn retrieve_blocks(&self, start: u64, count: u64, peer: &str);
    /// A retrieved page arrived ahead of its predecessors and was queued
    fn pending_blocks(&self, start: u64, count: usize);
    /// A retrieved page failed validation and will be re-fetched
    fn invalid_blocks(&self, start: u64, count: u64);
    /// A queued page became contiguous and is being applied
    fn process_pending(&self, start: u64, count: usize);
    /// Synchronization finished at the given height
    fn sync_finished(&self, height: u64);
    /// A new peer was discovered and connected
    fn peer_discovered(&self, url: &str);
}

/// Generic operation tracing for paths without a dedicated capability
pub trait OperationFeedback: Send + Sync {
    /// An operation started
    fn operation_started(&self, operation: &str, detail: &str);
    /// An operation finished
    fn operation_finished(&self, operation: &str, detail: &str);
    /// An operation failed
    fn operation_failed(&self, operation: &str, error: &str);
}

/// All capabilities together, for components wired with a single sink
pub trait NodeFeedback:
    MiningFeedback + ChainFeedback + SyncFeedback + OperationFeedback
{
}

impl<T> NodeFeedback for T where
    T: MiningFeedback + ChainFeedback + SyncFeedback + OperationFeedback
{
}

/// Default sink mapping every event onto `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFeedback;

impl MiningFeedback for TracingFeedback {
    fn mine_new_block(&self, difficulty: f64, target_bits: HashBits) {
        info!(difficulty, target = %target_bits, "mining new block");
    }

    fn start_workers(&self, thread_count: usize) {
        info!(thread_count, "mining workers scaled");
    }

    fn hash_progress(&self, hashes: u64) {
        debug!(hashes, "nonce sub-range exhausted");
    }

    fn block_mined(&self, height: u64, mine_time_ticks: i64) {
        info!(height, mine_time_ticks, "block mined");
    }

    fn mining_cancelled(&self) {
        debug!("mining attempt cancelled");
    }
}

impl ChainFeedback for TracingFeedback {
    fn block_accepted(&self, height: u64, block_time_ticks: i64, hash: &Hash) {
        info!(height, block_time_ticks, %hash, "block accepted");
    }

    fn block_rejected(&self, height: u64, hash: &Hash, reason: &str) {
        warn!(height, %hash, reason, "block rejected");
    }

    fn new_transaction(&self, transaction: &TransactionSigned) {
        debug!(sign = %transaction.sign, "transaction pending");
    }
}

impl SyncFeedback for TracingFeedback {
    fn sync_started(&self, local_height: Option<u64>, target_height: u64) {
        info!(?local_height, target_height, "chain sync started");
    }

    fn retrieve_blocks(&self, start: u64, count: u64, peer: &str) {
        debug!(start, count, peer, "retrieving blocks");
    }

    fn pending_blocks(&self, start: u64, count: usize) {
        debug!(start, count, "blocks queued out of order");
    }

    fn invalid_blocks(&self, start: u64, count: u64) {
        warn!(start, count, "retrieved blocks failed validation");
    }

    fn process_pending(&self, start: u64, count: usize) {
        debug!(start, count, "applying queued blocks");
    }

    fn sync_finished(&self, height: u64) {
        info!(height, "chain sync finished");
    }

    fn peer_discovered(&self, url: &str) {
        info!(url, "peer connected");
    }
}

impl OperationFeedback for TracingFeedback {
    fn operation_started(&self, operation: &str, detail: &str) {
        debug!(operation, detail, "started");
    }

    fn operation_finished(&self, operation: &str, detail: &str) {
        debug!(operation, detail, "finished");
    }

    fn operation_failed(&self, operation: &str, error: &str) {
        warn!(operation, error, "failed");
    }
}

/// Silent sink for tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFeedback;

impl MiningFeedback for NullFeedback {
    fn mine_new_block(&self, _difficulty: f64, _target_bits: HashBits) {}
    fn start_workers(&self, _thread_count: usize) {}
    fn hash_progress(&self, _hashes: u64) {}
    fn block_mined(&self, _height: u64, _mine_time_ticks: i64) {}
    fn mining_cancelled(&self) {}
}

impl ChainFeedback for NullFeedback {
    fn block_accepted(&self, _height: u64, _block_time_ticks: i64, _hash: &Hash) {}
    fn block_rejected(&self, _height: u64, _hash: &Hash, _reason: &str) {}
    fn new_transaction(&self, _transaction: &TransactionSigned) {}
}

impl SyncFeedback for NullFeedback {
    fn sync_started(&self, _local_height: Option<u64>, _target_height: u64) {}
    fn retrieve_blocks(&self, _start: u64, _count: u64, _peer: &str) {}
    fn pending_blocks(&self, _start: u64, _count: usize) {}
    fn invalid_blocks(&self, _start: u64, _count: u64) {}
    fn process_pending(&self, _start: u64, _count: usize) {}
    fn sync_finished(&self, _height: u64) {}
    fn peer_discovered(&self, _url: &str) {}
}

impl OperationFeedback for NullFeedback {
    fn operation_started(&self, _operation: &str, _detail: &str) {}
    fn operation_finished(&self, _operation: &str, _detail: &str) {}
    fn operation_failed(&self, _operation: &str, _error: &str) {}
}
