//! Node orchestration
//!
//! The engine owns the chain state and drives the mining loop: assemble
//! a candidate, search for a nonce, apply and broadcast the result,
//! repeat. Foreign blocks and transactions arrive through the same
//! engine, and a pause gate keeps foreign-block reconciliation and the
//! mining loop from ever racing on chain state: whichever path runs
//! first holds the gate, and accepting a foreign block cancels the
//! in-flight local attempt instead of merging with it.

use crate::chain::{ChainData, TransactionsInfo, ValidationOutcome};
use crate::core::{
    now_ticks, Address, BlockBundle, BlockHashed, BlockIdentity, Transaction, TransactionsBundle,
    TransactionSigned,
};
use crate::crypto::Cryptography;
use crate::error::{Error, Result};
use crate::feedback::{MiningFeedback, OperationFeedback, SyncFeedback};
use crate::miner::{Miner, MinerFactory};
use crate::network::P2PNetwork;
use crate::sync::{self, ChainSync, SYNC_PAGE_SIZE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Which blocks a retrieval query selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSelection {
    /// A contiguous page; a negative `start` selects from the tip
    Page {
        /// First block index, or -1 for the tip
        start: i64,
        /// Maximum number of blocks
        count: u64,
    },
    /// An explicit set of block indexes
    Indexes(Vec<u64>),
}

/// The node engine: chain state, mining loop, and foreign input paths
pub struct Engine {
    chain: Arc<Mutex<ChainData>>,
    network: P2PNetwork,
    factory: MinerFactory,
    crypto: Cryptography,
    mining_feedback: Arc<dyn MiningFeedback>,
    sync_feedback: Arc<dyn SyncFeedback>,
    op_feedback: Arc<dyn OperationFeedback>,
    /// Held by whichever of the mining loop and the foreign-block path
    /// is touching chain state
    mine_gate: Mutex<()>,
    current_miner: Mutex<Option<Arc<Miner>>>,
    mining_threads: AtomicUsize,
    mining_cancel: CancellationToken,
    mining_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Wire up an engine
    pub fn new(
        chain: Arc<Mutex<ChainData>>,
        network: P2PNetwork,
        factory: MinerFactory,
        crypto: Cryptography,
        mining_feedback: Arc<dyn MiningFeedback>,
        sync_feedback: Arc<dyn SyncFeedback>,
        op_feedback: Arc<dyn OperationFeedback>,
    ) -> Self {
        Self {
            chain,
            network,
            factory,
            crypto,
            mining_feedback,
            sync_feedback,
            op_feedback,
            mine_gate: Mutex::new(()),
            current_miner: Mutex::new(None),
            mining_threads: AtomicUsize::new(0),
            mining_cancel: CancellationToken::new(),
            mining_task: parking_lot::Mutex::new(None),
        }
    }

    /// Shared chain state
    pub fn chain(&self) -> Arc<Mutex<ChainData>> {
        self.chain.clone()
    }

    /// Height of the local tip
    pub async fn height(&self) -> Option<u64> {
        self.chain.lock().await.height()
    }

    /// Mine the genesis block if the chain is still empty.
    ///
    /// A node that just synchronized from peers already has one and
    /// skips this.
    pub async fn ensure_genesis(&self) -> Result<()> {
        if self.chain.lock().await.height().is_some() {
            return Ok(());
        }

        let miner = Arc::new(self.factory.create_genesis(now_ticks()));
        miner.start(self.thread_count()).await;
        let block = miner.get_block().await;
        miner.stop().await;

        let outcome = self.chain.lock().await.add_new_block(block?);
        match outcome {
            ValidationOutcome::Healthy => Ok(()),
            other => Err(Error::other(format!("genesis not accepted: {:?}", other))),
        }
    }

    /// Start the mining loop paying `address`, with `threads` workers
    /// (0 meaning one per CPU). A second call while mining only rescales.
    pub async fn start_mining(self: Arc<Self>, address: Address, threads: usize) {
        self.mining_threads.store(threads, Ordering::Relaxed);

        let already_running = self.mining_task.lock().is_some();
        if already_running {
            self.scale_mining(threads).await;
            return;
        }

        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.mining_loop(address).await });
        *self.mining_task.lock() = Some(handle);
    }

    /// Rescale the worker pool of the in-flight mining attempt
    pub async fn scale_mining(&self, threads: usize) {
        self.mining_threads.store(threads, Ordering::Relaxed);
        let miner = self.current_miner.lock().await.clone();
        if let Some(miner) = miner {
            miner.start(self.thread_count()).await;
        }
    }

    /// Cancel mining and wait for the loop to drain
    pub async fn stop_mining(&self) {
        self.mining_cancel.cancel();
        self.cancel_current_attempt().await;
        let handle = self.mining_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Offer a foreign block to the chain.
    ///
    /// Mining is paused for the duration. Acceptance cancels the local
    /// attempt; a block from ahead of local history triggers a full
    /// chain synchronization before mining resumes.
    pub async fn accept_block(&self, bundle: BlockBundle) -> Result<ValidationOutcome> {
        let _gate = self.mine_gate.lock().await;
        let outcome = self.chain.lock().await.add_new_block(bundle.block);
        match outcome {
            ValidationOutcome::Healthy => {
                self.cancel_current_attempt().await;
            }
            ValidationOutcome::NeedSync => {
                self.cancel_current_attempt().await;
                self.sync_chain().await?;
            }
            ValidationOutcome::Rejected(_) => {}
        }
        Ok(outcome)
    }

    /// Accept a batch of foreign transactions into the pending pool.
    ///
    /// Transactions whose signature does not match their content are
    /// dropped; newly-seen ones are re-broadcast. Returns how many were
    /// new.
    pub async fn accept_transactions(&self, bundle: TransactionsBundle) -> Result<usize> {
        let mut fresh = Vec::new();
        {
            let chain = self.chain.lock().await;
            for tx in bundle.transactions {
                if tx.sign != self.crypto.hash(&tx.data) {
                    warn!(sign = %tx.sign, "dropping transaction with invalid signature");
                    continue;
                }
                if chain.add_pending_transaction(tx.clone()) {
                    fresh.push(tx);
                }
            }
        }

        let count = fresh.len();
        if count > 0 {
            self.network.broadcast_transactions(fresh).await;
        }
        Ok(count)
    }

    /// Sign a locally-created transaction, pool it, and broadcast it
    pub async fn submit_transaction(&self, transaction: Transaction) -> Result<TransactionSigned> {
        let signed = self.crypto.sign_transaction(transaction);
        let added = self
            .chain
            .lock()
            .await
            .add_pending_transaction(signed.clone());
        if added {
            self.network.broadcast_transactions(vec![signed.clone()]).await;
        }
        Ok(signed)
    }

    /// Reconcile local chain state against the connected peers.
    ///
    /// Phase A selects the best corroborated peer chain; phase B fills
    /// the gap. A no-op when the local chain is already at or past the
    /// corroborated height.
    pub async fn sync_chain(&self) -> Result<u64> {
        let best = sync::select_best_chain(&self.network).await?;

        let (local_height, start_index) = {
            let chain = self.chain.lock().await;
            (chain.height(), chain.next_index())
        };
        if let Some(height) = local_height {
            if best.block.height <= height {
                return Ok(height);
            }
        }

        self.sync_feedback
            .sync_started(local_height, best.block.height);

        let blocks_to_sync = best.block.height + 1 - start_index;
        let page_size = SYNC_PAGE_SIZE.min(blocks_to_sync / best.peers.len() as u64 + 1);

        let height = ChainSync::new(
            self.chain.clone(),
            best,
            start_index,
            page_size,
            self.sync_feedback.clone(),
        )
        .run()
        .await?;

        self.sync_feedback.sync_finished(height);
        Ok(height)
    }

    /// Blocks matching a retrieval query
    pub async fn blocks(&self, selection: &BlockSelection) -> Vec<BlockHashed> {
        let chain = self.chain.lock().await;
        match selection {
            BlockSelection::Page { start, count } => chain.blocks_page(*start, *count),
            BlockSelection::Indexes(indexes) => chain.blocks_at(indexes),
        }
    }

    /// Block identities matching a retrieval query
    pub async fn block_identities(&self, selection: &BlockSelection) -> Vec<BlockIdentity> {
        let chain = self.chain.lock().await;
        match selection {
            BlockSelection::Page { start, count } => chain.identities_page(*start, *count),
            BlockSelection::Indexes(indexes) => chain.identities_at(indexes),
        }
    }

    /// Confirmed and pending transaction counts
    pub async fn transactions_info(&self) -> TransactionsInfo {
        self.chain.lock().await.transactions_info()
    }

    fn thread_count(&self) -> usize {
        match self.mining_threads.load(Ordering::Relaxed) {
            0 => num_cpus::get(),
            n => n,
        }
    }

    async fn cancel_current_attempt(&self) {
        let miner = self.current_miner.lock().await.clone();
        if let Some(miner) = miner {
            miner.stop().await;
        }
    }

    /// Assemble, mine, apply, broadcast; repeat until cancelled. Errors
    /// are reported and the loop continues with fresh state rather than
    /// taking the node down.
    async fn mining_loop(self: Arc<Self>, address: Address) {
        while !self.mining_cancel.is_cancelled() {
            if let Err(e) = self.mine_one(address).await {
                self.op_feedback.operation_failed("mine", &e.to_string());
                // Back off so a persistent failure cannot spin the loop.
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
        }
    }

    async fn mine_one(&self, address: Address) -> Result<()> {
        let started = now_ticks();

        let miner = {
            let _gate = self.mine_gate.lock().await;
            let chain = self.chain.lock().await;
            let last_block = match chain.last_block() {
                Some(block) => block.clone(),
                None => return Err(Error::miner("cannot mine on an empty chain")),
            };
            let pending = chain.select_transactions_to_mine();
            let miner = Arc::new(self.factory.create(address, &last_block, pending));
            *self.current_miner.lock().await = Some(miner.clone());
            miner
        };

        miner.start(self.thread_count()).await;
        let result = miner.get_block().await;
        miner.stop().await;
        *self.current_miner.lock().await = None;

        match result {
            Ok(block) => {
                let height = block.index();
                let _gate = self.mine_gate.lock().await;
                let outcome = self.chain.lock().await.add_new_block(block.clone());
                if outcome == ValidationOutcome::Healthy {
                    self.mining_feedback
                        .block_mined(height, now_ticks() - started);
                    let network = self.network.clone();
                    tokio::spawn(async move { network.broadcast_block(&block).await });
                }
                Ok(())
            }
            // Preempted by a foreign block or a shutdown; not a failure.
            Err(Error::Cancelled) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{genesis, Recipient};
    use crate::feedback::NullFeedback;
    use crate::network::HttpClientFactory;
    use std::time::Duration;

    fn engine() -> Arc<Engine> {
        let crypto = Cryptography::new();
        let feedback = Arc::new(NullFeedback);
        let chain = Arc::new(Mutex::new(ChainData::new(crypto, feedback.clone())));
        let factory = MinerFactory::new(crypto, feedback.clone());
        let network = P2PNetwork::new(
            "http://localhost:9/",
            Arc::new(HttpClientFactory::new(Duration::from_millis(100))),
            feedback.clone(),
        );
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

    #[tokio::test]
    async fn test_ensure_genesis_is_idempotent() {
        let engine = engine();
        engine.ensure_genesis().await.unwrap();
        assert_eq!(engine.height().await, Some(0));

        // A second call finds the chain populated and does nothing.
        engine.ensure_genesis().await.unwrap();
        assert_eq!(engine.height().await, Some(0));
    }

    #[tokio::test]
    async fn test_submit_transaction_signs_and_pools() {
        let engine = engine();
        let tx = Transaction::new(
            *genesis::ADAM,
            vec![Recipient::new(*genesis::EVE, 5)],
            0,
            now_ticks(),
        );

        let signed = engine.submit_transaction(tx.clone()).await.unwrap();
        assert_eq!(signed.sign, Cryptography::new().hash(&tx));
        assert_eq!(engine.transactions_info().await.pending, 1);

        // Resubmission is a no-op.
        engine.submit_transaction(tx).await.unwrap();
        assert_eq!(engine.transactions_info().await.pending, 1);
    }

    #[tokio::test]
    async fn test_accept_transactions_drops_bad_signatures() {
        let engine = engine();
        let crypto = Cryptography::new();

        let good = crypto.sign_transaction(Transaction::new(
            *genesis::ADAM,
            vec![Recipient::new(*genesis::EVE, 1)],
            0,
            1,
        ));
        let mut bad = good.clone();
        bad.data.fee = 99;

        let accepted = engine
            .accept_transactions(TransactionsBundle {
                sender: "http://peer/".into(),
                transactions: vec![good, bad],
            })
            .await
            .unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(engine.transactions_info().await.pending, 1);
    }
}
