//! Parallel proof-of-work search
//!
//! A [`Miner`] searches for a nonce over one candidate block. Worker
//! tasks each own a disjoint nonce sub-range handed out by an atomic
//! counter; a manager task collects their reports, resolving the search
//! on the first winning hash and recording progress when a worker
//! exhausts its range and moves on to a fresh one. The pool can be
//! rescaled while the search runs, and `stop` cancels and joins
//! everything before returning.

mod factory;

pub use factory::{MinerFactory, BLOCK_MESSAGE};

use crate::core::{BlockHashed, BlockSigned, Hash, HashTarget};
use crate::crypto::Cryptography;
use crate::error::{Error, Result};
use crate::feedback::MiningFeedback;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Nonces a worker searches before reporting exhaustion and taking a
/// fresh sub-range. Large enough that workers rarely touch the shared
/// counter, small enough to bound the work discarded on cancellation.
pub const NONCE_STEP: u64 = 1 << 22;

/// Hashes between cancellation checks inside a worker
const CANCEL_CHECK_INTERVAL: u64 = 1 << 12;

enum WorkerReport {
    Found(HashTarget),
    Exhausted { hashes: u64 },
}

/// State shared between the workers and the manager
struct MinerShared {
    /// Hash of the signed envelope, the pre-image every nonce is tried
    /// against
    signed_hash: Hash,
    /// Expanded difficulty target
    target: Hash,
    crypto: Cryptography,
    /// Next unclaimed nonce sub-range base
    next_nonce_base: AtomicU64,
    cancel: CancellationToken,
    report_tx: mpsc::UnboundedSender<WorkerReport>,
}

struct WorkerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// One mining attempt over a single candidate block
pub struct Miner {
    signed_block: BlockSigned,
    shared: Arc<MinerShared>,
    workers: Mutex<Vec<WorkerHandle>>,
    manager: Mutex<Option<JoinHandle<()>>>,
    result_rx: watch::Receiver<Option<HashTarget>>,
    feedback: Arc<dyn MiningFeedback>,
}

impl Miner {
    /// Create a miner for a signed candidate block. `signed_hash` is the
    /// pre-computed hash of the signed envelope.
    pub fn new(
        signed_block: BlockSigned,
        signed_hash: Hash,
        crypto: Cryptography,
        feedback: Arc<dyn MiningFeedback>,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = watch::channel(None);

        let shared = Arc::new(MinerShared {
            signed_hash,
            target: signed_block.hash_target_bits.to_hash(),
            crypto,
            next_nonce_base: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            report_tx,
        });

        let manager = tokio::spawn(Self::manage(
            shared.clone(),
            report_rx,
            result_tx,
            feedback.clone(),
        ));

        Self {
            signed_block,
            shared,
            workers: Mutex::new(Vec::new()),
            manager: Mutex::new(Some(manager)),
            result_rx,
            feedback,
        }
    }

    /// The signed candidate being mined
    pub fn signed_block(&self) -> &BlockSigned {
        &self.signed_block
    }

    /// Current worker-pool size
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Scale the worker pool to `thread_count` workers.
    ///
    /// Idempotent: missing workers are spawned on fresh nonce
    /// sub-ranges, excess workers are cancelled and joined. Safe to call
    /// repeatedly while the search is running.
    pub async fn start(&self, thread_count: usize) {
        let thread_count = if thread_count == 0 {
            num_cpus::get()
        } else {
            thread_count
        };

        let mut stopped = Vec::new();
        {
            let mut workers = self.workers.lock();
            while workers.len() > thread_count {
                if let Some(worker) = workers.pop() {
                    worker.cancel.cancel();
                    stopped.push(worker.handle);
                }
            }
            while workers.len() < thread_count && !self.shared.cancel.is_cancelled() {
                let cancel = self.shared.cancel.child_token();
                let shared = self.shared.clone();
                let token = cancel.clone();
                let handle = task::spawn_blocking(move || search(&shared, &token));
                workers.push(WorkerHandle { cancel, handle });
            }
        }
        for handle in stopped {
            let _ = handle.await;
        }

        self.feedback.start_workers(thread_count);
    }

    /// Cancel the search and join the manager and every worker
    pub async fn stop(&self) {
        self.shared.cancel.cancel();

        let manager = self.manager.lock().take();
        if let Some(handle) = manager {
            let _ = handle.await;
        }

        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.handle.await;
        }
    }

    /// Wait for the search to finish.
    ///
    /// Resolves to the mined block when a worker finds a winning nonce,
    /// or to [`Error::Cancelled`] when the attempt is stopped first.
    pub async fn get_block(&self) -> Result<BlockHashed> {
        let mut rx = self.result_rx.clone();
        let hash_target = {
            let found = rx
                .wait_for(|result| result.is_some())
                .await
                .map_err(|_| Error::Cancelled)?;
            (*found).ok_or(Error::Cancelled)?
        };
        Ok(BlockHashed::new(self.signed_block.clone(), hash_target))
    }

    /// Wait on worker reports until a winning hash arrives or the search
    /// is cancelled. Exhaustion reports only surface progress; the
    /// worker that sent one has already moved to a fresh sub-range.
    async fn manage(
        shared: Arc<MinerShared>,
        mut report_rx: mpsc::UnboundedReceiver<WorkerReport>,
        result_tx: watch::Sender<Option<HashTarget>>,
        feedback: Arc<dyn MiningFeedback>,
    ) {
        loop {
            tokio::select! {
                _ = shared.cancel.cancelled() => {
                    feedback.mining_cancelled();
                    break;
                }
                report = report_rx.recv() => match report {
                    Some(WorkerReport::Found(hash_target)) => {
                        shared.cancel.cancel();
                        let _ = result_tx.send(Some(hash_target));
                        break;
                    }
                    Some(WorkerReport::Exhausted { hashes }) => {
                        feedback.hash_progress(hashes);
                    }
                    None => break,
                },
            }
        }
    }
}

/// Worker loop: claim a nonce sub-range, hash through it, report the
/// outcome, repeat until cancelled or a winner is found.
fn search(shared: &MinerShared, cancel: &CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let base = shared.next_nonce_base.fetch_add(NONCE_STEP, Ordering::Relaxed);
        let mut nonce = Hash::ZERO;
        if nonce.increment(base).is_err() {
            return;
        }

        let mut hashes = 0u64;
        for i in 0..NONCE_STEP {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return;
            }

            let hash = shared
                .crypto
                .hash_with_nonce(shared.signed_hash.as_bytes(), &nonce);
            hashes += 1;

            if hash < shared.target {
                let _ = shared
                    .report_tx
                    .send(WorkerReport::Found(HashTarget::new(nonce, hash)));
                return;
            }
            if nonce.increment(1).is_err() {
                break;
            }
        }

        if shared
            .report_tx
            .send(WorkerReport::Exhausted { hashes })
            .is_err()
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, BlockData, HashBits};
    use crate::feedback::NullFeedback;

    fn easy_miner() -> Miner {
        let crypto = Cryptography::new();
        // 4 leading zero bits: one winning nonce in 16 on average.
        let bits = HashBits::new(4, 0x00ff_ffff_ffff_ffff).unwrap();
        let signed = crypto.sign_block(
            BlockData::new(0, 0, "test", Vec::new(), Hash::ZERO),
            Address::from_password("miner"),
            bits,
        );
        let signed_hash = crypto.hash(&signed);
        Miner::new(signed, signed_hash, crypto, Arc::new(NullFeedback))
    }

    #[tokio::test]
    async fn test_single_threaded_search_terminates() {
        let miner = easy_miner();
        miner.start(1).await;

        let block = miner.get_block().await.unwrap();
        miner.stop().await;

        let target = block.signed.hash_target_bits.to_hash();
        assert!(block.hash_target.hash < target);

        // The proof recomputes from the block content.
        let crypto = Cryptography::new();
        assert_eq!(
            crypto.block_proof(&block.signed, &block.hash_target.nonce),
            block.hash_target.hash
        );
    }

    #[tokio::test]
    async fn test_scale_to_is_idempotent() {
        let crypto = Cryptography::new();
        // A hopeless target keeps workers busy while we rescale.
        let bits = HashBits::new(crate::core::OFFSET_MAX, 1).unwrap();
        let signed = crypto.sign_block(
            BlockData::new(0, 0, "test", Vec::new(), Hash::ZERO),
            Address::from_password("miner"),
            bits,
        );
        let signed_hash = crypto.hash(&signed);
        let miner = Miner::new(signed, signed_hash, crypto, Arc::new(NullFeedback));

        miner.start(4).await;
        assert_eq!(miner.worker_count(), 4);

        miner.start(4).await;
        assert_eq!(miner.worker_count(), 4);

        miner.start(1).await;
        assert_eq!(miner.worker_count(), 1);

        miner.stop().await;
        assert_eq!(miner.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_cancels_get_block() {
        let crypto = Cryptography::new();
        let bits = HashBits::new(crate::core::OFFSET_MAX, 1).unwrap();
        let signed = crypto.sign_block(
            BlockData::new(0, 0, "test", Vec::new(), Hash::ZERO),
            Address::from_password("miner"),
            bits,
        );
        let signed_hash = crypto.hash(&signed);
        let miner = Arc::new(Miner::new(
            signed,
            signed_hash,
            crypto,
            Arc::new(NullFeedback),
        ));

        miner.start(2).await;

        let waiter = {
            let miner = miner.clone();
            tokio::spawn(async move { miner.get_block().await })
        };

        miner.stop().await;
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, Err(Error::Cancelled)));
    }
}
