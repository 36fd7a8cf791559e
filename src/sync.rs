//! Multi-peer chain reconciliation
//!
//! Synchronization runs in two phases. Phase A asks every peer for its
//! latest block identity, groups the answers, and cross-validates lower
//! groups through a representative of the best group, producing the
//! highest corroborated `(height, hash)` and the peers that support it.
//! Phase B splits the gap between the local tip and that height into
//! pages fetched concurrently from the supporting peers, applying them
//! in index order, queueing pages that arrive early, and re-fetching
//! pages that fail validation from somebody else.

use crate::chain::{ChainData, ValidationOutcome};
use crate::core::{BlockHashed, BlockIdentity};
use crate::error::{Error, Result};
use crate::feedback::SyncFeedback;
use crate::network::{P2PNetwork, PeerConnection};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Upper bound on blocks per retrieval page
pub const SYNC_PAGE_SIZE: u64 = 3;

/// The best corroborated peer chain and the peers that vouch for it
pub struct LatestBlockPeers {
    /// Highest corroborated block identity
    pub block: BlockIdentity,
    /// Peers agreeing on that identity or corroborated by it
    pub peers: Vec<PeerConnection>,
}

/// Phase A: find the highest peer-reported chain whose ancestry other
/// peers confirm.
///
/// Peers answering with a malformed identity count are treated as
/// connection errors and dropped from the registry.
pub async fn select_best_chain(network: &P2PNetwork) -> Result<LatestBlockPeers> {
    let peers = network.connections();
    if peers.is_empty() {
        return Err(Error::sync("no connected peers"));
    }

    let queries = peers.into_iter().map(|peer| async move {
        let result = peer.client.block_identities(-1, 1).await;
        (peer, result)
    });

    let mut groups: HashMap<BlockIdentity, Vec<PeerConnection>> = HashMap::new();
    for (peer, result) in futures::future::join_all(queries).await {
        match result {
            Ok(identities) if identities.len() == 1 => {
                groups.entry(identities[0]).or_default().push(peer);
            }
            Ok(identities) => {
                warn!(
                    peer = %peer.url(),
                    count = identities.len(),
                    "malformed latest-identity response"
                );
                network.disconnect(&peer.url()).await;
            }
            Err(e) => {
                warn!(peer = %peer.url(), error = %e, "latest-identity query failed");
                network.disconnect(&peer.url()).await;
            }
        }
    }

    let mut ordered: VecDeque<(BlockIdentity, Vec<PeerConnection>)> =
        groups.into_iter().collect();
    ordered
        .make_contiguous()
        .sort_by(|a, b| b.0.height.cmp(&a.0.height));

    while let Some((best, mut supporters)) = ordered.pop_front() {
        if ordered.is_empty() {
            return Ok(LatestBlockPeers {
                block: best,
                peers: supporters,
            });
        }

        // One representative of the accepted group confirms every lower
        // candidate height in a single request. Unresponsive or
        // malformed representatives are dropped like any failing peer.
        let heights: Vec<u64> = ordered.iter().map(|(id, _)| id.height).collect();
        let mut confirmed = None;
        while let Some(representative) = supporters.first().cloned() {
            match representative.client.block_identities_at(&heights).await {
                Ok(identities) if identities.len() == heights.len() => {
                    confirmed = Some(identities);
                    break;
                }
                Ok(_) | Err(_) => {
                    warn!(
                        peer = %representative.url(),
                        "representative failed cross-validation query"
                    );
                    network.disconnect(&representative.url()).await;
                    supporters.remove(0);
                }
            }
        }

        // The whole group became unreachable; try the next best group.
        if supporters.is_empty() {
            continue;
        }

        if let Some(identities) = confirmed {
            for ((group_id, group_peers), reported) in ordered.into_iter().zip(identities) {
                if reported == group_id {
                    supporters.extend(group_peers);
                }
            }
        }

        return Ok(LatestBlockPeers {
            block: best,
            peers: supporters,
        });
    }

    Err(Error::sync("no peer has a valid chain"))
}

type FetchOutcome = (usize, u64, u64, Result<Vec<BlockHashed>>);

/// Phase B: gap-filling block retrieval from the corroborating peers
pub struct ChainSync {
    chain: Arc<Mutex<ChainData>>,
    target: BlockIdentity,
    peers: Vec<PeerConnection>,
    page_size: u64,
    /// Start of the next range nobody was asked for yet
    next_fetch: u64,
    /// Pages retrieved ahead of their predecessors, by start index,
    /// remembering which peer served them
    pending: BTreeMap<u64, (usize, u64, Vec<BlockHashed>)>,
    /// Ranges that must be re-fetched, by start index
    missing: BTreeMap<u64, u64>,
    /// Peers no longer eligible for assignments
    retired: HashSet<usize>,
    feedback: Arc<dyn SyncFeedback>,
}

impl ChainSync {
    /// Prepare a sync of `[start_index, target.height]` from the given
    /// peers
    pub fn new(
        chain: Arc<Mutex<ChainData>>,
        best: LatestBlockPeers,
        start_index: u64,
        page_size: u64,
        feedback: Arc<dyn SyncFeedback>,
    ) -> Self {
        Self {
            chain,
            target: best.block,
            peers: best.peers,
            page_size: page_size.max(1),
            next_fetch: start_index,
            pending: BTreeMap::new(),
            missing: BTreeMap::new(),
            retired: HashSet::new(),
            feedback,
        }
    }

    /// Run the retrieval loop to completion.
    ///
    /// Returns the final chain height. Fails when the peers could not
    /// supply a valid chain up to the corroborated target.
    pub async fn run(mut self) -> Result<u64> {
        if self.peers.is_empty() {
            return Err(Error::sync("no peers to sync from"));
        }

        let mut in_flight: FuturesUnordered<BoxFuture<'static, FetchOutcome>> =
            FuturesUnordered::new();
        let mut idle: VecDeque<usize> = (0..self.peers.len()).collect();
        self.arm_peers(&mut idle, &mut in_flight);

        while let Some((peer_index, start, count, result)) = in_flight.next().await {
            match result {
                Ok(blocks) => {
                    self.process_page(peer_index, start, count, blocks).await;
                    idle.push_back(peer_index);
                }
                Err(e) => {
                    warn!(
                        peer = %self.peers[peer_index].url(),
                        start, count, error = %e,
                        "block retrieval failed"
                    );
                    self.missing.insert(start, count);
                    self.retired.insert(peer_index);
                }
            }
            self.drain_pending().await;
            self.arm_peers(&mut idle, &mut in_flight);
        }

        let height = self.chain.lock().await.height();
        match height {
            Some(height) if height >= self.target.height => Ok(height),
            _ => Err(Error::sync(format!(
                "sync stopped at {:?}, target {}",
                height, self.target.height
            ))),
        }
    }

    /// Hand every idle peer its next assignment: a missing range first,
    /// otherwise the next unfetched range below the target.
    fn arm_peers(
        &mut self,
        idle: &mut VecDeque<usize>,
        in_flight: &mut FuturesUnordered<BoxFuture<'static, FetchOutcome>>,
    ) {
        while !idle.is_empty() {
            if self
                .retired
                .contains(idle.front().unwrap_or(&usize::MAX))
            {
                idle.pop_front();
                continue;
            }

            let assignment = if let Some((start, count)) = self.missing.pop_first() {
                Some((start, count))
            } else if self.next_fetch <= self.target.height {
                let start = self.next_fetch;
                let count = self.page_size.min(self.target.height - start + 1);
                self.next_fetch += count;
                Some((start, count))
            } else {
                None
            };

            let (start, count) = match assignment {
                Some(assignment) => assignment,
                None => break,
            };
            let peer_index = match idle.pop_front() {
                Some(peer_index) => peer_index,
                None => break,
            };

            let peer = self.peers[peer_index].clone();
            self.feedback.retrieve_blocks(start, count, &peer.url());
            in_flight.push(
                async move {
                    let result = peer.client.blocks(start as i64, count).await;
                    (peer_index, start, count, result)
                }
                .boxed(),
            );
        }
    }

    /// Apply a completed page, queue it when it is ahead of the chain,
    /// or mark it for retrieval elsewhere when it is unusable.
    async fn process_page(
        &mut self,
        peer_index: usize,
        start: u64,
        count: u64,
        blocks: Vec<BlockHashed>,
    ) {
        if blocks.is_empty() {
            // The peer has no blocks for the range; somebody else must
            // supply it, and this peer has nothing further to offer.
            self.retired.insert(peer_index);
            if start <= self.target.height {
                self.missing.insert(start, count);
            }
            return;
        }
        if blocks[0].index() != start {
            self.feedback.invalid_blocks(start, count);
            self.missing.insert(start, count);
            self.retired.insert(peer_index);
            return;
        }

        let next_expected = self.chain.lock().await.next_index();
        if start > next_expected {
            self.feedback.pending_blocks(start, blocks.len());
            self.pending.insert(start, (peer_index, count, blocks));
            return;
        }
        if !self.apply_blocks(start, count, blocks).await {
            // The page came from this peer and did not validate; the
            // range goes to a different peer.
            self.retired.insert(peer_index);
        }
    }

    /// Append a contiguous page starting at or before the next expected
    /// index. A block failing validation sends the rest of the range to
    /// `missing` and reports failure; partial progress before the
    /// failure is kept.
    async fn apply_blocks(&mut self, start: u64, count: u64, blocks: Vec<BlockHashed>) -> bool {
        {
            let mut chain = self.chain.lock().await;
            let next_expected = chain.next_index();
            let skip = (next_expected - start) as usize;
            for block in blocks.iter().skip(skip) {
                let index = block.index();
                match chain.add_new_block(block.clone()) {
                    ValidationOutcome::Healthy => {}
                    _ => {
                        // An oversized page cannot drive this below one.
                        let remaining = count.saturating_sub(index - start).max(1);
                        self.feedback.invalid_blocks(index, remaining);
                        self.missing.insert(index, remaining);
                        return false;
                    }
                }
            }
        }

        // A short page leaves a hole at its tail unless it already
        // reached the target.
        let received = blocks.len() as u64;
        if received < count && start + received <= self.target.height {
            self.missing.insert(start + received, count - received);
        }
        true
    }

    /// Apply queued pages in start order as far as contiguity allows
    async fn drain_pending(&mut self) {
        loop {
            let next_expected = self.chain.lock().await.next_index();
            let start = match self.pending.iter().next() {
                Some((&start, _)) if start <= next_expected => start,
                _ => break,
            };
            if let Some((peer_index, count, blocks)) = self.pending.remove(&start) {
                self.feedback.process_pending(start, blocks.len());
                if !self.apply_blocks(start, count, blocks).await {
                    self.retired.insert(peer_index);
                }
            }
        }
    }
}
