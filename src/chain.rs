//! Append-only chain state and the block validation state machine

use crate::core::{
    genesis, BlockHashed, BlockIdentity, Hash, TransactionSigned,
};
use crate::crypto::Cryptography;
use crate::feedback::ChainFeedback;
use crate::rules;
use dashmap::DashMap;
use std::sync::Arc;

/// Result of offering a block to the chain.
///
/// Validation outcomes are values, not errors: a rejected block is
/// permanently discarded, while `NeedSync` tells the caller the block is
/// ahead of local history and synchronization should run before it can
/// be judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The block was validated and appended
    Healthy,
    /// The block is further ahead than the next expected index; local
    /// history must be reconciled first
    NeedSync,
    /// The block violates a deterministic chain rule
    Rejected(String),
}

/// Confirmed and pending transaction counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionsInfo {
    /// Transactions included in accepted blocks
    pub confirmed: u64,
    /// Transactions awaiting inclusion
    pub pending: u64,
}

/// The chain vector and pending-transaction pool.
///
/// `ChainData` exclusively owns both; callers share it behind a lock and
/// every mutation goes through the validation state machine. Pending
/// transactions are keyed by signature, so duplicate submissions are
/// no-ops and inclusion in an accepted block drains them.
pub struct ChainData {
    chain: Vec<BlockHashed>,
    pending: DashMap<Hash, TransactionSigned>,
    crypto: Cryptography,
    feedback: Arc<dyn ChainFeedback>,
}

impl ChainData {
    /// Create empty chain state
    pub fn new(crypto: Cryptography, feedback: Arc<dyn ChainFeedback>) -> Self {
        Self {
            chain: Vec::new(),
            pending: DashMap::new(),
            crypto,
            feedback,
        }
    }

    /// The most recent block, if any
    pub fn last_block(&self) -> Option<&BlockHashed> {
        self.chain.last()
    }

    /// Height of the chain tip; `None` when the chain is empty
    pub fn height(&self) -> Option<u64> {
        self.chain.len().checked_sub(1).map(|h| h as u64)
    }

    /// Index the next accepted block must carry
    pub fn next_index(&self) -> u64 {
        self.chain.len() as u64
    }

    /// Validate a candidate block and append it on success.
    ///
    /// The chain is left untouched for both `NeedSync` and `Rejected`
    /// outcomes; only `Healthy` mutates state.
    pub fn add_new_block(&mut self, block: BlockHashed) -> ValidationOutcome {
        let outcome = self.validate(&block);
        match outcome {
            ValidationOutcome::Healthy => {
                let block_time = self
                    .last_block()
                    .map(|last| block.signed.data.time_stamp - last.signed.data.time_stamp)
                    .unwrap_or(0);
                self.remove_pending(&block.signed.data.transactions);
                self.feedback
                    .block_accepted(block.index(), block_time, block.hash());
                self.chain.push(block);
            }
            ValidationOutcome::Rejected(ref reason) => {
                self.feedback
                    .block_rejected(block.index(), block.hash(), reason);
            }
            ValidationOutcome::NeedSync => {}
        }
        outcome
    }

    fn validate(&self, block: &BlockHashed) -> ValidationOutcome {
        let expected_next = self.next_index();
        if block.index() > expected_next {
            return ValidationOutcome::NeedSync;
        }

        match self.last_block() {
            None => self.validate_genesis(block),
            Some(last) => {
                if let Some(reason) = self
                    .validate_parent(last, block)
                    .or_else(|| self.validate_hash_target(last, block))
                    .or_else(|| self.validate_block_hash(block))
                    .or_else(|| self.validate_stamp(block))
                    .or_else(|| self.validate_transactions(last, block))
                {
                    ValidationOutcome::Rejected(reason)
                } else {
                    ValidationOutcome::Healthy
                }
            }
        }
    }

    /// The first block must reproduce the deterministic genesis content
    /// for its own timestamp, and its proof must be the real
    /// proof-of-work hash over that content.
    fn validate_genesis(&self, block: &BlockHashed) -> ValidationOutcome {
        let expected = genesis::signed_block(&self.crypto, block.signed.data.time_stamp);
        if block.signed != expected {
            return ValidationOutcome::Rejected("genesis content mismatch".into());
        }
        let proof = self
            .crypto
            .block_proof(&expected, &block.hash_target.nonce);
        if proof != block.hash_target.hash {
            return ValidationOutcome::Rejected("genesis has invalid hash".into());
        }
        if block.hash_target.hash >= genesis::TARGET.to_hash() {
            return ValidationOutcome::Rejected("genesis hash is not below target".into());
        }
        ValidationOutcome::Healthy
    }

    fn validate_parent(&self, last: &BlockHashed, block: &BlockHashed) -> Option<String> {
        if block.index() != last.index() + 1 {
            return Some("not sequential block".into());
        }
        if block.signed.data.parent_hash != *last.hash() {
            return Some("parent hash mismatch".into());
        }
        None
    }

    fn validate_hash_target(&self, last: &BlockHashed, block: &BlockHashed) -> Option<String> {
        let expected_bits = rules::target_bits(last, &block.signed.data);
        if block.signed.hash_target_bits != expected_bits {
            return Some("block target bits are not valid".into());
        }
        if block.hash_target.hash >= expected_bits.to_hash() {
            return Some("block hash is not below target".into());
        }
        None
    }

    fn validate_block_hash(&self, block: &BlockHashed) -> Option<String> {
        let proof = self
            .crypto
            .block_proof(&block.signed, &block.hash_target.nonce);
        if proof != block.hash_target.hash {
            return Some("block has invalid hash".into());
        }
        None
    }

    /// Placeholder signature check: the block must be stamped by the
    /// address its coinbase pays.
    fn validate_stamp(&self, block: &BlockHashed) -> Option<String> {
        let coinbase = match block.signed.data.transactions.first() {
            Some(tx) => tx,
            None => return Some("block has no coinbase transaction".into()),
        };
        let beneficiary = match coinbase.data.recipients.first() {
            Some(recipient) => recipient.address,
            None => return Some("coinbase has no recipient".into()),
        };
        if block.signed.stamp != beneficiary {
            return Some("block stamp does not match coinbase recipient".into());
        }
        None
    }

    fn validate_transactions(&self, last: &BlockHashed, block: &BlockHashed) -> Option<String> {
        let transactions = &block.signed.data.transactions;
        // First transaction is the coinbase (already known non-empty).
        let coinbase = &transactions[0];
        if coinbase.data.sender != *genesis::GOD {
            return Some("coinbase sender is not the system address".into());
        }
        if coinbase.data.recipients.len() != 1 {
            return Some("coinbase must pay a single recipient".into());
        }
        let expected_reward = rules::block_reward(last);
        if coinbase.data.recipients[0].amount != expected_reward {
            return Some(format!(
                "coinbase reward {} differs from expected {}",
                coinbase.data.recipients[0].amount, expected_reward
            ));
        }
        for tx in transactions {
            if tx.sign != self.crypto.hash(&tx.data) {
                return Some("transaction signature mismatch".into());
            }
        }
        None
    }

    /// Insert a transaction into the pending pool unless one with the
    /// same signature is already there. Returns whether it was added.
    pub fn add_pending_transaction(&self, transaction: TransactionSigned) -> bool {
        match self.pending.entry(transaction.sign) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                self.feedback.new_transaction(&transaction);
                entry.insert(transaction);
                true
            }
        }
    }

    /// The full pending set, ready for inclusion in a candidate block
    pub fn select_transactions_to_mine(&self) -> Vec<TransactionSigned> {
        self.pending
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn remove_pending(&self, transactions: &[TransactionSigned]) {
        for tx in transactions {
            self.pending.remove(&tx.sign);
        }
    }

    /// Confirmed and pending transaction counts
    pub fn transactions_info(&self) -> TransactionsInfo {
        TransactionsInfo {
            confirmed: self
                .chain
                .iter()
                .map(|block| block.signed.data.transactions.len() as u64)
                .sum(),
            pending: self.pending.len() as u64,
        }
    }

    /// A contiguous page of blocks. A negative `start` selects the page
    /// beginning at the current tip.
    pub fn blocks_page(&self, start: i64, count: u64) -> Vec<BlockHashed> {
        let range = self.page_range(start, count);
        self.chain[range].to_vec()
    }

    /// Blocks at an explicit set of indexes; missing indexes are skipped
    pub fn blocks_at(&self, indexes: &[u64]) -> Vec<BlockHashed> {
        indexes
            .iter()
            .filter_map(|&i| self.chain.get(i as usize).cloned())
            .collect()
    }

    /// Identities for a contiguous page, shaped like [`Self::blocks_page`]
    pub fn identities_page(&self, start: i64, count: u64) -> Vec<BlockIdentity> {
        let range = self.page_range(start, count);
        self.chain[range].iter().map(BlockHashed::identity).collect()
    }

    /// Identities at an explicit set of indexes
    pub fn identities_at(&self, indexes: &[u64]) -> Vec<BlockIdentity> {
        indexes
            .iter()
            .filter_map(|&i| self.chain.get(i as usize).map(BlockHashed::identity))
            .collect()
    }

    fn page_range(&self, start: i64, count: u64) -> std::ops::Range<usize> {
        if count == 0 || self.chain.is_empty() {
            return 0..0;
        }
        let start = if start < 0 {
            self.chain.len() - 1
        } else {
            start as usize
        };
        if start >= self.chain.len() {
            return 0..0;
        }
        let end = (start + count as usize).min(self.chain.len());
        start..end
    }
}
