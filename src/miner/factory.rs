//! Candidate block assembly

use crate::core::{
    genesis, now_ticks, Address, BlockData, BlockHashed, HashBits, Recipient, Transaction,
    TransactionSigned,
};
use crate::crypto::Cryptography;
use crate::feedback::MiningFeedback;
use crate::miner::Miner;
use crate::rules;
use std::sync::Arc;

/// Message carried by every mined block
pub const BLOCK_MESSAGE: &str = "^v^";

/// Assembles candidate blocks and hands them to a [`Miner`].
///
/// A candidate is the parent's successor carrying a coinbase
/// transaction, the current pending pool, and the retargeted difficulty
/// from the chain rules.
pub struct MinerFactory {
    crypto: Cryptography,
    feedback: Arc<dyn MiningFeedback>,
}

impl MinerFactory {
    /// Create a factory
    pub fn new(crypto: Cryptography, feedback: Arc<dyn MiningFeedback>) -> Self {
        Self { crypto, feedback }
    }

    /// Assemble a candidate on top of `last_block` paying `in_favor`,
    /// timestamped now
    pub fn create(
        &self,
        in_favor: Address,
        last_block: &BlockHashed,
        pending: Vec<TransactionSigned>,
    ) -> Miner {
        self.create_at(in_favor, last_block, pending, now_ticks())
    }

    /// Assemble a candidate with an explicit timestamp
    pub fn create_at(
        &self,
        in_favor: Address,
        last_block: &BlockHashed,
        pending: Vec<TransactionSigned>,
        time_stamp: i64,
    ) -> Miner {
        let mut transactions = vec![self.coinbase(in_favor, last_block, time_stamp)];
        transactions.extend(pending);

        let data = BlockData::new(
            last_block.index() + 1,
            time_stamp,
            BLOCK_MESSAGE,
            transactions,
            *last_block.hash(),
        );
        let target_bits = rules::target_bits(last_block, &data);
        self.build(in_favor, data, target_bits)
    }

    /// Assemble the genesis candidate for a fresh chain
    pub fn create_genesis(&self, time_stamp: i64) -> Miner {
        self.build(
            *genesis::GOD,
            genesis::block_data(time_stamp),
            genesis::TARGET,
        )
    }

    /// The reward-granting transaction: the system address pays the full
    /// block reward to the miner. A single recipient only.
    fn coinbase(
        &self,
        in_favor: Address,
        last_block: &BlockHashed,
        time_stamp: i64,
    ) -> TransactionSigned {
        self.crypto.sign_transaction(Transaction::new(
            *genesis::GOD,
            vec![Recipient::new(in_favor, rules::block_reward(last_block))],
            0,
            time_stamp,
        ))
    }

    fn build(&self, stamp: Address, data: BlockData, target_bits: HashBits) -> Miner {
        let signed = self.crypto.sign_block(data, stamp, target_bits);
        let signed_hash = self.crypto.hash(&signed);
        self.feedback
            .mine_new_block(target_bits.difficulty(genesis::TARGET), target_bits);
        Miner::new(signed, signed_hash, self.crypto, self.feedback.clone())
    }
}
