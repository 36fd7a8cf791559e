//! Block types, from raw content to the fully-mined block

use crate::core::hash::Hash;
use crate::core::hash_bits::HashBits;
use crate::core::transaction::TransactionSigned;
use crate::core::Address;
use serde::{Deserialize, Serialize};

/// The content of a block, immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockData {
    /// Position in the chain, starting at 0 for genesis
    pub index: u64,
    /// Creation time in ticks
    pub time_stamp: i64,
    /// Free-form miner message
    pub message: String,
    /// Coinbase followed by the included pending transactions
    pub transactions: Vec<TransactionSigned>,
    /// Proof hash of the parent block
    pub parent_hash: Hash,
}

impl BlockData {
    /// Create new block content
    pub fn new(
        index: u64,
        time_stamp: i64,
        message: impl Into<String>,
        transactions: Vec<TransactionSigned>,
        parent_hash: Hash,
    ) -> Self {
        Self {
            index,
            time_stamp,
            message: message.into(),
            transactions,
            parent_hash,
        }
    }
}

/// Block content stamped by its miner, together with the difficulty
/// target it was mined against. This is the envelope the proof-of-work
/// hash commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSigned {
    /// Block content
    pub data: BlockData,
    /// Address of the miner that assembled the block
    pub stamp: Address,
    /// Compact difficulty target the proof must beat
    pub hash_target_bits: HashBits,
}

impl BlockSigned {
    /// Stamp block content with a miner address and target
    pub fn new(data: BlockData, stamp: Address, hash_target_bits: HashBits) -> Self {
        Self {
            data,
            stamp,
            hash_target_bits,
        }
    }
}

/// The winning proof for a signed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTarget {
    /// Nonce that produced the winning hash
    pub nonce: Hash,
    /// The proof hash itself
    pub hash: Hash,
}

impl HashTarget {
    /// Create a new proof
    pub fn new(nonce: Hash, hash: Hash) -> Self {
        Self { nonce, hash }
    }
}

/// A fully-mined block: the signed envelope plus its proof-of-work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHashed {
    /// Signed block envelope
    pub signed: BlockSigned,
    /// Accepted proof
    pub hash_target: HashTarget,
}

impl BlockHashed {
    /// Pair a signed block with its proof
    pub fn new(signed: BlockSigned, hash_target: HashTarget) -> Self {
        Self {
            signed,
            hash_target,
        }
    }

    /// Chain position of this block
    pub fn index(&self) -> u64 {
        self.signed.data.index
    }

    /// Proof hash, the value child blocks link to
    pub fn hash(&self) -> &Hash {
        &self.hash_target.hash
    }

    /// Lightweight identity for cross-peer comparison
    pub fn identity(&self) -> BlockIdentity {
        BlockIdentity::new(self.index(), self.hash_target.hash)
    }
}

/// `(height, hash)` pair identifying a block without carrying its body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockIdentity {
    /// Chain position
    pub height: u64,
    /// Proof hash at that position
    pub hash: Hash,
}

impl BlockIdentity {
    /// Create a new identity
    pub fn new(height: u64, hash: Hash) -> Self {
        Self { height, hash }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_reflects_index_and_hash() {
        let data = BlockData::new(3, 77, "m", Vec::new(), Hash::ZERO);
        let signed = BlockSigned::new(
            data,
            Address::from_password("miner"),
            HashBits::from_value(0x0fff_ffff_ffff_ffff),
        );
        let mut proof = Hash::ZERO;
        proof.increment(9).unwrap();
        let block = BlockHashed::new(signed, HashTarget::new(Hash::ZERO, proof));

        assert_eq!(block.index(), 3);
        assert_eq!(block.identity(), BlockIdentity::new(3, proof));
    }
}
