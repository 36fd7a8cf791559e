//! Wire bundles exchanged between peers

use crate::core::block::BlockHashed;
use crate::core::transaction::TransactionSigned;
use serde::{Deserialize, Serialize};

/// A batch of signed transactions plus the URL of the sending node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsBundle {
    /// URL of the node that sent the batch
    pub sender: String,
    /// The transactions themselves
    pub transactions: Vec<TransactionSigned>,
}

/// A single mined block plus the URL of the sending node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBundle {
    /// URL of the node that sent the block
    pub sender: String,
    /// The block itself
    pub block: BlockHashed,
}
