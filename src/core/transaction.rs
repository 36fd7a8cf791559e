//! Transactions and the signed envelope they travel in

use crate::core::address::Address;
use crate::core::hash::Hash;
use serde::{Deserialize, Serialize};

/// A single payout inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Receiving address
    pub address: Address,
    /// Amount in base units
    pub amount: u64,
}

impl Recipient {
    /// Create a new recipient
    pub fn new(address: Address, amount: u64) -> Self {
        Self { address, amount }
    }
}

/// Transfer of value from one sender to one or more recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sending address
    pub sender: Address,
    /// Payout list
    pub recipients: Vec<Recipient>,
    /// Fee offered to the miner, in base units
    pub fee: u64,
    /// Creation time in ticks
    pub time_stamp: i64,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(sender: Address, recipients: Vec<Recipient>, fee: u64, time_stamp: i64) -> Self {
        Self {
            sender,
            recipients,
            fee,
            time_stamp,
        }
    }
}

/// A transaction together with its signature.
///
/// The signature is a placeholder: it is the hash of the transaction
/// content rather than a public-key signature, which keeps transactions
/// uniquely keyed and tamper-evident without real key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSigned {
    /// Transaction content
    pub data: Transaction,
    /// Content hash standing in for a signature
    pub sign: Hash,
}

impl TransactionSigned {
    /// Wrap a transaction with its computed signature
    pub fn new(data: Transaction, sign: Hash) -> Self {
        Self { data, sign }
    }
}
