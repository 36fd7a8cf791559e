//! Core types of the chain protocol
//!
//! This module contains the value types every other component speaks in:
//! hashes, compact difficulty targets, addresses, transactions, blocks,
//! the wire bundles they travel in, and the deterministic pre-image
//! layout used to hash them.

mod address;
mod block;
mod bundle;
mod hash;
mod hash_bits;
mod transaction;

pub mod encode;
pub mod genesis;

pub use address::Address;
pub use block::{BlockData, BlockHashed, BlockIdentity, BlockSigned, HashTarget};
pub use bundle::{BlockBundle, TransactionsBundle};
pub use hash::Hash;
pub use hash_bits::{HashBits, FRACTION_BITS, OFFSET_MASK, OFFSET_MAX};
pub use transaction::{Recipient, Transaction, TransactionSigned};

/// Constants of the protocol's value types
pub mod constants {
    /// Size of a hash in bytes (SHA-256)
    pub const HASH_SIZE: usize = 32;

    /// Timestamp resolution: ticks of 100 nanoseconds
    pub const TICKS_PER_SECOND: i64 = 10_000_000;
}

/// Current wall-clock time in ticks (100ns units since the Unix epoch)
pub fn now_ticks() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp() * constants::TICKS_PER_SECOND + now.timestamp_subsec_nanos() as i64 / 100
}
