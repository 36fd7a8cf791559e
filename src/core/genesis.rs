//! The deterministic genesis block
//!
//! Every node must agree on the genesis content byte for byte, so all of
//! its inputs are fixed constants except the timestamp, which the first
//! node picks when it mines the block and every later node takes from
//! the candidate under validation.

use crate::core::address::Address;
use crate::core::block::{BlockData, BlockSigned};
use crate::core::hash::Hash;
use crate::core::hash_bits::HashBits;
use crate::core::transaction::{Recipient, Transaction, TransactionSigned};
use crate::crypto::Cryptography;
use once_cell::sync::Lazy;

/// Message carried by the genesis block
pub const MESSAGE: &str = "Fiat lux";

/// Reward granted to each genesis recipient, and the base mining reward
pub const REWARD: u64 = 0x100;

/// Difficulty target of the genesis block, and the easiest target the
/// retargeting algorithm may return
pub const TARGET: HashBits = HashBits::from_value(0x0fff_ffff_ffff_ffff);

/// Easiest representable target (zero offset, full fraction)
pub const MIN_TARGET: HashBits = HashBits::from_value(0x00ff_ffff_ffff_ffff);

/// Bound on a single retarget step, in percent
pub const ADJUSTMENT_PERCENT_LIMIT: i64 = 20;

/// System address that funds rewards
pub static GOD: Lazy<Address> = Lazy::new(|| Address::from_password("God"));

/// First funded address
pub static ADAM: Lazy<Address> = Lazy::new(|| Address::from_password("Adam"));

/// Second funded address
pub static EVE: Lazy<Address> = Lazy::new(|| Address::from_password("Eve"));

/// The fixed genesis transaction: the system address grants the genesis
/// reward to each of the two seed addresses. Its signature is the zero
/// hash rather than a content hash; the block that carries it is
/// validated as a whole against the fixed genesis content.
pub fn transaction() -> TransactionSigned {
    TransactionSigned::new(
        Transaction::new(
            *GOD,
            vec![Recipient::new(*ADAM, REWARD), Recipient::new(*EVE, REWARD)],
            0,
            0,
        ),
        Hash::ZERO,
    )
}

/// Genesis block content for a given timestamp
pub fn block_data(time_stamp: i64) -> BlockData {
    BlockData::new(0, time_stamp, MESSAGE, vec![transaction()], Hash::ZERO)
}

/// The signed genesis block for a given timestamp
pub fn signed_block(crypto: &Cryptography, time_stamp: i64) -> BlockSigned {
    crypto.sign_block(block_data(time_stamp), *GOD, TARGET)
}
