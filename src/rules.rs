//! Deterministic chain rules
//!
//! The reward schedule and the difficulty retarget trigger. Both the
//! miner assembling a candidate and the validator checking a foreign
//! block must evaluate these identically.

use crate::core::constants::TICKS_PER_SECOND;
use crate::core::{genesis, BlockData, BlockHashed, HashBits};

/// Target interval between blocks, in ticks
pub const BLOCK_TIME_TICKS: i64 = 5 * TICKS_PER_SECOND;

/// Number of blocks between reward halvings
pub const REWARD_HALVING_INTERVAL: u64 = 0x100;

/// Mining reward for the block following `last_block`.
///
/// The reward halves every [`REWARD_HALVING_INTERVAL`] blocks and
/// saturates at zero once the shift exhausts the value.
pub fn block_reward(last_block: &BlockHashed) -> u64 {
    let halvings = last_block.index() / REWARD_HALVING_INTERVAL;
    genesis::REWARD.checked_shr(halvings as u32).unwrap_or(0)
}

/// Difficulty target for a candidate block: the parent's target adjusted
/// by the observed inter-block time against [`BLOCK_TIME_TICKS`].
pub fn target_bits(last_block: &BlockHashed, candidate: &BlockData) -> HashBits {
    last_block.signed.hash_target_bits.adjust(
        candidate.time_stamp - last_block.signed.data.time_stamp,
        BLOCK_TIME_TICKS,
        genesis::ADJUSTMENT_PERCENT_LIMIT,
        genesis::TARGET,
    )
}
