//! Compact difficulty-target encoding
//!
//! A [`HashBits`] packs a 256-bit difficulty target into a single `u64`:
//! an 8-bit `offset` (the number of leading zero bits in the expanded
//! target) in the top byte, and a 56-bit `fraction` (the significant
//! bits of the target) below it. The encoding must expand and retarget
//! bit-for-bit identically on every node, otherwise validators disagree
//! on which blocks are acceptable.

use crate::core::constants::HASH_SIZE;
use crate::core::hash::Hash;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits the offset byte is shifted from the low end
const OFFSET_SHIFT: u32 = 56;

/// Mask selecting the offset byte of the packed value
pub const OFFSET_MASK: u64 = !0u64 << OFFSET_SHIFT;

/// Number of bits available to the fraction
pub const FRACTION_BITS: u32 = OFFSET_SHIFT;

/// Largest offset at which the fraction still fits inside 256 bits
pub const OFFSET_MAX: u8 = (HASH_SIZE as u32 * 8 - FRACTION_BITS) as u8;

/// Compact `(offset, fraction)` difficulty target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashBits(u64);

impl HashBits {
    /// Build a target from an already-packed value.
    ///
    /// The value is trusted; use [`HashBits::new`] to validate the parts.
    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    /// Build a target from its parts, validating the offset range and
    /// that the fraction does not spill into the offset byte.
    pub fn new(offset: u8, fraction: u64) -> Result<Self> {
        if offset > OFFSET_MAX {
            return Err(Error::invalid_target(format!(
                "offset {} exceeds {}",
                offset, OFFSET_MAX
            )));
        }
        if fraction & OFFSET_MASK != 0 {
            return Err(Error::invalid_target(format!(
                "fraction {:#x} overlaps the offset byte",
                fraction
            )));
        }
        Ok(Self(((offset as u64) << OFFSET_SHIFT) | fraction))
    }

    /// The packed 64-bit value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The offset in bits of the fraction from the highest hash bit
    pub const fn offset(self) -> u8 {
        ((self.0 & OFFSET_MASK) >> OFFSET_SHIFT) as u8
    }

    /// The 56-bit fraction
    pub const fn fraction(self) -> u64 {
        self.0 & !OFFSET_MASK
    }

    /// Expand the compact target into a full 256-bit hash.
    ///
    /// The fraction's 7 bytes are written starting `offset` bits from the
    /// top of the hash. A non-zero bit offset shifts the bytes across
    /// byte boundaries, carrying the displaced low bits into the next
    /// byte; a carry that would land past the last byte is dropped.
    pub fn to_hash(self) -> Hash {
        let mut result = [0u8; HASH_SIZE];
        let bits_offset = self.offset() as usize;
        let bytes_offset = bits_offset / 8;
        let bit_shift = (bits_offset % 8) as u32;
        let fraction_mask = 0xffu8 >> bit_shift;
        let remainder_mask = !fraction_mask;
        let remainder_shift = 8 - bit_shift;

        // The top byte of the big-endian u64 is the offset byte; the
        // remaining 7 bytes are the fraction, most significant first.
        let fraction_bytes = &self.fraction().to_be_bytes()[1..];

        let mut remainder = 0u8;
        let mut i = 0;
        while i < fraction_bytes.len() && bytes_offset + i < HASH_SIZE {
            let fraction_bits = (fraction_bytes[i] >> bit_shift) & fraction_mask;
            result[bytes_offset + i] = fraction_bits | remainder;
            remainder = (((fraction_bytes[i] as u16) << remainder_shift) as u8) & remainder_mask;
            i += 1;
        }
        if bytes_offset + i < HASH_SIZE {
            result[bytes_offset + i] = remainder;
        }

        Hash::from_bytes(result)
    }

    /// Retarget proportionally to the ratio of actual to target block time.
    ///
    /// The single-step change is bounded to `percent_limit` percent in
    /// either direction so one slow or fast block cannot swing the
    /// difficulty wildly. The adjustment is split into a power-of-two
    /// part (tracked as an offset delta while doubling the smaller time
    /// delta) and a residual fractional multiplier applied to the
    /// fraction in 128-bit integer arithmetic, so every node computes an
    /// identical result. A result easier than `min_target` is clamped to
    /// `min_target`; a result with an offset past [`OFFSET_MAX`]
    /// saturates there, shifting the fraction to compensate.
    pub fn adjust(
        self,
        current_time_delta: i64,
        target_time_delta: i64,
        percent_limit: i64,
        min_target: HashBits,
    ) -> HashBits {
        if current_time_delta == target_time_delta {
            return self;
        }

        let mut current = current_time_delta;
        let mut target = target_time_delta;
        let mut offset_adjust: i32 = 0;
        let mut fraction: u64;

        if target < current {
            // Blocks arrived slower than intended: ease the difficulty.
            let limit = target + target * percent_limit / 100;
            if current > limit {
                current = limit;
            }

            while target < current {
                target <<= 1;
                offset_adjust -= 1;
            }

            // The offset moved one power of two past the ratio, so scale
            // the fraction back with a multiplier in (1/2, 1]. The spare
            // high bit left by the offset byte allows the pre-shift.
            fraction =
                (((self.fraction() as u128) << 1) * current as u128 / target as u128) as u64;
            offset_adjust += 1;
        } else {
            // Blocks arrived faster than intended: raise the difficulty.
            let limit = target * 100 / (100 + percent_limit);
            if current < limit {
                current = limit;
            }

            while current < target {
                current <<= 1;
                offset_adjust += 1;
            }

            // Multiplier in [1, 2) applied to the fraction.
            fraction = ((self.fraction() as u128) * current as u128 / target as u128) as u64;
        }

        // Normalize when the scaled fraction spilled into the offset byte.
        if fraction & OFFSET_MASK != 0 {
            fraction >>= 1;
            offset_adjust -= 1;
        }

        let new_offset = self.offset() as i32 + offset_adjust;
        if new_offset < min_target.offset() as i32 {
            return min_target;
        }
        if new_offset > OFFSET_MAX as i32 {
            return Self::from_parts_saturating(
                OFFSET_MAX,
                fraction >> (new_offset - OFFSET_MAX as i32),
            );
        }
        Self::from_parts_saturating(new_offset as u8, fraction)
    }

    /// Relative work factor against a reference target, for display only
    pub fn difficulty(self, genesis_target: HashBits) -> f64 {
        let exponent = self.offset() as i32 - genesis_target.offset() as i32;
        2f64.powi(exponent) * (genesis_target.fraction() as f64 / self.fraction() as f64)
    }

    // The parts are produced by `adjust` and are in range by
    // construction; avoid threading a Result through retargeting.
    fn from_parts_saturating(offset: u8, fraction: u64) -> Self {
        Self(((offset as u64) << OFFSET_SHIFT) | (fraction & !OFFSET_MASK))
    }
}

impl fmt::Display for HashBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Serialize for HashBits {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format!("{:016x}", self.0))
    }
}

impl<'de> Deserialize<'de> for HashBits {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        let value = u64::from_str_radix(&hex, 16).map_err(serde::de::Error::custom)?;
        Ok(Self(value))
    }
}
