//! 256-bit hash type

use crate::core::constants::HASH_SIZE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 256-bit hash, stored big-endian (index 0 is the most significant byte).
///
/// The derived ordering is lexicographic over the bytes, which for a
/// big-endian layout coincides with big-integer magnitude comparison.
/// This is the comparison used to decide whether a proof hash is below
/// a difficulty target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
    /// The all-zero hash, used as the genesis parent
    pub const ZERO: Hash = Hash([0u8; HASH_SIZE]);

    /// Create a hash from big-endian bytes
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a hash from a hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes =
            hex::decode(hex).map_err(|e| Error::invalid_hash(format!("invalid hex: {}", e)))?;
        if bytes.len() != HASH_SIZE {
            return Err(Error::invalid_hash(format!(
                "expected {} bytes, got {}",
                HASH_SIZE,
                bytes.len()
            )));
        }
        let mut array = [0u8; HASH_SIZE];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Convert to a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Add `value` to the hash interpreted as a 256-bit big-endian integer.
    ///
    /// Fails with [`Error::Overflow`] when the carry runs off the most
    /// significant byte.
    pub fn increment(&mut self, value: u64) -> Result<()> {
        let mut carry = value as u128;
        for byte in self.0.iter_mut().rev() {
            if carry == 0 {
                return Ok(());
            }
            let sum = *byte as u128 + carry;
            *byte = (sum & 0xff) as u8;
            carry = sum >> 8;
        }
        if carry != 0 {
            return Err(Error::overflow("hash increment past 2^256"));
        }
        Ok(())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}
