//! Account addresses

use crate::core::hash::Hash;
use crate::crypto;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An account address, derived by hashing a password or well-known seed.
///
/// Real public-key material is out of scope; the address doubles as the
/// placeholder identity used by signature checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub Hash);

impl Address {
    /// Derive an address from a password or seed string
    pub fn from_password(password: &str) -> Self {
        Self(crypto::sha256(password.as_bytes()))
    }

    /// The underlying hash value
    pub fn as_hash(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
