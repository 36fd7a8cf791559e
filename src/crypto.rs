//! Hash computation and placeholder signing
//!
//! SHA-256 is the protocol hash for everything: block proofs, transaction
//! signatures, and address derivation. Real public-key signing is out of
//! scope, so "signing" a transaction means stamping it with its own
//! content hash, and "signing" a block means stamping it with the miner
//! address.

use crate::core::encode::Payload;
use crate::core::{Address, BlockData, BlockSigned, Hash, HashBits, Transaction, TransactionSigned};
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes
pub fn sha256(data: &[u8]) -> Hash {
    Hash::from_bytes(Sha256::digest(data).into())
}

/// Hashing and signing operations, injected into every component that
/// needs them rather than reached through a global.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cryptography;

impl Cryptography {
    /// Create a new instance
    pub fn new() -> Self {
        Self
    }

    /// Hash a value's pre-image
    pub fn hash<T: Payload + ?Sized>(&self, value: &T) -> Hash {
        sha256(&value.to_payload())
    }

    /// Hash raw bytes followed by a nonce
    pub fn hash_with_nonce(&self, data: &[u8], nonce: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.update(nonce.as_bytes());
        Hash::from_bytes(hasher.finalize().into())
    }

    /// Sign a transaction with its content hash
    pub fn sign_transaction(&self, data: Transaction) -> TransactionSigned {
        let sign = self.hash(&data);
        TransactionSigned::new(data, sign)
    }

    /// Stamp block content with the miner address and its target
    pub fn sign_block(&self, data: BlockData, stamp: Address, target: HashBits) -> BlockSigned {
        BlockSigned::new(data, stamp, target)
    }

    /// The proof hash of a signed block for a given nonce:
    /// `sha256(sha256(pre-image) ++ nonce)`
    pub fn block_proof(&self, signed: &BlockSigned, nonce: &Hash) -> Hash {
        let signed_hash = self.hash(signed);
        self.hash_with_nonce(signed_hash.as_bytes(), nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Recipient;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 of the empty input.
        assert_eq!(
            sha256(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_transaction_sign_is_content_hash() {
        let crypto = Cryptography::new();
        let tx = Transaction::new(
            Address::from_password("alice"),
            vec![Recipient::new(Address::from_password("bob"), 5)],
            0,
            42,
        );
        let signed = crypto.sign_transaction(tx.clone());
        assert_eq!(signed.sign, crypto.hash(&tx));
    }

    #[test]
    fn test_block_proof_commits_to_nonce() {
        let crypto = Cryptography::new();
        let signed = crypto.sign_block(
            BlockData::new(0, 0, "m", Vec::new(), Hash::ZERO),
            Address::from_password("miner"),
            HashBits::from_value(0x0fff_ffff_ffff_ffff),
        );

        let mut nonce = Hash::ZERO;
        let first = crypto.block_proof(&signed, &nonce);
        nonce.increment(1).unwrap();
        let second = crypto.block_proof(&signed, &nonce);
        assert_ne!(first, second);

        // Equivalent to hashing the signed hash and nonce by hand.
        let by_hand = crypto.hash_with_nonce(crypto.hash(&signed).as_bytes(), &nonce);
        assert_eq!(second, by_hand);
    }
}
