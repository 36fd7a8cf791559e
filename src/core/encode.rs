//! Deterministic hashing pre-image layout
//!
//! Every hashable value serializes to the concatenation of its fields in
//! declaration order: integers little-endian fixed width, strings as raw
//! UTF-8 bytes, arrays as element concatenation, hashes and addresses as
//! their raw 32 bytes. The layout is part of the consensus rules: two
//! nodes that disagree on a single byte here disagree on every block
//! hash.

use crate::core::address::Address;
use crate::core::block::{BlockData, BlockSigned};
use crate::core::hash::Hash;
use crate::core::hash_bits::HashBits;
use crate::core::transaction::{Recipient, Transaction, TransactionSigned};
use byteorder::{LittleEndian, WriteBytesExt};

/// Serialization into the hashing pre-image
pub trait Payload {
    /// Append this value's pre-image bytes to `out`
    fn write_payload(&self, out: &mut Vec<u8>);

    /// The value's full pre-image
    fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_payload(&mut out);
        out
    }
}

impl Payload for u64 {
    fn write_payload(&self, out: &mut Vec<u8>) {
        // Writing to a Vec cannot fail.
        let _ = out.write_u64::<LittleEndian>(*self);
    }
}

impl Payload for i64 {
    fn write_payload(&self, out: &mut Vec<u8>) {
        let _ = out.write_i64::<LittleEndian>(*self);
    }
}

impl Payload for str {
    fn write_payload(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl Payload for Hash {
    fn write_payload(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl Payload for Address {
    fn write_payload(&self, out: &mut Vec<u8>) {
        self.0.write_payload(out);
    }
}

impl Payload for HashBits {
    fn write_payload(&self, out: &mut Vec<u8>) {
        self.value().write_payload(out);
    }
}

impl<T: Payload> Payload for [T] {
    fn write_payload(&self, out: &mut Vec<u8>) {
        for item in self {
            item.write_payload(out);
        }
    }
}

impl Payload for Recipient {
    fn write_payload(&self, out: &mut Vec<u8>) {
        self.address.write_payload(out);
        self.amount.write_payload(out);
    }
}

impl Payload for Transaction {
    fn write_payload(&self, out: &mut Vec<u8>) {
        self.sender.write_payload(out);
        self.recipients.write_payload(out);
        self.fee.write_payload(out);
        self.time_stamp.write_payload(out);
    }
}

impl Payload for TransactionSigned {
    fn write_payload(&self, out: &mut Vec<u8>) {
        self.data.write_payload(out);
        self.sign.write_payload(out);
    }
}

impl Payload for BlockData {
    fn write_payload(&self, out: &mut Vec<u8>) {
        self.index.write_payload(out);
        self.time_stamp.write_payload(out);
        self.message.as_str().write_payload(out);
        self.transactions.write_payload(out);
        self.parent_hash.write_payload(out);
    }
}

impl Payload for BlockSigned {
    fn write_payload(&self, out: &mut Vec<u8>) {
        self.data.write_payload(out);
        self.stamp.write_payload(out);
        self.hash_target_bits.write_payload(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_little_endian() {
        assert_eq!(
            0x0102_0304_0506_0708u64.to_payload(),
            vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!((-2i64).to_payload(), vec![0xfe; 8]);
    }

    #[test]
    fn test_block_data_layout() {
        let data = BlockData::new(1, 2, "ab", Vec::new(), Hash::ZERO);
        let payload = data.to_payload();

        // index + timestamp + 2 message bytes + parent hash
        assert_eq!(payload.len(), 8 + 8 + 2 + 32);
        assert_eq!(payload[0], 1);
        assert_eq!(payload[8], 2);
        assert_eq!(&payload[16..18], b"ab");
        assert!(payload[18..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_payload_is_content_sensitive() {
        let base = BlockData::new(1, 2, "ab", Vec::new(), Hash::ZERO);
        let other = BlockData::new(1, 3, "ab", Vec::new(), Hash::ZERO);
        assert_ne!(base.to_payload(), other.to_payload());
    }
}
