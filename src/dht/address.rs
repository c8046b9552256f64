//! Kademlia addresses
//!
//! A DHT address is a 256-bit value, the short id of the node's public key.
//! Distance between addresses is XOR, compared as big-endian integers.

use crate::crypto::key_id_ed25519;
use std::fmt;

/// A 256-bit address in the key space
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DhtAddress([u8; 32]);

impl DhtAddress {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Address of a node, the short id of its ed25519 key
    pub fn from_public_key(key: &[u8; 32]) -> Self {
        Self(key_id_ed25519(key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// XOR distance to another address
    pub fn distance(&self, other: &DhtAddress) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Bucket index of another address: the position of the distance's
    /// highest set bit
    ///
    /// Zero distance means the other address is our own, which never enters
    /// the table, so it maps to no bucket.
    pub fn bucket_index(&self, other: &DhtAddress) -> Option<usize> {
        let distance = self.distance(other);
        for (i, byte) in distance.iter().enumerate() {
            if *byte != 0 {
                let bit_in_byte = 7 - byte.leading_zeros() as usize;
                return Some((31 - i) * 8 + bit_in_byte);
            }
        }
        None
    }
}

impl fmt::Debug for DhtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DhtAddress({})", hex::encode(self.0))
    }
}

impl fmt::Display for DhtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for DhtAddress {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: u8) -> DhtAddress {
        DhtAddress::new([fill; 32])
    }

    #[test]
    fn test_distance_identity_and_symmetry() {
        let a = addr(0x55);
        let b = addr(0xAA);
        assert_eq!(a.distance(&a), [0u8; 32]);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(a.distance(&b), [0xFFu8; 32]);
    }

    #[test]
    fn test_bucket_index_of_self_is_none() {
        let a = addr(0x42);
        assert_eq!(a.bucket_index(&a), None);
    }

    #[test]
    fn test_bucket_index_positions() {
        let zero = addr(0x00);

        let mut lowest = [0u8; 32];
        lowest[31] = 0x01;
        assert_eq!(zero.bucket_index(&DhtAddress::new(lowest)), Some(0));

        let mut highest = [0u8; 32];
        highest[0] = 0x80;
        assert_eq!(zero.bucket_index(&DhtAddress::new(highest)), Some(255));

        let mut mid = [0u8; 32];
        mid[30] = 0x10; // bit 12 of the big-endian value
        assert_eq!(zero.bucket_index(&DhtAddress::new(mid)), Some(12));
    }

    #[test]
    fn test_bucket_index_uses_highest_set_bit() {
        let zero = addr(0x00);
        let mut d = [0u8; 32];
        d[31] = 0xFF;
        d[29] = 0x01;
        // bit 16 dominates the low byte
        assert_eq!(zero.bucket_index(&DhtAddress::new(d)), Some(16));
    }

    #[test]
    fn test_address_from_public_key_is_short_id() {
        let key = [7u8; 32];
        assert_eq!(
            DhtAddress::from_public_key(&key).as_bytes(),
            &key_id_ed25519(&key)
        );
    }
}
