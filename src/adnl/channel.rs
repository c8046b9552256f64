//! Symmetric channels
//!
//! Once two peers exchange channel keys they switch from full envelopes to
//! lighter channel frames: a 32-byte channel key id, the payload checksum and
//! the ciphertext. Each direction gets its own key, derived from the shared
//! secret and its byte-reversal, assigned by comparing the peers' short ids
//! so both sides agree without negotiation.

use crate::crypto::cipher::build_shared_cipher;
use crate::crypto::identity::key_id_aes;
use crate::error::DhtError;
use ctr::cipher::StreamCipher;
use sha2::{Digest, Sha256};

/// Established channel state for one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    out_key: [u8; 32],
    in_key: [u8; 32],
    out_id: [u8; 32],
    in_id: [u8; 32],
}

fn reversed(key: &[u8; 32]) -> [u8; 32] {
    let mut out = *key;
    out.reverse();
    out
}

impl Channel {
    /// Derive directional keys from the channel shared secret
    ///
    /// The lexicographically smaller short id sends with the reversed secret;
    /// equal ids (loopback) use the secret for both directions.
    pub fn derive(local_id: &[u8; 32], peer_id: &[u8; 32], shared: &[u8; 32]) -> Self {
        let (out_key, in_key) = match local_id.cmp(peer_id) {
            std::cmp::Ordering::Less => (reversed(shared), *shared),
            std::cmp::Ordering::Greater => (*shared, reversed(shared)),
            std::cmp::Ordering::Equal => (*shared, *shared),
        };

        Self {
            out_id: key_id_aes(&out_key),
            in_id: key_id_aes(&in_key),
            out_key,
            in_key,
        }
    }

    /// Key id prefixing our outbound frames
    pub fn out_id(&self) -> &[u8; 32] {
        &self.out_id
    }

    /// Key id the peer prefixes inbound frames with
    pub fn in_id(&self) -> &[u8; 32] {
        &self.in_id
    }

    /// Encrypt a payload into a channel frame: in-id | checksum | ciphertext
    ///
    /// The frame is prefixed with the id of the key the RECEIVER decrypts
    /// with, which is what it routes on.
    pub fn seal(&self, payload: &[u8]) -> Result<Vec<u8>, DhtError> {
        let checksum: [u8; 32] = Sha256::digest(payload).into();

        let mut body = payload.to_vec();
        build_shared_cipher(&self.out_key, &checksum)?.apply_keystream(&mut body);

        let mut out = Vec::with_capacity(64 + body.len());
        out.extend_from_slice(&self.out_id);
        out.extend_from_slice(&checksum);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decrypt a channel frame addressed to us
    ///
    /// `data` is the full datagram including the 32-byte key id prefix the
    /// caller already routed on.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, DhtError> {
        if data.len() < 64 {
            return Err(DhtError::invalid_size(format!(
                "channel frame is {} bytes, need at least 64",
                data.len()
            )));
        }
        if data[..32] != self.in_id {
            return Err(DhtError::invalid_key(
                "channel frame carries a different key id",
            ));
        }

        let checksum = &data[32..64];
        let mut body = data[64..].to_vec();
        build_shared_cipher(&self.in_key, checksum)?.apply_keystream(&mut body);

        let recomputed: [u8; 32] = Sha256::digest(&body).into();
        if recomputed != checksum {
            return Err(DhtError::IntegrityFailure);
        }

        Ok(body)
    }
}
