//! Authenticated datagram encryption
//!
//! Peers derive a shared x25519 secret from their ed25519 keys and encrypt
//! payloads with AES-256-CTR. The cipher key and IV interleave the shared
//! secret with the payload's SHA-256 checksum, so every datagram gets a
//! distinct keystream and the checksum doubles as an integrity tag.

use crate::crypto::identity::{key_id_ed25519, verifying_key_from_bytes, Identity};
use crate::error::DhtError;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Envelope header: remote key id, sender public key, checksum
const ENVELOPE_HEADER_LEN: usize = 96;

/// Shared x25519 secret between our identity and a remote ed25519 key
pub fn shared_secret(local: &Identity, remote: &VerifyingKey) -> [u8; 32] {
    let secret = local.x25519_secret();
    let remote_mont = remote.to_montgomery();
    secret
        .diffie_hellman(&x25519_dalek::PublicKey::from(remote_mont.to_bytes()))
        .to_bytes()
}

/// Build the AES-256-CTR cipher for one datagram
///
/// Key is the first half of the shared secret plus the second half of the
/// checksum; IV is the checksum head plus the shared secret tail.
pub fn build_shared_cipher(key: &[u8], checksum: &[u8]) -> Result<Aes256Ctr, DhtError> {
    if key.len() < 32 {
        return Err(DhtError::invalid_size(format!(
            "cipher key material is {} bytes, need 32",
            key.len()
        )));
    }
    if checksum.len() < 32 {
        return Err(DhtError::invalid_size(format!(
            "cipher checksum is {} bytes, need 32",
            checksum.len()
        )));
    }

    let mut k = [0u8; 32];
    k[..16].copy_from_slice(&key[..16]);
    k[16..].copy_from_slice(&checksum[16..32]);

    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&checksum[..4]);
    iv[4..].copy_from_slice(&key[20..32]);

    Ok(Aes256Ctr::new(&k.into(), &iv.into()))
}

/// Encrypt a payload into a direct-message envelope for a remote key
///
/// Layout: remote key id (32) | sender public key (32) | SHA-256 checksum of
/// the plaintext (32) | ciphertext.
pub fn seal(local: &Identity, remote: &VerifyingKey, payload: &[u8]) -> Result<Vec<u8>, DhtError> {
    let checksum: [u8; 32] = Sha256::digest(payload).into();
    let shared = shared_secret(local, remote);

    let mut body = payload.to_vec();
    build_shared_cipher(&shared, &checksum)?.apply_keystream(&mut body);

    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + body.len());
    out.extend_from_slice(&key_id_ed25519(&remote.to_bytes()));
    out.extend_from_slice(&local.public_bytes());
    out.extend_from_slice(&checksum);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decrypt a direct-message envelope addressed to our identity
///
/// Returns the sender's public key and the verified plaintext. The caller is
/// responsible for routing on the leading key id before calling this.
pub fn open(local: &Identity, data: &[u8]) -> Result<(VerifyingKey, Vec<u8>), DhtError> {
    if data.len() < ENVELOPE_HEADER_LEN {
        return Err(DhtError::invalid_size(format!(
            "envelope is {} bytes, need at least {}",
            data.len(),
            ENVELOPE_HEADER_LEN
        )));
    }

    let sender = verifying_key_from_bytes(&data[32..64])?;
    let checksum = &data[64..96];
    let shared = shared_secret(local, &sender);

    let mut body = data[ENVELOPE_HEADER_LEN..].to_vec();
    build_shared_cipher(&shared, checksum)?.apply_keystream(&mut body);

    let recomputed: [u8; 32] = Sha256::digest(&body).into();
    if recomputed != checksum {
        return Err(DhtError::IntegrityFailure);
    }

    Ok((sender, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret_is_symmetric() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        assert_eq!(
            shared_secret(&alice, &bob.public()),
            shared_secret(&bob, &alice.public())
        );
    }

    #[test]
    fn test_shared_secret_differs_per_peer() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let carol = Identity::generate();
        assert_ne!(
            shared_secret(&alice, &bob.public()),
            shared_secret(&alice, &carol.public())
        );
    }

    #[test]
    fn test_cipher_rejects_short_material() {
        assert!(build_shared_cipher(&[0u8; 31], &[0u8; 32]).is_err());
        assert!(build_shared_cipher(&[0u8; 32], &[0u8; 31]).is_err());
    }

    #[test]
    fn test_ctr_keystream_is_symmetric() {
        let key = [0x42u8; 32];
        let checksum = [0x17u8; 32];
        let mut data = b"ping over the channel".to_vec();

        build_shared_cipher(&key, &checksum)
            .unwrap()
            .apply_keystream(&mut data);
        assert_ne!(&data, b"ping over the channel");

        build_shared_cipher(&key, &checksum)
            .unwrap()
            .apply_keystream(&mut data);
        assert_eq!(&data, b"ping over the channel");
    }

    #[test]
    fn test_seal_open_round_trip() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let payload = b"dht.findNode key";

        let envelope = seal(&alice, &bob.public(), payload).unwrap();
        assert_eq!(&envelope[..32], &bob.short_id());
        assert_eq!(&envelope[32..64], &alice.public_bytes());

        let (sender, plain) = open(&bob, &envelope).unwrap();
        assert_eq!(sender.to_bytes(), alice.public_bytes());
        assert_eq!(plain, payload);
    }

    #[test]
    fn test_open_rejects_tampered_ciphertext() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let mut envelope = seal(&alice, &bob.public(), b"payload bytes").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0x80;
        assert_eq!(open(&bob, &envelope), Err(DhtError::IntegrityFailure));
    }

    #[test]
    fn test_open_rejects_tampered_checksum() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let mut envelope = seal(&alice, &bob.public(), b"payload bytes").unwrap();
        envelope[64] ^= 0x01;
        assert!(open(&bob, &envelope).is_err());
    }

    #[test]
    fn test_open_rejects_short_envelope() {
        let bob = Identity::generate();
        assert!(matches!(
            open(&bob, &[0u8; 95]),
            Err(DhtError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_open_for_wrong_recipient_fails_integrity() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let eve = Identity::generate();

        let envelope = seal(&alice, &bob.public(), b"for bob only").unwrap();
        assert_eq!(open(&eve, &envelope), Err(DhtError::IntegrityFailure));
    }
}
