//! Node identity and key ids
//!
//! Every node is an ed25519 keypair. Its short id, used for datagram routing
//! and DHT addressing, is the SHA-256 of the key's scheme id followed by the
//! raw public key bytes.

use crate::error::DhtError;
use crate::tl::scheme_crc32;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::StaticSecret;

/// Scheme text of an ed25519 public key
pub const PUB_ED25519_SCHEME: &str = "pub.ed25519 key:int256 = PublicKey";
/// Scheme text of an AES channel key
pub const PUB_AES_SCHEME: &str = "pub.aes key:int256 = PublicKey";

/// Short id of an ed25519 public key
pub fn key_id_ed25519(key: &[u8; 32]) -> [u8; 32] {
    key_id(scheme_crc32(PUB_ED25519_SCHEME), key)
}

/// Short id of an AES channel key
pub fn key_id_aes(key: &[u8; 32]) -> [u8; 32] {
    key_id(scheme_crc32(PUB_AES_SCHEME), key)
}

fn key_id(scheme_id: u32, key: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(scheme_id.to_le_bytes());
    hasher.update(key);
    hasher.finalize().into()
}

/// A local node identity: an ed25519 keypair plus its derived ids
#[derive(Clone)]
pub struct Identity {
    signing: SigningKey,
}

impl Identity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild an identity from its 32-byte secret seed
    pub fn from_secret_bytes(seed: &[u8]) -> Result<Self, DhtError> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| {
            DhtError::invalid_key(format!("secret seed must be 32 bytes, got {}", seed.len()))
        })?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Rebuild an identity from a hex-encoded secret seed
    pub fn from_hex(seed: &str) -> Result<Self, DhtError> {
        let bytes = hex::decode(seed)
            .map_err(|e| DhtError::invalid_key(format!("secret seed is not hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Public verifying key
    pub fn public(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Raw public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Short id of this identity's public key
    pub fn short_id(&self) -> [u8; 32] {
        key_id_ed25519(&self.public_bytes())
    }

    /// Sign a message with the node key
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// The x25519 secret matching this ed25519 key
    ///
    /// Derived as the first half of SHA-512 of the seed, the same scalar that
    /// produced the ed25519 public key.
    pub(crate) fn x25519_secret(&self) -> StaticSecret {
        let digest = Sha512::digest(self.signing.to_bytes());
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&digest[..32]);
        StaticSecret::from(scalar)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public", &hex::encode(self.public_bytes()))
            .finish()
    }
}

/// Parse raw public key bytes into a verifying key
pub fn verifying_key_from_bytes(key: &[u8]) -> Result<VerifyingKey, DhtError> {
    let key: [u8; 32] = key.try_into().map_err(|_| {
        DhtError::invalid_key(format!("public key must be 32 bytes, got {}", key.len()))
    })?;
    Ok(VerifyingKey::from_bytes(&key)?)
}

/// Verify an ed25519 signature over a message
pub fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<(), DhtError> {
    let signature: [u8; 64] = signature.try_into().map_err(|_| {
        DhtError::invalid_key(format!(
            "signature must be 64 bytes, got {}",
            signature.len()
        ))
    })?;
    Ok(key.verify(message, &Signature::from_bytes(&signature))?)
}
