//! Key handling and datagram encryption

pub mod cipher;
pub mod identity;

pub use cipher::{build_shared_cipher, open, seal, shared_secret};
pub use identity::{key_id_aes, key_id_ed25519, verifying_key_from_bytes, verify, Identity};
