//! Bootstrap configuration
//!
//! Seed nodes come from a static JSON document. Bootstrapping inserts every
//! seed into the routing table and pings it, so the first pongs immediately
//! rank the seeds by delay.

use crate::dht::node::DhtNode;
use crate::dht::routing::PeerEntry;
use crate::error::DhtError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::{info, warn};

/// One seed node in the bootstrap document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedNode {
    /// Hex-encoded ed25519 public key
    pub public_key: String,
    pub ip: String,
    pub port: u16,
}

impl SeedNode {
    /// Resolve the seed into a routing table entry
    pub fn to_peer_entry(&self) -> Result<PeerEntry, DhtError> {
        let key_bytes = hex::decode(&self.public_key)
            .map_err(|e| DhtError::invalid_key(format!("seed public key is not hex: {}", e)))?;
        let key: [u8; 32] = key_bytes.try_into().map_err(|_| {
            DhtError::invalid_key("seed public key must be 32 bytes".to_string())
        })?;

        let addr: SocketAddr = format!("{}:{}", self.ip, self.port).parse().map_err(|_| {
            DhtError::network_error_with_address(
                "seed address does not parse",
                format!("{}:{}", self.ip, self.port),
            )
        })?;

        Ok(PeerEntry::new(key, addr))
    }
}

/// The full bootstrap document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub seeds: Vec<SeedNode>,
}

impl BootstrapConfig {
    /// Parse a bootstrap document from JSON text
    pub fn from_json(text: &str) -> Result<Self, DhtError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a bootstrap document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DhtError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DhtError::network_error_full(
                "failed to read bootstrap document",
                path.as_ref().display().to_string(),
                e.to_string(),
            )
        })?;
        Self::from_json(&text)
    }
}

impl DhtNode {
    /// Seed the routing table and ping every seed
    ///
    /// Returns how many seeds were accepted. Malformed seeds are logged and
    /// skipped rather than failing the whole bootstrap.
    pub async fn bootstrap(&self, config: &BootstrapConfig) -> Result<usize, DhtError> {
        let mut accepted = 0;
        for seed in &config.seeds {
            let entry = match seed.to_peer_entry() {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(ip = %seed.ip, port = seed.port, error = %e, "skipping seed");
                    continue;
                }
            };

            if !self.insert_peer(entry.clone()).await {
                continue;
            }
            self.send_ping(&entry).await?;
            accepted += 1;
        }

        info!(accepted, total = config.seeds.len(), "bootstrap complete");
        Ok(accepted)
    }
}
