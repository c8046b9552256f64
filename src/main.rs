//! adnl-dht node daemon
//!
//! Binds the encrypted UDP endpoint, optionally pings the seed nodes from a
//! bootstrap document, and serves inbound datagrams until the socket fails.
//!
//! Usage: adnl-dht [listen-addr] [bootstrap.json]
//! The node key comes from the NODE_SECRET environment variable (hex seed),
//! or a fresh key is generated.

use adnl_dht::crypto::verifying_key_from_bytes;
use adnl_dht::{standard_registry, BootstrapConfig, Identity, Peer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let listen = args.next().unwrap_or_else(|| "0.0.0.0:3278".to_string());
    let bootstrap_path = args.next();

    let identity = match std::env::var("NODE_SECRET") {
        Ok(seed) => Identity::from_hex(seed.trim()).context("NODE_SECRET is not a valid seed")?,
        Err(_) => {
            info!("no NODE_SECRET set, generating an ephemeral identity");
            Identity::generate()
        }
    };

    let registry = Arc::new(standard_registry()?);
    let peer = Peer::bind(identity, registry, &listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    info!(
        addr = %peer.local_addr()?,
        id = %hex::encode(peer.short_id()),
        "node listening"
    );

    if let Some(path) = bootstrap_path {
        let config = BootstrapConfig::load(&path)
            .with_context(|| format!("failed to load bootstrap document {}", path))?;
        for seed in &config.seeds {
            let entry = match seed.to_peer_entry() {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(ip = %seed.ip, port = seed.port, error = %e, "skipping seed");
                    continue;
                }
            };
            let key = verifying_key_from_bytes(&entry.public_key)?;
            if let Err(e) = peer.send_ping(&key, entry.socket_addr).await {
                warn!(addr = %entry.socket_addr, error = %e, "seed ping failed");
            }
        }
    }

    peer.listen().await.context("listener stopped")?;
    Ok(())
}
