//! adnl-dht
//!
//! The node-side network stack of a Kademlia-style DHT: a schema-driven TL
//! binary codec, an authenticated encrypted UDP transport, peer sessions with
//! liveness tracking, and the DHT node with its routing table.

pub mod adnl;
pub mod crypto;
pub mod dht;
pub mod error;
pub mod tl;

pub use error::DhtError;

pub use adnl::{AddressList, Channel, Message, Packet, Peer, PeerMetric, UdpAddress};
pub use crypto::Identity;
pub use dht::{
    BootstrapConfig, DhtAddress, DhtNode, InboundCommand, MemoryStorage, PeerEntry, RoutingTable,
    SeedNode, Storage, Transport,
};
pub use tl::{Record, Registry, Scheme, Value};

/// A registry with every ADNL and DHT scheme registered
pub fn standard_registry() -> Result<Registry, DhtError> {
    let mut reg = Registry::new();
    adnl::message::register_schemes(&mut reg)?;
    dht::node::register_schemes(&mut reg)?;
    Ok(reg)
}
