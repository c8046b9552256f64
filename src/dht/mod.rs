//! Kademlia-style distributed hash table

pub mod address;
pub mod bootstrap;
pub mod node;
pub mod routing;

pub use address::DhtAddress;
pub use bootstrap::{BootstrapConfig, SeedNode};
pub use node::{DhtNode, InboundCommand, MemoryStorage, Storage, Transport};
pub use routing::{PeerEntry, RoutingTable, BUCKET_CAPACITY, PING_TIMEOUT_SECS};
