//! DHT node
//!
//! Receives boxed TL commands from the transport, dispatches on the leading
//! 4-byte scheme id and answers through the same transport. Storage and
//! transport are trait seams so the node logic is independent of the socket
//! and the value store behind it.

use crate::adnl::message::{int256_field, int_field, long_field};
use crate::dht::address::DhtAddress;
use crate::dht::routing::{PeerEntry, RoutingTable, PING_TIMEOUT_SECS};
use crate::error::DhtError;
use crate::tl::{Record, Registry, Value};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

pub const PING_SCHEME: &str = "dht.ping random_id:long = dht.Pong";
pub const PONG_SCHEME: &str = "dht.pong random_id:long = dht.Pong";
pub const NODE_SCHEME: &str = "dht.node id:int256 ip:int port:int = dht.Node";
pub const KEY_SCHEME: &str = "dht.key id:int256 name:bytes idx:int = dht.Key";
pub const VALUE_SCHEME: &str = "dht.value key:dht.key value:bytes ttl:int signature:bytes = dht.Value";
pub const STORE_SCHEME: &str = "dht.store value:dht.value = dht.Stored";
pub const STORED_SCHEME: &str = "dht.stored = dht.Stored";
pub const FIND_NODE_SCHEME: &str = "dht.findNode key:int256 k:int = dht.Nodes";
pub const FIND_VALUE_SCHEME: &str = "dht.findValue key:int256 k:int = dht.ValueResult";
pub const VALUE_NOT_FOUND_SCHEME: &str =
    "dht.valueNotFound nodes:(vector dht.node) = dht.ValueResult";
pub const VALUE_FOUND_SCHEME: &str = "dht.valueFound value:dht.value = dht.ValueResult";

/// Register every DHT scheme with the codec
pub fn register_schemes(reg: &mut Registry) -> Result<(), DhtError> {
    reg.register_all(&[
        PING_SCHEME,
        PONG_SCHEME,
        NODE_SCHEME,
        KEY_SCHEME,
        VALUE_SCHEME,
        STORE_SCHEME,
        STORED_SCHEME,
        FIND_NODE_SCHEME,
        FIND_VALUE_SCHEME,
        VALUE_NOT_FOUND_SCHEME,
        VALUE_FOUND_SCHEME,
    ])
}

fn now_unix() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    }
}

/// Key-value store behind the node
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &[u8; 32]) -> Option<Vec<u8>>;
    async fn set(&self, key: [u8; 32], value: Vec<u8>) -> Result<(), DhtError>;
}

/// Outbound path back to a peer
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, dst: &PeerEntry, data: Vec<u8>) -> Result<(), DhtError>;
}

/// A command delivered by the transport, with the peer it came from
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub src: PeerEntry,
    pub data: Vec<u8>,
}

/// In-memory value store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<[u8; 32], Vec<u8>>>,
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &[u8; 32]) -> Option<Vec<u8>> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: [u8; 32], value: Vec<u8>) -> Result<(), DhtError> {
        self.values.write().await.insert(key, value);
        Ok(())
    }
}

/// One node of the distributed hash table
pub struct DhtNode {
    address: DhtAddress,
    registry: Arc<Registry>,
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    routing: Arc<RwLock<RoutingTable>>,
    /// Outstanding ping correlation ids and when they went out
    pending_pings: RwLock<HashMap<i64, i64>>,
}

impl DhtNode {
    pub fn new(
        address: DhtAddress,
        registry: Arc<Registry>,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            registry,
            storage,
            transport,
            routing: Arc::new(RwLock::new(RoutingTable::new(address))),
            pending_pings: RwLock::new(HashMap::new()),
        })
    }

    pub fn address(&self) -> &DhtAddress {
        &self.address
    }

    pub fn routing(&self) -> Arc<RwLock<RoutingTable>> {
        self.routing.clone()
    }

    /// Add a peer to the routing table
    pub async fn insert_peer(&self, entry: PeerEntry) -> bool {
        self.routing.write().await.insert(entry)
    }

    /// Process inbound commands until the channel closes
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundCommand>) {
        info!(address = %self.address, "dht node running");
        while let Some(cmd) = inbound.recv().await {
            let node = self.clone();
            tokio::spawn(async move {
                if let Err(e) = node.handle_command(&cmd.src, &cmd.data).await {
                    warn!(src = %cmd.src.address, error = %e, "command failed");
                }
            });
        }
    }

    /// Dispatch one boxed command on its leading scheme id
    pub async fn handle_command(&self, src: &PeerEntry, data: &[u8]) -> Result<(), DhtError> {
        if data.len() < 4 {
            return Err(DhtError::invalid_size(format!(
                "command is {} bytes, need at least 4 for the scheme id",
                data.len()
            )));
        }

        let id = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if id == self.registry.scheme_id("dht.ping")? {
            self.receive_ping(src, data).await
        } else if id == self.registry.scheme_id("dht.pong")? {
            self.receive_pong(src, data).await
        } else if id == self.registry.scheme_id("dht.findNode")? {
            self.receive_find_node(src, data).await
        } else if id == self.registry.scheme_id("dht.findValue")? {
            self.receive_find_value(src, data).await
        } else if id == self.registry.scheme_id("dht.store")? {
            self.receive_store(src, data).await
        } else {
            Err(DhtError::UnknownCommand { scheme_id: id })
        }
    }

    /// Answer a ping by echoing its correlation id
    async fn receive_ping(&self, src: &PeerEntry, data: &[u8]) -> Result<(), DhtError> {
        let (rec, _) = self.registry.parse(data, "dht.ping", true)?;
        let random_id = long_field(&rec, 0)?;
        debug!(src = %src.address, random_id, "dht ping");

        let pong = Record::new("dht.pong").with(Value::Long(random_id));
        let reply = self.registry.serialize(&pong, true)?;
        self.transport.send(src, reply).await
    }

    /// Settle the pending ping the pong answers and record the delay
    async fn receive_pong(&self, src: &PeerEntry, data: &[u8]) -> Result<(), DhtError> {
        let (rec, _) = self.registry.parse(data, "dht.pong", true)?;
        let random_id = long_field(&rec, 0)?;

        let sent_at = self.pending_pings.write().await.remove(&random_id);
        let Some(sent_at) = sent_at else {
            return Err(DhtError::unsolicited_pong(src.address.to_string()));
        };

        let delay = now_unix().saturating_sub(sent_at);
        self.routing
            .write()
            .await
            .record_round_trip(&src.address, delay);
        debug!(src = %src.address, delay, "dht pong");
        Ok(())
    }

    async fn receive_find_node(&self, src: &PeerEntry, data: &[u8]) -> Result<(), DhtError> {
        let (rec, _) = self.registry.parse(data, "dht.findNode", true)?;
        let key = int256_field(&rec, 0)?;
        let k = int_field(&rec, 1)?;
        info!(src = %src.address, key = %hex::encode(key), k, "find_node not answered yet");
        Ok(())
    }

    /// Answer a value lookup from storage, or with the k nearest peers
    async fn receive_find_value(&self, src: &PeerEntry, data: &[u8]) -> Result<(), DhtError> {
        let (rec, _) = self.registry.parse(data, "dht.findValue", true)?;
        let key = int256_field(&rec, 0)?;
        let k = int_field(&rec, 1)?.max(0) as usize;

        let reply = match self.storage.get(&key).await {
            Some(value) => {
                debug!(src = %src.address, key = %hex::encode(key), "value found");
                let value_rec = Record::new("dht.value")
                    .with(Value::Record(
                        Record::new("dht.key")
                            .with(Value::Int256(key))
                            .with(Value::Bytes(Vec::new()))
                            .with(Value::Int(0)),
                    ))
                    .with(Value::Bytes(value))
                    .with(Value::Int(0))
                    .with(Value::Bytes(Vec::new()));
                Record::new("dht.valueFound").with(Value::Record(value_rec))
            }
            None => {
                let nearest = self
                    .routing
                    .read()
                    .await
                    .select_nearest(&DhtAddress::new(key), k);
                debug!(src = %src.address, key = %hex::encode(key), nearest = nearest.len(), "value not found");
                let nodes = nearest
                    .iter()
                    .map(|e| Value::Record(node_record(e)))
                    .collect();
                Record::new("dht.valueNotFound").with(Value::Vector(nodes))
            }
        };

        // boxed, so the requester can dispatch on the constructor
        let data = self.registry.serialize(&reply, true)?;
        self.transport.send(src, data).await
    }

    async fn receive_store(&self, src: &PeerEntry, data: &[u8]) -> Result<(), DhtError> {
        let (rec, _) = self.registry.parse(data, "dht.store", true)?;
        let value = rec.field(0)?.as_record().ok_or_else(|| {
            DhtError::invalid_field_in("store value is not a record", &rec.name)
        })?;
        let key_rec = value.field(0)?.as_record().ok_or_else(|| {
            DhtError::invalid_field_in("value key is not a record", &value.name)
        })?;
        let key = int256_field(key_rec, 0)?;
        info!(src = %src.address, key = %hex::encode(key), "store not applied yet");
        Ok(())
    }

    /// Ping a peer and remember the outstanding correlation id
    pub async fn send_ping(&self, dst: &PeerEntry) -> Result<(), DhtError> {
        let random_id: i64 = rand::thread_rng().gen_range(0..i64::MAX);
        let ping = Record::new("dht.ping").with(Value::Long(random_id));
        let data = self.registry.serialize(&ping, true)?;

        let now = now_unix();
        self.pending_pings.write().await.insert(random_id, now);
        self.routing
            .write()
            .await
            .record_ping_sent(&dst.address, now);

        self.transport.send(dst, data).await
    }

    /// Drop pending pings past the timeout and prune unresponsive peers
    pub async fn prune_pending_pings(&self) -> usize {
        self.prune_pending_pings_at(now_unix()).await
    }

    async fn prune_pending_pings_at(&self, now: i64) -> usize {
        self.pending_pings
            .write()
            .await
            .retain(|_, sent_at| now - *sent_at <= PING_TIMEOUT_SECS);
        self.routing.write().await.prune_stale(now)
    }
}

/// Wire record of a known peer
fn node_record(entry: &PeerEntry) -> Record {
    let (ip, port) = match entry.socket_addr {
        SocketAddr::V4(v4) => (u32::from_be_bytes(v4.ip().octets()) as i32, v4.port()),
        SocketAddr::V6(_) => (0, entry.socket_addr.port()),
    };
    Record::new("dht.node")
        .with(Value::Int256(*entry.address.as_bytes()))
        .with(Value::Int(ip))
        .with(Value::Int(port as i32))
}
