//! Kademlia routing table
//!
//! 256 buckets, one per distance magnitude. Bucket i holds peers whose XOR
//! distance from the local address has its highest bit at position i. Buckets
//! stay sorted ascending by measured round-trip delay, unknown delays last,
//! so the best peers are always at the front and the worst is the eviction
//! candidate when a bucket is full.

use crate::dht::address::DhtAddress;
use std::net::SocketAddr;
use tracing::debug;

/// Maximum entries per bucket
pub const BUCKET_CAPACITY: usize = 16;

/// Seconds after which an unanswered ping marks an entry stale
pub const PING_TIMEOUT_SECS: i64 = 60;

/// One known peer in the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub address: DhtAddress,
    pub public_key: [u8; 32],
    pub socket_addr: SocketAddr,
    /// Last measured round trip in seconds, None until a pong arrives
    pub delay: Option<i64>,
    /// When the last ping went out, cleared by its pong
    pub last_ping_ts: Option<i64>,
}

impl PeerEntry {
    pub fn new(public_key: [u8; 32], socket_addr: SocketAddr) -> Self {
        Self {
            address: DhtAddress::from_public_key(&public_key),
            public_key,
            socket_addr,
            delay: None,
            last_ping_ts: None,
        }
    }
}

/// The local node's view of the network
#[derive(Debug)]
pub struct RoutingTable {
    local: DhtAddress,
    buckets: Vec<Vec<PeerEntry>>,
}

fn delay_key(entry: &PeerEntry) -> (bool, i64) {
    // unknown delays sort after every measured one
    (entry.delay.is_none(), entry.delay.unwrap_or(0))
}

impl RoutingTable {
    pub fn new(local: DhtAddress) -> Self {
        Self {
            local,
            buckets: vec![Vec::new(); 256],
        }
    }

    pub fn local(&self) -> &DhtAddress {
        &self.local
    }

    /// Total number of known peers
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    pub fn contains(&self, address: &DhtAddress) -> bool {
        self.find(address).is_some()
    }

    pub fn get(&self, address: &DhtAddress) -> Option<&PeerEntry> {
        let (b, i) = self.find(address)?;
        Some(&self.buckets[b][i])
    }

    /// Add or refresh a peer
    ///
    /// Our own address never enters the table. A full bucket evicts its
    /// worst-delay entry to make room. Returns false when the peer was
    /// rejected (it was us).
    pub fn insert(&mut self, entry: PeerEntry) -> bool {
        let Some(idx) = self.local.bucket_index(&entry.address) else {
            return false;
        };

        let bucket = &mut self.buckets[idx];
        if let Some(pos) = bucket.iter().position(|e| e.address == entry.address) {
            bucket[pos].public_key = entry.public_key;
            bucket[pos].socket_addr = entry.socket_addr;
            return true;
        }

        if bucket.len() >= BUCKET_CAPACITY {
            if let Some(worst) = bucket.pop() {
                debug!(bucket = idx, evicted = %worst.address, "bucket full");
            }
        }
        bucket.push(entry);
        bucket.sort_by_key(delay_key);
        true
    }

    /// Record a measured round trip and re-rank the peer's bucket
    pub fn record_round_trip(&mut self, address: &DhtAddress, delay: i64) {
        let Some((b, i)) = self.find(address) else {
            return;
        };
        self.buckets[b][i].delay = Some(delay);
        self.buckets[b][i].last_ping_ts = None;
        self.buckets[b].sort_by_key(delay_key);
    }

    /// Record that a ping went out to a peer
    pub fn record_ping_sent(&mut self, address: &DhtAddress, ts: i64) {
        if let Some((b, i)) = self.find(address) {
            self.buckets[b][i].last_ping_ts = Some(ts);
        }
    }

    /// Drop peers whose last ping has gone unanswered past the timeout
    pub fn prune_stale(&mut self, now: i64) -> usize {
        let mut removed = 0;
        for bucket in &mut self.buckets {
            bucket.retain(|e| {
                let stale = e
                    .last_ping_ts
                    .is_some_and(|ts| now - ts > PING_TIMEOUT_SECS);
                if stale {
                    removed += 1;
                    debug!(peer = %e.address, "pruned unresponsive peer");
                }
                !stale
            });
        }
        removed
    }

    /// The k known peers nearest to a target address
    pub fn select_nearest(&self, target: &DhtAddress, k: usize) -> Vec<PeerEntry> {
        let mut peers: Vec<PeerEntry> = self.buckets.iter().flatten().cloned().collect();
        peers.sort_by(|a, b| a.address.distance(target).cmp(&b.address.distance(target)));
        peers.truncate(k);
        peers
    }

    fn find(&self, address: &DhtAddress) -> Option<(usize, usize)> {
        let b = self.local.bucket_index(address)?;
        let i = self.buckets[b].iter().position(|e| &e.address == address)?;
        Some((b, i))
    }
}
