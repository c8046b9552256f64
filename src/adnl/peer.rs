//! Peer session over UDP
//!
//! One `Peer` owns the socket and the session state: sequence counters,
//! per-peer metrics and established channels. Inbound datagrams route on
//! their leading 32 bytes: our own short id selects the direct-envelope
//! path, a known channel key id selects that channel, anything else is
//! dropped.

use crate::adnl::channel::Channel;
use crate::adnl::message::{AddressList, Message, Ping, Pong, UdpAddress};
use crate::adnl::packet::Packet;
use crate::crypto::{self, Identity};
use crate::error::DhtError;
use crate::tl::Registry;
use ed25519_dalek::VerifyingKey;
use rand::Rng;
use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const MAX_DATAGRAM: usize = 4096;

/// Datagrams shorter than a routing prefix plus a key can't be valid
const MIN_DATAGRAM: usize = 64;

fn now_unix() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    }
}

fn now_unix_millis() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(_) => 0,
    }
}

/// Liveness bookkeeping for one remote peer
#[derive(Debug, Clone, Default)]
pub struct PeerMetric {
    /// Last measured round trip in milliseconds
    pub delay_ms: Option<i64>,
    ping_sent_at: Option<i64>,
}

/// A local ADNL endpoint and its session state
pub struct Peer {
    identity: Identity,
    registry: Arc<Registry>,
    socket: Arc<UdpSocket>,
    seqno: AtomicI64,
    confirm_seqno: AtomicI64,
    reinit_date: i32,
    metrics: RwLock<HashMap<[u8; 32], PeerMetric>>,
    channels: RwLock<HashMap<[u8; 32], Channel>>,
}

impl Peer {
    /// Bind a UDP socket and create the session around it
    pub async fn bind(
        identity: Identity,
        registry: Arc<Registry>,
        addr: &str,
    ) -> Result<Arc<Self>, DhtError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| DhtError::network_error_full("bind failed", addr, e.to_string()))?;

        Ok(Arc::new(Self {
            identity,
            registry,
            socket: Arc::new(socket),
            seqno: AtomicI64::new(0),
            confirm_seqno: AtomicI64::new(0),
            reinit_date: now_unix() as i32,
            metrics: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }))
    }

    /// The bound local address
    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        self.socket
            .local_addr()
            .map_err(|e| DhtError::network_error(e.to_string()))
    }

    /// Our short id, the routing prefix of inbound direct messages
    pub fn short_id(&self) -> [u8; 32] {
        self.identity.short_id()
    }

    /// Latest metric snapshot for a peer
    pub async fn metric(&self, peer_id: &[u8; 32]) -> Option<PeerMetric> {
        self.metrics.read().await.get(peer_id).cloned()
    }

    /// Register an established channel for inbound routing
    pub async fn install_channel(&self, channel: Channel) {
        self.channels
            .write()
            .await
            .insert(*channel.in_id(), channel);
    }

    /// Receive datagrams until the socket fails
    ///
    /// Each datagram is handled on its own task so a slow dispatch never
    /// blocks the read loop.
    pub async fn listen(self: Arc<Self>) -> Result<(), DhtError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await.map_err(|e| {
                DhtError::network_error_full(
                    "socket receive failed",
                    "local socket",
                    e.to_string(),
                )
            })?;

            let data = buf[..len].to_vec();
            let peer = self.clone();
            tokio::spawn(async move {
                if let Err(e) = peer.handle_datagram(&data, from).await {
                    warn!(from = %from, error = %e, "dropped datagram");
                }
            });
        }
    }

    async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Result<(), DhtError> {
        if data.len() <= MIN_DATAGRAM {
            return Err(DhtError::invalid_size(format!(
                "datagram is {} bytes, need more than {}",
                data.len(),
                MIN_DATAGRAM
            )));
        }

        if data[..32] == self.identity.short_id() {
            return self.handle_direct(data, from).await;
        }

        let prefix: [u8; 32] = match data[..32].try_into() {
            Ok(p) => p,
            Err(_) => return Err(DhtError::invalid_size("datagram routing prefix")),
        };
        let channel = self.channels.read().await.get(&prefix).cloned();
        if let Some(channel) = channel {
            return self.handle_channel(&channel, data, from).await;
        }

        debug!(from = %from, prefix = %hex::encode(prefix), "datagram for unknown recipient");
        Ok(())
    }

    /// Decrypt and dispatch a direct-envelope datagram
    async fn handle_direct(&self, data: &[u8], from: SocketAddr) -> Result<(), DhtError> {
        let (sender, plain) = crypto::open(&self.identity, data)?;
        let packet = self.parse_packet(&plain)?;

        if packet.from.is_some() && packet.signature.is_some() {
            packet.verify_signature(&self.registry, &sender)?;
        }

        self.dispatch_packet(&packet, Some(&sender), from).await
    }

    /// Decrypt and dispatch a channel frame
    async fn handle_channel(
        &self,
        channel: &Channel,
        data: &[u8],
        from: SocketAddr,
    ) -> Result<(), DhtError> {
        let plain = channel.open(data)?;
        let packet = self.parse_packet(&plain)?;
        self.dispatch_packet(&packet, None, from).await
    }

    fn parse_packet(&self, plain: &[u8]) -> Result<Packet, DhtError> {
        let (rec, _) = self.registry.parse(plain, "adnl.packetContents", true)?;
        Packet::from_record(&rec)
    }

    async fn dispatch_packet(
        &self,
        packet: &Packet,
        sender: Option<&VerifyingKey>,
        from: SocketAddr,
    ) -> Result<(), DhtError> {
        if let Some(seqno) = packet.seqno {
            self.confirm_seqno.fetch_max(seqno, Ordering::SeqCst);
        }

        let peer_id = match (&packet.from, sender) {
            (Some(key), _) => crypto::key_id_ed25519(key),
            (None, Some(sender)) => crypto::key_id_ed25519(&sender.to_bytes()),
            (None, None) => [0u8; 32],
        };

        let mut replies = Vec::new();
        let single = packet.message.iter();
        let many = packet.messages.iter().flatten();
        for msg in single.chain(many) {
            match self.dispatch_message(&peer_id, msg).await {
                Ok(Some(reply)) => replies.push(reply),
                Ok(None) => {}
                Err(e) if e.is_protocol_error() => {
                    warn!(from = %from, error = %e, "message not dispatched");
                }
                Err(e) => return Err(e),
            }
        }

        if replies.is_empty() {
            return Ok(());
        }
        let Some(sender) = sender else {
            debug!(from = %from, "no reply path for channel packet");
            return Ok(());
        };
        self.send_messages(sender, from, replies).await
    }

    /// Handle one message, producing the reply it warrants
    async fn dispatch_message(
        &self,
        peer_id: &[u8; 32],
        msg: &Message,
    ) -> Result<Option<Message>, DhtError> {
        match msg {
            Message::Ping(Ping { value }) => {
                debug!(value, "session ping");
                // the pong carries a fresh value, not an echo
                Ok(Some(Message::Pong(Pong {
                    value: rand::thread_rng().gen(),
                })))
            }
            Message::Pong(Pong { value }) => {
                // only a sent ping creates a metric record, never inbound traffic
                let mut metrics = self.metrics.write().await;
                let Some(metric) = metrics.get_mut(peer_id) else {
                    return Err(DhtError::unsolicited_pong(hex::encode(peer_id)));
                };
                match metric.ping_sent_at.take() {
                    Some(sent_at) => {
                        metric.delay_ms = Some(now_unix_millis().saturating_sub(sent_at));
                        debug!(value, delay_ms = metric.delay_ms, "session pong");
                        Ok(None)
                    }
                    None => Err(DhtError::unsolicited_pong(hex::encode(peer_id))),
                }
            }
            other => Err(DhtError::not_implemented(other.constructor())),
        }
    }

    /// Send a ping to a peer and start its round-trip clock
    pub async fn send_ping(&self, peer: &VerifyingKey, addr: SocketAddr) -> Result<(), DhtError> {
        let peer_id = crypto::key_id_ed25519(&peer.to_bytes());
        self.metrics
            .write()
            .await
            .entry(peer_id)
            .or_default()
            .ping_sent_at = Some(now_unix_millis());

        let ping = Message::Ping(Ping {
            value: rand::thread_rng().gen(),
        });
        self.send_messages(peer, addr, vec![ping]).await
    }

    /// Build, sign, seal and send a packet carrying the given messages
    pub async fn send_messages(
        &self,
        peer: &VerifyingKey,
        addr: SocketAddr,
        messages: Vec<Message>,
    ) -> Result<(), DhtError> {
        let mut packet = self.build_packet(messages)?;
        let plain = packet.sign_and_serialize(&self.registry, &self.identity)?;
        let envelope = crypto::seal(&self.identity, peer, &plain)?;

        self.socket
            .send_to(&envelope, addr)
            .await
            .map_err(|e| {
                DhtError::network_error_full("socket send failed", addr.to_string(), e.to_string())
            })?;
        Ok(())
    }

    fn build_packet(&self, messages: Vec<Message>) -> Result<Packet, DhtError> {
        let address = match self.local_addr()? {
            SocketAddr::V4(v4) => AddressList {
                addresses: vec![UdpAddress::from_socket_addr(v4)],
                version: self.reinit_date,
                reinit_date: self.reinit_date,
                priority: 0,
                expire_at: 0,
            },
            SocketAddr::V6(_) => AddressList {
                addresses: vec![UdpAddress::from_socket_addr(SocketAddrV4::new(
                    std::net::Ipv4Addr::UNSPECIFIED,
                    0,
                ))],
                version: self.reinit_date,
                reinit_date: self.reinit_date,
                priority: 0,
                expire_at: 0,
            },
        };

        Ok(Packet {
            from: Some(self.identity.public_bytes()),
            messages: Some(messages),
            address: Some(address),
            seqno: Some(self.seqno.fetch_add(1, Ordering::SeqCst) + 1),
            confirm_seqno: Some(self.confirm_seqno.load(Ordering::SeqCst)),
            recv_addr_list_version: Some(self.reinit_date),
            recv_priority_addr_list_version: Some(self.reinit_date),
            reinit_date: Some(self.reinit_date),
            dst_reinit_date: Some(0),
            ..Packet::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adnl::message::register_schemes;
    use std::time::Duration;

    fn registry() -> Arc<Registry> {
        let mut reg = Registry::new();
        register_schemes(&mut reg).unwrap();
        Arc::new(reg)
    }

    async fn peer(reg: &Arc<Registry>) -> Arc<Peer> {
        Peer::bind(Identity::generate(), reg.clone(), "127.0.0.1:0")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_assigns_local_addr() {
        let reg = registry();
        let p = peer(&reg).await;
        assert_ne!(p.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_ping_gets_ponged_and_measured() {
        let reg = registry();
        let alice = peer(&reg).await;
        let bob = peer(&reg).await;

        let bob_addr = bob.local_addr().unwrap();
        let bob_key = bob.identity.public();

        tokio::spawn(alice.clone().listen());
        tokio::spawn(bob.clone().listen());

        alice.send_ping(&bob_key, bob_addr).await.unwrap();

        let bob_id = crypto::key_id_ed25519(&bob_key.to_bytes());
        let mut measured = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Some(metric) = alice.metric(&bob_id).await {
                if metric.delay_ms.is_some() {
                    measured = true;
                    break;
                }
            }
        }
        assert!(measured, "ping round trip never completed");
    }

    #[tokio::test]
    async fn test_ping_message_yields_fresh_pong() {
        let reg = registry();
        let p = peer(&reg).await;

        let reply = p
            .dispatch_message(&[1u8; 32], &Message::Ping(Ping { value: 42 }))
            .await
            .unwrap();
        assert!(matches!(reply, Some(Message::Pong(_))));
    }

    #[tokio::test]
    async fn test_pong_without_outstanding_ping_is_rejected() {
        let reg = registry();
        let p = peer(&reg).await;

        let stranger = [1u8; 32];
        let err = p
            .dispatch_message(&stranger, &Message::Pong(Pong { value: 42 }))
            .await
            .unwrap_err();
        assert!(matches!(err, DhtError::UnsolicitedPong { .. }));
        // rejection must leave no trace in the metrics table
        assert!(p.metric(&stranger).await.is_none());
    }

    #[tokio::test]
    async fn test_pong_after_settled_ping_is_rejected_but_keeps_metric() {
        let reg = registry();
        let p = peer(&reg).await;
        let peer_id = [2u8; 32];

        p.metrics.write().await.insert(
            peer_id,
            PeerMetric {
                delay_ms: None,
                ping_sent_at: Some(now_unix_millis()),
            },
        );
        p.dispatch_message(&peer_id, &Message::Pong(Pong { value: 1 }))
            .await
            .unwrap();
        assert!(p.metric(&peer_id).await.unwrap().delay_ms.is_some());

        // a second pong answers nothing
        let err = p
            .dispatch_message(&peer_id, &Message::Pong(Pong { value: 2 }))
            .await
            .unwrap_err();
        assert!(matches!(err, DhtError::UnsolicitedPong { .. }));
        assert!(p.metric(&peer_id).await.is_some());
    }

    #[tokio::test]
    async fn test_non_ping_messages_are_not_implemented() {
        let reg = registry();
        let p = peer(&reg).await;

        let err = p
            .dispatch_message(
                &[1u8; 32],
                &Message::Custom(crate::adnl::message::Custom { data: vec![1] }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DhtError::NotImplemented { .. }));
    }

    #[tokio::test]
    async fn test_short_datagram_is_rejected() {
        let reg = registry();
        let p = peer(&reg).await;
        let from: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert!(p.handle_datagram(&[0u8; 64], from).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_silently_dropped() {
        let reg = registry();
        let p = peer(&reg).await;
        let from: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        // long enough to route, but no channel and not our id
        assert!(p.handle_datagram(&[0xAAu8; 128], from).await.is_ok());
    }

    #[tokio::test]
    async fn test_channel_frame_routes_and_dispatches() {
        let reg = registry();
        let receiver = peer(&reg).await;
        let shared = [0x33u8; 32];
        let sender_side = Channel::derive(&[0x01u8; 32], &[0x02u8; 32], &shared);
        let receiver_side = Channel::derive(&[0x02u8; 32], &[0x01u8; 32], &shared);
        receiver.install_channel(receiver_side).await;

        let mut packet = Packet {
            messages: Some(vec![Message::Ping(Ping { value: 5 })]),
            seqno: Some(3),
            ..Packet::new()
        };
        packet.signature = None;
        let plain = reg.serialize(&packet.to_record(), true).unwrap();
        let frame = sender_side.seal(&plain).unwrap();

        let from: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        receiver.handle_datagram(&frame, from).await.unwrap();
        assert_eq!(receiver.confirm_seqno.load(Ordering::SeqCst), 3);
    }
}
