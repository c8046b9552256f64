//! Authenticated datagram protocol
//!
//! Typed messages and packets over the TL codec, direct envelopes and
//! symmetric channels for encryption, and the peer session that ties them to
//! a UDP socket.

pub mod channel;
pub mod message;
pub mod packet;
pub mod peer;

pub use channel::Channel;
pub use message::{register_schemes, AddressList, Message, Ping, Pong, Query, UdpAddress};
pub use packet::Packet;
pub use peer::{Peer, PeerMetric};
