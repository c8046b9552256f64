//! ADNL message types
//!
//! The typed protocol surface over the dynamic codec. Each message kind maps
//! to one registered scheme; packets carry them boxed in `adnl.Message` slots.

use crate::crypto::identity::{PUB_AES_SCHEME, PUB_ED25519_SCHEME};
use crate::error::DhtError;
use crate::tl::{Record, Registry, Value};
use std::net::{Ipv4Addr, SocketAddrV4};

pub const ID_SHORT_SCHEME: &str = "adnl.id.short id:int256 = adnl.id.Short";
pub const ADDRESS_UDP_SCHEME: &str = "adnl.address.udp ip:int port:int = adnl.Address";
pub const ADDRESS_LIST_SCHEME: &str = "adnl.addressList addrs:(vector adnl.Address) version:int reinit_date:int priority:int expire_at:int = adnl.AddressList";
pub const CREATE_CHANNEL_SCHEME: &str =
    "adnl.message.createChannel key:int256 date:int = adnl.Message";
pub const CONFIRM_CHANNEL_SCHEME: &str =
    "adnl.message.confirmChannel key:int256 peer_key:int256 date:int = adnl.Message";
pub const QUERY_SCHEME: &str = "adnl.message.query query_id:int256 query:bytes = adnl.Message";
pub const ANSWER_SCHEME: &str = "adnl.message.answer query_id:int256 answer:bytes = adnl.Message";
pub const CUSTOM_SCHEME: &str = "adnl.message.custom data:bytes = adnl.Message";
pub const PING_SCHEME: &str = "adnl.ping value:long = adnl.Pong";
pub const PONG_SCHEME: &str = "adnl.pong value:long = adnl.Pong";
pub const PACKET_CONTENTS_SCHEME: &str = "adnl.packetContents rand1:bytes flags:# from:flags.0?PublicKey from_short:flags.1?adnl.id.short message:flags.2?adnl.Message messages:flags.3?(vector adnl.Message) address:flags.4?adnl.addressList priority_address:flags.5?adnl.addressList seqno:flags.6?long confirm_seqno:flags.7?long recv_addr_list_version:flags.8?int recv_priority_addr_list_version:flags.9?int reinit_date:flags.10?int dst_reinit_date:flags.10?int signature:flags.11?bytes rand2:bytes = adnl.PacketContents";

/// Register every ADNL scheme with the codec
pub fn register_schemes(reg: &mut Registry) -> Result<(), DhtError> {
    reg.register_all(&[
        PUB_ED25519_SCHEME,
        PUB_AES_SCHEME,
        ID_SHORT_SCHEME,
        ADDRESS_UDP_SCHEME,
        ADDRESS_LIST_SCHEME,
        CREATE_CHANNEL_SCHEME,
        CONFIRM_CHANNEL_SCHEME,
        QUERY_SCHEME,
        ANSWER_SCHEME,
        CUSTOM_SCHEME,
        PING_SCHEME,
        PONG_SCHEME,
        PACKET_CONTENTS_SCHEME,
    ])
}

pub(crate) fn int_field(rec: &Record, idx: usize) -> Result<i32, DhtError> {
    rec.field(idx)?
        .as_int()
        .ok_or_else(|| DhtError::invalid_field_in(format!("field {} is not an int", idx), &rec.name))
}

pub(crate) fn long_field(rec: &Record, idx: usize) -> Result<i64, DhtError> {
    rec.field(idx)?
        .as_long()
        .ok_or_else(|| DhtError::invalid_field_in(format!("field {} is not a long", idx), &rec.name))
}

pub(crate) fn int256_field(rec: &Record, idx: usize) -> Result<[u8; 32], DhtError> {
    rec.field(idx)?
        .as_int256()
        .copied()
        .ok_or_else(|| {
            DhtError::invalid_field_in(format!("field {} is not an int256", idx), &rec.name)
        })
}

pub(crate) fn bytes_field(rec: &Record, idx: usize) -> Result<Vec<u8>, DhtError> {
    rec.field(idx)?
        .as_bytes()
        .map(|b| b.to_vec())
        .ok_or_else(|| {
            DhtError::invalid_field_in(format!("field {} is not bytes", idx), &rec.name)
        })
}

/// Proposal of a symmetric channel, carrying our channel public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChannel {
    pub key: [u8; 32],
    pub date: i32,
}

/// Acceptance of a proposed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmChannel {
    pub key: [u8; 32],
    pub peer_key: [u8; 32],
    pub date: i32,
}

/// An RPC request expecting an answer with the same query id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub query_id: [u8; 32],
    pub query: Vec<u8>,
}

/// The reply to a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub query_id: [u8; 32],
    pub answer: Vec<u8>,
}

/// Opaque application payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Custom {
    pub data: Vec<u8>,
}

/// Session liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub value: i64,
}

/// Liveness reply; carries a fresh random value, not an echo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub value: i64,
}

/// The closed set of message kinds a packet may carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    CreateChannel(CreateChannel),
    ConfirmChannel(ConfirmChannel),
    Query(Query),
    Answer(Answer),
    Custom(Custom),
    Ping(Ping),
    Pong(Pong),
}

impl Message {
    /// Constructor name of this message's scheme
    pub fn constructor(&self) -> &'static str {
        match self {
            Message::CreateChannel(_) => "adnl.message.createChannel",
            Message::ConfirmChannel(_) => "adnl.message.confirmChannel",
            Message::Query(_) => "adnl.message.query",
            Message::Answer(_) => "adnl.message.answer",
            Message::Custom(_) => "adnl.message.custom",
            Message::Ping(_) => "adnl.ping",
            Message::Pong(_) => "adnl.pong",
        }
    }

    /// Convert to a dynamic record for serialization
    pub fn to_record(&self) -> Record {
        match self {
            Message::CreateChannel(m) => Record::new(self.constructor())
                .with(Value::Int256(m.key))
                .with(Value::Int(m.date)),
            Message::ConfirmChannel(m) => Record::new(self.constructor())
                .with(Value::Int256(m.key))
                .with(Value::Int256(m.peer_key))
                .with(Value::Int(m.date)),
            Message::Query(m) => Record::new(self.constructor())
                .with(Value::Int256(m.query_id))
                .with(Value::Bytes(m.query.clone())),
            Message::Answer(m) => Record::new(self.constructor())
                .with(Value::Int256(m.query_id))
                .with(Value::Bytes(m.answer.clone())),
            Message::Custom(m) => {
                Record::new(self.constructor()).with(Value::Bytes(m.data.clone()))
            }
            Message::Ping(m) => Record::new(self.constructor()).with(Value::Long(m.value)),
            Message::Pong(m) => Record::new(self.constructor()).with(Value::Long(m.value)),
        }
    }

    /// Rebuild a typed message from a parsed record
    pub fn from_record(rec: &Record) -> Result<Self, DhtError> {
        match rec.name.as_str() {
            "adnl.message.createChannel" => Ok(Message::CreateChannel(CreateChannel {
                key: int256_field(rec, 0)?,
                date: int_field(rec, 1)?,
            })),
            "adnl.message.confirmChannel" => Ok(Message::ConfirmChannel(ConfirmChannel {
                key: int256_field(rec, 0)?,
                peer_key: int256_field(rec, 1)?,
                date: int_field(rec, 2)?,
            })),
            "adnl.message.query" => Ok(Message::Query(Query {
                query_id: int256_field(rec, 0)?,
                query: bytes_field(rec, 1)?,
            })),
            "adnl.message.answer" => Ok(Message::Answer(Answer {
                query_id: int256_field(rec, 0)?,
                answer: bytes_field(rec, 1)?,
            })),
            "adnl.message.custom" => Ok(Message::Custom(Custom {
                data: bytes_field(rec, 0)?,
            })),
            "adnl.ping" => Ok(Message::Ping(Ping {
                value: long_field(rec, 0)?,
            })),
            "adnl.pong" => Ok(Message::Pong(Pong {
                value: long_field(rec, 0)?,
            })),
            other => Err(DhtError::not_implemented(other)),
        }
    }
}

/// One UDP endpoint in an address list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpAddress {
    pub ip: i32,
    pub port: i32,
}

impl UdpAddress {
    pub fn from_socket_addr(addr: SocketAddrV4) -> Self {
        Self {
            ip: u32::from_be_bytes(addr.ip().octets()) as i32,
            port: addr.port() as i32,
        }
    }

    pub fn to_socket_addr(self) -> SocketAddrV4 {
        SocketAddrV4::new(
            Ipv4Addr::from((self.ip as u32).to_be_bytes()),
            self.port as u16,
        )
    }

    pub fn to_record(self) -> Record {
        Record::new("adnl.address.udp")
            .with(Value::Int(self.ip))
            .with(Value::Int(self.port))
    }

    pub fn from_record(rec: &Record) -> Result<Self, DhtError> {
        Ok(Self {
            ip: int_field(rec, 0)?,
            port: int_field(rec, 1)?,
        })
    }
}

/// The addresses a peer is reachable at, with versioning metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressList {
    pub addresses: Vec<UdpAddress>,
    pub version: i32,
    pub reinit_date: i32,
    pub priority: i32,
    pub expire_at: i32,
}

impl AddressList {
    pub fn to_record(&self) -> Record {
        Record::new("adnl.addressList")
            .with(Value::Vector(
                self.addresses
                    .iter()
                    .map(|a| Value::Record(a.to_record()))
                    .collect(),
            ))
            .with(Value::Int(self.version))
            .with(Value::Int(self.reinit_date))
            .with(Value::Int(self.priority))
            .with(Value::Int(self.expire_at))
    }

    pub fn from_record(rec: &Record) -> Result<Self, DhtError> {
        let addrs = rec.field(0)?.as_vector().ok_or_else(|| {
            DhtError::invalid_field_in("address list field 0 is not a vector", &rec.name)
        })?;
        let addresses = addrs
            .iter()
            .map(|v| {
                v.as_record()
                    .ok_or_else(|| {
                        DhtError::invalid_field_in("address element is not a record", &rec.name)
                    })
                    .and_then(UdpAddress::from_record)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            addresses,
            version: int_field(rec, 1)?,
            reinit_date: int_field(rec, 2)?,
            priority: int_field(rec, 3)?,
            expire_at: int_field(rec, 4)?,
        })
    }
}
