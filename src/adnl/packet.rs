//! ADNL packet contents
//!
//! The typed view of `adnl.packetContents`. Optional fields map to flag bits;
//! the flags word is always recomputed from field presence so a packet can
//! never disagree with its own bitmap. Signatures cover the packet serialized
//! without the signature field.

use crate::adnl::message::{bytes_field, int_field, long_field, AddressList, Message};
use crate::crypto::identity::{verify, Identity};
use crate::error::DhtError;
use crate::tl::{Record, Registry, Value};
use ed25519_dalek::VerifyingKey;
use rand::Rng;

/// Flag bit of each optional field
mod flag {
    pub const FROM: u32 = 1 << 0;
    pub const FROM_SHORT: u32 = 1 << 1;
    pub const MESSAGE: u32 = 1 << 2;
    pub const MESSAGES: u32 = 1 << 3;
    pub const ADDRESS: u32 = 1 << 4;
    pub const PRIORITY_ADDRESS: u32 = 1 << 5;
    pub const SEQNO: u32 = 1 << 6;
    pub const CONFIRM_SEQNO: u32 = 1 << 7;
    pub const RECV_ADDR_VERSION: u32 = 1 << 8;
    pub const RECV_PRIORITY_ADDR_VERSION: u32 = 1 << 9;
    pub const REINIT_DATES: u32 = 1 << 10;
    pub const SIGNATURE: u32 = 1 << 11;
}

/// A decoded ADNL packet
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub rand1: Vec<u8>,
    /// Sender's ed25519 public key
    pub from: Option<[u8; 32]>,
    pub from_short: Option<[u8; 32]>,
    pub message: Option<Message>,
    pub messages: Option<Vec<Message>>,
    pub address: Option<AddressList>,
    pub priority_address: Option<AddressList>,
    pub seqno: Option<i64>,
    pub confirm_seqno: Option<i64>,
    pub recv_addr_list_version: Option<i32>,
    pub recv_priority_addr_list_version: Option<i32>,
    /// Set together with dst_reinit_date, they share one flag bit
    pub reinit_date: Option<i32>,
    pub dst_reinit_date: Option<i32>,
    pub signature: Option<Vec<u8>>,
    pub rand2: Vec<u8>,
}

/// Random padding run of 15 or 7 bytes, chosen by coin flip
pub fn random_padding() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let len = if rng.gen::<bool>() { 15 } else { 7 };
    let mut pad = vec![0u8; len];
    rng.fill(&mut pad[..]);
    pad
}

impl Packet {
    /// Empty packet with fresh random padding runs
    pub fn new() -> Self {
        Self {
            rand1: random_padding(),
            rand2: random_padding(),
            ..Default::default()
        }
    }

    /// Flags word derived from field presence
    pub fn flags(&self) -> u32 {
        let mut flags = 0u32;
        if self.from.is_some() {
            flags |= flag::FROM;
        }
        if self.from_short.is_some() {
            flags |= flag::FROM_SHORT;
        }
        if self.message.is_some() {
            flags |= flag::MESSAGE;
        }
        if self.messages.is_some() {
            flags |= flag::MESSAGES;
        }
        if self.address.is_some() {
            flags |= flag::ADDRESS;
        }
        if self.priority_address.is_some() {
            flags |= flag::PRIORITY_ADDRESS;
        }
        if self.seqno.is_some() {
            flags |= flag::SEQNO;
        }
        if self.confirm_seqno.is_some() {
            flags |= flag::CONFIRM_SEQNO;
        }
        if self.recv_addr_list_version.is_some() {
            flags |= flag::RECV_ADDR_VERSION;
        }
        if self.recv_priority_addr_list_version.is_some() {
            flags |= flag::RECV_PRIORITY_ADDR_VERSION;
        }
        if self.reinit_date.is_some() {
            flags |= flag::REINIT_DATES;
        }
        if self.signature.is_some() {
            flags |= flag::SIGNATURE;
        }
        flags
    }

    /// Convert to a dynamic record for serialization
    pub fn to_record(&self) -> Record {
        let opt = |v: Option<Value>| v.unwrap_or(Value::Absent);

        Record::new("adnl.packetContents")
            .with(Value::Bytes(self.rand1.clone()))
            .with(Value::Int(self.flags() as i32))
            .with(opt(self.from.map(|key| {
                Value::Record(Record::new("pub.ed25519").with(Value::Int256(key)))
            })))
            .with(opt(self.from_short.map(|id| {
                Value::Record(Record::new("adnl.id.short").with(Value::Int256(id)))
            })))
            .with(opt(self
                .message
                .as_ref()
                .map(|m| Value::Record(m.to_record()))))
            .with(opt(self.messages.as_ref().map(|msgs| {
                Value::Vector(msgs.iter().map(|m| Value::Record(m.to_record())).collect())
            })))
            .with(opt(self.address.as_ref().map(|a| Value::Record(a.to_record()))))
            .with(opt(self
                .priority_address
                .as_ref()
                .map(|a| Value::Record(a.to_record()))))
            .with(opt(self.seqno.map(Value::Long)))
            .with(opt(self.confirm_seqno.map(Value::Long)))
            .with(opt(self.recv_addr_list_version.map(Value::Int)))
            .with(opt(self.recv_priority_addr_list_version.map(Value::Int)))
            .with(opt(self.reinit_date.map(Value::Int)))
            .with(opt(self
                .reinit_date
                .map(|_| Value::Int(self.dst_reinit_date.unwrap_or(0)))))
            .with(opt(self.signature.as_ref().map(|s| Value::Bytes(s.clone()))))
            .with(Value::Bytes(self.rand2.clone()))
    }

    /// Rebuild a typed packet from a parsed record
    pub fn from_record(rec: &Record) -> Result<Self, DhtError> {
        rec.expect_fields(16)?;

        let message = match rec.field(4)? {
            Value::Absent => None,
            Value::Record(m) => Some(Message::from_record(m)?),
            other => {
                return Err(DhtError::invalid_field_in(
                    format!("message field is {}", other.kind()),
                    &rec.name,
                ))
            }
        };

        let messages = match rec.field(5)? {
            Value::Absent => None,
            Value::Vector(items) => Some(
                items
                    .iter()
                    .map(|v| {
                        v.as_record()
                            .ok_or_else(|| {
                                DhtError::invalid_field_in(
                                    "messages element is not a record",
                                    &rec.name,
                                )
                            })
                            .and_then(Message::from_record)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            other => {
                return Err(DhtError::invalid_field_in(
                    format!("messages field is {}", other.kind()),
                    &rec.name,
                ))
            }
        };

        let opt_record = |idx: usize| -> Result<Option<Record>, DhtError> {
            match rec.field(idx)? {
                Value::Absent => Ok(None),
                Value::Record(r) => Ok(Some(r.clone())),
                other => Err(DhtError::invalid_field_in(
                    format!("field {} is {}", idx, other.kind()),
                    &rec.name,
                )),
            }
        };
        let opt_long = |idx: usize| -> Result<Option<i64>, DhtError> {
            match rec.field(idx)? {
                Value::Absent => Ok(None),
                _ => Ok(Some(long_field(rec, idx)?)),
            }
        };
        let opt_int = |idx: usize| -> Result<Option<i32>, DhtError> {
            match rec.field(idx)? {
                Value::Absent => Ok(None),
                _ => Ok(Some(int_field(rec, idx)?)),
            }
        };

        let key_field = |r: Record| -> Result<[u8; 32], DhtError> {
            r.field(0)?
                .as_int256()
                .copied()
                .ok_or_else(|| DhtError::invalid_field_in("key field is not an int256", &r.name))
        };

        Ok(Self {
            rand1: bytes_field(rec, 0)?,
            from: opt_record(2)?.map(key_field).transpose()?,
            from_short: opt_record(3)?.map(key_field).transpose()?,
            message,
            messages,
            address: opt_record(6)?
                .map(|r| AddressList::from_record(&r))
                .transpose()?,
            priority_address: opt_record(7)?
                .map(|r| AddressList::from_record(&r))
                .transpose()?,
            seqno: opt_long(8)?,
            confirm_seqno: opt_long(9)?,
            recv_addr_list_version: opt_int(10)?,
            recv_priority_addr_list_version: opt_int(11)?,
            reinit_date: opt_int(12)?,
            dst_reinit_date: opt_int(13)?,
            signature: match rec.field(14)? {
                Value::Absent => None,
                _ => Some(bytes_field(rec, 14)?),
            },
            rand2: bytes_field(rec, 15)?,
        })
    }

    /// Serialize the packet boxed and signed with the node key
    ///
    /// The signature covers the packet serialized without the signature
    /// field; two serialization passes produce the final bytes.
    pub fn sign_and_serialize(
        &mut self,
        reg: &Registry,
        identity: &Identity,
    ) -> Result<Vec<u8>, DhtError> {
        self.signature = None;
        let unsigned = reg.serialize(&self.to_record(), true)?;
        self.signature = Some(identity.sign(&unsigned).to_vec());
        reg.serialize(&self.to_record(), true)
    }

    /// Verify the packet signature against a sender key
    pub fn verify_signature(&self, reg: &Registry, key: &VerifyingKey) -> Result<(), DhtError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| DhtError::invalid_key("packet carries no signature"))?
            .clone();

        let mut unsigned = self.clone();
        unsigned.signature = None;
        let bytes = reg.serialize(&unsigned.to_record(), true)?;
        verify(key, &bytes, &signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adnl::message::{register_schemes, Ping, UdpAddress};

    fn registry() -> Registry {
        let mut reg = Registry::new();
        register_schemes(&mut reg).unwrap();
        reg
    }

    fn sample_packet(identity: &Identity) -> Packet {
        Packet {
            from: Some(identity.public_bytes()),
            messages: Some(vec![Message::Ping(Ping { value: 77 })]),
            address: Some(AddressList {
                addresses: vec![UdpAddress { ip: 16909060, port: 3278 }],
                version: 100,
                reinit_date: 100,
                priority: 0,
                expire_at: 0,
            }),
            seqno: Some(1),
            confirm_seqno: Some(0),
            recv_addr_list_version: Some(100),
            recv_priority_addr_list_version: Some(100),
            reinit_date: Some(100),
            dst_reinit_date: Some(0),
            ..Packet::new()
        }
    }

    #[test]
    fn test_random_padding_lengths() {
        for _ in 0..32 {
            let pad = random_padding();
            assert!(pad.len() == 15 || pad.len() == 7);
        }
    }

    #[test]
    fn test_flags_follow_field_presence() {
        let mut p = Packet::new();
        assert_eq!(p.flags(), 0);

        p.seqno = Some(1);
        assert_eq!(p.flags(), 1 << 6);

        p.from = Some([0u8; 32]);
        p.reinit_date = Some(0);
        assert_eq!(p.flags(), (1 << 0) | (1 << 6) | (1 << 10));

        p.signature = Some(vec![0u8; 64]);
        assert_eq!(p.flags() & (1 << 11), 1 << 11);
    }

    #[test]
    fn test_packet_wire_round_trip() {
        let reg = registry();
        let identity = Identity::generate();
        let packet = sample_packet(&identity);

        let data = reg.serialize(&packet.to_record(), true).unwrap();
        let (rec, consumed) = reg.parse(&data, "adnl.packetContents", true).unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(Packet::from_record(&rec).unwrap(), packet);
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let reg = registry();
        let identity = Identity::generate();
        let mut packet = sample_packet(&identity);

        let data = packet.sign_and_serialize(&reg, &identity).unwrap();
        let (rec, _) = reg.parse(&data, "adnl.packetContents", true).unwrap();
        let parsed = Packet::from_record(&rec).unwrap();

        assert!(parsed.signature.is_some());
        parsed.verify_signature(&reg, &identity.public()).unwrap();
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let reg = registry();
        let identity = Identity::generate();
        let other = Identity::generate();
        let mut packet = sample_packet(&identity);

        let data = packet.sign_and_serialize(&reg, &identity).unwrap();
        let (rec, _) = reg.parse(&data, "adnl.packetContents", true).unwrap();
        let parsed = Packet::from_record(&rec).unwrap();

        assert!(parsed.verify_signature(&reg, &other.public()).is_err());
    }

    #[test]
    fn test_verify_rejects_modified_packet() {
        let reg = registry();
        let identity = Identity::generate();
        let mut packet = sample_packet(&identity);

        packet.sign_and_serialize(&reg, &identity).unwrap();
        packet.seqno = Some(2);
        assert!(packet.verify_signature(&reg, &identity.public()).is_err());
    }

    #[test]
    fn test_unsigned_packet_fails_verification() {
        let reg = registry();
        let identity = Identity::generate();
        let packet = sample_packet(&identity);
        assert!(packet.verify_signature(&reg, &identity.public()).is_err());
    }
}
