//! Dynamic TL value tree
//!
//! Records parsed from or destined for the wire are held as a dynamic tree;
//! typed protocol structs convert to and from `Record` at the session layer.

use crate::error::DhtError;

/// A single TL field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Int256([u8; 32]),
    Bytes(Vec<u8>),
    String(String),
    Bool(bool),
    Vector(Vec<Value>),
    Record(Record),
    /// A flag-gated field whose bit is unset; occupies zero bytes on the wire
    Absent,
}

impl Value {
    /// Field value as i32, if it is an Int
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Field value as i64, if it is a Long
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Field value as a 32-byte big integer, if it is an Int256
    pub fn as_int256(&self) -> Option<&[u8; 32]> {
        match self {
            Value::Int256(v) => Some(v),
            _ => None,
        }
    }

    /// Field value as a byte string, if it is Bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Field value as a string slice, if it is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Field value as bool, if it is a Bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Field value as a vector slice, if it is a Vector
    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Field value as a nested record, if it is a Record
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(v) => Some(v),
            _ => None,
        }
    }

    /// True when the field was gated off by its flag bit
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Short name of the value kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Int256(_) => "int256",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Vector(_) => "vector",
            Value::Record(_) => "record",
            Value::Absent => "absent",
        }
    }
}

/// A record value: a constructor name plus its fields in schema order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Constructor name the record was registered under
    pub name: String,
    /// Field values, one per schema field (including the flags carrier)
    pub fields: Vec<Value>,
}

impl Record {
    /// Create an empty record for a constructor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field value, builder style
    pub fn with(mut self, value: Value) -> Self {
        self.fields.push(value);
        self
    }

    /// Field at position, or a Truncated-style schema error
    pub fn field(&self, idx: usize) -> Result<&Value, DhtError> {
        self.fields.get(idx).ok_or_else(|| DhtError::FieldCountMismatch {
            scheme: self.name.clone(),
            expected: idx + 1,
            found: self.fields.len(),
        })
    }

    /// Verify the record carries exactly `expected` fields
    pub fn expect_fields(&self, expected: usize) -> Result<(), DhtError> {
        if self.fields.len() != expected {
            return Err(DhtError::FieldCountMismatch {
                scheme: self.name.clone(),
                expected,
                found: self.fields.len(),
            });
        }
        Ok(())
    }
}

/// Left-pad a big-endian byte slice to exactly 32 bytes
///
/// Inputs longer than 32 bytes are rejected, shorter inputs are right-aligned.
pub fn int256_from_slice(data: &[u8]) -> Result<[u8; 32], DhtError> {
    if data.len() > 32 {
        return Err(DhtError::invalid_field(format!(
            "int256 value is {} bytes, must be at most 32",
            data.len()
        )));
    }

    let mut out = [0u8; 32];
    out[32 - data.len()..].copy_from_slice(data);
    Ok(out)
}

/// Encode an unsigned integer as a 32-byte big-endian int256
pub fn int256_from_u64(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}
