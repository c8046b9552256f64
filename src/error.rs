//! Error types for the DHT node stack
//!
//! This module defines the error taxonomy shared by the codec, the secure
//! transport, the peer session and the DHT node. Schema and crypto errors are
//! always recoverable; transport errors are fatal to the owning read loop.

use std::fmt;

/// Comprehensive error type for codec, transport and protocol operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtError {
    /// A boxed value was serialized or parsed for a type that was never registered
    UnregisteredType {
        type_name: String,
    },

    /// The leading 4 bytes of a boxed value don't match the registered scheme id
    SchemeIdMismatch {
        scheme: String,
        expected: u32,
        found: u32,
    },

    /// A record's field count disagrees with its registered schema
    FieldCountMismatch {
        scheme: String,
        expected: usize,
        found: usize,
    },

    /// Insufficient bytes remained to decode a field
    Truncated {
        scheme: String,
        needed: usize,
        remaining: usize,
    },

    /// A length-prefixed byte string carried an invalid prefix
    MalformedLength {
        message: String,
    },

    /// A field value or schema text doesn't fit the declared wire type
    InvalidField {
        message: String,
        scheme: Option<String>,
    },

    /// A public key is not a valid group element or has the wrong size
    InvalidKey {
        message: String,
    },

    /// Key material or checksum input below the minimum length
    InvalidSize {
        message: String,
    },

    /// The recomputed SHA-256 of a decrypted packet didn't match the advertised checksum
    IntegrityFailure,

    /// A Pong arrived from a peer with no outstanding Ping
    UnsolicitedPong {
        peer: String,
    },

    /// A message kind that is a placeholder in the current protocol
    NotImplemented {
        kind: String,
    },

    /// An inbound command's scheme id maps to no known command
    UnknownCommand {
        scheme_id: u32,
    },

    /// Socket read/write failure, fatal to the owning read loop
    Network {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },
}

impl DhtError {
    /// Create a new UnregisteredType error
    pub fn unregistered_type(type_name: impl Into<String>) -> Self {
        DhtError::UnregisteredType {
            type_name: type_name.into(),
        }
    }

    /// Create a new InvalidField error
    pub fn invalid_field(message: impl Into<String>) -> Self {
        DhtError::InvalidField {
            message: message.into(),
            scheme: None,
        }
    }

    /// Create a new InvalidField error tagged with the offending scheme
    pub fn invalid_field_in(message: impl Into<String>, scheme: impl Into<String>) -> Self {
        DhtError::InvalidField {
            message: message.into(),
            scheme: Some(scheme.into()),
        }
    }

    /// Create a new MalformedLength error
    pub fn malformed_length(message: impl Into<String>) -> Self {
        DhtError::MalformedLength {
            message: message.into(),
        }
    }

    /// Create a new InvalidKey error
    pub fn invalid_key(message: impl Into<String>) -> Self {
        DhtError::InvalidKey {
            message: message.into(),
        }
    }

    /// Create a new InvalidSize error
    pub fn invalid_size(message: impl Into<String>) -> Self {
        DhtError::InvalidSize {
            message: message.into(),
        }
    }

    /// Create a new UnsolicitedPong error
    pub fn unsolicited_pong(peer: impl Into<String>) -> Self {
        DhtError::UnsolicitedPong { peer: peer.into() }
    }

    /// Create a new NotImplemented error
    pub fn not_implemented(kind: impl Into<String>) -> Self {
        DhtError::NotImplemented { kind: kind.into() }
    }

    /// Create a new Network error
    pub fn network_error(message: impl Into<String>) -> Self {
        DhtError::Network {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new Network error with address
    pub fn network_error_with_address(
        message: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        DhtError::Network {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new Network error with address and source
    pub fn network_error_full(
        message: impl Into<String>,
        address: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        DhtError::Network {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// True for codec errors surfaced by serialize/parse
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            DhtError::UnregisteredType { .. }
                | DhtError::SchemeIdMismatch { .. }
                | DhtError::FieldCountMismatch { .. }
                | DhtError::Truncated { .. }
                | DhtError::MalformedLength { .. }
                | DhtError::InvalidField { .. }
        )
    }

    /// True for key/cipher errors that drop the datagram
    pub fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            DhtError::InvalidKey { .. } | DhtError::InvalidSize { .. } | DhtError::IntegrityFailure
        )
    }

    /// True for protocol-level errors that are logged without a reply
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            DhtError::UnsolicitedPong { .. }
                | DhtError::NotImplemented { .. }
                | DhtError::UnknownCommand { .. }
        )
    }
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DhtError::UnregisteredType { type_name } => {
                write!(f, "Schema error: type not registered: {}", type_name)
            }
            DhtError::SchemeIdMismatch {
                scheme,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Schema error: scheme id mismatch for {}: expected {:08x}, found {:08x}",
                    scheme, expected, found
                )
            }
            DhtError::FieldCountMismatch {
                scheme,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Schema error: field count mismatch for {}: schema declares {}, value has {}",
                    scheme, expected, found
                )
            }
            DhtError::Truncated {
                scheme,
                needed,
                remaining,
            } => {
                write!(
                    f,
                    "Schema error: truncated input for {}: need {} bytes, {} remain",
                    scheme, needed, remaining
                )
            }
            DhtError::MalformedLength { message } => {
                write!(f, "Schema error: malformed length prefix: {}", message)
            }
            DhtError::InvalidField { message, scheme } => {
                if let Some(s) = scheme {
                    write!(f, "Schema error: {} (scheme: {})", message, s)
                } else {
                    write!(f, "Schema error: {}", message)
                }
            }
            DhtError::InvalidKey { message } => write!(f, "Crypto error: invalid key: {}", message),
            DhtError::InvalidSize { message } => {
                write!(f, "Crypto error: invalid size: {}", message)
            }
            DhtError::IntegrityFailure => {
                write!(f, "Crypto error: packet checksum mismatch")
            }
            DhtError::UnsolicitedPong { peer } => {
                write!(f, "Protocol error: unsolicited pong from peer {}", peer)
            }
            DhtError::NotImplemented { kind } => {
                write!(f, "Protocol error: message kind not implemented: {}", kind)
            }
            DhtError::UnknownCommand { scheme_id } => {
                write!(
                    f,
                    "Protocol error: unknown command scheme id {:08x}",
                    scheme_id
                )
            }
            DhtError::Network {
                message,
                address,
                source,
            } => match (address, source) {
                (Some(a), Some(s)) => {
                    write!(f, "Network error: {} (address: {}, source: {})", message, a, s)
                }
                (Some(a), None) => write!(f, "Network error: {} (address: {})", message, a),
                (None, Some(s)) => write!(f, "Network error: {} (source: {})", message, s),
                (None, None) => write!(f, "Network error: {}", message),
            },
        }
    }
}

impl std::error::Error for DhtError {}

impl From<std::io::Error> for DhtError {
    fn from(err: std::io::Error) -> Self {
        DhtError::network_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_json::Error> for DhtError {
    fn from(err: serde_json::Error) -> Self {
        DhtError::invalid_field(format!("failed to parse bootstrap document: {}", err))
    }
}

impl From<ed25519_dalek::SignatureError> for DhtError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        DhtError::invalid_key(err.to_string())
    }
}
