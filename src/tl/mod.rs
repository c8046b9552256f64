//! Schema-driven TL binary codec
//!
//! Scheme texts are registered once, then drive both serialization and
//! parsing of dynamic record values. Boxed values carry a 4-byte CRC32 type
//! tag; bare values are raw field runs.

pub mod registry;
pub mod scheme;
pub mod value;
pub mod wire;

pub use registry::Registry;
pub use scheme::{scheme_crc32, scheme_id_hex, Field, Scheme, WireType};
pub use value::{int256_from_slice, int256_from_u64, Record, Value};
