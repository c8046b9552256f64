//! Low-level TL wire encoding
//!
//! Byte strings are length-prefixed: one length byte below 254, otherwise a
//! 0xFE marker followed by a 3-byte little-endian length. The prefix plus data
//! run is zero-padded to the next multiple of 4.

use crate::error::DhtError;
use crate::tl::scheme::scheme_crc32;

/// Marker byte introducing a 3-byte length
const LONG_LENGTH_MARKER: u8 = 0xFE;

/// Scheme id of `boolTrue = Bool`
pub fn bool_true_id() -> u32 {
    scheme_crc32("boolTrue = Bool")
}

/// Scheme id of `boolFalse = Bool`
pub fn bool_false_id() -> u32 {
    scheme_crc32("boolFalse = Bool")
}

/// Append a length-prefixed, zero-padded byte string
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) -> Result<(), DhtError> {
    let prefix_len = if data.len() < LONG_LENGTH_MARKER as usize {
        out.push(data.len() as u8);
        1
    } else {
        if data.len() >= 1 << 24 {
            return Err(DhtError::malformed_length(format!(
                "byte string of {} bytes exceeds the 3-byte length limit",
                data.len()
            )));
        }
        out.push(LONG_LENGTH_MARKER);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes()[..3]);
        4
    };

    out.extend_from_slice(data);

    let run = prefix_len + data.len();
    if run % 4 != 0 {
        out.extend(std::iter::repeat(0u8).take(4 - run % 4));
    }

    Ok(())
}

/// Decode a length-prefixed byte string, returning the value and bytes consumed
/// (prefix, data and padding)
pub fn read_bytes(data: &[u8]) -> Result<(Vec<u8>, usize), DhtError> {
    let first = *data.first().ok_or_else(|| {
        DhtError::malformed_length("empty input where a length prefix was expected".to_string())
    })?;

    let (len, prefix_len) = if first < LONG_LENGTH_MARKER {
        (first as usize, 1usize)
    } else if first == LONG_LENGTH_MARKER {
        if data.len() < 4 {
            return Err(DhtError::malformed_length(
                "truncated 3-byte length prefix".to_string(),
            ));
        }
        let len = u32::from_le_bytes([data[1], data[2], data[3], 0]) as usize;
        (len, 4usize)
    } else {
        return Err(DhtError::malformed_length(format!(
            "invalid length marker byte 0x{:02x}",
            first
        )));
    };

    let run = prefix_len + len;
    let consumed = run + (4 - run % 4) % 4;
    if data.len() < consumed {
        return Err(DhtError::Truncated {
            scheme: "bytes".to_string(),
            needed: consumed,
            remaining: data.len(),
        });
    }

    Ok((data[prefix_len..prefix_len + len].to_vec(), consumed))
}
