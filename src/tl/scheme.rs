//! TL scheme definitions
//!
//! Parses canonical scheme text of the form
//! `constructor field1:type1 field2:type2 ... = Combinator` and computes the
//! 4-byte scheme id used as the type tag of boxed values.

use crate::error::DhtError;

/// Compute the CRC32 of a scheme text with `(`, `)` and `;` stripped
pub fn scheme_crc32(scheme: &str) -> u32 {
    let canonical: String = scheme
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ';'))
        .collect();

    crc32fast::hash(canonical.as_bytes())
}

/// Scheme id as the little-endian hex string used in logs and wire dumps
pub fn scheme_id_hex(scheme: &str) -> String {
    hex::encode(scheme_crc32(scheme).to_le_bytes())
}

/// Wire type of a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireType {
    /// 4-byte little-endian integer
    Int,
    /// 8-byte little-endian integer
    Long,
    /// 32-byte big-endian big integer
    Int256,
    /// Length-prefixed byte string, padded to a 4-byte boundary
    Bytes,
    /// Length-prefixed UTF-8 string, padded to a 4-byte boundary
    String,
    /// 4-byte CRC32 constant for true/false
    Bool,
    /// The `#` flags carrier, a plain 4-byte integer gating later fields
    Flags,
    /// `vector T`: 4-byte element count followed by each element
    Vector(Box<WireType>),
    /// A nested registered type, referenced by constructor (bare) or combinator (boxed)
    Named(String),
    /// `flags.N?T`: present only when bit N of the flags word is set
    Conditional { bit: u8, inner: Box<WireType> },
}

impl WireType {
    /// Parse a type expression from scheme text
    pub fn parse(text: &str) -> Result<Self, DhtError> {
        let text = strip_parens(text.trim());

        if text.is_empty() {
            return Err(DhtError::invalid_field("empty type expression"));
        }

        if text == "#" {
            return Ok(WireType::Flags);
        }

        if let Some(rest) = text.strip_prefix("flags.") {
            let (bit_str, inner) = rest.split_once('?').ok_or_else(|| {
                DhtError::invalid_field(format!("conditional type without '?': {}", text))
            })?;
            let bit: u8 = bit_str.parse().map_err(|_| {
                DhtError::invalid_field(format!("invalid bit position: {}", bit_str))
            })?;
            // the flags carrier is a 32-bit word
            if bit > 31 {
                return Err(DhtError::invalid_field(format!(
                    "bit position out of range: {}",
                    bit
                )));
            }
            return Ok(WireType::Conditional {
                bit,
                inner: Box::new(WireType::parse(inner)?),
            });
        }

        if let Some(rest) = text.strip_prefix("vector ") {
            return Ok(WireType::Vector(Box::new(WireType::parse(rest)?)));
        }

        Ok(match text {
            "int" => WireType::Int,
            "long" => WireType::Long,
            "int256" => WireType::Int256,
            "bytes" => WireType::Bytes,
            "string" => WireType::String,
            "bool" => WireType::Bool,
            other => WireType::Named(other.to_string()),
        })
    }
}

/// A named field in a scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: WireType,
}

/// A parsed TL scheme definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    /// Canonical scheme text as registered
    pub text: String,
    /// Record name, the text before the first space
    pub constructor: String,
    /// Result type, the text after the final space
    pub combinator: String,
    /// Ordered field list
    pub fields: Vec<Field>,
    /// CRC32 of the canonicalized text, the boxed type tag
    pub id: u32,
}

impl Scheme {
    /// Parse a scheme definition from its canonical text
    pub fn parse(text: &str) -> Result<Self, DhtError> {
        let tokens = tokenize(text.trim().trim_end_matches(';'));
        if tokens.len() < 3 {
            return Err(DhtError::invalid_field(format!(
                "scheme needs at least 'constructor = Combinator': {}",
                text
            )));
        }

        let eq_pos = tokens
            .iter()
            .position(|t| t == "=")
            .ok_or_else(|| DhtError::invalid_field(format!("scheme without '=': {}", text)))?;
        if eq_pos + 2 != tokens.len() {
            return Err(DhtError::invalid_field(format!(
                "scheme combinator must be a single trailing token: {}",
                text
            )));
        }

        let constructor = tokens[0].clone();
        let combinator = tokens[eq_pos + 1].clone();

        let mut fields = Vec::with_capacity(eq_pos.saturating_sub(1));
        for token in &tokens[1..eq_pos] {
            let (name, ty_text) = token.split_once(':').ok_or_else(|| {
                DhtError::invalid_field(format!("field without ':' separator: {}", token))
            })?;
            fields.push(Field {
                name: name.to_string(),
                ty: WireType::parse(ty_text)?,
            });
        }

        Ok(Self {
            text: text.to_string(),
            constructor,
            combinator,
            fields,
            id: scheme_crc32(text),
        })
    }
}

/// Split scheme text on spaces, keeping parenthesized sub-expressions whole
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth: u32 = 0;

    for ch in text.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Strip a single level of wrapping parentheses, e.g. `(vector T)` -> `vector T`
fn strip_parens(text: &str) -> &str {
    if text.starts_with('(') && text.ends_with(')') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}
