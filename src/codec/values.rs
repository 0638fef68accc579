//! Scalar payload codecs shared by several characteristics.

use crate::error::ProtocolError;

/// Require a non-empty payload of at least `len` bytes.
pub fn require_len(what: &'static str, bytes: &[u8], len: usize) -> Result<(), ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::Empty { what });
    }
    if bytes.len() < len {
        return Err(ProtocolError::TooShort {
            what,
            expected: len,
            actual: bytes.len(),
        });
    }
    Ok(())
}

pub fn decode_u8(what: &'static str, bytes: &[u8]) -> Result<u8, ProtocolError> {
    require_len(what, bytes, 1)?;
    Ok(bytes[0])
}

/// Little-endian `u16`.
pub fn decode_u16(what: &'static str, bytes: &[u8]) -> Result<u16, ProtocolError> {
    require_len(what, bytes, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn encode_u16(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// UTF-8 text with any trailing NUL padding removed. An empty result is
/// accepted unless `required` is set.
pub fn decode_text(
    what: &'static str,
    bytes: &[u8],
    required: bool,
) -> Result<String, ProtocolError> {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| ProtocolError::InvalidText { what })?;
    if required && text.is_empty() {
        return Err(ProtocolError::Empty { what });
    }
    Ok(text.to_string())
}

pub fn encode_text(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}
