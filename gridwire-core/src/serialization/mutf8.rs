//! Modified UTF-8 text encoding.
//!
//! Text is encoded per UTF-16 unit: `U+0001..=U+007F` take one byte, `U+0000`
//! and `U+0080..=U+07FF` take two, everything else three. Supplementary
//! characters therefore appear as two three-byte surrogate encodings.

use crate::error::{GridwireError, Result};

/// Returns the encoded length of `s` in bytes.
pub fn encoded_len(s: &str) -> usize {
    s.encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Appends the modified UTF-8 encoding of `s` to `out`.
pub fn encode_into(s: &str, out: &mut Vec<u8>) {
    out.reserve(encoded_len(s));
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
}

/// Encodes `s` into a fresh buffer.
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(s, &mut out);
    out
}

/// Decodes modified UTF-8 bytes into a `String`.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = continuation(bytes, i + 1)?;
            units.push((u16::from(b & 0x1F) << 6) | b2);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = continuation(bytes, i + 1)?;
            let b3 = continuation(bytes, i + 2)?;
            units.push((u16::from(b & 0x0F) << 12) | (b2 << 6) | b3);
            i += 3;
        } else {
            return Err(GridwireError::Serialization(format!(
                "invalid modified UTF-8 lead byte 0x{b:02X} at offset {i}"
            )));
        }
    }
    String::from_utf16(&units)
        .map_err(|e| GridwireError::Serialization(format!("invalid UTF-16 text: {e}")))
}

fn continuation(bytes: &[u8], at: usize) -> Result<u16> {
    match bytes.get(at) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        Some(&b) => Err(GridwireError::Serialization(format!(
            "invalid modified UTF-8 continuation byte 0x{b:02X} at offset {at}"
        ))),
        None => Err(GridwireError::Serialization(
            "modified UTF-8 sequence cut short".to_string(),
        )),
    }
}
