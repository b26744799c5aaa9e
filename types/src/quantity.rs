//! Hexadecimal quantity decoding for JSON-RPC block fields.
//!
//! Full nodes encode numeric fields as `0x`-prefixed hex strings
//! (`"0x1b4"`). The prefix is optional here; an empty digit string or any
//! non-hex character is rejected.

use crate::DecodeError;

/// Decode a hex quantity into a `u64`, tagging errors with `field`.
pub fn parse_quantity(field: &'static str, value: &str) -> Result<u64, DecodeError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidQuantity {
            field,
            value: value.to_string(),
        });
    }

    // Leading zeros are legal in non-canonical encodings; strip them so
    // they do not count against the width check.
    let significant = digits.trim_start_matches('0');
    if significant.len() > 16 {
        return Err(DecodeError::Overflow { field });
    }
    if significant.is_empty() {
        return Ok(0);
    }

    u64::from_str_radix(significant, 16).map_err(|_| DecodeError::InvalidQuantity {
        field,
        value: value.to_string(),
    })
}
