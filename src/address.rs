//! Hexadecimal address text.

use crate::InspectError;

/// Parses hex address text, with or without a `0x` prefix.
///
/// Surrounding whitespace is ignored. Anything that isn't 1 to 16 hex digits
/// is rejected as a whole; there is no partial parse.
pub fn parse_address(text: &str) -> Result<u64, InspectError> {
    let not_hex = || InspectError::NotHexadecimal(text.to_string());

    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    // from_str_radix would also take a leading '+', so check by hand.
    if digits.is_empty() || digits.len() > 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(not_hex());
    }
    u64::from_str_radix(digits, 16).map_err(|_| not_hex())
}

/// Canonical rendering: 16 zero-padded lowercase hex digits.
pub fn format_address(address: u64) -> String {
    format!("{address:016x}")
}
