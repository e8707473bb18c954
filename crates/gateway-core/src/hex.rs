//! Hex/Quantity codec (C1): parsing and formatting of EVM hex quantities and
//! fixed-width byte strings.

use num_bigint::BigUint;
use num_traits::Num;
use serde_json::Value;

use crate::error::GatewayError;

/// Parses a JSON value into an arbitrary-precision non-negative integer.
///
/// Accepts a `0x`-prefixed hex string, a plain decimal string, or a JSON
/// number that is a non-negative integer. Returns `Ok(None)` for `null` or
/// an empty string. Rejects floats, `NaN`, and decimal-looking strings
/// (containing `.`, `e`, or `E`) that aren't hex-prefixed.
pub fn parse_quantity(v: &Value) -> Result<Option<BigUint>, GatewayError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => {
            if s.is_empty() {
                return Ok(None);
            }
            if let Some(stripped) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                if stripped.is_empty() {
                    return Ok(Some(BigUint::from(0u8)));
                }
                return BigUint::from_str_radix(stripped, 16)
                    .map(Some)
                    .map_err(|_| GatewayError::InvalidParams(format!("invalid hex quantity: {s}")));
            }
            if s.contains('.') || s.contains('e') || s.contains('E') {
                return Err(GatewayError::InvalidParams(format!(
                    "quantity must be an integer: {s}"
                )));
            }
            BigUint::from_str_radix(s, 10)
                .map(Some)
                .map_err(|_| GatewayError::InvalidParams(format!("invalid decimal quantity: {s}")))
        }
        Value::Number(n) => {
            if n.is_f64() && n.as_u64().is_none() && n.as_i64().is_none() {
                return Err(GatewayError::InvalidParams(format!(
                    "quantity must be an integer: {n}"
                )));
            }
            let i = n
                .as_u64()
                .ok_or_else(|| GatewayError::InvalidParams(format!("quantity must be non-negative: {n}")))?;
            Ok(Some(BigUint::from(i)))
        }
        other => Err(GatewayError::InvalidParams(format!(
            "quantity must be a string or integer, got {other}"
        ))),
    }
}

/// Formats a quantity as the shortest lowercase `0x`-prefixed hex string.
/// `None` formats as `0x0`.
pub fn quantity_hex(v: Option<&BigUint>) -> String {
    match v {
        None => "0x0".to_string(),
        Some(n) if *n == BigUint::from(0u8) => "0x0".to_string(),
        Some(n) => format!("0x{}", n.to_str_radix(16)),
    }
}

/// Formats a quantity, returning `None` (field omitted) when `v` is `None`.
pub fn quantity_hex_if_set(v: Option<&BigUint>) -> Option<String> {
    v.map(|n| quantity_hex(Some(n)))
}

/// Formats a `u64` as a shortest hex quantity.
pub fn u64_hex(v: u64) -> String {
    quantity_hex(Some(&BigUint::from(v)))
}

/// Validates a hex byte-string field: `^0x[0-9a-fA-F]*$` with exact length
/// `2*n` hex characters. Returns the lowercase-normalized string.
pub fn hex_bytes(label: &str, s: &str, n: usize) -> Result<String, GatewayError> {
    let body = s.strip_prefix("0x").ok_or_else(|| {
        GatewayError::InvalidParams(format!("{label} must be 0x-prefixed hex: {s}"))
    })?;
    if body.is_empty() {
        return Err(GatewayError::InvalidParams(format!("{label} must not be empty")));
    }
    if body.len() != 2 * n {
        return Err(GatewayError::InvalidParams(format!(
            "{label} must be {n} bytes ({} hex chars), got {}",
            2 * n,
            body.len()
        )));
    }
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GatewayError::InvalidParams(format!("{label} is not valid hex: {s}")));
    }
    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_hex_for_small_integers() {
        for n in [0u64, 1, 15, 16, 255, 256, u32::MAX as u64] {
            let hex = quantity_hex(Some(&BigUint::from(n)));
            let parsed = parse_quantity(&Value::String(hex)).unwrap().unwrap();
            assert_eq!(parsed, BigUint::from(n));
        }
    }

    #[test]
    fn null_formats_as_0x0() {
        assert_eq!(quantity_hex(None), "0x0");
        assert_eq!(quantity_hex_if_set(None), None);
    }

    #[test]
    fn parses_decimal_and_number_forms() {
        assert_eq!(
            parse_quantity(&Value::String("42".to_string())).unwrap(),
            Some(BigUint::from(42u32))
        );
        assert_eq!(
            parse_quantity(&serde_json::json!(42)).unwrap(),
            Some(BigUint::from(42u32))
        );
    }

    #[test]
    fn empty_and_null_parse_to_none() {
        assert_eq!(parse_quantity(&Value::Null).unwrap(), None);
        assert_eq!(parse_quantity(&Value::String(String::new())).unwrap(), None);
    }

    #[test]
    fn rejects_floats_and_non_integer_strings() {
        assert!(parse_quantity(&serde_json::json!(1.5)).is_err());
        assert!(parse_quantity(&Value::String("1.5".to_string())).is_err());
        assert!(parse_quantity(&Value::String("1e10".to_string())).is_err());
    }

    #[test]
    fn hex_bytes_validates_length_and_charset() {
        let addr = "0x".to_string() + &"ab".repeat(20);
        assert_eq!(hex_bytes("address", &addr, 20).unwrap(), addr);
        assert!(hex_bytes("address", "0x1234", 20).is_err());
        assert!(hex_bytes("address", "deadbeef", 4).is_err());
        assert!(hex_bytes("address", "0x", 4).is_err());
        assert!(hex_bytes("address", "0xzzzzzzzz", 4).is_err());
    }

    #[test]
    fn hex_bytes_lowercases() {
        let addr = "0x".to_string() + &"AB".repeat(20);
        let normalized = hex_bytes("address", &addr, 20).unwrap();
        assert_eq!(normalized, "0x".to_string() + &"ab".repeat(20));
    }
}
