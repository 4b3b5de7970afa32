//! Strict cell-value parsing for ingest
//!
//! Ingest is deliberately stricter than search-operand interpretation:
//! leading-zero numbers are rejected so legacy zero-padded exports cannot
//! slip in ambiguous values.

use cdidb_common::constants::{EXPLICIT_FALSE, EXPLICIT_TRUE, FEMALE, MALE, OTHER_GENDER};

/// Parse an integer, rejecting leading zeros (except the literal "0")
pub fn parse_strict_int(raw: &str) -> Result<i64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(format!("leading zero in integer: '{}'", raw));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| format!("not an integer: '{}'", raw))
}

/// Parse a float, rejecting leading zeros (except a "0." prefix)
pub fn parse_strict_float(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return Err(format!("leading zero in number: '{}'", raw));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| format!("not a number: '{}'", raw))
}

/// Parse a gender cell: m / male / f / female / o / other, case-insensitive.
/// Raw sentinel digits are accepted so exported CSVs read back unchanged.
pub fn parse_gender(raw: &str) -> Result<i64, String> {
    match raw.trim().to_lowercase().as_str() {
        "m" | "male" | "1" => Ok(MALE),
        "f" | "female" | "2" => Ok(FEMALE),
        "o" | "other" | "3" => Ok(OTHER_GENDER),
        other => Err(format!("unrecognized gender: '{}'", other)),
    }
}

/// Parse a boolean-like cell into the explicit true/false sentinels
pub fn parse_boolean(raw: &str) -> Result<i64, String> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "t" | "on" | "1" => Ok(EXPLICIT_TRUE),
        "false" | "no" | "n" | "f" | "off" | "0" => Ok(EXPLICIT_FALSE),
        other => Err(format!("unrecognized boolean: '{}'", other)),
    }
}
