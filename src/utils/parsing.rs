//! Parsing utilities
//!
//! Conversions between raw on-chain quantities (hex JSON-RPC values, integer base
//! units) and the canonical decimal strings carried by balance events.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parses a `0x`-prefixed hex quantity into a `u64`
pub fn parse_hex_u64(value: &str) -> Result<u64, String> {
	let digits = value.trim().trim_start_matches("0x");
	if digits.is_empty() {
		return Err(format!("Invalid hex quantity: '{}'", value));
	}
	u64::from_str_radix(digits, 16).map_err(|e| format!("Invalid hex quantity '{}': {}", value, e))
}

/// Parses a `0x`-prefixed hex quantity into a `U256`
///
/// `0x` alone is accepted as zero, as returned by `eth_call` on empty results.
pub fn parse_hex_u256(value: &str) -> Result<U256, String> {
	let digits = value.trim().trim_start_matches("0x");
	if digits.is_empty() {
		return Ok(U256::ZERO);
	}
	U256::from_str_radix(digits, 16).map_err(|e| format!("Invalid hex quantity '{}': {}", value, e))
}

/// Formats an integer amount of base units as a canonical decimal string
///
/// Trailing fractional zeros are trimmed but one fractional digit is always kept,
/// so one ether formats as `1.0` and 1.5 ether as `1.5`. Amounts with zero decimals
/// are formatted as plain integers.
pub fn format_units(value: U256, decimals: u8) -> String {
	if decimals == 0 {
		return value.to_string();
	}

	let unit = U256::from(10u64).pow(U256::from(decimals));
	let integer = value / unit;
	let fraction = value % unit;

	let padded = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
	let trimmed = padded.trim_end_matches('0');
	let fraction = if trimmed.is_empty() { "0" } else { trimmed };

	format!("{}.{}", integer, fraction)
}

/// Signed difference `new - previous` of two canonical decimal strings
pub fn balance_delta(previous: &str, new: &str) -> Result<Decimal, String> {
	let previous = Decimal::from_str(previous)
		.map_err(|e| format!("Invalid balance '{}': {}", previous, e))?;
	let new = Decimal::from_str(new).map_err(|e| format!("Invalid balance '{}': {}", new, e))?;
	new.checked_sub(previous)
		.map(|delta| delta.normalize())
		.ok_or_else(|| "Balance delta overflow".to_string())
}
