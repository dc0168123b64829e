//! Token amounts in base units with a known decimal precision.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
	#[error("Empty amount")]
	Empty,
	#[error("Invalid amount '{0}'")]
	Invalid(String),
	#[error("Amount '{value}' has more than {decimals} fractional digits")]
	TooPrecise { value: String, decimals: u8 },
	#[error("Amount '{0}' does not fit in 256 bits")]
	Overflow(String),
}

/// Arbitrary precision unsigned amount.
///
/// `units` is the integer amount in the token's smallest denomination, so
/// `0.01` of an 18 decimal token is `10_000_000_000_000_000` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
	pub units: U256,
	pub decimals: u8,
}

impl Amount {
	pub fn from_units(units: U256, decimals: u8) -> Self {
		Self { units, decimals }
	}

	/// Parses a human readable decimal string such as `"0.01"`.
	pub fn parse(value: &str, decimals: u8) -> Result<Self, AmountError> {
		let value = value.trim();
		if value.is_empty() {
			return Err(AmountError::Empty);
		}

		let (whole, fraction) = match value.split_once('.') {
			Some((whole, fraction)) => (whole, fraction),
			None => (value, ""),
		};

		if whole.is_empty() && fraction.is_empty() {
			return Err(AmountError::Invalid(value.to_string()));
		}
		let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
		if !all_digits(whole) || !all_digits(fraction) {
			return Err(AmountError::Invalid(value.to_string()));
		}

		let fraction = fraction.trim_end_matches('0');
		if fraction.len() > decimals as usize {
			return Err(AmountError::TooPrecise {
				value: value.to_string(),
				decimals,
			});
		}

		let digits = format!(
			"{}{}{}",
			whole,
			fraction,
			"0".repeat(decimals as usize - fraction.len())
		);
		let digits = digits.trim_start_matches('0');
		let units = if digits.is_empty() {
			U256::ZERO
		} else {
			U256::from_str_radix(digits, 10).map_err(|_| AmountError::Overflow(value.to_string()))?
		};

		Ok(Self { units, decimals })
	}

	pub fn is_zero(&self) -> bool {
		self.units.is_zero()
	}
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let digits = self.units.to_string();
		let decimals = self.decimals as usize;
		if decimals == 0 {
			return f.write_str(&digits);
		}

		let padded = format!("{:0>width$}", digits, width = decimals + 1);
		let (whole, fraction) = padded.split_at(padded.len() - decimals);
		let fraction = fraction.trim_end_matches('0');
		if fraction.is_empty() {
			f.write_str(whole)
		} else {
			write!(f, "{}.{}", whole, fraction)
		}
	}
}
