//! Conversions between human-readable decimal amounts and the contract's
//! 18-decimal fixed-point integers, plus display helpers.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Number of fractional digits used by the contract for BNB and SRA amounts
pub const DECIMALS: usize = 18;

/// Placeholder shown when a value has never been fetched
pub const PLACEHOLDER: &str = "--";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,

    #[error("invalid amount '{0}'")]
    Invalid(String),

    #[error("amount has more than {DECIMALS} decimal places")]
    TooManyDecimals,

    #[error("amount does not fit in 256 bits")]
    Overflow,
}

fn pow10(exp: usize) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// 10^18
pub fn unit() -> U256 {
    pow10(DECIMALS)
}

/// Parse a decimal string such as `"0.5"` into its 1e18-scaled integer
///
/// Leading/trailing whitespace is ignored. Signs, exponents and more than 18
/// fractional digits are rejected rather than truncated.
pub fn parse_amount(input: &str) -> Result<U256, UnitsError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) || (int_part.is_empty() && frac_part.is_empty()) {
        return Err(UnitsError::Invalid(trimmed.to_string()));
    }
    if frac_part.len() > DECIMALS {
        return Err(UnitsError::TooManyDecimals);
    }

    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10).map_err(|_| UnitsError::Overflow)?
    };
    let frac_value = if frac_part.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{:0<width$}", frac_part, width = DECIMALS);
        U256::from_str_radix(&padded, 10).map_err(|_| UnitsError::Invalid(trimmed.to_string()))?
    };

    int_value
        .checked_mul(unit())
        .and_then(|v| v.checked_add(frac_value))
        .ok_or(UnitsError::Overflow)
}

/// Exact decimal rendering of a scaled amount (`1e18` → `"1.0"`)
pub fn format_amount(value: U256) -> String {
    let int_part = value / unit();
    let frac_part = value % unit();
    let frac = format!("{:0>width$}", frac_part.to_string(), width = DECIMALS);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}.0", int_part)
    } else {
        format!("{}.{}", int_part, frac)
    }
}

/// Rounded, digit-grouped rendering for display (`1234.5678901e18` → `"1,234.56789"`)
pub fn format_display(value: U256, max_fraction_digits: usize) -> String {
    let digits = max_fraction_digits.min(DECIMALS);
    let step = pow10(DECIMALS - digits);
    let rounded = value.saturating_add(step / U256::from(2u64)) / step;

    let scale = pow10(digits);
    let int_part = group_thousands(&(rounded / scale).to_string());
    if digits == 0 {
        return int_part;
    }
    let frac = format!("{:0>width$}", (rounded % scale).to_string(), width = digits);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Shortened checksummed address, `0x1234...abcd`
pub fn format_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Human-readable unlock time; `None` when no unlock is pending
pub fn format_unlock_time(timestamp: u64) -> Option<String> {
    if timestamp == 0 {
        return None;
    }
    let secs = i64::try_from(timestamp).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Tokens received for `bnb` at `tokens_per_bnb` (both 1e18-scaled)
pub fn estimate_tokens(bnb: U256, tokens_per_bnb: U256) -> U256 {
    bnb.saturating_mul(tokens_per_bnb) / unit()
}
