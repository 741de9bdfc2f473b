//! Decimal unit conversion
//!
//! String-based conversion between human-readable decimal amounts and raw
//! integer amounts in a token's smallest unit. No floating point: parsed
//! amounts feed integer swap math, and formatting is presentation-only.

use crate::errors::ValidationError;
use crate::types::Amount;

/// Largest decimals value whose scale factor fits in u128 (10^38 < 2^128).
const MAX_DECIMALS: u8 = 38;

/// Parse a decimal string into a raw amount with the given decimals.
///
/// Accepts `"12"`, `"12.5"`, `".5"`. Rejects empty input, non-digit
/// characters, more fractional digits than `decimals`, and overflow.
pub fn parse_units(text: &str, decimals: u8) -> Result<Amount, ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidAmount {
        message: format!("{}: {:?}", message, text),
    };

    if decimals > MAX_DECIMALS {
        return Err(invalid("unsupported decimals"));
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty amount"));
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("non-numeric amount"));
    }
    if frac.len() > decimals as usize {
        return Err(invalid("too many fractional digits"));
    }

    let scale = 10u128.pow(decimals as u32);
    let whole_value: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("amount too large"))?
    };
    let frac_value: u128 = if frac.is_empty() {
        0
    } else {
        let parsed: u128 = frac.parse().map_err(|_| invalid("amount too large"))?;
        parsed * 10u128.pow((decimals as usize - frac.len()) as u32)
    };

    whole_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| invalid("amount too large"))
}

/// Format a raw amount as a decimal string with the given decimals.
///
/// Lossy only in the sense of display; the output must never be fed back
/// into integer math.
pub fn format_units(amount: Amount, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    let digits = amount.to_string();
    let decimals = decimals as usize;
    let (whole, frac) = if digits.len() > decimals {
        let (w, f) = digits.split_at(digits.len() - decimals);
        (w.to_string(), f.to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };

    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole
    } else {
        format!("{}.{}", whole, frac)
    }
}
