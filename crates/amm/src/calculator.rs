//! AMM Calculator
//!
//! Swap math using the constant product formula (x * y = k) with a
//! proportional fee. All quote math is integer-only with big-integer
//! intermediates, matching on-chain truncation exactly; the float helpers
//! below exist for price-impact and display purposes and never feed back
//! into the integer path.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use minidex_core::Amount;

/// Pool fee constants
pub mod fees {
    /// Fee numerator (997 = 0.3% fee)
    pub const FEE_NUM: u32 = 997;
    /// Fee denominator
    pub const FEE_DENOM: u32 = 1000;
}

/// Calculate swap output using the constant product formula.
///
/// Formula: output = (amount_in * fee_num * reserve_out)
///                 / (reserve_in * fee_denom + amount_in * fee_num)
///
/// Returns 0 when any input or reserve is zero. Uses BigUint intermediates
/// so products of u128 amounts cannot overflow.
pub fn quote(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_num: u32,
    fee_denom: u32,
) -> Amount {
    if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
        return 0;
    }

    let amount_in_with_fee = BigUint::from(amount_in) * fee_num;
    let numerator = &amount_in_with_fee * BigUint::from(reserve_out);
    let denominator = BigUint::from(reserve_in) * fee_denom + &amount_in_with_fee;

    if denominator.is_zero() {
        return 0;
    }

    // Floor division; the result is strictly below reserve_out, so it fits.
    (numerator / denominator).to_u128().unwrap_or(0)
}

/// Decimal-normalized spot price (reserve_out per reserve_in).
pub fn spot_price(reserve_in: Amount, reserve_out: Amount, decimals_in: u8, decimals_out: u8) -> f64 {
    if reserve_in == 0 {
        return 0.0;
    }
    let normalized_in = reserve_in as f64 / 10f64.powi(decimals_in as i32);
    let normalized_out = reserve_out as f64 / 10f64.powi(decimals_out as i32);
    normalized_out / normalized_in
}

/// Price impact of a trade as a percentage.
///
/// Compares the pre-trade implied price against the implied price of the
/// post-trade reserves (reserves shifted by the traded amounts, output
/// taken from the fee-adjusted quote).
pub fn price_impact(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    decimals_in: u8,
    decimals_out: u8,
) -> f64 {
    if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
        return 0.0;
    }

    let current_price = spot_price(reserve_in, reserve_out, decimals_in, decimals_out);
    if current_price == 0.0 {
        return 0.0;
    }

    let amount_out = quote(amount_in, reserve_in, reserve_out, fees::FEE_NUM, fees::FEE_DENOM);
    let new_reserve_in = reserve_in.saturating_add(amount_in);
    // quote() is strictly below reserve_out, so this cannot underflow
    let new_reserve_out = reserve_out - amount_out;
    let new_price = spot_price(new_reserve_in, new_reserve_out, decimals_in, decimals_out);

    ((current_price - new_price) / current_price).abs() * 100.0
}

/// Advisory severity bucket for a price impact percentage.
///
/// Drives user-facing warnings only; never blocks submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactSeverity {
    pub fn from_percent(impact: f64) -> Self {
        if impact < 1.0 {
            Self::Low
        } else if impact < 3.0 {
            Self::Medium
        } else if impact < 5.0 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Apply a slippage tolerance to an output amount, producing the
/// minimum-acceptable-output bound. Integer basis-point math.
pub fn apply_slippage(amount_out: Amount, slippage_percent: f64) -> Amount {
    if slippage_percent <= 0.0 {
        return amount_out;
    }
    let bps = (slippage_percent * 100.0).round() as u128;
    if bps >= 10_000 {
        return 0;
    }
    let kept = BigUint::from(amount_out) * (10_000u32 - bps as u32) / 10_000u32;
    kept.to_u128().unwrap_or(0)
}

/// Fee deducted from the input amount, in input-token units.
pub fn fee_amount(amount_in: Amount, fee_num: u32, fee_denom: u32) -> Amount {
    let kept = BigUint::from(amount_in) * fee_num / fee_denom;
    amount_in.saturating_sub(kept.to_u128().unwrap_or(0))
}

use crate::state::SwapQuote;

/// Produce a full swap quote for the given oriented reserves.
///
/// Returns None when the trade yields no output (zero input, empty pool).
#[allow(clippy::too_many_arguments)]
pub fn quote_swap(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    decimals_in: u8,
    decimals_out: u8,
    slippage_percent: f64,
) -> Option<SwapQuote> {
    let amount_out = quote(amount_in, reserve_in, reserve_out, fees::FEE_NUM, fees::FEE_DENOM);
    if amount_out == 0 {
        return None;
    }

    let impact = price_impact(amount_in, reserve_in, reserve_out, decimals_in, decimals_out);

    Some(SwapQuote {
        amount_in,
        amount_out,
        price_impact: impact,
        severity: ImpactSeverity::from_percent(impact),
        fee_amount: fee_amount(amount_in, fees::FEE_NUM, fees::FEE_DENOM),
        min_output: apply_slippage(amount_out, slippage_percent),
    })
}
