//! AMM State Types
//!
//! Data structures for tokens, pairs, and quotes.

use serde::{Deserialize, Serialize};
use std::fmt;

use minidex_core::{Address, Amount};

use crate::calculator::ImpactSeverity;

/// Token metadata. Immutable once fetched; cached by address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// A trading pair discovered from the factory.
///
/// `token0`/`token1` are assigned at pool creation and never reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairInfo {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
}

impl PairInfo {
    /// Whether `token` is one of the pair's constituents.
    pub fn contains(&self, token: &Address) -> bool {
        &self.token0 == token || &self.token1 == token
    }
}

impl fmt::Display for PairInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pair {} | token0: {} | token1: {}",
            &self.address.as_str()[..10],
            &self.token0.as_str()[..10],
            &self.token1.as_str()[..10],
        )
    }
}

/// Point-in-time pool reserves, in token0/token1 order.
///
/// Always a potentially stale snapshot of on-chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub reserve0: Amount,
    pub reserve1: Amount,
}

impl Reserves {
    /// Orient the reserves for a trade: (reserve_in, reserve_out).
    pub fn oriented(&self, token_in_is_token0: bool) -> (Amount, Amount) {
        if token_in_is_token0 {
            (self.reserve0, self.reserve1)
        } else {
            (self.reserve1, self.reserve0)
        }
    }
}

/// Consistent per-pair view handed to consumers: the immutable pair info
/// plus the last known reserves (None until the first successful read).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSnapshot {
    pub pair: PairInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserves: Option<Reserves>,
}

/// Swap quote derived from a reserve snapshot. Never cached across reserve
/// changes; recomputed from current inputs on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    /// Input amount, smallest units
    pub amount_in: Amount,
    /// Expected output amount, smallest units
    pub amount_out: Amount,
    /// Price impact percentage
    pub price_impact: f64,
    /// Advisory severity bucket for the impact
    pub severity: ImpactSeverity,
    /// Fee deducted from the input
    pub fee_amount: Amount,
    /// Slippage-protected minimum output bound
    pub min_output: Amount,
}
