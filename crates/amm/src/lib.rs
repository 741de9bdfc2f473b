//! Constant-product AMM engine for minidex
//!
//! Pure swap math ([`calculator`]), cached chain state ([`fetch`]),
//! approval predicates ([`allowance`]), and the action state machine
//! ([`orchestrator`]).

pub mod allowance;
pub mod calculator;
pub mod fetch;
pub mod orchestrator;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use allowance::{insufficient_balance, needs_approval};
pub use calculator::{apply_slippage, fee_amount, price_impact, quote, quote_swap, spot_price, ImpactSeverity};
pub use fetch::StateAggregator;
pub use orchestrator::{
    Action, ActionFailure, ActionKind, ActionReport, ActionState, ActionStatus, Orchestrator, Step,
};
pub use state::{PairInfo, PairSnapshot, Reserves, SwapQuote, TokenMeta};
