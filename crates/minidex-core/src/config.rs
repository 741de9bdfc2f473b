//! Configuration types for minidex
//!
//! All configuration is injected at construction; nothing reads ambient
//! global state.

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Node connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// JSON-RPC endpoint URL (e.g., "http://127.0.0.1:8545")
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Deployed contract addresses the client talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Pair factory contract
    pub factory: Address,
    /// Swap/liquidity router contract (the fixed allowance spender)
    pub router: Address,
}

/// Polling cadences for the read-state aggregator.
///
/// Token metadata has no interval: it is immutable and cached indefinitely
/// after the first successful fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Pair enumeration interval
    #[serde(default = "default_pairs_secs")]
    pub pairs_secs: u64,

    /// Pool reserves interval
    #[serde(default = "default_reserves_secs")]
    pub reserves_secs: u64,

    /// Balance and allowance interval
    #[serde(default = "default_balances_secs")]
    pub balances_secs: u64,
}

fn default_pairs_secs() -> u64 {
    5
}

fn default_reserves_secs() -> u64 {
    10
}

fn default_balances_secs() -> u64 {
    5
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            pairs_secs: default_pairs_secs(),
            reserves_secs: default_reserves_secs(),
            balances_secs: default_balances_secs(),
        }
    }
}

/// Transaction submission and confirmation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxConfig {
    /// Bounded wait for on-chain confirmation
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Receipt polling interval while awaiting confirmation
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,

    /// Slippage tolerance for swap minimum-output bounds, in percent
    #[serde(default = "default_slippage_percent")]
    pub slippage_percent: f64,
}

fn default_confirm_timeout_secs() -> u64 {
    90
}

fn default_confirm_poll_ms() -> u64 {
    1000
}

fn default_slippage_percent() -> f64 {
    0.5
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: default_confirm_timeout_secs(),
            confirm_poll_ms: default_confirm_poll_ms(),
            slippage_percent: default_slippage_percent(),
        }
    }
}

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexConfig {
    /// Node connection settings
    pub node: NodeConfig,

    /// Deployed contract addresses
    pub contracts: ContractsConfig,

    /// Aggregator polling cadences
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Transaction settings
    #[serde(default)]
    pub tx: TxConfig,
}

impl DexConfig {
    /// Build a config with default node/refresh/tx settings for the given
    /// deployed contracts.
    pub fn new(contracts: ContractsConfig) -> Self {
        Self {
            node: NodeConfig::default(),
            contracts,
            refresh: RefreshConfig::default(),
            tx: TxConfig::default(),
        }
    }
}
