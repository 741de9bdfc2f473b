//! Error types for minidex

use thiserror::Error;

/// Core errors that can occur in minidex
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Transaction error: {0}")]
    Tx(#[from] TxError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A {kind} action is already in flight")]
    ActionInFlight { kind: &'static str },
}

/// Input validation errors, rejected before any network call
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Malformed address: {value}")]
    MalformedAddress { value: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },
}

/// Node connection and read errors.
///
/// A failed individual read degrades that one field to "unknown" and is
/// retried on the next poll cycle; it never aborts sibling reads.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error("Node unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Transaction-path errors. All are terminal for the current action;
/// retry is a fresh user-initiated submission, never automatic.
#[derive(Debug, Clone, Error)]
pub enum TxError {
    /// The signer declined to authorize the transaction.
    #[error("Signer rejected the transaction: {message}")]
    SignerRejected { message: String },

    /// The node rejected the transaction before inclusion.
    #[error("Transaction submission failed: {message}")]
    SubmissionFailed { message: String },

    /// Included but reverted (slippage exceeded, insufficient allowance, ...).
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },

    /// Confirmation not observed within the bounded wait. Indeterminate:
    /// the caller should re-check balance/allowance before retrying.
    #[error("No confirmation for {tx} within {waited_secs}s")]
    ConfirmationTimeout { tx: String, waited_secs: u64 },
}

/// Result type alias for minidex operations
pub type Result<T> = std::result::Result<T, Error>;

impl TxError {
    /// Stable machine-readable code for the failure reason.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::SignerRejected { .. } => "signer_rejected",
            Self::SubmissionFailed { .. } => "submission_failed",
            Self::Reverted { .. } => "reverted",
            Self::ConfirmationTimeout { .. } => "timeout",
        }
    }
}
