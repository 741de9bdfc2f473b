//! Allowance Gate
//!
//! Pure decision predicates consumed by the transaction orchestrator and by
//! the presentation layer for warnings. Advisory only: neither predicate
//! blocks a submission by itself.

use minidex_core::Amount;

/// Whether an approval transaction is required before the router may move
/// `required` of a token. An allowance equal to the requirement is
/// sufficient.
pub fn needs_approval(required: Amount, allowance: Amount) -> bool {
    required > 0 && allowance < required
}

/// Whether the owner's live balance cannot cover the requirement.
pub fn insufficient_balance(required: Amount, balance: Amount) -> bool {
    required > 0 && balance < required
}
