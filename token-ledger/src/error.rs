//! Error types for the token ledger

use crate::types::{AccountId, Amount};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Display strings are the canonical rejection messages that existing
/// clients match on; the structured fields carry the detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Debited account holds less than the requested amount
    #[error("Insufficient balance")]
    InsufficientBalance {
        /// Account being debited
        account: AccountId,
        /// Its current balance
        balance: Amount,
        /// Amount requested
        required: Amount,
    },

    /// Spender's allowance over the owner's funds is too small
    #[error("Insufficient allowance")]
    InsufficientAllowance {
        /// Owner of the funds
        owner: AccountId,
        /// Delegated spender
        spender: AccountId,
        /// Currently approved amount
        allowance: Amount,
        /// Amount requested
        required: Amount,
    },

    /// Invariant violation (supply conservation)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
