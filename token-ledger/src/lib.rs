//! ProLong Token Ledger
//!
//! Fixed-supply fungible token ledger with delegated spending allowances.
//!
//! # Architecture
//!
//! - **Explicit caller**: every mutation takes a [`CallContext`]
//! - **Validate, then mutate**: a failed operation leaves the ledger untouched
//! - **Notifications**: every successful mutation returns a [`LedgerEvent`]
//!
//! # Invariants
//!
//! - Supply conservation: Σ(balances) == total supply for all time
//! - Allowances are only written by their owner and only consumed by their spender
//! - Deterministic replay: same operations → same state

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod ledger;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use ledger::TokenLedger;
pub use types::{AccountId, Amount, CallContext, LedgerEvent};
