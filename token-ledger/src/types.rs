//! Core types for the token ledger
//!
//! All types are designed for:
//! - Deterministic serialization (serde, no floating point)
//! - Exact arithmetic (integer base units for tokens)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token amount in base units
pub type Amount = u128;

/// Account identifier (the identity issuing or receiving a request)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Execution context of a request
///
/// The caller is always explicit. Nothing in the ledger reads an ambient
/// identity, and no operation accepts a second "acting as" identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Identity that issued the request
    pub caller: AccountId,
}

impl CallContext {
    /// Context for a request issued by `caller`
    pub fn new(caller: impl Into<AccountId>) -> Self {
        Self {
            caller: caller.into(),
        }
    }
}

impl From<AccountId> for CallContext {
    fn from(caller: AccountId) -> Self {
        Self { caller }
    }
}

/// Notification emitted by a successful ledger mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Tokens moved between accounts (direct or delegated)
    Transfer {
        /// Debited account
        from: AccountId,
        /// Credited account
        to: AccountId,
        /// Amount moved
        amount: Amount,
    },

    /// Allowance set by its owner
    Approval {
        /// Owner of the funds
        owner: AccountId,
        /// Delegated spender
        spender: AccountId,
        /// New allowance (overwrites the previous one)
        amount: Amount,
    },
}
