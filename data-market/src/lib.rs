//! ProLong Data Market
//!
//! Digital-goods marketplace settled in ProLong tokens.
//!
//! # Architecture
//!
//! - **Exchange**: one state struct combining the token ledger and the marketplace
//! - **Single Writer**: one actor task applies every command in a total order
//! - **Journal**: committed commands are appended to a hash-chained RocksDB log
//! - **Event Sourcing**: state is rebuilt by replaying the journal on open
//!
//! # Invariants
//!
//! - Supply conservation: Σ(balances) == total supply for all time
//! - At most one purchase per (fingerprint, buyer)
//! - A purchase's token transfer and its records commit together or not at all
//! - Listings stay available after being bought

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod journal;
pub mod market;
pub mod metrics;
pub mod node;
pub mod storage;
pub mod types;

// Re-exports
pub use actor::ExchangeHandle;
pub use config::Config;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use exchange::{Exchange, Genesis};
pub use journal::JournalHead;
pub use market::Marketplace;
pub use metrics::Metrics;
pub use node::DataMarket;
pub use storage::Storage;
pub use types::{
    Command, Event, Fingerprint, JournalEntry, Listing, MarketEvent, Order, Outcome,
    PurchaseRecord, Receipt,
};

pub use token_ledger::{AccountId, Amount, CallContext, LedgerEvent, TokenLedger};
