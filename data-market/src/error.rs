//! Error types for the data market

use crate::types::Fingerprint;
use thiserror::Error;
use token_ledger::AccountId;

/// Result type for market operations
pub type Result<T> = std::result::Result<T, Error>;

/// Market errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger rejection, surfaced with the ledger's own message
    #[error(transparent)]
    Ledger(#[from] token_ledger::Error),

    /// Purchase of a listing that does not exist or is not available
    #[error("File is not available")]
    NotAvailable(Fingerprint),

    /// Buyer already holds a purchase record for this listing
    #[error("You have already bought this file")]
    AlreadyPurchased(Fingerprint),

    /// Purchase confirmation issued by someone other than the seller
    #[error("Only the seller can confirm this purchase")]
    NotSeller {
        /// Listing concerned
        fingerprint: Fingerprint,
        /// Identity that attempted the confirmation
        caller: AccountId,
    },

    /// Confirmation or key read for a purchase that was never made
    #[error("No purchase of {fingerprint} by {buyer}")]
    OrderNotFound {
        /// Listing concerned
        fingerprint: Fingerprint,
        /// Buyer named in the request
        buyer: AccountId,
    },

    /// Purchase already confirmed with an access key
    #[error("Purchase already confirmed")]
    AlreadyConfirmed {
        /// Listing concerned
        fingerprint: Fingerprint,
        /// Buyer of the confirmed order
        buyer: AccountId,
    },

    /// Read of a fingerprint that was never registered
    #[error("Listing not found: {0}")]
    ListingNotFound(Fingerprint),

    /// Registration of a fingerprint that is already listed
    #[error("File already listed: {0}")]
    DuplicateListing(Fingerprint),

    /// Index read past the end of a sequence
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Requested index
        index: u64,
        /// Current length of the sequence
        len: u64,
    },

    /// Invalid request argument (zero price, etc.)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Fingerprint text is not 32 hex-encoded bytes
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Journal does not replay to a consistent state
    #[error("Journal corrupted: {0}")]
    JournalCorrupted(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Deterministic validation failure
    ///
    /// Rejections leave state untouched and are never journaled; the same
    /// request fails the same way until state changes.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Ledger(token_ledger::Error::InsufficientBalance { .. })
                | Error::Ledger(token_ledger::Error::InsufficientAllowance { .. })
                | Error::NotAvailable(_)
                | Error::AlreadyPurchased(_)
                | Error::NotSeller { .. }
                | Error::OrderNotFound { .. }
                | Error::AlreadyConfirmed { .. }
                | Error::ListingNotFound(_)
                | Error::DuplicateListing(_)
                | Error::IndexOutOfRange { .. }
                | Error::InvalidArgument(_)
                | Error::InvalidFingerprint(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_messages() {
        let fp = Fingerprint::from_bytes([7u8; 32]);

        assert_eq!(Error::NotAvailable(fp).to_string(), "File is not available");
        assert_eq!(
            Error::AlreadyPurchased(fp).to_string(),
            "You have already bought this file"
        );

        let ledger_err = Error::from(token_ledger::Error::InsufficientBalance {
            account: AccountId::new("buyer"),
            balance: 0,
            required: 100,
        });
        assert_eq!(ledger_err.to_string(), "Insufficient balance");
    }

    #[test]
    fn test_rejection_classification() {
        assert!(Error::InvalidArgument("price".to_string()).is_rejection());
        assert!(Error::IndexOutOfRange { index: 1, len: 0 }.is_rejection());
        assert!(!Error::Storage("disk".to_string()).is_rejection());
        assert!(!Error::Concurrency("closed".to_string()).is_rejection());
    }

    #[test]
    fn test_ledger_invariant_is_not_a_rejection() {
        let short = Error::from(token_ledger::Error::InsufficientAllowance {
            owner: AccountId::new("buyer"),
            spender: AccountId::new("market"),
            allowance: 1,
            required: 2,
        });
        assert!(short.is_rejection());

        let broken = Error::from(token_ledger::Error::InvariantViolation(
            "balances sum to 1 but total supply is 2".to_string(),
        ));
        assert!(!broken.is_rejection());
    }

    #[test]
    fn test_order_messages() {
        let fp = Fingerprint::from_bytes([7u8; 32]);
        let err = Error::NotSeller {
            fingerprint: fp,
            caller: AccountId::new("mallory"),
        };
        assert_eq!(err.to_string(), "Only the seller can confirm this purchase");
        assert!(err.is_rejection());
    }
}
