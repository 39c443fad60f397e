//! Core types for the data market
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (integer token amounts)

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use token_ledger::{AccountId, Amount, CallContext, LedgerEvent};
use uuid::Uuid;

/// Content fingerprint of a digital asset (SHA-256)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap raw hash bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint of the asset's bytes
    pub fn of_content(content: &[u8]) -> Self {
        Self(crate::crypto::hash_bytes(content))
    }

    /// Parse hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::InvalidFingerprint(format!("{}: {}", s, e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::InvalidFingerprint(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex with `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// A seller's offer of an asset at a fixed price
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Asset fingerprint (listing key)
    pub fingerprint: Fingerprint,

    /// Identity that registered the listing and receives payments
    pub seller: AccountId,

    /// Price in token base units (always > 0)
    pub price: Amount,

    /// Short human-readable description shown in the catalogue
    pub description: String,

    /// Set on registration, never cleared
    pub available: bool,
}

/// Recorded access right of a buyer to an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Purchased asset
    pub fingerprint: Fingerprint,
    /// Paying identity
    pub buyer: AccountId,
    /// Paid identity
    pub seller: AccountId,
    /// Amount paid
    pub price: Amount,
    /// Buyer's public key the seller encrypts the access key to
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
}

/// A purchase and, once the seller confirmed it, the delivered access key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Settled purchase
    pub record: PurchaseRecord,
    /// Access key encrypted to `record.public_key` (None while pending)
    pub encrypted_key: Option<Vec<u8>>,
}

impl Order {
    /// Whether the seller has delivered the access key
    pub fn is_confirmed(&self) -> bool {
        self.encrypted_key.is_some()
    }
}

/// Notification emitted by the marketplace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Listing registered
    ListingCreated {
        /// Asset fingerprint
        fingerprint: Fingerprint,
        /// Seller identity
        seller: AccountId,
        /// Listed price
        price: Amount,
        /// Catalogue description
        description: String,
        /// Slot in the global listing order
        index: u64,
    },

    /// Purchase settled
    PurchaseCompleted(PurchaseRecord),

    /// Seller delivered the access key for a purchase
    PurchaseConfirmed {
        /// Asset fingerprint
        fingerprint: Fingerprint,
        /// Buyer the key was encrypted for
        buyer: AccountId,
        /// Confirming seller
        seller: AccountId,
    },
}

/// Any notification produced by a committed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Token ledger notification
    Ledger(LedgerEvent),
    /// Marketplace notification
    Market(MarketEvent),
}

impl From<LedgerEvent> for Event {
    fn from(event: LedgerEvent) -> Self {
        Event::Ledger(event)
    }
}

impl From<MarketEvent> for Event {
    fn from(event: MarketEvent) -> Self {
        Event::Market(event)
    }
}

/// State-changing request, with the identity that issued it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Direct token transfer from the caller
    Transfer {
        /// Issuing identity
        caller: AccountId,
        /// Recipient
        to: AccountId,
        /// Amount
        amount: Amount,
    },

    /// Set the allowance of `spender` over the caller's funds
    Approve {
        /// Issuing identity (owner)
        caller: AccountId,
        /// Delegated spender
        spender: AccountId,
        /// New allowance
        amount: Amount,
    },

    /// Delegated transfer issued by a spender
    TransferFrom {
        /// Issuing identity (spender)
        caller: AccountId,
        /// Owner of the funds
        from: AccountId,
        /// Recipient
        to: AccountId,
        /// Amount
        amount: Amount,
    },

    /// Register a listing with the caller as seller
    RegisterListing {
        /// Issuing identity (seller)
        caller: AccountId,
        /// Price in base units
        price: Amount,
        /// Asset fingerprint
        fingerprint: Fingerprint,
        /// Catalogue description
        description: String,
    },

    /// Buy access to a listing the caller already approved the market for
    Purchase {
        /// Issuing identity (buyer)
        caller: AccountId,
        /// Asset fingerprint
        fingerprint: Fingerprint,
        /// Key the access key gets encrypted to
        #[serde(with = "serde_bytes")]
        public_key: Vec<u8>,
    },

    /// Approve exactly the listing price and purchase, as one step
    Buy {
        /// Issuing identity (buyer)
        caller: AccountId,
        /// Asset fingerprint
        fingerprint: Fingerprint,
        /// Key the access key gets encrypted to
        #[serde(with = "serde_bytes")]
        public_key: Vec<u8>,
    },

    /// Seller delivers the access key for a settled purchase
    ConfirmPurchase {
        /// Issuing identity (seller)
        caller: AccountId,
        /// Asset fingerprint
        fingerprint: Fingerprint,
        /// Buyer of the order being confirmed
        buyer: AccountId,
        /// Access key encrypted to the buyer's public key
        #[serde(with = "serde_bytes")]
        encrypted_key: Vec<u8>,
    },
}

impl Command {
    /// Identity that issued the command
    pub fn caller(&self) -> &AccountId {
        match self {
            Command::Transfer { caller, .. }
            | Command::Approve { caller, .. }
            | Command::TransferFrom { caller, .. }
            | Command::RegisterListing { caller, .. }
            | Command::Purchase { caller, .. }
            | Command::Buy { caller, .. }
            | Command::ConfirmPurchase { caller, .. } => caller,
        }
    }

    /// Execution context of the command
    pub fn context(&self) -> CallContext {
        CallContext::from(self.caller().clone())
    }

    /// Short name for logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Command::Transfer { .. } => "transfer",
            Command::Approve { .. } => "approve",
            Command::TransferFrom { .. } => "transfer_from",
            Command::RegisterListing { .. } => "register_listing",
            Command::Purchase { .. } => "purchase",
            Command::Buy { .. } => "buy",
            Command::ConfirmPurchase { .. } => "confirm_purchase",
        }
    }
}

/// Result value of a committed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Ledger mutation acknowledged
    Ack,
    /// Listing registered at this global index
    Listed {
        /// Slot in the global listing order
        index: u64,
    },
    /// Purchase settled
    Purchased(PurchaseRecord),
}

/// Outcome plus the notifications a command emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Result value
    pub outcome: Outcome,
    /// Notifications, in emission order
    pub events: Vec<Event>,
}

/// Committed command in the journal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub entry_id: Uuid,

    /// Position in the journal (0-based, gapless)
    pub sequence: u64,

    /// Applied command
    pub command: Command,

    /// Notifications emitted when the command was applied
    pub events: Vec<Event>,

    /// Commit timestamp
    pub committed_at: DateTime<Utc>,

    /// Hash of the previous entry (zero for the first)
    pub previous_hash: [u8; 32],

    /// Hash of this entry's contents
    pub entry_hash: [u8; 32],

    /// Signature over `entry_hash` (if a signing key is configured)
    pub signature: Option<Signature>,
}

impl JournalEntry {
    /// Compute entry hash
    pub fn compute_hash(&self) -> Result<[u8; 32]> {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.entry_id.as_bytes());
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.previous_hash);
        hasher.update(bincode::serialize(&self.command)?);
        hasher.update(bincode::serialize(&self.events)?);
        hasher.update(self.committed_at.timestamp_nanos_opt().unwrap_or(0).to_be_bytes());

        Ok(hasher.finalize().into())
    }

    /// Verify signature against `public_key`
    pub fn verify_signature(&self, public_key: &[u8; 32]) -> bool {
        match &self.signature {
            Some(signature) => signature.verify(&self.entry_hash, public_key),
            None => false,
        }
    }

    /// Purchase notifications recorded in this entry
    pub fn purchases(&self) -> impl Iterator<Item = &PurchaseRecord> {
        self.events.iter().filter_map(|event| match event {
            Event::Market(MarketEvent::PurchaseCompleted(record)) => Some(record),
            _ => None,
        })
    }
}

/// Digital signature (Ed25519)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Verify signature
    pub fn verify(&self, message: &[u8], public_key: &[u8; 32]) -> bool {
        crate::crypto::verify_signature(message, self, public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0xa589559b0443b454b7f0dd10565a985bec8a9122d242877bcc42dad71bf8588c";

    #[test]
    fn test_fingerprint_hex() {
        let fp = Fingerprint::from_hex(HASH).unwrap();
        assert_eq!(fp.to_hex(), HASH);
        assert_eq!(fp.to_string(), HASH);

        // Prefix is optional
        let bare: Fingerprint = HASH.trim_start_matches("0x").parse().unwrap();
        assert_eq!(bare, fp);
    }

    #[test]
    fn test_fingerprint_rejects_bad_input() {
        assert!(matches!(
            Fingerprint::from_hex("0xzz"),
            Err(Error::InvalidFingerprint(_))
        ));
        assert!(matches!(
            Fingerprint::from_hex("0xabcd"),
            Err(Error::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn test_fingerprint_of_content() {
        let a = Fingerprint::of_content(b"dataset v1");
        let b = Fingerprint::of_content(b"dataset v1");
        let c = Fingerprint::of_content(b"dataset v2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_command_caller_and_name() {
        let command = Command::Purchase {
            caller: AccountId::new("buyer"),
            fingerprint: Fingerprint::from_bytes([1u8; 32]),
            public_key: b"buyer-key".to_vec(),
        };

        assert_eq!(command.caller(), &AccountId::new("buyer"));
        assert_eq!(command.context().caller, AccountId::new("buyer"));
        assert_eq!(command.name(), "purchase");

        let confirm = Command::ConfirmPurchase {
            caller: AccountId::new("seller"),
            fingerprint: Fingerprint::from_bytes([1u8; 32]),
            buyer: AccountId::new("buyer"),
            encrypted_key: vec![1, 2, 3],
        };
        assert_eq!(confirm.caller(), &AccountId::new("seller"));
        assert_eq!(confirm.name(), "confirm_purchase");
    }

    #[test]
    fn test_order_confirmation_state() {
        let mut order = Order {
            record: PurchaseRecord {
                fingerprint: Fingerprint::from_bytes([1u8; 32]),
                buyer: AccountId::new("buyer"),
                seller: AccountId::new("seller"),
                price: 10,
                public_key: b"buyer-key".to_vec(),
            },
            encrypted_key: None,
        };
        assert!(!order.is_confirmed());

        order.encrypted_key = Some(vec![9, 9]);
        assert!(order.is_confirmed());
    }
}
