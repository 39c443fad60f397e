//! Actor-based concurrency for the exchange
//!
//! One task owns the [`Exchange`] and applies every command in mailbox
//! order, so two purchases of the same file, or two spends of the same
//! allowance, are never interleaved.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              ExchangeHandle (Clone)                   │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │             ExchangeActor (Single Task)               │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ Exchange::execute() → validate, then mutate    │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                       │                               │
//! │                       ▼                               │
//! │           Storage::append_entry()                     │
//! │     (on failure: rebuild state from the journal)      │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Reads go through the same mailbox and therefore observe every command
//! acknowledged before them.

use crate::{
    crypto::KeyPair,
    exchange::{Exchange, Genesis},
    journal::{self, JournalHead},
    metrics::Metrics,
    types::{Command, Fingerprint, Listing, Order, Receipt},
    Error, Result, Storage,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use token_ledger::{AccountId, Amount};

/// Message sent to the exchange actor
#[derive(Debug)]
pub enum ExchangeMessage {
    /// Apply a command and journal it
    Execute {
        command: Command,
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Balance of an account
    BalanceOf {
        account: AccountId,
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Remaining allowance of (owner, spender)
    Allowance {
        owner: AccountId,
        spender: AccountId,
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Fixed token supply
    TotalSupply {
        response: oneshot::Sender<Result<Amount>>,
    },

    /// Listing by fingerprint
    Listing {
        fingerprint: Fingerprint,
        response: oneshot::Sender<Result<Listing>>,
    },

    /// Fingerprint at a position of the global listing order
    ListingAt {
        index: u64,
        response: oneshot::Sender<Result<Fingerprint>>,
    },

    /// Fingerprint at a position of a seller's listings
    SellerListing {
        seller: AccountId,
        index: u64,
        response: oneshot::Sender<Result<Fingerprint>>,
    },

    /// Fingerprint at a position of a buyer's purchases
    BuyerPurchase {
        buyer: AccountId,
        index: u64,
        response: oneshot::Sender<Result<Fingerprint>>,
    },

    /// Whether a buyer owns a listing
    HasPurchased {
        fingerprint: Fingerprint,
        buyer: AccountId,
        response: oneshot::Sender<Result<bool>>,
    },

    /// Order of a buyer for a listing
    Order {
        fingerprint: Fingerprint,
        buyer: AccountId,
        response: oneshot::Sender<Result<Order>>,
    },

    /// Unconfirmed orders on a seller's listings
    PendingOrders {
        seller: AccountId,
        response: oneshot::Sender<Result<Vec<Order>>>,
    },

    /// Access key delivered for an order
    AccessKey {
        fingerprint: Fingerprint,
        buyer: AccountId,
        response: oneshot::Sender<Result<Option<Vec<u8>>>>,
    },

    /// Number of listings
    ListingCount {
        response: oneshot::Sender<Result<u64>>,
    },

    /// Number of listings a seller registered
    SellerListingCount {
        seller: AccountId,
        response: oneshot::Sender<Result<u64>>,
    },

    /// Number of purchases a buyer made
    BuyerPurchaseCount {
        buyer: AccountId,
        response: oneshot::Sender<Result<u64>>,
    },

    /// All listings in registration order
    Listings {
        response: oneshot::Sender<Result<Vec<Listing>>>,
    },

    /// Re-check supply conservation
    CheckConservation {
        response: oneshot::Sender<Result<()>>,
    },

    /// Current journal head
    Head {
        response: oneshot::Sender<Result<JournalHead>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the exchange state
pub struct ExchangeActor {
    /// Ledger + marketplace state
    exchange: Exchange,

    /// Where the next journal entry goes
    head: JournalHead,

    /// Journal backend
    storage: Arc<Storage>,

    /// Genesis, kept for rebuilding state
    genesis: Genesis,

    /// Journal signing key (if enabled)
    keypair: Option<KeyPair>,

    /// Metrics collector
    metrics: Metrics,

    /// Set when memory could not be brought back in line with the journal
    poisoned: bool,
}

impl std::fmt::Debug for ExchangeActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeActor")
            .field("head", &self.head)
            .field("genesis", &self.genesis)
            .field("signing", &self.keypair.is_some())
            .finish_non_exhaustive()
    }
}

impl ExchangeActor {
    /// Create actor, rebuilding state from the stored journal
    pub fn new(
        storage: Arc<Storage>,
        genesis: Genesis,
        keypair: Option<KeyPair>,
        metrics: Metrics,
    ) -> Result<Self> {
        let (exchange, head) = journal::replay(&storage, &genesis)?;
        metrics.set_journal_length(head.next_sequence);

        Ok(Self {
            exchange,
            head,
            storage,
            genesis,
            keypair,
            metrics,
            poisoned: false,
        })
    }

    /// Run the actor event loop
    pub async fn run(mut self, mut mailbox: mpsc::Receiver<ExchangeMessage>) {
        while let Some(msg) = mailbox.recv().await {
            match msg {
                ExchangeMessage::Shutdown => {
                    tracing::info!(
                        entries = self.head.next_sequence,
                        "Exchange actor shutting down"
                    );
                    break;
                }
                ExchangeMessage::Execute { command, response } => {
                    let result = self.execute(command);
                    let _ = response.send(result);

                    if self.poisoned {
                        tracing::error!("Exchange state diverged from journal, stopping actor");
                        break;
                    }
                }
                _ => self.handle_read(msg),
            }
        }
    }

    /// Apply a command, journal it, or roll back
    fn execute(&mut self, command: Command) -> Result<Receipt> {
        let started = Instant::now();
        let name = command.name();

        let receipt = match self.exchange.execute(&command) {
            Ok(receipt) => receipt,
            Err(e) => {
                self.metrics.record_rejected(name);
                tracing::debug!(
                    command = name,
                    caller = %command.caller(),
                    "Command rejected: {}",
                    e
                );
                return Err(e);
            }
        };

        let sealed = journal::seal_entry(&self.head, command, &receipt, self.keypair.as_ref());
        let appended = sealed.and_then(|entry| self.storage.append_entry(&entry).map(|_| entry));

        let entry = match appended {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(command = name, "Journal append failed, rolling back: {}", e);
                if let Err(rollback_err) = self.rollback() {
                    tracing::error!("Rollback failed: {}", rollback_err);
                    self.poisoned = true;
                }
                return Err(e);
            }
        };

        self.head = JournalHead {
            next_sequence: entry.sequence + 1,
            last_hash: entry.entry_hash,
        };

        self.metrics.record_committed(name);
        self.metrics.set_journal_length(self.head.next_sequence);
        for purchase in entry.purchases() {
            self.metrics.record_purchase(purchase.price);
            tracing::info!(
                fingerprint = %purchase.fingerprint,
                buyer = %purchase.buyer,
                seller = %purchase.seller,
                price = %purchase.price,
                "Purchase settled"
            );
        }
        self.metrics
            .record_duration(started.elapsed().as_secs_f64());

        tracing::debug!(sequence = entry.sequence, command = name, "Command committed");

        Ok(receipt)
    }

    /// Discard in-memory state and rebuild it from the journal
    fn rollback(&mut self) -> Result<()> {
        let (exchange, head) = journal::replay(&self.storage, &self.genesis)?;
        self.exchange = exchange;
        self.head = head;
        self.metrics.set_journal_length(head.next_sequence);
        Ok(())
    }

    fn handle_read(&self, msg: ExchangeMessage) {
        let ledger = self.exchange.ledger();
        let market = self.exchange.market();

        match msg {
            ExchangeMessage::BalanceOf { account, response } => {
                let _ = response.send(Ok(ledger.balance_of(&account)));
            }

            ExchangeMessage::Allowance {
                owner,
                spender,
                response,
            } => {
                let _ = response.send(Ok(ledger.allowance(&owner, &spender)));
            }

            ExchangeMessage::TotalSupply { response } => {
                let _ = response.send(Ok(ledger.total_supply()));
            }

            ExchangeMessage::Listing {
                fingerprint,
                response,
            } => {
                let _ = response.send(market.listing(&fingerprint).cloned());
            }

            ExchangeMessage::ListingAt { index, response } => {
                let _ = response.send(market.listing_at(index));
            }

            ExchangeMessage::SellerListing {
                seller,
                index,
                response,
            } => {
                let _ = response.send(market.seller_listing(&seller, index));
            }

            ExchangeMessage::BuyerPurchase {
                buyer,
                index,
                response,
            } => {
                let _ = response.send(market.buyer_purchase(&buyer, index));
            }

            ExchangeMessage::HasPurchased {
                fingerprint,
                buyer,
                response,
            } => {
                let _ = response.send(Ok(market.has_purchased(&fingerprint, &buyer)));
            }

            ExchangeMessage::Order {
                fingerprint,
                buyer,
                response,
            } => {
                let _ = response.send(market.order(&fingerprint, &buyer).cloned());
            }

            ExchangeMessage::PendingOrders { seller, response } => {
                let _ = response.send(Ok(market.pending_orders(&seller).cloned().collect()));
            }

            ExchangeMessage::AccessKey {
                fingerprint,
                buyer,
                response,
            } => {
                let key = market
                    .access_key(&fingerprint, &buyer)
                    .map(|key| key.map(<[u8]>::to_vec));
                let _ = response.send(key);
            }

            ExchangeMessage::ListingCount { response } => {
                let _ = response.send(Ok(market.listing_count()));
            }

            ExchangeMessage::SellerListingCount { seller, response } => {
                let _ = response.send(Ok(market.seller_listing_count(&seller)));
            }

            ExchangeMessage::BuyerPurchaseCount { buyer, response } => {
                let _ = response.send(Ok(market.buyer_purchase_count(&buyer)));
            }

            ExchangeMessage::Listings { response } => {
                let _ = response.send(Ok(market.listings().cloned().collect()));
            }

            ExchangeMessage::CheckConservation { response } => {
                let _ = response.send(ledger.check_conservation().map_err(Error::from));
            }

            ExchangeMessage::Head { response } => {
                let _ = response.send(Ok(self.head));
            }

            ExchangeMessage::Execute { .. } | ExchangeMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct ExchangeHandle {
    sender: mpsc::Sender<ExchangeMessage>,
}

impl ExchangeHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<ExchangeMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> ExchangeMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Apply a command
    pub async fn execute(&self, command: Command) -> Result<Receipt> {
        self.request(|response| ExchangeMessage::Execute { command, response })
            .await
    }

    /// Balance of an account
    pub async fn balance_of(&self, account: AccountId) -> Result<Amount> {
        self.request(|response| ExchangeMessage::BalanceOf { account, response })
            .await
    }

    /// Remaining allowance
    pub async fn allowance(&self, owner: AccountId, spender: AccountId) -> Result<Amount> {
        self.request(|response| ExchangeMessage::Allowance {
            owner,
            spender,
            response,
        })
        .await
    }

    /// Fixed token supply
    pub async fn total_supply(&self) -> Result<Amount> {
        self.request(|response| ExchangeMessage::TotalSupply { response })
            .await
    }

    /// Listing by fingerprint
    pub async fn listing(&self, fingerprint: Fingerprint) -> Result<Listing> {
        self.request(|response| ExchangeMessage::Listing {
            fingerprint,
            response,
        })
        .await
    }

    /// Fingerprint at a global index
    pub async fn listing_at(&self, index: u64) -> Result<Fingerprint> {
        self.request(|response| ExchangeMessage::ListingAt { index, response })
            .await
    }

    /// Fingerprint at a seller index
    pub async fn seller_listing(&self, seller: AccountId, index: u64) -> Result<Fingerprint> {
        self.request(|response| ExchangeMessage::SellerListing {
            seller,
            index,
            response,
        })
        .await
    }

    /// Fingerprint at a buyer index
    pub async fn buyer_purchase(&self, buyer: AccountId, index: u64) -> Result<Fingerprint> {
        self.request(|response| ExchangeMessage::BuyerPurchase {
            buyer,
            index,
            response,
        })
        .await
    }

    /// Whether `buyer` owns `fingerprint`
    pub async fn has_purchased(&self, fingerprint: Fingerprint, buyer: AccountId) -> Result<bool> {
        self.request(|response| ExchangeMessage::HasPurchased {
            fingerprint,
            buyer,
            response,
        })
        .await
    }

    /// Order of `buyer` for `fingerprint`
    pub async fn order(&self, fingerprint: Fingerprint, buyer: AccountId) -> Result<Order> {
        self.request(|response| ExchangeMessage::Order {
            fingerprint,
            buyer,
            response,
        })
        .await
    }

    /// Orders waiting for `seller` to deliver a key
    pub async fn pending_orders(&self, seller: AccountId) -> Result<Vec<Order>> {
        self.request(|response| ExchangeMessage::PendingOrders { seller, response })
            .await
    }

    /// Encrypted access key, once delivered
    pub async fn access_key(
        &self,
        fingerprint: Fingerprint,
        buyer: AccountId,
    ) -> Result<Option<Vec<u8>>> {
        self.request(|response| ExchangeMessage::AccessKey {
            fingerprint,
            buyer,
            response,
        })
        .await
    }

    /// Number of listings
    pub async fn listing_count(&self) -> Result<u64> {
        self.request(|response| ExchangeMessage::ListingCount { response })
            .await
    }

    /// Number of listings by `seller`
    pub async fn seller_listing_count(&self, seller: AccountId) -> Result<u64> {
        self.request(|response| ExchangeMessage::SellerListingCount { seller, response })
            .await
    }

    /// Number of purchases by `buyer`
    pub async fn buyer_purchase_count(&self, buyer: AccountId) -> Result<u64> {
        self.request(|response| ExchangeMessage::BuyerPurchaseCount { buyer, response })
            .await
    }

    /// All listings in registration order
    pub async fn listings(&self) -> Result<Vec<Listing>> {
        self.request(|response| ExchangeMessage::Listings { response })
            .await
    }

    /// Re-check supply conservation
    pub async fn check_conservation(&self) -> Result<()> {
        self.request(|response| ExchangeMessage::CheckConservation { response })
            .await
    }

    /// Current journal head
    pub async fn head(&self) -> Result<JournalHead> {
        self.request(|response| ExchangeMessage::Head { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ExchangeMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the exchange actor
///
/// Replays the journal before returning, so the first request already sees
/// the recovered state.
pub fn spawn_exchange_actor(
    storage: Arc<Storage>,
    genesis: Genesis,
    keypair: Option<KeyPair>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> Result<(ExchangeHandle, JoinHandle<()>)> {
    let actor = ExchangeActor::new(storage, genesis, keypair, metrics)?;

    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));

    let task = tokio::spawn(async move {
        actor.run(rx).await;
    });

    Ok((ExchangeHandle::new(tx), task))
}
