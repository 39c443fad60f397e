//! Main market orchestration layer
//!
//! Ties together storage, the journal and the exchange actor into the
//! high-level API callers use.
//!
//! # Example
//!
//! ```no_run
//! use data_market::{CallContext, Config, DataMarket, Fingerprint};
//!
//! #[tokio::main]
//! async fn main() -> data_market::Result<()> {
//!     let market = DataMarket::open(Config::default()).await?;
//!
//!     let seller = CallContext::new("alice");
//!     let fingerprint = Fingerprint::of_content(b"dataset v1");
//!     market
//!         .register_listing(&seller, 100, fingerprint, "Daily rainfall 2024")
//!         .await?;
//!
//!     market.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_exchange_actor, ExchangeHandle},
    crypto::KeyPair,
    exchange::Genesis,
    journal::{self, JournalHead},
    metrics::Metrics,
    types::{
        Command, Fingerprint, JournalEntry, Listing, Order, Outcome, PurchaseRecord, Receipt,
    },
    Config, Error, Result, Storage,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use token_ledger::{AccountId, Amount, CallContext};

/// Main market interface
#[derive(Debug)]
pub struct DataMarket {
    /// Actor handle for state access
    handle: ExchangeHandle,

    /// Actor task, awaited on shutdown
    actor: JoinHandle<()>,

    /// Direct storage access (journal reads)
    storage: Arc<Storage>,

    /// Genesis the journal started from
    genesis: Genesis,

    /// Public half of the journal signing key (if enabled)
    public_key: Option<[u8; 32]>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl DataMarket {
    /// Open market with configuration
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_keypair(config, None).await
    }

    /// Open market, signing every journal entry with `keypair`
    pub async fn open_with_keypair(config: Config, keypair: Option<KeyPair>) -> Result<Self> {
        let genesis = config.genesis()?;
        let storage = Arc::new(Storage::open(&config)?);

        match storage.load_genesis()? {
            Some(stored) if stored != genesis => {
                return Err(Error::Config(format!(
                    "journal at {} was started with different genesis parameters",
                    config.data_dir.display()
                )));
            }
            Some(_) => {}
            None => storage.put_genesis(&genesis)?,
        }

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;
        let public_key = keypair.as_ref().map(KeyPair::public_key);

        let (handle, actor) = spawn_exchange_actor(
            storage.clone(),
            genesis.clone(),
            keypair,
            metrics.clone(),
            config.actor.mailbox_capacity,
        )?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            market_account = %genesis.market_account,
            token = %config.token.symbol,
            "Data market opened"
        );

        Ok(Self {
            handle,
            actor,
            storage,
            genesis,
            public_key,
            metrics,
            config,
        })
    }

    /// Cloneable handle for concurrent callers
    pub fn handle(&self) -> ExchangeHandle {
        self.handle.clone()
    }

    /// Ledger identity buyers approve before purchasing
    pub fn market_account(&self) -> &AccountId {
        &self.genesis.market_account
    }

    /// Genesis parameters
    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply a raw command
    pub async fn execute(&self, command: Command) -> Result<Receipt> {
        self.handle.execute(command).await
    }

    // Token operations

    /// Move tokens from the caller to `to`
    pub async fn transfer(&self, ctx: &CallContext, to: &AccountId, amount: Amount) -> Result<()> {
        self.execute(Command::Transfer {
            caller: ctx.caller.clone(),
            to: to.clone(),
            amount,
        })
        .await?;
        Ok(())
    }

    /// Set the caller's allowance for `spender`
    pub async fn approve(
        &self,
        ctx: &CallContext,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.execute(Command::Approve {
            caller: ctx.caller.clone(),
            spender: spender.clone(),
            amount,
        })
        .await?;
        Ok(())
    }

    /// Spend the caller's allowance from `from`
    pub async fn transfer_from(
        &self,
        ctx: &CallContext,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.execute(Command::TransferFrom {
            caller: ctx.caller.clone(),
            from: from.clone(),
            to: to.clone(),
            amount,
        })
        .await?;
        Ok(())
    }

    /// Token balance
    pub async fn balance_of(&self, account: &AccountId) -> Result<Amount> {
        self.handle.balance_of(account.clone()).await
    }

    /// Remaining allowance
    pub async fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Result<Amount> {
        self.handle.allowance(owner.clone(), spender.clone()).await
    }

    /// Fixed token supply
    pub async fn total_supply(&self) -> Result<Amount> {
        self.handle.total_supply().await
    }

    // Marketplace operations

    /// List a file for sale; returns its index in the global order
    pub async fn register_listing(
        &self,
        ctx: &CallContext,
        price: Amount,
        fingerprint: Fingerprint,
        description: &str,
    ) -> Result<u64> {
        let receipt = self
            .execute(Command::RegisterListing {
                caller: ctx.caller.clone(),
                price,
                fingerprint,
                description: description.to_string(),
            })
            .await?;

        match receipt.outcome {
            Outcome::Listed { index } => Ok(index),
            other => Err(unexpected("register_listing", &other)),
        }
    }

    /// Buy a file the caller has already approved the market to pay for
    ///
    /// `public_key` is what the seller encrypts the access key to.
    pub async fn purchase(
        &self,
        ctx: &CallContext,
        fingerprint: Fingerprint,
        public_key: &[u8],
    ) -> Result<PurchaseRecord> {
        let receipt = self
            .execute(Command::Purchase {
                caller: ctx.caller.clone(),
                fingerprint,
                public_key: public_key.to_vec(),
            })
            .await?;

        match receipt.outcome {
            Outcome::Purchased(record) => Ok(record),
            other => Err(unexpected("purchase", &other)),
        }
    }

    /// Approve exactly the listing price and purchase, as one command
    ///
    /// A rejected buy changes nothing, not even the caller's allowance.
    pub async fn buy(
        &self,
        ctx: &CallContext,
        fingerprint: Fingerprint,
        public_key: &[u8],
    ) -> Result<PurchaseRecord> {
        let receipt = self
            .execute(Command::Buy {
                caller: ctx.caller.clone(),
                fingerprint,
                public_key: public_key.to_vec(),
            })
            .await?;

        match receipt.outcome {
            Outcome::Purchased(record) => Ok(record),
            other => Err(unexpected("buy", &other)),
        }
    }

    /// Deliver the encrypted access key for `buyer`'s purchase
    ///
    /// Only the listing's seller may call this.
    pub async fn confirm_purchase(
        &self,
        ctx: &CallContext,
        fingerprint: Fingerprint,
        buyer: &AccountId,
        encrypted_key: &[u8],
    ) -> Result<()> {
        self.execute(Command::ConfirmPurchase {
            caller: ctx.caller.clone(),
            fingerprint,
            buyer: buyer.clone(),
            encrypted_key: encrypted_key.to_vec(),
        })
        .await?;
        Ok(())
    }

    /// Purchases of `seller`'s listings still waiting for a key
    pub async fn pending_orders(&self, seller: &AccountId) -> Result<Vec<Order>> {
        self.handle.pending_orders(seller.clone()).await
    }

    /// Order of `buyer` for `fingerprint`
    pub async fn order(&self, fingerprint: Fingerprint, buyer: &AccountId) -> Result<Order> {
        self.handle.order(fingerprint, buyer.clone()).await
    }

    /// Encrypted access key delivered to `buyer`, `None` while pending
    pub async fn access_key(
        &self,
        fingerprint: Fingerprint,
        buyer: &AccountId,
    ) -> Result<Option<Vec<u8>>> {
        self.handle.access_key(fingerprint, buyer.clone()).await
    }

    /// Listing by fingerprint
    pub async fn listing(&self, fingerprint: Fingerprint) -> Result<Listing> {
        self.handle.listing(fingerprint).await
    }

    /// Fingerprint at a position of the global listing order
    pub async fn listing_at(&self, index: u64) -> Result<Fingerprint> {
        self.handle.listing_at(index).await
    }

    /// Fingerprint at a position of a seller's listings
    pub async fn seller_listing(&self, seller: &AccountId, index: u64) -> Result<Fingerprint> {
        self.handle.seller_listing(seller.clone(), index).await
    }

    /// Fingerprint at a position of a buyer's purchases
    pub async fn buyer_purchase(&self, buyer: &AccountId, index: u64) -> Result<Fingerprint> {
        self.handle.buyer_purchase(buyer.clone(), index).await
    }

    /// Whether `buyer` owns `fingerprint`
    pub async fn has_purchased(&self, fingerprint: Fingerprint, buyer: &AccountId) -> Result<bool> {
        self.handle.has_purchased(fingerprint, buyer.clone()).await
    }

    /// Number of listings
    pub async fn listing_count(&self) -> Result<u64> {
        self.handle.listing_count().await
    }

    /// Number of listings registered by `seller`
    pub async fn seller_listing_count(&self, seller: &AccountId) -> Result<u64> {
        self.handle.seller_listing_count(seller.clone()).await
    }

    /// Number of purchases made by `buyer`
    pub async fn buyer_purchase_count(&self, buyer: &AccountId) -> Result<u64> {
        self.handle.buyer_purchase_count(buyer.clone()).await
    }

    /// All listings in registration order
    pub async fn listings(&self) -> Result<Vec<Listing>> {
        self.handle.listings().await
    }

    // Journal

    /// Current journal head
    pub async fn head(&self) -> Result<JournalHead> {
        self.handle.head().await
    }

    /// Journal entries starting at `from`
    pub fn journal(&self, from: u64) -> Result<Vec<JournalEntry>> {
        self.storage.entries_from(from)
    }

    /// Purchase notifications committed at or after sequence `from`
    ///
    /// Subscribers keep the sequence of the last entry they saw and poll
    /// from the one after it.
    pub fn purchases_since(&self, from: u64) -> Result<Vec<(u64, PurchaseRecord)>> {
        let mut purchases = Vec::new();
        self.storage.scan_from(from, |entry| {
            purchases.extend(entry.purchases().cloned().map(|p| (entry.sequence, p)));
            Ok(())
        })?;
        Ok(purchases)
    }

    /// Verify the whole journal against genesis
    ///
    /// Checks the hash chain, signatures when a signing key is configured,
    /// and that every command still replays to its recorded events. Returns
    /// the number of entries.
    pub fn verify_journal(&self) -> Result<u64> {
        let (_, head) =
            journal::replay_verified(&self.storage, &self.genesis, self.public_key.as_ref())?;
        Ok(head.next_sequence)
    }

    /// Check supply conservation on the live state
    pub async fn check_conservation(&self) -> Result<()> {
        self.handle.check_conservation().await
    }

    /// Shutdown market
    ///
    /// Waits for the actor to stop so the database is closed once this
    /// returns.
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.actor
            .await
            .map_err(|e| Error::Concurrency(format!("Exchange actor panicked: {}", e)))?;
        Ok(())
    }
}

fn unexpected(operation: &str, outcome: &Outcome) -> Error {
    Error::Concurrency(format!("{} produced unexpected outcome {:?}", operation, outcome))
}
