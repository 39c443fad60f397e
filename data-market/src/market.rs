//! Listings, indexes, purchase orchestration and key delivery
//!
//! The marketplace never touches balances directly. A purchase moves tokens
//! through the ledger's delegated transfer, with the marketplace's own
//! identity as the spender the buyer approved.
//!
//! # Purchase
//!
//! ```text
//! purchase(buyer, fingerprint, public_key)
//!   │
//!   ├─ listing exists and available?     no → NotAvailable
//!   ├─ (fingerprint, buyer) recorded?   yes → AlreadyPurchased
//!   ├─ public key present?               no → InvalidArgument
//!   ├─ ledger.check_transfer_from()      err → InsufficientBalance / InsufficientAllowance
//!   │                                     (nothing mutated up to here)
//!   ├─ ledger.transfer_from(buyer → seller, price)
//!   └─ pending order + buyer index append
//!
//! confirm_purchase(seller, fingerprint, buyer, encrypted_key)
//!   └─ pending order → confirmed; buyer reads the key with access_key()
//! ```
//!
//! `buy` runs the same checks with the allowance it is about to set, then
//! applies the approval and the purchase together.

use crate::{
    types::{Fingerprint, Listing, MarketEvent, Order, PurchaseRecord},
    Error, Result,
};
use std::collections::HashMap;
use token_ledger::{AccountId, Amount, CallContext, LedgerEvent, TokenLedger};

type OrderKey = (Fingerprint, AccountId);

/// Marketplace state
#[derive(Debug, Clone)]
pub struct Marketplace {
    /// Ledger identity buyers approve as spender
    account: AccountId,

    /// Listing table
    listings: HashMap<Fingerprint, Listing>,

    /// Global listing order
    catalogue: Vec<Fingerprint>,

    /// Per-seller listing order
    seller_listings: HashMap<AccountId, Vec<Fingerprint>>,

    /// Per-buyer purchase order
    buyer_purchases: HashMap<AccountId, Vec<Fingerprint>>,

    /// Orders by (fingerprint, buyer); doubles as the purchase-membership set
    orders: HashMap<OrderKey, Order>,

    /// Per-seller order arrival
    seller_orders: HashMap<AccountId, Vec<OrderKey>>,
}

impl Marketplace {
    /// Create an empty marketplace acting on the ledger as `account`
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            listings: HashMap::new(),
            catalogue: Vec::new(),
            seller_listings: HashMap::new(),
            buyer_purchases: HashMap::new(),
            orders: HashMap::new(),
            seller_orders: HashMap::new(),
        }
    }

    /// Ledger identity of the marketplace
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Register a listing with the caller as seller
    ///
    /// Returns the listing's slot in the global order.
    pub fn register_listing(
        &mut self,
        ctx: &CallContext,
        price: Amount,
        fingerprint: Fingerprint,
        description: String,
    ) -> Result<(u64, MarketEvent)> {
        if price == 0 {
            return Err(Error::InvalidArgument("price must be positive".to_string()));
        }
        if self.listings.contains_key(&fingerprint) {
            return Err(Error::DuplicateListing(fingerprint));
        }

        let seller = ctx.caller.clone();
        let index = self.catalogue.len() as u64;

        self.listings.insert(
            fingerprint,
            Listing {
                fingerprint,
                seller: seller.clone(),
                price,
                description: description.clone(),
                available: true,
            },
        );
        self.catalogue.push(fingerprint);
        self.seller_listings
            .entry(seller.clone())
            .or_default()
            .push(fingerprint);

        tracing::debug!(
            fingerprint = %fingerprint,
            seller = %seller,
            price,
            index,
            "Listing registered"
        );

        Ok((
            index,
            MarketEvent::ListingCreated {
                fingerprint,
                seller,
                price,
                description,
                index,
            },
        ))
    }

    /// Buy access to a listing, paying its seller through the ledger
    ///
    /// The caller must have approved the marketplace for at least the price.
    /// Either the token transfer and the purchase records both happen, or
    /// neither does.
    pub fn purchase(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        fingerprint: Fingerprint,
        public_key: Vec<u8>,
    ) -> Result<(PurchaseRecord, LedgerEvent)> {
        let (seller, price) = self.check_purchase(&ctx.caller, fingerprint, &public_key)?;
        ledger.check_transfer_from(&self.account, &ctx.caller, price)?;

        self.settle(ledger, &ctx.caller, fingerprint, seller, price, public_key)
    }

    /// Approve exactly the listing price, then purchase
    ///
    /// Nothing is applied unless the purchase would succeed with that
    /// allowance, so a rejected buy leaves the previous allowance in place.
    pub fn buy(
        &mut self,
        ledger: &mut TokenLedger,
        ctx: &CallContext,
        fingerprint: Fingerprint,
        public_key: Vec<u8>,
    ) -> Result<(PurchaseRecord, [LedgerEvent; 2])> {
        let (seller, price) = self.check_purchase(&ctx.caller, fingerprint, &public_key)?;
        ledger.check_balance(&ctx.caller, price)?;

        let approval = ledger.approve(ctx, &self.account, price);
        let (record, transfer) =
            self.settle(ledger, &ctx.caller, fingerprint, seller, price, public_key)?;

        Ok((record, [approval, transfer]))
    }

    /// Deliver the access key for a settled purchase
    ///
    /// Only the listing's seller may confirm, once per order.
    pub fn confirm_purchase(
        &mut self,
        ctx: &CallContext,
        fingerprint: Fingerprint,
        buyer: &AccountId,
        encrypted_key: Vec<u8>,
    ) -> Result<MarketEvent> {
        let listing = self.listing(&fingerprint)?;
        if listing.seller != ctx.caller {
            return Err(Error::NotSeller {
                fingerprint,
                caller: ctx.caller.clone(),
            });
        }
        if encrypted_key.is_empty() {
            return Err(Error::InvalidArgument(
                "encrypted key must not be empty".to_string(),
            ));
        }

        let order = self
            .orders
            .get_mut(&(fingerprint, buyer.clone()))
            .ok_or_else(|| Error::OrderNotFound {
                fingerprint,
                buyer: buyer.clone(),
            })?;
        if order.is_confirmed() {
            return Err(Error::AlreadyConfirmed {
                fingerprint,
                buyer: buyer.clone(),
            });
        }

        order.encrypted_key = Some(encrypted_key);

        tracing::debug!(fingerprint = %fingerprint, buyer = %buyer, "Purchase confirmed");

        Ok(MarketEvent::PurchaseConfirmed {
            fingerprint,
            buyer: buyer.clone(),
            seller: ctx.caller.clone(),
        })
    }

    /// Shared purchase checks; returns the seller and price to pay
    fn check_purchase(
        &self,
        buyer: &AccountId,
        fingerprint: Fingerprint,
        public_key: &[u8],
    ) -> Result<(AccountId, Amount)> {
        let listing = match self.listings.get(&fingerprint) {
            Some(listing) if listing.available => listing,
            _ => return Err(Error::NotAvailable(fingerprint)),
        };

        if self.has_purchased(&fingerprint, buyer) {
            return Err(Error::AlreadyPurchased(fingerprint));
        }

        if public_key.is_empty() {
            return Err(Error::InvalidArgument(
                "buyer public key must not be empty".to_string(),
            ));
        }

        Ok((listing.seller.clone(), listing.price))
    }

    // Callers have validated the purchase, including the ledger side.
    fn settle(
        &mut self,
        ledger: &mut TokenLedger,
        buyer: &AccountId,
        fingerprint: Fingerprint,
        seller: AccountId,
        price: Amount,
        public_key: Vec<u8>,
    ) -> Result<(PurchaseRecord, LedgerEvent)> {
        let spender = CallContext::from(self.account.clone());
        let transfer = ledger.transfer_from(&spender, buyer, &seller, price)?;

        let record = PurchaseRecord {
            fingerprint,
            buyer: buyer.clone(),
            seller: seller.clone(),
            price,
            public_key,
        };

        let key = (fingerprint, buyer.clone());
        self.orders.insert(
            key.clone(),
            Order {
                record: record.clone(),
                encrypted_key: None,
            },
        );
        self.seller_orders.entry(seller).or_default().push(key);
        self.buyer_purchases
            .entry(buyer.clone())
            .or_default()
            .push(fingerprint);

        tracing::debug!(
            fingerprint = %fingerprint,
            buyer = %record.buyer,
            seller = %record.seller,
            price,
            "Purchase recorded"
        );

        Ok((record, transfer))
    }

    /// Listing by fingerprint
    pub fn listing(&self, fingerprint: &Fingerprint) -> Result<&Listing> {
        self.listings
            .get(fingerprint)
            .ok_or(Error::ListingNotFound(*fingerprint))
    }

    /// Fingerprint at `index` of the global listing order
    pub fn listing_at(&self, index: u64) -> Result<Fingerprint> {
        nth(&self.catalogue, index)
    }

    /// Fingerprint at `index` of `seller`'s listings
    pub fn seller_listing(&self, seller: &AccountId, index: u64) -> Result<Fingerprint> {
        nth(entries_for(&self.seller_listings, seller), index)
    }

    /// Fingerprint at `index` of `buyer`'s purchases
    pub fn buyer_purchase(&self, buyer: &AccountId, index: u64) -> Result<Fingerprint> {
        nth(entries_for(&self.buyer_purchases, buyer), index)
    }

    /// Whether `buyer` has bought `fingerprint`
    pub fn has_purchased(&self, fingerprint: &Fingerprint, buyer: &AccountId) -> bool {
        self.orders.contains_key(&(*fingerprint, buyer.clone()))
    }

    /// Number of registered listings
    pub fn listing_count(&self) -> u64 {
        self.catalogue.len() as u64
    }

    /// Number of listings registered by `seller`
    pub fn seller_listing_count(&self, seller: &AccountId) -> u64 {
        entries_for(&self.seller_listings, seller).len() as u64
    }

    /// Number of purchases made by `buyer`
    pub fn buyer_purchase_count(&self, buyer: &AccountId) -> u64 {
        entries_for(&self.buyer_purchases, buyer).len() as u64
    }

    /// All listings in registration order
    pub fn listings(&self) -> impl Iterator<Item = &Listing> {
        self.catalogue.iter().filter_map(move |fp| self.listings.get(fp))
    }

    /// Order of `buyer` for `fingerprint`
    pub fn order(&self, fingerprint: &Fingerprint, buyer: &AccountId) -> Result<&Order> {
        self.orders
            .get(&(*fingerprint, buyer.clone()))
            .ok_or_else(|| Error::OrderNotFound {
                fingerprint: *fingerprint,
                buyer: buyer.clone(),
            })
    }

    /// Orders on `seller`'s listings still waiting for a key, oldest first
    pub fn pending_orders<'a>(&'a self, seller: &AccountId) -> impl Iterator<Item = &'a Order> {
        self.seller_orders
            .get(seller)
            .into_iter()
            .flatten()
            .filter_map(move |key| self.orders.get(key))
            .filter(|order| !order.is_confirmed())
    }

    /// Delivered access key, `None` while the order is pending
    pub fn access_key(
        &self,
        fingerprint: &Fingerprint,
        buyer: &AccountId,
    ) -> Result<Option<&[u8]>> {
        Ok(self.order(fingerprint, buyer)?.encrypted_key.as_deref())
    }
}

fn entries_for<'a>(
    index: &'a HashMap<AccountId, Vec<Fingerprint>>,
    account: &AccountId,
) -> &'a [Fingerprint] {
    index.get(account).map(Vec::as_slice).unwrap_or(&[])
}

fn nth(sequence: &[Fingerprint], index: u64) -> Result<Fingerprint> {
    usize::try_from(index)
        .ok()
        .and_then(|i| sequence.get(i))
        .copied()
        .ok_or(Error::IndexOutOfRange {
            index,
            len: sequence.len() as u64,
        })
}
