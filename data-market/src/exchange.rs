//! Combined ledger + marketplace state
//!
//! [`Exchange`] is the unit of serialization: every command is applied to it
//! as one step, so a purchase's token transfer and its records can never be
//! observed apart.

use crate::{
    market::Marketplace,
    types::{Command, Event, MarketEvent, Outcome, Receipt},
    Result,
};
use serde::{Deserialize, Serialize};
use token_ledger::{AccountId, Amount, TokenLedger};

/// Parameters an exchange is created from
///
/// Persisted alongside the journal; replay starts from the genesis state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    /// Identity the whole supply is minted to
    pub minter: AccountId,

    /// Fixed token supply (base units)
    pub total_supply: Amount,

    /// Ledger identity of the marketplace (the spender buyers approve)
    pub market_account: AccountId,
}

/// Token ledger and marketplace, mutated together
#[derive(Debug, Clone)]
pub struct Exchange {
    ledger: TokenLedger,
    market: Marketplace,
}

impl Exchange {
    /// Fresh exchange in its genesis state
    pub fn new(genesis: &Genesis) -> Self {
        Self {
            ledger: TokenLedger::new(genesis.minter.clone(), genesis.total_supply),
            market: Marketplace::new(genesis.market_account.clone()),
        }
    }

    /// Apply one command
    ///
    /// A rejected command leaves both the ledger and the marketplace as
    /// they were.
    pub fn execute(&mut self, command: &Command) -> Result<Receipt> {
        let ctx = command.context();

        let receipt = match command {
            Command::Transfer { to, amount, .. } => {
                let event = self.ledger.transfer(&ctx, to, *amount)?;
                Receipt {
                    outcome: Outcome::Ack,
                    events: vec![event.into()],
                }
            }

            Command::Approve { spender, amount, .. } => {
                let event = self.ledger.approve(&ctx, spender, *amount);
                Receipt {
                    outcome: Outcome::Ack,
                    events: vec![event.into()],
                }
            }

            Command::TransferFrom { from, to, amount, .. } => {
                let event = self.ledger.transfer_from(&ctx, from, to, *amount)?;
                Receipt {
                    outcome: Outcome::Ack,
                    events: vec![event.into()],
                }
            }

            Command::RegisterListing {
                price,
                fingerprint,
                description,
                ..
            } => {
                let (index, event) = self.market.register_listing(
                    &ctx,
                    *price,
                    *fingerprint,
                    description.clone(),
                )?;
                Receipt {
                    outcome: Outcome::Listed { index },
                    events: vec![event.into()],
                }
            }

            Command::Purchase {
                fingerprint,
                public_key,
                ..
            } => {
                let (record, transfer) = self.market.purchase(
                    &mut self.ledger,
                    &ctx,
                    *fingerprint,
                    public_key.clone(),
                )?;
                Receipt {
                    outcome: Outcome::Purchased(record.clone()),
                    events: vec![
                        Event::Ledger(transfer),
                        Event::Market(MarketEvent::PurchaseCompleted(record)),
                    ],
                }
            }

            Command::Buy {
                fingerprint,
                public_key,
                ..
            } => {
                let (record, [approval, transfer]) = self.market.buy(
                    &mut self.ledger,
                    &ctx,
                    *fingerprint,
                    public_key.clone(),
                )?;
                Receipt {
                    outcome: Outcome::Purchased(record.clone()),
                    events: vec![
                        Event::Ledger(approval),
                        Event::Ledger(transfer),
                        Event::Market(MarketEvent::PurchaseCompleted(record)),
                    ],
                }
            }

            Command::ConfirmPurchase {
                fingerprint,
                buyer,
                encrypted_key,
                ..
            } => {
                let event = self.market.confirm_purchase(
                    &ctx,
                    *fingerprint,
                    buyer,
                    encrypted_key.clone(),
                )?;
                Receipt {
                    outcome: Outcome::Ack,
                    events: vec![event.into()],
                }
            }
        };

        Ok(receipt)
    }

    /// Token ledger (read-only)
    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Marketplace (read-only)
    pub fn market(&self) -> &Marketplace {
        &self.market
    }
}
