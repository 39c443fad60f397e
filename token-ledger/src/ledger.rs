//! Balance and allowance state machine
//!
//! Every mutating operation is split into a validation phase that only reads
//! and a commit phase that cannot fail. Callers composing several ledger
//! operations into one atomic step (the marketplace purchase) run the
//! validation half up front through [`TokenLedger::check_transfer_from`].
//!
//! # Example
//!
//! ```
//! use token_ledger::{AccountId, CallContext, TokenLedger};
//!
//! let mut ledger = TokenLedger::new(AccountId::new("minter"), 1_000);
//! let minter = CallContext::new("minter");
//!
//! ledger.transfer(&minter, &AccountId::new("alice"), 250).unwrap();
//! assert_eq!(ledger.balance_of(&AccountId::new("alice")), 250);
//! assert!(ledger.check_conservation().is_ok());
//! ```

use crate::{
    types::{AccountId, Amount, CallContext, LedgerEvent},
    Error, Result,
};
use std::collections::HashMap;

/// Fixed-supply token ledger
#[derive(Debug, Clone)]
pub struct TokenLedger {
    /// Identity the whole supply was minted to
    minter: AccountId,

    /// Fixed at creation
    total_supply: Amount,

    /// Account table
    balances: HashMap<AccountId, Amount>,

    /// Allowance table, keyed by (owner, spender)
    allowances: HashMap<(AccountId, AccountId), Amount>,
}

impl TokenLedger {
    /// Create a ledger minting `total_supply` to `minter`
    pub fn new(minter: AccountId, total_supply: Amount) -> Self {
        let mut balances = HashMap::new();
        balances.insert(minter.clone(), total_supply);

        tracing::debug!(minter = %minter, total_supply, "Token ledger created");

        Self {
            minter,
            total_supply,
            balances,
            allowances: HashMap::new(),
        }
    }

    /// Move `amount` from the caller to `to`
    pub fn transfer(
        &mut self,
        ctx: &CallContext,
        to: &AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent> {
        self.check_balance(&ctx.caller, amount)?;
        self.move_funds(&ctx.caller, to, amount);

        Ok(LedgerEvent::Transfer {
            from: ctx.caller.clone(),
            to: to.clone(),
            amount,
        })
    }

    /// Set the allowance of `spender` over the caller's funds
    ///
    /// Overwrites any previous allowance. Balance is not checked here.
    pub fn approve(
        &mut self,
        ctx: &CallContext,
        spender: &AccountId,
        amount: Amount,
    ) -> LedgerEvent {
        self.allowances
            .insert((ctx.caller.clone(), spender.clone()), amount);

        tracing::debug!(owner = %ctx.caller, spender = %spender, amount, "Allowance set");

        LedgerEvent::Approval {
            owner: ctx.caller.clone(),
            spender: spender.clone(),
            amount,
        }
    }

    /// Delegated transfer: the caller spends `amount` of `from`'s funds
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<LedgerEvent> {
        self.check_transfer_from(&ctx.caller, from, amount)?;

        let key = (from.clone(), ctx.caller.clone());
        let remaining = self.allowance(from, &ctx.caller) - amount;
        self.allowances.insert(key, remaining);
        self.move_funds(from, to, amount);

        Ok(LedgerEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        })
    }

    /// Validate a delegated transfer without applying it
    ///
    /// Balance is checked before allowance: an unfunded owner is always
    /// reported as `InsufficientBalance`, whatever the allowance.
    pub fn check_transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        self.check_balance(from, amount)?;

        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(Error::InsufficientAllowance {
                owner: from.clone(),
                spender: spender.clone(),
                allowance,
                required: amount,
            });
        }

        Ok(())
    }

    /// Balance of `account` (zero if never seen)
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Allowance of `spender` over `owner`'s funds (zero if never set)
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Fixed total supply
    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Identity the supply was minted to
    pub fn minter(&self) -> &AccountId {
        &self.minter
    }

    /// Number of accounts with a non-zero balance
    pub fn holders(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }

    /// Check supply conservation invariant
    ///
    /// Σ(balances) must equal the supply minted at creation.
    pub fn check_conservation(&self) -> Result<()> {
        let sum = self
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
            .ok_or_else(|| Error::InvariantViolation("balance sum overflows".to_string()))?;

        if sum != self.total_supply {
            return Err(Error::InvariantViolation(format!(
                "balances sum to {} but total supply is {}",
                sum, self.total_supply
            )));
        }

        Ok(())
    }

    /// Validate that `account` can be debited `amount`
    pub fn check_balance(&self, account: &AccountId, amount: Amount) -> Result<()> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                account: account.clone(),
                balance,
                required: amount,
            });
        }
        Ok(())
    }

    // Callers have checked `from`'s balance. Credits cannot overflow since
    // every balance is bounded by the total supply.
    fn move_funds(&mut self, from: &AccountId, to: &AccountId, amount: Amount) {
        *self.balances.entry(from.clone()).or_insert(0) -= amount;
        *self.balances.entry(to.clone()).or_insert(0) += amount;

        tracing::debug!(from = %from, to = %to, amount, "Tokens moved");
    }
}
