//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Supply conservation: Σ(balances) == total supply
//! - Failed operations leave state untouched
//! - Approval overwrites, never accumulates
//! - Deterministic replay: same operations → same balances

use proptest::prelude::*;
use token_ledger::{AccountId, Amount, CallContext, Error, TokenLedger};

const SUPPLY: Amount = 10_000;
const ACCOUNTS: [&str; 4] = ["minter", "alice", "bob", "market"];

/// A single ledger operation, by account index
#[derive(Debug, Clone)]
enum Op {
    Transfer { caller: usize, to: usize, amount: Amount },
    Approve { caller: usize, spender: usize, amount: Amount },
    TransferFrom { caller: usize, from: usize, to: usize, amount: Amount },
}

fn account(i: usize) -> AccountId {
    AccountId::new(ACCOUNTS[i])
}

/// Strategy for generating amounts (some exceed any balance)
fn amount_strategy() -> impl Strategy<Value = Amount> {
    (0u64..(SUPPLY as u64 * 2)).prop_map(Amount::from)
}

/// Strategy for generating account indices
fn account_strategy() -> impl Strategy<Value = usize> {
    0..ACCOUNTS.len()
}

/// Strategy for generating ledger operations
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (account_strategy(), account_strategy(), amount_strategy())
            .prop_map(|(caller, to, amount)| Op::Transfer { caller, to, amount }),
        (account_strategy(), account_strategy(), amount_strategy())
            .prop_map(|(caller, spender, amount)| Op::Approve { caller, spender, amount }),
        (account_strategy(), account_strategy(), account_strategy(), amount_strategy()).prop_map(
            |(caller, from, to, amount)| Op::TransferFrom { caller, from, to, amount }
        ),
    ]
}

fn apply(ledger: &mut TokenLedger, op: &Op) -> token_ledger::Result<()> {
    match op {
        Op::Transfer { caller, to, amount } => ledger
            .transfer(&CallContext::from(account(*caller)), &account(*to), *amount)
            .map(|_| ()),
        Op::Approve { caller, spender, amount } => {
            ledger.approve(&CallContext::from(account(*caller)), &account(*spender), *amount);
            Ok(())
        }
        Op::TransferFrom { caller, from, to, amount } => ledger
            .transfer_from(
                &CallContext::from(account(*caller)),
                &account(*from),
                &account(*to),
                *amount,
            )
            .map(|_| ()),
    }
}

fn snapshot(ledger: &TokenLedger) -> Vec<Amount> {
    let mut state: Vec<Amount> = (0..ACCOUNTS.len())
        .map(|i| ledger.balance_of(&account(i)))
        .collect();
    for owner in 0..ACCOUNTS.len() {
        for spender in 0..ACCOUNTS.len() {
            state.push(ledger.allowance(&account(owner), &account(spender)));
        }
    }
    state
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: Σ(balances) never changes, whatever the operation mix
    #[test]
    fn prop_supply_conserved(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut ledger = TokenLedger::new(account(0), SUPPLY);

        for op in &ops {
            let _ = apply(&mut ledger, op);
            prop_assert!(ledger.check_conservation().is_ok());

            let sum: Amount = (0..ACCOUNTS.len()).map(|i| ledger.balance_of(&account(i))).sum();
            prop_assert_eq!(sum, SUPPLY);
        }
    }

    /// Property: a rejected operation mutates nothing
    #[test]
    fn prop_rejection_is_atomic(
        ops in prop::collection::vec(op_strategy(), 1..40),
        candidate in op_strategy(),
    ) {
        let mut ledger = TokenLedger::new(account(0), SUPPLY);
        for op in &ops {
            let _ = apply(&mut ledger, op);
        }

        let before = snapshot(&ledger);
        if apply(&mut ledger, &candidate).is_err() {
            prop_assert_eq!(before, snapshot(&ledger));
        }
    }

    /// Property: the latest approval wins
    #[test]
    fn prop_approve_overwrites(first in amount_strategy(), second in amount_strategy()) {
        let mut ledger = TokenLedger::new(account(0), SUPPLY);
        let owner = CallContext::from(account(1));

        ledger.approve(&owner, &account(3), first);
        ledger.approve(&owner, &account(3), second);

        prop_assert_eq!(ledger.allowance(&account(1), &account(3)), second);
    }

    /// Property: an unfunded owner is reported as InsufficientBalance
    #[test]
    fn prop_unfunded_reports_balance(allowance in amount_strategy(), amount in 1u64..1_000) {
        let mut ledger = TokenLedger::new(account(0), SUPPLY);
        ledger.approve(&CallContext::from(account(1)), &account(3), allowance);

        let result = ledger.transfer_from(
            &CallContext::from(account(3)),
            &account(1),
            &account(2),
            Amount::from(amount),
        );

        let is_balance_error = matches!(result, Err(Error::InsufficientBalance { .. }));
        prop_assert!(is_balance_error);
    }

    /// Property: replaying the same operations yields the same state
    #[test]
    fn prop_deterministic_replay(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut first = TokenLedger::new(account(0), SUPPLY);
        let mut second = TokenLedger::new(account(0), SUPPLY);

        for op in &ops {
            let a = apply(&mut first, op);
            let b = apply(&mut second, op);
            prop_assert_eq!(a, b);
        }

        prop_assert_eq!(snapshot(&first), snapshot(&second));
    }
}
