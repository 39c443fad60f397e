//! Property-based tests for exchange invariants
//!
//! - Supply conservation across any mix of token and market commands
//! - At most one purchase per (fingerprint, buyer)
//! - Rejected commands leave the state untouched
//! - Deterministic replay: same commands → same receipts

use data_market::{AccountId, Command, Exchange, Fingerprint, Genesis};
use proptest::prelude::*;

const SUPPLY: u128 = 10_000;
const ACCOUNTS: [&str; 4] = ["owner", "alice", "bob", "carol"];

fn genesis() -> Genesis {
    Genesis {
        minter: AccountId::new("owner"),
        total_supply: SUPPLY,
        market_account: AccountId::new("market"),
    }
}

fn account_strategy() -> impl Strategy<Value = AccountId> {
    (0..ACCOUNTS.len()).prop_map(|i| AccountId::new(ACCOUNTS[i]))
}

/// Small fingerprint space so purchases hit registered listings
fn fingerprint_strategy() -> impl Strategy<Value = Fingerprint> {
    (0u8..3).prop_map(|b| Fingerprint::from_bytes([b; 32]))
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        (account_strategy(), account_strategy(), 0u128..3_000).prop_map(|(caller, to, amount)| {
            Command::Transfer { caller, to, amount }
        }),
        (account_strategy(), 0u128..3_000).prop_map(|(caller, amount)| Command::Approve {
            caller,
            spender: AccountId::new("market"),
            amount,
        }),
        (account_strategy(), 0u128..500, fingerprint_strategy()).prop_map(
            |(caller, price, fingerprint)| Command::RegisterListing {
                caller,
                price,
                fingerprint,
                description: String::new(),
            }
        ),
        (account_strategy(), fingerprint_strategy())
            .prop_map(|(caller, fingerprint)| Command::Purchase {
                caller,
                fingerprint,
                public_key: b"key".to_vec(),
            }),
        (account_strategy(), fingerprint_strategy())
            .prop_map(|(caller, fingerprint)| Command::Buy {
                caller,
                fingerprint,
                public_key: b"key".to_vec(),
            }),
        (account_strategy(), fingerprint_strategy(), account_strategy()).prop_map(
            |(caller, fingerprint, buyer)| Command::ConfirmPurchase {
                caller,
                fingerprint,
                buyer,
                encrypted_key: vec![1u8; 4],
            }
        ),
    ]
}

fn total_balance(exchange: &Exchange) -> u128 {
    ACCOUNTS
        .iter()
        .map(|name| exchange.ledger().balance_of(&AccountId::new(*name)))
        .sum::<u128>()
        + exchange.ledger().balance_of(&AccountId::new("market"))
}

proptest! {
    #[test]
    fn prop_supply_conserved(commands in prop::collection::vec(command_strategy(), 0..60)) {
        let mut exchange = Exchange::new(&genesis());

        for command in &commands {
            let _ = exchange.execute(command);
            prop_assert_eq!(total_balance(&exchange), SUPPLY);
        }

        prop_assert!(exchange.ledger().check_conservation().is_ok());
    }

    #[test]
    fn prop_one_purchase_per_buyer(commands in prop::collection::vec(command_strategy(), 0..60)) {
        let mut exchange = Exchange::new(&genesis());

        for command in &commands {
            let _ = exchange.execute(command);
        }

        for name in ACCOUNTS {
            let buyer = AccountId::new(name);
            let count = exchange.market().buyer_purchase_count(&buyer);
            let mut bought: Vec<Fingerprint> = (0..count)
                .map(|i| exchange.market().buyer_purchase(&buyer, i).unwrap())
                .collect();
            bought.sort();
            bought.dedup();
            prop_assert_eq!(bought.len() as u64, count);
        }
    }

    #[test]
    fn prop_rejection_is_atomic(commands in prop::collection::vec(command_strategy(), 0..60)) {
        let mut exchange = Exchange::new(&genesis());

        for command in &commands {
            let before = exchange.clone();
            if let Err(e) = exchange.execute(command) {
                prop_assert!(e.is_rejection());
                for name in ACCOUNTS {
                    let account = AccountId::new(name);
                    let market = AccountId::new("market");
                    prop_assert_eq!(
                        exchange.ledger().balance_of(&account),
                        before.ledger().balance_of(&account)
                    );
                    prop_assert_eq!(
                        exchange.ledger().allowance(&account, &market),
                        before.ledger().allowance(&account, &market)
                    );
                    prop_assert_eq!(
                        exchange.market().buyer_purchase_count(&account),
                        before.market().buyer_purchase_count(&account)
                    );
                    prop_assert_eq!(
                        exchange.market().pending_orders(&account).count(),
                        before.market().pending_orders(&account).count()
                    );
                }
                prop_assert_eq!(exchange.market().listing_count(), before.market().listing_count());
            }
        }
    }

    #[test]
    fn prop_deterministic_replay(commands in prop::collection::vec(command_strategy(), 0..60)) {
        let mut first = Exchange::new(&genesis());
        let mut second = Exchange::new(&genesis());

        for command in &commands {
            let a = first.execute(command);
            let b = second.execute(command);
            prop_assert_eq!(a.is_ok(), b.is_ok());
            if let (Ok(a), Ok(b)) = (a, b) {
                prop_assert_eq!(a, b);
            }
        }
    }
}
