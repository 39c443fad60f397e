//! Hash-chained command journal
//!
//! Each committed command becomes a [`JournalEntry`] whose hash covers the
//! previous entry's hash, so truncation in the middle, reordering or edits
//! are detected on replay.
//!
//! ```text
//! genesis ─▶ [0: h0, prev=0] ─▶ [1: h1, prev=h0] ─▶ [2: h2, prev=h1] ─▶ …
//! ```
//!
//! Replay re-executes every command from the genesis state and requires it
//! to succeed with exactly the recorded events.

use crate::{
    crypto::KeyPair,
    exchange::{Exchange, Genesis},
    storage::Storage,
    types::{Command, JournalEntry, Receipt},
    Error, Result,
};
use chrono::Utc;
use uuid::Uuid;

/// Position of the next append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHead {
    /// Sequence number the next entry gets
    pub next_sequence: u64,
    /// Hash of the last entry (zero when empty)
    pub last_hash: [u8; 32],
}

impl JournalHead {
    /// Head of an empty journal
    pub fn empty() -> Self {
        Self {
            next_sequence: 0,
            last_hash: [0u8; 32],
        }
    }
}

/// Build the next entry for a command that was just applied
pub fn seal_entry(
    head: &JournalHead,
    command: Command,
    receipt: &Receipt,
    keypair: Option<&KeyPair>,
) -> Result<JournalEntry> {
    let mut entry = JournalEntry {
        entry_id: Uuid::now_v7(),
        sequence: head.next_sequence,
        command,
        events: receipt.events.clone(),
        committed_at: Utc::now(),
        previous_hash: head.last_hash,
        entry_hash: [0u8; 32],
        signature: None,
    };

    entry.entry_hash = entry.compute_hash()?;

    if let Some(keypair) = keypair {
        entry.signature = Some(keypair.sign(&entry.entry_hash));
    }

    Ok(entry)
}

/// Rebuild exchange state from genesis and the stored journal
pub fn replay(storage: &Storage, genesis: &Genesis) -> Result<(Exchange, JournalHead)> {
    replay_verified(storage, genesis, None)
}

/// Replay, additionally requiring every entry to be signed by `public_key`
pub fn replay_verified(
    storage: &Storage,
    genesis: &Genesis,
    public_key: Option<&[u8; 32]>,
) -> Result<(Exchange, JournalHead)> {
    let mut exchange = Exchange::new(genesis);
    let mut head = JournalHead::empty();

    storage.scan_from(0, |entry| {
        check_link(&entry, &head)?;

        if let Some(key) = public_key {
            if !entry.verify_signature(key) {
                return Err(Error::SignatureError(format!(
                    "entry {} is not signed by the journal key",
                    entry.sequence
                )));
            }
        }

        let receipt = exchange.execute(&entry.command).map_err(|e| {
            Error::JournalCorrupted(format!(
                "entry {} ({}) no longer applies: {}",
                entry.sequence,
                entry.command.name(),
                e
            ))
        })?;

        if receipt.events != entry.events {
            return Err(Error::JournalCorrupted(format!(
                "entry {} replays to different events",
                entry.sequence
            )));
        }

        head = JournalHead {
            next_sequence: entry.sequence + 1,
            last_hash: entry.entry_hash,
        };
        Ok(())
    })?;

    exchange
        .ledger()
        .check_conservation()
        .map_err(supply_not_conserved)?;

    tracing::info!(
        entries = head.next_sequence,
        listings = exchange.market().listing_count(),
        "Journal replayed"
    );

    Ok((exchange, head))
}

fn supply_not_conserved(e: token_ledger::Error) -> Error {
    Error::JournalCorrupted(format!("replayed state breaks supply conservation: {}", e))
}

fn check_link(entry: &JournalEntry, head: &JournalHead) -> Result<()> {
    if entry.sequence != head.next_sequence {
        return Err(Error::JournalCorrupted(format!(
            "expected entry {}, found {}",
            head.next_sequence, entry.sequence
        )));
    }

    if entry.previous_hash != head.last_hash {
        return Err(Error::JournalCorrupted(format!(
            "entry {} does not link to its predecessor",
            entry.sequence
        )));
    }

    if entry.compute_hash()? != entry.entry_hash {
        return Err(Error::JournalCorrupted(format!(
            "entry {} hash mismatch",
            entry.sequence
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Fingerprint;
    use crate::Config;
    use tempfile::TempDir;
    use token_ledger::AccountId;

    fn setup() -> (Storage, Genesis, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;

        let storage = Storage::open(&config).unwrap();
        let genesis = config.genesis().unwrap();
        (storage, genesis, temp_dir)
    }

    fn commit(
        exchange: &mut Exchange,
        head: &mut JournalHead,
        storage: &Storage,
        command: Command,
        keypair: Option<&KeyPair>,
    ) {
        let receipt = exchange.execute(&command).unwrap();
        let entry = seal_entry(head, command, &receipt, keypair).unwrap();
        storage.append_entry(&entry).unwrap();
        *head = JournalHead {
            next_sequence: entry.sequence + 1,
            last_hash: entry.entry_hash,
        };
    }

    fn listing(seller: &str, byte: u8) -> Command {
        Command::RegisterListing {
            caller: AccountId::new(seller),
            price: 100,
            fingerprint: Fingerprint::from_bytes([byte; 32]),
            description: format!("dataset {}", byte),
        }
    }

    #[test]
    fn test_replay_empty_journal() {
        let (storage, genesis, _temp) = setup();
        let (exchange, head) = replay(&storage, &genesis).unwrap();

        assert_eq!(head, JournalHead::empty());
        assert_eq!(exchange.ledger().balance_of(&genesis.minter), genesis.total_supply);
    }

    #[test]
    fn test_replay_rebuilds_state() {
        let (storage, genesis, _temp) = setup();
        let mut exchange = Exchange::new(&genesis);
        let mut head = JournalHead::empty();

        commit(&mut exchange, &mut head, &storage, listing("seller", 1), None);
        commit(&mut exchange, &mut head, &storage, listing("seller", 2), None);
        commit(
            &mut exchange,
            &mut head,
            &storage,
            Command::Transfer {
                caller: genesis.minter.clone(),
                to: AccountId::new("buyer"),
                amount: 500,
            },
            None,
        );

        let (replayed, replayed_head) = replay(&storage, &genesis).unwrap();
        assert_eq!(replayed_head, head);
        assert_eq!(replayed.market().listing_count(), 2);
        assert_eq!(replayed.ledger().balance_of(&AccountId::new("buyer")), 500);
    }

    #[test]
    fn test_replay_detects_broken_chain() {
        let (storage, genesis, _temp) = setup();
        let mut exchange = Exchange::new(&genesis);
        let mut head = JournalHead::empty();
        commit(&mut exchange, &mut head, &storage, listing("seller", 1), None);

        // Entry that does not link to its predecessor
        let command = listing("seller", 2);
        let receipt = exchange.execute(&command).unwrap();
        let wrong_head = JournalHead {
            next_sequence: 1,
            last_hash: [1u8; 32],
        };
        let forged = seal_entry(&wrong_head, command, &receipt, None).unwrap();
        storage.append_entry(&forged).unwrap();

        assert!(matches!(
            replay(&storage, &genesis),
            Err(Error::JournalCorrupted(_))
        ));
    }

    #[test]
    fn test_replay_detects_divergent_events() {
        let (storage, genesis, _temp) = setup();

        // Recorded events that the command cannot produce
        let mut other = Exchange::new(&genesis);
        let fake_receipt = other.execute(&listing("someone-else", 1)).unwrap();
        let entry =
            seal_entry(&JournalHead::empty(), listing("seller", 1), &fake_receipt, None).unwrap();
        storage.append_entry(&entry).unwrap();

        assert!(matches!(
            replay(&storage, &genesis),
            Err(Error::JournalCorrupted(_))
        ));
    }

    #[test]
    fn test_replay_verified_signatures() {
        let (storage, genesis, _temp) = setup();
        let keypair = KeyPair::from_seed(&[3u8; 32]);
        let mut exchange = Exchange::new(&genesis);
        let mut head = JournalHead::empty();

        commit(&mut exchange, &mut head, &storage, listing("seller", 1), Some(&keypair));

        assert!(replay_verified(&storage, &genesis, Some(&keypair.public_key())).is_ok());

        let stranger = KeyPair::from_seed(&[4u8; 32]);
        assert!(matches!(
            replay_verified(&storage, &genesis, Some(&stranger.public_key())),
            Err(Error::SignatureError(_))
        ));
    }

    #[test]
    fn test_supply_mismatch_is_corruption() {
        let err = supply_not_conserved(token_ledger::Error::InvariantViolation(
            "supply 1000 != balances 999".to_string(),
        ));

        assert!(matches!(err, Error::JournalCorrupted(_)));
        assert!(!err.is_rejection());
    }
}
