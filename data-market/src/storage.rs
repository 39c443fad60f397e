//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `meta` - Genesis parameters (key: `genesis`)
//! - `journal` - Append-only command journal (key: sequence, big-endian)
//!
//! Balances, allowances, listings and indexes are not stored directly; they
//! are rebuilt by replaying the journal from genesis.

use crate::{
    error::{Error, Result},
    exchange::Genesis,
    types::JournalEntry,
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};

/// Column family names
const CF_META: &str = "meta";
const CF_JOURNAL: &str = "journal";

/// Meta keys
const KEY_GENESIS: &[u8] = b"genesis";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_JOURNAL, Self::cf_options_journal()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB journal");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options_journal() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Genesis

    /// Genesis the journal was started from, if any
    pub fn load_genesis(&self) -> Result<Option<Genesis>> {
        let cf = self.cf_handle(CF_META)?;

        match self.db.get_cf(cf, KEY_GENESIS)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Record genesis parameters
    pub fn put_genesis(&self, genesis: &Genesis) -> Result<()> {
        let cf = self.cf_handle(CF_META)?;
        let value = bincode::serialize(genesis)?;

        self.db.put_cf_opt(cf, KEY_GENESIS, value, &self.write_options())?;

        tracing::info!(
            minter = %genesis.minter,
            market_account = %genesis.market_account,
            total_supply = %genesis.total_supply,
            "Genesis recorded"
        );

        Ok(())
    }

    // Journal

    /// Append a committed entry
    ///
    /// Refuses to overwrite an existing sequence number.
    pub fn append_entry(&self, entry: &JournalEntry) -> Result<()> {
        let cf = self.cf_handle(CF_JOURNAL)?;
        let key = entry.sequence.to_be_bytes();

        if self.db.get_pinned_cf(cf, key)?.is_some() {
            return Err(Error::Storage(format!(
                "Journal entry {} already exists",
                entry.sequence
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf, key, bincode::serialize(entry)?);
        self.db.write_opt(batch, &self.write_options())?;

        tracing::debug!(
            sequence = entry.sequence,
            entry_id = %entry.entry_id,
            command = entry.command.name(),
            "Journal entry appended"
        );

        Ok(())
    }

    /// Entry by sequence number
    pub fn get_entry(&self, sequence: u64) -> Result<Option<JournalEntry>> {
        let cf = self.cf_handle(CF_JOURNAL)?;

        match self.db.get_cf(cf, sequence.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Last entry of the journal
    pub fn latest_entry(&self) -> Result<Option<JournalEntry>> {
        let cf = self.cf_handle(CF_JOURNAL)?;

        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(bincode::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Visit entries in sequence order, starting at `from`
    pub fn scan_from<F>(&self, from: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(JournalEntry) -> Result<()>,
    {
        let cf = self.cf_handle(CF_JOURNAL)?;
        let start = from.to_be_bytes();

        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start[..], Direction::Forward))
        {
            let (_, value) = item?;
            visit(bincode::deserialize(&value)?)?;
        }

        Ok(())
    }

    /// Entries in sequence order, starting at `from`
    pub fn entries_from(&self, from: u64) -> Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        self.scan_from(from, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok(entries)
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Command, Fingerprint};
    use chrono::Utc;
    use tempfile::TempDir;
    use token_ledger::AccountId;
    use uuid::Uuid;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    fn test_entry(sequence: u64) -> JournalEntry {
        JournalEntry {
            entry_id: Uuid::now_v7(),
            sequence,
            command: Command::RegisterListing {
                caller: AccountId::new("seller"),
                price: 100,
                fingerprint: Fingerprint::from_bytes([sequence as u8; 32]),
                description: format!("entry {}", sequence),
            },
            events: vec![],
            committed_at: Utc::now(),
            previous_hash: [0u8; 32],
            entry_hash: [0u8; 32],
            signature: None,
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_META).is_some());
        assert!(storage.db.cf_handle(CF_JOURNAL).is_some());
        assert!(storage.latest_entry().unwrap().is_none());
    }

    #[test]
    fn test_genesis_roundtrip() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.load_genesis().unwrap().is_none());

        let genesis = config.genesis().unwrap();
        storage.put_genesis(&genesis).unwrap();
        assert_eq!(storage.load_genesis().unwrap(), Some(genesis));
    }

    #[test]
    fn test_append_and_scan() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        // Past 255 to check keys sort numerically
        for sequence in 0..300 {
            storage.append_entry(&test_entry(sequence)).unwrap();
        }

        let tail = storage.entries_from(250).unwrap();
        assert_eq!(tail.len(), 50);
        assert_eq!(tail[0].sequence, 250);
        assert_eq!(storage.latest_entry().unwrap().unwrap().sequence, 299);
        assert_eq!(storage.get_entry(7).unwrap().unwrap().sequence, 7);
        assert!(storage.get_entry(300).unwrap().is_none());
    }

    #[test]
    fn test_append_refuses_overwrite() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.append_entry(&test_entry(0)).unwrap();
        assert!(matches!(
            storage.append_entry(&test_entry(0)),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_reopen_keeps_journal() {
        let (config, _temp) = test_config();
        {
            let storage = Storage::open(&config).unwrap();
            storage.append_entry(&test_entry(0)).unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.entries_from(0).unwrap().len(), 1);
    }
}
