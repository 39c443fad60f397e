//! Configuration for the market node

use crate::exchange::Genesis;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use token_ledger::{AccountId, Amount};

/// Market node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger identity of the marketplace (the spender buyers approve)
    pub market_account: String,

    /// Token configuration
    pub token: TokenConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/market"),
            service_name: "data-market".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            market_account: "data-market".to_string(),
            token: TokenConfig::default(),
            rocksdb: RocksDBConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token name
    pub name: String,

    /// Ticker symbol
    pub symbol: String,

    /// Decimal places of one whole token
    pub decimals: u8,

    /// Supply in whole tokens, minted to `minter`
    pub initial_supply: u64,

    /// Identity the supply is minted to
    pub minter: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "ProLongToken".to_string(),
            symbol: "PLT".to_string(),
            decimals: 18,
            initial_supply: 1_000_000,
            minter: "deployer".to_string(),
        }
    }
}

impl TokenConfig {
    /// Total supply in base units
    pub fn total_supply(&self) -> crate::Result<Amount> {
        10u128
            .checked_pow(u32::from(self.decimals))
            .and_then(|unit| unit.checked_mul(Amount::from(self.initial_supply)))
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "supply of {} with {} decimals overflows",
                    self.initial_supply, self.decimals
                ))
            })
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync the WAL on every journal append
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Mailbox capacity (requests queued before callers wait)
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("DATA_MARKET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(account) = std::env::var("DATA_MARKET_ACCOUNT") {
            config.market_account = account;
        }

        if let Ok(minter) = std::env::var("DATA_MARKET_MINTER") {
            config.token.minter = minter;
        }

        if let Ok(supply) = std::env::var("DATA_MARKET_INITIAL_SUPPLY") {
            config.token.initial_supply = supply.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid DATA_MARKET_INITIAL_SUPPLY: {}", e))
            })?;
        }

        Ok(config)
    }

    /// Genesis parameters derived from this configuration
    pub fn genesis(&self) -> crate::Result<Genesis> {
        if self.market_account == self.token.minter {
            return Err(crate::Error::Config(
                "market account must differ from the minter".to_string(),
            ));
        }

        Ok(Genesis {
            minter: AccountId::new(self.token.minter.clone()),
            total_supply: self.token.total_supply()?,
            market_account: AccountId::new(self.market_account.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "data-market");
        assert_eq!(config.token.symbol, "PLT");
        assert_eq!(config.actor.mailbox_capacity, 1000);
    }

    #[test]
    fn test_total_supply_in_base_units() {
        let token = TokenConfig {
            decimals: 2,
            initial_supply: 5,
            ..Default::default()
        };
        assert_eq!(token.total_supply().unwrap(), 500);

        let huge = TokenConfig {
            decimals: 40,
            initial_supply: u64::MAX,
            ..Default::default()
        };
        assert!(huge.total_supply().is_err());
    }

    #[test]
    fn test_genesis() {
        let config = Config::default();
        let genesis = config.genesis().unwrap();
        assert_eq!(genesis.minter, AccountId::new("deployer"));
        assert_eq!(genesis.market_account, AccountId::new("data-market"));

        let mut clash = Config::default();
        clash.market_account = clash.token.minter.clone();
        assert!(clash.genesis().is_err());
    }

    #[test]
    fn test_from_toml() {
        let original = Config::default();
        let text = toml::to_string(&original).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.market_account, original.market_account);
        assert_eq!(parsed.token.initial_supply, original.token.initial_supply);
    }
}
