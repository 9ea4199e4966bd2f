//! Chain Configuration
//!
//! Node-level settings and the genesis parameters, loaded from TOML. Every
//! field has a default, so an empty file is a valid configuration for a
//! single-witness test chain.
//!
//! ```toml
//! data_dir = "./data"
//! flush_interval = 10000
//! validate_invariants = false
//!
//! [genesis]
//! initial_supply = 10000000000
//! genesis_time = 1600000000
//! init_witness_public_key = "b5..."
//! hardfork_times = [1600000000, 1600000000]
//!
//! [[checkpoints]]
//! block_num = 1
//! block_id = "00000001..."
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fork_db::DEFAULT_FORK_DB_MAX_SIZE;
use crate::protocol::constants::MAX_UNDO_HISTORY;
use crate::protocol::{Authority, BlockId, ChainId, HardforkSchedule, PublicKey, TimePointSec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_flush_interval() -> u32 {
    10_000
}

fn default_max_undo_history() -> u32 {
    MAX_UNDO_HISTORY
}

fn default_fork_db_max_size() -> u32 {
    DEFAULT_FORK_DB_MAX_SIZE
}

// =============================================================================
// CHAIN CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Blocks between ledger snapshot flushes, on average. 0 disables.
    #[serde(default = "default_flush_interval")]
    pub flush_interval: u32,

    /// Reversible blocks kept before the chain refuses to extend.
    #[serde(default = "default_max_undo_history")]
    pub max_undo_history: u32,

    #[serde(default = "default_fork_db_max_size")]
    pub fork_db_max_size: u32,

    /// Run the full supply audit after every block.
    #[serde(default)]
    pub validate_invariants: bool,

    #[serde(default)]
    pub checkpoints: Vec<CheckpointConfig>,

    #[serde(default)]
    pub genesis: GenesisConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            flush_interval: default_flush_interval(),
            max_undo_history: default_max_undo_history(),
            fork_db_max_size: default_fork_db_max_size(),
            validate_invariants: false,
            checkpoints: Vec::new(),
            genesis: GenesisConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: ChainConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_flush_interval(mut self, interval: u32) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_validate_invariants(mut self, enabled: bool) -> Self {
        self.validate_invariants = enabled;
        self
    }

    pub fn with_genesis(mut self, genesis: GenesisConfig) -> Self {
        self.genesis = genesis;
        self
    }

    pub fn with_checkpoint(mut self, block_num: u32, block_id: BlockId) -> Self {
        self.checkpoints.push(CheckpointConfig {
            block_num,
            block_id: block_id.to_string(),
        });
        self
    }

    /// Checks every field that is parsed lazily.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_undo_history == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_undo_history",
                reason: "must be positive".into(),
            });
        }
        self.checkpoint_map()?;
        self.genesis.validate()
    }

    pub fn checkpoint_map(&self) -> ConfigResult<BTreeMap<u32, BlockId>> {
        self.checkpoints
            .iter()
            .map(|cp| {
                let id = cp.block_id.parse::<BlockId>().map_err(|e| ConfigError::InvalidField {
                    field: "checkpoints.block_id",
                    reason: e.to_string(),
                })?;
                Ok((cp.block_num, id))
            })
            .collect()
    }

    pub fn block_log_dir(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub block_num: u32,
    pub block_id: String,
}

// =============================================================================
// GENESIS
// =============================================================================

fn default_initial_supply() -> i64 {
    10_000_000_000
}

fn default_genesis_time() -> u32 {
    1_600_000_000
}

fn default_init_post_reward_balance() -> i64 {
    0
}

fn default_chain_id() -> String {
    "testnet".to_string()
}

/// Deterministic initial ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_initial_supply")]
    pub initial_supply: i64,

    #[serde(default = "default_genesis_time")]
    pub genesis_time: u32,

    /// Hex ed25519 key for the initial witnesses and reserved accounts.
    #[serde(default)]
    pub init_witness_public_key: String,

    #[serde(default = "default_init_post_reward_balance")]
    pub init_post_reward_balance: i64,

    /// Seed the chain id is derived from.
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    /// Activation time of hardfork `i + 1`. Missing entries never activate.
    #[serde(default)]
    pub hardfork_times: Vec<u32>,

    #[serde(default)]
    pub snapshot_accounts: Vec<SnapshotAccount>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            initial_supply: default_initial_supply(),
            genesis_time: default_genesis_time(),
            init_witness_public_key: String::new(),
            init_post_reward_balance: default_init_post_reward_balance(),
            chain_id: default_chain_id(),
            hardfork_times: Vec::new(),
            snapshot_accounts: Vec::new(),
        }
    }
}

impl GenesisConfig {
    pub fn with_init_witness_key(mut self, key: PublicKey) -> Self {
        self.init_witness_public_key = key.to_string();
        self
    }

    pub fn with_initial_supply(mut self, supply: i64) -> Self {
        self.initial_supply = supply;
        self
    }

    pub fn with_genesis_time(mut self, time: u32) -> Self {
        self.genesis_time = time;
        self
    }

    pub fn with_hardfork_times(mut self, times: Vec<u32>) -> Self {
        self.hardfork_times = times;
        self
    }

    pub fn with_snapshot_account(mut self, account: SnapshotAccount) -> Self {
        self.snapshot_accounts.push(account);
        self
    }

    pub fn genesis_time(&self) -> TimePointSec {
        TimePointSec(self.genesis_time)
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId::from_seed(&self.chain_id)
    }

    pub fn hardfork_schedule(&self) -> HardforkSchedule {
        HardforkSchedule::new(self.genesis_time(), &self.hardfork_times)
    }

    /// The configured key, or the null key when none is set.
    pub fn init_witness_key(&self) -> ConfigResult<PublicKey> {
        if self.init_witness_public_key.is_empty() {
            return Ok(PublicKey::NULL);
        }
        parse_key("genesis.init_witness_public_key", &self.init_witness_public_key)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_supply < 0 {
            return Err(ConfigError::InvalidField {
                field: "genesis.initial_supply",
                reason: "cannot be negative".into(),
            });
        }
        if self.init_post_reward_balance < 0 || self.init_post_reward_balance > self.initial_supply {
            return Err(ConfigError::InvalidField {
                field: "genesis.init_post_reward_balance",
                reason: "must be between 0 and the initial supply".into(),
            });
        }
        let mut last = self.genesis_time;
        for t in &self.hardfork_times {
            if *t < last {
                return Err(ConfigError::InvalidField {
                    field: "genesis.hardfork_times",
                    reason: "activation times must not decrease".into(),
                });
            }
            last = *t;
        }
        self.init_witness_key()?;
        let imported: i64 = self
            .snapshot_accounts
            .iter()
            .map(|a| a.balance.saturating_add(a.power))
            .sum();
        if imported > self.initial_supply - self.init_post_reward_balance {
            return Err(ConfigError::InvalidField {
                field: "genesis.snapshot_accounts",
                reason: format!("imported {imported} exceeds the initial miner balance"),
            });
        }
        for account in &self.snapshot_accounts {
            account.parsed()?;
        }
        Ok(())
    }
}

/// An account imported at genesis. Keys are hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAccount {
    pub name: String,
    pub owner_key: String,
    pub active_key: String,
    pub posting_key: String,
    pub memo_key: String,
    #[serde(default)]
    pub balance: i64,
    /// Liquid value converted to vesting shares at genesis.
    #[serde(default)]
    pub power: i64,
}

/// `SnapshotAccount` with its keys parsed into authorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSnapshotAccount {
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: PublicKey,
    pub balance: i64,
    pub power: i64,
}

impl SnapshotAccount {
    pub fn parsed(&self) -> ConfigResult<ParsedSnapshotAccount> {
        if !crate::protocol::AccountName::is_valid(&self.name) {
            return Err(ConfigError::InvalidField {
                field: "snapshot_accounts.name",
                reason: format!("'{}' is not a valid account name", self.name),
            });
        }
        if self.balance < 0 || self.power < 0 {
            return Err(ConfigError::InvalidField {
                field: "snapshot_accounts",
                reason: format!("negative balance for {}", self.name),
            });
        }
        Ok(ParsedSnapshotAccount {
            name: self.name.clone(),
            owner: Authority::from_key(parse_key("snapshot_accounts.owner_key", &self.owner_key)?),
            active: Authority::from_key(parse_key("snapshot_accounts.active_key", &self.active_key)?),
            posting: Authority::from_key(parse_key("snapshot_accounts.posting_key", &self.posting_key)?),
            memo_key: parse_key("snapshot_accounts.memo_key", &self.memo_key)?,
            balance: self.balance,
            power: self.power,
        })
    }
}

fn parse_key(field: &'static str, raw: &str) -> ConfigResult<PublicKey> {
    raw.parse::<PublicKey>().map_err(|e| ConfigError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ChainConfig::from_toml_str("").unwrap();
        assert_eq!(config, ChainConfig::default());
        assert_eq!(config.max_undo_history, MAX_UNDO_HISTORY);
        assert_eq!(config.genesis.init_witness_key().unwrap(), PublicKey::NULL);
    }

    #[test]
    fn test_parses_genesis_and_checkpoints() {
        let key = PublicKey([7u8; 32]);
        let id = BlockId::from_digest(&[1u8; 32], 1);
        let raw = format!(
            r#"
            flush_interval = 0
            validate_invariants = true

            [genesis]
            initial_supply = 5000
            genesis_time = 100
            init_witness_public_key = "{key}"
            hardfork_times = [100, 200]

            [[checkpoints]]
            block_num = 1
            block_id = "{id}"
            "#
        );
        let config = ChainConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config.flush_interval, 0);
        assert!(config.validate_invariants);
        assert_eq!(config.genesis.init_witness_key().unwrap(), key);
        assert_eq!(config.genesis.hardfork_schedule().time(2), TimePointSec(200));
        assert_eq!(config.checkpoint_map().unwrap().get(&1), Some(&id));
    }

    #[test]
    fn test_rejects_decreasing_hardfork_times() {
        let raw = "[genesis]\ngenesis_time = 100\nhardfork_times = [300, 200]\n";
        assert!(matches!(
            ChainConfig::from_toml_str(raw),
            Err(ConfigError::InvalidField { field: "genesis.hardfork_times", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_key() {
        let raw = "[genesis]\ninit_witness_public_key = \"zz\"\n";
        assert!(ChainConfig::from_toml_str(raw).is_err());
    }
}
