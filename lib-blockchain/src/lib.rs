//! Blockchain State Machine
//!
//! Deterministic application of blocks, transactions and operations to a
//! delegated proof-of-stake ledger, with undo-based fork resolution.
//!
//! # Layers
//!
//! ```text
//! protocol     wire types: assets, authorities, operations, blocks
//! storage      undoable tables, ledger objects, sled snapshots
//! evaluators   one handler per operation
//! economics    rewards, inflation, witness schedule, hardforks
//! execution    Chain: fork switching, block and transaction application
//! fork_db      reversible blocks;  block_log: irreversible blocks
//! events       notifications to subscribed listeners
//! config       node and genesis configuration
//! ```

pub mod block_log;
pub mod config;
pub mod economics;
pub mod evaluators;
pub mod events;
pub mod execution;
pub mod fork_db;
pub mod protocol;
pub mod storage;

pub use block_log::{BlockLog, BlockLogError, BlockLogResult};
pub use config::{ChainConfig, CheckpointConfig, ConfigError, ConfigResult, GenesisConfig, SnapshotAccount};
pub use events::{ChainEvent, ChainEventListener, Notifier, RecordingListener};
pub use execution::{
    apply_block, apply_transaction, init_genesis, validate_invariants, ApplyContext, BlockApplyError,
    BlockApplyResult, Chain, ChainError, ChainResult, EvalError, EvalResult, SkipFlags, TxApplyError,
    TxApplyResult,
};
pub use fork_db::{ForkDatabase, ForkDbError, ForkDbResult, ForkItem, ForkItemRef};
pub use protocol::{
    AccountName, Asset, Authority, BlockId, ChainId, Operation, PublicKey, SignedBlock, SignedTransaction,
    TimePointSec, Transaction,
};
pub use storage::{ChainState, SnapshotStore, StorageError, StorageResult};
