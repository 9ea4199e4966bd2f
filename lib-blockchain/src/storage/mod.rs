//! Ledger Storage Layer
//!
//! Typed in-memory tables with ordered secondary indices, nested undo
//! sessions, and a sled-backed snapshot of the whole ledger.
//!
//! # Data Model Invariants
//!
//! 1. **All mutation goes through a table** - `insert`, `modify` and
//!    `remove` are the only writes, and each one records the previous row
//!    in the newest undo frame.
//!
//! 2. **Revisions nest** - every open undo session is one frame on every
//!    table. Frames are resolved newest first; resolving any other frame
//!    is an `UndoOrder` error.
//!
//! 3. **Undo is exact** - undoing a session restores rows, index entries
//!    and auto-increment counters to their values when it was opened.
//!
//! 4. **The snapshot is the whole state** - `SnapshotStore` persists
//!    `ChainState` including its open frames, so a reopened node can undo
//!    back to the last committed revision.
//!
//! # Design Principles
//!
//! - Index keys are protocol, see `keys.rs`
//! - Sweeps collect keys first and mutate second
//! - Storage errors carry the table name and the debug form of the key

pub mod chain_state;
pub mod keys;
pub mod objects;
pub mod snapshot_store;
pub mod table;

use thiserror::Error;

pub use chain_state::{ChainState, UndoSession};
pub use snapshot_store::SnapshotStore;
pub use table::{Record, Singleton, Table, UndoableTable};

// =============================================================================
// STORAGE ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("{table} not found: {key}")]
    NotFound { table: &'static str, key: String },

    #[error("{table} already exists: {key}")]
    Duplicate { table: &'static str, key: String },

    #[error("{table} primary key changed by modify: {key}")]
    KeyMutated { table: &'static str, key: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Undo session out of order: {0}")]
    UndoOrder(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
