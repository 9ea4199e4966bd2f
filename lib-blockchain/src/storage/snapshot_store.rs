//! Sled-backed ledger snapshot.
//!
//! Holds one serialized `ChainState`, undo stack included, plus a little
//! metadata so a node can tell how far the snapshot got without decoding
//! the whole ledger.

use std::path::Path;

use sled::{Db, Tree};
use tracing::{debug, info};

use super::{ChainState, StorageError, StorageResult};

// =============================================================================
// TREE NAMES (FIXED - DO NOT CHANGE)
// =============================================================================

const TREE_LEDGER: &str = "ledger";
const TREE_META: &str = "meta";

const KEY_STATE: &[u8] = b"state";
const KEY_HEAD_BLOCK_NUM: &[u8] = b"head_block_num";
const KEY_REVISION: &[u8] = b"revision";

pub struct SnapshotStore {
    db: Db,
    ledger: Tree,
    meta: Tree,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").finish_non_exhaustive()
    }
}

fn db_err(e: sled::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

impl SnapshotStore {
    /// Open or create a snapshot store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path).map_err(db_err)?;
        Self::from_db(db)
    }

    /// Open a temporary in-memory store.
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(db_err)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let ledger = db.open_tree(TREE_LEDGER).map_err(db_err)?;
        let meta = db.open_tree(TREE_META).map_err(db_err)?;
        Ok(Self { db, ledger, meta })
    }

    /// Loads the stored ledger, if any.
    pub fn load(&self) -> StorageResult<Option<ChainState>> {
        match self.ledger.get(KEY_STATE).map_err(db_err)? {
            Some(bytes) => {
                let state: ChainState = bincode::deserialize(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                debug!(
                    head = state.head_block_num(),
                    revision = state.revision(),
                    "loaded ledger snapshot"
                );
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Replaces the stored ledger and flushes it to disk.
    pub fn save(&self, state: &ChainState) -> StorageResult<()> {
        let bytes =
            bincode::serialize(state).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.ledger.insert(KEY_STATE, bytes).map_err(db_err)?;
        self.meta
            .insert(KEY_HEAD_BLOCK_NUM, &state.head_block_num().to_be_bytes())
            .map_err(db_err)?;
        self.meta
            .insert(KEY_REVISION, &state.revision().to_be_bytes())
            .map_err(db_err)?;
        self.flush()?;
        info!(
            head = state.head_block_num(),
            undo_depth = state.undo_depth(),
            "ledger snapshot flushed"
        );
        Ok(())
    }

    /// Head block number of the stored ledger.
    pub fn head_block_num(&self) -> StorageResult<Option<u32>> {
        match self.meta.get(KEY_HEAD_BLOCK_NUM).map_err(db_err)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes.as_ref().try_into().map_err(|_| {
                    StorageError::Serialization("invalid head_block_num length".to_string())
                })?;
                Ok(Some(u32::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Removes the stored ledger.
    pub fn wipe(&self) -> StorageResult<()> {
        self.ledger.clear().map_err(db_err)?;
        self.meta.clear().map_err(db_err)?;
        self.flush()
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush().map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = SnapshotStore::open_temporary().unwrap();
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.head_block_num().unwrap(), None);
    }

    #[test]
    fn test_save_keeps_undo_stack() {
        let store = SnapshotStore::open_temporary().unwrap();
        let mut state = ChainState::new();
        state.begin_undo();
        state.globals.modify(|g| g.head_block_number = 1);

        store.save(&state).unwrap();
        let mut loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.undo_depth(), 1);
        assert_eq!(store.head_block_num().unwrap(), Some(1));

        loaded.undo_all();
        assert_eq!(loaded.head_block_num(), 0);
    }

    #[test]
    fn test_wipe_clears_state() {
        let store = SnapshotStore::open_temporary().unwrap();
        store.save(&ChainState::new()).unwrap();
        store.wipe().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
