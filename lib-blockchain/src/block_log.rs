//! Append-only Block Log
//!
//! Irreversible blocks, in order, in two files under one directory.
//!
//! # File Format
//!
//! ```text
//! block_log:        [bincode(block 1)][u64 LE pos 1][bincode(block 2)][u64 LE pos 2]...
//! block_log.index:  [u64 LE pos 1][u64 LE pos 2]...
//! ```
//!
//! The trailing position after every block points back at its start, so
//! the head block can be found from the end of the data file alone. The
//! index is derived data: a missing or inconsistent index is rebuilt from
//! the data file on open.
//!
//! A crash during `append` can leave a torn record at the end of the data
//! file. `open` cuts the file back to the last complete record.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bincode::Options;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::SignedBlock;

const DATA_FILE: &str = "block_log";
const INDEX_FILE: &str = "block_log.index";
const POS_SIZE: u64 = 8;

#[derive(Debug, Error)]
pub enum BlockLogError {
    #[error("Block log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Block log serialization error: {0}")]
    Serialization(String),

    #[error("Block {actual} appended out of order, expected {expected}")]
    OutOfOrder { expected: u32, actual: u32 },

    #[error("Corrupt block log: {0}")]
    Corrupt(String),
}

pub type BlockLogResult<T> = Result<T, BlockLogError>;

struct Inner {
    data: File,
    index: File,
    head: Option<Arc<SignedBlock>>,
}

pub struct BlockLog {
    dir: PathBuf,
    inner: Mutex<Inner>,
    locking: bool,
}

impl std::fmt::Debug for BlockLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockLog")
            .field("dir", &self.dir)
            .field("locking", &self.locking)
            .finish_non_exhaustive()
    }
}

impl BlockLog {
    /// Opens or creates the log in `dir`, rebuilding the index if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> BlockLogResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let data = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(DATA_FILE))?;
        let index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.join(INDEX_FILE))?;

        let mut inner = Inner {
            data,
            index,
            head: None,
        };
        let head = match read_head(&mut inner.data) {
            Ok(head) => head,
            Err(err) => {
                warn!(error = %err, "block log tail unreadable, recovering");
                truncate_torn_tail(&mut inner)?;
                read_head(&mut inner.data)?
            }
        };
        inner.head = head.map(|(block, _)| Arc::new(block));

        let head_num = inner.head.as_ref().map(|b| b.block_num()).unwrap_or(0);
        if !index_consistent(&mut inner, head_num)? {
            warn!(head_num, "block log index inconsistent, rebuilding");
            rebuild_index(&mut inner)?;
        }
        info!(head_num, dir = %dir.display(), "block log opened");

        Ok(Self {
            dir,
            inner: Mutex::new(inner),
            locking: true,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// With locking off, `append` and `flush` skip the mutex. Used for
    /// replay, where the log has a single owner.
    pub fn set_locking(&mut self, locking: bool) {
        self.locking = locking;
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner.get_mut()
    }

    /// Appends the next block and returns its position.
    pub fn append(&mut self, block: &SignedBlock) -> BlockLogResult<u64> {
        if self.locking {
            let mut guard = self.inner.lock();
            append_inner(&mut guard, block)
        } else {
            append_inner(self.inner_mut(), block)
        }
    }

    pub fn flush(&mut self) -> BlockLogResult<()> {
        let flush = |inner: &mut Inner| -> BlockLogResult<()> {
            inner.data.flush()?;
            inner.index.flush()?;
            inner.data.sync_data()?;
            inner.index.sync_data()?;
            Ok(())
        };
        if self.locking {
            flush(&mut self.inner.lock())
        } else {
            flush(self.inner_mut())
        }
    }

    pub fn head(&self) -> Option<Arc<SignedBlock>> {
        self.inner.lock().head.clone()
    }

    pub fn head_block_num(&self) -> u32 {
        self.head().map(|b| b.block_num()).unwrap_or(0)
    }

    /// Reads the block at `pos` and returns it with the next block's position.
    pub fn read_block(&self, pos: u64) -> BlockLogResult<(SignedBlock, u64)> {
        let mut inner = self.inner.lock();
        read_block_at(&mut inner.data, pos)
    }

    pub fn read_block_by_num(&self, num: u32) -> BlockLogResult<Option<SignedBlock>> {
        let mut inner = self.inner.lock();
        let head_num = inner.head.as_ref().map(|b| b.block_num()).unwrap_or(0);
        if num == 0 || num > head_num {
            return Ok(None);
        }
        let pos = read_index_pos(&mut inner.index, num)?;
        let (block, _) = read_block_at(&mut inner.data, pos)?;
        if block.block_num() != num {
            return Err(BlockLogError::Corrupt(format!(
                "index for block {num} points at block {}",
                block.block_num()
            )));
        }
        Ok(Some(block))
    }
}

// =============================================================================
// FILE HELPERS
// =============================================================================

fn append_inner(inner: &mut Inner, block: &SignedBlock) -> BlockLogResult<u64> {
    let expected = inner.head.as_ref().map(|b| b.block_num()).unwrap_or(0) + 1;
    if block.block_num() != expected {
        return Err(BlockLogError::OutOfOrder {
            expected,
            actual: block.block_num(),
        });
    }
    let bytes = bincode::serialize(block).map_err(|e| BlockLogError::Serialization(e.to_string()))?;
    let pos = inner.data.seek(SeekFrom::End(0))?;
    inner.data.write_all(&bytes)?;
    inner.data.write_all(&pos.to_le_bytes())?;

    inner
        .index
        .seek(SeekFrom::Start((expected as u64 - 1) * POS_SIZE))?;
    inner.index.write_all(&pos.to_le_bytes())?;

    inner.head = Some(Arc::new(block.clone()));
    Ok(pos)
}

fn read_block_at(data: &mut File, pos: u64) -> BlockLogResult<(SignedBlock, u64)> {
    // Bounded by the bytes left in the file so a garbage length prefix
    // fails instead of allocating.
    let remaining = data.metadata()?.len().saturating_sub(pos);
    data.seek(SeekFrom::Start(pos))?;
    let mut reader = BufReader::new(&mut *data);
    let block: SignedBlock = bincode::options()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(remaining)
        .deserialize_from(&mut reader)
        .map_err(|e| BlockLogError::Serialization(e.to_string()))?;
    let mut trailer = [0u8; POS_SIZE as usize];
    reader.read_exact(&mut trailer)?;
    if u64::from_le_bytes(trailer) != pos {
        return Err(BlockLogError::Corrupt(format!(
            "block at {pos} has trailing position {}",
            u64::from_le_bytes(trailer)
        )));
    }
    let next = reader.stream_position()?;
    Ok((block, next))
}

fn read_head(data: &mut File) -> BlockLogResult<Option<(SignedBlock, u64)>> {
    let len = data.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(None);
    }
    if len < POS_SIZE {
        return Err(BlockLogError::Corrupt(format!("data file is {len} bytes")));
    }
    data.seek(SeekFrom::End(-(POS_SIZE as i64)))?;
    let mut raw = [0u8; POS_SIZE as usize];
    data.read_exact(&mut raw)?;
    let pos = u64::from_le_bytes(raw);
    let (block, _) = read_block_at(data, pos)?;
    Ok(Some((block, pos)))
}

/// Cuts the data file back to the end of its last complete record.
///
/// The scan starts at the newest index entry that still points at a
/// readable record, or at the start of the file. Returns the new length.
fn truncate_torn_tail(inner: &mut Inner) -> BlockLogResult<u64> {
    let end = inner.data.seek(SeekFrom::End(0))?;
    let mut pos = last_readable_index_pos(inner, end)?;
    while pos < end {
        match read_block_at(&mut inner.data, pos) {
            Ok((_, next)) => pos = next,
            Err(_) => break,
        }
    }
    if pos < end {
        warn!(valid_len = pos, dropped = end - pos, "truncating torn block log tail");
        inner.data.set_len(pos)?;
        inner.data.sync_data()?;
    }
    Ok(pos)
}

fn last_readable_index_pos(inner: &mut Inner, end: u64) -> BlockLogResult<u64> {
    let entries = inner.index.seek(SeekFrom::End(0))? / POS_SIZE;
    for num in (1..=entries).rev() {
        let pos = read_index_pos(&mut inner.index, num as u32)?;
        if pos < end && read_block_at(&mut inner.data, pos).is_ok() {
            return Ok(pos);
        }
    }
    Ok(0)
}

fn read_index_pos(index: &mut File, num: u32) -> BlockLogResult<u64> {
    index.seek(SeekFrom::Start((num as u64 - 1) * POS_SIZE))?;
    let mut raw = [0u8; POS_SIZE as usize];
    index.read_exact(&mut raw)?;
    Ok(u64::from_le_bytes(raw))
}

fn index_consistent(inner: &mut Inner, head_num: u32) -> BlockLogResult<bool> {
    let len = inner.index.seek(SeekFrom::End(0))?;
    if len != head_num as u64 * POS_SIZE {
        return Ok(false);
    }
    if head_num == 0 {
        return Ok(true);
    }
    let (_, head_pos) = match read_head(&mut inner.data)? {
        Some(head) => head,
        None => return Ok(false),
    };
    Ok(read_index_pos(&mut inner.index, head_num)? == head_pos)
}

fn rebuild_index(inner: &mut Inner) -> BlockLogResult<()> {
    inner.index.set_len(0)?;
    inner.index.seek(SeekFrom::Start(0))?;
    let end = inner.data.seek(SeekFrom::End(0))?;
    let mut pos = 0;
    let mut count = 0u32;
    while pos < end {
        let (_, next) = read_block_at(&mut inner.data, pos)?;
        inner.index.write_all(&pos.to_le_bytes())?;
        pos = next;
        count += 1;
    }
    inner.index.flush()?;
    info!(blocks = count, "block log index rebuilt");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TimePointSec;

    fn chain_of(n: u32) -> Vec<SignedBlock> {
        let mut blocks: Vec<SignedBlock> = Vec::new();
        for i in 0..n {
            let mut b = SignedBlock::default();
            if let Some(prev) = blocks.last() {
                b.signed_header.header.previous = prev.id();
            }
            b.signed_header.header.timestamp = TimePointSec(100 + i * 3);
            blocks.push(b);
        }
        blocks
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = BlockLog::open(dir.path()).unwrap();
        let blocks = chain_of(3);
        for b in &blocks {
            log.append(b).unwrap();
        }
        assert_eq!(log.head_block_num(), 3);
        assert_eq!(log.read_block_by_num(2).unwrap().unwrap(), blocks[1]);
        assert!(log.read_block_by_num(4).unwrap().is_none());

        let (first, next) = log.read_block(0).unwrap();
        assert_eq!(first, blocks[0]);
        let (second, _) = log.read_block(next).unwrap();
        assert_eq!(second, blocks[1]);
    }

    #[test]
    fn test_rejects_out_of_order_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = BlockLog::open(dir.path()).unwrap();
        let blocks = chain_of(2);
        assert!(matches!(
            log.append(&blocks[1]),
            Err(BlockLogError::OutOfOrder { expected: 1, actual: 2 })
        ));
    }

    fn write_log(dir: &Path, blocks: &[SignedBlock]) {
        let mut log = BlockLog::open(dir).unwrap();
        for b in blocks {
            log.append(b).unwrap();
        }
        log.flush().unwrap();
    }

    #[test]
    fn test_reopen_drops_garbage_after_last_record() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = chain_of(4);
        write_log(dir.path(), &blocks[..3]);
        let clean_len = fs::metadata(dir.path().join(DATA_FILE)).unwrap().len();

        let mut data = OpenOptions::new().append(true).open(dir.path().join(DATA_FILE)).unwrap();
        data.write_all(&[1, 2, 3, 4, 5, 6, 7]).unwrap();
        drop(data);

        let mut log = BlockLog::open(dir.path()).unwrap();
        assert_eq!(log.head_block_num(), 3, "complete records survive");
        assert_eq!(fs::metadata(dir.path().join(DATA_FILE)).unwrap().len(), clean_len);
        assert_eq!(log.read_block_by_num(3).unwrap().unwrap(), blocks[2]);

        log.append(&blocks[3]).unwrap();
        log.flush().unwrap();
        drop(log);
        let log = BlockLog::open(dir.path()).unwrap();
        assert_eq!(log.head().unwrap().as_ref(), &blocks[3]);
    }

    #[test]
    fn test_reopen_drops_half_written_record() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = chain_of(3);
        write_log(dir.path(), &blocks);

        let path = dir.path().join(DATA_FILE);
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 5).unwrap();

        let log = BlockLog::open(dir.path()).unwrap();
        assert_eq!(log.head().unwrap().as_ref(), &blocks[1], "torn block 3 is dropped");
        assert_eq!(log.read_block_by_num(2).unwrap().unwrap(), blocks[1]);
        assert!(log.read_block_by_num(3).unwrap().is_none());
    }

    #[test]
    fn test_reopen_rebuilds_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = chain_of(4);
        {
            let mut log = BlockLog::open(dir.path()).unwrap();
            log.set_locking(false);
            for b in &blocks {
                log.append(b).unwrap();
            }
            log.flush().unwrap();
        }
        fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();

        let log = BlockLog::open(dir.path()).unwrap();
        assert_eq!(log.head().unwrap().as_ref(), &blocks[3]);
        assert_eq!(log.read_block_by_num(3).unwrap().unwrap(), blocks[2]);
    }
}
