//! Fork Database
//!
//! In-memory tree of recent blocks that are not yet irreversible. Every
//! pushed block must link to a known block; the head is the highest block
//! seen, so a longer fork takes over the head as soon as it is pushed.
//!
//! Blocks more than `max_size` below the head are pruned.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::{BlockId, SignedBlock};

pub const DEFAULT_FORK_DB_MAX_SIZE: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForkDbError {
    #[error("Block {num} ({id}) does not link to a known block")]
    Unlinkable { id: BlockId, num: u32 },

    #[error("Block {num} is too old for the fork database (head {head})")]
    TooOld { num: u32, head: u32 },

    #[error("Unknown block: {0}")]
    UnknownBlock(BlockId),

    #[error("No block to pop")]
    NoBlockToPop,

    #[error("Branches {0} and {1} have no common ancestor in the fork database")]
    NoCommonAncestor(BlockId, BlockId),
}

pub type ForkDbResult<T> = Result<T, ForkDbError>;

/// One block in the fork tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkItem {
    pub id: BlockId,
    pub num: u32,
    pub previous: BlockId,
    pub block: Arc<SignedBlock>,
}

impl ForkItem {
    pub fn new(block: SignedBlock) -> Self {
        Self {
            id: block.id(),
            num: block.block_num(),
            previous: block.previous(),
            block: Arc::new(block),
        }
    }
}

pub type ForkItemRef = Arc<ForkItem>;

/// Two chains back to their common ancestor, newest first. The last entry
/// of each side is the first block after the fork point.
pub type Branches = (Vec<ForkItemRef>, Vec<ForkItemRef>);

#[derive(Debug)]
pub struct ForkDatabase {
    items: HashMap<BlockId, ForkItemRef>,
    by_num: BTreeMap<u32, BTreeSet<BlockId>>,
    head: Option<ForkItemRef>,
    max_size: u32,
}

impl Default for ForkDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ForkDatabase {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            by_num: BTreeMap::new(),
            head: None,
            max_size: DEFAULT_FORK_DB_MAX_SIZE,
        }
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.by_num.clear();
        self.head = None;
    }

    pub fn set_max_size(&mut self, max_size: u32) {
        self.max_size = max_size.max(1);
        self.prune();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn head(&self) -> Option<ForkItemRef> {
        self.head.clone()
    }

    /// Seeds the database with a block whose parent is not tracked.
    pub fn start_block(&mut self, block: SignedBlock) -> ForkItemRef {
        let item = Arc::new(ForkItem::new(block));
        self.insert(item.clone());
        self.head = Some(item.clone());
        item
    }

    /// Adds a block and returns the (possibly new) head.
    pub fn push_block(&mut self, block: SignedBlock) -> ForkDbResult<ForkItemRef> {
        let item = Arc::new(ForkItem::new(block));
        if let Some(head) = &self.head {
            let floor = head.num.saturating_sub(self.max_size);
            if item.num <= floor {
                return Err(ForkDbError::TooOld {
                    num: item.num,
                    head: head.num,
                });
            }
            if !self.items.contains_key(&item.previous) {
                warn!(
                    block_num = item.num,
                    id = %item.id,
                    head = head.num,
                    "pushed block does not link to the fork database"
                );
                return Err(ForkDbError::Unlinkable {
                    id: item.id,
                    num: item.num,
                });
            }
        }

        self.insert(item.clone());
        let new_head = match &self.head {
            Some(head) => item.num > head.num,
            None => true,
        };
        if new_head {
            self.head = Some(item);
            self.prune();
        }
        self.head.clone().ok_or(ForkDbError::NoBlockToPop)
    }

    pub fn set_head(&mut self, item: ForkItemRef) {
        self.head = Some(item);
    }

    /// Moves the head to its parent. The popped block stays known.
    pub fn pop_block(&mut self) -> ForkDbResult<ForkItemRef> {
        let head = self.head.clone().ok_or(ForkDbError::NoBlockToPop)?;
        let prev = self
            .items
            .get(&head.previous)
            .cloned()
            .ok_or(ForkDbError::NoBlockToPop)?;
        self.head = Some(prev);
        Ok(head)
    }

    /// Removes one block. Descendants are left for `remove_branch`.
    pub fn remove(&mut self, id: &BlockId) {
        if let Some(item) = self.items.remove(id) {
            if let Some(ids) = self.by_num.get_mut(&item.num) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_num.remove(&item.num);
                }
            }
        }
    }

    /// Removes a block and every known descendant of it.
    pub fn remove_branch(&mut self, id: &BlockId) {
        let mut doomed = vec![*id];
        while let Some(current) = doomed.pop() {
            let Some(item) = self.items.get(&current).cloned() else {
                continue;
            };
            if let Some(children) = self.by_num.get(&(item.num + 1)) {
                for child in children {
                    if self.items.get(child).map(|c| c.previous) == Some(current) {
                        doomed.push(*child);
                    }
                }
            }
            self.remove(&current);
        }
    }

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.items.contains_key(id)
    }

    pub fn fetch_block(&self, id: &BlockId) -> Option<ForkItemRef> {
        self.items.get(id).cloned()
    }

    pub fn fetch_block_by_number(&self, num: u32) -> Vec<ForkItemRef> {
        self.by_num
            .get(&num)
            .map(|ids| ids.iter().filter_map(|id| self.items.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Follows parent links from the head down to `num`.
    pub fn walk_main_branch_to_num(&self, num: u32) -> Option<ForkItemRef> {
        let mut next = self.head.clone()?;
        if num > next.num {
            return None;
        }
        while next.num > num {
            next = self.items.get(&next.previous)?.clone();
        }
        Some(next)
    }

    pub fn fetch_block_on_main_branch_by_number(&self, num: u32) -> Option<ForkItemRef> {
        let mut blocks = self.fetch_block_by_number(num);
        match blocks.len() {
            0 => None,
            1 => blocks.pop(),
            _ => self.walk_main_branch_to_num(num),
        }
    }

    /// Walks both chains back to the block after their common ancestor.
    pub fn fetch_branch_from(&self, first: &BlockId, second: &BlockId) -> ForkDbResult<Branches> {
        let mut a = self
            .fetch_block(first)
            .ok_or(ForkDbError::UnknownBlock(*first))?;
        let mut b = self
            .fetch_block(second)
            .ok_or(ForkDbError::UnknownBlock(*second))?;
        let mut result: Branches = (Vec::new(), Vec::new());
        let no_ancestor = || ForkDbError::NoCommonAncestor(*first, *second);

        while a.num > b.num {
            let prev = self.fetch_block(&a.previous).ok_or_else(no_ancestor)?;
            result.0.push(a);
            a = prev;
        }
        while b.num > a.num {
            let prev = self.fetch_block(&b.previous).ok_or_else(no_ancestor)?;
            result.1.push(b);
            b = prev;
        }
        while a.previous != b.previous {
            let prev_a = self.fetch_block(&a.previous).ok_or_else(no_ancestor)?;
            let prev_b = self.fetch_block(&b.previous).ok_or_else(no_ancestor)?;
            result.0.push(a);
            result.1.push(b);
            a = prev_a;
            b = prev_b;
        }
        if a.id != b.id {
            result.0.push(a);
            result.1.push(b);
        }
        Ok(result)
    }

    fn insert(&mut self, item: ForkItemRef) {
        self.by_num.entry(item.num).or_default().insert(item.id);
        self.items.insert(item.id, item);
    }

    fn prune(&mut self) {
        let Some(head) = &self.head else {
            return;
        };
        let min_num = head.num.saturating_sub(self.max_size);
        let stale: Vec<u32> = self.by_num.range(..min_num).map(|(n, _)| *n).collect();
        if stale.is_empty() {
            return;
        }
        for num in &stale {
            if let Some(ids) = self.by_num.remove(num) {
                for id in ids {
                    self.items.remove(&id);
                }
            }
        }
        debug!(pruned = stale.len(), min_num, "pruned fork database");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AccountName, TimePointSec};

    fn child(parent: &SignedBlock, salt: u32) -> SignedBlock {
        let mut block = SignedBlock::default();
        block.signed_header.header.previous = parent.id();
        block.signed_header.header.timestamp = TimePointSec(parent.timestamp().0 + 3 + salt);
        block.signed_header.header.witness = AccountName::from("initminer");
        block
    }

    fn genesis() -> SignedBlock {
        let mut block = SignedBlock::default();
        block.signed_header.header.timestamp = TimePointSec(1_000);
        block
    }

    #[test]
    fn test_longer_fork_becomes_head() {
        let mut db = ForkDatabase::new();
        let g = genesis();
        db.start_block(g.clone());

        let a1 = child(&g, 0);
        let b1 = child(&g, 1);
        let b2 = child(&b1, 0);
        db.push_block(a1.clone()).unwrap();
        assert_eq!(db.head().unwrap().id, a1.id());

        db.push_block(b1.clone()).unwrap();
        assert_eq!(db.head().unwrap().id, a1.id(), "equal length does not switch");

        db.push_block(b2.clone()).unwrap();
        assert_eq!(db.head().unwrap().id, b2.id());

        let (new_branch, old_branch) = db.fetch_branch_from(&b2.id(), &a1.id()).unwrap();
        assert_eq!(
            new_branch.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![b2.id(), b1.id()]
        );
        assert_eq!(old_branch.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a1.id()]);
        assert_eq!(new_branch.last().unwrap().previous, g.id());
    }

    #[test]
    fn test_unlinkable_block_is_rejected() {
        let mut db = ForkDatabase::new();
        let g = genesis();
        db.start_block(g.clone());
        let orphan = child(&child(&g, 0), 0);
        assert!(matches!(db.push_block(orphan), Err(ForkDbError::Unlinkable { .. })));
    }

    #[test]
    fn test_pop_and_remove_branch() {
        let mut db = ForkDatabase::new();
        let g = genesis();
        db.start_block(g.clone());
        let b1 = child(&g, 0);
        let b2 = child(&b1, 0);
        db.push_block(b1.clone()).unwrap();
        db.push_block(b2.clone()).unwrap();

        let popped = db.pop_block().unwrap();
        assert_eq!(popped.id, b2.id());
        assert_eq!(db.head().unwrap().id, b1.id());

        db.remove_branch(&b1.id());
        assert!(!db.is_known_block(&b1.id()));
        assert!(!db.is_known_block(&b2.id()));
        assert!(db.is_known_block(&g.id()));
    }

    #[test]
    fn test_prunes_below_max_size() {
        let mut db = ForkDatabase::new();
        db.set_max_size(2);
        let mut prev = genesis();
        db.start_block(prev.clone());
        for _ in 0..5 {
            let next = child(&prev, 0);
            db.push_block(next.clone()).unwrap();
            prev = next;
        }
        assert!(db.len() <= 3);
        assert!(db.fetch_block_on_main_branch_by_number(prev.block_num()).is_some());
        assert!(db.fetch_block_by_number(1).is_empty());
    }
}
