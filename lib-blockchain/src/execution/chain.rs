//! Chain
//!
//! The engine surface: owns the ledger, the fork database, the block log and
//! the pending transaction set, and drives block and transaction
//! application through undo sessions.
//!
//! # Revisions
//!
//! ```text
//! committed ledger ── [blk lib+1] ... [blk head] ── [pending] ── [tx]
//!                     \____ one frame per reversible block ___/
//! ```
//!
//! - Each applied block leaves one frame; its revision is the block number
//! - Pending transactions share one frame on top of the head
//! - Irreversible blocks move to the block log and their frames are
//!   committed
//!
//! # Fork Switch
//!
//! A block that makes a different branch the longest pops the current
//! branch back to the common ancestor and applies the new one. If any new
//! block fails, the new branch from that block on is discarded and the old
//! branch is re-applied. The old branch was valid once; failing to restore
//! it is fatal.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use ed25519_dalek::SigningKey;
use rand::Rng;
use tracing::{debug, error, info, warn};

use super::block_apply::apply_block;
use super::context::ApplyContext;
use super::errors::{BlockApplyError, ChainError, ChainResult, TxApplyError};
use super::genesis::init_genesis;
use super::invariants;
use super::skip_flags::SkipFlags;
use super::tx_apply::apply_transaction;
use crate::block_log::BlockLog;
use crate::config::ChainConfig;
use crate::economics::witness_schedule;
use crate::events::{ChainEventListener, Notifier};
use crate::fork_db::{ForkDatabase, ForkItemRef};
use crate::protocol::constants::{BLOCKCHAIN_HARDFORK_VERSION, BLOCKCHAIN_VERSION, BLOCK_HEADER_RESERVE};
use crate::protocol::{
    AccountName, BlockHeader, BlockHeaderExtension, BlockId, ChainId, HardforkSchedule, PublicKey,
    SignedBlock, SignedBlockHeader, SignedTransaction, TimePointSec, TransactionId,
};
use crate::storage::objects::{
    Account, Comment, DynamicGlobalProperties, Escrow, HardforkProperty, RewardFund, SavingsWithdraw,
    Witness, WitnessSchedule,
};
use crate::storage::{ChainState, SnapshotStore, StorageError};

pub struct Chain {
    config: ChainConfig,
    state: ChainState,
    fork_db: ForkDatabase,
    block_log: BlockLog,
    snapshots: SnapshotStore,
    notifier: Notifier,
    hardforks: HardforkSchedule,
    chain_id: ChainId,
    checkpoints: BTreeMap<u32, BlockId>,

    /// Transactions applied on top of the head, in arrival order.
    pending: Vec<SignedTransaction>,
    /// Whether the pending frame is open on the ledger.
    pending_open: bool,
    /// Transactions of popped blocks, re-pushed ahead of `pending`.
    popped: VecDeque<SignedTransaction>,

    next_flush_block: u32,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("head_block_num", &self.head_block_num())
            .field("last_irreversible", &self.last_irreversible_block_num())
            .field("pending", &self.pending.len())
            .field("fork_db", &self.fork_db.len())
            .finish_non_exhaustive()
    }
}

impl Chain {
    // =========================================================================
    // Open / close
    // =========================================================================

    /// Opens the chain in `config.data_dir`, creating genesis on first use.
    ///
    /// The stored ledger is rewound to its last committed revision and any
    /// block-log blocks above it are replayed.
    pub fn open(config: ChainConfig) -> ChainResult<Self> {
        config.validate()?;
        let started = Instant::now();
        let hardforks = config.genesis.hardfork_schedule();
        let chain_id = config.genesis.chain_id();
        let checkpoints = config.checkpoint_map()?;
        let block_log = BlockLog::open(config.block_log_dir())?;
        let snapshots = SnapshotStore::open(config.state_dir())?;

        let state = match snapshots.load()? {
            Some(mut state) => {
                state.undo_all();
                state
            }
            None => {
                let mut state = ChainState::new();
                init_genesis(&mut state, &config.genesis)?;
                state
            }
        };
        if state.revision() != state.head_block_num() as u64 {
            return Err(ChainError::Internal(format!(
                "ledger revision {} does not match head block {}",
                state.revision(),
                state.head_block_num()
            )));
        }

        let mut fork_db = ForkDatabase::new();
        fork_db.set_max_size(config.fork_db_max_size);

        let mut chain = Self {
            config,
            state,
            fork_db,
            block_log,
            snapshots,
            notifier: Notifier::new(),
            hardforks,
            chain_id,
            checkpoints,
            pending: Vec::new(),
            pending_open: false,
            popped: VecDeque::new(),
            next_flush_block: 0,
        };

        let replayed = chain.replay_block_log()?;
        chain.seed_fork_db()?;
        info!(
            head = chain.head_block_num(),
            last_irreversible = chain.last_irreversible_block_num(),
            replayed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chain opened"
        );
        Ok(chain)
    }

    /// Deletes the stored ledger and replays the whole block log from
    /// genesis with consensus checks relaxed.
    pub fn reindex(config: ChainConfig) -> ChainResult<Self> {
        info!(dir = %config.data_dir.display(), "reindexing from the block log");
        Self::wipe(&config, false)?;
        Self::open(config)
    }

    /// Removes the ledger snapshot, and the block log too with
    /// `include_blocks`. The chain must not be open.
    pub fn wipe(config: &ChainConfig, include_blocks: bool) -> ChainResult<()> {
        let state_dir = config.state_dir();
        if state_dir.exists() {
            fs::remove_dir_all(&state_dir).map_err(|e| StorageError::Database(e.to_string()))?;
        }
        let block_dir = config.block_log_dir();
        if include_blocks && block_dir.exists() {
            fs::remove_dir_all(&block_dir).map_err(crate::block_log::BlockLogError::from)?;
        }
        info!(dir = %config.data_dir.display(), include_blocks, "chain data wiped");
        Ok(())
    }

    /// Drops pending transactions and persists the ledger.
    pub fn close(mut self) -> ChainResult<()> {
        self.clear_pending()?;
        self.block_log.flush()?;
        self.snapshots.save(&self.state)?;
        info!(head = self.head_block_num(), "chain closed");
        Ok(())
    }

    /// Applies block-log blocks above the ledger head, without undo history.
    fn replay_block_log(&mut self) -> ChainResult<u32> {
        let log_head = self.block_log.head_block_num();
        let start = self.head_block_num() + 1;
        if start > log_head {
            return Ok(0);
        }
        info!(from = start, to = log_head, "replaying block log");
        self.block_log.set_locking(false);
        let skip = SkipFlags::REINDEX | SkipFlags::FORK_DB | SkipFlags::UNDO_HISTORY_CHECK;
        for num in start..=log_head {
            let block = self
                .block_log
                .read_block_by_num(num)?
                .ok_or_else(|| ChainError::Internal(format!("block {num} is missing from the block log")))?;
            let block = Arc::new(block);
            let id = block.id();
            let skip = self.checkpoint_skip(&block, id, skip)?;
            {
                let mut ctx =
                    ApplyContext::new(&mut self.state, &mut self.notifier, &self.hardforks, self.chain_id, skip);
                apply_block(&mut ctx, &block, id, self.config.max_undo_history)?;
            }
            self.migrate_irreversible_state(skip)?;
            if num % 10_000 == 0 {
                info!(block_num = num, of = log_head, "replay progress");
            }
        }
        self.block_log.set_locking(true);
        self.state.set_revision(log_head as u64)?;
        self.snapshots.save(&self.state)?;
        Ok(log_head + 1 - start)
    }

    /// Puts the head block in the fork database so new blocks can link.
    fn seed_fork_db(&mut self) -> ChainResult<()> {
        let head = self.head_block_num();
        if head == 0 {
            return Ok(());
        }
        let block = self.block_log.read_block_by_num(head)?.ok_or_else(|| {
            ChainError::Internal(format!("ledger head {head} is not in the block log, reindex required"))
        })?;
        if block.id() != self.head_block_id() {
            return Err(ChainError::Internal(format!(
                "ledger head {head} does not match the block log, reindex required"
            )));
        }
        self.fork_db.start_block(block);
        Ok(())
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Pushes a block from the network or from local production. Returns
    /// true when the block caused a switch to a different branch.
    pub fn push_block(&mut self, block: SignedBlock, skip: SkipFlags) -> ChainResult<bool> {
        let saved = self.take_pending()?;
        let result = self.push_block_inner(block, skip);
        self.restore_pending(saved);
        result
    }

    fn push_block_inner(&mut self, block: SignedBlock, skip: SkipFlags) -> ChainResult<bool> {
        if skip.contains(SkipFlags::FORK_DB) {
            let block = Arc::new(block);
            self.apply_in_session(&block, block.id(), skip)?;
            return Ok(false);
        }

        let new_head = self.fork_db.push_block(block)?;
        if new_head.previous != self.head_block_id() {
            if new_head.num > self.head_block_num() {
                self.switch_forks(new_head, skip)?;
                return Ok(true);
            }
            debug!(block_num = new_head.num, "block stored on a shorter fork");
            return Ok(false);
        }

        if let Err(e) = self.apply_in_session(&new_head.block, new_head.id, skip) {
            warn!(block_num = new_head.num, id = %new_head.id, error = %e, "rejected block");
            self.fork_db.remove(&new_head.id);
            match self.fork_db.fetch_block(&new_head.previous) {
                Some(parent) => self.fork_db.set_head(parent),
                None if self.fork_db.is_empty() => self.fork_db.reset(),
                None => {}
            }
            return Err(e);
        }
        Ok(false)
    }

    fn switch_forks(&mut self, new_head: ForkItemRef, skip: SkipFlags) -> ChainResult<()> {
        let old_head_id = self.head_block_id();
        let (new_branch, old_branch) = self.fork_db.fetch_branch_from(&new_head.id, &old_head_id)?;
        let fork_point = new_branch
            .last()
            .map(|item| item.previous)
            .ok_or_else(|| ChainError::Internal("fork switch with an empty new branch".into()))?;
        info!(
            old_head = self.head_block_num(),
            new_head = new_head.num,
            depth = old_branch.len(),
            "switching forks"
        );

        while self.head_block_id() != fork_point {
            self.undo_head_block()?;
        }

        for item in new_branch.iter().rev() {
            let Err(e) = self.apply_in_session(&item.block, item.id, skip) else {
                continue;
            };
            warn!(block_num = item.num, id = %item.id, error = %e, "new branch failed, restoring previous branch");
            self.fork_db.remove_branch(&item.id);
            while self.head_block_id() != fork_point {
                self.undo_head_block()?;
            }
            if let Some(base) = self.fork_db.fetch_block(&fork_point) {
                self.fork_db.set_head(base);
            }
            for old in old_branch.iter().rev() {
                self.fork_db.set_head(old.clone());
                if let Err(restore) = self.apply_in_session(&old.block, old.id, skip) {
                    error!(block_num = old.num, error = %restore, "failed to restore the previous branch");
                    panic!(
                        "fork switch left the ledger inconsistent: block {} of the previous branch failed to re-apply: {restore}",
                        old.num
                    );
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Applies `block` in a new undo session that is kept on success.
    fn apply_in_session(&mut self, block: &Arc<SignedBlock>, id: BlockId, skip: SkipFlags) -> ChainResult<()> {
        let skip = self.checkpoint_skip(block, id, skip)?;
        let validate = self.config.validate_invariants && !skip.contains(SkipFlags::VALIDATE_INVARIANTS);
        let max_undo_history = self.config.max_undo_history;

        let mut session = self.state.start_undo_session();
        {
            let mut ctx = ApplyContext::new(&mut session, &mut self.notifier, &self.hardforks, self.chain_id, skip);
            apply_block(&mut ctx, block, id, max_undo_history)?;
        }
        if validate {
            invariants::validate_invariants(&session)?;
        }
        session.push();

        self.migrate_irreversible_state(skip)?;
        self.schedule_flush(block.block_num())?;
        Ok(())
    }

    /// Checkpointed blocks must match and skip most checks.
    fn checkpoint_skip(&self, block: &SignedBlock, id: BlockId, skip: SkipFlags) -> ChainResult<SkipFlags> {
        let Some((&last, _)) = self.checkpoints.iter().next_back() else {
            return Ok(skip);
        };
        let block_num = block.block_num();
        if let Some(expected) = self.checkpoints.get(&block_num) {
            if *expected != id {
                return Err(BlockApplyError::CheckpointMismatch {
                    block_num,
                    expected: *expected,
                    actual: id,
                }
                .into());
            }
        }
        if block_num <= last {
            return Ok(skip | SkipFlags::CHECKPOINTED);
        }
        Ok(skip)
    }

    /// Moves newly irreversible blocks to the block log, bounds the fork
    /// database and commits undo history up to the irreversible block.
    fn migrate_irreversible_state(&mut self, skip: SkipFlags) -> ChainResult<()> {
        let head = self.head_block_num();
        let last_irreversible = self.last_irreversible_block_num();

        if !skip.contains(SkipFlags::BLOCK_LOG) {
            let mut log_head = self.block_log.head_block_num();
            if log_head < last_irreversible {
                while log_head < last_irreversible {
                    let item = self
                        .fork_db
                        .fetch_block_on_main_branch_by_number(log_head + 1)
                        .ok_or_else(|| {
                            ChainError::Internal(format!(
                                "irreversible block {} is not on the main branch of the fork database",
                                log_head + 1
                            ))
                        })?;
                    self.block_log.append(&item.block)?;
                    log_head += 1;
                }
                self.block_log.flush()?;
            }
        }

        self.fork_db.set_max_size(head - last_irreversible + 1);
        self.state.commit(last_irreversible as u64);
        Ok(())
    }

    /// Persists the ledger at a random block in `[n+1+0.9F, n+1+F)` so a
    /// fleet of nodes does not stall together.
    fn schedule_flush(&mut self, block_num: u32) -> ChainResult<()> {
        let interval = self.config.flush_interval;
        if interval == 0 {
            return Ok(());
        }
        if self.next_flush_block == 0 {
            let low = block_num + 1 + interval / 10 * 9 + interval % 10 * 9 / 10;
            let high = block_num + 1 + interval;
            self.next_flush_block = if high > low {
                rand::thread_rng().gen_range(low..high)
            } else {
                low
            };
        }
        if self.next_flush_block == block_num {
            self.next_flush_block = 0;
            self.snapshots.save(&self.state)?;
            debug!(block_num, "ledger flushed");
        }
        Ok(())
    }

    /// Reverts the head block, keeping its transactions for re-push.
    fn undo_head_block(&mut self) -> ChainResult<Arc<SignedBlock>> {
        let head_id = self.head_block_id();
        let block = self
            .fetch_block_by_id(&head_id)?
            .ok_or_else(|| ChainError::Internal(format!("head block {head_id} is unknown")))?;
        self.state.undo()?;
        for trx in block.transactions.iter().rev() {
            self.popped.push_front(trx.clone());
        }
        debug!(block_num = block.block_num(), "head block undone");
        Ok(block)
    }

    /// Removes the head block. Its transactions are re-pushed with the next
    /// block.
    pub fn pop_block(&mut self) -> ChainResult<Arc<SignedBlock>> {
        self.clear_pending_session()?;
        let block = self.undo_head_block()?;
        if self.fork_db.head().map(|h| h.id) == Some(block.id()) && self.fork_db.pop_block().is_err() {
            // The parent was never tracked, e.g. right after open.
            self.fork_db.reset();
            if let Some(parent) = self.block_log.read_block_by_num(self.head_block_num())? {
                self.fork_db.start_block(parent);
            }
        }
        Ok(block)
    }

    /// Builds, signs and pushes a block for `witness` at `when`, filled from
    /// the pending transactions.
    pub fn generate_block(
        &mut self,
        when: TimePointSec,
        witness: &AccountName,
        signing_key: &SigningKey,
        skip: SkipFlags,
    ) -> ChainResult<SignedBlock> {
        let slot = witness_schedule::get_slot_at_time(&self.state, when);
        if slot == 0 {
            return Err(ChainError::BlockProduction(format!(
                "{when} is not after the head block time {}",
                self.head_block_time()
            )));
        }
        let scheduled = witness_schedule::get_scheduled_witness(&self.state, slot);
        if scheduled != *witness {
            return Err(ChainError::BlockProduction(format!(
                "{witness} is not scheduled at {when}, {scheduled} is"
            )));
        }
        let producer = self.state.witness(witness)?.clone();
        if !skip.contains(SkipFlags::WITNESS_SIGNATURE) && producer.signing_key != PublicKey::from_signing_key(signing_key) {
            return Err(ChainError::BlockProduction(format!(
                "signing key does not match the key of {witness}"
            )));
        }

        let pending = self.take_pending()?;
        let built = self.build_block(when, &producer, &pending, skip);
        self.pending = pending;
        let mut block = built?;

        block.signed_header.header.transaction_merkle_root = block.calculate_merkle_root();
        if !skip.contains(SkipFlags::WITNESS_SIGNATURE) {
            block.sign(signing_key);
        }
        let max = self.state.globals.maximum_block_size as usize;
        if block.packed_size() > max {
            return Err(ChainError::BlockProduction(format!(
                "block of {} bytes exceeds the maximum of {max}",
                block.packed_size()
            )));
        }

        self.push_block(block.clone(), skip)?;
        info!(
            block_num = block.block_num(),
            witness = %witness,
            trxs = block.transactions.len(),
            "block produced"
        );
        Ok(block)
    }

    /// Unsigned block with the pending transactions that still apply and
    /// fit, plus the producer's version reports.
    fn build_block(
        &mut self,
        when: TimePointSec,
        producer: &Witness,
        pending: &[SignedTransaction],
        skip: SkipFlags,
    ) -> ChainResult<SignedBlock> {
        let mut block = SignedBlock {
            signed_header: SignedBlockHeader {
                header: BlockHeader {
                    previous: self.head_block_id(),
                    timestamp: when,
                    witness: producer.owner.clone(),
                    ..Default::default()
                },
                ..Default::default()
            },
            transactions: Vec::new(),
        };

        let max_size = self.state.globals.maximum_block_size as usize;
        let mut total_size = block.packed_size();
        let mut postponed = 0usize;
        {
            let mut building = self.state.start_undo_session();
            for trx in pending {
                if trx.expiration < when {
                    continue;
                }
                let new_total = total_size + trx.packed_size();
                if new_total >= max_size {
                    postponed += 1;
                    continue;
                }
                let mut temp = building.start_undo_session();
                let result = {
                    let mut ctx =
                        ApplyContext::new(&mut temp, &mut self.notifier, &self.hardforks, self.chain_id, skip);
                    ctx.is_producing = true;
                    apply_transaction(&mut ctx, trx)
                };
                match result {
                    Ok(()) => {
                        temp.squash()?;
                        total_size = new_total;
                        block.transactions.push(trx.clone());
                    }
                    Err(e) => {
                        temp.undo()?;
                        debug!(trx_id = %trx.id(), error = %e, "pending transaction left out of block");
                    }
                }
            }
            building.undo()?;
        }
        if postponed > 0 {
            info!(postponed, "transactions postponed to a later block");
        }

        let hardfork = self.state.hardforks.get();
        let extensions = &mut block.signed_header.header.extensions;
        if producer.running_version != BLOCKCHAIN_VERSION {
            extensions.push(BlockHeaderExtension::Version(BLOCKCHAIN_VERSION));
        }
        if hardfork.current_hardfork_version < BLOCKCHAIN_HARDFORK_VERSION {
            let next = hardfork.last_hardfork + 1;
            let hf_version = self.hardforks.version(next);
            let hf_time = self.hardforks.time(next);
            if producer.hardfork_version_vote != hf_version || producer.hardfork_time_vote != hf_time {
                extensions.push(BlockHeaderExtension::HardforkVersionVote { hf_version, hf_time });
            }
        } else if hardfork.current_hardfork_version == BLOCKCHAIN_HARDFORK_VERSION
            && producer.hardfork_version_vote > BLOCKCHAIN_HARDFORK_VERSION
        {
            extensions.push(BlockHeaderExtension::HardforkVersionVote {
                hf_version: self.hardforks.version(hardfork.last_hardfork),
                hf_time: self.hardforks.time(hardfork.last_hardfork),
            });
        }
        Ok(block)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Applies `trx` on top of the pending set and keeps it there.
    pub fn push_transaction(&mut self, trx: SignedTransaction, skip: SkipFlags) -> ChainResult<()> {
        let max = self
            .state
            .globals
            .maximum_block_size
            .saturating_sub(BLOCK_HEADER_RESERVE) as usize;
        let size = trx.packed_size();
        if size > max {
            return Err(TxApplyError::TooLarge { size, max }.into());
        }
        if !self.pending_open {
            self.state.begin_undo();
            self.pending_open = true;
        }
        self.apply_pending(&trx, skip)?;
        self.pending.push(trx);
        Ok(())
    }

    /// Applies `trx` in a nested session that is merged into the pending
    /// frame on success.
    fn apply_pending(&mut self, trx: &SignedTransaction, skip: SkipFlags) -> ChainResult<()> {
        let mut session = self.state.start_undo_session();
        let result = {
            let mut ctx = ApplyContext::new(&mut session, &mut self.notifier, &self.hardforks, self.chain_id, skip);
            apply_transaction(&mut ctx, trx)
        };
        match result {
            Ok(()) => {
                session.squash()?;
                Ok(())
            }
            Err(e) => {
                session.undo()?;
                Err(e.into())
            }
        }
    }

    /// Checks that `trx` would apply on top of the pending set, without
    /// keeping it.
    pub fn validate_transaction(&mut self, trx: &SignedTransaction) -> ChainResult<()> {
        let mut session = self.state.start_undo_session();
        let result = {
            let mut ctx = ApplyContext::new(
                &mut session,
                &mut self.notifier,
                &self.hardforks,
                self.chain_id,
                SkipFlags::NOTHING,
            );
            apply_transaction(&mut ctx, trx)
        };
        session.undo()?;
        result.map_err(ChainError::from)
    }

    /// Drops every pending transaction.
    pub fn clear_pending(&mut self) -> ChainResult<()> {
        self.clear_pending_session()?;
        self.pending.clear();
        Ok(())
    }

    fn clear_pending_session(&mut self) -> ChainResult<()> {
        if self.pending_open {
            self.state.undo()?;
            self.pending_open = false;
        }
        Ok(())
    }

    /// Undoes the pending frame and hands back its transactions.
    fn take_pending(&mut self) -> ChainResult<Vec<SignedTransaction>> {
        self.clear_pending_session()?;
        Ok(std::mem::take(&mut self.pending))
    }

    /// Re-pushes popped then pending transactions on the new head. Those
    /// already included or no longer valid are dropped.
    fn restore_pending(&mut self, saved: Vec<SignedTransaction>) {
        let popped: Vec<SignedTransaction> = self.popped.drain(..).collect();
        for trx in popped.into_iter().chain(saved) {
            if self.state.transactions.contains(&trx.id()) {
                continue;
            }
            let trx_id = trx.id();
            if let Err(e) = self.push_transaction(trx, SkipFlags::NOTHING) {
                debug!(trx_id = %trx_id, error = %e, "dropped pending transaction");
            }
        }
    }

    pub fn pending_transactions(&self) -> &[SignedTransaction] {
        &self.pending
    }

    /// Transactions of popped blocks that are waiting to be re-pushed.
    pub fn popped_transactions(&self) -> impl Iterator<Item = &SignedTransaction> + '_ {
        self.popped.iter()
    }

    // =========================================================================
    // Listeners and audit
    // =========================================================================

    pub fn subscribe(&mut self, listener: Box<dyn ChainEventListener>) {
        self.notifier.subscribe(listener);
    }

    pub fn validate_invariants(&self) -> ChainResult<()> {
        invariants::validate_invariants(&self.state).map_err(ChainError::from)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn hardfork_schedule(&self) -> &HardforkSchedule {
        &self.hardforks
    }

    /// The ledger, including pending transactions.
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn head_block_num(&self) -> u32 {
        self.state.head_block_num()
    }

    pub fn head_block_id(&self) -> BlockId {
        self.state.globals.head_block_id
    }

    pub fn head_block_time(&self) -> TimePointSec {
        self.state.head_block_time()
    }

    pub fn last_irreversible_block_num(&self) -> u32 {
        self.state.globals.last_irreversible_block_num
    }

    pub fn globals(&self) -> &DynamicGlobalProperties {
        self.state.globals.get()
    }

    pub fn witness_schedule(&self) -> &WitnessSchedule {
        self.state.schedule.get()
    }

    pub fn hardfork_property(&self) -> &HardforkProperty {
        self.state.hardforks.get()
    }

    pub fn account(&self, name: &str) -> Option<&Account> {
        self.state.accounts.get(name)
    }

    pub fn witness(&self, owner: &str) -> Option<&Witness> {
        self.state.witnesses.get(owner)
    }

    pub fn comment(&self, author: &AccountName, permlink: &str) -> Option<&Comment> {
        self.state.find_comment(author, permlink)
    }

    pub fn reward_fund(&self, id: u16) -> Option<&RewardFund> {
        self.state.reward_funds.get(&id)
    }

    pub fn escrow(&self, from: &AccountName, escrow_id: u32) -> Option<&Escrow> {
        self.state.escrows.get(&(from.clone(), escrow_id))
    }

    pub fn savings_withdraw(&self, from: &AccountName, request_id: u32) -> Option<&SavingsWithdraw> {
        self.state.savings_withdraws.get(&(from.clone(), request_id))
    }

    pub fn get_slot_time(&self, slot: u32) -> TimePointSec {
        witness_schedule::get_slot_time(&self.state, slot)
    }

    pub fn get_slot_at_time(&self, when: TimePointSec) -> u32 {
        witness_schedule::get_slot_at_time(&self.state, when)
    }

    pub fn get_scheduled_witness(&self, slot: u32) -> AccountName {
        witness_schedule::get_scheduled_witness(&self.state, slot)
    }

    pub fn is_known_transaction(&self, id: &TransactionId) -> bool {
        self.state.transactions.contains(id)
    }

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        if self.fork_db.is_known_block(id) {
            return true;
        }
        matches!(
            self.block_log.read_block_by_num(id.block_num()),
            Ok(Some(block)) if block.id() == *id
        )
    }

    pub fn fetch_block_by_id(&self, id: &BlockId) -> ChainResult<Option<Arc<SignedBlock>>> {
        if let Some(item) = self.fork_db.fetch_block(id) {
            return Ok(Some(item.block.clone()));
        }
        Ok(self
            .block_log
            .read_block_by_num(id.block_num())?
            .filter(|block| block.id() == *id)
            .map(Arc::new))
    }

    /// Block `num` on the current branch.
    pub fn fetch_block_by_number(&self, num: u32) -> ChainResult<Option<Arc<SignedBlock>>> {
        if num > self.head_block_num() {
            return Ok(None);
        }
        if let Some(item) = self.fork_db.fetch_block_on_main_branch_by_number(num) {
            return Ok(Some(item.block.clone()));
        }
        Ok(self.block_log.read_block_by_num(num)?.map(Arc::new))
    }
}
