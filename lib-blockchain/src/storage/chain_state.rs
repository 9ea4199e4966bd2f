//! The ledger: every table and singleton, plus the revision stack.
//!
//! `ChainState` owns all ledger data. Opening an undo session pushes one
//! frame onto every table at once, so a revision covers the whole ledger.
//!
//! # Revisions
//!
//! ```text
//! revision:   5        6        7
//! frames:   [blk 5] [blk 6] [blk 7] [pending] [tx]
//!            ^ oldest                          ^ newest
//! ```
//!
//! - `begin_undo` increments `revision` and opens a frame
//! - `undo` and `squash` resolve the newest frame and decrement `revision`
//! - `commit(r)` forgets frames at or below revision `r`
//!
//! After a block is applied and its session pushed, `revision` equals the
//! head block number.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::objects::*;
use super::table::{Singleton, Table, UndoableTable};
use super::{StorageError, StorageResult};
use crate::protocol::{AccountName, TimePointSec};

macro_rules! chain_tables {
    (
        tables { $($table:ident : $ty:ty),* $(,)? }
        singletons { $($single:ident : $sty:ty),* $(,)? }
    ) => {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct ChainState {
            $(pub $table: Table<$ty>,)*
            $(pub $single: Singleton<$sty>,)*
            revision: u64,
            /// Revision number of each open frame, oldest first.
            revisions: VecDeque<u64>,
        }

        impl ChainState {
            fn for_each_table(&mut self, mut f: impl FnMut(&mut dyn UndoableTable)) {
                $(f(&mut self.$table);)*
                $(f(&mut self.$single);)*
            }

            /// Ledger contents equal, ignoring undo history.
            pub fn same_contents(&self, other: &Self) -> bool {
                true $(&& self.$table == other.$table)* $(&& self.$single == other.$single)*
                    && self.revision == other.revision
            }
        }
    };
}

chain_tables! {
    tables {
        accounts: Account,
        account_authorities: AccountAuthority,
        owner_history: OwnerAuthorityHistory,
        recovery_requests: AccountRecoveryRequest,
        change_recovery_requests: ChangeRecoveryAccountRequest,
        decline_voting_requests: DeclineVotingRightsRequest,
        withdraw_routes: WithdrawVestingRoute,
        delegations: VestingDelegation,
        delegation_expirations: VestingDelegationExpiration,
        witnesses: Witness,
        witness_votes: WitnessVote,
        comments: Comment,
        comment_votes: CommentVote,
        escrows: Escrow,
        savings_withdraws: SavingsWithdraw,
        transactions: TransactionRecord,
        block_summaries: BlockSummary,
        reward_funds: RewardFund,
        proposals: Proposal,
        proposal_votes: ProposalVote,
    }
    singletons {
        globals: DynamicGlobalProperties,
        schedule: WitnessSchedule,
        hardforks: HardforkProperty,
    }
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Revisions
    // =========================================================================

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of open undo frames.
    pub fn undo_depth(&self) -> usize {
        self.revisions.len()
    }

    /// Revision of the oldest open frame.
    pub fn oldest_revision(&self) -> Option<u64> {
        self.revisions.front().copied()
    }

    /// Only allowed when no frame is open.
    pub fn set_revision(&mut self, revision: u64) -> StorageResult<()> {
        if !self.revisions.is_empty() {
            return Err(StorageError::UndoOrder(format!(
                "cannot set revision to {revision} with {} open frames",
                self.revisions.len()
            )));
        }
        self.revision = revision;
        Ok(())
    }

    /// Opens a frame on every table and returns its revision.
    pub fn begin_undo(&mut self) -> u64 {
        self.revision += 1;
        self.revisions.push_back(self.revision);
        self.for_each_table(|t| t.push_frame());
        self.revision
    }

    /// Opens a guarded session. Dropping it unresolved undoes it.
    pub fn start_undo_session(&mut self) -> UndoSession<'_> {
        let revision = self.begin_undo();
        UndoSession {
            state: self,
            revision,
            resolved: false,
        }
    }

    /// Reverts the newest frame.
    pub fn undo(&mut self) -> StorageResult<()> {
        if self.revisions.pop_back().is_none() {
            return Err(StorageError::UndoOrder("no open revision to undo".into()));
        }
        self.for_each_table(|t| t.undo_frame());
        self.revision -= 1;
        Ok(())
    }

    /// Merges the newest frame into the one below it.
    pub fn squash(&mut self) -> StorageResult<()> {
        if self.revisions.pop_back().is_none() {
            return Err(StorageError::UndoOrder("no open revision to squash".into()));
        }
        self.for_each_table(|t| t.squash_frame());
        self.revision -= 1;
        Ok(())
    }

    /// Undoes `revision`, which must be the newest open frame.
    pub fn undo_revision(&mut self, revision: u64) -> StorageResult<()> {
        self.check_top(revision)?;
        self.undo()
    }

    /// Squashes `revision`, which must be the newest open frame.
    pub fn squash_revision(&mut self, revision: u64) -> StorageResult<()> {
        self.check_top(revision)?;
        self.squash()
    }

    /// Forgets undo history at or below `revision`.
    pub fn commit(&mut self, revision: u64) {
        let mut dropped = 0;
        while let Some(&oldest) = self.revisions.front() {
            if oldest > revision {
                break;
            }
            self.revisions.pop_front();
            self.for_each_table(|t| t.commit_oldest());
            dropped += 1;
        }
        if dropped > 0 {
            debug!(revision, dropped, "committed undo history");
        }
    }

    /// Reverts every open frame.
    pub fn undo_all(&mut self) {
        while !self.revisions.is_empty() {
            // Cannot fail: a frame is open.
            let _ = self.undo();
        }
    }

    fn check_top(&self, revision: u64) -> StorageResult<()> {
        match self.revisions.back() {
            Some(&top) if top == revision => Ok(()),
            Some(&top) => Err(StorageError::UndoOrder(format!(
                "revision {revision} is not the newest open frame ({top})"
            ))),
            None => Err(StorageError::UndoOrder(format!(
                "revision {revision} resolved with no open frame"
            ))),
        }
    }

    // =========================================================================
    // Common lookups
    // =========================================================================

    pub fn account(&self, name: &str) -> StorageResult<&Account> {
        self.accounts.require(name)
    }

    pub fn authority(&self, name: &str) -> StorageResult<&AccountAuthority> {
        self.account_authorities.require(name)
    }

    pub fn witness(&self, owner: &str) -> StorageResult<&Witness> {
        self.witnesses.require(owner)
    }

    pub fn comment(&self, author: &AccountName, permlink: &str) -> StorageResult<&Comment> {
        self.comments.require(&(author.clone(), permlink.to_string()))
    }

    pub fn find_comment(&self, author: &AccountName, permlink: &str) -> Option<&Comment> {
        self.comments.get(&(author.clone(), permlink.to_string()))
    }

    pub fn head_block_num(&self) -> u32 {
        self.globals.head_block_number
    }

    pub fn head_block_time(&self) -> TimePointSec {
        self.globals.time
    }

    pub fn has_hardfork(&self, hardfork: u32) -> bool {
        self.hardforks.last_hardfork >= hardfork
    }
}

// =============================================================================
// UNDO SESSION GUARD
// =============================================================================

/// A scoped undo session.
///
/// Exactly one of `push`, `squash` or `undo` resolves it. Dropping an
/// unresolved session undoes it, which covers `?` early returns.
pub struct UndoSession<'a> {
    state: &'a mut ChainState,
    revision: u64,
    resolved: bool,
}

impl<'a> UndoSession<'a> {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Keeps the frame open for a later `commit` or `undo`.
    pub fn push(mut self) -> u64 {
        self.resolved = true;
        self.revision
    }

    pub fn squash(mut self) -> StorageResult<()> {
        self.resolved = true;
        self.state.squash_revision(self.revision)
    }

    pub fn undo(mut self) -> StorageResult<()> {
        self.resolved = true;
        self.state.undo_revision(self.revision)
    }
}

impl Deref for UndoSession<'_> {
    type Target = ChainState;

    fn deref(&self) -> &ChainState {
        self.state
    }
}

impl DerefMut for UndoSession<'_> {
    fn deref_mut(&mut self) -> &mut ChainState {
        self.state
    }
}

impl Drop for UndoSession<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        if let Err(e) = self.state.undo_revision(self.revision) {
            error!(revision = self.revision, error = %e, "failed to undo dropped session");
            debug_assert!(false, "undo session dropped out of order: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PublicKey;

    fn add_account(state: &mut ChainState, name: &str) {
        state
            .accounts
            .insert(Account::new(name.into(), PublicKey::NULL, TimePointSec(0)))
            .unwrap();
    }

    #[test]
    fn test_dropped_session_reverts() {
        let mut state = ChainState::new();
        add_account(&mut state, "alice");
        {
            let mut session = state.start_undo_session();
            add_account(&mut session, "bob");
            session.globals.modify(|g| g.head_block_number = 9);
        }
        assert!(state.accounts.get("bob").is_none());
        assert_eq!(state.head_block_num(), 0);
        assert_eq!(state.revision(), 0);
    }

    #[test]
    fn test_squash_merges_into_parent() {
        let mut state = ChainState::new();
        let block = state.begin_undo();
        {
            let mut tx = state.start_undo_session();
            add_account(&mut tx, "bob");
            tx.squash().unwrap();
        }
        assert_eq!(state.revision(), block);
        assert!(state.accounts.get("bob").is_some());

        state.undo_revision(block).unwrap();
        assert!(state.accounts.get("bob").is_none());
    }

    #[test]
    fn test_commit_forgets_history() {
        let mut state = ChainState::new();
        for name in ["aaa", "bbb", "ccc"] {
            state.begin_undo();
            add_account(&mut state, name);
        }
        state.commit(2);
        assert_eq!(state.undo_depth(), 1);
        state.undo_all();
        assert_eq!(state.revision(), 2);
        assert!(state.accounts.get("bbb").is_some());
        assert!(state.accounts.get("ccc").is_none());
    }

    #[test]
    fn test_out_of_order_resolution_is_error() {
        let mut state = ChainState::new();
        let outer = state.begin_undo();
        let _inner = state.begin_undo();
        assert!(matches!(
            state.undo_revision(outer),
            Err(StorageError::UndoOrder(_))
        ));
        assert!(matches!(
            state.set_revision(5),
            Err(StorageError::UndoOrder(_))
        ));
    }

    #[test]
    fn test_same_contents_ignores_history() {
        let mut a = ChainState::new();
        let mut b = ChainState::new();
        a.begin_undo();
        add_account(&mut a, "alice");
        a.commit(1);
        b.begin_undo();
        add_account(&mut b, "alice");
        assert!(a.same_contents(&b));
    }
}
