//! Apply context.
//!
//! Everything an evaluator or end-of-block step may read or write: the
//! ledger, the listeners, and the position of the current operation within
//! its block. Passed explicitly; there is no ambient "current block" state.

use tracing::trace;

use super::errors::EvalResult;
use super::skip_flags::SkipFlags;
use crate::events::{ChainEvent, Notifier, OperationNotification};
use crate::protocol::{
    AppliedOperation, ChainId, HardforkSchedule, TimePointSec, TransactionId, VirtualOperation,
};
use crate::storage::ChainState;

pub struct ApplyContext<'a> {
    pub state: &'a mut ChainState,
    notifier: &'a mut Notifier,
    pub hardforks: &'a HardforkSchedule,
    pub chain_id: ChainId,
    pub skip: SkipFlags,
    /// True while applying pending transactions or producing a block.
    pub is_producing: bool,

    pub block_num: u32,
    pub trx_id: TransactionId,
    /// `None` outside a transaction.
    pub trx_in_block: Option<u32>,
    pub op_in_trx: u32,
    pub virtual_op: u32,
}

impl<'a> ApplyContext<'a> {
    pub fn new(
        state: &'a mut ChainState,
        notifier: &'a mut Notifier,
        hardforks: &'a HardforkSchedule,
        chain_id: ChainId,
        skip: SkipFlags,
    ) -> Self {
        let block_num = state.head_block_num() + 1;
        Self {
            state,
            notifier,
            hardforks,
            chain_id,
            skip,
            is_producing: false,
            block_num,
            trx_id: TransactionId::ZERO,
            trx_in_block: None,
            op_in_trx: 0,
            virtual_op: 0,
        }
    }

    pub fn skips(&self, flag: SkipFlags) -> bool {
        self.skip.contains(flag)
    }

    /// Head block time. Inside a block this is the previous block's time
    /// until the end-of-block steps advance it.
    pub fn now(&self) -> TimePointSec {
        self.state.head_block_time()
    }

    pub fn head_block_num(&self) -> u32 {
        self.state.head_block_num()
    }

    pub fn has_hardfork(&self, hardfork: u32) -> bool {
        self.state.has_hardfork(hardfork)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    pub fn emit(&mut self, event: &ChainEvent) -> anyhow::Result<()> {
        self.notifier.emit(event)
    }

    pub fn operation_notification(&self, op: AppliedOperation) -> OperationNotification {
        OperationNotification {
            trx_id: self.trx_id,
            block_num: self.block_num,
            trx_in_block: self.trx_in_block,
            op_in_trx: self.op_in_trx,
            virtual_op: self.virtual_op,
            op,
        }
    }

    /// Announces a virtual operation whose effects are about to be applied.
    /// Pair with `post_virtual_operation`.
    pub fn pre_virtual_operation(&mut self, vop: VirtualOperation) -> EvalResult<OperationNotification> {
        self.virtual_op += 1;
        let note = self.operation_notification(AppliedOperation::Virtual(vop));
        trace!(block_num = self.block_num, op = note.op.name(), "virtual operation");
        self.emit(&ChainEvent::PreApplyOperation(note.clone()))?;
        Ok(note)
    }

    pub fn post_virtual_operation(&mut self, note: OperationNotification) -> EvalResult<()> {
        self.emit(&ChainEvent::PostApplyOperation(note))?;
        Ok(())
    }

    /// Pre and post notifications for a virtual operation with no effects
    /// of its own between them.
    pub fn push_virtual_operation(&mut self, vop: VirtualOperation) -> EvalResult<()> {
        let note = self.pre_virtual_operation(vop)?;
        self.post_virtual_operation(note)
    }
}

impl std::fmt::Debug for ApplyContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyContext")
            .field("block_num", &self.block_num)
            .field("trx_in_block", &self.trx_in_block)
            .field("op_in_trx", &self.op_in_trx)
            .field("skip", &self.skip)
            .field("is_producing", &self.is_producing)
            .finish_non_exhaustive()
    }
}
