//! Transaction Application
//!
//! Applies one signed transaction to the ledger through an `ApplyContext`.
//! The caller owns the undo session; a returned error means the session
//! must be undone.
//!
//! # Order
//!
//! ```text
//! validate            (skip: VALIDATE)
//! dedup check         (skip: TRANSACTION_DUPE_CHECK)
//! signatures          (skip: TRANSACTION_SIGNATURES or AUTHORITY_CHECK)
//! TaPoS               (skip: TAPOS_CHECK, and always on block 1)
//! expiration window   (always, except on block 1)
//! record for dedup    (skip: TRANSACTION_DUPE_CHECK)
//! fee                 (from HARDFORK_1)
//! pre_apply_transaction
//!   for op: pre_apply_operation, evaluate, post_apply_operation
//! post_apply_transaction
//! ```
//!
//! # Fee
//!
//! ```text
//! fee = max(flat_fee * ops, 1) + max(bincode_size * kbytes_fee / 1024, 1)
//! ```
//!
//! charged to every account in the owner, active and posting sets and
//! credited to the fee sink (`treasury` before HARDFORK_4, `null` after).

use std::sync::Arc;

use tracing::trace;

use super::authority::verify_authority;
use super::context::ApplyContext;
use super::errors::{TxApplyError, TxApplyResult};
use super::skip_flags::SkipFlags;
use crate::economics::supply::{adjust_balance, fee_sink};
use crate::evaluators::apply_operation;
use crate::events::{ChainEvent, TransactionNotification};
use crate::protocol::constants::{HARDFORK_1, MAX_TIME_UNTIL_EXPIRATION};
use crate::protocol::{AppliedOperation, Asset, SignedTransaction, TransactionId};
use crate::storage::objects::TransactionRecord;
use crate::storage::ChainState;

/// Fee charged to each required account of `trx`.
pub fn transaction_fee(state: &ChainState, trx: &SignedTransaction) -> Asset {
    let props = &state.schedule.median_props;
    let ops = trx.operations.len() as i64;
    let flat = (props.operation_flat_fee.amount * ops).max(1);
    let size = trx.packed_size() as i64;
    let bandwidth = (size.saturating_mul(props.bandwidth_kbytes_fee.amount) / 1024).max(1);
    Asset::liquid(flat + bandwidth)
}

/// Moves the transaction fee from every required account to the sink.
fn process_tx_fee(ctx: &mut ApplyContext<'_>, trx: &SignedTransaction) -> TxApplyResult<()> {
    if !ctx.has_hardfork(HARDFORK_1) {
        return Ok(());
    }
    let fee = transaction_fee(ctx.state, trx);
    let sink = fee_sink(ctx.state);
    for account in trx.required_authorities().all_accounts() {
        let balance = ctx.state.account(&account)?.balance;
        if balance.amount < fee.amount {
            return Err(TxApplyError::InsufficientFee {
                account,
                fee,
                balance,
            });
        }
        adjust_balance(ctx.state, &account, -fee).map_err(TxApplyError::FeeTransfer)?;
        adjust_balance(ctx.state, &sink, fee).map_err(TxApplyError::FeeTransfer)?;
        trace!(%account, %fee, %sink, "transaction fee charged");
    }
    Ok(())
}

/// Replay and expiry checks against the current head.
fn check_tapos_and_expiration(ctx: &ApplyContext<'_>, trx: &SignedTransaction) -> TxApplyResult<()> {
    if ctx.head_block_num() == 0 {
        // Nothing to reference and nothing can have expired yet.
        return Ok(());
    }
    if !ctx.skips(SkipFlags::TAPOS_CHECK) {
        let summary = ctx.state.block_summaries.require(&trx.ref_block_num)?;
        if summary.block_id.tapos_prefix() != trx.ref_block_prefix {
            return Err(TxApplyError::TaposMismatch {
                ref_block_num: trx.ref_block_num,
                ref_block_prefix: trx.ref_block_prefix,
            });
        }
    }

    let now = ctx.now();
    let max = now + MAX_TIME_UNTIL_EXPIRATION;
    if trx.expiration > max {
        return Err(TxApplyError::ExpirationTooFar {
            expiration: trx.expiration,
            max,
        });
    }
    if now >= trx.expiration {
        return Err(TxApplyError::Expired {
            expiration: trx.expiration,
            now,
        });
    }
    Ok(())
}

/// Applies `trx`. `ctx.trx_in_block` is left to the caller.
pub fn apply_transaction(ctx: &mut ApplyContext<'_>, trx: &SignedTransaction) -> TxApplyResult<()> {
    let trx_id = trx.id();
    ctx.trx_id = trx_id;
    ctx.virtual_op = 0;
    ctx.op_in_trx = 0;

    if !ctx.skips(SkipFlags::VALIDATE) {
        trx.validate()?;
    }

    let check_dupes = !ctx.skips(SkipFlags::TRANSACTION_DUPE_CHECK);
    if check_dupes && ctx.state.transactions.contains(&trx_id) {
        return Err(TxApplyError::Duplicate(trx_id));
    }

    if !ctx.skips(SkipFlags::TRANSACTION_SIGNATURES) && !ctx.skips(SkipFlags::AUTHORITY_CHECK) {
        let keys = trx.signature_keys(&ctx.chain_id)?;
        verify_authority(ctx.state, &trx.required_authorities(), &keys)?;
    }

    check_tapos_and_expiration(ctx, trx)?;

    if check_dupes {
        ctx.state.transactions.insert(TransactionRecord {
            trx_id,
            expiration: trx.expiration,
        })?;
    }

    process_tx_fee(ctx, trx)?;

    let note = TransactionNotification {
        trx_id,
        block_num: ctx.block_num,
        transaction: Arc::new(trx.clone()),
    };
    ctx.emit(&ChainEvent::PreApplyTransaction(note.clone()))?;

    for (index, op) in trx.operations.iter().enumerate() {
        let op_note = ctx.operation_notification(AppliedOperation::User(op.clone()));
        ctx.emit(&ChainEvent::PreApplyOperation(op_note.clone()))?;
        apply_operation(ctx, op).map_err(|source| TxApplyError::Operation {
            index,
            op: op.name(),
            source,
        })?;
        ctx.emit(&ChainEvent::PostApplyOperation(op_note))?;
        ctx.op_in_trx += 1;
    }

    ctx.emit(&ChainEvent::PostApplyTransaction(note))?;
    ctx.trx_id = TransactionId::ZERO;
    trace!(trx_id = %trx_id, ops = trx.operations.len(), "transaction applied");
    Ok(())
}
