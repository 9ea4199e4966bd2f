//! Block Application
//!
//! Applies one block on top of the current head through an `ApplyContext`.
//! The caller opens the block's undo session and undoes it on any error, so
//! a failed block leaves no trace.
//!
//! # Execution Order
//!
//! ```text
//! pre_apply_block
//! genesis hardforks            (block 1 only)
//! merkle root                  (skip: MERKLE_CHECK)
//! header: previous, timestamp, signature, scheduled witness
//! block size                   (skip: BLOCK_SIZE_CHECK)
//! current_witness = producer
//! header extensions
//! producer runs the current hardfork
//! transactions, in order
//! update_global_dynamic_data
//! update_signing_witness
//! update_last_irreversible_block
//! create_block_summary
//! clear_expired_transactions
//! clear_expired_delegations
//! update_witness_schedule
//! clear_null_account_balance
//! process_funds
//! process_comment_cashout
//! process_vesting_withdrawals
//! process_savings_withdraws
//! process_subsidized_accounts
//! account_recovery_processing
//! expire_escrow_ratification
//! process_decline_voting_rights
//! process_proposals
//! process_regent_account
//! process_hardforks
//! post_apply_block
//! ```
//!
//! Later steps read aggregates written by earlier ones; the order is
//! consensus.
//!
//! Moving irreversible blocks to the block log and committing undo history
//! happen in `Chain`, after this returns.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::context::ApplyContext;
use super::errors::{BlockApplyError, BlockApplyResult, EvalError};
use super::skip_flags::SkipFlags;
use super::tx_apply::apply_transaction;
use crate::economics::{cashout, hardforks, inflation, proposals, supply, sweeps, vesting, witness_schedule};
use crate::events::{BlockNotification, ChainEvent};
use crate::protocol::constants::{
    BLOCK_SUMMARY_RING_SIZE, IRREVERSIBLE_THRESHOLD, MIN_BLOCK_SIZE, NUM_HARDFORKS, PERCENT_100,
};
use crate::protocol::{BlockHeaderExtension, BlockId, Checksum, SignedBlock};
use crate::storage::objects::BlockSummary;

/// Blocks of the live network whose header root does not match the
/// transactions they carry, with the root that was computed for them at
/// the time. Replay must accept exactly these.
const MERKLE_ROOT_OVERRIDES: &[(u32, &str)] = &[];

fn merkle_override(block_num: u32) -> Option<Checksum> {
    MERKLE_ROOT_OVERRIDES
        .iter()
        .find(|(num, _)| *num == block_num)
        .and_then(|(_, root)| root.parse().ok())
}

fn step(name: &'static str) -> impl FnOnce(EvalError) -> BlockApplyError {
    move |source| BlockApplyError::Processing { step: name, source }
}

/// Applies `block`, whose id is `block_id`, on top of the head.
pub fn apply_block(
    ctx: &mut ApplyContext<'_>,
    block: &Arc<SignedBlock>,
    block_id: BlockId,
    max_undo_history: u32,
) -> BlockApplyResult<()> {
    let block_num = block.block_num();
    let note = BlockNotification {
        block_id,
        block_num,
        block: Arc::clone(block),
    };
    ctx.emit(&ChainEvent::PreApplyBlock(note.clone()))?;

    ctx.block_num = block_num;
    ctx.trx_in_block = None;
    ctx.op_in_trx = 0;
    ctx.virtual_op = 0;

    if block_num == 1 {
        apply_genesis_hardforks(ctx, block)?;
    }

    if !ctx.skips(SkipFlags::MERKLE_CHECK) {
        let computed = block.calculate_merkle_root();
        let declared = block.header().transaction_merkle_root;
        if declared != computed && merkle_override(block_num) != Some(computed) {
            return Err(BlockApplyError::MerkleMismatch {
                block_num,
                expected: declared,
                actual: computed,
            });
        }
    }

    validate_block_header(ctx, block)?;

    let size = block.packed_size();
    if !ctx.skips(SkipFlags::BLOCK_SIZE_CHECK) {
        let max = ctx.state.globals.maximum_block_size as usize;
        if size > max {
            return Err(BlockApplyError::BlockTooLarge { size, max });
        }
    }
    if size < MIN_BLOCK_SIZE {
        warn!(block_num, size, min = MIN_BLOCK_SIZE, "block size is below the minimum");
    }

    let producer = block.witness().clone();
    ctx.state.globals.modify(|g| g.current_witness = producer.clone());

    process_header_extensions(ctx, block)?;

    {
        let witness = ctx.state.witness(&producer)?;
        let current = ctx.state.hardforks.current_hardfork_version;
        if current > witness.running_version {
            return Err(BlockApplyError::StaleRunningVersion {
                witness: producer.clone(),
                running: witness.running_version.to_string(),
                required: current.to_string(),
            });
        }
    }

    for (index, trx) in block.transactions.iter().enumerate() {
        ctx.trx_in_block = Some(index as u32);
        apply_transaction(ctx, trx).map_err(|source| BlockApplyError::Transaction {
            index,
            trx_id: trx.id(),
            source,
        })?;
    }
    ctx.trx_in_block = None;
    ctx.op_in_trx = 0;
    ctx.virtual_op = 0;

    update_global_dynamic_data(ctx, block, block_id, max_undo_history)?;
    update_signing_witness(ctx, block)?;
    update_last_irreversible_block(ctx)?;
    create_block_summary(ctx, block_num, block_id)?;
    sweeps::clear_expired_transactions(ctx).map_err(step("clear_expired_transactions"))?;
    sweeps::clear_expired_delegations(ctx).map_err(step("clear_expired_delegations"))?;

    witness_schedule::update_witness_schedule(ctx).map_err(step("update_witness_schedule"))?;

    supply::clear_null_account_balance(ctx).map_err(step("clear_null_account_balance"))?;
    inflation::process_funds(ctx).map_err(step("process_funds"))?;
    cashout::process_comment_cashout(ctx).map_err(step("process_comment_cashout"))?;
    vesting::process_vesting_withdrawals(ctx).map_err(step("process_vesting_withdrawals"))?;
    sweeps::process_savings_withdraws(ctx).map_err(step("process_savings_withdraws"))?;
    sweeps::process_subsidized_accounts(ctx).map_err(step("process_subsidized_accounts"))?;

    sweeps::account_recovery_processing(ctx).map_err(step("account_recovery_processing"))?;
    sweeps::expire_escrow_ratification(ctx).map_err(step("expire_escrow_ratification"))?;
    sweeps::process_decline_voting_rights(ctx).map_err(step("process_decline_voting_rights"))?;
    proposals::process_proposals(ctx).map_err(step("process_proposals"))?;

    vesting::process_regent_account(ctx).map_err(step("process_regent_account"))?;

    hardforks::process_hardforks(ctx)?;

    ctx.emit(&ChainEvent::PostApplyBlock(note))?;
    debug!(block_num, witness = %producer, trxs = block.transactions.len(), "block applied");
    Ok(())
}

/// On the first block, activates every hardfork whose configured time is
/// not after the block, so a new chain can start at any point in history.
fn apply_genesis_hardforks(ctx: &mut ApplyContext<'_>, block: &SignedBlock) -> BlockApplyResult<()> {
    let mut n = 0;
    while n < NUM_HARDFORKS && ctx.hardforks.time(n + 1) <= block.timestamp() {
        n += 1;
    }
    if n == 0 {
        return Ok(());
    }
    info!(hardforks = n, "processing genesis hardforks");
    hardforks::set_hardfork(ctx, n, true)?;

    let version = ctx.hardforks.version(n);
    let time = ctx.hardforks.time(n);
    for owner in ctx.state.witnesses.keys() {
        ctx.state.witnesses.modify(&owner, |w| {
            w.running_version = version.as_version();
            w.hardfork_version_vote = version;
            w.hardfork_time_vote = time;
        })?;
    }
    Ok(())
}

/// Linkage, time, signature and schedule checks.
fn validate_block_header(ctx: &ApplyContext<'_>, block: &SignedBlock) -> BlockApplyResult<()> {
    let block_num = block.block_num();
    let globals = ctx.state.globals.get();
    if block.previous() != globals.head_block_id {
        return Err(BlockApplyError::WrongPrevious {
            block_num,
            expected: globals.head_block_id,
            actual: block.previous(),
        });
    }
    if block.timestamp() <= globals.time {
        return Err(BlockApplyError::TimestampNotIncreasing {
            block_num,
            timestamp: block.timestamp(),
            head_time: globals.time,
        });
    }

    let witness = ctx
        .state
        .witnesses
        .get(block.witness())
        .ok_or_else(|| BlockApplyError::UnknownWitness {
            block_num,
            witness: block.witness().clone(),
        })?;

    if !ctx.skips(SkipFlags::WITNESS_SIGNATURE) && !block.signed_header.validate_signee(&witness.signing_key) {
        return Err(BlockApplyError::BadWitnessSignature {
            block_num,
            witness: witness.owner.clone(),
        });
    }

    if !ctx.skips(SkipFlags::WITNESS_SCHEDULE_CHECK) {
        let slot = witness_schedule::get_slot_at_time(ctx.state, block.timestamp());
        if slot == 0 {
            return Err(BlockApplyError::TimestampNotIncreasing {
                block_num,
                timestamp: block.timestamp(),
                head_time: globals.time,
            });
        }
        let scheduled = witness_schedule::get_scheduled_witness(ctx.state, slot);
        if witness.owner != scheduled {
            return Err(BlockApplyError::WrongScheduledWitness {
                block_num,
                expected: scheduled,
                actual: witness.owner.clone(),
            });
        }
    }
    Ok(())
}

/// Records the producer's reported version and hardfork vote.
fn process_header_extensions(ctx: &mut ApplyContext<'_>, block: &SignedBlock) -> BlockApplyResult<()> {
    let owner = block.witness();
    for extension in &block.header().extensions {
        match extension {
            BlockHeaderExtension::Version(reported) => {
                if ctx.state.witness(owner)?.running_version != *reported {
                    ctx.state.witnesses.modify(owner, |w| w.running_version = *reported)?;
                }
            }
            BlockHeaderExtension::HardforkVersionVote { hf_version, hf_time } => {
                let w = ctx.state.witness(owner)?;
                if w.hardfork_version_vote != *hf_version || w.hardfork_time_vote != *hf_time {
                    ctx.state.witnesses.modify(owner, |w| {
                        w.hardfork_version_vote = *hf_version;
                        w.hardfork_time_vote = *hf_time;
                    })?;
                }
            }
        }
    }
    Ok(())
}

/// Missed slots, participation, head pointers and the undo history bound.
fn update_global_dynamic_data(
    ctx: &mut ApplyContext<'_>,
    block: &SignedBlock,
    block_id: BlockId,
    max_undo_history: u32,
) -> BlockApplyResult<()> {
    let mut missed_blocks = 0u32;
    if ctx.head_block_num() != 0 {
        missed_blocks = witness_schedule::get_slot_at_time(ctx.state, block.timestamp()).saturating_sub(1);
        for i in 0..missed_blocks {
            let missed = witness_schedule::get_scheduled_witness(ctx.state, i + 1);
            if missed != *block.witness() && ctx.state.witnesses.contains(&missed) {
                ctx.state.witnesses.modify(&missed, |w| w.total_missed += 1)?;
            }
        }
        if missed_blocks > 0 {
            debug!(block_num = block.block_num(), missed_blocks, "witnesses missed their slots");
        }
    }

    let block_num = block.block_num();
    let timestamp = block.timestamp();
    ctx.state.globals.modify(|g| {
        for i in 0..=missed_blocks {
            if g.recent_slots_filled & (1u128 << 127) != 0 {
                g.participation_count -= 1;
            }
            g.recent_slots_filled = (g.recent_slots_filled << 1) + u128::from(i == 0);
            if i == 0 {
                g.participation_count += 1;
            }
        }
        g.head_block_number = block_num;
        g.head_block_id = block_id;
        g.time = timestamp;
        g.current_aslot += missed_blocks as u64 + 1;
    });

    if !ctx.skips(SkipFlags::UNDO_HISTORY_CHECK) {
        let globals = ctx.state.globals.get();
        if globals.head_block_number - globals.last_irreversible_block_num >= max_undo_history {
            return Err(BlockApplyError::UndoHistoryExhausted {
                head: globals.head_block_number,
                last_irreversible: globals.last_irreversible_block_num,
            });
        }
    }
    Ok(())
}

fn update_signing_witness(ctx: &mut ApplyContext<'_>, block: &SignedBlock) -> BlockApplyResult<()> {
    // Head time already moved to this block, so its own slot is 0 here.
    let aslot = ctx.state.globals.current_aslot;
    let block_num = block.block_num();
    ctx.state.witnesses.modify(block.witness(), |w| {
        w.last_aslot = aslot;
        w.last_confirmed_block_num = block_num;
    })?;
    Ok(())
}

/// Advances the last irreversible block to the block confirmed by
/// `IRREVERSIBLE_THRESHOLD` of the scheduled witnesses, notifying each newly
/// irreversible block number.
fn update_last_irreversible_block(ctx: &mut ApplyContext<'_>) -> BlockApplyResult<()> {
    let old = ctx.state.globals.last_irreversible_block_num;
    let mut confirmed: Vec<u32> = Vec::new();
    for owner in &ctx.state.schedule.current_shuffled_witnesses {
        if let Some(w) = ctx.state.witnesses.get(owner) {
            confirmed.push(w.last_confirmed_block_num);
        }
    }
    if confirmed.is_empty() {
        return Ok(());
    }
    confirmed.sort_unstable();
    let offset = (PERCENT_100 as u32 - IRREVERSIBLE_THRESHOLD) as usize * confirmed.len() / PERCENT_100 as usize;
    let candidate = confirmed[offset];
    if candidate <= old {
        return Ok(());
    }

    ctx.state.globals.modify(|g| g.last_irreversible_block_num = candidate);
    for num in old + 1..=candidate {
        ctx.emit(&ChainEvent::IrreversibleBlock(num))?;
    }
    debug!(last_irreversible = candidate, previous = old, "irreversible block advanced");
    Ok(())
}

fn create_block_summary(ctx: &mut ApplyContext<'_>, block_num: u32, block_id: BlockId) -> BlockApplyResult<()> {
    let slot = (block_num % BLOCK_SUMMARY_RING_SIZE) as u16;
    if ctx.state.block_summaries.contains(&slot) {
        ctx.state.block_summaries.modify(&slot, |s| s.block_id = block_id)?;
    } else {
        ctx.state.block_summaries.insert(BlockSummary { slot, block_id })?;
    }
    Ok(())
}
