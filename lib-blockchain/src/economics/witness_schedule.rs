//! Witness scheduling.
//!
//! Every round the schedule takes the top voted witnesses plus runners
//! chosen by virtual time, shuffles them deterministically, and re-derives
//! the median chain properties, the hardfork vote and the subsidy pools.
//!
//! # Virtual time
//!
//! A runner's `virtual_scheduled_time` is when it finishes a lap of
//! `VIRTUAL_SCHEDULE_LAP_LENGTH` at a speed of `votes + 1`. The runner with
//! the earliest time is picked and the schedule's virtual clock advances to
//! it, so a witness is picked in proportion to its votes.
//!
//! # Slots
//!
//! ```text
//! slot 0 = head block time
//! slot n = (head_time / BLOCK_INTERVAL) * BLOCK_INTERVAL + n * BLOCK_INTERVAL
//! witness(slot) = shuffled[(current_aslot + slot) % num_scheduled]
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use super::resource_dynamics::RdDynamicsParams;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::{AccountName, ChainProperties, HardforkVersion, TimePointSec, Version};
use crate::storage::objects::{witness_index, WitnessScheduleType};
use crate::storage::ChainState;

// =============================================================================
// SLOTS
// =============================================================================

/// Time of slot `slot` counted from the head block. Slot 0 means "no slot".
pub fn get_slot_time(state: &ChainState, slot: u32) -> TimePointSec {
    if slot == 0 {
        return TimePointSec::MINIMUM;
    }
    let offset = slot.saturating_mul(BLOCK_INTERVAL);
    if state.head_block_num() == 0 {
        // The first block is one interval after genesis.
        return state.globals.time + offset;
    }
    let head_slot_time = state.head_block_time().secs() / BLOCK_INTERVAL * BLOCK_INTERVAL;
    TimePointSec(head_slot_time) + offset
}

/// Slot number of `when`, or 0 if it is not after the head block's slot.
pub fn get_slot_at_time(state: &ChainState, when: TimePointSec) -> u32 {
    let first = get_slot_time(state, 1);
    if when < first {
        return 0;
    }
    (when.secs() - first.secs()) / BLOCK_INTERVAL + 1
}

pub fn get_scheduled_witness(state: &ChainState, slot: u32) -> AccountName {
    let schedule = state.schedule.get();
    let aslot = state.globals.current_aslot + slot as u64;
    let num = (schedule.num_scheduled_witnesses as u64).max(1);
    schedule
        .current_shuffled_witnesses
        .get((aslot % num) as usize)
        .cloned()
        .unwrap_or_default()
}

// =============================================================================
// VIRTUAL TIME
// =============================================================================

pub fn reset_virtual_schedule_time(state: &mut ChainState) -> EvalResult<()> {
    state.schedule.modify(|s| s.current_virtual_time = 0);
    for owner in state.witnesses.keys() {
        state.witnesses.modify(&owner, |w| {
            w.virtual_position = 0;
            w.virtual_last_update = 0;
            w.virtual_scheduled_time = VIRTUAL_SCHEDULE_LAP_LENGTH / (w.votes.max(0) as u128 + 1);
        })?;
    }
    Ok(())
}

// =============================================================================
// ROUND
// =============================================================================

/// Recomputes the schedule once per round.
pub fn update_witness_schedule(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let num_scheduled = (ctx.state.schedule.num_scheduled_witnesses as u32).max(1);
    if ctx.head_block_num() % num_scheduled != 0 {
        return Ok(());
    }
    let state = &mut *ctx.state;
    let schedule = state.schedule.get().clone();

    let mut active: Vec<AccountName> = Vec::with_capacity(MAX_WITNESSES);
    let mut selected: BTreeSet<AccountName> = BTreeSet::new();

    let voted: Vec<AccountName> = state
        .witnesses
        .iter_by(witness_index::BY_VOTE)
        .filter(|w| !w.signing_key.is_null())
        .take(schedule.max_voted_witnesses as usize)
        .map(|w| w.owner.clone())
        .collect();
    for owner in voted {
        state
            .witnesses
            .modify(&owner, |w| w.schedule = WitnessScheduleType::Elected)?;
        selected.insert(owner.clone());
        active.push(owner);
    }
    let num_elected = active.len();

    // Runners in virtual time order. Everyone passed over advances too.
    let mut new_virtual_time = schedule.current_virtual_time;
    let mut processed: Vec<AccountName> = Vec::new();
    let mut num_timeshare = 0usize;
    let by_time: Vec<(AccountName, u128, bool)> = state
        .witnesses
        .iter_by(witness_index::BY_SCHEDULE_TIME)
        .map(|w| (w.owner.clone(), w.virtual_scheduled_time, w.signing_key.is_null()))
        .collect();
    for (owner, scheduled_time, null_key) in by_time {
        if active.len() >= MAX_WITNESSES
            || num_timeshare >= schedule.max_runner_witnesses as usize
        {
            break;
        }
        new_virtual_time = scheduled_time;
        processed.push(owner.clone());
        if null_key || selected.contains(&owner) {
            continue;
        }
        state
            .witnesses
            .modify(&owner, |w| w.schedule = WitnessScheduleType::Timeshare)?;
        active.push(owner);
        num_timeshare += 1;
    }

    let mut reset_virtual_time = false;
    for owner in &processed {
        let votes = state.witness(owner)?.votes.max(0) as u128;
        let next = new_virtual_time.wrapping_add(VIRTUAL_SCHEDULE_LAP_LENGTH / (votes + 1));
        if next < new_virtual_time {
            reset_virtual_time = true;
            break;
        }
        state.witnesses.modify(owner, |w| {
            w.virtual_position = 0;
            w.virtual_last_update = new_virtual_time;
            w.virtual_scheduled_time = next;
        })?;
    }
    if reset_virtual_time {
        new_virtual_time = 0;
        reset_virtual_schedule_time(state)?;
    }

    if active.is_empty() {
        warn!(block_num = state.head_block_num(), "no witness with a signing key, schedule kept");
        return Ok(());
    }

    tally_versions(state, &active, schedule.hardfork_required_witnesses)?;

    // Deterministic shuffle seeded by the head block time.
    let now_hi = (state.head_block_time().secs() as u64) << 32;
    let num = active.len();
    for i in 0..num {
        let mut k = now_hi.wrapping_add((i as u64).wrapping_mul(2_685_821_657_736_338_717));
        k ^= k >> 12;
        k ^= k << 25;
        k ^= k >> 27;
        k = k.wrapping_mul(2_685_821_657_736_338_717);
        let jmax = (num - i) as u64;
        let j = i + (k % jmax) as usize;
        active.swap(i, j);
    }

    let head = state.head_block_num();
    let normalization = schedule.elected_weight as u32 * num_elected as u32
        + schedule.timeshare_weight as u32 * num_timeshare as u32;
    state.schedule.modify(|s| {
        s.num_scheduled_witnesses = num as u8;
        s.current_shuffled_witnesses = active;
        s.witness_pay_normalization_factor = normalization;
        s.current_virtual_time = new_virtual_time;
        s.next_shuffle_block_num = head + num as u32;
    });
    debug!(
        block_num = head,
        elected = num_elected,
        timeshare = num_timeshare,
        "witness schedule updated"
    );

    update_median_witness_props(state)
}

/// Majority running version and hardfork vote among the active witnesses.
fn tally_versions(state: &mut ChainState, active: &[AccountName], required: u8) -> EvalResult<()> {
    let mut versions: BTreeMap<Version, u32> = BTreeMap::new();
    let mut hardfork_votes: BTreeMap<(HardforkVersion, TimePointSec), u32> = BTreeMap::new();
    for owner in active {
        let w = state.witness(owner)?;
        *versions.entry(w.running_version).or_default() += 1;
        *hardfork_votes
            .entry((w.hardfork_version_vote, w.hardfork_time_vote))
            .or_default() += 1;
    }

    // Highest version that at least `required` witnesses run or exceed.
    let mut on_version = 0u32;
    for (version, count) in versions.iter().rev() {
        on_version += count;
        if on_version >= required as u32 {
            let version = *version;
            state.schedule.modify(|s| s.majority_version = version);
            break;
        }
    }

    let winner = hardfork_votes
        .iter()
        .find(|(_, count)| **count >= required as u32)
        .map(|(vote, _)| *vote);
    match winner {
        Some((version, time)) => {
            let hardforks = state.hardforks.get();
            if hardforks.next_hardfork != version || hardforks.next_hardfork_time != time {
                info!(next_hardfork = %version, time = %time, "witnesses agreed on next hardfork");
                state.hardforks.modify(|h| {
                    h.next_hardfork = version;
                    h.next_hardfork_time = time;
                });
            }
        }
        None => state
            .hardforks
            .modify(|h| h.next_hardfork = h.current_hardfork_version),
    }
    Ok(())
}

fn median<T: Ord + Copy>(mut values: Vec<T>) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.sort();
    Some(values[values.len() / 2])
}

/// Median of each chain property across the scheduled witnesses, plus the
/// subsidy pool parameters derived from them.
pub fn update_median_witness_props(state: &mut ChainState) -> EvalResult<()> {
    let mut props: Vec<ChainProperties> = Vec::new();
    for owner in state.schedule.current_shuffled_witnesses.clone() {
        if owner.is_empty() {
            continue;
        }
        props.push(state.witness(&owner)?.props.clone());
    }
    if props.is_empty() {
        return Ok(());
    }

    let mut median_props = state.schedule.median_props.clone();
    if let Some(fee) = median(props.iter().map(|p| p.account_creation_fee.amount).collect()) {
        median_props.account_creation_fee.amount = fee;
    }
    if let Some(size) = median(props.iter().map(|p| p.maximum_block_size).collect()) {
        median_props.maximum_block_size = size;
    }
    if let Some(budget) = median(props.iter().map(|p| p.account_subsidy_budget).collect()) {
        median_props.account_subsidy_budget = budget;
    }
    if let Some(decay) = median(props.iter().map(|p| p.account_subsidy_decay).collect()) {
        median_props.account_subsidy_decay = decay;
    }
    if let Some(fee) = median(props.iter().map(|p| p.operation_flat_fee.amount).collect()) {
        median_props.operation_flat_fee.amount = fee;
    }
    if let Some(fee) = median(props.iter().map(|p| p.bandwidth_kbytes_fee.amount).collect()) {
        median_props.bandwidth_kbytes_fee.amount = fee;
    }

    let (global_rd, witness_rd) = subsidy_params(&median_props);
    let maximum_block_size = median_props.maximum_block_size;
    state.schedule.modify(|s| {
        s.median_props = median_props;
        s.account_subsidy_rd = global_rd;
        s.account_subsidy_witness_rd = witness_rd;
    });
    state
        .globals
        .modify(|g| g.maximum_block_size = maximum_block_size);
    Ok(())
}

/// Global and per-witness subsidy pool parameters.
pub fn subsidy_params(props: &ChainProperties) -> (RdDynamicsParams, RdDynamicsParams) {
    let global = RdDynamicsParams::setup(props.account_subsidy_budget, props.account_subsidy_decay);

    let witness_budget = (props.account_subsidy_budget as i64 * WITNESS_SUBSIDY_BUDGET_PERCENT
        / PERCENT_100 as i64)
        .min(i32::MAX as i64) as i32;
    let witness_decay = (props.account_subsidy_decay as u64 * WITNESS_SUBSIDY_DECAY_PERCENT
        / PERCENT_100 as u64)
        .min(u32::MAX as u64) as u32;
    (global, RdDynamicsParams::setup(witness_budget, witness_decay))
}
