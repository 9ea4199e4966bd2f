//! Vesting shares and witness vote weight.
//!
//! Vote weight follows vesting shares: every change to an account's shares
//! is pushed along its proxy chain and into the witnesses it votes for.
//!
//! # Invariants
//!
//! - A proxy chain is followed for at most `MAX_PROXY_RECURSION_DEPTH` hops
//! - `proxied_vsf_votes[d]` holds weight that arrived through `d + 1` hops
//! - A witness's `virtual_scheduled_time` is never earlier than the
//!   schedule's current virtual time

use tracing::{debug, info};

use super::manabar::ManabarParams;
use crate::execution::context::ApplyContext;
use crate::execution::errors::{EvalError, EvalResult};
use crate::protocol::constants::*;
use crate::protocol::{AccountName, Asset, TimePointSec, VirtualOperation};
use crate::storage::objects::{account_index, Account, WitnessVote};
use crate::storage::ChainState;

/// Per-depth deltas, one longer than the proxy array so the account's own
/// shares ride in slot 0.
pub type VoteDeltas = [i64; MAX_PROXY_RECURSION_DEPTH + 1];

// =============================================================================
// MANA
// =============================================================================

pub fn voting_manabar_params(account: &Account) -> ManabarParams {
    ManabarParams {
        max_mana: account.effective_vesting_shares(),
        regen_time: VOTING_MANA_REGENERATION_SECONDS,
    }
}

/// Regenerates the voting manabar to `now` and then adds `delta` mana.
pub fn regenerate_and_add_mana(account: &mut Account, now: TimePointSec, delta: i64) {
    let params = voting_manabar_params(account);
    account.voting_manabar.regenerate(params, now.secs());
    account.voting_manabar.use_mana(-delta);
}

// =============================================================================
// VESTING
// =============================================================================

/// Converts `liquid` into vesting shares for `to`.
///
/// With `to_reward` the shares land in the unclaimed reward balance at the
/// reward price. `before` runs once the share amount is known and before
/// any write, which is where callers announce their virtual operation.
pub fn create_vesting_with<R, F>(
    ctx: &mut ApplyContext<'_>,
    to: &AccountName,
    liquid: Asset,
    to_reward: bool,
    before: F,
) -> EvalResult<(Asset, R)>
where
    F: FnOnce(&mut ApplyContext<'_>, Asset) -> EvalResult<R>,
{
    if !liquid.is_liquid() {
        return Err(EvalError::Internal(format!("create_vesting with {liquid}")));
    }
    let price = if to_reward {
        ctx.state.globals.reward_vesting_share_price()
    } else {
        ctx.state.globals.vesting_share_price()
    };
    let new_vesting = liquid.convert(&price)?;
    let announced = before(ctx, new_vesting)?;

    if to_reward {
        super::supply::adjust_reward_balance(ctx.state, to, liquid, new_vesting)?;
        ctx.state.globals.modify(|g| {
            g.pending_rewarded_vesting_shares += new_vesting;
            g.pending_rewarded_vesting_liquid += liquid;
        });
        return Ok((new_vesting, announced));
    }

    let now = ctx.now();
    ctx.state.accounts.modify(to, |a| {
        regenerate_and_add_mana(a, now, new_vesting.amount);
        a.vesting_shares += new_vesting;
    })?;
    ctx.state.globals.modify(|g| {
        g.total_vesting_fund_liquid += liquid;
        g.total_vesting_shares += new_vesting;
    });
    adjust_proxied_witness_votes(ctx.state, to, new_vesting.amount)?;
    Ok((new_vesting, announced))
}

pub fn create_vesting(
    ctx: &mut ApplyContext<'_>,
    to: &AccountName,
    liquid: Asset,
    to_reward: bool,
) -> EvalResult<Asset> {
    create_vesting_with(ctx, to, liquid, to_reward, |_, _| Ok(())).map(|(vests, _)| vests)
}

// =============================================================================
// WITNESS VOTE WEIGHT
// =============================================================================

/// Pushes per-depth deltas along `name`'s proxy chain, landing the total on
/// the witnesses voted for by the account at the end of the chain.
pub fn adjust_proxied_witness_votes_by_depth(
    state: &mut ChainState,
    name: &AccountName,
    delta: &VoteDeltas,
) -> EvalResult<()> {
    let mut current = name.clone();
    for depth in 0..=MAX_PROXY_RECURSION_DEPTH {
        let proxy = state.account(&current)?.proxy.clone();
        if proxy.is_empty() {
            let total: i64 = delta[..=MAX_PROXY_RECURSION_DEPTH - depth].iter().sum();
            return adjust_witness_votes(state, &current, total);
        }
        if depth >= MAX_PROXY_RECURSION_DEPTH {
            // Nested past the limit: the weight stops here.
            return Ok(());
        }
        state.accounts.modify(&proxy, |p| {
            for i in (0..MAX_PROXY_RECURSION_DEPTH - depth).rev() {
                p.proxied_vsf_votes[i + depth] += delta[i];
            }
        })?;
        current = proxy;
    }
    Ok(())
}

/// Pushes one delta along `name`'s proxy chain.
pub fn adjust_proxied_witness_votes(state: &mut ChainState, name: &AccountName, delta: i64) -> EvalResult<()> {
    if delta == 0 {
        return Ok(());
    }
    let mut current = name.clone();
    for depth in 0..=MAX_PROXY_RECURSION_DEPTH {
        let proxy = state.account(&current)?.proxy.clone();
        if proxy.is_empty() {
            return adjust_witness_votes(state, &current, delta);
        }
        if depth >= MAX_PROXY_RECURSION_DEPTH {
            return Ok(());
        }
        state
            .accounts
            .modify(&proxy, |p| p.proxied_vsf_votes[depth] += delta)?;
        current = proxy;
    }
    Ok(())
}

/// Witnesses `account` votes for, in witness name order.
pub fn witness_votes_of(state: &ChainState, account: &AccountName) -> Vec<AccountName> {
    state
        .witness_votes
        .range((account.clone(), AccountName::default())..)
        .take_while(|v| &v.account == account)
        .map(|v| v.witness.clone())
        .collect()
}

pub fn adjust_witness_votes(state: &mut ChainState, account: &AccountName, delta: i64) -> EvalResult<()> {
    if delta == 0 {
        return Ok(());
    }
    for witness in witness_votes_of(state, account) {
        adjust_witness_vote(state, &witness, delta)?;
    }
    Ok(())
}

/// Upper bound on any witness's votes: all vesting shares, plus the regent
/// weight once it counts.
fn max_witness_votes(state: &ChainState) -> i64 {
    let globals = &state.globals;
    let mut bound = globals.total_vesting_shares.amount;
    if state.has_hardfork(HARDFORK_4) {
        bound += globals.regent_vesting_shares.amount;
    }
    bound
}

/// Changes a witness's votes, settling its virtual position first so the
/// change only affects scheduling from the current virtual time on.
pub fn adjust_witness_vote(state: &mut ChainState, witness: &AccountName, delta: i64) -> EvalResult<()> {
    let current_virtual_time = state.schedule.current_virtual_time;
    let bound = max_witness_votes(state);
    let w = state.witness(witness)?;
    let votes = w.votes + delta;
    if votes > bound {
        return Err(EvalError::Internal(format!(
            "witness {witness} votes {votes} exceed total vesting shares {bound}"
        )));
    }
    state.witnesses.modify(witness, |w| {
        let elapsed = current_virtual_time.wrapping_sub(w.virtual_last_update);
        let delta_pos = (w.votes.max(0) as u128).wrapping_mul(elapsed);
        w.virtual_position = w.virtual_position.wrapping_add(delta_pos);
        w.virtual_last_update = current_virtual_time;
        w.votes = votes;
        w.virtual_scheduled_time = w.virtual_last_update.wrapping_add(
            VIRTUAL_SCHEDULE_LAP_LENGTH.wrapping_sub(w.virtual_position) / (votes.max(0) as u128 + 1),
        );
        if w.virtual_scheduled_time < current_virtual_time {
            w.virtual_scheduled_time = u128::MAX;
        }
    })?;
    Ok(())
}

pub fn clear_witness_votes(state: &mut ChainState, account: &AccountName) -> EvalResult<()> {
    for witness in witness_votes_of(state, account) {
        state.witness_votes.remove(&(account.clone(), witness))?;
    }
    state.accounts.modify(account, |a| a.witnesses_voted_for = 0)?;
    Ok(())
}

/// Inserts a vote record without touching weights.
pub fn insert_witness_vote(state: &mut ChainState, account: &AccountName, witness: &AccountName) -> EvalResult<()> {
    state.witness_votes.insert(WitnessVote {
        account: account.clone(),
        witness: witness.clone(),
    })?;
    Ok(())
}

// =============================================================================
// POWER DOWN
// =============================================================================

/// Pays out every due weekly vesting withdrawal.
///
/// Auto-vest routes are paid first as shares, then liquid routes at the
/// current price, then the remainder to the account itself.
pub fn process_vesting_withdrawals(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    let due = ctx
        .state
        .accounts
        .keys_by_while(account_index::BY_NEXT_VESTING_WITHDRAWAL, |a| a.next_vesting_withdrawal <= now);

    for name in due {
        let from = ctx.state.account(&name)?.clone();
        let rate = from.vesting_withdraw_rate.amount;
        let remaining = from.to_withdraw - from.withdrawn;
        let to_withdraw = if remaining < rate {
            from.vesting_shares.amount.min(from.to_withdraw.checked_rem(rate).unwrap_or(0))
        } else {
            from.vesting_shares.amount.min(rate)
        };

        let routes: Vec<_> = ctx
            .state
            .withdraw_routes
            .range((name.clone(), AccountName::default())..)
            .take_while(|r| r.from_account == name)
            .cloned()
            .collect();

        let mut deposited_as_vests = 0i64;
        let mut deposited_as_liquid = 0i64;

        for route in routes.iter().filter(|r| r.auto_vest) {
            let to_deposit = (to_withdraw as u128 * route.percent as u128 / PERCENT_100 as u128) as i64;
            deposited_as_vests += to_deposit;
            if to_deposit > 0 {
                let note = ctx.pre_virtual_operation(VirtualOperation::FillVestingWithdraw {
                    from_account: name.clone(),
                    to_account: route.to_account.clone(),
                    withdrawn: Asset::vests(to_deposit),
                    deposited: Asset::vests(to_deposit),
                })?;
                ctx.state
                    .accounts
                    .modify(&route.to_account, |a| a.vesting_shares.amount += to_deposit)?;
                adjust_proxied_witness_votes(ctx.state, &route.to_account, to_deposit)?;
                ctx.post_virtual_operation(note)?;
            }
        }

        for route in routes.iter().filter(|r| !r.auto_vest) {
            let to_deposit = (to_withdraw as u128 * route.percent as u128 / PERCENT_100 as u128) as i64;
            deposited_as_liquid += to_deposit;
            let price = ctx.state.globals.vesting_share_price();
            let converted = Asset::vests(to_deposit).convert(&price)?;
            if to_deposit > 0 {
                let note = ctx.pre_virtual_operation(VirtualOperation::FillVestingWithdraw {
                    from_account: name.clone(),
                    to_account: route.to_account.clone(),
                    withdrawn: Asset::vests(to_deposit),
                    deposited: converted,
                })?;
                ctx.state
                    .accounts
                    .modify(&route.to_account, |a| a.balance += converted)?;
                ctx.state.globals.modify(|g| {
                    g.total_vesting_fund_liquid -= converted;
                    g.total_vesting_shares.amount -= to_deposit;
                });
                ctx.post_virtual_operation(note)?;
            }
        }

        let to_convert = to_withdraw - deposited_as_liquid - deposited_as_vests;
        if to_convert < 0 {
            return Err(EvalError::Internal(format!(
                "{name} deposited more vests than were withdrawn"
            )));
        }
        let price = ctx.state.globals.vesting_share_price();
        let converted = Asset::vests(to_convert).convert(&price)?;
        let note = ctx.pre_virtual_operation(VirtualOperation::FillVestingWithdraw {
            from_account: name.clone(),
            to_account: name.clone(),
            withdrawn: Asset::vests(to_convert),
            deposited: converted,
        })?;

        ctx.state.accounts.modify(&name, |a| {
            a.vesting_shares.amount -= to_withdraw;
            a.balance += converted;
            a.withdrawn += to_withdraw;
            if a.withdrawn >= a.to_withdraw || a.vesting_shares.amount == 0 {
                a.vesting_withdraw_rate.amount = 0;
                a.next_vesting_withdrawal = TimePointSec::MAXIMUM;
            } else {
                a.next_vesting_withdrawal = a.next_vesting_withdrawal + VESTING_WITHDRAW_INTERVAL_SECONDS;
            }
        })?;
        ctx.state.globals.modify(|g| {
            g.total_vesting_fund_liquid -= converted;
            g.total_vesting_shares.amount -= to_convert;
        });
        if to_withdraw > 0 {
            adjust_proxied_witness_votes(ctx.state, &name, -to_withdraw)?;
        }
        ctx.post_virtual_operation(note)?;
        debug!(account = %name, withdrawn = to_withdraw, "vesting withdrawal filled");
    }
    Ok(())
}

// =============================================================================
// REGENT
// =============================================================================

/// Every `REGENT_DECAY_INTERVAL_BLOCKS`, removes one step of the regent's
/// initial vote weight.
pub fn process_regent_account(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let head = ctx.head_block_num();
    if head == 0 || head % REGENT_DECAY_INTERVAL_BLOCKS != 0 {
        return Ok(());
    }
    let globals = &ctx.state.globals;
    let step = globals.regent_init_vesting_shares.amount / REGENT_DECAY_STEPS;
    let current = globals.regent_vesting_shares.amount;
    let next = current - step;
    if next < 0 || step == 0 {
        return Ok(());
    }
    ctx.state
        .globals
        .modify(|g| g.regent_vesting_shares.amount = next);
    adjust_proxied_witness_votes(ctx.state, &AccountName::from(REGENT_ACCOUNT), -step)?;
    info!(block_num = head, regent_vesting_shares = next, "regent vote weight decayed");
    Ok(())
}
