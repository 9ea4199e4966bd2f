//! Treasury-funded proposals.
//!
//! Once per maintenance period the treasury pays active proposals in
//! order of vote weight. The budget is one percent of the treasury per
//! day, prorated over the time since the last payout.
//!
//! # Invariants
//!
//! - A proposal past its end date is removed along with its votes
//! - Proposals with no votes are never paid
//! - Total payments never exceed the prorated budget

use std::cmp::Reverse;

use tracing::{debug, info};

use super::supply::adjust_balance;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::{AccountName, Asset, TimePointSec, VirtualOperation};
use crate::storage::objects::Proposal;
use crate::storage::ChainState;

const BY_END_DATE: usize = 0;
const BY_PROPOSAL: usize = 0;

/// Voters on `proposal_id`, in name order.
pub fn voters_of(state: &ChainState, proposal_id: u32) -> Vec<AccountName> {
    let from = proposal_id.to_be_bytes();
    state
        .proposal_votes
        .iter_by_from(BY_PROPOSAL, &from)
        .take_while(|v| v.proposal_id == proposal_id)
        .map(|v| v.voter.clone())
        .collect()
}

/// Removes a proposal and every vote cast on it.
pub fn remove_proposal(state: &mut ChainState, proposal_id: u32) -> EvalResult<Proposal> {
    for voter in voters_of(state, proposal_id) {
        state.proposal_votes.remove(&(voter, proposal_id))?;
    }
    Ok(state.proposals.remove(&proposal_id)?)
}

fn remove_expired(state: &mut ChainState, now: TimePointSec) -> EvalResult<()> {
    let expired = state
        .proposals
        .keys_by_while(BY_END_DATE, |p| p.end_date <= now);
    for id in expired {
        remove_proposal(state, id)?;
        debug!(proposal_id = id, "proposal expired");
    }
    Ok(())
}

/// Vote weight behind each active proposal. Accounts that proxy their
/// votes do not count.
fn tally_votes(state: &mut ChainState, active: &[u32]) -> EvalResult<()> {
    for &id in active {
        let mut total: u64 = 0;
        for voter in voters_of(state, id) {
            let account = state.account(&voter)?;
            if !account.has_proxy() {
                total = total.saturating_add(account.witness_vote_weight().max(0) as u64);
            }
        }
        state.proposals.modify(&id, |p| p.total_votes = total)?;
    }
    Ok(())
}

/// Per-period pay for a proposal after `passed_secs` of a day have passed.
pub fn period_pay(daily_pay: i64, passed_secs: i64) -> i64 {
    let ratio = passed_secs as i128 * PERCENT_100 as i128 / SECONDS_PER_DAY as i128;
    if ratio == PERCENT_100 as i128 {
        daily_pay
    } else {
        (ratio * daily_pay as i128 / PERCENT_100 as i128) as i64
    }
}

fn update_settings(state: &mut ChainState, now: TimePointSec) {
    state.globals.modify(|g| {
        g.next_maintenance_time = now + PROPOSAL_MAINTENANCE_PERIOD;
        g.last_budget_time = now;
    });
}

pub fn process_proposals(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    if now < ctx.state.globals.next_maintenance_time {
        return Ok(());
    }

    remove_expired(ctx.state, now)?;

    let active: Vec<u32> = ctx
        .state
        .proposals
        .iter()
        .filter(|p| p.is_active(now))
        .map(|p| p.id)
        .collect();
    if active.is_empty() {
        update_settings(ctx.state, now);
        return Ok(());
    }

    tally_votes(ctx.state, &active)?;

    let mut ordered: Vec<(u32, u64, AccountName, i64)> = active
        .iter()
        .filter_map(|id| ctx.state.proposals.get(id))
        .map(|p| (p.id, p.total_votes, p.receiver.clone(), p.daily_pay.amount))
        .collect();
    ordered.sort_by_key(|(id, votes, _, _)| (Reverse(*votes), *id));

    let treasury = AccountName::from(TREASURY_ACCOUNT);
    let passed_secs = now.seconds_since(ctx.state.globals.last_budget_time).max(0);
    let treasury_balance = ctx.state.account(&treasury)?.balance.amount;
    let daily_budget = treasury_balance / PROPOSAL_DAILY_BUDGET_DIVIDER;
    let mut budget = (daily_budget as i128 * passed_secs as i128 / SECONDS_PER_DAY as i128) as i64;
    let mut paid_total = 0i64;

    for (id, votes, receiver, daily_pay) in ordered {
        if votes == 0 || budget <= 0 {
            break;
        }
        let pay = period_pay(daily_pay, passed_secs);
        let (payment, exhausted) = if pay >= budget { (budget, true) } else { (pay, false) };
        budget -= payment;
        paid_total += payment;

        let note = ctx.pre_virtual_operation(VirtualOperation::ProposalPay {
            receiver: receiver.clone(),
            payment: Asset::liquid(payment),
        })?;
        adjust_balance(ctx.state, &treasury, Asset::liquid(-payment))?;
        adjust_balance(ctx.state, &receiver, Asset::liquid(payment))?;
        ctx.post_virtual_operation(note)?;
        debug!(proposal_id = id, receiver = %receiver, payment, "proposal paid");

        if exhausted {
            break;
        }
    }

    update_settings(ctx.state, now);
    info!(block_num = ctx.block_num, paid = paid_total, "proposal maintenance");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_pay_full_day_is_daily_pay() {
        assert_eq!(period_pay(1_000, SECONDS_PER_DAY as i64), 1_000);
    }

    #[test]
    fn test_period_pay_prorates_an_hour() {
        // 3600 * 10000 / 86400 = 416 basis points
        assert_eq!(period_pay(10_000, 3_600), 416);
    }
}
