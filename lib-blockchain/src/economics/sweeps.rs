//! Time-driven sweeps.
//!
//! Each sweep walks one deadline index from the front and handles every
//! entry whose deadline has passed. Entries are removed when handled; none
//! survive their terminal transition.

use tracing::debug;

use super::resource_dynamics::rd_apply;
use super::supply::adjust_balance;
use super::vesting::{
    adjust_proxied_witness_votes_by_depth, clear_witness_votes, regenerate_and_add_mana, VoteDeltas,
};
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::{AccountName, VirtualOperation};
use crate::storage::objects::WitnessScheduleType;

const FIRST_INDEX: usize = 0;

/// Drops dedup records for transactions that can no longer be included.
pub fn clear_expired_transactions(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    let expired = ctx
        .state
        .transactions
        .keys_by_while(FIRST_INDEX, |t| now > t.expiration);
    for trx_id in expired {
        ctx.state.transactions.remove(&trx_id)?;
    }
    Ok(())
}

/// Returns delegated shares whose cool-down has ended.
pub fn clear_expired_delegations(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    let expired = ctx
        .state
        .delegation_expirations
        .keys_by_while(FIRST_INDEX, |e| e.expiration < now);
    for id in expired {
        let expiration = ctx.state.delegation_expirations.require(&id)?.clone();
        let note = ctx.pre_virtual_operation(VirtualOperation::ReturnVestingDelegation {
            account: expiration.delegator.clone(),
            vesting_shares: expiration.vesting_shares,
        })?;
        ctx.state.accounts.modify(&expiration.delegator, |a| {
            regenerate_and_add_mana(a, now, expiration.vesting_shares.amount);
            a.delegated_vesting_shares -= expiration.vesting_shares;
        })?;
        ctx.post_virtual_operation(note)?;
        ctx.state.delegation_expirations.remove(&id)?;
    }
    Ok(())
}

pub fn process_savings_withdraws(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    let due = ctx
        .state
        .savings_withdraws
        .keys_by_while(FIRST_INDEX, |w| w.complete <= now);
    for key in due {
        let withdraw = ctx.state.savings_withdraws.remove(&key)?;
        adjust_balance(ctx.state, &withdraw.to, withdraw.amount)?;
        ctx.state
            .accounts
            .modify(&withdraw.from, |a| a.savings_withdraw_requests -= 1)?;
        ctx.push_virtual_operation(VirtualOperation::FillTransferFromSavings {
            from: withdraw.from,
            to: withdraw.to,
            amount: withdraw.amount,
            request_id: withdraw.request_id,
            memo: withdraw.memo,
        })?;
    }
    Ok(())
}

/// Refills the global account subsidy pool, and the producer's own pool if
/// it was elected.
pub fn process_subsidized_accounts(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let schedule = ctx.state.schedule.get().clone();
    ctx.state.globals.modify(|g| {
        g.available_account_subsidies = rd_apply(&schedule.account_subsidy_rd, g.available_account_subsidies);
    });

    let producer = ctx.state.globals.current_witness.clone();
    if ctx.state.witness(&producer)?.schedule == WitnessScheduleType::Elected {
        ctx.state.witnesses.modify(&producer, |w| {
            w.available_witness_account_subsidies =
                rd_apply(&schedule.account_subsidy_witness_rd, w.available_witness_account_subsidies);
        })?;
    }
    Ok(())
}

/// Expires recovery requests, forgets owner history past the recovery
/// window and applies recovery account changes that have taken effect.
pub fn account_recovery_processing(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();

    let expired = ctx
        .state
        .recovery_requests
        .keys_by_while(FIRST_INDEX, |r| r.expires <= now);
    for name in expired {
        ctx.state.recovery_requests.remove(&name)?;
    }

    let stale: Vec<u64> = ctx
        .state
        .owner_history
        .iter()
        .take_while(|h| h.last_valid_time + OWNER_AUTH_RECOVERY_PERIOD < now)
        .map(|h| h.id)
        .collect();
    for id in stale {
        ctx.state.owner_history.remove(&id)?;
    }

    let effective = ctx
        .state
        .change_recovery_requests
        .keys_by_while(FIRST_INDEX, |r| r.effective_on <= now);
    for name in effective {
        let request = ctx.state.change_recovery_requests.remove(&name)?;
        ctx.state
            .accounts
            .modify(&request.account_to_recover, |a| a.recovery_account = request.recovery_account)?;
    }
    Ok(())
}

/// Refunds escrows that were not approved by both parties in time.
pub fn expire_escrow_ratification(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    let expired = ctx
        .state
        .escrows
        .keys_by_while(FIRST_INDEX, |e| !e.is_approved() && e.ratification_deadline <= now);
    for key in expired {
        let escrow = ctx.state.escrows.remove(&key)?;
        adjust_balance(ctx.state, &escrow.from, escrow.liquid_balance)?;
        adjust_balance(ctx.state, &escrow.from, escrow.pending_fee)?;
        debug!(from = %escrow.from, escrow_id = escrow.escrow_id, "escrow ratification expired");
    }
    Ok(())
}

/// Strips voting rights from accounts whose decline request took effect.
pub fn process_decline_voting_rights(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    let effective = ctx
        .state
        .decline_voting_requests
        .keys_by_while(FIRST_INDEX, |r| r.effective_date <= now);
    for name in effective {
        let account = ctx.state.account(&name)?;
        let mut delta: VoteDeltas = [0; MAX_PROXY_RECURSION_DEPTH + 1];
        delta[0] = -account.vesting_shares.amount;
        for (i, proxied) in account.proxied_vsf_votes.iter().enumerate() {
            delta[i + 1] = -proxied;
        }
        adjust_proxied_witness_votes_by_depth(ctx.state, &name, &delta)?;
        clear_witness_votes(ctx.state, &name)?;
        ctx.state.accounts.modify(&name, |a| {
            a.can_vote = false;
            a.proxy = AccountName::from(PROXY_TO_SELF_ACCOUNT);
        })?;
        ctx.state.decline_voting_requests.remove(&name)?;
        debug!(account = %name, "voting rights declined");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::test_support::*;
    use crate::protocol::{Asset, TransactionId};
    use crate::storage::objects::{SavingsWithdraw, TransactionRecord};

    #[test]
    fn test_expired_transaction_records_are_dropped() {
        let mut f = Fixture::new();
        let now = f.state.head_block_time();
        for (seed, expiration) in [(1u8, now), (2, now + 60)] {
            f.state
                .transactions
                .insert(TransactionRecord {
                    trx_id: TransactionId([seed; 20]),
                    expiration,
                })
                .unwrap();
        }
        f.advance(30);
        clear_expired_transactions(&mut f.ctx()).unwrap();
        assert!(!f.state.transactions.contains(&TransactionId([1; 20])));
        assert!(f.state.transactions.contains(&TransactionId([2; 20])));
    }

    #[test]
    fn test_completed_savings_withdrawal_pays_out() {
        let mut f = Fixture::new();
        let now = f.state.head_block_time();
        f.state
            .accounts
            .modify("alice", |a| {
                a.balance.amount -= 500;
                a.savings_withdraw_requests = 1;
            })
            .unwrap();
        f.state
            .savings_withdraws
            .insert(SavingsWithdraw {
                from: "alice".into(),
                to: "bob".into(),
                memo: String::new(),
                request_id: 7,
                amount: Asset::liquid(500),
                complete: now,
            })
            .unwrap();

        process_savings_withdraws(&mut f.ctx()).unwrap();
        assert_eq!(f.state.account("bob").unwrap().balance.amount, 100_500);
        assert_eq!(f.state.account("alice").unwrap().savings_withdraw_requests, 0);
        assert!(f.state.savings_withdraws.is_empty());
    }
}
