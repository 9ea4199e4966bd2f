//! Claiming pending author, curation and beneficiary rewards.
//!
//! Rewards accrue into `reward_liquid_balance` and `reward_vesting_balance`
//! at payout. Claimed vesting rewards move from the pending pool into the
//! vesting pool at the liquid value they were created with, so the share
//! price is unaffected by when a claim happens.

use tracing::debug;

use crate::economics::supply::{adjust_balance, adjust_reward_balance};
use crate::economics::vesting::{adjust_proxied_witness_votes, regenerate_and_add_mana};
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::{EvalError, EvalResult};
use crate::protocol::operations::{ClaimRewardBalanceOperation, OperationBody};
use crate::protocol::Asset;

const OP: &str = ClaimRewardBalanceOperation::NAME;

/// Liquid value backing `claimed` of `balance` unclaimed reward shares.
/// Claiming everything releases all of `backing`, so no dust is stranded.
pub fn vesting_liquid_for_claim(claimed: i64, balance: i64, backing: i64) -> EvalResult<i64> {
    if claimed == balance {
        return Ok(backing);
    }
    if balance == 0 {
        return Ok(0);
    }
    let value = backing as i128 * claimed as i128 / balance as i128;
    i64::try_from(value).map_err(|_| EvalError::Overflow(format!("{backing} * {claimed} / {balance}")))
}

pub fn claim_reward_balance(ctx: &mut ApplyContext<'_>, op: &ClaimRewardBalanceOperation) -> EvalResult<()> {
    let now = ctx.now();
    let account = ctx.state.account(&op.account)?;
    ensure_eval!(
        op.reward_liquid.amount <= account.reward_liquid_balance.amount,
        OP,
        "cannot claim {} with a reward balance of {}",
        op.reward_liquid,
        account.reward_liquid_balance
    );
    ensure_eval!(
        op.reward_vests.amount <= account.reward_vesting_balance.amount,
        OP,
        "cannot claim {} with a reward balance of {}",
        op.reward_vests,
        account.reward_vesting_balance
    );
    let liquid_to_move = vesting_liquid_for_claim(
        op.reward_vests.amount,
        account.reward_vesting_balance.amount,
        account.reward_vesting_liquid.amount,
    )?;

    if op.reward_liquid.amount > 0 {
        adjust_reward_balance(ctx.state, &op.account, -op.reward_liquid, Asset::vests(0))?;
        adjust_balance(ctx.state, &op.account, op.reward_liquid)?;
    }

    if op.reward_vests.amount > 0 {
        let vests = op.reward_vests.amount;
        ctx.state.accounts.modify(&op.account, |a| {
            regenerate_and_add_mana(a, now, vests);
            a.vesting_shares.amount += vests;
            a.reward_vesting_balance.amount -= vests;
            a.reward_vesting_liquid.amount -= liquid_to_move;
        })?;
        ctx.state.globals.modify(|g| {
            g.total_vesting_shares.amount += vests;
            g.total_vesting_fund_liquid.amount += liquid_to_move;
            g.pending_rewarded_vesting_shares.amount -= vests;
            g.pending_rewarded_vesting_liquid.amount -= liquid_to_move;
        });
        adjust_proxied_witness_votes(ctx.state, &op.account, vests)?;
    }

    debug!(
        account = %op.account,
        liquid = %op.reward_liquid,
        vests = %op.reward_vests,
        "reward balance claimed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::protocol::AccountName;

    /// Credits bob unclaimed rewards the way payout does.
    fn accrue(f: &mut Fixture, liquid: i64, vests: i64, backing: i64) {
        f.state
            .accounts
            .modify("bob", |a| {
                a.reward_liquid_balance.amount += liquid;
                a.reward_vesting_balance.amount += vests;
                a.reward_vesting_liquid.amount += backing;
            })
            .unwrap();
        f.state.globals.modify(|g| {
            g.pending_rewarded_vesting_shares.amount += vests;
            g.pending_rewarded_vesting_liquid.amount += backing;
        });
    }

    fn claim(f: &mut Fixture, liquid: i64, vests: i64) -> EvalResult<()> {
        claim_reward_balance(
            &mut f.ctx(),
            &ClaimRewardBalanceOperation {
                account: AccountName::from("bob"),
                reward_liquid: Asset::liquid(liquid),
                reward_vests: Asset::vests(vests),
            },
        )
    }

    #[test]
    fn test_claim_liquid_reward() {
        let mut f = Fixture::new();
        accrue(&mut f, 500, 0, 0);
        claim(&mut f, 200, 0).unwrap();
        let bob = f.state.account("bob").unwrap();
        assert_eq!(bob.balance.amount, 100_200);
        assert_eq!(bob.reward_liquid_balance.amount, 300);
    }

    #[test]
    fn test_claim_more_than_pending_rejected() {
        let mut f = Fixture::new();
        accrue(&mut f, 500, 1_000, 1);
        assert!(claim(&mut f, 501, 0).is_err());
        assert!(claim(&mut f, 0, 1_001).is_err());
    }

    #[test]
    fn test_partial_vesting_claim_moves_proportional_backing() {
        let mut f = Fixture::new();
        accrue(&mut f, 0, 3_000, 10);
        claim(&mut f, 0, 1_000).unwrap();

        let bob = f.state.account("bob").unwrap();
        assert_eq!(bob.vesting_shares.amount, 1_000);
        assert_eq!(bob.reward_vesting_balance.amount, 2_000);
        assert_eq!(bob.reward_vesting_liquid.amount, 7);
        let g = f.state.globals.get();
        assert_eq!(g.total_vesting_shares.amount, 1_000);
        assert_eq!(g.total_vesting_fund_liquid.amount, 3);
        assert_eq!(g.pending_rewarded_vesting_shares.amount, 2_000);
        assert_eq!(g.pending_rewarded_vesting_liquid.amount, 7);
    }

    #[test]
    fn test_full_vesting_claim_releases_all_backing() {
        let mut f = Fixture::new();
        accrue(&mut f, 0, 3_000, 10);
        claim(&mut f, 0, 3_000).unwrap();
        let bob = f.state.account("bob").unwrap();
        assert_eq!(bob.reward_vesting_liquid.amount, 0);
        assert_eq!(bob.voting_manabar.current_mana, 3_000);
        assert_eq!(f.state.globals.pending_rewarded_vesting_liquid.amount, 0);
    }

    #[test]
    fn test_vesting_liquid_for_claim_rounds_down() {
        assert_eq!(vesting_liquid_for_claim(1, 3, 10).unwrap(), 3);
        assert_eq!(vesting_liquid_for_claim(3, 3, 10).unwrap(), 10);
        assert_eq!(vesting_liquid_for_claim(0, 0, 0).unwrap(), 0);
    }
}
