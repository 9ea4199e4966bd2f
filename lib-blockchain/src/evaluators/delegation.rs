//! Vesting share delegation.
//!
//! Delegated shares count toward the delegatee's voting mana but stay owned
//! by the delegator. Increases take effect at once; decreases go through a
//! return period, tracked by a `VestingDelegationExpiration` record, before
//! the delegator can use the shares again.
//!
//! # Invariants
//!
//! - A delegator can only delegate mana it currently has, net of any
//!   scheduled power down
//! - A delegation record never holds zero shares
//! - Returned shares are credited back only by the expiration sweep

use tracing::debug;

use crate::economics::vesting::{regenerate_and_add_mana, voting_manabar_params};
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::operations::{DelegateVestingSharesOperation, OperationBody};
use crate::protocol::{Asset, TimePointSec};
use crate::storage::objects::{Account, VestingDelegation, VestingDelegationExpiration};

const OP: &str = DelegateVestingSharesOperation::NAME;

/// Shares `delegator` may delegate right now: its regenerated mana, capped
/// by the shares it owns, minus whatever remains scheduled for power down
/// past the current week.
pub fn available_to_delegate(delegator: &Account) -> i64 {
    let owned = delegator.effective_vesting_shares() - delegator.received_vesting_shares.amount;
    let mut available = delegator.voting_manabar.current_mana.min(owned);
    let remaining = delegator.to_withdraw - delegator.withdrawn;
    if delegator.next_vesting_withdrawal < TimePointSec::MAXIMUM
        && remaining > delegator.vesting_withdraw_rate.amount
    {
        let weekly = delegator.vesting_withdraw_rate.amount.min(remaining);
        available += weekly - remaining;
    }
    available
}

pub fn delegate_vesting_shares(ctx: &mut ApplyContext<'_>, op: &DelegateVestingSharesOperation) -> EvalResult<()> {
    let now = ctx.now();
    ctx.state.account(&op.delegatee)?;
    ctx.state.accounts.modify(&op.delegator, |a| {
        let params = voting_manabar_params(a);
        a.voting_manabar.regenerate(params, now.secs());
    })?;
    let delegator = ctx.state.account(&op.delegator)?;
    let available = available_to_delegate(delegator);

    let price = ctx.state.globals.vesting_share_price();
    let creation_fee = ctx.state.schedule.median_props.account_creation_fee.amount;
    let min_delegation = Asset::liquid(creation_fee / 3).convert(&price)?;
    let min_update = Asset::liquid(creation_fee / 30).convert(&price)?;

    let key = (op.delegator.clone(), op.delegatee.clone());
    let existing = ctx.state.delegations.get(&key).cloned();
    let amount = op.vesting_shares.amount;

    match existing {
        None => {
            ensure_eval!(
                available >= amount,
                OP,
                "account {} does not have enough mana to delegate: available {available}, required {amount}",
                op.delegator
            );
            ensure_eval!(
                amount >= min_delegation.amount,
                OP,
                "must delegate at least {min_delegation}"
            );
            ctx.state.delegations.insert(VestingDelegation {
                delegator: op.delegator.clone(),
                delegatee: op.delegatee.clone(),
                vesting_shares: op.vesting_shares,
                min_delegation_time: now,
            })?;
            move_delegated_shares(ctx, op, amount, now)?;
        }
        Some(delegation) if amount > delegation.vesting_shares.amount => {
            let delta = amount - delegation.vesting_shares.amount;
            ensure_eval!(
                delta >= min_update.amount,
                OP,
                "must increase delegation by at least {min_update}"
            );
            ensure_eval!(
                available >= delta,
                OP,
                "account {} does not have enough mana to delegate: available {available}, required {delta}",
                op.delegator
            );
            move_delegated_shares(ctx, op, delta, now)?;
            ctx.state
                .delegations
                .modify(&key, |d| d.vesting_shares = op.vesting_shares)?;
        }
        Some(delegation) => {
            let delta = delegation.vesting_shares.amount - amount;
            if amount > 0 {
                ensure_eval!(
                    delta >= min_update.amount,
                    OP,
                    "must decrease delegation by at least {min_update}"
                );
                ensure_eval!(
                    amount >= min_delegation.amount,
                    OP,
                    "delegation must be removed or leave at least {min_delegation}"
                );
            } else {
                ensure_eval!(
                    delegation.vesting_shares.amount > 0,
                    OP,
                    "delegation would set vesting_shares to zero, but it is already zero"
                );
            }

            let return_period = ctx.state.globals.delegation_return_period;
            let id = ctx.state.delegation_expirations.next_id();
            ctx.state.delegation_expirations.insert(VestingDelegationExpiration {
                id,
                delegator: op.delegator.clone(),
                vesting_shares: Asset::vests(delta),
                expiration: (now + return_period).max(delegation.min_delegation_time),
            })?;
            ctx.state.accounts.modify(&op.delegatee, |a| {
                let params = voting_manabar_params(a);
                a.voting_manabar.regenerate(params, now.secs());
                a.received_vesting_shares.amount -= delta;
                a.voting_manabar.use_mana(delta);
                if a.voting_manabar.current_mana < 0 {
                    a.voting_manabar.current_mana = 0;
                }
            })?;

            if amount == 0 {
                ctx.state.delegations.remove(&key)?;
            } else {
                ctx.state
                    .delegations
                    .modify(&key, |d| d.vesting_shares = op.vesting_shares)?;
            }
        }
    }
    debug!(
        delegator = %op.delegator,
        delegatee = %op.delegatee,
        vesting_shares = %op.vesting_shares,
        "delegation set"
    );
    Ok(())
}

fn move_delegated_shares(
    ctx: &mut ApplyContext<'_>,
    op: &DelegateVestingSharesOperation,
    delta: i64,
    now: TimePointSec,
) -> EvalResult<()> {
    ctx.state.accounts.modify(&op.delegator, |a| {
        a.delegated_vesting_shares.amount += delta;
        a.voting_manabar.use_mana(delta);
    })?;
    ctx.state.accounts.modify(&op.delegatee, |a| {
        regenerate_and_add_mana(a, now, delta);
        a.received_vesting_shares.amount += delta;
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::protocol::constants::*;
    use crate::protocol::AccountName;

    const VESTS: i64 = 1_000_000_000;

    fn delegate(f: &mut Fixture, shares: i64) -> EvalResult<()> {
        delegate_vesting_shares(
            &mut f.ctx(),
            &DelegateVestingSharesOperation {
                delegator: "bob".into(),
                delegatee: "carol".into(),
                vesting_shares: Asset::vests(shares),
            },
        )
    }

    fn delegation_key() -> (AccountName, AccountName) {
        ("bob".into(), "carol".into())
    }

    #[test]
    fn test_new_delegation_moves_mana() {
        let mut f = Fixture::new();
        f.add_vests("bob", VESTS);
        delegate(&mut f, 10_000_000).unwrap();

        let bob = f.state.account("bob").unwrap();
        assert_eq!(bob.delegated_vesting_shares.amount, 10_000_000);
        assert_eq!(bob.voting_manabar.current_mana, VESTS - 10_000_000);
        let carol = f.state.account("carol").unwrap();
        assert_eq!(carol.received_vesting_shares.amount, 10_000_000);
        assert_eq!(carol.voting_manabar.current_mana, 10_000_000);
        assert_eq!(f.state.delegations.get(&delegation_key()).unwrap().min_delegation_time, GENESIS);
    }

    #[test]
    fn test_delegation_below_minimum_rejected() {
        let mut f = Fixture::new();
        f.add_vests("bob", VESTS);
        // Minimum is a third of the creation fee, in vests.
        let min = DEFAULT_ACCOUNT_CREATION_FEE / 3 * (DEFAULT_VESTING_PRICE_VESTS / DEFAULT_VESTING_PRICE_LIQUID);
        assert!(delegate(&mut f, min - 1).is_err());
        delegate(&mut f, min).unwrap();
    }

    #[test]
    fn test_cannot_delegate_more_than_owned() {
        let mut f = Fixture::new();
        f.add_vests("bob", VESTS);
        assert!(delegate(&mut f, VESTS + 1).is_err());
    }

    #[test]
    fn test_decrease_creates_expiration() {
        let mut f = Fixture::new();
        f.add_vests("bob", VESTS);
        delegate(&mut f, 10_000_000).unwrap();
        f.advance(60);
        delegate(&mut f, 4_000_000).unwrap();

        let carol = f.state.account("carol").unwrap();
        assert_eq!(carol.received_vesting_shares.amount, 4_000_000);
        // The delegator only gets the shares back when the expiration runs.
        assert_eq!(
            f.state.account("bob").unwrap().delegated_vesting_shares.amount,
            10_000_000
        );
        let expiration = f.state.delegation_expirations.iter().next().unwrap();
        assert_eq!(expiration.vesting_shares.amount, 6_000_000);
        assert_eq!(expiration.expiration, GENESIS + 60 + DELEGATION_RETURN_PERIOD);

        delegate(&mut f, 0).unwrap();
        assert!(f.state.delegations.get(&delegation_key()).is_none());
        assert_eq!(f.state.delegation_expirations.len(), 2);
        assert!(delegate(&mut f, 0).is_err());
    }

    #[test]
    fn test_available_excludes_future_power_down() {
        let mut account = crate::storage::objects::Account::new("bob".into(), key(1), GENESIS);
        account.vesting_shares = Asset::vests(1_000);
        account.voting_manabar.current_mana = 1_000;
        account.vesting_withdraw_rate = Asset::vests(100);
        account.to_withdraw = 400;
        account.withdrawn = 0;
        account.next_vesting_withdrawal = GENESIS + 10;
        // Effective shares drop this week's 100; the other 300 are also locked.
        assert_eq!(available_to_delegate(&account), 1_000 - 100 - 300);
    }
}
