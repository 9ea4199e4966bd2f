//! Balance and supply adjustments.
//!
//! Every write to a liquid, savings, reward or vesting balance goes through
//! one of these helpers, so the non-negativity checks live in one place.

use tracing::debug;

use crate::execution::context::ApplyContext;
use crate::execution::errors::{EvalError, EvalResult};
use crate::protocol::constants::{HARDFORK_4, NULL_ACCOUNT, SUPPLY_VESTING_GRACE_BLOCKS, TREASURY_ACCOUNT};
use crate::protocol::{AccountName, Asset, VirtualOperation};
use crate::storage::ChainState;

fn checked(current: Asset, delta: Asset, what: &str) -> EvalResult<i64> {
    if current.symbol != delta.symbol {
        return Err(EvalError::Internal(format!(
            "{what}: adding {delta} to {current}"
        )));
    }
    current
        .amount
        .checked_add(delta.amount)
        .ok_or_else(|| EvalError::Overflow(format!("{what}: {current} + {delta}")))
}

fn insufficient(account: &AccountName, balance: Asset, delta: Asset) -> EvalError {
    EvalError::InsufficientFunds {
        account: account.clone(),
        balance,
        required: -delta,
    }
}

/// Adds `delta` to the liquid balance, or to vesting shares for a vests
/// delta. The result must not be negative.
pub fn adjust_balance(state: &mut ChainState, name: &AccountName, delta: Asset) -> EvalResult<()> {
    let account = state.account(name)?;
    let current = if delta.is_liquid() {
        account.balance
    } else {
        account.vesting_shares
    };
    let next = checked(current, delta, "adjust_balance")?;
    if next < 0 {
        return Err(insufficient(name, current, delta));
    }
    state.accounts.modify(name, |a| {
        if delta.is_liquid() {
            a.balance.amount = next;
        } else {
            a.vesting_shares.amount = next;
        }
    })?;
    Ok(())
}

pub fn adjust_savings_balance(state: &mut ChainState, name: &AccountName, delta: Asset) -> EvalResult<()> {
    let current = state.account(name)?.savings_balance;
    let next = checked(current, delta, "adjust_savings_balance")?;
    if next < 0 {
        return Err(insufficient(name, current, delta));
    }
    state.accounts.modify(name, |a| a.savings_balance.amount = next)?;
    Ok(())
}

/// Adjusts unclaimed rewards. A zero `share_delta` moves liquid reward;
/// otherwise `value_delta` is the liquid backing of `share_delta` vests.
pub fn adjust_reward_balance(
    state: &mut ChainState,
    name: &AccountName,
    value_delta: Asset,
    share_delta: Asset,
) -> EvalResult<()> {
    let account = state.account(name)?;
    if share_delta.amount == 0 {
        let current = account.reward_liquid_balance;
        let next = checked(current, value_delta, "adjust_reward_balance")?;
        if next < 0 {
            return Err(insufficient(name, current, value_delta));
        }
        state.accounts.modify(name, |a| a.reward_liquid_balance.amount = next)?;
    } else {
        let liquid = checked(account.reward_vesting_liquid, value_delta, "adjust_reward_balance")?;
        let shares = checked(account.reward_vesting_balance, share_delta, "adjust_reward_balance")?;
        if liquid < 0 || shares < 0 {
            return Err(insufficient(name, account.reward_vesting_balance, share_delta));
        }
        state.accounts.modify(name, |a| {
            a.reward_vesting_liquid.amount = liquid;
            a.reward_vesting_balance.amount = shares;
        })?;
    }
    Ok(())
}

/// Account that receives transaction and property-update fees: the
/// treasury until hardfork 4, the null account (burned) after.
pub fn fee_sink(state: &ChainState) -> AccountName {
    if state.has_hardfork(HARDFORK_4) {
        AccountName::from(NULL_ACCOUNT)
    } else {
        AccountName::from(TREASURY_ACCOUNT)
    }
}

/// Changes the current supply. A positive delta with `adjust_vesting` also
/// mints nine times the delta into the vesting fund, except during the
/// first week of the chain.
pub fn adjust_supply(state: &mut ChainState, delta: Asset, adjust_vesting: bool) -> EvalResult<()> {
    let adjust_vesting = adjust_vesting && state.head_block_num() >= SUPPLY_VESTING_GRACE_BLOCKS;
    let new_vesting = if adjust_vesting && delta.amount > 0 {
        delta.amount * 9
    } else {
        0
    };
    let globals = &state.globals;
    let supply = globals.current_supply.amount + delta.amount + new_vesting;
    if supply < 0 {
        return Err(EvalError::Internal(format!(
            "supply would become negative: {} + {delta}",
            globals.current_supply
        )));
    }
    state.globals.modify(|g| {
        g.current_supply.amount = supply;
        g.total_vesting_fund_liquid.amount += new_vesting;
    });
    Ok(())
}

/// Burns everything held by the null account.
pub fn clear_null_account_balance(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let null = AccountName::from(NULL_ACCOUNT);
    let account = ctx.state.account(&null)?.clone();

    let mut total_liquid = Asset::liquid(0);
    let mut total_vests = Asset::vests(0);

    if account.balance.amount > 0 {
        total_liquid += account.balance;
        adjust_balance(ctx.state, &null, -account.balance)?;
    }
    if account.savings_balance.amount > 0 {
        total_liquid += account.savings_balance;
        adjust_savings_balance(ctx.state, &null, -account.savings_balance)?;
    }
    if account.vesting_shares.amount > 0 {
        let price = ctx.state.globals.vesting_share_price();
        let converted = account.vesting_shares.convert(&price)?;
        total_liquid += converted;
        total_vests += account.vesting_shares;
        ctx.state
            .accounts
            .modify(&null, |a| a.vesting_shares.amount = 0)?;
        ctx.state.globals.modify(|g| {
            g.total_vesting_shares -= account.vesting_shares;
            g.total_vesting_fund_liquid -= converted;
        });
    }
    if account.reward_liquid_balance.amount > 0 {
        total_liquid += account.reward_liquid_balance;
        adjust_reward_balance(ctx.state, &null, -account.reward_liquid_balance, Asset::vests(0))?;
    }
    if account.reward_vesting_balance.amount > 0 {
        total_liquid += account.reward_vesting_liquid;
        total_vests += account.reward_vesting_balance;
        adjust_reward_balance(
            ctx.state,
            &null,
            -account.reward_vesting_liquid,
            -account.reward_vesting_balance,
        )?;
        ctx.state.globals.modify(|g| {
            g.pending_rewarded_vesting_shares -= account.reward_vesting_balance;
            g.pending_rewarded_vesting_liquid -= account.reward_vesting_liquid;
        });
    }

    if total_liquid.amount == 0 && total_vests.amount == 0 {
        return Ok(());
    }
    if total_liquid.amount > 0 {
        adjust_supply(ctx.state, -total_liquid, false)?;
    }

    let mut total_cleared = Vec::new();
    if total_liquid.amount > 0 {
        total_cleared.push(total_liquid);
    }
    if total_vests.amount > 0 {
        total_cleared.push(total_vests);
    }
    debug!(block_num = ctx.block_num, liquid = %total_liquid, vests = %total_vests, "null account cleared");
    ctx.push_virtual_operation(VirtualOperation::ClearNullAccountBalance { total_cleared })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PublicKey, TimePointSec};
    use crate::storage::objects::Account;

    fn state_with(name: &str, balance: i64) -> ChainState {
        let mut state = ChainState::new();
        let mut account = Account::new(name.into(), PublicKey::NULL, TimePointSec(0));
        account.balance = Asset::liquid(balance);
        state.accounts.insert(account).unwrap();
        state
    }

    #[test]
    fn test_adjust_balance_rejects_overdraft() {
        let mut state = state_with("alice", 100);
        let alice = AccountName::from("alice");
        adjust_balance(&mut state, &alice, Asset::liquid(-40)).unwrap();
        let err = adjust_balance(&mut state, &alice, Asset::liquid(-61)).unwrap_err();
        assert!(matches!(err, EvalError::InsufficientFunds { .. }));
        assert_eq!(state.account("alice").unwrap().balance, Asset::liquid(60));
    }

    #[test]
    fn test_adjust_balance_vests_go_to_vesting_shares() {
        let mut state = state_with("alice", 0);
        let alice = AccountName::from("alice");
        adjust_balance(&mut state, &alice, Asset::vests(5_000)).unwrap();
        let account = state.account("alice").unwrap();
        assert_eq!(account.vesting_shares, Asset::vests(5_000));
        assert_eq!(account.balance, Asset::liquid(0));
    }

    #[test]
    fn test_adjust_supply_skips_vesting_during_grace_period() {
        let mut state = ChainState::new();
        adjust_supply(&mut state, Asset::liquid(100), true).unwrap();
        assert_eq!(state.globals.current_supply, Asset::liquid(100));
        assert_eq!(state.globals.total_vesting_fund_liquid, Asset::liquid(0));

        state.globals.modify(|g| g.head_block_number = SUPPLY_VESTING_GRACE_BLOCKS);
        adjust_supply(&mut state, Asset::liquid(100), true).unwrap();
        assert_eq!(state.globals.current_supply, Asset::liquid(1_100));
        assert_eq!(state.globals.total_vesting_fund_liquid, Asset::liquid(900));
    }

    #[test]
    fn test_reward_balance_split_by_share_delta() {
        let mut state = state_with("bob", 0);
        let bob = AccountName::from("bob");
        adjust_reward_balance(&mut state, &bob, Asset::liquid(7), Asset::vests(0)).unwrap();
        adjust_reward_balance(&mut state, &bob, Asset::liquid(3), Asset::vests(3_000)).unwrap();
        let account = state.account("bob").unwrap();
        assert_eq!(account.reward_liquid_balance, Asset::liquid(7));
        assert_eq!(account.reward_vesting_liquid, Asset::liquid(3));
        assert_eq!(account.reward_vesting_balance, Asset::vests(3_000));
    }
}
