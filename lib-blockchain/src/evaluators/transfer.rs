//! Liquid transfers, vesting, power down and savings.

use tracing::debug;

use crate::economics::supply::{adjust_balance, adjust_savings_balance};
use crate::economics::vesting::create_vesting;
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::operations::{
    CancelTransferFromSavingsOperation, OperationBody, SetWithdrawVestingRouteOperation,
    TransferFromSavingsOperation, TransferOperation, TransferToSavingsOperation,
    TransferToVestingOperation, WithdrawVestingOperation,
};
use crate::protocol::{AccountName, Asset, TimePointSec};
use crate::storage::objects::{SavingsWithdraw, WithdrawVestingRoute};

pub fn transfer(ctx: &mut ApplyContext<'_>, op: &TransferOperation) -> EvalResult<()> {
    const OP: &str = TransferOperation::NAME;
    ensure_eval!(
        ctx.state.accounts.contains(&op.to),
        OP,
        "recipient {} does not exist",
        op.to
    );
    adjust_balance(ctx.state, &op.from, -op.amount)?;
    adjust_balance(ctx.state, &op.to, op.amount)?;
    Ok(())
}

pub fn transfer_to_vesting(ctx: &mut ApplyContext<'_>, op: &TransferToVestingOperation) -> EvalResult<()> {
    let to = if op.to.is_empty() { op.from.clone() } else { op.to.clone() };
    ctx.state.account(&to)?;
    adjust_balance(ctx.state, &op.from, -op.amount)?;
    let vests = create_vesting(ctx, &to, op.amount, false)?;
    debug!(from = %op.from, to = %to, liquid = %op.amount, vests = %vests, "vested");
    Ok(())
}

/// Weekly withdrawal rate for powering down `amount` over `intervals`
/// weeks. Rounded up so the whole amount is withdrawn in time.
pub fn withdraw_rate(amount: i64, intervals: u32) -> i64 {
    let intervals = intervals as i64;
    let mut rate = amount / intervals;
    if rate == 0 {
        rate = 1;
    }
    if rate * intervals < amount {
        rate += 1;
    }
    rate
}

pub fn withdraw_vesting(ctx: &mut ApplyContext<'_>, op: &WithdrawVestingOperation) -> EvalResult<()> {
    const OP: &str = WithdrawVestingOperation::NAME;
    let account = ctx.state.account(&op.account)?;
    let available = account.vesting_shares.amount - account.delegated_vesting_shares.amount;
    ensure_eval!(
        available >= op.vesting_shares.amount,
        OP,
        "account does not have sufficient vesting shares for withdraw: {available} < {}",
        op.vesting_shares.amount
    );
    let current_rate = account.vesting_withdraw_rate.amount;

    if op.vesting_shares.amount == 0 {
        ensure_eval!(
            current_rate != 0,
            OP,
            "this operation would not change the vesting withdraw rate"
        );
        ctx.state.accounts.modify(&op.account, |a| {
            a.vesting_withdraw_rate = Asset::vests(0);
            a.next_vesting_withdrawal = TimePointSec::MAXIMUM;
            a.to_withdraw = 0;
            a.withdrawn = 0;
        })?;
        return Ok(());
    }

    let intervals = if ctx.has_hardfork(HARDFORK_5) {
        VESTING_WITHDRAW_INTERVALS_HF5
    } else {
        VESTING_WITHDRAW_INTERVALS
    };
    let rate = withdraw_rate(op.vesting_shares.amount, intervals);
    ensure_eval!(
        current_rate != rate,
        OP,
        "this operation would not change the vesting withdraw rate"
    );
    let next = ctx.now() + VESTING_WITHDRAW_INTERVAL_SECONDS;
    ctx.state.accounts.modify(&op.account, |a| {
        a.vesting_withdraw_rate = Asset::vests(rate);
        a.next_vesting_withdrawal = next;
        a.to_withdraw = op.vesting_shares.amount;
        a.withdrawn = 0;
    })?;
    Ok(())
}

pub fn set_withdraw_vesting_route(
    ctx: &mut ApplyContext<'_>,
    op: &SetWithdrawVestingRouteOperation,
) -> EvalResult<()> {
    const OP: &str = SetWithdrawVestingRouteOperation::NAME;
    let routes = ctx.state.account(&op.from_account)?.withdraw_routes;
    ctx.state.account(&op.to_account)?;
    ensure_eval!(
        op.to_account != TREASURY_ACCOUNT,
        OP,
        "cannot withdraw vesting to the treasury"
    );

    let key = (op.from_account.clone(), op.to_account.clone());
    if !ctx.state.withdraw_routes.contains(&key) {
        ensure_eval!(op.percent != 0, OP, "cannot create a 0% destination");
        ensure_eval!(
            routes < MAX_WITHDRAW_ROUTES,
            OP,
            "account already has the maximum number of routes"
        );
        ctx.state.withdraw_routes.insert(WithdrawVestingRoute {
            from_account: op.from_account.clone(),
            to_account: op.to_account.clone(),
            percent: op.percent,
            auto_vest: op.auto_vest,
        })?;
        ctx.state
            .accounts
            .modify(&op.from_account, |a| a.withdraw_routes += 1)?;
    } else if op.percent == 0 {
        ctx.state.withdraw_routes.remove(&key)?;
        ctx.state
            .accounts
            .modify(&op.from_account, |a| a.withdraw_routes -= 1)?;
    } else {
        ctx.state.withdraw_routes.modify(&key, |r| {
            r.percent = op.percent;
            r.auto_vest = op.auto_vest;
        })?;
    }

    let total: u32 = ctx
        .state
        .withdraw_routes
        .range((op.from_account.clone(), AccountName::default())..)
        .take_while(|r| r.from_account == op.from_account)
        .map(|r| r.percent as u32)
        .sum();
    ensure_eval!(
        total <= PERCENT_100 as u32,
        OP,
        "more than 100% of vesting withdrawals allocated to destinations"
    );
    Ok(())
}

// =============================================================================
// SAVINGS
// =============================================================================

pub fn transfer_to_savings(ctx: &mut ApplyContext<'_>, op: &TransferToSavingsOperation) -> EvalResult<()> {
    const OP: &str = TransferToSavingsOperation::NAME;
    ctx.state.account(&op.to)?;
    ensure_eval!(op.to != TREASURY_ACCOUNT, OP, "cannot transfer savings to the treasury");
    adjust_balance(ctx.state, &op.from, -op.amount)?;
    adjust_savings_balance(ctx.state, &op.to, op.amount)?;
    Ok(())
}

pub fn transfer_from_savings(ctx: &mut ApplyContext<'_>, op: &TransferFromSavingsOperation) -> EvalResult<()> {
    const OP: &str = TransferFromSavingsOperation::NAME;
    let from = ctx.state.account(&op.from)?;
    let requests = from.savings_withdraw_requests;
    let savings = from.savings_balance;
    ctx.state.account(&op.to)?;
    ensure_eval!(
        requests < SAVINGS_WITHDRAW_REQUEST_LIMIT,
        OP,
        "account has reached limit for pending withdraw requests"
    );
    ensure_eval!(
        savings.amount >= op.amount.amount,
        OP,
        "insufficient savings: {savings} < {}",
        op.amount
    );

    adjust_savings_balance(ctx.state, &op.from, -op.amount)?;
    let complete = ctx.now() + SAVINGS_WITHDRAW_TIME;
    ctx.state.savings_withdraws.insert(SavingsWithdraw {
        from: op.from.clone(),
        to: op.to.clone(),
        memo: op.memo.clone(),
        request_id: op.request_id,
        amount: op.amount,
        complete,
    })?;
    ctx.state
        .accounts
        .modify(&op.from, |a| a.savings_withdraw_requests += 1)?;
    Ok(())
}

pub fn cancel_transfer_from_savings(
    ctx: &mut ApplyContext<'_>,
    op: &CancelTransferFromSavingsOperation,
) -> EvalResult<()> {
    let withdraw = ctx
        .state
        .savings_withdraws
        .remove(&(op.from.clone(), op.request_id))?;
    adjust_savings_balance(ctx.state, &withdraw.from, withdraw.amount)?;
    ctx.state
        .accounts
        .modify(&op.from, |a| a.savings_withdraw_requests -= 1)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::execution::errors::EvalError;

    #[test]
    fn test_transfer_insufficient_funds() {
        let mut f = Fixture::new();
        let op = TransferOperation {
            from: "alice".into(),
            to: "bob".into(),
            amount: Asset::liquid(100_001),
            memo: String::new(),
        };
        let err = transfer(&mut f.ctx(), &op).unwrap_err();
        assert!(matches!(err, EvalError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_transfer_to_unknown_account() {
        let mut f = Fixture::new();
        let op = TransferOperation {
            from: "alice".into(),
            to: "nobody".into(),
            amount: Asset::liquid(1),
            memo: String::new(),
        };
        assert!(transfer(&mut f.ctx(), &op).is_err());
    }

    #[test]
    fn test_transfer_to_vesting_defaults_to_self() {
        let mut f = Fixture::new();
        let op = TransferToVestingOperation {
            from: "alice".into(),
            to: AccountName::default(),
            amount: Asset::liquid(1_000),
        };
        transfer_to_vesting(&mut f.ctx(), &op).unwrap();
        let alice = f.state.account("alice").unwrap();
        assert_eq!(alice.balance.amount, 99_000);
        assert_eq!(
            alice.vesting_shares.amount,
            1_000 * DEFAULT_VESTING_PRICE_VESTS / DEFAULT_VESTING_PRICE_LIQUID
        );
        assert_eq!(f.state.globals.total_vesting_fund_liquid.amount, 1_000);
    }

    #[test]
    fn test_withdraw_rate_rounds_up() {
        assert_eq!(withdraw_rate(13, 13), 1);
        assert_eq!(withdraw_rate(14, 13), 2);
        assert_eq!(withdraw_rate(3, 4), 1);
        assert_eq!(withdraw_rate(400, 4), 100);
    }

    #[test]
    fn test_withdraw_vesting_start_and_stop() {
        let mut f = Fixture::new();
        f.add_vests("bob", 1_300);
        let start = WithdrawVestingOperation {
            account: "bob".into(),
            vesting_shares: Asset::vests(1_300),
        };
        withdraw_vesting(&mut f.ctx(), &start).unwrap();
        let bob = f.state.account("bob").unwrap();
        assert_eq!(bob.vesting_withdraw_rate.amount, 100);
        assert_eq!(bob.next_vesting_withdrawal, GENESIS + VESTING_WITHDRAW_INTERVAL_SECONDS);
        assert!(withdraw_vesting(&mut f.ctx(), &start).is_err());

        let stop = WithdrawVestingOperation {
            account: "bob".into(),
            vesting_shares: Asset::vests(0),
        };
        withdraw_vesting(&mut f.ctx(), &stop).unwrap();
        assert_eq!(
            f.state.account("bob").unwrap().next_vesting_withdrawal,
            TimePointSec::MAXIMUM
        );
        assert!(withdraw_vesting(&mut f.ctx(), &stop).is_err());
    }

    #[test]
    fn test_withdraw_routes_cannot_exceed_100_percent() {
        let mut f = Fixture::new();
        let route = |to: &str, percent| SetWithdrawVestingRouteOperation {
            from_account: "alice".into(),
            to_account: to.into(),
            percent,
            auto_vest: false,
        };
        set_withdraw_vesting_route(&mut f.ctx(), &route("bob", 6_000)).unwrap();
        set_withdraw_vesting_route(&mut f.ctx(), &route("carol", 4_000)).unwrap();
        assert_eq!(f.state.account("alice").unwrap().withdraw_routes, 2);

        set_withdraw_vesting_route(&mut f.ctx(), &route("bob", 0)).unwrap();
        assert_eq!(f.state.account("alice").unwrap().withdraw_routes, 1);
        assert!(set_withdraw_vesting_route(&mut f.ctx(), &route(TREASURY_ACCOUNT, 100)).is_err());

        set_withdraw_vesting_route(&mut f.ctx(), &route("carol", 5_000)).unwrap();
        assert!(set_withdraw_vesting_route(&mut f.ctx(), &route("dave", 5_001)).is_err());
    }

    #[test]
    fn test_savings_withdraw_and_cancel() {
        let mut f = Fixture::new();
        transfer_to_savings(
            &mut f.ctx(),
            &TransferToSavingsOperation {
                from: "alice".into(),
                to: "alice".into(),
                amount: Asset::liquid(5_000),
                memo: String::new(),
            },
        )
        .unwrap();
        assert_eq!(f.state.account("alice").unwrap().savings_balance.amount, 5_000);

        transfer_from_savings(
            &mut f.ctx(),
            &TransferFromSavingsOperation {
                from: "alice".into(),
                request_id: 7,
                to: "bob".into(),
                amount: Asset::liquid(2_000),
                memo: "rent".into(),
            },
        )
        .unwrap();
        let alice = f.state.account("alice").unwrap();
        assert_eq!(alice.savings_balance.amount, 3_000);
        assert_eq!(alice.savings_withdraw_requests, 1);
        let pending = f.state.savings_withdraws.get(&(AccountName::from("alice"), 7)).unwrap();
        assert_eq!(pending.complete, GENESIS + SAVINGS_WITHDRAW_TIME);

        cancel_transfer_from_savings(
            &mut f.ctx(),
            &CancelTransferFromSavingsOperation {
                from: "alice".into(),
                request_id: 7,
            },
        )
        .unwrap();
        let alice = f.state.account("alice").unwrap();
        assert_eq!(alice.savings_balance.amount, 5_000);
        assert_eq!(alice.savings_withdraw_requests, 0);
        assert!(f.state.savings_withdraws.is_empty());
    }
}
