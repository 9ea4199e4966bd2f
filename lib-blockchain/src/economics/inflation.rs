//! Per-block inflation.
//!
//! Each block mints `supply * rate / (100% * BLOCKS_PER_YEAR)`. The rate
//! starts at `INFLATION_RATE_START_PERCENT` and drops by one basis point
//! every `INFLATION_NARROWING_PERIOD` blocks down to the floor.
//!
//! ```text
//! new tokens ─┬─ content %  -> reward fund balances
//!             ├─ vesting %  -> vesting fund (raises the share price)
//!             ├─ proposal % -> treasury account
//!             └─ remainder  -> block producer, as vesting shares
//! ```

use tracing::{trace, warn};

use super::vesting::create_vesting_with;
use crate::execution::context::ApplyContext;
use crate::execution::errors::{EvalError, EvalResult};
use crate::protocol::constants::*;
use crate::protocol::{AccountName, Asset, VirtualOperation};
use crate::storage::objects::WitnessScheduleType;
use crate::storage::ChainState;

/// Inflation rate in basis points at `head_block_num`.
pub fn current_inflation_rate(head_block_num: u32) -> i64 {
    let adjustment = head_block_num as i64 / INFLATION_NARROWING_PERIOD;
    (INFLATION_RATE_START_PERCENT - adjustment).max(INFLATION_RATE_STOP_PERCENT)
}

/// Splits `reward` across the reward funds by their content percentage.
/// Returns the amount actually added.
pub fn pay_reward_funds(state: &mut ChainState, reward: i64) -> EvalResult<i64> {
    let mut used = 0i64;
    for id in state.reward_funds.keys() {
        let percent = state.reward_funds.require(&id)?.percent_content_rewards;
        let r = reward * percent as i64 / PERCENT_100 as i64;
        state
            .reward_funds
            .modify(&id, |f| f.reward_balance.amount += r)?;
        used += r;
        if used > reward {
            return Err(EvalError::Internal(format!(
                "reward funds took {used} out of {reward}"
            )));
        }
    }
    Ok(used)
}

pub fn process_funds(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let globals = ctx.state.globals.get().clone();
    let rate = current_inflation_rate(ctx.head_block_num());
    let new_tokens = (globals.current_supply.amount as i128 * rate as i128
        / (PERCENT_100 as i128 * BLOCKS_PER_YEAR as i128)) as i64;

    let content_reward = new_tokens * globals.content_reward_percent as i64 / PERCENT_100 as i64;
    let content_reward = pay_reward_funds(ctx.state, content_reward)?;
    let vesting_reward = new_tokens * globals.vesting_reward_percent as i64 / PERCENT_100 as i64;
    let proposal_fund = new_tokens * globals.proposal_fund_percent as i64 / PERCENT_100 as i64;
    let mut witness_reward = new_tokens - content_reward - vesting_reward - proposal_fund;

    let producer = globals.current_witness.clone();
    let witness = ctx.state.witness(&producer)?;
    let schedule = ctx.state.schedule.get();
    witness_reward *= MAX_WITNESSES as i64;
    match witness.schedule {
        WitnessScheduleType::Timeshare => witness_reward *= schedule.timeshare_weight as i64,
        WitnessScheduleType::Elected => witness_reward *= schedule.elected_weight as i64,
        WitnessScheduleType::None => {
            warn!(witness = %producer, "producer has no schedule type");
        }
    }
    match schedule.witness_pay_normalization_factor {
        0 => {
            warn!("witness pay normalization factor is zero");
            witness_reward = 0;
        }
        factor => witness_reward /= factor as i64,
    }

    if proposal_fund != 0 {
        super::supply::adjust_balance(
            ctx.state,
            &AccountName::from(TREASURY_ACCOUNT),
            Asset::liquid(proposal_fund),
        )?;
    }

    let minted = content_reward + vesting_reward + witness_reward;
    ctx.state.globals.modify(|g| {
        g.total_vesting_fund_liquid.amount += vesting_reward;
        g.current_supply.amount += minted + proposal_fund;
        g.proposal_fund_ledger.amount += proposal_fund;
    });
    trace!(
        block_num = ctx.block_num,
        content = content_reward,
        vesting = vesting_reward,
        proposals = proposal_fund,
        producer = witness_reward,
        "inflation paid"
    );

    if proposal_fund != 0 {
        ctx.push_virtual_operation(VirtualOperation::SpsFund {
            additional_funds: Asset::liquid(proposal_fund),
        })?;
    }

    let (_, note) = create_vesting_with(
        ctx,
        &producer,
        Asset::liquid(witness_reward),
        false,
        |ctx, vesting_shares| {
            ctx.pre_virtual_operation(VirtualOperation::ProducerReward {
                producer: producer.clone(),
                vesting_shares,
            })
        },
    )?;
    ctx.post_virtual_operation(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economics::curves::CurveId;
    use crate::protocol::TimePointSec;
    use crate::storage::objects::RewardFund;

    #[test]
    fn test_inflation_rate_narrows_to_floor() {
        assert_eq!(current_inflation_rate(0), INFLATION_RATE_START_PERCENT);
        assert_eq!(current_inflation_rate(250_000), INFLATION_RATE_START_PERCENT - 1);
        assert_eq!(current_inflation_rate(u32::MAX), INFLATION_RATE_STOP_PERCENT);
    }

    #[test]
    fn test_proposal_fund_is_paid_and_ledgered() {
        use crate::evaluators::test_support::Fixture;

        let mut f = Fixture::new();
        f.state.globals.modify(|g| g.current_supply.amount = 10_000_000_000_000);
        process_funds(&mut f.ctx()).unwrap();
        let first = f.state.globals.proposal_fund_ledger.amount;
        assert!(first > 0);
        process_funds(&mut f.ctx()).unwrap();

        let ledger = f.state.globals.proposal_fund_ledger.amount;
        assert!(ledger > first, "ledger accumulates across blocks");
        assert_eq!(f.state.account(TREASURY_ACCOUNT).unwrap().balance.amount, ledger);
    }

    #[test]
    fn test_pay_reward_funds_respects_content_percent() {
        let mut state = ChainState::new();
        state
            .reward_funds
            .insert(RewardFund {
                id: POST_REWARD_FUND_ID,
                name: "post".into(),
                reward_balance: Asset::liquid(0),
                recent_claims: 0,
                last_update: TimePointSec(0),
                content_constant: REWARD_CONSTANT,
                percent_curation_rewards: PERCENT_100 / 2,
                percent_content_rewards: PERCENT_100 / 4,
                author_reward_curve: CurveId::ConvergentLinear,
                curation_reward_curve: CurveId::ConvergentSquareRoot,
            })
            .unwrap();
        let used = pay_reward_funds(&mut state, 1_000).unwrap();
        assert_eq!(used, 250);
        assert_eq!(
            state.reward_funds.get(&POST_REWARD_FUND_ID).unwrap().reward_balance,
            Asset::liquid(250)
        );
    }
}
