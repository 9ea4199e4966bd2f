//! Genesis
//!
//! Builds the initial ledger from a `GenesisConfig`. The result depends
//! only on the config, so every node starting from the same config agrees
//! on block 0.
//!
//! # Initial Ledger
//!
//! ```text
//! miners, null, treasury, temp   reserved accounts, unsatisfiable or open authorities
//! initminer .. initminer20       witnesses signing with the init key;
//!                                initminer holds the supply minus the post fund
//! regent                         init key; vote weight is global, not an account balance
//! post reward fund               init_post_reward_balance
//! snapshot accounts              paid out of initminer's balance
//! ```

use tracing::info;

use super::errors::{ChainResult, EvalError};
use crate::config::GenesisConfig;
use crate::economics::curves::CurveId;
use crate::economics::witness_schedule::{reset_virtual_schedule_time, subsidy_params};
use crate::protocol::constants::{
    INIT_MINER_NAME, MAX_BLOCK_SIZE, MAX_VOTED_WITNESSES, MAX_WITNESSES, MINER_ACCOUNT, NULL_ACCOUNT,
    PERCENT_1, PERCENT_100, POST_REWARD_FUND_ID, REGENT_ACCOUNT, REWARD_CONSTANT, TEMP_ACCOUNT,
    TREASURY_ACCOUNT,
};
use crate::protocol::{AccountName, Asset, Authority, PublicKey, TimePointSec};
use crate::storage::objects::{Account, AccountAuthority, RewardFund, Witness, WitnessScheduleType};
use crate::storage::ChainState;

/// Name of the `i`th initial witness.
pub fn init_miner_name(i: usize) -> AccountName {
    if i == 0 {
        AccountName::from(INIT_MINER_NAME)
    } else {
        AccountName::from(format!("{INIT_MINER_NAME}{i}"))
    }
}

fn create_account(
    state: &mut ChainState,
    name: AccountName,
    memo_key: PublicKey,
    now: TimePointSec,
    owner: Authority,
    active: Authority,
    posting: Authority,
) -> ChainResult<()> {
    state.accounts.insert(Account::new(name.clone(), memo_key, now))?;
    state.account_authorities.insert(AccountAuthority {
        account: name,
        owner,
        active,
        posting,
        last_owner_update: TimePointSec::MINIMUM,
    })?;
    Ok(())
}

/// Populates an empty ledger. Hardforks due at genesis are applied with
/// block 1, not here.
pub fn init_genesis(state: &mut ChainState, genesis: &GenesisConfig) -> ChainResult<()> {
    let now = genesis.genesis_time();
    let init_key = genesis.init_witness_key()?;
    let init_auth = Authority::from_key(init_key);

    // Threshold 1 with no members: nobody can sign.
    let locked = Authority::new(1);
    for name in [MINER_ACCOUNT, NULL_ACCOUNT, TREASURY_ACCOUNT] {
        create_account(
            state,
            AccountName::from(name),
            PublicKey::NULL,
            now,
            locked.clone(),
            locked.clone(),
            locked.clone(),
        )?;
    }
    state
        .accounts
        .modify(TREASURY_ACCOUNT, |a| a.recovery_account = AccountName::from(TREASURY_ACCOUNT))?;
    // Threshold 0: anyone may act for temp, which only ever holds transients.
    create_account(
        state,
        AccountName::from(TEMP_ACCOUNT),
        PublicKey::NULL,
        now,
        Authority::new(0),
        Authority::new(0),
        locked.clone(),
    )?;

    let miner_balance = genesis.initial_supply - genesis.init_post_reward_balance;
    for i in 0..MAX_WITNESSES {
        let name = init_miner_name(i);
        create_account(
            state,
            name.clone(),
            init_key,
            now,
            init_auth.clone(),
            init_auth.clone(),
            init_auth.clone(),
        )?;
        if i == 0 {
            state
                .accounts
                .modify(&name, |a| a.balance = Asset::liquid(miner_balance))?;
        }
        let mut witness = Witness::new(name, init_key, now, now);
        witness.schedule = if i < MAX_VOTED_WITNESSES {
            WitnessScheduleType::Elected
        } else {
            WitnessScheduleType::Timeshare
        };
        state.witnesses.insert(witness)?;
    }

    create_account(
        state,
        AccountName::from(REGENT_ACCOUNT),
        init_key,
        now,
        init_auth.clone(),
        init_auth.clone(),
        init_auth,
    )?;

    let vesting_price = state.globals.vesting_share_price();
    let regent_shares = Asset::liquid(genesis.initial_supply / 2)
        .convert(&vesting_price)
        .map_err(EvalError::from)?;
    state.globals.modify(|g| {
        g.current_witness = AccountName::from(INIT_MINER_NAME);
        g.time = now;
        g.recent_slots_filled = u128::MAX;
        g.participation_count = 128;
        g.current_supply = Asset::liquid(genesis.initial_supply);
        g.maximum_block_size = MAX_BLOCK_SIZE;
        g.next_maintenance_time = now;
        g.last_budget_time = now;
        g.regent_init_vesting_shares = regent_shares;
        g.regent_vesting_shares = regent_shares;
        g.total_reward_fund_liquid = Asset::liquid(0);
    });

    state.hardforks.modify(|h| h.processed_hardforks = vec![now]);

    state.schedule.modify(|s| {
        s.current_shuffled_witnesses = vec![AccountName::from(INIT_MINER_NAME)];
        s.num_scheduled_witnesses = 1;
        let (global, per_witness) = subsidy_params(&s.median_props);
        s.account_subsidy_rd = global;
        s.account_subsidy_witness_rd = per_witness;
    });

    import_snapshot(state, genesis, now)?;

    reset_virtual_schedule_time(state)?;

    state.reward_funds.insert(RewardFund {
        id: POST_REWARD_FUND_ID,
        name: "post".into(),
        reward_balance: Asset::liquid(genesis.init_post_reward_balance),
        recent_claims: 0,
        last_update: now,
        content_constant: REWARD_CONSTANT,
        percent_curation_rewards: 50 * PERCENT_1,
        percent_content_rewards: PERCENT_100,
        author_reward_curve: CurveId::ConvergentLinear,
        curation_reward_curve: CurveId::ConvergentSquareRoot,
    })?;

    info!(
        supply = genesis.initial_supply,
        genesis_time = %now,
        witnesses = MAX_WITNESSES,
        snapshot_accounts = genesis.snapshot_accounts.len(),
        "genesis ledger created"
    );
    Ok(())
}

/// Creates the snapshot accounts and moves their balance and power out of
/// initminer, so the supply is unchanged.
fn import_snapshot(state: &mut ChainState, genesis: &GenesisConfig, now: TimePointSec) -> ChainResult<()> {
    if genesis.snapshot_accounts.is_empty() {
        return Ok(());
    }
    let price = state.globals.vesting_share_price();
    let mut total_balance = 0i64;
    let mut total_power = 0i64;
    let mut total_shares = 0i64;

    for raw in &genesis.snapshot_accounts {
        let parsed = raw.parsed()?;
        let name = AccountName::from(parsed.name.as_str());
        let shares = Asset::liquid(parsed.power).convert(&price).map_err(EvalError::from)?;
        create_account(
            state,
            name.clone(),
            parsed.memo_key,
            now,
            parsed.owner,
            parsed.active,
            parsed.posting,
        )?;
        state.accounts.modify(&name, |a| {
            a.balance = Asset::liquid(parsed.balance);
            a.vesting_shares = shares;
        })?;
        total_balance += parsed.balance;
        total_power += parsed.power;
        total_shares += shares.amount;
    }

    state.globals.modify(|g| {
        g.total_vesting_fund_liquid = Asset::liquid(total_power);
        g.total_vesting_shares = Asset::vests(total_shares);
    });
    state
        .accounts
        .modify(INIT_MINER_NAME, |a| a.balance.amount -= total_balance + total_power)?;
    info!(
        accounts = genesis.snapshot_accounts.len(),
        balance = total_balance,
        power = total_power,
        "snapshot imported"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotAccount;

    fn genesis() -> GenesisConfig {
        GenesisConfig::default()
            .with_init_witness_key(PublicKey([5u8; 32]))
            .with_initial_supply(1_000_000)
    }

    #[test]
    fn test_initial_supply_held_by_initminer() {
        let mut state = ChainState::new();
        let mut config = genesis();
        config.init_post_reward_balance = 1_000;
        init_genesis(&mut state, &config).unwrap();

        assert_eq!(state.account(INIT_MINER_NAME).unwrap().balance.amount, 999_000);
        assert_eq!(state.globals.current_supply.amount, 1_000_000);
        assert_eq!(
            state.reward_funds.get(&POST_REWARD_FUND_ID).unwrap().reward_balance.amount,
            1_000
        );
        assert_eq!(state.witnesses.len(), MAX_WITNESSES);
        assert_eq!(state.witness("initminer20").unwrap().schedule, WitnessScheduleType::Timeshare);
        assert_eq!(state.schedule.current_shuffled_witnesses, vec![init_miner_name(0)]);
        assert_eq!(state.hardforks.processed_hardforks, vec![config.genesis_time()]);
        assert_eq!(state.head_block_num(), 0);
    }

    #[test]
    fn test_snapshot_accounts_are_funded_from_initminer() {
        let key = PublicKey([6u8; 32]).to_string();
        let config = genesis().with_snapshot_account(SnapshotAccount {
            name: "imported".into(),
            owner_key: key.clone(),
            active_key: key.clone(),
            posting_key: key.clone(),
            memo_key: key,
            balance: 10,
            power: 20,
        });
        let mut state = ChainState::new();
        init_genesis(&mut state, &config).unwrap();

        let imported = state.account("imported").unwrap();
        assert_eq!(imported.balance.amount, 10);
        assert!(imported.vesting_shares.amount > 0);
        assert_eq!(state.globals.total_vesting_fund_liquid.amount, 20);
        assert_eq!(state.globals.total_vesting_shares, imported.vesting_shares);
        assert_eq!(state.account(INIT_MINER_NAME).unwrap().balance.amount, 1_000_000 - 30);
    }

    #[test]
    fn test_same_config_same_ledger() {
        let mut a = ChainState::new();
        let mut b = ChainState::new();
        init_genesis(&mut a, &genesis()).unwrap();
        init_genesis(&mut b, &genesis()).unwrap();
        assert!(a.same_contents(&b));
    }
}
