//! Full ledger audit.
//!
//! Recomputes the supply and vesting aggregates from every row and compares
//! them with the global counters. Expensive: intended for tests, replays
//! with `validate_invariants` set, and on-demand checks.
//!
//! # Invariants
//!
//! ```text
//! current_supply == Σ account (balance + savings + reward liquid)
//!                 + Σ escrow (balance + pending fee)
//!                 + Σ savings withdrawal amounts
//!                 + Σ reward fund balances
//!                 + total_vesting_fund + total_reward_fund
//!                 + pending_rewarded_vesting_liquid
//!
//! total_vesting_shares + pending_rewarded_vesting_shares
//!                 == Σ account (vesting shares + reward vesting)
//!
//! total_vesting_shares == Σ vote weight (own weight, or the deepest
//!                          proxied slot for accounts with a proxy)
//!
//! pending_rewarded_vesting_liquid == Σ account reward vesting liquid
//!
//! witness votes <= total_vesting_shares (+ regent weight from HARDFORK_4)
//! ```

use tracing::error;

use super::errors::{BlockApplyError, BlockApplyResult};
use crate::protocol::constants::{HARDFORK_4, MAX_PROXY_RECURSION_DEPTH};
use crate::storage::ChainState;

fn violation(state: &ChainState, what: String) -> BlockApplyError {
    error!(block_num = state.head_block_num(), %what, "ledger invariant violated");
    BlockApplyError::InvariantViolation(what)
}

pub fn validate_invariants(state: &ChainState) -> BlockApplyResult<()> {
    let globals = state.globals.get();

    let mut vote_bound = globals.total_vesting_shares.amount;
    if state.has_hardfork(HARDFORK_4) {
        vote_bound += globals.regent_vesting_shares.amount;
    }
    for witness in state.witnesses.iter() {
        if witness.votes > vote_bound {
            return Err(violation(
                state,
                format!("witness {} has {} votes, bound is {vote_bound}", witness.owner, witness.votes),
            ));
        }
    }

    let mut total_supply: i128 = 0;
    let mut total_vesting: i128 = 0;
    let mut pending_vesting_liquid: i128 = 0;
    let mut total_vsf_votes: i128 = 0;
    for account in state.accounts.iter() {
        total_supply += account.balance.amount as i128
            + account.savings_balance.amount as i128
            + account.reward_liquid_balance.amount as i128;
        total_vesting += account.vesting_shares.amount as i128 + account.reward_vesting_balance.amount as i128;
        pending_vesting_liquid += account.reward_vesting_liquid.amount as i128;
        total_vsf_votes += if account.has_proxy() {
            account.proxied_vsf_votes[MAX_PROXY_RECURSION_DEPTH - 1] as i128
        } else {
            account.witness_vote_weight() as i128
        };
    }

    for escrow in state.escrows.iter() {
        if !escrow.pending_fee.is_liquid() {
            return Err(violation(
                state,
                format!("escrow {} from {} holds a non-liquid fee", escrow.escrow_id, escrow.from),
            ));
        }
        total_supply += escrow.liquid_balance.amount as i128 + escrow.pending_fee.amount as i128;
    }

    for withdraw in state.savings_withdraws.iter() {
        if !withdraw.amount.is_liquid() {
            return Err(violation(
                state,
                format!("savings withdrawal {} of {} is not liquid", withdraw.request_id, withdraw.from),
            ));
        }
        total_supply += withdraw.amount.amount as i128;
    }

    for fund in state.reward_funds.iter() {
        total_supply += fund.reward_balance.amount as i128;
    }

    total_supply += globals.total_vesting_fund_liquid.amount as i128
        + globals.total_reward_fund_liquid.amount as i128
        + globals.pending_rewarded_vesting_liquid.amount as i128;

    if globals.current_supply.amount as i128 != total_supply {
        return Err(violation(
            state,
            format!("current supply {} != recomputed supply {total_supply}", globals.current_supply.amount),
        ));
    }
    let expected_vesting =
        globals.total_vesting_shares.amount as i128 + globals.pending_rewarded_vesting_shares.amount as i128;
    if expected_vesting != total_vesting {
        return Err(violation(
            state,
            format!("vesting shares {expected_vesting} != recomputed {total_vesting}"),
        ));
    }
    if globals.total_vesting_shares.amount as i128 != total_vsf_votes {
        return Err(violation(
            state,
            format!(
                "total vesting shares {} != vote weight {total_vsf_votes}",
                globals.total_vesting_shares.amount
            ),
        ));
    }
    if globals.pending_rewarded_vesting_liquid.amount as i128 != pending_vesting_liquid {
        return Err(violation(
            state,
            format!(
                "pending rewarded vesting liquid {} != recomputed {pending_vesting_liquid}",
                globals.pending_rewarded_vesting_liquid.amount
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenesisConfig;
    use crate::execution::genesis::init_genesis;
    use crate::protocol::PublicKey;

    fn genesis_state() -> ChainState {
        let mut state = ChainState::new();
        let config = GenesisConfig::default()
            .with_init_witness_key(PublicKey([5u8; 32]))
            .with_initial_supply(1_000_000);
        init_genesis(&mut state, &config).unwrap();
        state
    }

    #[test]
    fn test_genesis_is_consistent() {
        validate_invariants(&genesis_state()).unwrap();
    }

    #[test]
    fn test_detects_minted_balance() {
        let mut state = genesis_state();
        state.accounts.modify("initminer", |a| a.balance.amount += 1).unwrap();
        assert!(matches!(
            validate_invariants(&state),
            Err(BlockApplyError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_detects_untracked_vesting() {
        let mut state = genesis_state();
        state.accounts.modify("initminer", |a| a.vesting_shares.amount += 5).unwrap();
        assert!(validate_invariants(&state).is_err());
    }
}
