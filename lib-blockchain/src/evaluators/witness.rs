//! Witness registration, property updates, and stake-weighted witness
//! voting with proxies.
//!
//! # Proxy chains
//!
//! ```text
//! alice --proxy--> bob --proxy--> carol      (carol votes)
//!   depth 0          depth 1        end
//! ```
//!
//! An account with a proxy casts no votes of its own; its weight rides
//! along `proxied_vsf_votes` to the end of the chain. Chains longer than
//! `MAX_PROXY_RECURSION_DEPTH` and cycles are rejected when set.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::economics::supply::{adjust_balance, fee_sink};
use crate::economics::vesting::{
    adjust_proxied_witness_votes_by_depth, adjust_witness_vote, clear_witness_votes, VoteDeltas,
};
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::{EvalError, EvalResult};
use crate::protocol::constants::*;
use crate::protocol::operations::{
    witness_props, AccountWitnessProxyOperation, AccountWitnessVoteOperation, OperationBody,
    WitnessSetPropertiesOperation, WitnessUpdateOperation,
};
use crate::protocol::{AccountName, Asset, PublicKey};
use crate::storage::objects::{Witness, WitnessVote};

/// Cap on the per-operation fees a witness may propose.
pub const MAX_PROPOSED_OPERATION_FEE: i64 = 100_000;

pub fn witness_update(ctx: &mut ApplyContext<'_>, op: &WitnessUpdateOperation) -> EvalResult<()> {
    const OP: &str = WitnessUpdateOperation::NAME;
    ctx.state.account(&op.owner)?;
    ensure_eval!(
        op.props.account_creation_fee.amount <= MAX_ACCOUNT_CREATION_FEE,
        OP,
        "account_creation_fee greater than maximum account creation fee"
    );
    ensure_eval!(
        op.props.maximum_block_size <= SOFT_MAX_BLOCK_SIZE,
        OP,
        "max block size cannot be more than {SOFT_MAX_BLOCK_SIZE} bytes"
    );

    let apply = |w: &mut Witness| {
        w.url = op.url.clone();
        w.signing_key = op.block_signing_key;
        w.props.account_creation_fee = op.props.account_creation_fee;
        w.props.maximum_block_size = op.props.maximum_block_size;
    };
    if ctx.state.witnesses.contains(&op.owner) {
        ctx.state.witnesses.modify(&op.owner, apply)?;
    } else {
        let mut witness = Witness::new(op.owner.clone(), op.block_signing_key, ctx.now(), ctx.hardforks.time(0));
        apply(&mut witness);
        ctx.state.witnesses.insert(witness)?;
        info!(owner = %op.owner, "witness registered");
    }
    Ok(())
}

pub fn witness_set_properties(ctx: &mut ApplyContext<'_>, op: &WitnessSetPropertiesOperation) -> EvalResult<()> {
    const OP: &str = WitnessSetPropertiesOperation::NAME;
    let witness = ctx.state.witness(&op.owner)?;
    let key = op.signing_key()?;
    ensure_eval!(
        key == witness.signing_key,
        OP,
        "'key' does not match witness signing key: {key} != {}",
        witness.signing_key
    );

    let creation_fee = op.decode::<Asset>(witness_props::ACCOUNT_CREATION_FEE)?;
    if let Some(fee) = creation_fee {
        ensure_eval!(
            fee.amount <= MAX_ACCOUNT_CREATION_FEE,
            OP,
            "account_creation_fee greater than maximum account creation fee"
        );
    }
    let block_size = op.decode::<u32>(witness_props::MAXIMUM_BLOCK_SIZE)?;
    let subsidy_budget = op.decode::<i32>(witness_props::ACCOUNT_SUBSIDY_BUDGET)?;
    let subsidy_decay = op.decode::<u32>(witness_props::ACCOUNT_SUBSIDY_DECAY)?;
    let new_key = op.decode::<PublicKey>(witness_props::NEW_SIGNING_KEY)?;
    let url = op.decode::<String>(witness_props::URL)?;
    let flat_fee = op.decode::<Asset>(witness_props::OPERATION_FLAT_FEE)?;
    let kbytes_fee = op.decode::<Asset>(witness_props::BANDWIDTH_KBYTES_FEE)?;
    for (name, fee) in [("operation_flat_fee", flat_fee), ("bandwidth_kbytes_fee", kbytes_fee)] {
        if let Some(fee) = fee {
            ensure_eval!(
                fee.amount <= MAX_PROPOSED_OPERATION_FEE,
                OP,
                "{name} too high: {fee}"
            );
        }
    }

    ctx.state.witnesses.modify(&op.owner, |w| {
        if let Some(fee) = creation_fee {
            w.props.account_creation_fee = fee;
        }
        if let Some(size) = block_size {
            w.props.maximum_block_size = size;
        }
        if let Some(budget) = subsidy_budget {
            w.props.account_subsidy_budget = budget;
        }
        if let Some(decay) = subsidy_decay {
            w.props.account_subsidy_decay = decay;
        }
        if let Some(key) = new_key {
            w.signing_key = key;
        }
        if let Some(url) = url {
            w.url = url;
        }
        if let Some(fee) = flat_fee {
            w.props.operation_flat_fee = fee;
        }
        if let Some(fee) = kbytes_fee {
            w.props.bandwidth_kbytes_fee = fee;
        }
    })?;

    // Signed with the block signing key rather than an account authority,
    // so the transaction fee does not cover it.
    if ctx.has_hardfork(HARDFORK_5) {
        let fee = properties_fee(ctx, op)?;
        let balance = ctx.state.account(&op.owner)?.balance;
        if balance.amount < fee.amount {
            return Err(EvalError::InsufficientFunds {
                account: op.owner.clone(),
                balance,
                required: fee,
            });
        }
        let sink = fee_sink(ctx.state);
        adjust_balance(ctx.state, &op.owner, -fee)?;
        adjust_balance(ctx.state, &sink, fee)?;
        debug!(owner = %op.owner, fee = %fee, sink = %sink, "charged witness property fee");
    }
    Ok(())
}

/// Flat fee plus the bandwidth fee for the encoded operation, each at
/// least one unit.
pub fn properties_fee(ctx: &ApplyContext<'_>, op: &WitnessSetPropertiesOperation) -> EvalResult<Asset> {
    let median = &ctx.state.schedule.median_props;
    let size = bincode::serialized_size(op)
        .map_err(|e| EvalError::Internal(format!("cannot size witness_set_properties: {e}")))?;
    let flat = median.operation_flat_fee.amount.max(1);
    let bandwidth = (size as i64 * median.bandwidth_kbytes_fee.amount / 1024).max(1);
    Ok(Asset::liquid(flat + bandwidth))
}

pub fn account_witness_vote(ctx: &mut ApplyContext<'_>, op: &AccountWitnessVoteOperation) -> EvalResult<()> {
    const OP: &str = AccountWitnessVoteOperation::NAME;
    let voter = ctx.state.account(&op.account)?;
    ensure_eval!(
        !voter.has_proxy(),
        OP,
        "a proxy is currently set, please clear the proxy before voting for a witness"
    );
    if op.approve {
        ensure_eval!(voter.can_vote, OP, "account has declined its voting rights");
    }
    let voted_for = voter.witnesses_voted_for;
    let weight = if op.account.as_str() == REGENT_ACCOUNT {
        ctx.state.globals.regent_vesting_shares.amount
    } else {
        voter.witness_vote_weight()
    };
    ctx.state.witness(&op.witness)?;

    let key = (op.account.clone(), op.witness.clone());
    if ctx.state.witness_votes.contains(&key) {
        ensure_eval!(
            !op.approve,
            OP,
            "vote currently exists, user must indicate a desire to reject witness"
        );
        adjust_witness_vote(ctx.state, &op.witness, -weight)?;
        ctx.state
            .accounts
            .modify(&op.account, |a| a.witnesses_voted_for -= 1)?;
        ctx.state.witness_votes.remove(&key)?;
    } else {
        ensure_eval!(
            op.approve,
            OP,
            "vote doesn't exist, user must indicate a desire to approve witness"
        );
        ensure_eval!(
            voted_for < MAX_ACCOUNT_WITNESS_VOTES,
            OP,
            "account has voted for too many witnesses"
        );
        ctx.state.witness_votes.insert(WitnessVote {
            account: op.account.clone(),
            witness: op.witness.clone(),
        })?;
        adjust_witness_vote(ctx.state, &op.witness, weight)?;
        ctx.state
            .accounts
            .modify(&op.account, |a| a.witnesses_voted_for += 1)?;
    }
    Ok(())
}

pub fn account_witness_proxy(ctx: &mut ApplyContext<'_>, op: &AccountWitnessProxyOperation) -> EvalResult<()> {
    const OP: &str = AccountWitnessProxyOperation::NAME;
    let account = ctx.state.account(&op.account)?;
    ensure_eval!(account.proxy != op.proxy, OP, "proxy must change");
    ensure_eval!(
        account.can_vote,
        OP,
        "account has declined the ability to vote and cannot proxy votes"
    );

    let mut delta: VoteDeltas = [0; MAX_PROXY_RECURSION_DEPTH + 1];
    delta[0] = -account.vesting_shares.amount;
    for (i, proxied) in account.proxied_vsf_votes.iter().enumerate() {
        delta[i + 1] = -proxied;
    }
    adjust_proxied_witness_votes_by_depth(ctx.state, &op.account, &delta)?;

    if op.proxy.is_empty() {
        ctx.state
            .accounts
            .modify(&op.account, |a| a.proxy = AccountName::default())?;
        return Ok(());
    }

    check_proxy_chain(ctx, &op.account, &op.proxy)?;
    clear_witness_votes(ctx.state, &op.account)?;
    ctx.state
        .accounts
        .modify(&op.account, |a| a.proxy = op.proxy.clone())?;
    for d in delta.iter_mut() {
        *d = -*d;
    }
    adjust_proxied_witness_votes_by_depth(ctx.state, &op.account, &delta)?;
    debug!(account = %op.account, proxy = %op.proxy, "witness proxy set");
    Ok(())
}

/// Walks the chain starting at `proxy`, rejecting loops back through
/// `account` and chains deeper than the recursion limit.
fn check_proxy_chain(ctx: &ApplyContext<'_>, account: &AccountName, proxy: &AccountName) -> EvalResult<()> {
    const OP: &str = AccountWitnessProxyOperation::NAME;
    let mut chain: BTreeSet<&AccountName> = BTreeSet::new();
    chain.insert(account);
    chain.insert(proxy);
    let mut current = ctx.state.account(proxy)?;
    while current.has_proxy() {
        let next = ctx.state.account(&current.proxy)?;
        ensure_eval!(
            chain.insert(&next.name),
            OP,
            "this proxy would create a proxy loop"
        );
        ensure_eval!(
            chain.len() <= MAX_PROXY_RECURSION_DEPTH,
            OP,
            "proxy chain is too long"
        );
        current = next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::protocol::operations::LegacyChainProperties;
    use std::collections::BTreeMap;

    fn vote(f: &mut Fixture, account: &str, witness: &str, approve: bool) -> EvalResult<()> {
        account_witness_vote(
            &mut f.ctx(),
            &AccountWitnessVoteOperation {
                account: account.into(),
                witness: witness.into(),
                approve,
            },
        )
    }

    fn proxy(f: &mut Fixture, account: &str, proxy: &str) -> EvalResult<()> {
        account_witness_proxy(
            &mut f.ctx(),
            &AccountWitnessProxyOperation {
                account: account.into(),
                proxy: proxy.into(),
            },
        )
    }

    fn votes(f: &Fixture, witness: &str) -> i64 {
        f.state.witness(witness).unwrap().votes
    }

    fn set_props(props: Vec<(&str, Vec<u8>)>) -> WitnessSetPropertiesOperation {
        let mut map = BTreeMap::new();
        map.insert(
            witness_props::KEY.to_string(),
            WitnessSetPropertiesOperation::encode(&key(1)),
        );
        for (name, value) in props {
            map.insert(name.to_string(), value);
        }
        WitnessSetPropertiesOperation {
            owner: "alice".into(),
            props: map,
        }
    }

    #[test]
    fn test_witness_update_creates_then_modifies() {
        let mut f = Fixture::new();
        let mut op = WitnessUpdateOperation {
            owner: "bob".into(),
            url: "https://bob.example".into(),
            block_signing_key: key(2),
            props: LegacyChainProperties {
                account_creation_fee: Asset::liquid(5_000),
                maximum_block_size: 131_072,
            },
            fee: Asset::liquid(0),
        };
        witness_update(&mut f.ctx(), &op).unwrap();
        let w = f.state.witness("bob").unwrap();
        assert_eq!(w.signing_key, key(2));
        assert_eq!(w.props.account_creation_fee.amount, 5_000);
        assert_eq!(w.created, GENESIS);

        op.block_signing_key = key(3);
        witness_update(&mut f.ctx(), &op).unwrap();
        assert_eq!(f.state.witness("bob").unwrap().signing_key, key(3));
        assert_eq!(f.state.witnesses.len(), 2);

        op.props.maximum_block_size = SOFT_MAX_BLOCK_SIZE + 1;
        assert!(witness_update(&mut f.ctx(), &op).is_err());
    }

    #[test]
    fn test_set_properties_requires_current_key() {
        let mut f = Fixture::new();
        let mut op = set_props(vec![]);
        op.props.insert(
            witness_props::KEY.to_string(),
            WitnessSetPropertiesOperation::encode(&key(7)),
        );
        assert!(witness_set_properties(&mut f.ctx(), &op).is_err());
    }

    #[test]
    fn test_set_properties_updates_fields() {
        let mut f = Fixture::new();
        let op = set_props(vec![
            (witness_props::NEW_SIGNING_KEY, WitnessSetPropertiesOperation::encode(&key(4))),
            (witness_props::URL, WitnessSetPropertiesOperation::encode(&"https://a.example".to_string())),
            (witness_props::ACCOUNT_SUBSIDY_BUDGET, WitnessSetPropertiesOperation::encode(&1_000i32)),
        ]);
        witness_set_properties(&mut f.ctx(), &op).unwrap();
        let w = f.state.witness("alice").unwrap();
        assert_eq!(w.signing_key, key(4));
        assert_eq!(w.url, "https://a.example");
        assert_eq!(w.props.account_subsidy_budget, 1_000);
        // No fee before hardfork 5.
        assert_eq!(f.state.account("alice").unwrap().balance.amount, 100_000);
    }

    #[test]
    fn test_set_properties_rejects_high_operation_fee() {
        let mut f = Fixture::new();
        let op = set_props(vec![(
            witness_props::OPERATION_FLAT_FEE,
            WitnessSetPropertiesOperation::encode(&Asset::liquid(MAX_PROPOSED_OPERATION_FEE + 1)),
        )]);
        assert!(witness_set_properties(&mut f.ctx(), &op).is_err());
    }

    #[test]
    fn test_set_properties_fee_after_hardfork_5() {
        let mut f = Fixture::new();
        f.state.hardforks.modify(|h| h.last_hardfork = HARDFORK_5);
        let op = set_props(vec![]);
        let fee = properties_fee(&f.ctx(), &op).unwrap();
        assert!(fee.amount >= 2);
        witness_set_properties(&mut f.ctx(), &op).unwrap();
        assert_eq!(f.state.account("alice").unwrap().balance.amount, 100_000 - fee.amount);
        assert_eq!(f.state.account(NULL_ACCOUNT).unwrap().balance.amount, fee.amount);
    }

    #[test]
    fn test_vote_and_unvote() {
        let mut f = Fixture::new();
        f.add_vests("bob", 5_000_000);
        vote(&mut f, "bob", "alice", true).unwrap();
        assert_eq!(votes(&f, "alice"), 5_000_000);
        assert_eq!(f.state.account("bob").unwrap().witnesses_voted_for, 1);
        assert!(vote(&mut f, "bob", "alice", true).is_err());

        vote(&mut f, "bob", "alice", false).unwrap();
        assert_eq!(votes(&f, "alice"), 0);
        assert!(f.state.witness_votes.is_empty());
        assert!(vote(&mut f, "bob", "alice", false).is_err());
    }

    #[test]
    fn test_proxy_moves_weight() {
        let mut f = Fixture::new();
        f.add_vests("bob", 5_000_000);
        f.add_vests("carol", 1_000_000);
        vote(&mut f, "bob", "alice", true).unwrap();
        vote(&mut f, "carol", "alice", true).unwrap();
        assert_eq!(votes(&f, "alice"), 6_000_000);

        // Proxying drops bob's own votes and adds his weight to carol's.
        proxy(&mut f, "bob", "carol").unwrap();
        assert_eq!(votes(&f, "alice"), 6_000_000);
        assert_eq!(f.state.account("bob").unwrap().witnesses_voted_for, 0);
        assert_eq!(f.state.account("carol").unwrap().proxied_vsf_votes[0], 5_000_000);
        assert!(vote(&mut f, "bob", "alice", true).is_err());

        proxy(&mut f, "bob", "").unwrap();
        assert_eq!(votes(&f, "alice"), 1_000_000);
        assert_eq!(f.state.account("carol").unwrap().proxied_vsf_votes[0], 0);
    }

    #[test]
    fn test_proxy_loop_rejected() {
        let mut f = Fixture::new();
        proxy(&mut f, "bob", "carol").unwrap();
        assert!(proxy(&mut f, "carol", "bob").is_err());
    }
}
