//! Account creation and updates.
//!
//! Accounts are created either by paying the witness-voted creation fee,
//! or in two steps: `claim_account` buys (or takes from the subsidy pool) a
//! creation ticket and `create_claimed_account` spends it.

use tracing::debug;

use super::{update_owner_authority, validate_auth_size, verify_authority_accounts_exist};
use crate::economics::supply::adjust_balance;
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::operations::{
    AccountCreateOperation, AccountUpdateOperation, ClaimAccountOperation,
    CreateClaimedAccountOperation, OperationBody,
};
use crate::protocol::{AccountName, Authority, AuthorityClass, PublicKey, TimePointSec};
use crate::storage::objects::{Account, AccountAuthority, WitnessScheduleType};
use crate::storage::ChainState;

/// Fields shared by both ways of creating an account.
struct NewAccount<'a> {
    creator: &'a AccountName,
    name: &'a AccountName,
    owner: &'a Authority,
    active: &'a Authority,
    posting: &'a Authority,
    memo_key: PublicKey,
    json_metadata: &'a str,
}

fn verify_new_account_authorities(state: &ChainState, new: &NewAccount<'_>, op: &'static str) -> EvalResult<()> {
    verify_authority_accounts_exist(state, new.owner, op, AuthorityClass::Owner)?;
    verify_authority_accounts_exist(state, new.active, op, AuthorityClass::Active)?;
    verify_authority_accounts_exist(state, new.posting, op, AuthorityClass::Posting)
}

fn insert_account(state: &mut ChainState, new: NewAccount<'_>, op: &'static str, now: TimePointSec) -> EvalResult<()> {
    ensure_eval!(
        !state.accounts.contains(new.name),
        op,
        "account {} already exists",
        new.name
    );
    let mut account = Account::new(new.name.clone(), new.memo_key, now);
    if *new.creator != TEMP_ACCOUNT {
        account.recovery_account = new.creator.clone();
    }
    account.json_metadata = new.json_metadata.to_string();
    state.accounts.insert(account)?;
    state.account_authorities.insert(AccountAuthority {
        account: new.name.clone(),
        owner: new.owner.clone(),
        active: new.active.clone(),
        posting: new.posting.clone(),
        last_owner_update: TimePointSec::MINIMUM,
    })?;
    debug!(account = %new.name, creator = %new.creator, "account created");
    Ok(())
}

pub fn account_create(ctx: &mut ApplyContext<'_>, op: &AccountCreateOperation) -> EvalResult<()> {
    const OP: &str = AccountCreateOperation::NAME;
    let balance = ctx.state.account(&op.creator)?.balance;
    ensure_eval!(
        balance.amount >= op.fee.amount,
        OP,
        "insufficient balance to create account: {balance} < {}",
        op.fee
    );
    let required = ctx.state.schedule.median_props.account_creation_fee;
    ensure_eval!(
        op.fee.amount == required.amount,
        OP,
        "must pay the exact account creation fee of {required}, paid {}",
        op.fee
    );

    let new = NewAccount {
        creator: &op.creator,
        name: &op.new_account_name,
        owner: &op.owner,
        active: &op.active,
        posting: &op.posting,
        memo_key: op.memo_key,
        json_metadata: &op.json_metadata,
    };
    for auth in [new.owner, new.active, new.posting] {
        validate_auth_size(auth, OP)?;
    }
    verify_new_account_authorities(ctx.state, &new, OP)?;

    adjust_balance(ctx.state, &op.creator, -op.fee)?;
    adjust_balance(ctx.state, &AccountName::from(NULL_ACCOUNT), op.fee)?;

    let now = ctx.now();
    insert_account(ctx.state, new, OP, now)
}

pub fn account_update(ctx: &mut ApplyContext<'_>, op: &AccountUpdateOperation) -> EvalResult<()> {
    const OP: &str = AccountUpdateOperation::NAME;
    ensure_eval!(op.account != TEMP_ACCOUNT, OP, "cannot update the temp account");
    ctx.state.account(&op.account)?;

    for auth in [&op.owner, &op.active, &op.posting].into_iter().flatten() {
        validate_auth_size(auth, OP)?;
    }

    let now = ctx.now();
    if let Some(owner) = &op.owner {
        let last = ctx.state.authority(&op.account)?.last_owner_update;
        ensure_eval!(
            now.seconds_since(last) > OWNER_UPDATE_LIMIT as i64,
            OP,
            "owner authority can only be updated once every {OWNER_UPDATE_LIMIT} seconds"
        );
        verify_authority_accounts_exist(ctx.state, owner, OP, AuthorityClass::Owner)?;
        update_owner_authority(ctx.state, &op.account, owner.clone(), now)?;
    }
    if let Some(active) = &op.active {
        verify_authority_accounts_exist(ctx.state, active, OP, AuthorityClass::Active)?;
    }
    if let Some(posting) = &op.posting {
        verify_authority_accounts_exist(ctx.state, posting, OP, AuthorityClass::Posting)?;
    }

    ctx.state.accounts.modify(&op.account, |a| {
        if !op.memo_key.is_null() {
            a.memo_key = op.memo_key;
        }
        a.last_account_update = now;
        if !op.json_metadata.is_empty() {
            a.json_metadata = op.json_metadata.clone();
        }
    })?;

    if op.active.is_some() || op.posting.is_some() {
        ctx.state.account_authorities.modify(&op.account, |auth| {
            if let Some(active) = &op.active {
                auth.active = active.clone();
            }
            if let Some(posting) = &op.posting {
                auth.posting = posting.clone();
            }
        })?;
    }
    Ok(())
}

/// Buys an account creation ticket. A zero fee draws from the subsidy
/// pools instead: the producing witness's own pool when the block is
/// applied, and always the global pool.
pub fn claim_account(ctx: &mut ApplyContext<'_>, op: &ClaimAccountOperation) -> EvalResult<()> {
    const OP: &str = ClaimAccountOperation::NAME;
    ensure_eval!(!ctx.has_hardfork(HARDFORK_2), OP, "claim_account is disabled");

    let balance = ctx.state.account(&op.creator)?.balance;
    ensure_eval!(
        balance.amount >= op.fee.amount,
        OP,
        "insufficient balance to claim account: {balance} < {}",
        op.fee
    );

    if op.fee.amount == 0 {
        if !ctx.is_producing {
            let producer = ctx.state.globals.current_witness.clone();
            let witness = ctx.state.witness(&producer)?;
            ensure_eval!(
                witness.schedule == WitnessScheduleType::Elected,
                OP,
                "subsidized accounts can only be claimed in blocks of elected witnesses"
            );
            ensure_eval!(
                witness.available_witness_account_subsidies >= ACCOUNT_SUBSIDY_PRECISION,
                OP,
                "witness {producer} has no subsidized accounts left"
            );
            ctx.state.witnesses.modify(&producer, |w| {
                w.available_witness_account_subsidies -= ACCOUNT_SUBSIDY_PRECISION
            })?;
        }
        let available = ctx.state.globals.available_account_subsidies;
        ensure_eval!(
            available >= ACCOUNT_SUBSIDY_PRECISION,
            OP,
            "no subsidized accounts available: {available}"
        );
        ctx.state
            .globals
            .modify(|g| g.available_account_subsidies -= ACCOUNT_SUBSIDY_PRECISION);
    } else {
        let required = ctx.state.schedule.median_props.account_creation_fee;
        ensure_eval!(
            op.fee.amount == required.amount,
            OP,
            "must pay the exact account creation fee of {required}, paid {}",
            op.fee
        );
    }

    adjust_balance(ctx.state, &op.creator, -op.fee)?;
    adjust_balance(ctx.state, &AccountName::from(NULL_ACCOUNT), op.fee)?;
    ctx.state
        .accounts
        .modify(&op.creator, |a| a.pending_claimed_accounts += 1)?;
    Ok(())
}

pub fn create_claimed_account(ctx: &mut ApplyContext<'_>, op: &CreateClaimedAccountOperation) -> EvalResult<()> {
    const OP: &str = CreateClaimedAccountOperation::NAME;
    ensure_eval!(!ctx.has_hardfork(HARDFORK_2), OP, "create_claimed_account is disabled");

    let pending = ctx.state.account(&op.creator)?.pending_claimed_accounts;
    ensure_eval!(pending > 0, OP, "{} has no claimed accounts to create", op.creator);

    let new = NewAccount {
        creator: &op.creator,
        name: &op.new_account_name,
        owner: &op.owner,
        active: &op.active,
        posting: &op.posting,
        memo_key: op.memo_key,
        json_metadata: &op.json_metadata,
    };
    for auth in [new.owner, new.active, new.posting] {
        validate_auth_size(auth, OP)?;
    }
    verify_new_account_authorities(ctx.state, &new, OP)?;

    ctx.state
        .accounts
        .modify(&op.creator, |a| a.pending_claimed_accounts -= 1)?;
    let now = ctx.now();
    insert_account(ctx.state, new, OP, now)
}
