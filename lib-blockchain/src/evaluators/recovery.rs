//! Stolen-account recovery, recovery partner changes, and declining
//! voting rights.
//!
//! # Recovery flow
//!
//! ```text
//! 1. recovery partner: request_account_recovery(new owner)   expires in 1 day
//! 2. owner:            recover_account(new owner, a recent owner)
//!                      the recent owner must appear in the owner history
//! ```
//!
//! Changing the recovery partner and declining voting rights both take
//! effect only after `OWNER_AUTH_RECOVERY_PERIOD`, through the sweeps.

use tracing::{debug, info, warn};

use super::{update_owner_authority, validate_auth_size, verify_authority_accounts_exist};
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::{EvalError, EvalResult};
use crate::protocol::constants::*;
use crate::protocol::operations::{
    ChangeRecoveryAccountOperation, DeclineVotingRightsOperation, OperationBody,
    RecoverAccountOperation, RequestAccountRecoveryOperation, ResetAccountOperation,
    SetResetAccountOperation,
};
use crate::protocol::{AccountName, Authority, AuthorityClass};
use crate::storage::keys::KeyBuilder;
use crate::storage::objects::{
    owner_history_index, witness_index, AccountRecoveryRequest, ChangeRecoveryAccountRequest,
    DeclineVotingRightsRequest,
};
use crate::storage::ChainState;

pub fn request_account_recovery(ctx: &mut ApplyContext<'_>, op: &RequestAccountRecoveryOperation) -> EvalResult<()> {
    const OP: &str = RequestAccountRecoveryOperation::NAME;
    let account = ctx.state.account(&op.account_to_recover)?;
    if account.recovery_account.is_empty() {
        // No partner: the top voted witness acts as one.
        let top = ctx
            .state
            .witnesses
            .first_by(witness_index::BY_VOTE)
            .map(|w| w.owner.clone());
        ensure_eval!(
            top.as_ref() == Some(&op.recovery_account),
            OP,
            "top witness must recover an account with no recovery partner"
        );
    } else {
        ensure_eval!(
            account.recovery_account == op.recovery_account,
            OP,
            "cannot recover an account that does not have you as their recovery partner"
        );
        if op.recovery_account.as_str() == TEMP_ACCOUNT {
            warn!(account = %op.account_to_recover, "recovery by temp account");
        }
    }

    let expires = ctx.now() + ACCOUNT_RECOVERY_REQUEST_EXPIRATION_PERIOD;
    let auth = &op.new_owner_authority;
    let existing = ctx.state.recovery_requests.contains(&op.account_to_recover);

    if !existing {
        ensure_eval!(!auth.is_impossible(), OP, "cannot recover using an impossible authority");
        ensure_eval!(auth.weight_threshold > 0, OP, "cannot recover using an open authority");
        validate_auth_size(auth, OP)?;
        verify_authority_accounts_exist(ctx.state, auth, OP, AuthorityClass::Owner)?;
        ctx.state.recovery_requests.insert(AccountRecoveryRequest {
            account_to_recover: op.account_to_recover.clone(),
            new_owner_authority: auth.clone(),
            expires,
        })?;
        debug!(account = %op.account_to_recover, by = %op.recovery_account, "account recovery requested");
    } else if auth.weight_threshold == 0 {
        ctx.state.recovery_requests.remove(&op.account_to_recover)?;
        debug!(account = %op.account_to_recover, "account recovery request cancelled");
    } else {
        ensure_eval!(!auth.is_impossible(), OP, "cannot recover using an impossible authority");
        verify_authority_accounts_exist(ctx.state, auth, OP, AuthorityClass::Owner)?;
        ctx.state.recovery_requests.modify(&op.account_to_recover, |r| {
            r.new_owner_authority = auth.clone();
            r.expires = expires;
        })?;
    }
    Ok(())
}

/// True when `auth` was an owner authority of `account` within the
/// recovery window.
pub fn was_recent_owner(state: &ChainState, account: &AccountName, auth: &Authority) -> bool {
    let from = KeyBuilder::new().name(account).build();
    state
        .owner_history
        .iter_by_from(owner_history_index::BY_ACCOUNT, &from)
        .take_while(|h| &h.account == account)
        .any(|h| &h.previous_owner_authority == auth)
}

pub fn recover_account(ctx: &mut ApplyContext<'_>, op: &RecoverAccountOperation) -> EvalResult<()> {
    const OP: &str = RecoverAccountOperation::NAME;
    let now = ctx.now();
    let account = ctx.state.account(&op.account_to_recover)?;
    ensure_eval!(
        now.seconds_since(account.last_account_recovery) > OWNER_UPDATE_LIMIT as i64,
        OP,
        "owner authority can only be updated once an hour"
    );
    let request = ctx
        .state
        .recovery_requests
        .get(&op.account_to_recover)
        .ok_or_else(|| EvalError::precondition(OP, "there are no active recovery requests for this account"))?;
    ensure_eval!(
        request.new_owner_authority == op.new_owner_authority,
        OP,
        "new owner authority does not match recovery request"
    );
    ensure_eval!(
        was_recent_owner(ctx.state, &op.account_to_recover, &op.recent_owner_authority),
        OP,
        "recent authority not found in authority history"
    );

    ctx.state.recovery_requests.remove(&op.account_to_recover)?;
    update_owner_authority(ctx.state, &op.account_to_recover, op.new_owner_authority.clone(), now)?;
    ctx.state
        .accounts
        .modify(&op.account_to_recover, |a| a.last_account_recovery = now)?;
    info!(account = %op.account_to_recover, "account recovered");
    Ok(())
}

pub fn change_recovery_account(ctx: &mut ApplyContext<'_>, op: &ChangeRecoveryAccountOperation) -> EvalResult<()> {
    ctx.state.account(&op.new_recovery_account)?;
    let current = ctx.state.account(&op.account_to_recover)?.recovery_account.clone();
    let effective_on = ctx.now() + OWNER_AUTH_RECOVERY_PERIOD;
    let requests = &mut ctx.state.change_recovery_requests;

    if !requests.contains(&op.account_to_recover) {
        requests.insert(ChangeRecoveryAccountRequest {
            account_to_recover: op.account_to_recover.clone(),
            recovery_account: op.new_recovery_account.clone(),
            effective_on,
        })?;
    } else if current != op.new_recovery_account {
        requests.modify(&op.account_to_recover, |r| {
            r.recovery_account = op.new_recovery_account.clone();
            r.effective_on = effective_on;
        })?;
    } else {
        // Changing back to the current partner cancels the request.
        requests.remove(&op.account_to_recover)?;
    }
    Ok(())
}

pub fn decline_voting_rights(ctx: &mut ApplyContext<'_>, op: &DeclineVotingRightsOperation) -> EvalResult<()> {
    const OP: &str = DeclineVotingRightsOperation::NAME;
    ctx.state.account(&op.account)?;
    let exists = ctx.state.decline_voting_requests.contains(&op.account);
    if op.decline {
        ensure_eval!(!exists, OP, "cannot create new request because one already exists");
        ctx.state.decline_voting_requests.insert(DeclineVotingRightsRequest {
            account: op.account.clone(),
            effective_date: ctx.now() + OWNER_AUTH_RECOVERY_PERIOD,
        })?;
    } else {
        ensure_eval!(exists, OP, "cannot cancel the request because it does not exist");
        ctx.state.decline_voting_requests.remove(&op.account)?;
    }
    Ok(())
}

pub fn reset_account(_ctx: &mut ApplyContext<'_>, _op: &ResetAccountOperation) -> EvalResult<()> {
    Err(EvalError::precondition(
        ResetAccountOperation::NAME,
        "reset account operation is currently disabled",
    ))
}

pub fn set_reset_account(_ctx: &mut ApplyContext<'_>, _op: &SetResetAccountOperation) -> EvalResult<()> {
    Err(EvalError::precondition(
        SetResetAccountOperation::NAME,
        "set reset account operation is currently disabled",
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn with_partner(f: &mut Fixture) {
        f.state
            .accounts
            .modify("bob", |a| a.recovery_account = AccountName::from("carol"))
            .unwrap();
    }

    fn request(f: &mut Fixture, by: &str, auth: Authority) -> EvalResult<()> {
        request_account_recovery(
            &mut f.ctx(),
            &RequestAccountRecoveryOperation {
                recovery_account: by.into(),
                account_to_recover: "bob".into(),
                new_owner_authority: auth,
            },
        )
    }

    fn recover(f: &mut Fixture, new: Authority, recent: Authority) -> EvalResult<()> {
        recover_account(
            &mut f.ctx(),
            &RecoverAccountOperation {
                account_to_recover: "bob".into(),
                new_owner_authority: new,
                recent_owner_authority: recent,
            },
        )
    }

    #[test]
    fn test_only_partner_may_request() {
        let mut f = Fixture::new();
        with_partner(&mut f);
        assert!(request(&mut f, "dave", Authority::from_key(key(20))).is_err());
        request(&mut f, "carol", Authority::from_key(key(20))).unwrap();
        let r = f.state.recovery_requests.get("bob").unwrap();
        assert_eq!(r.expires, GENESIS + ACCOUNT_RECOVERY_REQUEST_EXPIRATION_PERIOD);
    }

    #[test]
    fn test_no_partner_falls_back_to_top_witness() {
        let mut f = Fixture::new();
        assert!(request(&mut f, "carol", Authority::from_key(key(20))).is_err());
        request(&mut f, "alice", Authority::from_key(key(20))).unwrap();
    }

    #[test]
    fn test_open_authority_cancels_request() {
        let mut f = Fixture::new();
        with_partner(&mut f);
        assert!(request(&mut f, "carol", Authority::new(0)).is_err(), "nothing to cancel");
        request(&mut f, "carol", Authority::from_key(key(20))).unwrap();
        request(&mut f, "carol", Authority::new(0)).unwrap();
        assert!(f.state.recovery_requests.is_empty());
    }

    #[test]
    fn test_recover_with_recent_owner() {
        let mut f = Fixture::new();
        with_partner(&mut f);
        let original = f.state.authority("bob").unwrap().owner.clone();
        // The thief replaces the owner, which records the original.
        update_owner_authority(&mut f.state, &"bob".into(), Authority::from_key(key(66)), GENESIS).unwrap();
        f.advance(OWNER_UPDATE_LIMIT + 3);

        let new = Authority::from_key(key(20));
        request(&mut f, "carol", new.clone()).unwrap();
        assert!(recover(&mut f, new.clone(), Authority::from_key(key(55))).is_err());
        recover(&mut f, new.clone(), original).unwrap();

        assert_eq!(f.state.authority("bob").unwrap().owner, new);
        assert!(f.state.recovery_requests.is_empty());
        assert_eq!(f.state.account("bob").unwrap().last_account_recovery, f.state.head_block_time());
    }

    #[test]
    fn test_recover_without_request_fails() {
        let mut f = Fixture::new();
        let owner = f.state.authority("bob").unwrap().owner.clone();
        assert!(recover(&mut f, Authority::from_key(key(20)), owner).is_err());
    }

    #[test]
    fn test_change_recovery_account_round_trip() {
        let mut f = Fixture::new();
        with_partner(&mut f);
        let op = |to: &str| ChangeRecoveryAccountOperation {
            account_to_recover: "bob".into(),
            new_recovery_account: to.into(),
        };
        change_recovery_account(&mut f.ctx(), &op("dave")).unwrap();
        let r = f.state.change_recovery_requests.get("bob").unwrap();
        assert_eq!(r.effective_on, GENESIS + OWNER_AUTH_RECOVERY_PERIOD);

        change_recovery_account(&mut f.ctx(), &op("alice")).unwrap();
        assert_eq!(
            f.state.change_recovery_requests.get("bob").unwrap().recovery_account,
            "alice"
        );
        // Back to the current partner: request dropped.
        change_recovery_account(&mut f.ctx(), &op("carol")).unwrap();
        assert!(f.state.change_recovery_requests.is_empty());
    }

    #[test]
    fn test_decline_voting_rights_request_and_cancel() {
        let mut f = Fixture::new();
        let op = |decline| DeclineVotingRightsOperation {
            account: "bob".into(),
            decline,
        };
        assert!(decline_voting_rights(&mut f.ctx(), &op(false)).is_err());
        decline_voting_rights(&mut f.ctx(), &op(true)).unwrap();
        assert!(decline_voting_rights(&mut f.ctx(), &op(true)).is_err());
        decline_voting_rights(&mut f.ctx(), &op(false)).unwrap();
        assert!(f.state.decline_voting_requests.is_empty());
    }

    #[test]
    fn test_reset_operations_disabled() {
        let mut f = Fixture::new();
        let op = SetResetAccountOperation {
            account: "bob".into(),
            current_reset_account: NULL_ACCOUNT.into(),
            reset_account: "carol".into(),
        };
        assert!(set_reset_account(&mut f.ctx(), &op).is_err());
    }
}
