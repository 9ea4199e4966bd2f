//! Operation Evaluators
//!
//! One function per operation kind. Each re-checks the preconditions that
//! need ledger state and then mutates exactly the records the operation
//! names.
//!
//! # Architecture
//!
//! ```text
//! apply_operation(ctx, op)
//!     │
//!     ├── account     account_create, account_update, claim_account,
//!     │               create_claimed_account
//!     ├── comment     comment, comment_options, delete_comment
//!     ├── vote        vote
//!     ├── transfer    transfers, vesting, power down, savings
//!     ├── delegation  delegate_vesting_shares
//!     ├── reward      claim_reward_balance
//!     ├── witness     witness_update, witness_set_properties,
//!     │               account_witness_vote, account_witness_proxy
//!     ├── escrow      transfer, approve, dispute, release
//!     ├── recovery    recovery requests, decline voting rights, reset
//!     ├── custom      custom, custom_json, custom_binary
//!     └── proposal    create, vote, remove
//! ```
//!
//! # Design Principles
//!
//! - **Stateless checks are not repeated**: `Operation::validate` has
//!   already run by the time an evaluator is called
//! - **First failure wins**: a violated precondition returns at once and
//!   the enclosing undo session discards any partial writes
//! - **Closed dispatch**: `apply_operation` matches every variant, so a
//!   new operation does not compile until it has an evaluator

pub mod account;
pub mod comment;
pub mod custom;
pub mod delegation;
pub mod escrow;
pub mod proposal;
pub mod recovery;
pub mod reward;
pub mod transfer;
pub mod vote;
pub mod witness;

use tracing::trace;

use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::{AccountName, Authority, AuthorityClass, Operation, TimePointSec};
use crate::storage::objects::OwnerAuthorityHistory;
use crate::storage::ChainState;

/// Applies one operation to the ledger.
pub fn apply_operation(ctx: &mut ApplyContext<'_>, op: &Operation) -> EvalResult<()> {
    trace!(
        block_num = ctx.block_num,
        op_in_trx = ctx.op_in_trx,
        op = op.name(),
        "evaluating operation"
    );
    match op {
        Operation::Vote(op) => vote::vote(ctx, op),
        Operation::Comment(op) => comment::comment(ctx, op),
        Operation::CommentOptions(op) => comment::comment_options(ctx, op),
        Operation::DeleteComment(op) => comment::delete_comment(ctx, op),

        Operation::Transfer(op) => transfer::transfer(ctx, op),
        Operation::TransferToVesting(op) => transfer::transfer_to_vesting(ctx, op),
        Operation::WithdrawVesting(op) => transfer::withdraw_vesting(ctx, op),
        Operation::SetWithdrawVestingRoute(op) => transfer::set_withdraw_vesting_route(ctx, op),
        Operation::TransferToSavings(op) => transfer::transfer_to_savings(ctx, op),
        Operation::TransferFromSavings(op) => transfer::transfer_from_savings(ctx, op),
        Operation::CancelTransferFromSavings(op) => transfer::cancel_transfer_from_savings(ctx, op),
        Operation::DelegateVestingShares(op) => delegation::delegate_vesting_shares(ctx, op),
        Operation::ClaimRewardBalance(op) => reward::claim_reward_balance(ctx, op),

        Operation::AccountCreate(op) => account::account_create(ctx, op),
        Operation::AccountUpdate(op) => account::account_update(ctx, op),
        Operation::ClaimAccount(op) => account::claim_account(ctx, op),
        Operation::CreateClaimedAccount(op) => account::create_claimed_account(ctx, op),

        Operation::WitnessUpdate(op) => witness::witness_update(ctx, op),
        Operation::WitnessSetProperties(op) => witness::witness_set_properties(ctx, op),
        Operation::AccountWitnessVote(op) => witness::account_witness_vote(ctx, op),
        Operation::AccountWitnessProxy(op) => witness::account_witness_proxy(ctx, op),

        Operation::EscrowTransfer(op) => escrow::escrow_transfer(ctx, op),
        Operation::EscrowApprove(op) => escrow::escrow_approve(ctx, op),
        Operation::EscrowDispute(op) => escrow::escrow_dispute(ctx, op),
        Operation::EscrowRelease(op) => escrow::escrow_release(ctx, op),

        Operation::RequestAccountRecovery(op) => recovery::request_account_recovery(ctx, op),
        Operation::RecoverAccount(op) => recovery::recover_account(ctx, op),
        Operation::ChangeRecoveryAccount(op) => recovery::change_recovery_account(ctx, op),
        Operation::DeclineVotingRights(op) => recovery::decline_voting_rights(ctx, op),
        Operation::ResetAccount(op) => recovery::reset_account(ctx, op),
        Operation::SetResetAccount(op) => recovery::set_reset_account(ctx, op),

        Operation::Custom(op) => custom::custom(ctx, op),
        Operation::CustomJson(op) => custom::custom_json(ctx, op),
        Operation::CustomBinary(op) => custom::custom_binary(ctx, op),

        Operation::CreateProposal(op) => proposal::create_proposal(ctx, op),
        Operation::UpdateProposalVotes(op) => proposal::update_proposal_votes(ctx, op),
        Operation::RemoveProposal(op) => proposal::remove_proposal(ctx, op),
    }
}

// =============================================================================
// SHARED CHECKS
// =============================================================================

/// Every account named inside `auth` must exist.
pub(crate) fn verify_authority_accounts_exist(
    state: &ChainState,
    auth: &Authority,
    op: &'static str,
    class: AuthorityClass,
) -> EvalResult<()> {
    for member in auth.account_auths.keys() {
        ensure_eval!(
            state.accounts.contains(member),
            op,
            "account {member} in {class} authority does not exist"
        );
    }
    Ok(())
}

pub(crate) fn validate_auth_size(auth: &Authority, op: &'static str) -> EvalResult<()> {
    let size = auth.num_auths();
    ensure_eval!(
        size <= MAX_AUTHORITY_MEMBERSHIP,
        op,
        "authority membership exceeded: max {MAX_AUTHORITY_MEMBERSHIP}, current {size}"
    );
    Ok(())
}

/// Replaces the owner authority, remembering the old one so it can still
/// be used to recover the account for a while.
pub(crate) fn update_owner_authority(
    state: &mut ChainState,
    account: &AccountName,
    owner: Authority,
    now: TimePointSec,
) -> EvalResult<()> {
    if state.head_block_num() >= OWNER_AUTH_HISTORY_TRACKING_START_BLOCK_NUM {
        let previous = state.authority(account)?.owner.clone();
        let id = state.owner_history.next_id();
        state.owner_history.insert(OwnerAuthorityHistory {
            id,
            account: account.clone(),
            previous_owner_authority: previous,
            last_valid_time: now,
        })?;
    }
    state.account_authorities.modify(account, |a| {
        a.owner = owner;
        a.last_owner_update = now;
    })?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A ledger with a handful of funded accounts and one witness, for
    //! driving evaluators directly.

    use crate::events::Notifier;
    use crate::execution::context::ApplyContext;
    use crate::execution::skip_flags::SkipFlags;
    use crate::protocol::constants::*;
    use crate::protocol::{
        AccountName, Asset, Authority, ChainId, HardforkSchedule, PublicKey, TimePointSec,
    };
    use crate::storage::objects::{Account, AccountAuthority, RewardFund, Witness};
    use crate::storage::ChainState;
    use crate::economics::curves::CurveId;

    pub const GENESIS: TimePointSec = TimePointSec(1_000_000);

    pub struct Fixture {
        pub state: ChainState,
        pub notifier: Notifier,
        pub hardforks: HardforkSchedule,
    }

    impl Fixture {
        pub fn new() -> Self {
            let mut state = ChainState::new();
            state.globals.modify(|g| {
                g.time = GENESIS;
                g.head_block_number = 10;
                g.current_witness = AccountName::from("alice");
            });
            state.hardforks.modify(|h| h.processed_hardforks.push(GENESIS));
            state
                .reward_funds
                .insert(RewardFund {
                    id: POST_REWARD_FUND_ID,
                    name: "post".into(),
                    reward_balance: Asset::liquid(0),
                    recent_claims: 0,
                    last_update: GENESIS,
                    content_constant: REWARD_CONSTANT,
                    percent_curation_rewards: 25 * PERCENT_1,
                    percent_content_rewards: PERCENT_100,
                    author_reward_curve: CurveId::Quadratic,
                    curation_reward_curve: CurveId::Linear,
                })
                .unwrap();
            let mut fixture = Self {
                state,
                notifier: Notifier::default(),
                hardforks: HardforkSchedule::new(GENESIS, &[]),
            };
            for name in [NULL_ACCOUNT, TEMP_ACCOUNT, TREASURY_ACCOUNT, REGENT_ACCOUNT] {
                fixture.add_account(name, 0);
            }
            for name in ["alice", "bob", "carol", "dave"] {
                fixture.add_account(name, 100_000);
            }
            fixture
                .state
                .witnesses
                .insert(Witness::new("alice".into(), key(1), GENESIS, GENESIS))
                .unwrap();
            fixture
        }

        pub fn add_account(&mut self, name: &str, balance: i64) {
            let mut account = Account::new(AccountName::from(name), key(0), GENESIS);
            account.balance = Asset::liquid(balance);
            self.state.accounts.insert(account).unwrap();
            self.state
                .account_authorities
                .insert(AccountAuthority {
                    account: AccountName::from(name),
                    owner: Authority::from_key(key(9)),
                    active: Authority::from_key(key(9)),
                    posting: Authority::from_key(key(9)),
                    last_owner_update: TimePointSec::MINIMUM,
                })
                .unwrap();
            self.state.globals.modify(|g| g.current_supply.amount += balance);
        }

        /// Gives `name` vesting shares at the default price, keeping the
        /// global totals consistent.
        pub fn add_vests(&mut self, name: &str, vests: i64) {
            let liquid = vests / (DEFAULT_VESTING_PRICE_VESTS / DEFAULT_VESTING_PRICE_LIQUID);
            self.state
                .accounts
                .modify(name, |a| {
                    a.vesting_shares.amount += vests;
                    a.voting_manabar.current_mana += vests;
                })
                .unwrap();
            self.state.globals.modify(|g| {
                g.total_vesting_shares.amount += vests;
                g.total_vesting_fund_liquid.amount += liquid;
                g.current_supply.amount += liquid;
            });
        }

        pub fn advance(&mut self, secs: u32) {
            self.state.globals.modify(|g| {
                g.time = g.time + secs;
                g.head_block_number += secs / BLOCK_INTERVAL;
            });
        }

        pub fn ctx(&mut self) -> ApplyContext<'_> {
            ApplyContext::new(
                &mut self.state,
                &mut self.notifier,
                &self.hardforks,
                ChainId::from_seed("test"),
                SkipFlags::NOTHING,
            )
        }
    }

    pub fn key(seed: u8) -> PublicKey {
        PublicKey([seed; 32])
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::protocol::operations::TransferOperation;
    use crate::protocol::{Asset, OperationKind};

    #[test]
    fn test_every_operation_kind_has_a_name() {
        let names: std::collections::BTreeSet<_> = OperationKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), OperationKind::ALL.len());
    }

    #[test]
    fn test_apply_operation_dispatches_transfer() {
        let mut f = Fixture::new();
        let op = Operation::from(TransferOperation {
            from: "alice".into(),
            to: "bob".into(),
            amount: Asset::liquid(1_000),
            memo: String::new(),
        });
        apply_operation(&mut f.ctx(), &op).unwrap();
        assert_eq!(f.state.account("alice").unwrap().balance.amount, 99_000);
        assert_eq!(f.state.account("bob").unwrap().balance.amount, 101_000);
    }

    #[test]
    fn test_update_owner_authority_keeps_history() {
        let mut f = Fixture::new();
        let alice = AccountName::from("alice");
        let old = f.state.authority("alice").unwrap().owner.clone();
        let new_owner = Authority::from_key(key(42));
        update_owner_authority(&mut f.state, &alice, new_owner.clone(), GENESIS).unwrap();

        assert_eq!(f.state.authority("alice").unwrap().owner, new_owner);
        let history: Vec<_> = f.state.owner_history.iter().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_owner_authority, old);
    }

    #[test]
    fn test_verify_authority_accounts_exist_rejects_unknown_member() {
        let f = Fixture::new();
        let mut auth = Authority::new(1);
        auth.add_account("nobody".into(), 1);
        let err = verify_authority_accounts_exist(&f.state, &auth, "test", AuthorityClass::Active);
        assert!(err.is_err());
    }
}
