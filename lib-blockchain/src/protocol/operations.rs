//! User-submitted operations.
//!
//! Each operation struct carries its own stateless `validate()` and declares
//! which account authorities must sign for it. `Operation` is the closed sum
//! type the evaluator dispatcher matches on.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::asset::{Asset, Symbol};
use super::authority::Authority;
use super::constants::*;
use super::types::{AccountName, PublicKey, TimePointSec};
use super::validation::{self as check, invalid, ValidationError, ValidationResult};

/// Signer sets an operation needs, by authority class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredAuthorities {
    pub owner: BTreeSet<AccountName>,
    pub active: BTreeSet<AccountName>,
    pub posting: BTreeSet<AccountName>,
    pub other: Vec<Authority>,
}

impl RequiredAuthorities {
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty() && self.active.is_empty() && self.posting.is_empty() && self.other.is_empty()
    }

    /// Every account named in any class.
    pub fn all_accounts(&self) -> BTreeSet<AccountName> {
        self.owner
            .iter()
            .chain(self.active.iter())
            .chain(self.posting.iter())
            .cloned()
            .collect()
    }
}

/// Behaviour shared by every operation body.
pub trait OperationBody {
    const NAME: &'static str;

    fn validate(&self) -> ValidationResult<()>;

    fn required_authorities(&self, auths: &mut RequiredAuthorities);
}

// =============================================================================
// CHAIN PROPERTIES
// =============================================================================

/// Parameters each witness votes on. The schedule publishes their medians.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProperties {
    pub account_creation_fee: Asset,
    pub maximum_block_size: u32,
    pub account_subsidy_budget: i32,
    pub account_subsidy_decay: u32,
    pub operation_flat_fee: Asset,
    pub bandwidth_kbytes_fee: Asset,
}

impl Default for ChainProperties {
    fn default() -> Self {
        Self {
            account_creation_fee: Asset::liquid(DEFAULT_ACCOUNT_CREATION_FEE),
            maximum_block_size: DEFAULT_MAXIMUM_BLOCK_SIZE,
            account_subsidy_budget: DEFAULT_ACCOUNT_SUBSIDY_BUDGET,
            account_subsidy_decay: DEFAULT_ACCOUNT_SUBSIDY_DECAY,
            operation_flat_fee: Asset::liquid(DEFAULT_OPERATION_FLAT_FEE),
            bandwidth_kbytes_fee: Asset::liquid(DEFAULT_BANDWIDTH_KBYTES_FEE),
        }
    }
}

/// The subset of properties `witness_update` can set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyChainProperties {
    pub account_creation_fee: Asset,
    pub maximum_block_size: u32,
}

impl LegacyChainProperties {
    pub fn validate(&self) -> ValidationResult<()> {
        check::symbol("account_creation_fee", &self.account_creation_fee, Symbol::Liquid)?;
        if self.account_creation_fee.amount < MIN_ACCOUNT_CREATION_FEE {
            return Err(invalid("witness_update", "account creation fee below minimum"));
        }
        if self.maximum_block_size < MIN_BLOCK_SIZE_LIMIT {
            return Err(invalid("witness_update", "maximum block size below limit"));
        }
        Ok(())
    }
}

// =============================================================================
// CONTENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOperation {
    pub voter: AccountName,
    pub author: AccountName,
    pub permlink: String,
    /// Basis points, `-100%..=100%`. Negative weights fail at evaluation.
    pub weight: i16,
}

impl OperationBody for VoteOperation {
    const NAME: &'static str = "vote";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("voter", &self.voter)?;
        check::account_name("author", &self.author)?;
        if self.weight.unsigned_abs() > PERCENT_100 {
            return Err(invalid(Self::NAME, "weight is not a valid percentage"));
        }
        check::permlink(&self.permlink)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.posting.insert(self.voter.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentOperation {
    /// Empty for a root post.
    pub parent_author: AccountName,
    /// Category for a root post.
    pub parent_permlink: String,
    pub author: AccountName,
    pub permlink: String,
    pub title: String,
    /// Full body, or a unified diff against the stored body when editing.
    pub body: String,
    pub json_metadata: String,
}

impl OperationBody for CommentOperation {
    const NAME: &'static str = "comment";

    fn validate(&self) -> ValidationResult<()> {
        if self.title.len() >= MAX_COMMENT_TITLE_LENGTH {
            return Err(invalid(Self::NAME, "title larger than size limit"));
        }
        if self.body.is_empty() {
            return Err(invalid(Self::NAME, "body is empty"));
        }
        if !self.parent_author.is_empty() {
            check::account_name("parent_author", &self.parent_author)?;
        }
        check::account_name("author", &self.author)?;
        check::permlink(&self.parent_permlink)?;
        check::permlink(&self.permlink)?;
        check::json("json_metadata", &self.json_metadata)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.posting.insert(self.author.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeneficiaryRoute {
    pub account: AccountName,
    pub weight: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentOptionsExtension {
    Beneficiaries(Vec<BeneficiaryRoute>),
}

impl CommentOptionsExtension {
    fn validate(&self) -> ValidationResult<()> {
        match self {
            CommentOptionsExtension::Beneficiaries(routes) => {
                if routes.is_empty() {
                    return Err(invalid("comment_options", "must specify at least one beneficiary"));
                }
                if routes.len() >= 128 {
                    return Err(invalid("comment_options", "cannot specify more than 127 beneficiaries"));
                }
                let mut sum: u32 = 0;
                for (i, route) in routes.iter().enumerate() {
                    check::account_name("beneficiary", &route.account)?;
                    if route.weight > PERCENT_100 {
                        return Err(invalid(
                            "comment_options",
                            "cannot allocate more than 100% of rewards to one account",
                        ));
                    }
                    sum += route.weight as u32;
                    if sum > PERCENT_100 as u32 {
                        return Err(invalid(
                            "comment_options",
                            "cannot allocate more than 100% of rewards to a comment",
                        ));
                    }
                    if i > 0 && routes[i - 1] >= *route {
                        return Err(invalid(
                            "comment_options",
                            "beneficiaries must be specified in sorted order (account ascending)",
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentOptionsOperation {
    pub author: AccountName,
    pub permlink: String,
    pub max_accepted_payout: Asset,
    /// Share of the author payout taken as liquid tokens.
    pub percent_liquid: u16,
    pub allow_votes: bool,
    pub allow_curation_rewards: bool,
    pub extensions: Vec<CommentOptionsExtension>,
}

impl OperationBody for CommentOptionsOperation {
    const NAME: &'static str = "comment_options";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("author", &self.author)?;
        if self.percent_liquid > PERCENT_100 {
            return Err(invalid(Self::NAME, "percent cannot exceed 100%"));
        }
        check::symbol("max_accepted_payout", &self.max_accepted_payout, Symbol::Liquid)?;
        check::non_negative("max_accepted_payout", &self.max_accepted_payout)?;
        check::permlink(&self.permlink)?;
        for ext in &self.extensions {
            ext.validate()?;
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.posting.insert(self.author.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCommentOperation {
    pub author: AccountName,
    pub permlink: String,
}

impl OperationBody for DeleteCommentOperation {
    const NAME: &'static str = "delete_comment";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("author", &self.author)?;
        check::permlink(&self.permlink)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.posting.insert(self.author.clone());
    }
}

// =============================================================================
// TRANSFERS AND VESTING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: Asset,
    pub memo: String,
}

impl OperationBody for TransferOperation {
    const NAME: &'static str = "transfer";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::account_name("to", &self.to)?;
        if self.amount.is_vests() {
            return Err(invalid(Self::NAME, "transferring of vesting shares is not allowed"));
        }
        check::positive("amount", &self.amount)?;
        if self.memo.len() >= MAX_MEMO_SIZE {
            return Err(ValidationError::TooLong {
                field: "memo",
                len: self.memo.len(),
                max: MAX_MEMO_SIZE - 1,
            });
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.from.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferToVestingOperation {
    pub from: AccountName,
    /// Empty means vest to `from`.
    pub to: AccountName,
    pub amount: Asset,
}

impl OperationBody for TransferToVestingOperation {
    const NAME: &'static str = "transfer_to_vesting";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::symbol("amount", &self.amount, Symbol::Liquid)?;
        if !self.to.is_empty() {
            check::account_name("to", &self.to)?;
        }
        check::positive("amount", &self.amount)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.from.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawVestingOperation {
    pub account: AccountName,
    pub vesting_shares: Asset,
}

impl OperationBody for WithdrawVestingOperation {
    const NAME: &'static str = "withdraw_vesting";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account", &self.account)?;
        check::symbol("vesting_shares", &self.vesting_shares, Symbol::Vests)?;
        check::non_negative("vesting_shares", &self.vesting_shares)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.account.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetWithdrawVestingRouteOperation {
    pub from_account: AccountName,
    pub to_account: AccountName,
    pub percent: u16,
    pub auto_vest: bool,
}

impl OperationBody for SetWithdrawVestingRouteOperation {
    const NAME: &'static str = "set_withdraw_vesting_route";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from_account", &self.from_account)?;
        check::account_name("to_account", &self.to_account)?;
        if self.percent > PERCENT_100 {
            return Err(invalid(Self::NAME, "percent must be valid steem percent"));
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.from_account.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateVestingSharesOperation {
    pub delegator: AccountName,
    pub delegatee: AccountName,
    /// New total delegated amount; zero removes the delegation.
    pub vesting_shares: Asset,
}

impl OperationBody for DelegateVestingSharesOperation {
    const NAME: &'static str = "delegate_vesting_shares";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("delegator", &self.delegator)?;
        check::account_name("delegatee", &self.delegatee)?;
        if self.delegator == self.delegatee {
            return Err(invalid(Self::NAME, "you cannot delegate vests to yourself"));
        }
        check::symbol("vesting_shares", &self.vesting_shares, Symbol::Vests)?;
        check::non_negative("vesting_shares", &self.vesting_shares)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.delegator.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRewardBalanceOperation {
    pub account: AccountName,
    pub reward_liquid: Asset,
    pub reward_vests: Asset,
}

impl OperationBody for ClaimRewardBalanceOperation {
    const NAME: &'static str = "claim_reward_balance";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account", &self.account)?;
        check::symbol("reward_liquid", &self.reward_liquid, Symbol::Liquid)?;
        check::symbol("reward_vests", &self.reward_vests, Symbol::Vests)?;
        check::non_negative("reward_liquid", &self.reward_liquid)?;
        check::non_negative("reward_vests", &self.reward_vests)?;
        if self.reward_liquid.amount == 0 && self.reward_vests.amount == 0 {
            return Err(invalid(Self::NAME, "must claim something"));
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.posting.insert(self.account.clone());
    }
}

// =============================================================================
// SAVINGS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferToSavingsOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: Asset,
    pub memo: String,
}

impl OperationBody for TransferToSavingsOperation {
    const NAME: &'static str = "transfer_to_savings";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::account_name("to", &self.to)?;
        check::positive("amount", &self.amount)?;
        check::symbol("amount", &self.amount, Symbol::Liquid)?;
        check::max_len("memo", &self.memo, MAX_MEMO_SIZE - 1)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.from.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFromSavingsOperation {
    pub from: AccountName,
    pub request_id: u32,
    pub to: AccountName,
    pub amount: Asset,
    pub memo: String,
}

impl OperationBody for TransferFromSavingsOperation {
    const NAME: &'static str = "transfer_from_savings";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::account_name("to", &self.to)?;
        check::positive("amount", &self.amount)?;
        check::symbol("amount", &self.amount, Symbol::Liquid)?;
        check::max_len("memo", &self.memo, MAX_MEMO_SIZE - 1)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.from.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransferFromSavingsOperation {
    pub from: AccountName,
    pub request_id: u32,
}

impl OperationBody for CancelTransferFromSavingsOperation {
    const NAME: &'static str = "cancel_transfer_from_savings";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.from.clone());
    }
}

// =============================================================================
// ACCOUNTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreateOperation {
    pub fee: Asset,
    pub creator: AccountName,
    pub new_account_name: AccountName,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: PublicKey,
    pub json_metadata: String,
}

impl OperationBody for AccountCreateOperation {
    const NAME: &'static str = "account_create";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("new_account_name", &self.new_account_name)?;
        check::account_name("creator", &self.creator)?;
        check::symbol("fee", &self.fee, Symbol::Liquid)?;
        check::non_negative("fee", &self.fee)?;
        check::authority("owner", &self.owner)?;
        check::authority("active", &self.active)?;
        check::authority("posting", &self.posting)?;
        check::json("json_metadata", &self.json_metadata)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.creator.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateOperation {
    pub account: AccountName,
    pub owner: Option<Authority>,
    pub active: Option<Authority>,
    pub posting: Option<Authority>,
    pub memo_key: PublicKey,
    pub json_metadata: String,
}

impl OperationBody for AccountUpdateOperation {
    const NAME: &'static str = "account_update";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account", &self.account)?;
        if let Some(owner) = &self.owner {
            check::authority("owner", owner)?;
        }
        if let Some(active) = &self.active {
            check::authority("active", active)?;
        }
        if let Some(posting) = &self.posting {
            check::authority("posting", posting)?;
        }
        check::json("json_metadata", &self.json_metadata)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        if self.owner.is_some() {
            auths.owner.insert(self.account.clone());
        } else {
            auths.active.insert(self.account.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAccountOperation {
    pub creator: AccountName,
    pub fee: Asset,
}

impl OperationBody for ClaimAccountOperation {
    const NAME: &'static str = "claim_account";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("creator", &self.creator)?;
        check::symbol("fee", &self.fee, Symbol::Liquid)?;
        check::non_negative("fee", &self.fee)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.creator.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClaimedAccountOperation {
    pub creator: AccountName,
    pub new_account_name: AccountName,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub memo_key: PublicKey,
    pub json_metadata: String,
}

impl OperationBody for CreateClaimedAccountOperation {
    const NAME: &'static str = "create_claimed_account";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("creator", &self.creator)?;
        check::account_name("new_account_name", &self.new_account_name)?;
        check::authority("owner", &self.owner)?;
        check::authority("active", &self.active)?;
        check::authority("posting", &self.posting)?;
        check::json("json_metadata", &self.json_metadata)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.creator.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAccountRecoveryOperation {
    pub recovery_account: AccountName,
    pub account_to_recover: AccountName,
    /// Weight threshold 0 cancels an outstanding request.
    pub new_owner_authority: Authority,
}

impl OperationBody for RequestAccountRecoveryOperation {
    const NAME: &'static str = "request_account_recovery";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("recovery_account", &self.recovery_account)?;
        check::account_name("account_to_recover", &self.account_to_recover)?;
        check::authority("new_owner_authority", &self.new_owner_authority)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.recovery_account.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverAccountOperation {
    pub account_to_recover: AccountName,
    pub new_owner_authority: Authority,
    pub recent_owner_authority: Authority,
}

impl OperationBody for RecoverAccountOperation {
    const NAME: &'static str = "recover_account";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account_to_recover", &self.account_to_recover)?;
        if self.new_owner_authority == self.recent_owner_authority {
            return Err(invalid(
                Self::NAME,
                "cannot set new owner authority to the recent owner authority",
            ));
        }
        if self.new_owner_authority.is_impossible() {
            return Err(invalid(Self::NAME, "new owner authority cannot be impossible"));
        }
        if self.recent_owner_authority.is_impossible() {
            return Err(invalid(Self::NAME, "recent owner authority cannot be impossible"));
        }
        if self.new_owner_authority.weight_threshold == 0 {
            return Err(invalid(Self::NAME, "new owner authority cannot be trivial"));
        }
        check::authority("new_owner_authority", &self.new_owner_authority)?;
        check::authority("recent_owner_authority", &self.recent_owner_authority)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.other.push(self.new_owner_authority.clone());
        auths.other.push(self.recent_owner_authority.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecoveryAccountOperation {
    pub account_to_recover: AccountName,
    pub new_recovery_account: AccountName,
}

impl OperationBody for ChangeRecoveryAccountOperation {
    const NAME: &'static str = "change_recovery_account";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account_to_recover", &self.account_to_recover)?;
        check::account_name("new_recovery_account", &self.new_recovery_account)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.owner.insert(self.account_to_recover.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineVotingRightsOperation {
    pub account: AccountName,
    /// `false` cancels a pending request.
    pub decline: bool,
}

impl OperationBody for DeclineVotingRightsOperation {
    const NAME: &'static str = "decline_voting_rights";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account", &self.account)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.owner.insert(self.account.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetAccountOperation {
    pub reset_account: AccountName,
    pub account_to_reset: AccountName,
    pub new_owner_authority: Authority,
}

impl OperationBody for ResetAccountOperation {
    const NAME: &'static str = "reset_account";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("reset_account", &self.reset_account)?;
        check::account_name("account_to_reset", &self.account_to_reset)?;
        if self.new_owner_authority.is_impossible() {
            return Err(invalid(Self::NAME, "new owner authority cannot be impossible"));
        }
        if self.new_owner_authority.weight_threshold == 0 {
            return Err(invalid(Self::NAME, "new owner authority cannot be trivial"));
        }
        check::authority("new_owner_authority", &self.new_owner_authority)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.reset_account.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResetAccountOperation {
    pub account: AccountName,
    pub current_reset_account: AccountName,
    pub reset_account: AccountName,
}

impl OperationBody for SetResetAccountOperation {
    const NAME: &'static str = "set_reset_account";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account", &self.account)?;
        if !self.current_reset_account.is_empty() {
            check::account_name("current_reset_account", &self.current_reset_account)?;
        }
        check::account_name("reset_account", &self.reset_account)?;
        if self.current_reset_account == self.reset_account {
            return Err(invalid(Self::NAME, "new reset account cannot be current reset account"));
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.owner.insert(self.account.clone());
    }
}

// =============================================================================
// WITNESSES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessUpdateOperation {
    pub owner: AccountName,
    pub url: String,
    pub block_signing_key: PublicKey,
    pub props: LegacyChainProperties,
    pub fee: Asset,
}

impl OperationBody for WitnessUpdateOperation {
    const NAME: &'static str = "witness_update";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("owner", &self.owner)?;
        if self.url.is_empty() {
            return Err(invalid(Self::NAME, "URL size must be greater than 0"));
        }
        check::max_len("url", &self.url, MAX_URL_LENGTH)?;
        check::symbol("fee", &self.fee, Symbol::Liquid)?;
        check::non_negative("fee", &self.fee)?;
        self.props.validate()
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.owner.clone());
    }
}

/// Property keys accepted by `witness_set_properties`. Values are bincode.
pub mod witness_props {
    pub const KEY: &str = "key";
    pub const ACCOUNT_CREATION_FEE: &str = "account_creation_fee";
    pub const MAXIMUM_BLOCK_SIZE: &str = "maximum_block_size";
    pub const ACCOUNT_SUBSIDY_BUDGET: &str = "account_subsidy_budget";
    pub const ACCOUNT_SUBSIDY_DECAY: &str = "account_subsidy_decay";
    pub const NEW_SIGNING_KEY: &str = "new_signing_key";
    pub const URL: &str = "url";
    pub const OPERATION_FLAT_FEE: &str = "operation_flat_fee";
    pub const BANDWIDTH_KBYTES_FEE: &str = "bandwidth_kbytes_fee";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessSetPropertiesOperation {
    pub owner: AccountName,
    pub props: BTreeMap<String, Vec<u8>>,
}

impl WitnessSetPropertiesOperation {
    /// Encodes a property value the way `decode` expects it.
    pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
        bincode::serialize(value).unwrap_or_default()
    }

    /// Decodes property `name` if present.
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> ValidationResult<Option<T>> {
        match self.props.get(name) {
            None => Ok(None),
            Some(bytes) => bincode::deserialize(bytes)
                .map(Some)
                .map_err(|e| invalid(Self::NAME, format!("cannot decode {name}: {e}"))),
        }
    }

    /// The current signing key, required in every update.
    pub fn signing_key(&self) -> ValidationResult<PublicKey> {
        self.decode::<PublicKey>(witness_props::KEY)?
            .ok_or_else(|| invalid(Self::NAME, "no signing key provided"))
    }
}

impl OperationBody for WitnessSetPropertiesOperation {
    const NAME: &'static str = "witness_set_properties";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("owner", &self.owner)?;
        self.signing_key()?;
        if let Some(fee) = self.decode::<Asset>(witness_props::ACCOUNT_CREATION_FEE)? {
            check::symbol("account_creation_fee", &fee, Symbol::Liquid)?;
            if fee.amount < MIN_ACCOUNT_CREATION_FEE {
                return Err(invalid(Self::NAME, "account creation fee below minimum"));
            }
        }
        if let Some(size) = self.decode::<u32>(witness_props::MAXIMUM_BLOCK_SIZE)? {
            if size < MIN_BLOCK_SIZE_LIMIT {
                return Err(invalid(Self::NAME, "maximum block size below limit"));
            }
        }
        self.decode::<PublicKey>(witness_props::NEW_SIGNING_KEY)?;
        if let Some(url) = self.decode::<String>(witness_props::URL)? {
            if url.is_empty() {
                return Err(invalid(Self::NAME, "URL size must be greater than 0"));
            }
            check::max_len("url", &url, MAX_URL_LENGTH)?;
        }
        if let Some(budget) = self.decode::<i32>(witness_props::ACCOUNT_SUBSIDY_BUDGET)? {
            if budget < RD_MIN_BUDGET {
                return Err(invalid(Self::NAME, "account subsidy budget must be positive"));
            }
        }
        if let Some(decay) = self.decode::<u32>(witness_props::ACCOUNT_SUBSIDY_DECAY)? {
            if decay < RD_MIN_DECAY {
                return Err(invalid(Self::NAME, "account subsidy decay out of range"));
            }
        }
        for name in [witness_props::OPERATION_FLAT_FEE, witness_props::BANDWIDTH_KBYTES_FEE] {
            if let Some(fee) = self.decode::<Asset>(name)? {
                check::symbol("fee", &fee, Symbol::Liquid)?;
                check::non_negative("fee", &fee)?;
            }
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        if let Ok(key) = self.signing_key() {
            auths.other.push(Authority::from_key(key));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWitnessVoteOperation {
    pub account: AccountName,
    pub witness: AccountName,
    pub approve: bool,
}

impl OperationBody for AccountWitnessVoteOperation {
    const NAME: &'static str = "account_witness_vote";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account", &self.account)?;
        check::account_name("witness", &self.witness)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.account.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWitnessProxyOperation {
    pub account: AccountName,
    /// Empty clears the proxy.
    pub proxy: AccountName,
}

impl OperationBody for AccountWitnessProxyOperation {
    const NAME: &'static str = "account_witness_proxy";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("account", &self.account)?;
        if !self.proxy.is_empty() {
            check::account_name("proxy", &self.proxy)?;
        }
        if self.proxy == self.account {
            return Err(invalid(Self::NAME, "cannot proxy to self"));
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.account.clone());
    }
}

// =============================================================================
// CUSTOM DATA
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOperation {
    pub required_auths: BTreeSet<AccountName>,
    pub id: u16,
    pub data: Vec<u8>,
}

impl OperationBody for CustomOperation {
    const NAME: &'static str = "custom";

    fn validate(&self) -> ValidationResult<()> {
        if self.required_auths.is_empty() {
            return Err(invalid(Self::NAME, "at least one account must be specified"));
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.extend(self.required_auths.iter().cloned());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomJsonOperation {
    pub required_auths: BTreeSet<AccountName>,
    pub required_posting_auths: BTreeSet<AccountName>,
    pub id: String,
    pub json: String,
}

impl OperationBody for CustomJsonOperation {
    const NAME: &'static str = "custom_json";

    fn validate(&self) -> ValidationResult<()> {
        if self.required_auths.len() + self.required_posting_auths.len() == 0 {
            return Err(invalid(Self::NAME, "at least one account must be specified"));
        }
        check::max_len("id", &self.id, CUSTOM_OP_ID_MAX_LENGTH)?;
        if self.json.is_empty() {
            return Err(ValidationError::InvalidJson {
                field: "json",
                reason: "empty".into(),
            });
        }
        check::json("json", &self.json)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.extend(self.required_auths.iter().cloned());
        auths.posting.extend(self.required_posting_auths.iter().cloned());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBinaryOperation {
    pub required_owner_auths: BTreeSet<AccountName>,
    pub required_active_auths: BTreeSet<AccountName>,
    pub required_posting_auths: BTreeSet<AccountName>,
    pub required_auths: Vec<Authority>,
    pub id: String,
    pub data: Vec<u8>,
}

impl OperationBody for CustomBinaryOperation {
    const NAME: &'static str = "custom_binary";

    fn validate(&self) -> ValidationResult<()> {
        let n = self.required_owner_auths.len()
            + self.required_active_auths.len()
            + self.required_posting_auths.len()
            + self.required_auths.len();
        if n == 0 {
            return Err(invalid(Self::NAME, "at least one authority type must be specified"));
        }
        check::max_len("id", &self.id, CUSTOM_OP_ID_MAX_LENGTH)?;
        for auth in &self.required_auths {
            check::authority("required_auths", auth)?;
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.owner.extend(self.required_owner_auths.iter().cloned());
        auths.active.extend(self.required_active_auths.iter().cloned());
        auths.posting.extend(self.required_posting_auths.iter().cloned());
        auths.other.extend(self.required_auths.iter().cloned());
    }
}

// =============================================================================
// ESCROW
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTransferOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub agent: AccountName,
    pub escrow_id: u32,
    pub amount: Asset,
    pub fee: Asset,
    pub ratification_deadline: TimePointSec,
    pub escrow_expiration: TimePointSec,
    pub json_meta: String,
}

impl OperationBody for EscrowTransferOperation {
    const NAME: &'static str = "escrow_transfer";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::account_name("to", &self.to)?;
        check::account_name("agent", &self.agent)?;
        check::symbol("fee", &self.fee, Symbol::Liquid)?;
        check::non_negative("fee", &self.fee)?;
        check::symbol("amount", &self.amount, Symbol::Liquid)?;
        check::positive("amount", &self.amount)?;
        if self.from == self.agent || self.to == self.agent {
            return Err(invalid(Self::NAME, "agent must be a third party"));
        }
        if self.ratification_deadline >= self.escrow_expiration {
            return Err(invalid(
                Self::NAME,
                "ratification deadline must be before escrow expiration",
            ));
        }
        check::json("json_meta", &self.json_meta)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.from.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowApproveOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub agent: AccountName,
    pub who: AccountName,
    pub escrow_id: u32,
    pub approve: bool,
}

impl OperationBody for EscrowApproveOperation {
    const NAME: &'static str = "escrow_approve";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::account_name("to", &self.to)?;
        check::account_name("agent", &self.agent)?;
        check::account_name("who", &self.who)?;
        if self.who != self.to && self.who != self.agent {
            return Err(invalid(Self::NAME, "to or agent must approve escrow"));
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.who.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowDisputeOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub agent: AccountName,
    pub who: AccountName,
    pub escrow_id: u32,
}

impl OperationBody for EscrowDisputeOperation {
    const NAME: &'static str = "escrow_dispute";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::account_name("to", &self.to)?;
        check::account_name("agent", &self.agent)?;
        check::account_name("who", &self.who)?;
        if self.who != self.from && self.who != self.to {
            return Err(invalid(Self::NAME, "who must be from or to"));
        }
        Ok(())
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.who.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowReleaseOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub agent: AccountName,
    pub who: AccountName,
    pub receiver: AccountName,
    pub escrow_id: u32,
    pub amount: Asset,
}

impl OperationBody for EscrowReleaseOperation {
    const NAME: &'static str = "escrow_release";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("from", &self.from)?;
        check::account_name("to", &self.to)?;
        check::account_name("agent", &self.agent)?;
        check::account_name("who", &self.who)?;
        check::account_name("receiver", &self.receiver)?;
        if self.who != self.from && self.who != self.to && self.who != self.agent {
            return Err(invalid(Self::NAME, "who must be from or to or agent"));
        }
        if self.receiver != self.from && self.receiver != self.to {
            return Err(invalid(Self::NAME, "receiver must be from or to"));
        }
        check::symbol("amount", &self.amount, Symbol::Liquid)?;
        check::positive("amount", &self.amount)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.who.clone());
    }
}

// =============================================================================
// PROPOSALS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProposalOperation {
    pub creator: AccountName,
    pub receiver: AccountName,
    pub start_date: TimePointSec,
    pub end_date: TimePointSec,
    pub daily_pay: Asset,
    pub subject: String,
    pub permlink: String,
}

impl OperationBody for CreateProposalOperation {
    const NAME: &'static str = "create_proposal";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("creator", &self.creator)?;
        check::account_name("receiver", &self.receiver)?;
        if self.end_date <= self.start_date {
            return Err(invalid(Self::NAME, "end date must be greater than start date"));
        }
        check::symbol("daily_pay", &self.daily_pay, Symbol::Liquid)?;
        check::positive("daily_pay", &self.daily_pay)?;
        if self.subject.is_empty() {
            return Err(invalid(Self::NAME, "subject is required"));
        }
        check::max_len("subject", &self.subject, PROPOSAL_SUBJECT_MAX_LENGTH)?;
        check::permlink(&self.permlink)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.creator.clone());
    }
}

fn validate_proposal_ids(op: &'static str, ids: &BTreeSet<u32>) -> ValidationResult<()> {
    if ids.is_empty() {
        return Err(invalid(op, "at least one proposal id is required"));
    }
    if ids.len() > PROPOSAL_MAX_IDS_NUMBER {
        return Err(invalid(op, format!("at most {PROPOSAL_MAX_IDS_NUMBER} proposal ids")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProposalVotesOperation {
    pub voter: AccountName,
    pub proposal_ids: BTreeSet<u32>,
    pub approve: bool,
}

impl OperationBody for UpdateProposalVotesOperation {
    const NAME: &'static str = "update_proposal_votes";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("voter", &self.voter)?;
        validate_proposal_ids(Self::NAME, &self.proposal_ids)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.voter.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveProposalOperation {
    pub proposal_owner: AccountName,
    pub proposal_ids: BTreeSet<u32>,
}

impl OperationBody for RemoveProposalOperation {
    const NAME: &'static str = "remove_proposal";

    fn validate(&self) -> ValidationResult<()> {
        check::account_name("proposal_owner", &self.proposal_owner)?;
        validate_proposal_ids(Self::NAME, &self.proposal_ids)
    }

    fn required_authorities(&self, auths: &mut RequiredAuthorities) {
        auths.active.insert(self.proposal_owner.clone());
    }
}

// =============================================================================
// OPERATION
// =============================================================================

macro_rules! operations {
    ($($variant:ident($body:ty)),+ $(,)?) => {
        /// Every operation a transaction can carry.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum Operation {
            $($variant($body),)+
        }

        /// Fieldless mirror of `Operation`, for logging and dispatch tables.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OperationKind {
            $($variant,)+
        }

        impl OperationKind {
            pub const ALL: &'static [OperationKind] = &[$(OperationKind::$variant,)+];

            pub fn name(&self) -> &'static str {
                match self {
                    $(OperationKind::$variant => <$body as OperationBody>::NAME,)+
                }
            }
        }

        impl Operation {
            pub fn kind(&self) -> OperationKind {
                match self {
                    $(Operation::$variant(_) => OperationKind::$variant,)+
                }
            }

            pub fn name(&self) -> &'static str {
                self.kind().name()
            }

            pub fn validate(&self) -> ValidationResult<()> {
                match self {
                    $(Operation::$variant(op) => op.validate(),)+
                }
            }

            pub fn required_authorities(&self, auths: &mut RequiredAuthorities) {
                match self {
                    $(Operation::$variant(op) => op.required_authorities(auths),)+
                }
            }
        }

        $(
            impl From<$body> for Operation {
                fn from(op: $body) -> Self {
                    Operation::$variant(op)
                }
            }
        )+
    };
}

operations! {
    Vote(VoteOperation),
    Comment(CommentOperation),
    Transfer(TransferOperation),
    TransferToVesting(TransferToVestingOperation),
    WithdrawVesting(WithdrawVestingOperation),
    AccountCreate(AccountCreateOperation),
    AccountUpdate(AccountUpdateOperation),
    WitnessUpdate(WitnessUpdateOperation),
    AccountWitnessVote(AccountWitnessVoteOperation),
    AccountWitnessProxy(AccountWitnessProxyOperation),
    Custom(CustomOperation),
    DeleteComment(DeleteCommentOperation),
    CustomJson(CustomJsonOperation),
    CommentOptions(CommentOptionsOperation),
    SetWithdrawVestingRoute(SetWithdrawVestingRouteOperation),
    ClaimAccount(ClaimAccountOperation),
    CreateClaimedAccount(CreateClaimedAccountOperation),
    RequestAccountRecovery(RequestAccountRecoveryOperation),
    RecoverAccount(RecoverAccountOperation),
    ChangeRecoveryAccount(ChangeRecoveryAccountOperation),
    EscrowTransfer(EscrowTransferOperation),
    EscrowDispute(EscrowDisputeOperation),
    EscrowRelease(EscrowReleaseOperation),
    EscrowApprove(EscrowApproveOperation),
    TransferToSavings(TransferToSavingsOperation),
    TransferFromSavings(TransferFromSavingsOperation),
    CancelTransferFromSavings(CancelTransferFromSavingsOperation),
    CustomBinary(CustomBinaryOperation),
    DeclineVotingRights(DeclineVotingRightsOperation),
    ResetAccount(ResetAccountOperation),
    SetResetAccount(SetResetAccountOperation),
    ClaimRewardBalance(ClaimRewardBalanceOperation),
    DelegateVestingShares(DelegateVestingSharesOperation),
    WitnessSetProperties(WitnessSetPropertiesOperation),
    CreateProposal(CreateProposalOperation),
    UpdateProposalVotes(UpdateProposalVotesOperation),
    RemoveProposal(RemoveProposalOperation),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> AccountName {
        AccountName::from(s)
    }

    #[test]
    fn test_transfer_rejects_vests_and_non_positive() {
        let mut op = TransferOperation {
            from: name("alice"),
            to: name("bob"),
            amount: Asset::vests(10),
            memo: String::new(),
        };
        assert!(op.validate().is_err());
        op.amount = Asset::liquid(0);
        assert!(op.validate().is_err());
        op.amount = Asset::liquid(1);
        assert!(op.validate().is_ok());
    }

    #[test]
    fn test_account_update_requires_owner_only_when_owner_changes() {
        let mut op = AccountUpdateOperation {
            account: name("alice"),
            owner: None,
            active: None,
            posting: None,
            memo_key: PublicKey::NULL,
            json_metadata: String::new(),
        };
        let mut auths = RequiredAuthorities::default();
        op.required_authorities(&mut auths);
        assert!(auths.active.contains("alice"));
        assert!(auths.owner.is_empty());

        op.owner = Some(Authority::new(1));
        let mut auths = RequiredAuthorities::default();
        op.required_authorities(&mut auths);
        assert!(auths.owner.contains("alice"));
        assert!(auths.active.is_empty());
    }

    #[test]
    fn test_beneficiaries_must_be_sorted_and_bounded() {
        let route = |a: &str, w| BeneficiaryRoute {
            account: name(a),
            weight: w,
        };
        let mut op = CommentOptionsOperation {
            author: name("alice"),
            permlink: "post".into(),
            max_accepted_payout: Asset::liquid(1_000_000),
            percent_liquid: PERCENT_100,
            allow_votes: true,
            allow_curation_rewards: true,
            extensions: vec![CommentOptionsExtension::Beneficiaries(vec![
                route("carol", 100),
                route("bob", 100),
            ])],
        };
        assert!(op.validate().is_err(), "unsorted routes must fail");

        op.extensions = vec![CommentOptionsExtension::Beneficiaries(vec![
            route("bob", 6_000),
            route("carol", 5_000),
        ])];
        assert!(op.validate().is_err(), "over 100% must fail");

        op.extensions = vec![CommentOptionsExtension::Beneficiaries(vec![
            route("bob", 6_000),
            route("carol", 4_000),
        ])];
        assert!(op.validate().is_ok());
    }

    #[test]
    fn test_witness_set_properties_requires_key() {
        let mut props = BTreeMap::new();
        props.insert(
            witness_props::URL.to_string(),
            WitnessSetPropertiesOperation::encode(&"https://w.example".to_string()),
        );
        let mut op = WitnessSetPropertiesOperation {
            owner: name("alice"),
            props,
        };
        assert!(op.validate().is_err());

        let key = PublicKey([4; 32]);
        op.props.insert(
            witness_props::KEY.to_string(),
            WitnessSetPropertiesOperation::encode(&key),
        );
        assert!(op.validate().is_ok());
        let mut auths = RequiredAuthorities::default();
        op.required_authorities(&mut auths);
        assert_eq!(auths.other, vec![Authority::from_key(key)]);
    }

    #[test]
    fn test_operation_kinds_have_unique_names() {
        let names: BTreeSet<&str> = OperationKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), OperationKind::ALL.len());
    }

    #[test]
    fn test_proposal_vote_id_limit() {
        let op = UpdateProposalVotesOperation {
            voter: name("alice"),
            proposal_ids: (0..6).collect(),
            approve: true,
        };
        assert!(op.validate().is_err());
    }
}
