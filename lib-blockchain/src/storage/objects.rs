//! Ledger records.
//!
//! One struct per table, plus the three global singletons. Each record
//! declares its primary key and the secondary indices the engine scans.

use serde::{Deserialize, Serialize};

use super::keys::KeyBuilder;
use super::table::Record;
use crate::economics::curves::CurveId;
use crate::economics::manabar::Manabar;
use crate::economics::resource_dynamics::RdDynamicsParams;
use crate::protocol::constants::*;
use crate::protocol::operations::{BeneficiaryRoute, ChainProperties};
use crate::protocol::{
    AccountName, Asset, Authority, BlockId, HardforkVersion, Price, PublicKey, TimePointSec,
    TransactionId, Version,
};

/// `(author, permlink)`.
pub type CommentKey = (AccountName, String);

// =============================================================================
// ACCOUNTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: AccountName,
    pub memo_key: PublicKey,
    pub json_metadata: String,
    /// Empty means the account votes for itself.
    pub proxy: AccountName,

    pub last_account_update: TimePointSec,
    pub created: TimePointSec,
    pub recovery_account: AccountName,
    pub reset_account: AccountName,
    pub last_account_recovery: TimePointSec,

    pub comment_count: u32,
    pub post_count: u32,
    pub can_vote: bool,
    pub voting_manabar: Manabar,

    pub balance: Asset,
    pub savings_balance: Asset,
    pub savings_withdraw_requests: u16,

    pub reward_liquid_balance: Asset,
    pub reward_vesting_balance: Asset,
    /// Liquid value backing `reward_vesting_balance`.
    pub reward_vesting_liquid: Asset,

    pub curation_rewards: i64,
    pub posting_rewards: i64,

    pub vesting_shares: Asset,
    pub delegated_vesting_shares: Asset,
    pub received_vesting_shares: Asset,

    pub vesting_withdraw_rate: Asset,
    pub next_vesting_withdrawal: TimePointSec,
    pub withdrawn: i64,
    pub to_withdraw: i64,
    pub withdraw_routes: u16,

    /// Vote weight proxied to this account, by proxy depth.
    pub proxied_vsf_votes: [i64; MAX_PROXY_RECURSION_DEPTH],
    pub witnesses_voted_for: u16,

    pub last_post: TimePointSec,
    pub last_root_post: TimePointSec,
    pub last_post_edit: TimePointSec,
    pub last_vote_time: TimePointSec,

    pub pending_claimed_accounts: i64,
}

impl Account {
    pub fn new(name: AccountName, memo_key: PublicKey, now: TimePointSec) -> Self {
        Self {
            name,
            memo_key,
            json_metadata: String::new(),
            proxy: AccountName::default(),
            last_account_update: TimePointSec::MINIMUM,
            created: now,
            recovery_account: AccountName::default(),
            reset_account: AccountName::from(NULL_ACCOUNT),
            last_account_recovery: TimePointSec::MINIMUM,
            comment_count: 0,
            post_count: 0,
            can_vote: true,
            voting_manabar: Manabar::new(0, now.secs()),
            balance: Asset::liquid(0),
            savings_balance: Asset::liquid(0),
            savings_withdraw_requests: 0,
            reward_liquid_balance: Asset::liquid(0),
            reward_vesting_balance: Asset::vests(0),
            reward_vesting_liquid: Asset::liquid(0),
            curation_rewards: 0,
            posting_rewards: 0,
            vesting_shares: Asset::vests(0),
            delegated_vesting_shares: Asset::vests(0),
            received_vesting_shares: Asset::vests(0),
            vesting_withdraw_rate: Asset::vests(0),
            next_vesting_withdrawal: TimePointSec::MAXIMUM,
            withdrawn: 0,
            to_withdraw: 0,
            withdraw_routes: 0,
            proxied_vsf_votes: [0; MAX_PROXY_RECURSION_DEPTH],
            witnesses_voted_for: 0,
            last_post: TimePointSec::MINIMUM,
            last_root_post: TimePointSec::MINIMUM,
            last_post_edit: TimePointSec::MINIMUM,
            last_vote_time: TimePointSec::MINIMUM,
            pending_claimed_accounts: 0,
        }
    }

    pub fn proxied_vsf_votes_total(&self) -> i64 {
        self.proxied_vsf_votes.iter().sum()
    }

    /// Own vesting shares plus everything proxied to this account.
    pub fn witness_vote_weight(&self) -> i64 {
        self.vesting_shares.amount + self.proxied_vsf_votes_total()
    }

    /// Vesting shares usable for voting and delegation: own shares minus
    /// delegated, plus received, minus this week's pending withdrawal.
    pub fn effective_vesting_shares(&self) -> i64 {
        let pending = self
            .vesting_withdraw_rate
            .amount
            .min(self.to_withdraw - self.withdrawn);
        self.vesting_shares.amount - self.delegated_vesting_shares.amount
            + self.received_vesting_shares.amount
            - pending.max(0)
    }

    pub fn has_proxy(&self) -> bool {
        !self.proxy.is_empty()
    }
}

impl Record for Account {
    type Key = AccountName;
    const TABLE: &'static str = "account";
    const INDICES: &'static [&'static str] = &["by_next_vesting_withdrawal"];

    fn key(&self) -> AccountName {
        self.name.clone()
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.next_vesting_withdrawal).build()
    }
}

pub mod account_index {
    pub const BY_NEXT_VESTING_WITHDRAWAL: usize = 0;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAuthority {
    pub account: AccountName,
    pub owner: Authority,
    pub active: Authority,
    pub posting: Authority,
    pub last_owner_update: TimePointSec,
}

impl Record for AccountAuthority {
    type Key = AccountName;
    const TABLE: &'static str = "account_authority";

    fn key(&self) -> AccountName {
        self.account.clone()
    }
}

/// Previous owner authorities, kept for the recovery window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerAuthorityHistory {
    pub id: u64,
    pub account: AccountName,
    pub previous_owner_authority: Authority,
    pub last_valid_time: TimePointSec,
}

impl Record for OwnerAuthorityHistory {
    type Key = u64;
    const TABLE: &'static str = "owner_authority_history";
    const INDICES: &'static [&'static str] = &["by_account", "by_last_valid"];

    fn key(&self) -> u64 {
        self.id
    }

    fn index_key(&self, index: usize) -> Vec<u8> {
        match index {
            0 => KeyBuilder::new()
                .name(&self.account)
                .time(self.last_valid_time)
                .u64(self.id)
                .build(),
            _ => KeyBuilder::new().time(self.last_valid_time).build(),
        }
    }
}

pub mod owner_history_index {
    pub const BY_ACCOUNT: usize = 0;
    pub const BY_LAST_VALID: usize = 1;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecoveryRequest {
    pub account_to_recover: AccountName,
    pub new_owner_authority: Authority,
    pub expires: TimePointSec,
}

impl Record for AccountRecoveryRequest {
    type Key = AccountName;
    const TABLE: &'static str = "account_recovery_request";
    const INDICES: &'static [&'static str] = &["by_expiration"];

    fn key(&self) -> AccountName {
        self.account_to_recover.clone()
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.expires).build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecoveryAccountRequest {
    pub account_to_recover: AccountName,
    pub recovery_account: AccountName,
    pub effective_on: TimePointSec,
}

impl Record for ChangeRecoveryAccountRequest {
    type Key = AccountName;
    const TABLE: &'static str = "change_recovery_account_request";
    const INDICES: &'static [&'static str] = &["by_effective_date"];

    fn key(&self) -> AccountName {
        self.account_to_recover.clone()
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.effective_on).build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineVotingRightsRequest {
    pub account: AccountName,
    pub effective_date: TimePointSec,
}

impl Record for DeclineVotingRightsRequest {
    type Key = AccountName;
    const TABLE: &'static str = "decline_voting_rights_request";
    const INDICES: &'static [&'static str] = &["by_effective_date"];

    fn key(&self) -> AccountName {
        self.account.clone()
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.effective_date).build()
    }
}

// =============================================================================
// VESTING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawVestingRoute {
    pub from_account: AccountName,
    pub to_account: AccountName,
    pub percent: u16,
    pub auto_vest: bool,
}

impl Record for WithdrawVestingRoute {
    type Key = (AccountName, AccountName);
    const TABLE: &'static str = "withdraw_vesting_route";

    fn key(&self) -> Self::Key {
        (self.from_account.clone(), self.to_account.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingDelegation {
    pub delegator: AccountName,
    pub delegatee: AccountName,
    pub vesting_shares: Asset,
    pub min_delegation_time: TimePointSec,
}

impl Record for VestingDelegation {
    type Key = (AccountName, AccountName);
    const TABLE: &'static str = "vesting_delegation";

    fn key(&self) -> Self::Key {
        (self.delegator.clone(), self.delegatee.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingDelegationExpiration {
    pub id: u64,
    pub delegator: AccountName,
    pub vesting_shares: Asset,
    pub expiration: TimePointSec,
}

impl Record for VestingDelegationExpiration {
    type Key = u64;
    const TABLE: &'static str = "vesting_delegation_expiration";
    const INDICES: &'static [&'static str] = &["by_expiration"];

    fn key(&self) -> u64 {
        self.id
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.expiration).u64(self.id).build()
    }
}

// =============================================================================
// WITNESSES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WitnessScheduleType {
    Elected,
    Timeshare,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub owner: AccountName,
    pub created: TimePointSec,
    pub url: String,
    pub votes: i64,
    pub schedule: WitnessScheduleType,

    pub virtual_last_update: u128,
    pub virtual_position: u128,
    pub virtual_scheduled_time: u128,

    pub total_missed: u32,
    pub last_aslot: u64,
    pub last_confirmed_block_num: u32,

    pub signing_key: PublicKey,
    pub props: ChainProperties,

    pub running_version: Version,
    pub hardfork_version_vote: HardforkVersion,
    pub hardfork_time_vote: TimePointSec,

    pub available_witness_account_subsidies: i64,
}

impl Witness {
    pub fn new(owner: AccountName, signing_key: PublicKey, now: TimePointSec, hf_time: TimePointSec) -> Self {
        Self {
            owner,
            created: now,
            url: String::new(),
            votes: 0,
            schedule: WitnessScheduleType::None,
            virtual_last_update: 0,
            virtual_position: 0,
            virtual_scheduled_time: u128::MAX,
            total_missed: 0,
            last_aslot: 0,
            last_confirmed_block_num: 0,
            signing_key,
            props: ChainProperties::default(),
            running_version: Version::default(),
            hardfork_version_vote: HardforkVersion::default(),
            hardfork_time_vote: hf_time,
            available_witness_account_subsidies: 0,
        }
    }
}

impl Record for Witness {
    type Key = AccountName;
    const TABLE: &'static str = "witness";
    const INDICES: &'static [&'static str] = &["by_vote", "by_schedule_time", "by_schedule"];

    fn key(&self) -> AccountName {
        self.owner.clone()
    }

    fn index_key(&self, index: usize) -> Vec<u8> {
        match index {
            0 => KeyBuilder::new().u64_desc(self.votes.max(0) as u64).build(),
            1 => KeyBuilder::new().u128(self.virtual_scheduled_time).build(),
            _ => KeyBuilder::new().u16(self.schedule as u16).build(),
        }
    }
}

pub mod witness_index {
    pub const BY_VOTE: usize = 0;
    pub const BY_SCHEDULE_TIME: usize = 1;
    pub const BY_SCHEDULE: usize = 2;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessVote {
    pub account: AccountName,
    pub witness: AccountName,
}

impl Record for WitnessVote {
    type Key = (AccountName, AccountName);
    const TABLE: &'static str = "witness_vote";

    fn key(&self) -> Self::Key {
        (self.account.clone(), self.witness.clone())
    }
}

// =============================================================================
// CONTENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: AccountName,
    pub permlink: String,
    pub parent_author: AccountName,
    pub parent_permlink: String,
    pub category: String,
    pub root_comment: CommentKey,

    pub title: String,
    pub body: String,
    pub json_metadata: String,

    pub last_update: TimePointSec,
    pub created: TimePointSec,
    pub active: TimePointSec,
    pub last_payout: TimePointSec,

    pub depth: u16,
    pub children: u32,

    pub net_rshares: i64,
    pub abs_rshares: i64,
    pub vote_rshares: i64,
    pub children_abs_rshares: i64,

    pub cashout_time: TimePointSec,
    pub max_cashout_time: TimePointSec,
    pub total_vote_weight: u64,
    pub reward_weight: u16,

    pub total_payout_value: Asset,
    pub curator_payout_value: Asset,
    pub beneficiary_payout_value: Asset,
    pub author_rewards: i64,
    pub net_votes: i32,

    pub max_accepted_payout: Asset,
    pub percent_liquid: u16,
    pub allow_replies: bool,
    pub allow_votes: bool,
    pub allow_curation_rewards: bool,
    pub beneficiaries: Vec<BeneficiaryRoute>,
}

impl Comment {
    pub fn key_of(&self) -> CommentKey {
        (self.author.clone(), self.permlink.clone())
    }

    pub fn is_root(&self) -> bool {
        self.parent_author.is_empty()
    }

    pub fn parent_key(&self) -> Option<CommentKey> {
        if self.is_root() {
            None
        } else {
            Some((self.parent_author.clone(), self.parent_permlink.clone()))
        }
    }
}

impl Record for Comment {
    type Key = CommentKey;
    const TABLE: &'static str = "comment";
    const INDICES: &'static [&'static str] = &["by_cashout_time"];

    fn key(&self) -> CommentKey {
        self.key_of()
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.cashout_time).build()
    }
}

pub mod comment_index {
    pub const BY_CASHOUT_TIME: usize = 0;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentVote {
    pub comment: CommentKey,
    pub voter: AccountName,
    /// Curation weight.
    pub weight: u64,
    pub rshares: i64,
    pub vote_percent: i16,
    pub last_update: TimePointSec,
    pub num_changes: i8,
}

impl Record for CommentVote {
    type Key = (CommentKey, AccountName);
    const TABLE: &'static str = "comment_vote";

    fn key(&self) -> Self::Key {
        (self.comment.clone(), self.voter.clone())
    }
}

// =============================================================================
// ESCROW AND SAVINGS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub escrow_id: u32,
    pub from: AccountName,
    pub to: AccountName,
    pub agent: AccountName,
    pub ratification_deadline: TimePointSec,
    pub escrow_expiration: TimePointSec,
    pub liquid_balance: Asset,
    pub pending_fee: Asset,
    pub to_approved: bool,
    pub agent_approved: bool,
    pub disputed: bool,
}

impl Escrow {
    pub fn is_approved(&self) -> bool {
        self.to_approved && self.agent_approved
    }
}

impl Record for Escrow {
    type Key = (AccountName, u32);
    const TABLE: &'static str = "escrow";
    const INDICES: &'static [&'static str] = &["by_ratification_deadline"];

    fn key(&self) -> Self::Key {
        (self.from.clone(), self.escrow_id)
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new()
            .bool(self.is_approved())
            .time(self.ratification_deadline)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsWithdraw {
    pub from: AccountName,
    pub to: AccountName,
    pub memo: String,
    pub request_id: u32,
    pub amount: Asset,
    pub complete: TimePointSec,
}

impl Record for SavingsWithdraw {
    type Key = (AccountName, u32);
    const TABLE: &'static str = "savings_withdraw";
    const INDICES: &'static [&'static str] = &["by_complete"];

    fn key(&self) -> Self::Key {
        (self.from.clone(), self.request_id)
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.complete).build()
    }
}

// =============================================================================
// TRANSACTIONS AND BLOCKS
// =============================================================================

/// Dedup entry for an applied transaction, kept until it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub trx_id: TransactionId,
    pub expiration: TimePointSec,
}

impl Record for TransactionRecord {
    type Key = TransactionId;
    const TABLE: &'static str = "transaction";
    const INDICES: &'static [&'static str] = &["by_expiration"];

    fn key(&self) -> TransactionId {
        self.trx_id
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.expiration).trx_id(&self.trx_id).build()
    }
}

/// TaPoS ring entry: slot `block_num & 0xffff` holds that block's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub slot: u16,
    pub block_id: BlockId,
}

impl Record for BlockSummary {
    type Key = u16;
    const TABLE: &'static str = "block_summary";

    fn key(&self) -> u16 {
        self.slot
    }
}

// =============================================================================
// REWARD FUNDS AND PROPOSALS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardFund {
    pub id: u16,
    pub name: String,
    pub reward_balance: Asset,
    pub recent_claims: u128,
    pub last_update: TimePointSec,
    /// Stored content constant. The curation curve may use a different one.
    pub content_constant: u128,
    pub percent_curation_rewards: u16,
    pub percent_content_rewards: u16,
    pub author_reward_curve: CurveId,
    pub curation_reward_curve: CurveId,
}

impl Record for RewardFund {
    type Key = u16;
    const TABLE: &'static str = "reward_fund";

    fn key(&self) -> u16 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u32,
    pub creator: AccountName,
    pub receiver: AccountName,
    pub start_date: TimePointSec,
    pub end_date: TimePointSec,
    pub daily_pay: Asset,
    pub subject: String,
    pub permlink: String,
    pub total_votes: u64,
}

impl Proposal {
    pub fn is_active(&self, now: TimePointSec) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

impl Record for Proposal {
    type Key = u32;
    const TABLE: &'static str = "proposal";
    const INDICES: &'static [&'static str] = &["by_end_date"];

    fn key(&self) -> u32 {
        self.id
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().time(self.end_date).build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalVote {
    pub voter: AccountName,
    pub proposal_id: u32,
}

impl Record for ProposalVote {
    type Key = (AccountName, u32);
    const TABLE: &'static str = "proposal_vote";
    const INDICES: &'static [&'static str] = &["by_proposal"];

    fn key(&self) -> Self::Key {
        (self.voter.clone(), self.proposal_id)
    }

    fn index_key(&self, _index: usize) -> Vec<u8> {
        KeyBuilder::new().u32(self.proposal_id).build()
    }
}

// =============================================================================
// SINGLETONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGlobalProperties {
    pub head_block_number: u32,
    pub head_block_id: BlockId,
    pub time: TimePointSec,
    pub current_witness: AccountName,

    pub current_supply: Asset,
    pub total_vesting_fund_liquid: Asset,
    pub total_vesting_shares: Asset,
    pub total_reward_fund_liquid: Asset,
    pub pending_rewarded_vesting_shares: Asset,
    pub pending_rewarded_vesting_liquid: Asset,

    pub maximum_block_size: u32,
    pub current_aslot: u64,
    /// Bit `i` is set when the slot `i` slots ago was filled.
    pub recent_slots_filled: u128,
    pub participation_count: u8,
    pub last_irreversible_block_num: u32,

    pub delegation_return_period: u32,
    pub reverse_auction_seconds: u32,
    pub available_account_subsidies: i64,

    pub content_reward_percent: u16,
    pub vesting_reward_percent: u16,
    pub proposal_fund_percent: u16,
    /// Inflation paid to the treasury since genesis.
    pub proposal_fund_ledger: Asset,

    pub next_maintenance_time: TimePointSec,
    pub last_budget_time: TimePointSec,

    pub regent_init_vesting_shares: Asset,
    pub regent_vesting_shares: Asset,
}

impl Default for DynamicGlobalProperties {
    fn default() -> Self {
        Self {
            head_block_number: 0,
            head_block_id: BlockId::ZERO,
            time: TimePointSec::MINIMUM,
            current_witness: AccountName::default(),
            current_supply: Asset::liquid(0),
            total_vesting_fund_liquid: Asset::liquid(0),
            total_vesting_shares: Asset::vests(0),
            total_reward_fund_liquid: Asset::liquid(0),
            pending_rewarded_vesting_shares: Asset::vests(0),
            pending_rewarded_vesting_liquid: Asset::liquid(0),
            maximum_block_size: DEFAULT_MAXIMUM_BLOCK_SIZE,
            current_aslot: 0,
            recent_slots_filled: u128::MAX,
            participation_count: 128,
            last_irreversible_block_num: 0,
            delegation_return_period: DELEGATION_RETURN_PERIOD,
            reverse_auction_seconds: REVERSE_AUCTION_WINDOW_SECONDS,
            available_account_subsidies: 0,
            content_reward_percent: CONTENT_REWARD_PERCENT,
            vesting_reward_percent: VESTING_FUND_PERCENT,
            proposal_fund_percent: PROPOSAL_FUND_PERCENT,
            proposal_fund_ledger: Asset::liquid(0),
            next_maintenance_time: TimePointSec::MINIMUM,
            last_budget_time: TimePointSec::MINIMUM,
            regent_init_vesting_shares: Asset::vests(0),
            regent_vesting_shares: Asset::vests(0),
        }
    }
}

impl DynamicGlobalProperties {
    /// Vests per liquid unit in the vesting pool.
    pub fn vesting_share_price(&self) -> Price {
        if self.total_vesting_fund_liquid.amount == 0 || self.total_vesting_shares.amount == 0 {
            return Price::new(
                Asset::vests(DEFAULT_VESTING_PRICE_VESTS),
                Asset::liquid(DEFAULT_VESTING_PRICE_LIQUID),
            );
        }
        Price::new(self.total_vesting_shares, self.total_vesting_fund_liquid)
    }

    /// Price used for vesting rewards that are not yet claimed.
    pub fn reward_vesting_share_price(&self) -> Price {
        let shares = self.total_vesting_shares + self.pending_rewarded_vesting_shares;
        let liquid = self.total_vesting_fund_liquid + self.pending_rewarded_vesting_liquid;
        if shares.amount == 0 || liquid.amount == 0 {
            return self.vesting_share_price();
        }
        Price::new(shares, liquid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessSchedule {
    pub current_virtual_time: u128,
    pub next_shuffle_block_num: u32,
    pub current_shuffled_witnesses: Vec<AccountName>,
    pub num_scheduled_witnesses: u8,
    pub elected_weight: u8,
    pub timeshare_weight: u8,
    pub witness_pay_normalization_factor: u32,
    pub median_props: ChainProperties,
    pub majority_version: Version,
    pub max_voted_witnesses: u8,
    pub max_runner_witnesses: u8,
    pub hardfork_required_witnesses: u8,
    pub account_subsidy_rd: RdDynamicsParams,
    pub account_subsidy_witness_rd: RdDynamicsParams,
    pub min_witness_account_subsidy_decay: u32,
}

impl Default for WitnessSchedule {
    fn default() -> Self {
        Self {
            current_virtual_time: 0,
            next_shuffle_block_num: 1,
            current_shuffled_witnesses: Vec::new(),
            num_scheduled_witnesses: 1,
            elected_weight: ELECTED_WITNESS_WEIGHT as u8,
            timeshare_weight: TIMESHARE_WITNESS_WEIGHT as u8,
            witness_pay_normalization_factor: 25,
            median_props: ChainProperties::default(),
            majority_version: Version::default(),
            max_voted_witnesses: MAX_VOTED_WITNESSES as u8,
            max_runner_witnesses: MAX_RUNNER_WITNESSES as u8,
            hardfork_required_witnesses: HARDFORK_REQUIRED_WITNESSES,
            account_subsidy_rd: RdDynamicsParams::default(),
            account_subsidy_witness_rd: RdDynamicsParams::default(),
            min_witness_account_subsidy_decay: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardforkProperty {
    /// Activation time of every processed hardfork, genesis first.
    pub processed_hardforks: Vec<TimePointSec>,
    pub last_hardfork: u32,
    pub current_hardfork_version: HardforkVersion,
    pub next_hardfork: HardforkVersion,
    pub next_hardfork_time: TimePointSec,
}
