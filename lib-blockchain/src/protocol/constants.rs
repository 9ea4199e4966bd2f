//! Consensus constants.
//!
//! Every value in this module is part of consensus. Changing one changes the
//! state transition function, so any change must ship behind a hardfork.

use super::hardfork::{HardforkVersion, Version};

// =============================================================================
// VERSIONS
// =============================================================================

/// Version reported by this binary in block header extensions.
pub const BLOCKCHAIN_VERSION: Version = Version::new(0, 6, 0);

/// Highest hardfork this binary knows how to apply.
pub const BLOCKCHAIN_HARDFORK_VERSION: HardforkVersion = HardforkVersion::new(0, 6);

/// Number of hardforks after genesis (hardfork 0).
pub const NUM_HARDFORKS: u32 = 6;

pub const HARDFORK_1: u32 = 1;
pub const HARDFORK_2: u32 = 2;
pub const HARDFORK_3: u32 = 3;
pub const HARDFORK_4: u32 = 4;
pub const HARDFORK_5: u32 = 5;
pub const HARDFORK_6: u32 = 6;

// =============================================================================
// TIME
// =============================================================================

/// Seconds between block slots.
pub const BLOCK_INTERVAL: u32 = 3;
pub const BLOCKS_PER_YEAR: u64 = 365 * 24 * 60 * 60 / BLOCK_INTERVAL as u64;
pub const BLOCKS_PER_DAY: u32 = 24 * 60 * 60 / BLOCK_INTERVAL;
pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

pub const MAX_TIME_UNTIL_EXPIRATION: u32 = 60 * 60;
pub const CASHOUT_WINDOW_SECONDS: u32 = 7 * SECONDS_PER_DAY;
pub const UPVOTE_LOCKOUT_SECONDS: u32 = 12 * 60 * 60;
pub const REVERSE_AUCTION_WINDOW_SECONDS: u32 = 300;
pub const RECENT_RSHARES_DECAY_TIME: u32 = 15 * SECONDS_PER_DAY;

pub const MIN_VOTE_INTERVAL_SEC: u32 = 3;
pub const MIN_ROOT_COMMENT_INTERVAL: u32 = 5 * 60;
pub const MIN_REPLY_INTERVAL: u32 = 3;
pub const MIN_COMMENT_EDIT_INTERVAL: u32 = 3;

pub const VOTING_MANA_REGENERATION_SECONDS: u32 = 5 * SECONDS_PER_DAY;
/// Full-strength votes per regeneration period.
pub const VOTE_POWER_RESERVE_RATE: i64 = 10;

pub const VESTING_WITHDRAW_INTERVALS: u32 = 13;
pub const VESTING_WITHDRAW_INTERVALS_HF5: u32 = 4;
pub const VESTING_WITHDRAW_INTERVAL_SECONDS: u32 = 7 * SECONDS_PER_DAY;

pub const SAVINGS_WITHDRAW_TIME: u32 = 3 * SECONDS_PER_DAY;
pub const SAVINGS_WITHDRAW_REQUEST_LIMIT: u16 = 100;

pub const OWNER_AUTH_RECOVERY_PERIOD: u32 = 30 * SECONDS_PER_DAY;
pub const ACCOUNT_RECOVERY_REQUEST_EXPIRATION_PERIOD: u32 = SECONDS_PER_DAY;
pub const OWNER_UPDATE_LIMIT: u32 = 60 * 60;
pub const OWNER_AUTH_HISTORY_TRACKING_START_BLOCK_NUM: u32 = 1;

pub const DELEGATION_RETURN_PERIOD: u32 = VOTING_MANA_REGENERATION_SECONDS;

/// Delay before a decline-voting-rights request takes effect.
pub const OWNER_CHALLENGE_DECLINE_PERIOD: u32 = 30 * SECONDS_PER_DAY;

/// Interval between regent vesting decay steps, in blocks.
pub const REGENT_DECAY_INTERVAL_BLOCKS: u32 = 30 * BLOCKS_PER_DAY;
pub const REGENT_DECAY_STEPS: i64 = 24;

/// `adjust_supply` never mints vesting rewards during the first week.
pub const SUPPLY_VESTING_GRACE_BLOCKS: u32 = 7 * BLOCKS_PER_DAY;

// =============================================================================
// PERCENTAGES
// =============================================================================

pub const PERCENT_100: u16 = 10_000;
pub const PERCENT_1: u16 = PERCENT_100 / 100;

pub const IRREVERSIBLE_THRESHOLD: u32 = 75 * PERCENT_1 as u32;

pub const INFLATION_RATE_START_PERCENT: i64 = 978;
pub const INFLATION_RATE_STOP_PERCENT: i64 = 95;
pub const INFLATION_NARROWING_PERIOD: i64 = 250_000;

pub const CONTENT_REWARD_PERCENT: u16 = 65 * PERCENT_1;
pub const VESTING_FUND_PERCENT: u16 = 15 * PERCENT_1;
pub const PROPOSAL_FUND_PERCENT: u16 = 10 * PERCENT_1;

pub const WITNESS_SUBSIDY_BUDGET_PERCENT: i64 = 125 * PERCENT_1 as i64;
pub const WITNESS_SUBSIDY_DECAY_PERCENT: u64 = 21 * PERCENT_100 as u64;

// =============================================================================
// WITNESSES
// =============================================================================

pub const MAX_WITNESSES: usize = 21;
pub const MAX_VOTED_WITNESSES: usize = 20;
pub const MAX_RUNNER_WITNESSES: usize = 1;
pub const HARDFORK_REQUIRED_WITNESSES: u8 = 17;
pub const MAX_ACCOUNT_WITNESS_VOTES: u16 = 30;
pub const MAX_PROXY_RECURSION_DEPTH: usize = 4;

pub const ELECTED_WITNESS_WEIGHT: u16 = 1;
pub const TIMESHARE_WITNESS_WEIGHT: u16 = 5;

/// Virtual scheduling lap length. Witnesses with more votes finish a lap sooner.
pub const VIRTUAL_SCHEDULE_LAP_LENGTH: u128 = u64::MAX as u128;

// =============================================================================
// SIZES AND LIMITS
// =============================================================================

pub const MAX_TRANSACTION_SIZE: u32 = 64 * 1024;
pub const MIN_BLOCK_SIZE_LIMIT: u32 = MAX_TRANSACTION_SIZE;
pub const MAX_BLOCK_SIZE: u32 = MAX_TRANSACTION_SIZE * BLOCK_INTERVAL * 2000;
pub const SOFT_MAX_BLOCK_SIZE: u32 = 2 * 1024 * 1024;
pub const DEFAULT_MAXIMUM_BLOCK_SIZE: u32 = 2 * MIN_BLOCK_SIZE_LIMIT;
pub const MIN_BLOCK_SIZE: usize = 115;

/// Room left for the block header when pending transactions are size-checked.
pub const BLOCK_HEADER_RESERVE: u32 = 256;

pub const MAX_UNDO_HISTORY: u32 = 10_000;
pub const BLOCK_SUMMARY_RING_SIZE: u32 = 0x10000;

pub const MAX_MEMO_SIZE: usize = 2048;
pub const MAX_URL_LENGTH: usize = 2048;
pub const MIN_PERMLINK_LENGTH: usize = 0;
pub const MAX_PERMLINK_LENGTH: usize = 256;
pub const MAX_COMMENT_TITLE_LENGTH: usize = 256;
pub const MAX_COMMENT_DEPTH: u16 = 0xffff;
pub const SOFT_MAX_COMMENT_DEPTH: u16 = 0xff;
pub const MAX_COMMENT_BENEFICIARIES: usize = 8;
pub const MAX_VOTE_CHANGES: i8 = 5;
pub const MAX_WITHDRAW_ROUTES: u16 = 10;
pub const CUSTOM_OP_ID_MAX_LENGTH: usize = 32;
pub const CUSTOM_OP_DATA_MAX_LENGTH: usize = 8192;

pub const MIN_ACCOUNT_NAME_LENGTH: usize = 3;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 16;

pub const MAX_SIG_CHECK_DEPTH: u32 = 2;
pub const MAX_SIG_CHECK_ACCOUNTS: u32 = 125;
pub const MAX_AUTHORITY_MEMBERSHIP: usize = 40;

pub const PROPOSAL_MAX_IDS_NUMBER: usize = 5;
pub const PROPOSAL_SUBJECT_MAX_LENGTH: usize = 80;
pub const PROPOSAL_MAINTENANCE_PERIOD: u32 = 60 * 60;
pub const PROPOSAL_DAILY_BUDGET_DIVIDER: i64 = 100;

/// Witness-set fee ceilings for the two transaction fee components.
pub const MAX_OPERATION_FLAT_FEE: i64 = 100_000;
pub const MAX_BANDWIDTH_KBYTES_FEE: i64 = 100_000;

// =============================================================================
// ECONOMICS
// =============================================================================

pub const MAX_ACCOUNT_CREATION_FEE: i64 = 1_000_000_000;
pub const MIN_ACCOUNT_CREATION_FEE: i64 = 0;
pub const DEFAULT_ACCOUNT_CREATION_FEE: i64 = 3_000;
pub const DEFAULT_OPERATION_FLAT_FEE: i64 = 1;
pub const DEFAULT_BANDWIDTH_KBYTES_FEE: i64 = 1;
pub const PROPOSAL_FEE: i64 = 10_000;
/// Payout cap of a new comment until `comment_options` lowers it.
pub const DEFAULT_MAX_ACCEPTED_PAYOUT: i64 = 1_000_000_000;


pub const VOTE_DUST_THRESHOLD: i64 = 50_000_000;
pub const MIN_PAYOUT: i64 = 20;

pub const REWARD_CONSTANT: u128 = 2_000_000_000_000;
pub const REWARD_CONSTANT_HF4: u128 = 4_000_000_000_000;
pub const REWARD_CONSTANT_HF6: u128 = 6_000_000_000_000;
/// Curve-effective constant for curation weight from hardfork 4. The stored
/// `content_constant` of the fund is left untouched.
pub const CURATION_CONSTANT: u128 = 2_000_000_000_000;

pub const HF1_RECENT_CLAIMS: u128 = 329_427_229_010_149_523;

pub const DEFAULT_PERCENT_LIQUID: u16 = PERCENT_100 / 2;

/// Vesting price used while the vesting pool is empty: 1 liquid unit buys
/// 1000 vesting units.
pub const DEFAULT_VESTING_PRICE_LIQUID: i64 = 1_000;
pub const DEFAULT_VESTING_PRICE_VESTS: i64 = 1_000_000;

pub const ACCOUNT_SUBSIDY_PRECISION: i64 = 10_000;
pub const RD_DECAY_DENOM_SHIFT: u32 = 36;
pub const DEFAULT_ACCOUNT_SUBSIDY_BUDGET: i32 = 797;
pub const DEFAULT_ACCOUNT_SUBSIDY_DECAY: u32 = 347_321;
pub const RD_MIN_BUDGET: i32 = 1;
pub const RD_MIN_DECAY: u32 = 64;

// =============================================================================
// RESERVED ACCOUNTS
// =============================================================================

pub const INIT_MINER_NAME: &str = "initminer";
pub const MINER_ACCOUNT: &str = "miners";
pub const NULL_ACCOUNT: &str = "null";
pub const TEMP_ACCOUNT: &str = "temp";
pub const TREASURY_ACCOUNT: &str = "treasury";
pub const REGENT_ACCOUNT: &str = "regent";
/// Empty proxy means the account votes for itself.
pub const PROXY_TO_SELF_ACCOUNT: &str = "";
pub const ROOT_POST_PARENT: &str = "";

pub const POST_REWARD_FUND_ID: u16 = 0;
