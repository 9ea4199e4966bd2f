//! Virtual operations.
//!
//! Emitted by the chain itself to report side effects (payouts, fills,
//! hardforks). `Operation` has no virtual variants, so a transaction cannot
//! carry one.

use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::operations::Operation;
use super::types::AccountName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualOperation {
    AuthorReward {
        author: AccountName,
        permlink: String,
        liquid_payout: Asset,
        vesting_payout: Asset,
    },
    CurationReward {
        curator: AccountName,
        reward: Asset,
        comment_author: AccountName,
        comment_permlink: String,
    },
    CommentReward {
        author: AccountName,
        permlink: String,
        payout: Asset,
    },
    FillVestingWithdraw {
        from_account: AccountName,
        to_account: AccountName,
        withdrawn: Asset,
        deposited: Asset,
    },
    ShutdownWitness {
        owner: AccountName,
    },
    FillTransferFromSavings {
        from: AccountName,
        to: AccountName,
        amount: Asset,
        request_id: u32,
        memo: String,
    },
    Hardfork {
        hardfork_id: u32,
    },
    CommentPayoutUpdate {
        author: AccountName,
        permlink: String,
    },
    ReturnVestingDelegation {
        account: AccountName,
        vesting_shares: Asset,
    },
    CommentBenefactorReward {
        benefactor: AccountName,
        author: AccountName,
        permlink: String,
        liquid_payout: Asset,
        vesting_payout: Asset,
    },
    ProducerReward {
        producer: AccountName,
        vesting_shares: Asset,
    },
    ClearNullAccountBalance {
        total_cleared: Vec<Asset>,
    },
    ProposalPay {
        receiver: AccountName,
        payment: Asset,
    },
    SpsFund {
        additional_funds: Asset,
    },
}

impl VirtualOperation {
    pub fn name(&self) -> &'static str {
        match self {
            VirtualOperation::AuthorReward { .. } => "author_reward",
            VirtualOperation::CurationReward { .. } => "curation_reward",
            VirtualOperation::CommentReward { .. } => "comment_reward",
            VirtualOperation::FillVestingWithdraw { .. } => "fill_vesting_withdraw",
            VirtualOperation::ShutdownWitness { .. } => "shutdown_witness",
            VirtualOperation::FillTransferFromSavings { .. } => "fill_transfer_from_savings",
            VirtualOperation::Hardfork { .. } => "hardfork",
            VirtualOperation::CommentPayoutUpdate { .. } => "comment_payout_update",
            VirtualOperation::ReturnVestingDelegation { .. } => "return_vesting_delegation",
            VirtualOperation::CommentBenefactorReward { .. } => "comment_benefactor_reward",
            VirtualOperation::ProducerReward { .. } => "producer_reward",
            VirtualOperation::ClearNullAccountBalance { .. } => "clear_null_account_balance",
            VirtualOperation::ProposalPay { .. } => "proposal_pay",
            VirtualOperation::SpsFund { .. } => "sps_fund",
        }
    }
}

/// Either kind of operation, as delivered to chain event listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppliedOperation {
    User(Operation),
    Virtual(VirtualOperation),
}

impl AppliedOperation {
    pub fn name(&self) -> &'static str {
        match self {
            AppliedOperation::User(op) => op.name(),
            AppliedOperation::Virtual(vop) => vop.name(),
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, AppliedOperation::Virtual(_))
    }
}
