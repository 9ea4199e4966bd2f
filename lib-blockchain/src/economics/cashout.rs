//! Comment cashout.
//!
//! When a comment's cashout time arrives its positive rshares are converted
//! to tokens from the reward fund, split between curators, beneficiaries
//! and the author, and paid as unclaimed reward balances.
//!
//! # Invariants
//!
//! - Every comment due this block claims against the same fund snapshot,
//!   so payout per rshare does not depend on processing order
//! - Each party's share is `total * weight / denominator`; what is left
//!   over stays in the fund, it is never spread back out
//! - After cashout a comment has `net_rshares <= 0` and cashout time
//!   `TimePointSec::MAXIMUM`

use tracing::debug;

use super::curves::{evaluate_reward_curve, get_rshare_reward, CommentRewardContext, CurveId};
use super::supply::{adjust_balance, adjust_reward_balance};
use super::vesting::create_vesting_with;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::{AccountName, Asset, TimePointSec, VirtualOperation};
use crate::storage::objects::{comment_index, CommentKey, CommentVote};
use crate::storage::ChainState;

/// Votes on `comment`, in voter order.
pub fn votes_on(state: &ChainState, comment: &CommentKey) -> Vec<CommentVote> {
    state
        .comment_votes
        .range((comment.clone(), AccountName::default())..)
        .take_while(|v| &v.comment == comment)
        .cloned()
        .collect()
}

/// Pays curators from `max_rewards` in proportion to vote weight and
/// returns what was left unclaimed. `max_rewards` is reduced to what was
/// actually paid.
pub fn pay_curators(ctx: &mut ApplyContext<'_>, key: &CommentKey, max_rewards: &mut i64) -> EvalResult<i64> {
    let comment = ctx.state.comments.require(key)?;
    let total_weight = comment.total_vote_weight as u128;
    let mut unclaimed = *max_rewards;

    if !comment.allow_curation_rewards {
        unclaimed = 0;
        *max_rewards = 0;
    } else if total_weight > 0 {
        let mut votes = votes_on(ctx.state, key);
        votes.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.voter.cmp(&b.voter)));

        for vote in votes {
            let claim = (*max_rewards as u128 * vote.weight as u128 / total_weight) as i64;
            if claim <= 0 {
                continue;
            }
            unclaimed -= claim;
            let (_, note) = create_vesting_with(ctx, &vote.voter, Asset::liquid(claim), true, |ctx, reward| {
                ctx.pre_virtual_operation(VirtualOperation::CurationReward {
                    curator: vote.voter.clone(),
                    reward,
                    comment_author: key.0.clone(),
                    comment_permlink: key.1.clone(),
                })
            })?;
            ctx.state
                .accounts
                .modify(&vote.voter, |a| a.curation_rewards += claim)?;
            ctx.post_virtual_operation(note)?;
        }
    }
    *max_rewards -= unclaimed;
    Ok(unclaimed)
}

/// Pays out one comment and resets its reward state. Returns the tokens
/// claimed from the fund.
pub fn cashout_comment(
    ctx: &mut ApplyContext<'_>,
    reward_ctx: &mut CommentRewardContext,
    key: &CommentKey,
    forward_curation_remainder: bool,
) -> EvalResult<i64> {
    let mut claimed = 0i64;
    let comment = ctx.state.comments.require(key)?.clone();

    if comment.net_rshares > 0 {
        let fund = ctx.state.reward_funds.require(&POST_REWARD_FUND_ID)?;
        reward_ctx.rshares = comment.net_rshares;
        reward_ctx.reward_weight = comment.reward_weight;
        reward_ctx.max_payout = comment.max_accepted_payout.amount;
        reward_ctx.reward_curve = fund.author_reward_curve;
        reward_ctx.content_constant = fund.content_constant;
        let percent_curation = fund.percent_curation_rewards;

        let reward_tokens = get_rshare_reward(reward_ctx).unwrap_or(0) as i64;
        if reward_tokens > 0 {
            let mut curation_tokens =
                (reward_tokens as u128 * percent_curation as u128 / PERCENT_100 as u128) as i64;
            let mut author_tokens = reward_tokens - curation_tokens;

            let remainder = pay_curators(ctx, key, &mut curation_tokens)?;
            if forward_curation_remainder {
                author_tokens += remainder;
            }

            let mut total_beneficiary = 0i64;
            claimed = author_tokens + curation_tokens;

            for b in &comment.beneficiaries {
                let tokens = author_tokens * b.weight as i64 / PERCENT_100 as i64;
                let treasury = b.account == TREASURY_ACCOUNT;
                let (liquid_payout, vesting_liquid) = if treasury {
                    adjust_balance(ctx.state, &b.account, Asset::liquid(tokens))?;
                    (Asset::liquid(tokens), 0)
                } else {
                    (Asset::liquid(0), tokens)
                };
                let (_, note) =
                    create_vesting_with(ctx, &b.account, Asset::liquid(vesting_liquid), true, |ctx, vesting_payout| {
                        ctx.pre_virtual_operation(VirtualOperation::CommentBenefactorReward {
                            benefactor: b.account.clone(),
                            author: comment.author.clone(),
                            permlink: comment.permlink.clone(),
                            liquid_payout,
                            vesting_payout,
                        })
                    })?;
                ctx.post_virtual_operation(note)?;
                total_beneficiary += tokens;
            }

            author_tokens -= total_beneficiary;
            let author_liquid = author_tokens * comment.percent_liquid as i64 / (4 * PERCENT_100 as i64);
            let author_vesting = author_tokens - author_liquid;
            let liquid_payout = Asset::liquid(author_liquid);

            // Liquid author reward waits in the reward balance like the rest.
            adjust_reward_balance(ctx.state, &comment.author, liquid_payout, Asset::vests(0))?;
            let (_, note) =
                create_vesting_with(ctx, &comment.author, Asset::liquid(author_vesting), true, |ctx, vesting_payout| {
                    ctx.pre_virtual_operation(VirtualOperation::AuthorReward {
                        author: comment.author.clone(),
                        permlink: comment.permlink.clone(),
                        liquid_payout,
                        vesting_payout,
                    })
                })?;

            ctx.state.comments.modify(key, |c| {
                c.total_payout_value.amount += author_liquid + author_vesting;
                c.curator_payout_value.amount += curation_tokens;
                c.beneficiary_payout_value.amount += total_beneficiary;
            })?;
            ctx.post_virtual_operation(note)?;
            ctx.push_virtual_operation(VirtualOperation::CommentReward {
                author: comment.author.clone(),
                permlink: comment.permlink.clone(),
                payout: Asset::liquid(claimed),
            })?;

            ctx.state.comments.modify(key, |c| c.author_rewards += author_tokens)?;
            ctx.state
                .accounts
                .modify(&comment.author, |a| a.posting_rewards += author_tokens)?;
            debug!(
                author = %comment.author,
                permlink = %comment.permlink,
                claimed,
                curation = curation_tokens,
                beneficiaries = total_beneficiary,
                "comment paid out"
            );
        }
    }

    let now = ctx.now();
    ctx.state.comments.modify(key, |c| {
        if c.net_rshares > 0 {
            c.net_rshares = 0;
        }
        c.children_abs_rshares = 0;
        c.abs_rshares = 0;
        c.vote_rshares = 0;
        c.total_vote_weight = 0;
        c.max_cashout_time = TimePointSec::MAXIMUM;
        c.cashout_time = TimePointSec::MAXIMUM;
        c.last_payout = now;
    })?;
    ctx.push_virtual_operation(VirtualOperation::CommentPayoutUpdate {
        author: comment.author.clone(),
        permlink: comment.permlink.clone(),
    })?;

    // Votes stay as a record, frozen against changes.
    for vote in votes_on(ctx.state, key) {
        ctx.state
            .comment_votes
            .modify(&(key.clone(), vote.voter), |v| v.num_changes = -1)?;
    }
    Ok(claimed)
}

struct FundSnapshot {
    id: u16,
    recent_claims: u128,
    reward_balance: i64,
    awarded: i64,
}

pub fn process_comment_cashout(ctx: &mut ApplyContext<'_>) -> EvalResult<()> {
    let now = ctx.now();
    let mut funds = Vec::new();

    for id in ctx.state.reward_funds.keys() {
        ctx.state.reward_funds.modify(&id, |f| {
            let elapsed = now.seconds_since(f.last_update);
            if elapsed < RECENT_RSHARES_DECAY_TIME as i64 {
                let elapsed = elapsed.max(0) as u128;
                f.recent_claims -= f.recent_claims * elapsed / RECENT_RSHARES_DECAY_TIME as u128;
            }
            f.last_update = now;
        })?;
        let fund = ctx.state.reward_funds.require(&id)?;
        funds.push(FundSnapshot {
            id,
            recent_claims: fund.recent_claims,
            reward_balance: fund.reward_balance.amount,
            awarded: 0,
        });
    }
    let Some(post_fund) = funds.iter().position(|f| f.id == POST_REWARD_FUND_ID) else {
        return Ok(());
    };

    // Everything about to cash out counts toward the claims it is paid
    // against, so all comments this block get the same rate.
    let due = ctx
        .state
        .comments
        .keys_by_while(comment_index::BY_CASHOUT_TIME, |c| c.cashout_time <= now);
    if due.is_empty() {
        return write_back(ctx, &funds);
    }
    {
        let fund = ctx.state.reward_funds.require(&POST_REWARD_FUND_ID)?;
        let (curve, constant) = (fund.author_reward_curve, fund.content_constant);
        for key in &due {
            let comment = ctx.state.comments.require(key)?;
            if comment.net_rshares > 0 {
                funds[post_fund].recent_claims = funds[post_fund]
                    .recent_claims
                    .wrapping_add(evaluate_reward_curve(comment.net_rshares as u128, curve, constant));
            }
        }
    }

    let mut reward_ctx = CommentRewardContext {
        rshares: 0,
        reward_weight: PERCENT_100,
        max_payout: 0,
        total_reward_shares2: 0,
        total_reward_fund: 0,
        reward_curve: CurveId::Linear,
        content_constant: REWARD_CONSTANT,
    };
    for key in &due {
        reward_ctx.total_reward_shares2 = funds[post_fund].recent_claims;
        reward_ctx.total_reward_fund = funds[post_fund].reward_balance;
        funds[post_fund].awarded += cashout_comment(ctx, &mut reward_ctx, key, false)?;
    }
    write_back(ctx, &funds)
}

fn write_back(ctx: &mut ApplyContext<'_>, funds: &[FundSnapshot]) -> EvalResult<()> {
    for fund in funds {
        ctx.state.reward_funds.modify(&fund.id, |f| {
            f.recent_claims = fund.recent_claims;
            f.reward_balance.amount -= fund.awarded;
        })?;
    }
    Ok(())
}
