//! Content votes.
//!
//! A vote spends voting mana in proportion to its weight and adds the
//! resulting rshares to the comment. New votes also earn curation weight:
//! the growth of the curation curve caused by the vote, discounted while
//! the post is younger than the reverse auction window.
//!
//! # Invariants
//!
//! - A voter votes at most once every `MIN_VOTE_INTERVAL_SEC` seconds
//! - A vote can change at most `MAX_VOTE_CHANGES` times and forfeits its
//!   curation weight when it does
//! - Votes inside the upvote lockout before cashout are scaled down
//!   linearly to zero at cashout
//! - Votes on a paid-out comment are recorded but move no rshares

use tracing::trace;

use crate::economics::curves::evaluate_reward_curve;
use crate::economics::vesting::voting_manabar_params;
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::operations::{OperationBody, VoteOperation};
use crate::protocol::TimePointSec;
use crate::storage::objects::{Account, Comment, CommentVote};

const OP: &str = VoteOperation::NAME;

/// Mana a vote of `weight` basis points spends out of `current_mana`.
/// Rounds up, so any non-zero vote costs at least one unit.
pub fn vote_mana_cost(current_mana: i64, weight: i16) -> i64 {
    let abs_weight = weight.unsigned_abs() as i128;
    let used = current_mana.max(0) as i128 * abs_weight * SECONDS_PER_DAY as i128 / PERCENT_100 as i128;
    let denom = VOTE_POWER_RESERVE_RATE as i128 * VOTING_MANA_REGENERATION_SECONDS as i128;
    ((used + denom - 1) / denom) as i64
}

/// Curation weight of a new vote that moves the comment's vote rshares
/// from `old_rshares` to `new_rshares`. Returns `(weight, max_weight)`.
fn curation_weight(
    comment: &Comment,
    old_rshares: i64,
    new_rshares: i64,
    curve: crate::economics::curves::CurveId,
    content_constant: u128,
    reverse_auction_seconds: u32,
    now: TimePointSec,
) -> (u64, u64) {
    let old_weight = evaluate_reward_curve(old_rshares.max(0) as u128, curve, content_constant);
    let new_weight = evaluate_reward_curve(new_rshares.max(0) as u128, curve, content_constant);
    if old_weight >= new_weight {
        return (0, 0);
    }
    let max_weight = (new_weight - old_weight).min(u64::MAX as u128);
    if reverse_auction_seconds == 0 {
        return (max_weight as u64, max_weight as u64);
    }
    let elapsed = now.seconds_since(comment.created).max(0) as u128;
    let window = reverse_auction_seconds as u128;
    let weight = max_weight * elapsed.min(window) / window;
    (weight as u64, max_weight as u64)
}

pub fn vote(ctx: &mut ApplyContext<'_>, op: &VoteOperation) -> EvalResult<()> {
    let comment = ctx.state.comment(&op.author, &op.permlink)?.clone();
    let voter = ctx.state.account(&op.voter)?.clone();
    ensure_eval!(voter.can_vote, OP, "voter has declined their voting rights");
    ensure_eval!(op.weight >= 0, OP, "downvotes are not allowed");
    if op.weight > 0 {
        ensure_eval!(comment.allow_votes, OP, "votes are not allowed on the comment");
    }

    let now = ctx.now();
    let key = comment.key_of();
    let vote_key = (key.clone(), op.voter.clone());
    let existing = ctx.state.comment_votes.get(&vote_key).cloned();

    if comment.cashout_time == TimePointSec::MAXIMUM {
        match existing {
            Some(_) => {
                ctx.state.comment_votes.modify(&vote_key, |v| {
                    v.vote_percent = op.weight;
                    v.last_update = now;
                })?;
            }
            None => {
                ctx.state.comment_votes.insert(CommentVote {
                    comment: key,
                    voter: op.voter.clone(),
                    weight: 0,
                    rshares: 0,
                    vote_percent: op.weight,
                    last_update: now,
                    num_changes: -1,
                })?;
            }
        }
        return Ok(());
    }

    ensure_eval!(now < comment.cashout_time, OP, "cannot vote after payout");
    if let Some(previous) = &existing {
        ensure_eval!(
            previous.num_changes != -1,
            OP,
            "cannot vote again on a comment after payout"
        );
    }
    ensure_eval!(
        now.seconds_since(voter.last_vote_time) >= MIN_VOTE_INTERVAL_SEC as i64,
        OP,
        "can only vote once every {MIN_VOTE_INTERVAL_SEC} seconds"
    );

    let mut manabar = voter.voting_manabar;
    manabar.regenerate(voting_manabar_params(&voter), now.secs());
    ensure_eval!(
        manabar.current_mana >= 0,
        OP,
        "account does not have enough mana to vote"
    );
    let used_mana = vote_mana_cost(manabar.current_mana, op.weight);
    ensure_eval!(
        manabar.has_mana(used_mana),
        OP,
        "account does not have enough mana to vote"
    );

    let mut abs_rshares = used_mana;
    if !ctx.has_hardfork(HARDFORK_4) {
        abs_rshares = (abs_rshares - VOTE_DUST_THRESHOLD).max(0);
    }
    let cashout_delta = comment.cashout_time.seconds_since(now);
    if cashout_delta < UPVOTE_LOCKOUT_SECONDS as i64 {
        abs_rshares = (abs_rshares as i128 * cashout_delta as i128 / UPVOTE_LOCKOUT_SECONDS as i128) as i64;
    }
    let rshares = if op.weight < 0 { -abs_rshares } else { abs_rshares };

    manabar.use_mana(used_mana);
    let spend = |a: &mut Account| {
        a.voting_manabar = manabar;
        a.last_vote_time = now;
    };

    match existing {
        None => {
            ensure_eval!(op.weight != 0, OP, "vote weight cannot be 0");
            ctx.state.accounts.modify(&op.voter, spend)?;
            new_vote(ctx, op, &comment, rshares, abs_rshares, now)?;
        }
        Some(previous) => {
            ensure_eval!(
                previous.num_changes < MAX_VOTE_CHANGES,
                OP,
                "voter has used the maximum number of vote changes on this comment"
            );
            ensure_eval!(
                previous.vote_percent != op.weight,
                OP,
                "you have already voted in a similar way"
            );
            ctx.state.accounts.modify(&op.voter, spend)?;
            change_vote(ctx, op, &comment, &previous, rshares, abs_rshares, now)?;
        }
    }
    trace!(voter = %op.voter, author = %op.author, permlink = %op.permlink, rshares, "vote applied");
    Ok(())
}

fn new_vote(
    ctx: &mut ApplyContext<'_>,
    op: &VoteOperation,
    comment: &Comment,
    rshares: i64,
    abs_rshares: i64,
    now: TimePointSec,
) -> EvalResult<()> {
    let key = comment.key_of();
    let hf4 = ctx.has_hardfork(HARDFORK_4);
    let old_vote_rshares = comment.vote_rshares;
    let new_vote_rshares = ctx.state.comments.modify(&key, |c| {
        c.net_rshares += rshares;
        c.abs_rshares += abs_rshares;
        if rshares > 0 {
            c.vote_rshares += rshares;
            c.net_votes += 1;
        } else if !hf4 || rshares < 0 {
            c.net_votes -= 1;
        }
        c.vote_rshares
    })?;
    ctx.state
        .comments
        .modify(&comment.root_comment, |root| root.children_abs_rshares += abs_rshares)?;

    let fund = ctx.state.reward_funds.require(&POST_REWARD_FUND_ID)?;
    let eligible = rshares > 0
        && comment.last_payout == TimePointSec::MINIMUM
        && comment.allow_curation_rewards
        && fund.percent_curation_rewards > 0;

    let mut weight = 0;
    if eligible {
        let constant = if hf4 { CURATION_CONSTANT } else { fund.content_constant };
        let (w, max_weight) = curation_weight(
            comment,
            old_vote_rshares,
            new_vote_rshares,
            fund.curation_reward_curve,
            constant,
            ctx.state.globals.reverse_auction_seconds,
            now,
        );
        weight = w;
        ctx.state
            .comments
            .modify(&key, |c| c.total_vote_weight = c.total_vote_weight.saturating_add(max_weight))?;
    }

    ctx.state.comment_votes.insert(CommentVote {
        comment: key,
        voter: op.voter.clone(),
        weight,
        rshares,
        vote_percent: op.weight,
        last_update: now,
        num_changes: 0,
    })?;
    Ok(())
}

/// Change in `net_votes` when a vote moves from `old` to `new` rshares.
fn net_votes_delta(new: i64, old: i64) -> i32 {
    match (new.signum(), old.signum()) {
        (1, -1) => 2,
        (1, 0) | (0, -1) => 1,
        (0, 1) | (-1, 0) => -1,
        (-1, 1) => -2,
        _ => 0,
    }
}

fn change_vote(
    ctx: &mut ApplyContext<'_>,
    op: &VoteOperation,
    comment: &Comment,
    previous: &CommentVote,
    rshares: i64,
    abs_rshares: i64,
    now: TimePointSec,
) -> EvalResult<()> {
    let key = comment.key_of();
    ctx.state.comments.modify(&key, |c| {
        c.net_rshares -= previous.rshares;
        c.net_rshares += rshares;
        c.abs_rshares += abs_rshares;
        c.net_votes += net_votes_delta(rshares, previous.rshares);
        c.total_vote_weight = c.total_vote_weight.saturating_sub(previous.weight);
    })?;
    ctx.state
        .comments
        .modify(&comment.root_comment, |root| root.children_abs_rshares += abs_rshares)?;
    ctx.state
        .comment_votes
        .modify(&(key, op.voter.clone()), |v| {
            v.rshares = rshares;
            v.vote_percent = op.weight;
            v.last_update = now;
            v.weight = 0;
            v.num_changes += 1;
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::comment::comment;
    use super::super::test_support::*;
    use super::*;
    use crate::protocol::operations::CommentOperation;
    use crate::protocol::AccountName;

    const VESTS: i64 = 1_000_000_000_000;

    fn setup() -> Fixture {
        let mut f = Fixture::new();
        f.state.hardforks.modify(|h| h.last_hardfork = HARDFORK_4);
        f.add_vests("bob", VESTS);
        f.add_vests("carol", VESTS);
        comment(
            &mut f.ctx(),
            &CommentOperation {
                parent_author: AccountName::default(),
                parent_permlink: "general".into(),
                author: "alice".into(),
                permlink: "post".into(),
                title: "t".into(),
                body: "b".into(),
                json_metadata: String::new(),
            },
        )
        .unwrap();
        f
    }

    fn vote_op(voter: &str, weight: i16) -> VoteOperation {
        VoteOperation {
            voter: voter.into(),
            author: "alice".into(),
            permlink: "post".into(),
            weight,
        }
    }

    #[test]
    fn test_mana_cost_of_full_vote() {
        // A full vote spends 1 / (reserve rate * regen days) of the bar.
        let cost = vote_mana_cost(VESTS, PERCENT_100 as i16);
        let days = (VOTING_MANA_REGENERATION_SECONDS / SECONDS_PER_DAY) as i64;
        assert_eq!(cost, VESTS / (VOTE_POWER_RESERVE_RATE * days));
        assert_eq!(vote_mana_cost(1, 1), 1);
        assert_eq!(vote_mana_cost(VESTS, 0), 0);
    }

    #[test]
    fn test_net_votes_delta_table() {
        assert_eq!(net_votes_delta(5, -5), 2);
        assert_eq!(net_votes_delta(5, 0), 1);
        assert_eq!(net_votes_delta(0, -5), 1);
        assert_eq!(net_votes_delta(0, 5), -1);
        assert_eq!(net_votes_delta(-5, 0), -1);
        assert_eq!(net_votes_delta(-5, 5), -2);
        assert_eq!(net_votes_delta(5, 5), 0);
    }

    #[test]
    fn test_new_vote_adds_rshares_and_spends_mana() {
        let mut f = setup();
        f.advance(REVERSE_AUCTION_WINDOW_SECONDS);
        vote(&mut f.ctx(), &vote_op("bob", PERCENT_100 as i16)).unwrap();

        let post = f.state.comment(&AccountName::from("alice"), "post").unwrap();
        let expected = vote_mana_cost(VESTS, PERCENT_100 as i16);
        assert_eq!(post.net_rshares, expected);
        assert_eq!(post.abs_rshares, expected);
        assert_eq!(post.vote_rshares, expected);
        assert_eq!(post.children_abs_rshares, expected);
        assert_eq!(post.net_votes, 1);
        assert!(post.total_vote_weight > 0);

        let bob = f.state.account("bob").unwrap();
        assert_eq!(bob.voting_manabar.current_mana, VESTS - expected);
        assert_eq!(bob.last_vote_time, f.state.head_block_time());

        let cv = f
            .state
            .comment_votes
            .get(&((AccountName::from("alice"), "post".to_string()), AccountName::from("bob")))
            .unwrap();
        // Past the reverse auction the full curve delta counts.
        assert_eq!(cv.weight, post.total_vote_weight);
    }

    #[test]
    fn test_early_vote_gets_discounted_curation_weight() {
        let mut f = setup();
        vote(&mut f.ctx(), &vote_op("bob", PERCENT_100 as i16)).unwrap();
        let post = f.state.comment(&AccountName::from("alice"), "post").unwrap();
        let cv = f
            .state
            .comment_votes
            .get(&((AccountName::from("alice"), "post".to_string()), AccountName::from("bob")))
            .unwrap();
        assert_eq!(cv.weight, 0);
        assert!(post.total_vote_weight > 0);
    }

    #[test]
    fn test_vote_rate_limit_and_identical_change() {
        let mut f = setup();
        vote(&mut f.ctx(), &vote_op("bob", 5_000)).unwrap();
        assert!(vote(&mut f.ctx(), &vote_op("bob", 2_000)).is_err());
        f.advance(MIN_VOTE_INTERVAL_SEC);
        assert!(vote(&mut f.ctx(), &vote_op("bob", 5_000)).is_err());
        vote(&mut f.ctx(), &vote_op("bob", 2_000)).unwrap();

        let cv = f
            .state
            .comment_votes
            .get(&((AccountName::from("alice"), "post".to_string()), AccountName::from("bob")))
            .unwrap();
        assert_eq!(cv.num_changes, 1);
        assert_eq!(cv.weight, 0);
        assert_eq!(cv.vote_percent, 2_000);
    }

    #[test]
    fn test_downvote_rejected() {
        let mut f = setup();
        assert!(vote(&mut f.ctx(), &vote_op("bob", -100)).is_err());
    }

    #[test]
    fn test_vote_after_payout_is_recorded_only() {
        let mut f = setup();
        let key = (AccountName::from("alice"), "post".to_string());
        f.state
            .comments
            .modify(&key, |c| c.cashout_time = TimePointSec::MAXIMUM)
            .unwrap();
        vote(&mut f.ctx(), &vote_op("carol", PERCENT_100 as i16)).unwrap();

        let post = f.state.comments.get(&key).unwrap();
        assert_eq!(post.net_rshares, 0);
        let cv = f.state.comment_votes.get(&(key, AccountName::from("carol"))).unwrap();
        assert_eq!(cv.num_changes, -1);
        assert_eq!(f.state.account("carol").unwrap().voting_manabar.current_mana, VESTS);
    }
}
