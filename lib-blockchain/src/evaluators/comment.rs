//! Posts and replies.
//!
//! A comment is keyed by `(author, permlink)`. Submitting a comment whose
//! key already exists edits it; the body of an edit may be a unified diff
//! against the stored body.
//!
//! # Invariants
//!
//! - A comment's `children` counts its direct and indirect replies
//! - A comment with replies, positive net votes, or a finished payout
//!   cannot be deleted
//! - Comment options only ever become more restrictive

use tracing::debug;

use crate::economics::cashout::votes_on;
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::*;
use crate::protocol::operations::{
    CommentOperation, CommentOptionsExtension, CommentOptionsOperation, DeleteCommentOperation,
    OperationBody,
};
use crate::protocol::{AccountName, Asset, TimePointSec};
use crate::storage::objects::{Account, Comment, CommentKey};
use crate::storage::ChainState;

const OP: &str = CommentOperation::NAME;

fn require_permlink(permlink: &str) -> EvalResult<()> {
    ensure_eval!(
        !permlink.is_empty() && permlink.len() < MAX_PERMLINK_LENGTH,
        OP,
        "permlink is not a valid size"
    );
    Ok(())
}

/// Increments `children` on every ancestor and marks them active.
fn touch_ancestors(state: &mut ChainState, first: Option<CommentKey>, now: TimePointSec, delta: i64) -> EvalResult<()> {
    let mut next = first;
    while let Some(key) = next {
        next = state.comments.modify(&key, |c| {
            c.children = (c.children as i64 + delta).max(0) as u32;
            c.active = now;
            c.parent_key()
        })?;
    }
    Ok(())
}

/// Applies `patch` to `old` when it parses as a non-empty unified diff
/// that applies cleanly. Anything else replaces the body outright.
pub fn patch_body(old: &str, patch: &str) -> String {
    match diffy::Patch::from_str(patch) {
        Ok(parsed) if !parsed.hunks().is_empty() => match diffy::apply(old, &parsed) {
            Ok(patched) => patched,
            Err(e) => {
                debug!(error = %e, "comment patch did not apply, replacing body");
                patch.to_string()
            }
        },
        _ => patch.to_string(),
    }
}

pub fn comment(ctx: &mut ApplyContext<'_>, op: &CommentOperation) -> EvalResult<()> {
    ensure_eval!(
        !(op.title.is_empty() && op.body.is_empty() && op.json_metadata.is_empty()),
        OP,
        "cannot update comment because nothing appears to be changing"
    );

    let now = ctx.now();
    let author = ctx.state.account(&op.author)?.clone();

    let parent = if op.parent_author.is_empty() {
        None
    } else {
        let parent = ctx.state.comment(&op.parent_author, &op.parent_permlink)?.clone();
        ensure_eval!(
            parent.depth < MAX_COMMENT_DEPTH,
            OP,
            "comment is nested {} levels deep, maximum depth is {MAX_COMMENT_DEPTH}",
            parent.depth
        );
        Some(parent)
    };

    let existing = ctx.state.find_comment(&op.author, &op.permlink).cloned();
    match existing {
        None => create_comment(ctx, op, &author, parent, now),
        Some(existing) => edit_comment(ctx, op, &author, existing, now),
    }
}

fn create_comment(
    ctx: &mut ApplyContext<'_>,
    op: &CommentOperation,
    author: &Account,
    parent: Option<Comment>,
    now: TimePointSec,
) -> EvalResult<()> {
    match &parent {
        Some(parent) => {
            let (root_author, root_permlink) = &parent.root_comment;
            let root = ctx.state.comment(root_author, root_permlink)?;
            ensure_eval!(root.allow_replies, OP, "the parent comment has disabled replies");
            ensure_eval!(
                now.seconds_since(author.last_post) >= MIN_REPLY_INTERVAL as i64,
                OP,
                "you may only comment once every {MIN_REPLY_INTERVAL} seconds"
            );
        }
        None => {
            ensure_eval!(
                now.seconds_since(author.last_root_post) > MIN_ROOT_COMMENT_INTERVAL as i64,
                OP,
                "you may only post once every {MIN_ROOT_COMMENT_INTERVAL} seconds"
            );
        }
    }
    require_permlink(&op.parent_permlink)?;
    require_permlink(&op.permlink)?;

    let is_root = parent.is_none();
    ctx.state.accounts.modify(&op.author, |a| {
        if is_root {
            a.last_root_post = now;
        }
        a.last_post = now;
        a.last_post_edit = now;
        a.post_count += 1;
    })?;

    let (parent_author, parent_permlink, depth, category, root_comment) = match &parent {
        None => (
            AccountName::default(),
            op.parent_permlink.clone(),
            0,
            op.parent_permlink.clone(),
            (op.author.clone(), op.permlink.clone()),
        ),
        Some(p) => (
            p.author.clone(),
            p.permlink.clone(),
            p.depth + 1,
            p.category.clone(),
            p.root_comment.clone(),
        ),
    };
    let percent_liquid = if ctx.has_hardfork(HARDFORK_6) {
        DEFAULT_PERCENT_LIQUID
    } else {
        0
    };

    ctx.state.comments.insert(Comment {
        author: op.author.clone(),
        permlink: op.permlink.clone(),
        parent_author,
        parent_permlink,
        category,
        root_comment,
        title: op.title.clone(),
        body: op.body.clone(),
        json_metadata: op.json_metadata.clone(),
        last_update: now,
        created: now,
        active: now,
        last_payout: TimePointSec::MINIMUM,
        depth,
        children: 0,
        net_rshares: 0,
        abs_rshares: 0,
        vote_rshares: 0,
        children_abs_rshares: 0,
        cashout_time: now + CASHOUT_WINDOW_SECONDS,
        max_cashout_time: TimePointSec::MAXIMUM,
        total_vote_weight: 0,
        reward_weight: PERCENT_100,
        total_payout_value: Asset::liquid(0),
        curator_payout_value: Asset::liquid(0),
        beneficiary_payout_value: Asset::liquid(0),
        author_rewards: 0,
        net_votes: 0,
        max_accepted_payout: Asset::liquid(DEFAULT_MAX_ACCEPTED_PAYOUT),
        percent_liquid,
        allow_replies: true,
        allow_votes: true,
        allow_curation_rewards: true,
        beneficiaries: Vec::new(),
    })?;

    touch_ancestors(ctx.state, parent.map(|p| p.key_of()), now, 1)?;
    debug!(author = %op.author, permlink = %op.permlink, depth, "comment created");
    Ok(())
}

fn edit_comment(
    ctx: &mut ApplyContext<'_>,
    op: &CommentOperation,
    author: &Account,
    existing: Comment,
    now: TimePointSec,
) -> EvalResult<()> {
    ensure_eval!(
        now.seconds_since(author.last_post_edit) >= MIN_COMMENT_EDIT_INTERVAL as i64,
        OP,
        "can only perform one comment edit per block"
    );
    ensure_eval!(
        existing.parent_author == op.parent_author && existing.parent_permlink == op.parent_permlink,
        OP,
        "the parent of a comment cannot change"
    );

    let body = patch_body(&existing.body, &op.body);
    ctx.state.comments.modify(&existing.key_of(), |c| {
        c.last_update = now;
        c.active = now;
        if !op.title.is_empty() {
            c.title = op.title.clone();
        }
        if !op.json_metadata.is_empty() {
            c.json_metadata = op.json_metadata.clone();
        }
        c.body = body;
    })?;
    ctx.state.accounts.modify(&op.author, |a| a.last_post_edit = now)?;
    Ok(())
}

pub fn comment_options(ctx: &mut ApplyContext<'_>, op: &CommentOptionsOperation) -> EvalResult<()> {
    const OP: &str = CommentOptionsOperation::NAME;
    let comment = ctx.state.comment(&op.author, &op.permlink)?.clone();

    if !op.allow_curation_rewards
        || !op.allow_votes
        || op.max_accepted_payout.amount < comment.max_accepted_payout.amount
    {
        ensure_eval!(
            comment.abs_rshares == 0,
            OP,
            "one of the included comment options requires the comment to have no rshares allocated to it"
        );
    }
    ensure_eval!(
        comment.allow_curation_rewards || !op.allow_curation_rewards,
        OP,
        "curation rewards cannot be re-enabled"
    );
    ensure_eval!(comment.allow_votes || !op.allow_votes, OP, "voting cannot be re-enabled");
    ensure_eval!(
        comment.max_accepted_payout.amount >= op.max_accepted_payout.amount,
        OP,
        "a comment cannot accept a greater payout"
    );
    ensure_eval!(
        comment.percent_liquid >= op.percent_liquid,
        OP,
        "a comment cannot accept a greater percent of liquid payout"
    );

    let mut beneficiaries = None;
    for ext in &op.extensions {
        match ext {
            CommentOptionsExtension::Beneficiaries(routes) => {
                ensure_eval!(
                    comment.beneficiaries.is_empty() && beneficiaries.is_none(),
                    OP,
                    "comment already has beneficiaries specified"
                );
                ensure_eval!(
                    comment.abs_rshares == 0,
                    OP,
                    "comment must not have been voted on before specifying beneficiaries"
                );
                for route in routes {
                    ensure_eval!(
                        ctx.state.accounts.contains(&route.account),
                        OP,
                        "beneficiary {} does not exist",
                        route.account
                    );
                }
                beneficiaries = Some(routes.clone());
            }
        }
    }

    ctx.state.comments.modify(&comment.key_of(), |c| {
        c.max_accepted_payout = op.max_accepted_payout;
        c.percent_liquid = op.percent_liquid;
        c.allow_votes = op.allow_votes;
        c.allow_curation_rewards = op.allow_curation_rewards;
        if let Some(routes) = beneficiaries {
            c.beneficiaries = routes;
        }
    })?;
    Ok(())
}

pub fn delete_comment(ctx: &mut ApplyContext<'_>, op: &DeleteCommentOperation) -> EvalResult<()> {
    const OP: &str = DeleteCommentOperation::NAME;
    let comment = ctx.state.comment(&op.author, &op.permlink)?.clone();
    ensure_eval!(comment.children == 0, OP, "cannot delete a comment with replies");
    ensure_eval!(
        comment.cashout_time != TimePointSec::MAXIMUM,
        OP,
        "cannot delete a comment after payout"
    );
    ensure_eval!(
        comment.net_rshares <= 0,
        OP,
        "cannot delete a comment with net positive votes"
    );

    let key = comment.key_of();
    for vote in votes_on(ctx.state, &key) {
        ctx.state.comment_votes.remove(&(key.clone(), vote.voter))?;
    }
    let now = ctx.now();
    touch_ancestors(ctx.state, comment.parent_key(), now, -1)?;
    ctx.state.comments.remove(&key)?;
    debug!(author = %op.author, permlink = %op.permlink, "comment deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    pub(crate) fn post(author: &str, permlink: &str) -> CommentOperation {
        CommentOperation {
            parent_author: AccountName::default(),
            parent_permlink: "general".into(),
            author: author.into(),
            permlink: permlink.into(),
            title: "title".into(),
            body: "hello\nworld\n".into(),
            json_metadata: String::new(),
        }
    }

    fn reply(author: &str, permlink: &str, parent: &CommentOperation) -> CommentOperation {
        CommentOperation {
            parent_author: parent.author.clone(),
            parent_permlink: parent.permlink.clone(),
            author: author.into(),
            permlink: permlink.into(),
            title: String::new(),
            body: "a reply".into(),
            json_metadata: String::new(),
        }
    }

    #[test]
    fn test_root_post_and_reply() {
        let mut f = Fixture::new();
        let root = post("alice", "first");
        comment(&mut f.ctx(), &root).unwrap();
        comment(&mut f.ctx(), &reply("bob", "re-first", &root)).unwrap();
        f.advance(BLOCK_INTERVAL);
        comment(
            &mut f.ctx(),
            &reply("carol", "re-re-first", &reply("bob", "re-first", &root)),
        )
        .unwrap();

        let alice = AccountName::from("alice");
        let stored = f.state.comment(&alice, "first").unwrap();
        assert_eq!(stored.children, 2);
        assert_eq!(stored.category, "general");
        assert_eq!(stored.cashout_time, GENESIS + CASHOUT_WINDOW_SECONDS);

        let nested = f.state.comment(&AccountName::from("carol"), "re-re-first").unwrap();
        assert_eq!(nested.depth, 2);
        assert_eq!(nested.root_comment, (alice, "first".to_string()));
        assert_eq!(f.state.account("alice").unwrap().post_count, 1);
    }

    #[test]
    fn test_root_posts_are_throttled() {
        let mut f = Fixture::new();
        comment(&mut f.ctx(), &post("alice", "one")).unwrap();
        f.advance(MIN_ROOT_COMMENT_INTERVAL);
        assert!(comment(&mut f.ctx(), &post("alice", "two")).is_err());
        f.advance(BLOCK_INTERVAL);
        comment(&mut f.ctx(), &post("alice", "two")).unwrap();
    }

    #[test]
    fn test_edit_applies_patch() {
        let mut f = Fixture::new();
        comment(&mut f.ctx(), &post("alice", "first")).unwrap();
        f.advance(MIN_COMMENT_EDIT_INTERVAL);

        let mut edit = post("alice", "first");
        edit.body = diffy::create_patch("hello\nworld\n", "hello\nthere\n").to_string();
        comment(&mut f.ctx(), &edit).unwrap();

        let stored = f.state.comment(&AccountName::from("alice"), "first").unwrap();
        assert_eq!(stored.body, "hello\nthere\n");
    }

    #[test]
    fn test_edit_with_plain_text_replaces_body() {
        let mut f = Fixture::new();
        comment(&mut f.ctx(), &post("alice", "first")).unwrap();
        f.advance(MIN_COMMENT_EDIT_INTERVAL);

        let mut edit = post("alice", "first");
        edit.body = "brand new body".into();
        comment(&mut f.ctx(), &edit).unwrap();
        let stored = f.state.comment(&AccountName::from("alice"), "first").unwrap();
        assert_eq!(stored.body, "brand new body");
    }

    #[test]
    fn test_edit_cannot_change_parent() {
        let mut f = Fixture::new();
        comment(&mut f.ctx(), &post("alice", "first")).unwrap();
        f.advance(MIN_COMMENT_EDIT_INTERVAL);
        let mut edit = post("alice", "first");
        edit.parent_permlink = "other".into();
        assert!(comment(&mut f.ctx(), &edit).is_err());
    }

    #[test]
    fn test_delete_comment_updates_parent() {
        let mut f = Fixture::new();
        let root = post("alice", "first");
        comment(&mut f.ctx(), &root).unwrap();
        comment(&mut f.ctx(), &reply("bob", "re-first", &root)).unwrap();

        let delete_root = DeleteCommentOperation {
            author: "alice".into(),
            permlink: "first".into(),
        };
        assert!(delete_comment(&mut f.ctx(), &delete_root).is_err());

        delete_comment(
            &mut f.ctx(),
            &DeleteCommentOperation {
                author: "bob".into(),
                permlink: "re-first".into(),
            },
        )
        .unwrap();
        assert_eq!(f.state.comment(&AccountName::from("alice"), "first").unwrap().children, 0);
        delete_comment(&mut f.ctx(), &delete_root).unwrap();
        assert!(f.state.comments.is_empty());
    }

    #[test]
    fn test_comment_options_only_restrict() {
        let mut f = Fixture::new();
        comment(&mut f.ctx(), &post("alice", "first")).unwrap();
        let mut options = CommentOptionsOperation {
            author: "alice".into(),
            permlink: "first".into(),
            max_accepted_payout: Asset::liquid(1_000),
            percent_liquid: 0,
            allow_votes: true,
            allow_curation_rewards: false,
            extensions: Vec::new(),
        };
        comment_options(&mut f.ctx(), &options).unwrap();
        let stored = f.state.comment(&AccountName::from("alice"), "first").unwrap();
        assert_eq!(stored.max_accepted_payout.amount, 1_000);
        assert!(!stored.allow_curation_rewards);

        options.allow_curation_rewards = true;
        assert!(comment_options(&mut f.ctx(), &options).is_err());
    }
}
