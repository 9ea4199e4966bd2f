//! Treasury proposal creation, voting and removal. Payment happens in the
//! periodic proposal step, see `economics::proposals`.

use tracing::{debug, info};

use crate::economics::proposals;
use crate::economics::supply::adjust_balance;
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::{EvalError, EvalResult};
use crate::protocol::constants::{PROPOSAL_FEE, TREASURY_ACCOUNT};
use crate::protocol::operations::{
    CreateProposalOperation, OperationBody, RemoveProposalOperation, UpdateProposalVotesOperation,
};
use crate::protocol::{AccountName, Asset};
use crate::storage::objects::{Proposal, ProposalVote};

pub fn create_proposal(ctx: &mut ApplyContext<'_>, op: &CreateProposalOperation) -> EvalResult<()> {
    const OP: &str = CreateProposalOperation::NAME;
    ctx.state.account(&op.creator)?;
    ctx.state.account(&op.receiver)?;
    ensure_eval!(
        op.end_date > ctx.now(),
        OP,
        "can't create inactive proposals: end date {} is not after {}",
        op.end_date,
        ctx.now()
    );
    // The proposal is discussed in a post by its creator or its receiver.
    ensure_eval!(
        ctx.state.find_comment(&op.creator, &op.permlink).is_some()
            || ctx.state.find_comment(&op.receiver, &op.permlink).is_some(),
        OP,
        "proposal permlink must point to a post by the creator or the receiver"
    );

    let fee = Asset::liquid(PROPOSAL_FEE);
    adjust_balance(ctx.state, &op.creator, -fee)?;
    adjust_balance(ctx.state, &AccountName::from(TREASURY_ACCOUNT), fee)?;

    let id = u32::try_from(ctx.state.proposals.next_id())
        .map_err(|_| EvalError::Overflow("proposal id".into()))?;
    ctx.state.proposals.insert(Proposal {
        id,
        creator: op.creator.clone(),
        receiver: op.receiver.clone(),
        start_date: op.start_date,
        end_date: op.end_date,
        daily_pay: op.daily_pay,
        subject: op.subject.clone(),
        permlink: op.permlink.clone(),
        total_votes: 0,
    })?;
    info!(proposal_id = id, creator = %op.creator, daily_pay = %op.daily_pay, "proposal created");
    Ok(())
}

pub fn update_proposal_votes(ctx: &mut ApplyContext<'_>, op: &UpdateProposalVotesOperation) -> EvalResult<()> {
    const OP: &str = UpdateProposalVotesOperation::NAME;
    ctx.state.account(&op.voter)?;
    for &id in &op.proposal_ids {
        ensure_eval!(
            ctx.state.proposals.contains(&id),
            OP,
            "proposal {id} does not exist"
        );
        let key = (op.voter.clone(), id);
        let voted = ctx.state.proposal_votes.contains(&key);
        if op.approve && !voted {
            ctx.state.proposal_votes.insert(ProposalVote {
                voter: op.voter.clone(),
                proposal_id: id,
            })?;
        } else if !op.approve && voted {
            ctx.state.proposal_votes.remove(&key)?;
        }
    }
    debug!(voter = %op.voter, approve = op.approve, ids = ?op.proposal_ids, "proposal votes updated");
    Ok(())
}

pub fn remove_proposal(ctx: &mut ApplyContext<'_>, op: &RemoveProposalOperation) -> EvalResult<()> {
    const OP: &str = RemoveProposalOperation::NAME;
    for &id in &op.proposal_ids {
        let proposal = ctx.state.proposals.require(&id)?;
        ensure_eval!(
            proposal.creator == op.proposal_owner,
            OP,
            "only the creator {} can remove proposal {id}",
            proposal.creator
        );
    }
    for &id in &op.proposal_ids {
        proposals::remove_proposal(ctx.state, id)?;
        info!(proposal_id = id, owner = %op.proposal_owner, "proposal removed");
    }
    Ok(())
}
