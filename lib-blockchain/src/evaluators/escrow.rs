//! Three-party escrow.
//!
//! ```text
//! transfer ──> pending ──(to + agent approve)──> approved ──> released
//!                 │                                 │
//!                 ├──(either rejects)──> refunded   └──(dispute)──> agent decides
//!                 └──(deadline passes)─> refunded by the ratification sweep
//! ```
//!
//! The agent fee is held with the escrow and paid once both parties have
//! approved. A release that empties the escrow removes it.

use tracing::debug;

use crate::economics::supply::adjust_balance;
use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::operations::{
    EscrowApproveOperation, EscrowDisputeOperation, EscrowReleaseOperation, EscrowTransferOperation,
    OperationBody,
};
use crate::protocol::{AccountName, Asset};
use crate::storage::objects::Escrow;

fn check_parties(op: &'static str, escrow: &Escrow, to: &AccountName, agent: &AccountName) -> EvalResult<()> {
    ensure_eval!(
        &escrow.to == to,
        op,
        "operation 'to' ({to}) does not match escrow 'to' ({})",
        escrow.to
    );
    ensure_eval!(
        &escrow.agent == agent,
        op,
        "operation 'agent' ({agent}) does not match escrow 'agent' ({})",
        escrow.agent
    );
    Ok(())
}

pub fn escrow_transfer(ctx: &mut ApplyContext<'_>, op: &EscrowTransferOperation) -> EvalResult<()> {
    const OP: &str = EscrowTransferOperation::NAME;
    let now = ctx.now();
    ctx.state.account(&op.from)?;
    ctx.state.account(&op.to)?;
    ctx.state.account(&op.agent)?;
    ensure_eval!(
        op.ratification_deadline > now,
        OP,
        "the escrow ratification deadline must be after head block time"
    );
    ensure_eval!(
        op.escrow_expiration > now,
        OP,
        "the escrow expiration must be after head block time"
    );

    adjust_balance(ctx.state, &op.from, -(op.amount + op.fee))?;
    ctx.state.escrows.insert(Escrow {
        escrow_id: op.escrow_id,
        from: op.from.clone(),
        to: op.to.clone(),
        agent: op.agent.clone(),
        ratification_deadline: op.ratification_deadline,
        escrow_expiration: op.escrow_expiration,
        liquid_balance: op.amount,
        pending_fee: op.fee,
        to_approved: false,
        agent_approved: false,
        disputed: false,
    })?;
    debug!(from = %op.from, escrow_id = op.escrow_id, amount = %op.amount, "escrow created");
    Ok(())
}

pub fn escrow_approve(ctx: &mut ApplyContext<'_>, op: &EscrowApproveOperation) -> EvalResult<()> {
    const OP: &str = EscrowApproveOperation::NAME;
    let key = (op.from.clone(), op.escrow_id);
    let escrow = ctx.state.escrows.require(&key)?.clone();
    check_parties(OP, &escrow, &op.to, &op.agent)?;
    ensure_eval!(
        escrow.ratification_deadline >= ctx.now(),
        OP,
        "the escrow ratification deadline has passed, escrow can no longer be ratified"
    );

    let mut to_approved = escrow.to_approved;
    let mut agent_approved = escrow.agent_approved;
    if op.who == op.to {
        ensure_eval!(!escrow.to_approved, OP, "account 'to' ({}) has already approved the escrow", op.to);
        to_approved |= op.approve;
    }
    if op.who == op.agent {
        ensure_eval!(
            !escrow.agent_approved,
            OP,
            "account 'agent' ({}) has already approved the escrow",
            op.agent
        );
        agent_approved |= op.approve;
    }

    if !op.approve {
        ctx.state.escrows.remove(&key)?;
        adjust_balance(ctx.state, &op.from, escrow.liquid_balance + escrow.pending_fee)?;
        debug!(from = %op.from, escrow_id = op.escrow_id, who = %op.who, "escrow rejected");
        return Ok(());
    }

    let fully_approved = to_approved && agent_approved;
    ctx.state.escrows.modify(&key, |e| {
        e.to_approved = to_approved;
        e.agent_approved = agent_approved;
        if fully_approved {
            e.pending_fee = Asset::liquid(0);
        }
    })?;
    if fully_approved {
        adjust_balance(ctx.state, &op.agent, escrow.pending_fee)?;
    }
    Ok(())
}

pub fn escrow_dispute(ctx: &mut ApplyContext<'_>, op: &EscrowDisputeOperation) -> EvalResult<()> {
    const OP: &str = EscrowDisputeOperation::NAME;
    ctx.state.account(&op.from)?;
    let key = (op.from.clone(), op.escrow_id);
    let escrow = ctx.state.escrows.require(&key)?;
    ensure_eval!(
        ctx.state.head_block_time() < escrow.escrow_expiration,
        OP,
        "disputing the escrow must happen before expiration"
    );
    ensure_eval!(
        escrow.is_approved(),
        OP,
        "the escrow must be approved by all parties before a dispute can be raised"
    );
    ensure_eval!(!escrow.disputed, OP, "the escrow is already under dispute");
    check_parties(OP, escrow, &op.to, &op.agent)?;

    ctx.state.escrows.modify(&key, |e| e.disputed = true)?;
    debug!(from = %op.from, escrow_id = op.escrow_id, who = %op.who, "escrow disputed");
    Ok(())
}

pub fn escrow_release(ctx: &mut ApplyContext<'_>, op: &EscrowReleaseOperation) -> EvalResult<()> {
    const OP: &str = EscrowReleaseOperation::NAME;
    ctx.state.account(&op.from)?;
    let key = (op.from.clone(), op.escrow_id);
    let escrow = ctx.state.escrows.require(&key)?.clone();
    ensure_eval!(
        escrow.liquid_balance.amount >= op.amount.amount,
        OP,
        "release amount exceeds escrow balance: amount {}, balance {}",
        op.amount,
        escrow.liquid_balance
    );
    check_parties(OP, &escrow, &op.to, &op.agent)?;
    ensure_eval!(
        op.receiver == escrow.from || op.receiver == escrow.to,
        OP,
        "funds must be released to 'from' ({}) or 'to' ({})",
        escrow.from,
        escrow.to
    );
    ensure_eval!(
        escrow.is_approved(),
        OP,
        "funds cannot be released prior to escrow approval"
    );

    if escrow.disputed {
        ensure_eval!(
            op.who == escrow.agent,
            OP,
            "only 'agent' ({}) can release funds in a disputed escrow",
            escrow.agent
        );
    } else {
        ensure_eval!(
            op.who == escrow.from || op.who == escrow.to,
            OP,
            "only 'from' ({}) and 'to' ({}) can release funds from a non-disputed escrow",
            escrow.from,
            escrow.to
        );
        // Before expiration each party may only release to the other.
        if escrow.escrow_expiration > ctx.now() {
            if op.who == escrow.from {
                ensure_eval!(
                    op.receiver == escrow.to,
                    OP,
                    "only 'from' ({}) can release funds to 'to' ({})",
                    escrow.from,
                    escrow.to
                );
            } else {
                ensure_eval!(
                    op.receiver == escrow.from,
                    OP,
                    "only 'to' ({}) can release funds to 'from' ({})",
                    escrow.to,
                    escrow.from
                );
            }
        }
    }

    adjust_balance(ctx.state, &op.receiver, op.amount)?;
    let remaining = escrow.liquid_balance - op.amount;
    if remaining.amount == 0 {
        ctx.state.escrows.remove(&key)?;
    } else {
        ctx.state.escrows.modify(&key, |e| e.liquid_balance = remaining)?;
    }
    debug!(
        from = %op.from,
        escrow_id = op.escrow_id,
        receiver = %op.receiver,
        amount = %op.amount,
        "escrow released"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    const ID: u32 = 7;

    fn open(f: &mut Fixture) {
        let now = f.state.head_block_time();
        escrow_transfer(
            &mut f.ctx(),
            &EscrowTransferOperation {
                from: "alice".into(),
                to: "bob".into(),
                agent: "carol".into(),
                escrow_id: ID,
                amount: Asset::liquid(1_000),
                fee: Asset::liquid(10),
                ratification_deadline: now + 3_600,
                escrow_expiration: now + 7_200,
                json_meta: String::new(),
            },
        )
        .unwrap();
    }

    fn approve(f: &mut Fixture, who: &str, approve: bool) -> EvalResult<()> {
        escrow_approve(
            &mut f.ctx(),
            &EscrowApproveOperation {
                from: "alice".into(),
                to: "bob".into(),
                agent: "carol".into(),
                who: who.into(),
                escrow_id: ID,
                approve,
            },
        )
    }

    fn release(f: &mut Fixture, who: &str, receiver: &str, amount: i64) -> EvalResult<()> {
        escrow_release(
            &mut f.ctx(),
            &EscrowReleaseOperation {
                from: "alice".into(),
                to: "bob".into(),
                agent: "carol".into(),
                who: who.into(),
                receiver: receiver.into(),
                escrow_id: ID,
                amount: Asset::liquid(amount),
            },
        )
    }

    fn dispute(f: &mut Fixture, who: &str) -> EvalResult<()> {
        escrow_dispute(
            &mut f.ctx(),
            &EscrowDisputeOperation {
                from: "alice".into(),
                to: "bob".into(),
                agent: "carol".into(),
                who: who.into(),
                escrow_id: ID,
            },
        )
    }

    fn balance(f: &Fixture, name: &str) -> i64 {
        f.state.account(name).unwrap().balance.amount
    }

    #[test]
    fn test_transfer_holds_amount_and_fee() {
        let mut f = Fixture::new();
        open(&mut f);
        assert_eq!(balance(&f, "alice"), 100_000 - 1_010);
        let e = f.state.escrows.get(&(AccountName::from("alice"), ID)).unwrap();
        assert_eq!(e.liquid_balance.amount, 1_000);
        assert_eq!(e.pending_fee.amount, 10);
    }

    #[test]
    fn test_rejection_refunds_sender() {
        let mut f = Fixture::new();
        open(&mut f);
        approve(&mut f, "bob", true).unwrap();
        approve(&mut f, "carol", false).unwrap();
        assert!(f.state.escrows.is_empty());
        assert_eq!(balance(&f, "alice"), 100_000);
    }

    #[test]
    fn test_full_approval_pays_agent() {
        let mut f = Fixture::new();
        open(&mut f);
        approve(&mut f, "bob", true).unwrap();
        assert_eq!(balance(&f, "carol"), 100_000);
        assert!(approve(&mut f, "bob", true).is_err());
        approve(&mut f, "carol", true).unwrap();
        assert_eq!(balance(&f, "carol"), 100_010);
        let e = f.state.escrows.get(&(AccountName::from("alice"), ID)).unwrap();
        assert!(e.is_approved());
        assert_eq!(e.pending_fee.amount, 0);
    }

    #[test]
    fn test_release_rules_before_expiration() {
        let mut f = Fixture::new();
        open(&mut f);
        assert!(release(&mut f, "alice", "bob", 100).is_err(), "not approved yet");
        approve(&mut f, "bob", true).unwrap();
        approve(&mut f, "carol", true).unwrap();

        assert!(release(&mut f, "alice", "alice", 100).is_err());
        assert!(release(&mut f, "carol", "bob", 100).is_err());
        release(&mut f, "alice", "bob", 400).unwrap();
        release(&mut f, "bob", "alice", 600).unwrap();
        assert!(f.state.escrows.is_empty());
        assert_eq!(balance(&f, "bob"), 100_400);
        assert_eq!(balance(&f, "alice"), 100_000 - 1_010 + 600);
    }

    #[test]
    fn test_dispute_hands_release_to_agent() {
        let mut f = Fixture::new();
        open(&mut f);
        assert!(dispute(&mut f, "alice").is_err());
        approve(&mut f, "bob", true).unwrap();
        approve(&mut f, "carol", true).unwrap();
        dispute(&mut f, "alice").unwrap();
        assert!(dispute(&mut f, "bob").is_err());

        assert!(release(&mut f, "bob", "alice", 100).is_err());
        release(&mut f, "carol", "alice", 1_000).unwrap();
        assert_eq!(balance(&f, "alice"), 100_000 - 10);
    }

    #[test]
    fn test_after_expiration_either_party_releases_anywhere() {
        let mut f = Fixture::new();
        open(&mut f);
        approve(&mut f, "bob", true).unwrap();
        approve(&mut f, "carol", true).unwrap();
        f.advance(7_200);
        release(&mut f, "alice", "alice", 1_000).unwrap();
        assert!(f.state.escrows.is_empty());
    }
}
