//! Custom data operations.
//!
//! The engine only bounds their size and signer count; the payload is left
//! to listeners, which see it through the operation notifications. Size
//! limits apply while producing, so blocks already accepted with larger
//! payloads still replay.

use crate::ensure_eval;
use crate::execution::context::ApplyContext;
use crate::execution::errors::EvalResult;
use crate::protocol::constants::{CUSTOM_OP_DATA_MAX_LENGTH, MAX_AUTHORITY_MEMBERSHIP};
use crate::protocol::operations::{
    CustomBinaryOperation, CustomJsonOperation, CustomOperation, OperationBody,
};

fn check_membership(op: &'static str, n: usize) -> EvalResult<()> {
    ensure_eval!(
        n <= MAX_AUTHORITY_MEMBERSHIP,
        op,
        "authority membership exceeded: max {MAX_AUTHORITY_MEMBERSHIP}, current {n}"
    );
    Ok(())
}

fn check_data_len(ctx: &ApplyContext<'_>, op: &'static str, len: usize) -> EvalResult<()> {
    if ctx.is_producing {
        ensure_eval!(
            len <= CUSTOM_OP_DATA_MAX_LENGTH,
            op,
            "operation data must be less than {CUSTOM_OP_DATA_MAX_LENGTH} bytes"
        );
    }
    Ok(())
}

pub fn custom(ctx: &mut ApplyContext<'_>, op: &CustomOperation) -> EvalResult<()> {
    check_data_len(ctx, CustomOperation::NAME, op.data.len())?;
    check_membership(CustomOperation::NAME, op.required_auths.len())
}

pub fn custom_json(ctx: &mut ApplyContext<'_>, op: &CustomJsonOperation) -> EvalResult<()> {
    check_data_len(ctx, CustomJsonOperation::NAME, op.json.len())?;
    check_membership(
        CustomJsonOperation::NAME,
        op.required_auths.len() + op.required_posting_auths.len(),
    )
}

/// Deprecated: rejected in new blocks, accepted on replay.
pub fn custom_binary(ctx: &mut ApplyContext<'_>, op: &CustomBinaryOperation) -> EvalResult<()> {
    const OP: &str = CustomBinaryOperation::NAME;
    if ctx.is_producing {
        check_data_len(ctx, OP, op.data.len())?;
        ensure_eval!(false, OP, "custom_binary_operation is deprecated");
    }
    let n = op.required_owner_auths.len()
        + op.required_active_auths.len()
        + op.required_posting_auths.len()
        + op.required_auths.iter().map(|a| a.num_auths()).sum::<usize>();
    check_membership(OP, n)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::protocol::AccountName;
    use std::collections::BTreeSet;

    fn signers(n: usize) -> BTreeSet<AccountName> {
        (0..n).map(|i| AccountName::from(format!("user{i:03}"))).collect()
    }

    #[test]
    fn test_custom_data_limit_only_when_producing() {
        let mut f = Fixture::new();
        let op = CustomOperation {
            required_auths: signers(1),
            id: 1,
            data: vec![0; CUSTOM_OP_DATA_MAX_LENGTH + 1],
        };
        custom(&mut f.ctx(), &op).unwrap();

        let mut ctx = f.ctx();
        ctx.is_producing = true;
        assert!(custom(&mut ctx, &op).is_err());
    }

    #[test]
    fn test_custom_json_membership_limit() {
        let mut f = Fixture::new();
        let mut op = CustomJsonOperation {
            required_auths: signers(MAX_AUTHORITY_MEMBERSHIP),
            required_posting_auths: BTreeSet::new(),
            id: "follow".into(),
            json: "{}".into(),
        };
        custom_json(&mut f.ctx(), &op).unwrap();
        op.required_posting_auths.insert("bob".into());
        assert!(custom_json(&mut f.ctx(), &op).is_err());
    }

    #[test]
    fn test_custom_binary_rejected_when_producing() {
        let mut f = Fixture::new();
        let op = CustomBinaryOperation {
            required_owner_auths: BTreeSet::new(),
            required_active_auths: signers(1),
            required_posting_auths: BTreeSet::new(),
            required_auths: Vec::new(),
            id: "legacy".into(),
            data: vec![1, 2, 3],
        };
        custom_binary(&mut f.ctx(), &op).unwrap();
        let mut ctx = f.ctx();
        ctx.is_producing = true;
        assert!(custom_binary(&mut ctx, &op).is_err());
    }
}
