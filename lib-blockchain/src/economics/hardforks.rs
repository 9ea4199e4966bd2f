//! Hardfork activation.
//!
//! The ledger moves through hardforks `0, 1, 2, ...` one at a time. A
//! hardfork becomes due when the witnesses have agreed on a later version
//! and its agreed time has passed. Each activation applies fixed state
//! changes, emits a `hardfork` virtual operation and records the activation
//! time in `processed_hardforks`.
//!
//! # Invariants
//!
//! - `processed_hardforks.len() == last_hardfork + 1`
//! - Hardfork `n` is only applied directly after `n - 1`

use tracing::{info, warn};

use crate::execution::context::ApplyContext;
use crate::execution::errors::{BlockApplyError, BlockApplyResult, EvalResult};
use crate::protocol::constants::*;
use crate::protocol::VirtualOperation;

fn step(source: crate::execution::errors::EvalError) -> BlockApplyError {
    BlockApplyError::Processing {
        step: "hardfork",
        source,
    }
}

/// Applies every hardfork the witnesses have scheduled for now or earlier.
pub fn process_hardforks(ctx: &mut ApplyContext<'_>) -> BlockApplyResult<()> {
    loop {
        let hardforks = ctx.state.hardforks.get();
        let last = hardforks.last_hardfork;
        if ctx.hardforks.version(last) >= hardforks.next_hardfork
            || hardforks.next_hardfork_time > ctx.now()
        {
            return Ok(());
        }
        if last >= NUM_HARDFORKS {
            warn!(
                next_hardfork = %hardforks.next_hardfork,
                "witnesses scheduled a hardfork this node does not know"
            );
            return Ok(());
        }
        apply_hardfork(ctx, last + 1)?;
    }
}

/// Schedules hardforks up to `hardfork` at head time, applying each one
/// immediately when `apply_now` is set. Used on the first block of a chain
/// whose configured hardfork times are already in the past.
pub fn set_hardfork(ctx: &mut ApplyContext<'_>, hardfork: u32, apply_now: bool) -> BlockApplyResult<()> {
    let first = ctx.state.hardforks.last_hardfork + 1;
    for n in first..=hardfork.min(NUM_HARDFORKS) {
        let version = ctx.hardforks.version(n);
        let now = ctx.now();
        ctx.state.hardforks.modify(|h| {
            h.next_hardfork = version;
            h.next_hardfork_time = now;
        });
        if apply_now {
            apply_hardfork(ctx, n)?;
        }
    }
    Ok(())
}

pub fn apply_hardfork(ctx: &mut ApplyContext<'_>, hardfork: u32) -> BlockApplyResult<()> {
    let expected = ctx.state.hardforks.last_hardfork + 1;
    if hardfork != expected || ctx.state.hardforks.processed_hardforks.len() != hardfork as usize {
        return Err(BlockApplyError::HardforkOutOfOrder {
            expected,
            actual: hardfork,
        });
    }
    info!(hardfork, block_num = ctx.block_num, "applying hardfork");

    let note = ctx
        .pre_virtual_operation(VirtualOperation::Hardfork { hardfork_id: hardfork })
        .map_err(step)?;
    apply_effects(ctx, hardfork).map_err(step)?;

    let time = ctx.hardforks.time(hardfork);
    let version = ctx.hardforks.version(hardfork);
    ctx.state.hardforks.modify(|h| {
        h.processed_hardforks.push(time);
        h.last_hardfork = hardfork;
        h.current_hardfork_version = version;
    });
    ctx.post_virtual_operation(note).map_err(step)
}

fn apply_effects(ctx: &mut ApplyContext<'_>, hardfork: u32) -> EvalResult<()> {
    match hardfork {
        HARDFORK_1 => {
            ctx.state
                .reward_funds
                .modify(&POST_REWARD_FUND_ID, |f| f.recent_claims = HF1_RECENT_CLAIMS)?;
        }
        HARDFORK_4 => {
            ctx.state
                .reward_funds
                .modify(&POST_REWARD_FUND_ID, |f| f.content_constant = REWARD_CONSTANT_HF4)?;
        }
        HARDFORK_6 => {
            ctx.state
                .reward_funds
                .modify(&POST_REWARD_FUND_ID, |f| f.content_constant = REWARD_CONSTANT_HF6)?;
        }
        // Rule changes only; evaluators check `has_hardfork`.
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::test_support::*;

    #[test]
    fn test_set_hardfork_applies_each_in_order() {
        let mut f = Fixture::new();
        set_hardfork(&mut f.ctx(), HARDFORK_4, true).unwrap();

        let hf = f.state.hardforks.get();
        assert_eq!(hf.last_hardfork, HARDFORK_4);
        assert_eq!(hf.processed_hardforks.len(), 5);
        assert_eq!(hf.current_hardfork_version, f.hardforks.version(HARDFORK_4));
        let fund = f.state.reward_funds.get(&POST_REWARD_FUND_ID).unwrap();
        assert_eq!(fund.recent_claims, HF1_RECENT_CLAIMS);
        assert_eq!(fund.content_constant, REWARD_CONSTANT_HF4);
    }

    #[test]
    fn test_skipping_a_hardfork_is_rejected() {
        let mut f = Fixture::new();
        let err = apply_hardfork(&mut f.ctx(), HARDFORK_4).unwrap_err();
        assert!(matches!(
            err,
            BlockApplyError::HardforkOutOfOrder { expected: 1, actual: 4 }
        ));
        assert_eq!(f.state.hardforks.last_hardfork, 0);
    }

    #[test]
    fn test_process_hardforks_waits_for_a_scheduled_version() {
        let mut f = Fixture::new();
        process_hardforks(&mut f.ctx()).unwrap();
        assert_eq!(f.state.hardforks.last_hardfork, 0);

        let next = f.hardforks.version(HARDFORK_1);
        let now = f.state.head_block_time();
        f.state.hardforks.modify(|h| {
            h.next_hardfork = next;
            h.next_hardfork_time = now;
        });
        process_hardforks(&mut f.ctx()).unwrap();
        assert_eq!(f.state.hardforks.last_hardfork, HARDFORK_1);
    }
}
