//! Economic Policy Module
//!
//! Everything the chain does on its own every block: minting and
//! distributing inflation, paying out comments, processing power-downs,
//! rescheduling witnesses, running time-driven sweeps, paying proposals and
//! activating hardforks.
//!
//! # Design Principles
//!
//! - **Integer only**: all share math is fixed point with 128-bit
//!   intermediates; division truncates toward zero
//! - **Explicit remainders**: proportional splits multiply then divide and
//!   leave the remainder with a named party
//! - **Audited**: every payout emits a virtual operation
//!
//! The end-of-block order lives in `execution::block_apply`.

pub mod cashout;
pub mod curves;
pub mod hardforks;
pub mod inflation;
pub mod manabar;
pub mod proposals;
pub mod resource_dynamics;
pub mod supply;
pub mod sweeps;
pub mod vesting;
pub mod witness_schedule;

pub use curves::{evaluate_reward_curve, get_rshare_reward, CommentRewardContext, CurveId};
pub use manabar::{Manabar, ManabarParams};
pub use resource_dynamics::{rd_apply, RdDynamicsParams};
pub use witness_schedule::{get_scheduled_witness, get_slot_at_time, get_slot_time};
