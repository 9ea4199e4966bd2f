//! Reward curves and the rshares-to-tokens conversion.
//!
//! All curve math is on `u128` with wrapping multiplication, so results
//! match a fixed-width reference for inputs near the top of the range.

use serde::{Deserialize, Serialize};

use crate::protocol::constants::{MIN_PAYOUT, PERCENT_100};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveId {
    /// `(r + s)^2 - s^2`
    Quadratic,
    /// `(r << 64) / (r + 2s)`
    BoundedCuration,
    Linear,
    SquareRoot,
    /// `((r + s)^2 - s^2) / (r + 4s)`
    ConvergentLinear,
    /// `r / sqrt(r + 2s)`
    ConvergentSquareRoot,
}

/// Bit-manipulation square root: exact exponent, linearly interpolated
/// mantissa.
pub fn approx_sqrt(x: u128) -> u128 {
    if x == 0 {
        return 0;
    }
    let msb_x = 127 - x.leading_zeros();
    let msb_z = msb_x >> 1;
    let msb_x_bit = 1u128 << msb_x;
    let msb_z_bit = 1u128 << msb_z;
    let mantissa_x = x & (msb_x_bit - 1);
    let mantissa_z_hi = if msb_x & 1 == 1 { msb_z_bit } else { 0 };
    let mantissa_z_lo = mantissa_x >> (msb_x - msb_z);
    let mantissa_z = (mantissa_z_hi | mantissa_z_lo) >> 1;
    msb_z_bit | mantissa_z
}

pub fn evaluate_reward_curve(rshares: u128, curve: CurveId, content_constant: u128) -> u128 {
    let s = content_constant;
    match curve {
        CurveId::Quadratic => {
            let r_plus_s = rshares.wrapping_add(s);
            r_plus_s
                .wrapping_mul(r_plus_s)
                .wrapping_sub(s.wrapping_mul(s))
        }
        CurveId::BoundedCuration => {
            let shifted = (rshares as u64 as u128) << 64;
            let denom = s.wrapping_mul(2).wrapping_add(rshares);
            if denom == 0 {
                0
            } else {
                shifted / denom
            }
        }
        CurveId::Linear => rshares,
        CurveId::SquareRoot => approx_sqrt(rshares),
        CurveId::ConvergentLinear => {
            let r_plus_s = rshares.wrapping_add(s);
            let num = r_plus_s
                .wrapping_mul(r_plus_s)
                .wrapping_sub(s.wrapping_mul(s));
            let denom = rshares.wrapping_add(s.wrapping_mul(4));
            if denom == 0 {
                0
            } else {
                num / denom
            }
        }
        CurveId::ConvergentSquareRoot => {
            let root = approx_sqrt(rshares.wrapping_add(s.wrapping_mul(2)));
            if root == 0 {
                0
            } else {
                rshares / root
            }
        }
    }
}

// =============================================================================
// 256-BIT MULTIPLY-DIVIDE
// =============================================================================

/// Full 256-bit product of two `u128`s as `(hi, lo)`.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);

    let lo_lo = a_lo * b_lo;
    let hi_lo = a_hi * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_hi = a_hi * b_hi;

    let cross = (lo_lo >> 64) + (hi_lo & MASK) + (lo_hi & MASK);
    let lo = (cross << 64) | (lo_lo & MASK);
    let hi = hi_hi + (hi_lo >> 64) + (lo_hi >> 64) + (cross >> 64);
    (hi, lo)
}

/// `a * b / d` with a 256-bit intermediate. `None` when `d` is zero or the
/// quotient does not fit in 128 bits.
pub fn mul_div(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    let (hi, lo) = widening_mul(a, b);
    if hi == 0 {
        return Some(lo / d);
    }
    if hi >= d {
        return None;
    }
    // Restoring division, one bit at a time over the low word.
    let mut rem = hi;
    let mut quot = 0u128;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        quot <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1;
        }
    }
    Some(quot)
}

// =============================================================================
// RSHARE REWARD
// =============================================================================

/// Inputs for converting a comment's rshares into a token payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRewardContext {
    pub rshares: i64,
    pub reward_weight: u16,
    /// Liquid cap on the payout.
    pub max_payout: i64,
    pub total_reward_shares2: u128,
    pub total_reward_fund: i64,
    pub reward_curve: CurveId,
    pub content_constant: u128,
}

pub fn is_comment_payout_dust(payout: u64) -> bool {
    (payout as i64) < MIN_PAYOUT
}

/// Token payout for `ctx.rshares`. Dust payouts are zero.
pub fn get_rshare_reward(ctx: &CommentRewardContext) -> Option<u64> {
    if ctx.rshares <= 0 || ctx.total_reward_shares2 == 0 {
        return None;
    }
    let claim = evaluate_reward_curve(ctx.rshares as u128, ctx.reward_curve, ctx.content_constant);
    let claim = mul_div(claim, ctx.reward_weight as u128, PERCENT_100 as u128)?;
    let payout = mul_div(
        ctx.total_reward_fund.max(0) as u128,
        claim,
        ctx.total_reward_shares2,
    )?;
    if payout > i64::MAX as u128 {
        return None;
    }
    let mut payout = payout as u64;
    if is_comment_payout_dust(payout) {
        payout = 0;
    }
    Some(payout.min(ctx.max_payout.max(0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_approx_sqrt_exact_on_powers_of_four() {
        assert_eq!(approx_sqrt(0), 0);
        assert_eq!(approx_sqrt(1), 1);
        assert_eq!(approx_sqrt(16), 4);
        assert_eq!(approx_sqrt(1 << 40), 1 << 20);
    }

    #[test]
    fn test_quadratic_curve() {
        assert_eq!(evaluate_reward_curve(10, CurveId::Quadratic, 5), 15 * 15 - 25);
        assert_eq!(evaluate_reward_curve(0, CurveId::Quadratic, 5), 0);
    }

    #[test]
    fn test_mul_div_exceeds_128_bits() {
        let a = u128::MAX / 3;
        assert_eq!(mul_div(a, 6, 2), Some(a * 3));
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX), Some(u128::MAX));
        assert_eq!(mul_div(u128::MAX, 2, 1), None);
        assert_eq!(mul_div(1, 1, 0), None);
    }

    #[test]
    fn test_rshare_reward_dust_and_cap() {
        let mut ctx = CommentRewardContext {
            rshares: 1_000,
            reward_weight: PERCENT_100,
            max_payout: 1_000_000,
            total_reward_shares2: 1_000,
            total_reward_fund: 10_000,
            reward_curve: CurveId::Linear,
            content_constant: 0,
        };
        assert_eq!(get_rshare_reward(&ctx), Some(10_000));

        ctx.max_payout = 500;
        assert_eq!(get_rshare_reward(&ctx), Some(500));

        ctx.total_reward_shares2 = 1_000_000;
        assert_eq!(get_rshare_reward(&ctx), Some(0), "10 tokens is dust");
    }

    proptest! {
        #[test]
        fn prop_linear_and_sqrt_are_monotonic(a in 0u64..u64::MAX / 2, d in 0u64..1_000_000) {
            let a = a as u128;
            let b = a + d as u128;
            prop_assert!(evaluate_reward_curve(a, CurveId::Linear, 0) <= evaluate_reward_curve(b, CurveId::Linear, 0));
            prop_assert!(approx_sqrt(a) <= approx_sqrt(b));
        }

        #[test]
        fn prop_convergent_linear_is_monotonic(a in 0u64..1_000_000_000_000, d in 0u64..1_000_000_000) {
            let s = 2_000_000_000_000u128;
            let a = a as u128;
            let b = a + d as u128;
            prop_assert!(
                evaluate_reward_curve(a, CurveId::ConvergentLinear, s)
                    <= evaluate_reward_curve(b, CurveId::ConvergentLinear, s)
            );
        }

        #[test]
        fn prop_mul_div_matches_native(a in any::<u64>(), b in any::<u64>(), d in 1u64..) {
            let expected = (a as u128) * (b as u128) / (d as u128);
            prop_assert_eq!(mul_div(a as u128, b as u128, d as u128), Some(expected));
        }
    }
}
