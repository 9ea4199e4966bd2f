//! Regenerating mana buckets.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manabar {
    pub current_mana: i64,
    pub last_update_time: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManabarParams {
    pub max_mana: i64,
    pub regen_time: u32,
}

impl Manabar {
    pub fn new(current_mana: i64, last_update_time: u32) -> Self {
        Self {
            current_mana,
            last_update_time,
        }
    }

    /// Refills linearly: a full bar takes `regen_time` seconds. Never goes
    /// past `max_mana`, and a bar already above it is clamped down.
    pub fn regenerate(&mut self, params: ManabarParams, now: u32) {
        let dt = now.saturating_sub(self.last_update_time);
        if self.current_mana >= params.max_mana || params.regen_time == 0 {
            self.current_mana = self.current_mana.min(params.max_mana);
            self.last_update_time = now;
            return;
        }
        let dt = dt.min(params.regen_time);
        let max_mana = params.max_mana.max(0) as u128;
        let regen = (max_mana * dt as u128 / params.regen_time as u128) as i64;
        self.current_mana = self.current_mana.saturating_add(regen).min(params.max_mana);
        self.last_update_time = now;
    }

    pub fn has_mana(&self, needed: i64) -> bool {
        needed <= 0 || self.current_mana >= needed
    }

    pub fn use_mana(&mut self, used: i64) {
        self.current_mana -= used;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PARAMS: ManabarParams = ManabarParams {
        max_mana: 1_000_000,
        regen_time: 100,
    };

    #[test]
    fn test_regenerates_linearly() {
        let mut bar = Manabar::new(0, 0);
        bar.regenerate(PARAMS, 25);
        assert_eq!(bar.current_mana, 250_000);
        bar.regenerate(PARAMS, 1_000);
        assert_eq!(bar.current_mana, 1_000_000);
        assert_eq!(bar.last_update_time, 1_000);
    }

    #[test]
    fn test_clamps_when_max_drops() {
        let mut bar = Manabar::new(900, 0);
        bar.regenerate(ManabarParams { max_mana: 500, regen_time: 100 }, 1);
        assert_eq!(bar.current_mana, 500);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_max(start in 0i64..2_000_000, dt in 0u32..10_000, max in 0i64..2_000_000) {
            let params = ManabarParams { max_mana: max, regen_time: 100 };
            let mut bar = Manabar::new(start, 0);
            bar.regenerate(params, dt);
            prop_assert!(bar.current_mana <= max.max(start.min(max)));
            prop_assert!(bar.current_mana >= start.min(max));
        }
    }
}
