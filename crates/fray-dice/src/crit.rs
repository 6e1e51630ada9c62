//! Critical multipliers.
//!
//! A check that can crit rolls a d100 alongside its pool. The bottom five
//! results (shifted upward by any bonus chance) multiply the check result,
//! with the best multiplier on the lowest roll.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Multipliers for the crit ladder, from the widest band to the narrowest.
const LADDER: [f64; 5] = [1.5, 1.75, 2.0, 2.25, 2.5];

/// A character's bonuses to the critical ladder.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CritChance {
    /// Added to every ladder threshold (percentage points).
    pub bonus_chance: u32,
    /// Added to the multiplier of any crit that lands.
    pub bonus_mult: f64,
}

impl CritChance {
    /// Creates a crit chance with the given bonuses.
    #[must_use]
    pub const fn new(bonus_chance: u32, bonus_mult: f64) -> Self {
        Self {
            bonus_chance,
            bonus_mult,
        }
    }

    /// Maps a d100 roll onto the ladder.
    ///
    /// ```
    /// use fray_dice::CritChance;
    ///
    /// let base = CritChance::default();
    /// assert_eq!(base.multiplier_for(6), 1.0);
    /// assert_eq!(base.multiplier_for(5), 1.5);
    /// assert_eq!(base.multiplier_for(1), 2.5);
    /// ```
    #[must_use]
    pub fn multiplier_for(&self, roll: u32) -> f64 {
        let chance = self.bonus_chance;
        if roll > 5 + chance {
            return 1.0;
        }
        // 5 + chance maps to the first rung, 1 + chance (and below) to the last.
        let rung = (5 + chance - roll).min(4) as usize;
        LADDER[rung] + self.bonus_mult
    }

    /// Rolls a d100 and returns the resulting multiplier.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.multiplier_for(rng.gen_range(1..=100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_rung_of_the_ladder() {
        let base = CritChance::default();
        let expected = [(5, 1.5), (4, 1.75), (3, 2.0), (2, 2.25), (1, 2.5)];
        for (roll, mult) in expected {
            assert!((base.multiplier_for(roll) - mult).abs() < f64::EPSILON);
        }
        assert!((base.multiplier_for(100) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bonus_chance_shifts_every_rung() {
        let lucky = CritChance::new(3, 0.0);
        assert!((lucky.multiplier_for(8) - 1.5).abs() < f64::EPSILON);
        assert!((lucky.multiplier_for(4) - 2.5).abs() < f64::EPSILON);
        assert!((lucky.multiplier_for(1) - 2.5).abs() < f64::EPSILON);
        assert!((lucky.multiplier_for(9) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bonus_mult_only_applies_to_crits() {
        let brutal = CritChance::new(0, 0.5);
        assert!((brutal.multiplier_for(50) - 1.0).abs() < f64::EPSILON);
        assert!((brutal.multiplier_for(5) - 2.0).abs() < f64::EPSILON);
    }
}
