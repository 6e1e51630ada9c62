//! Stat/skill checks.
//!
//! A [`Check`] describes everything that goes into one roll: the stat and
//! skill values feeding the pool, how many dice are kept, the difficulty,
//! and the post-roll adjustments. Callers look up values on their own
//! characters and hand plain numbers in; this crate never sees a name.
//!
//! # Keep rules
//!
//! The keep count starts at [`DEFAULT_KEEP`]. With `stat_keep` the stat
//! total is added. With `skill_keep` (on by default) and exactly one
//! non-zero stat, the count is reset to `1 + stat / 2`, then the skill total
//! is added. A keep override replaces all of that, and bonus keep is added
//! last.
//!
//! # Result
//!
//! `sum(kept) / divisor`, multiplied by a crit (before the difficulty is
//! subtracted when the difficulty is positive, after it otherwise), minus
//! difficulty, plus the flat modifier. Non-negative results succeed.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::crit::CritChance;
use crate::pool::{DicePool, PoolRoll};

/// Dice kept by a check with no stat or skill influence.
pub const DEFAULT_KEEP: u32 = 2;

/// A fully specified stat/skill check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    /// Value of each stat involved.
    pub stats: Vec<u32>,
    /// Value of each skill involved.
    pub skills: Vec<u32>,
    /// Subtracted from the kept sum.
    pub difficulty: i32,
    /// Add the stat total to the keep count.
    pub stat_keep: bool,
    /// Let skills drive the keep count.
    pub skill_keep: bool,
    /// Replaces the computed keep count when set.
    pub keep_override: Option<u32>,
    /// Added to the keep count after everything else.
    pub bonus_keep: u32,
    /// Extra dice added to the pool.
    pub bonus_dice: u32,
    /// The kept sum is integer-divided by this (zero is treated as one).
    pub divisor: u32,
    /// Added after crit and difficulty.
    pub flat_modifier: i32,
    /// `None` makes the check uncrittable.
    pub crit: Option<CritChance>,
}

impl Check {
    /// Creates an empty check at the given difficulty.
    #[must_use]
    pub fn new(difficulty: i32) -> Self {
        Self {
            stats: Vec::new(),
            skills: Vec::new(),
            difficulty,
            stat_keep: false,
            skill_keep: true,
            keep_override: None,
            bonus_keep: 0,
            bonus_dice: 0,
            divisor: 1,
            flat_modifier: 0,
            crit: Some(CritChance::default()),
        }
    }

    /// Adds a stat value to the pool.
    #[must_use]
    pub fn stat(mut self, value: u32) -> Self {
        self.stats.push(value);
        self
    }

    /// Adds a skill value to the pool.
    #[must_use]
    pub fn skill(mut self, value: u32) -> Self {
        self.skills.push(value);
        self
    }

    /// Adds the stat total to the keep count.
    #[must_use]
    pub fn with_stat_keep(mut self) -> Self {
        self.stat_keep = true;
        self
    }

    /// Stops skills from driving the keep count.
    #[must_use]
    pub fn without_skill_keep(mut self) -> Self {
        self.skill_keep = false;
        self
    }

    /// Forces the keep count.
    #[must_use]
    pub fn keep(mut self, keep: u32) -> Self {
        self.keep_override = Some(keep);
        self
    }

    /// Adds extra dice to the pool.
    #[must_use]
    pub fn bonus_dice(mut self, dice: u32) -> Self {
        self.bonus_dice = dice;
        self
    }

    /// Adds extra kept dice.
    #[must_use]
    pub fn bonus_keep(mut self, keep: u32) -> Self {
        self.bonus_keep = keep;
        self
    }

    /// Divides the kept sum.
    #[must_use]
    pub fn divisor(mut self, divisor: u32) -> Self {
        self.divisor = divisor;
        self
    }

    /// Adds a flat modifier after crit and difficulty.
    #[must_use]
    pub fn flat(mut self, modifier: i32) -> Self {
        self.flat_modifier = modifier;
        self
    }

    /// Uses a character's own crit bonuses.
    #[must_use]
    pub fn crit_chance(mut self, crit: CritChance) -> Self {
        self.crit = Some(crit);
        self
    }

    /// Disables critical multipliers.
    #[must_use]
    pub fn uncrittable(mut self) -> Self {
        self.crit = None;
        self
    }

    /// Sum of all stat values.
    #[must_use]
    pub fn stat_total(&self) -> u32 {
        self.stats.iter().sum()
    }

    /// Sum of all skill values.
    #[must_use]
    pub fn skill_total(&self) -> u32 {
        self.skills.iter().sum()
    }

    /// Number of dice rolled.
    #[must_use]
    pub fn pool_size(&self) -> u32 {
        self.stat_total() + self.skill_total() + self.bonus_dice
    }

    /// Number of dice kept.
    #[must_use]
    pub fn keep_count(&self) -> u32 {
        let stat_total = self.stat_total();
        let mut keep = DEFAULT_KEEP;
        if self.stat_keep {
            keep += stat_total;
        }
        if self.skill_keep {
            if self.stats.len() == 1 && stat_total > 0 {
                keep = 1 + stat_total / 2;
            }
            keep += self.skill_total();
        }
        if let Some(forced) = self.keep_override.filter(|k| *k > 0) {
            keep = forced;
        }
        keep + self.bonus_keep
    }

    /// Rolls the check.
    #[allow(clippy::cast_possible_truncation)]
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> CheckOutcome {
        let pool = DicePool::new(self.pool_size(), self.keep_count()).roll(rng);
        let divisor = i32::try_from(self.divisor.max(1)).unwrap_or(i32::MAX);
        let mut result = pool.total() / divisor;

        let crit_mult = self.crit.map_or(1.0, |crit| crit.roll(rng));
        if self.difficulty > 0 {
            result = (f64::from(result) * crit_mult) as i32;
        }
        result -= self.difficulty;
        if self.difficulty <= 0 {
            result = (f64::from(result) * crit_mult) as i32;
        }
        result += self.flat_modifier;

        CheckOutcome {
            result,
            crit_mult,
            difficulty: self.difficulty,
            pool,
        }
    }
}

impl Default for Check {
    fn default() -> Self {
        Self::new(0)
    }
}

/// The outcome of a rolled [`Check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    result: i32,
    crit_mult: f64,
    difficulty: i32,
    pool: PoolRoll,
}

impl CheckOutcome {
    /// Margin over the difficulty; negative on failure.
    #[must_use]
    pub const fn result(&self) -> i32 {
        self.result
    }

    /// Whether the check met its difficulty.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result >= 0
    }

    /// Whether a critical multiplier landed.
    #[must_use]
    pub fn is_crit(&self) -> bool {
        self.crit_mult > 1.0
    }

    /// The multiplier applied (1.0 without a crit).
    #[must_use]
    pub const fn crit_mult(&self) -> f64 {
        self.crit_mult
    }

    /// The difficulty the check was made against.
    #[must_use]
    pub const fn difficulty(&self) -> i32 {
        self.difficulty
    }

    /// The underlying dice.
    #[must_use]
    pub const fn pool(&self) -> &PoolRoll {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    mod keep_tests {
        use super::*;

        #[test]
        fn default_keep_without_traits() {
            assert_eq!(Check::new(0).keep_count(), DEFAULT_KEEP);
        }

        #[test]
        fn single_stat_with_skill_keeps_half_stat_plus_skill() {
            // dexterity 4, dodge 3
            let check = Check::new(0).stat(4).skill(3);
            assert_eq!(check.keep_count(), 1 + 2 + 3);
            assert_eq!(check.pool_size(), 7);
        }

        #[test]
        fn two_stats_do_not_reset_keep() {
            // dexterity + composure for initiative
            let check = Check::new(0).stat(3).stat(2).with_stat_keep();
            assert_eq!(check.keep_count(), DEFAULT_KEEP + 5);
        }

        #[test]
        fn override_replaces_computed_keep() {
            let check = Check::new(0).stat(5).with_stat_keep().keep(3).bonus_dice(4);
            assert_eq!(check.keep_count(), 3);
            assert_eq!(check.pool_size(), 9);
        }

        #[test]
        fn bonus_keep_applies_after_override() {
            let check = Check::new(0).keep(3).bonus_keep(2);
            assert_eq!(check.keep_count(), 5);
        }

        #[test]
        fn skill_keep_disabled_ignores_skills() {
            let check = Check::new(0).stat(4).skill(3).without_skill_keep();
            assert_eq!(check.keep_count(), DEFAULT_KEEP);
        }
    }

    mod roll_tests {
        use super::*;

        #[test]
        fn empty_pool_fails_by_difficulty() {
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let outcome = Check::new(7).uncrittable().roll(&mut rng);
            assert_eq!(outcome.result(), -7);
            assert!(!outcome.is_success());
        }

        #[test]
        fn flat_modifier_is_added() {
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let outcome = Check::new(0).uncrittable().flat(4).roll(&mut rng);
            assert_eq!(outcome.result(), 4);
        }

        #[test]
        fn divisor_halves_the_sum() {
            let check = Check::new(0).stat(3).skill(3).uncrittable();
            let whole = check.roll(&mut ChaCha8Rng::seed_from_u64(42));
            let halved = check.clone().divisor(2).roll(&mut ChaCha8Rng::seed_from_u64(42));
            assert_eq!(halved.result(), whole.pool().total() / 2);
        }

        #[test]
        fn zero_divisor_behaves_like_one() {
            let check = Check::new(0).stat(2).uncrittable();
            let one = check.clone().divisor(1).roll(&mut ChaCha8Rng::seed_from_u64(8));
            let zero = check.divisor(0).roll(&mut ChaCha8Rng::seed_from_u64(8));
            assert_eq!(one.result(), zero.result());
        }

        #[test]
        fn uncrittable_never_crits() {
            let mut rng = ChaCha8Rng::seed_from_u64(5);
            let check = Check::new(3).stat(3).skill(2).uncrittable();
            for _ in 0..500 {
                assert!(!check.roll(&mut rng).is_crit());
            }
        }

        #[test]
        fn crits_occur_at_roughly_five_percent() {
            let mut rng = ChaCha8Rng::seed_from_u64(2024);
            let check = Check::new(3).stat(2);
            let crits = (0..4000).filter(|_| check.roll(&mut rng).is_crit()).count();
            assert!((100..=320).contains(&crits), "got {crits} crits");
        }
    }

    proptest! {
        #[test]
        fn uncrittable_result_is_sum_minus_difficulty(
            stat in 0u32..6,
            skill in 0u32..6,
            difficulty in -20i32..40,
            seed: u64,
        ) {
            let check = Check::new(difficulty).stat(stat).skill(skill).uncrittable();
            let outcome = check.roll(&mut ChaCha8Rng::seed_from_u64(seed));
            prop_assert_eq!(outcome.result(), outcome.pool().total() - difficulty);
        }

        #[test]
        fn crit_never_lowers_a_positive_difficulty_roll(
            stat in 1u32..6,
            difficulty in 1i32..30,
            seed: u64,
        ) {
            let check = Check::new(difficulty).stat(stat);
            let outcome = check.roll(&mut ChaCha8Rng::seed_from_u64(seed));
            prop_assert!(outcome.result() >= outcome.pool().total() - difficulty);
        }
    }
}
