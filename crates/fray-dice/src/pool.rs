//! Raw dice pools: roll N ten-sided dice, explode tens, keep the K highest.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Faces on every die in a pool.
pub const SIDES: u32 = 10;

/// A die showing at least this value rolls again and adds the new face.
pub const EXPLODE_ON: u32 = 10;

/// Hard stop on a single die's explosion chain.
///
/// A chain this long has a probability of 10^-64; the cap only exists so a
/// broken RNG cannot hang a fight.
const MAX_EXPLOSIONS: u32 = 64;

/// Rolls a single d10.
pub fn roll_die<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(1..=SIDES)
}

/// Rolls a single d10 and keeps adding rerolls while the face is a ten.
///
/// ```
/// use fray_dice::roll_exploding;
/// use rand::SeedableRng;
///
/// let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
/// let value = roll_exploding(&mut rng);
/// assert!(value >= 1);
/// assert!(value % 10 != 0); // a chain always ends on a non-ten face
/// ```
pub fn roll_exploding<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    let mut face = roll_die(rng);
    let mut total = face;
    let mut chain = 0;
    while face >= EXPLODE_ON && chain < MAX_EXPLOSIONS {
        face = roll_die(rng);
        total += face;
        chain += 1;
    }
    total
}

/// A pool of exploding d10s of which only the highest `keep` count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicePool {
    /// Number of dice rolled.
    pub dice: u32,
    /// Number of highest dice kept.
    pub keep: u32,
}

impl DicePool {
    /// Creates a pool of `dice` dice keeping the highest `keep`.
    #[must_use]
    pub const fn new(dice: u32, keep: u32) -> Self {
        Self { dice, keep }
    }

    /// Rolls the pool.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> PoolRoll {
        let mut faces: Vec<u32> = (0..self.dice).map(|_| roll_exploding(rng)).collect();
        faces.sort_unstable_by(|a, b| b.cmp(a));
        let kept = faces.len().min(self.keep as usize);
        PoolRoll { faces, kept }
    }
}

/// The faces of a rolled pool, highest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRoll {
    faces: Vec<u32>,
    kept: usize,
}

impl PoolRoll {
    /// Every die rolled, after explosions, sorted highest first.
    #[must_use]
    pub fn faces(&self) -> &[u32] {
        &self.faces
    }

    /// The dice that count toward the total.
    #[must_use]
    pub fn kept(&self) -> &[u32] {
        &self.faces[..self.kept]
    }

    /// Sum of the kept dice.
    #[must_use]
    pub fn total(&self) -> i32 {
        let sum: u32 = self.kept().iter().sum();
        i32::try_from(sum).unwrap_or(i32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    mod die_tests {
        use super::*;

        #[test]
        fn plain_die_stays_in_range() {
            let mut rng = ChaCha8Rng::seed_from_u64(3);
            for _ in 0..1000 {
                let face = roll_die(&mut rng);
                assert!((1..=SIDES).contains(&face));
            }
        }

        #[test]
        fn exploding_die_sometimes_exceeds_ten() {
            let mut rng = ChaCha8Rng::seed_from_u64(11);
            let exploded = (0..2000).any(|_| roll_exploding(&mut rng) > SIDES);
            assert!(exploded, "2000 rolls without a single ten is implausible");
        }
    }

    mod pool_tests {
        use super::*;

        #[test]
        fn empty_pool_totals_zero() {
            let mut rng = ChaCha8Rng::seed_from_u64(0);
            let roll = DicePool::new(0, 3).roll(&mut rng);
            assert!(roll.faces().is_empty());
            assert_eq!(roll.total(), 0);
        }

        #[test]
        fn keep_larger_than_pool_keeps_everything() {
            let mut rng = ChaCha8Rng::seed_from_u64(5);
            let roll = DicePool::new(3, 10).roll(&mut rng);
            assert_eq!(roll.kept().len(), 3);
            let sum: u32 = roll.faces().iter().sum();
            assert_eq!(roll.total(), i32::try_from(sum).unwrap());
        }

        #[test]
        fn same_seed_same_roll() {
            let pool = DicePool::new(8, 3);
            let a = pool.roll(&mut ChaCha8Rng::seed_from_u64(99));
            let b = pool.roll(&mut ChaCha8Rng::seed_from_u64(99));
            assert_eq!(a, b);
        }
    }

    proptest! {
        #[test]
        fn kept_dice_are_the_highest(dice in 0u32..30, keep in 0u32..12, seed: u64) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let roll = DicePool::new(dice, keep).roll(&mut rng);

            prop_assert_eq!(roll.faces().len(), dice as usize);
            prop_assert_eq!(roll.kept().len(), dice.min(keep) as usize);
            if let (Some(lowest_kept), Some(highest_dropped)) =
                (roll.kept().last(), roll.faces().get(roll.kept().len()))
            {
                prop_assert!(lowest_kept >= highest_dropped);
            }
        }

        #[test]
        fn total_is_at_least_one_per_kept_die(dice in 1u32..30, keep in 1u32..12, seed: u64) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let roll = DicePool::new(dice, keep).roll(&mut rng);
            prop_assert!(roll.total() >= i32::try_from(dice.min(keep)).unwrap());
        }
    }
}
