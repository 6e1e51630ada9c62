//! # Fray Dice
//!
//! Dice primitive for the fray combat engine.
//!
//! Every stat or skill check in a fight is a pool of ten-sided dice. The
//! pool size comes from the character's stat and skill values, every die
//! that lands on ten explodes into another die, and only the highest few
//! dice are kept and summed. The sum is then adjusted for difficulty and a
//! small chance of a critical multiplier.
//!
//! - [`pool`]: raw pools (roll N, explode, keep K)
//! - [`check`]: stat/skill checks built on top of a pool
//! - [`crit`]: the critical-hit ladder
//!
//! ## Quick Start
//!
//! ```
//! use fray_dice::Check;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(7);
//!
//! // Dexterity 3, brawl 2, against difficulty 5.
//! let check = Check::new(5).stat(3).skill(2);
//! assert_eq!(check.pool_size(), 5);
//! assert_eq!(check.keep_count(), 4); // 1 + 3/2 + 2
//!
//! let outcome = check.roll(&mut rng);
//! assert_eq!(outcome.is_success(), outcome.result() >= 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod check;
pub mod crit;
pub mod pool;

// Re-exports for convenience
pub use check::{Check, CheckOutcome, DEFAULT_KEEP};
pub use crit::CritChance;
pub use pool::{roll_die, roll_exploding, DicePool, PoolRoll, EXPLODE_ON, SIDES};
