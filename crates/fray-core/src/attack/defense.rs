//! Defense rolls.
//!
//! A target rolls every defense that both the incoming weapon and their own
//! equipment allow. Parry sets the starting total; block and dodge are
//! blended into it, so a character with several options is harder to hit
//! than one with a single good one, but never twice as hard.

use rand::Rng;

use super::{defense_modifier, spread, AUTO_HIT, NO_DEFENSE};
use crate::character::{AttackFlags, Character, DefenseFlags, Skill, Stat, WeaponProfile};
use crate::config::CombatConfig;
use crate::participant::{DefenseKind, ParticipantState};

/// Outcome of a defense roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefenseRoll {
    /// Value the attacker's roll is compared against.
    pub total: i32,
    /// Defense that contributed most; `None` when the target could not defend.
    pub winner: Option<DefenseKind>,
}

/// Rolls the target's defense against a weapon.
///
/// Unconscious targets get [`AUTO_HIT`] negated. Otherwise the target's
/// `times_attacked` counter is bumped after its overwhelm penalty has been
/// read, and the winning defense is recorded for narration.
pub(crate) fn roll_defense<R: Rng + ?Sized>(
    target: &Character,
    state: Option<&mut ParticipantState>,
    attacker_weapon: &WeaponProfile,
    penalty: i32,
    config: &CombatConfig,
    rng: &mut R,
) -> DefenseRoll {
    if !target.is_conscious() {
        return DefenseRoll {
            total: -AUTO_HIT,
            winner: None,
        };
    }
    let mut state = state;
    let difficulty = -2 + penalty - defense_modifier(target, state.as_deref(), config);
    if let Some(state) = state.as_deref_mut() {
        state.times_attacked += 1;
    }

    let allowed = attacker_weapon.attack_flags;
    let available = target.defense_flags();
    let dodge_penalty = target.dodge_penalty();
    let mut total = None;

    let parry = if allowed.contains(AttackFlags::CAN_BE_PARRIED)
        && available.contains(DefenseFlags::PARRY)
    {
        let own = target.weapon();
        let mut roll = target
            .check(&[own.attack_stat], Some(attacker_weapon.attack_skill), difficulty + 10)
            .roll(rng)
            .result();
        if roll > 1 {
            roll = spread(roll, rng);
        }
        total = Some(roll);
        roll
    } else {
        NO_DEFENSE
    };

    let block = if allowed.contains(AttackFlags::CAN_BE_BLOCKED)
        && available.contains(DefenseFlags::BLOCK)
    {
        let roll = evade(target, difficulty + dodge_penalty, rng);
        let (blended, roll) = blend(total, roll, rng);
        total = Some(blended);
        roll
    } else {
        NO_DEFENSE
    };

    let dodge = if allowed.contains(AttackFlags::CAN_BE_DODGED)
        && available.contains(DefenseFlags::DODGE)
    {
        let roll = evade(target, difficulty - 10 + dodge_penalty, rng);
        let (blended, roll) = blend(total, roll, rng);
        total = Some(blended);
        roll
    } else {
        NO_DEFENSE
    };

    let winner = if parry > block && parry > dodge {
        DefenseKind::Parry
    } else if block > parry && block > dodge {
        DefenseKind::Block
    } else {
        DefenseKind::Dodge
    };
    if let Some(state) = state {
        state.last_defense = Some(winner);
    }
    DefenseRoll {
        total: total.unwrap_or(NO_DEFENSE),
        winner: Some(winner),
    }
}

fn evade<R: Rng + ?Sized>(target: &Character, difficulty: i32, rng: &mut R) -> i32 {
    target
        .check(&[Stat::Dexterity], Some(Skill::Dodge), difficulty)
        .roll(rng)
        .result()
}

/// Folds a new defense roll into the running total.
///
/// Returns `(total, roll)` where `roll` is the new roll after spreading,
/// used to decide which defense won.
pub(crate) fn blend<R: Rng + ?Sized>(current: Option<i32>, roll: i32, rng: &mut R) -> (i32, i32) {
    let roll = if roll >= 2 { spread(roll, rng) } else { roll };
    let total = match current {
        None | Some(0) => roll,
        Some(current) if roll > 0 => {
            if current > roll {
                current + roll / 2
            } else {
                current.div_euclid(2) + roll
            }
        }
        Some(current) if roll > current => (current + roll).div_euclid(2),
        Some(current) => current,
    };
    (total, roll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterId, Vitality};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn defender() -> Character {
        let mut c = Character::player(CharacterId::new(1), "Ysolde");
        c.traits.set_stat(Stat::Dexterity, 3);
        c.traits.set_skill(Skill::Dodge, 3);
        c.traits.set_skill(Skill::Brawl, 2);
        c
    }

    mod blend_tests {
        use super::*;

        #[test]
        fn small_rolls_blend_without_spreading() {
            let mut rng = ChaCha8Rng::seed_from_u64(0);
            assert_eq!(blend(None, 1, &mut rng), (1, 1));
            assert_eq!(blend(Some(0), -3, &mut rng), (-3, -3));
            assert_eq!(blend(Some(-5), -3, &mut rng).0, -4);
            assert_eq!(blend(Some(-3), -5, &mut rng).0, -3);
            assert_eq!(blend(Some(-5), 1, &mut rng).0, -2);
            assert_eq!(blend(Some(7), 1, &mut rng).0, 7);
        }

        #[test]
        fn large_rolls_never_exceed_sum() {
            let mut rng = ChaCha8Rng::seed_from_u64(3);
            for _ in 0..200 {
                let (total, roll) = blend(Some(20), 30, &mut rng);
                assert!((15..=30).contains(&roll));
                assert!(total <= 20 + 30);
            }
        }
    }

    mod roll_tests {
        use super::*;

        #[test]
        fn unconscious_targets_are_auto_hit() {
            let mut target = defender();
            target.health.vitality = Vitality::Incapacitated;
            let mut state = ParticipantState::new(&target, false, &CombatConfig::default());
            let roll = roll_defense(
                &target,
                Some(&mut state),
                &WeaponProfile::unarmed(),
                0,
                &CombatConfig::default(),
                &mut ChaCha8Rng::seed_from_u64(1),
            );
            assert_eq!(roll.total, -AUTO_HIT);
            assert_eq!(roll.winner, None);
            assert_eq!(state.times_attacked, 0);
        }

        #[test]
        fn undefendable_weapon_yields_no_defense() {
            let target = defender();
            let mut state = ParticipantState::new(&target, false, &CombatConfig::default());
            let weapon = WeaponProfile {
                attack_flags: AttackFlags::empty(),
                ..WeaponProfile::unarmed()
            };
            let roll = roll_defense(
                &target,
                Some(&mut state),
                &weapon,
                0,
                &CombatConfig::default(),
                &mut ChaCha8Rng::seed_from_u64(2),
            );
            assert_eq!(roll.total, NO_DEFENSE);
            assert_eq!(state.times_attacked, 1);
        }

        #[test]
        fn dodge_only_records_dodge() {
            let mut target = defender();
            target.weapon = Some(WeaponProfile {
                defense_flags: DefenseFlags::DODGE,
                ..WeaponProfile::unarmed()
            });
            let mut state = ParticipantState::new(&target, false, &CombatConfig::default());
            let roll = roll_defense(
                &target,
                Some(&mut state),
                &WeaponProfile::unarmed(),
                0,
                &CombatConfig::default(),
                &mut ChaCha8Rng::seed_from_u64(4),
            );
            assert_eq!(roll.winner, Some(DefenseKind::Dodge));
            assert_eq!(state.last_defense, Some(DefenseKind::Dodge));
            assert!(roll.total > NO_DEFENSE);
        }

        #[test]
        fn repeated_attacks_wear_defense_down() {
            let target = defender();
            let config = CombatConfig::default();
            let weapon = WeaponProfile::unarmed();
            let mut fresh_total = 0;
            let mut worn_total = 0;
            for seed in 0..200 {
                let mut fresh = ParticipantState::new(&target, false, &config);
                let mut worn = fresh.clone();
                worn.times_attacked = 4;
                fresh_total += roll_defense(&target, Some(&mut fresh), &weapon, 0, &config, &mut ChaCha8Rng::seed_from_u64(seed)).total;
                worn_total += roll_defense(&target, Some(&mut worn), &weapon, 0, &config, &mut ChaCha8Rng::seed_from_u64(seed)).total;
            }
            assert!(worn_total < fresh_total);
        }
    }
}
