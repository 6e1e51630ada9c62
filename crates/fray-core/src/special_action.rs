//! GM-authored special actions.
//!
//! In a managed fight the GM can publish actions such as "hold the gate"
//! or "pick the lock" with a stat, a skill and a difficulty. Participants
//! queue one instead of attacking, the GM rolls it for them, and the action
//! keeps every roll made against it so the GM can read off a running total.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::character::{Character, CharacterId, Skill, Stat};
use crate::error::CombatError;

/// A roll made against a special action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRoll {
    /// Who rolled.
    pub character: CharacterId,
    /// Result of the check.
    pub result: i32,
}

/// One GM-defined check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialAction {
    /// Name shown to players.
    pub name: String,
    /// Stat rolled.
    pub stat: Option<Stat>,
    /// Skill rolled.
    pub skill: Option<Skill>,
    /// Difficulty of the check.
    pub difficulty: i32,
    rolls: BTreeMap<u32, Vec<RecordedRoll>>,
}

impl SpecialAction {
    /// Creates an action with no rolls.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        stat: Option<Stat>,
        skill: Option<Skill>,
        difficulty: i32,
    ) -> Self {
        Self {
            name: name.into(),
            stat,
            skill,
            difficulty,
            rolls: BTreeMap::new(),
        }
    }

    /// Rolls for one character and records the result under `round`.
    /// Rolling again in the same round replaces the earlier roll.
    pub fn roll_for<R: Rng + ?Sized>(
        &mut self,
        character: &Character,
        special_modifier: i32,
        round: u32,
        rng: &mut R,
    ) -> i32 {
        let stats: Vec<Stat> = self.stat.into_iter().collect();
        let result = character
            .check(&stats, self.skill, self.difficulty)
            .flat(special_modifier)
            .roll(rng)
            .result();
        self.record(round, character.id, result);
        result
    }

    /// Rolls for every given `(character, special modifier)` pair.
    pub fn make_checks<'a, R: Rng + ?Sized>(
        &mut self,
        actors: impl IntoIterator<Item = (&'a Character, i32)>,
        round: u32,
        rng: &mut R,
    ) -> Vec<RecordedRoll> {
        actors
            .into_iter()
            .map(|(character, modifier)| RecordedRoll {
                character: character.id,
                result: self.roll_for(character, modifier, round, rng),
            })
            .collect()
    }

    fn record(&mut self, round: u32, character: CharacterId, result: i32) {
        let rolls = self.rolls.entry(round).or_default();
        match rolls.iter_mut().find(|roll| roll.character == character) {
            Some(existing) => existing.result = result,
            None => rolls.push(RecordedRoll { character, result }),
        }
    }

    /// Rolls recorded in a round.
    #[must_use]
    pub fn rolls_in(&self, round: u32) -> &[RecordedRoll] {
        self.rolls.get(&round).map_or(&[], Vec::as_slice)
    }

    /// Sum of every recorded roll.
    #[must_use]
    pub fn total(&self) -> i32 {
        self.rolls.values().flatten().map(|roll| roll.result).sum()
    }
}

impl fmt::Display for SpecialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        let stat = self.stat.map(|s| s.to_string());
        let skill = self.skill.map(|s| s.to_string());
        let roll: Vec<String> = stat.into_iter().chain(skill).collect();
        if !roll.is_empty() {
            write!(f, " ({} at {})", roll.join(" + "), self.difficulty)?;
        }
        Ok(())
    }
}

/// The special actions of one fight, numbered from 1 for players.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialActionRegistry {
    actions: Vec<SpecialAction>,
}

impl SpecialActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action and returns its 1-based number.
    pub fn add(&mut self, action: SpecialAction) -> usize {
        self.actions.push(action);
        self.actions.len()
    }

    /// Removes an action by 1-based number.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::UnknownSpecialAction`] for a bad number.
    pub fn remove(&mut self, number: usize) -> Result<SpecialAction, CombatError> {
        let index = Self::index(number, self.actions.len())?;
        Ok(self.actions.remove(index))
    }

    /// Looks up an action by 1-based number.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::UnknownSpecialAction`] for a bad number.
    pub fn get(&self, number: usize) -> Result<&SpecialAction, CombatError> {
        let index = Self::index(number, self.actions.len())?;
        Ok(&self.actions[index])
    }

    /// Mutable lookup by 1-based number.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::UnknownSpecialAction`] for a bad number.
    pub fn get_mut(&mut self, number: usize) -> Result<&mut SpecialAction, CombatError> {
        let index = Self::index(number, self.actions.len())?;
        Ok(&mut self.actions[index])
    }

    fn index(number: usize, len: usize) -> Result<usize, CombatError> {
        if (1..=len).contains(&number) {
            Ok(number - 1)
        } else {
            Err(CombatError::UnknownSpecialAction(number))
        }
    }

    /// Actions with their numbers.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SpecialAction)> {
        self.actions.iter().enumerate().map(|(i, a)| (i + 1, a))
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether there are none.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn climber(id: u64) -> Character {
        let mut c = Character::player(CharacterId::new(id), "Climber");
        c.traits.set_stat(Stat::Dexterity, 3);
        c.traits.set_skill(Skill::Athletics, 2);
        c
    }

    mod roll_tests {
        use super::*;

        #[test]
        fn rolls_are_recorded_per_round() {
            let mut action =
                SpecialAction::new("climb the wall", Some(Stat::Dexterity), Some(Skill::Athletics), 15);
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            let a = climber(1);
            let b = climber(2);
            let rolls = action.make_checks([(&a, 0), (&b, 0)], 1, &mut rng);
            assert_eq!(rolls.len(), 2);
            assert_eq!(action.rolls_in(1).len(), 2);
            assert!(action.rolls_in(2).is_empty());
            assert_eq!(action.total(), rolls[0].result + rolls[1].result);
        }

        #[test]
        fn reroll_in_same_round_replaces() {
            let mut action = SpecialAction::new("climb", Some(Stat::Dexterity), None, 10);
            let mut rng = ChaCha8Rng::seed_from_u64(2);
            let a = climber(1);
            action.roll_for(&a, 0, 1, &mut rng);
            let second = action.roll_for(&a, 0, 1, &mut rng);
            assert_eq!(action.rolls_in(1).len(), 1);
            assert_eq!(action.total(), second);
            let third = action.roll_for(&a, 0, 2, &mut rng);
            assert_eq!(action.total(), second + third);
        }

        #[test]
        fn special_modifier_is_flat() {
            let mut plain = SpecialAction::new("x", Some(Stat::Dexterity), None, 5);
            let mut boosted = plain.clone();
            let a = climber(1);
            let base = plain.roll_for(&a, 0, 1, &mut ChaCha8Rng::seed_from_u64(9));
            let more = boosted.roll_for(&a, 10, 1, &mut ChaCha8Rng::seed_from_u64(9));
            assert_eq!(more, base + 10);
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn numbering_is_one_based() {
            let mut registry = SpecialActionRegistry::new();
            assert_eq!(registry.add(SpecialAction::new("a", None, None, 15)), 1);
            assert_eq!(registry.add(SpecialAction::new("b", None, None, 15)), 2);
            assert_eq!(registry.get(2).unwrap().name, "b");
            assert_eq!(
                registry.get(0).err(),
                Some(CombatError::UnknownSpecialAction(0))
            );
            assert_eq!(registry.remove(1).unwrap().name, "a");
            assert_eq!(registry.get(1).unwrap().name, "b");
            assert!(registry.get(2).is_err());
        }

        #[test]
        fn display_shows_roll() {
            let action = SpecialAction::new("lift", Some(Stat::Strength), Some(Skill::Athletics), 20);
            assert_eq!(action.to_string(), "lift (strength + athletics at 20)");
            assert_eq!(SpecialAction::new("talk", None, None, 15).to_string(), "talk");
        }
    }
}
