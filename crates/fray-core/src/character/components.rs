//! Typed building blocks of a [`Character`](super::Character).
//!
//! Stats and skills are closed enums rather than string keys, so a typo in a
//! weapon profile is a parse error at load time instead of a silent zero in
//! the middle of a fight.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

// =============================================================================
// Stats and Skills
// =============================================================================

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $err:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Lowercase name used in commands and messages.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| ParseError::$err(s.to_string()))
            }
        }
    };
}

named_enum! {
    /// A character statistic.
    Stat, UnknownStat {
        Strength => "strength",
        Dexterity => "dexterity",
        Stamina => "stamina",
        Charm => "charm",
        Command => "command",
        Composure => "composure",
        Intellect => "intellect",
        Perception => "perception",
        Wits => "wits",
        Mana => "mana",
        Luck => "luck",
        Willpower => "willpower",
    }
}

named_enum! {
    /// A trained skill.
    Skill, UnknownSkill {
        Brawl => "brawl",
        Melee => "melee",
        Archery => "archery",
        Dodge => "dodge",
        Athletics => "athletics",
        Survival => "survival",
        Stealth => "stealth",
        Medicine => "medicine",
        Leadership => "leadership",
        Riding => "riding",
        Investigation => "investigation",
        Occult => "occult",
    }
}

/// Stat and skill values. Anything not set reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traits {
    stats: BTreeMap<Stat, u32>,
    skills: BTreeMap<Skill, u32>,
}

impl Traits {
    /// Creates an empty trait sheet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Traits::set_stat`].
    #[must_use]
    pub fn with_stat(mut self, stat: Stat, value: u32) -> Self {
        self.set_stat(stat, value);
        self
    }

    /// Builder form of [`Traits::set_skill`].
    #[must_use]
    pub fn with_skill(mut self, skill: Skill, value: u32) -> Self {
        self.set_skill(skill, value);
        self
    }

    /// Value of a stat.
    #[must_use]
    pub fn stat(&self, stat: Stat) -> u32 {
        self.stats.get(&stat).copied().unwrap_or(0)
    }

    /// Value of a skill.
    #[must_use]
    pub fn skill(&self, skill: Skill) -> u32 {
        self.skills.get(&skill).copied().unwrap_or(0)
    }

    /// Sets a stat.
    pub fn set_stat(&mut self, stat: Stat, value: u32) {
        self.stats.insert(stat, value);
    }

    /// Sets a skill.
    pub fn set_skill(&mut self, skill: Skill, value: u32) {
        self.skills.insert(skill, value);
    }
}

// =============================================================================
// Stance
// =============================================================================

/// How aggressively a character fights. Persists between fights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    /// Easier to defend, harder to hit.
    Defensive,
    /// Slightly defensive.
    Guarded,
    /// No modifiers.
    #[default]
    Balanced,
    /// Slightly offensive.
    Aggressive,
    /// Much easier to hit with, much harder to defend.
    Reckless,
}

impl Stance {
    /// Every stance, most defensive first.
    pub const ALL: [Stance; 5] = [
        Stance::Defensive,
        Stance::Guarded,
        Stance::Balanced,
        Stance::Aggressive,
        Stance::Reckless,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Stance::Defensive => "defensive",
            Stance::Guarded => "guarded",
            Stance::Balanced => "balanced",
            Stance::Aggressive => "aggressive",
            Stance::Reckless => "reckless",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stance {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Stance::ALL
            .into_iter()
            .find(|stance| stance.as_str() == wanted)
            .ok_or_else(|| ParseError::UnknownStance(s.to_string()))
    }
}

// =============================================================================
// Weapons, Armor and Defenses
// =============================================================================

bitflags! {
    /// Which defenses an incoming strike from a weapon allows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AttackFlags: u8 {
        /// The strike can be parried (and therefore riposted).
        const CAN_BE_PARRIED = 1 << 0;
        /// The strike can be stopped by a shield.
        const CAN_BE_BLOCKED = 1 << 1;
        /// The strike can be dodged.
        const CAN_BE_DODGED = 1 << 2;
    }
}

bitflags! {
    /// Which defenses a character's equipment lets them use.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DefenseFlags: u8 {
        /// Can parry with the wielded weapon.
        const PARRY = 1 << 0;
        /// Can block; only honoured while carrying a shield.
        const BLOCK = 1 << 1;
        /// Can dodge.
        const DODGE = 1 << 2;
        /// Can counter-attack after parrying a botched strike.
        const RIPOSTE = 1 << 3;
    }
}

impl Default for AttackFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl Default for DefenseFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// How a character attacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponProfile {
    /// Display name.
    pub name: String,
    /// Stat rolled to hit.
    pub attack_stat: Stat,
    /// Skill rolled to hit.
    pub attack_skill: Skill,
    /// Stat feeding the damage pool.
    pub damage_stat: Stat,
    /// Weapon damage dice.
    pub damage: u32,
    /// Added to every damage roll.
    pub flat_damage: i32,
    /// Added to the to-hit difficulty.
    pub difficulty_mod: i32,
    /// Defenses this weapon's strikes allow.
    pub attack_flags: AttackFlags,
    /// Defenses this weapon grants its wielder.
    pub defense_flags: DefenseFlags,
}

impl WeaponProfile {
    /// Bare hands.
    #[must_use]
    pub fn unarmed() -> Self {
        Self {
            name: "fists".to_string(),
            attack_stat: Stat::Dexterity,
            attack_skill: Skill::Brawl,
            damage_stat: Stat::Strength,
            damage: 0,
            flat_damage: 0,
            difficulty_mod: 0,
            attack_flags: AttackFlags::all(),
            defense_flags: DefenseFlags::all(),
        }
    }

    /// A melee weapon with the given damage dice.
    #[must_use]
    pub fn melee(name: impl Into<String>, damage: u32) -> Self {
        Self {
            name: name.into(),
            attack_skill: Skill::Melee,
            damage,
            ..Self::unarmed()
        }
    }
}

impl Default for WeaponProfile {
    fn default() -> Self {
        Self::unarmed()
    }
}

/// Worn protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Armor {
    /// Flat mitigation.
    pub value: u32,
    /// How much of a strong hit's margin the armor shrugs off.
    pub resilience: i32,
    /// Encumbrance; feeds dodge penalty and fatigue.
    pub penalty: u32,
}

/// Persisted additive roll modifiers, usually granted by equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RollModifiers {
    /// Added to to-hit rolls.
    pub attack: i32,
    /// Added to final mitigation.
    pub defense: i32,
    /// Added to the armor value before mitigation is rolled.
    pub mitigation: i32,
    /// Added to damage rolls.
    pub damage: i32,
}

// =============================================================================
// Health
// =============================================================================

/// Whether a character can act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Vitality {
    /// Awake and able.
    #[default]
    Conscious,
    /// Knocked out.
    Incapacitated,
    /// Dead.
    Dead,
}

/// Damage taken. Temporary damage only exists inside fights where damage is
/// not real and is cleared when the character leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Health {
    /// Permanent damage.
    pub damage: u32,
    /// Simulated damage.
    pub temp_damage: u32,
    /// Current status.
    pub vitality: Vitality,
}

impl Health {
    /// Total damage counted against maximum health.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.damage.saturating_add(self.temp_damage)
    }

    /// Records damage as permanent or temporary.
    pub fn apply(&mut self, amount: u32, real: bool) {
        if real {
            self.damage = self.damage.saturating_add(amount);
        } else {
            self.temp_damage = self.temp_damage.saturating_add(amount);
        }
    }

    /// Whether the character is awake.
    #[must_use]
    pub fn is_conscious(&self) -> bool {
        self.vitality == Vitality::Conscious
    }
}

// =============================================================================
// Mob
// =============================================================================

/// A group of identical members fighting as one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mob {
    /// Members still standing.
    pub quantity: u32,
    /// Name of one member.
    pub singular: String,
    /// Name of several members.
    pub plural: String,
    /// Attacks hit every declared foe at once.
    pub area_damage: bool,
    /// Members out of the fight for now but not dead.
    pub temp_losses: u32,
}

impl Mob {
    /// Creates a mob.
    #[must_use]
    pub fn new(quantity: u32, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            quantity,
            singular: singular.into(),
            plural: plural.into(),
            area_damage: false,
            temp_losses: 0,
        }
    }

    /// Members still able to fight.
    #[must_use]
    pub const fn active(&self) -> u32 {
        self.quantity.saturating_sub(self.temp_losses)
    }

    /// Removes members permanently (real damage) or for this fight only.
    pub fn lose_members(&mut self, count: u32, real: bool) {
        if real {
            self.quantity = self.quantity.saturating_sub(count);
        } else {
            self.temp_losses = self.temp_losses.saturating_add(count).min(self.quantity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod name_tests {
        use super::*;

        #[test]
        fn stats_parse_case_insensitively() {
            assert_eq!("Dexterity".parse::<Stat>(), Ok(Stat::Dexterity));
            assert_eq!(" willpower ".parse::<Stat>(), Ok(Stat::Willpower));
            assert_eq!(
                "agility".parse::<Stat>(),
                Err(ParseError::UnknownStat("agility".to_string()))
            );
        }

        #[test]
        fn skills_round_trip_through_display() {
            for skill in Skill::ALL {
                assert_eq!(skill.to_string().parse::<Skill>(), Ok(*skill));
            }
        }

        #[test]
        fn stance_parse() {
            assert_eq!("RECKLESS".parse::<Stance>(), Ok(Stance::Reckless));
            assert!("berserk".parse::<Stance>().is_err());
            assert_eq!(Stance::default(), Stance::Balanced);
        }
    }

    mod trait_tests {
        use super::*;

        #[test]
        fn unset_traits_read_zero() {
            let traits = Traits::new().with_stat(Stat::Strength, 3);
            assert_eq!(traits.stat(Stat::Strength), 3);
            assert_eq!(traits.stat(Stat::Luck), 0);
            assert_eq!(traits.skill(Skill::Brawl), 0);
        }

        #[test]
        fn traits_deserialize_from_names() {
            let traits: Traits = serde_json::from_str(
                r#"{"stats":{"dexterity":4},"skills":{"melee":2}}"#,
            )
            .unwrap();
            assert_eq!(traits.stat(Stat::Dexterity), 4);
            assert_eq!(traits.skill(Skill::Melee), 2);
        }
    }

    mod health_tests {
        use super::*;

        #[test]
        fn temp_and_real_damage_both_count() {
            let mut health = Health::default();
            health.apply(10, true);
            health.apply(5, false);
            assert_eq!(health.damage, 10);
            assert_eq!(health.temp_damage, 5);
            assert_eq!(health.total(), 15);
        }
    }

    mod mob_tests {
        use super::*;

        #[test]
        fn real_losses_shrink_the_mob() {
            let mut mob = Mob::new(5, "guard", "guards");
            mob.lose_members(2, true);
            assert_eq!(mob.quantity, 3);
            assert_eq!(mob.active(), 3);
        }

        #[test]
        fn temp_losses_are_capped_at_quantity() {
            let mut mob = Mob::new(3, "rat", "rats");
            mob.lose_members(5, false);
            assert_eq!(mob.quantity, 3);
            assert_eq!(mob.active(), 0);
        }
    }

    #[test]
    fn block_requires_explicit_flag() {
        let mut flags = DefenseFlags::default();
        assert!(flags.contains(DefenseFlags::BLOCK));
        flags.remove(DefenseFlags::BLOCK);
        assert!(!flags.contains(DefenseFlags::BLOCK));
    }
}
