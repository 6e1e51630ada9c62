//! Characters: the long-lived entities that take part in fights.
//!
//! A [`Character`] is owned by the [`Roster`](crate::roster::Roster), not by
//! any fight. Everything on it persists between fights: traits, health,
//! equipment, stance and the protection links it has set up. Per-fight state
//! lives in [`ParticipantState`](crate::participant::ParticipantState) and is
//! discarded when the character leaves.
//!
//! # Example
//!
//! ```
//! use fray_core::character::{Character, CharacterId, Stat};
//!
//! let mut hero = Character::player(CharacterId::new(1), "Alaric");
//! hero.traits.set_stat(Stat::Stamina, 3);
//! assert_eq!(hero.max_hp(), 40);
//! assert_eq!(hero.wound_descriptor(8), "moderate");
//! ```

pub mod archetype;
pub mod components;

use std::fmt;

use fray_dice::{Check, CritChance};
use serde::{Deserialize, Serialize};

pub use archetype::{Archetype, ArchetypeCatalog, ArchetypeTable};
pub use components::{
    Armor, AttackFlags, DefenseFlags, Health, Mob, RollModifiers, Skill, Stance, Stat, Traits,
    Vitality, WeaponProfile,
};

/// Maximum health granted per point of boss rating.
pub const BOSS_HEALTH_PER_RATING: u32 = 100;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a character.
///
/// Ordered by numeric value; every per-fight collection keyed by it iterates
/// in a stable order.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharacterId(u64);

impl CharacterId {
    /// Creates an id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharacterId({})", self.0)
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for CharacterId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<CharacterId> for u64 {
    fn from(id: CharacterId) -> Self {
        id.0
    }
}

/// Unique identifier for a location. At most one fight runs per location.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(u64);

impl LocationId {
    /// Creates an id from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationId({})", self.0)
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LocationId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// A way out of a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    /// Name players type to use it.
    pub name: String,
    /// Where it leads.
    pub destination: LocationId,
}

impl Exit {
    /// Creates an exit.
    #[must_use]
    pub fn new(name: impl Into<String>, destination: LocationId) -> Self {
        Self {
            name: name.into(),
            destination,
        }
    }
}

/// Who decides what a character does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Controller {
    /// A connected player.
    #[default]
    Player,
    /// Engine-driven.
    Automated,
}

// =============================================================================
// Character
// =============================================================================

/// A persisted character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Identity.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Where the character currently is.
    pub location: Option<LocationId>,
    /// Player or automated.
    pub controller: Controller,
    /// Whether anyone may start a fight with this character.
    pub attackable: bool,

    /// Stats and skills.
    pub traits: Traits,
    /// Bonus maximum health from outside sources.
    pub bonus_max_hp: u32,
    /// Damage and status.
    pub health: Health,
    /// Worn armor.
    pub armor: Armor,
    /// Wielded weapon; `None` fights unarmed.
    pub weapon: Option<WeaponProfile>,
    /// Carrying a shield enables blocking.
    pub has_shield: bool,

    /// Persisted stance.
    pub stance: Stance,
    /// Attack automatically every round.
    pub autoattack: bool,
    /// Always fails consciousness checks.
    pub glass_jaw: bool,
    /// Never fails consciousness checks.
    pub sleepless: bool,
    /// Never accrues fatigue.
    pub never_tire: bool,
    /// Extra toughness and accuracy for boss characters.
    pub boss_rating: u32,
    /// Equipment roll modifiers.
    pub modifiers: RollModifiers,
    /// Crit bonuses.
    pub crit: CritChance,
    /// Armor ignored on every hit.
    pub armor_pierce: i32,
    /// Strikes every declared foe at once.
    pub can_cleave: bool,
    /// Percent chance to pick a new target for each extra attack.
    pub switch_chance: Option<u32>,

    /// Characters protecting this one.
    pub defenders: Vec<CharacterId>,
    /// Character this one protects.
    pub guarding: Option<CharacterId>,
    /// Joins fights involving the guarded character automatically.
    pub passive_guard: bool,

    /// Present when this character is a group of identical members.
    pub mob: Option<Mob>,

    /// Location of the fight this character is taking part in.
    pub engaged_at: Option<LocationId>,
    /// Location of the fight this character is watching.
    pub watching: Option<LocationId>,
}

impl Character {
    /// Creates a player character with no traits.
    #[must_use]
    pub fn player(id: CharacterId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: None,
            controller: Controller::Player,
            attackable: true,
            traits: Traits::new(),
            bonus_max_hp: 0,
            health: Health::default(),
            armor: Armor::default(),
            weapon: None,
            has_shield: false,
            stance: Stance::default(),
            autoattack: false,
            glass_jaw: false,
            sleepless: false,
            never_tire: false,
            boss_rating: 0,
            modifiers: RollModifiers::default(),
            crit: CritChance::default(),
            armor_pierce: 0,
            can_cleave: false,
            switch_chance: None,
            defenders: Vec::new(),
            guarding: None,
            passive_guard: false,
            mob: None,
            engaged_at: None,
            watching: None,
        }
    }

    /// Creates an automated character that attacks on its own.
    #[must_use]
    pub fn automated(id: CharacterId, name: impl Into<String>) -> Self {
        Self {
            controller: Controller::Automated,
            autoattack: true,
            ..Self::player(id, name)
        }
    }

    /// Places the character at a location.
    #[must_use]
    pub fn at(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }

    /// Whether the engine decides this character's actions.
    #[must_use]
    pub fn is_automated(&self) -> bool {
        self.controller == Controller::Automated
    }

    /// Whether the character is awake.
    #[must_use]
    pub fn is_conscious(&self) -> bool {
        self.health.is_conscious()
    }

    /// Whether the character is dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health.vitality == Vitality::Dead
    }

    /// Name shown in narration; mobs show their remaining numbers.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.mob {
            Some(mob) if mob.active() == 1 => format!("1 {}", mob.singular),
            Some(mob) => format!("{} {}", mob.active(), mob.plural),
            None => self.name.clone(),
        }
    }

    /// The wielded weapon, or bare hands.
    #[must_use]
    pub fn weapon(&self) -> WeaponProfile {
        let mut weapon = self.weapon.clone().unwrap_or_else(WeaponProfile::unarmed);
        if self.boss_rating > 0 {
            weapon.damage += self.boss_rating;
            weapon.flat_damage += i32::try_from(self.boss_rating * 10).unwrap_or(i32::MAX);
        }
        weapon
    }

    /// Defenses available, after accounting for the shield.
    #[must_use]
    pub fn defense_flags(&self) -> DefenseFlags {
        let mut flags = self.weapon().defense_flags;
        if !self.has_shield {
            flags.remove(DefenseFlags::BLOCK);
        }
        flags
    }

    /// Attacks per round: one, or one per active mob member.
    #[must_use]
    pub fn attack_count(&self) -> u32 {
        self.mob.as_ref().map_or(1, Mob::active)
    }

    // -------------------------------------------------------------------------
    // Derived health values
    // -------------------------------------------------------------------------

    /// Maximum health.
    #[must_use]
    pub fn max_hp(&self) -> u32 {
        self.traits.stat(Stat::Stamina) * 10
            + 10
            + self.bonus_max_hp
            + self.boss_rating * BOSS_HEALTH_PER_RATING
    }

    /// Multiple of maximum health past which death checks are made.
    #[must_use]
    pub fn death_threshold(&self) -> f64 {
        if self.is_automated() {
            1.0
        } else {
            2.0
        }
    }

    /// Damage as a whole percentage of maximum health.
    #[must_use]
    pub fn wound_percent(&self, damage: u32) -> u32 {
        let max = u64::from(self.max_hp().max(1));
        u32::try_from(u64::from(damage) * 100 / max).unwrap_or(u32::MAX)
    }

    /// Describes how bad `damage` is for this character.
    #[must_use]
    pub fn wound_descriptor(&self, damage: u32) -> &'static str {
        match self.wound_percent(damage) {
            0 => "no",
            1..=10 => "minor",
            11..=25 => "moderate",
            26..=50 => "serious",
            51..=75 => "severe",
            76..=199 => "grievous",
            _ => "grave",
        }
    }

    /// Difficulty penalty for injuries: one per ten percent of health lost.
    #[must_use]
    pub fn wound_penalty(&self) -> i32 {
        let percent = i64::from(self.wound_percent(self.health.total())) / 10;
        let penalty = percent - i64::from(self.boss_rating) * 10;
        i32::try_from(penalty.max(0)).unwrap_or(i32::MAX)
    }

    /// Natural damage absorption.
    #[must_use]
    pub fn soak(&self) -> u32 {
        self.traits.stat(Stat::Stamina)
            + self.traits.stat(Stat::Willpower)
            + self.traits.skill(Skill::Survival)
    }

    /// Penalty to dodging from heavy armor.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn dodge_penalty(&self) -> i32 {
        (f64::from(self.armor.penalty) * 1.25) as i32
    }

    /// Persisted armor pierce plus the boss bonus.
    #[must_use]
    pub fn armor_pierce(&self) -> i32 {
        self.armor_pierce + i32::try_from(self.boss_rating * 15).unwrap_or(i32::MAX)
    }

    /// Attack difficulty bonus from boss rating.
    #[must_use]
    pub fn boss_attack_bonus(&self) -> i32 {
        i32::try_from(self.boss_rating * 10).unwrap_or(i32::MAX)
    }

    // -------------------------------------------------------------------------
    // Checks
    // -------------------------------------------------------------------------

    /// Starts a check with this character's stat and skill values and crit
    /// bonuses filled in.
    #[must_use]
    pub fn check(&self, stats: &[Stat], skill: Option<Skill>, difficulty: i32) -> Check {
        let mut check = Check::new(difficulty).crit_chance(self.crit);
        for stat in stats {
            check = check.stat(self.traits.stat(*stat));
        }
        if let Some(skill) = skill {
            check = check.skill(self.traits.skill(skill));
        }
        check
    }
}
