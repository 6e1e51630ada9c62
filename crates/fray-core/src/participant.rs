//! Per-fight state of one combatant.
//!
//! A [`ParticipantState`] is created when a character joins a fight and
//! dropped when they leave. It holds everything that only matters for the
//! duration of the fight: readiness, the queued action, who they are fighting
//! and protecting, flee and cover relationships, fatigue and the GM's
//! temporary modifiers.
//!
//! Relationships between participants are stored as id lists on both sides
//! (a blocker records who they block, the blocked records their blockers).
//! The [`Fight`](crate::fight::Fight) keeps both sides in step and purges a
//! leaving participant's id from everyone else.

use std::str::FromStr;

use fray_dice::Check;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::action::QueuedAction;
use crate::character::{Character, CharacterId, Exit, Skill, Stat};
use crate::config::CombatConfig;
use crate::error::ParseError;
use crate::roster::Roster;

// =============================================================================
// Supporting Types
// =============================================================================

/// Which defense stopped the last attack against a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefenseKind {
    /// Turned aside with a weapon.
    Parry,
    /// Caught on a shield.
    Block,
    /// Stepped out of the way.
    Dodge,
}

impl DefenseKind {
    /// Word used in narration.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Parry => "parry",
            Self::Block => "block",
            Self::Dodge => "dodge",
        }
    }
}

/// Categories of GM-set temporary modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKind {
    /// To-hit difficulty.
    Attack,
    /// Defense difficulty.
    Defense,
    /// Armor value.
    Mitigation,
    /// Flat damage.
    Damage,
    /// Special action rolls.
    Special,
}

impl ModifierKind {
    /// Every category.
    pub const ALL: [ModifierKind; 5] = [
        Self::Attack,
        Self::Defense,
        Self::Mitigation,
        Self::Damage,
        Self::Special,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attack => "attack",
            Self::Defense => "defense",
            Self::Mitigation => "mitigation",
            Self::Damage => "damage",
            Self::Special => "special",
        }
    }
}

impl FromStr for ModifierKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ParseError::UnknownModifier(s.to_string()))
    }
}

/// Temporary modifiers a GM can set for the duration of a fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TempModifiers {
    /// Subtracted from to-hit difficulty.
    pub attack: i32,
    /// Subtracted from defense difficulty.
    pub defense: i32,
    /// Added to armor.
    pub mitigation: i32,
    /// Added to flat damage.
    pub damage: i32,
    /// Added to special action rolls.
    pub special: i32,
    /// Added to armor pierce.
    pub armor_pierce: i32,
}

impl TempModifiers {
    /// Reads one category.
    #[must_use]
    pub const fn get(&self, kind: ModifierKind) -> i32 {
        match kind {
            ModifierKind::Attack => self.attack,
            ModifierKind::Defense => self.defense,
            ModifierKind::Mitigation => self.mitigation,
            ModifierKind::Damage => self.damage,
            ModifierKind::Special => self.special,
        }
    }

    /// Writes one category.
    pub fn set(&mut self, kind: ModifierKind, value: i32) {
        match kind {
            ModifierKind::Attack => self.attack = value,
            ModifierKind::Defense => self.defense = value,
            ModifierKind::Mitigation => self.mitigation = value,
            ModifierKind::Damage => self.damage = value,
            ModifierKind::Special => self.special = value,
        }
    }
}

/// Accumulated tiredness.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fatigue {
    /// Raw fatigue, before soak.
    pub accrued: f64,
    /// Gained since the round started.
    pub gained_this_round: f64,
    /// Effort spent, weighted by armor.
    pub exertion: f64,
}

/// A pending flee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleeAttempt {
    /// Exit being run for.
    pub exit: Exit,
    /// Set once the round's evasion roll got past every blocker.
    pub cleared: bool,
}

/// An outstanding vote that a participant is away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfkFlag {
    /// When the flag was raised, in seconds.
    pub flagged_at: u64,
    /// Who has voted to remove them since.
    pub votes: Vec<CharacterId>,
}

// =============================================================================
// Participant State
// =============================================================================

/// Everything about one combatant that only lasts as long as the fight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    character: CharacterId,
    automated: bool,
    /// GM has taken over this participant's decisions.
    pub automated_override: bool,
    ready: bool,

    /// What they will do on their turn.
    pub queued_action: Option<QueuedAction>,
    /// Actions already resolved, oldest first.
    pub recent_actions: Vec<QueuedAction>,

    /// Characters they are fighting.
    pub foes: Vec<CharacterId>,
    /// Characters they are fighting alongside.
    pub allies: Vec<CharacterId>,
    /// Foes that are valid to strike right now.
    pub targets: Vec<CharacterId>,
    /// Last character they attacked.
    pub prev_target: Option<CharacterId>,

    /// Participants protecting them this fight.
    pub defenders: Vec<CharacterId>,
    /// Participant they protect.
    pub guarding: Option<CharacterId>,

    /// Initiative roll this round.
    pub initiative: i32,
    /// Random tiebreak for equal initiative.
    pub tiebreaker: u32,
    /// Attacks each round.
    pub num_attacks: u32,
    /// Attacks left this round.
    pub remaining_attacks: u32,
    /// Turns to skip after botching.
    pub lost_turn_counter: u32,

    /// Defense that stopped the last attack.
    pub last_defense: Option<DefenseKind>,
    /// Attacks received this round.
    pub times_attacked: u32,

    /// GM-set temporary modifiers.
    pub modifiers: TempModifiers,
    /// Tiredness.
    pub fatigue: Fatigue,

    /// Pending flee, if any.
    pub flee: Option<FleeAttempt>,
    /// Participant they are stopping from fleeing.
    pub block_flee: Option<CharacterId>,
    /// Participants stopping them from fleeing.
    pub blockers: Vec<CharacterId>,
    /// Participants whose retreat they cover.
    pub covering: Vec<CharacterId>,
    /// Participants covering their retreat.
    pub covered_by: Vec<CharacterId>,

    /// Automated participant with nothing left to fight.
    pub wants_to_end: bool,
    /// Asked to surrender.
    pub surrendering: bool,
    /// Participants they will not let surrender.
    pub prevent_surrender: Vec<CharacterId>,
    /// Outstanding away flag.
    pub afk: Option<AfkFlag>,
    /// Changed stance this round.
    pub changed_stance: bool,
    /// Autoattacks go for the kill.
    pub lethal: bool,
    /// May strike every foe at once; starts from the character's setting.
    pub cleave: bool,
    /// Switch chance for extra attacks; starts from the character's setting.
    pub switch_chance: u32,
}

impl ParticipantState {
    /// Creates state for a character joining a fight.
    #[must_use]
    pub fn new(character: &Character, random_deaths: bool, config: &CombatConfig) -> Self {
        let automated = character.is_automated();
        let default_switch = if character.mob.is_some() {
            config.mob_switch_chance
        } else {
            0
        };
        Self {
            character: character.id,
            automated,
            automated_override: false,
            ready: false,
            queued_action: None,
            recent_actions: Vec::new(),
            foes: Vec::new(),
            allies: Vec::new(),
            targets: Vec::new(),
            prev_target: None,
            defenders: Vec::new(),
            guarding: None,
            initiative: 0,
            tiebreaker: 0,
            num_attacks: character.attack_count(),
            remaining_attacks: 1,
            lost_turn_counter: 0,
            last_defense: None,
            times_attacked: 0,
            modifiers: TempModifiers::default(),
            fatigue: Fatigue::default(),
            flee: None,
            block_flee: None,
            blockers: Vec::new(),
            covering: Vec::new(),
            covered_by: Vec::new(),
            wants_to_end: false,
            surrendering: false,
            prevent_surrender: Vec::new(),
            afk: None,
            changed_stance: false,
            lethal: random_deaths && automated,
            cleave: character.can_cleave,
            switch_chance: character.switch_chance.unwrap_or(default_switch),
        }
    }

    /// Character this state belongs to.
    #[must_use]
    pub const fn character(&self) -> CharacterId {
        self.character
    }

    /// Whether the engine decides for them.
    #[must_use]
    pub const fn is_automated(&self) -> bool {
        self.automated || self.automated_override
    }

    /// Automated participants are always ready.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.is_automated() || self.ready
    }

    /// Marks readiness. Readying clears any away flag.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
        if ready {
            self.afk = None;
        }
    }

    /// Start-of-round reset.
    pub fn reset_round(&mut self, character: &Character) {
        self.times_attacked = 0;
        self.ready = false;
        self.queued_action = None;
        self.changed_stance = false;
        self.fatigue.gained_this_round = 0.0;
        if character.mob.is_some() {
            self.num_attacks = character.attack_count();
        }
        self.remaining_attacks = self.num_attacks;
    }

    // -------------------------------------------------------------------------
    // Foes and allies
    // -------------------------------------------------------------------------

    /// Adds a foe, and transitively the characters defending them.
    pub fn add_foe(&mut self, target: CharacterId, roster: &dyn Roster) {
        if target == self.character || self.foes.contains(&target) {
            return;
        }
        self.foes.push(target);
        self.allies.retain(|id| *id != target);
        let defenders = roster
            .get(target)
            .map(|c| c.defenders.clone())
            .unwrap_or_default();
        for defender in defenders {
            if !self.allies.contains(&defender) {
                self.add_foe(defender, roster);
            }
        }
    }

    /// Adds an ally, and transitively the characters defending them.
    pub fn add_ally(&mut self, friend: CharacterId, roster: &dyn Roster) {
        if friend == self.character || self.allies.contains(&friend) {
            return;
        }
        self.allies.push(friend);
        self.foes.retain(|id| *id != friend);
        let defenders = roster
            .get(friend)
            .map(|c| c.defenders.clone())
            .unwrap_or_default();
        for defender in defenders {
            if !self.foes.contains(&defender) {
                self.add_ally(defender, roster);
            }
        }
    }

    /// Queues an action and remembers its target as a foe.
    pub fn queue(&mut self, action: QueuedAction, roster: &dyn Roster) {
        if let Some(target) = action.target {
            self.add_foe(target, roster);
        }
        self.queued_action = Some(action);
    }

    /// Actions resolved this round plus the one still queued.
    #[must_use]
    pub fn current_and_queued_actions(&self, round: u32) -> Vec<&QueuedAction> {
        self.recent_actions
            .iter()
            .filter(|action| action.round_completed == Some(round))
            .chain(self.queued_action.iter())
            .collect()
    }

    /// Most recently resolved action.
    #[must_use]
    pub fn last_action(&self) -> Option<&QueuedAction> {
        self.recent_actions.last()
    }

    // -------------------------------------------------------------------------
    // Rolls
    // -------------------------------------------------------------------------

    /// Rolls initiative: dexterity plus composure, both kept.
    pub fn roll_initiative<R: Rng + ?Sized>(&mut self, character: &Character, rng: &mut R) {
        self.initiative = character
            .check(&[Stat::Dexterity, Stat::Composure], None, 0)
            .with_stat_keep()
            .roll(rng)
            .result();
        self.tiebreaker = rng.gen_range(1..=1_000_000_000);
    }

    /// Evasion roll made when a flee is tested against blockers.
    pub fn roll_evasion<R: Rng + ?Sized>(character: &Character, rng: &mut R) -> i32 {
        character
            .check(&[Stat::Dexterity], Some(Skill::Dodge), 0)
            .roll(rng)
            .result()
    }

    /// Roll a blocker makes to stop a flee.
    pub fn roll_block<R: Rng + ?Sized>(character: &Character, rng: &mut R) -> i32 {
        character
            .check(&[Stat::Dexterity], Some(Skill::Brawl), 0)
            .roll(rng)
            .result()
    }

    // -------------------------------------------------------------------------
    // Fatigue
    // -------------------------------------------------------------------------

    /// Buffer of fatigue before penalties start.
    #[must_use]
    pub fn fatigue_soak(character: &Character) -> u32 {
        let traits = &character.traits;
        let soak = traits.stat(Stat::Willpower).max(traits.stat(Stat::Stamina))
            + traits.skill(Skill::Athletics);
        soak.max(2)
    }

    /// Chance to tire after acting. Mobs and tireless characters never tire,
    /// and at most one point is gained per round.
    #[allow(clippy::cast_possible_truncation)]
    pub fn roll_fatigue<R: Rng + ?Sized>(&mut self, character: &Character, rng: &mut R) {
        if character.mob.is_some() || character.never_tire {
            return;
        }
        let armor_penalty = f64::from(character.armor.penalty);
        self.fatigue.exertion += 1.0 + 0.12 * armor_penalty;
        let raw = (armor_penalty + self.fatigue.exertion + 25.0) as i32;
        let half = raw / 2;
        let difficulty = half + rng.gen_range(0..=half);
        let check: Check = character
            .check(
                &[Stat::Strength, Stat::Stamina, Stat::Dexterity, Stat::Willpower],
                Some(Skill::Athletics),
                difficulty,
            )
            .keep(Self::fatigue_soak(character))
            .divisor(2);
        let roll = check.roll(rng).result() + rng.gen_range(0..=25);
        if roll < 0 && self.fatigue.gained_this_round < 1.0 {
            self.fatigue.accrued += 0.5;
            self.fatigue.gained_this_round += 0.5;
        }
    }

    /// Fatigue beyond soak.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn fatigue_penalty(&self, character: &Character) -> i32 {
        let soak = i32::try_from(Self::fatigue_soak(character)).unwrap_or(i32::MAX);
        (self.fatigue.accrued as i32 - soak).max(0)
    }

    /// To-hit penalty from fatigue, capped at 30.
    #[must_use]
    pub fn fatigue_attack_penalty(&self, character: &Character) -> i32 {
        (self.fatigue_penalty(character) / 2).min(30)
    }

    /// Defense penalty from fatigue.
    #[must_use]
    pub fn fatigue_defense_penalty(&self, character: &Character) -> i32 {
        self.fatigue_penalty(character) * 2
    }

    /// Attack modifier from the GM and fatigue.
    #[must_use]
    pub fn total_attack_modifier(&self, character: &Character) -> i32 {
        self.modifiers.attack - self.fatigue_attack_penalty(character)
    }

    /// Defense modifier from the GM, fatigue, and being attacked repeatedly.
    #[must_use]
    pub fn total_defense_modifier(&self, character: &Character, config: &CombatConfig) -> i32 {
        let times = i32::try_from(self.times_attacked).unwrap_or(i32::MAX);
        let overwhelm = config
            .overwhelm_step
            .saturating_mul(times)
            .min(config.overwhelm_cap);
        self.modifiers.defense - self.fatigue_defense_penalty(character) - overwhelm
    }

    // -------------------------------------------------------------------------
    // Relationships
    // -------------------------------------------------------------------------

    /// Drops every reference to a character that left the fight.
    pub fn forget(&mut self, gone: CharacterId) {
        let purge = |list: &mut Vec<CharacterId>| list.retain(|id| *id != gone);
        purge(&mut self.foes);
        purge(&mut self.allies);
        purge(&mut self.targets);
        purge(&mut self.defenders);
        purge(&mut self.blockers);
        purge(&mut self.covering);
        purge(&mut self.covered_by);
        purge(&mut self.prevent_surrender);
        if self.prev_target == Some(gone) {
            self.prev_target = None;
        }
        if self.guarding == Some(gone) {
            self.guarding = None;
        }
        if self.block_flee == Some(gone) {
            self.block_flee = None;
        }
        if let Some(flag) = self.afk.as_mut() {
            flag.votes.retain(|id| *id != gone);
        }
    }
}
