//! Test helper functions for setting up characters, resolutions and fights.
//!
//! This module provides factory functions and setup utilities that make
//! writing tests more ergonomic and consistent.

use std::collections::BTreeMap;
use std::sync::Once;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::attack::{FightRules, ResolutionContext};
use crate::character::{Character, CharacterId, Exit, LocationId, Mob, Skill, Stat};
use crate::commands::{dispatch, Command};
use crate::config::CombatConfig;
use crate::fight::Fight;
use crate::output::{Notice, Outbox};
use crate::participant::ParticipantState;
use crate::registry::FightRegistry;
use crate::roster::{InMemoryRoster, Roster};

/// Location every test fight takes place in.
pub const HALL: LocationId = LocationId::new(1);

/// Location reached through the hall's `door` exit.
pub const YARD: LocationId = LocationId::new(2);

static TRACING: Once = Once::new();

/// Installs a tracing subscriber once per test binary.
///
/// Honors `RUST_LOG`; silent by default.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Character Factory Functions
// =============================================================================

/// A capable unarmed player character.
///
/// Strength, dexterity and stamina 3; brawl, melee and dodge 2. Fists can
/// parry and riposte.
///
/// # Arguments
///
/// * `name` - Display name
pub fn brute(name: &str) -> Character {
    let mut character = Character::player(CharacterId::new(0), name);
    for stat in [Stat::Strength, Stat::Dexterity, Stat::Stamina] {
        character.traits.set_stat(stat, 3);
    }
    for skill in [Skill::Brawl, Skill::Melee, Skill::Dodge] {
        character.traits.set_skill(skill, 2);
    }
    character
}

/// An automated brute that attacks on its own.
///
/// # Arguments
///
/// * `name` - Display name
pub fn thug(name: &str) -> Character {
    Character {
        controller: crate::character::Controller::Automated,
        autoattack: true,
        ..brute(name)
    }
}

/// An automated swarm of rats.
///
/// # Arguments
///
/// * `count` - Number of rats in the swarm
pub fn rat_swarm(count: u32) -> Character {
    let mut swarm = Character::automated(CharacterId::new(0), "rats");
    swarm.traits.set_stat(Stat::Dexterity, 2);
    swarm.traits.set_skill(Skill::Brawl, 1);
    swarm.mob = Some(Mob::new(count, "rat", "rats"));
    swarm
}

// =============================================================================
// Resolution Scenario Setup
// =============================================================================

/// The pieces of a fight that attack resolution borrows, owned directly so
/// tests can inspect and poke them between calls.
pub struct Scene {
    /// Characters.
    pub roster: InMemoryRoster,
    /// Participant states of everyone who joined.
    pub participants: BTreeMap<CharacterId, ParticipantState>,
    /// Seeded generator.
    pub rng: ChaCha8Rng,
    /// Tunables.
    pub config: CombatConfig,
    /// Narration produced so far.
    pub outbox: Outbox,
    /// Everyone who receives broadcasts.
    pub audience: Vec<CharacterId>,
    /// Damage rules; simulated damage at neutral risk by default.
    pub rules: FightRules,
}

impl Scene {
    /// Creates an empty scene.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the scene's generator
    pub fn new(seed: u64) -> Self {
        init_test_tracing();
        Self {
            roster: InMemoryRoster::new(),
            participants: BTreeMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            config: CombatConfig::default(),
            outbox: Outbox::new(),
            audience: Vec::new(),
            rules: FightRules {
                real_damage: false,
                random_deaths: false,
                risk: 4,
            },
        }
    }

    /// Adds a character to the roster and gives them participant state.
    ///
    /// # Returns
    ///
    /// The id the roster assigned.
    pub fn join(&mut self, character: Character) -> CharacterId {
        let id = self.roster.spawn(|id| Character { id, ..character }.at(HALL));
        let state = ParticipantState::new(self.character(id), self.rules.random_deaths, &self.config);
        self.participants.insert(id, state);
        self.audience.push(id);
        id
    }

    /// Adds a non-combatant who receives broadcasts.
    pub fn observer(&mut self, name: &str) -> CharacterId {
        let id = self.roster.spawn(|id| Character::player(id, name).at(HALL));
        self.audience.push(id);
        id
    }

    /// Borrows everything as a resolution context.
    pub fn ctx(&mut self) -> ResolutionContext<'_> {
        ResolutionContext {
            roster: &mut self.roster,
            participants: &mut self.participants,
            rng: &mut self.rng,
            config: &self.config,
            outbox: &mut self.outbox,
            audience: &self.audience,
            rules: self.rules,
        }
    }

    /// Looks up a character that must exist.
    pub fn character(&self, id: CharacterId) -> &Character {
        self.roster.get(id).expect("character in scene")
    }

    /// Mutable form of [`Scene::character`].
    pub fn character_mut(&mut self, id: CharacterId) -> &mut Character {
        self.roster.get_mut(id).expect("character in scene")
    }

    /// Participant state that must exist.
    pub fn state(&self, id: CharacterId) -> &ParticipantState {
        self.participants.get(&id).expect("participant in scene")
    }

    /// Mutable form of [`Scene::state`].
    pub fn state_mut(&mut self, id: CharacterId) -> &mut ParticipantState {
        self.participants.get_mut(&id).expect("participant in scene")
    }
}

// =============================================================================
// Fight Scenario Setup
// =============================================================================

/// A fight in the hall together with the roster it plays out against.
pub struct Stage {
    /// Characters.
    pub roster: InMemoryRoster,
    /// The fight under test.
    pub fight: Fight,
}

impl Stage {
    /// Creates a stage with an empty fight in the hall and a `door` exit to
    /// the yard.
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the fight's generator
    pub fn new(seed: u64) -> Self {
        init_test_tracing();
        let mut roster = InMemoryRoster::new();
        roster.add_exit(HALL, Exit::new("door", YARD));
        Self {
            roster,
            fight: Fight::new(HALL, seed, CombatConfig::default()),
        }
    }

    /// Puts a character in the hall without involving the fight.
    pub fn spawn(&mut self, character: Character) -> CharacterId {
        self.roster.spawn(|id| Character { id, ..character }.at(HALL))
    }

    /// Puts a character in the hall and adds them to the fight.
    pub fn enter(&mut self, character: Character) -> CharacterId {
        let id = self.spawn(character);
        self.fight
            .add_participant(&mut self.roster, id, None)
            .expect("character joins the fight");
        id
    }

    /// Finishes initialization, moving the fight into its first setup phase.
    pub fn begin(&mut self) {
        self.fight
            .finish_initialization(&mut self.roster)
            .expect("fight starts");
    }

    /// Looks up a character that must exist.
    pub fn character(&self, id: CharacterId) -> &Character {
        self.roster.get(id).expect("character on stage")
    }

    /// Mutable form of [`Stage::character`].
    pub fn character_mut(&mut self, id: CharacterId) -> &mut Character {
        self.roster.get_mut(id).expect("character on stage")
    }

    /// Whether any undelivered notice to `id` contains `fragment`.
    pub fn heard(&self, id: CharacterId, fragment: &str) -> bool {
        self.fight
            .outbox()
            .pending()
            .iter()
            .any(|notice| notice.is_for(id) && notice.text().contains(fragment))
    }

    /// Whether any undelivered notice contains `fragment`.
    pub fn said(&self, fragment: &str) -> bool {
        self.fight
            .outbox()
            .pending()
            .iter()
            .any(|notice| notice.text().contains(fragment))
    }
}

/// Sets up two players who have started fighting each other.
///
/// # Returns
///
/// The stage and the two combatants' ids, in join order.
pub fn duel(seed: u64) -> (Stage, CharacterId, CharacterId) {
    let mut stage = Stage::new(seed);
    let a = stage.enter(brute("Aldric"));
    let b = stage.spawn(brute("Brenna"));
    stage
        .fight
        .add_participant(&mut stage.roster, b, Some(a))
        .expect("second combatant joins");
    stage.begin();
    (stage, a, b)
}

// =============================================================================
// Command Surface Setup
// =============================================================================

/// A registry and roster driven only through [`dispatch`], with a clock.
pub struct Town {
    /// Fights by location.
    pub registry: FightRegistry,
    /// Characters.
    pub roster: InMemoryRoster,
    /// Seconds passed to every command.
    pub now: u64,
}

impl Town {
    /// Creates a town with a `door` from the hall to the yard.
    ///
    /// # Arguments
    ///
    /// * `seed` - Master seed of the registry
    pub fn new(seed: u64) -> Self {
        init_test_tracing();
        let mut roster = InMemoryRoster::new();
        roster.add_exit(HALL, Exit::new("door", YARD));
        Self {
            registry: FightRegistry::new(seed, CombatConfig::default()),
            roster,
            now: 0,
        }
    }

    /// Puts a character in the hall.
    pub fn spawn(&mut self, character: Character) -> CharacterId {
        self.roster.spawn(|id| Character { id, ..character }.at(HALL))
    }

    /// Issues a command as `caller`.
    ///
    /// # Returns
    ///
    /// The reply meant for the caller alone.
    pub fn run(&mut self, caller: CharacterId, command: Command) -> Option<String> {
        dispatch(&mut self.registry, &mut self.roster, caller, command, self.now)
    }

    /// The fight in the hall, which must exist.
    pub fn fight(&self) -> &Fight {
        self.registry.fight_at(HALL).expect("fight in the hall")
    }

    /// Whether a fight is running in the hall.
    pub fn fighting(&self) -> bool {
        self.registry.fight_at(HALL).is_some()
    }

    /// Looks up a character that must exist.
    pub fn character(&self, id: CharacterId) -> &Character {
        self.roster.get(id).expect("character in town")
    }

    /// Takes every undelivered notice.
    pub fn notices(&mut self) -> Vec<Notice> {
        self.registry.drain_notices()
    }
}
