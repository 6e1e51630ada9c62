//! Fights by location.
//!
//! At most one [`Fight`] runs per location. The [`FightRegistry`] creates
//! them, finds the one a character is involved in, runs housekeeping over
//! all of them and drops fights once they have ended. It is owned by
//! whatever models the world's locations and passed around explicitly.
//!
//! # Determinism
//!
//! Each new fight is seeded from the registry's own `ChaCha8Rng`, so a
//! registry created with the same seed hands out the same fight seeds in the
//! same order.
//!
//! # Example
//!
//! ```
//! use fray_core::character::{Character, LocationId};
//! use fray_core::config::CombatConfig;
//! use fray_core::fight::FightState;
//! use fray_core::registry::FightRegistry;
//! use fray_core::roster::InMemoryRoster;
//!
//! let hall = LocationId::new(1);
//! let mut roster = InMemoryRoster::new();
//! let a = roster.spawn(|id| Character::player(id, "Aldric").at(hall));
//! let b = roster.spawn(|id| Character::player(id, "Brenna").at(hall));
//!
//! let mut registry = FightRegistry::new(3, CombatConfig::default());
//! registry.start_fight(&mut roster, a, &[b])?;
//! assert_eq!(registry.fight_at(hall).map(|f| f.state()), Some(FightState::Setup));
//! # Ok::<(), fray_core::error::CombatError>(())
//! ```

use std::collections::BTreeMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info};

use crate::attack::FightRules;
use crate::character::{CharacterId, LocationId};
use crate::config::CombatConfig;
use crate::error::{CombatError, ErrorSeverity};
use crate::fight::Fight;
use crate::output::Notice;
use crate::roster::Roster;

/// Every running fight, keyed by location.
#[derive(Debug, Clone)]
pub struct FightRegistry {
    fights: BTreeMap<LocationId, Fight>,
    config: CombatConfig,
    rules: Option<FightRules>,
    seeds: ChaCha8Rng,
    /// Notices left behind by fights that were dropped.
    orphaned: Vec<Notice>,
}

impl FightRegistry {
    /// Creates an empty registry.
    ///
    /// # Arguments
    ///
    /// * `seed` - Master seed every fight's seed is drawn from
    /// * `config` - Tunables handed to each new fight
    #[must_use]
    pub fn new(seed: u64, config: CombatConfig) -> Self {
        Self {
            fights: BTreeMap::new(),
            config,
            rules: None,
            seeds: ChaCha8Rng::seed_from_u64(seed),
            orphaned: Vec::new(),
        }
    }

    /// Damage rules for fights started from now on.
    #[must_use]
    pub fn with_rules(mut self, rules: FightRules) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Tunables handed to new fights.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// The fight at a location.
    #[must_use]
    pub fn fight_at(&self, location: LocationId) -> Option<&Fight> {
        self.fights.get(&location)
    }

    /// Mutable form of [`FightRegistry::fight_at`].
    pub fn fight_at_mut(&mut self, location: LocationId) -> Option<&mut Fight> {
        self.fights.get_mut(&location)
    }

    /// Where the fight a character fights in or watches takes place.
    #[must_use]
    pub fn involvement(&self, roster: &dyn Roster, id: CharacterId) -> Option<LocationId> {
        let character = roster.get(id)?;
        character
            .engaged_at
            .or(character.watching)
            .filter(|location| self.fights.contains_key(location))
    }

    /// The fight at the character's current location.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::NoFightHere`] when there is none.
    pub fn fight_here_mut(&mut self, roster: &dyn Roster, id: CharacterId) -> Result<&mut Fight, CombatError> {
        let location = roster.require(id)?.location.ok_or(CombatError::NoFightHere)?;
        self.fights.get_mut(&location).ok_or(CombatError::NoFightHere)
    }

    /// Locations with a fight.
    pub fn locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.fights.keys().copied()
    }

    /// Number of fights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fights.len()
    }

    /// Whether no fight is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fights.is_empty()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Opens an empty fight at a location.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::FightAlreadyHere`] when one is running.
    pub fn start(&mut self, location: LocationId) -> Result<&mut Fight, CombatError> {
        if self.fights.contains_key(&location) {
            return Err(CombatError::FightAlreadyHere);
        }
        let seed = self.seeds.next_u64();
        let mut fight = Fight::new(location, seed, self.config.clone());
        if let Some(rules) = self.rules {
            fight = fight.with_rules(rules);
        }
        info!(%location, seed, "fight opened");
        Ok(self.fights.entry(location).or_insert(fight))
    }

    /// Starts or joins the fight at the starter's location, making every
    /// target a foe of the starter.
    ///
    /// A new fight needs at least one target; joining a running one does
    /// not. Targets already fighting simply become the starter's foes.
    ///
    /// # Errors
    ///
    /// Fails when the starter is nowhere, when there is no fight to join and
    /// no one to fight, and when a target cannot be fought here.
    pub fn start_fight(
        &mut self,
        roster: &mut dyn Roster,
        starter: CharacterId,
        targets: &[CharacterId],
    ) -> Result<(), CombatError> {
        let starter_name = roster.name_of(starter);
        let location = roster
            .require(starter)?
            .location
            .ok_or(CombatError::NotPresent { name: starter_name })?;
        for target in targets {
            if *target == starter {
                return Err(CombatError::SelfTarget);
            }
            let character = roster.require(*target)?;
            if !character.attackable {
                return Err(CombatError::NotAttackable {
                    name: character.display_name(),
                });
            }
            if character.location != Some(location) {
                return Err(CombatError::NotPresent {
                    name: character.display_name(),
                });
            }
        }

        let fresh = !self.fights.contains_key(&location);
        if fresh && targets.is_empty() {
            return Err(CombatError::NoFightHere);
        }
        let result = self.gather(roster, location, starter, targets, fresh);
        if result.is_err() && fresh {
            if let Some(mut fight) = self.fights.remove(&location) {
                fight.end_combat(roster);
                self.orphaned.extend(fight.drain_notices());
            }
        }
        self.reap();
        result
    }

    fn gather(
        &mut self,
        roster: &mut dyn Roster,
        location: LocationId,
        starter: CharacterId,
        targets: &[CharacterId],
        fresh: bool,
    ) -> Result<(), CombatError> {
        let fight = if fresh {
            self.start(location)?
        } else {
            self.fights.get_mut(&location).ok_or(CombatError::NoFightHere)?
        };
        tolerate_rejoin(fight.add_participant(roster, starter, None))?;
        for target in targets {
            tolerate_rejoin(fight.add_participant(roster, *target, Some(starter)))?;
        }
        fight.finish_initialization(roster)
    }

    /// Starts watching the fight at the character's location.
    ///
    /// # Errors
    ///
    /// Fails when there is no fight here or the character already takes
    /// part in it.
    pub fn observe(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        self.fight_here_mut(&*roster, id)?.add_observer(roster, id)
    }

    /// Stops watching whichever fight the character watches.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::NotObserving`] when they watch none.
    pub fn stop_observing(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        let location = roster.require(id)?.watching.ok_or(CombatError::NotObserving)?;
        match self.fights.get_mut(&location) {
            Some(fight) => fight.remove_observer(roster, id),
            None => {
                roster.require_mut(id)?.watching = None;
                Err(CombatError::NotObserving)
            }
        }
    }

    /// Runs periodic housekeeping for every fight that is due, then drops
    /// ended fights.
    ///
    /// A fight that fails fatally has already torn itself down; the error
    /// is logged and the other fights still get their turn.
    pub fn on_timer(&mut self, roster: &mut dyn Roster, now: u64) {
        for (location, fight) in &mut self.fights {
            if let Err(err) = fight.tick(roster, now) {
                match err.severity() {
                    ErrorSeverity::Fatal => error!(%location, error = %err, "housekeeping failed"),
                    _ => debug!(%location, error = %err, "housekeeping refused"),
                }
            }
        }
        self.reap();
    }

    /// Drops fights that have ended, keeping their undelivered notices.
    pub fn reap(&mut self) {
        let ended: Vec<LocationId> = self
            .fights
            .iter()
            .filter(|(_, fight)| fight.is_over())
            .map(|(location, _)| *location)
            .collect();
        for location in ended {
            if let Some(mut fight) = self.fights.remove(&location) {
                self.orphaned.extend(fight.drain_notices());
                info!(%location, "fight dropped");
            }
        }
    }

    /// Takes every undelivered notice from every fight, dropped fights
    /// first, then by location.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut notices = std::mem::take(&mut self.orphaned);
        for fight in self.fights.values_mut() {
            notices.extend(fight.drain_notices());
        }
        notices
    }
}

/// Joining a fight one is already in is not a failure when starting one.
fn tolerate_rejoin(result: Result<(), CombatError>) -> Result<(), CombatError> {
    match result {
        Err(CombatError::AlreadyFighting { .. }) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Character;
    use crate::fight::FightState;
    use crate::roster::InMemoryRoster;
    use crate::tests::{brute, init_test_tracing, HALL, YARD};

    /// Roster with three brutes in the hall.
    ///
    /// # Returns
    ///
    /// The roster and the brutes' ids.
    fn hall_of_three() -> (InMemoryRoster, [CharacterId; 3]) {
        init_test_tracing();
        let mut roster = InMemoryRoster::new();
        let ids = ["Aldric", "Brenna", "Cedric"]
            .map(|name| roster.spawn(|id| Character { id, ..brute(name) }.at(HALL)));
        (roster, ids)
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn starting_opens_a_fight_in_setup() {
            let (mut roster, [a, b, _]) = hall_of_three();
            let mut registry = FightRegistry::new(1, CombatConfig::default());
            registry.start_fight(&mut roster, a, &[b]).unwrap();
            let fight = registry.fight_at(HALL).unwrap();
            assert_eq!(fight.state(), FightState::Setup);
            assert_eq!(fight.participant_count(), 2);
            assert_eq!(registry.involvement(&roster, b), Some(HALL));
        }

        #[test]
        fn one_fight_per_location() {
            let mut registry = FightRegistry::new(2, CombatConfig::default());
            registry.start(HALL).unwrap();
            assert_eq!(registry.start(HALL).err(), Some(CombatError::FightAlreadyHere));
            registry.start(YARD).unwrap();
            assert_eq!(registry.len(), 2);
        }

        #[test]
        fn a_new_fight_needs_someone_to_fight() {
            let (mut roster, [a, _, _]) = hall_of_three();
            let mut registry = FightRegistry::new(3, CombatConfig::default());
            assert_eq!(
                registry.start_fight(&mut roster, a, &[]),
                Err(CombatError::NoFightHere)
            );
            assert_eq!(
                registry.start_fight(&mut roster, a, &[a]),
                Err(CombatError::SelfTarget)
            );
            assert!(registry.is_empty());
        }

        #[test]
        fn absent_targets_leave_no_fight_behind() {
            let (mut roster, [a, b, _]) = hall_of_three();
            roster.get_mut(b).unwrap().location = Some(YARD);
            let mut registry = FightRegistry::new(4, CombatConfig::default());
            assert_eq!(
                registry.start_fight(&mut roster, a, &[b]),
                Err(CombatError::NotPresent {
                    name: "Brenna".to_string()
                })
            );
            assert!(registry.is_empty());
            assert_eq!(roster.get(a).unwrap().engaged_at, None);
        }

        #[test]
        fn joining_a_running_fight() {
            let (mut roster, [a, b, c]) = hall_of_three();
            let mut registry = FightRegistry::new(5, CombatConfig::default());
            registry.start_fight(&mut roster, a, &[b]).unwrap();
            registry.start_fight(&mut roster, c, &[]).unwrap();
            let fight = registry.fight_at(HALL).unwrap();
            assert!(fight.is_participant(c));
            registry.start_fight(&mut roster, c, &[a]).unwrap();
            let fight = registry.fight_at(HALL).unwrap();
            assert!(fight.participant(a).unwrap().foes.contains(&c));
        }

        #[test]
        fn ended_fights_are_dropped_with_their_notices() {
            let (mut roster, [a, b, _]) = hall_of_three();
            let mut registry = FightRegistry::new(6, CombatConfig::default());
            registry.start_fight(&mut roster, a, &[b]).unwrap();
            registry.drain_notices();
            registry
                .fight_at_mut(HALL)
                .unwrap()
                .remove_participant(&mut roster, a)
                .unwrap();
            registry.reap();
            assert!(registry.fight_at(HALL).is_none());
            let notices = registry.drain_notices();
            assert!(notices.iter().any(|n| n.text() == "Ending combat."));
        }
    }

    mod timer_tests {
        use super::*;

        #[test]
        fn timer_ends_stalled_fights_once_due() {
            let (mut roster, [a, b, _]) = hall_of_three();
            let config = CombatConfig {
                round_delay_secs: 60,
                ..CombatConfig::default()
            };
            let mut registry = FightRegistry::new(9, config);
            registry.start_fight(&mut roster, a, &[b]).unwrap();
            for id in [a, b] {
                roster.get_mut(id).unwrap().health.vitality = crate::character::Vitality::Incapacitated;
            }
            registry.on_timer(&mut roster, 0);
            registry.on_timer(&mut roster, 59);
            assert!(registry.fight_at(HALL).is_some());
            registry.on_timer(&mut roster, 60);
            assert!(registry.fight_at(HALL).is_none());
        }
    }

    mod observer_tests {
        use super::*;

        #[test]
        fn watching_and_leaving() {
            let (mut roster, [a, b, c]) = hall_of_three();
            let mut registry = FightRegistry::new(7, CombatConfig::default());
            assert_eq!(registry.observe(&mut roster, c), Err(CombatError::NoFightHere));
            registry.start_fight(&mut roster, a, &[b]).unwrap();
            registry.observe(&mut roster, c).unwrap();
            assert_eq!(registry.involvement(&roster, c), Some(HALL));
            registry.stop_observing(&mut roster, c).unwrap();
            assert_eq!(
                registry.stop_observing(&mut roster, c),
                Err(CombatError::NotObserving)
            );
        }
    }

    mod seeding_tests {
        use super::*;

        #[test]
        fn same_master_seed_same_fights() {
            let run = || {
                let (mut roster, [a, b, _]) = hall_of_three();
                let mut registry = FightRegistry::new(8, CombatConfig::default());
                registry.start_fight(&mut roster, a, &[b]).unwrap();
                let fight = registry.fight_at_mut(HALL).unwrap();
                fight.ready(&mut roster, a).unwrap();
                fight.ready(&mut roster, b).unwrap();
                registry
                    .drain_notices()
                    .iter()
                    .map(|n| n.text().to_string())
                    .collect::<Vec<_>>()
            };
            assert_eq!(run(), run());
        }
    }
}
