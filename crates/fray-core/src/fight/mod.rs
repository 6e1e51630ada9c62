//! The fight orchestrator.
//!
//! One [`Fight`] runs per location. It owns every participant's
//! [`ParticipantState`], the observers watching, the initiative order and the
//! fight's generator, and it is the only thing that moves the fight between
//! phases:
//!
//! 1. **Initializing**: combatants are being gathered; nothing advances.
//! 2. **Setup**: everyone declares an action or readies up. Once every
//!    able participant is ready the fight moves on.
//! 3. **Resolution**: initiative is rolled and participants act one at a
//!    time. When nobody has attacks left the fight returns to Setup.
//! 4. **Ended**: terminal; every participant has been released.
//!
//! # Driving a fight
//!
//! Every public operation runs to completion. After it has changed state the
//! fight advances as far as it can on its own (resolving automated turns,
//! starting new rounds) and stops when it needs someone to act. Waiting is
//! state, never a suspended computation.
//!
//! Characters are read and written through a [`Roster`] passed into each
//! call, and everything the fight has to say lands in its [`Outbox`].
//!
//! # Determinism
//!
//! Given the same seed, the same roster and the same sequence of calls, a
//! fight produces identical rolls and notices: participants are kept in a
//! `BTreeMap` and every random draw comes from one `ChaCha8Rng`.
//!
//! # Example
//!
//! ```
//! use fray_core::character::{Character, LocationId};
//! use fray_core::config::CombatConfig;
//! use fray_core::fight::{Fight, FightState};
//! use fray_core::roster::InMemoryRoster;
//!
//! let hall = LocationId::new(1);
//! let mut roster = InMemoryRoster::new();
//! let a = roster.spawn(|id| Character::player(id, "Aldric").at(hall));
//! let b = roster.spawn(|id| Character::player(id, "Brenna").at(hall));
//!
//! let mut fight = Fight::new(hall, 7, CombatConfig::default());
//! fight.add_participant(&mut roster, a, None)?;
//! fight.add_participant(&mut roster, b, Some(a))?;
//! fight.finish_initialization(&mut roster)?;
//! assert_eq!(fight.state(), FightState::Setup);
//!
//! fight.ready(&mut roster, a)?;
//! assert_eq!(fight.state(), FightState::Setup);
//! fight.ready(&mut roster, b)?;
//! assert_eq!(fight.state(), FightState::Resolution);
//! # Ok::<(), fray_core::error::CombatError>(())
//! ```

mod admin;
mod guard;
mod retreat;
mod rounds;
mod stall;
mod status;
mod turns;

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub use guard::{assign_guard, release_guard};
pub use stall::AfkOutcome;

use crate::attack::{FightRules, ResolutionContext};
use crate::character::{CharacterId, LocationId, Vitality};
use crate::config::CombatConfig;
use crate::error::{CombatError, ErrorSeverity};
use crate::output::{Notice, NoticeKind, Outbox};
use crate::participant::ParticipantState;
use crate::roster::Roster;
use crate::special_action::SpecialActionRegistry;

// =============================================================================
// Fight State
// =============================================================================

/// Where a fight is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FightState {
    /// Gathering combatants.
    Initializing,
    /// Declaring actions and readying up.
    Setup,
    /// Taking turns in initiative order.
    Resolution,
    /// Over.
    Ended,
}

impl FightState {
    /// Name shown to players.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Setup => "Setup Phase",
            Self::Resolution => "Resolution Phase",
            Self::Ended => "Ended",
        }
    }
}

impl fmt::Display for FightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Fight
// =============================================================================

/// A fight at one location.
#[derive(Debug, Clone)]
pub struct Fight {
    location: LocationId,
    state: FightState,
    /// Set by [`Fight::end_combat`]; turns every later removal into a plain
    /// detach.
    shutting_down: bool,
    participants: BTreeMap<CharacterId, ParticipantState>,
    observers: Vec<CharacterId>,
    gms: Vec<CharacterId>,
    round: u32,
    /// Participant whose turn it is.
    active: Option<CharacterId>,
    /// The active participant has been prompted and nothing happens until
    /// they (or a GM) respond.
    awaiting_input: bool,
    initiative: VecDeque<CharacterId>,
    votes_to_end: Vec<CharacterId>,
    specials: SpecialActionRegistry,
    managed: bool,
    idle_checks: u32,
    last_housekeeping: Option<u64>,
    rules: FightRules,
    config: CombatConfig,
    rng: ChaCha8Rng,
    outbox: Outbox,
}

impl Fight {
    /// Creates an empty fight in the `Initializing` state.
    ///
    /// Damage is real and automated attackers may kill until
    /// [`Fight::with_rules`] says otherwise.
    ///
    /// # Arguments
    ///
    /// * `location` - Where the fight happens
    /// * `seed` - Seed for every roll the fight makes
    /// * `config` - Tunables
    #[must_use]
    pub fn new(location: LocationId, seed: u64, config: CombatConfig) -> Self {
        let rules = FightRules {
            real_damage: true,
            random_deaths: true,
            risk: config.default_risk,
        };
        Self {
            location,
            state: FightState::Initializing,
            shutting_down: false,
            participants: BTreeMap::new(),
            observers: Vec::new(),
            gms: Vec::new(),
            round: 0,
            active: None,
            awaiting_input: false,
            initiative: VecDeque::new(),
            votes_to_end: Vec::new(),
            specials: SpecialActionRegistry::new(),
            managed: false,
            idle_checks: 0,
            last_housekeeping: None,
            rules,
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox: Outbox::new(),
        }
    }

    /// Replaces the damage rules.
    #[must_use]
    pub fn with_rules(mut self, rules: FightRules) -> Self {
        self.rules = rules;
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Where the fight happens.
    #[must_use]
    pub const fn location(&self) -> LocationId {
        self.location
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> FightState {
        self.state
    }

    /// Whether the fight is over or being torn down.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.shutting_down || self.state == FightState::Ended
    }

    /// Rounds resolved so far, counting the current one.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Participant whose turn it is.
    #[must_use]
    pub const fn active(&self) -> Option<CharacterId> {
        self.active
    }

    /// Whether the fight is waiting on the active participant or a GM.
    #[must_use]
    pub const fn is_awaiting_input(&self) -> bool {
        self.awaiting_input
    }

    /// Participants still to act this round, in order.
    pub fn turn_order(&self) -> impl Iterator<Item = CharacterId> + '_ {
        self.initiative.iter().copied()
    }

    /// State of one participant.
    #[must_use]
    pub fn participant(&self, id: CharacterId) -> Option<&ParticipantState> {
        self.participants.get(&id)
    }

    /// Whether a character is a combatant here.
    #[must_use]
    pub fn is_participant(&self, id: CharacterId) -> bool {
        self.participants.contains_key(&id)
    }

    /// Every participant, in id order.
    pub fn participants(&self) -> impl Iterator<Item = &ParticipantState> {
        self.participants.values()
    }

    /// Number of combatants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Characters watching without fighting.
    #[must_use]
    pub fn observers(&self) -> &[CharacterId] {
        &self.observers
    }

    /// GMs presiding over the fight.
    #[must_use]
    pub fn gms(&self) -> &[CharacterId] {
        &self.gms
    }

    /// Whether a GM paces the turns.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.managed
    }

    /// Damage rules.
    #[must_use]
    pub const fn rules(&self) -> FightRules {
        self.rules
    }

    /// Tunables.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// GM-authored special actions.
    #[must_use]
    pub const fn specials(&self) -> &SpecialActionRegistry {
        &self.specials
    }

    /// Characters who have voted to end the fight.
    #[must_use]
    pub fn votes_to_end(&self) -> &[CharacterId] {
        &self.votes_to_end
    }

    /// Undelivered notices.
    #[must_use]
    pub const fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Takes every undelivered notice.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.outbox.drain()
    }

    // -------------------------------------------------------------------------
    // Messaging
    // -------------------------------------------------------------------------

    /// Everyone who sees fight-wide messages: combatants, observers and GMs.
    fn audience(&self) -> Vec<CharacterId> {
        let mut audience: Vec<CharacterId> = self.participants.keys().copied().collect();
        for id in self.observers.iter().chain(&self.gms) {
            if !audience.contains(id) {
                audience.push(*id);
            }
        }
        audience
    }

    fn broadcast(&mut self, kind: NoticeKind, text: impl Into<String>) {
        let audience = self.audience();
        self.outbox.push(audience, kind, text);
    }

    fn broadcast_except(&mut self, skip: CharacterId, kind: NoticeKind, text: impl Into<String>) {
        let mut audience = self.audience();
        audience.retain(|id| *id != skip);
        self.outbox.push(audience, kind, text);
    }

    fn tell(&mut self, to: CharacterId, kind: NoticeKind, text: impl Into<String>) {
        self.outbox.tell(to, kind, text);
    }

    fn tell_gms(&mut self, text: impl Into<String>) {
        self.outbox.push(self.gms.clone(), NoticeKind::Gm, text);
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    fn state_of(&self, id: CharacterId) -> Result<&ParticipantState, CombatError> {
        self.participants
            .get(&id)
            .ok_or(CombatError::MissingParticipant(id))
    }

    fn state_of_mut(&mut self, id: CharacterId) -> Result<&mut ParticipantState, CombatError> {
        self.participants
            .get_mut(&id)
            .ok_or(CombatError::MissingParticipant(id))
    }

    /// State of the character issuing a command.
    fn caller_state(&self, caller: CharacterId) -> Result<&ParticipantState, CombatError> {
        self.participants.get(&caller).ok_or(CombatError::NotInFight)
    }

    fn caller_state_mut(&mut self, caller: CharacterId) -> Result<&mut ParticipantState, CombatError> {
        self.participants
            .get_mut(&caller)
            .ok_or(CombatError::NotInFight)
    }

    /// Fails unless `id` is a combatant, naming them in the error.
    fn require_combatant(&self, roster: &dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        if self.participants.contains_key(&id) {
            Ok(())
        } else {
            Err(CombatError::NotACombatant {
                name: roster.name_of(id),
            })
        }
    }

    fn ensure_running(&self) -> Result<(), CombatError> {
        if self.is_over() {
            Err(CombatError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn is_present(&self, roster: &dyn Roster, id: CharacterId) -> bool {
        roster
            .get(id)
            .is_some_and(|c| c.location == Some(self.location))
    }

    fn is_conscious(roster: &dyn Roster, id: CharacterId) -> bool {
        roster.get(id).is_some_and(|c| c.is_conscious())
    }

    /// Borrows the fight's pieces as a [`ResolutionContext`] for one call.
    fn with_context<T>(
        &mut self,
        roster: &mut dyn Roster,
        resolve: impl FnOnce(&mut ResolutionContext<'_>) -> T,
    ) -> T {
        let audience = self.audience();
        let mut ctx = ResolutionContext {
            roster,
            participants: &mut self.participants,
            rng: &mut self.rng,
            config: &self.config,
            outbox: &mut self.outbox,
            audience: &audience,
            rules: self.rules,
        };
        resolve(&mut ctx)
    }

    // -------------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------------

    /// Adds a character as a combatant.
    ///
    /// With `added_by`, the two become foes of each other. A character who
    /// is already fighting is not added again, but still becomes the adder's
    /// foe. Anyone protecting the newcomer is drawn in with them.
    ///
    /// # Errors
    ///
    /// Fails when the fight is ending, or the character is already a
    /// combatant, cannot be attacked, or is somewhere else.
    pub fn add_participant(
        &mut self,
        roster: &mut dyn Roster,
        id: CharacterId,
        added_by: Option<CharacterId>,
    ) -> Result<(), CombatError> {
        self.ensure_running()?;
        let adder = added_by.filter(|adder| *adder != id);
        let character = roster.require(id)?;
        let name = character.display_name();
        if self.participants.contains_key(&id) {
            if let Some(adder) = adder {
                self.make_foes(&*roster, adder, id);
            }
            return Err(CombatError::AlreadyFighting { name });
        }
        if !character.attackable {
            return Err(CombatError::NotAttackable { name });
        }
        if character.location != Some(self.location) {
            return Err(CombatError::NotPresent { name });
        }

        let state = ParticipantState::new(character, self.rules.random_deaths, &self.config);
        let guarding = character.guarding;
        let protectors = character.defenders.clone();
        {
            let character = roster.require_mut(id)?;
            character.watching = None;
            character.engaged_at = Some(self.location);
        }
        self.observers.retain(|observer| *observer != id);
        self.participants.insert(id, state);
        info!(location = %self.location, character = %id, "participant joined");

        match adder {
            None => self.tell(id, NoticeKind::Status, "You have entered combat."),
            Some(adder) => {
                self.make_foes(&*roster, adder, id);
                if let Some(state) = self.participants.get_mut(&adder) {
                    state.prev_target.get_or_insert(id);
                }
                if let Some(state) = self.participants.get_mut(&id) {
                    state.prev_target = Some(adder);
                }
                self.tell(adder, NoticeKind::Status, format!("You have added {name} to a fight."));
                if self.state == FightState::Resolution {
                    self.setup_attacks(roster, adder)?;
                    self.setup_attacks(roster, id)?;
                }
            }
        }
        if self.state == FightState::Resolution {
            self.initiative.push_back(id);
        }

        if let Some(ward) = guarding {
            if self.participants.contains_key(&ward) {
                self.add_defender(roster, ward, id)?;
            }
        }
        for protector in protectors {
            self.add_defender(roster, id, protector)?;
        }
        Ok(())
    }

    fn make_foes(&mut self, roster: &dyn Roster, a: CharacterId, b: CharacterId) {
        if let Some(state) = self.participants.get_mut(&a) {
            state.add_foe(b, roster);
        }
        if let Some(state) = self.participants.get_mut(&b) {
            state.add_foe(a, roster);
        }
    }

    /// Leaves `Initializing`: resets everyone for the first round and shows
    /// the status table. Does nothing once the fight has started.
    ///
    /// # Errors
    ///
    /// Propagates roster errors from the first round's preparation.
    pub fn finish_initialization(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        if self.state != FightState::Initializing || self.is_over() {
            return Ok(());
        }
        info!(location = %self.location, participants = self.participants.len(), "fight started");
        self.enter_setup(roster)?;
        self.settle(roster)
    }

    /// Starts watching the fight.
    ///
    /// # Errors
    ///
    /// Fails for combatants and characters already watching.
    pub fn add_observer(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        if let Some(state) = self.participants.get(&id) {
            return Err(CombatError::AlreadyFighting {
                name: roster.name_of(state.character()),
            });
        }
        if self.observers.contains(&id) {
            return Err(CombatError::AlreadyObserving);
        }
        roster.require_mut(id)?.watching = Some(self.location);
        self.observers.push(id);
        self.tell(id, NoticeKind::Status, "You start spectating the fight.");
        Ok(())
    }

    /// Stops watching the fight.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::NotObserving`] for anyone not watching.
    pub fn remove_observer(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        if !self.observers.contains(&id) {
            return Err(CombatError::NotObserving);
        }
        self.observers.retain(|observer| *observer != id);
        if let Some(character) = roster.get_mut(id) {
            character.watching = None;
        }
        self.tell(id, NoticeKind::Status, "You stop spectating the fight.");
        Ok(())
    }

    /// Removes a combatant and lets the fight carry on without them.
    ///
    /// The fight ends if fewer than two combatants remain. Removing someone
    /// who is not a combatant does nothing.
    ///
    /// # Errors
    ///
    /// Propagates errors from advancing the fight afterwards.
    pub fn remove_participant(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        self.drop_participant(roster, id);
        self.settle(roster)
    }

    /// Removal without advancing the fight, for use mid-turn.
    fn drop_participant(&mut self, roster: &mut dyn Roster, id: CharacterId) {
        if !self.participants.contains_key(&id) {
            return;
        }
        let name = roster.name_of(id);
        self.detach(roster, id);
        self.tell(id, NoticeKind::Status, "You are no longer in the fight.");
        self.broadcast(NoticeKind::Narration, format!("{name} has left the fight."));
        if self.shutting_down {
            return;
        }
        if self.participants.len() < 2 && self.state != FightState::Initializing {
            self.end_combat(roster);
        }
    }

    /// Takes a combatant out and purges every reference to them.
    fn detach(&mut self, roster: &mut dyn Roster, id: CharacterId) {
        if self.participants.remove(&id).is_none() {
            return;
        }
        for other in self.participants.values_mut() {
            other.forget(id);
        }
        self.initiative.retain(|queued| *queued != id);
        self.votes_to_end.retain(|voter| *voter != id);
        if self.active == Some(id) {
            self.active = None;
            self.awaiting_input = false;
        }
        match roster.get_mut(id) {
            Some(character) => {
                character.engaged_at = None;
                character.health.temp_damage = 0;
                if !self.rules.real_damage && character.health.vitality == Vitality::Incapacitated {
                    character.health.vitality = Vitality::Conscious;
                }
                if let Some(mob) = character.mob.as_mut() {
                    mob.temp_losses = 0;
                }
            }
            None => warn!(location = %self.location, character = %id, "departing combatant missing from roster"),
        }
        info!(
            location = %self.location,
            character = %id,
            remaining = self.participants.len(),
            "participant left"
        );
    }

    /// Moves a combatant to the observers.
    fn demote_to_observer(&mut self, roster: &mut dyn Roster, id: CharacterId) {
        self.drop_participant(roster, id);
        if self.is_over() {
            return;
        }
        if let Some(character) = roster.get_mut(id) {
            character.watching = Some(self.location);
            self.observers.push(id);
        }
    }

    /// Ends the fight, releasing every combatant and observer.
    ///
    /// Calling it again, or from inside a removal it triggered, does nothing.
    pub fn end_combat(&mut self, roster: &mut dyn Roster) {
        if self.is_over() {
            return;
        }
        self.shutting_down = true;
        self.broadcast(NoticeKind::Status, "Ending combat.");
        let combatants: Vec<CharacterId> = self.participants.keys().copied().collect();
        for id in combatants {
            self.detach(roster, id);
            self.tell(id, NoticeKind::Status, "You are no longer in the fight.");
        }
        for id in std::mem::take(&mut self.observers) {
            match roster.get_mut(id) {
                Some(character) => character.watching = None,
                None => warn!(location = %self.location, character = %id, "observer missing from roster"),
            }
        }
        self.gms.clear();
        self.initiative.clear();
        self.active = None;
        self.awaiting_input = false;
        self.state = FightState::Ended;
        info!(location = %self.location, round = self.round, "fight ended");
    }

    /// Tears the fight down after an error it cannot recover from.
    fn abort(&mut self, roster: &mut dyn Roster, err: &CombatError) {
        error!(location = %self.location, round = self.round, error = %err, "fight aborted");
        self.end_combat(roster);
        self.state = FightState::Ended;
    }

    /// Advances the fight as far as it goes without input. A fatal error
    /// tears the fight down before it is returned.
    fn settle(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        let result = self.advance(roster);
        if let Err(err) = &result {
            if err.severity() == ErrorSeverity::Fatal {
                self.abort(roster, err);
            }
        }
        result
    }
}
