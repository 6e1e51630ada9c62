//! Phase transitions: readying up, voting to end, and the start of each
//! setup and resolution phase.

use rand::seq::SliceRandom;
use tracing::{debug, info};

use super::{Fight, FightState};
use crate::action::QueuedAction;
use crate::attack::{list_to_string, pick_defender};
use crate::character::CharacterId;
use crate::error::CombatError;
use crate::output::NoticeKind;
use crate::participant::ParticipantState;
use crate::roster::Roster;

impl Fight {
    /// Runs the fight forward until it needs someone to act.
    pub(super) fn advance(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        loop {
            if self.is_over() {
                return Ok(());
            }
            match self.state {
                FightState::Setup => {
                    if !self.all_ready(&*roster) {
                        return Ok(());
                    }
                    self.begin_resolution(roster)?;
                }
                FightState::Resolution => match self.active {
                    Some(_) if self.awaiting_input => return Ok(()),
                    Some(id) => self.continue_turn(roster, id)?,
                    None => self.next_turn(roster)?,
                },
                FightState::Initializing | FightState::Ended => return Ok(()),
            }
        }
    }

    /// Everyone able to act is ready, and someone is able to act.
    fn all_ready(&self, roster: &dyn Roster) -> bool {
        let mut able = self
            .participants
            .values()
            .filter(|state| Self::is_conscious(roster, state.character()))
            .peekable();
        able.peek().is_some() && able.all(ParticipantState::is_ready)
    }

    // -------------------------------------------------------------------------
    // Setup
    // -------------------------------------------------------------------------

    /// Enters the setup phase of a new round.
    pub(super) fn enter_setup(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        self.state = FightState::Setup;
        self.active = None;
        self.awaiting_input = false;
        self.initiative.clear();
        self.votes_to_end.clear();
        self.prepare_round(roster)?;
        if self.is_over() {
            return Ok(());
        }
        self.broadcast(NoticeKind::Status, FightState::Setup.label());
        let table = self.phase_status(&*roster);
        self.broadcast(NoticeKind::Status, table);
        Ok(())
    }

    /// Ends a resolution phase and starts the next round's setup.
    pub(super) fn begin_setup(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        self.remove_surrendering(roster);
        if self.is_over() {
            return Ok(());
        }
        debug!(location = %self.location, round = self.round, "round complete");
        self.enter_setup(roster)
    }

    /// Resets everyone for a new round and queues automated attacks.
    fn prepare_round(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        let ids: Vec<CharacterId> = self.participants.keys().copied().collect();
        for id in &ids {
            let character = roster.require(*id)?;
            self.state_of_mut(*id)?.reset_round(character);
        }
        for id in ids {
            if self.is_over() {
                break;
            }
            let (automated, stood_down) = {
                let state = self.state_of(id)?;
                (state.is_automated(), state.wants_to_end)
            };
            if automated && stood_down {
                self.record_end_vote(&*roster, id);
                if self.is_over() {
                    break;
                }
                self.state_of_mut(id)?.queue(QueuedAction::pass(), &*roster);
                continue;
            }
            self.setup_attacks(roster, id)?;
        }
        if !self.is_over() && self.holdouts(&*roster).is_empty() && !self.votes_to_end.is_empty() {
            self.broadcast(NoticeKind::Status, "All participants have voted to end combat.");
            self.end_combat(roster);
        }
        Ok(())
    }

    /// Works out who a participant may attack and, for auto-attackers,
    /// queues an attack on one of them.
    pub(super) fn setup_attacks(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        let (lethal, prev_target, automated) = {
            let state = self.state_of(id)?;
            (state.lethal, state.prev_target, state.is_automated())
        };
        let targets = self.validate_targets(&*roster, id, lethal)?;
        let character = roster.require(id)?;
        if !character.autoattack {
            return Ok(());
        }
        let conscious = character.is_conscious();

        let picked = prev_target
            .filter(|target| targets.contains(target))
            .or_else(|| targets.choose(&mut self.rng).copied());
        let Some(mut target) = picked.filter(|_| conscious) else {
            let state = self.state_of_mut(id)?;
            state.queue(QueuedAction::pass(), &*roster);
            if automated {
                state.wants_to_end = true;
            }
            return Ok(());
        };

        let mut interference = None;
        if let Some(defender) = pick_defender(target, &*roster, &self.participants, &mut self.rng) {
            if defender != target {
                target = defender;
                interference = Some(format!(
                    " It was interfered with, forcing you to target {} instead.",
                    roster.name_of(defender)
                ));
            }
        }
        let name = roster.name_of(target);
        let mut action = if lethal {
            QueuedAction::kill(target, &name)
        } else {
            QueuedAction::attack(target, &name)
        };
        if let Some(note) = interference {
            action.narration.push_str(&note);
        }
        self.state_of_mut(id)?.queue(action, &*roster);
        Ok(())
    }

    /// Rebuilds a participant's target list from their foes, and from the
    /// foes of whoever they protect.
    ///
    /// Targets must be combatants standing here; unless `can_kill`, they
    /// must also be conscious.
    pub(super) fn validate_targets(
        &mut self,
        roster: &dyn Roster,
        id: CharacterId,
        can_kill: bool,
    ) -> Result<Vec<CharacterId>, CombatError> {
        let ward = self
            .state_of(id)?
            .guarding
            .filter(|ward| self.participants.contains_key(ward));
        if let Some(ward) = ward {
            let ward_foes = self.state_of(ward)?.foes.clone();
            let state = self.state_of_mut(id)?;
            for foe in ward_foes {
                state.add_foe(foe, roster);
            }
        }
        let targets: Vec<CharacterId> = self
            .state_of(id)?
            .foes
            .iter()
            .copied()
            .filter(|foe| self.participants.contains_key(foe))
            .filter(|foe| self.is_present(roster, *foe))
            .filter(|foe| can_kill || Self::is_conscious(roster, *foe))
            .collect();
        self.state_of_mut(id)?.targets.clone_from(&targets);
        Ok(targets)
    }

    // -------------------------------------------------------------------------
    // Readiness and votes
    // -------------------------------------------------------------------------

    /// Marks a participant ready to leave the setup phase. Once everyone is
    /// ready the fight moves on to resolution.
    ///
    /// During resolution this only clears an away flag.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants and participants who are already ready.
    pub fn ready(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        let phase = self.state;
        let state = self.caller_state_mut(id)?;
        if phase == FightState::Resolution {
            state.afk = None;
            return Ok(());
        }
        if state.is_ready() {
            return Err(CombatError::AlreadyReady);
        }
        state.set_ready(true);
        self.tell(id, NoticeKind::Status, "You have marked yourself as ready to proceed.");
        self.settle(roster)
    }

    /// Registers a vote to end the fight. The fight ends once every
    /// participant who can still fight has voted.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants and repeat votes.
    pub fn vote_to_end(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(id)?;
        if self.votes_to_end.contains(&id) {
            return Err(CombatError::AlreadyVotedToEnd);
        }
        self.record_end_vote(&*roster, id);
        if self.holdouts(&*roster).is_empty() {
            self.broadcast(NoticeKind::Status, "All participants have voted to end combat.");
            self.end_combat(roster);
            return Ok(());
        }
        let votes = self.vote_string(&*roster);
        self.broadcast(NoticeKind::Status, votes);
        Ok(())
    }

    fn record_end_vote(&mut self, roster: &dyn Roster, id: CharacterId) {
        if self.votes_to_end.contains(&id) {
            return;
        }
        self.votes_to_end.push(id);
        let name = roster.name_of(id);
        self.broadcast(NoticeKind::Status, format!("{name} has voted to end the fight."));
    }

    /// Participants whose vote is still needed to end the fight.
    pub(super) fn holdouts(&self, roster: &dyn Roster) -> Vec<CharacterId> {
        self.participants
            .values()
            .filter(|state| !state.is_automated() && !state.wants_to_end)
            .map(ParticipantState::character)
            .filter(|id| !self.votes_to_end.contains(id))
            .filter(|id| Self::is_conscious(roster, *id) && self.is_present(roster, *id))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Leaves setup: resolves flee attempts, rolls initiative and starts the
    /// first turn.
    pub(super) fn begin_resolution(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        self.round += 1;
        if self.round > self.config.max_rounds {
            info!(location = %self.location, max_rounds = self.config.max_rounds, "round limit reached");
            self.end_combat(roster);
            return Ok(());
        }
        self.state = FightState::Resolution;
        self.resolve_flee_attempts(&*roster)?;
        self.remove_departed(roster);
        if self.is_over() {
            return Ok(());
        }
        self.broadcast(NoticeKind::Status, FightState::Resolution.label());
        self.build_initiative(&*roster)?;
        debug!(location = %self.location, round = self.round, order = ?self.initiative, "initiative rolled");
        Ok(())
    }

    /// Tests every pending flee against its blockers. Covered participants
    /// get away unopposed.
    fn resolve_flee_attempts(&mut self, roster: &dyn Roster) -> Result<(), CombatError> {
        let fleeing: Vec<CharacterId> = self
            .participants
            .values()
            .filter(|state| state.flee.is_some())
            .map(ParticipantState::character)
            .collect();
        for id in fleeing {
            let (covered, blockers) = {
                let state = self.state_of(id)?;
                (!state.covered_by.is_empty(), state.blockers.clone())
            };
            let cleared = if covered {
                true
            } else {
                let evasion = ParticipantState::roll_evasion(roster.require(id)?, &mut self.rng);
                let mut stopped = false;
                for blocker in blockers {
                    let Some(character) = roster.get(blocker).filter(|c| c.is_conscious()) else {
                        continue;
                    };
                    if ParticipantState::roll_block(character, &mut self.rng) >= evasion {
                        debug!(fleeing = %id, %blocker, "flee blocked");
                        stopped = true;
                    }
                }
                !stopped
            };
            if let Some(flee) = self.state_of_mut(id)?.flee.as_mut() {
                flee.cleared = cleared;
            }
        }
        Ok(())
    }

    /// Drops combatants who are no longer standing here.
    fn remove_departed(&mut self, roster: &mut dyn Roster) {
        let departed: Vec<CharacterId> = self
            .participants
            .keys()
            .copied()
            .filter(|id| !self.is_present(&*roster, *id))
            .collect();
        for id in departed {
            if self.is_over() {
                return;
            }
            let name = roster.name_of(id);
            self.broadcast(
                NoticeKind::Narration,
                format!("{name} is no longer here. Removing them from combat."),
            );
            self.drop_participant(roster, id);
        }
    }

    /// Rolls initiative for everyone able to act, highest first.
    fn build_initiative(&mut self, roster: &dyn Roster) -> Result<(), CombatError> {
        let mut order = Vec::new();
        for state in self.participants.values_mut() {
            let character = roster.require(state.character())?;
            if !character.is_conscious() {
                continue;
            }
            state.roll_initiative(character, &mut self.rng);
            order.push((state.initiative, state.tiebreaker, state.character()));
        }
        order.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        self.initiative = order.into_iter().map(|(_, _, id)| id).collect();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Surrender
    // -------------------------------------------------------------------------

    /// Lets go of everyone surrendering whom nobody stops.
    pub(super) fn remove_surrendering(&mut self, roster: &mut dyn Roster) {
        let surrendering: Vec<(CharacterId, Vec<CharacterId>)> = self
            .participants
            .values()
            .filter(|state| state.surrendering)
            .map(|state| (state.character(), self.surrender_vetoes(state.character())))
            .collect();
        for (id, vetoes) in surrendering {
            if self.is_over() {
                return;
            }
            if vetoes.is_empty() {
                let name = roster.name_of(id);
                self.broadcast(NoticeKind::Narration, format!("{name} has surrendered."));
                self.drop_participant(roster, id);
                continue;
            }
            let names: Vec<String> = vetoes.iter().map(|v| roster.name_of(*v)).collect();
            if let Some(state) = self.participants.get_mut(&id) {
                state.surrendering = false;
            }
            self.tell(
                id,
                NoticeKind::Status,
                format!(
                    "Your surrender was prevented by {}.",
                    list_to_string(&names)
                ),
            );
        }
    }

    /// Combatants stopping `id` from surrendering.
    pub(super) fn surrender_vetoes(&self, id: CharacterId) -> Vec<CharacterId> {
        self.participants
            .values()
            .filter(|state| state.prevent_surrender.contains(&id))
            .map(ParticipantState::character)
            .collect()
    }
}
