//! Leaving a fight on one's own terms: fleeing, being caught, having a
//! retreat covered, and surrendering.
//!
//! Fleeing takes two steps. Declaring it costs nothing; at the start of the
//! next resolution phase the fleeing participant must out-roll everyone
//! trying to catch them. Once cleared, they leave on their turn or as soon
//! as they flee again. A participant whose retreat is covered always clears.

use tracing::info;

use super::{Fight, FightState};
use crate::attack::list_to_string;
use crate::character::CharacterId;
use crate::error::CombatError;
use crate::output::NoticeKind;
use crate::participant::FleeAttempt;
use crate::roster::Roster;

impl Fight {
    /// Declares an attempt to flee through the named exit, or completes a
    /// flee that has already cleared.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants, for anyone covering a retreat or unable to
    /// act, for unknown or forbidden exits, and for repeated declarations.
    pub fn flee(&mut self, roster: &mut dyn Roster, caller: CharacterId, exit_name: &str) -> Result<(), CombatError> {
        self.ensure_running()?;
        if !self.caller_state(caller)?.covering.is_empty() {
            return Err(CombatError::CoveringCannotFlee);
        }
        if !Self::is_conscious(&*roster, caller) {
            return Err(CombatError::Incapacitated);
        }
        let exit = roster
            .find_exit(self.location, exit_name)
            .ok_or_else(|| CombatError::NoSuchExit(exit_name.to_string()))?;
        if !roster.can_traverse(caller, &exit) {
            return Err(CombatError::NotPermittedToFlee);
        }

        let state = self.caller_state_mut(caller)?;
        state.afk = None;
        match state.flee.as_mut() {
            None => {
                state.flee = Some(FleeAttempt { exit, cleared: false });
                let name = roster.name_of(caller);
                self.tell(
                    caller,
                    NoticeKind::Status,
                    "If no one is able to stop you, executing flee next turn will let you run away. \
                     Attempting to flee does not take your action this turn.",
                );
                self.broadcast_except(
                    caller,
                    NoticeKind::Narration,
                    format!("{name} begins to try to withdraw from combat."),
                );
                Ok(())
            }
            Some(attempt) if attempt.cleared => {
                attempt.exit = exit;
                self.complete_flee(roster, caller)?;
                self.settle(roster)
            }
            Some(_) => Err(CombatError::AlreadyFleeing),
        }
    }

    /// Takes a cleared participant out of the fight and through their exit.
    pub(super) fn complete_flee(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        let Some(attempt) = self.state_of_mut(id)?.flee.take() else {
            return Ok(());
        };
        let name = roster.name_of(id);
        self.broadcast(NoticeKind::Narration, format!("{name} has fled from combat."));
        self.drop_participant(roster, id);
        roster.move_to(id, attempt.exit.destination)?;
        info!(location = %self.location, character = %id, destination = %attempt.exit.destination, "fled");
        Ok(())
    }

    /// Moves to stop `target` from fleeing. Catching someone new lets go of
    /// whoever was caught before.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants, for a target already being caught by the
    /// caller and for a target whose retreat the caller covers.
    pub fn catch(&mut self, roster: &mut dyn Roster, caller: CharacterId, target: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        if caller == target {
            return Err(CombatError::SelfTarget);
        }
        self.require_combatant(&*roster, target)?;
        let name = roster.name_of(target);
        let state = self.caller_state_mut(caller)?;
        if state.block_flee == Some(target) {
            return Err(CombatError::AlreadyCatching { name });
        }
        if state.covering.contains(&target) {
            return Err(CombatError::CatchingCovered { name });
        }
        state.afk = None;
        let previous = state.block_flee.replace(target);
        if let Some(previous) = previous.and_then(|p| self.participants.get_mut(&p)) {
            previous.blockers.retain(|id| *id != caller);
        }
        let blockers = &mut self.state_of_mut(target)?.blockers;
        if !blockers.contains(&caller) {
            blockers.push(caller);
        }
        let catcher = roster.name_of(caller);
        self.broadcast(
            NoticeKind::Narration,
            format!("{catcher} moves to stop {name} from being able to flee."),
        );
        Ok(())
    }

    /// Covers the retreat of each target. Covering does not use up the turn,
    /// but it must be declared on it.
    ///
    /// Targets that cannot be covered are reported and skipped.
    ///
    /// # Errors
    ///
    /// Fails outside the caller's turn, for targets who are not combatants,
    /// and when none of the targets could be covered.
    pub fn cover(&mut self, roster: &mut dyn Roster, caller: CharacterId, targets: &[CharacterId]) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        if self.state != FightState::Resolution || self.active != Some(caller) {
            return Err(CombatError::NotYourTurn);
        }
        for target in targets {
            self.require_combatant(&*roster, *target)?;
        }

        let mut refusals = Vec::new();
        let mut covered = 0;
        for &target in targets {
            let name = roster.name_of(target);
            let state = self.caller_state(caller)?;
            let refusal = if target == caller {
                Some("You cannot cover your own retreat.".to_string())
            } else if state.covered_by.contains(&target) {
                Some(format!("{name} is already covering you. You cannot cover their retreat."))
            } else if state.covering.contains(&target) {
                Some(format!("You are already covering {name}'s retreat."))
            } else if state.block_flee == Some(target) {
                Some(format!("You cannot cover the retreat of {name} while trying to catch them."))
            } else {
                None
            };
            if let Some(refusal) = refusal {
                refusals.push(refusal);
                continue;
            }
            self.caller_state_mut(caller)?.covering.push(target);
            self.state_of_mut(target)?.covered_by.push(caller);
            self.tell(caller, NoticeKind::Status, format!("You begin covering {name}'s retreat."));
            covered += 1;
        }
        if let Some(state) = self.participants.get_mut(&caller) {
            state.afk = None;
        }
        if covered == 0 && !refusals.is_empty() {
            return Err(CombatError::InvalidCover(refusals.join(" ")));
        }
        for refusal in refusals {
            self.tell(caller, NoticeKind::Status, refusal);
        }
        Ok(())
    }

    /// Stops covering one target, or everyone when `target` is `None`.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants and when the caller covers nobody matching.
    pub fn stop_cover(
        &mut self,
        roster: &mut dyn Roster,
        caller: CharacterId,
        target: Option<CharacterId>,
    ) -> Result<(), CombatError> {
        self.ensure_running()?;
        let covering = self.caller_state(caller)?.covering.clone();
        let released: Vec<CharacterId> = match target {
            None if covering.is_empty() => {
                return Err(CombatError::InvalidCover(
                    "You aren't covering anyone's retreat currently.".to_string(),
                ))
            }
            None => covering,
            Some(target) if covering.contains(&target) => vec![target],
            Some(target) => {
                return Err(CombatError::InvalidCover(format!(
                    "You are not covering {}'s retreat.",
                    roster.name_of(target)
                )))
            }
        };
        self.caller_state_mut(caller)?
            .covering
            .retain(|id| !released.contains(id));
        for id in &released {
            if let Some(state) = self.participants.get_mut(id) {
                state.covered_by.retain(|coverer| *coverer != caller);
            }
        }
        let message = match target {
            None => "You will no longer cover anyone's retreat.".to_string(),
            Some(target) => format!("You no longer cover {}'s retreat.", roster.name_of(target)),
        };
        self.tell(caller, NoticeKind::Status, message);
        Ok(())
    }

    /// Toggles a bid to surrender. Unless someone prevents it, a
    /// surrendering participant leaves the fight when the round ends.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants and when someone prevents the surrender.
    pub fn surrender(&mut self, roster: &mut dyn Roster, caller: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        let name = roster.name_of(caller);
        if self.caller_state(caller)?.surrendering {
            self.caller_state_mut(caller)?.surrendering = false;
            self.broadcast(NoticeKind::Narration, format!("{name} removes their bid to surrender."));
            return Ok(());
        }
        let vetoes = self.surrender_vetoes(caller);
        if !vetoes.is_empty() {
            let names: Vec<String> = vetoes.iter().map(|id| roster.name_of(*id)).collect();
            return Err(CombatError::SurrenderPrevented {
                names: list_to_string(&names),
            });
        }
        self.caller_state_mut(caller)?.surrendering = true;
        self.broadcast(
            NoticeKind::Narration,
            format!("{name} is attempting to surrender. They will leave combat if not prevented."),
        );
        Ok(())
    }

    /// Toggles whether the caller prevents `target` from surrendering.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn prevent_surrender(
        &mut self,
        roster: &mut dyn Roster,
        caller: CharacterId,
        target: CharacterId,
    ) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        self.require_combatant(&*roster, target)?;
        let name = roster.name_of(target);
        let list = &mut self.caller_state_mut(caller)?.prevent_surrender;
        let message = if list.contains(&target) {
            list.retain(|id| *id != target);
            format!("You no longer prevent the surrender of {name}.")
        } else {
            list.push(target);
            format!("You are preventing the surrender of {name}.")
        };
        self.tell(caller, NoticeKind::Status, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{brute, duel, Stage, HALL, YARD};

    /// Brings both duelists to resolution with `a` first to act.
    fn resolution_with_first(seed: u64) -> (Stage, CharacterId, CharacterId) {
        let (mut stage, a, b) = duel(seed);
        stage.fight.ready(&mut stage.roster, a).unwrap();
        stage.fight.ready(&mut stage.roster, b).unwrap();
        let first = stage.fight.active().unwrap();
        let second = if first == a { b } else { a };
        (stage, first, second)
    }

    mod flee_tests {
        use super::*;

        #[test]
        fn unopposed_flee_succeeds_next_round() {
            let (mut stage, a, b) = duel(60);
            let c = stage.spawn(brute("Cedric"));
            stage.fight.add_participant(&mut stage.roster, c, Some(a)).unwrap();
            stage.fight.flee(&mut stage.roster, c, "door").unwrap();
            assert!(stage.heard(c, "executing flee next turn will let you run away"));
            assert!(stage.heard(a, "Cedric begins to try to withdraw from combat."));
            assert_eq!(
                stage.fight.flee(&mut stage.roster, c, "door"),
                Err(CombatError::AlreadyFleeing)
            );

            for id in [a, b, c] {
                stage.fight.ready(&mut stage.roster, id).unwrap();
            }
            // A cleared flee also completes on its owner's turn, which may come first.
            if stage.fight.is_participant(c) {
                assert!(stage.fight.participant(c).unwrap().flee.as_ref().unwrap().cleared);
                stage.fight.flee(&mut stage.roster, c, "door").unwrap();
            }
            assert!(!stage.fight.is_participant(c));
            assert_eq!(stage.character(c).location, Some(YARD));
            assert!(stage.said("Cedric has fled from combat."));
            assert_eq!(stage.fight.participant_count(), 2);
        }

        #[test]
        fn flee_needs_a_real_exit() {
            let (mut stage, a, _) = duel(61);
            assert_eq!(
                stage.fight.flee(&mut stage.roster, a, "window"),
                Err(CombatError::NoSuchExit("window".to_string()))
            );
            stage.roster.bar(a, YARD);
            assert_eq!(
                stage.fight.flee(&mut stage.roster, a, "door"),
                Err(CombatError::NotPermittedToFlee)
            );
            assert_eq!(stage.character(a).location, Some(HALL));
        }

        #[test]
        fn a_sure_catcher_stops_the_flee() {
            let (mut stage, a, b) = duel(62);
            stage.character_mut(b).traits.set_stat(crate::character::Stat::Dexterity, 60);
            stage.fight.flee(&mut stage.roster, a, "door").unwrap();
            stage.fight.catch(&mut stage.roster, b, a).unwrap();
            assert!(stage.said("Brenna moves to stop Aldric from being able to flee."));
            assert_eq!(
                stage.fight.catch(&mut stage.roster, b, a),
                Err(CombatError::AlreadyCatching {
                    name: "Aldric".to_string()
                })
            );
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            let attempt = stage.fight.participant(a).unwrap().flee.clone().unwrap();
            assert!(!attempt.cleared);
            assert!(stage.fight.is_participant(a));
        }

        #[test]
        fn covering_rules_out_fleeing_and_catching() {
            let (mut stage, first, second) = resolution_with_first(63);
            stage.fight.cover(&mut stage.roster, first, &[second]).unwrap();
            assert!(stage.heard(first, "You begin covering"));
            assert_eq!(stage.fight.active(), Some(first));
            assert_eq!(
                stage.fight.flee(&mut stage.roster, first, "door"),
                Err(CombatError::CoveringCannotFlee)
            );
            stage.fight.flee(&mut stage.roster, second, "door").unwrap();
            stage.fight.catch(&mut stage.roster, first, second).unwrap_err();
            let state = stage.fight.participant(second).unwrap();
            assert_eq!(state.covered_by, vec![first]);
        }
    }

    mod cover_tests {
        use super::*;

        #[test]
        fn cover_only_on_own_turn() {
            let (mut stage, first, second) = resolution_with_first(64);
            assert_eq!(
                stage.fight.cover(&mut stage.roster, second, &[first]),
                Err(CombatError::NotYourTurn)
            );
        }

        #[test]
        fn invalid_cover_targets_are_refused() {
            let (mut stage, first, second) = resolution_with_first(65);
            stage.fight.cover(&mut stage.roster, first, &[second]).unwrap();
            let err = stage.fight.cover(&mut stage.roster, first, &[second]).unwrap_err();
            assert!(err.to_string().starts_with("You are already covering"));
        }

        #[test]
        fn stopping_cover_releases_the_covered() {
            let (mut stage, first, second) = resolution_with_first(66);
            stage.fight.cover(&mut stage.roster, first, &[second]).unwrap();
            stage.fight.stop_cover(&mut stage.roster, first, None).unwrap();
            assert!(stage.heard(first, "You will no longer cover anyone's retreat."));
            assert!(stage.fight.participant(second).unwrap().covered_by.is_empty());
            assert!(stage.fight.stop_cover(&mut stage.roster, first, None).is_err());
        }
    }

    mod surrender_tests {
        use super::*;

        #[test]
        fn surrender_toggles() {
            let (mut stage, a, _) = duel(67);
            stage.fight.surrender(&mut stage.roster, a).unwrap();
            assert!(stage.said("Aldric is attempting to surrender."));
            stage.fight.surrender(&mut stage.roster, a).unwrap();
            assert!(stage.said("Aldric removes their bid to surrender."));
            assert!(!stage.fight.participant(a).unwrap().surrendering);
        }

        #[test]
        fn prevented_surrender_is_refused() {
            let (mut stage, a, b) = duel(68);
            stage.fight.prevent_surrender(&mut stage.roster, b, a).unwrap();
            assert!(stage.heard(b, "You are preventing the surrender of Aldric."));
            assert_eq!(
                stage.fight.surrender(&mut stage.roster, a),
                Err(CombatError::SurrenderPrevented {
                    names: "Brenna".to_string()
                })
            );
            stage.fight.prevent_surrender(&mut stage.roster, b, a).unwrap();
            assert!(stage.heard(b, "You no longer prevent the surrender of Aldric."));
            stage.fight.surrender(&mut stage.roster, a).unwrap();
        }

        #[test]
        fn surrender_ends_a_duel_at_round_end() {
            let (mut stage, a, b) = duel(69);
            stage.fight.surrender(&mut stage.roster, a).unwrap();
            stage.fight.declare_pass(&mut stage.roster, a, false).unwrap();
            stage.fight.declare_pass(&mut stage.roster, b, false).unwrap();
            assert_eq!(stage.fight.state(), FightState::Ended);
            assert!(stage.said("Aldric has surrendered."));
        }
    }
}
