//! Keeping a fight moving when people stop responding.
//!
//! Players who hold the fight up can be flagged as away. The first flag is
//! a nudge; once the grace period has passed, every other player able to
//! fight must vote before the stalled participant is moved to the
//! observers. A periodic timer also ends fights nobody is taking part in any
//! more.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Fight, FightState};
use crate::action::ActionKind;
use crate::character::CharacterId;
use crate::error::{CombatError, ErrorSeverity};
use crate::output::NoticeKind;
use crate::participant::{AfkFlag, ParticipantState};
use crate::roster::Roster;

/// What a flag against a stalling participant achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfkOutcome {
    /// First flag: the participant was asked to act.
    Nudged,
    /// A vote for removal was recorded.
    Voted,
    /// The vote was unanimous and the participant now observes.
    Removed,
}

impl Fight {
    /// Flags `target` as holding up the fight.
    ///
    /// `now` is the current time in seconds; the caller's clock decides how
    /// long the grace period really lasts.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants, for flagging oneself, for a target who is
    /// not holding anything up, during the grace period and for repeat votes.
    pub fn flag_afk(
        &mut self,
        roster: &mut dyn Roster,
        voter: CharacterId,
        target: CharacterId,
        now: u64,
    ) -> Result<AfkOutcome, CombatError> {
        self.ensure_running()?;
        self.caller_state(voter)?;
        if voter == target {
            return Err(CombatError::CannotFlagSelf);
        }
        self.require_combatant(&*roster, target)?;
        let name = roster.name_of(target);
        let stalling = match self.state {
            FightState::Setup => !self.state_of(target)?.is_ready(),
            FightState::Resolution => self.active == Some(target),
            FightState::Initializing | FightState::Ended => false,
        };
        if !stalling {
            return Err(CombatError::NotStalling { name });
        }

        let grace = self.config.afk_grace_secs;
        let state = self.state_of_mut(target)?;
        let Some(flag) = state.afk.as_mut() else {
            state.afk = Some(AfkFlag {
                flagged_at: now,
                votes: Vec::new(),
            });
            let voter_name = roster.name_of(voter);
            self.tell(
                target,
                NoticeKind::Status,
                format!("{voter_name} is checking if you are AFK. Please take an action within a few minutes."),
            );
            self.tell(voter, NoticeKind::Status, format!("You have nudged {name} to take an action."));
            return Ok(AfkOutcome::Nudged);
        };
        let elapsed = now.saturating_sub(flag.flagged_at);
        if elapsed < grace {
            return Err(CombatError::AfkGrace {
                name,
                remaining: grace - elapsed,
            });
        }
        if flag.votes.contains(&voter) {
            return Err(CombatError::AlreadyVotedAfk { name });
        }
        flag.votes.push(voter);
        let votes = flag.votes.clone();

        let required: Vec<CharacterId> = self
            .participants
            .values()
            .filter(|state| !state.is_automated())
            .map(ParticipantState::character)
            .filter(|id| *id != target)
            .filter(|id| Self::is_conscious(&*roster, *id) && self.is_present(&*roster, *id))
            .collect();
        if required.iter().all(|id| votes.contains(id)) {
            info!(location = %self.location, character = %target, "removed for inactivity");
            self.broadcast(
                NoticeKind::Status,
                format!("Removing {name} from combat due to inactivity."),
            );
            self.demote_to_observer(roster, target);
            self.settle(roster)?;
            return Ok(AfkOutcome::Removed);
        }
        self.tell(
            target,
            NoticeKind::Status,
            "A vote has been lodged for your removal from combat due to inactivity.",
        );
        Ok(AfkOutcome::Voted)
    }

    /// Periodic housekeeping.
    ///
    /// Ends fights with nobody left to fight, lets go of unopposed
    /// surrenders, nudges the fight forward and reminds everyone where it
    /// stands. A GM-managed fight is given a few idle checks before it is
    /// ended.
    ///
    /// # Errors
    ///
    /// Propagates fatal errors after tearing the fight down.
    pub fn on_timer(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        if self.is_over() || self.state == FightState::Initializing {
            return Ok(());
        }
        if self.participants.is_empty() {
            if self.idle_allows_ending() {
                self.broadcast(NoticeKind::Status, "No combatants found. Exiting.");
                self.end_combat(roster);
            }
            return Ok(());
        }
        let anyone_fighting = self.participants.values().any(|state| {
            let standing_down = state.is_automated()
                && state
                    .queued_action
                    .as_ref()
                    .is_some_and(|action| action.kind == ActionKind::Pass);
            Self::is_conscious(&*roster, state.character()) && !standing_down
        });
        if !anyone_fighting && self.idle_allows_ending() {
            self.broadcast(
                NoticeKind::Status,
                "All combatants are incapacitated or automated npcs who are passing their turn. Exiting.",
            );
            self.end_combat(roster);
            return Ok(());
        }

        if self.state == FightState::Setup {
            self.remove_surrendering(roster);
        }
        match self.settle(roster) {
            Err(err) if err.severity() != ErrorSeverity::Fatal => {
                debug!(location = %self.location, error = %err, "timer could not advance the fight");
            }
            result => result?,
        }
        if !self.is_over() {
            self.broadcast(NoticeKind::Status, "Use the status command to see the current combat status.");
        }
        Ok(())
    }

    /// Runs [`Fight::on_timer`] once `round_delay_secs` have passed since
    /// the previous run. The first call only starts the clock.
    ///
    /// # Returns
    ///
    /// Whether housekeeping ran.
    ///
    /// # Errors
    ///
    /// Propagates housekeeping failures.
    pub fn tick(&mut self, roster: &mut dyn Roster, now: u64) -> Result<bool, CombatError> {
        match self.last_housekeeping {
            None => {
                self.last_housekeeping = Some(now);
                Ok(false)
            }
            Some(last) if now.saturating_sub(last) < self.config.round_delay_secs => Ok(false),
            Some(_) => {
                self.last_housekeeping = Some(now);
                self.on_timer(roster)?;
                Ok(true)
            }
        }
    }

    /// Managed fights tolerate a few idle checks before ending.
    fn idle_allows_ending(&mut self) -> bool {
        if !self.managed || self.idle_checks >= self.config.managed_idle_limit {
            return true;
        }
        self.idle_checks += 1;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{brute, duel};

    const GRACE: u64 = 120;

    mod afk_tests {
        use super::*;

        #[test]
        fn first_flag_only_nudges() {
            let (mut stage, a, b) = duel(80);
            let outcome = stage.fight.flag_afk(&mut stage.roster, a, b, 1_000).unwrap();
            assert_eq!(outcome, AfkOutcome::Nudged);
            assert!(stage.heard(b, "Aldric is checking if you are AFK."));
            assert_eq!(
                stage.fight.flag_afk(&mut stage.roster, a, b, 1_010),
                Err(CombatError::AfkGrace {
                    name: "Brenna".to_string(),
                    remaining: GRACE - 10
                })
            );
        }

        #[test]
        fn unanimous_votes_move_the_staller_to_observers() {
            let (mut stage, a, b) = duel(81);
            let c = stage.spawn(brute("Cedric"));
            stage.fight.add_participant(&mut stage.roster, c, Some(a)).unwrap();
            let later = 1_000 + GRACE;
            stage.fight.flag_afk(&mut stage.roster, a, b, 1_000).unwrap();
            assert_eq!(
                stage.fight.flag_afk(&mut stage.roster, a, b, later),
                Ok(AfkOutcome::Voted)
            );
            assert!(stage.heard(b, "A vote has been lodged for your removal"));
            assert_eq!(
                stage.fight.flag_afk(&mut stage.roster, a, b, later),
                Err(CombatError::AlreadyVotedAfk {
                    name: "Brenna".to_string()
                })
            );
            assert_eq!(
                stage.fight.flag_afk(&mut stage.roster, c, b, later),
                Ok(AfkOutcome::Removed)
            );
            assert!(!stage.fight.is_participant(b));
            assert!(stage.fight.observers().contains(&b));
            assert_eq!(stage.character(b).watching, Some(crate::tests::HALL));
        }

        #[test]
        fn ready_participants_are_not_stalling() {
            let (mut stage, a, b) = duel(82);
            stage.fight.ready(&mut stage.roster, b).unwrap();
            assert_eq!(
                stage.fight.flag_afk(&mut stage.roster, a, b, 0),
                Err(CombatError::NotStalling {
                    name: "Brenna".to_string()
                })
            );
            assert_eq!(
                stage.fight.flag_afk(&mut stage.roster, a, a, 0),
                Err(CombatError::CannotFlagSelf)
            );
        }

        #[test]
        fn acting_clears_the_flag() {
            let (mut stage, a, b) = duel(83);
            stage.fight.flag_afk(&mut stage.roster, a, b, 0).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            assert!(stage.fight.participant(b).unwrap().afk.is_none());
        }
    }

    mod timer_tests {
        use super::*;

        #[test]
        fn fights_of_the_fallen_end() {
            let (mut stage, a, b) = duel(84);
            for id in [a, b] {
                stage.character_mut(id).health.vitality = crate::character::Vitality::Incapacitated;
            }
            stage.fight.on_timer(&mut stage.roster).unwrap();
            assert!(stage.said("All combatants are incapacitated"));
            assert_eq!(stage.fight.state(), FightState::Ended);
        }

        #[test]
        fn managed_fights_get_idle_checks() {
            let (mut stage, a, b) = duel(85);
            let gm = stage.spawn(brute("Narrator"));
            stage.fight.toggle_managed(&mut stage.roster, gm).unwrap();
            for id in [a, b] {
                stage.character_mut(id).health.vitality = crate::character::Vitality::Incapacitated;
            }
            let limit = stage.fight.config().managed_idle_limit;
            for _ in 0..limit {
                stage.fight.on_timer(&mut stage.roster).unwrap();
                assert!(!stage.fight.is_over());
            }
            stage.fight.on_timer(&mut stage.roster).unwrap();
            assert!(stage.fight.is_over());
        }

        #[test]
        fn timer_reminds_active_fights() {
            let (mut stage, _, _) = duel(86);
            stage.fight.drain_notices();
            stage.fight.on_timer(&mut stage.roster).unwrap();
            assert!(stage.said("Use the status command"));
            assert_eq!(stage.fight.state(), FightState::Setup);
        }

        #[test]
        fn housekeeping_waits_for_the_round_delay() {
            let (mut stage, _, _) = duel(87);
            let delay = stage.fight.config().round_delay_secs;
            stage.fight.drain_notices();
            assert_eq!(stage.fight.tick(&mut stage.roster, 1_000), Ok(false));
            assert_eq!(stage.fight.tick(&mut stage.roster, 1_000 + delay - 1), Ok(false));
            assert!(!stage.said("Use the status command"));
            assert_eq!(stage.fight.tick(&mut stage.roster, 1_000 + delay), Ok(true));
            assert!(stage.said("Use the status command"));
            assert_eq!(stage.fight.tick(&mut stage.roster, 1_000 + delay + 1), Ok(false));
        }
    }
}
