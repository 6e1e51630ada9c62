//! GM operations.
//!
//! A GM steers a fight from outside it: pacing it in managed mode, rolling
//! special actions, adjusting modifiers and removing or adding people. Every
//! operation here counts as GM activity and resets the idle counter the
//! housekeeping timer uses for managed fights.

use tracing::info;

use super::{Fight, FightState};
use crate::action::{ActionKind, QueuedAction};
use crate::attack::{AttackReport, AttackResolution};
use crate::character::{Character, CharacterId, Skill, Stat};
use crate::error::{CombatError, ErrorSeverity};
use crate::output::NoticeKind;
use crate::participant::ModifierKind;
use crate::roster::Roster;
use crate::special_action::{RecordedRoll, SpecialAction};

impl Fight {
    fn gm_acted(&mut self) {
        self.idle_checks = 0;
    }

    // -------------------------------------------------------------------------
    // Pacing
    // -------------------------------------------------------------------------

    /// Switches GM-managed pacing on or off and registers the caller as a GM.
    ///
    /// # Returns
    ///
    /// Whether the fight is now managed.
    ///
    /// # Errors
    ///
    /// Fails when the fight is ending; switching off propagates errors from
    /// resuming automatic play.
    pub fn toggle_managed(&mut self, roster: &mut dyn Roster, gm: CharacterId) -> Result<bool, CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        if !self.gms.contains(&gm) {
            self.gms.push(gm);
        }
        self.managed = !self.managed;
        info!(location = %self.location, managed = self.managed, "managed mode toggled");
        if self.managed {
            self.tell(
                gm,
                NoticeKind::Gm,
                "Combat is now in managed mode, and will pause before each character to allow for rolls.",
            );
            return Ok(true);
        }
        self.tell(
            gm,
            NoticeKind::Gm,
            "Combat is no longer in managed mode, and will automatically execute actions without pausing.",
        );
        self.awaiting_input = false;
        self.settle(roster)?;
        Ok(false)
    }

    /// Carries out the active participant's declared action. A special
    /// action is rolled and waits for [`Fight::advance_turn`]; anything else
    /// resolves and the turn moves on.
    ///
    /// # Errors
    ///
    /// Fails when nobody is acting, or the active participant has nothing
    /// the GM can execute.
    pub fn execute(&mut self, roster: &mut dyn Roster, gm: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        let id = self
            .active
            .filter(|_| self.state == FightState::Resolution)
            .ok_or(CombatError::NoActiveParticipant)?;
        let kind = self.state_of(id)?.queued_action.as_ref().map(|action| action.kind);
        match kind {
            Some(ActionKind::Preset(number)) => {
                let (special, result) = self.roll_special(&*roster, id, number)?;
                let name = roster.name_of(id);
                self.tell(gm, NoticeKind::Roll, format!("{name} rolls {result} for {special}."));
                self.tell(id, NoticeKind::Roll, format!("You roll {result} for {special}."));
                Ok(())
            }
            Some(kind) if !kind.is_special() => {
                self.awaiting_input = false;
                self.continue_turn(roster, id)?;
                self.settle(roster)
            }
            _ => Err(CombatError::NoPresetQueued {
                name: roster.name_of(id),
            }),
        }
    }

    /// Rolls the special action queued by `id` and stores the result on it.
    fn roll_special(
        &mut self,
        roster: &dyn Roster,
        id: CharacterId,
        number: usize,
    ) -> Result<(String, i32), CombatError> {
        let round = self.round;
        let modifier = self.state_of(id)?.modifiers.special;
        let character = roster.require(id)?;
        let special = self.specials.get_mut(number)?;
        let result = special.roll_for(character, modifier, round, &mut self.rng);
        let name = special.name.clone();
        if let Some(action) = self.state_of_mut(id)?.queued_action.as_mut() {
            action.roll = Some(result);
        }
        Ok((name, result))
    }

    /// Marks the active participant's turn resolved and moves on.
    ///
    /// # Errors
    ///
    /// Fails during setup and when nobody is acting.
    pub fn advance_turn(&mut self, roster: &mut dyn Roster, gm: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        if self.state != FightState::Resolution {
            return Err(CombatError::WrongPhase(
                "Currently in setup phase. Use readyall to advance to the next phase.",
            ));
        }
        let id = self.active.ok_or(CombatError::NoActiveParticipant)?;
        self.tell(gm, NoticeKind::Gm, "Advancing to next character.");
        if let Some(action) = self.state_of_mut(id)?.queued_action.take() {
            self.complete_action(id, action);
        }
        self.spend(id, 1);
        self.settle(roster)
    }

    /// Gives a combatant one more action at the end of this round's order.
    ///
    /// # Errors
    ///
    /// Fails outside resolution and for non-combatants.
    pub fn requeue(&mut self, roster: &dyn Roster, gm: CharacterId, target: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        self.require_combatant(roster, target)?;
        if self.state != FightState::Resolution {
            return Err(CombatError::WrongPhase("Only usable in the resolution phase."));
        }
        self.state_of_mut(target)?.remaining_attacks += 1;
        if self.active != Some(target) && !self.initiative.contains(&target) {
            self.initiative.push_back(target);
        }
        let name = roster.name_of(target);
        self.tell(
            gm,
            NoticeKind::Gm,
            format!("Giving {name} an action at the end of initiative list."),
        );
        Ok(())
    }

    /// Marks one combatant ready.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants and during resolution.
    pub fn ready_participant(
        &mut self,
        roster: &mut dyn Roster,
        gm: CharacterId,
        target: CharacterId,
    ) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        self.require_combatant(&*roster, target)?;
        if self.state == FightState::Resolution {
            return Err(CombatError::WrongPhase("They are already in the resolution phase."));
        }
        let gm_name = roster.name_of(gm);
        let name = roster.name_of(target);
        self.broadcast(
            NoticeKind::Status,
            format!("{gm_name} marks {name} as ready to proceed."),
        );
        self.state_of_mut(target)?.set_ready(true);
        self.settle(roster)
    }

    /// Marks every combatant ready, starting resolution.
    ///
    /// # Errors
    ///
    /// Fails during resolution.
    pub fn ready_all(&mut self, roster: &mut dyn Roster, gm: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        if self.state == FightState::Resolution {
            return Err(CombatError::WrongPhase("They are already in the resolution phase."));
        }
        for state in self.participants.values_mut() {
            state.set_ready(true);
        }
        let gm_name = roster.name_of(gm);
        self.broadcast(
            NoticeKind::Status,
            format!("{gm_name} has marked everyone as ready to proceed."),
        );
        self.settle(roster)
    }

    /// Ends the fight.
    ///
    /// # Errors
    ///
    /// Fails when the fight is already ending.
    pub fn stop_fight(&mut self, roster: &mut dyn Roster, gm: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        let gm_name = roster.name_of(gm);
        self.broadcast(NoticeKind::Status, format!("{gm_name} has ended the fight."));
        self.end_combat(roster);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------------

    /// Adds a character to the fight without anyone attacking them.
    ///
    /// # Errors
    ///
    /// Fails like [`Fight::add_participant`].
    pub fn admin_add(&mut self, roster: &mut dyn Roster, gm: CharacterId, target: CharacterId) -> Result<(), CombatError> {
        self.gm_acted();
        self.add_participant(roster, target, None)?;
        let name = roster.name_of(target);
        self.tell(gm, NoticeKind::Gm, format!("Added {name}."));
        Ok(())
    }

    /// Removes a combatant.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn kick(&mut self, roster: &mut dyn Roster, gm: CharacterId, target: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        self.require_combatant(&*roster, target)?;
        let gm_name = roster.name_of(gm);
        let name = roster.name_of(target);
        self.broadcast(NoticeKind::Status, format!("{gm_name} has kicked {name}."));
        self.remove_participant(roster, target)
    }

    /// Moves a combatant to the observers.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn mark_afk(&mut self, roster: &mut dyn Roster, gm: CharacterId, target: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        self.require_combatant(&*roster, target)?;
        let gm_name = roster.name_of(gm);
        let name = roster.name_of(target);
        self.broadcast(
            NoticeKind::Status,
            format!("{gm_name} has changed {name} to an observer."),
        );
        self.demote_to_observer(roster, target);
        self.settle(roster)
    }

    /// Replaces a combatant's declared action with a free-form one.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn force_action(
        &mut self,
        roster: &mut dyn Roster,
        gm: CharacterId,
        target: CharacterId,
        description: &str,
    ) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        self.require_combatant(&*roster, target)?;
        let name = roster.name_of(target);
        self.tell(gm, NoticeKind::Gm, format!("Forcing {name} to: {description}"));
        self.queue_declared(roster, target, QueuedAction::custom(description))
    }

    // -------------------------------------------------------------------------
    // Checks and special actions
    // -------------------------------------------------------------------------

    /// Rolls an arbitrary check for a combatant. Their special modifier
    /// applies. Without a difficulty the configured default is used.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn check(
        &mut self,
        roster: &dyn Roster,
        gm: CharacterId,
        target: CharacterId,
        stat: Option<Stat>,
        skill: Option<Skill>,
        difficulty: Option<i32>,
    ) -> Result<i32, CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        self.require_combatant(roster, target)?;
        let difficulty = difficulty.unwrap_or(self.config.special_action_difficulty);
        let modifier = self.state_of(target)?.modifiers.special;
        let character = roster.require(target)?;
        let stats: Vec<Stat> = stat.into_iter().collect();
        let result = character
            .check(&stats, skill, difficulty)
            .flat(modifier)
            .roll(&mut self.rng)
            .result();
        let rolled: Vec<String> = stat
            .map(|s| s.to_string())
            .into_iter()
            .chain(skill.map(|s| s.to_string()))
            .collect();
        let rolled = if rolled.is_empty() {
            "a flat check".to_string()
        } else {
            rolled.join(" + ")
        };
        let name = character.display_name();
        let text = format!("{name} checks {rolled} at {difficulty}, rolling {result}.");
        self.tell(gm, NoticeKind::Roll, text.clone());
        self.tell(target, NoticeKind::Roll, text);
        Ok(result)
    }

    /// Rolls special action `number` for everyone who used or queued it this
    /// round.
    ///
    /// # Errors
    ///
    /// Fails for unknown action numbers.
    pub fn check_all(
        &mut self,
        roster: &dyn Roster,
        gm: CharacterId,
        number: usize,
    ) -> Result<Vec<RecordedRoll>, CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        let round = self.round;
        let preset = ActionKind::Preset(number);
        let actors: Vec<(&Character, i32)> = self
            .participants
            .values()
            .filter(|state| {
                state
                    .current_and_queued_actions(round)
                    .iter()
                    .any(|action| action.kind == preset)
            })
            .filter_map(|state| roster.get(state.character()).map(|c| (c, state.modifiers.special)))
            .collect();
        let special = self.specials.get_mut(number)?;
        let rolls = special.make_checks(actors, round, &mut self.rng);
        let mut lines = vec![format!("Making all checks for {}.", special.name)];
        for roll in &rolls {
            lines.push(format!("{} rolls {}.", roster.name_of(roll.character), roll.result));
        }
        lines.push(format!("Running total: {}.", special.total()));

        for roll in &rolls {
            let Some(state) = self.participants.get_mut(&roll.character) else {
                continue;
            };
            let resolved = state
                .recent_actions
                .iter_mut()
                .filter(|action| action.round_completed == Some(round));
            for action in resolved.chain(state.queued_action.iter_mut()) {
                if action.kind == preset {
                    action.roll = Some(roll.result);
                }
            }
        }
        self.tell(gm, NoticeKind::Roll, lines.join("\n"));
        Ok(rolls)
    }

    /// Table of every special action used or queued this round and its roll,
    /// followed by the running total of each action in use.
    #[must_use]
    pub fn list_rolls(&self, roster: &dyn Roster) -> String {
        let mut rows = Vec::new();
        let mut used = Vec::new();
        for state in self.participants.values() {
            for action in state.current_and_queued_actions(self.round) {
                let ActionKind::Preset(number) = action.kind else {
                    continue;
                };
                let Ok(special) = self.specials.get(number) else {
                    continue;
                };
                if !used.contains(&number) {
                    used.push(number);
                }
                let roll = action.roll.map_or_else(|| "Not rolled".to_string(), |r| r.to_string());
                rows.push(vec![roster.name_of(state.character()), special.name.clone(), roll]);
            }
        }
        used.sort_unstable();
        let mut lines = vec![super::status::render_table(&["Name", "Action", "Roll"], &rows)];
        lines.extend(
            used.into_iter()
                .filter_map(|number| self.specials.get(number).ok())
                .map(|special| format!("Running total for {}: {}", special.name, special.total())),
        );
        lines.join("\n")
    }

    /// Publishes a special action.
    ///
    /// # Returns
    ///
    /// The number players use to pick it.
    pub fn add_special(&mut self, gm: CharacterId, action: SpecialAction) -> usize {
        self.gm_acted();
        let number = self.specials.add(action);
        let listing = self.special_actions_text();
        self.tell(gm, NoticeKind::Gm, listing);
        number
    }

    /// Withdraws a special action.
    ///
    /// # Errors
    ///
    /// Fails for unknown action numbers.
    pub fn remove_special(&mut self, gm: CharacterId, number: usize) -> Result<SpecialAction, CombatError> {
        self.gm_acted();
        let removed = self.specials.remove(number)?;
        let listing = self.special_actions_text();
        self.tell(gm, NoticeKind::Gm, format!("Action removed.\n{listing}"));
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Tuning
    // -------------------------------------------------------------------------

    /// Lets a combatant strike every foe at once.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn set_cleave(
        &mut self,
        roster: &dyn Roster,
        gm: CharacterId,
        target: CharacterId,
        cleave: bool,
    ) -> Result<(), CombatError> {
        self.gm_acted();
        self.require_combatant(roster, target)?;
        self.state_of_mut(target)?.cleave = cleave;
        let name = roster.name_of(target);
        self.tell(gm, NoticeKind::Gm, format!("{name} has cleaving set to: {cleave}."));
        Ok(())
    }

    /// Sets how often a combatant picks a new target for extra attacks.
    ///
    /// # Errors
    ///
    /// Fails for percentages above 100 and for non-combatants.
    pub fn set_switch_chance(
        &mut self,
        roster: &dyn Roster,
        gm: CharacterId,
        target: CharacterId,
        percent: u32,
    ) -> Result<(), CombatError> {
        self.gm_acted();
        if percent > 100 {
            return Err(CombatError::InvalidSwitchChance);
        }
        self.require_combatant(roster, target)?;
        self.state_of_mut(target)?.switch_chance = percent;
        let name = roster.name_of(target);
        self.tell(
            gm,
            NoticeKind::Gm,
            format!("{name} will switch targets {percent} percent of the time."),
        );
        Ok(())
    }

    /// Sets how dangerous automated combatants are.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::InvalidRisk`] above the configured maximum.
    pub fn set_risk(&mut self, gm: CharacterId, risk: u32) -> Result<(), CombatError> {
        self.gm_acted();
        if risk > self.config.max_risk {
            return Err(CombatError::InvalidRisk {
                max: self.config.max_risk,
            });
        }
        self.rules.risk = risk;
        info!(location = %self.location, risk, "risk changed");
        self.tell(gm, NoticeKind::Gm, format!("Risk level set to {risk}."));
        Ok(())
    }

    /// Sets one of a combatant's temporary modifiers.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn set_modifier(
        &mut self,
        roster: &dyn Roster,
        gm: CharacterId,
        target: CharacterId,
        kind: ModifierKind,
        value: i32,
    ) -> Result<(), CombatError> {
        self.gm_acted();
        self.require_combatant(roster, target)?;
        self.state_of_mut(target)?.modifiers.set(kind, value);
        let summary = self.modifiers_summary(roster, target)?;
        self.tell(gm, NoticeKind::Gm, summary);
        Ok(())
    }

    /// Lists a combatant's temporary modifiers.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn modifiers_summary(&self, roster: &dyn Roster, target: CharacterId) -> Result<String, CombatError> {
        self.require_combatant(roster, target)?;
        let modifiers = self.state_of(target)?.modifiers;
        let values: Vec<String> = ModifierKind::ALL
            .iter()
            .map(|kind| format!("{}: {}", kind.as_str(), modifiers.get(*kind)))
            .collect();
        Ok(format!(
            "Modifiers for {}:\n{}",
            roster.name_of(target),
            values.join(", ")
        ))
    }

    // -------------------------------------------------------------------------
    // Damage
    // -------------------------------------------------------------------------

    /// Deals fixed damage from `source` to the given combatants.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants; an error the fight cannot recover from
    /// ends it.
    pub fn inflict(
        &mut self,
        roster: &mut dyn Roster,
        gm: CharacterId,
        targets: &[CharacterId],
        amount: u32,
        source: &str,
        mitigation: bool,
    ) -> Result<AttackReport, CombatError> {
        self.ensure_running()?;
        self.gm_acted();
        for target in targets {
            self.require_combatant(&*roster, *target)?;
        }
        let mut resolution = AttackResolution::environmental(source, amount, targets.to_vec()).inflicted_by(gm);
        if !mitigation {
            resolution = resolution.without_mitigation();
        }
        let report = match self.with_context(roster, |ctx| resolution.execute(ctx)) {
            Ok(report) => report,
            Err(err) => {
                if err.severity() == ErrorSeverity::Fatal {
                    self.abort(roster, &err);
                }
                return Err(err);
            }
        };
        for victim in &report.removed {
            self.drop_participant(roster, *victim);
            if self.is_over() {
                return Ok(report);
            }
        }
        self.settle(roster)?;
        Ok(report)
    }
}
