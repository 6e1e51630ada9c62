//! Turns during resolution, and the declarations that fill them.
//!
//! A declaration made during setup is queued and readies its owner. One
//! made by the active participant during resolution is carried out at once.
//! Anyone else's waits for their next turn.

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::{Fight, FightState};
use crate::action::{ActionKind, AttackOptions, QueuedAction};
use crate::attack::{active_defenders, npc_target_choice, pick_defender, resolve_flank, AttackReport, AttackResolution};
use crate::character::{Character, CharacterId, Stance};
use crate::error::{CombatError, ErrorSeverity};
use crate::output::NoticeKind;
use crate::roster::Roster;

const TURN_PROMPT: &str = "It is now your turn to act in combat. Pass with the pass command, \
or act with a command like attack. Once you act, control passes to the next character.";

/// What became of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnStep {
    /// The participant acted, or gave up the turn.
    Acted,
    /// A player has to choose what to do.
    NeedsInput,
}

impl Fight {
    // -------------------------------------------------------------------------
    // Turn sequencing
    // -------------------------------------------------------------------------

    /// Gives the turn to the next participant in initiative order, or starts
    /// a new round when nobody is left to act.
    pub(super) fn next_turn(&mut self, roster: &mut dyn Roster) -> Result<(), CombatError> {
        {
            let participants = &self.participants;
            let view = &*roster;
            self.initiative.retain(|id| {
                participants.get(id).is_some_and(|s| s.remaining_attacks > 0) && Self::is_conscious(view, *id)
            });
        }
        let Some(id) = self.initiative.pop_front() else {
            return self.begin_setup(roster);
        };
        self.active = Some(id);
        self.awaiting_input = false;
        let name = roster.name_of(id);

        if !self.is_present(&*roster, id) {
            self.broadcast(
                NoticeKind::Narration,
                format!("{name} is no longer here. Removing them from combat."),
            );
            self.drop_participant(roster, id);
            return Ok(());
        }

        let state = self.state_of_mut(id)?;
        if state.lost_turn_counter > 0 {
            state.lost_turn_counter -= 1;
            state.remaining_attacks = state.remaining_attacks.saturating_sub(1);
            if state.remaining_attacks == 0 {
                self.tell(
                    id,
                    NoticeKind::Status,
                    "It would be your turn, but you are recovering from a botch. Passing.",
                );
                self.broadcast_except(
                    id,
                    NoticeKind::Narration,
                    format!("{name} is recovering from a botch and loses their turn."),
                );
                self.active = None;
                return Ok(());
            }
        }

        self.broadcast_except(id, NoticeKind::Status, format!("It is now {name}'s turn."));
        if self.managed {
            let current = self
                .state_of(id)?
                .queued_action
                .as_ref()
                .map_or_else(|| "None".to_string(), |action| {
                    action.summary(action.target.map(|t| roster.name_of(t)).as_deref())
                });
            self.tell_gms(format!(
                "{name}'s current action: {current}. Use check to make a check, execute to \
                 perform their action, and next to mark resolved."
            ));
            self.awaiting_input = true;
        }
        Ok(())
    }

    /// Carries out the active participant's turn as far as it can go.
    pub(super) fn continue_turn(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<(), CombatError> {
        match self.take_turn(roster, id)? {
            TurnStep::Acted => {
                if self.active == Some(id) {
                    self.active = None;
                    self.awaiting_input = false;
                }
            }
            TurnStep::NeedsInput => {
                self.tell(id, NoticeKind::Prompt, TURN_PROMPT);
                self.awaiting_input = true;
            }
        }
        Ok(())
    }

    fn take_turn(&mut self, roster: &mut dyn Roster, id: CharacterId) -> Result<TurnStep, CombatError> {
        let conscious = Self::is_conscious(&*roster, id);
        let (automated, fled) = {
            let state = self.state_of(id)?;
            (state.is_automated(), state.flee.as_ref().is_some_and(|f| f.cleared))
        };
        if !conscious {
            self.tell(id, NoticeKind::Status, "You are no longer conscious and can take no action.");
            self.pass_turn(&*roster, id, false);
            return Ok(TurnStep::Acted);
        }
        if fled {
            self.complete_flee(roster, id)?;
            return Ok(TurnStep::Acted);
        }

        let Some(action) = self.state_of_mut(id)?.queued_action.take() else {
            if automated {
                self.pass_turn(&*roster, id, false);
                return Ok(TurnStep::Acted);
            }
            return Ok(TurnStep::NeedsInput);
        };
        match action.kind {
            ActionKind::Pass | ActionKind::Delay => {
                self.tell(id, NoticeKind::Narration, action.narration.clone());
                self.pass_turn(&*roster, id, action.kind == ActionKind::Delay);
                Ok(TurnStep::Acted)
            }
            ActionKind::Attack | ActionKind::Kill => self.resolve_strike(roster, id, action, automated),
            ActionKind::Flank => self.resolve_flank_action(roster, id, action),
            ActionKind::Custom | ActionKind::Preset(_) => {
                let name = roster.name_of(id);
                self.broadcast(NoticeKind::Narration, format!("{name} acts: {}", action.narration));
                self.complete_action(id, action);
                self.spend(id, 1);
                Ok(TurnStep::Acted)
            }
        }
    }

    /// Gives up a turn. Delaying costs nothing and moves the participant to
    /// the back of the order.
    fn pass_turn(&mut self, roster: &dyn Roster, id: CharacterId, delay: bool) {
        let name = roster.name_of(id);
        let verb = if delay { "delays" } else { "passes" };
        self.broadcast(NoticeKind::Narration, format!("{name} {verb} their turn."));
        self.spend(id, u32::from(!delay));
    }

    /// Uses up attacks. When it is the spender's turn, they go to the back
    /// of the order if attacks remain and the turn moves on.
    pub(super) fn spend(&mut self, id: CharacterId, cost: u32) {
        let Some(state) = self.participants.get_mut(&id) else {
            return;
        };
        state.remaining_attacks = state.remaining_attacks.saturating_sub(cost);
        state.afk = None;
        let remaining = state.remaining_attacks;
        if self.state == FightState::Resolution && self.active == Some(id) {
            self.initiative.retain(|queued| *queued != id);
            if remaining > 0 {
                self.initiative.push_back(id);
            }
            self.active = None;
            self.awaiting_input = false;
        }
    }

    pub(super) fn complete_action(&mut self, id: CharacterId, mut action: QueuedAction) {
        action.round_completed = Some(self.round);
        if let Some(state) = self.participants.get_mut(&id) {
            state.recent_actions.push(action);
        }
    }

    // -------------------------------------------------------------------------
    // Strikes
    // -------------------------------------------------------------------------

    fn resolve_strike(
        &mut self,
        roster: &mut dyn Roster,
        id: CharacterId,
        mut action: QueuedAction,
        automated: bool,
    ) -> Result<TurnStep, CombatError> {
        let lethal = action.kind == ActionKind::Kill;
        let targets = self.validate_targets(&*roster, id, lethal)?;
        let chosen = action
            .target
            .filter(|target| targets.contains(target))
            .or_else(|| targets.choose(&mut self.rng).copied());
        let Some(mut target) = chosen else {
            self.tell(id, NoticeKind::Status, "You have no valid target to attack.");
            if automated {
                self.pass_turn(&*roster, id, false);
                return Ok(TurnStep::Acted);
            }
            return Ok(TurnStep::NeedsInput);
        };
        match action.target {
            Some(intended) if intended != target => {
                let message = format!(
                    "{} is no longer a valid target to attack. Attacking {} instead.",
                    roster.name_of(intended),
                    roster.name_of(target)
                );
                self.tell(id, NoticeKind::Narration, message);
            }
            _ => self.tell(id, NoticeKind::Narration, action.narration.clone()),
        }

        if automated {
            let (prev_target, switch_chance) = {
                let state = self.state_of(id)?;
                (state.prev_target, state.switch_chance)
            };
            target = npc_target_choice(
                target,
                &targets,
                prev_target,
                switch_chance,
                &*roster,
                &self.participants,
                &mut self.rng,
            );
        }
        self.state_of_mut(id)?.prev_target = Some(target);
        action.target = Some(target);

        let mut resolution =
            AttackResolution::new(id, target).with_penalties(action.attack_penalty, action.damage_penalty);
        if !lethal {
            resolution = resolution.without_kill();
        }
        let Some(report) = self.run_resolution(roster, id, |ctx| resolution.execute(ctx))? else {
            return Ok(TurnStep::Acted);
        };
        self.complete_action(id, action);
        self.apply_report(roster, id, &report)?;
        Ok(TurnStep::Acted)
    }

    fn resolve_flank_action(
        &mut self,
        roster: &mut dyn Roster,
        id: CharacterId,
        action: QueuedAction,
    ) -> Result<TurnStep, CombatError> {
        let target = action
            .target
            .filter(|target| self.participants.contains_key(target))
            .filter(|target| Self::is_conscious(&*roster, *target) && self.is_present(&*roster, *target));
        let Some(target) = target else {
            self.tell(id, NoticeKind::Status, "You have no valid target to flank.");
            self.pass_turn(&*roster, id, false);
            return Ok(TurnStep::Acted);
        };
        self.state_of_mut(id)?.prev_target = Some(target);
        let back_off = action.bypass_defenders;
        let Some(report) = self.run_resolution(roster, id, |ctx| resolve_flank(id, target, back_off, ctx))? else {
            return Ok(TurnStep::Acted);
        };
        self.complete_action(id, action);
        match report.attack {
            Some(attack) => self.apply_report(roster, id, &attack)?,
            None => {
                let remaining = self.state_of(id)?.remaining_attacks;
                self.spend(id, remaining);
            }
        }
        Ok(TurnStep::Acted)
    }

    /// Runs one resolution. A failure that only concerns this action is
    /// reported to the actor and costs them the rest of their turn.
    fn run_resolution<T>(
        &mut self,
        roster: &mut dyn Roster,
        id: CharacterId,
        resolve: impl FnOnce(&mut crate::attack::ResolutionContext<'_>) -> Result<T, CombatError>,
    ) -> Result<Option<T>, CombatError> {
        match self.with_context(roster, resolve) {
            Ok(outcome) => Ok(Some(outcome)),
            Err(err) if err.severity() == ErrorSeverity::Invariant => {
                warn!(location = %self.location, actor = %id, error = %err, "action abandoned");
                self.tell(id, NoticeKind::Status, err.to_string());
                let remaining = self.state_of(id).map_or(0, |state| state.remaining_attacks);
                self.spend(id, remaining);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Books the consequences of a strike: lost turns, departures, fatigue
    /// and the attacker's spent attacks.
    fn apply_report(&mut self, roster: &mut dyn Roster, id: CharacterId, report: &AttackReport) -> Result<(), CombatError> {
        if let Some(state) = self.participants.get_mut(&id) {
            state.lost_turn_counter += report.lost_turns;
        }
        for victim in &report.removed {
            self.drop_participant(roster, *victim);
            if self.is_over() {
                return Ok(());
            }
        }
        if let Some(state) = self.participants.get_mut(&id) {
            let character = roster.require(id)?;
            state.roll_fatigue(character, &mut self.rng);
            let remaining = state.remaining_attacks;
            debug!(attacker = %id, lost_turns = report.lost_turns, "attack resolved");
            self.spend(id, remaining);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Declarations
    // -------------------------------------------------------------------------

    /// Declares an attack, or with `lethal` a killing blow on someone who is
    /// down.
    ///
    /// Unless `options.only` is set, one of the target's defenders may be
    /// chosen to take the strike instead. Strikes that land on an automated
    /// combatant are always lethal.
    ///
    /// # Errors
    ///
    /// Fails when the caller cannot act, the target is not a combatant or is
    /// in the wrong state for the attack, or the options are out of range.
    pub fn declare_attack(
        &mut self,
        roster: &mut dyn Roster,
        caller: CharacterId,
        target: CharacterId,
        lethal: bool,
        options: AttackOptions,
    ) -> Result<(), CombatError> {
        self.check_can_strike(&*roster, caller, target)?;
        let victim = roster.require(target)?;
        let name = victim.display_name();
        if lethal && victim.is_conscious() {
            return Err(CombatError::NotFinishable { name });
        }
        if !lethal && !victim.is_conscious() && !victim.is_automated() {
            return Err(CombatError::MustFinishOff { name });
        }
        let defenders = active_defenders(target, &*roster, &self.participants).len();
        let mut action = QueuedAction::strike(target, &name, lethal, &options, defenders, &self.config)?;
        if !options.only {
            if let Some(defender) = pick_defender(target, &*roster, &self.participants, &mut self.rng) {
                if defender != target {
                    action.target = Some(defender);
                    action.narration.push_str(&format!(
                        " It was interfered with, forcing you to target {} instead.",
                        roster.name_of(defender)
                    ));
                }
            }
        }
        if !lethal && action.target.is_some_and(|id| roster.get(id).is_some_and(Character::is_automated)) {
            action.kind = ActionKind::Kill;
        }
        self.queue_declared(roster, caller, action)
    }

    /// Declares a flank around the target's defenders. With `only`, the
    /// flanker backs off if a defender spots them.
    ///
    /// # Errors
    ///
    /// Fails when the caller cannot act, or the target is not a combatant or
    /// has nobody guarding them.
    pub fn declare_flank(
        &mut self,
        roster: &mut dyn Roster,
        caller: CharacterId,
        target: CharacterId,
        only: bool,
    ) -> Result<(), CombatError> {
        self.check_can_strike(&*roster, caller, target)?;
        let name = roster.name_of(target);
        if active_defenders(target, &*roster, &self.participants).is_empty() {
            return Err(CombatError::NoDefenders { name });
        }
        self.queue_declared(roster, caller, QueuedAction::flank(target, &name, only))
    }

    fn check_can_strike(&self, roster: &dyn Roster, caller: CharacterId, target: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        if !Self::is_conscious(roster, caller) {
            return Err(CombatError::Incapacitated);
        }
        if caller == target {
            return Err(CombatError::SelfTarget);
        }
        self.require_combatant(roster, target)
    }

    /// Declares a pass, or with `delay` a move to the back of the order.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn declare_pass(&mut self, roster: &mut dyn Roster, caller: CharacterId, delay: bool) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        let action = if delay { QueuedAction::delay() } else { QueuedAction::pass() };
        self.queue_declared(roster, caller, action)
    }

    /// Declares a registered special action. Needs a presiding GM.
    ///
    /// # Errors
    ///
    /// Fails without a GM, for non-combatants and for unknown numbers.
    pub fn declare_special(&mut self, roster: &mut dyn Roster, caller: CharacterId, number: usize) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        if !self.managed {
            return Err(CombatError::NotManaged);
        }
        let name = self.specials.get(number)?.name.clone();
        self.queue_declared(roster, caller, QueuedAction::preset(number, &name))
    }

    /// Declares a free-form action for the GM or other players to react to.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn declare_custom(
        &mut self,
        roster: &mut dyn Roster,
        caller: CharacterId,
        description: &str,
    ) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        self.tell(
            caller,
            NoticeKind::Status,
            format!("Set yourself to take the following action: {description}"),
        );
        self.queue_declared(roster, caller, QueuedAction::custom(description))
    }

    /// Clears the caller's queued action.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants and when nothing is queued.
    pub fn cancel_action(&mut self, caller: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        if self.caller_state_mut(caller)?.queued_action.take().is_none() {
            return Err(CombatError::NothingQueued);
        }
        self.tell(caller, NoticeKind::Status, "You clear any queued combat action.");
        Ok(())
    }

    pub(super) fn queue_declared(
        &mut self,
        roster: &mut dyn Roster,
        caller: CharacterId,
        action: QueuedAction,
    ) -> Result<(), CombatError> {
        let summary = action.summary(action.target.map(|t| roster.name_of(t)).as_deref());
        let phase = self.state;
        let acting = self.active == Some(caller);
        let managed = self.managed;
        let state = self.caller_state_mut(caller)?;
        state.queue(action, &*roster);
        state.afk = None;
        let spent = state.remaining_attacks == 0;
        match phase {
            FightState::Initializing | FightState::Setup => {
                state.set_ready(true);
                self.tell(caller, NoticeKind::Status, format!("Queuing action for your turn: {summary}."));
                self.settle(roster)
            }
            FightState::Resolution if acting && !managed => {
                self.awaiting_input = false;
                self.settle(roster)
            }
            FightState::Resolution if acting => {
                let name = roster.name_of(caller);
                self.tell_gms(format!("{name} has declared: {summary}."));
                self.tell(caller, NoticeKind::Status, format!("Queuing action for your turn: {summary}."));
                Ok(())
            }
            _ if spent => {
                self.tell(
                    caller,
                    NoticeKind::Status,
                    "You have already acted this round. Declare again once the next round begins.".to_string(),
                );
                Ok(())
            }
            _ => {
                self.tell(caller, NoticeKind::Status, format!("Queuing action for your turn: {summary}."));
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    /// Changes stance. Only allowed between rounds.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants and during resolution.
    pub fn set_stance(&mut self, roster: &mut dyn Roster, caller: CharacterId, stance: Stance) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        if self.state == FightState::Resolution {
            return Err(CombatError::StanceLocked);
        }
        roster.require_mut(caller)?.stance = stance;
        self.caller_state_mut(caller)?.changed_stance = true;
        self.tell(caller, NoticeKind::Status, format!("Stance changed to {stance}."));
        Ok(())
    }

    /// Turns automatic attacks on or off. Switching on between rounds
    /// queues an attack straight away.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn set_autoattack(&mut self, roster: &mut dyn Roster, caller: CharacterId, on: bool) -> Result<(), CombatError> {
        self.ensure_running()?;
        self.caller_state(caller)?;
        roster.require_mut(caller)?.autoattack = on;
        let setting = if on { "on" } else { "off" };
        self.tell(caller, NoticeKind::Status, format!("Autoattack is now {setting}."));
        let idle = self.caller_state(caller)?.queued_action.is_none();
        if on && idle && self.state == FightState::Setup {
            self.setup_attacks(roster, caller)?;
            if self.caller_state(caller)?.queued_action.is_some() {
                return self.ready(roster, caller);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::FightRules;
    use crate::character::Vitality;
    use crate::tests::{brute, duel, thug, Stage};

    /// A duel between two players too tough to go down in one round.
    fn gentle_duel(seed: u64) -> (Stage, CharacterId, CharacterId) {
        let (mut stage, a, b) = duel(seed);
        for id in [a, b] {
            stage.character_mut(id).bonus_max_hp = 1000;
        }
        stage.fight = stage.fight.clone().with_rules(FightRules {
            real_damage: false,
            random_deaths: false,
            risk: 4,
        });
        (stage, a, b)
    }

    mod sequencing_tests {
        use super::*;

        #[test]
        fn first_player_is_prompted() {
            let (mut stage, a, b) = duel(40);
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            let acting = stage.fight.active().unwrap();
            assert!(stage.fight.is_awaiting_input());
            assert!(stage.heard(acting, "It is now your turn"));
            let other = if acting == a { b } else { a };
            assert!(stage.heard(other, "'s turn."));
        }

        #[test]
        fn passing_hands_the_turn_on() {
            let (mut stage, a, b) = duel(41);
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            let first = stage.fight.active().unwrap();
            stage.fight.declare_pass(&mut stage.roster, first, false).unwrap();
            assert!(stage.said("passes their turn."));
            let second = stage.fight.active().unwrap();
            assert_ne!(first, second);
            stage.fight.declare_pass(&mut stage.roster, second, false).unwrap();
            assert_eq!(stage.fight.state(), FightState::Setup);
            assert!(stage.said("Setup Phase"));
        }

        #[test]
        fn delaying_moves_to_the_back() {
            let (mut stage, a, b) = duel(42);
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            let first = stage.fight.active().unwrap();
            stage.fight.declare_pass(&mut stage.roster, first, true).unwrap();
            assert!(stage.said("delays their turn."));
            assert_eq!(stage.fight.turn_order().collect::<Vec<_>>(), vec![first]);
            assert_eq!(stage.fight.participant(first).unwrap().remaining_attacks, 1);
        }

        #[test]
        fn botches_cost_the_next_turn() {
            let (mut stage, a, b) = duel(43);
            for id in [a, b] {
                stage.fight.participants.get_mut(&id).unwrap().lost_turn_counter = 1;
            }
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            assert!(stage.said("is recovering from a botch and loses their turn."));
            assert_eq!(stage.fight.state(), FightState::Setup);
            assert_eq!(stage.fight.round(), 1);
            assert_eq!(stage.fight.participant(a).unwrap().lost_turn_counter, 0);
        }
    }

    mod strike_tests {
        use super::*;

        #[test]
        fn declared_attacks_resolve_in_order() {
            let (mut stage, a, b) = gentle_duel(44);
            stage
                .fight
                .declare_attack(&mut stage.roster, a, b, false, AttackOptions::default())
                .unwrap();
            assert!(stage.heard(a, "Queuing action for your turn: attack Brenna."));
            assert!(stage.fight.participant(a).unwrap().is_ready());
            stage
                .fight
                .declare_attack(&mut stage.roster, b, a, false, AttackOptions::default())
                .unwrap();
            assert_eq!(stage.fight.state(), FightState::Setup);
            assert_eq!(stage.fight.round(), 1);
            for (id, foe) in [(a, b), (b, a)] {
                let state = stage.fight.participant(id).unwrap();
                let last = state.last_action().unwrap();
                assert_eq!(last.round_completed, Some(1));
                assert_eq!(last.target, Some(foe));
                assert_eq!(state.prev_target, Some(foe));
            }
        }

        #[test]
        fn active_player_attacks_immediately() {
            let (mut stage, a, b) = gentle_duel(45);
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            let first = stage.fight.active().unwrap();
            let other = if first == a { b } else { a };
            stage
                .fight
                .declare_attack(&mut stage.roster, first, other, false, AttackOptions::default())
                .unwrap();
            assert_eq!(stage.fight.active(), Some(other));
            assert!(stage.fight.participant(first).unwrap().last_action().is_some());
        }

        #[test]
        fn attack_targets_are_checked() {
            let (mut stage, a, b) = duel(46);
            let outsider = stage.spawn(brute("Outsider"));
            assert_eq!(
                stage.fight.declare_attack(&mut stage.roster, a, a, false, AttackOptions::default()),
                Err(CombatError::SelfTarget)
            );
            assert_eq!(
                stage.fight.declare_attack(&mut stage.roster, a, outsider, false, AttackOptions::default()),
                Err(CombatError::NotACombatant {
                    name: "Outsider".to_string()
                })
            );
            assert_eq!(
                stage.fight.declare_attack(&mut stage.roster, a, b, true, AttackOptions::default()),
                Err(CombatError::NotFinishable {
                    name: "Brenna".to_string()
                })
            );
            stage.character_mut(b).health.vitality = Vitality::Incapacitated;
            assert_eq!(
                stage.fight.declare_attack(&mut stage.roster, a, b, false, AttackOptions::default()),
                Err(CombatError::MustFinishOff {
                    name: "Brenna".to_string()
                })
            );
            assert!(stage
                .fight
                .declare_attack(&mut stage.roster, a, b, true, AttackOptions::default())
                .is_ok());
        }

        #[test]
        fn strikes_on_a_downed_automated_foe_finish_it() {
            let mut stage = Stage::new(53);
            let a = stage.enter(brute("Aldric"));
            let guard = stage.spawn(thug("Guard"));
            stage.fight.add_participant(&mut stage.roster, guard, Some(a)).unwrap();
            stage.begin();
            stage.character_mut(guard).health.vitality = Vitality::Incapacitated;
            stage
                .fight
                .declare_attack(&mut stage.roster, a, guard, false, AttackOptions::default())
                .unwrap();
            assert!(stage.heard(a, "Queuing action for your turn: kill Guard."));
            assert!(stage.heard(a, "You attack Guard."));
            assert!(!stage.heard(a, "You have no valid target to attack."));
        }

        #[test]
        fn strikes_on_players_stay_plain() {
            let (mut stage, a, b) = duel(54);
            stage
                .fight
                .declare_attack(&mut stage.roster, a, b, false, AttackOptions::default())
                .unwrap();
            let queued = stage.fight.participant(a).unwrap().queued_action.clone().unwrap();
            assert_eq!(queued.kind, ActionKind::Attack);
        }

        #[test]
        fn declaring_after_acting_is_not_queued_for_this_round() {
            let (mut stage, a, b) = gentle_duel(55);
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            let first = stage.fight.active().unwrap();
            let other = if first == a { b } else { a };
            stage.fight.declare_pass(&mut stage.roster, first, false).unwrap();
            stage
                .fight
                .declare_attack(&mut stage.roster, first, other, false, AttackOptions::default())
                .unwrap();
            assert!(stage.heard(first, "You have already acted this round."));
            assert!(!stage.heard(first, "Queuing action for your turn"));
        }

        #[test]
        fn incapacitated_callers_cannot_attack() {
            let (mut stage, a, b) = duel(47);
            stage.character_mut(a).health.vitality = Vitality::Incapacitated;
            assert_eq!(
                stage.fight.declare_attack(&mut stage.roster, a, b, false, AttackOptions::default()),
                Err(CombatError::Incapacitated)
            );
        }

        #[test]
        fn flanking_needs_defenders() {
            let (mut stage, a, b) = duel(48);
            assert_eq!(
                stage.fight.declare_flank(&mut stage.roster, a, b, false),
                Err(CombatError::NoDefenders {
                    name: "Brenna".to_string()
                })
            );
            let guard = stage.spawn(brute("Shield"));
            stage.fight.protect(&mut stage.roster, guard, b).unwrap();
            stage.fight.declare_flank(&mut stage.roster, a, b, true).unwrap();
            let queued = stage.fight.participant(a).unwrap().queued_action.clone().unwrap();
            assert_eq!(queued.kind, ActionKind::Flank);
            assert!(queued.bypass_defenders);
        }
    }

    mod declaration_tests {
        use super::*;

        #[test]
        fn cancel_clears_the_queue() {
            let (mut stage, a, _) = duel(49);
            assert_eq!(stage.fight.cancel_action(a), Err(CombatError::NothingQueued));
            stage.fight.declare_custom(&mut stage.roster, a, "topples the shelf").unwrap();
            stage.fight.cancel_action(a).unwrap();
            assert!(stage.fight.participant(a).unwrap().queued_action.is_none());
            assert!(stage.heard(a, "You clear any queued combat action."));
        }

        #[test]
        fn specials_need_a_gm() {
            let (mut stage, a, _) = duel(50);
            assert_eq!(
                stage.fight.declare_special(&mut stage.roster, a, 1),
                Err(CombatError::NotManaged)
            );
        }

        #[test]
        fn stance_is_locked_during_resolution() {
            let (mut stage, a, b) = duel(51);
            stage.fight.set_stance(&mut stage.roster, a, Stance::Defensive).unwrap();
            assert_eq!(stage.character(a).stance, Stance::Defensive);
            assert!(stage.heard(a, "Stance changed to"));
            stage.fight.ready(&mut stage.roster, a).unwrap();
            stage.fight.ready(&mut stage.roster, b).unwrap();
            assert_eq!(
                stage.fight.set_stance(&mut stage.roster, a, Stance::Reckless),
                Err(CombatError::StanceLocked)
            );
        }

        #[test]
        fn switching_on_autoattack_queues_and_readies() {
            let (mut stage, a, b) = duel(52);
            stage.fight.set_autoattack(&mut stage.roster, a, true).unwrap();
            let state = stage.fight.participant(a).unwrap();
            assert_eq!(state.queued_action.as_ref().and_then(|q| q.target), Some(b));
            assert!(state.is_ready());
        }
    }
}
