//! The command surface a text layer drives.
//!
//! A parsed player command becomes a [`Command`], and [`dispatch`] routes it
//! to the fight at the caller's location (or to the [`FightRegistry`] when
//! it starts, joins or watches one). Nothing escapes `dispatch`: a refused
//! command comes back as its message, and engine errors are logged for
//! operators before their message is returned.
//!
//! Most commands produce their feedback as notices in the fight's outbox,
//! so `dispatch` only returns text that is meant for the caller alone: a
//! query result or an error.
//!
//! # Example
//!
//! ```
//! use fray_core::character::{Character, LocationId};
//! use fray_core::commands::{dispatch, Command};
//! use fray_core::config::CombatConfig;
//! use fray_core::registry::FightRegistry;
//! use fray_core::roster::InMemoryRoster;
//!
//! let hall = LocationId::new(1);
//! let mut roster = InMemoryRoster::new();
//! let a = roster.spawn(|id| Character::player(id, "Aldric").at(hall));
//! let b = roster.spawn(|id| Character::player(id, "Brenna").at(hall));
//! let mut registry = FightRegistry::new(11, CombatConfig::default());
//!
//! let reply = dispatch(&mut registry, &mut roster, a, Command::Fight { targets: vec![b] }, 0);
//! assert_eq!(reply, None);
//!
//! let reply = dispatch(&mut registry, &mut roster, a, Command::VoteEnd, 0);
//! assert_eq!(reply, None);
//! let reply = dispatch(&mut registry, &mut roster, a, Command::VoteEnd, 0);
//! assert_eq!(reply.as_deref(), Some("You have already voted to end the fight."));
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::action::AttackOptions;
use crate::character::{CharacterId, Skill, Stance, Stat};
use crate::error::{CombatError, ErrorSeverity};
use crate::fight::{assign_guard, release_guard, Fight};
use crate::participant::ModifierKind;
use crate::registry::FightRegistry;
use crate::roster::Roster;
use crate::special_action::SpecialAction;

// =============================================================================
// Commands
// =============================================================================

/// Everything a combatant, observer or bystander can ask of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Start a fight against the targets, or join the one here.
    Fight {
        /// Characters to fight; may be empty when joining.
        targets: Vec<CharacterId>,
    },
    /// Attack a conscious target.
    Attack {
        /// Who to attack.
        target: CharacterId,
        /// Bypass, tradeoff and flub settings.
        options: AttackOptions,
    },
    /// Finish off an incapacitated target.
    Kill {
        /// Who to kill.
        target: CharacterId,
        /// Tradeoff and flub settings.
        options: AttackOptions,
    },
    /// Ready up in setup, or carry on in resolution.
    Ready,
    /// Give up the turn.
    Pass,
    /// Act later in the round.
    Delay,
    /// Clear the queued action.
    Cancel,
    /// Try to leave through an exit.
    Flee {
        /// Name of the exit.
        exit: String,
    },
    /// Sneak past a target's defenders.
    Flank {
        /// Who to flank.
        target: CharacterId,
        /// Back off instead of fighting a guard who notices.
        only: bool,
    },
    /// Change fighting stance.
    Stance(Stance),
    /// Stop a fleeing combatant.
    Catch {
        /// Who to stop.
        target: CharacterId,
    },
    /// Cover the retreat of allies.
    Cover {
        /// Who to cover.
        targets: Vec<CharacterId>,
    },
    /// Stop covering one ally, or everyone.
    StopCover {
        /// Who to stop covering; everyone when `None`.
        target: Option<CharacterId>,
    },
    /// Flag a stalling combatant as away.
    Afk {
        /// Who is stalling.
        target: CharacterId,
    },
    /// Vote to end the fight.
    VoteEnd,
    /// Offer, or withdraw, surrender.
    Surrender,
    /// Refuse to let a combatant surrender.
    PreventSurrender {
        /// Who may not surrender.
        target: CharacterId,
    },
    /// Use a published special action.
    Special(usize),
    /// Describe a free-form action for the GM.
    Custom(String),
    /// Show the caller's fighting statistics.
    Stats,
    /// Show the published special actions.
    Specials,
    /// Show the fight's status table.
    Status,
    /// Watch the fight here.
    Observe,
    /// Stop watching.
    StopObserving,
    /// Attack automatically each round.
    Autoattack(bool),
    /// Start protecting someone.
    Protect {
        /// Who to protect.
        ward: CharacterId,
    },
    /// Stop protecting anyone.
    StopProtecting,
    /// A GM operation.
    Admin(Admin),
}

/// GM operations on the fight at the GM's location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admin {
    /// Leave initializing and begin the first round.
    Start,
    /// Switch managed pacing on or off.
    ToggleManaged,
    /// Roll or resolve the active participant's action.
    Execute,
    /// End the active participant's turn.
    Next,
    /// Give a combatant one more action this round.
    Requeue {
        /// Who acts again.
        target: CharacterId,
    },
    /// Mark one combatant ready.
    Ready {
        /// Who is ready.
        target: CharacterId,
    },
    /// Mark everyone ready.
    ReadyAll,
    /// End the fight.
    Stop,
    /// Bring a character into the fight.
    Add {
        /// Who joins.
        target: CharacterId,
    },
    /// Throw a combatant out.
    Kick {
        /// Who leaves.
        target: CharacterId,
    },
    /// Move a combatant to the observers.
    Afk {
        /// Who is away.
        target: CharacterId,
    },
    /// Replace a combatant's action with a free-form one.
    Force {
        /// Whose action.
        target: CharacterId,
        /// What they do.
        action: String,
    },
    /// Roll an arbitrary check for a combatant.
    Check {
        /// Who rolls.
        target: CharacterId,
        /// Stat added to the pool.
        stat: Option<Stat>,
        /// Skill added to the pool.
        skill: Option<Skill>,
        /// Difficulty; the configured default when absent.
        difficulty: Option<i32>,
    },
    /// Roll a special action for everyone using it.
    CheckAll(usize),
    /// Tabulate special action rolls.
    ListRolls,
    /// Publish a special action.
    AddSpecial {
        /// Name shown to players.
        name: String,
        /// Stat rolled.
        stat: Option<Stat>,
        /// Skill rolled.
        skill: Option<Skill>,
        /// Difficulty; the configured default when absent.
        difficulty: Option<i32>,
    },
    /// Withdraw a special action.
    RemoveSpecial(usize),
    /// Let a combatant strike every foe at once.
    Cleave {
        /// Whose attacks.
        target: CharacterId,
        /// Whether they cleave.
        on: bool,
    },
    /// How often an automated combatant changes targets.
    SwitchChance {
        /// Whose targeting.
        target: CharacterId,
        /// Percentage from 0 to 100.
        percent: u32,
    },
    /// How dangerous automated attackers are.
    Risk(u32),
    /// Set one temporary modifier.
    Modifier {
        /// Whose modifier.
        target: CharacterId,
        /// Which roll it adjusts.
        kind: ModifierKind,
        /// New value.
        value: i32,
    },
    /// Show a combatant's temporary modifiers.
    Modifiers {
        /// Whose modifiers.
        target: CharacterId,
    },
    /// Deal damage from outside the fight.
    Inflict {
        /// Who is hurt.
        targets: Vec<CharacterId>,
        /// Damage before mitigation.
        amount: u32,
        /// What hurts them, for narration.
        source: String,
        /// Whether armor and soak apply.
        mitigation: bool,
    },
}

// =============================================================================
// Dispatch
// =============================================================================

/// Runs one command for `caller`.
///
/// `now` is the current time in seconds, used for away-flag grace periods.
///
/// # Returns
///
/// Text for the caller alone, or `None` when the fight's notices already
/// carry the feedback. Errors come back as their message.
pub fn dispatch(
    registry: &mut FightRegistry,
    roster: &mut dyn Roster,
    caller: CharacterId,
    command: Command,
    now: u64,
) -> Option<String> {
    debug!(%caller, ?command, "dispatching command");
    let reply = match run(registry, roster, caller, command, now) {
        Ok(reply) => reply,
        Err(err) => {
            match err.severity() {
                ErrorSeverity::Command => {}
                ErrorSeverity::Invariant => warn!(%caller, error = %err, "command hit an engine inconsistency"),
                ErrorSeverity::Fatal => error!(%caller, error = %err, "command failed fatally"),
            }
            Some(err.to_string())
        }
    };
    registry.reap();
    reply
}

fn run(
    registry: &mut FightRegistry,
    roster: &mut dyn Roster,
    caller: CharacterId,
    command: Command,
    now: u64,
) -> Result<Option<String>, CombatError> {
    match command {
        Command::Fight { targets } => registry.start_fight(roster, caller, &targets).map(|()| None),
        Command::Observe => registry.observe(roster, caller).map(|()| None),
        Command::StopObserving => registry.stop_observing(roster, caller).map(|()| None),
        Command::Protect { ward } => match registry.fight_here_mut(&*roster, caller) {
            Ok(fight) => fight.protect(roster, caller, ward).map(|()| None),
            Err(_) => {
                assign_guard(roster, caller, ward)?;
                Ok(Some(format!("You are now protecting {}.", roster.name_of(ward))))
            }
        },
        Command::StopProtecting => match registry.fight_here_mut(&*roster, caller) {
            Ok(fight) => fight.stop_protecting(roster, caller).map(|()| None),
            Err(_) => {
                let ward = release_guard(roster, caller)?;
                Ok(Some(format!("You stop protecting {}.", roster.name_of(ward))))
            }
        },
        Command::Stance(stance) => match registry.fight_here_mut(&*roster, caller) {
            Ok(fight) if fight.is_participant(caller) => fight.set_stance(roster, caller, stance).map(|()| None),
            _ => {
                roster.require_mut(caller)?.stance = stance;
                Ok(Some(format!("Stance changed to {stance}.")))
            }
        },
        Command::Autoattack(on) => match registry.fight_here_mut(&*roster, caller) {
            Ok(fight) if fight.is_participant(caller) => fight.set_autoattack(roster, caller, on).map(|()| None),
            _ => {
                roster.require_mut(caller)?.autoattack = on;
                let setting = if on { "on" } else { "off" };
                Ok(Some(format!("Autoattack is now {setting}.")))
            }
        },
        command => {
            let fight = registry.fight_here_mut(&*roster, caller)?;
            in_fight(fight, roster, caller, command, now)
        }
    }
}

/// Commands that need the fight at the caller's location.
fn in_fight(
    fight: &mut Fight,
    roster: &mut dyn Roster,
    caller: CharacterId,
    command: Command,
    now: u64,
) -> Result<Option<String>, CombatError> {
    let quiet = |result: Result<(), CombatError>| -> Result<Option<String>, CombatError> { result.map(|()| None) };
    match command {
        Command::Attack { target, options } => quiet(fight.declare_attack(roster, caller, target, false, options)),
        Command::Kill { target, options } => quiet(fight.declare_attack(roster, caller, target, true, options)),
        Command::Ready => quiet(fight.ready(roster, caller)),
        Command::Pass => quiet(fight.declare_pass(roster, caller, false)),
        Command::Delay => quiet(fight.declare_pass(roster, caller, true)),
        Command::Cancel => quiet(fight.cancel_action(caller)),
        Command::Flee { exit } => quiet(fight.flee(roster, caller, &exit)),
        Command::Flank { target, only } => quiet(fight.declare_flank(roster, caller, target, only)),
        Command::Catch { target } => quiet(fight.catch(roster, caller, target)),
        Command::Cover { targets } => quiet(fight.cover(roster, caller, &targets)),
        Command::StopCover { target } => quiet(fight.stop_cover(roster, caller, target)),
        Command::Afk { target } => fight.flag_afk(roster, caller, target, now).map(|_| None),
        Command::VoteEnd => quiet(fight.vote_to_end(roster, caller)),
        Command::Surrender => quiet(fight.surrender(roster, caller)),
        Command::PreventSurrender { target } => quiet(fight.prevent_surrender(roster, caller, target)),
        Command::Special(number) => quiet(fight.declare_special(roster, caller, number)),
        Command::Custom(description) => quiet(fight.declare_custom(roster, caller, &description)),
        Command::Stats => fight.combat_stats(&*roster, caller).map(Some),
        Command::Specials => Ok(Some(fight.special_actions_text())),
        Command::Status => Ok(Some(fight.status(&*roster))),
        Command::Admin(admin) => run_admin(fight, roster, caller, admin),
        Command::Fight { .. }
        | Command::Observe
        | Command::StopObserving
        | Command::Stance(_)
        | Command::Autoattack(_)
        | Command::Protect { .. }
        | Command::StopProtecting => Ok(None),
    }
}

fn run_admin(
    fight: &mut Fight,
    roster: &mut dyn Roster,
    gm: CharacterId,
    admin: Admin,
) -> Result<Option<String>, CombatError> {
    let quiet = |result: Result<(), CombatError>| -> Result<Option<String>, CombatError> { result.map(|()| None) };
    match admin {
        Admin::Start => quiet(fight.finish_initialization(roster)),
        Admin::ToggleManaged => fight.toggle_managed(roster, gm).map(|_| None),
        Admin::Execute => quiet(fight.execute(roster, gm)),
        Admin::Next => quiet(fight.advance_turn(roster, gm)),
        Admin::Requeue { target } => quiet(fight.requeue(&*roster, gm, target)),
        Admin::Ready { target } => quiet(fight.ready_participant(roster, gm, target)),
        Admin::ReadyAll => quiet(fight.ready_all(roster, gm)),
        Admin::Stop => quiet(fight.stop_fight(roster, gm)),
        Admin::Add { target } => quiet(fight.admin_add(roster, gm, target)),
        Admin::Kick { target } => quiet(fight.kick(roster, gm, target)),
        Admin::Afk { target } => quiet(fight.mark_afk(roster, gm, target)),
        Admin::Force { target, action } => quiet(fight.force_action(roster, gm, target, &action)),
        Admin::Check {
            target,
            stat,
            skill,
            difficulty,
        } => fight.check(&*roster, gm, target, stat, skill, difficulty).map(|_| None),
        Admin::CheckAll(number) => fight.check_all(&*roster, gm, number).map(|_| None),
        Admin::ListRolls => Ok(Some(fight.list_rolls(&*roster))),
        Admin::AddSpecial {
            name,
            stat,
            skill,
            difficulty,
        } => {
            let difficulty = difficulty.unwrap_or(fight.config().special_action_difficulty);
            fight.add_special(gm, SpecialAction::new(name, stat, skill, difficulty));
            Ok(None)
        }
        Admin::RemoveSpecial(number) => fight.remove_special(gm, number).map(|_| None),
        Admin::Cleave { target, on } => quiet(fight.set_cleave(&*roster, gm, target, on)),
        Admin::SwitchChance { target, percent } => quiet(fight.set_switch_chance(&*roster, gm, target, percent)),
        Admin::Risk(risk) => quiet(fight.set_risk(gm, risk)),
        Admin::Modifier { target, kind, value } => quiet(fight.set_modifier(&*roster, gm, target, kind, value)),
        Admin::Modifiers { target } => fight.modifiers_summary(&*roster, target).map(Some),
        Admin::Inflict {
            targets,
            amount,
            source,
            mitigation,
        } => fight
            .inflict(roster, gm, &targets, amount, &source, mitigation)
            .map(|_| None),
    }
}
