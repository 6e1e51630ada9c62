//! Error types for the combat engine.
//!
//! Every failure a command can run into is a [`CombatError`]. Its `Display`
//! text is the message shown to whoever issued the command, so the command
//! layer never has to invent wording of its own. [`CombatError::severity`]
//! separates ordinary refusals from engine inconsistencies that operators
//! should hear about.

use std::fmt;

use thiserror::Error;

use crate::character::CharacterId;

/// How serious a [`CombatError`] is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// The command was refused; report it and move on.
    Command,
    /// Engine state did not line up; abort the single action and log it.
    Invariant,
    /// The fight can no longer be trusted and must be torn down.
    Fatal,
}

impl ErrorSeverity {
    /// Lowercase label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Invariant => "invariant",
            Self::Fatal => "fatal",
        }
    }

    /// Whether operators should be told.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Invariant | Self::Fatal)
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of fight and participant operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CombatError {
    // -------------------------------------------------------------------------
    // Membership
    // -------------------------------------------------------------------------
    /// The caller is not a combatant here.
    #[error("You are not participating in a fight here.")]
    NotInFight,

    /// No fight runs at the location.
    #[error("There is no fight here.")]
    NoFightHere,

    /// A fight is already running at the location.
    #[error("There is already a fight here.")]
    FightAlreadyHere,

    /// Teardown is in progress.
    #[error("Combat is shutting down so this command will not work.")]
    ShuttingDown,

    /// The character is already a combatant.
    #[error("{name} is already in the fight.")]
    AlreadyFighting {
        /// Character name.
        name: String,
    },

    /// The character cannot be attacked.
    #[error("{name} is not attackable.")]
    NotAttackable {
        /// Character name.
        name: String,
    },

    /// The character is somewhere else.
    #[error("{name} is not here.")]
    NotPresent {
        /// Character name.
        name: String,
    },

    /// The character is not a combatant in this fight.
    #[error("{name} is not in the fight.")]
    NotACombatant {
        /// Character name.
        name: String,
    },

    /// The caller is already watching.
    #[error("You are already spectating this fight.")]
    AlreadyObserving,

    /// The caller is not watching.
    #[error("You are not spectating a fight.")]
    NotObserving,

    // -------------------------------------------------------------------------
    // Phase and turn
    // -------------------------------------------------------------------------
    /// The command does not fit the current phase.
    #[error("{0}")]
    WrongPhase(&'static str),

    /// Only allowed on the caller's own turn.
    #[error("You may only perform this action on your turn.")]
    NotYourTurn,

    /// The caller cannot act.
    #[error("You are not conscious.")]
    Incapacitated,

    /// The caller has already readied up.
    #[error("You have already indicated you are ready.")]
    AlreadyReady,

    /// Stance changes only between rounds.
    #[error("You can only change stance between rounds.")]
    StanceLocked,

    /// Nothing is queued.
    #[error("You have no queued action to cancel.")]
    NothingQueued,

    // -------------------------------------------------------------------------
    // Attacks
    // -------------------------------------------------------------------------
    /// Target is down and the attack was not lethal.
    #[error("{name} is incapacitated. To kill an incapacitated character, you must use the kill command.")]
    MustFinishOff {
        /// Target name.
        name: String,
    },

    /// Target is still up and the attack was lethal.
    #[error("{name} is not incapacitated. You can only finish off someone who cannot fight.")]
    NotFinishable {
        /// Target name.
        name: String,
    },

    /// Killing blows cannot slip past guards.
    #[error("You cannot bypass defenders with a killing blow.")]
    CannotBypassWhenKilling,

    /// Tradeoff out of range.
    #[error("Modifier must be a number between 1 and {max}.")]
    InvalidTradeoff {
        /// Upper bound.
        max: i32,
    },

    /// Flub out of range.
    #[error("Flub modifiers cannot exceed {max}.")]
    FlubTooLarge {
        /// Upper bound.
        max: i32,
    },

    /// Cannot attack oneself.
    #[error("You cannot attack yourself.")]
    SelfTarget,

    /// The target has nobody guarding them.
    #[error("{name} has no defenders to flank.")]
    NoDefenders {
        /// Target name.
        name: String,
    },

    // -------------------------------------------------------------------------
    // Votes
    // -------------------------------------------------------------------------
    /// Already voted to end.
    #[error("You have already voted to end the fight.")]
    AlreadyVotedToEnd,

    /// Already voted on this AFK flag.
    #[error("You have already voted for {name} to be removed.")]
    AlreadyVotedAfk {
        /// Flagged character.
        name: String,
    },

    /// Cannot flag oneself.
    #[error("You cannot vote yourself as away.")]
    CannotFlagSelf,

    /// Flag target is not stalling.
    #[error("{name} is not holding up the fight.")]
    NotStalling {
        /// Flagged character.
        name: String,
    },

    /// Flag grace window still open.
    #[error("{name} still has {remaining} seconds to respond.")]
    AfkGrace {
        /// Flagged character.
        name: String,
        /// Seconds left.
        remaining: u64,
    },

    /// Someone vetoed this surrender.
    #[error("You are not permitted to surrender by {names}.")]
    SurrenderPrevented {
        /// Who vetoed.
        names: String,
    },

    // -------------------------------------------------------------------------
    // Flee, catch, cover, guard
    // -------------------------------------------------------------------------
    /// Covering others rules out fleeing.
    #[error("You cannot attempt to run while covering others' retreat.")]
    CoveringCannotFlee,

    /// Flee already declared.
    #[error("You are already attempting to flee.")]
    AlreadyFleeing,

    /// Exit refuses the character.
    #[error("You are not permitted to flee that way.")]
    NotPermittedToFlee,

    /// No such exit.
    #[error("There is no exit called '{0}'.")]
    NoSuchExit(String),

    /// Already blocking that target.
    #[error("You are already attempting to stop {name} from fleeing.")]
    AlreadyCatching {
        /// Target name.
        name: String,
    },

    /// Cannot catch someone you cover.
    #[error("You cannot stop {name} from fleeing while covering their retreat.")]
    CatchingCovered {
        /// Target name.
        name: String,
    },

    /// Cannot cover someone that way.
    #[error("{0}")]
    InvalidCover(String),

    /// Already guarding.
    #[error("You are already protecting {name}.")]
    AlreadyGuarding {
        /// Guarded character.
        name: String,
    },

    /// Not guarding anyone.
    #[error("You are not protecting anyone.")]
    NotGuarding,

    /// Guarding oneself.
    #[error("You cannot protect yourself.")]
    CannotProtectSelf,

    // -------------------------------------------------------------------------
    // Managed mode and special actions
    // -------------------------------------------------------------------------
    /// Special actions need a GM.
    #[error("Special actions can only be taken when combat has a presiding GM.")]
    NotManaged,

    /// Unknown special action number.
    #[error("No special action numbered {0}.")]
    UnknownSpecialAction(usize),

    /// Nothing to roll.
    #[error("{name} has no special action to roll.")]
    NoPresetQueued {
        /// Character name.
        name: String,
    },

    /// No one is acting.
    #[error("No one is currently taking a turn.")]
    NoActiveParticipant,

    /// Switch chance out of range.
    #[error("Switch chance must be between 0 and 100.")]
    InvalidSwitchChance,

    /// Risk out of range.
    #[error("Risk must be between 0 and {max}.")]
    InvalidRisk {
        /// Upper bound.
        max: u32,
    },

    /// Unknown name in a command argument.
    #[error(transparent)]
    Parse(#[from] ParseError),

    // -------------------------------------------------------------------------
    // Engine
    // -------------------------------------------------------------------------
    /// An attack was resolved with nobody to hit.
    #[error("No one to attack.")]
    NoTargets,

    /// A participant record was expected and missing.
    #[error("Combat state for {0} is missing.")]
    MissingParticipant(CharacterId),

    /// A character the fight references no longer exists.
    #[error("Character {0} could not be found.")]
    MissingCharacter(CharacterId),
}

impl CombatError {
    /// Classifies the error.
    #[must_use]
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoTargets | Self::MissingParticipant(_) => ErrorSeverity::Invariant,
            Self::MissingCharacter(_) => ErrorSeverity::Fatal,
            _ => ErrorSeverity::Command,
        }
    }
}

/// Failures parsing names typed by players.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Not a stat.
    #[error("'{0}' is not a valid stat.")]
    UnknownStat(String),
    /// Not a skill.
    #[error("'{0}' is not a valid skill.")]
    UnknownSkill(String),
    /// Not a stance.
    #[error("'{0}' is not a valid stance. Choose from defensive, guarded, balanced, aggressive or reckless.")]
    UnknownStance(String),
    /// Not a modifier category.
    #[error("'{0}' is not a modifier type. Choose from attack, defense, mitigation, damage or special.")]
    UnknownModifier(String),
}

/// Failures loading a [`CombatConfig`](crate::config::CombatConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("invalid combat config: {0}")]
    Json(#[from] serde_json::Error),
    /// The values do not describe a usable configuration.
    #[error("invalid combat config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_player_facing() {
        let err = CombatError::NotACombatant {
            name: "Marla".to_string(),
        };
        assert_eq!(err.to_string(), "Marla is not in the fight.");
        assert_eq!(
            CombatError::InvalidTradeoff { max: 50 }.to_string(),
            "Modifier must be a number between 1 and 50."
        );
    }

    #[test]
    fn severity_classification() {
        assert_eq!(CombatError::NotYourTurn.severity(), ErrorSeverity::Command);
        assert_eq!(CombatError::NoTargets.severity(), ErrorSeverity::Invariant);
        assert!(CombatError::MissingCharacter(CharacterId::new(1))
            .severity()
            .is_internal());
        assert!(!CombatError::AlreadyVotedToEnd.severity().is_internal());
    }

    #[test]
    fn parse_errors_pass_through() {
        let err: CombatError = ParseError::UnknownStance("berserk".to_string()).into();
        assert!(err.to_string().starts_with("'berserk' is not a valid stance."));
    }
}
