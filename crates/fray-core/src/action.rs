//! Declared intentions waiting for their owner's turn.
//!
//! A [`QueuedAction`] carries everything needed to resolve it later without
//! asking the player again: the target, the option penalties worked out when
//! it was declared, and the text shown when it fires. It is consumed exactly
//! once. Special actions additionally record the round they were rolled in
//! and the roll.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::character::CharacterId;
use crate::config::CombatConfig;
use crate::error::CombatError;

/// What a queued action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Strike a conscious target.
    Attack,
    /// Finish off an incapacitated target.
    Kill,
    /// Slip past a target's defenders.
    Flank,
    /// Skip the turn.
    Pass,
    /// Move to the back of the initiative order.
    Delay,
    /// Free-form action for a GM to adjudicate.
    Custom,
    /// A registered special action, by index.
    Preset(usize),
}

impl ActionKind {
    /// Whether the action strikes someone.
    #[must_use]
    pub const fn is_attack(self) -> bool {
        matches!(self, Self::Attack | Self::Kill | Self::Flank)
    }

    /// Whether a GM has to adjudicate it.
    #[must_use]
    pub const fn is_special(self) -> bool {
        matches!(self, Self::Custom | Self::Preset(_))
    }
}

/// Trading accuracy for damage or the reverse. Without an amount the
/// configured default is traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tradeoff {
    /// Harder to hit, more damage.
    Critical(Option<i32>),
    /// Easier to hit, less damage.
    Accuracy(Option<i32>),
}

/// Options a player can add to an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttackOptions {
    /// Go straight for the target, ignoring its defenders.
    pub only: bool,
    /// Accuracy/damage tradeoff.
    pub tradeoff: Option<Tradeoff>,
    /// Deliberately worse attack and damage, as absolute penalties.
    pub flub: Option<(i32, i32)>,
}

impl AttackOptions {
    /// Works out `(attack_penalty, damage_penalty)`.
    ///
    /// # Errors
    ///
    /// Fails on out-of-range modifiers or a lethal attack that tries to
    /// bypass defenders who are actually there.
    pub fn penalties(
        &self,
        lethal: bool,
        defender_count: usize,
        config: &CombatConfig,
    ) -> Result<(i32, i32), CombatError> {
        let mut attack = 0;
        let mut damage = 0;
        if self.only {
            if lethal && defender_count > 0 {
                return Err(CombatError::CannotBypassWhenKilling);
            }
            let count = i32::try_from(defender_count).unwrap_or(i32::MAX);
            attack += config.bypass_penalty_per_defender.saturating_mul(count);
        }
        match self.tradeoff {
            Some(Tradeoff::Critical(value)) => {
                let value = check_tradeoff(value, config)?;
                attack += value;
                damage -= value;
            }
            Some(Tradeoff::Accuracy(value)) => {
                let value = check_tradeoff(value, config)?;
                attack -= value;
                damage += value;
            }
            None => {}
        }
        if let Some((flub_attack, flub_damage)) = self.flub {
            let (flub_attack, flub_damage) = (flub_attack.abs(), flub_damage.abs());
            if flub_attack > config.flub_max || flub_damage > config.flub_max {
                return Err(CombatError::FlubTooLarge {
                    max: config.flub_max,
                });
            }
            attack += flub_attack;
            damage += flub_damage;
        }
        Ok((attack, damage))
    }
}

fn check_tradeoff(value: Option<i32>, config: &CombatConfig) -> Result<i32, CombatError> {
    let value = value.unwrap_or(config.tradeoff_default);
    if (1..=config.tradeoff_max).contains(&value) {
        Ok(value)
    } else {
        Err(CombatError::InvalidTradeoff {
            max: config.tradeoff_max,
        })
    }
}

/// A declared action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// What it does.
    pub kind: ActionKind,
    /// Who it is aimed at.
    pub target: Option<CharacterId>,
    /// Shown to the owner when it fires; describes custom actions.
    pub narration: String,
    /// Added to the to-hit difficulty.
    pub attack_penalty: i32,
    /// Added to the damage difficulty.
    pub damage_penalty: i32,
    /// Ignore the target's defenders.
    pub bypass_defenders: bool,
    /// Round in which it was resolved.
    pub round_completed: Option<u32>,
    /// Roll made for a special action.
    pub roll: Option<i32>,
}

impl QueuedAction {
    fn new(kind: ActionKind, target: Option<CharacterId>, narration: String) -> Self {
        Self {
            kind,
            target,
            narration,
            attack_penalty: 0,
            damage_penalty: 0,
            bypass_defenders: false,
            round_completed: None,
            roll: None,
        }
    }

    /// An attack or killing blow with options applied.
    ///
    /// # Errors
    ///
    /// Propagates option validation failures.
    pub fn strike(
        target: CharacterId,
        target_name: &str,
        lethal: bool,
        options: &AttackOptions,
        defender_count: usize,
        config: &CombatConfig,
    ) -> Result<Self, CombatError> {
        let (attack_penalty, damage_penalty) = options.penalties(lethal, defender_count, config)?;
        let (kind, verb) = if lethal {
            (ActionKind::Kill, "kill")
        } else {
            (ActionKind::Attack, "attack")
        };
        let mut narration = format!("You {verb} {target_name}.");
        if options.only {
            narration = format!("You {verb} {target_name}, ignoring their defenders.");
        }
        let mut action = Self::new(kind, Some(target), narration);
        action.attack_penalty = attack_penalty;
        action.damage_penalty = damage_penalty;
        action.bypass_defenders = options.only;
        Ok(action)
    }

    /// A plain attack with no options.
    #[must_use]
    pub fn attack(target: CharacterId, target_name: &str) -> Self {
        Self::new(
            ActionKind::Attack,
            Some(target),
            format!("You attack {target_name}."),
        )
    }

    /// A killing blow with no options.
    #[must_use]
    pub fn kill(target: CharacterId, target_name: &str) -> Self {
        Self::new(
            ActionKind::Kill,
            Some(target),
            format!("You attempt to kill {target_name}."),
        )
    }

    /// A flank. With `only`, the flanker backs off if spotted.
    #[must_use]
    pub fn flank(target: CharacterId, target_name: &str, only: bool) -> Self {
        let mut action = Self::new(
            ActionKind::Flank,
            Some(target),
            format!("You try to slip around {target_name}'s defenders."),
        );
        action.bypass_defenders = only;
        action
    }

    /// Skip this turn.
    #[must_use]
    pub fn pass() -> Self {
        Self::new(ActionKind::Pass, None, "You pass your turn.".to_string())
    }

    /// Act later this round.
    #[must_use]
    pub fn delay() -> Self {
        Self::new(ActionKind::Delay, None, "You delay your turn.".to_string())
    }

    /// A free-form action for a GM.
    #[must_use]
    pub fn custom(description: impl Into<String>) -> Self {
        Self::new(ActionKind::Custom, None, description.into())
    }

    /// A registered special action.
    #[must_use]
    pub fn preset(index: usize, name: &str) -> Self {
        Self::new(ActionKind::Preset(index), None, name.to_string())
    }

    /// Short description for the status table.
    #[must_use]
    pub fn summary(&self, target_name: Option<&str>) -> String {
        let target = target_name.unwrap_or("someone");
        match self.kind {
            ActionKind::Attack => format!("attack {target}"),
            ActionKind::Kill => format!("kill {target}"),
            ActionKind::Flank => format!("flank {target}"),
            ActionKind::Pass => "pass".to_string(),
            ActionKind::Delay => "delay".to_string(),
            ActionKind::Custom => format!("custom: {}", self.narration),
            ActionKind::Preset(_) => format!("special: {}", self.narration),
        }
    }
}

impl fmt::Display for QueuedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CharacterId {
        CharacterId::new(2)
    }

    mod option_tests {
        use super::*;

        #[test]
        fn only_scales_with_defenders() {
            let config = CombatConfig::default();
            let options = AttackOptions {
                only: true,
                ..AttackOptions::default()
            };
            assert_eq!(options.penalties(false, 2, &config), Ok((30, 0)));
            assert_eq!(options.penalties(false, 0, &config), Ok((0, 0)));
        }

        #[test]
        fn only_rejected_for_kills_past_defenders() {
            let options = AttackOptions {
                only: true,
                ..AttackOptions::default()
            };
            assert_eq!(
                options.penalties(true, 1, &CombatConfig::default()),
                Err(CombatError::CannotBypassWhenKilling)
            );
        }

        #[test]
        fn only_allowed_for_kills_without_defenders() {
            let options = AttackOptions {
                only: true,
                ..AttackOptions::default()
            };
            assert_eq!(options.penalties(true, 0, &CombatConfig::default()), Ok((0, 0)));
        }

        #[test]
        fn tradeoffs_move_penalty_between_attack_and_damage() {
            let config = CombatConfig::default();
            let critical = AttackOptions {
                tradeoff: Some(Tradeoff::Critical(Some(20))),
                ..AttackOptions::default()
            };
            let accuracy = AttackOptions {
                tradeoff: Some(Tradeoff::Accuracy(Some(10))),
                ..AttackOptions::default()
            };
            assert_eq!(critical.penalties(false, 0, &config), Ok((20, -20)));
            assert_eq!(accuracy.penalties(false, 0, &config), Ok((-10, 10)));
        }

        #[test]
        fn bare_tradeoff_uses_default() {
            let config = CombatConfig {
                tradeoff_default: 12,
                ..CombatConfig::default()
            };
            let critical = AttackOptions {
                tradeoff: Some(Tradeoff::Critical(None)),
                ..AttackOptions::default()
            };
            let accuracy = AttackOptions {
                tradeoff: Some(Tradeoff::Accuracy(None)),
                ..AttackOptions::default()
            };
            assert_eq!(critical.penalties(false, 0, &config), Ok((12, -12)));
            assert_eq!(accuracy.penalties(false, 0, &config), Ok((-12, 12)));
        }

        #[test]
        fn tradeoff_bounds() {
            let config = CombatConfig::default();
            for bad in [0, 51, -3] {
                let options = AttackOptions {
                    tradeoff: Some(Tradeoff::Critical(Some(bad))),
                    ..AttackOptions::default()
                };
                assert_eq!(
                    options.penalties(false, 0, &config),
                    Err(CombatError::InvalidTradeoff { max: 50 })
                );
            }
        }

        #[test]
        fn flub_uses_absolute_values() {
            let config = CombatConfig::default();
            let options = AttackOptions {
                flub: Some((-20, 10)),
                ..AttackOptions::default()
            };
            assert_eq!(options.penalties(false, 0, &config), Ok((20, 10)));
            let too_much = AttackOptions {
                flub: Some((501, 0)),
                ..AttackOptions::default()
            };
            assert_eq!(
                too_much.penalties(false, 0, &config),
                Err(CombatError::FlubTooLarge { max: 500 })
            );
        }
    }

    mod action_tests {
        use super::*;

        #[test]
        fn strike_carries_penalties() {
            let options = AttackOptions {
                tradeoff: Some(Tradeoff::Critical(Some(15))),
                ..AttackOptions::default()
            };
            let action = QueuedAction::strike(
                target(),
                "Garrick",
                false,
                &options,
                0,
                &CombatConfig::default(),
            )
            .unwrap();
            assert_eq!(action.kind, ActionKind::Attack);
            assert_eq!(action.attack_penalty, 15);
            assert_eq!(action.damage_penalty, -15);
            assert_eq!(action.narration, "You attack Garrick.");
        }

        #[test]
        fn lethal_strike_is_a_kill() {
            let action = QueuedAction::strike(
                target(),
                "Garrick",
                true,
                &AttackOptions::default(),
                0,
                &CombatConfig::default(),
            )
            .unwrap();
            assert_eq!(action.kind, ActionKind::Kill);
        }

        #[test]
        fn kinds() {
            assert!(ActionKind::Flank.is_attack());
            assert!(!ActionKind::Pass.is_attack());
            assert!(ActionKind::Preset(0).is_special());
            assert_eq!(QueuedAction::delay().summary(None), "delay");
            assert_eq!(
                QueuedAction::attack(target(), "Garrick").summary(Some("Garrick")),
                "attack Garrick"
            );
        }
    }
}
