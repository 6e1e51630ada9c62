//! Tunable combat constants.
//!
//! Every number that shapes how a fight plays out lives in [`CombatConfig`].
//! The defaults reproduce the live game's tuning; a server can override any
//! of them from JSON.
//!
//! ```
//! use fray_core::config::CombatConfig;
//!
//! let config = CombatConfig::from_json_str(r#"{ "max_rounds": 40 }"#).unwrap();
//! assert_eq!(config.max_rounds, 40);
//! assert_eq!(config.default_risk, 4);
//! ```

use serde::{Deserialize, Serialize};

use crate::character::Stance;
use crate::error::ConfigError;

// =============================================================================
// Margin Bands
// =============================================================================

/// Where a to-hit margin lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarginBand {
    /// Badly missed; may be riposted.
    Botch,
    /// Stopped by the defense.
    Defended,
    /// Connected, with a damage tier.
    Hit(HitTier),
}

/// How well a hit landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitTier {
    /// Just got through.
    BarelyTouch,
    /// Scratched.
    Graze,
    /// Partially turned.
    Glancing,
    /// Clean hit.
    Solid,
    /// Defender could do nothing.
    NoContest,
}

impl HitTier {
    /// Word used in narration.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            HitTier::BarelyTouch => "barely touch",
            HitTier::Graze => "graze",
            HitTier::Glancing => "glancing hit",
            HitTier::Solid => "hit",
            HitTier::NoContest => "no-contest hit",
        }
    }
}

/// Margin thresholds and the damage multiplier of each hit tier.
///
/// Bands are inclusive at their upper end for botch and defended, and the
/// hit tiers start at their lower bound. `no_contest_above` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginBands {
    /// Margins at or below this botch.
    pub botch: i32,
    /// Margins at or below this (and above `botch`) are defended.
    pub defended: i32,
    /// First margin of the graze tier.
    pub graze_from: i32,
    /// First margin of the glancing tier.
    pub glancing_from: i32,
    /// First margin of the solid tier.
    pub solid_from: i32,
    /// Margins strictly above this are no-contest hits.
    pub no_contest_above: i32,
    /// Damage multiplier for barely-touch hits.
    pub barely_touch_mult: f64,
    /// Damage multiplier for grazes.
    pub graze_mult: f64,
    /// Damage multiplier for glancing hits.
    pub glancing_mult: f64,
    /// Damage multiplier for solid hits.
    pub solid_mult: f64,
    /// Damage multiplier for no-contest hits.
    pub no_contest_mult: f64,
}

impl Default for MarginBands {
    fn default() -> Self {
        Self {
            botch: -30,
            defended: -16,
            graze_from: -5,
            glancing_from: 5,
            solid_from: 15,
            no_contest_above: 9000,
            barely_touch_mult: 0.25,
            graze_mult: 0.5,
            glancing_mult: 0.75,
            solid_mult: 1.0,
            no_contest_mult: 2.0,
        }
    }
}

impl MarginBands {
    /// Classifies a to-hit margin. Every margin maps to exactly one band.
    ///
    /// ```
    /// use fray_core::config::{HitTier, MarginBand, MarginBands};
    ///
    /// let bands = MarginBands::default();
    /// assert_eq!(bands.classify(0), MarginBand::Hit(HitTier::Graze));
    /// assert_eq!(bands.classify(-16), MarginBand::Defended);
    /// assert_eq!(bands.classify(-30), MarginBand::Botch);
    /// ```
    #[must_use]
    pub fn classify(&self, margin: i32) -> MarginBand {
        if margin <= self.botch {
            MarginBand::Botch
        } else if margin <= self.defended {
            MarginBand::Defended
        } else if margin < self.graze_from {
            MarginBand::Hit(HitTier::BarelyTouch)
        } else if margin < self.glancing_from {
            MarginBand::Hit(HitTier::Graze)
        } else if margin < self.solid_from {
            MarginBand::Hit(HitTier::Glancing)
        } else if margin > self.no_contest_above {
            MarginBand::Hit(HitTier::NoContest)
        } else {
            MarginBand::Hit(HitTier::Solid)
        }
    }

    /// Damage multiplier of a tier.
    #[must_use]
    pub fn multiplier(&self, tier: HitTier) -> f64 {
        match tier {
            HitTier::BarelyTouch => self.barely_touch_mult,
            HitTier::Graze => self.graze_mult,
            HitTier::Glancing => self.glancing_mult,
            HitTier::Solid => self.solid_mult,
            HitTier::NoContest => self.no_contest_mult,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.botch < self.defended
            && self.defended < self.graze_from
            && self.graze_from < self.glancing_from
            && self.glancing_from < self.solid_from
            && self.solid_from <= self.no_contest_above;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::Invalid(
                "margin bands must increase from botch to no-contest".to_string(),
            ))
        }
    }
}

// =============================================================================
// Stances
// =============================================================================

/// Attack and defense difficulty modifiers for one stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StanceModifiers {
    /// Added to the stance holder's to-hit difficulty.
    pub attack: i32,
    /// Added to the stance holder's defense difficulty.
    pub defense: i32,
}

/// Modifiers for every stance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StanceTable {
    /// Defensive stance.
    pub defensive: StanceModifiers,
    /// Guarded stance.
    pub guarded: StanceModifiers,
    /// Balanced stance.
    pub balanced: StanceModifiers,
    /// Aggressive stance.
    pub aggressive: StanceModifiers,
    /// Reckless stance.
    pub reckless: StanceModifiers,
}

impl Default for StanceTable {
    fn default() -> Self {
        Self {
            defensive: StanceModifiers {
                attack: 10,
                defense: -10,
            },
            guarded: StanceModifiers {
                attack: 5,
                defense: -5,
            },
            balanced: StanceModifiers::default(),
            aggressive: StanceModifiers {
                attack: -10,
                defense: 10,
            },
            reckless: StanceModifiers {
                attack: -20,
                defense: 20,
            },
        }
    }
}

impl StanceTable {
    /// Modifiers of a stance.
    #[must_use]
    pub const fn get(&self, stance: Stance) -> StanceModifiers {
        match stance {
            Stance::Defensive => self.defensive,
            Stance::Guarded => self.guarded,
            Stance::Balanced => self.balanced,
            Stance::Aggressive => self.aggressive,
            Stance::Reckless => self.reckless,
        }
    }
}

// =============================================================================
// Combat Config
// =============================================================================

/// Every tunable of the combat engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Hit quality bands.
    pub margins: MarginBands,
    /// Stance modifiers.
    pub stances: StanceTable,
    /// Rounds after which a fight ends regardless.
    pub max_rounds: u32,
    /// Seconds a flagged participant has to respond.
    pub afk_grace_secs: u64,
    /// Seconds between periodic housekeeping runs.
    pub round_delay_secs: u64,
    /// Risk for new fights; automated rolls scale by `risk / 4`.
    pub default_risk: u32,
    /// Highest risk a GM may set.
    pub max_risk: u32,
    /// To-hit penalty per defender bypassed.
    pub bypass_penalty_per_defender: i32,
    /// To-hit and defense penalty while covering a retreat.
    pub covering_penalty: i32,
    /// Critical/accuracy tradeoff used when none is given.
    pub tradeoff_default: i32,
    /// Largest critical/accuracy tradeoff.
    pub tradeoff_max: i32,
    /// Largest flub modifier.
    pub flub_max: i32,
    /// Difficulty of new special actions.
    pub special_action_difficulty: i32,
    /// Idle housekeeping checks a managed fight tolerates before ending.
    pub managed_idle_limit: u32,
    /// Defense penalty per prior attack this round.
    pub overwhelm_step: i32,
    /// Ceiling on the overwhelm penalty.
    pub overwhelm_cap: i32,
    /// Switch chance for mobs without their own.
    pub mob_switch_chance: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            margins: MarginBands::default(),
            stances: StanceTable::default(),
            max_rounds: 250,
            afk_grace_secs: 120,
            round_delay_secs: 300,
            default_risk: 4,
            max_risk: 10,
            bypass_penalty_per_defender: 15,
            covering_penalty: 5,
            tradeoff_default: 15,
            tradeoff_max: 50,
            flub_max: 500,
            special_action_difficulty: 15,
            managed_idle_limit: 3,
            overwhelm_step: 10,
            overwhelm_cap: 40,
            mob_switch_chance: 50,
        }
    }
}

impl CombatConfig {
    /// Parses and validates a config. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed JSON or inconsistent values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values describe a usable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.margins.validate()?;
        if self.tradeoff_default < 1 || self.tradeoff_default > self.tradeoff_max {
            return Err(ConfigError::Invalid(
                "tradeoff_default must lie between 1 and tradeoff_max".to_string(),
            ));
        }
        if self.default_risk > self.max_risk {
            return Err(ConfigError::Invalid(
                "default_risk exceeds max_risk".to_string(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be positive".to_string()));
        }
        Ok(())
    }
}
