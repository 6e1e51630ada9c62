//! # Fray Core
//!
//! Turn-based combat engine for a multiplayer text world.
//!
//! A fight runs at one location and cycles between a setup phase, where
//! every combatant declares an action and readies up, and a resolution
//! phase, where combatants act one at a time in initiative order. Attacks
//! are resolved with stat and skill checks from [`fray_dice`]; damage,
//! mitigation, consciousness and death follow from the margin of success.
//!
//! - [`character`]: persisted characters and their capabilities
//! - [`roster`]: how the engine reads and writes characters
//! - [`participant`]: per-fight state of each combatant
//! - [`action`]: actions declared for a turn
//! - [`attack`]: resolution of strikes and flanks
//! - [`special_action`]: GM-authored checks
//! - [`fight`]: the orchestrator and its phases
//! - [`registry`]: one fight per location
//! - [`commands`]: the surface a text layer drives
//! - [`output`]: notices for the people involved
//! - [`config`]: tunables
//! - [`error`]: error types
//!
//! ## Quick Start
//!
//! ```
//! use fray_core::character::{Character, LocationId};
//! use fray_core::commands::{dispatch, Command};
//! use fray_core::{CombatConfig, FightRegistry, FightState};
//! use fray_core::roster::InMemoryRoster;
//!
//! let hall = LocationId::new(1);
//! let mut roster = InMemoryRoster::new();
//! let a = roster.spawn(|id| Character::player(id, "Aldric").at(hall));
//! let b = roster.spawn(|id| Character::player(id, "Brenna").at(hall));
//!
//! let mut registry = FightRegistry::new(42, CombatConfig::default());
//! dispatch(&mut registry, &mut roster, a, Command::Fight { targets: vec![b] }, 0);
//! dispatch(&mut registry, &mut roster, a, Command::Ready, 0);
//! dispatch(&mut registry, &mut roster, b, Command::Ready, 0);
//!
//! let fight = registry.fight_at(hall).unwrap();
//! assert_eq!(fight.state(), FightState::Resolution);
//! assert_eq!(fight.round(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod attack;
pub mod character;
pub mod commands;
pub mod config;
pub mod error;
pub mod fight;
pub mod output;
pub mod participant;
pub mod registry;
pub mod roster;
pub mod special_action;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use commands::{dispatch, Admin, Command};
pub use config::CombatConfig;
pub use error::{CombatError, ConfigError, ErrorSeverity, ParseError};
pub use fight::{Fight, FightState};
pub use registry::FightRegistry;
