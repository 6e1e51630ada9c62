//! Access to persisted characters and the locations they move between.
//!
//! The combat engine never owns characters. It reads and writes them through
//! the [`Roster`] trait, which the host world implements on top of whatever
//! storage it uses. [`InMemoryRoster`] is a self-contained implementation for
//! tests and small embeddings.
//!
//! # Example
//!
//! ```
//! use fray_core::character::{Character, Exit, LocationId};
//! use fray_core::roster::{InMemoryRoster, Roster};
//!
//! let hall = LocationId::new(1);
//! let yard = LocationId::new(2);
//! let mut roster = InMemoryRoster::new();
//! roster.add_exit(hall, Exit::new("out", yard));
//!
//! let id = roster.spawn(|id| Character::player(id, "Tamsin").at(hall));
//! let exit = roster.find_exit(hall, "out").unwrap();
//! roster.move_to(id, exit.destination).unwrap();
//! assert_eq!(roster.get(id).unwrap().location, Some(yard));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::character::{Character, CharacterId, Exit, LocationId};
use crate::error::CombatError;

/// Read/write access to characters and exits.
pub trait Roster {
    /// Looks up a character.
    fn get(&self, id: CharacterId) -> Option<&Character>;

    /// Looks up a character for modification.
    fn get_mut(&mut self, id: CharacterId) -> Option<&mut Character>;

    /// Moves a character to another location.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::MissingCharacter`] when the id is unknown.
    fn move_to(&mut self, id: CharacterId, destination: LocationId) -> Result<(), CombatError>;

    /// Finds an exit out of a location by name.
    fn find_exit(&self, location: LocationId, name: &str) -> Option<Exit>;

    /// Whether a character may use an exit.
    fn can_traverse(&self, id: CharacterId, exit: &Exit) -> bool;

    /// Looks up a character, treating absence as an engine error.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::MissingCharacter`] when the id is unknown.
    fn require(&self, id: CharacterId) -> Result<&Character, CombatError> {
        self.get(id).ok_or(CombatError::MissingCharacter(id))
    }

    /// Mutable form of [`Roster::require`].
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::MissingCharacter`] when the id is unknown.
    fn require_mut(&mut self, id: CharacterId) -> Result<&mut Character, CombatError> {
        self.get_mut(id).ok_or(CombatError::MissingCharacter(id))
    }

    /// Display name of a character, or its id when unknown.
    fn name_of(&self, id: CharacterId) -> String {
        self.get(id)
            .map_or_else(|| id.to_string(), Character::display_name)
    }
}

/// A [`Roster`] held in memory.
///
/// Characters are stored in a `BTreeMap` so iteration order follows id order.
/// Ids handed out by [`InMemoryRoster::spawn`] increase monotonically.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoster {
    characters: BTreeMap<CharacterId, Character>,
    exits: BTreeMap<LocationId, Vec<Exit>>,
    barred: BTreeSet<(CharacterId, LocationId)>,
    next_id: u64,
}

impl InMemoryRoster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Creates a character with a fresh id.
    pub fn spawn(&mut self, build: impl FnOnce(CharacterId) -> Character) -> CharacterId {
        let id = CharacterId::new(self.next_id.max(1));
        self.next_id = id.as_u64() + 1;
        self.characters.insert(id, build(id));
        id
    }

    /// Inserts a character under its own id, replacing any previous one.
    pub fn insert(&mut self, character: Character) {
        self.next_id = self.next_id.max(character.id.as_u64() + 1);
        self.characters.insert(character.id, character);
    }

    /// Adds an exit out of a location.
    pub fn add_exit(&mut self, from: LocationId, exit: Exit) {
        self.exits.entry(from).or_default().push(exit);
    }

    /// Stops a character from entering a location.
    pub fn bar(&mut self, id: CharacterId, destination: LocationId) {
        self.barred.insert((id, destination));
    }

    /// Number of characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Iterates characters in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }
}

impl Roster for InMemoryRoster {
    fn get(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    fn get_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    fn move_to(&mut self, id: CharacterId, destination: LocationId) -> Result<(), CombatError> {
        let character = self.require_mut(id)?;
        character.location = Some(destination);
        Ok(())
    }

    fn find_exit(&self, location: LocationId, name: &str) -> Option<Exit> {
        let wanted = name.trim();
        self.exits
            .get(&location)?
            .iter()
            .find(|exit| exit.name.eq_ignore_ascii_case(wanted))
            .cloned()
    }

    fn can_traverse(&self, id: CharacterId, exit: &Exit) -> bool {
        !self.barred.contains(&(id, exit.destination))
    }
}
