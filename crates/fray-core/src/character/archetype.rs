//! Static templates for automated characters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Armor, Character, CharacterId, Mob, Traits, WeaponProfile};

/// Base values for a kind of automated character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    /// Template name, used as the character name.
    pub name: String,
    /// Base stats and skills.
    pub traits: Traits,
    /// Weapon carried.
    pub weapon: WeaponProfile,
    /// Armor worn.
    #[serde(default)]
    pub armor: Armor,
    /// Whether a shield is carried.
    #[serde(default)]
    pub has_shield: bool,
    /// Plural name; set for templates that spawn as mobs.
    #[serde(default)]
    pub plural: Option<String>,
}

/// Lookup of archetypes by template id.
pub trait ArchetypeTable {
    /// Returns the template, if any.
    fn archetype(&self, template: u32) -> Option<&Archetype>;
}

/// An [`ArchetypeTable`] backed by a map, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeCatalog {
    templates: BTreeMap<u32, Archetype>,
}

impl ArchetypeCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a template.
    pub fn insert(&mut self, template: u32, archetype: Archetype) {
        self.templates.insert(template, archetype);
    }

    /// Parses a catalog from a JSON object keyed by template id.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let templates = serde_json::from_str(json)?;
        Ok(Self { templates })
    }
}

impl ArchetypeTable for ArchetypeCatalog {
    fn archetype(&self, template: u32) -> Option<&Archetype> {
        self.templates.get(&template)
    }
}

impl Character {
    /// Builds an automated character from a template. A `quantity` above one
    /// makes it a mob when the template has a plural name.
    #[must_use]
    pub fn from_archetype(id: CharacterId, archetype: &Archetype, quantity: u32) -> Self {
        let mut character = Character::automated(id, archetype.name.clone());
        character.traits = archetype.traits.clone();
        character.weapon = Some(archetype.weapon.clone());
        character.armor = archetype.armor;
        character.has_shield = archetype.has_shield;
        if let Some(plural) = archetype.plural.as_ref().filter(|_| quantity > 1) {
            character.mob = Some(Mob::new(quantity, archetype.name.clone(), plural.clone()));
        }
        character
    }
}
