//! Text views of a fight: the status table, votes, statistics and the
//! special action listing.

use super::{Fight, FightState};
use crate::attack::list_to_string;
use crate::character::{CharacterId, DefenseFlags};
use crate::error::CombatError;
use crate::participant::ModifierKind;
use crate::roster::Roster;

/// Lays out rows under headers in padded columns.
pub(super) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        padded.join(" | ").trim_end().to_string()
    };
    let mut out = vec![line(headers.to_vec())];
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    out.push(rule.join("-+-"));
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

impl Fight {
    /// Status table, votes, turn order and round, as shown at the start of
    /// each phase.
    pub(super) fn phase_status(&self, roster: &dyn Roster) -> String {
        let mut rows = Vec::new();
        for state in self.participants.values() {
            let id = state.character();
            let Some(character) = roster.get(id) else {
                continue;
            };
            let action = state.queued_action.as_ref().map_or_else(
                || "None".to_string(),
                |action| action.summary(action.target.map(|t| roster.name_of(t)).as_deref()),
            );
            rows.push(vec![
                character.display_name(),
                character.wound_descriptor(character.health.total()).to_string(),
                state.fatigue_penalty(character).to_string(),
                action,
                if state.is_ready() { "yes" } else { "no" }.to_string(),
            ]);
        }
        let mut sections = vec![render_table(
            &["Combatant", "Damage", "Fatigue", "Action", "Ready?"],
            &rows,
        )];
        let votes = self.vote_string(roster);
        if !votes.is_empty() {
            sections.push(votes);
        }
        if self.state == FightState::Resolution {
            sections.push(self.turn_order_text(roster));
        }
        sections.push(format!("Current Round: {}", self.round));
        sections.join("\n")
    }

    fn turn_order_text(&self, roster: &dyn Roster) -> String {
        let mut parts = Vec::new();
        if let Some(active) = self.active {
            parts.push(format!("It is {}'s turn.", roster.name_of(active)));
        }
        if !self.initiative.is_empty() {
            let names: Vec<String> = self.initiative.iter().map(|id| roster.name_of(*id)).collect();
            parts.push(format!(
                "Turn order for remaining characters: {}",
                list_to_string(&names)
            ));
        }
        parts.join(" ")
    }

    /// Who has voted to end the fight and who still must. Empty when nobody
    /// has voted.
    pub(super) fn vote_string(&self, roster: &dyn Roster) -> String {
        if self.votes_to_end.is_empty() {
            return String::new();
        }
        let voted: Vec<String> = self.votes_to_end.iter().map(|id| roster.name_of(*id)).collect();
        let missing: Vec<String> = self
            .holdouts(roster)
            .into_iter()
            .map(|id| roster.name_of(id))
            .collect();
        format!(
            "Currently voting to end combat: {}\nFor the fight to end, the following characters must also vote to end: {}",
            list_to_string(&voted),
            list_to_string(&missing)
        )
    }

    /// The current phase and its status table.
    #[must_use]
    pub fn status(&self, roster: &dyn Roster) -> String {
        format!("{}\n{}", self.state.label(), self.phase_status(roster))
    }

    /// A combatant's fighting statistics.
    ///
    /// # Errors
    ///
    /// Fails for non-combatants.
    pub fn combat_stats(&self, roster: &dyn Roster, id: CharacterId) -> Result<String, CombatError> {
        self.require_combatant(roster, id)?;
        let state = self.state_of(id)?;
        let character = roster.require(id)?;
        let weapon = character.weapon();
        let defenses: Vec<&str> = [
            (DefenseFlags::PARRY, "parry"),
            (DefenseFlags::BLOCK, "block"),
            (DefenseFlags::DODGE, "dodge"),
            (DefenseFlags::RIPOSTE, "riposte"),
        ]
        .into_iter()
        .filter(|(flag, _)| character.defense_flags().contains(*flag))
        .map(|(_, name)| name)
        .collect();
        let modifiers: Vec<String> = ModifierKind::ALL
            .iter()
            .map(|kind| format!("{}: {}", kind.as_str(), state.modifiers.get(*kind)))
            .collect();
        let damage = character.health.total();
        let lines = [
            format!("Stats for {}.", character.display_name()),
            format!(
                "Damage: {damage} of {} ({} damage), Fatigue: {:.0} (penalty {})",
                character.max_hp(),
                character.wound_descriptor(damage),
                state.fatigue.accrued,
                state.fatigue_penalty(character)
            ),
            format!(
                "Stance: {}, Wound penalty: {}, Soak: {}",
                character.stance,
                character.wound_penalty(),
                character.soak()
            ),
            format!(
                "Weapon: {} ({} + {}, damage {})",
                weapon.name, weapon.attack_stat, weapon.attack_skill, weapon.damage
            ),
            format!(
                "Defenses: {}",
                if defenses.is_empty() {
                    "none".to_string()
                } else {
                    defenses.join(", ")
                }
            ),
            format!("Modifiers: {}", modifiers.join(", ")),
            format!(
                "Attacks this round: {} of {}",
                state.remaining_attacks, state.num_attacks
            ),
        ];
        Ok(lines.join("\n"))
    }

    /// Numbered table of the published special actions and the running
    /// total rolled against each.
    #[must_use]
    pub fn special_actions_text(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .specials
            .iter()
            .map(|(number, action)| {
                vec![
                    number.to_string(),
                    action.name.clone(),
                    action.stat.map_or_else(|| "None".to_string(), |s| s.to_string()),
                    action.skill.map_or_else(|| "None".to_string(), |s| s.to_string()),
                    action.difficulty.to_string(),
                    action.total().to_string(),
                ]
            })
            .collect();
        format!(
            "Current Actions:\n{}",
            render_table(&["#", "Name", "Stat", "Skill", "Difficulty", "Total"], &rows)
        )
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::tests::duel;

    #[test]
    fn tables_pad_columns() {
        let table = render_table(
            &["Name", "Roll"],
            &[vec!["Aldric".to_string(), "12".to_string()]],
        );
        assert_eq!(table, "Name   | Roll\n-------+-----\nAldric | 12");
    }

    #[test]
    fn setup_status_lists_everyone() {
        let (stage, _, _) = duel(110);
        let status = stage.fight.status(&stage.roster);
        assert!(status.starts_with("Setup Phase\nCombatant"));
        assert!(status.contains("Aldric"));
        assert!(status.contains("Brenna"));
        assert!(status.ends_with("Current Round: 0"));
        assert!(!status.contains("Turn order"));
    }

    #[test]
    fn resolution_status_shows_turn_order() {
        let (mut stage, a, b) = duel(111);
        stage.fight.ready(&mut stage.roster, a).unwrap();
        stage.fight.ready(&mut stage.roster, b).unwrap();
        let active = stage.fight.active().unwrap();
        let status = stage.fight.status(&stage.roster);
        let expected = format!("It is {}'s turn.", stage.roster.name_of(active));
        assert!(status.contains(&expected));
        assert!(status.contains("Turn order for remaining characters:"));
        assert!(status.ends_with("Current Round: 1"));
    }

    #[test]
    fn vote_string_names_holdouts() {
        let (mut stage, a, _) = duel(112);
        assert!(stage.fight.vote_string(&stage.roster).is_empty());
        stage.fight.vote_to_end(&mut stage.roster, a).unwrap();
        let votes = stage.fight.vote_string(&stage.roster);
        assert!(votes.starts_with("Currently voting to end combat: Aldric"));
        assert!(votes.ends_with("must also vote to end: Brenna"));
    }

    #[test]
    fn stats_describe_the_combatant() {
        let (stage, a, _) = duel(113);
        let stats = stage.fight.combat_stats(&stage.roster, a).unwrap();
        assert!(stats.starts_with("Stats for Aldric."));
        assert!(stats.contains("Damage: 0 of 40 (no damage)"));
        assert!(stats.contains("Weapon: fists (dexterity + brawl, damage 0)"));
        assert!(stats.contains("Defenses: parry, dodge, riposte"));
        assert!(stage
            .fight
            .combat_stats(&stage.roster, CharacterId::new(9_999))
            .is_err());
    }

    #[test]
    fn special_listing_is_numbered() {
        let (mut stage, _, _) = duel(114);
        let gm = CharacterId::new(99);
        stage.fight.add_special(
            gm,
            crate::special_action::SpecialAction::new("bar the door", None, None, 15),
        );
        let listing = stage.fight.special_actions_text();
        assert!(listing.starts_with("Current Actions:\n#"));
        assert!(listing.contains("1 | bar the door | None"));
        assert!(listing.contains("| 15 "));
        assert!(listing.ends_with("| 0"));
    }

    #[test]
    fn special_listing_shows_running_totals() {
        let (mut stage, a, b) = duel(115);
        let gm = CharacterId::new(99);
        let mut action = crate::special_action::SpecialAction::new("bar the door", None, None, 15);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        action.make_checks([(stage.character(a), 0), (stage.character(b), 0)], 1, &mut rng);
        let total = action.total();
        stage.fight.add_special(gm, action);
        let listing = stage.fight.special_actions_text();
        assert!(listing.ends_with(&format!("| {total}")));
    }
}
