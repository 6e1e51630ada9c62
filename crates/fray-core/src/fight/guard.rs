//! Protecting other characters.
//!
//! A guard is recorded on both characters, so the arrangement survives
//! between fights. Inside a fight the ward's participant state also lists
//! the guard among its defenders, which is what attack redirection reads.

use tracing::debug;

use super::Fight;
use crate::character::CharacterId;
use crate::error::{CombatError, ErrorSeverity};
use crate::output::NoticeKind;
use crate::roster::Roster;

/// Makes `guard` protect `ward`, dropping any previous ward.
///
/// # Errors
///
/// Fails when the guard already protects `ward`, tries to protect
/// themselves, or either character is missing.
pub fn assign_guard(roster: &mut dyn Roster, guard: CharacterId, ward: CharacterId) -> Result<(), CombatError> {
    if guard == ward {
        return Err(CombatError::CannotProtectSelf);
    }
    let ward_name = roster.require(ward)?.display_name();
    let previous = roster.require(guard)?.guarding;
    if previous == Some(ward) {
        return Err(CombatError::AlreadyGuarding { name: ward_name });
    }
    if let Some(previous) = previous.and_then(|p| roster.get_mut(p)) {
        previous.defenders.retain(|id| *id != guard);
    }
    roster.require_mut(guard)?.guarding = Some(ward);
    let defenders = &mut roster.require_mut(ward)?.defenders;
    if !defenders.contains(&guard) {
        defenders.push(guard);
    }
    Ok(())
}

/// Stops `guard` protecting anyone.
///
/// # Returns
///
/// The character who was protected.
///
/// # Errors
///
/// Returns [`CombatError::NotGuarding`] when the guard protects nobody.
pub fn release_guard(roster: &mut dyn Roster, guard: CharacterId) -> Result<CharacterId, CombatError> {
    let ward = roster.require(guard)?.guarding.ok_or(CombatError::NotGuarding)?;
    roster.require_mut(guard)?.guarding = None;
    if let Some(character) = roster.get_mut(ward) {
        character.defenders.retain(|id| *id != guard);
    }
    Ok(ward)
}

impl Fight {
    /// Makes `guard` protect `ward`. When the ward is fighting here, the
    /// guard joins in to defend them.
    ///
    /// # Errors
    ///
    /// Fails like [`assign_guard`], and when the fight is ending.
    pub fn protect(&mut self, roster: &mut dyn Roster, guard: CharacterId, ward: CharacterId) -> Result<(), CombatError> {
        self.ensure_running()?;
        let previous = roster.require(guard)?.guarding;
        assign_guard(roster, guard, ward)?;
        if let Some(previous) = previous.and_then(|p| self.participants.get_mut(&p)) {
            previous.defenders.retain(|id| *id != guard);
        }
        let ward_name = roster.name_of(ward);
        self.tell(guard, NoticeKind::Status, format!("You are now protecting {ward_name}."));
        if self.participants.contains_key(&ward) {
            self.add_defender(roster, ward, guard)?;
        }
        Ok(())
    }

    /// Stops the caller protecting anyone.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::NotGuarding`] when the caller protects nobody.
    pub fn stop_protecting(&mut self, roster: &mut dyn Roster, guard: CharacterId) -> Result<(), CombatError> {
        let ward = release_guard(roster, guard)?;
        if let Some(state) = self.participants.get_mut(&ward) {
            state.defenders.retain(|id| *id != guard);
        }
        if let Some(state) = self.participants.get_mut(&guard) {
            state.guarding = None;
        }
        let ward_name = roster.name_of(ward);
        self.tell(guard, NoticeKind::Status, format!("You stop protecting {ward_name}."));
        Ok(())
    }

    /// Puts `guard` among the defenders of `ward`, bringing the guard into
    /// the fight if needed. Passive, unconscious and absent guards stay out.
    pub(super) fn add_defender(
        &mut self,
        roster: &mut dyn Roster,
        ward: CharacterId,
        guard: CharacterId,
    ) -> Result<(), CombatError> {
        let Some(character) = roster.get(guard) else {
            return Ok(());
        };
        if character.passive_guard || !character.is_conscious() || character.location != Some(self.location) {
            return Ok(());
        }
        if !self.participants.contains_key(&guard) {
            match self.add_participant(roster, guard, None) {
                Ok(()) => {}
                Err(err) if err.severity() == ErrorSeverity::Command => {
                    debug!(%guard, %ward, error = %err, "guard stayed out of the fight");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
        let defenders = &mut self.state_of_mut(ward)?.defenders;
        if defenders.contains(&guard) {
            return Ok(());
        }
        defenders.push(guard);
        self.state_of_mut(guard)?.guarding = Some(ward);
        for state in self.participants.values_mut() {
            if state.foes.contains(&ward) {
                state.add_foe(guard, &*roster);
            }
        }
        let guard_name = roster.name_of(guard);
        let ward_name = roster.name_of(ward);
        self.broadcast(
            NoticeKind::Narration,
            format!("{guard_name} begins protecting {ward_name}."),
        );
        Ok(())
    }
}
