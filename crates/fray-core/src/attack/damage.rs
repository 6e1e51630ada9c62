//! Damage rolls, armor and what damage does to a character.

use rand::Rng;

use super::{scale_by_risk, ResolutionContext};
use crate::character::{Character, CharacterId, Skill, Stat, Vitality};
use crate::error::CombatError;
use crate::output::NoticeKind;
use crate::participant::ParticipantState;

/// Damage from one strike after armor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Wound {
    /// Damage that lands.
    pub damage: u32,
    /// How much armor took off; negative when armor made things worse.
    pub mitigated: i32,
    /// Private note for the victim.
    pub message: Option<String>,
}

/// What damage did to a victim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Injury {
    /// Fell unconscious.
    pub knocked_out: bool,
    /// Died.
    pub killed: bool,
    /// Must leave the fight.
    pub removed: bool,
    /// Mob members lost.
    pub members_lost: u32,
}

/// Rolls a weapon's damage before armor.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn roll_damage<R: Rng + ?Sized>(
    attacker: &Character,
    state: Option<&ParticipantState>,
    penalty: i32,
    multiplier: f64,
    risk: u32,
    rng: &mut R,
) -> i32 {
    let weapon = attacker.weapon();
    let stat = attacker.traits.stat(weapon.damage_stat);
    let keep = (weapon.damage + 1 + stat / 2).max(3);
    let mut damage = attacker
        .check(&[weapon.damage_stat], None, penalty)
        .with_stat_keep()
        .bonus_dice(weapon.damage)
        .keep(keep)
        .roll(rng)
        .result();
    damage += weapon.flat_damage + state.map_or(0, |s| s.modifiers.damage);
    if multiplier > 1.0 {
        damage = (f64::from(damage) * multiplier) as i32;
    }
    if attacker.is_automated() {
        damage = scale_by_risk(damage, risk);
    }
    let damage = damage.max(1);
    let damage = damage / 4 + rng.gen_range(0..=damage * 3 / 4 + 1);
    damage + attacker.modifiers.damage
}

/// Rolls how much the target's armor and toughness absorb.
///
/// A good margin punches through armor: whatever the margin exceeds the
/// armor's resilience (less the attacker's pierce) by comes off the armor.
pub(crate) fn roll_mitigation<R: Rng + ?Sized>(
    target: &Character,
    state: Option<&ParticipantState>,
    margin: i32,
    pierce: i32,
    rng: &mut R,
) -> i32 {
    let soak = i32::try_from(target.soak()).unwrap_or(i32::MAX / 4);
    let mut armor = i32::try_from(target.armor.value).unwrap_or(i32::MAX / 4)
        + state.map_or(0, |s| s.modifiers.mitigation)
        + rng.gen_range(0..=soak * 2 + 1);
    let excess = margin - (target.armor.resilience - pierce);
    if excess > 0 {
        armor -= excess;
    }
    if armor <= 0 {
        0
    } else if armor < 2 {
        rng.gen_range(0..=armor)
    } else {
        armor / 2 + rng.gen_range(0..=armor / 2)
    }
}

/// Takes mitigation off raw damage. Multipliers below one apply after
/// armor so weak hits are not wiped out twice.
#[allow(clippy::too_many_arguments, clippy::cast_possible_truncation)]
pub(crate) fn mitigate<R: Rng + ?Sized>(
    raw: i32,
    use_mitigation: bool,
    target: &Character,
    target_state: Option<&ParticipantState>,
    margin: i32,
    pierce: i32,
    multiplier: f64,
    rng: &mut R,
) -> Wound {
    let mut damage = raw;
    let mut mitigated = 0;
    let mut message = None;
    if use_mitigation {
        let mitigation =
            roll_mitigation(target, target_state, margin, pierce, rng) + target.modifiers.defense;
        let reduced = (damage - mitigation).max(0);
        mitigated = damage - reduced;
        message = Some(format!("Your armor mitigated {mitigated} of the damage."));
        damage = reduced;
    }
    if multiplier < 1.0 {
        damage = (f64::from(damage) * multiplier) as i32;
    }
    Wound {
        damage: u32::try_from(damage).unwrap_or(0),
        mitigated,
        message,
    }
}

fn percent_over(total: i64, base: i64) -> i32 {
    let base = base.max(1);
    i32::try_from((total - base) * 100 / base).unwrap_or(i32::MAX)
}

fn endures<R: Rng + ?Sized>(victim: &Character, difficulty: i32, rng: &mut R) -> bool {
    victim
        .check(&[Stat::Stamina, Stat::Willpower], Some(Skill::Survival), difficulty)
        .with_stat_keep()
        .roll(rng)
        .is_success()
}

/// Applies damage to a victim and settles consciousness and death.
///
/// Once total damage passes maximum health a conscious victim must pass a
/// check to stay up. Player characters in fights without random deaths
/// are never checked for death on the same blow that drops them. Past the
/// death threshold a failed check kills when damage is real and the blow
/// can kill; otherwise the victim is taken out of the fight. Mobs lose
/// members instead: one per blow, or all of them when area damage at
/// least matches their health.
///
/// # Errors
///
/// Fails if the victim is not in the roster.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn apply_damage(
    victim_id: CharacterId,
    amount: u32,
    can_kill: bool,
    area_damage: u32,
    ctx: &mut ResolutionContext<'_>,
) -> Result<Injury, CombatError> {
    let rules = ctx.rules;
    let mut injury = Injury::default();
    let mut messages = Vec::new();

    let victim = ctx.roster.require_mut(victim_id)?;
    victim.health.apply(amount, rules.real_damage);
    let max = victim.max_hp();
    let total = victim.health.total();
    if total <= max {
        return Ok(injury);
    }
    let name = victim.display_name();
    let automated = victim.is_automated();
    let mut grace = false;
    let mut knock = false;
    let mut kill = false;

    if victim.is_conscious() && !victim.sleepless {
        let difficulty = percent_over(i64::from(total), i64::from(max));
        if !victim.glass_jaw && endures(victim, difficulty, ctx.rng) {
            messages.push(format!("{name} remains capable of fighting."));
            grace = true;
        } else {
            knock = true;
        }
        if !automated && !rules.random_deaths {
            grace = true;
        }
    }

    if !grace {
        let threshold = (victim.death_threshold() * f64::from(max)) as i64;
        let mut difficulty = percent_over(i64::from(total), threshold);
        if rules.real_damage && !automated && !victim.glass_jaw {
            difficulty = scale_by_risk(difficulty, rules.risk);
        }
        let difficulty = difficulty.max(0);
        if !victim.glass_jaw && endures(victim, difficulty, ctx.rng) {
            messages.push(format!("{name} remains alive, but close to death."));
        } else if victim.mob.is_none() {
            kill = rules.real_damage && can_kill;
            injury.removed = true;
        } else if rules.real_damage && can_kill {
            kill = true;
        } else {
            knock = true;
        }
    }

    match victim.mob.as_mut() {
        Some(mob) if knock || kill => {
            let count = if area_damage >= max { mob.active() } else { 1 };
            let count = count.min(mob.active());
            mob.lose_members(count, kill);
            injury.members_lost = count;
            let lost = if count == 1 {
                format!("1 {} falls.", mob.singular)
            } else {
                format!("{count} {} fall.", mob.plural)
            };
            messages.push(lost);
            if mob.active() == 0 {
                injury.removed = true;
            }
            victim.health.temp_damage = 0;
            if rules.real_damage {
                victim.health.damage = 0;
            }
        }
        Some(_) => {}
        None if kill => {
            victim.health.vitality = Vitality::Dead;
            messages.push(format!("{name} has been killed."));
        }
        None if knock || injury.removed => {
            if victim.health.vitality == Vitality::Conscious {
                messages.push(format!("{name} is incapacitated."));
            }
            victim.health.vitality = Vitality::Incapacitated;
        }
        None => {}
    }
    injury.knocked_out = knock;
    injury.killed = kill;

    if kill || injury.removed {
        tracing::info!(victim = %victim_id, killed = kill, members_lost = injury.members_lost, "combatant down");
    } else if knock {
        tracing::debug!(victim = %victim_id, "combatant knocked out");
    }
    for message in messages {
        ctx.broadcast(NoticeKind::Narration, message);
    }
    Ok(injury)
}
