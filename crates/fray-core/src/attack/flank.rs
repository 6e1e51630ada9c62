//! Slipping past a target's guards.
//!
//! Each of the target's active defenders gets a chance to spot the flanker,
//! and then the target does. Whoever notices first decides how the strike
//! plays out; if nobody does, the flanker catches the target exposed.

use rand::Rng;

use super::{active_defenders, AttackReport, AttackResolution, ResolutionContext};
use crate::character::{Character, CharacterId, Skill, Stat};
use crate::error::CombatError;
use crate::output::NoticeKind;

/// Penalty applied to whichever side is caught out by a flank.
const FLANK_SWING: i32 = 5;

/// How a flank played out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlankReport {
    /// Who spotted the flanker, if anyone.
    pub noticed_by: Option<CharacterId>,
    /// The strike that followed; `None` when the flanker backed off.
    pub attack: Option<AttackReport>,
}

/// Positive when `observer` spots `sneaker`.
fn notices<R: Rng + ?Sized>(observer: &Character, sneaker: &Character, rng: &mut R) -> bool {
    let perception = observer
        .check(&[Stat::Perception], None, 0)
        .with_stat_keep()
        .roll(rng)
        .result();
    let stealth = sneaker
        .check(&[Stat::Dexterity], Some(Skill::Stealth), 0)
        .roll(rng)
        .result();
    perception - stealth > 0
}

/// Resolves a flank by `flanker` around `target`'s defenders.
///
/// A defender who notices either makes the flanker back off (when
/// `back_off_if_seen`) or takes the strike themselves at a disadvantage to
/// the flanker. A target who notices is attacked at the flanker's
/// disadvantage; an unaware target is attacked at theirs.
///
/// # Errors
///
/// Propagates roster and resolution errors.
pub fn resolve_flank(
    flanker: CharacterId,
    target: CharacterId,
    back_off_if_seen: bool,
    ctx: &mut ResolutionContext<'_>,
) -> Result<FlankReport, CombatError> {
    let flanker_name = ctx.roster.name_of(flanker);
    let target_name = ctx.roster.name_of(target);
    let opening = format!(
        "{flanker_name} attempts to move around {target_name} to attack them while they are vulnerable."
    );

    for guard in active_defenders(target, &*ctx.roster, ctx.participants) {
        let spotted = {
            let sneaker = ctx.roster.require(flanker)?;
            let observer = ctx.roster.require(guard)?;
            notices(observer, sneaker, ctx.rng)
        };
        if !spotted {
            continue;
        }
        let guard_name = ctx.roster.name_of(guard);
        tracing::debug!(%flanker, %target, %guard, back_off_if_seen, "flank spotted");
        if back_off_if_seen {
            ctx.broadcast(
                NoticeKind::Narration,
                format!("{opening} {guard_name} sees them, and they back off."),
            );
            return Ok(FlankReport {
                noticed_by: Some(guard),
                attack: None,
            });
        }
        ctx.broadcast(
            NoticeKind::Narration,
            format!("{opening} {guard_name} stops {flanker_name} but is attacked."),
        );
        let attack = AttackResolution::new(flanker, guard)
            .with_penalties(FLANK_SWING, 0)
            .with_defense_penalty(-FLANK_SWING)
            .free_attack()
            .execute(ctx)?;
        return Ok(FlankReport {
            noticed_by: Some(guard),
            attack: Some(attack),
        });
    }

    let spotted = {
        let sneaker = ctx.roster.require(flanker)?;
        let observer = ctx.roster.require(target)?;
        observer.is_conscious() && notices(observer, sneaker, ctx.rng)
    };
    let (noticed_by, resolution) = if spotted {
        ctx.broadcast(
            NoticeKind::Narration,
            format!("{opening} {target_name} moves in time to not be vulnerable."),
        );
        let resolution = AttackResolution::new(flanker, target)
            .with_penalties(FLANK_SWING, 0)
            .with_defense_penalty(-FLANK_SWING);
        (Some(target), resolution)
    } else {
        ctx.outbox
            .tell(flanker, NoticeKind::Narration, format!("{opening} They succeed."));
        let resolution = AttackResolution::new(flanker, target)
            .with_penalties(-FLANK_SWING, 0)
            .with_defense_penalty(FLANK_SWING);
        (None, resolution)
    };
    let attack = resolution.free_attack().execute(ctx)?;
    Ok(FlankReport {
        noticed_by,
        attack: Some(attack),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{brute, Scene};

    #[test]
    fn unguarded_flank_strikes_the_target() {
        let mut scene = Scene::new(21);
        let flanker = scene.join(brute("Sly"));
        let target = scene.join(brute("Mark"));
        let report = resolve_flank(flanker, target, false, &mut scene.ctx()).unwrap();
        let attack = report.attack.unwrap();
        assert_eq!(attack.outcomes.len(), 1);
        assert_eq!(attack.outcomes[0].target, target);
    }

    #[test]
    fn cautious_flanker_backs_off_when_seen() {
        let mut scene = Scene::new(22);
        let flanker = scene.join(brute("Clumsy"));
        let target = scene.join(brute("Mark"));
        let mut watchful = brute("Hawk");
        watchful.traits.set_stat(Stat::Perception, 40);
        let guard = scene.join(watchful);
        scene.state_mut(target).defenders.push(guard);
        let report = resolve_flank(flanker, target, true, &mut scene.ctx()).unwrap();
        assert_eq!(report.noticed_by, Some(guard));
        assert!(report.attack.is_none());
        assert!(scene
            .outbox
            .pending()
            .iter()
            .any(|n| n.text().ends_with("sees them, and they back off.")));
    }

    #[test]
    fn spotted_flanker_fights_the_guard() {
        let mut scene = Scene::new(23);
        let flanker = scene.join(brute("Clumsy"));
        let target = scene.join(brute("Mark"));
        let mut watchful = brute("Hawk");
        watchful.traits.set_stat(Stat::Perception, 40);
        let guard = scene.join(watchful);
        scene.state_mut(target).defenders.push(guard);
        let report = resolve_flank(flanker, target, false, &mut scene.ctx()).unwrap();
        let attack = report.attack.unwrap();
        assert_eq!(attack.outcomes[0].target, guard);
    }
}
