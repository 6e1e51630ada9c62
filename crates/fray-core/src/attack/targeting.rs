//! Who a strike actually lands on.
//!
//! Guards intercept attacks aimed at the people they protect, and mobs
//! with several members spread their extra attacks around.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::character::{CharacterId, Mob};
use crate::participant::ParticipantState;
use crate::roster::Roster;

/// Picks one defender, weighted. Weights below one count as one so every
/// listed defender can be chosen.
///
/// Returns `None` only for an empty list.
pub fn redirect_to_defender<R: Rng + ?Sized>(
    defenders: &[(CharacterId, u32)],
    rng: &mut R,
) -> Option<CharacterId> {
    let total: u64 = defenders.iter().map(|(_, w)| u64::from((*w).max(1))).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.gen_range(0..total);
    for (id, weight) in defenders {
        let weight = u64::from((*weight).max(1));
        if roll < weight {
            return Some(*id);
        }
        roll -= weight;
    }
    defenders.last().map(|(id, _)| *id)
}

/// Defenders of `target` who are in the fight and able to intercept.
#[must_use]
pub fn active_defenders(
    target: CharacterId,
    roster: &dyn Roster,
    participants: &BTreeMap<CharacterId, ParticipantState>,
) -> Vec<CharacterId> {
    participants
        .get(&target)
        .map(|state| {
            state
                .defenders
                .iter()
                .copied()
                .filter(|id| participants.contains_key(id))
                .filter(|id| roster.get(*id).is_some_and(|c| c.is_conscious()))
                .collect()
        })
        .unwrap_or_default()
}

/// Chooses which of the target's defenders takes a strike, weighting mobs
/// by their size.
pub fn pick_defender<R: Rng + ?Sized>(
    target: CharacterId,
    roster: &dyn Roster,
    participants: &BTreeMap<CharacterId, ParticipantState>,
    rng: &mut R,
) -> Option<CharacterId> {
    let weighted: Vec<(CharacterId, u32)> = active_defenders(target, roster, participants)
        .into_iter()
        .map(|id| {
            let weight = roster
                .get(id)
                .and_then(|c| c.mob.as_ref())
                .map_or(1, Mob::active);
            (id, weight)
        })
        .collect();
    redirect_to_defender(&weighted, rng)
}

/// Chooses the target of an automated extra attack.
///
/// With `switch_chance` percent the attacker picks another of its targets,
/// avoiding the previous one unless that was a mob. A defender of the
/// chosen target may then step in.
pub fn npc_target_choice<R: Rng + ?Sized>(
    target: CharacterId,
    targets: &[CharacterId],
    prev_target: Option<CharacterId>,
    switch_chance: u32,
    roster: &dyn Roster,
    participants: &BTreeMap<CharacterId, ParticipantState>,
    rng: &mut R,
) -> CharacterId {
    let prev_is_mob = prev_target
        .and_then(|id| roster.get(id))
        .is_some_and(|c| c.mob.is_some());
    let pool: Vec<CharacterId> = if targets.len() > 1 && !prev_is_mob {
        targets
            .iter()
            .copied()
            .filter(|id| Some(*id) != prev_target)
            .collect()
    } else {
        targets.to_vec()
    };

    let mut choice = target;
    if rng.gen_range(1..=100) <= switch_chance {
        if let Some(picked) = pool.choose(rng) {
            choice = *picked;
        }
    }
    let defenders = active_defenders(choice, roster, participants);
    defenders.choose(rng).copied().unwrap_or(choice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{brute, Scene};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn guarded_scene() -> (Scene, CharacterId, CharacterId) {
        let mut scene = Scene::new(11);
        let ward = scene.join(brute("Ward"));
        let guard = scene.join(brute("Guard"));
        scene.state_mut(ward).defenders.push(guard);
        (scene, ward, guard)
    }

    #[test]
    fn only_conscious_participants_defend() {
        let (mut scene, ward, guard) = guarded_scene();
        assert_eq!(active_defenders(ward, &scene.roster, &scene.participants), vec![guard]);
        scene.character_mut(guard).health.vitality = crate::character::Vitality::Incapacitated;
        assert!(active_defenders(ward, &scene.roster, &scene.participants).is_empty());
    }

    #[test]
    fn defenders_outside_the_fight_are_ignored() {
        let (mut scene, ward, guard) = guarded_scene();
        scene.participants.remove(&guard);
        let picked = pick_defender(ward, &scene.roster, &scene.participants, &mut scene.rng);
        assert_eq!(picked, None);
    }

    #[test]
    fn guarded_targets_redirect_extra_attacks() {
        let (mut scene, ward, guard) = guarded_scene();
        let choice = npc_target_choice(
            ward,
            &[ward],
            None,
            0,
            &scene.roster,
            &scene.participants,
            &mut scene.rng,
        );
        assert_eq!(choice, guard);
    }

    #[test]
    fn switching_avoids_previous_target() {
        let mut scene = Scene::new(12);
        let a = scene.join(brute("A"));
        let b = scene.join(brute("B"));
        for _ in 0..50 {
            let choice = npc_target_choice(
                a,
                &[a, b],
                Some(a),
                100,
                &scene.roster,
                &scene.participants,
                &mut scene.rng,
            );
            assert_eq!(choice, b);
        }
    }

    proptest! {
        #[test]
        fn redirect_always_lands_on_a_listed_defender(
            weights in prop::collection::vec(0u32..5, 1..8),
            seed: u64,
        ) {
            let defenders: Vec<(CharacterId, u32)> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| (CharacterId::new(i as u64 + 1), *w))
                .collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let picked = redirect_to_defender(&defenders, &mut rng);
            prop_assert!(picked.is_some_and(|id| defenders.iter().any(|(d, _)| *d == id)));
        }
    }
}
