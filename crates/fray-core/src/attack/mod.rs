//! Resolution of one strike against one or more targets.
//!
//! An [`AttackResolution`] is built for a single action and consumed by
//! [`AttackResolution::execute`]. For every target in its attack list it
//! rolls to-hit against the target's best defense, classifies the margin
//! with the configured [`MarginBands`](crate::config::MarginBands), and on a
//! hit rolls damage and mitigation. Damage is tallied first and applied to
//! every target only after all of them have been resolved, so the story of
//! the attack can be told in one piece.
//!
//! # Ripostes
//!
//! A botched strike against a target whose weapon can riposte earns that
//! target a free counter-strike. The counter is an
//! `AttackResolution<Riposte>`, a separate type that has no botch handling
//! at all, so a riposte can never trigger another riposte.
//!
//! # Side effects
//!
//! Resolution writes health and vitality through the
//! [`Roster`](crate::roster::Roster), updates defense bookkeeping on the
//! participants involved, and queues narration in the fight's
//! [`Outbox`](crate::output::Outbox). Removing participants is left to the
//! caller, which receives the list in the [`AttackReport`].

mod damage;
mod defense;
mod flank;
mod targeting;

use std::collections::BTreeMap;
use std::marker::PhantomData;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub use damage::Injury;
pub use defense::DefenseRoll;
pub use flank::{resolve_flank, FlankReport};
pub use targeting::{active_defenders, npc_target_choice, pick_defender, redirect_to_defender};

use crate::character::{AttackFlags, Character, CharacterId, DefenseFlags};
use crate::config::{CombatConfig, HitTier, MarginBand};
use crate::error::CombatError;
use crate::output::{NoticeKind, Outbox};
use crate::participant::{DefenseKind, ParticipantState};
use crate::roster::Roster;

/// Defense roll of a target that cannot defend itself.
pub const AUTO_HIT: i32 = 9999;

/// Defense roll when no defense applies.
pub const NO_DEFENSE: i32 = -1000;

// =============================================================================
// Context
// =============================================================================

/// Fight-wide switches that shape how damage lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FightRules {
    /// Damage is permanent.
    pub real_damage: bool,
    /// Automated attackers may kill outright.
    pub random_deaths: bool,
    /// Risk level; automated rolls scale by `risk / 4`.
    pub risk: u32,
}

/// Everything a resolution touches, borrowed from the fight for one call.
pub struct ResolutionContext<'a> {
    /// Character storage.
    pub roster: &'a mut dyn Roster,
    /// Participants of the fight.
    pub participants: &'a mut BTreeMap<CharacterId, ParticipantState>,
    /// The fight's generator.
    pub rng: &'a mut ChaCha8Rng,
    /// Tunables.
    pub config: &'a CombatConfig,
    /// Where narration goes.
    pub outbox: &'a mut Outbox,
    /// Everyone who sees fight-wide messages.
    pub audience: &'a [CharacterId],
    /// Damage rules.
    pub rules: FightRules,
}

impl ResolutionContext<'_> {
    fn broadcast(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.outbox.push(self.audience.to_vec(), kind, text);
    }
}

// =============================================================================
// Strike kinds
// =============================================================================

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Primary {}
    impl Sealed for super::Riposte {}
}

/// Marks whether a resolution is an ordinary strike or a counter-strike.
pub trait StrikeKind: sealed::Sealed {
    /// Counter-strikes tell their mitigation to the victim directly.
    const IS_RIPOSTE: bool;
}

/// An ordinary strike. Only these can botch into a riposte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Primary;

/// A free counter-strike after a botch. Never ripostes again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Riposte;

impl StrikeKind for Primary {
    const IS_RIPOSTE: bool = false;
}

impl StrikeKind for Riposte {
    const IS_RIPOSTE: bool = true;
}

/// Who is doing the damage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A combatant attacking with their weapon.
    Participant(CharacterId),
    /// Fixed damage from the surroundings, such as a trap or a GM.
    Environment {
        /// Name used in narration.
        name: String,
        /// Damage before mitigation.
        damage: u32,
        /// GM to send the summary to.
        inflictor: Option<CharacterId>,
    },
}

// =============================================================================
// Report
// =============================================================================

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    /// Who was struck.
    pub target: CharacterId,
    /// Attacker's to-hit; `None` for environmental damage.
    pub attack_roll: Option<i32>,
    /// Target's defense; `None` for environmental damage.
    pub defense_roll: Option<i32>,
    /// Where the margin fell; `None` for environmental damage.
    pub band: Option<MarginBand>,
    /// Public description, e.g. `graze for minor damage`.
    pub outcome: String,
    /// Damage after mitigation.
    pub damage: u32,
}

/// Result of [`AttackResolution::execute`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttackReport {
    /// One entry per strike, in attack order.
    pub outcomes: Vec<TargetOutcome>,
    /// Participants who must leave the fight.
    pub removed: Vec<CharacterId>,
    /// Turns the attacker loses to a botch.
    pub lost_turns: u32,
    /// Consequences of damage, per victim.
    pub injuries: Vec<(CharacterId, Injury)>,
}

// =============================================================================
// Attack Resolution
// =============================================================================

/// One strike, ready to be resolved.
#[derive(Debug, Clone)]
pub struct AttackResolution<K: StrikeKind = Primary> {
    source: Source,
    target: Option<CharacterId>,
    targets: Vec<CharacterId>,
    prev_target: Option<CharacterId>,
    attack_penalty: i32,
    defense_penalty: i32,
    damage_penalty: i32,
    free_attack: bool,
    cleaving: bool,
    switch_chance: u32,
    remaining_attacks: u32,
    can_kill: bool,
    use_mitigation: bool,
    kind: PhantomData<K>,
}

struct Exchange {
    attack_roll: i32,
    defense_roll: i32,
    margin: i32,
    band: MarginBand,
}

#[derive(Default)]
struct Tally {
    dealt: Vec<(CharacterId, u32)>,
    ripostes: Vec<(CharacterId, u32)>,
    attacker_lines: Vec<String>,
    story: Vec<(CharacterId, Vec<String>)>,
    outcomes: Vec<TargetOutcome>,
}

impl Tally {
    fn deal(&mut self, target: CharacterId, damage: u32) {
        if damage == 0 {
            return;
        }
        match self.dealt.iter_mut().find(|(id, _)| *id == target) {
            Some((_, total)) => *total = total.saturating_add(damage),
            None => self.dealt.push((target, damage)),
        }
    }

    fn tell_story(&mut self, target: CharacterId, outcome: String) {
        match self.story.iter_mut().find(|(id, _)| *id == target) {
            Some((_, outcomes)) => outcomes.push(outcome),
            None => self.story.push((target, vec![outcome])),
        }
    }
}

impl<K: StrikeKind> AttackResolution<K> {
    fn with_source(source: Source, target: Option<CharacterId>) -> Self {
        Self {
            source,
            target,
            targets: Vec::new(),
            prev_target: None,
            attack_penalty: 0,
            defense_penalty: 0,
            damage_penalty: 0,
            free_attack: false,
            cleaving: false,
            switch_chance: 0,
            remaining_attacks: 1,
            can_kill: true,
            use_mitigation: true,
            kind: PhantomData,
        }
    }

    /// Adds to-hit and damage difficulty.
    #[must_use]
    pub fn with_penalties(mut self, attack: i32, damage: i32) -> Self {
        self.attack_penalty += attack;
        self.damage_penalty += damage;
        self
    }

    /// Adds defense difficulty for every target.
    #[must_use]
    pub fn with_defense_penalty(mut self, penalty: i32) -> Self {
        self.defense_penalty += penalty;
        self
    }

    /// Prevents the strike from killing.
    #[must_use]
    pub fn without_kill(mut self) -> Self {
        self.can_kill = false;
        self
    }

    /// Who is striking.
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    fn attacker_id(&self) -> Option<CharacterId> {
        match self.source {
            Source::Participant(id) => Some(id),
            Source::Environment { .. } => None,
        }
    }

    /// Pulls targeting data and situational penalties from the attacker's state.
    fn load_attacker(&mut self, attacker: CharacterId, ctx: &ResolutionContext<'_>) -> Result<(), CombatError> {
        let character = ctx.roster.require(attacker)?;
        let state = ctx
            .participants
            .get(&attacker)
            .ok_or(CombatError::MissingParticipant(attacker))?;
        self.targets.clone_from(&state.targets);
        self.prev_target = state.prev_target;
        self.cleaving = state.cleave || character.mob.as_ref().is_some_and(|mob| mob.area_damage);
        self.switch_chance = state.switch_chance;
        self.remaining_attacks = state.remaining_attacks.max(1);
        if !state.covering.is_empty() {
            self.attack_penalty += ctx.config.covering_penalty;
        }
        self.attack_penalty += ctx.config.stances.get(character.stance).attack;
        Ok(())
    }

    /// Defense penalty for one target: the strike's own plus the target's
    /// stance, and a penalty while they cover someone's retreat.
    fn defense_penalty_for(&self, target: CharacterId, ctx: &ResolutionContext<'_>) -> Result<i32, CombatError> {
        let character = ctx.roster.require(target)?;
        let mut penalty = self.defense_penalty + ctx.config.stances.get(character.stance).defense;
        let covering = ctx
            .participants
            .get(&target)
            .is_some_and(|state| !state.covering.is_empty());
        if covering {
            penalty += ctx.config.covering_penalty;
        }
        Ok(penalty)
    }

    /// Rolls to-hit against the target's defense.
    fn exchange(
        &self,
        attacker: CharacterId,
        target: CharacterId,
        ctx: &mut ResolutionContext<'_>,
    ) -> Result<Exchange, CombatError> {
        let defense_penalty = self.defense_penalty_for(target, ctx)?;
        let attacker_char = ctx.roster.require(attacker)?;
        let target_char = ctx.roster.require(target)?;
        let attack_roll = roll_attack(
            attacker_char,
            ctx.participants.get(&attacker),
            self.attack_penalty,
            ctx.rules.risk,
            ctx.rng,
        );
        let weapon = attacker_char.weapon();
        let defense = defense::roll_defense(
            target_char,
            ctx.participants.get_mut(&target),
            &weapon,
            defense_penalty,
            ctx.config,
            ctx.rng,
        );
        let margin = attack_roll - defense.total;
        let band = ctx.config.margins.classify(margin);
        tracing::debug!(
            %attacker,
            %target,
            attack_roll,
            defense_roll = defense.total,
            margin,
            ?band,
            "strike rolled"
        );
        Ok(Exchange {
            attack_roll,
            defense_roll: defense.total,
            margin,
            band,
        })
    }

    /// Rolls damage for a landed strike and takes mitigation off it.
    fn wound(
        &self,
        target: CharacterId,
        margin: i32,
        multiplier: f64,
        ctx: &mut ResolutionContext<'_>,
    ) -> Result<damage::Wound, CombatError> {
        let raw = match &self.source {
            Source::Participant(attacker) => {
                let character = ctx.roster.require(*attacker)?;
                damage::roll_damage(
                    character,
                    ctx.participants.get(attacker),
                    self.damage_penalty,
                    multiplier,
                    ctx.rules.risk,
                    ctx.rng,
                )
            }
            Source::Environment { damage, .. } => i32::try_from(*damage).unwrap_or(i32::MAX),
        };
        let pierce = match self.attacker_id() {
            Some(attacker) => {
                let bonus = ctx.participants.get(&attacker).map_or(0, |s| s.modifiers.armor_pierce);
                ctx.roster.require(attacker)?.armor_pierce() + bonus
            }
            None => 0,
        };
        let target_char = ctx.roster.require(target)?;
        let wound = damage::mitigate(
            raw,
            self.use_mitigation,
            target_char,
            ctx.participants.get(&target),
            margin,
            pierce,
            multiplier,
            ctx.rng,
        );
        tracing::debug!(%target, raw, mitigated = wound.mitigated, damage = wound.damage, "damage rolled");
        if K::IS_RIPOSTE && self.use_mitigation {
            let text = format!("Your armor mitigated {} of the riposte damage.", wound.mitigated);
            ctx.outbox.tell(target, NoticeKind::Roll, text);
        }
        Ok(wound)
    }
}

impl AttackResolution<Primary> {
    /// A combatant attacking a target with their weapon.
    #[must_use]
    pub fn new(attacker: CharacterId, target: CharacterId) -> Self {
        Self::with_source(Source::Participant(attacker), Some(target))
    }

    /// Fixed damage dealt to every target without a to-hit roll.
    #[must_use]
    pub fn environmental(name: impl Into<String>, damage: u32, targets: Vec<CharacterId>) -> Self {
        let mut resolution = Self::with_source(
            Source::Environment {
                name: name.into(),
                damage,
                inflictor: None,
            },
            None,
        );
        resolution.targets = targets;
        resolution
    }

    /// Sends the summary of environmental damage to a GM.
    #[must_use]
    pub fn inflicted_by(mut self, gm: CharacterId) -> Self {
        if let Source::Environment { inflictor, .. } = &mut self.source {
            *inflictor = Some(gm);
        }
        self
    }

    /// Skips armor.
    #[must_use]
    pub fn without_mitigation(mut self) -> Self {
        self.use_mitigation = false;
        self
    }

    /// Only strikes the named target: no cleave, no extra attacks.
    #[must_use]
    pub fn free_attack(mut self) -> Self {
        self.free_attack = true;
        self
    }

    /// Resolves the strike against every target, applies the damage and
    /// narrates the result.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::NoTargets`] when the attack list is empty and
    /// propagates missing-character errors from the roster.
    pub fn execute(mut self, ctx: &mut ResolutionContext<'_>) -> Result<AttackReport, CombatError> {
        let attack_list = match self.attacker_id() {
            Some(attacker) => {
                self.load_attacker(attacker, ctx)?;
                self.attack_list(ctx)
            }
            None => self.targets.clone(),
        };
        if attack_list.is_empty() {
            return Err(CombatError::NoTargets);
        }

        let mut report = AttackReport::default();
        let mut tally = Tally::default();
        for target in attack_list {
            match self.attacker_id() {
                Some(attacker) => self.strike(attacker, target, ctx, &mut tally, &mut report)?,
                None => self.harm(target, ctx, &mut tally)?,
            }
        }
        self.narrate(&tally, ctx);

        for (victim, amount) in &tally.dealt {
            let area = if self.cleaving { *amount } else { 0 };
            let injury = damage::apply_damage(*victim, *amount, self.can_kill, area, ctx)?;
            if injury.removed {
                report.removed.push(*victim);
            }
            report.injuries.push((*victim, injury));
        }
        if let Some(attacker) = self.attacker_id() {
            for (_, amount) in &tally.ripostes {
                let injury = damage::apply_damage(attacker, *amount, true, 0, ctx)?;
                if injury.removed && !report.removed.contains(&attacker) {
                    report.removed.push(attacker);
                }
                report.injuries.push((attacker, injury));
            }
        }
        report.outcomes = tally.outcomes;
        Ok(report)
    }

    fn attack_list(&self, ctx: &mut ResolutionContext<'_>) -> Vec<CharacterId> {
        let Some(target) = self.target else {
            return Vec::new();
        };
        let mut list = if self.cleaving && !self.free_attack && !self.targets.is_empty() {
            self.targets.clone()
        } else {
            vec![target]
        };
        let extra = self.remaining_attacks.saturating_sub(1);
        if !self.free_attack && self.switch_chance > 0 && extra > 0 {
            for _ in 0..extra {
                list.push(npc_target_choice(
                    target,
                    &self.targets,
                    self.prev_target,
                    self.switch_chance,
                    &*ctx.roster,
                    ctx.participants,
                    ctx.rng,
                ));
            }
        }
        list
    }

    fn strike(
        &mut self,
        attacker: CharacterId,
        target: CharacterId,
        ctx: &mut ResolutionContext<'_>,
        tally: &mut Tally,
        report: &mut AttackReport,
    ) -> Result<(), CombatError> {
        let exchange = self.exchange(attacker, target, ctx)?;
        let mut damage_dealt = 0;
        let mut mitigation_text = None;
        let outcome = match exchange.band {
            MarginBand::Botch => match self.riposte_against(attacker, target, ctx)? {
                Some(0) => "parry".to_string(),
                Some(amount) => {
                    tally.ripostes.push((target, amount));
                    let descriptor = ctx.roster.require(attacker)?.wound_descriptor(amount);
                    format!("riposte for {descriptor} damage")
                }
                None => {
                    // Not cumulative: a cleave that botches twice loses one turn.
                    report.lost_turns = 1;
                    "miss".to_string()
                }
            },
            MarginBand::Defended => defended_label(ctx.participants.get(&target)),
            MarginBand::Hit(tier) => {
                let multiplier = ctx.config.margins.multiplier(tier);
                let wound = self.wound(target, exchange.margin, multiplier, ctx)?;
                damage_dealt = wound.damage;
                mitigation_text = wound.message;
                tally.deal(target, wound.damage);
                let descriptor = ctx.roster.require(target)?.wound_descriptor(wound.damage);
                describe_hit(tier, descriptor)
            }
        };

        let target_name = ctx.roster.name_of(target);
        let attacker_name = ctx.roster.name_of(attacker);
        let damage_suffix = if damage_dealt > 0 {
            format!(" ({damage_dealt})")
        } else {
            String::new()
        };
        let summary = format!(
            "{} vs {}: {outcome}{damage_suffix}",
            exchange.attack_roll, exchange.defense_roll
        );
        let mut private = format!("{attacker_name} attacks YOU and rolled {summary}.");
        if let Some(text) = mitigation_text {
            private.push(' ');
            private.push_str(&text);
        }
        ctx.outbox.tell(target, NoticeKind::Roll, private);
        tally.attacker_lines.push(format!("{target_name} {summary}"));
        tally.tell_story(target, outcome.clone());
        tally.outcomes.push(TargetOutcome {
            target,
            attack_roll: Some(exchange.attack_roll),
            defense_roll: Some(exchange.defense_roll),
            band: Some(exchange.band),
            outcome,
            damage: damage_dealt,
        });
        Ok(())
    }

    /// Environmental damage against one target.
    fn harm(&mut self, target: CharacterId, ctx: &mut ResolutionContext<'_>, tally: &mut Tally) -> Result<(), CombatError> {
        let wound = self.wound(target, 0, 1.0, ctx)?;
        tally.deal(target, wound.damage);
        let target_char = ctx.roster.require(target)?;
        let outcome = if wound.damage == 0 {
            "unharmed".to_string()
        } else {
            format!("harmed for {} damage", target_char.wound_descriptor(wound.damage))
        };
        let target_name = target_char.display_name();
        let story = match &self.source {
            Source::Environment { name, damage, .. } => {
                format!("{name}: {damage} inflicted and {target_name} is {outcome}.")
            }
            Source::Participant(_) => format!("{target_name} is {outcome}."),
        };
        ctx.broadcast(NoticeKind::Narration, story);
        if let Some(text) = wound.message {
            ctx.outbox.tell(target, NoticeKind::Roll, text);
        }
        tally.attacker_lines.push(format!("{target_name} is {outcome}"));
        tally.outcomes.push(TargetOutcome {
            target,
            attack_roll: None,
            defense_roll: None,
            band: None,
            outcome,
            damage: wound.damage,
        });
        Ok(())
    }

    /// Resolves the riposte a botch earns, if the target is allowed one.
    /// Returns the riposte damage, or `None` when the botch costs a turn.
    fn riposte_against(
        &self,
        attacker: CharacterId,
        target: CharacterId,
        ctx: &mut ResolutionContext<'_>,
    ) -> Result<Option<u32>, CombatError> {
        let attacker_char = ctx.roster.require(attacker)?;
        let target_char = ctx.roster.require(target)?;
        let can_riposte = attacker_char
            .weapon()
            .attack_flags
            .contains(AttackFlags::CAN_BE_PARRIED)
            && target_char.defense_flags().contains(DefenseFlags::RIPOSTE)
            && target_char.is_conscious()
            && ctx.participants.contains_key(&target);
        if !can_riposte {
            return Ok(None);
        }
        tracing::debug!(riposter = %target, %attacker, "riposte");
        AttackResolution::<Riposte>::counter(target, attacker)
            .resolve(ctx)
            .map(Some)
    }

    /// Sends the attacker their roll summary and everyone the story.
    fn narrate(&self, tally: &Tally, ctx: &mut ResolutionContext<'_>) {
        match &self.source {
            Source::Participant(attacker) => {
                if !tally.attacker_lines.is_empty() {
                    let text = format!("YOU attack {}.", list_to_string(&tally.attacker_lines));
                    ctx.outbox.tell(*attacker, NoticeKind::Roll, text);
                }
                let parts: Vec<String> = tally
                    .story
                    .iter()
                    .map(|(target, outcomes)| {
                        let name = ctx.roster.name_of(*target);
                        let times = if outcomes.len() > 1 {
                            format!(" {} times", outcomes.len())
                        } else {
                            String::new()
                        };
                        format!("{name}{times} ({})", list_to_string(outcomes))
                    })
                    .collect();
                if !parts.is_empty() {
                    let name = ctx.roster.name_of(*attacker);
                    ctx.broadcast(
                        NoticeKind::Narration,
                        format!("{name} attacks {}.", list_to_string(&parts)),
                    );
                }
            }
            Source::Environment {
                damage,
                inflictor: Some(gm),
                ..
            } => {
                let text = format!(
                    "You inflict {damage}. {}.",
                    list_to_string(&tally.attacker_lines)
                );
                ctx.outbox.tell(*gm, NoticeKind::Roll, text);
            }
            Source::Environment { .. } => {}
        }
    }
}

impl AttackResolution<Riposte> {
    fn counter(riposter: CharacterId, botcher: CharacterId) -> Self {
        let mut counter = Self::with_source(Source::Participant(riposter), Some(botcher));
        counter.free_attack = true;
        counter
    }

    /// Rolls the counter-strike and returns its damage without applying it.
    fn resolve(mut self, ctx: &mut ResolutionContext<'_>) -> Result<u32, CombatError> {
        let (Some(riposter), Some(botcher)) = (self.attacker_id(), self.target) else {
            return Ok(0);
        };
        self.load_attacker(riposter, ctx)?;
        let exchange = self.exchange(riposter, botcher, ctx)?;
        match exchange.band {
            MarginBand::Hit(tier) => {
                let multiplier = ctx.config.margins.multiplier(tier);
                Ok(self.wound(botcher, exchange.margin, multiplier, ctx)?.damage)
            }
            MarginBand::Botch | MarginBand::Defended => Ok(0),
        }
    }
}

// =============================================================================
// Shared rolls
// =============================================================================

/// Halves a roll and adds back a random amount up to the other half.
pub(crate) fn spread<R: Rng + ?Sized>(value: i32, rng: &mut R) -> i32 {
    let half = value / 2;
    half + rng.gen_range(0..=half.max(0))
}

/// Scales an automated roll by the fight's risk (4 is neutral).
#[must_use]
pub fn scale_by_risk(value: i32, risk: u32) -> i32 {
    let scaled = i64::from(value) * i64::from(risk) / 4;
    i32::try_from(scaled).unwrap_or(if scaled < 0 { i32::MIN } else { i32::MAX })
}

/// Wound penalty that applies in this fight. Only the member of a mob that
/// took the damage suffers it, so a mob that has already attacked this
/// round fights without it.
#[must_use]
pub fn wound_penalty(character: &Character, state: Option<&ParticipantState>) -> i32 {
    let mob_mid_round = character.mob.is_some()
        && state.is_some_and(|s| s.remaining_attacks != s.num_attacks);
    if mob_mid_round {
        0
    } else {
        character.wound_penalty()
    }
}

/// Total modifier subtracted from the to-hit difficulty.
#[must_use]
pub fn attack_modifier(character: &Character, state: Option<&ParticipantState>) -> i32 {
    state.map_or(0, |s| s.total_attack_modifier(character)) - wound_penalty(character, state) / 2
        + character.boss_attack_bonus()
}

/// Total modifier subtracted from the defense difficulty.
#[must_use]
pub fn defense_modifier(
    character: &Character,
    state: Option<&ParticipantState>,
    config: &CombatConfig,
) -> i32 {
    state.map_or(0, |s| s.total_defense_modifier(character, config))
        - wound_penalty(character, state)
}

fn roll_attack<R: Rng + ?Sized>(
    attacker: &Character,
    state: Option<&ParticipantState>,
    penalty: i32,
    risk: u32,
    rng: &mut R,
) -> i32 {
    let weapon = attacker.weapon();
    let difficulty = 2 + penalty - attack_modifier(attacker, state) + weapon.difficulty_mod;
    let mut roll = attacker
        .check(&[weapon.attack_stat], Some(weapon.attack_skill), difficulty)
        .roll(rng)
        .result();
    if attacker.is_automated() {
        roll = scale_by_risk(roll, risk);
    }
    if roll > 2 {
        roll = spread(roll, rng);
    }
    roll + attacker.modifiers.attack
}

// =============================================================================
// Narration helpers
// =============================================================================

/// Public description of a hit, e.g. `graze for moderate damage`.
#[must_use]
pub fn describe_hit(tier: HitTier, wound_descriptor: &str) -> String {
    format!("{} for {wound_descriptor} damage", tier.label())
}

fn defended_label(state: Option<&ParticipantState>) -> String {
    state
        .and_then(|s| s.last_defense)
        .map_or("miss", DefenseKind::label)
        .to_string()
}

/// Joins items as prose: `a`, `a and b`, `a, b, and c`.
#[must_use]
pub fn list_to_string(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}
