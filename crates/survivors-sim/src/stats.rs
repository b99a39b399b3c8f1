//! Stat modifier aggregation.
//!
//! A character's effective stats live in [`CharacterStatModificationState`].
//! The state is never edited in place: whenever [`RecalculateStatsFlag`] is
//! enabled on a character, it is rebuilt from the identity template by
//! folding every live modifier source referenced from the character's
//! [`ActiveStatModifierEntity`] buffer, then clamped per stat.
//!
//! Modifier sources are ordinary entities carrying a `Buffer<StatModifier>`.
//! They are referenced, not owned, so a source can be despawned at any time;
//! dead references are pruned on the next recalculation.

use serde::{Deserialize, Serialize};
use survivors_ecs::prelude::*;

use crate::components::Health;
use crate::resources::Resources;
use crate::systems;

// ---------------------------------------------------------------------------
// StatKind / StatModifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatKind {
    /// Flat bonus on top of base hit points.
    MaxHitPoints,
    /// Flat reduction applied once to a frame's damage total.
    DamageReduction,
    MoveSpeed,
    /// Multiplier on weapon cooldowns.
    Cooldown,
    /// Extra attacks per weapon group.
    AttackCount,
    Damage,
    Area,
    Duration,
    ProjectileSpeed,
    PickupRadius,
    ExperienceGain,
    /// Hit points regenerated per second.
    Recovery,
}

impl StatKind {
    pub const ALL: [StatKind; 12] = [
        StatKind::MaxHitPoints,
        StatKind::DamageReduction,
        StatKind::MoveSpeed,
        StatKind::Cooldown,
        StatKind::AttackCount,
        StatKind::Damage,
        StatKind::Area,
        StatKind::Duration,
        StatKind::ProjectileSpeed,
        StatKind::PickupRadius,
        StatKind::ExperienceGain,
        StatKind::Recovery,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Value of this stat with no modifiers applied.
    pub fn identity(self) -> f32 {
        match self {
            StatKind::MaxHitPoints
            | StatKind::DamageReduction
            | StatKind::AttackCount
            | StatKind::Recovery => 0.0,
            StatKind::MoveSpeed
            | StatKind::Cooldown
            | StatKind::Damage
            | StatKind::Area
            | StatKind::Duration
            | StatKind::ProjectileSpeed
            | StatKind::PickupRadius
            | StatKind::ExperienceGain => 1.0,
        }
    }

    /// Inclusive clamp applied after folding.
    pub fn bounds(self) -> (f32, f32) {
        STAT_BOUNDS[self.slot()]
    }
}

/// Per-stat `(min, max)` clamp, indexed in [`StatKind::ALL`] order.
pub const STAT_BOUNDS: [(f32, f32); 12] = [
    (0.0, 10_000.0), // MaxHitPoints
    (0.0, 50.0),     // DamageReduction
    (0.1, 5.0),      // MoveSpeed
    (0.1, 1.0),      // Cooldown
    (0.0, 10.0),     // AttackCount
    (0.1, 10.0),     // Damage
    (0.1, 10.0),     // Area
    (0.1, 10.0),     // Duration
    (0.1, 10.0),     // ProjectileSpeed
    (0.1, 10.0),     // PickupRadius
    (0.0, 10.0),     // ExperienceGain
    (0.0, 100.0),    // Recovery
];

/// One typed delta in a modifier source's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatModifier {
    pub kind: StatKind,
    pub value: f32,
}

impl StatModifier {
    pub fn new(kind: StatKind, value: f32) -> Self {
        Self { kind, value }
    }
}

/// Reference from a character to one of its modifier sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStatModifierEntity(pub EntityId);

/// Aggregated stats for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterStatModificationState {
    values: [f32; 12],
}

impl Default for CharacterStatModificationState {
    fn default() -> Self {
        Self::template()
    }
}

impl CharacterStatModificationState {
    /// Every stat at its identity value.
    pub fn template() -> Self {
        let mut values = [0.0; 12];
        for kind in StatKind::ALL {
            values[kind.slot()] = kind.identity();
        }
        Self { values }
    }

    pub fn get(&self, kind: StatKind) -> f32 {
        self.values[kind.slot()]
    }

    /// Fold modifiers into a fresh template and clamp. Addition commutes, so
    /// the result does not depend on modifier order.
    pub fn aggregate<'a>(modifiers: impl IntoIterator<Item = &'a StatModifier>) -> Self {
        let mut state = Self::template();
        for m in modifiers {
            state.values[m.kind.slot()] += m.value;
        }
        for kind in StatKind::ALL {
            let (lo, hi) = kind.bounds();
            let v = &mut state.values[kind.slot()];
            *v = v.clamp(lo, hi);
        }
        state
    }

    pub fn additional_hit_points(&self) -> i32 {
        self.get(StatKind::MaxHitPoints).round() as i32
    }

    pub fn damage_reduction(&self) -> i32 {
        self.get(StatKind::DamageReduction).round() as i32
    }

    pub fn bonus_attacks(&self) -> i32 {
        self.get(StatKind::AttackCount).floor() as i32
    }
}

// ---------------------------------------------------------------------------
// Flags and linking components
// ---------------------------------------------------------------------------

/// Enable to request a rebuild of the character's stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecalculateStatsFlag;

/// Character a modifier source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierSourceOwner(pub EntityId);

/// Enabled on a freshly spawned modifier source until it has been linked into
/// its owner's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingModifierLink;

survivors_ecs::component!(
    CharacterStatModificationState => "character_stat_modification_state",
    RecalculateStatsFlag => "recalculate_stats_flag",
    ModifierSourceOwner => "modifier_source_owner",
    PendingModifierLink => "pending_modifier_link",
);
survivors_ecs::buffer_element!(
    StatModifier => "stat_modifiers",
    ActiveStatModifierEntity => "active_stat_modifier_entities",
);

/// Bundle for a new modifier source owned by `owner`.
pub fn modifier_source_bundle(owner: EntityId, modifiers: Vec<StatModifier>) -> ComponentBundle {
    ComponentBundle::new()
        .with(Buffer::from(modifiers))
        .with(ModifierSourceOwner(owner))
        .with(PendingModifierLink)
}

/// Current stats of `character`, or the template if it has none.
pub fn stats_of(world: &World, character: EntityId) -> CharacterStatModificationState {
    world
        .get_cloned::<CharacterStatModificationState>(character)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Recalculation
// ---------------------------------------------------------------------------

/// Rebuild one character's stats. Dead source references are swap-removed
/// while walking the buffer back to front.
pub fn recalculate_stats(world: &World, character: EntityId) -> Option<CharacterStatModificationState> {
    let mut links = world.write::<Buffer<ActiveStatModifierEntity>>();
    let links = links.get_mut(character)?;
    let sources = world.read::<Buffer<StatModifier>>();

    let mut folded: Vec<StatModifier> = Vec::new();
    for i in (0..links.len()).rev() {
        let source = links[i].0;
        match sources.get(source) {
            Some(modifiers) if world.is_alive(source) => folded.extend(modifiers.iter().copied()),
            _ => {
                tracing::debug!(character = ?character, source = ?source, "pruning dead modifier source");
                links.swap_remove(i);
            }
        }
    }
    Some(CharacterStatModificationState::aggregate(&folded))
}

/// Recalculate every flagged character, clamp its health against the fresh
/// maximum and clear the flag.
pub fn recalculate_flagged_stats(world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {
    let flagged = Query::new()
        .with::<RecalculateStatsFlag>()
        .with_present::<CharacterStatModificationState>()
        .collect(world);
    for character in flagged {
        if let Some(state) = recalculate_stats(world, character) {
            if let Some(health) = world.write::<Health>().get_mut(character) {
                let max = health.base + state.additional_hit_points();
                health.current = health.current.min(max);
            }
            if let Some(slot) = world.write::<CharacterStatModificationState>().get_mut(character) {
                *slot = state;
            }
        }
        world.set_enabled::<RecalculateStatsFlag>(character, false);
    }
}

/// Link freshly spawned modifier sources into their owners' buffers.
///
/// A source whose owner is gone is despawned.
pub fn link_modifier_sources(world: &World, _res: &mut Resources, cmds: &mut CommandBuffer) {
    let pending = Query::new()
        .with::<PendingModifierLink>()
        .with_present::<ModifierSourceOwner>()
        .collect(world);
    if pending.is_empty() {
        return;
    }
    let owners = world.read::<ModifierSourceOwner>();
    let mut links = world.write::<Buffer<ActiveStatModifierEntity>>();
    for source in pending {
        let Some(owner) = owners.get(source).map(|o| o.0) else {
            continue;
        };
        match links.get_mut(owner) {
            Some(buffer) if world.is_alive(owner) => {
                buffer.push(ActiveStatModifierEntity(source));
                world.set_enabled::<RecalculateStatsFlag>(owner, true);
                world.set_enabled::<PendingModifierLink>(source, false);
            }
            _ => {
                tracing::warn!(source = ?source, owner = ?owner, "modifier source owner missing; despawning source");
                cmds.despawn(source, systems::LINK_MODIFIERS, CausalReason::rule("orphaned_modifier_source"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        let mut world = World::new();
        crate::components::register_all(&mut world);
        world
    }

    fn character(world: &mut World, base_hp: i32) -> EntityId {
        world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(Health {
                        current: base_hp,
                        base: base_hp,
                    })
                    .with(CharacterStatModificationState::template())
                    .with(Buffer::<ActiveStatModifierEntity>::new())
                    .with_disabled(RecalculateStatsFlag),
            )
            .unwrap()
    }

    fn source(world: &mut World, owner: EntityId, mods: Vec<StatModifier>) -> EntityId {
        let src = world.spawn_bundle(modifier_source_bundle(owner, mods)).unwrap();
        world.append(owner, ActiveStatModifierEntity(src));
        world.set_enabled::<PendingModifierLink>(src, false);
        src
    }

    #[test]
    fn template_has_identity_values() {
        let t = CharacterStatModificationState::template();
        assert_eq!(t.get(StatKind::Cooldown), 1.0);
        assert_eq!(t.get(StatKind::MaxHitPoints), 0.0);
    }

    #[test]
    fn additive_fold_then_clamp() {
        let mods = [
            StatModifier::new(StatKind::Cooldown, -0.5),
            StatModifier::new(StatKind::Cooldown, -0.6),
            StatModifier::new(StatKind::Damage, 0.25),
            StatModifier::new(StatKind::Damage, 0.25),
        ];
        let state = CharacterStatModificationState::aggregate(&mods);
        assert_eq!(state.get(StatKind::Cooldown), 0.1);
        assert_eq!(state.get(StatKind::Damage), 1.5);
    }

    #[test]
    fn dead_sources_are_pruned() {
        let mut world = world();
        let hero = character(&mut world, 100);
        let keep = source(&mut world, hero, vec![StatModifier::new(StatKind::MaxHitPoints, 20.0)]);
        let gone = source(&mut world, hero, vec![StatModifier::new(StatKind::MaxHitPoints, 30.0)]);
        world.despawn(gone).unwrap();

        let state = recalculate_stats(&world, hero).unwrap();
        assert_eq!(state.additional_hit_points(), 20);
        let links = world.get_cloned::<Buffer<ActiveStatModifierEntity>>(hero).unwrap();
        assert_eq!(links.as_slice(), &[ActiveStatModifierEntity(keep)]);
    }

    #[test]
    fn recalculation_is_idempotent() {
        let mut world = world();
        let hero = character(&mut world, 100);
        source(&mut world, hero, vec![StatModifier::new(StatKind::MoveSpeed, 0.1)]);
        source(&mut world, hero, vec![StatModifier::new(StatKind::Area, 0.4)]);
        let a = recalculate_stats(&world, hero).unwrap();
        let b = recalculate_stats(&world, hero).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn health_clamped_against_fresh_max() {
        let mut world = world();
        let hero = character(&mut world, 100);
        let bonus = source(&mut world, hero, vec![StatModifier::new(StatKind::MaxHitPoints, 50.0)]);
        world.get_mut::<Health>(hero).unwrap().current = 150;
        world.despawn(bonus).unwrap();
        world.set_enabled::<RecalculateStatsFlag>(hero, true);

        let mut res = Resources::for_tests();
        let mut cmds = CommandBuffer::new();
        recalculate_flagged_stats(&world, &mut res, &mut cmds);

        assert_eq!(world.get_cloned::<Health>(hero).unwrap().current, 100);
        assert!(!world.is_enabled::<RecalculateStatsFlag>(hero));
    }

    #[test]
    fn linking_appends_and_flags_owner() {
        let mut world = world();
        let hero = character(&mut world, 10);
        let src = world
            .spawn_bundle(modifier_source_bundle(hero, vec![StatModifier::new(StatKind::Recovery, 1.0)]))
            .unwrap();
        let mut res = Resources::for_tests();
        let mut cmds = CommandBuffer::new();
        link_modifier_sources(&world, &mut res, &mut cmds);

        assert!(world.is_enabled::<RecalculateStatsFlag>(hero));
        assert!(!world.is_enabled::<PendingModifierLink>(src));
        assert!(cmds.is_empty());
    }
}
