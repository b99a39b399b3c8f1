//! Damage and health pipeline.
//!
//! Producers never touch [`Health`] directly. They append signed entries to
//! the target's `Buffer<DamageThisFrame>` (positive damage, negative
//! healing) and [`resolve_damage`] folds the whole frame at once:
//!
//! 1. `damage` is the sum of positive entries, or 0 while `Invincible` is
//!    enabled; `heal` is the sum of the magnitudes of negative entries.
//! 2. Flat damage reduction is subtracted once from the frame total, never
//!    per entry. Healing is not reduced.
//! 3. `hp = clamp(hp - damage + heal, 0, base + additional)`.
//!
//! Because only the sums matter, the outcome does not depend on entry order.

use survivors_ecs::prelude::*;

use crate::components::{
    ContactDamage, DamageTakenFlag, DamageThisFrame, DestroyEntityFlag, Enemy, Health, Invincibility,
    Invincible, Player, Regeneration,
};
use crate::events::SimEvent;
use crate::interaction::{for_each_unhandled, EntityInteraction};
use crate::resources::Resources;
use crate::stats::{stats_of, StatKind};

/// Queue `amount` against a damage buffer. Negative amounts heal.
pub fn apply_damage(buffer: &mut Vec<DamageThisFrame>, amount: i32) {
    buffer.push(DamageThisFrame(amount));
}

/// Result of folding one frame of damage entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    pub hp: i32,
    /// Damage actually applied, after invincibility and reduction.
    pub damage: i32,
    pub heal: i32,
    pub died: bool,
}

/// Fold `entries` into `current` hit points. `max` is the modified maximum.
pub fn resolve_frame(
    current: i32,
    max: i32,
    reduction: i32,
    entries: &[DamageThisFrame],
    invincible: bool,
) -> FrameOutcome {
    let mut damage: i64 = 0;
    let mut heal: i64 = 0;
    for DamageThisFrame(amount) in entries {
        if *amount > 0 {
            damage += i64::from(*amount);
        } else {
            heal += -i64::from(*amount);
        }
    }
    if invincible {
        damage = 0;
    }
    let damage = (damage - i64::from(reduction.max(0))).max(0);
    let hp = (i64::from(current) - damage + heal).clamp(0, i64::from(max.max(0)));
    let narrow = |v: i64| i32::try_from(v).unwrap_or(i32::MAX);
    FrameOutcome {
        hp: narrow(hp),
        damage: narrow(damage),
        heal: narrow(heal),
        died: hp <= 0,
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Fold every non-empty damage buffer into its owner's health.
pub fn resolve_damage(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let targets = Query::new()
        .with_present::<Health>()
        .with_present::<Buffer<DamageThisFrame>>()
        .collect(world);
    let mut buffers = world.write::<Buffer<DamageThisFrame>>();
    let mut healths = world.write::<Health>();
    let mut windows = world.write::<Invincibility>();

    for entity in targets {
        let Some(buffer) = buffers.get_mut(entity) else {
            continue;
        };
        if buffer.is_empty() {
            continue;
        }
        let Some(health) = healths.get_mut(entity) else {
            continue;
        };
        let stats = stats_of(world, entity);
        let outcome = resolve_frame(
            health.current,
            health.base + stats.additional_hit_points(),
            stats.damage_reduction(),
            buffer,
            world.is_enabled::<Invincible>(entity),
        );
        buffer.clear();
        health.current = outcome.hp;

        if outcome.damage > 0 {
            world.set_enabled::<DamageTakenFlag>(entity, true);
            if let Some(window) = windows.get_mut(entity) {
                window.remaining = window.window;
                world.set_enabled::<Invincible>(entity, true);
            }
            res.events.publish(SimEvent::DamageTaken {
                entity,
                amount: outcome.damage,
                remaining: outcome.hp,
            });
        }
        if outcome.died && !world.is_enabled::<DestroyEntityFlag>(entity) {
            world.set_enabled::<DestroyEntityFlag>(entity, true);
            tracing::trace!(entity = ?entity, "health depleted");
        }
    }
}

/// Reset last frame's damage-taken flags.
pub fn clear_damage_flags(world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {
    for entity in Query::new().with::<DamageTakenFlag>().collect(world) {
        world.set_enabled::<DamageTakenFlag>(entity, false);
    }
}

/// Count invincibility windows down and drop `Invincible` when one ends.
pub fn tick_invincibility(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let dt = res.time.dt;
    let active = Query::new().with::<Invincible>().collect(world);
    let mut windows = world.write::<Invincibility>();
    for entity in active {
        let Some(window) = windows.get_mut(entity) else {
            world.set_enabled::<Invincible>(entity, false);
            continue;
        };
        window.remaining -= dt;
        if window.remaining <= 0.0 {
            window.remaining = 0.0;
            world.set_enabled::<Invincible>(entity, false);
        }
    }
}

/// Enemies touching the player deal their contact damage.
pub fn apply_contact_damage(world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {
    let enemies = Query::new()
        .with::<Enemy>()
        .with_present::<ContactDamage>()
        .with_present::<Buffer<EntityInteraction>>()
        .without::<DestroyEntityFlag>()
        .collect(world);
    let interactions = world.read::<Buffer<EntityInteraction>>();
    let contact = world.read::<ContactDamage>();
    let mut frames = world.write::<Buffer<DamageThisFrame>>();
    for enemy in enemies {
        let (Some(buffer), Some(amount)) = (interactions.get(enemy), contact.get(enemy)) else {
            continue;
        };
        for_each_unhandled(buffer, |target| {
            if !world.has::<Player>(target) {
                return;
            }
            if let Some(frame) = frames.get_mut(target) {
                apply_damage(frame, amount.0);
            }
        });
    }
}

/// Heal characters by their `Recovery` stat, in whole hit points.
pub fn regenerate(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let dt = res.time.dt;
    let characters = Query::new()
        .with_present::<Regeneration>()
        .with_present::<Health>()
        .without::<DestroyEntityFlag>()
        .collect(world);
    let mut carries = world.write::<Regeneration>();
    let healths = world.read::<Health>();
    let mut frames = world.write::<Buffer<DamageThisFrame>>();
    for entity in characters {
        let stats = stats_of(world, entity);
        let rate = stats.get(StatKind::Recovery);
        let (Some(regen), Some(health)) = (carries.get_mut(entity), healths.get(entity)) else {
            continue;
        };
        if rate <= 0.0 || health.current >= health.base + stats.additional_hit_points() {
            regen.carry = 0.0;
            continue;
        }
        regen.carry += rate * dt;
        let whole = regen.carry.floor();
        if whole >= 1.0 {
            regen.carry -= whole;
            if let Some(frame) = frames.get_mut(entity) {
                apply_damage(frame, -(whole as i32));
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
    use crate::components::register_all;
    use crate::stats::{CharacterStatModificationState, StatModifier};

    fn entries(v: &[i32]) -> Vec<DamageThisFrame> {
        v.iter().copied().map(DamageThisFrame).collect()
    }

    #[test]
    fn reduction_applies_once_to_the_frame_total() {
        let out = resolve_frame(100, 100, 5, &entries(&[10, 10, 10]), false);
        assert_eq!(out.damage, 25);
        assert_eq!(out.hp, 75);
    }

    #[test]
    fn healing_is_not_reduced_and_is_capped() {
        let out = resolve_frame(50, 60, 10, &entries(&[-30, 5]), false);
        assert_eq!(out.damage, 0);
        assert_eq!(out.heal, 30);
        assert_eq!(out.hp, 60);
    }

    #[test]
    fn invincibility_ignores_damage_but_not_healing() {
        let out = resolve_frame(40, 100, 0, &entries(&[50, -10]), true);
        assert_eq!(out.damage, 0);
        assert_eq!(out.hp, 50);
        assert!(!out.died);
    }

    #[test]
    fn lethal_frame_clamps_to_zero() {
        let out = resolve_frame(10, 100, 0, &entries(&[7, 7]), false);
        assert_eq!(out.hp, 0);
        assert!(out.died);
    }

    fn target(world: &mut World, hp: i32) -> EntityId {
        world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(Health::full(hp))
                    .with(Buffer::<DamageThisFrame>::new())
                    .with_disabled(DamageTakenFlag)
                    .with_disabled(DestroyEntityFlag)
                    .with_disabled(Invincible)
                    .with(Invincibility {
                        window: 0.5,
                        remaining: 0.0,
                    }),
            )
            .unwrap()
    }

    #[test]
    fn resolve_damage_flags_publishes_and_clears() {
        let mut world = World::new();
        register_all(&mut world);
        let e = target(&mut world, 30);
        world.append(e, DamageThisFrame(12));
        world.append(e, DamageThisFrame(3));

        let mut res = Resources::for_tests();
        resolve_damage(&world, &mut res, &mut CommandBuffer::new());

        assert_eq!(world.get_cloned::<Health>(e).unwrap().current, 15);
        assert!(world.is_enabled::<DamageTakenFlag>(e));
        assert!(world.is_enabled::<Invincible>(e));
        assert!(world.get_cloned::<Buffer<DamageThisFrame>>(e).unwrap().is_empty());
        assert_eq!(
            res.events.events(),
            &[SimEvent::DamageTaken {
                entity: e,
                amount: 15,
                remaining: 15
            }]
        );

        // Invincible now: the next hit is ignored until the window runs out.
        world.append(e, DamageThisFrame(100));
        resolve_damage(&world, &mut res, &mut CommandBuffer::new());
        assert_eq!(world.get_cloned::<Health>(e).unwrap().current, 15);

        for _ in 0..31 {
            tick_invincibility(&world, &mut res, &mut CommandBuffer::new());
        }
        assert!(!world.is_enabled::<Invincible>(e));
    }

    #[test]
    fn death_sets_destroy_flag() {
        let mut world = World::new();
        register_all(&mut world);
        let e = target(&mut world, 5);
        world.append(e, DamageThisFrame(5));
        resolve_damage(&world, &mut Resources::for_tests(), &mut CommandBuffer::new());
        assert!(world.is_enabled::<DestroyEntityFlag>(e));
    }

    #[test]
    fn max_hit_points_modifier_raises_heal_cap() {
        let mut world = World::new();
        register_all(&mut world);
        let e = target(&mut world, 50);
        world
            .insert(
                e,
                CharacterStatModificationState::aggregate(&[StatModifier::new(StatKind::MaxHitPoints, 20.0)]),
            )
            .unwrap();
        world.append(e, DamageThisFrame(-100));
        resolve_damage(&world, &mut Resources::for_tests(), &mut CommandBuffer::new());
        assert_eq!(world.get_cloned::<Health>(e).unwrap().current, 70);
    }

    #[test]
    fn regeneration_heals_whole_points() {
        let mut world = World::new();
        register_all(&mut world);
        let e = target(&mut world, 100);
        world.write::<Health>().get_mut(e).unwrap().current = 50;
        world.insert(e, Regeneration::default()).unwrap();
        world
            .insert(
                e,
                CharacterStatModificationState::aggregate(&[StatModifier::new(StatKind::Recovery, 6.0)]),
            )
            .unwrap();

        let mut res = Resources::for_tests();
        // 6 hp/s at 60 Hz: one point every 10 ticks.
        for _ in 0..10 {
            regenerate(&world, &mut res, &mut CommandBuffer::new());
        }
        resolve_damage(&world, &mut res, &mut CommandBuffer::new());
        let hp = world.get_cloned::<Health>(e).unwrap().current;
        assert!((50..=51).contains(&hp));
        for _ in 0..20 {
            regenerate(&world, &mut res, &mut CommandBuffer::new());
        }
        resolve_damage(&world, &mut res, &mut CommandBuffer::new());
        assert!(world.get_cloned::<Health>(e).unwrap().current >= 52);
    }
}
