//! Lifetimes, destroy effects and entity destruction.
//!
//! Destruction is requested through enable flags and carried out in one
//! place, [`destroy_flagged`], at the end of the tick:
//!
//! * `DestroyEntityFlag`: normal death. Enemies drop experience (and bosses
//!   may drop a bonus crate), the player triggers game over.
//! * `InstantDestroy`: removal with no drops, used when waves run out.
//!
//! An entity flagged both ways is destroyed once, without drops.

use std::collections::BTreeSet;

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::{
    position_of, Boss, CollisionRadius, DestroyEffectRequest, DestroyEntityFlag, Enemy, ExperienceDrop,
    InstantDestroy, Lifetime, LocalTransform, Pickup, PickupKind, Player,
};
use crate::events::SimEvent;
use crate::interaction::EntityInteraction;
use crate::resources::Resources;
use crate::rng::EntityRng;
use crate::stats::{ModifierSourceOwner, RecalculateStatsFlag};
use crate::systems;

/// Collision radius of dropped pickups.
pub const PICKUP_RADIUS: f32 = 0.3;

/// Component bundle for a pickup lying at `position`.
pub fn pickup_bundle(kind: PickupKind, position: Vec3) -> ComponentBundle {
    ComponentBundle::new()
        .with(LocalTransform::at(position))
        .with(Pickup { kind })
        .with(CollisionRadius(PICKUP_RADIUS))
        .with(Buffer::<EntityInteraction>::new())
}

/// Count lifetimes down and flag expired entities for destruction.
pub fn expire_lifetimes(world: &World, res: &mut Resources, cmds: &mut CommandBuffer) {
    let dt = res.time.dt;
    let mut lifetimes = world.write::<Lifetime>();
    for (entity, lifetime) in lifetimes.iter_mut() {
        if lifetime.remaining <= 0.0 {
            continue;
        }
        lifetime.remaining -= dt;
        if lifetime.remaining > 0.0 {
            continue;
        }
        if !world.set_enabled::<DestroyEntityFlag>(entity, true) {
            cmds.despawn(entity, systems::EXPIRE_LIFETIMES, CausalReason::timer("lifetime"));
        }
    }
}

/// Publish a destroy effect for every pending request and clear it.
pub fn emit_destroy_effects(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    for entity in Query::new().with::<DestroyEffectRequest>().collect(world) {
        let position = position_of(world, entity).unwrap_or(Vec3::ZERO);
        res.events.publish(SimEvent::DestroyEffect { entity, position });
        world.set_enabled::<DestroyEffectRequest>(entity, false);
    }
}

/// Despawn every flagged entity exactly once, with drops for normal deaths.
pub fn destroy_flagged(world: &World, res: &mut Resources, cmds: &mut CommandBuffer) {
    let instant: BTreeSet<EntityId> = Query::new().with::<InstantDestroy>().iter(world).collect();
    let mut doomed: BTreeSet<EntityId> = Query::new().with::<DestroyEntityFlag>().iter(world).collect();
    doomed.extend(instant.iter().copied());

    for entity in doomed {
        if world.has::<Player>(entity) {
            player_died(res, entity);
            continue;
        }
        if !instant.contains(&entity) {
            drop_loot(world, res, cmds, entity);
        }
        if let Some(owner) = world.get::<ModifierSourceOwner>(entity).map(|o| o.0) {
            if world.is_alive(owner) {
                cmds.set_enabled::<RecalculateStatsFlag>(
                    owner,
                    true,
                    systems::DESTROY,
                    CausalReason::rule("modifier_source_removed"),
                );
            }
        }
        cmds.despawn(entity, systems::DESTROY, CausalReason::rule("destroy_flagged"));
    }
}

fn player_died(res: &mut Resources, player: EntityId) {
    if res.game_over {
        return;
    }
    res.game_over = true;
    res.pause_requested = true;
    tracing::info!(player = ?player, tick = res.time.tick, "game over");
    res.events.publish(SimEvent::GameOver { tick: res.time.tick });
}

fn drop_loot(world: &World, res: &mut Resources, cmds: &mut CommandBuffer, entity: EntityId) {
    let Some(kind) = world.get::<Enemy>(entity).map(|e| e.kind.clone()) else {
        return;
    };
    res.events.publish(SimEvent::EnemyKilled {
        entity,
        kind: kind.clone(),
    });
    let position = position_of(world, entity).unwrap_or(Vec3::ZERO);
    let mut rng = world
        .get_cloned::<EntityRng>(entity)
        .unwrap_or_else(|| EntityRng::from_seeder(&mut res.seeder));
    let reason = || CausalReason::rule("enemy_drop");

    if let Some(drop) = world.get_cloned::<ExperienceDrop>(entity) {
        if drop.amount > 0 && rng.chance(drop.chance) {
            cmds.spawn(
                pickup_bundle(PickupKind::Experience(drop.amount), position),
                systems::DESTROY,
                reason(),
            );
        }
    }
    if let Some(boss) = world.get_cloned::<Boss>(entity) {
        if rng.chance(boss.bonus_crate_chance) {
            let offset = rng.unit_direction_xz() * 0.5;
            cmds.spawn(pickup_bundle(PickupKind::BonusCrate, position + offset), systems::DESTROY, reason());
        }
        tracing::debug!(enemy = %kind, "boss defeated");
    }
}
