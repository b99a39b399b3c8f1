//! Attack instance construction per weapon kind.
//!
//! Level parameters are scaled by the owner's stats: damage by `Damage`,
//! lifetime by `Duration`, speed by `ProjectileSpeed`, radius by `Area`.

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::{
    with_destroy_flags, Attack, AttackDamage, CollisionRadius, FollowOwner, HitLimit,
    InteractionRefresh, Lifetime, LocalTransform, Movement, MovementStart,
};
use crate::config::WeaponLevel;
use crate::interaction::EntityInteraction;
use crate::rng::EntityRng;
use crate::stats::{CharacterStatModificationState, StatKind};

use super::{Aim, WeaponKind};

/// Downward pull applied to thrown axes, along -Z on the play plane.
pub const AXE_GRAVITY: f32 = 18.0;

/// Everything needed to build one attack.
#[derive(Debug)]
pub struct AttackSpawn<'a> {
    pub weapon: EntityId,
    pub owner: EntityId,
    pub kind: WeaponKind,
    pub level: &'a WeaponLevel,
    pub stats: &'a CharacterStatModificationState,
    pub aim: Aim,
    /// Simulation time at spawn.
    pub elapsed: f64,
}

/// Component bundle for one attack instance.
pub fn attack_bundle(spawn: &AttackSpawn<'_>, rng: &mut EntityRng) -> ComponentBundle {
    let level = spawn.level;
    let stats = spawn.stats;
    let damage = (level.damage as f32 * stats.get(StatKind::Damage)).round().max(1.0) as i32;
    let duration = level.duration * stats.get(StatKind::Duration);
    let speed = level.speed * stats.get(StatKind::ProjectileSpeed);
    let radius = level.area * stats.get(StatKind::Area);
    let dir = spawn.aim.direction;

    let movement = match spawn.kind {
        WeaponKind::MagicWand | WeaponKind::Knife => Movement::Linear {
            direction: dir,
            speed,
        },
        WeaponKind::Axe => Movement::Parabolic {
            velocity: dir * speed + Vec3::X * rng.range_f32(-1.0, 1.0),
            gravity: Vec3::new(0.0, 0.0, -AXE_GRAVITY),
        },
        // Out and back within the attack's lifetime.
        WeaponKind::Cross => Movement::Boomerang {
            direction: dir,
            speed,
            deceleration: 2.0 * speed / duration.max(f32::EPSILON),
        },
        WeaponKind::LightningRing | WeaponKind::Garlic => Movement::Stationary,
    };

    let mut bundle = ComponentBundle::new()
        .with(LocalTransform {
            position: spawn.aim.origin,
            heading: dir,
        })
        .with(Attack {
            weapon: spawn.weapon,
            kind: spawn.kind,
        })
        .with(AttackDamage(damage))
        .with(Lifetime {
            remaining: duration,
        })
        .with(CollisionRadius(radius))
        .with(movement)
        .with(MovementStart {
            origin: spawn.aim.origin,
            start_time: spawn.elapsed,
        })
        .with(Buffer::<EntityInteraction>::new());
    if let Some(limit) = level.hit_limit {
        bundle = bundle.with(HitLimit { remaining: limit });
    }
    if spawn.kind == WeaponKind::Garlic {
        bundle = bundle.with(FollowOwner(spawn.owner));
    }
    if let Some(interval) = level.rehit_interval {
        bundle = bundle.with(InteractionRefresh {
            interval,
            timer: interval,
        });
    }
    with_destroy_flags(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level() -> WeaponLevel {
        WeaponLevel {
            damage: 10,
            cooldown: 1.0,
            attack_count: 1,
            attack_interval: 0.1,
            duration: 2.0,
            speed: 10.0,
            area: 0.5,
            hit_limit: Some(1),
            rehit_interval: None,
        }
    }

    fn spawned(kind: WeaponKind, stats: &CharacterStatModificationState, level: &WeaponLevel) -> World {
        let mut world = World::new();
        crate::components::register_all(&mut world);
        let spawn = AttackSpawn {
            weapon: EntityId::new(0, 0),
            owner: EntityId::new(1, 0),
            kind,
            level,
            stats,
            aim: Aim {
                origin: Vec3::ZERO,
                direction: Vec3::X,
            },
            elapsed: 0.0,
        };
        let bundle = attack_bundle(&spawn, &mut EntityRng::from_seed(0));
        world.spawn_bundle(bundle).unwrap();
        world
    }

    #[test]
    fn stats_scale_attack_parameters() {
        let stats = CharacterStatModificationState::aggregate(&[
            crate::stats::StatModifier::new(StatKind::Damage, 0.5),
            crate::stats::StatModifier::new(StatKind::Area, 1.0),
        ]);
        let level = level();
        let world = spawned(WeaponKind::MagicWand, &stats, &level);
        let attack = Query::new().with::<Attack>().single(&world).unwrap();
        assert_eq!(world.get_cloned::<AttackDamage>(attack), Some(AttackDamage(15)));
        assert_eq!(world.get_cloned::<CollisionRadius>(attack), Some(CollisionRadius(1.0)));
        assert_eq!(world.get_cloned::<HitLimit>(attack), Some(HitLimit { remaining: 1 }));
        assert!(!world.is_enabled::<crate::components::DestroyEntityFlag>(attack));
    }

    #[test]
    fn garlic_follows_owner_and_refreshes() {
        let stats = CharacterStatModificationState::template();
        let level = WeaponLevel {
            hit_limit: None,
            rehit_interval: Some(0.5),
            ..level()
        };
        let world = spawned(WeaponKind::Garlic, &stats, &level);
        let aura = Query::new().with::<Attack>().single(&world).unwrap();
        assert!(world.has::<FollowOwner>(aura));
        assert!(world.has::<InteractionRefresh>(aura));
        assert!(!world.has::<HitLimit>(aura));
        assert_eq!(world.get_cloned::<Movement>(aura), Some(Movement::Stationary));
    }

    #[test]
    fn cross_returns_within_lifetime() {
        let stats = CharacterStatModificationState::template();
        let level = level();
        let world = spawned(WeaponKind::Cross, &stats, &level);
        let cross = Query::new().with::<Attack>().single(&world).unwrap();
        let Some(Movement::Boomerang { speed, deceleration, .. }) = world.get_cloned::<Movement>(cross) else {
            panic!("cross should use boomerang movement");
        };
        let turnaround = 2.0 * speed / deceleration;
        assert!((turnaround - level.duration).abs() < 1e-5);
    }
}
