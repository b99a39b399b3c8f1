//! Built-in overlap detection.
//!
//! Produces the same unordered trigger pairs an external collision layer
//! would push into [`Resources::trigger_pairs`]: circles on the XZ plane for
//! attack/enemy and enemy/player contact, and the player's pickup radius for
//! pickups. Skipped entirely when the host owns collision.

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::{
    distance_xz, Attack, CollisionRadius, DestroyEntityFlag, Enemy, LocalTransform, Pickup, PickupRange, Player,
};
use crate::resources::{CollisionSource, Resources};
use crate::stats::{stats_of, StatKind};

#[derive(Debug, Clone, Copy)]
struct Circle {
    entity: EntityId,
    center: Vec3,
    radius: f32,
}

impl Circle {
    fn overlaps(&self, other: &Circle) -> bool {
        distance_xz(self.center, other.center) <= self.radius + other.radius
    }
}

fn circles(world: &World, query: &Query) -> Vec<Circle> {
    let transforms = world.read::<LocalTransform>();
    let radii = world.read::<CollisionRadius>();
    query
        .iter(world)
        .filter_map(|entity| {
            let center = transforms.get(entity)?.position;
            let radius = radii.get(entity).map_or(0.0, |r| r.0);
            Some(Circle {
                entity,
                center,
                radius,
            })
        })
        .collect()
}

/// Fill `trigger_pairs` from overlapping circles.
pub fn detect_overlaps(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    if res.collision != CollisionSource::BuiltIn {
        return;
    }
    let live = |q: Query| q.with_present::<LocalTransform>().without::<DestroyEntityFlag>();
    let attacks = circles(world, &live(Query::new().with_present::<Attack>()));
    let enemies = circles(world, &live(Query::new().with_present::<Enemy>()));
    let pickups = circles(world, &Query::new().with_present::<Pickup>().with_present::<LocalTransform>());
    let player = circles(world, &live(Query::new().with_present::<Player>())).into_iter().next();

    let before = res.trigger_pairs.len();
    for attack in &attacks {
        for enemy in enemies.iter().filter(|e| attack.overlaps(e)) {
            res.trigger_pairs.push((attack.entity, enemy.entity));
        }
    }
    if let Some(player) = player {
        for enemy in enemies.iter().filter(|e| player.overlaps(e)) {
            res.trigger_pairs.push((enemy.entity, player.entity));
        }
        let range = world.get::<PickupRange>(player.entity).map_or(0.0, |r| r.0);
        let reach = Circle {
            radius: range * stats_of(world, player.entity).get(StatKind::PickupRadius),
            ..player
        };
        for pickup in pickups.iter().filter(|p| reach.overlaps(p)) {
            res.trigger_pairs.push((pickup.entity, player.entity));
        }
    }
    let found = res.trigger_pairs.len() - before;
    if found > 0 {
        tracing::trace!(pairs = found, "overlaps detected");
    }
}
