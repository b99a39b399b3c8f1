//! Per-weapon target selection.

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::{direction_xz, distance_xz, DestroyEntityFlag, Enemy, LocalTransform};
use crate::resources::CameraTarget;
use crate::rng::EntityRng;

use super::WeaponKind;

/// Where an attack starts and which way it goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aim {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// Live enemy positions, gathered on first use and shared by every weapon
/// for the rest of the tick.
#[derive(Debug, Default)]
pub struct EnemyCache {
    positions: Option<Vec<(EntityId, Vec3)>>,
}

impl EnemyCache {
    pub fn get(&mut self, world: &World) -> &[(EntityId, Vec3)] {
        self.positions.get_or_insert_with(|| {
            let transforms = world.read::<LocalTransform>();
            Query::new()
                .with_present::<Enemy>()
                .with_present::<LocalTransform>()
                .without::<DestroyEntityFlag>()
                .iter(world)
                .filter_map(|e| transforms.get(e).map(|t| (e, t.position)))
                .collect()
        })
    }
}

/// Closest enemy to `from` on the XZ plane. Ties resolve to the earliest in
/// query order.
pub fn closest_enemy(enemies: &[(EntityId, Vec3)], from: Vec3) -> Option<Vec3> {
    let mut best: Option<(f32, Vec3)> = None;
    for (_, pos) in enemies {
        let d = distance_xz(from, *pos);
        if best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, *pos));
        }
    }
    best.map(|(_, pos)| pos)
}

/// Uniformly random enemy inside the camera rectangle.
pub fn random_enemy_in_view(
    enemies: &[(EntityId, Vec3)],
    camera: &CameraTarget,
    rng: &mut EntityRng,
) -> Option<Vec3> {
    let visible: Vec<Vec3> = enemies
        .iter()
        .map(|(_, p)| *p)
        .filter(|p| camera.contains_xz(*p))
        .collect();
    rng.index(visible.len()).map(|i| visible[i])
}

/// Choose an aim for `kind`, or `None` if the weapon has nothing to shoot at.
pub fn select_target(
    kind: WeaponKind,
    world: &World,
    owner_pos: Vec3,
    last_move: Vec3,
    camera: Option<&CameraTarget>,
    enemies: &mut EnemyCache,
    rng: &mut EntityRng,
) -> Option<Aim> {
    let toward = |target: Vec3| Aim {
        origin: owner_pos,
        direction: direction_xz(owner_pos, target).unwrap_or(Vec3::X),
    };
    match kind {
        WeaponKind::MagicWand | WeaponKind::Cross => {
            closest_enemy(enemies.get(world), owner_pos).map(toward)
        }
        WeaponKind::LightningRing => {
            let target = random_enemy_in_view(enemies.get(world), camera?, rng)?;
            Some(Aim {
                origin: target,
                direction: Vec3::X,
            })
        }
        WeaponKind::Knife => Some(Aim {
            origin: owner_pos,
            direction: last_move.try_normalize().unwrap_or(Vec3::X),
        }),
        WeaponKind::Axe => {
            let spread = rng.range_f32(-0.35, 0.35);
            Some(Aim {
                origin: owner_pos,
                direction: Vec3::new(spread, 0.0, 1.0).normalize(),
            })
        }
        WeaponKind::Garlic => Some(Aim {
            origin: owner_pos,
            direction: Vec3::X,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: u32) -> EntityId {
        EntityId::new(i, 0)
    }

    #[test]
    fn closest_enemy_picks_minimum_distance() {
        let enemies = vec![
            (id(1), Vec3::new(5.0, 0.0, 0.0)),
            (id(2), Vec3::new(-1.0, 0.0, 1.0)),
            (id(3), Vec3::new(0.0, 0.0, -3.0)),
        ];
        assert_eq!(closest_enemy(&enemies, Vec3::ZERO), Some(Vec3::new(-1.0, 0.0, 1.0)));
        assert_eq!(closest_enemy(&[], Vec3::ZERO), None);
    }

    #[test]
    fn random_in_view_ignores_offscreen() {
        let camera = CameraTarget {
            center: Vec3::ZERO,
            half_extents: Vec3::new(10.0, 5.0, 10.0),
        };
        let enemies = vec![
            (id(1), Vec3::new(50.0, 0.0, 0.0)),
            (id(2), Vec3::new(3.0, 0.0, 3.0)),
        ];
        let mut rng = EntityRng::from_seed(1);
        for _ in 0..20 {
            assert_eq!(
                random_enemy_in_view(&enemies, &camera, &mut rng),
                Some(Vec3::new(3.0, 0.0, 3.0))
            );
        }
        assert_eq!(random_enemy_in_view(&enemies[..1], &camera, &mut rng), None);
    }

    #[test]
    fn direction_based_weapons_always_aim() {
        let world = {
            let mut w = World::new();
            crate::components::register_all(&mut w);
            w
        };
        let mut cache = EnemyCache::default();
        let mut rng = EntityRng::from_seed(9);
        for kind in [WeaponKind::Knife, WeaponKind::Axe, WeaponKind::Garlic] {
            assert!(select_target(kind, &world, Vec3::ZERO, Vec3::Z, None, &mut cache, &mut rng).is_some());
        }
        for kind in [WeaponKind::MagicWand, WeaponKind::Cross, WeaponKind::LightningRing] {
            assert!(select_target(kind, &world, Vec3::ZERO, Vec3::Z, None, &mut cache, &mut rng).is_none());
        }
    }

    #[test]
    fn axe_heads_upward() {
        let world = {
            let mut w = World::new();
            crate::components::register_all(&mut w);
            w
        };
        let mut cache = EnemyCache::default();
        let mut rng = EntityRng::from_seed(4);
        for _ in 0..50 {
            let aim = select_target(WeaponKind::Axe, &world, Vec3::ZERO, Vec3::X, None, &mut cache, &mut rng)
                .unwrap();
            assert!(aim.direction.z > 0.9);
        }
    }
}
