//! Property tests for ECS operations.
//!
//! Random sequences of world operations, checked against a shadow model
//! after every step.

use std::collections::HashMap;

use proptest::prelude::*;
use survivors_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Pos {
    x: f32,
    z: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Vel {
    dx: f32,
    dz: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Active;

survivors_ecs::component!(Pos => "pos", Vel => "vel", Active => "active");

#[derive(Debug, Clone)]
enum EcsOp {
    SpawnPos(i16, i16),
    SpawnFull(i16, i16, bool),
    Despawn(usize),
    InsertVel(usize, i16),
    RemoveVel(usize),
    Toggle(usize, bool),
}

fn ecs_op_strategy() -> impl Strategy<Value = EcsOp> {
    prop_oneof![
        (any::<i16>(), any::<i16>()).prop_map(|(x, z)| EcsOp::SpawnPos(x, z)),
        (any::<i16>(), any::<i16>(), any::<bool>()).prop_map(|(x, z, a)| EcsOp::SpawnFull(x, z, a)),
        (0..32usize).prop_map(EcsOp::Despawn),
        (0..32usize, any::<i16>()).prop_map(|(i, d)| EcsOp::InsertVel(i, d)),
        (0..32usize).prop_map(EcsOp::RemoveVel),
        (0..32usize, any::<bool>()).prop_map(|(i, b)| EcsOp::Toggle(i, b)),
    ]
}

/// What we expect each live entity to hold.
#[derive(Debug, Clone, Default)]
struct Shadow {
    pos: Option<Pos>,
    vel: Option<Vel>,
    active: Option<bool>,
}

fn setup() -> World {
    let mut world = World::new();
    world.register::<Pos>();
    world.register::<Vel>();
    world.register::<Active>();
    world
}

proptest! {
    #[test]
    fn random_ops_match_shadow_model(ops in prop::collection::vec(ecs_op_strategy(), 1..60)) {
        let mut world = setup();
        let mut alive: Vec<EntityId> = Vec::new();
        let mut shadow: HashMap<EntityId, Shadow> = HashMap::new();

        for op in ops {
            match op {
                EcsOp::SpawnPos(x, z) => {
                    let pos = Pos { x: x as f32, z: z as f32 };
                    let e = world.spawn_with(pos.clone());
                    alive.push(e);
                    shadow.insert(e, Shadow { pos: Some(pos), ..Default::default() });
                }
                EcsOp::SpawnFull(x, z, active) => {
                    let pos = Pos { x: x as f32, z: z as f32 };
                    let mut bundle = ComponentBundle::new().with(pos.clone());
                    bundle.add(Active, active);
                    let e = world.spawn_bundle(bundle).unwrap();
                    alive.push(e);
                    shadow.insert(e, Shadow { pos: Some(pos), vel: None, active: Some(active) });
                }
                EcsOp::Despawn(idx) => {
                    if !alive.is_empty() {
                        let e = alive.remove(idx % alive.len());
                        world.despawn(e).unwrap();
                        shadow.remove(&e);
                    }
                }
                EcsOp::InsertVel(idx, d) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        let vel = Vel { dx: d as f32, dz: 0.0 };
                        world.insert(e, vel.clone()).unwrap();
                        shadow.get_mut(&e).unwrap().vel = Some(vel);
                    }
                }
                EcsOp::RemoveVel(idx) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        let had = world.remove::<Vel>(e).unwrap();
                        let entry = shadow.get_mut(&e).unwrap();
                        prop_assert_eq!(had, entry.vel.is_some());
                        entry.vel = None;
                    }
                }
                EcsOp::Toggle(idx, on) => {
                    if !alive.is_empty() {
                        let e = alive[idx % alive.len()];
                        let applied = world.set_enabled::<Active>(e, on);
                        let entry = shadow.get_mut(&e).unwrap();
                        prop_assert_eq!(applied, entry.active.is_some());
                        if applied {
                            entry.active = Some(on);
                        }
                    }
                }
            }

            prop_assert_eq!(world.entity_count(), alive.len());
            for (&e, expected) in &shadow {
                prop_assert!(world.is_alive(e));
                prop_assert_eq!(world.get_cloned::<Pos>(e), expected.pos.clone());
                prop_assert_eq!(world.get_cloned::<Vel>(e), expected.vel.clone());
                prop_assert_eq!(world.has::<Active>(e), expected.active.is_some());
                prop_assert_eq!(world.is_enabled::<Active>(e), expected.active == Some(true));
            }

            let active = Query::new().with::<Active>().count(&world);
            let expected_active = shadow.values().filter(|s| s.active == Some(true)).count();
            prop_assert_eq!(active, expected_active);

            let moving = Query::new().with::<Pos>().with::<Vel>().count(&world);
            prop_assert_eq!(moving, shadow.values().filter(|s| s.vel.is_some()).count());
        }
    }

    /// A despawned handle stays stale even after its slot is recycled.
    #[test]
    fn stale_ids_detected_after_recycle(
        spawn_count in 1..20usize,
        despawn_indices in prop::collection::vec(0..20usize, 1..10),
    ) {
        let mut world = setup();
        let mut entities: Vec<EntityId> = (0..spawn_count)
            .map(|i| world.spawn_with(Pos { x: i as f32, z: 0.0 }))
            .collect();

        let mut stale = Vec::new();
        for idx in despawn_indices {
            if !entities.is_empty() {
                let e = entities.remove(idx % entities.len());
                world.despawn(e).unwrap();
                stale.push(e);
            }
        }
        for _ in 0..stale.len() {
            entities.push(world.spawn_with(Pos { x: 999.0, z: 999.0 }));
        }

        for e in stale {
            prop_assert!(!world.is_alive(e));
            prop_assert!(world.get::<Pos>(e).is_none());
            prop_assert!(world.despawn(e).is_err());
        }
        for e in entities {
            prop_assert!(world.get::<Pos>(e).is_some());
        }
    }

    /// Snapshot then restore reproduces the same hash.
    #[test]
    fn snapshot_restore_is_lossless(
        values in prop::collection::vec((any::<i16>(), any::<bool>(), any::<bool>()), 0..30),
    ) {
        let mut world = setup();
        for (v, with_vel, active) in values {
            let mut bundle = ComponentBundle::new().with(Pos { x: v as f32, z: 1.0 });
            if with_vel {
                bundle = bundle.with(Vel { dx: 1.0, dz: v as f32 });
            }
            bundle.add(Active, active);
            world.spawn_bundle(bundle).unwrap();
        }
        let snapshot = world.capture_snapshot().unwrap();
        let mut restored = setup();
        restored.restore_from_snapshot(&snapshot).unwrap();
        prop_assert_eq!(restored.state_hash().unwrap(), world.state_hash().unwrap());
        prop_assert_eq!(
            Query::new().with::<Active>().count(&restored),
            Query::new().with::<Active>().count(&world)
        );
    }
}
