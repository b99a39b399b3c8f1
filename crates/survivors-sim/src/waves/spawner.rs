//! Scripted spawn events and ambient population top-up.

use survivors_ecs::prelude::*;

use crate::components::{DestroyEntityFlag, Enemy, EnemyType, InstantDestroy};
use crate::registry::EnemySpawn;
use crate::resources::{CameraTarget, Resources};
use crate::rng::EntityRng;
use crate::systems;

use super::{
    formation_spawns, random_spawn_position, EnemySpawnWaveData, EnemySpawnerState, FormationMotion,
    SpawnEvent,
};

fn active_spawner(world: &World) -> Option<EntityId> {
    Query::new().with::<EnemySpawnerState>().first(world)
}

/// Live enemies not already on their way out.
pub fn live_enemy_count(world: &World) -> usize {
    Query::new()
        .with::<Enemy>()
        .without::<DestroyEntityFlag>()
        .without::<InstantDestroy>()
        .count(world)
}

/// Fire the active wave's spawn events whose delay has elapsed.
///
/// Each event fires at most once: `has_occurred` latches when the delay
/// reaches zero, and the chance roll only decides whether anything spawns.
pub fn spawn_scheduled_events(world: &World, res: &mut Resources, cmds: &mut CommandBuffer) {
    let Some(spawner) = active_spawner(world) else {
        return;
    };
    let Some(camera) = res.camera else {
        return;
    };
    let dt = res.time.dt;

    let mut due = Vec::new();
    {
        let mut buffers = world.write::<Buffer<SpawnEvent>>();
        let Some(events) = buffers.get_mut(spawner) else {
            return;
        };
        for event in events.iter_mut().filter(|e| !e.has_occurred) {
            event.delay -= dt;
            if event.delay <= 0.0 {
                event.has_occurred = true;
                due.push(event.clone());
            }
        }
    }
    if due.is_empty() {
        return;
    }

    let mut rngs = world.write::<EntityRng>();
    let Some(rng) = rngs.get_mut(spawner) else {
        tracing::warn!(spawner = ?spawner, "spawner has no rng; spawn events skipped");
        return;
    };
    for event in due {
        if !rng.chance(event.chance) {
            tracing::debug!(enemy = %event.enemy_type, "spawn event roll failed");
            continue;
        }
        let Some(spawns) = formation_spawns(&event.formation, &camera, event.count, rng) else {
            tracing::warn!(enemy = %event.enemy_type, "unknown spawn formation; event skipped");
            continue;
        };
        let mut spawned = 0usize;
        for spawn in spawns {
            let spawn = EnemySpawn {
                position: spawn.position,
                motion: spawn.motion,
                start_time: res.time.elapsed,
            };
            let enemy_rng = EntityRng::from_seed(rng.next_seed());
            let Some(bundle) = res.prefabs.enemy_bundle(&event.enemy_type, &spawn, enemy_rng) else {
                tracing::warn!(enemy = %event.enemy_type, "unknown enemy type in spawn event");
                break;
            };
            cmds.spawn(bundle, systems::SPAWN_EVENTS, CausalReason::timer("spawn_event"));
            spawned += 1;
        }
        tracing::debug!(enemy = %event.enemy_type, spawned, "spawn event fired");
    }
}

/// Keep the live enemy count at the active wave's minimum.
///
/// Every `spawn_interval` seconds, spawn one enemy of each roster type per
/// batch until the minimum is reached. The count is tracked locally since
/// queued spawns are not visible until the command buffer applies.
pub fn top_up_population(world: &World, res: &mut Resources, cmds: &mut CommandBuffer) {
    let Some(spawner) = active_spawner(world) else {
        return;
    };
    let Some(camera) = res.camera else {
        return;
    };
    let Some(wave) = world.get_cloned::<EnemySpawnWaveData>(spawner) else {
        return;
    };
    {
        let mut states = world.write::<EnemySpawnerState>();
        let Some(state) = states.get_mut(spawner) else {
            return;
        };
        state.spawn_timer -= res.time.dt;
        if state.spawn_timer > 0.0 {
            return;
        }
        state.spawn_timer = wave.spawn_interval;
    }
    if wave.enemy_types.is_empty() {
        return;
    }

    let min = wave.min_enemy_count as usize;
    let mut live = live_enemy_count(world);
    if live >= min {
        return;
    }
    let mut rngs = world.write::<EntityRng>();
    let Some(rng) = rngs.get_mut(spawner) else {
        tracing::warn!(spawner = ?spawner, "spawner has no rng; top-up skipped");
        return;
    };

    let before = live;
    loop {
        let batch = spawn_batch(res, cmds, &camera, &wave.enemy_types, rng);
        if batch == 0 {
            tracing::warn!("no roster type could be spawned; top-up stopped");
            break;
        }
        live += batch;
        if live >= min {
            break;
        }
    }
    tracing::debug!(spawned = live - before, live, min, "population topped up");
}

/// One enemy of each roster type. Returns how many were queued.
fn spawn_batch(
    res: &Resources,
    cmds: &mut CommandBuffer,
    camera: &CameraTarget,
    roster: &[EnemyType],
    rng: &mut EntityRng,
) -> usize {
    let settings = &res.config.spawner;
    let mut spawned = 0;
    for kind in roster {
        let position = random_spawn_position(camera, settings.min_offscreen, settings.max_offscreen, rng);
        let spawn = EnemySpawn {
            position,
            motion: FormationMotion::ChasePlayer,
            start_time: res.time.elapsed,
        };
        let enemy_rng = EntityRng::from_seed(rng.next_seed());
        if let Some(bundle) = res.prefabs.enemy_bundle(kind, &spawn, enemy_rng) {
            cmds.spawn(bundle, systems::TOP_UP, CausalReason::timer("population_top_up"));
            spawned += 1;
        }
    }
    spawned
}
