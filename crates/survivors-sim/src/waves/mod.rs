//! Enemy wave and spawn scheduling.
//!
//! Two cooperating state machines share one spawner entity:
//!
//! * the wave advancer ([`advance_waves`]) counts `wave_timer` down and, on
//!   expiry, replaces the active wave's roster and spawn events wholesale
//!   from the next definition (or retires the spawner when waves run out);
//! * the event and population spawner ([`spawn_scheduled_events`],
//!   [`top_up_population`]) runs the active wave's one-shot spawn events and
//!   keeps the live enemy count at the wave's minimum.

pub mod advancer;
pub mod formation;
pub mod position;
pub mod spawner;

use serde::{Deserialize, Serialize};
use survivors_ecs::prelude::*;

use crate::components::{EnemyType, PlayerExperience};
use crate::config::{SpawnEventDefinition, WaveDefinition};
use crate::error::SimError;
use crate::registry::EnemySpawn;
use crate::resources::{find_player, Resources};
use crate::rng::EntityRng;
use crate::systems;

pub use advancer::advance_waves;
pub use formation::{
    formation_spawns, FormationMotion, FormationSpawn, SpawnFormation, MAX_FORMATION_SPAWNS,
};
pub use position::{random_spawn_position, spawn_position_on_side, ScreenSide};
pub use spawner::{spawn_scheduled_events, top_up_population};

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Present while waves remain. Removed when the schedule is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySpawnerState {
    pub cur_wave_index: usize,
    pub wave_timer: f32,
    pub wave_interval: f32,
    /// Countdown to the next population top-up.
    pub spawn_timer: f32,
}

/// The full list of wave definitions for the level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSchedule {
    pub waves: Vec<WaveDefinition>,
}

/// The active wave's ambient roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemySpawnWaveData {
    pub enemy_types: Vec<EnemyType>,
    pub min_enemy_count: u32,
    pub spawn_interval: f32,
}

/// One scripted spawn in the active wave. `has_occurred` latches once the
/// delay expires, whether or not the chance roll succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEvent {
    pub delay: f32,
    pub chance: f32,
    pub formation: SpawnFormation,
    pub enemy_type: EnemyType,
    pub count: u32,
    pub has_occurred: bool,
}

impl From<&SpawnEventDefinition> for SpawnEvent {
    fn from(def: &SpawnEventDefinition) -> Self {
        Self {
            delay: def.delay,
            chance: def.chance,
            formation: def.formation.clone(),
            enemy_type: def.enemy_type.clone(),
            count: def.count,
            has_occurred: false,
        }
    }
}

survivors_ecs::component!(
    EnemySpawnerState => "enemy_spawner_state",
    WaveSchedule => "wave_schedule",
    EnemySpawnWaveData => "enemy_spawn_wave_data",
);
survivors_ecs::buffer_element!(SpawnEvent => "spawn_events");

impl EnemySpawnWaveData {
    pub fn from_definition(def: &WaveDefinition) -> Self {
        Self {
            enemy_types: def.enemy_types.clone(),
            min_enemy_count: def.min_enemy_count,
            spawn_interval: def.spawn_interval,
        }
    }
}

/// Spawn-event buffer for a wave definition.
pub fn spawn_events_for(def: &WaveDefinition) -> Buffer<SpawnEvent> {
    def.spawn_events.iter().map(SpawnEvent::from).collect()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Queue the spawner entity with wave 0 already loaded, plus wave 0's boss.
pub fn install_spawner(
    world: &World,
    res: &mut Resources,
    cmds: &mut CommandBuffer,
) -> Result<PendingEntity, SimError> {
    let config = res.config.clone();
    let first = config
        .waves
        .first()
        .ok_or_else(|| SimError::Config("at least one wave is required".to_owned()))?;
    let interval = config.spawner.wave_interval;
    let bundle = ComponentBundle::new()
        .with(EnemySpawnerState {
            cur_wave_index: 0,
            wave_timer: interval,
            wave_interval: interval,
            spawn_timer: 0.0,
        })
        .with(WaveSchedule {
            waves: config.waves.clone(),
        })
        .with(EnemySpawnWaveData::from_definition(first))
        .with(spawn_events_for(first))
        .with(EntityRng::from_seeder(&mut res.seeder));
    let spawner = cmds.spawn(bundle, systems::ADVANCE_WAVES, CausalReason::internal("install_spawner"));
    spawn_boss(world, res, cmds, first);
    tracing::debug!(waves = config.waves.len(), "spawner installed");
    Ok(spawner)
}

/// Queue the wave's boss, if it has one, with hit points scaled by the
/// player's current level.
pub fn spawn_boss(world: &World, res: &mut Resources, cmds: &mut CommandBuffer, wave: &WaveDefinition) {
    let Some(boss) = &wave.boss else {
        return;
    };
    let Some(camera) = res.camera else {
        tracing::warn!("boss skipped: no camera target");
        return;
    };
    let level = find_player(world)
        .and_then(|p| world.get_cloned::<PlayerExperience>(p))
        .map_or(1, |xp| xp.level.max(1));
    let mut rng = EntityRng::from_seeder(&mut res.seeder);
    let position = random_spawn_position(
        &camera,
        res.config.spawner.min_offscreen,
        res.config.spawner.max_offscreen,
        &mut rng,
    );
    let spawn = EnemySpawn {
        position,
        motion: FormationMotion::ChasePlayer,
        start_time: res.time.elapsed,
    };
    let Some(bundle) = res.prefabs.boss_bundle(boss, level, &spawn, rng) else {
        tracing::warn!(enemy = %boss.enemy_type, "boss skipped: unknown enemy type");
        return;
    };
    cmds.spawn(bundle, systems::ADVANCE_WAVES, CausalReason::timer("boss_spawn"));
}
