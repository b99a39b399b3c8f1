//! Wave advancement.

use survivors_ecs::prelude::*;

use crate::components::{DestroyEffectRequest, Enemy, InstantDestroy};
use crate::events::SimEvent;
use crate::resources::Resources;
use crate::systems;

use super::{spawn_boss, spawn_events_for, EnemySpawnWaveData, EnemySpawnerState, SpawnEvent, WaveSchedule};

/// Count down the wave timer and move to the next wave on expiry.
///
/// The next wave's roster and spawn events replace the current ones
/// wholesale. When the schedule runs out the spawner state is removed and
/// every live enemy is queued for instant destruction with a destroy effect.
pub fn advance_waves(world: &World, res: &mut Resources, cmds: &mut CommandBuffer) {
    let Some(spawner) = Query::new().with::<EnemySpawnerState>().first(world) else {
        return;
    };
    let dt = res.time.dt;
    let next_index = {
        let mut states = world.write::<EnemySpawnerState>();
        let Some(state) = states.get_mut(spawner) else {
            return;
        };
        state.wave_timer -= dt;
        if state.wave_timer > 0.0 {
            return;
        }
        state.wave_timer = state.wave_interval;
        state.cur_wave_index += 1;
        state.cur_wave_index
    };

    let next = world
        .get::<WaveSchedule>(spawner)
        .and_then(|s| s.waves.get(next_index).cloned());
    let Some(wave) = next else {
        finish_waves(world, res, cmds, spawner);
        return;
    };

    let reason = || CausalReason::timer("wave_timer");
    cmds.set_component(
        spawner,
        &EnemySpawnWaveData::from_definition(&wave),
        systems::ADVANCE_WAVES,
        reason(),
    );
    cmds.set_component::<Buffer<SpawnEvent>>(spawner, &spawn_events_for(&wave), systems::ADVANCE_WAVES, reason());
    spawn_boss(world, res, cmds, &wave);

    tracing::info!(wave = next_index, tick = res.time.tick, "wave advanced");
    res.events.publish(SimEvent::WaveChanged { wave: next_index });
}

fn finish_waves(world: &World, res: &mut Resources, cmds: &mut CommandBuffer, spawner: EntityId) {
    let reason = || CausalReason::rule("waves_completed");
    cmds.remove_component::<EnemySpawnerState>(spawner, systems::ADVANCE_WAVES, reason());

    let enemies = Query::new().with::<Enemy>().collect(world);
    for enemy in &enemies {
        cmds.set_enabled::<DestroyEffectRequest>(*enemy, true, systems::ADVANCE_WAVES, reason());
        cmds.set_enabled::<InstantDestroy>(*enemy, true, systems::ADVANCE_WAVES, reason());
    }

    tracing::info!(cleared = enemies.len(), tick = res.time.tick, "all waves completed");
    res.events.publish(SimEvent::WavesCompleted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{register_all, with_destroy_flags, EnemyType};
    use crate::waves::install_spawner;

    fn setup() -> (World, Resources) {
        let mut world = World::new();
        register_all(&mut world);
        let mut res = Resources::for_tests();
        let mut cmds = CommandBuffer::new();
        install_spawner(&world, &mut res, &mut cmds).unwrap();
        cmds.apply(&mut world);
        res.events.drain();
        (world, res)
    }

    /// Run the advancer until the timer expires once.
    fn expire(world: &mut World, res: &mut Resources) {
        let spawner = Query::new().with::<EnemySpawnerState>().first(world).unwrap();
        world.write::<EnemySpawnerState>().get_mut(spawner).unwrap().wave_timer = res.time.dt;
        let mut cmds = CommandBuffer::new();
        advance_waves(world, res, &mut cmds);
        cmds.apply(world);
    }

    #[test]
    fn timer_counts_down_without_advancing() {
        let (world, mut res) = setup();
        let mut cmds = CommandBuffer::new();
        advance_waves(&world, &mut res, &mut cmds);
        let spawner = Query::new().with::<EnemySpawnerState>().first(&world).unwrap();
        let state = world.get_cloned::<EnemySpawnerState>(spawner).unwrap();
        assert_eq!(state.cur_wave_index, 0);
        assert!(state.wave_timer < state.wave_interval);
        assert!(res.events.is_empty());
    }

    #[test]
    fn expiry_replaces_roster_and_events() {
        let (mut world, mut res) = setup();
        expire(&mut world, &mut res);

        let wave = res.config.waves[1].clone();
        let spawner = Query::new().with::<EnemySpawnerState>().first(&world).unwrap();
        let state = world.get_cloned::<EnemySpawnerState>(spawner).unwrap();
        assert_eq!(state.cur_wave_index, 1);
        assert_eq!(state.wave_timer, state.wave_interval);
        assert_eq!(
            world.get_cloned::<EnemySpawnWaveData>(spawner),
            Some(EnemySpawnWaveData::from_definition(&wave))
        );
        let events = world.get_cloned::<Buffer<SpawnEvent>>(spawner).unwrap();
        assert_eq!(events.len(), wave.spawn_events.len());
        assert!(events.iter().all(|e| !e.has_occurred));
        assert!(res.events.events().contains(&SimEvent::WaveChanged { wave: 1 }));
    }

    #[test]
    fn exhausting_waves_retires_spawner_and_clears_enemies() {
        let (mut world, mut res) = setup();
        let enemy = world
            .spawn_bundle(with_destroy_flags(ComponentBundle::new().with(Enemy {
                kind: EnemyType::new("bat"),
            })))
            .unwrap();

        let waves = res.config.waves.len();
        for _ in 0..waves {
            expire(&mut world, &mut res);
        }

        assert_eq!(Query::new().with::<EnemySpawnerState>().count(&world), 0);
        assert!(world.is_enabled::<InstantDestroy>(enemy));
        assert!(world.is_enabled::<DestroyEffectRequest>(enemy));
        assert_eq!(
            res.events.events().iter().filter(|e| **e == SimEvent::WavesCompleted).count(),
            1
        );

        // Nothing left to advance.
        let mut cmds = CommandBuffer::new();
        advance_waves(&world, &mut res, &mut cmds);
        assert!(cmds.is_empty());
    }
}
