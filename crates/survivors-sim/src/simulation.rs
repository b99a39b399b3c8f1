//! The simulation session: world, resources, schedule and event bus.
//!
//! [`Simulation`] is what a host drives. Each [`tick`](Simulation::tick):
//!
//! 1. Stamps the clock (`elapsed = tick_count * fixed_dt`, no accumulation).
//! 2. Runs the phased schedule, playing commands back after each system.
//! 3. Pauses the schedule if a system asked for it (game over).
//! 4. Drains the tick's events and hands them to subscribers.
//!
//! Host actions between ticks (input, external trigger pairs, camera moves,
//! upgrade choices) go through the methods here rather than the world.

use std::sync::Arc;

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::{
    register_all, with_destroy_flags, CollisionRadius, DamageThisFrame, DamageTakenFlag, Health, Invincibility,
    Invincible, LastMoveDirection, LocalTransform, MoveSpeed, PickupRange, Player, PlayerExperience, Regeneration,
};
use crate::config::{GameConfig, PlayerDefinition};
use crate::error::SimError;
use crate::events::{EventBus, SimEvent, SubscriptionId};
use crate::experience::starting_experience;
use crate::resources::{find_player, CameraTarget, CollisionSource, Resources, SimTime};
use crate::rng::{EntityRng, SeedPolicy};
use crate::schedule::{Schedule, TickConfig, TickDiagnostics};
use crate::stats::{ActiveStatModifierEntity, CharacterStatModificationState, RecalculateStatsFlag};
use crate::systems::default_schedule;
use crate::upgrades::{self, UpgradeDescriptor};
use crate::waves::install_spawner;
use crate::weapons::acquire_weapon;

/// Session options that are not game content.
#[derive(Debug, Clone, Default)]
pub struct SimulationOptions {
    pub tick: TickConfig,
    pub seed: SeedPolicy,
    pub collision: CollisionSource,
}

/// Component bundle for a fresh player at the origin.
///
/// Stats start at the template with a recalculation pending, so the first
/// tick folds in whatever modifier sources were granted during setup.
pub fn player_bundle(def: &PlayerDefinition, experience: PlayerExperience, rng: EntityRng) -> ComponentBundle {
    with_destroy_flags(
        ComponentBundle::new()
            .with(Player)
            .with(LocalTransform::at(Vec3::ZERO))
            .with(Health::full(def.base_hp))
            .with(Buffer::<DamageThisFrame>::new())
            .with_disabled(DamageTakenFlag)
            .with_disabled(Invincible)
            .with(Invincibility {
                window: def.invincibility_window,
                remaining: 0.0,
            })
            .with(Regeneration::default())
            .with(MoveSpeed(def.move_speed))
            .with(PickupRange(def.pickup_radius))
            .with(CollisionRadius(def.collision_radius))
            .with(LastMoveDirection(Vec3::X))
            .with(experience)
            .with(CharacterStatModificationState::template())
            .with(Buffer::<ActiveStatModifierEntity>::new())
            .with(RecalculateStatsFlag)
            .with(rng),
    )
}

pub struct Simulation {
    world: World,
    res: Resources,
    schedule: Schedule,
    tick_config: TickConfig,
    tick_counter: u64,
    bus: EventBus,
    last_events: Vec<SimEvent>,
    /// Commands queued by host actions, applied immediately.
    host_cmds: CommandBuffer,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick_counter", &self.tick_counter)
            .field("entities", &self.world.entity_count())
            .field("systems", &self.schedule.system_count())
            .field("paused", &self.schedule.is_paused())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Validate `config`, spawn the player with its starting weapon and
    /// install the wave spawner.
    ///
    /// # Panics
    ///
    /// Panics if `options.tick.fixed_dt` is not positive and finite.
    pub fn new(config: GameConfig, options: SimulationOptions) -> Result<Self, SimError> {
        options.tick.validate();
        config.validate()?;
        let config = Arc::new(config);

        let mut world = World::new();
        register_all(&mut world);

        let mut res = Resources::new(Arc::clone(&config), options.seed);
        res.collision = options.collision;
        res.time.dt = options.tick.fixed_dt as f32;
        res.camera = Some(CameraTarget::new(Vec3::ZERO, config.camera_half_extents));

        let experience = starting_experience(&res);
        let rng = EntityRng::from_seeder(&mut res.seeder);
        let player = world.spawn_bundle(player_bundle(&config.player, experience, rng))?;

        let mut cmds = CommandBuffer::new();
        acquire_weapon(&world, &mut res, &mut cmds, player, config.player.starting_weapon)?;
        install_spawner(&world, &mut res, &mut cmds)?;
        cmds.apply(&mut world);
        let report = *cmds.last_apply_report();
        if report.failed_count > 0 {
            return Err(SimError::Config(format!(
                "{} session setup commands failed",
                report.failed_count
            )));
        }

        let schedule = default_schedule();
        tracing::info!(
            player = ?player,
            systems = schedule.system_count(),
            waves = config.waves.len(),
            seed = ?options.seed,
            "simulation ready"
        );
        Ok(Self {
            world,
            res,
            schedule,
            tick_config: options.tick,
            tick_counter: 0,
            bus: EventBus::new(),
            last_events: Vec::new(),
            host_cmds: CommandBuffer::new(),
        })
    }

    // -- stepping -----------------------------------------------------------

    /// Run one tick and return the events it produced. Does nothing while
    /// paused.
    pub fn tick(&mut self) -> &[SimEvent] {
        if self.schedule.is_paused() {
            return &[];
        }
        let dt = self.tick_config.fixed_dt;
        self.res.time = SimTime {
            tick: self.tick_counter,
            elapsed: self.tick_counter as f64 * dt,
            dt: dt as f32,
        };

        self.schedule.run(&mut self.world, &mut self.res);
        self.tick_counter += 1;
        // Pairs the interaction phase did not consume are stale next tick.
        self.res.trigger_pairs.clear();

        if std::mem::take(&mut self.res.pause_requested) {
            tracing::debug!(tick = self.tick_counter, "pause requested by simulation");
            self.schedule.pause();
        }
        self.dispatch_events()
    }

    /// Run up to `count` ticks, stopping early if the simulation pauses.
    /// Returns the number of ticks executed.
    pub fn run_ticks(&mut self, count: u64) -> u64 {
        let mut ran = 0;
        for _ in 0..count {
            if self.schedule.is_paused() {
                break;
            }
            self.tick();
            ran += 1;
        }
        ran
    }

    /// Deliver every queued event to subscribers now. Called at the end of
    /// each tick; hosts call it after their own actions to flush events
    /// those actions produced.
    pub fn dispatch_events(&mut self) -> &[SimEvent] {
        self.last_events = self.res.events.drain();
        self.bus.dispatch(&self.last_events);
        &self.last_events
    }

    pub fn pause(&mut self) {
        self.schedule.pause();
    }

    pub fn resume(&mut self) {
        self.res.pause_requested = false;
        self.schedule.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.schedule.is_paused()
    }

    pub fn is_game_over(&self) -> bool {
        self.res.game_over
    }

    // -- host input ---------------------------------------------------------

    /// Movement direction on the XZ plane for the next tick.
    pub fn set_input(&mut self, direction: Vec3) {
        self.res.input.direction = direction;
    }

    /// Feed one overlap from an external collision layer. Only meaningful
    /// with [`CollisionSource::External`]; order within the pair is
    /// irrelevant.
    pub fn push_trigger_pair(&mut self, a: EntityId, b: EntityId) {
        self.res.trigger_pairs.push((a, b));
    }

    pub fn set_camera(&mut self, camera: Option<CameraTarget>) {
        self.res.camera = camera;
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&SimEvent) + 'static) -> SubscriptionId {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // -- upgrades -----------------------------------------------------------

    /// The oldest level-up's choices, if any are waiting.
    pub fn pending_level_up(&self) -> Option<&[UpgradeDescriptor]> {
        self.res.pending_level_ups.front().map(Vec::as_slice)
    }

    pub fn pending_level_up_count(&self) -> usize {
        self.res.pending_level_ups.len()
    }

    /// Apply choice `index` of the oldest pending level-up and retire it.
    pub fn choose_upgrade(&mut self, index: usize) -> Result<UpgradeDescriptor, SimError> {
        let choice = self
            .res
            .pending_level_ups
            .front()
            .and_then(|choices| choices.get(index))
            .cloned()
            .ok_or(SimError::NoPendingChoice(index))?;
        self.apply_upgrade(&choice)?;
        self.res.pending_level_ups.pop_front();
        Ok(choice)
    }

    /// Retire the oldest pending level-up without choosing. Returns `false`
    /// if none was pending.
    pub fn skip_level_up(&mut self) -> bool {
        self.res.pending_level_ups.pop_front().is_some()
    }

    /// Apply `desc` to the player immediately. Events it publishes are
    /// delivered with the next tick or [`dispatch_events`](Self::dispatch_events).
    pub fn apply_upgrade(&mut self, desc: &UpgradeDescriptor) -> Result<(), SimError> {
        let player = self.player().ok_or(SimError::MissingSingleton("player"))?;
        if let Err(e) = upgrades::apply_upgrade(&self.world, &mut self.res, &mut self.host_cmds, player, desc) {
            self.host_cmds.clear();
            return Err(e);
        }
        self.host_cmds.apply(&mut self.world);
        tracing::debug!(upgrade = ?desc, "upgrade applied");
        Ok(())
    }

    // -- accessors ----------------------------------------------------------

    pub fn player(&self) -> Option<EntityId> {
        find_player(&self.world)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for setup and tests. Prefer host methods during
    /// play.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn resources(&self) -> &Resources {
        &self.res
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.res
    }

    /// Phase control beyond pause/resume.
    pub fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.schedule
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// `tick_count * fixed_dt`, computed rather than accumulated.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.tick_config.fixed_dt
    }

    pub fn fixed_dt(&self) -> f64 {
        self.tick_config.fixed_dt
    }

    pub fn is_headless(&self) -> bool {
        self.tick_config.headless
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        self.schedule.last_diagnostics()
    }

    pub fn snapshot(&self) -> Result<WorldSnapshot, SimError> {
        Ok(self.world.capture_snapshot()?)
    }

    /// Hash of the world state plus the tick counter. Equal sessions hash
    /// equal.
    pub fn state_hash(&self) -> Result<blake3::Hash, SimError> {
        let world = self.world.state_hash()?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(world.as_bytes());
        hasher.update(&self.tick_counter.to_le_bytes());
        Ok(hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
