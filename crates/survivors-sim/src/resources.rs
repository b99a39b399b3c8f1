//! Per-session state shared by every system.
//!
//! Systems take `&World` plus `&mut Resources`, so anything that is not an
//! entity (clock, camera, content, event queue, external inputs) lives here
//! rather than in a singleton entity.

use std::collections::VecDeque;
use std::sync::Arc;

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::Player;
use crate::config::GameConfig;
use crate::events::EventQueue;
use crate::registry::PrefabRegistry;
use crate::rng::{RandomSeeder, SeedPolicy};
use crate::upgrades::UpgradeDescriptor;

/// Simulation clock for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimTime {
    /// Ticks completed before this one.
    pub tick: u64,
    /// `tick * dt` in seconds.
    pub elapsed: f64,
    pub dt: f32,
}

/// Visible rectangle on the XZ plane. Spawn positions and off-screen checks
/// are relative to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTarget {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl CameraTarget {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    /// `true` if `p` is inside the rectangle, ignoring height.
    pub fn contains_xz(&self, p: Vec3) -> bool {
        (p.x - self.center.x).abs() <= self.half_extents.x && (p.z - self.center.z).abs() <= self.half_extents.z
    }
}

/// Where trigger pairs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionSource {
    /// The built-in circle overlap pass fills `trigger_pairs` each tick.
    #[default]
    BuiltIn,
    /// The host pushes pairs before each tick.
    External,
}

/// Movement input for the current tick. `direction` is on the XZ plane and
/// need not be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInput {
    pub direction: Vec3,
}

pub struct Resources {
    pub time: SimTime,
    pub camera: Option<CameraTarget>,
    pub config: Arc<GameConfig>,
    pub prefabs: PrefabRegistry,
    pub events: EventQueue,
    /// Unordered overlap pairs for this tick, consumed by the interaction
    /// producer.
    pub trigger_pairs: Vec<(EntityId, EntityId)>,
    pub collision: CollisionSource,
    pub input: PlayerInput,
    pub seeder: RandomSeeder,
    /// Rolled upgrade choices waiting for the host, oldest first.
    pub pending_level_ups: VecDeque<Vec<UpgradeDescriptor>>,
    /// Set by a system to pause the schedule after the current tick.
    pub pause_requested: bool,
    pub game_over: bool,
}

impl Resources {
    pub fn new(config: Arc<GameConfig>, seed: SeedPolicy) -> Self {
        let prefabs = PrefabRegistry::from_config(&config);
        Self {
            time: SimTime::default(),
            camera: None,
            prefabs,
            config,
            events: EventQueue::new(),
            trigger_pairs: Vec::new(),
            collision: CollisionSource::default(),
            input: PlayerInput::default(),
            seeder: RandomSeeder::new(seed),
            pending_level_ups: VecDeque::new(),
            pause_requested: false,
            game_over: false,
        }
    }

    /// Default content, a camera at the origin and a 60 Hz clock.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        let config = Arc::new(GameConfig::default());
        let mut res = Self::new(config.clone(), SeedPolicy::FixedIndex0);
        res.camera = Some(CameraTarget::new(Vec3::ZERO, config.camera_half_extents));
        res.time.dt = 1.0 / 60.0;
        res
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("time", &self.time)
            .field("camera", &self.camera)
            .field("events", &self.events.len())
            .field("trigger_pairs", &self.trigger_pairs.len())
            .field("collision", &self.collision)
            .field("pending_level_ups", &self.pending_level_ups.len())
            .field("game_over", &self.game_over)
            .finish_non_exhaustive()
    }
}

/// The player entity, whether or not it is still alive in gameplay terms.
pub fn find_player(world: &World) -> Option<EntityId> {
    Query::new().with_present::<Player>().first(world)
}
