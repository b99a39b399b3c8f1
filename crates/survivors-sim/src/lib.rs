//! Survivors Sim -- deterministic gameplay core for a survivors-like game.
//!
//! This crate builds on [`survivors_ecs`] to provide the whole runtime
//! gameplay loop: a phased fixed-timestep schedule, the interaction buffer
//! protocol, the damage pipeline, stat-modifier aggregation, the weapon
//! attack state machine, the wave/spawn scheduler, per-entity random
//! streams, movement evaluators and entity destruction with drops,
//! experience and upgrades.
//!
//! Rendering, audio, UI and input devices are collaborators outside the
//! crate. They talk to a [`Simulation`](simulation::Simulation) through
//! host methods (input, trigger pairs, camera, upgrade choices) and
//! receive [`SimEvent`](events::SimEvent)s after each tick.
//!
//! # Quick Start
//!
//! ```
//! use survivors_sim::prelude::*;
//!
//! let mut sim = Simulation::new(GameConfig::default(), SimulationOptions::default()).unwrap();
//! sim.set_input(Vec3::new(1.0, 0.0, 0.0));
//! sim.run_ticks(60);
//! assert_eq!(sim.tick_count(), 60);
//! assert!(sim.player().is_some());
//! ```

#![deny(unsafe_code)]

pub mod collision;
pub mod components;
pub mod config;
pub mod damage;
pub mod destruction;
pub mod error;
pub mod events;
pub mod experience;
pub mod interaction;
pub mod movement;
pub mod registry;
pub mod resources;
pub mod rng;
pub mod schedule;
pub mod simulation;
pub mod stats;
pub mod systems;
pub mod upgrades;
pub mod waves;
pub mod weapons;

/// Re-export the ECS crate for convenience.
pub use survivors_ecs;

pub use error::SimError;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for hosts.
pub mod prelude {
    pub use survivors_ecs::prelude::*;

    pub use glam::Vec3;

    pub use crate::config::GameConfig;
    pub use crate::error::SimError;
    pub use crate::events::{SimEvent, SubscriptionId};
    pub use crate::resources::{CameraTarget, CollisionSource, Resources};
    pub use crate::rng::{EntityRng, SeedPolicy};
    pub use crate::schedule::{Phase, Schedule, SystemFn, TickConfig, TickDiagnostics};
    pub use crate::simulation::{Simulation, SimulationOptions};
    pub use crate::upgrades::UpgradeDescriptor;
    pub use crate::weapons::WeaponKind;
}
