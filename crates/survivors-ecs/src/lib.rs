//! Survivors ECS -- archetype-grouped entity store with enableable components.
//!
//! Entities are grouped into archetypes by their exact component-type set.
//! Each component type owns a sparse-set column behind its own `RefCell`, and
//! each archetype row keeps one enable bit per component. That gives the
//! three properties the simulation leans on:
//!
//! * enable bits flip through `&World`, so state machines built on
//!   enableable flags cost no structural change;
//! * systems can hold several columns mutably at once;
//! * structural changes only happen during [`CommandBuffer`](command::CommandBuffer)
//!   playback, with `&mut World`.
//!
//! # Quick Start
//!
//! ```
//! use survivors_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f32, z: f32 }
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Velocity { dx: f32, dz: f32 }
//!
//! survivors_ecs::component!(Position => "position", Velocity => "velocity");
//!
//! let mut world = World::new();
//! world.register::<Position>();
//! world.register::<Velocity>();
//!
//! let entity = world
//!     .spawn_bundle(
//!         ComponentBundle::new()
//!             .with(Position { x: 0.0, z: 0.0 })
//!             .with(Velocity { dx: 1.0, dz: 0.0 }),
//!     )
//!     .unwrap();
//!
//! {
//!     let velocities = world.read::<Velocity>();
//!     let mut positions = world.write::<Position>();
//!     for e in Query::new().with::<Position>().with::<Velocity>().iter(&world) {
//!         let (Some(v), Some(p)) = (velocities.get(e), positions.get_mut(e)) else { continue };
//!         p.x += v.dx;
//!         p.z += v.dz;
//!     }
//! }
//!
//! assert_eq!(world.get_cloned::<Position>(entity), Some(Position { x: 1.0, z: 0.0 }));
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod column;
pub mod command;
pub mod component;
pub mod entity;
pub mod query;
pub mod snapshot;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },

    /// A component name or type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    /// A component value failed to (de)serialize.
    #[error("failed to deserialize component '{component}': {details}")]
    ComponentDeserializationError { component: String, details: String },

    /// The entity is alive but lacks the component the operation needs.
    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: entity::EntityId,
        component: String,
    },

    #[error("component '{component}' is not a buffer")]
    NotABuffer { component: String },

    /// A column was already borrowed in a conflicting way.
    #[error("component column '{component}' is already borrowed")]
    ColumnBorrowed { component: String },

    /// A command referenced a pending entity whose spawn never happened or
    /// failed.
    #[error("pending entity #{pending} was never spawned in this buffer")]
    UnresolvedPending { pending: u32 },

    #[error("command #{command_index} has no target")]
    MissingTarget { command_index: u32 },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::column::Column;
    pub use crate::command::{
        ApplyReport, CausalReason, Command, CommandBuffer, CommandKind, CommandTarget,
        PendingEntity, SystemId,
    };
    pub use crate::component::{
        Buffer, BufferElement, Component, ComponentInfo, ComponentRegistry, ComponentTypeId,
    };
    pub use crate::entity::EntityId;
    pub use crate::query::{Query, QueryIter};
    pub use crate::snapshot::WorldSnapshot;
    pub use crate::world::{ComponentBundle, ComponentRecord, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
