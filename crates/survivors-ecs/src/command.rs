//! Command buffer with causality metadata for deferred ECS mutations.
//!
//! Systems see the world through `&World`, so every structural change
//! (spawn, despawn, add or remove a component) is recorded here and played
//! back after the system returns. Each command carries the [`SystemId`] that
//! issued it and a [`CausalReason`], which end up in the apply log.
//!
//! Component values travel as [`serde_json::Value`] keyed by component name,
//! the same form snapshots use.
//!
//! Spawns return a [`PendingEntity`] so later commands in the same buffer can
//! target the entity before it exists:
//!
//! ```
//! use survivors_ecs::prelude::*;
//! # use serde::{Serialize, Deserialize};
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Health(u32);
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Burning;
//! survivors_ecs::component!(Health => "health", Burning => "burning");
//!
//! let mut world = World::new();
//! world.register::<Health>();
//! world.register::<Burning>();
//!
//! let mut cmds = CommandBuffer::new();
//! let pending = cmds.spawn(
//!     ComponentBundle::new().with(Health(100)),
//!     SystemId(0),
//!     CausalReason::rule("spawned"),
//! );
//! cmds.set_component(pending, &Burning, SystemId(0), CausalReason::rule("ignited"));
//!
//! let applied = cmds.apply(&mut world);
//! let entity = applied[0].spawned_entity.unwrap();
//! assert_eq!(world.get_cloned::<Health>(entity), Some(Health(100)));
//! assert!(world.is_enabled::<Burning>(entity));
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::component::{BufferElement, Component};
use crate::entity::EntityId;
use crate::world::{ComponentBundle, ComponentRecord, World};
use crate::EcsError;

// ---------------------------------------------------------------------------
// SystemId / CausalReason
// ---------------------------------------------------------------------------

/// Identifies the system that issued a command.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(pub u32);

impl SystemId {
    /// Commands issued by setup code and the engine itself.
    pub const ENGINE: SystemId = SystemId(u32::MAX);
}

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemId({})", self.0)
    }
}

/// Why a command was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CausalReason {
    /// Caused by player input.
    PlayerInput(String),
    /// Caused by an overlap between two entities.
    CollisionResponse(EntityId, EntityId),
    /// Caused by a game rule (e.g. "projectile_expired").
    GameRule(String),
    /// Caused by a state transition.
    StateTransition { from: String, to: String },
    /// Caused by a timer firing.
    Timer(String),
    /// Internal bookkeeping. Prefer a more specific variant.
    SystemInternal(String),
}

impl CausalReason {
    pub fn rule(name: impl Into<String>) -> Self {
        Self::GameRule(name.into())
    }

    pub fn timer(name: impl Into<String>) -> Self {
        Self::Timer(name.into())
    }

    pub fn internal(name: impl Into<String>) -> Self {
        Self::SystemInternal(name.into())
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Handle to an entity spawned earlier in the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingEntity(u32);

/// What a non-spawn command acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandTarget {
    Entity(EntityId),
    Pending(PendingEntity),
}

impl From<EntityId> for CommandTarget {
    fn from(e: EntityId) -> Self {
        Self::Entity(e)
    }
}

impl From<PendingEntity> for CommandTarget {
    fn from(p: PendingEntity) -> Self {
        Self::Pending(p)
    }
}

// ---------------------------------------------------------------------------
// CommandKind / Command
// ---------------------------------------------------------------------------

/// The mutation a command performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandKind {
    /// Create an entity with exactly these components.
    Spawn {
        pending: PendingEntity,
        components: Vec<ComponentRecord>,
    },
    /// Insert or overwrite a component. `enabled: None` keeps the current
    /// enable bit (a newly added component starts enabled).
    SetComponent {
        component_name: String,
        value: serde_json::Value,
        enabled: Option<bool>,
    },
    RemoveComponent { component_name: String },
    /// Flip an enable bit.
    SetEnabled {
        component_name: String,
        enabled: bool,
    },
    /// Push one element onto a dynamic buffer.
    AppendToBuffer {
        component_name: String,
        element: serde_json::Value,
    },
    Despawn,
}

impl CommandKind {
    fn component_name(&self) -> Option<&str> {
        match self {
            CommandKind::SetComponent { component_name, .. }
            | CommandKind::RemoveComponent { component_name }
            | CommandKind::SetEnabled { component_name, .. } => Some(component_name),
            _ => None,
        }
    }
}

/// A single deferred mutation with its causality metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// `None` for spawn commands.
    pub target: Option<CommandTarget>,
    pub kind: CommandKind,
    pub issued_by: SystemId,
    pub reason: CausalReason,
    /// Sequential index within the buffer.
    pub command_index: u32,
    /// Set by [`CommandBuffer::apply`] on spawn commands.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub spawned_entity: Option<EntityId>,
    #[serde(default)]
    pub applied_successfully: bool,
}

// ---------------------------------------------------------------------------
// ApplyReport
// ---------------------------------------------------------------------------

/// Summary of the last [`CommandBuffer::apply`] call.
///
/// `conflict_count` counts (target, component) pairs written by more than one
/// command. Later commands win, so conflicts are logged, not rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub conflict_count: usize,
    pub failed_count: usize,
    pub success_count: usize,
}

// ---------------------------------------------------------------------------
// CommandBuffer
// ---------------------------------------------------------------------------

/// Records commands and plays them back in insertion order.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_index: u32,
    next_pending: u32,
    last_apply_report: ApplyReport,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an entity spawn.
    pub fn spawn(
        &mut self,
        bundle: ComponentBundle,
        issued_by: SystemId,
        reason: CausalReason,
    ) -> PendingEntity {
        let pending = PendingEntity(self.next_pending);
        self.next_pending += 1;
        self.push(
            None,
            CommandKind::Spawn {
                pending,
                components: bundle.into_records(),
            },
            issued_by,
            reason,
        );
        pending
    }

    /// Queue an insert-or-overwrite of `T`.
    pub fn set_component<T: Component>(
        &mut self,
        target: impl Into<CommandTarget>,
        value: &T,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        self.set_component_with_state(target, value, None, issued_by, reason);
    }

    /// Queue an insert of `T` with an explicit enable bit.
    pub fn set_component_with_state<T: Component>(
        &mut self,
        target: impl Into<CommandTarget>,
        value: &T,
        enabled: Option<bool>,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        let Some(value) = encode(T::NAME, value) else {
            return;
        };
        self.push(
            Some(target.into()),
            CommandKind::SetComponent {
                component_name: T::NAME.to_owned(),
                value,
                enabled,
            },
            issued_by,
            reason,
        );
    }

    /// Name-driven variant of [`set_component`](Self::set_component).
    pub fn set_component_json(
        &mut self,
        target: impl Into<CommandTarget>,
        component_name: &str,
        value: serde_json::Value,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        self.push(
            Some(target.into()),
            CommandKind::SetComponent {
                component_name: component_name.to_owned(),
                value,
                enabled: None,
            },
            issued_by,
            reason,
        );
    }

    pub fn remove_component<T: Component>(
        &mut self,
        target: impl Into<CommandTarget>,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        self.push(
            Some(target.into()),
            CommandKind::RemoveComponent {
                component_name: T::NAME.to_owned(),
            },
            issued_by,
            reason,
        );
    }

    pub fn set_enabled<T: Component>(
        &mut self,
        target: impl Into<CommandTarget>,
        enabled: bool,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        self.push(
            Some(target.into()),
            CommandKind::SetEnabled {
                component_name: T::NAME.to_owned(),
                enabled,
            },
            issued_by,
            reason,
        );
    }

    pub fn append_to_buffer<E: BufferElement>(
        &mut self,
        target: impl Into<CommandTarget>,
        element: &E,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        let Some(element) = encode(E::NAME, element) else {
            return;
        };
        self.push(
            Some(target.into()),
            CommandKind::AppendToBuffer {
                component_name: E::NAME.to_owned(),
                element,
            },
            issued_by,
            reason,
        );
    }

    pub fn despawn(
        &mut self,
        target: impl Into<CommandTarget>,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        self.push(Some(target.into()), CommandKind::Despawn, issued_by, reason);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Report from the last [`apply`](Self::apply) call; all zero before the
    /// first one.
    pub fn last_apply_report(&self) -> &ApplyReport {
        &self.last_apply_report
    }

    /// Apply every command in insertion order and clear the buffer.
    ///
    /// A command that fails (stale target, unknown component, bad payload)
    /// is logged and skipped; the rest still apply. All commands are returned
    /// with `applied_successfully` and `spawned_entity` filled in.
    pub fn apply(&mut self, world: &mut World) -> Vec<Command> {
        let mut commands = std::mem::take(&mut self.commands);
        self.next_index = 0;
        self.next_pending = 0;

        // --- Conflict detection ---
        let mut seen: HashMap<(CommandTarget, &str), Vec<u32>> = HashMap::new();
        for cmd in &commands {
            if let (Some(target), Some(name)) = (cmd.target, cmd.kind.component_name()) {
                seen.entry((target, name))
                    .or_default()
                    .push(cmd.command_index);
            }
        }
        let mut conflict_count = 0;
        for ((target, component), indices) in &seen {
            if indices.len() > 1 {
                conflict_count += 1;
                tracing::debug!(
                    target = ?target,
                    component = %component,
                    command_indices = ?indices,
                    "{} commands target the same entity+component (last write wins)",
                    indices.len()
                );
            }
        }
        drop(seen);

        // --- Apply loop ---
        let mut pending: Vec<Option<EntityId>> = Vec::new();
        let mut success_count = 0;
        let mut failed_count = 0;

        for cmd in &mut commands {
            let result = apply_one(world, cmd, &mut pending);
            match result {
                Ok(()) => {
                    cmd.applied_successfully = true;
                    success_count += 1;
                }
                Err(e) => {
                    failed_count += 1;
                    warn!(
                        command_index = cmd.command_index,
                        target = ?cmd.target,
                        system_id = cmd.issued_by.0,
                        reason = ?cmd.reason,
                        error = %e,
                        "command application failed"
                    );
                }
            }
        }

        self.last_apply_report = ApplyReport {
            conflict_count,
            failed_count,
            success_count,
        };
        commands
    }

    /// Push a pre-built command, reassigning its index.
    pub fn push_raw(&mut self, mut cmd: Command) {
        cmd.command_index = self.next_index;
        self.next_index += 1;
        self.commands.push(cmd);
    }

    /// Drop all queued commands without applying them.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.next_index = 0;
        self.next_pending = 0;
    }

    // -- internal helpers ---------------------------------------------------

    fn push(
        &mut self,
        target: Option<CommandTarget>,
        kind: CommandKind,
        issued_by: SystemId,
        reason: CausalReason,
    ) {
        let command_index = self.next_index;
        self.next_index += 1;
        self.commands.push(Command {
            target,
            kind,
            issued_by,
            reason,
            command_index,
            spawned_entity: None,
            applied_successfully: false,
        });
    }
}

fn encode<T: Serialize>(name: &str, value: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(component = name, error = %e, "component failed to serialize; command dropped");
            None
        }
    }
}

fn resolve(target: CommandTarget, pending: &[Option<EntityId>]) -> Result<EntityId, EcsError> {
    match target {
        CommandTarget::Entity(e) => Ok(e),
        CommandTarget::Pending(p) => pending
            .get(p.0 as usize)
            .copied()
            .flatten()
            .ok_or(EcsError::UnresolvedPending { pending: p.0 }),
    }
}

fn apply_one(
    world: &mut World,
    cmd: &mut Command,
    pending: &mut Vec<Option<EntityId>>,
) -> Result<(), EcsError> {
    if let CommandKind::Spawn {
        pending: handle,
        components,
    } = &cmd.kind
    {
        let slot = handle.0 as usize;
        if pending.len() <= slot {
            pending.resize(slot + 1, None);
        }
        let entity = world.spawn_records(components)?;
        pending[slot] = Some(entity);
        cmd.spawned_entity = Some(entity);
        return Ok(());
    }

    let target = cmd.target.ok_or(EcsError::MissingTarget {
        command_index: cmd.command_index,
    })?;
    let entity = resolve(target, pending)?;
    match &cmd.kind {
        CommandKind::SetComponent {
            component_name,
            value,
            enabled,
        } => world.insert_json(entity, component_name, value, *enabled),
        CommandKind::RemoveComponent { component_name } => {
            world.remove_by_name(entity, component_name).map(|_| ())
        }
        CommandKind::SetEnabled {
            component_name,
            enabled,
        } => world.set_enabled_by_name(entity, component_name, *enabled),
        CommandKind::AppendToBuffer {
            component_name,
            element,
        } => world.append_by_name(entity, component_name, element),
        CommandKind::Despawn => world.despawn(entity),
        CommandKind::Spawn { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
