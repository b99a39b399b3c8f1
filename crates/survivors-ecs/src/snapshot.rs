//! World snapshot, restore and state hashing.
//!
//! A [`WorldSnapshot`] is a fully serializable picture of the world: the
//! allocator (so entity ids keep their generations), every alive entity with
//! its components as JSON, and each component's enable bit. Entities and
//! components are stored in sorted order so two worlds with equal contents
//! produce byte-identical JSON, which is what [`WorldSnapshot::hash`] relies
//! on.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;
use crate::entity::{EntityAllocator, EntityId};
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Allocator state: generations, alive flags and the FIFO free list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorSnapshot {
    pub generations: Vec<u32>,
    pub alive: Vec<bool>,
    pub free_indices: Vec<u32>,
}

/// One component's serialized value and enable bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub value: serde_json::Value,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    /// Keyed by component name.
    pub components: BTreeMap<String, ComponentState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub allocator: AllocatorSnapshot,
    pub component_names: Vec<String>,
    /// Sorted by entity id.
    pub entities: Vec<EntitySnapshot>,
}

impl WorldSnapshot {
    /// blake3 digest of the snapshot's JSON encoding.
    pub fn hash(&self) -> Result<blake3::Hash, EcsError> {
        let bytes = serde_json::to_vec(self).map_err(|e| EcsError::ComponentDeserializationError {
            component: "__snapshot".to_owned(),
            details: e.to_string(),
        })?;
        Ok(blake3::hash(&bytes))
    }
}

// ---------------------------------------------------------------------------
// World snapshot/restore impl
// ---------------------------------------------------------------------------

impl World {
    /// Capture the whole world. Fails only if a component refuses to
    /// serialize.
    pub fn capture_snapshot(&self) -> Result<WorldSnapshot, EcsError> {
        let (generations, alive, free_indices) = self.allocator.snapshot_state();

        let mut ids: Vec<EntityId> = self.locations.keys().copied().collect();
        ids.sort_unstable();

        let mut entities = Vec::with_capacity(ids.len());
        for entity in ids {
            let Some(loc) = self.location(entity) else {
                continue;
            };
            let archetype = &self.archetypes[loc.archetype.0 as usize];
            let mut components = BTreeMap::new();
            for (column, type_id) in archetype.component_types().iter().enumerate() {
                let (name, value) = self.serialize_component(*type_id, entity)?;
                components.insert(
                    name.to_owned(),
                    ComponentState {
                        value,
                        enabled: archetype.is_enabled(loc.row, column),
                    },
                );
            }
            entities.push(EntitySnapshot {
                entity_id: entity,
                components,
            });
        }

        Ok(WorldSnapshot {
            allocator: AllocatorSnapshot {
                generations,
                alive,
                free_indices,
            },
            component_names: self
                .registry
                .registered_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            entities,
        })
    }

    fn serialize_component(
        &self,
        type_id: ComponentTypeId,
        entity: EntityId,
    ) -> Result<(&'static str, serde_json::Value), EcsError> {
        let name = self
            .registry
            .get_info(type_id)
            .map(|i| i.name)
            .unwrap_or("__unnamed");
        let column = self.columns[type_id.slot()]
            .try_borrow()
            .map_err(|_| EcsError::ColumnBorrowed {
                component: name.to_owned(),
            })?;
        match column.to_json(entity) {
            Some(Ok(value)) => Ok((name, value)),
            Some(Err(details)) => Err(EcsError::ComponentDeserializationError {
                component: name.to_owned(),
                details,
            }),
            None => Err(EcsError::MissingComponent {
                entity,
                component: name.to_owned(),
            }),
        }
    }

    /// blake3 hash of the current state. Equal worlds hash equal.
    pub fn state_hash(&self) -> Result<blake3::Hash, EcsError> {
        self.capture_snapshot()?.hash()
    }

    /// Replace the world's contents with `snapshot`.
    ///
    /// Every component named in the snapshot must already be registered.
    /// Names and allocator consistency are checked before anything is
    /// cleared.
    pub fn restore_from_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<(), EcsError> {
        // Validate allocator consistency before touching anything.
        let indices: HashSet<u32> = snapshot.entities.iter().map(|e| e.entity_id.index()).collect();
        for (idx, &is_alive) in snapshot.allocator.alive.iter().enumerate() {
            if is_alive != indices.contains(&(idx as u32)) {
                return Err(EcsError::ComponentDeserializationError {
                    component: "__allocator".to_owned(),
                    details: format!(
                        "allocator slot {idx} alive={is_alive} disagrees with entity data"
                    ),
                });
            }
        }
        for entity in &snapshot.entities {
            for name in entity.components.keys() {
                self.resolve_name(name)?;
            }
        }

        // Clear.
        for column in &mut self.columns {
            column.get_mut().clear();
        }
        for archetype in &mut self.archetypes {
            archetype.clear();
        }
        self.locations.clear();

        self.allocator = EntityAllocator::restore(
            snapshot.allocator.generations.clone(),
            snapshot.allocator.alive.clone(),
            snapshot.allocator.free_indices.clone(),
        );

        for entity_snapshot in &snapshot.entities {
            let entity = entity_snapshot.entity_id;
            let mut pairs: Vec<(ComponentTypeId, bool)> = Vec::new();
            for (name, state) in &entity_snapshot.components {
                let id = self.resolve_name(name)?;
                self.columns[id.slot()]
                    .get_mut()
                    .insert_json(entity, &state.value)
                    .map_err(|details| EcsError::ComponentDeserializationError {
                        component: name.clone(),
                        details,
                    })?;
                pairs.push((id, state.enabled));
            }
            self.place(entity, pairs);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
