//! Per-type component storage.
//!
//! Each registered component type owns one [`Column`]: a sparse set keyed by
//! entity slot index with values packed densely for iteration. Columns hold
//! values only; enable bits live in the archetype rows so they can be flipped
//! through a shared `&World` while columns are borrowed.

use std::any::Any;

use crate::component::{Buffer, BufferElement, Component};
use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// Sparse-set storage for one component type.
#[derive(Debug, Clone)]
pub struct Column<T> {
    dense: Vec<(EntityId, T)>,
    sparse: Vec<Option<u32>>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self {
            dense: Vec::new(),
            sparse: Vec::new(),
        }
    }
}

impl<T> Column<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn dense_index(&self, entity: EntityId) -> Option<usize> {
        let idx = (*self.sparse.get(entity.index() as usize)?)? as usize;
        // A recycled slot may still point at the previous generation's row.
        (self.dense[idx].0 == entity).then_some(idx)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.dense_index(entity).is_some()
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.dense_index(entity).map(|i| &self.dense[i].1)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.dense_index(entity).map(move |i| &mut self.dense[i].1)
    }

    /// Insert or overwrite. Returns the previous value, if any.
    pub(crate) fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        if let Some(i) = self.dense_index(entity) {
            return Some(std::mem::replace(&mut self.dense[i].1, value));
        }
        let slot = entity.index() as usize;
        if slot >= self.sparse.len() {
            self.sparse.resize(slot + 1, None);
        }
        self.sparse[slot] = Some(self.dense.len() as u32);
        self.dense.push((entity, value));
        None
    }

    pub(crate) fn remove(&mut self, entity: EntityId) -> Option<T> {
        let i = self.dense_index(entity)?;
        self.sparse[entity.index() as usize] = None;
        let (_, value) = self.dense.swap_remove(i);
        if let Some((moved, _)) = self.dense.get(i) {
            self.sparse[moved.index() as usize] = Some(i as u32);
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// All stored values in dense order, regardless of enable state.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.dense.iter().map(|(e, v)| (*e, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.dense.iter_mut().map(|(e, v)| (*e, v))
    }
}

// ---------------------------------------------------------------------------
// Type-erased access
// ---------------------------------------------------------------------------

/// Object-safe view of a column used by the world for name-driven operations
/// (command playback, snapshots, despawn).
pub(crate) trait AnyColumn: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove_entity(&mut self, entity: EntityId) -> bool;
    fn insert_json(&mut self, entity: EntityId, value: &serde_json::Value) -> Result<(), String>;
    fn to_json(&self, entity: EntityId) -> Option<Result<serde_json::Value, String>>;
    fn clear(&mut self);
}

impl<T: Component> AnyColumn for Column<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.remove(entity).is_some()
    }

    fn insert_json(&mut self, entity: EntityId, value: &serde_json::Value) -> Result<(), String> {
        let typed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        self.insert(entity, typed);
        Ok(())
    }

    fn to_json(&self, entity: EntityId) -> Option<Result<serde_json::Value, String>> {
        self.get(entity)
            .map(|v| serde_json::to_value(v).map_err(|e| e.to_string()))
    }

    fn clear(&mut self) {
        self.dense.clear();
        self.sparse.clear();
    }
}

/// Appends one JSON-encoded element to a `Buffer<E>` column.
pub(crate) type AppendFn =
    fn(&mut dyn AnyColumn, EntityId, &serde_json::Value) -> Result<bool, String>;

/// Monomorphized [`AppendFn`] for element type `E`. Returns `Ok(false)` when
/// the entity has no buffer of that type.
pub(crate) fn append_json<E: BufferElement>(
    column: &mut dyn AnyColumn,
    entity: EntityId,
    element: &serde_json::Value,
) -> Result<bool, String> {
    let element: E = serde_json::from_value(element.clone()).map_err(|e| e.to_string())?;
    let column = column
        .as_any_mut()
        .downcast_mut::<Column<Buffer<E>>>()
        .ok_or_else(|| format!("column for '{}' is not a buffer column", E::NAME))?;
    match column.get_mut(entity) {
        Some(buffer) => {
            buffer.push(element);
            Ok(true)
        }
        None => Ok(false),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
