//! Archetype grouping and per-row enable bits.
//!
//! An [`Archetype`] groups every entity that has exactly the same set of
//! component types. Queries match archetypes first and only then look at
//! individual rows, so an entity with no `Enemy` component is never visited by
//! an enemy query.
//!
//! Each row stores one enable bit per component type in a [`Cell`], which is
//! what makes enableable components cheap: toggling a flag is a value write
//! through a shared reference, not an archetype move.

use std::cell::Cell;

use crate::component::ComponentTypeId;
use crate::entity::EntityId;

/// Index into the world's archetype list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

/// One group of entities sharing a component-type signature.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    /// Sorted component types.
    types: Vec<ComponentTypeId>,
    entities: Vec<EntityId>,
    /// Row-major enable bits: `enabled[row * types.len() + column]`.
    enabled: Vec<Cell<bool>>,
}

impl Archetype {
    pub(crate) fn new(id: ArchetypeId, types: Vec<ComponentTypeId>) -> Self {
        debug_assert!(types.windows(2).all(|w| w[0] < w[1]), "types must be sorted");
        Self {
            id,
            types,
            entities: Vec::new(),
            enabled: Vec::new(),
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn component_types(&self) -> &[ComponentTypeId] {
        &self.types
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Position of `type_id` in this archetype's signature.
    pub(crate) fn column_of(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.types.binary_search(&type_id).ok()
    }

    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.column_of(type_id).is_some()
    }

    /// Append a row. `bits` must be in signature order.
    pub(crate) fn push(&mut self, entity: EntityId, bits: &[bool]) -> usize {
        debug_assert_eq!(bits.len(), self.types.len());
        self.entities.push(entity);
        self.enabled.extend(bits.iter().map(|b| Cell::new(*b)));
        self.entities.len() - 1
    }

    /// Remove a row by swapping the last row into its place.
    ///
    /// Returns the removed row's enable bits and the entity that moved into
    /// `row`, if any, so the caller can fix up its location.
    pub(crate) fn swap_remove(&mut self, row: usize) -> (Vec<bool>, Option<EntityId>) {
        let width = self.types.len();
        let bits: Vec<bool> = self.row_bits(row);
        let last = self.entities.len() - 1;
        if row != last {
            for c in 0..width {
                let moved = self.enabled[last * width + c].get();
                self.enabled[row * width + c].set(moved);
            }
        }
        self.enabled.truncate(last * width);
        self.entities.swap_remove(row);
        let moved = (row != last).then(|| self.entities[row]);
        (bits, moved)
    }

    pub(crate) fn clear(&mut self) {
        self.entities.clear();
        self.enabled.clear();
    }

    pub(crate) fn row_bits(&self, row: usize) -> Vec<bool> {
        let width = self.types.len();
        self.enabled[row * width..(row + 1) * width]
            .iter()
            .map(Cell::get)
            .collect()
    }

    #[inline]
    pub(crate) fn is_enabled(&self, row: usize, column: usize) -> bool {
        self.enabled[row * self.types.len() + column].get()
    }

    #[inline]
    pub(crate) fn set_enabled(&self, row: usize, column: usize, enabled: bool) {
        self.enabled[row * self.types.len() + column].set(enabled);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
