//! The [`World`] owns the entity allocator, the component registry, one
//! column per component type and the archetype table.
//!
//! # Borrowing model
//!
//! Systems receive `&World`. Through it they may:
//!
//! * read or write component *values* via [`World::read`] / [`World::write`]
//!   (each column sits behind its own `RefCell`, so different columns can be
//!   borrowed mutably at the same time);
//! * flip enable bits via [`World::set_enabled`];
//! * iterate [`Query`](crate::query::Query) results.
//!
//! Structural changes (spawn, despawn, insert, remove) need `&mut World`,
//! which only command-buffer playback and setup code hold. A system therefore
//! cannot invalidate the iteration it is part of.

use std::any::TypeId;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::archetype::{Archetype, ArchetypeId};
use crate::column::{append_json, AnyColumn, AppendFn, Column};
use crate::component::{BufferElement, Component, ComponentRegistry, ComponentTypeId};
use crate::component::Buffer;
use crate::entity::{EntityAllocator, EntityId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Entity location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub(crate) struct EntityLocation {
    pub archetype: ArchetypeId,
    pub row: usize,
}

// ---------------------------------------------------------------------------
// ComponentRecord / ComponentBundle
// ---------------------------------------------------------------------------

/// A serialized component value plus its enable bit.
///
/// This is the unit that spawn commands, bundles and snapshots carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: String,
    pub value: serde_json::Value,
    pub enabled: bool,
}

/// The full component set of an entity-to-be.
///
/// ```
/// use survivors_ecs::prelude::*;
/// # use serde::{Serialize, Deserialize};
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Hp(i32);
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Stunned;
/// survivors_ecs::component!(Hp => "hp", Stunned => "stunned");
///
/// let mut world = World::new();
/// world.register::<Hp>();
/// world.register::<Stunned>();
/// let e = world
///     .spawn_bundle(ComponentBundle::new().with(Hp(10)).with_disabled(Stunned))
///     .unwrap();
/// assert_eq!(world.get::<Hp>(e).as_deref(), Some(&Hp(10)));
/// assert!(world.has::<Stunned>(e));
/// assert!(!world.is_enabled::<Stunned>(e));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ComponentBundle {
    records: Vec<ComponentRecord>,
}

impl ComponentBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an enabled component.
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.add(value, true);
        self
    }

    /// Add a component whose enable bit starts cleared.
    pub fn with_disabled<T: Component>(mut self, value: T) -> Self {
        self.add(value, false);
        self
    }

    /// Add a component in place. A value that fails to serialize is logged
    /// and left out of the bundle.
    pub fn add<T: Component>(&mut self, value: T, enabled: bool) -> &mut Self {
        match serde_json::to_value(&value) {
            Ok(value) => {
                self.records.retain(|r| r.name != T::NAME);
                self.records.push(ComponentRecord {
                    name: T::NAME.to_owned(),
                    value,
                    enabled,
                });
            }
            Err(e) => tracing::warn!(
                component = T::NAME,
                error = %e,
                "component failed to serialize; left out of bundle"
            ),
        }
        self
    }

    pub fn records(&self) -> &[ComponentRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ComponentRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Entity/component store.
pub struct World {
    pub(crate) allocator: EntityAllocator,
    pub(crate) registry: ComponentRegistry,
    pub(crate) columns: Vec<RefCell<Box<dyn AnyColumn>>>,
    appenders: HashMap<ComponentTypeId, AppendFn>,
    pub(crate) archetypes: Vec<Archetype>,
    archetype_index: HashMap<Vec<ComponentTypeId>, ArchetypeId>,
    pub(crate) locations: HashMap<EntityId, EntityLocation>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.locations.len())
            .field("archetype_count", &self.archetypes.len())
            .field("component_types", &self.registry.len())
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            columns: Vec::new(),
            appenders: HashMap::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type and create its column.
    pub fn register<T: Component>(&mut self) -> ComponentTypeId {
        let id = self.registry.register::<T>();
        if id.slot() == self.columns.len() {
            self.columns.push(RefCell::new(Box::new(Column::<T>::new())));
        }
        id
    }

    /// Register `Buffer<E>` and enable name-driven appends for it.
    pub fn register_buffer<E: BufferElement>(&mut self) -> ComponentTypeId {
        let id = self.register::<Buffer<E>>();
        self.appenders.insert(id, append_json::<E>);
        id
    }

    // -- archetypes ---------------------------------------------------------

    fn get_or_create_archetype(&mut self, types: &[ComponentTypeId]) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(types) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetypes.push(Archetype::new(id, types.to_vec()));
        self.archetype_index.insert(types.to_vec(), id);
        id
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.locations.get(&entity).copied()
    }

    /// Move a row into the archetype for `types`, carrying `bits` along.
    pub(crate) fn place(&mut self, entity: EntityId, mut pairs: Vec<(ComponentTypeId, bool)>) {
        pairs.sort_by_key(|(id, _)| *id);
        let types: Vec<ComponentTypeId> = pairs.iter().map(|(id, _)| *id).collect();
        let bits: Vec<bool> = pairs.iter().map(|(_, b)| *b).collect();
        let archetype = self.get_or_create_archetype(&types);
        let row = self.archetypes[archetype.0 as usize].push(entity, &bits);
        self.locations.insert(entity, EntityLocation { archetype, row });
    }

    /// Take an entity's row out of its archetype. Returns its (type, bit) pairs.
    fn unplace(&mut self, entity: EntityId, loc: EntityLocation) -> Vec<(ComponentTypeId, bool)> {
        let archetype = &mut self.archetypes[loc.archetype.0 as usize];
        let types = archetype.component_types().to_vec();
        let (bits, moved) = archetype.swap_remove(loc.row);
        if let Some(moved) = moved {
            if let Some(moved_loc) = self.locations.get_mut(&moved) {
                moved_loc.row = loc.row;
            }
        }
        self.locations.remove(&entity);
        types.into_iter().zip(bits).collect()
    }

    fn migrate(
        &mut self,
        entity: EntityId,
        loc: EntityLocation,
        add: Option<(ComponentTypeId, bool)>,
        remove: Option<ComponentTypeId>,
    ) {
        let mut pairs = self.unplace(entity, loc);
        if let Some(removed) = remove {
            pairs.retain(|(id, _)| *id != removed);
        }
        if let Some(added) = add {
            pairs.push(added);
        }
        self.place(entity, pairs);
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Spawn an entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        let entity = self.allocator.allocate();
        self.place(entity, Vec::new());
        entity
    }

    /// Spawn an entity holding a single enabled component.
    pub fn spawn_with<T: Component>(&mut self, value: T) -> EntityId {
        let id = self.register::<T>();
        let entity = self.allocator.allocate();
        self.column_exclusive::<T>(id).insert(entity, value);
        self.place(entity, vec![(id, true)]);
        entity
    }

    pub fn spawn_bundle(&mut self, bundle: ComponentBundle) -> Result<EntityId, EcsError> {
        self.spawn_records(bundle.records())
    }

    /// Spawn from serialized records, placing the entity directly into its
    /// final archetype. Either every record is stored or the spawn fails and
    /// no entity is allocated.
    pub fn spawn_records(&mut self, records: &[ComponentRecord]) -> Result<EntityId, EcsError> {
        let mut resolved: BTreeMap<ComponentTypeId, &ComponentRecord> = BTreeMap::new();
        for record in records {
            let id = self.resolve_name(&record.name)?;
            resolved.insert(id, record);
        }

        let entity = self.allocator.allocate();
        for (index, (id, record)) in resolved.iter().enumerate() {
            let stored = self.columns[id.slot()]
                .get_mut()
                .insert_json(entity, &record.value);
            if let Err(details) = stored {
                for (undo, _) in resolved.iter().take(index) {
                    self.columns[undo.slot()].get_mut().remove_entity(entity);
                }
                self.allocator.deallocate(entity);
                return Err(EcsError::ComponentDeserializationError {
                    component: record.name.clone(),
                    details,
                });
            }
        }
        let pairs = resolved.iter().map(|(id, r)| (*id, r.enabled)).collect();
        self.place(entity, pairs);
        Ok(entity)
    }

    /// Destroy an entity and drop all of its components.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let loc = self
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })?;
        for (id, _) in self.unplace(entity, loc) {
            self.columns[id.slot()].get_mut().remove_entity(entity);
        }
        self.allocator.deallocate(entity);
        Ok(())
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // -- structural component changes ---------------------------------------

    /// Add or overwrite a component. A newly added component starts enabled;
    /// overwriting keeps the current enable bit.
    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError> {
        self.insert_with_state(entity, value, true)
    }

    /// Like [`insert`](Self::insert) but a newly added component starts disabled.
    pub fn insert_disabled<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), EcsError> {
        self.insert_with_state(entity, value, false)
    }

    fn insert_with_state<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
        enabled: bool,
    ) -> Result<(), EcsError> {
        let id = self.register::<T>();
        let loc = self
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })?;
        self.column_exclusive::<T>(id).insert(entity, value);
        if !self.archetypes[loc.archetype.0 as usize].has_component(id) {
            self.migrate(entity, loc, Some((id, enabled)), None);
        }
        Ok(())
    }

    /// Name-driven insert used by command playback. `enabled: None` keeps the
    /// existing bit, or enables a newly added component.
    pub fn insert_json(
        &mut self,
        entity: EntityId,
        name: &str,
        value: &serde_json::Value,
        enabled: Option<bool>,
    ) -> Result<(), EcsError> {
        let id = self.resolve_name(name)?;
        let loc = self
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })?;
        self.columns[id.slot()]
            .get_mut()
            .insert_json(entity, value)
            .map_err(|details| EcsError::ComponentDeserializationError {
                component: name.to_owned(),
                details,
            })?;
        let archetype = &self.archetypes[loc.archetype.0 as usize];
        match archetype.column_of(id) {
            Some(column) => {
                if let Some(enabled) = enabled {
                    archetype.set_enabled(loc.row, column, enabled);
                }
            }
            None => self.migrate(entity, loc, Some((id, enabled.unwrap_or(true))), None),
        }
        Ok(())
    }

    /// Remove a component. Returns `Ok(false)` if the entity did not have it.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> Result<bool, EcsError> {
        match self.registry.lookup::<T>() {
            Some(id) => self.remove_by_id(entity, id),
            None if self.is_alive(entity) => Ok(false),
            None => Err(EcsError::StaleEntity { entity }),
        }
    }

    pub fn remove_by_name(&mut self, entity: EntityId, name: &str) -> Result<bool, EcsError> {
        let id = self.resolve_name(name)?;
        self.remove_by_id(entity, id)
    }

    fn remove_by_id(&mut self, entity: EntityId, id: ComponentTypeId) -> Result<bool, EcsError> {
        let loc = self
            .location(entity)
            .ok_or(EcsError::StaleEntity { entity })?;
        if !self.archetypes[loc.archetype.0 as usize].has_component(id) {
            return Ok(false);
        }
        self.columns[id.slot()].get_mut().remove_entity(entity);
        self.migrate(entity, loc, None, Some(id));
        Ok(true)
    }

    // -- component access ---------------------------------------------------

    /// Shared access to one component.
    ///
    /// # Panics
    ///
    /// Panics if `T`'s column is currently borrowed mutably.
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<Ref<'_, T>> {
        let id = self.registry.lookup::<T>()?;
        let guard = self.borrow_column(id, T::NAME);
        Ref::filter_map(guard, |c| {
            c.as_any()
                .downcast_ref::<Column<T>>()
                .and_then(|col| col.get(entity))
        })
        .ok()
    }

    /// Exclusive access to one component without a runtime borrow.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let id = self.registry.lookup::<T>()?;
        self.columns[id.slot()]
            .get_mut()
            .as_any_mut()
            .downcast_mut::<Column<T>>()?
            .get_mut(entity)
    }

    /// Copy of a component value.
    pub fn get_cloned<T: Component>(&self, entity: EntityId) -> Option<T> {
        self.get::<T>(entity).map(|r| r.clone())
    }

    /// `true` if the entity has `T`, enabled or not.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        match (self.registry.lookup::<T>(), self.location(entity)) {
            (Some(id), Some(loc)) => self.archetypes[loc.archetype.0 as usize].has_component(id),
            _ => false,
        }
    }

    /// `true` if the entity has `T` and its enable bit is set.
    pub fn is_enabled<T: Component>(&self, entity: EntityId) -> bool {
        let (Some(id), Some(loc)) = (self.registry.lookup::<T>(), self.location(entity)) else {
            return false;
        };
        let archetype = &self.archetypes[loc.archetype.0 as usize];
        archetype
            .column_of(id)
            .is_some_and(|column| archetype.is_enabled(loc.row, column))
    }

    /// Flip the enable bit of `T`. Not a structural change, so callable from
    /// a system holding `&World`. Returns `false` if the entity lacks `T`.
    pub fn set_enabled<T: Component>(&self, entity: EntityId, enabled: bool) -> bool {
        match self.registry.lookup::<T>() {
            Some(id) => self.set_enabled_by_id(entity, id, enabled),
            None => false,
        }
    }

    pub fn set_enabled_by_name(
        &self,
        entity: EntityId,
        name: &str,
        enabled: bool,
    ) -> Result<(), EcsError> {
        let id = self.resolve_name(name)?;
        if !self.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        if self.set_enabled_by_id(entity, id, enabled) {
            Ok(())
        } else {
            Err(EcsError::MissingComponent {
                entity,
                component: name.to_owned(),
            })
        }
    }

    fn set_enabled_by_id(&self, entity: EntityId, id: ComponentTypeId, enabled: bool) -> bool {
        let Some(loc) = self.location(entity) else {
            return false;
        };
        let archetype = &self.archetypes[loc.archetype.0 as usize];
        match archetype.column_of(id) {
            Some(column) => {
                archetype.set_enabled(loc.row, column, enabled);
                true
            }
            None => false,
        }
    }

    /// Append an element to an entity's `Buffer<E>`. Returns `false` if the
    /// entity has no such buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer column is already borrowed.
    pub fn append<E: BufferElement>(&self, entity: EntityId, element: E) -> bool {
        if self.registry.lookup::<Buffer<E>>().is_none() {
            return false;
        }
        match self.write::<Buffer<E>>().get_mut(entity) {
            Some(buffer) => {
                buffer.push(element);
                true
            }
            None => false,
        }
    }

    /// Name-driven append used by command playback.
    pub fn append_by_name(
        &self,
        entity: EntityId,
        name: &str,
        element: &serde_json::Value,
    ) -> Result<(), EcsError> {
        let id = self.resolve_name(name)?;
        let append = self
            .appenders
            .get(&id)
            .ok_or_else(|| EcsError::NotABuffer {
                component: name.to_owned(),
            })?;
        if !self.is_alive(entity) {
            return Err(EcsError::StaleEntity { entity });
        }
        let mut column = self.columns[id.slot()]
            .try_borrow_mut()
            .map_err(|_| EcsError::ColumnBorrowed {
                component: name.to_owned(),
            })?;
        match append(&mut **column, entity, element) {
            Ok(true) => Ok(()),
            Ok(false) => Err(EcsError::MissingComponent {
                entity,
                component: name.to_owned(),
            }),
            Err(details) => Err(EcsError::ComponentDeserializationError {
                component: name.to_owned(),
                details,
            }),
        }
    }

    // -- column access ------------------------------------------------------

    /// Shared borrow of `T`'s column.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered or the column is borrowed mutably.
    pub fn read<T: Component>(&self) -> Ref<'_, Column<T>> {
        match self.try_read::<T>() {
            Ok(column) => column,
            Err(e) => panic!("{e}"),
        }
    }

    /// Mutable borrow of `T`'s column. Other columns stay available.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered or the column is already borrowed.
    pub fn write<T: Component>(&self) -> RefMut<'_, Column<T>> {
        match self.try_write::<T>() {
            Ok(column) => column,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_read<T: Component>(&self) -> Result<Ref<'_, Column<T>>, EcsError> {
        let id = self.lookup_registered::<T>()?;
        let guard = self.columns[id.slot()]
            .try_borrow()
            .map_err(|_| EcsError::ColumnBorrowed {
                component: T::NAME.to_owned(),
            })?;
        Ref::filter_map(guard, |c| c.as_any().downcast_ref::<Column<T>>()).map_err(|_| {
            EcsError::UnknownComponent {
                name: T::NAME.to_owned(),
                registered: self.registry.registered_names().join(", "),
            }
        })
    }

    pub fn try_write<T: Component>(&self) -> Result<RefMut<'_, Column<T>>, EcsError> {
        let id = self.lookup_registered::<T>()?;
        let guard = self.columns[id.slot()]
            .try_borrow_mut()
            .map_err(|_| EcsError::ColumnBorrowed {
                component: T::NAME.to_owned(),
            })?;
        RefMut::filter_map(guard, |c| c.as_any_mut().downcast_mut::<Column<T>>()).map_err(|_| {
            EcsError::UnknownComponent {
                name: T::NAME.to_owned(),
                registered: self.registry.registered_names().join(", "),
            }
        })
    }

    // -- helpers ------------------------------------------------------------

    fn lookup_registered<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent {
                name: T::NAME.to_owned(),
                registered: self.registry.registered_names().join(", "),
            })
    }

    pub(crate) fn resolve_name(&self, name: &str) -> Result<ComponentTypeId, EcsError> {
        self.registry
            .lookup_by_name(name)
            .ok_or_else(|| EcsError::UnknownComponent {
                name: name.to_owned(),
                registered: self.registry.registered_names().join(", "),
            })
    }

    pub(crate) fn resolve_type_id(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.registry.lookup_type_id(type_id)
    }

    fn borrow_column(&self, id: ComponentTypeId, name: &str) -> Ref<'_, Box<dyn AnyColumn>> {
        match self.columns[id.slot()].try_borrow() {
            Ok(guard) => guard,
            Err(_) => panic!("column '{name}' is already mutably borrowed"),
        }
    }

    fn column_exclusive<T: Component>(&mut self, id: ComponentTypeId) -> &mut Column<T> {
        match self.columns[id.slot()]
            .get_mut()
            .as_any_mut()
            .downcast_mut::<Column<T>>()
        {
            Some(column) => column,
            None => unreachable!("column {id:?} does not store {}", T::NAME),
        }
    }

    /// Names of every component the entity carries.
    pub fn component_names(&self, entity: EntityId) -> Vec<&'static str> {
        let Some(loc) = self.location(entity) else {
            return Vec::new();
        };
        self.archetypes[loc.archetype.0 as usize]
            .component_types()
            .iter()
            .filter_map(|id| self.registry.get_info(*id).map(|i| i.name))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
