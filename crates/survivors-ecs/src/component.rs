//! Component traits, dynamic buffers and type registration.
//!
//! Every component type carries a stable string name. The name is what the
//! [`CommandBuffer`](crate::command::CommandBuffer) records (component payloads
//! travel as JSON) and what snapshots key their data by, so it must be unique
//! across the world.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Component / BufferElement
// ---------------------------------------------------------------------------

/// Fixed-layout data attached to exactly one entity.
pub trait Component: Clone + Serialize + DeserializeOwned + 'static {
    /// Unique, stable name used by commands and snapshots.
    const NAME: &'static str;
}

/// Element type of a [`Buffer`].
pub trait BufferElement: Clone + Serialize + DeserializeOwned + 'static {
    /// Name under which `Buffer<Self>` is registered.
    const NAME: &'static str;
}

/// Implement [`Component`] for a list of types.
///
/// ```
/// # use serde::{Serialize, Deserialize};
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Speed(f32);
/// survivors_ecs::component!(Speed => "speed");
/// ```
#[macro_export]
macro_rules! component {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl $crate::component::Component for $ty {
                const NAME: &'static str = $name;
            }
        )*
    };
}

/// Implement [`BufferElement`] for a list of types.
#[macro_export]
macro_rules! buffer_element {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl $crate::component::BufferElement for $ty {
                const NAME: &'static str = $name;
            }
        )*
    };
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

/// Growable ordered sequence of elements attached to one entity.
///
/// A buffer is an ordinary component, so it can be enabled, snapshotted and
/// replaced wholesale through the command buffer like any other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent, bound = "E: Serialize + DeserializeOwned")]
pub struct Buffer<E>(Vec<E>);

impl<E> Buffer<E> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn into_inner(self) -> Vec<E> {
        self.0
    }
}

impl<E> Default for Buffer<E> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<E> From<Vec<E>> for Buffer<E> {
    fn from(v: Vec<E>) -> Self {
        Self(v)
    }
}

impl<E> FromIterator<E> for Buffer<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<E> Deref for Buffer<E> {
    type Target = Vec<E>;

    fn deref(&self) -> &Vec<E> {
        &self.0
    }
}

impl<E> DerefMut for Buffer<E> {
    fn deref_mut(&mut self) -> &mut Vec<E> {
        &mut self.0
    }
}

impl<E: BufferElement> Component for Buffer<E> {
    const NAME: &'static str = E::NAME;
}

// ---------------------------------------------------------------------------
// ComponentTypeId / ComponentInfo
// ---------------------------------------------------------------------------

/// Dense identifier assigned at registration time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

/// Metadata kept for each registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub id: ComponentTypeId,
    pub name: &'static str,
    pub type_id: TypeId,
    pub size: usize,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types and component names to [`ComponentTypeId`]s.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<&'static str, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, returning the existing id if it is already known.
    ///
    /// # Panics
    ///
    /// Panics if `T::NAME` is already taken by a different Rust type. Two
    /// component types sharing a name would make command playback ambiguous.
    pub fn register<T: Component>(&mut self) -> ComponentTypeId {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }
        if self.by_name.contains_key(T::NAME) {
            panic!(
                "component name '{}' is already registered for a different type",
                T::NAME
            );
        }
        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: T::NAME,
            type_id,
            size: std::mem::size_of::<T>(),
        });
        self.by_type.insert(type_id, id);
        self.by_name.insert(T::NAME, id);
        id
    }

    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn lookup_type_id(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.by_type.get(&type_id).copied()
    }

    /// Resolve a component name recorded in a command or snapshot.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.slot())
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Registered names, sorted. Used in error messages.
    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Speed(f32);

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Armor(i32);

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct ArmorImpostor(i32);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hit(u32);

    crate::component!(Speed => "speed", Armor => "armor", ArmorImpostor => "armor");
    crate::buffer_element!(Hit => "hits");

    #[test]
    fn registering_twice_returns_same_id() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register::<Speed>();
        let b = reg.register::<Speed>();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn lookup_by_type_and_name_agree() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Armor>();
        assert_eq!(reg.lookup::<Armor>(), Some(id));
        assert_eq!(reg.lookup_by_name("armor"), Some(id));
        assert_eq!(reg.get_info(id).map(|i| i.name), Some("armor"));
    }

    #[test]
    #[should_panic(expected = "already registered for a different type")]
    fn name_collision_panics() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Armor>();
        reg.register::<ArmorImpostor>();
    }

    #[test]
    fn buffer_takes_element_name() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Buffer<Hit>>();
        assert_eq!(reg.lookup_by_name("hits"), Some(id));
    }

    #[test]
    fn buffer_serializes_as_plain_array() {
        let buf: Buffer<Hit> = vec![Hit(1), Hit(2)].into();
        let json = serde_json::to_value(&buf).unwrap();
        assert_eq!(json, serde_json::json!([1, 2]));
        let back: Buffer<Hit> = serde_json::from_value(json).unwrap();
        assert_eq!(back, buf);
    }
}
