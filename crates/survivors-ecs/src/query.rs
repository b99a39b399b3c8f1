//! Entity queries over component presence and enable state.
//!
//! A [`Query`] is a list of terms built up front and evaluated lazily against
//! a [`World`]:
//!
//! | term                 | matches an entity that ...                  |
//! |----------------------|---------------------------------------------|
//! | `with::<T>()`        | has `T` and `T` is enabled                  |
//! | `with_disabled::<T>()` | has `T` and `T` is disabled               |
//! | `with_present::<T>()`  | has `T`, enabled or not                   |
//! | `without::<T>()`     | lacks `T`, or has it disabled               |
//!
//! Queries yield [`EntityId`]s only. Component values are read through the
//! world's column borrows, which keeps a query usable while any combination
//! of columns is borrowed.
//!
//! Iteration is restartable: calling [`Query::iter`] again re-evaluates the
//! terms against the world as it is now.

use std::any::TypeId;

use crate::archetype::Archetype;
use crate::component::{Component, ComponentTypeId};
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Enabled,
    Disabled,
    Present,
    Without,
}

#[derive(Debug, Clone, Copy)]
struct Term {
    type_id: TypeId,
    name: &'static str,
    access: Access,
}

/// Filter over component presence and enable bits.
#[derive(Debug, Clone, Default)]
pub struct Query {
    terms: Vec<Term>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    fn term<T: Component>(mut self, access: Access) -> Self {
        self.terms.push(Term {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
            access,
        });
        self
    }

    /// Require `T` present and enabled.
    pub fn with<T: Component>(self) -> Self {
        self.term::<T>(Access::Enabled)
    }

    /// Require `T` present and disabled.
    pub fn with_disabled<T: Component>(self) -> Self {
        self.term::<T>(Access::Disabled)
    }

    /// Require `T` present regardless of its enable bit.
    pub fn with_present<T: Component>(self) -> Self {
        self.term::<T>(Access::Present)
    }

    /// Require `T` absent or disabled.
    pub fn without<T: Component>(self) -> Self {
        self.term::<T>(Access::Without)
    }

    /// Names of the components this query mentions, for diagnostics.
    pub fn component_names(&self) -> Vec<&'static str> {
        self.terms.iter().map(|t| t.name).collect()
    }

    /// Start a lazy pass over the matching entities.
    pub fn iter<'w>(&self, world: &'w World) -> QueryIter<'w> {
        let mut required = Vec::new();
        let mut excluded = Vec::new();
        let mut unsatisfiable = false;
        for term in &self.terms {
            match (world.resolve_type_id(term.type_id), term.access) {
                (Some(id), Access::Without) => excluded.push(id),
                (Some(id), access) => required.push((id, access)),
                // Never registered means no entity has it.
                (None, Access::Without) => {}
                (None, _) => unsatisfiable = true,
            }
        }

        let archetypes = if unsatisfiable {
            Vec::new()
        } else {
            world
                .archetypes()
                .iter()
                .filter(|a| !a.is_empty() && required.iter().all(|(id, _)| a.has_component(*id)))
                .map(|a| a.id().0 as usize)
                .collect()
        };

        QueryIter {
            world,
            archetypes,
            required,
            excluded,
            position: 0,
            row: 0,
            checks: Vec::new(),
            checks_ready: false,
        }
    }

    pub fn count(&self, world: &World) -> usize {
        self.iter(world).count()
    }

    pub fn collect(&self, world: &World) -> Vec<EntityId> {
        self.iter(world).collect()
    }

    /// First match in iteration order.
    pub fn first(&self, world: &World) -> Option<EntityId> {
        self.iter(world).next()
    }

    /// The match, if there is exactly one.
    pub fn single(&self, world: &World) -> Option<EntityId> {
        let mut iter = self.iter(world);
        let first = iter.next()?;
        iter.next().is_none().then_some(first)
    }

    /// `true` if `entity` currently satisfies every term.
    pub fn matches(&self, world: &World, entity: EntityId) -> bool {
        self.terms.iter().all(|term| {
            let Some(loc) = world.location(entity) else {
                return false;
            };
            let archetype = &world.archetypes[loc.archetype.0 as usize];
            let column = world
                .resolve_type_id(term.type_id)
                .and_then(|id| archetype.column_of(id));
            match (term.access, column) {
                (Access::Without, None) => true,
                (Access::Without, Some(c)) => !archetype.is_enabled(loc.row, c),
                (_, None) => false,
                (Access::Present, Some(_)) => true,
                (Access::Enabled, Some(c)) => archetype.is_enabled(loc.row, c),
                (Access::Disabled, Some(c)) => !archetype.is_enabled(loc.row, c),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// QueryIter
// ---------------------------------------------------------------------------

/// Lazy iterator returned by [`Query::iter`].
pub struct QueryIter<'w> {
    world: &'w World,
    archetypes: Vec<usize>,
    required: Vec<(ComponentTypeId, Access)>,
    excluded: Vec<ComponentTypeId>,
    position: usize,
    row: usize,
    /// `(column, wanted bit)` for the current archetype.
    checks: Vec<(usize, bool)>,
    checks_ready: bool,
}

impl QueryIter<'_> {
    fn prepare(&mut self, archetype: &Archetype) {
        self.checks.clear();
        for (id, access) in &self.required {
            let Some(column) = archetype.column_of(*id) else {
                continue;
            };
            match access {
                Access::Enabled => self.checks.push((column, true)),
                Access::Disabled => self.checks.push((column, false)),
                Access::Present | Access::Without => {}
            }
        }
        for id in &self.excluded {
            if let Some(column) = archetype.column_of(*id) {
                self.checks.push((column, false));
            }
        }
        self.checks_ready = true;
    }
}

impl Iterator for QueryIter<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            let index = *self.archetypes.get(self.position)?;
            let world = self.world;
            let archetype = &world.archetypes[index];
            if !self.checks_ready {
                self.prepare(archetype);
            }
            while self.row < archetype.len() {
                let row = self.row;
                self.row += 1;
                if self
                    .checks
                    .iter()
                    .all(|(column, want)| archetype.is_enabled(row, *column) == *want)
                {
                    return Some(archetype.entities()[row]);
                }
            }
            self.position += 1;
            self.row = 0;
            self.checks_ready = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Enemy;
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hp(i32);
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Dead;
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct NeverUsed;

    crate::component!(Enemy => "enemy", Hp => "hp", Dead => "dead", NeverUsed => "never_used");

    fn world() -> (World, Vec<EntityId>) {
        let mut world = World::new();
        world.register::<Enemy>();
        world.register::<Hp>();
        world.register::<Dead>();
        let a = world.spawn_with(Enemy);
        world.insert(a, Hp(3)).unwrap();
        let b = world.spawn_with(Enemy);
        world.insert(b, Hp(0)).unwrap();
        world.insert_disabled(b, Dead).unwrap();
        let c = world.spawn_with(Hp(9));
        (world, vec![a, b, c])
    }

    #[test]
    fn with_requires_enabled() {
        let (world, e) = world();
        let mut hits = Query::new().with::<Hp>().collect(&world);
        hits.sort();
        assert_eq!(hits, {
            let mut v = e.clone();
            v.sort();
            v
        });
        assert_eq!(Query::new().with::<Dead>().count(&world), 0);
    }

    #[test]
    fn disabled_and_present_terms() {
        let (world, e) = world();
        assert_eq!(Query::new().with_disabled::<Dead>().collect(&world), vec![e[1]]);
        assert_eq!(Query::new().with_present::<Dead>().collect(&world), vec![e[1]]);
        world.set_enabled::<Dead>(e[1], true);
        assert_eq!(Query::new().with::<Dead>().collect(&world), vec![e[1]]);
        assert_eq!(Query::new().with_disabled::<Dead>().count(&world), 0);
    }

    #[test]
    fn without_accepts_absent_or_disabled() {
        let (world, e) = world();
        let q = Query::new().with::<Enemy>().without::<Dead>();
        assert_eq!(q.count(&world), 2);
        world.set_enabled::<Dead>(e[1], true);
        assert_eq!(q.collect(&world), vec![e[0]]);
        assert!(q.matches(&world, e[0]));
        assert!(!q.matches(&world, e[1]));
    }

    #[test]
    fn unregistered_terms() {
        let (world, _) = world();
        assert_eq!(Query::new().with::<NeverUsed>().count(&world), 0);
        assert_eq!(Query::new().with::<Hp>().without::<NeverUsed>().count(&world), 3);
    }

    #[test]
    fn single_requires_exactly_one() {
        let (world, e) = world();
        assert_eq!(Query::new().with_present::<Dead>().single(&world), Some(e[1]));
        assert_eq!(Query::new().with::<Enemy>().single(&world), None);
    }

    #[test]
    fn iteration_is_restartable_and_sees_bit_changes() {
        let (world, e) = world();
        let q = Query::new().with::<Hp>();
        assert_eq!(q.count(&world), 3);
        world.set_enabled::<Hp>(e[2], false);
        assert_eq!(q.count(&world), 2);
        world.set_enabled::<Hp>(e[2], true);
        assert_eq!(q.count(&world), 3);
    }

    #[test]
    fn query_runs_while_columns_are_borrowed() {
        let (world, _) = world();
        let mut hp = world.write::<Hp>();
        for entity in Query::new().with::<Enemy>().iter(&world) {
            if let Some(h) = hp.get_mut(entity) {
                h.0 += 1;
            }
        }
        drop(hp);
        let total: i32 = world.read::<Hp>().iter().map(|(_, h)| h.0).sum();
        assert_eq!(total, 4 + 1 + 9);
    }
}
