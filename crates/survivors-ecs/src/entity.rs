//! Entity handles and their allocator.
//!
//! An [`EntityId`] packs a *generation* in the high 32 bits and a slot *index*
//! in the low 32 bits. Destroying an entity bumps the generation of its slot,
//! so a handle kept in a buffer (a modifier source, an interaction target, a
//! weapon owner) can always be checked for liveness before it is dereferenced.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Opaque generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Build a handle from a slot index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// Slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` form, used as a stable sort key in snapshots.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Hands out [`EntityId`]s and recycles freed slots.
///
/// Freed slots go to the back of a FIFO queue, so a slot that was just
/// released is the last one to be reused. Enemies die and respawn by the
/// hundred every minute; spreading reuse keeps generations low.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: VecDeque<u32>,
    alive_count: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle, reusing the oldest freed slot when one exists.
    pub fn allocate(&mut self) -> EntityId {
        self.alive_count += 1;
        if let Some(index) = self.free.pop_front() {
            let slot = index as usize;
            self.alive[slot] = true;
            return EntityId::new(index, self.generations[slot]);
        }
        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Release a handle. Returns `false` when the handle was already stale.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let slot = id.index() as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push_back(id.index());
        self.alive_count -= 1;
        true
    }

    /// `true` if the slot is occupied and the generation matches.
    pub fn is_alive(&self, id: EntityId) -> bool {
        let slot = id.index() as usize;
        slot < self.generations.len() && self.alive[slot] && self.generations[slot] == id.generation()
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// `(generations, alive, free)` for snapshots.
    pub fn snapshot_state(&self) -> (Vec<u32>, Vec<bool>, Vec<u32>) {
        (
            self.generations.clone(),
            self.alive.clone(),
            self.free.iter().copied().collect(),
        )
    }

    /// Rebuild an allocator from [`snapshot_state`](Self::snapshot_state) output.
    pub fn restore(generations: Vec<u32>, alive: Vec<bool>, free: Vec<u32>) -> Self {
        let alive_count = alive.iter().filter(|a| **a).count();
        Self {
            generations,
            alive,
            free: VecDeque::from(free),
            alive_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
