//! Generational entity handles.
//!
//! An [`EntityId`] pairs a slot index with the generation that slot had when
//! the handle was issued. Freeing a slot bumps its generation, so every handle
//! issued before the free stops resolving. Code that holds on to a handle for
//! longer than a single call (a damage request riding on a projectile, a
//! weapon remembering its target) must re-check it through
//! [`EntityLiveness::is_alive`] before use.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to an entity in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// Creates a handle from its raw parts (for deserialization and tests).
    #[must_use]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation the slot had when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Null/invalid entity handle. Never issued by an allocator.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    /// Checks if this is a non-null handle. Says nothing about liveness.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Answers whether a handle still refers to a live entity.
pub trait EntityLiveness {
    /// Returns true if `id` was issued by this source and not yet freed.
    fn is_alive(&self, id: EntityId) -> bool;
}

/// Allocates generational handles and recycles freed slots.
#[derive(Debug, Clone, Default)]
pub struct EntityAllocator {
    /// Current generation per slot.
    generations: Vec<u32>,
    /// Whether each slot is occupied.
    alive: Vec<bool>,
    /// Freed slots awaiting reuse.
    free: Vec<u32>,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new handle, reusing a freed slot when one is available.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return EntityId::from_parts(index, self.generations[slot]);
        }

        let index = u32::try_from(self.generations.len()).unwrap_or(u32::MAX - 1);
        self.generations.push(0);
        self.alive.push(true);
        EntityId::from_parts(index, 0)
    }

    /// Frees the slot behind `id`. Returns false if the handle was already stale.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        let slot = id.index() as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(id.index());
        true
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }
}

impl EntityLiveness for EntityAllocator {
    fn is_alive(&self, id: EntityId) -> bool {
        let slot = id.index() as usize;
        id.is_valid()
            && self.alive.get(slot).copied().unwrap_or(false)
            && self.generations[slot] == id.generation()
    }
}
