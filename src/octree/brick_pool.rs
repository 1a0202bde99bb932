//! Brick payload ids for surface leaves
//!
//! Atlas packing is someone else's problem; the pool only hands out ids and
//! remembers the (colour, packed normal) each one was allocated for.

use crate::constants::octree::MAX_BRICK_ID;
use crate::error::{EngineError, EngineResult};
use crate::sdf::Colour;
use std::collections::HashMap;

/// Appearance a brick was allocated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrickKey {
    pub colour: Colour,
    pub normal: u32,
}

/// Id allocator with a free list. Ids start at 1.
#[derive(Debug)]
pub struct BrickPool {
    capacity: u32,
    next_id: u32,
    free_ids: Vec<u32>,
    entries: HashMap<u32, BrickKey>,
}

impl BrickPool {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity: capacity.min(MAX_BRICK_ID),
            next_id: 1,
            free_ids: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Allocate an id for `key`
    pub fn allocate(&mut self, key: BrickKey) -> EngineResult<u32> {
        let id = match self.free_ids.pop() {
            Some(id) => id,
            None if self.next_id <= self.capacity => {
                self.next_id += 1;
                self.next_id - 1
            }
            None => {
                return Err(EngineError::ResourceExhausted(format!(
                    "brick pool of {} ids",
                    self.capacity
                )))
            }
        };
        self.entries.insert(id, key);
        Ok(id)
    }

    /// Return an id to the pool. Unknown ids are ignored.
    pub fn evict(&mut self, id: u32) -> Option<BrickKey> {
        let key = self.entries.remove(&id)?;
        self.free_ids.push(id);
        Some(key)
    }

    pub fn get(&self, id: u32) -> Option<&BrickKey> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
