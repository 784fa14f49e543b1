//! Fixed scratch-buffer pool for mesh builds
//!
//! Workers assemble sector meshes into preallocated scratch slots instead
//! of allocating per job. The pool holds a fixed number of slots; when
//! every slot is checked out, new jobs wait in the dispatcher queue until
//! one is returned.

use crate::dispatch::mesher::TerrainVertex;
use std::sync::Mutex;

/// Reusable build buffers for one in-flight mesh job
#[derive(Debug)]
pub struct ScratchSlot {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u32>,
}

impl ScratchSlot {
    fn with_capacity(max_vertices: usize, max_indices: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(max_vertices),
            indices: Vec::with_capacity(max_indices),
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }
}

/// Fixed-size pool of scratch slots
pub struct SlotPool {
    free: Mutex<Vec<ScratchSlot>>,
    capacity: usize,
}

impl SlotPool {
    /// Preallocate `capacity` slots sized for a full-resolution sector of
    /// `grid_size` cells per edge
    pub fn new(capacity: usize, grid_size: usize) -> Self {
        let max_vertices = grid_size * grid_size;
        let max_indices = (grid_size - 1).max(1).pow(2) * 6;
        let free = (0..capacity)
            .map(|_| ScratchSlot::with_capacity(max_vertices, max_indices))
            .collect();
        Self {
            free: Mutex::new(free),
            capacity,
        }
    }

    /// Take a slot, or `None` when all are in use
    pub fn checkout(&self) -> Option<ScratchSlot> {
        self.free.lock().unwrap().pop()
    }

    /// Return a slot after a job finishes
    pub fn give_back(&self, mut slot: ScratchSlot) {
        slot.clear();
        self.free.lock().unwrap().push(slot);
    }

    pub fn available(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
