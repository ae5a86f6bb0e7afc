/// Pooled draw batches
///
/// Slots are cleared and refilled every tick instead of reallocated. After
/// warm-up the arena performs no heap allocation as long as the batch count
/// and per-batch instance counts stay within what was seen before.

use rayon::prelude::*;

use crate::bounds::Aabb;
use crate::camera::Frustum;

use super::draw_batch::{DrawBatch, DrawBatchDesc};

/// Below this many batches the frustum pass stays on the calling thread
const PARALLEL_VISIBILITY_THRESHOLD: usize = 2048;

#[derive(Debug, Default)]
pub struct BatchArena {
    slots: Vec<DrawBatch>,
    len: usize,
    generation: u64,
}

impl BatchArena {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, DrawBatch::default);
        Self {
            slots,
            len: 0,
            generation: 0,
        }
    }

    /// Drop all batches without freeing their storage
    pub fn clear(&mut self) {
        self.len = 0;
        self.generation += 1;
    }

    /// Bumped on every `clear`
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Initialise the next pooled slot from `desc`
    pub fn push(&mut self, desc: &DrawBatchDesc<'_>) -> &mut DrawBatch {
        if self.len == self.slots.len() {
            self.slots.push(DrawBatch::default());
        }
        let batch = &mut self.slots[self.len];
        batch.init(desc);
        self.len += 1;
        batch
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated slots, including ones not in use this generation
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn as_slice(&self) -> &[DrawBatch] {
        &self.slots[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [DrawBatch] {
        &mut self.slots[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DrawBatch> {
        self.as_slice().iter()
    }

    /// Run the CPU frustum test over every live batch
    pub fn update_camera_visibility(&mut self, frustum: &Frustum) {
        let batches = self.as_mut_slice();
        if batches.len() >= PARALLEL_VISIBILITY_THRESHOLD {
            batches
                .par_iter_mut()
                .for_each(|batch| batch.update_camera_visibility(frustum));
        } else {
            for batch in batches {
                batch.update_camera_visibility(frustum);
            }
        }
    }

    /// Union of all live batch bounds
    pub fn bounds(&self) -> Aabb {
        self.iter()
            .fold(Aabb::EMPTY, |acc, batch| acc.union(batch.aabb()))
    }

    /// Total instances across live batches
    pub fn instance_count(&self) -> u32 {
        self.iter().map(|b| b.instance_count()).sum()
    }
}

impl<'a> IntoIterator for &'a BatchArena {
    type Item = &'a DrawBatch;
    type IntoIter = std::slice::Iter<'a, DrawBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
