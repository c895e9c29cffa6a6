//! Bounded decoded-frame cache.

use crate::decoder::DecodedFrame;
use std::collections::{HashMap, VecDeque};

/// Decoded frames keyed by timeline index, evicted in insertion order.
///
/// Entries are only ever looked up by the index they were decoded for.
#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    entries: HashMap<usize, DecodedFrame>,
    order: VecDeque<usize>,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn get(&self, index: usize) -> Option<&DecodedFrame> {
        self.entries.get(&index)
    }

    /// Insert a frame, evicting the oldest entries when full.
    ///
    /// An index that is already cached keeps its existing frame. Returns
    /// whether the frame was stored.
    pub fn insert(&mut self, index: usize, frame: DecodedFrame) -> bool {
        if self.capacity == 0 || self.entries.contains_key(&index) {
            return false;
        }

        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                tracing::trace!(index = oldest, bytes = evicted.data.len(), "Evicted cached frame");
            }
        }

        self.order.push_back(index);
        self.entries.insert(index, frame);
        true
    }

    /// Release every cached frame.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(released = self.entries.len(), "Cleared frame cache");
        }
        self.entries.clear();
        self.order.clear();
    }

    /// Cached indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.entries.keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}
