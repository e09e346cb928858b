//! Bounded position history for one tracked bus.
//!
//! Keeps the last N accepted positions, oldest first. Used as the input to
//! ETA estimation and exposed to callers for trail rendering.

use std::collections::VecDeque;

use crate::geo::Position;

/// Default number of positions retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 8;

/// Ordered, bounded history of positions.
///
/// Positions must arrive in strictly increasing `captured_at` order; anything
/// else is refused so the history stays sorted.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    samples: VecDeque<Position>,
    capacity: usize,
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SampleHistory {
    /// Create an empty history. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a position, evicting the oldest when full.
    ///
    /// Returns false (and changes nothing) if the position is not strictly
    /// newer than the latest one.
    pub fn record(&mut self, position: Position) -> bool {
        if let Some(latest) = self.samples.back() {
            if !position.is_newer_than(latest) {
                return false;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(position);
        true
    }

    pub fn latest(&self) -> Option<&Position> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Contiguous view, oldest first.
    pub fn as_slice(&mut self) -> &[Position] {
        self.samples.make_contiguous()
    }

    /// Copy of the samples, oldest first.
    pub fn to_vec(&self) -> Vec<Position> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
