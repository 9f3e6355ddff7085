use std::collections::VecDeque;

use crate::models::audio_models::DecibelSample;

/// Number of recent points kept for the live level display.
pub const DISPLAY_CAPACITY: usize = 100;

/// Bounded FIFO of the most recent decibel samples.
///
/// Only the control context pushes; readers take snapshots. Wrap in
/// `Arc<parking_lot::Mutex<RollingDisplayBuffer>>` for cross-thread access.
///
/// Overflow behavior: drops the oldest sample.
#[derive(Debug, Clone)]
pub struct RollingDisplayBuffer {
    samples: VecDeque<DecibelSample>,
    capacity: usize,
}

impl RollingDisplayBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DISPLAY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one if over capacity.
    pub fn push(&mut self, sample: DecibelSample) {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<DecibelSample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&DecibelSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecibelSample> {
        self.samples.iter()
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
}

impl Default for RollingDisplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}
