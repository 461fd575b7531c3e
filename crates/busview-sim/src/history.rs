//! Fixed-capacity FIFO history

use std::collections::VecDeque;

/// Default capacity of the message history
pub const MESSAGE_HISTORY: usize = 200;

/// Default capacity of the data-point history
pub const DATA_POINT_HISTORY: usize = 300;

/// Ring buffer that drops the oldest entries once capacity is exceeded
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    /// Create an empty buffer holding at most `capacity` entries
    ///
    /// Storage beyond the default capacities grows on demand.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DATA_POINT_HISTORY)),
            capacity,
        }
    }

    /// Append an entry, evicting from the front while over capacity
    pub fn push(&mut self, item: T) {
        self.entries.push_back(item);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest-first iterator
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The most recent `n` entries, oldest first
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &T> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Newest entry
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries held
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> HistoryBuffer<T> {
    /// Copy the entries out, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}
