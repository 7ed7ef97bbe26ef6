//! Bounded ring buffer backing the recent-log panel.
//!
//! - **Bounded capacity**: never holds more than the configured number of lines
//! - **Oldest-first eviction**: a push into a full buffer hands back the
//!   displaced element and bumps a drop counter, so overflow stays observable

use std::collections::VecDeque;

/// A fixed-capacity FIFO that discards its oldest element on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> RingBuffer<T> {
    /// Creates a new ring buffer with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be greater than 0");
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Pushes a value, returning the evicted oldest value when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.data.len() >= self.capacity {
            self.dropped += 1;
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(value);
        evicted
    }

    /// Returns the most recent value, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.data.back()
    }

    /// Returns the current number of elements in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of elements discarded because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.data.iter()
    }

    /// Returns the last N elements, oldest first.
    #[must_use]
    pub fn last_n(&self, n: usize) -> Vec<&T> {
        let skip = self.data.len().saturating_sub(n);
        self.data.iter().skip(skip).collect()
    }
}
