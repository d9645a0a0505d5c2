//! Bounded FIFO ring buffer backing every record collection.
//!
//! Overflow is never an error: pushing past capacity evicts the oldest entry.

use std::collections::VecDeque;

/// Fixed-capacity FIFO buffer. Oldest entries are evicted on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` items. Capacity 0 is
    /// clamped to 1 — a zero-capacity buffer would silently drop everything.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest if the buffer is full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the last `n` items in arrival order.
    pub fn tail(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// Copy out the full contents in arrival order.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn push_under_capacity_keeps_everything() {
        let mut ring = RingBuffer::new(5);
        for i in 0..3 {
            ring.push(i);
        }
        assert_eq!(ring.to_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn push_past_capacity_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 0..7 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.to_vec(), vec![4, 5, 6]);
    }

    #[test]
    fn tail_returns_most_recent_in_arrival_order() {
        let mut ring = RingBuffer::new(10);
        for i in 0..6 {
            ring.push(i);
        }
        assert_eq!(ring.tail(2), vec![4, 5]);
        assert_eq!(ring.tail(100), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = RingBuffer::new(0);
        ring.push(42);
        assert_eq!(ring.to_vec(), vec![42]);
    }

    proptest! {
        // After N > capacity pushes, length equals capacity and the contents
        // are exactly the most recent `capacity` items in arrival order.
        #[test]
        fn capacity_invariant(cap in 1usize..64, n in 0usize..256) {
            let mut ring = RingBuffer::new(cap);
            for i in 0..n {
                ring.push(i);
            }
            prop_assert_eq!(ring.len(), n.min(cap));
            let expected: Vec<usize> = (n.saturating_sub(cap)..n).collect();
            prop_assert_eq!(ring.to_vec(), expected);
        }
    }
}
