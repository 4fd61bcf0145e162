//! Bounded FIFO used for the per-ABI backlogs.

use std::collections::VecDeque;

/// A FIFO holding at most `capacity` items. Pushing onto a full queue evicts
/// the oldest item, so the queue always holds the most recent arrivals.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an item, returning the evicted one if the queue was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_keeps_most_recent() {
        let mut queue = BoundedQueue::new(3);
        let evicted: Vec<_> = (0..7).filter_map(|i| queue.push(i)).collect();

        assert_eq!(queue.len(), 3);
        assert_eq!(evicted, vec![0, 1, 2, 3]);
        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![4, 5, 6]);
    }

    #[test]
    fn test_fifo() {
        let mut queue = BoundedQueue::new(10);
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        let mut queue = BoundedQueue::new(0);
        assert_eq!(queue.push(1), None);
        assert_eq!(queue.push(2), Some(1));
        assert_eq!(queue.pop(), Some(2));
    }
}
