use std::collections::VecDeque;

/// Bounded FIFO with a drop-oldest overflow policy.
///
/// This is the explicit backpressure mechanism for the ingestion path: feed
/// callbacks push without ever blocking, and under burst load the oldest
/// entries are evicted to keep memory bounded.  Every eviction increments a
/// monotonically increasing drop counter exposed for diagnostics.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.  A zero
    /// capacity is bumped to one so a push can never be rejected outright.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Pushes an item, evicting the oldest one if the queue is full.
    /// Returns `true` when an eviction happened.
    pub fn push(&mut self, item: T) -> bool {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front();
            self.dropped += 1;
            true
        } else {
            false
        };
        self.items.push_back(item);
        evicted
    }

    /// Removes and returns the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
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

    /// Total number of items evicted since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
