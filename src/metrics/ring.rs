//! Fixed-capacity ring buffer.
//!
//! Backs every bounded sample window in [`KeyMetrics`](super::KeyMetrics).
//! Storage is allocated once; once full, each push overwrites the oldest slot.

/// Ring buffer that never grows past its capacity.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buffer: Vec<T>,
    /// Index of the oldest element once the buffer is full.
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` elements.
    ///
    /// A zero capacity is bumped to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Push a value, evicting the oldest one when full.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(value);
        } else {
            self.buffer[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing has been pushed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Maximum number of elements.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed element.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        if self.buffer.len() < self.capacity {
            self.buffer.last()
        } else {
            let idx = (self.head + self.capacity - 1) % self.capacity;
            self.buffer.get(idx)
        }
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.buffer.split_at(self.head);
        older.iter().chain(newer.iter())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_push_below_capacity() {
        let mut ring = RingBuffer::with_capacity(3);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.latest(), Some(&2));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut ring = RingBuffer::with_capacity(3);
        for i in 1..=5 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.latest(), Some(&5));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut ring = RingBuffer::with_capacity(100);
        for i in 0..1_000 {
            ring.push(i);
            assert!(ring.len() <= 100);
        }
        assert_eq!(ring.iter().next(), Some(&900));
    }

    #[test]
    fn test_empty() {
        let ring: RingBuffer<u8> = RingBuffer::with_capacity(0);
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.latest(), None);
    }
}
