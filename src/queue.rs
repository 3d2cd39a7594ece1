//! Lossy, most-recent-wins queue.
use crossbeam::queue::ArrayQueue;

/// A bounded queue that drops its oldest entry to make room for a new one, so producers
/// never wait on a slow consumer. A queue of capacity 0 drops everything.
#[derive(Debug)]
pub struct FallOffQueue<T> {
    inner: Option<ArrayQueue<T>>,
}

impl<T> FallOffQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        FallOffQueue {
            inner: (capacity > 0).then(|| ArrayQueue::new(capacity)),
        }
    }

    /// Add `item`, returning the entry that fell off the queue, if any.
    pub fn push(&self, item: T) -> Option<T> {
        match &self.inner {
            Some(queue) => queue.force_push(item),
            None => Some(item),
        }
    }

    /// Remove the oldest entry.
    pub fn pop(&self) -> Option<T> {
        self.inner.as_ref().and_then(ArrayQueue::pop)
    }

    /// Drain the queue, returning only the newest entry.
    pub fn latest(&self) -> Option<T> {
        let mut latest = None;
        while let Some(item) = self.pop() {
            latest = Some(item);
        }
        latest
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, ArrayQueue::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, ArrayQueue::capacity)
    }
}
