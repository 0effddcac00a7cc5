//! Fixed-capacity MPMC queue used to hand work between threads.
//!
//! Backed by crossbeam's `ArrayQueue`: each slot carries a stamp that a
//! producer publishes only after the value is written, so a consumer can
//! never observe a half-written slot. `push` never blocks and never grows;
//! when every slot is taken the value comes back as [`QueueFull`].
//!
//! Used for the server's free-list of recyclable connection events and as
//! the task queue inside the thread pool.

use crossbeam_queue::ArrayQueue;

use crate::error::QueueFull;

pub struct BoundedQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    /// Enqueue at the tail. Fails without blocking when full.
    #[inline]
    pub fn push(&self, value: T) -> Result<(), QueueFull<T>> {
        self.inner.push(value).map_err(QueueFull)
    }

    /// Dequeue from the head. `None` when empty.
    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo() {
        let q = BoundedQueue::new(4);
        for i in 0..4 {
            q.push(i).unwrap();
        }
        assert!(q.is_full());
        for i in 0..4 {
            assert_eq!(q.pop(), Some(i));
        }
        assert!(q.is_empty());
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_push_full_returns_value() {
        let q = BoundedQueue::new(2);
        q.push("a").unwrap();
        q.push("b").unwrap();
        let QueueFull(rejected) = q.push("c").unwrap_err();
        assert_eq!(rejected, "c");
        assert_eq!(q.size(), 2);

        // state intact after the rejected push
        assert_eq!(q.pop(), Some("a"));
        q.push("c").unwrap();
        assert_eq!(q.pop(), Some("b"));
        assert_eq!(q.pop(), Some("c"));
    }

    #[test]
    fn test_wraparound_many_times() {
        let q = BoundedQueue::new(3);
        for round in 0..100u32 {
            q.push(round).unwrap();
            q.push(round + 1000).unwrap();
            assert_eq!(q.pop(), Some(round));
            assert_eq!(q.pop(), Some(round + 1000));
        }
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn test_concurrent_size_never_exceeds_capacity() {
        const CAP: usize = 8;
        const PER_THREAD: usize = 5_000;
        let q = Arc::new(BoundedQueue::new(CAP));
        let popped = Arc::new(AtomicUsize::new(0));
        let pushed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = Arc::clone(&q);
            let pushed = Arc::clone(&pushed);
            handles.push(thread::spawn(move || {
                let mut done = 0;
                while done < PER_THREAD {
                    assert!(q.size() <= q.capacity());
                    if q.push(done).is_ok() {
                        done += 1;
                        pushed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        thread::yield_now();
                    }
                }
            }));
        }
        for _ in 0..4 {
            let q = Arc::clone(&q);
            let popped = Arc::clone(&popped);
            handles.push(thread::spawn(move || {
                while popped.load(Ordering::Relaxed) < 4 * PER_THREAD {
                    assert!(q.size() <= q.capacity());
                    if q.pop().is_some() {
                        popped.fetch_add(1, Ordering::Relaxed);
                    } else {
                        thread::yield_now();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pushed.load(Ordering::Relaxed), 4 * PER_THREAD);
        assert_eq!(popped.load(Ordering::Relaxed), 4 * PER_THREAD);
        assert!(q.is_empty());
    }

    proptest! {
        #[test]
        fn prop_size_tracks_model(cap in 1usize..16, ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            let q = BoundedQueue::new(cap);
            let mut model = std::collections::VecDeque::new();
            for (i, is_push) in ops.into_iter().enumerate() {
                if is_push {
                    let res = q.push(i);
                    if model.len() == cap {
                        prop_assert!(res.is_err());
                    } else {
                        prop_assert!(res.is_ok());
                        model.push_back(i);
                    }
                } else {
                    prop_assert_eq!(q.pop(), model.pop_front());
                }
                prop_assert_eq!(q.size(), model.len());
                prop_assert!(q.size() <= q.capacity());
                prop_assert_eq!(q.is_full(), model.len() == cap);
                prop_assert_eq!(q.is_empty(), model.is_empty());
            }
        }
    }
}
