//! Bounded MPSC FIFO with blocking, timed, and non-blocking receive.
//! A mutex, a condvar, and preallocated storage. Nothing else.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default inbox queue depth.
pub const QUEUE_CAPACITY: usize = 256;

/// Bounded FIFO. Push operations fail on a full queue rather than block;
/// there is no producer back-pressure. Pop order equals push order for a
/// single producer; across producers the interleaving is the order in
/// which they take the queue mutex.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Queue with storage for `capacity` elements, preallocated up front
    /// so the hot path never reallocates.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity,
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking push. False when the queue is at capacity.
    pub fn try_push(&self, value: T) -> bool {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(value);
        self.ready.notify_one();
        true
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait up to `timeout` for an element. The wait is predicate-guarded,
    /// so spurious wakeups re-arm rather than return empty-handed.
    pub fn pop_wait(&self, timeout: Duration) -> Option<T> {
        let items = self.lock();
        let (mut items, result) = self
            .ready
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() && items.is_empty() {
            return None;
        }
        items.pop_front()
    }

    /// Block until an element is available.
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(value) = items.pop_front() {
                return value;
            }
            items = self
                .ready
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
