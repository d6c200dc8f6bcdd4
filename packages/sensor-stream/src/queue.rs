// Lock-based FIFO used to hand data between independently scheduled contexts
//
// A single mutex guards the storage and is held only for the push/pop itself.
// `dequeue` never blocks; callers that want to wait use `dequeue_timeout`,
// which polls with a bounded backoff and sleeps between attempts.

use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default sleep between polls once spinning has been exhausted
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Thread-safe FIFO queue shared by reference between producer and consumer
pub struct ConcurrentQueue<T> {
    items: Mutex<VecDeque<T>>,
    total_enqueued: AtomicU64,
    total_dequeued: AtomicU64,
}

impl<T> ConcurrentQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            total_enqueued: AtomicU64::new(0),
            total_dequeued: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            total_enqueued: AtomicU64::new(0),
            total_dequeued: AtomicU64::new(0),
        }
    }

    /// Append an item at the back. Never blocks beyond the push itself.
    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return the oldest item, or `None` if the queue is empty
    pub fn dequeue(&self) -> Option<T> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.total_dequeued.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Poll for an item until `timeout` elapses.
    ///
    /// Spins briefly, then sleeps `poll_interval` between attempts. The lock
    /// is never held while waiting.
    pub fn dequeue_timeout(&self, timeout: Duration, poll_interval: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();

        loop {
            if let Some(item) = self.dequeue() {
                return Some(item);
            }

            if Instant::now() >= deadline {
                return None;
            }

            if backoff.is_completed() {
                std::thread::sleep(poll_interval);
            } else {
                backoff.snooze();
            }
        }
    }

    /// Remove up to `max_items` from the front, oldest first
    pub fn drain(&self, max_items: usize) -> Vec<T> {
        let mut items = self.items.lock();
        let take = max_items.min(items.len());
        let drained: Vec<T> = items.drain(..take).collect();
        drop(items);

        self.total_dequeued
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    /// Point-in-time emptiness check
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn clear(&self) {
        let removed = {
            let mut items = self.items.lock();
            let n = items.len();
            items.clear();
            n
        };
        self.total_dequeued
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued.load(Ordering::Relaxed)
    }

    pub fn total_dequeued(&self) -> u64 {
        self.total_dequeued.load(Ordering::Relaxed)
    }
}

impl<T: Clone> ConcurrentQueue<T> {
    /// Oldest item, without removing it
    pub fn first(&self) -> Option<T> {
        self.items.lock().front().cloned()
    }

    /// Newest item, without removing it
    pub fn last(&self) -> Option<T> {
        self.items.lock().back().cloned()
    }

    /// Copy of the current contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.lock().iter().cloned().collect()
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
