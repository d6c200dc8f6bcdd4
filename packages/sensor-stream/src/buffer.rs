// Per-channel sample buffer
//
// Holds the values of one physical channel (x, y, z, t, magnitude, accuracy).
// One writer (the sensor worker) and any number of readers share it; every
// mutation and every snapshot takes the same per-buffer lock, so a reader can
// never observe a half-applied append. Observers are notified after the lock
// is released.

use crate::events::{BufferEvent, Observer, ObserverId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for buffer monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BufferMetrics {
    pub total_appended: u64,
    pub total_evicted: u64,
    pub current_size: usize,
    pub peak_size: usize,
    pub memory_count: Option<usize>,
}

/// Consistent view of a buffer: its values plus the append counter at the
/// moment they were copied
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSnapshot {
    pub values: Vec<f64>,
    /// Values appended since the last clear, including evicted ones
    pub total_appended: u64,
    /// Bumped on every clear or wholesale replace
    pub generation: u64,
}

#[derive(Debug, Default)]
struct Storage {
    values: VecDeque<f64>,
    total_appended: u64,
    total_evicted: u64,
    peak_size: usize,
    generation: u64,
}

impl Storage {
    fn push(&mut self, value: f64, memory_count: Option<usize>) {
        if let Some(memory) = memory_count {
            if self.values.len() == memory {
                self.values.pop_front();
                self.total_evicted += 1;
            }
        }
        self.values.push_back(value);
        self.total_appended += 1;
        self.peak_size = self.peak_size.max(self.values.len());
    }
}

/// Append-only channel buffer, bounded (ring) or unbounded
pub struct SampleBuffer {
    name: String,
    memory_count: Option<usize>,
    storage: Mutex<Storage>,
    observers: RwLock<Vec<(ObserverId, Observer)>>,
    next_observer_id: AtomicU64,
}

impl SampleBuffer {
    /// Create a buffer. `size == 0` means unbounded.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let memory_count = if size == 0 { None } else { Some(size) };
        Self {
            name: name.into(),
            memory_count,
            storage: Mutex::new(Storage {
                values: VecDeque::with_capacity(memory_count.unwrap_or(0)),
                ..Default::default()
            }),
            observers: RwLock::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
        }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity of a bounded buffer, `None` when unbounded
    pub fn memory_count(&self) -> Option<usize> {
        self.memory_count
    }

    pub fn is_bounded(&self) -> bool {
        self.memory_count.is_some()
    }

    /// Append one value, evicting the oldest when a bounded buffer is full
    pub fn append(&self, value: f64) {
        self.storage.lock().push(value, self.memory_count);
        self.notify(BufferEvent::Updated(self.name.clone()));
    }

    /// Append a batch of values with a single notification
    pub fn extend(&self, values: &[f64]) {
        if values.is_empty() {
            return;
        }
        {
            let mut storage = self.storage.lock();
            for &value in values {
                storage.push(value, self.memory_count);
            }
        }
        self.notify(BufferEvent::Updated(self.name.clone()));
    }

    /// Replace the whole contents with `values`
    pub fn replace_values(&self, values: &[f64]) {
        {
            let mut storage = self.storage.lock();
            storage.values.clear();
            storage.total_appended = 0;
            storage.generation += 1;
            for &value in values {
                storage.push(value, self.memory_count);
            }
        }
        self.notify(BufferEvent::Updated(self.name.clone()));
    }

    /// Copy of the contents in insertion order
    pub fn to_vec(&self) -> Vec<f64> {
        self.storage.lock().values.iter().copied().collect()
    }

    /// Values and append counter taken under one lock
    pub fn snapshot(&self) -> BufferSnapshot {
        let storage = self.storage.lock();
        BufferSnapshot {
            values: storage.values.iter().copied().collect(),
            total_appended: storage.total_appended,
            generation: storage.generation,
        }
    }

    /// Reset to empty and notify observers
    pub fn clear(&self) {
        {
            let mut storage = self.storage.lock();
            storage.values.clear();
            storage.total_appended = 0;
            storage.generation += 1;
        }
        self.notify(BufferEvent::Cleared(self.name.clone()));
    }

    /// Mark the buffer as changed without touching its data
    pub fn send_update_notification(&self) {
        self.notify(BufferEvent::Updated(self.name.clone()));
    }

    pub fn last(&self) -> Option<f64> {
        self.storage.lock().values.back().copied()
    }

    pub fn first(&self) -> Option<f64> {
        self.storage.lock().values.front().copied()
    }

    pub fn len(&self) -> usize {
        self.storage.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.lock().values.is_empty()
    }

    pub fn total_appended(&self) -> u64 {
        self.storage.lock().total_appended
    }

    pub fn metrics(&self) -> BufferMetrics {
        let storage = self.storage.lock();
        BufferMetrics {
            total_appended: storage.total_appended,
            total_evicted: storage.total_evicted,
            current_size: storage.values.len(),
            peak_size: storage.peak_size,
            memory_count: self.memory_count,
        }
    }

    /// Register an observer for update/clear events
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&BufferEvent) + Send + Sync + 'static,
    {
        self.subscribe_shared(std::sync::Arc::new(observer))
    }

    pub fn subscribe_shared(&self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Returns false if the id was not registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    fn notify(&self, event: BufferEvent) {
        // Clone the list so observers may (un)subscribe from inside a callback
        let observers: Vec<Observer> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            observer(&event);
        }
    }
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("name", &self.name)
            .field("memory_count", &self.memory_count)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_append_then_snapshot_in_order() {
        let buffer = SampleBuffer::unbounded("x");
        for i in 0..100 {
            buffer.append(i as f64);
        }

        let values = buffer.to_vec();
        assert_eq!(values.len(), 100);
        assert!(values.iter().enumerate().all(|(i, &v)| v == i as f64));
        assert_eq!(buffer.last(), Some(99.0));
        assert_eq!(buffer.first(), Some(0.0));
    }

    #[test]
    fn test_clear_resets_contents() {
        let buffer = SampleBuffer::unbounded("x");
        buffer.extend(&[1.0, 2.0, 3.0]);
        buffer.clear();

        assert!(buffer.to_vec().is_empty());
        assert_eq!(buffer.last(), None);
        assert_eq!(buffer.total_appended(), 0);
        assert_eq!(buffer.snapshot().generation, 1);
    }

    #[test]
    fn test_bounded_buffer_keeps_newest() {
        let buffer = SampleBuffer::new("y", 5);
        for i in 0..8 {
            buffer.append(i as f64);
        }

        assert_eq!(buffer.to_vec(), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(buffer.len(), 5);

        let metrics = buffer.metrics();
        assert_eq!(metrics.total_appended, 8);
        assert_eq!(metrics.total_evicted, 3);
        assert_eq!(metrics.peak_size, 5);
        assert_eq!(metrics.memory_count, Some(5));
    }

    #[test]
    fn test_replace_values() {
        let buffer = SampleBuffer::new("c", 3);
        buffer.extend(&[9.0, 9.0]);
        buffer.replace_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.to_vec(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buffer.total_appended(), 4);
    }

    #[test]
    fn test_observers_receive_events() {
        let buffer = SampleBuffer::unbounded("t");
        let updates = Arc::new(AtomicUsize::new(0));
        let clears = Arc::new(AtomicUsize::new(0));

        let id = {
            let updates = Arc::clone(&updates);
            let clears = Arc::clone(&clears);
            buffer.subscribe(move |event| match event {
                BufferEvent::Updated(name) => {
                    assert_eq!(name, "t");
                    updates.fetch_add(1, Ordering::SeqCst);
                }
                BufferEvent::Cleared(_) => {
                    clears.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        buffer.append(1.0);
        buffer.extend(&[2.0, 3.0]);
        buffer.clear();
        assert_eq!(updates.load(Ordering::SeqCst), 2);
        assert_eq!(clears.load(Ordering::SeqCst), 1);

        assert!(buffer.unsubscribe(id));
        assert!(!buffer.unsubscribe(id));
        buffer.append(4.0);
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_observer_may_read_buffer() {
        let buffer = Arc::new(SampleBuffer::unbounded("x"));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let weak = Arc::downgrade(&buffer);
            let seen = Arc::clone(&seen);
            buffer.subscribe(move |_| {
                if let Some(buffer) = weak.upgrade() {
                    seen.lock().push(buffer.len());
                }
            });
        }
        buffer.append(1.0);
        buffer.append(2.0);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_snapshot_consistent_under_concurrent_appends() {
        let buffer = Arc::new(SampleBuffer::new("x", 1000));
        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..50_000 {
                    buffer.append(i as f64);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = buffer.snapshot();
            // Values are consecutive and end at total_appended - 1
            if let Some(&last) = snapshot.values.last() {
                assert_eq!(last, (snapshot.total_appended - 1) as f64);
                for pair in snapshot.values.windows(2) {
                    assert_eq!(pair[1] - pair[0], 1.0);
                }
            }
            assert!(snapshot.values.len() <= 1000);
        }

        writer.join().unwrap();
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.last(), Some(49_999.0));
    }
}
