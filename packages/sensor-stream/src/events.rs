// Buffer notifications
//
// Observers are fire-and-forget callbacks. They run on whichever thread
// mutated the buffer, after the buffer lock has been released.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Event emitted by a `SampleBuffer`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "buffer")]
pub enum BufferEvent {
    Updated(String),
    Cleared(String),
}

impl BufferEvent {
    pub fn buffer_name(&self) -> &str {
        match self {
            BufferEvent::Updated(name) | BufferEvent::Cleared(name) => name,
        }
    }
}

/// Identifier returned by `SampleBuffer::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

pub type Observer = Arc<dyn Fn(&BufferEvent) + Send + Sync>;

/// "Needs update" flag raised by buffer events and consumed on the display tick
#[derive(Debug, Clone, Default)]
pub struct UpdateFlag {
    dirty: Arc<AtomicBool>,
}

impl UpdateFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Returns whether the flag was set, and clears it
    pub fn take(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Observer closure that raises this flag on any event
    pub fn observer(&self) -> Observer {
        let flag = self.clone();
        Arc::new(move |_event: &BufferEvent| flag.raise())
    }
}
