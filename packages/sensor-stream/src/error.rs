// Error types for the sensor pipeline
//
// Producer-side failures (sensor faults, late writes) are logged where they
// happen and never cross into the consumer. Everything that reaches a caller
// goes through `StreamError`.

use crate::types::SensorKind;
use thiserror::Error;

/// Result type for pipeline operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while configuring or running the pipeline
#[derive(Debug, Error)]
pub enum StreamError {
    /// Reported once when an experiment starts; not retried for the session.
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(SensorKind),

    /// A single sensor callback failed. The sample is dropped and the next
    /// callback is processed normally.
    #[error("Transient sensor read error: {0}")]
    TransientRead(String),

    /// An update tried to consume more values than the input buffer still holds.
    #[error("Update of {added} values exceeds buffer memory of {memory}")]
    CapacityExceeded { added: usize, memory: usize },

    /// Consumer bookkeeping no longer matches the source (e.g. the buffer was
    /// cleared underneath it). Handled by a full rebuild, never a crash.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown buffer: {0}")]
    UnknownBuffer(String),

    #[error("Sensor already running")]
    AlreadyRunning,

    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
