// Writes processed samples into the channel buffers of one sensor
//
// Timestamps are stored relative to a baseline fixed by the first processed
// sample. The baseline subtracts whatever time value was already recorded,
// so a resumed experiment continues its time axis instead of restarting it.

use crate::registry::{BufferHandle, BufferRegistry};
use crate::types::Sample;
use std::sync::Weak;

/// Buffer handles a sensor writes to, per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelBindings {
    pub x: Option<BufferHandle>,
    pub y: Option<BufferHandle>,
    pub z: Option<BufferHandle>,
    pub t: Option<BufferHandle>,
    pub abs: Option<BufferHandle>,
    pub accuracy: Option<BufferHandle>,
}

pub struct ChannelWriter {
    registry: Weak<BufferRegistry>,
    bindings: ChannelBindings,
    start_timestamp: Option<f64>,
}

impl ChannelWriter {
    pub fn new(registry: Weak<BufferRegistry>, bindings: ChannelBindings) -> Self {
        Self {
            registry,
            bindings,
            start_timestamp: None,
        }
    }

    pub fn bindings(&self) -> &ChannelBindings {
        &self.bindings
    }

    pub fn start_timestamp(&self) -> Option<f64> {
        self.start_timestamp
    }

    /// Fix the baseline on the first sample after a reset; later calls are no-ops
    pub fn establish_baseline(&mut self, t: f64) {
        if self.start_timestamp.is_some() {
            return;
        }

        let last_recorded = self
            .bindings
            .t
            .and_then(|handle| {
                self.registry
                    .upgrade()
                    .and_then(|registry| registry.get(handle).and_then(|b| b.last()))
            })
            .unwrap_or(0.0);

        self.start_timestamp = Some(t - last_recorded);
    }

    pub fn reset(&mut self) {
        self.start_timestamp = None;
    }

    /// Append each present channel to its bound buffer.
    ///
    /// Returns the number of values written, zero if the registry is gone.
    pub fn write(&mut self, sample: &Sample) -> usize {
        let Some(registry) = self.registry.upgrade() else {
            log::debug!("Buffer registry dropped; discarding sample at t={}", sample.t);
            return 0;
        };

        self.establish_baseline(sample.t);

        let mut written = 0;
        let mut try_append = |value: Option<f64>, handle: Option<BufferHandle>| {
            if let (Some(value), Some(buffer)) = (value, handle.and_then(|h| registry.get(h))) {
                buffer.append(value);
                written += 1;
            }
        };

        try_append(sample.x, self.bindings.x);
        try_append(sample.y, self.bindings.y);
        try_append(sample.z, self.bindings.z);
        try_append(sample.accuracy, self.bindings.accuracy);

        let relative_t = self.start_timestamp.map(|start| sample.t - start);
        try_append(relative_t, self.bindings.t);

        try_append(sample.magnitude(), self.bindings.abs);

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn setup() -> (Arc<BufferRegistry>, ChannelBindings) {
        let mut registry = BufferRegistry::new();
        let bindings = ChannelBindings {
            x: Some(registry.insert("x", 0).unwrap()),
            y: Some(registry.insert("y", 0).unwrap()),
            z: Some(registry.insert("z", 0).unwrap()),
            t: Some(registry.insert("t", 0).unwrap()),
            abs: Some(registry.insert("abs", 0).unwrap()),
            accuracy: None,
        };
        (Arc::new(registry), bindings)
    }

    #[test]
    fn test_relative_timestamps() {
        let (registry, bindings) = setup();
        let mut writer = ChannelWriter::new(Arc::downgrade(&registry), bindings);

        writer.write(&Sample::vector(3.0, 4.0, 0.0, 100.0));
        writer.write(&Sample::vector(0.0, 0.0, 1.0, 100.5));

        assert_eq!(registry.by_name("t").unwrap().to_vec(), vec![0.0, 0.5]);
        assert_eq!(registry.by_name("abs").unwrap().to_vec(), vec![5.0, 1.0]);
        assert_eq!(registry.by_name("x").unwrap().to_vec(), vec![3.0, 0.0]);
    }

    #[test]
    fn test_resume_continues_time_axis() {
        let (registry, bindings) = setup();
        let mut writer = ChannelWriter::new(Arc::downgrade(&registry), bindings);

        writer.write(&Sample::scalar(1.0, 10.0));
        writer.write(&Sample::scalar(1.0, 12.0));
        writer.reset();

        // Resume much later; the axis continues from the last recorded time
        writer.write(&Sample::scalar(1.0, 50.0));
        writer.write(&Sample::scalar(1.0, 51.0));

        assert_eq!(
            registry.by_name("t").unwrap().to_vec(),
            vec![0.0, 2.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_missing_channels_skipped() {
        let (registry, bindings) = setup();
        let mut writer = ChannelWriter::new(Arc::downgrade(&registry), bindings);

        let written = writer.write(&Sample::scalar(7.0, 0.0));
        assert_eq!(written, 2); // x and t
        assert!(registry.by_name("y").unwrap().is_empty());
        assert!(registry.by_name("abs").unwrap().is_empty());
    }

    #[test]
    fn test_dropped_registry_discards_writes() {
        let (registry, bindings) = setup();
        let mut writer = ChannelWriter::new(Arc::downgrade(&registry), bindings);
        drop(registry);

        assert_eq!(writer.write(&Sample::scalar(1.0, 0.0)), 0);
    }
}
