// Sensor sampling and window averaging
//
// Raw readings either pass straight through to the channel writer or are
// summed over a fixed time window and emitted as one averaged sample. The
// engine is driven by a single worker per sensor and holds no locks itself.

use crate::error::StreamError;
use crate::types::{Sample, SensorEvent};
use crate::writer::ChannelWriter;
use serde::{Deserialize, Serialize};

/// Accumulation state for one averaging window
#[derive(Debug, Clone, PartialEq)]
pub struct AveragingState {
    pub window_start: Option<f64>,
    pub sum_x: Option<f64>,
    pub sum_y: Option<f64>,
    pub sum_z: Option<f64>,
    pub min_accuracy: Option<f64>,
    /// Zero iff nothing has been accumulated in the current window
    pub update_count: u32,
    pub window_duration: f64,
}

fn add(sum: &mut Option<f64>, value: Option<f64>) {
    if let Some(value) = value {
        *sum = Some(sum.map_or(value, |s| s + value));
    }
}

impl AveragingState {
    pub fn new(window_duration: f64) -> Self {
        Self {
            window_start: None,
            sum_x: None,
            sum_y: None,
            sum_z: None,
            min_accuracy: None,
            update_count: 0,
            window_duration,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.window_duration);
    }

    pub fn accumulate(&mut self, sample: &Sample) {
        if self.window_start.is_none() {
            self.window_start = Some(sample.t);
        }

        add(&mut self.sum_x, sample.x);
        add(&mut self.sum_y, sample.y);
        add(&mut self.sum_z, sample.z);

        // Numeric minimum of the encoded accuracy, see DESIGN.md
        if let Some(accuracy) = sample.accuracy {
            self.min_accuracy = Some(self.min_accuracy.map_or(accuracy, |a| a.min(accuracy)));
        }

        self.update_count += 1;
    }

    /// The window has elapsed at `t` and holds at least one sample
    pub fn requires_flush(&self, t: f64) -> bool {
        match self.window_start {
            Some(start) => self.update_count > 0 && start + self.window_duration <= t,
            None => false,
        }
    }

    /// Arithmetic mean of each accumulated channel, stamped with `t`
    pub fn mean(&self, t: f64) -> Option<Sample> {
        if self.update_count == 0 {
            return None;
        }
        let n = self.update_count as f64;
        Some(Sample {
            x: self.sum_x.map(|s| s / n),
            y: self.sum_y.map(|s| s / n),
            z: self.sum_z.map(|s| s / n),
            accuracy: self.min_accuracy,
            t,
        })
    }
}

/// Observable state of the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Accumulating,
}

/// Counters for one sensor's processing
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorStats {
    pub readings_processed: u64,
    pub faults_dropped: u64,
    pub samples_written: u64,
    pub windows_flushed: u64,
}

pub struct SensorAveragingEngine {
    label: String,
    averaging: Option<AveragingState>,
    writer: ChannelWriter,
    stats: SensorStats,
    last_fault: Option<StreamError>,
}

impl SensorAveragingEngine {
    /// `window` enables averaging with the given duration in seconds
    pub fn new(label: impl Into<String>, writer: ChannelWriter, window: Option<f64>) -> Self {
        Self {
            label: label.into(),
            averaging: window.map(AveragingState::new),
            writer,
            stats: SensorStats::default(),
            last_fault: None,
        }
    }

    pub fn is_averaging(&self) -> bool {
        self.averaging.is_some()
    }

    pub fn averaging_state(&self) -> Option<&AveragingState> {
        self.averaging.as_ref()
    }

    pub fn state(&self) -> EngineState {
        match &self.averaging {
            Some(av) if av.update_count > 0 => EngineState::Accumulating,
            _ => EngineState::Idle,
        }
    }

    pub fn stats(&self) -> &SensorStats {
        &self.stats
    }

    /// Most recent dropped callback, if any
    pub fn last_fault(&self) -> Option<&StreamError> {
        self.last_fault.as_ref()
    }

    pub fn start_timestamp(&self) -> Option<f64> {
        self.writer.start_timestamp()
    }

    /// Drop any partial window and the timestamp baseline
    pub fn reset(&mut self) {
        if let Some(av) = self.averaging.as_mut() {
            av.reset();
        }
        self.writer.reset();
    }

    pub fn process(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Reading(sample) => self.data_in(sample),
            SensorEvent::Fault(message) => {
                let err = StreamError::TransientRead(message);
                self.stats.faults_dropped += 1;
                log::warn!("Sensor {}: {}", self.label, err);
                self.last_fault = Some(err);
            }
        }
    }

    fn data_in(&mut self, sample: Sample) {
        self.stats.readings_processed += 1;
        self.writer.establish_baseline(sample.t);

        let Some(av) = self.averaging.as_mut() else {
            self.writer.write(&sample);
            self.stats.samples_written += 1;
            return;
        };

        // Flush before accumulating: the triggering sample opens the next
        // window instead of being folded into the mean it closes
        if av.requires_flush(sample.t) {
            if let Some(mean) = av.mean(sample.t) {
                av.reset();
                av.window_start = Some(sample.t);
                self.writer.write(&mean);
                self.stats.samples_written += 1;
                self.stats.windows_flushed += 1;
            }
        }

        av.accumulate(&sample);
    }
}
