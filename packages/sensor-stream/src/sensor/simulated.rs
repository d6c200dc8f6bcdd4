// Simulated sensor source that generates a deterministic waveform
//
// Runs its own producer thread and pushes readings through the sink at the
// requested interval, useful for:
// - Running the pipeline without sensor hardware
// - Threaded end-to-end tests
// - The command-line driver

use super::{SensorRequest, SensorSink, SensorSource};
use crate::error::{StreamError, StreamResult};
use crate::types::{Accuracy, Sample, SensorKind};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Rate used when the caller asks for "as fast as possible"
const DEFAULT_MAX_RATE_HZ: f64 = 1000.0;

/// Readings a magnetometer reports as zeros before it settles
const MAGNETOMETER_SETTLE_READINGS: u64 = 3;

/// Hardware clocks count from boot, not from experiment start
const DEFAULT_CLOCK_OFFSET: f64 = 1000.0;

pub struct SimulatedSource {
    kind: SensorKind,
    available: bool,
    max_rate_hz: f64,
    frequency_hz: f64,
    fault_every: Option<u64>,
    clock_offset: f64,
    stop_signal: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            available: true,
            max_rate_hz: DEFAULT_MAX_RATE_HZ,
            frequency_hz: 1.0,
            fault_every: None,
            clock_offset: DEFAULT_CLOCK_OFFSET,
            stop_signal: Arc::new(AtomicBool::new(false)),
            producer: None,
        }
    }

    /// A source whose hardware is missing
    pub fn unavailable(kind: SensorKind) -> Self {
        let mut source = Self::new(kind);
        source.available = false;
        source
    }

    pub fn with_max_rate(mut self, hz: f64) -> Self {
        self.max_rate_hz = hz;
        self
    }

    /// Signal frequency of the generated waveform
    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.frequency_hz = hz;
        self
    }

    /// Replace every `n`-th callback with a read error
    pub fn with_fault_every(mut self, n: u64) -> Self {
        self.fault_every = (n > 0).then_some(n);
        self
    }

    /// Raw reading at time `t`, in the units the hardware reports
    pub fn waveform(kind: SensorKind, frequency_hz: f64, t: f64) -> Sample {
        let phase = TAU * frequency_hz * t;
        let (s, c) = phase.sin_cos();
        match kind {
            // In g; lying flat the device reads -1 g on z
            SensorKind::Accelerometer => Sample::vector(0.05 * s, 0.05 * c, -1.0, t),
            SensorKind::LinearAcceleration => Sample::vector(0.1 * s, 0.0, 0.1 * c, t),
            SensorKind::Gyroscope => Sample::vector(0.2 * s, 0.1 * c, 0.0, t),
            SensorKind::MagneticField => Sample::vector(20.0 + 5.0 * s, -5.0 * c, -40.0, t),
            SensorKind::Pressure => Sample::scalar(1013.25 + 0.5 * s, t),
            SensorKind::Light => Sample::scalar(300.0 + 50.0 * s, t),
            SensorKind::Proximity => Sample::scalar(if s >= 0.0 { 5.0 } else { 0.0 }, t),
        }
    }
}

impl SensorSource for SimulatedSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self, request: SensorRequest, sink: SensorSink) -> StreamResult<()> {
        if !self.available {
            return Err(StreamError::SensorUnavailable(self.kind));
        }
        if self.producer.is_some() {
            return Err(StreamError::AlreadyRunning);
        }

        let interval = if request.interval > 0.0 {
            request.interval
        } else {
            1.0 / self.max_rate_hz
        };
        let interval = Duration::from_secs_f64(interval);

        self.stop_signal.store(false, Ordering::Release);
        let stop_signal = Arc::clone(&self.stop_signal);
        let kind = self.kind;
        let frequency_hz = self.frequency_hz;
        let fault_every = self.fault_every;
        let clock_offset = self.clock_offset;
        let calibrated = request.calibrated;

        let handle = thread::Builder::new()
            .name(format!("sensor-{}-source", kind))
            .spawn(move || {
                let origin = Instant::now();
                let mut n: u64 = 0;

                while !stop_signal.load(Ordering::Acquire) {
                    n += 1;
                    let t = clock_offset + origin.elapsed().as_secs_f64();

                    if fault_every.is_some_and(|every| n % every == 0) {
                        sink.push_fault(format!("simulated read failure #{}", n));
                    } else {
                        let mut sample = if kind == SensorKind::MagneticField
                            && n <= MAGNETOMETER_SETTLE_READINGS
                        {
                            Sample::vector(0.0, 0.0, 0.0, t)
                        } else {
                            Self::waveform(kind, frequency_hz, t)
                        };
                        if kind == SensorKind::MagneticField {
                            let accuracy = if calibrated {
                                Accuracy::High
                            } else {
                                Accuracy::Uncalibrated
                            };
                            sample = sample.with_accuracy(accuracy.as_value());
                        }
                        sink.push_reading(sample);
                    }

                    thread::sleep(interval);
                }
            })?;

        self.producer = Some(handle);
        log::debug!("Simulated {} source running every {:?}", self.kind, interval);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                log::error!("Simulated {} producer panicked", self.kind);
            }
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}
