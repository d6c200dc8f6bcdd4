// Pluggable sensor sources and the per-sensor worker
//
// A `SensorSource` delivers raw readings into a `SensorSink` from whatever
// thread the platform calls back on. The sink enqueues them into a
// per-sensor `ConcurrentQueue`; a dedicated worker thread drains that queue
// into the averaging engine, so all engine state changes happen on one
// thread in arrival order.
//
// Current implementations:
// - Simulated: deterministic waveform on a producer thread
// - Scripted: replays a fixed list of readings on start

mod scripted;
mod simulated;

pub use scripted::ScriptedSource;
pub use simulated::SimulatedSource;

use crate::averaging::{SensorAveragingEngine, SensorStats};
use crate::error::{StreamError, StreamResult};
use crate::queue::ConcurrentQueue;
use crate::types::{Sample, SensorEvent, SensorKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Events handled per worker wakeup before stats are published
const WORKER_BATCH: usize = 256;

/// How a source is asked to deliver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRequest {
    /// Seconds between updates; 0 means as fast as the hardware allows
    pub interval: f64,
    pub calibrated: bool,
}

/// Platform sensor abstraction
///
/// Implementations must be `Send` so the owning input can move between
/// threads. Readings are pushed through the sink; after `stop()` returns the
/// source must not push any more events.
pub trait SensorSource: Send {
    fn kind(&self) -> SensorKind;

    fn is_available(&self) -> bool;

    fn start(&mut self, request: SensorRequest, sink: SensorSink) -> StreamResult<()>;

    fn stop(&mut self);
}

/// Entry point for readings coming from a source callback
#[derive(Clone)]
pub struct SensorSink {
    kind: SensorKind,
    calibrated: bool,
    queue: Arc<ConcurrentQueue<SensorEvent>>,
    accepting: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
}

impl SensorSink {
    fn new(
        kind: SensorKind,
        calibrated: bool,
        queue: Arc<ConcurrentQueue<SensorEvent>>,
        accepting: Arc<AtomicBool>,
    ) -> Self {
        Self {
            kind,
            calibrated,
            queue,
            accepting,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Push one raw reading in sensor units. Returns false if it was dropped.
    pub fn push_reading(&self, raw: Sample) -> bool {
        if !self.is_accepting() {
            return false;
        }

        // A calibrated magnetometer reports exact zeros until it has settled
        if self.kind == SensorKind::MagneticField
            && self.calibrated
            && !self.ready.load(Ordering::Acquire)
        {
            if raw.is_zero_vector() {
                return false;
            }
            self.ready.store(true, Ordering::Release);
        }

        self.queue
            .enqueue(SensorEvent::Reading(self.kind.scale_reading(raw)));
        true
    }

    /// Report a failed callback; the worker drops it and logs the message
    pub fn push_fault(&self, message: impl Into<String>) -> bool {
        if !self.is_accepting() {
            return false;
        }
        self.queue.enqueue(SensorEvent::Fault(message.into()));
        true
    }

    /// Deliver a callback result as the platform hands it over
    pub fn deliver(&self, result: Result<Sample, String>) -> bool {
        match result {
            Ok(sample) => self.push_reading(sample),
            Err(message) => self.push_fault(message),
        }
    }
}

/// One configured sensor: its source, queue, engine and worker
pub struct SensorInput {
    kind: SensorKind,
    rate_hz: f64,
    average: bool,
    calibrated: bool,
    source: Box<dyn SensorSource>,
    queue: Arc<ConcurrentQueue<SensorEvent>>,
    accepting: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    engine: Arc<Mutex<SensorAveragingEngine>>,
    worker: Option<JoinHandle<()>>,
    poll_interval: Duration,
}

impl SensorInput {
    pub fn new(
        source: Box<dyn SensorSource>,
        rate_hz: f64,
        average: bool,
        calibrated: bool,
        engine: SensorAveragingEngine,
        poll_interval: Duration,
    ) -> Self {
        Self {
            kind: source.kind(),
            rate_hz,
            average,
            calibrated,
            source,
            queue: Arc::new(ConcurrentQueue::new()),
            accepting: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            engine: Arc::new(Mutex::new(engine)),
            worker: None,
            poll_interval,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    pub fn is_averaging(&self) -> bool {
        self.average
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Interval requested from the source. Averaging asks for the fastest rate.
    pub fn effective_interval(&self) -> f64 {
        if self.average {
            0.0
        } else {
            1.0 / self.rate_hz
        }
    }

    pub fn stats(&self) -> SensorStats {
        self.engine.lock().stats().clone()
    }

    /// Events enqueued but not yet processed
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn verify_availability(&self) -> StreamResult<()> {
        if self.source.is_available() {
            Ok(())
        } else {
            Err(StreamError::SensorUnavailable(self.kind))
        }
    }

    pub fn start(&mut self) -> StreamResult<()> {
        if self.worker.is_some() {
            return Err(StreamError::AlreadyRunning);
        }
        self.verify_availability()?;

        self.engine.lock().reset();
        self.running.store(true, Ordering::Release);

        let worker = {
            let queue = Arc::clone(&self.queue);
            let running = Arc::clone(&self.running);
            let engine = Arc::clone(&self.engine);
            let poll_interval = self.poll_interval;
            thread::Builder::new()
                .name(format!("sensor-{}-worker", self.kind))
                .spawn(move || run_worker(queue, running, engine, poll_interval))
        };
        self.worker = Some(match worker {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        });

        self.accepting.store(true, Ordering::Release);
        let sink = SensorSink::new(
            self.kind,
            self.calibrated,
            Arc::clone(&self.queue),
            Arc::clone(&self.accepting),
        );
        let request = SensorRequest {
            interval: self.effective_interval(),
            calibrated: self.calibrated,
        };

        if let Err(e) = self.source.start(request, sink) {
            log::error!("Failed to start {} source: {}", self.kind, e);
            self.accepting.store(false, Ordering::Release);
            self.join_worker()?;
            return Err(e);
        }

        log::info!(
            "Sensor {} started (interval {:.4}s, averaging {})",
            self.kind,
            request.interval,
            self.average
        );
        Ok(())
    }

    /// Stop the source, drain what was already enqueued and join the worker.
    /// A partial averaging window is discarded.
    pub fn stop(&mut self) -> StreamResult<()> {
        if self.worker.is_none() {
            return Ok(());
        }

        self.accepting.store(false, Ordering::Release);
        self.source.stop();
        self.join_worker()?;
        self.engine.lock().reset();

        log::info!("Sensor {} stopped", self.kind);
        Ok(())
    }

    /// Drop queued events and reset the engine
    pub fn clear(&mut self) {
        self.queue.clear();
        self.engine.lock().reset();
    }

    fn join_worker(&mut self) -> StreamResult<()> {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        handle.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            StreamError::WorkerPanicked(message)
        })
    }
}

impl Drop for SensorInput {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Sensor {} did not stop cleanly: {}", self.kind, e);
        }
    }
}

fn run_worker(
    queue: Arc<ConcurrentQueue<SensorEvent>>,
    running: Arc<AtomicBool>,
    engine: Arc<Mutex<SensorAveragingEngine>>,
    poll_interval: Duration,
) {
    let idle_wait = poll_interval * 4;

    loop {
        match queue.dequeue_timeout(idle_wait, poll_interval) {
            Some(first) => {
                let mut engine = engine.lock();
                engine.process(first);
                for event in queue.drain(WORKER_BATCH) {
                    engine.process(event);
                }
            }
            None if !running.load(Ordering::Acquire) => break,
            None => {}
        }
    }

    // Anything that slipped in between the last poll and shutdown
    let remaining = queue.drain(usize::MAX);
    if !remaining.is_empty() {
        let mut engine = engine.lock();
        for event in remaining {
            engine.process(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BufferRegistry;
    use crate::writer::{ChannelBindings, ChannelWriter};

    fn input(
        source: Box<dyn SensorSource>,
        average: bool,
    ) -> (Arc<BufferRegistry>, SensorInput) {
        let mut registry = BufferRegistry::new();
        let bindings = ChannelBindings {
            x: Some(registry.insert("x", 0).unwrap()),
            t: Some(registry.insert("t", 0).unwrap()),
            ..Default::default()
        };
        let registry = Arc::new(registry);
        let writer = ChannelWriter::new(Arc::downgrade(&registry), bindings);
        let window = average.then_some(0.5);
        let engine = SensorAveragingEngine::new("test", writer, window);
        let input = SensorInput::new(
            source,
            2.0,
            average,
            true,
            engine,
            Duration::from_millis(1),
        );
        (registry, input)
    }

    #[test]
    fn test_scripted_readings_reach_buffers() {
        let readings = (0..5)
            .map(|i| Ok(Sample::scalar(i as f64, 10.0 + i as f64 * 0.1)))
            .collect();
        let source = ScriptedSource::new(SensorKind::Pressure, readings);
        let (registry, mut input) = input(Box::new(source), false);

        input.start().unwrap();
        input.stop().unwrap();

        assert_eq!(
            registry.by_name("x").unwrap().to_vec(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0]
        );
        assert_eq!(input.stats().samples_written, 5);
        assert_eq!(input.pending(), 0);
    }

    #[test]
    fn test_faults_are_dropped() {
        let readings = vec![
            Ok(Sample::scalar(1.0, 0.0)),
            Err("timeout".to_string()),
            Ok(Sample::scalar(2.0, 0.1)),
        ];
        let source = ScriptedSource::new(SensorKind::Light, readings);
        let (registry, mut input) = input(Box::new(source), false);

        input.start().unwrap();
        input.stop().unwrap();

        assert_eq!(registry.by_name("x").unwrap().to_vec(), vec![1.0, 2.0]);
        let stats = input.stats();
        assert_eq!(stats.faults_dropped, 1);
        assert_eq!(stats.readings_processed, 2);
    }

    #[test]
    fn test_unavailable_sensor() {
        let source = ScriptedSource::unavailable(SensorKind::Gyroscope);
        let (_registry, mut input) = input(Box::new(source), false);

        assert!(matches!(
            input.start(),
            Err(StreamError::SensorUnavailable(SensorKind::Gyroscope))
        ));
        assert!(!input.is_running());
    }

    #[test]
    fn test_double_start_rejected() {
        let source = SimulatedSource::new(SensorKind::Pressure);
        let (_registry, mut input) = input(Box::new(source), false);

        input.start().unwrap();
        assert!(matches!(input.start(), Err(StreamError::AlreadyRunning)));
        input.stop().unwrap();
        input.stop().unwrap();
    }

    #[test]
    fn test_effective_interval() {
        let (_r, plain) = input(Box::new(SimulatedSource::new(SensorKind::Light)), false);
        assert_eq!(plain.effective_interval(), 0.5);

        let (_r, averaged) = input(Box::new(SimulatedSource::new(SensorKind::Light)), true);
        assert_eq!(averaged.effective_interval(), 0.0);
    }

    #[test]
    fn test_magnetometer_waits_for_first_nonzero() {
        let queue = Arc::new(ConcurrentQueue::new());
        let accepting = Arc::new(AtomicBool::new(true));
        let sink = SensorSink::new(
            SensorKind::MagneticField,
            true,
            Arc::clone(&queue),
            Arc::clone(&accepting),
        );

        assert!(!sink.push_reading(Sample::vector(0.0, 0.0, 0.0, 0.0)));
        assert!(sink.push_reading(Sample::vector(20.0, 0.0, -40.0, 0.1)));
        // Once ready, zeros are real readings
        assert!(sink.push_reading(Sample::vector(0.0, 0.0, 0.0, 0.2)));
        assert_eq!(queue.len(), 2);

        accepting.store(false, Ordering::Release);
        assert!(!sink.push_reading(Sample::vector(1.0, 1.0, 1.0, 0.3)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_accelerometer_scaled_at_sink() {
        let queue = Arc::new(ConcurrentQueue::new());
        let sink = SensorSink::new(
            SensorKind::Accelerometer,
            true,
            Arc::clone(&queue),
            Arc::new(AtomicBool::new(true)),
        );

        sink.push_reading(Sample::vector(0.0, 0.0, 1.0, 0.0));
        match queue.dequeue() {
            Some(SensorEvent::Reading(sample)) => assert_eq!(sample.z, Some(-9.81)),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
