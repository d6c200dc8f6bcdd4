// Experiment lifecycle
//
// The experiment owns the buffer registry, the sensor inputs feeding it and
// the plots reading from it. Sensor inputs only hold weak references to the
// registry, so dropping the experiment releases every buffer.

use crate::averaging::{SensorAveragingEngine, SensorStats};
use crate::buffer::{BufferMetrics, SampleBuffer};
use crate::config::{ChannelOutputs, ExperimentConfig, SensorConfig};
use crate::error::{StreamError, StreamResult};
use crate::plot::{PlotSummary, PlotUpdate, StreamPlot};
use crate::registry::{BufferHandle, BufferRegistry};
use crate::sensor::{SensorInput, SensorSource};
use crate::types::SensorKind;
use crate::writer::{ChannelBindings, ChannelWriter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    Idle,
    Running,
    Paused,
}

/// Per-buffer line of an experiment report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferReport {
    pub name: String,
    pub metrics: BufferMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReport {
    pub kind: SensorKind,
    pub rate_hz: f64,
    pub averaging: bool,
    pub stats: SensorStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub id: Uuid,
    pub title: String,
    pub state: ExperimentState,
    pub elapsed_seconds: f64,
    pub buffers: Vec<BufferReport>,
    pub sensors: Vec<SensorReport>,
    pub plots: Vec<PlotSummary>,
}

/// Experiment clock that does not advance while paused
#[derive(Debug, Default)]
struct ExperimentClock {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl ExperimentClock {
    fn resume(&mut self, now: Instant) {
        match (self.started, self.paused_at.take()) {
            (None, _) => self.started = Some(now),
            (Some(_), Some(paused_at)) => self.paused_total += now - paused_at,
            (Some(_), None) => {}
        }
    }

    fn pause(&mut self, now: Instant) {
        if self.started.is_some() && self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    fn elapsed(&self, now: Instant) -> f64 {
        let Some(started) = self.started else {
            return 0.0;
        };
        let end = self.paused_at.unwrap_or(now);
        end.saturating_duration_since(started)
            .saturating_sub(self.paused_total)
            .as_secs_f64()
    }
}

pub struct Experiment {
    id: Uuid,
    title: String,
    registry: Arc<BufferRegistry>,
    sensors: Vec<SensorInput>,
    plots: Vec<StreamPlot>,
    state: ExperimentState,
    clock: ExperimentClock,
    display_interval: Duration,
}

impl Experiment {
    /// Build an experiment; `make_source` supplies the hardware for each sensor
    pub fn from_config<F>(config: &ExperimentConfig, mut make_source: F) -> StreamResult<Self>
    where
        F: FnMut(&SensorConfig) -> Box<dyn SensorSource>,
    {
        config.validate()?;

        let registry = Arc::new(BufferRegistry::from_configs(&config.buffers)?);
        let poll_interval = Duration::from_millis(config.queue_backoff_ms.max(1));

        let mut sensors = Vec::with_capacity(config.sensors.len());
        for sensor in &config.sensors {
            let source = make_source(sensor);
            if source.kind() != sensor.kind {
                return Err(StreamError::InvalidConfig(format!(
                    "Source for {} reports kind {}",
                    sensor.kind,
                    source.kind()
                )));
            }

            let bindings = bind_outputs(&registry, &sensor.outputs)?;
            let writer = ChannelWriter::new(Arc::downgrade(&registry), bindings);
            let window = sensor.average.then(|| sensor.interval_seconds());
            let engine = SensorAveragingEngine::new(sensor.kind.as_str(), writer, window);

            sensors.push(SensorInput::new(
                source,
                sensor.rate_hz,
                sensor.average,
                sensor.calibrated,
                engine,
                poll_interval,
            ));
        }

        let mut plots = Vec::with_capacity(config.plots.len());
        for plot in &config.plots {
            let y = shared_buffer(&registry, &plot.y_buffer)?;
            let x = plot
                .x_buffer
                .as_deref()
                .map(|name| shared_buffer(&registry, name))
                .transpose()?;
            plots.push(StreamPlot::new(
                &plot.name,
                x,
                y,
                plot.log_x,
                plot.log_y,
                plot.max_points,
            ));
        }

        let id = Uuid::new_v4();
        log::info!(
            "Experiment {} '{}' created: {} buffers, {} sensors, {} plots",
            id,
            config.title,
            registry.len(),
            sensors.len(),
            plots.len()
        );

        Ok(Self {
            id,
            title: config.title.clone(),
            registry,
            sensors,
            plots,
            state: ExperimentState::Idle,
            clock: ExperimentClock::default(),
            display_interval: Duration::from_millis(config.display_interval_ms),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ExperimentState::Running
    }

    pub fn buffers(&self) -> &BufferRegistry {
        &self.registry
    }

    pub fn sensors(&self) -> &[SensorInput] {
        &self.sensors
    }

    pub fn plots(&self) -> &[StreamPlot] {
        &self.plots
    }

    pub fn plot(&self, name: &str) -> Option<&StreamPlot> {
        self.plots.iter().find(|plot| plot.name() == name)
    }

    pub fn display_interval(&self) -> Duration {
        self.display_interval
    }

    /// Elapsed experiment time in seconds, excluding pauses
    pub fn current_timestamp(&self) -> f64 {
        self.clock.elapsed(Instant::now())
    }

    /// Start every sensor. Availability is checked for all sensors first;
    /// on any failure nothing keeps running.
    pub fn start(&mut self) -> StreamResult<()> {
        if self.state == ExperimentState::Running {
            return Ok(());
        }

        for sensor in &self.sensors {
            if let Err(e) = sensor.verify_availability() {
                log::error!("Experiment {} cannot start: {}", self.id, e);
                return Err(e);
            }
        }

        for i in 0..self.sensors.len() {
            if let Err(e) = self.sensors[i].start() {
                log::error!("Experiment {} failed to start sensor: {}", self.id, e);
                for started in &mut self.sensors[..i] {
                    if let Err(stop_err) = started.stop() {
                        log::warn!("Rollback stop failed: {}", stop_err);
                    }
                }
                return Err(e);
            }
        }

        self.clock.resume(Instant::now());
        self.state = ExperimentState::Running;
        log::info!("Experiment {} running", self.id);
        Ok(())
    }

    /// Stop every sensor and freeze the clock. Data already enqueued is still
    /// written before this returns.
    pub fn stop(&mut self) -> StreamResult<()> {
        if self.state != ExperimentState::Running {
            return Ok(());
        }

        let mut first_error = None;
        for sensor in &mut self.sensors {
            if let Err(e) = sensor.stop() {
                log::error!("Sensor {} failed to stop: {}", sensor.kind(), e);
                first_error.get_or_insert(e);
            }
        }

        self.clock.pause(Instant::now());
        self.state = ExperimentState::Paused;
        log::info!(
            "Experiment {} paused at {:.3}s",
            self.id,
            self.current_timestamp()
        );

        first_error.map_or(Ok(()), Err)
    }

    /// Stop, reset the clock and empty every buffer
    pub fn clear(&mut self) -> StreamResult<()> {
        let stopped = self.stop();

        self.clock = ExperimentClock::default();
        self.registry.clear_all();
        for sensor in &mut self.sensors {
            sensor.clear();
        }
        self.state = ExperimentState::Idle;
        log::info!("Experiment {} cleared", self.id);

        stopped
    }

    /// One display tick: update every plot that has pending data
    pub fn update_plots(&mut self) -> Vec<(usize, PlotUpdate)> {
        let mut updates = Vec::new();
        for (index, plot) in self.plots.iter_mut().enumerate() {
            // Errors are logged by the plot, which stays halted until reset
            if let Ok(Some(update)) = plot.tick() {
                updates.push((index, update));
            }
        }
        updates
    }

    /// Resume halted plots from the data still held by their buffers
    pub fn reset_plots(&mut self) {
        for plot in &mut self.plots {
            plot.reset();
        }
    }

    /// Run display ticks until `duration` has passed, handing every update to
    /// `on_update` together with the plot it belongs to
    pub fn run_display_loop<F>(&mut self, duration: Duration, mut on_update: F)
    where
        F: FnMut(&StreamPlot, &PlotUpdate),
    {
        let deadline = Instant::now() + duration;
        loop {
            for (index, update) in self.update_plots() {
                on_update(&self.plots[index], &update);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.display_interval.min(deadline - now));
        }
    }

    pub fn report(&self) -> ExperimentReport {
        ExperimentReport {
            id: self.id,
            title: self.title.clone(),
            state: self.state,
            elapsed_seconds: self.current_timestamp(),
            buffers: self
                .registry
                .iter()
                .map(|buffer| BufferReport {
                    name: buffer.name().to_string(),
                    metrics: buffer.metrics(),
                })
                .collect(),
            sensors: self
                .sensors
                .iter()
                .map(|sensor| SensorReport {
                    kind: sensor.kind(),
                    rate_hz: sensor.rate_hz(),
                    averaging: sensor.is_averaging(),
                    stats: sensor.stats(),
                })
                .collect(),
            plots: self.plots.iter().map(StreamPlot::summary).collect(),
        }
    }
}

impl Drop for Experiment {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Experiment {} dropped with errors: {}", self.id, e);
        }
    }
}

fn bind_outputs(
    registry: &BufferRegistry,
    outputs: &ChannelOutputs,
) -> StreamResult<ChannelBindings> {
    let bind = |name: &Option<String>| -> StreamResult<Option<BufferHandle>> {
        name.as_deref().map(|n| registry.handle(n)).transpose()
    };
    Ok(ChannelBindings {
        x: bind(&outputs.x)?,
        y: bind(&outputs.y)?,
        z: bind(&outputs.z)?,
        t: bind(&outputs.t)?,
        abs: bind(&outputs.abs)?,
        accuracy: bind(&outputs.accuracy)?,
    })
}

fn shared_buffer(registry: &BufferRegistry, name: &str) -> StreamResult<Arc<SampleBuffer>> {
    let handle = registry.handle(name)?;
    registry
        .shared(handle)
        .ok_or_else(|| StreamError::UnknownBuffer(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{ScriptedSource, SimulatedSource};
    use crate::types::Sample;

    fn scripted_config() -> ExperimentConfig {
        let json = r#"{
            "title": "Light",
            "buffers": [{"name": "lux"}, {"name": "t"}],
            "sensors": [{
                "type": "light",
                "rate_hz": 10,
                "outputs": {"x": "lux", "t": "t"}
            }],
            "plots": [{"name": "Illuminance", "x_buffer": "t", "y_buffer": "lux"}]
        }"#;
        ExperimentConfig::from_json_str(json).unwrap()
    }

    fn scripted(values: &[(f64, f64)]) -> impl FnMut(&SensorConfig) -> Box<dyn SensorSource> {
        let script: Vec<_> = values
            .iter()
            .map(|&(value, t)| Ok(Sample::scalar(value, t)))
            .collect();
        move |config: &SensorConfig| -> Box<dyn SensorSource> {
            Box::new(ScriptedSource::new(config.kind, script.clone()))
        }
    }

    #[test]
    fn test_start_stop_clear() {
        let config = scripted_config();
        let mut experiment =
            Experiment::from_config(&config, scripted(&[(100.0, 50.0), (120.0, 50.5)])).unwrap();
        assert_eq!(experiment.state(), ExperimentState::Idle);
        assert_eq!(experiment.current_timestamp(), 0.0);

        experiment.start().unwrap();
        assert!(experiment.is_running());
        experiment.stop().unwrap();
        assert_eq!(experiment.state(), ExperimentState::Paused);

        let buffers = experiment.buffers();
        assert_eq!(buffers.by_name("lux").unwrap().to_vec(), vec![100.0, 120.0]);
        assert_eq!(buffers.by_name("t").unwrap().to_vec(), vec![0.0, 0.5]);

        let updates = experiment.update_plots();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            experiment.plot("Illuminance").unwrap().collection().max().y,
            120.0
        );

        experiment.clear().unwrap();
        assert_eq!(experiment.state(), ExperimentState::Idle);
        assert!(experiment.buffers().iter().all(|b| b.is_empty()));
        assert_eq!(experiment.update_plots(), vec![(0, PlotUpdate::Cleared)]);
    }

    #[test]
    fn test_resume_continues_time_axis() {
        let config = scripted_config();
        let mut experiment =
            Experiment::from_config(&config, scripted(&[(1.0, 10.0), (2.0, 11.0)])).unwrap();

        experiment.start().unwrap();
        experiment.stop().unwrap();
        // The script replays with the same hardware timestamps
        experiment.start().unwrap();
        experiment.stop().unwrap();

        assert_eq!(
            experiment.buffers().by_name("t").unwrap().to_vec(),
            vec![0.0, 1.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_unavailable_sensor_blocks_start() {
        let mut config = scripted_config();
        let mut second = config.sensors[0].clone();
        second.kind = SensorKind::Proximity;
        config.sensors.push(second);

        let mut experiment = Experiment::from_config(&config, |sensor| {
            if sensor.kind == SensorKind::Proximity {
                Box::new(ScriptedSource::unavailable(sensor.kind)) as Box<dyn SensorSource>
            } else {
                Box::new(SimulatedSource::new(sensor.kind))
            }
        })
        .unwrap();

        assert!(matches!(
            experiment.start(),
            Err(StreamError::SensorUnavailable(SensorKind::Proximity))
        ));
        assert_eq!(experiment.state(), ExperimentState::Idle);
        assert!(experiment.sensors().iter().all(|s| !s.is_running()));
    }

    #[test]
    fn test_mismatched_source_rejected() {
        let config = scripted_config();
        let result = Experiment::from_config(&config, |_| {
            Box::new(SimulatedSource::new(SensorKind::Pressure)) as Box<dyn SensorSource>
        });
        assert!(matches!(result, Err(StreamError::InvalidConfig(_))));
    }

    #[test]
    fn test_clock_excludes_pauses() {
        let origin = Instant::now();
        let mut clock = ExperimentClock::default();
        assert_eq!(clock.elapsed(origin), 0.0);

        clock.resume(origin);
        clock.pause(origin + Duration::from_secs(2));
        assert_eq!(clock.elapsed(origin + Duration::from_secs(10)), 2.0);

        clock.resume(origin + Duration::from_secs(10));
        assert_eq!(clock.elapsed(origin + Duration::from_secs(11)), 3.0);
    }

    #[test]
    fn test_report_lists_everything() {
        let config = scripted_config();
        let mut experiment = Experiment::from_config(&config, scripted(&[(5.0, 0.0)])).unwrap();
        experiment.start().unwrap();
        experiment.stop().unwrap();
        experiment.update_plots();

        let report = experiment.report();
        assert_eq!(report.title, "Light");
        assert_eq!(report.buffers.len(), 2);
        assert_eq!(report.buffers[0].metrics.total_appended, 1);
        assert_eq!(report.sensors[0].stats.samples_written, 1);
        assert_eq!(report.plots[0].represented_points, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "paused");
    }
}
