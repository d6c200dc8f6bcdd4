// Experiment configuration
//
// Describes which buffers exist, which sensors feed them and which plots read
// them. Loaded from JSON or built from `Default`.

use crate::error::{StreamError, StreamResult};
use crate::types::SensorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default render budget for a plot
pub const DEFAULT_MAX_POINTS: usize = 3000;

/// A named channel buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BufferConfig {
    pub name: String,
    /// Ring size; 0 means unbounded
    #[serde(default)]
    pub size: usize,
}

/// Buffer names a sensor writes to, per channel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelOutputs {
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default)]
    pub z: Option<String>,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub abs: Option<String>,
    #[serde(default)]
    pub accuracy: Option<String>,
}

impl ChannelOutputs {
    fn names(&self) -> impl Iterator<Item = &String> {
        [
            &self.x,
            &self.y,
            &self.z,
            &self.t,
            &self.abs,
            &self.accuracy,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorConfig {
    #[serde(rename = "type")]
    pub kind: SensorKind,
    /// Requested update rate in Hz; also the averaging window when `average` is set
    pub rate_hz: f64,
    #[serde(default)]
    pub average: bool,
    #[serde(default = "default_true")]
    pub calibrated: bool,
    pub outputs: ChannelOutputs,
}

impl SensorConfig {
    /// Interval between updates in seconds
    pub fn interval_seconds(&self) -> f64 {
        1.0 / self.rate_hz
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlotConfig {
    pub name: String,
    /// When absent, x is the sample index
    #[serde(default)]
    pub x_buffer: Option<String>,
    pub y_buffer: String,
    #[serde(default)]
    pub log_x: bool,
    #[serde(default)]
    pub log_y: bool,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub title: String,
    pub buffers: Vec<BufferConfig>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub plots: Vec<PlotConfig>,
    /// Sleep between polls of an empty sensor queue
    #[serde(default = "default_backoff_ms")]
    pub queue_backoff_ms: u64,
    /// Display tick period for plot updates
    #[serde(default = "default_display_interval_ms")]
    pub display_interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_points() -> usize {
    DEFAULT_MAX_POINTS
}

fn default_backoff_ms() -> u64 {
    1
}

fn default_display_interval_ms() -> u64 {
    16
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let buffer = |name: &str| BufferConfig {
            name: name.to_string(),
            size: 0,
        };

        Self {
            title: "Acceleration".to_string(),
            buffers: vec![
                buffer("accX"),
                buffer("accY"),
                buffer("accZ"),
                buffer("acc_time"),
                buffer("acc"),
            ],
            sensors: vec![SensorConfig {
                kind: SensorKind::Accelerometer,
                rate_hz: 100.0,
                average: false,
                calibrated: true,
                outputs: ChannelOutputs {
                    x: Some("accX".to_string()),
                    y: Some("accY".to_string()),
                    z: Some("accZ".to_string()),
                    t: Some("acc_time".to_string()),
                    abs: Some("acc".to_string()),
                    accuracy: None,
                },
            }],
            plots: vec![PlotConfig {
                name: "Absolute acceleration".to_string(),
                x_buffer: Some("acc_time".to_string()),
                y_buffer: "acc".to_string(),
                log_x: false,
                log_y: false,
                max_points: DEFAULT_MAX_POINTS,
            }],
            queue_backoff_ms: default_backoff_ms(),
            display_interval_ms: default_display_interval_ms(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_json_str(json: &str) -> StreamResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> StreamResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> StreamResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check cross references and numeric ranges
    pub fn validate(&self) -> StreamResult<()> {
        let mut names = HashSet::new();
        for buffer in &self.buffers {
            if buffer.name.is_empty() {
                return Err(StreamError::InvalidConfig(
                    "Buffer name must not be empty".to_string(),
                ));
            }
            if !names.insert(buffer.name.as_str()) {
                return Err(StreamError::InvalidConfig(format!(
                    "Duplicate buffer name '{}'",
                    buffer.name
                )));
            }
        }

        let known = |name: &String| -> StreamResult<()> {
            if names.contains(name.as_str()) {
                Ok(())
            } else {
                Err(StreamError::InvalidConfig(format!(
                    "Reference to undefined buffer '{}'",
                    name
                )))
            }
        };

        for sensor in &self.sensors {
            if !(sensor.rate_hz.is_finite() && sensor.rate_hz > 0.0) {
                return Err(StreamError::InvalidConfig(format!(
                    "Sensor {} has invalid rate {}",
                    sensor.kind, sensor.rate_hz
                )));
            }
            for name in sensor.outputs.names() {
                known(name)?;
            }
        }

        for plot in &self.plots {
            known(&plot.y_buffer)?;
            if let Some(x) = &plot.x_buffer {
                known(x)?;
            }
            if plot.max_points < 2 {
                return Err(StreamError::InvalidConfig(format!(
                    "Plot '{}' needs max_points >= 2, got {}",
                    plot.name, plot.max_points
                )));
            }
        }

        if self.display_interval_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "display_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
