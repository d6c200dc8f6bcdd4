// Common types shared by the producer and consumer sides of the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Standard gravity with the sign convention of the motion hardware (m/s² per g).
pub const STANDARD_GRAVITY: f64 = -9.81;

/// Physical sensor types the pipeline knows how to drive
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    LinearAcceleration,
    MagneticField,
    Pressure,
    Light,
    Proximity,
}

impl SensorKind {
    pub const ALL: [SensorKind; 7] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::LinearAcceleration,
        SensorKind::MagneticField,
        SensorKind::Pressure,
        SensorKind::Light,
        SensorKind::Proximity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::LinearAcceleration => "linear_acceleration",
            SensorKind::MagneticField => "magnetic_field",
            SensorKind::Pressure => "pressure",
            SensorKind::Light => "light",
            SensorKind::Proximity => "proximity",
        }
    }

    /// Unit of the values written to the x/y/z buffers
    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer | SensorKind::LinearAcceleration => "m/s²",
            SensorKind::Gyroscope => "rad/s",
            SensorKind::MagneticField => "µT",
            SensorKind::Pressure => "hPa",
            SensorKind::Light => "lx",
            SensorKind::Proximity => "cm",
        }
    }

    /// Number of vector components the sensor reports (1 for scalar sensors)
    pub fn components(&self) -> usize {
        match self {
            SensorKind::Accelerometer
            | SensorKind::Gyroscope
            | SensorKind::LinearAcceleration
            | SensorKind::MagneticField => 3,
            SensorKind::Pressure | SensorKind::Light | SensorKind::Proximity => 1,
        }
    }

    /// Convert a raw hardware reading into the units written to the buffers.
    ///
    /// Acceleration sensors report in g; everything else is passed through.
    pub fn scale_reading(&self, sample: Sample) -> Sample {
        match self {
            SensorKind::Accelerometer | SensorKind::LinearAcceleration => Sample {
                x: sample.x.map(|v| v * STANDARD_GRAVITY),
                y: sample.y.map(|v| v * STANDARD_GRAVITY),
                z: sample.z.map(|v| v * STANDARD_GRAVITY),
                ..sample
            },
            _ => sample,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown sensor type '{}'", s))
    }
}

/// Calibration state reported by sensors that track it (magnetometer)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Uncalibrated,
    Low,
    Medium,
    High,
}

impl Accuracy {
    /// Numeric encoding written to accuracy buffers
    pub fn as_value(&self) -> f64 {
        match self {
            Accuracy::Uncalibrated => -1.0,
            Accuracy::Low => 1.0,
            Accuracy::Medium => 2.0,
            Accuracy::High => 3.0,
        }
    }
}

/// One physical reading. Every channel except the timestamp is optional.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Sample {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub accuracy: Option<f64>,
    /// Hardware timestamp in seconds
    pub t: f64,
}

impl Sample {
    pub fn vector(x: f64, y: f64, z: f64, t: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            accuracy: None,
            t,
        }
    }

    pub fn scalar(value: f64, t: f64) -> Self {
        Self {
            x: Some(value),
            t,
            ..Default::default()
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Euclidean norm, only defined when all three components are present
    pub fn magnitude(&self) -> Option<f64> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Some((x * x + y * y + z * z).sqrt()),
            _ => None,
        }
    }

    /// True when the vector components that are present are all exactly zero
    pub fn is_zero_vector(&self) -> bool {
        [self.x, self.y, self.z]
            .iter()
            .all(|c| c.map_or(true, |v| v == 0.0))
    }
}

/// Message delivered by a sensor source into its per-sensor queue
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Reading(Sample),
    /// The callback carried an error; the whole callback is dropped.
    Fault(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_kind_round_trip_names() {
        for kind in SensorKind::ALL {
            assert_eq!(kind.as_str().parse::<SensorKind>().unwrap(), kind);
        }
        assert!("barometer".parse::<SensorKind>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&SensorKind::MagneticField).unwrap();
        assert_eq!(json, "\"magnetic_field\"");
    }

    #[test]
    fn test_acceleration_scaled_to_si() {
        let raw = Sample::vector(1.0, 0.0, -0.5, 2.0);
        let scaled = SensorKind::Accelerometer.scale_reading(raw);
        assert_eq!(scaled.x, Some(-9.81));
        assert_eq!(scaled.y, Some(-0.0));
        assert_eq!(scaled.z, Some(4.905));
        assert_eq!(scaled.t, 2.0);

        let gyro = SensorKind::Gyroscope.scale_reading(raw);
        assert_eq!(gyro, raw);
    }

    #[test]
    fn test_magnitude_requires_all_components() {
        assert_eq!(Sample::vector(3.0, 4.0, 0.0, 0.0).magnitude(), Some(5.0));
        assert_eq!(Sample::scalar(3.0, 0.0).magnitude(), None);
    }

    #[test]
    fn test_accuracy_encoding() {
        assert_eq!(Accuracy::Uncalibrated.as_value(), -1.0);
        assert_eq!(Accuracy::High.as_value(), 3.0);
    }
}
