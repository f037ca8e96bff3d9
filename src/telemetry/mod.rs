//! Telemetry primitives: metric identifiers, samples, frames and sources.

pub mod clock;
pub mod feed;
pub mod simulator;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SentinelError;

/// Every metric the settlement streams into the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Oxygen, percent of atmosphere.
    Oxygen,
    /// Carbon dioxide, ppm.
    Co2,
    /// Cabin pressure, kPa.
    Pressure,
    /// Dose rate, mSv/hr.
    Radiation,
    /// Stored energy, kWh.
    Battery,
    /// Solar generation, kW.
    Solar,
    /// Power draw, kW.
    Load,
    /// Cabin temperature, °C.
    Temperature,
    /// Relative humidity, percent.
    Humidity,
    /// Crop health index, 0-100.
    CropHealth,
    /// Radiation shielding effectiveness, percent.
    Shielding,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::Oxygen,
        Metric::Co2,
        Metric::Pressure,
        Metric::Radiation,
        Metric::Battery,
        Metric::Solar,
        Metric::Load,
        Metric::Temperature,
        Metric::Humidity,
        Metric::CropHealth,
        Metric::Shielding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Oxygen => "oxygen",
            Metric::Co2 => "co2",
            Metric::Pressure => "pressure",
            Metric::Radiation => "radiation",
            Metric::Battery => "battery",
            Metric::Solar => "solar",
            Metric::Load => "load",
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::CropHealth => "crop_health",
            Metric::Shielding => "shielding",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Oxygen | Metric::Humidity | Metric::Shielding => "%",
            Metric::Co2 => "ppm",
            Metric::Pressure => "kPa",
            Metric::Radiation => "mSv/hr",
            Metric::Battery => "kWh",
            Metric::Solar | Metric::Load => "kW",
            Metric::Temperature => "°C",
            Metric::CropHealth => "",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SentinelError::validation(format!("unknown metric '{}'", s)))
    }
}

/// One reading of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric: Metric,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(metric: Metric, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric,
            value,
            timestamp,
        }
    }

    /// Build a sample from a raw metric id, rejecting unknown ids and
    /// non-finite values.
    pub fn parse(metric: &str, value: f64, timestamp: DateTime<Utc>) -> Result<Self, SentinelError> {
        let sample = Self::new(metric.parse()?, value, timestamp);
        sample.validate()?;
        Ok(sample)
    }

    pub fn validate(&self) -> Result<(), SentinelError> {
        if !self.value.is_finite() {
            return Err(SentinelError::validation(format!(
                "malformed sample for {}: value {} is not finite",
                self.metric, self.value
            )));
        }
        Ok(())
    }
}

/// The latest known value of every metric at an instant. Any metric may be
/// missing; rules over a missing metric are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub values: BTreeMap<Metric, f64>,
}

impl TelemetryFrame {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Nominal settlement conditions: everything inside its optimal band.
    pub fn nominal(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp)
            .with(Metric::Oxygen, 21.0)
            .with(Metric::Co2, 400.0)
            .with(Metric::Pressure, 101.325)
            .with(Metric::Radiation, 0.02)
            .with(Metric::Battery, 75.0)
            .with(Metric::Solar, 1000.0)
            .with(Metric::Load, 800.0)
            .with(Metric::Temperature, 20.0)
            .with(Metric::Humidity, 50.0)
            .with(Metric::CropHealth, 88.0)
            .with(Metric::Shielding, 95.0)
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.values.insert(metric, value);
        self
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.values.get(&metric).copied()
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values.insert(metric, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.values.iter().map(|(m, v)| (*m, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of this frame restricted to `metrics`.
    pub fn subset(&self, metrics: &[Metric]) -> TelemetryFrame {
        let mut out = TelemetryFrame::new(self.timestamp);
        for &m in metrics {
            if let Some(v) = self.get(m) {
                out.set(m, v);
            }
        }
        out
    }

    /// Overwrite this frame's values with every value present in `other`.
    pub fn overlay(&mut self, other: &TelemetryFrame) {
        for (m, v) in other.iter() {
            self.set(m, v);
        }
    }
}

/// Anything that can produce the settlement's telemetry at an instant.
pub trait TelemetrySource: Send + Sync {
    fn read(&self, at: DateTime<Utc>) -> TelemetryFrame;
}

/// Latest-value store fed by the telemetry collaborator. This is the base
/// source every scenario overlay wraps.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    latest: RwLock<TelemetryFrame>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(frame: TelemetryFrame) -> Self {
        Self {
            latest: RwLock::new(frame),
        }
    }

    /// Record a validated sample as the latest value of its metric.
    pub fn record(&self, sample: &MetricSample) -> Result<(), SentinelError> {
        sample.validate()?;
        let mut latest = self.latest.write();
        latest.set(sample.metric, sample.value);
        if sample.timestamp > latest.timestamp {
            latest.timestamp = sample.timestamp;
        }
        debug!(metric = %sample.metric, value = sample.value, "telemetry sample recorded");
        Ok(())
    }

    /// Write a snapshot back over the current values in one step.
    pub fn restore(&self, snapshot: &TelemetryFrame) {
        self.latest.write().overlay(snapshot);
    }

    pub fn snapshot(&self) -> TelemetryFrame {
        self.latest.read().clone()
    }
}

impl TelemetrySource for TelemetryStore {
    fn read(&self, at: DateTime<Utc>) -> TelemetryFrame {
        let mut frame = self.latest.read().clone();
        frame.timestamp = at;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_round_trips_through_its_id() {
        for m in Metric::ALL {
            assert_eq!(m.as_str().parse::<Metric>().unwrap(), m);
        }
        assert!(matches!(
            "plasma".parse::<Metric>(),
            Err(SentinelError::Validation(_))
        ));
    }

    #[test]
    fn test_sample_parse_rejects_malformed_values() {
        let now = Utc::now();
        assert!(MetricSample::parse("oxygen", 21.0, now).is_ok());
        assert!(MetricSample::parse("oxygen", f64::NAN, now).is_err());
        assert!(MetricSample::parse("oxygen", f64::INFINITY, now).is_err());
        assert!(MetricSample::parse("argon", 1.0, now).is_err());
    }

    #[test]
    fn test_store_rejects_bad_sample_without_mutation() {
        let store = TelemetryStore::with_frame(TelemetryFrame::nominal(Utc::now()));
        let bad = MetricSample::new(Metric::Oxygen, f64::NAN, Utc::now());
        assert!(store.record(&bad).is_err());
        assert_eq!(store.snapshot().get(Metric::Oxygen), Some(21.0));
    }

    #[test]
    fn test_frame_json_uses_metric_ids_as_keys() {
        let frame = TelemetryFrame::new(Utc::now()).with(Metric::CropHealth, 80.0);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"crop_health\":80.0"));

        let parsed: TelemetryFrame = serde_json::from_str(r#"{"values":{"oxygen":19.5}}"#).unwrap();
        assert_eq!(parsed.get(Metric::Oxygen), Some(19.5));
        assert_eq!(parsed.get(Metric::Co2), None);
    }

    #[test]
    fn test_restore_overwrites_only_snapshot_metrics() {
        let store = TelemetryStore::with_frame(TelemetryFrame::nominal(Utc::now()));
        let snapshot = store.snapshot().subset(&[Metric::Radiation]);
        store
            .record(&MetricSample::new(Metric::Radiation, 1.5, Utc::now()))
            .unwrap();
        store
            .record(&MetricSample::new(Metric::Oxygen, 20.8, Utc::now()))
            .unwrap();

        store.restore(&snapshot);
        let now = store.snapshot();
        assert_eq!(now.get(Metric::Radiation), Some(0.02));
        assert_eq!(now.get(Metric::Oxygen), Some(20.8));
    }
}
