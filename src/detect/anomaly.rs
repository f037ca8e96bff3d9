//! Z-score classification of metric samples.
//!
//! A sample is compared against its metric's window: `|z| >= 3.5` is
//! critical, `|z| >= 2.5` is a warning. Radiation only reports upward
//! deviations. Fewer than [`MIN_SAMPLES`] samples, or a flat window, never
//! produce an anomaly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::stats::{MetricStatistics, MetricWindow, StatisticsTracker, MIN_SAMPLES};
use super::{DetectError, Severity};
use crate::model::{Alert, AlertKind};
use crate::telemetry::Metric;

pub const Z_SCORE_WARNING: f64 = 2.5;
pub const Z_SCORE_CRITICAL: f64 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    High,
    Low,
    Spike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvidence {
    pub current_value: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub ewma: f64,
    pub z_score: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    pub deviation_from_mean: f64,
    pub deviation_percent: f64,
    /// Samples seen since the last reset, not just those in the window.
    pub sample_count: u64,
    pub min: f64,
    pub max: f64,
    pub anomaly_type: AnomalyType,
    /// "critical" or "significant".
    pub significance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ewma_deviation: Option<f64>,
    /// Percent change of the current value against the EWMA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric: Metric,
    pub value: f64,
    pub z_score: f64,
    pub severity: Severity,
    pub confidence: f64,
    pub anomaly_type: AnomalyType,
    pub timestamp: DateTime<Utc>,
    pub evidence: AnomalyEvidence,
}

/// Classify `value` against a metric's window without touching it.
pub fn evaluate(
    metric: Metric,
    window: &MetricWindow,
    value: f64,
    at: DateTime<Utc>,
) -> Result<Option<Anomaly>, DetectError> {
    let z = window.z_score(value)?;
    let abs_z = z.abs();

    let severity = if abs_z >= Z_SCORE_CRITICAL {
        Severity::Critical
    } else if abs_z >= Z_SCORE_WARNING {
        Severity::Warning
    } else {
        return Ok(None);
    };

    let anomaly_type = match metric {
        Metric::Radiation if z > 0.0 => AnomalyType::Spike,
        // A dose rate falling away from the mean is good news.
        Metric::Radiation => return Ok(None),
        _ if z > 0.0 => AnomalyType::High,
        _ => AnomalyType::Low,
    };

    let confidence = confidence(severity, abs_z);
    let stats = window.statistics(metric);
    let evidence = build_evidence(metric, &stats, value, z, severity, anomaly_type);

    Ok(Some(Anomaly {
        metric,
        value,
        z_score: z,
        severity,
        confidence,
        anomaly_type,
        timestamp: at,
        evidence,
    }))
}

fn confidence(severity: Severity, abs_z: f64) -> f64 {
    let c = match severity {
        Severity::Critical => (0.7 + (abs_z - Z_SCORE_CRITICAL) * 0.1).min(0.99),
        Severity::Warning => (0.5 + (abs_z - Z_SCORE_WARNING) * 0.15).min(0.95),
    };
    c.clamp(0.0, 1.0)
}

fn build_evidence(
    metric: Metric,
    stats: &MetricStatistics,
    value: f64,
    z: f64,
    severity: Severity,
    anomaly_type: AnomalyType,
) -> AnomalyEvidence {
    let ewma = stats.ewma.unwrap_or(stats.mean);
    let deviation = value - stats.mean;
    let deviation_percent = if stats.mean == 0.0 {
        0.0
    } else {
        deviation / stats.mean * 100.0
    };

    let ewma_deviation = matches!(metric, Metric::Radiation | Metric::Battery).then(|| value - ewma);
    let charge_rate = (metric == Metric::Battery && ewma != 0.0).then(|| (value - ewma) / ewma * 100.0);

    AnomalyEvidence {
        current_value: value,
        mean: stats.mean,
        std_dev: stats.std_dev,
        ewma,
        z_score: z,
        warning_threshold: Z_SCORE_WARNING,
        critical_threshold: Z_SCORE_CRITICAL,
        deviation_from_mean: deviation,
        deviation_percent,
        sample_count: stats.count,
        min: stats.min.unwrap_or(value),
        max: stats.max.unwrap_or(value),
        anomaly_type,
        significance: match severity {
            Severity::Critical => "critical".to_string(),
            Severity::Warning => "significant".to_string(),
        },
        ewma_deviation,
        charge_rate,
    }
}

impl Anomaly {
    /// Turn the anomaly into an `ANOMALY` alert with an operator-facing
    /// message and advice.
    pub fn into_alert(self) -> Alert {
        let direction = match self.anomaly_type {
            AnomalyType::High => "above",
            AnomalyType::Low => "below",
            AnomalyType::Spike => "spiking above",
        };
        let message = format!(
            "{} {} {:.2}{} is {} its recent mean ({:.2}), z-score {:.2}",
            self.severity,
            self.metric,
            self.value,
            unit_suffix(self.metric),
            direction,
            self.evidence.mean,
            self.z_score,
        );
        let advice = advice(self.metric, self.anomaly_type).to_string();
        let evidence = serde_json::to_value(&self.evidence).unwrap_or(serde_json::Value::Null);

        Alert {
            id: Uuid::new_v4(),
            kind: AlertKind::Anomaly,
            metric: self.metric,
            severity: self.severity,
            timestamp: self.timestamp,
            current_value: self.value,
            z_score: Some(self.z_score),
            measured_rate: None,
            confidence: Some(self.confidence),
            evidence,
            message,
            advice: Some(advice),
            recommendation_id: None,
        }
    }
}

fn unit_suffix(metric: Metric) -> String {
    match metric.unit() {
        "" => String::new(),
        "%" => "%".to_string(),
        unit => format!(" {}", unit),
    }
}

fn advice(metric: Metric, kind: AnomalyType) -> &'static str {
    match (metric, kind) {
        (Metric::Pressure, AnomalyType::Low) => {
            "Check hull seals and airlock cycles for a slow leak; verify pressure sensors."
        }
        (Metric::Pressure, _) => "Verify the atmosphere regulator and pressure sensor calibration.",
        (Metric::Radiation, _) => {
            "Monitor space weather; be ready to move crew to shielded areas if the dose keeps rising."
        }
        (Metric::Battery, AnomalyType::Low) => {
            "Unexpected discharge; audit active loads and check for battery faults."
        }
        (Metric::Battery, _) => "Unexpected charge change; verify the charge controller.",
        (Metric::Oxygen, _) | (Metric::Co2, _) => {
            "Inspect the atmosphere processing loop and cross-check with a second sensor."
        }
        (Metric::Solar, _) | (Metric::Load, _) => {
            "Review power dispatch and array output against the schedule."
        }
        _ => "Investigate the sensor and the subsystem it monitors.",
    }
}

/// Statistics tracker plus z-score classification.
#[derive(Default)]
pub struct AnomalyDetector {
    tracker: StatisticsTracker,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&self, metric: Metric, value: f64, at: DateTime<Utc>) {
        self.tracker.ingest(metric, value, at);
    }

    /// Classify the most recently ingested value of `metric`.
    pub fn detect(&self, metric: Metric, at: DateTime<Utc>) -> Option<Anomaly> {
        let result = self.tracker.with_window(metric, |w| {
            let value = w.last()?;
            Some(evaluate(metric, w, value, at))
        })??;
        self.log_outcome(metric, result)
    }

    /// Classify an arbitrary value against current statistics without
    /// ingesting it.
    pub fn classify(&self, metric: Metric, value: f64, at: DateTime<Utc>) -> Option<Anomaly> {
        if !value.is_finite() {
            return None;
        }
        let result = self
            .tracker
            .with_window(metric, |w| evaluate(metric, w, value, at))?;
        self.log_outcome(metric, result)
    }

    /// Ingest then detect.
    pub fn observe(&self, metric: Metric, value: f64, at: DateTime<Utc>) -> Option<Anomaly> {
        self.ingest(metric, value, at);
        self.detect(metric, at)
    }

    fn log_outcome(
        &self,
        metric: Metric,
        result: Result<Option<Anomaly>, DetectError>,
    ) -> Option<Anomaly> {
        match result {
            Ok(Some(anomaly)) => {
                info!(
                    metric = %metric,
                    value = anomaly.value,
                    z = anomaly.z_score,
                    severity = %anomaly.severity,
                    "anomaly detected"
                );
                Some(anomaly)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(metric = %metric, "skipping anomaly check: {}", e);
                None
            }
        }
    }

    pub fn statistics(&self, metric: Metric) -> Option<MetricStatistics> {
        self.tracker.snapshot(metric)
    }

    pub fn statistics_all(&self) -> std::collections::BTreeMap<Metric, MetricStatistics> {
        self.tracker.snapshot_all()
    }

    pub fn reset(&self, metric: Metric) {
        self.tracker.reset(metric);
    }

    pub fn reset_all(&self) {
        self.tracker.reset_all();
    }

    /// Minimum history before detection runs.
    pub fn min_samples(&self) -> usize {
        MIN_SAMPLES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ten samples alternating 90/110: mean 100, population std 10.
    fn seeded(detector: &AnomalyDetector, metric: Metric) {
        let now = Utc::now();
        for i in 0..10 {
            let v = if i % 2 == 0 { 90.0 } else { 110.0 };
            detector.ingest(metric, v, now);
        }
    }

    #[test]
    fn test_critical_z_score_confidence() {
        let detector = AnomalyDetector::new();
        seeded(&detector, Metric::Load);

        let a = detector.classify(Metric::Load, 138.0, Utc::now()).unwrap();
        assert!((a.z_score - 3.8).abs() < 1e-9);
        assert_eq!(a.severity, Severity::Critical);
        assert!((a.confidence - 0.73).abs() < 1e-9);
        assert_eq!(a.anomaly_type, AnomalyType::High);
        assert_eq!(a.evidence.sample_count, 10);
        assert_eq!(a.evidence.significance, "critical");
        // classify must not ingest
        assert_eq!(detector.statistics(Metric::Load).unwrap().count, 10);
    }

    #[test]
    fn test_warning_band() {
        let detector = AnomalyDetector::new();
        seeded(&detector, Metric::Co2);

        let a = detector.classify(Metric::Co2, 72.0, Utc::now()).unwrap();
        assert_eq!(a.severity, Severity::Warning);
        assert_eq!(a.anomaly_type, AnomalyType::Low);
        // 0.5 + 0.3 * 0.15
        assert!((a.confidence - 0.545).abs() < 1e-9);
        assert!((a.evidence.deviation_percent + 28.0).abs() < 1e-9);

        assert!(detector.classify(Metric::Co2, 120.0, Utc::now()).is_none());
    }

    #[test]
    fn test_evidence_counts_every_sample() {
        let detector = AnomalyDetector::new();
        let now = Utc::now();
        for i in 0..150 {
            let v = if i % 2 == 0 { 90.0 } else { 110.0 };
            detector.ingest(Metric::Humidity, v, now);
        }
        let a = detector.classify(Metric::Humidity, 140.0, now).unwrap();
        assert_eq!(a.evidence.sample_count, 150);
        assert_eq!(detector.statistics(Metric::Humidity).unwrap().history_len, 100);
        assert!((a.evidence.deviation_percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_never_alerts() {
        let detector = AnomalyDetector::new();
        let now = Utc::now();
        for _ in 0..50 {
            detector.ingest(Metric::Pressure, 101.3, now);
        }
        assert!(detector.detect(Metric::Pressure, now).is_none());
        assert!(detector.classify(Metric::Pressure, 1_000.0, now).is_none());
    }

    #[test]
    fn test_needs_ten_samples() {
        let detector = AnomalyDetector::new();
        let now = Utc::now();
        for v in [1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0] {
            detector.ingest(Metric::Battery, v, now);
        }
        assert!(detector.classify(Metric::Battery, 500.0, now).is_none());
    }

    #[test]
    fn test_radiation_reports_spikes_only() {
        let detector = AnomalyDetector::new();
        seeded(&detector, Metric::Radiation);
        let now = Utc::now();

        assert!(detector.classify(Metric::Radiation, 60.0, now).is_none());
        let a = detector.classify(Metric::Radiation, 140.0, now).unwrap();
        assert_eq!(a.anomaly_type, AnomalyType::Spike);
        assert!(a.evidence.ewma_deviation.is_some());
        assert!(a.evidence.charge_rate.is_none());
    }

    #[test]
    fn test_battery_evidence_carries_charge_rate() {
        let detector = AnomalyDetector::new();
        seeded(&detector, Metric::Battery);
        let a = detector.classify(Metric::Battery, 60.0, Utc::now()).unwrap();
        assert!(a.evidence.charge_rate.unwrap() < 0.0);

        let alert = a.into_alert();
        assert_eq!(alert.kind, AlertKind::Anomaly);
        assert!(alert.message.contains("60.00 kWh"));
        assert!(alert.message.contains("below"));
        assert!(alert.advice.is_some());
        assert_eq!(alert.evidence["charge_rate"].as_f64().map(|c| c < 0.0), Some(true));
    }

    #[test]
    fn test_detect_uses_latest_sample() {
        let detector = AnomalyDetector::new();
        let now = Utc::now();
        for i in 0..40 {
            detector.ingest(Metric::Solar, 1000.0 + (i % 2) as f64, now);
        }
        assert!(detector.detect(Metric::Solar, now).is_none());
        let a = detector.observe(Metric::Solar, 1200.0, now).unwrap();
        assert_eq!(a.severity, Severity::Critical);
    }
}
