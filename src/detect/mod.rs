//! Statistical anomaly detection over per-metric sliding windows.

pub mod anomaly;
pub mod stats;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalyEvidence, AnomalyType};
pub use stats::{MetricStatistics, StatisticsTracker};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectError {
    #[error("insufficient baseline data: need {needed} samples, have {have}")]
    InsufficientBaseline { needed: usize, have: usize },
    #[error("flat baseline: std dev {std_dev} is below the detection floor")]
    FlatBaseline { std_dev: f64 },
}

/// Severity levels shared by statistical and rule-based alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("WARNING"),
            Severity::Critical => f.write_str("CRITICAL"),
        }
    }
}
