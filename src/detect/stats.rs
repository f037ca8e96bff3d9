use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use super::DetectError;
use crate::telemetry::Metric;

/// Samples kept per metric.
pub const MAX_HISTORY: usize = 100;
/// Weight of the newest sample in the EWMA.
pub const EWMA_ALPHA: f64 = 0.3;
/// Samples required before a z-score means anything.
pub const MIN_SAMPLES: usize = 10;
/// Standard deviations below this are treated as a flat baseline.
pub const STD_EPSILON: f64 = 1e-9;

/// Bounded history of one metric plus the running figures derived from it.
#[derive(Debug, Default)]
pub struct MetricWindow {
    values: VecDeque<f64>,
    count: u64,
    ewma: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    last: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}

impl MetricWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64, at: DateTime<Utc>) {
        if self.values.len() == MAX_HISTORY {
            self.values.pop_front();
        }
        self.values.push_back(value);
        self.count += 1;
        self.ewma = Some(match self.ewma {
            Some(prev) => EWMA_ALPHA * value + (1.0 - EWMA_ALPHA) * prev,
            None => value,
        });
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.last = Some(value);
        self.last_updated = Some(at);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance over the window.
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Z = (value - mean) / std_dev against the current window.
    pub fn z_score(&self, value: f64) -> Result<f64, DetectError> {
        if self.values.len() < MIN_SAMPLES {
            return Err(DetectError::InsufficientBaseline {
                needed: MIN_SAMPLES,
                have: self.values.len(),
            });
        }
        let std = self.std_dev();
        if std < STD_EPSILON {
            return Err(DetectError::FlatBaseline { std_dev: std });
        }
        Ok((value - self.mean()) / std)
    }

    pub fn statistics(&self, metric: Metric) -> MetricStatistics {
        let variance = self.variance();
        MetricStatistics {
            metric,
            count: self.count,
            history_len: self.values.len(),
            mean: self.mean(),
            variance,
            std_dev: variance.sqrt(),
            ewma: self.ewma,
            min: self.min,
            max: self.max,
            last: self.last,
            last_updated: self.last_updated,
        }
    }
}

/// Point-in-time copy of a metric's statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStatistics {
    pub metric: Metric,
    /// Samples ingested since the last reset, including ones already evicted.
    pub count: u64,
    pub history_len: usize,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub ewma: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub last: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Per-metric statistics, each behind its own lock.
pub struct StatisticsTracker {
    windows: HashMap<Metric, Mutex<MetricWindow>>,
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsTracker {
    pub fn new() -> Self {
        let windows = Metric::ALL
            .iter()
            .map(|&m| (m, Mutex::new(MetricWindow::new())))
            .collect();
        Self { windows }
    }

    /// Append a sample. Non-finite values are dropped.
    pub fn ingest(&self, metric: Metric, value: f64, at: DateTime<Utc>) {
        if !value.is_finite() {
            warn!(metric = %metric, value, "dropping non-finite sample");
            return;
        }
        if let Some(window) = self.windows.get(&metric) {
            window.lock().push(value, at);
        }
    }

    /// Run `f` with the metric's window locked.
    pub fn with_window<R>(&self, metric: Metric, f: impl FnOnce(&MetricWindow) -> R) -> Option<R> {
        self.windows.get(&metric).map(|w| f(&w.lock()))
    }

    pub fn snapshot(&self, metric: Metric) -> Option<MetricStatistics> {
        self.with_window(metric, |w| w.statistics(metric))
    }

    pub fn snapshot_all(&self) -> BTreeMap<Metric, MetricStatistics> {
        Metric::ALL
            .iter()
            .filter_map(|&m| self.snapshot(m).map(|s| (m, s)))
            .collect()
    }

    pub fn reset(&self, metric: Metric) {
        if let Some(window) = self.windows.get(&metric) {
            *window.lock() = MetricWindow::new();
            debug!(metric = %metric, "statistics reset");
        }
    }

    pub fn reset_all(&self) {
        for metric in Metric::ALL {
            self.reset(metric);
        }
    }
}
