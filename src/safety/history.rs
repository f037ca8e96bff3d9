use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Pressure readings over a trailing time window, keyed by sample time.
#[derive(Debug)]
pub struct PressureHistory {
    window: Duration,
    readings: VecDeque<(DateTime<Utc>, f64)>,
}

impl Default for PressureHistory {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

impl PressureHistory {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            readings: VecDeque::new(),
        }
    }

    pub fn add(&mut self, at: DateTime<Utc>, kpa: f64) {
        // Late samples are slotted in by timestamp.
        let idx = self.readings.partition_point(|(ts, _)| *ts <= at);
        self.readings.insert(idx, (at, kpa));

        if let Some(&(newest, _)) = self.readings.back() {
            let cutoff = newest - self.window;
            while matches!(self.readings.front(), Some((ts, _)) if *ts < cutoff) {
                self.readings.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Percent change per minute between the oldest and newest reading.
    /// `None` until two readings span a non-zero interval.
    pub fn rate_per_minute(&self) -> Option<f64> {
        let (oldest_ts, oldest) = *self.readings.front()?;
        let (newest_ts, newest) = *self.readings.back()?;

        let minutes = (newest_ts - oldest_ts).num_milliseconds() as f64 / 60_000.0;
        if minutes <= 0.0 || oldest == 0.0 {
            return None;
        }
        Some((newest - oldest) / oldest * 100.0 / minutes)
    }
}

/// Background radiation level, fixed once a stable run of readings is seen.
#[derive(Debug)]
pub struct RadiationBaseline {
    run_len: usize,
    max_spread: f64,
    recent: VecDeque<f64>,
    baseline: Option<f64>,
}

impl RadiationBaseline {
    pub fn new(run_len: usize, max_spread: f64) -> Self {
        Self {
            run_len,
            max_spread,
            recent: VecDeque::with_capacity(run_len),
            baseline: None,
        }
    }

    pub fn observe(&mut self, msv_hr: f64) {
        if self.baseline.is_some() {
            return;
        }
        if self.recent.len() == self.run_len {
            self.recent.pop_front();
        }
        self.recent.push_back(msv_hr);
        if self.recent.len() < self.run_len {
            return;
        }

        let (lo, hi) = self
            .recent
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi - lo <= self.max_spread {
            self.baseline = Some(self.recent.iter().sum::<f64>() / self.run_len as f64);
            self.recent.clear();
        }
    }

    pub fn get(&self) -> Option<f64> {
        self.baseline
    }
}
