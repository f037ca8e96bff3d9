//! Simulated settlement sensors.
//!
//! Every metric follows a mean-reverting random walk around its nominal
//! value, clamped to the band a healthy settlement stays in. Regulated
//! quantities such as cabin pressure take tiny steps so that consecutive
//! readings never look like a leak. Used by the daemon when no external
//! telemetry is wired, and by scenario replays.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{Metric, MetricSample, TelemetryFrame};

/// Share of the distance to nominal recovered on every step.
const REVERSION: f64 = 0.1;

const PROFILE_COUNT: usize = Metric::ALL.len();

/// Nominal value, per-step noise and clamp band for a metric.
struct Profile {
    metric: Metric,
    nominal: f64,
    step: f64,
    min: f64,
    max: f64,
}

const PROFILES: [Profile; PROFILE_COUNT] = [
    Profile { metric: Metric::Oxygen, nominal: 21.0, step: 0.05, min: 20.6, max: 21.4 },
    Profile { metric: Metric::Co2, nominal: 400.0, step: 5.0, min: 350.0, max: 440.0 },
    Profile { metric: Metric::Pressure, nominal: 101.3, step: 0.003, min: 101.0, max: 101.6 },
    Profile { metric: Metric::Radiation, nominal: 0.02, step: 0.001, min: 0.0125, max: 0.029 },
    Profile { metric: Metric::Battery, nominal: 75.0, step: 0.5, min: 62.0, max: 88.0 },
    Profile { metric: Metric::Solar, nominal: 1000.0, step: 10.0, min: 900.0, max: 1100.0 },
    Profile { metric: Metric::Load, nominal: 800.0, step: 8.0, min: 700.0, max: 845.0 },
    Profile { metric: Metric::Temperature, nominal: 20.0, step: 0.1, min: 18.5, max: 21.5 },
    Profile { metric: Metric::Humidity, nominal: 50.0, step: 0.5, min: 45.0, max: 55.0 },
    Profile { metric: Metric::CropHealth, nominal: 90.0, step: 0.2, min: 86.0, max: 95.0 },
    Profile { metric: Metric::Shielding, nominal: 95.0, step: 0.2, min: 92.0, max: 98.0 },
];

pub struct Simulator {
    rng: StdRng,
    current: [f64; PROFILE_COUNT],
}

impl Simulator {
    /// A seeded simulator replays the same telemetry every run.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut current = [0.0; PROFILE_COUNT];
        for (slot, p) in current.iter_mut().zip(PROFILES.iter()) {
            *slot = p.nominal;
        }
        Self { rng, current }
    }

    /// Advance every metric one step and return the new readings.
    pub fn samples(&mut self, at: DateTime<Utc>) -> Vec<MetricSample> {
        let mut out = Vec::with_capacity(PROFILE_COUNT);
        for (i, p) in PROFILES.iter().enumerate() {
            let v = self.current[i];
            let next = (v + REVERSION * (p.nominal - v) + self.gaussian() * p.step).clamp(p.min, p.max);
            self.current[i] = next;
            out.push(MetricSample::new(p.metric, next, at));
        }
        out
    }

    pub fn frame(&mut self, at: DateTime<Utc>) -> TelemetryFrame {
        let mut frame = TelemetryFrame::new(at);
        for s in self.samples(at) {
            frame.set(s.metric, s.value);
        }
        frame
    }

    fn gaussian(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_inside_their_band() {
        let mut sim = Simulator::new(Some(7));
        let now = Utc::now();
        for _ in 0..500 {
            for s in sim.samples(now) {
                let p = PROFILES.iter().find(|p| p.metric == s.metric).unwrap();
                assert!(s.value >= p.min && s.value <= p.max, "{:?}", s);
            }
        }
    }

    #[test]
    fn test_seeded_simulators_agree() {
        let now = Utc::now();
        let a = Simulator::new(Some(42)).frame(now);
        let b = Simulator::new(Some(42)).frame(now);
        assert_eq!(a, b);
        assert_eq!(a.values.len(), Metric::ALL.len());
    }

    #[test]
    fn test_pressure_moves_slowly() {
        let mut sim = Simulator::new(Some(3));
        let now = Utc::now();
        let mut last = sim.frame(now).get(Metric::Pressure).unwrap();
        for _ in 0..300 {
            let p = sim.frame(now).get(Metric::Pressure).unwrap();
            // Well under what a 2 %/min leak would move in one second.
            assert!((p - last).abs() < 0.03, "{} -> {}", last, p);
            last = p;
        }
    }
}
