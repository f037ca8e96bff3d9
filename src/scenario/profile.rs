//! Time curves for the built-in fault scenarios and the overlay source that
//! applies them on top of live telemetry.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::ScenarioKind;
use crate::telemetry::{Metric, TelemetryFrame, TelemetrySource, TelemetryStore};

/// Seconds from start to the storm's peak.
pub const STORM_PEAK_SECS: f64 = 60.0;
/// Peak dose rate, mSv/hr.
pub const STORM_PEAK_MSV_HR: f64 = 2.0;
/// Remaining share of the peak excess at the end of the storm.
pub const STORM_RESIDUAL: f64 = 0.001;
/// Largest shielding loss, percentage points.
pub const SHIELDING_MAX_LOSS: f64 = 25.0;
pub const SHIELDING_FLOOR: f64 = 70.0;
pub const DEFAULT_RADIATION: f64 = 0.02;
pub const DEFAULT_SHIELDING: f64 = 95.0;

/// Leak rate, fraction per minute.
pub const LEAK_FRACTION_PER_MIN: f64 = 0.02;
pub const DEFAULT_PRESSURE_FLOOR_KPA: f64 = 68.9;
pub const DEFAULT_PRESSURE: f64 = 101.325;
/// Delay before scrubbing efficiency starts to suffer.
pub const CO2_ONSET_SECS: f64 = 30.0;
pub const CO2_RISE_PPM_PER_MIN: f64 = 100.0;
pub const CO2_CAP_PPM: f64 = 1000.0;
pub const DEFAULT_CO2: f64 = 400.0;

/// Seconds to the storm peak. Storms no longer than the peak time have no
/// decay span after it and peak halfway through instead.
fn storm_peak(duration: f64) -> f64 {
    if duration > STORM_PEAK_SECS {
        STORM_PEAK_SECS
    } else {
        duration / 2.0
    }
}

/// Dose rate `t` seconds into a storm of `duration` seconds.
///
/// Rises linearly from `base` to the peak, then the excess decays
/// exponentially so that [`STORM_RESIDUAL`] of it is left at `duration`.
pub fn storm_radiation(t: f64, duration: f64, base: f64) -> f64 {
    let peak_at = storm_peak(duration);
    let excess = STORM_PEAK_MSV_HR - base;
    if t <= peak_at {
        if peak_at <= 0.0 {
            return STORM_PEAK_MSV_HR;
        }
        return base + excess * (t / peak_at);
    }
    let decay_span = duration - peak_at;
    let k = -STORM_RESIDUAL.ln() / decay_span;
    base + excess * (-k * (t - peak_at)).exp()
}

/// Shielding effectiveness under a dose rate of `radiation`.
pub fn storm_shielding(radiation: f64, base_radiation: f64, base_shielding: f64) -> f64 {
    let span = STORM_PEAK_MSV_HR - base_radiation;
    if span <= 0.0 {
        return base_shielding;
    }
    let share = ((radiation - base_radiation) / span).clamp(0.0, 1.0);
    (base_shielding - share * SHIELDING_MAX_LOSS).max(SHIELDING_FLOOR)
}

/// `initial * exp(-(0.02/60) * t)`, never below `floor`.
pub fn leak_pressure(t: f64, initial: f64, floor: f64) -> f64 {
    let rate_per_sec = LEAK_FRACTION_PER_MIN / 60.0;
    (initial * (-rate_per_sec * t).exp()).max(floor)
}

pub fn leak_co2(t: f64, initial: f64) -> f64 {
    if t <= CO2_ONSET_SECS {
        return initial;
    }
    let rise = (t - CO2_ONSET_SECS) / 60.0 * CO2_RISE_PPM_PER_MIN;
    (initial + rise).min(CO2_CAP_PPM.max(initial))
}

/// Live telemetry with the scenario's metrics replaced by their curves.
pub struct ScenarioOverlay {
    base: Arc<TelemetryStore>,
    kind: ScenarioKind,
    started_at: DateTime<Utc>,
    duration: f64,
    snapshot: TelemetryFrame,
    pressure_floor: f64,
}

impl ScenarioOverlay {
    pub fn new(
        base: Arc<TelemetryStore>,
        kind: ScenarioKind,
        started_at: DateTime<Utc>,
        duration: f64,
        snapshot: TelemetryFrame,
        pressure_floor: f64,
    ) -> Self {
        Self {
            base,
            kind,
            started_at,
            duration,
            snapshot,
            pressure_floor,
        }
    }

    fn snapshot_or(&self, metric: Metric, default: f64) -> f64 {
        self.snapshot.get(metric).unwrap_or(default)
    }

    /// Values of the affected metrics `t` seconds in.
    pub fn values_at(&self, t: f64) -> TelemetryFrame {
        let mut out = TelemetryFrame::new(self.started_at);
        if t >= self.duration {
            out.overlay(&self.snapshot);
            return out;
        }
        let t = t.max(0.0);

        match self.kind {
            ScenarioKind::RadiationStorm => {
                let base = self.snapshot_or(Metric::Radiation, DEFAULT_RADIATION);
                let shielding = self.snapshot_or(Metric::Shielding, DEFAULT_SHIELDING);
                let dose = storm_radiation(t, self.duration, base);
                out.set(Metric::Radiation, dose);
                out.set(Metric::Shielding, storm_shielding(dose, base, shielding));
            }
            ScenarioKind::PressureLeak => {
                let p0 = self.snapshot_or(Metric::Pressure, DEFAULT_PRESSURE);
                let co2 = self.snapshot_or(Metric::Co2, DEFAULT_CO2);
                out.set(Metric::Pressure, leak_pressure(t, p0, self.pressure_floor));
                out.set(Metric::Co2, leak_co2(t, co2));
            }
        }
        out
    }
}

impl TelemetrySource for ScenarioOverlay {
    fn read(&self, at: DateTime<Utc>) -> TelemetryFrame {
        let t = (at - self.started_at).num_milliseconds() as f64 / 1000.0;
        let mut frame = self.base.read(at);
        frame.overlay(&self.values_at(t));
        frame.timestamp = at;
        frame
    }
}
