//! Fault-scenario replay.
//!
//! A scenario is a [`ScenarioOverlay`] installed in front of the base
//! telemetry store for a fixed duration. At most one runs at a time. When it
//! is stopped, or a [`ScenarioEngine::poll`] notices it has run its course,
//! the pre-scenario values of the affected metrics are written back to the
//! base store before the overlay is removed.

pub mod profile;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::audit::{AuditAction, AuditEntry, AuditTrail};
use crate::error::SentinelError;
use crate::telemetry::clock::Clock;
use crate::telemetry::feed::TelemetryFeed;
use crate::telemetry::{Metric, TelemetryFrame};
use profile::ScenarioOverlay;

const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    RadiationStorm,
    PressureLeak,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 2] = [ScenarioKind::RadiationStorm, ScenarioKind::PressureLeak];

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::RadiationStorm => "radiation-storm",
            ScenarioKind::PressureLeak => "pressure-leak",
        }
    }

    pub fn default_duration_secs(&self) -> f64 {
        match self {
            ScenarioKind::RadiationStorm => 300.0,
            ScenarioKind::PressureLeak => 180.0,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioKind::RadiationStorm => {
                "Solar particle event: dose rate climbs to 2.0 mSv/hr over 60 s then decays \
                 back to background; shielding effectiveness drops with the excess."
            }
            ScenarioKind::PressureLeak => {
                "Hull breach: cabin pressure decays at 2% per minute toward the critical floor; \
                 CO2 climbs 100 ppm/min after 30 s as scrubbing loses efficiency."
            }
        }
    }

    /// Metrics the scenario overrides.
    pub fn affected(&self) -> &'static [Metric] {
        match self {
            ScenarioKind::RadiationStorm => &[Metric::Radiation, Metric::Shielding],
            ScenarioKind::PressureLeak => &[Metric::Pressure, Metric::Co2],
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScenarioKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| SentinelError::validation(format!("unknown scenario '{}'", s)))
    }
}

/// Catalog row.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioInfo {
    pub name: &'static str,
    pub default_duration_secs: f64,
    pub description: &'static str,
}

/// The single active scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioRun {
    pub kind: ScenarioKind,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Pre-scenario values of the affected metrics.
    pub snapshot: TelemetryFrame,
}

impl ScenarioRun {
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.started_at).num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_secs(now) >= self.duration_secs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Idle,
    Running {
        name: &'static str,
        elapsed_secs: f64,
        remaining_secs: f64,
        duration_secs: f64,
        progress_percent: f64,
    },
}

pub struct ScenarioEngine {
    feed: Arc<TelemetryFeed>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditTrail>,
    pressure_floor: f64,
    active: Mutex<Option<ScenarioRun>>,
}

impl ScenarioEngine {
    pub fn new(
        feed: Arc<TelemetryFeed>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditTrail>,
        pressure_floor: f64,
    ) -> Self {
        Self {
            feed,
            clock,
            audit,
            pressure_floor,
            active: Mutex::new(None),
        }
    }

    pub fn catalog(&self) -> Vec<ScenarioInfo> {
        catalog()
    }

    /// Start `name` for `duration_secs` seconds.
    pub fn start(&self, name: &str, duration_secs: f64) -> Result<ScenarioRun, SentinelError> {
        let kind: ScenarioKind = name.parse()?;
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(SentinelError::validation(format!(
                "scenario duration must be a positive number of seconds, got {}",
                duration_secs
            )));
        }

        let mut active = self.active.lock();
        if let Some(run) = active.as_ref() {
            return Err(SentinelError::conflict(format!(
                "scenario '{}' is already running",
                run.kind
            )));
        }

        let now = self.clock.now();
        let base = self.feed.base().clone();
        let snapshot = base.snapshot().subset(kind.affected());
        let overlay = ScenarioOverlay::new(
            base,
            kind,
            now,
            duration_secs,
            snapshot.clone(),
            self.pressure_floor,
        );
        self.feed.install(Arc::new(overlay));

        let run = ScenarioRun {
            kind,
            started_at: now,
            duration_secs,
            snapshot,
        };
        *active = Some(run.clone());
        drop(active);

        info!(scenario = %kind, duration_secs, "scenario started");
        self.audit.record(
            AuditEntry::new(now, SYSTEM_ACTOR, AuditAction::ScenarioStart, kind.name())
                .with_details(json!({ "duration_seconds": duration_secs })),
        );
        Ok(run)
    }

    /// Stop the running scenario. `None` when idle.
    pub fn stop(&self) -> Option<ScenarioRun> {
        let run = self.finish(|_| true)?;
        let now = self.clock.now();
        info!(scenario = %run.kind, "scenario stopped");
        self.audit.record(
            AuditEntry::new(now, SYSTEM_ACTOR, AuditAction::ScenarioStop, run.kind.name())
                .with_details(json!({ "elapsed_seconds": run.elapsed_secs(now) })),
        );
        Some(run)
    }

    /// End the scenario if it has reached its duration. Returns the run that
    /// completed, if any.
    pub fn poll(&self) -> Option<ScenarioRun> {
        let now = self.clock.now();
        let run = self.finish(|run| run.is_finished(now))?;
        info!(scenario = %run.kind, "scenario completed");
        self.audit.record(
            AuditEntry::new(now, SYSTEM_ACTOR, AuditAction::ScenarioEnd, run.kind.name())
                .with_details(json!({ "duration_seconds": run.duration_secs })),
        );
        Some(run)
    }

    pub fn status(&self) -> ScenarioStatus {
        self.poll();
        let now = self.clock.now();
        match self.active.lock().as_ref() {
            None => ScenarioStatus::Idle,
            Some(run) => {
                let elapsed = run.elapsed_secs(now);
                ScenarioStatus::Running {
                    name: run.kind.name(),
                    elapsed_secs: elapsed,
                    remaining_secs: (run.duration_secs - elapsed).max(0.0),
                    duration_secs: run.duration_secs,
                    progress_percent: (elapsed / run.duration_secs * 100.0).min(100.0),
                }
            }
        }
    }

    pub fn active(&self) -> Option<ScenarioRun> {
        self.active.lock().clone()
    }

    /// Take the run if `done` says so, restore its snapshot and drop the
    /// overlay. The restore happens before the swap so no read sees the
    /// in-scenario base values without the overlay.
    fn finish(&self, done: impl FnOnce(&ScenarioRun) -> bool) -> Option<ScenarioRun> {
        let mut active = self.active.lock();
        if !active.as_ref().map_or(false, done) {
            return None;
        }
        let run = active.take()?;
        self.feed.base().restore(&run.snapshot);
        self.feed.reset();
        Some(run)
    }
}

pub fn catalog() -> Vec<ScenarioInfo> {
    ScenarioKind::ALL
        .iter()
        .map(|k| ScenarioInfo {
            name: k.name(),
            default_duration_secs: k.default_duration_secs(),
            description: k.description(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::clock::ManualClock;
    use crate::telemetry::{MetricSample, TelemetryStore};

    struct Rig {
        clock: Arc<ManualClock>,
        feed: Arc<TelemetryFeed>,
        audit: Arc<AuditTrail>,
        engine: ScenarioEngine,
    }

    fn rig() -> Rig {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(TelemetryStore::with_frame(TelemetryFrame::nominal(clock.now())));
        let feed = Arc::new(TelemetryFeed::new(store));
        let audit = Arc::new(AuditTrail::in_memory());
        let engine = ScenarioEngine::new(feed.clone(), clock.clone(), audit.clone(), 68.9);
        Rig {
            clock,
            feed,
            audit,
            engine,
        }
    }

    fn read(r: &Rig, metric: Metric) -> f64 {
        r.feed.read(r.clock.now()).get(metric).unwrap()
    }

    #[test]
    fn test_radiation_storm_timeline() {
        let r = rig();
        r.engine.start("radiation-storm", 300.0).unwrap();
        assert!(r.feed.is_overridden());

        r.clock.advance_secs(60);
        assert!((read(&r, Metric::Radiation) - 2.0).abs() < 1e-9);

        r.clock.advance_secs(239);
        assert!((read(&r, Metric::Radiation) - 0.02).abs() < 0.01);

        r.clock.advance_secs(1);
        assert!(r.engine.poll().is_some());
        assert!(!r.feed.is_overridden());
        assert_eq!(read(&r, Metric::Radiation), 0.02);
        assert_eq!(r.engine.status(), ScenarioStatus::Idle);
    }

    #[test]
    fn test_stop_restores_snapshot_exactly() {
        let r = rig();
        r.engine.start("pressure-leak", 180.0).unwrap();
        r.clock.advance_secs(90);
        assert!(read(&r, Metric::Pressure) < 101.325);
        assert!(read(&r, Metric::Co2) > 400.0);

        // Base telemetry moves on underneath the overlay.
        r.feed
            .base()
            .record(&MetricSample::new(Metric::Pressure, 97.0, r.clock.now()))
            .unwrap();

        let stopped = r.engine.stop().unwrap();
        assert_eq!(stopped.kind, ScenarioKind::PressureLeak);
        assert_eq!(read(&r, Metric::Pressure), 101.325);
        assert_eq!(read(&r, Metric::Co2), 400.0);
        assert!(r.engine.stop().is_none());
    }

    #[test]
    fn test_start_is_validated_and_exclusive() {
        let r = rig();
        assert!(matches!(
            r.engine.start("meteor-shower", 60.0),
            Err(SentinelError::Validation(_))
        ));
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                r.engine.start("pressure-leak", bad),
                Err(SentinelError::Validation(_))
            ));
        }
        assert!(!r.feed.is_overridden());

        r.engine.start("pressure-leak", 120.0).unwrap();
        assert!(matches!(
            r.engine.start("radiation-storm", 120.0),
            Err(SentinelError::Conflict(_))
        ));
    }

    #[test]
    fn test_status_reports_progress() {
        let r = rig();
        r.engine.start("pressure-leak", 180.0).unwrap();
        r.clock.advance_secs(45);
        match r.engine.status() {
            ScenarioStatus::Running {
                name,
                elapsed_secs,
                remaining_secs,
                progress_percent,
                ..
            } => {
                assert_eq!(name, "pressure-leak");
                assert_eq!(elapsed_secs, 45.0);
                assert_eq!(remaining_secs, 135.0);
                assert_eq!(progress_percent, 25.0);
            }
            ScenarioStatus::Idle => panic!("expected a running scenario"),
        }

        // status() notices completion on its own.
        r.clock.advance_secs(200);
        assert_eq!(r.engine.status(), ScenarioStatus::Idle);
    }

    #[test]
    fn test_short_storm_peaks_on_schedule() {
        let r = rig();
        r.engine.start("radiation-storm", 100.0).unwrap();

        r.clock.advance_secs(50);
        assert!(read(&r, Metric::Radiation) < 2.0);
        r.clock.advance_secs(10);
        assert!((read(&r, Metric::Radiation) - 2.0).abs() < 1e-9);
        assert_eq!(read(&r, Metric::Shielding), 70.0);

        r.clock.advance_secs(39);
        assert!((read(&r, Metric::Radiation) - 0.02).abs() < 0.01);
    }

    #[test]
    fn test_lifecycle_is_audited() {
        let r = rig();
        r.engine.start("radiation-storm", 100.0).unwrap();
        r.engine.stop();
        r.engine.start("pressure-leak", 10.0).unwrap();
        r.clock.advance_secs(10);
        r.engine.poll();

        let actions: Vec<AuditAction> = r.audit.read(10, 0).into_iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::ScenarioEnd,
                AuditAction::ScenarioStart,
                AuditAction::ScenarioStop,
                AuditAction::ScenarioStart,
            ]
        );
    }

    #[test]
    fn test_catalog_lists_defaults() {
        let names: Vec<(&str, f64)> = catalog()
            .iter()
            .map(|s| (s.name, s.default_duration_secs))
            .collect();
        assert_eq!(names, vec![("radiation-storm", 300.0), ("pressure-leak", 180.0)]);
    }
}
