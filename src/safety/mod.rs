//! Deterministic safety rules over raw telemetry.
//!
//! Unlike the anomaly detector these thresholds are absolute: a pressure
//! drop of 2 %/min is a leak whatever the recent history looks like. Every
//! alert raised here is paired with a `safety` recommendation that starts in
//! `pending` and must be approved by a named operator.

pub mod history;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decision::priority::{calculate_priority, deviation_percent};
use crate::detect::Severity;
use crate::model::{
    Action, Alert, AlertKind, ApprovalState, Impact, Recommendation, SafetyAction,
};
use crate::telemetry::{Metric, TelemetryFrame};
use history::{PressureHistory, RadiationBaseline};

/// Pressure loss rate (%/min) that counts as a leak.
pub const PRESSURE_LEAK_RATE: f64 = 2.0;
/// Absolute pressure floor, kPa.
pub const PRESSURE_CRITICAL_KPA: f64 = 90.0;
/// Margin above baseline that counts as a spike, mSv/hr.
pub const RADIATION_SPIKE_MARGIN: f64 = 0.1;
/// Absolute dose rate that sends crew to shelter, mSv/hr.
pub const RADIATION_CRITICAL: f64 = 0.5;
/// Consecutive stable readings needed to fix the radiation baseline.
pub const BASELINE_RUN: usize = 5;

/// An alert and the gated recommendation raised with it.
#[derive(Debug, Clone)]
pub struct SafetyEvent {
    pub alert: Alert,
    pub recommendation: Recommendation,
}

pub struct SafetyLayer {
    pressure: PressureHistory,
    radiation: RadiationBaseline,
    active: HashSet<AlertKind>,
}

impl Default for SafetyLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyLayer {
    pub fn new() -> Self {
        Self {
            pressure: PressureHistory::default(),
            radiation: RadiationBaseline::new(BASELINE_RUN, RADIATION_SPIKE_MARGIN),
            active: HashSet::new(),
        }
    }

    pub fn radiation_baseline(&self) -> Option<f64> {
        self.radiation.get()
    }

    pub fn pressure_rate(&self) -> Option<f64> {
        self.pressure.rate_per_minute()
    }

    /// Conditions currently latched (raised and not yet cleared).
    pub fn active(&self) -> impl Iterator<Item = &AlertKind> {
        self.active.iter()
    }

    /// Feed one frame and return the newly raised events.
    pub fn evaluate(&mut self, frame: &TelemetryFrame) -> Vec<SafetyEvent> {
        let at = frame.timestamp;
        let mut events = Vec::new();

        match frame.get(Metric::Pressure) {
            Some(kpa) => self.check_pressure(kpa, at, &mut events),
            None => debug!("pressure missing from frame, pressure rules skipped"),
        }
        match frame.get(Metric::Radiation) {
            Some(dose) => self.check_radiation(dose, at, &mut events),
            None => debug!("radiation missing from frame, radiation rules skipped"),
        }

        events
    }

    fn check_pressure(&mut self, kpa: f64, at: DateTime<Utc>, events: &mut Vec<SafetyEvent>) {
        self.pressure.add(at, kpa);
        let rate = self.pressure.rate_per_minute();
        let readings = self.pressure.len();

        match rate {
            Some(rate) if rate <= -PRESSURE_LEAK_RATE => {
                let dev = deviation_percent(rate, -PRESSURE_LEAK_RATE);
                self.raise(events, AlertKind::PressureLeak, || Finding {
                    metric: Metric::Pressure,
                    severity: Severity::Critical,
                    action: SafetyAction::IsolateCompartments,
                    at,
                    current: rate,
                    threshold: -PRESSURE_LEAK_RATE,
                    measured_rate: Some(rate),
                    message: format!(
                        "PRESSURE LEAK DETECTED: pressure dropping at {:.2}% per minute ({:.2} kPa)",
                        rate.abs(),
                        kpa
                    ),
                    title: "Isolate Compartments",
                    description: "Pressure is falling faster than a sealed habitat allows.",
                    reasoning: format!(
                        "Pressure rate {:.2}%/min is beyond the leak threshold of {:.1}%/min \
                         (deviation: {:.1}%). Isolate compartments to contain the loss.",
                        rate, -PRESSURE_LEAK_RATE, dev
                    ),
                    effect: "Contains atmosphere loss to the breached compartment",
                    evidence: json!({
                        "pressure_kpa": kpa,
                        "rate_percent_per_minute": rate,
                        "threshold_percent_per_minute": -PRESSURE_LEAK_RATE,
                        "window_readings": readings,
                    }),
                });
            }
            _ => self.clear(AlertKind::PressureLeak),
        }

        if kpa < PRESSURE_CRITICAL_KPA {
            let dev = deviation_percent(kpa, PRESSURE_CRITICAL_KPA);
            self.raise(events, AlertKind::PressureCritical, || Finding {
                metric: Metric::Pressure,
                severity: Severity::Critical,
                action: SafetyAction::ImmediateEvacuation,
                at,
                current: kpa,
                threshold: PRESSURE_CRITICAL_KPA,
                measured_rate: rate,
                message: format!("CRITICAL: pressure critically low at {:.2} kPa", kpa),
                title: "Immediate Evacuation Required",
                description: "Pressure has dropped below the survivable floor.",
                reasoning: format!(
                    "Pressure {:.2} kPa is below the critical floor of {:.1} kPa \
                     (deviation: {:.1}%). Evacuate to emergency shelters.",
                    kpa, PRESSURE_CRITICAL_KPA, dev
                ),
                effect: "Moves crew to a pressurized refuge",
                evidence: json!({
                    "pressure_kpa": kpa,
                    "threshold_kpa": PRESSURE_CRITICAL_KPA,
                }),
            });
        } else {
            self.clear(AlertKind::PressureCritical);
        }
    }

    fn check_radiation(&mut self, dose: f64, at: DateTime<Utc>, events: &mut Vec<SafetyEvent>) {
        self.radiation.observe(dose);
        let baseline = self.radiation.get();

        if dose >= RADIATION_CRITICAL {
            let dev = deviation_percent(dose, RADIATION_CRITICAL);
            self.raise(events, AlertKind::RadiationCritical, || Finding {
                metric: Metric::Radiation,
                severity: Severity::Critical,
                action: SafetyAction::ActivateStormShelter,
                at,
                current: dose,
                threshold: RADIATION_CRITICAL,
                measured_rate: None,
                message: format!(
                    "CRITICAL: radiation at {:.4} mSv/hr (threshold: {:.1} mSv/hr)",
                    dose, RADIATION_CRITICAL
                ),
                title: "Activate Storm Shelter Protocol",
                description: "Dose rate has reached the shelter threshold.",
                reasoning: format!(
                    "Radiation {:.4} mSv/hr is at or above the critical level of {:.1} mSv/hr \
                     (deviation: {:.1}%). All personnel proceed to storm shelters.",
                    dose, RADIATION_CRITICAL, dev
                ),
                effect: "Cuts crew dose by moving everyone behind heavy shielding",
                evidence: json!({
                    "radiation_msv_hr": dose,
                    "threshold_msv_hr": RADIATION_CRITICAL,
                    "baseline_msv_hr": baseline,
                }),
            });
            // The spike latch is left alone while critical supersedes it.
            return;
        }
        self.clear(AlertKind::RadiationCritical);

        let Some(baseline) = baseline else {
            return;
        };
        let limit = baseline + RADIATION_SPIKE_MARGIN;
        if dose > limit {
            let dev = deviation_percent(dose, limit);
            self.raise(events, AlertKind::RadiationSpike, || Finding {
                metric: Metric::Radiation,
                severity: Severity::Warning,
                action: SafetyAction::PrepareStormShelter,
                at,
                current: dose,
                threshold: limit,
                measured_rate: None,
                message: format!(
                    "Radiation spike detected: {:.4} mSv/hr (baseline: {:.4} mSv/hr)",
                    dose, baseline
                ),
                title: "Prepare Storm Shelter",
                description: "Dose rate has risen well above background.",
                reasoning: format!(
                    "Radiation {:.4} mSv/hr exceeds the spike threshold of {:.1} mSv/hr over \
                     baseline {:.4} (limit {:.4}, deviation: {:.1}%). Prepare shelters in case \
                     levels keep rising.",
                    dose, RADIATION_SPIKE_MARGIN, baseline, limit, dev
                ),
                effect: "Shortens shelter transit if the event escalates",
                evidence: json!({
                    "radiation_msv_hr": dose,
                    "baseline_msv_hr": baseline,
                    "spike_margin_msv_hr": RADIATION_SPIKE_MARGIN,
                }),
            });
        } else {
            self.clear(AlertKind::RadiationSpike);
        }
    }

    fn raise(
        &mut self,
        events: &mut Vec<SafetyEvent>,
        kind: AlertKind,
        finding: impl FnOnce() -> Finding,
    ) {
        if !self.active.insert(kind) {
            return;
        }
        let event = finding().into_event(kind);
        warn!(
            kind = %kind,
            value = event.alert.current_value,
            recommendation = %event.recommendation.id,
            "safety alert raised"
        );
        events.push(event);
    }

    fn clear(&mut self, kind: AlertKind) {
        if self.active.remove(&kind) {
            info!(kind = %kind, "safety condition cleared");
        }
    }
}

/// Everything needed to build one alert/recommendation pair.
struct Finding {
    metric: Metric,
    severity: Severity,
    action: SafetyAction,
    at: DateTime<Utc>,
    current: f64,
    threshold: f64,
    measured_rate: Option<f64>,
    message: String,
    title: &'static str,
    description: &'static str,
    reasoning: String,
    effect: &'static str,
    evidence: serde_json::Value,
}

impl Finding {
    fn into_event(self, kind: AlertKind) -> SafetyEvent {
        let (impact, critical) = match self.severity {
            Severity::Critical => (Impact::Critical, true),
            Severity::Warning => (Impact::High, false),
        };
        let deviation = deviation_percent(self.current, self.threshold);
        let action = Action::Safety(self.action);

        let recommendation = Recommendation {
            id: Uuid::new_v4(),
            created_at: self.at,
            priority: calculate_priority(deviation, impact, critical),
            category: action.category(),
            action,
            metric: Some(self.metric),
            title: self.title.to_string(),
            description: self.description.to_string(),
            reasoning: self.reasoning,
            current_value: self.current,
            threshold_value: self.threshold,
            impact,
            estimated_effect: self.effect.to_string(),
            confidence: impact.confidence(),
            action_required: true,
            approval_state: ApprovalState::Pending,
        };

        let alert = Alert {
            id: Uuid::new_v4(),
            kind,
            metric: self.metric,
            severity: self.severity,
            timestamp: self.at,
            current_value: self.current,
            z_score: None,
            measured_rate: self.measured_rate,
            confidence: None,
            evidence: self.evidence,
            message: self.message,
            advice: None,
            recommendation_id: Some(recommendation.id),
        };

        SafetyEvent {
            alert,
            recommendation,
        }
    }
}
