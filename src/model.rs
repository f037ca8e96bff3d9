//! Alerts, recommendations and approval records shared by every evaluator
//! and by the repository.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detect::Severity;
use crate::telemetry::Metric;

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// What raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Statistical outlier from the anomaly detector.
    Anomaly,
    PressureLeak,
    PressureCritical,
    RadiationSpike,
    RadiationCritical,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::Anomaly => "ANOMALY",
            AlertKind::PressureLeak => "PRESSURE_LEAK",
            AlertKind::PressureCritical => "PRESSURE_CRITICAL",
            AlertKind::RadiationSpike => "RADIATION_SPIKE",
            AlertKind::RadiationCritical => "RADIATION_CRITICAL",
        };
        f.write_str(s)
    }
}

/// A detected condition. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub metric: Metric,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub current_value: f64,
    /// Set for statistical alerts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
    /// Set for rule-based alerts that measure a rate (%/min).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured_rate: Option<f64>,
    /// Set for statistical alerts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub evidence: serde_json::Value,
    pub message: String,
    /// Operator advice for alerts that carry no gated recommendation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
    /// The gated recommendation raised alongside this alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    LifeSupport,
    EnergyDispatch,
    Safety,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::LifeSupport => "life_support",
            Category::EnergyDispatch => "energy_dispatch",
            Category::Safety => "safety",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Category {
    type Err = crate::error::SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "life_support" => Ok(Category::LifeSupport),
            "energy_dispatch" => Ok(Category::EnergyDispatch),
            "safety" => Ok(Category::Safety),
            other => Err(crate::error::SentinelError::validation(format!(
                "unknown category '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifeSupportAction {
    IncreaseO2Generation,
    ReduceO2Generation,
    IncreaseCo2Scrubbing,
    IncreasePressure,
    ReducePressure,
    IncreaseTemperature,
    DecreaseTemperature,
    IncreaseHumidity,
    DecreaseHumidity,
    ImproveCropHealth,
    OptimizeCropHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnergyAction {
    PrioritizeCharging,
    IncreaseCharging,
    OptimizeCharging,
    IncreaseLoad,
    ReduceNonEssentialLoad,
    ReduceLoad,
    OptimizeLoad,
    EmergencyLoadShedding,
    ReduceLoadOrIncreaseGeneration,
    ChargeBattery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyAction {
    IsolateCompartments,
    ImmediateEvacuation,
    PrepareStormShelter,
    ActivateStormShelter,
}

/// A recommended action; the variant fixes the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    LifeSupport(LifeSupportAction),
    Energy(EnergyAction),
    Safety(SafetyAction),
}

impl Action {
    pub fn category(&self) -> Category {
        match self {
            Action::LifeSupport(_) => Category::LifeSupport,
            Action::Energy(_) => Category::EnergyDispatch,
            Action::Safety(_) => Category::Safety,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the wire names so logs and JSON agree.
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(s)) => f.write_str(&s),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<LifeSupportAction> for Action {
    fn from(a: LifeSupportAction) -> Self {
        Action::LifeSupport(a)
    }
}

impl From<EnergyAction> for Action {
    fn from(a: EnergyAction) -> Self {
        Action::Energy(a)
    }
}

impl From<SafetyAction> for Action {
    fn from(a: SafetyAction) -> Self {
        Action::Safety(a)
    }
}

/// Expected consequence class of leaving a condition unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

impl Impact {
    /// Multiplier applied to the running priority total.
    pub fn factor(&self) -> f64 {
        match self {
            Impact::Critical => 2.0,
            Impact::High => 1.5,
            Impact::Medium => 1.0,
            Impact::Low => 0.5,
        }
    }

    /// Fixed confidence attached to recommendations of this impact class.
    pub fn confidence(&self) -> f64 {
        match self {
            Impact::Critical => 0.95,
            Impact::High => 0.85,
            Impact::Medium => 0.75,
            Impact::Low => 0.6,
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
            Impact::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// No approval needed (`action_required == false`).
    #[serde(rename = "none")]
    NotRequired,
    Pending,
    Approved,
}

/// An explainable recommendation. `approval_state` is the only field that
/// changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub priority: u8,
    pub category: Category,
    pub action: Action,
    /// The metric the recommendation is about; `None` for settlement-wide
    /// conditions such as the energy balance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    pub title: String,
    pub description: String,
    pub reasoning: String,
    pub current_value: f64,
    pub threshold_value: f64,
    pub impact: Impact,
    pub estimated_effect: String,
    pub confidence: f64,
    pub action_required: bool,
    pub approval_state: ApprovalState,
}

impl Recommendation {
    /// Whether an external actor may carry out the action now.
    pub fn is_executable(&self) -> bool {
        !self.action_required || self.approval_state == ApprovalState::Approved
    }

    pub fn is_pending(&self) -> bool {
        self.action_required && self.approval_state == ApprovalState::Pending
    }

    /// Identity of the condition this recommendation answers.
    pub fn condition_key(&self) -> (Action, Option<Metric>) {
        (self.action, self.metric)
    }
}

/// Proof that a named actor released a gated recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub recommendation_id: Uuid,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Narrowing applied when listing recommendations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecommendationFilter {
    pub category: Option<Category>,
    pub min_priority: Option<u8>,
}

impl RecommendationFilter {
    pub fn matches(&self, rec: &Recommendation) -> bool {
        self.category.map_or(true, |c| rec.category == c)
            && self.min_priority.map_or(true, |p| rec.priority >= p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        let a: Action = LifeSupportAction::IncreaseO2Generation.into();
        assert_eq!(a.to_string(), "INCREASE_O2_GENERATION");
        assert_eq!(a.category(), Category::LifeSupport);

        let a: Action = serde_json::from_str("\"EMERGENCY_LOAD_SHEDDING\"").unwrap();
        assert_eq!(a, Action::Energy(EnergyAction::EmergencyLoadShedding));

        let a: Action = SafetyAction::IsolateCompartments.into();
        assert_eq!(a.to_string(), "ISOLATE_COMPARTMENTS");
        assert_eq!(a.category(), Category::Safety);
    }

    #[test]
    fn test_approval_state_serializes_none() {
        let json = serde_json::to_string(&ApprovalState::NotRequired).unwrap();
        assert_eq!(json, "\"none\"");
        let json = serde_json::to_string(&ApprovalState::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }

    #[test]
    fn test_impact_confidence_is_a_probability() {
        for impact in [Impact::Low, Impact::Medium, Impact::High, Impact::Critical] {
            let c = impact.confidence();
            assert!((0.0..=1.0).contains(&c));
        }
    }
}
