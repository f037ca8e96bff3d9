//! One evaluation tick over the settlement's telemetry.
//!
//! [`SettlementMonitor`] owns the evaluators and hands their output to the
//! repository. It is the surface collaborators use: they push samples in,
//! read alerts and recommendations out, approve gated actions and drive
//! scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEntry, AuditStatus, AuditTrail};
use crate::config::SentinelConfig;
use crate::decision::DecisionEngine;
use crate::detect::{AnomalyDetector, MetricStatistics};
use crate::error::SentinelError;
use crate::model::{Alert, ApprovalRecord, Recommendation, RecommendationFilter};
use crate::safety::SafetyLayer;
use crate::scenario::{ScenarioEngine, ScenarioKind};
use crate::store::{InMemoryRepository, Repository};
use crate::telemetry::clock::Clock;
use crate::telemetry::feed::TelemetryFeed;
use crate::telemetry::{Metric, MetricSample, TelemetryFrame, TelemetryStore};

/// What a single tick produced.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    pub frame: TelemetryFrame,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_scenario: Option<ScenarioKind>,
    pub alerts: Vec<Alert>,
    /// Recommendations first seen on this tick.
    pub recommendations: Vec<Recommendation>,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.alerts.is_empty() && self.recommendations.is_empty()
    }
}

pub struct SettlementMonitor {
    clock: Arc<dyn Clock>,
    feed: Arc<TelemetryFeed>,
    detector: AnomalyDetector,
    safety: Mutex<SafetyLayer>,
    decisions: DecisionEngine,
    scenarios: ScenarioEngine,
    repository: Arc<dyn Repository>,
    audit: Arc<AuditTrail>,
    anomaly_metrics: Vec<Metric>,
}

impl SettlementMonitor {
    pub fn new(
        config: &SentinelConfig,
        clock: Arc<dyn Clock>,
        repository: Arc<dyn Repository>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        let store = Arc::new(TelemetryStore::new());
        let feed = Arc::new(TelemetryFeed::new(store));
        let scenarios = ScenarioEngine::new(
            feed.clone(),
            clock.clone(),
            audit.clone(),
            config.scenario.pressure_floor_kpa,
        );
        Self {
            clock,
            feed,
            detector: AnomalyDetector::new(),
            safety: Mutex::new(SafetyLayer::new()),
            decisions: DecisionEngine::new(),
            scenarios,
            repository,
            audit,
            anomaly_metrics: config.monitor.anomaly_metrics.clone(),
        }
    }

    /// Defaults with an in-memory repository and audit trail.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        let config = SentinelConfig::default();
        let repository = Arc::new(InMemoryRepository::with_alert_capacity(
            config.monitor.alert_capacity,
        ));
        Self::new(&config, clock, repository, Arc::new(AuditTrail::in_memory()))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ----------------------------------------------------------------------
    // Telemetry in
    // ----------------------------------------------------------------------

    pub fn ingest(&self, sample: MetricSample) -> Result<(), SentinelError> {
        self.feed.base().record(&sample)
    }

    /// Ingest a sample given by metric id.
    pub fn ingest_raw(
        &self,
        metric: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SentinelError> {
        self.ingest(MetricSample::parse(metric, value, timestamp)?)
    }

    pub fn telemetry(&self) -> &Arc<TelemetryStore> {
        self.feed.base()
    }

    /// The frame evaluators see right now, scenario overrides included.
    pub fn current_frame(&self) -> TelemetryFrame {
        self.feed.read(self.clock.now())
    }

    // ----------------------------------------------------------------------
    // Evaluation
    // ----------------------------------------------------------------------

    pub fn tick(&self) -> TickReport {
        let completed_scenario = self.scenarios.poll().map(|run| run.kind);

        let now = self.clock.now();
        let frame = self.feed.read(now);
        let mut alerts = Vec::new();
        let mut recommendations = Vec::new();

        for (metric, value) in frame.iter() {
            self.detector.ingest(metric, value, now);
        }
        for &metric in &self.anomaly_metrics {
            if let Some(anomaly) = self.detector.detect(metric, now) {
                alerts.push(anomaly.into_alert());
            }
        }

        let events = self.safety.lock().evaluate(&frame);
        for event in events {
            alerts.push(event.alert);
            self.repository.record_recommendation(event.recommendation.clone());
            recommendations.push(event.recommendation);
        }

        let advisories = self.decisions.evaluate(&frame);
        recommendations.extend(self.repository.sync_advisories(advisories));

        for alert in &alerts {
            self.repository.record_alert(alert.clone());
        }

        if !alerts.is_empty() || !recommendations.is_empty() {
            info!(
                alerts = alerts.len(),
                recommendations = recommendations.len(),
                "tick raised new findings"
            );
        } else {
            debug!("tick quiet");
        }

        TickReport {
            timestamp: now,
            frame,
            completed_scenario,
            alerts,
            recommendations,
        }
    }

    /// Decision-engine output for an arbitrary frame. Nothing is stored.
    pub fn evaluate(&self, frame: &TelemetryFrame) -> Vec<Recommendation> {
        self.decisions.evaluate(frame)
    }

    // ----------------------------------------------------------------------
    // Read access
    // ----------------------------------------------------------------------

    pub fn alerts(&self, limit: usize) -> Vec<Alert> {
        self.repository.alerts(limit)
    }

    pub fn alert(&self, id: Uuid) -> Result<Alert, SentinelError> {
        self.repository
            .alert(id)
            .ok_or_else(|| SentinelError::not_found("alert", id))
    }

    pub fn recommendations(&self, filter: &RecommendationFilter) -> Vec<Recommendation> {
        self.repository.recommendations(filter)
    }

    pub fn recommendation(&self, id: Uuid) -> Result<Recommendation, SentinelError> {
        self.repository
            .recommendation(id)
            .ok_or_else(|| SentinelError::not_found("recommendation", id))
    }

    pub fn pending_approvals(&self) -> Vec<Recommendation> {
        self.repository.pending()
    }

    pub fn approval(&self, id: Uuid) -> Option<ApprovalRecord> {
        self.repository.approval(id)
    }

    pub fn statistics(&self, metric: Metric) -> Option<MetricStatistics> {
        self.detector.statistics(metric)
    }

    pub fn statistics_all(&self) -> BTreeMap<Metric, MetricStatistics> {
        self.detector.statistics_all()
    }

    pub fn reset_statistics(&self, metric: Metric) {
        self.detector.reset(metric);
    }

    pub fn reset_all_statistics(&self) {
        self.detector.reset_all();
    }

    pub fn scenarios(&self) -> &ScenarioEngine {
        &self.scenarios
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    // ----------------------------------------------------------------------
    // Approvals
    // ----------------------------------------------------------------------

    /// Approve a gated recommendation on behalf of `approved_by`.
    pub fn approve(&self, id: Uuid, approved_by: &str) -> Result<ApprovalRecord, SentinelError> {
        let now = self.clock.now();
        let result = self.repository.approve(id, approved_by, now);

        let entry = AuditEntry::new(now, approved_by.trim(), AuditAction::Approve, id.to_string());
        match &result {
            Ok(record) => {
                let action = self.repository.recommendation(id).map(|r| r.action.to_string());
                self.audit.record(entry.with_details(json!({
                    "action": action,
                    "approved_at": record.approved_at,
                })));
            }
            Err(e) => {
                warn!(recommendation = %id, error = %e, "approval rejected");
                self.audit.record(
                    entry
                        .with_status(AuditStatus::Rejected)
                        .with_details(json!({ "reason": e.to_string() })),
                );
            }
        }
        result
    }
}
