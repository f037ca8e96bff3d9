//! Alert, recommendation and approval storage.
//!
//! The evaluation core only talks to [`Repository`]; the in-memory
//! implementation is wired once at start-up and shared behind an `Arc`.

use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SentinelError;
use crate::model::{
    Action, Alert, ApprovalRecord, ApprovalState, Recommendation, RecommendationFilter,
};
use crate::telemetry::Metric;

/// Alerts kept before the oldest are dropped.
pub const DEFAULT_ALERT_CAPACITY: usize = 1000;
/// Approved gated recommendations (and their approval records) kept before
/// the oldest are dropped. Pending ones are never dropped.
pub const DEFAULT_APPROVED_CAPACITY: usize = 500;

pub trait Repository: Send + Sync {
    fn record_alert(&self, alert: Alert);

    /// Newest first.
    fn alerts(&self, limit: usize) -> Vec<Alert>;

    fn alert(&self, id: Uuid) -> Option<Alert>;

    /// Store a recommendation raised once by a one-shot event (safety).
    fn record_recommendation(&self, rec: Recommendation);

    /// Reconcile the advisory set with what the decision engine produced
    /// this tick. A condition already on file keeps its original
    /// recommendation; conditions no longer reported are retired. Returns
    /// the recommendations that are new.
    fn sync_advisories(&self, current: Vec<Recommendation>) -> Vec<Recommendation>;

    /// Current recommendations, highest priority first; equal priorities
    /// keep detection order.
    fn recommendations(&self, filter: &RecommendationFilter) -> Vec<Recommendation>;

    fn recommendation(&self, id: Uuid) -> Option<Recommendation>;

    /// `pending -> approved`, recording who and when.
    fn approve(
        &self,
        id: Uuid,
        approved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<ApprovalRecord, SentinelError>;

    fn pending(&self) -> Vec<Recommendation>;

    fn approval(&self, id: Uuid) -> Option<ApprovalRecord>;
}

#[derive(Default)]
struct Inner {
    alerts: VecDeque<Alert>,
    /// Gated recommendations, kept for their whole approval lifecycle.
    gated: Vec<Recommendation>,
    /// Live decision-engine output, keyed by condition.
    advisories: Vec<Recommendation>,
    approvals: HashMap<Uuid, ApprovalRecord>,
}

impl Inner {
    fn find_mut(&mut self, id: Uuid) -> Option<&mut Recommendation> {
        self.gated
            .iter_mut()
            .chain(self.advisories.iter_mut())
            .find(|r| r.id == id)
    }
}

pub struct InMemoryRepository {
    alert_capacity: usize,
    approved_capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::with_alert_capacity(DEFAULT_ALERT_CAPACITY)
    }

    pub fn with_alert_capacity(alert_capacity: usize) -> Self {
        Self {
            alert_capacity: alert_capacity.max(1),
            approved_capacity: DEFAULT_APPROVED_CAPACITY,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_approved_capacity(mut self, approved_capacity: usize) -> Self {
        self.approved_capacity = approved_capacity.max(1);
        self
    }
}

impl Inner {
    /// Drop the oldest approved gated recommendations beyond `capacity`.
    fn prune_approved(&mut self, capacity: usize) {
        let approved = self
            .gated
            .iter()
            .filter(|r| r.approval_state == ApprovalState::Approved)
            .count();
        let mut excess = approved.saturating_sub(capacity);
        if excess == 0 {
            return;
        }
        let mut dropped = Vec::with_capacity(excess);
        self.gated.retain(|r| {
            if excess > 0 && r.approval_state == ApprovalState::Approved {
                excess -= 1;
                dropped.push(r.id);
                false
            } else {
                true
            }
        });
        for id in &dropped {
            self.approvals.remove(id);
        }
        debug!(dropped = dropped.len(), "approved recommendations pruned");
    }
}

impl Repository for InMemoryRepository {
    fn record_alert(&self, alert: Alert) {
        let mut inner = self.inner.lock();
        if inner.alerts.len() == self.alert_capacity {
            inner.alerts.pop_front();
        }
        inner.alerts.push_back(alert);
    }

    fn alerts(&self, limit: usize) -> Vec<Alert> {
        self.inner
            .lock()
            .alerts
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    fn alert(&self, id: Uuid) -> Option<Alert> {
        self.inner.lock().alerts.iter().find(|a| a.id == id).cloned()
    }

    fn record_recommendation(&self, rec: Recommendation) {
        self.inner.lock().gated.push(rec);
    }

    fn sync_advisories(&self, current: Vec<Recommendation>) -> Vec<Recommendation> {
        let mut inner = self.inner.lock();
        let mut previous: HashMap<(Action, Option<Metric>), Recommendation> = inner
            .advisories
            .drain(..)
            .map(|r| (r.condition_key(), r))
            .collect();

        let mut added = Vec::new();
        let mut next = Vec::with_capacity(current.len());
        for rec in current {
            match previous.remove(&rec.condition_key()) {
                Some(existing) => next.push(existing),
                None => {
                    added.push(rec.clone());
                    next.push(rec);
                }
            }
        }
        if !previous.is_empty() {
            debug!(retired = previous.len(), "advisories retired");
        }
        inner.advisories = next;
        added
    }

    fn recommendations(&self, filter: &RecommendationFilter) -> Vec<Recommendation> {
        let inner = self.inner.lock();
        let mut out: Vec<Recommendation> = inner
            .gated
            .iter()
            .chain(inner.advisories.iter())
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        // Stable: within one detection instant gated entries stay ahead.
        out.sort_by_key(|r| (Reverse(r.priority), r.created_at));
        out
    }

    fn recommendation(&self, id: Uuid) -> Option<Recommendation> {
        let inner = self.inner.lock();
        inner
            .gated
            .iter()
            .chain(inner.advisories.iter())
            .find(|r| r.id == id)
            .cloned()
    }

    fn approve(
        &self,
        id: Uuid,
        approved_by: &str,
        at: DateTime<Utc>,
    ) -> Result<ApprovalRecord, SentinelError> {
        let approved_by = approved_by.trim();
        if approved_by.is_empty() {
            return Err(SentinelError::validation("approved_by must not be blank"));
        }

        // One lock for the check and the transition: concurrent approvals of
        // the same id see exactly one winner.
        let mut inner = self.inner.lock();
        let rec = inner
            .find_mut(id)
            .ok_or_else(|| SentinelError::not_found("recommendation", id.to_string()))?;

        if !rec.action_required {
            return Err(SentinelError::conflict(format!(
                "recommendation {} does not require approval",
                id
            )));
        }
        if rec.approval_state == ApprovalState::Approved {
            return Err(SentinelError::conflict(format!(
                "recommendation {} is already approved",
                id
            )));
        }

        rec.approval_state = ApprovalState::Approved;
        let action = rec.action;
        let record = ApprovalRecord {
            recommendation_id: id,
            approved_by: approved_by.to_string(),
            approved_at: at,
        };
        inner.approvals.insert(id, record.clone());
        inner.prune_approved(self.approved_capacity);
        info!(recommendation = %id, action = %action, approved_by, "recommendation approved");
        Ok(record)
    }

    fn pending(&self) -> Vec<Recommendation> {
        let inner = self.inner.lock();
        inner
            .gated
            .iter()
            .chain(inner.advisories.iter())
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    fn approval(&self, id: Uuid) -> Option<ApprovalRecord> {
        self.inner.lock().approvals.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Impact, LifeSupportAction, SafetyAction};
    use std::sync::Arc;

    fn rec(action: Action, priority: u8, gated: bool) -> Recommendation {
        rec_at(action, priority, gated, Utc::now())
    }

    fn rec_at(action: Action, priority: u8, gated: bool, at: DateTime<Utc>) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            created_at: at,
            priority,
            category: action.category(),
            action,
            metric: Some(Metric::Pressure),
            title: "t".into(),
            description: "d".into(),
            reasoning: "r".into(),
            current_value: 1.0,
            threshold_value: 2.0,
            impact: Impact::High,
            estimated_effect: "e".into(),
            confidence: 0.85,
            action_required: gated,
            approval_state: if gated {
                ApprovalState::Pending
            } else {
                ApprovalState::NotRequired
            },
        }
    }

    fn isolate() -> Action {
        Action::Safety(SafetyAction::IsolateCompartments)
    }

    fn pressurize() -> Action {
        Action::LifeSupport(LifeSupportAction::IncreasePressure)
    }

    #[test]
    fn test_approve_transitions_once() {
        let repo = InMemoryRepository::new();
        let r = rec(isolate(), 10, true);
        let id = r.id;
        repo.record_recommendation(r);
        assert_eq!(repo.pending().len(), 1);

        let record = repo.approve(id, "cmdr", Utc::now()).unwrap();
        assert_eq!(record.approved_by, "cmdr");
        assert_eq!(repo.approval(id), Some(record));
        assert!(repo.recommendation(id).unwrap().is_executable());
        assert!(repo.pending().is_empty());

        assert!(matches!(
            repo.approve(id, "cmdr", Utc::now()),
            Err(SentinelError::Conflict(_))
        ));
    }

    #[test]
    fn test_approve_rejections_leave_state_alone() {
        let repo = InMemoryRepository::new();
        let gated = rec(isolate(), 10, true);
        let gated_id = gated.id;
        repo.record_recommendation(gated);
        let advisory = rec(pressurize(), 7, false);
        let advisory_id = advisory.id;
        repo.sync_advisories(vec![advisory]);

        assert!(matches!(
            repo.approve(gated_id, "   ", Utc::now()),
            Err(SentinelError::Validation(_))
        ));
        assert!(matches!(
            repo.approve(Uuid::new_v4(), "cmdr", Utc::now()),
            Err(SentinelError::NotFound { .. })
        ));
        assert!(matches!(
            repo.approve(advisory_id, "cmdr", Utc::now()),
            Err(SentinelError::Conflict(_))
        ));
        assert_eq!(
            repo.recommendation(gated_id).unwrap().approval_state,
            ApprovalState::Pending
        );
        assert!(repo.approval(gated_id).is_none());
    }

    #[test]
    fn test_concurrent_approvals_have_one_winner() {
        let repo = Arc::new(InMemoryRepository::new());
        let r = rec(isolate(), 10, true);
        let id = r.id;
        repo.record_recommendation(r);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                std::thread::spawn(move || repo.approve(id, &format!("op-{}", i), Utc::now()))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SentinelError::Conflict(_))));
    }

    #[test]
    fn test_sync_keeps_existing_conditions() {
        let repo = InMemoryRepository::new();
        let first = rec(pressurize(), 7, false);
        let first_id = first.id;
        assert_eq!(repo.sync_advisories(vec![first]).len(), 1);

        // Same condition next tick: nothing new, original id kept.
        assert!(repo.sync_advisories(vec![rec(pressurize(), 7, false)]).is_empty());
        let all = repo.recommendations(&RecommendationFilter::default());
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first_id);

        // Condition clears.
        repo.sync_advisories(Vec::new());
        assert!(repo.recommendations(&RecommendationFilter::default()).is_empty());
    }

    #[test]
    fn test_listing_is_sorted_and_filtered() {
        let repo = InMemoryRepository::new();
        repo.record_recommendation(rec(isolate(), 8, true));
        repo.sync_advisories(vec![
            rec(pressurize(), 9, false),
            rec(Action::LifeSupport(LifeSupportAction::IncreaseHumidity), 5, false),
        ]);

        let all = repo.recommendations(&RecommendationFilter::default());
        let prios: Vec<u8> = all.iter().map(|r| r.priority).collect();
        assert_eq!(prios, vec![9, 8, 5]);

        let safety = repo.recommendations(&RecommendationFilter {
            category: Some(Category::Safety),
            min_priority: None,
        });
        assert_eq!(safety.len(), 1);
        let urgent = repo.recommendations(&RecommendationFilter {
            category: None,
            min_priority: Some(8),
        });
        assert_eq!(urgent.len(), 2);
    }

    #[test]
    fn test_equal_priority_keeps_detection_order_across_sources() {
        let repo = InMemoryRepository::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);

        let o2_action = Action::LifeSupport(LifeSupportAction::IncreaseO2Generation);
        let o2 = rec_at(o2_action, 10, false, t0);
        let o2_id = o2.id;
        repo.sync_advisories(vec![o2.clone()]);

        let evacuate = rec_at(Action::Safety(SafetyAction::ImmediateEvacuation), 10, true, t1);
        let evacuate_id = evacuate.id;
        repo.record_recommendation(evacuate);
        let pressure = rec_at(pressurize(), 10, false, t1);
        let pressure_id = pressure.id;
        repo.sync_advisories(vec![o2, pressure]);

        let ids: Vec<Uuid> = repo
            .recommendations(&RecommendationFilter::default())
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![o2_id, evacuate_id, pressure_id]);
    }

    #[test]
    fn test_approved_history_is_capped() {
        let repo = InMemoryRepository::new().with_approved_capacity(2);
        let ids: Vec<Uuid> = (0..4)
            .map(|_| {
                let r = rec(isolate(), 10, true);
                let id = r.id;
                repo.record_recommendation(r);
                id
            })
            .collect();
        let pending = rec(isolate(), 10, true);
        let pending_id = pending.id;
        repo.record_recommendation(pending);

        for id in &ids {
            repo.approve(*id, "cmdr", Utc::now()).unwrap();
        }

        assert!(repo.recommendation(ids[0]).is_none());
        assert!(repo.approval(ids[1]).is_none());
        assert!(repo.approval(ids[2]).is_some());
        assert!(repo.approval(ids[3]).is_some());
        assert!(repo.recommendation(pending_id).unwrap().is_pending());
        assert_eq!(repo.recommendations(&RecommendationFilter::default()).len(), 3);
    }

    #[test]
    fn test_alert_history_is_capped() {
        use crate::detect::Severity;
        use crate::model::AlertKind;

        let repo = InMemoryRepository::with_alert_capacity(3);
        for i in 0..5 {
            repo.record_alert(Alert {
                id: Uuid::new_v4(),
                kind: AlertKind::Anomaly,
                metric: Metric::Battery,
                severity: Severity::Warning,
                timestamp: Utc::now(),
                current_value: i as f64,
                z_score: Some(2.6),
                measured_rate: None,
                confidence: Some(0.5),
                evidence: serde_json::Value::Null,
                message: String::new(),
                advice: None,
                recommendation_id: None,
            });
        }
        let values: Vec<f64> = repo.alerts(10).iter().map(|a| a.current_value).collect();
        assert_eq!(values, vec![4.0, 3.0, 2.0]);
    }
}
