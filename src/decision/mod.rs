//! Ranked, explainable recommendations for life support and energy dispatch.
//!
//! Evaluation is a pure function of one telemetry frame against the fixed
//! table in [`thresholds`]. Every recommendation states the value it saw, the
//! threshold it compared against and how far apart they are.

pub mod priority;
pub mod thresholds;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::model::{
    Action, ApprovalState, Category, EnergyAction, Impact, Recommendation, RecommendationFilter,
};
use crate::telemetry::{Metric, TelemetryFrame};
use priority::{calculate_priority, deviation_percent};
use thresholds::{
    Rule, BATTERY_CAPACITY_KWH, CHARGE_CEILING_PERCENT, RESERVE_MIN_FRACTION, RULE_METRICS,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    /// All recommendations for `frame`, highest priority first. Ties keep
    /// detection order: life support, then energy, table order within each.
    pub fn evaluate(&self, frame: &TelemetryFrame) -> Vec<Recommendation> {
        let mut out = Vec::new();

        for metric in RULE_METRICS {
            let Some(value) = frame.get(metric) else {
                debug!(metric = %metric, "metric missing from frame, rule skipped");
                continue;
            };
            if let Some(rule) = thresholds::rules_for(metric).find(|r| r.bound.trips(value)) {
                out.push(from_rule(rule, value, frame.timestamp));
            }
        }

        if let Some(rec) = energy_balance(frame) {
            out.push(rec);
        }

        // sort_by is stable, so equal priorities keep detection order.
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        debug!(count = out.len(), "decision evaluation complete");
        out
    }
}

/// Narrow a list without reordering it.
pub fn filter(
    recommendations: &[Recommendation],
    category: Option<Category>,
    min_priority: Option<u8>,
) -> Vec<Recommendation> {
    let f = RecommendationFilter {
        category,
        min_priority,
    };
    recommendations.iter().filter(|r| f.matches(r)).cloned().collect()
}

fn from_rule(rule: &Rule, value: f64, at: DateTime<Utc>) -> Recommendation {
    let threshold = rule.bound.threshold();
    let deviation = deviation_percent(value, threshold);
    let unit = rule.metric.unit();
    let reasoning = format!(
        "Current {}: {:.2}{} is {} the {} threshold of {:.1}{} (deviation: {:.1}%). {}",
        rule.metric,
        value,
        unit,
        rule.bound.relation(),
        if rule.critical { "safety" } else { "optimal" },
        threshold,
        unit,
        deviation,
        rule.guidance,
    );

    Recommendation {
        id: Uuid::new_v4(),
        created_at: at,
        priority: calculate_priority(deviation, rule.impact, rule.critical),
        category: rule.action.category(),
        action: rule.action,
        metric: Some(rule.metric),
        title: rule.title.to_string(),
        description: rule.description.to_string(),
        reasoning,
        current_value: value,
        threshold_value: threshold,
        impact: rule.impact,
        estimated_effect: rule.estimated_effect.to_string(),
        confidence: rule.impact.confidence(),
        action_required: false,
        approval_state: ApprovalState::NotRequired,
    }
}

/// Net generation against load, judged with the battery reserve.
fn energy_balance(frame: &TelemetryFrame) -> Option<Recommendation> {
    let (Some(solar), Some(load), Some(battery)) = (
        frame.get(Metric::Solar),
        frame.get(Metric::Load),
        frame.get(Metric::Battery),
    ) else {
        debug!("solar, load or battery missing, energy balance skipped");
        return None;
    };

    let net = solar - load;
    let reserve = battery / BATTERY_CAPACITY_KWH;
    let battery_pct = reserve * 100.0;
    // Imbalance expressed as a share of the load it has to carry.
    let deviation = if load > 0.0 {
        net.abs() / load * 100.0
    } else {
        net.abs()
    };

    let (action, impact, critical, current, threshold, title, description, reasoning, effect) =
        if net < 0.0 && reserve < RESERVE_MIN_FRACTION {
            (
                EnergyAction::EmergencyLoadShedding,
                Impact::Critical,
                true,
                reserve,
                RESERVE_MIN_FRACTION,
                "Critical: Emergency Load Shedding Required",
                "Energy deficit with insufficient reserves.",
                format!(
                    "Energy deficit: {:.2} kW (solar {:.2} kW < load {:.2} kW) with battery reserve \
                     at {:.2} of capacity, below the minimum of {:.1} (deviation: {:.1}% of load). \
                     Shed load now to prevent a blackout.",
                    net.abs(),
                    solar,
                    load,
                    reserve,
                    RESERVE_MIN_FRACTION,
                    deviation
                ),
                "Prevents blackout by matching load to generation",
            )
        } else if net < 0.0 {
            (
                EnergyAction::ReduceLoadOrIncreaseGeneration,
                Impact::High,
                false,
                net,
                0.0,
                "Reduce Load or Increase Generation",
                "Energy deficit detected.",
                format!(
                    "Net power: {:.2} kW against a balance threshold of {:.1} kW (solar {:.2} kW < \
                     load {:.2} kW, deviation: {:.1}% of load). The battery is draining; reduce \
                     load or wait for more solar generation.",
                    net, 0.0, solar, load, deviation
                ),
                "Balances energy supply and demand",
            )
        } else if net > 0.0 && battery_pct < CHARGE_CEILING_PERCENT {
            (
                EnergyAction::ChargeBattery,
                Impact::Medium,
                false,
                battery_pct,
                CHARGE_CEILING_PERCENT,
                "Charge Battery with Surplus",
                "Energy surplus available for battery charging.",
                format!(
                    "Battery at {:.2}% is below the charge ceiling of {:.1}% while net power is \
                     +{:.2} kW (solar {:.2} kW > load {:.2} kW, deviation: {:.1}% of load). Direct \
                     the surplus to charging.",
                    battery_pct, CHARGE_CEILING_PERCENT, net, solar, load, deviation
                ),
                "Builds reserves for future low-generation periods",
            )
        } else {
            return None;
        };

    let action = Action::Energy(action);
    Some(Recommendation {
        id: Uuid::new_v4(),
        created_at: frame.timestamp,
        priority: calculate_priority(deviation, impact, critical),
        category: action.category(),
        action,
        metric: None,
        title: title.to_string(),
        description: description.to_string(),
        reasoning,
        current_value: current,
        threshold_value: threshold,
        impact,
        estimated_effect: effect.to_string(),
        confidence: impact.confidence(),
        action_required: false,
        approval_state: ApprovalState::NotRequired,
    })
}
