//! Fixed operating thresholds and the per-metric action catalog.

use crate::model::{Action, EnergyAction, Impact, LifeSupportAction};
use crate::telemetry::Metric;

// ----------------------------------------------------------------------------
// Life support
// ----------------------------------------------------------------------------

pub const O2_MIN: f64 = 20.0;
pub const O2_OPTIMAL_MIN: f64 = 20.5;
pub const O2_OPTIMAL_MAX: f64 = 21.5;
pub const CO2_MAX: f64 = 500.0;
pub const CO2_WARNING: f64 = 450.0;
pub const PRESSURE_MIN: f64 = 95.0;
pub const PRESSURE_OPTIMAL_MIN: f64 = 98.0;
pub const PRESSURE_OPTIMAL_MAX: f64 = 103.0;
pub const TEMPERATURE_MIN: f64 = 18.0;
pub const TEMPERATURE_MAX: f64 = 22.0;
pub const HUMIDITY_MIN: f64 = 40.0;
pub const HUMIDITY_MAX: f64 = 60.0;
pub const CROP_HEALTH_MIN: f64 = 75.0;
pub const CROP_HEALTH_OPTIMAL: f64 = 85.0;

// ----------------------------------------------------------------------------
// Energy
// ----------------------------------------------------------------------------

pub const BATTERY_CRITICAL: f64 = 30.0;
pub const BATTERY_WARNING: f64 = 50.0;
pub const BATTERY_OPTIMAL_MIN: f64 = 60.0;
pub const BATTERY_OPTIMAL_MAX: f64 = 90.0;
pub const SOLAR_MIN: f64 = 500.0;
pub const LOAD_MAX: f64 = 900.0;
pub const LOAD_OPTIMAL_MAX: f64 = 850.0;
/// Minimum stored fraction of [`BATTERY_CAPACITY_KWH`] before a deficit
/// forces load shedding.
pub const RESERVE_MIN_FRACTION: f64 = 0.2;
pub const BATTERY_CAPACITY_KWH: f64 = 500.0;
/// Surplus is only routed to charging below this state of charge.
pub const CHARGE_CEILING_PERCENT: f64 = 90.0;

/// Which side of the threshold trips the rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Below(f64),
    Above(f64),
}

impl Bound {
    pub fn threshold(&self) -> f64 {
        match *self {
            Bound::Below(t) | Bound::Above(t) => t,
        }
    }

    pub fn trips(&self, value: f64) -> bool {
        match *self {
            Bound::Below(t) => value < t,
            Bound::Above(t) => value > t,
        }
    }

    pub fn relation(&self) -> &'static str {
        match self {
            Bound::Below(_) => "below",
            Bound::Above(_) => "above",
        }
    }
}

/// One row of the action catalog.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub metric: Metric,
    pub bound: Bound,
    pub action: Action,
    pub impact: Impact,
    /// Set when the bound is a hard safety limit rather than a comfort band.
    pub critical: bool,
    pub title: &'static str,
    pub description: &'static str,
    pub guidance: &'static str,
    pub estimated_effect: &'static str,
}

const fn ls(a: LifeSupportAction) -> Action {
    Action::LifeSupport(a)
}

const fn en(a: EnergyAction) -> Action {
    Action::Energy(a)
}

/// Rules in detection order. Within a metric the first tripped rule wins, so
/// hard limits are listed before comfort bands.
pub const RULES: &[Rule] = &[
    Rule {
        metric: Metric::Oxygen,
        bound: Bound::Below(O2_MIN),
        action: ls(LifeSupportAction::IncreaseO2Generation),
        impact: Impact::Critical,
        critical: true,
        title: "Critical: Increase Oxygen Generation",
        description: "Oxygen is below the minimum safe level.",
        guidance: "Increase electrolysis output immediately and check for O2 loss.",
        estimated_effect: "Restores breathable oxygen within minutes",
    },
    Rule {
        metric: Metric::Oxygen,
        bound: Bound::Below(O2_OPTIMAL_MIN),
        action: ls(LifeSupportAction::IncreaseO2Generation),
        impact: Impact::High,
        critical: false,
        title: "Increase Oxygen Generation",
        description: "Oxygen is below the optimal range.",
        guidance: "Raise electrolysis output to return to the optimal band.",
        estimated_effect: "Returns oxygen to the optimal range",
    },
    Rule {
        metric: Metric::Oxygen,
        bound: Bound::Above(O2_OPTIMAL_MAX),
        action: ls(LifeSupportAction::ReduceO2Generation),
        impact: Impact::Medium,
        critical: false,
        title: "Reduce Oxygen Generation",
        description: "Oxygen is above the optimal range.",
        guidance: "Lower electrolysis output; excess oxygen raises fire risk and wastes power.",
        estimated_effect: "Reduces fire risk and saves power",
    },
    Rule {
        metric: Metric::Co2,
        bound: Bound::Above(CO2_MAX),
        action: ls(LifeSupportAction::IncreaseCo2Scrubbing),
        impact: Impact::Critical,
        critical: true,
        title: "Critical: Increase CO2 Scrubbing",
        description: "CO2 is above the maximum safe level.",
        guidance: "Bring all scrubber beds online and check their saturation.",
        estimated_effect: "Prevents CO2 toxicity symptoms",
    },
    Rule {
        metric: Metric::Co2,
        bound: Bound::Above(CO2_WARNING),
        action: ls(LifeSupportAction::IncreaseCo2Scrubbing),
        impact: Impact::High,
        critical: false,
        title: "Increase CO2 Scrubbing",
        description: "CO2 is above the warning level.",
        guidance: "Increase scrubber throughput before levels become unsafe.",
        estimated_effect: "Keeps CO2 below the safe maximum",
    },
    Rule {
        metric: Metric::Pressure,
        bound: Bound::Below(PRESSURE_MIN),
        action: ls(LifeSupportAction::IncreasePressure),
        impact: Impact::Critical,
        critical: true,
        title: "Critical: Increase Cabin Pressure",
        description: "Cabin pressure is below the minimum safe level.",
        guidance: "Repressurize from reserve tanks and inspect for leaks.",
        estimated_effect: "Restores safe cabin pressure",
    },
    Rule {
        metric: Metric::Pressure,
        bound: Bound::Below(PRESSURE_OPTIMAL_MIN),
        action: ls(LifeSupportAction::IncreasePressure),
        impact: Impact::High,
        critical: false,
        title: "Increase Cabin Pressure",
        description: "Cabin pressure is below the optimal range.",
        guidance: "Top up atmosphere from reserve tanks.",
        estimated_effect: "Returns pressure to the optimal range",
    },
    Rule {
        metric: Metric::Pressure,
        bound: Bound::Above(PRESSURE_OPTIMAL_MAX),
        action: ls(LifeSupportAction::ReducePressure),
        impact: Impact::Medium,
        critical: false,
        title: "Reduce Cabin Pressure",
        description: "Cabin pressure is above the optimal range.",
        guidance: "Vent a small volume to storage to relieve hull stress.",
        estimated_effect: "Reduces structural stress on the habitat",
    },
    Rule {
        metric: Metric::Temperature,
        bound: Bound::Below(TEMPERATURE_MIN),
        action: ls(LifeSupportAction::IncreaseTemperature),
        impact: Impact::High,
        critical: false,
        title: "Increase Temperature",
        description: "Cabin temperature is below the comfort range.",
        guidance: "Raise heater setpoints.",
        estimated_effect: "Restores crew comfort",
    },
    Rule {
        metric: Metric::Temperature,
        bound: Bound::Above(TEMPERATURE_MAX),
        action: ls(LifeSupportAction::DecreaseTemperature),
        impact: Impact::High,
        critical: false,
        title: "Decrease Temperature",
        description: "Cabin temperature is above the comfort range.",
        guidance: "Increase radiator flow or reduce heat-generating loads.",
        estimated_effect: "Restores crew comfort",
    },
    Rule {
        metric: Metric::Humidity,
        bound: Bound::Below(HUMIDITY_MIN),
        action: ls(LifeSupportAction::IncreaseHumidity),
        impact: Impact::Medium,
        critical: false,
        title: "Increase Humidity",
        description: "Humidity is below the comfort range.",
        guidance: "Reduce dehumidifier duty cycle.",
        estimated_effect: "Prevents dry air discomfort and static build-up",
    },
    Rule {
        metric: Metric::Humidity,
        bound: Bound::Above(HUMIDITY_MAX),
        action: ls(LifeSupportAction::DecreaseHumidity),
        impact: Impact::Medium,
        critical: false,
        title: "Decrease Humidity",
        description: "Humidity is above the comfort range.",
        guidance: "Increase dehumidifier duty cycle.",
        estimated_effect: "Prevents condensation and mold growth",
    },
    Rule {
        metric: Metric::CropHealth,
        bound: Bound::Below(CROP_HEALTH_MIN),
        action: ls(LifeSupportAction::ImproveCropHealth),
        impact: Impact::High,
        critical: false,
        title: "Improve Crop Health",
        description: "Crop health is below the acceptable minimum.",
        guidance: "Inspect nutrient dosing, lighting and root-zone temperature.",
        estimated_effect: "Protects the food supply",
    },
    Rule {
        metric: Metric::CropHealth,
        bound: Bound::Below(CROP_HEALTH_OPTIMAL),
        action: ls(LifeSupportAction::OptimizeCropHealth),
        impact: Impact::Medium,
        critical: false,
        title: "Optimize Crop Health",
        description: "Crop health is below optimal.",
        guidance: "Fine-tune nutrients and light cycle.",
        estimated_effect: "Improves yield",
    },
    Rule {
        metric: Metric::Battery,
        bound: Bound::Below(BATTERY_CRITICAL),
        action: en(EnergyAction::PrioritizeCharging),
        impact: Impact::Critical,
        critical: true,
        title: "Critical: Prioritize Battery Charging",
        description: "Battery is critically low.",
        guidance: "Route all available generation to charging and shed non-essential loads.",
        estimated_effect: "Prevents loss of power to life support",
    },
    Rule {
        metric: Metric::Battery,
        bound: Bound::Below(BATTERY_WARNING),
        action: en(EnergyAction::IncreaseCharging),
        impact: Impact::High,
        critical: false,
        title: "Increase Battery Charging",
        description: "Battery is below the warning level.",
        guidance: "Allocate more solar power to charging.",
        estimated_effect: "Rebuilds reserves before they become critical",
    },
    Rule {
        metric: Metric::Battery,
        bound: Bound::Below(BATTERY_OPTIMAL_MIN),
        action: en(EnergyAction::OptimizeCharging),
        impact: Impact::Medium,
        critical: false,
        title: "Optimize Battery Charging",
        description: "Battery is below the optimal range.",
        guidance: "Allocate more solar power to charging to build reserves.",
        estimated_effect: "Returns reserves to the optimal range",
    },
    Rule {
        metric: Metric::Battery,
        bound: Bound::Above(BATTERY_OPTIMAL_MAX),
        action: en(EnergyAction::IncreaseLoad),
        impact: Impact::Low,
        critical: false,
        title: "Use Surplus Stored Energy",
        description: "Battery is above the optimal range.",
        guidance: "Schedule deferred high-draw tasks while reserves are full.",
        estimated_effect: "Uses energy that would otherwise be curtailed",
    },
    Rule {
        metric: Metric::Solar,
        bound: Bound::Below(SOLAR_MIN),
        action: en(EnergyAction::ReduceNonEssentialLoad),
        impact: Impact::High,
        critical: false,
        title: "Reduce Non-Essential Load",
        description: "Solar generation is below the minimum.",
        guidance: "This may be an eclipse period or a panel fault; reduce non-essential loads.",
        estimated_effect: "Preserves battery during low generation",
    },
    Rule {
        metric: Metric::Load,
        bound: Bound::Above(LOAD_MAX),
        action: en(EnergyAction::ReduceLoad),
        impact: Impact::Critical,
        critical: true,
        title: "Critical: Reduce Load",
        description: "Power draw is above the maximum safe load.",
        guidance: "Shed loads immediately to protect the distribution bus.",
        estimated_effect: "Prevents bus overload and brownout",
    },
    Rule {
        metric: Metric::Load,
        bound: Bound::Above(LOAD_OPTIMAL_MAX),
        action: en(EnergyAction::OptimizeLoad),
        impact: Impact::High,
        critical: false,
        title: "Optimize Load",
        description: "Power draw is above the optimal maximum.",
        guidance: "Defer or reschedule non-urgent loads.",
        estimated_effect: "Returns load to the optimal range",
    },
];

/// Metrics that have catalog rules, in detection order.
pub const RULE_METRICS: [Metric; 9] = [
    Metric::Oxygen,
    Metric::Co2,
    Metric::Pressure,
    Metric::Temperature,
    Metric::Humidity,
    Metric::CropHealth,
    Metric::Battery,
    Metric::Solar,
    Metric::Load,
];

pub fn rules_for(metric: Metric) -> impl Iterator<Item = &'static Rule> {
    RULES.iter().filter(move |r| r.metric == metric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_bands_trip_nothing() {
        let optimal = [
            (Metric::Oxygen, 21.0),
            (Metric::Co2, 420.0),
            (Metric::Pressure, 101.3),
            (Metric::Temperature, 20.0),
            (Metric::Humidity, 50.0),
            (Metric::CropHealth, 90.0),
            (Metric::Battery, 75.0),
            (Metric::Solar, 1000.0),
            (Metric::Load, 800.0),
        ];
        for (metric, value) in optimal {
            assert!(rules_for(metric).all(|r| !r.bound.trips(value)), "{}", metric);
        }
    }

    #[test]
    fn test_hard_limits_come_first() {
        for metric in RULE_METRICS {
            let mut seen_soft = false;
            for rule in rules_for(metric) {
                if rule.critical {
                    assert!(!seen_soft, "{} lists a critical rule after a soft one", metric);
                } else {
                    seen_soft = true;
                }
            }
        }
    }
}
