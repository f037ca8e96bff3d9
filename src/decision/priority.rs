use crate::model::Impact;

pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;
const BASE_PRIORITY: i32 = 5;
const CRITICAL_BONUS: i32 = 2;

/// `|current - threshold| / threshold * 100`. A zero threshold yields the
/// absolute difference.
pub fn deviation_percent(current: f64, threshold: f64) -> f64 {
    let diff = (current - threshold).abs();
    if threshold == 0.0 {
        return diff;
    }
    diff / threshold.abs() * 100.0
}

/// Urgency score in `[1, 10]`.
pub fn calculate_priority(deviation_percent: f64, impact: Impact, critical: bool) -> u8 {
    let deviation = deviation_percent.abs();
    let bonus = if deviation > 20.0 {
        3
    } else if deviation > 10.0 {
        2
    } else if deviation > 5.0 {
        1
    } else {
        0
    };

    // Truncation toward zero is part of the contract.
    let mut priority = (f64::from(BASE_PRIORITY + bonus) * impact.factor()) as i32;
    if critical {
        priority += CRITICAL_BONUS;
    }
    priority.clamp(i32::from(PRIORITY_MIN), i32::from(PRIORITY_MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_table() {
        assert_eq!(calculate_priority(0.0, Impact::Medium, false), 5);
        assert_eq!(calculate_priority(6.0, Impact::Medium, false), 6);
        assert_eq!(calculate_priority(15.0, Impact::Low, false), 3);
        // (5 + 1) * 1.5 = 9
        assert_eq!(calculate_priority(8.0, Impact::High, false), 9);
        // 5 * 1.5 = 7.5 -> 7
        assert_eq!(calculate_priority(1.0, Impact::High, false), 7);
        // 5 * 0.5 = 2.5 -> 2
        assert_eq!(calculate_priority(0.0, Impact::Low, false), 2);
    }

    #[test]
    fn test_priority_clamps() {
        assert_eq!(calculate_priority(90.0, Impact::Critical, true), PRIORITY_MAX);
        for dev in [0.0, 5.5, 11.0, 25.0, 1e9] {
            for impact in [Impact::Low, Impact::Medium, Impact::High, Impact::Critical] {
                for critical in [false, true] {
                    let p = calculate_priority(dev, impact, critical);
                    assert!((PRIORITY_MIN..=PRIORITY_MAX).contains(&p));
                }
            }
        }
    }

    #[test]
    fn test_deviation_percent() {
        assert!((deviation_percent(19.5, 20.0) - 2.5).abs() < 1e-9);
        assert!((deviation_percent(550.0, 500.0) - 10.0).abs() < 1e-9);
        assert_eq!(deviation_percent(-3.0, 0.0), 3.0);
    }
}
