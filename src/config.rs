//! TOML configuration for the sentinel daemon.
//!
//! Layered: the file named by `HABITAT_SENTINEL_CONFIG`, then
//! `/etc/habitat-sentinel/sentinel.toml`, then compiled-in defaults. Missing
//! sections and keys fall back to their defaults. Detection and safety
//! thresholds are fixed in code and deliberately absent here.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scenario::profile::DEFAULT_PRESSURE_FLOOR_KPA;
use crate::store::DEFAULT_ALERT_CAPACITY;
use crate::telemetry::Metric;

pub const CONFIG_ENV: &str = "HABITAT_SENTINEL_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/habitat-sentinel/sentinel.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SentinelConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded sentinel configuration");
        Ok(config)
    }

    /// Try, in order, the `HABITAT_SENTINEL_CONFIG` path, the system path,
    /// and the defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.tick_interval_ms == 0 {
            bail!("monitor.tick_interval_ms must be greater than zero");
        }
        if self.monitor.alert_capacity == 0 {
            bail!("monitor.alert_capacity must be greater than zero");
        }
        let floor = self.scenario.pressure_floor_kpa;
        if !floor.is_finite() || floor < 0.0 {
            bail!("scenario.pressure_floor_kpa must be a non-negative number, got {}", floor);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Milliseconds between evaluation ticks.
    pub tick_interval_ms: u64,
    /// Metrics run through the statistical anomaly detector each tick.
    pub anomaly_metrics: Vec<Metric>,
    /// Alerts kept in memory before the oldest are dropped.
    pub alert_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            anomaly_metrics: vec![Metric::Pressure, Metric::Radiation, Metric::Battery],
            alert_capacity: DEFAULT_ALERT_CAPACITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Lowest pressure the leak scenario drives the cabin to, kPa.
    pub pressure_floor_kpa: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            pressure_floor_kpa: DEFAULT_PRESSURE_FLOOR_KPA,
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Feed simulated sensor data into the daemon.
    pub enabled: bool,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level, used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON log lines instead of human-readable text.
    pub json: bool,
    /// Mirror the audit trail to this JSON-lines file.
    pub audit_log_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            audit_log_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SentinelConfig::default();

        assert_eq!(cfg.monitor.tick_interval_ms, 1000);
        assert_eq!(
            cfg.monitor.anomaly_metrics,
            vec![Metric::Pressure, Metric::Radiation, Metric::Battery]
        );
        assert_eq!(cfg.monitor.alert_capacity, 1000);
        assert_eq!(cfg.scenario.pressure_floor_kpa, 68.9);
        assert!(cfg.simulator.enabled);
        assert!(cfg.simulator.seed.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
        assert!(cfg.logging.audit_log_path.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[monitor]
tick_interval_ms = 250
anomaly_metrics = ["oxygen", "co2", "crop_health"]
alert_capacity = 50

[scenario]
pressure_floor_kpa = 75.0

[simulator]
enabled = false
seed = 42

[logging]
level = "debug"
json = true
audit_log_path = "/var/log/habitat-sentinel/audit.jsonl"
"#;

        let cfg: SentinelConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.monitor.tick_interval_ms, 250);
        assert_eq!(
            cfg.monitor.anomaly_metrics,
            vec![Metric::Oxygen, Metric::Co2, Metric::CropHealth]
        );
        assert_eq!(cfg.monitor.alert_capacity, 50);
        assert_eq!(cfg.scenario.pressure_floor_kpa, 75.0);
        assert!(!cfg.simulator.enabled);
        assert_eq!(cfg.simulator.seed, Some(42));
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
        assert_eq!(
            cfg.logging.audit_log_path,
            Some(PathBuf::from("/var/log/habitat-sentinel/audit.jsonl"))
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[simulator]
seed = 7
"#;

        let cfg: SentinelConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.simulator.seed, Some(7));
        assert!(cfg.simulator.enabled);
        assert_eq!(cfg.monitor.tick_interval_ms, 1000);
        assert_eq!(cfg.scenario.pressure_floor_kpa, 68.9);
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        let toml_str = r#"
[monitor]
anomaly_metrics = ["plasma"]
"#;
        assert!(toml::from_str::<SentinelConfig>(toml_str).is_err());
    }

    #[test]
    fn test_load_from_file_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sentinel.toml");

        std::fs::write(&path, "[monitor]\ntick_interval_ms = 500\n").unwrap();
        let cfg = SentinelConfig::load(&path).unwrap();
        assert_eq!(cfg.monitor.tick_interval_ms, 500);

        std::fs::write(&path, "[monitor]\ntick_interval_ms = 0\n").unwrap();
        assert!(SentinelConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(SentinelConfig::load(Path::new("/nonexistent/sentinel.toml")).is_err());
    }
}
