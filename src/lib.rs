//! habitat-sentinel -- Settlement monitoring decision core.
//!
//! This crate provides statistical anomaly detection over life-support and
//! energy telemetry, an absolute safety layer with operator approval gates,
//! explainable recommendations and deterministic emergency scenarios.

pub mod audit;
pub mod config;
pub mod decision;
pub mod detect;
pub mod error;
pub mod model;
pub mod monitor;
pub mod replay;
pub mod safety;
pub mod scenario;
pub mod store;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use audit::AuditTrail;
use config::SentinelConfig;
use monitor::SettlementMonitor;
use store::InMemoryRepository;
use telemetry::clock::SystemClock;
use telemetry::simulator::Simulator;

/// Start the sentinel daemon: simulator feed, tick loop and audit trail.
///
/// Runs until ctrl-c. When `start_scenario` is given it is started after the
/// first tick with its default duration.
pub async fn serve(config: SentinelConfig, start_scenario: Option<String>) -> Result<()> {
    // 1. Audit trail
    let audit = match &config.logging.audit_log_path {
        Some(path) => {
            info!(path = %path.display(), "Mirroring audit trail to disk");
            Arc::new(AuditTrail::open(path)?)
        }
        None => Arc::new(AuditTrail::in_memory()),
    };

    // 2. Monitor
    let repository = Arc::new(InMemoryRepository::with_alert_capacity(
        config.monitor.alert_capacity,
    ));
    let clock = Arc::new(SystemClock);
    let monitor = SettlementMonitor::new(&config, clock, repository, audit);

    // 3. Telemetry source
    let mut simulator = if config.simulator.enabled {
        info!(seed = ?config.simulator.seed, "Simulated sensors enabled");
        Some(Simulator::new(config.simulator.seed))
    } else {
        warn!("Simulator disabled and no external feed is wired; ticks will see an empty frame");
        None
    };

    // 4. Tick loop
    let mut interval = tokio::time::interval(Duration::from_millis(config.monitor.tick_interval_ms));
    let mut pending_scenario = start_scenario;
    info!(
        tick_interval_ms = config.monitor.tick_interval_ms,
        "habitat-sentinel running"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }

        if let Some(sim) = simulator.as_mut() {
            for sample in sim.samples(monitor.now()) {
                if let Err(e) = monitor.ingest(sample) {
                    warn!(error = %e, "Dropped simulated sample");
                }
            }
        }

        let report = monitor.tick();
        for alert in &report.alerts {
            warn!(
                kind = ?alert.kind,
                metric = %alert.metric,
                severity = %alert.severity,
                value = alert.current_value,
                "{}",
                alert.message
            );
        }
        for rec in &report.recommendations {
            info!(
                id = %rec.id,
                action = %rec.action,
                priority = rec.priority,
                approval = ?rec.approval_state,
                "{}",
                rec.title
            );
        }
        if let Some(kind) = report.completed_scenario {
            info!(scenario = %kind, "Scenario finished, telemetry restored");
        }

        if let Some(name) = pending_scenario.take() {
            let duration = name
                .parse::<scenario::ScenarioKind>()
                .map(|k| k.default_duration_secs())
                .unwrap_or_default();
            if let Err(e) = monitor.scenarios().start(&name, duration) {
                warn!(scenario = %name, error = %e, "Could not start scenario");
            }
        }
    }

    if let Some(run) = monitor.scenarios().stop() {
        info!(scenario = %run.kind, "Stopped running scenario on shutdown");
    }
    Ok(())
}
