use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use habitat_sentinel::config::{SentinelConfig, CONFIG_ENV};
use habitat_sentinel::decision::DecisionEngine;
use habitat_sentinel::model::{Alert, Recommendation};
use habitat_sentinel::telemetry::{Metric, TelemetryFrame};

#[derive(Parser)]
#[command(
    name = "habitat-sentinel",
    about = "Settlement monitoring: anomaly detection, safety gating and explainable recommendations",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (simulated sensors + evaluation tick loop)
    Serve {
        /// Start this scenario after the first tick
        #[arg(long)]
        scenario: Option<String>,
    },

    /// List the emergency scenarios that can be injected
    Scenarios {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Replay a scenario on a simulated clock and report what was raised
    Replay {
        /// Scenario name (radiation-storm, pressure-leak)
        #[arg(long)]
        scenario: String,

        /// Duration in seconds (defaults to the scenario's own)
        #[arg(long)]
        duration: Option<f64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run the decision engine once over a telemetry snapshot
    Evaluate {
        /// JSON file holding a frame or a flat metric -> value map
        #[arg(long)]
        state: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

/// Either a bare `{"oxygen": 21.0, ..}` map or `{"timestamp": .., "values": {..}}`.
/// The flat form is tried first; a frame's keys are not metric names.
#[derive(Deserialize)]
#[serde(untagged)]
enum StateFile {
    Flat(BTreeMap<Metric, f64>),
    Frame(TelemetryFrame),
}

fn load_config(path: Option<&Path>) -> Result<SentinelConfig> {
    match path {
        Some(path) => SentinelConfig::load(path),
        None => Ok(SentinelConfig::load_or_default()),
    }
}

fn init_tracing(config: &SentinelConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_state(path: &Path) -> Result<TelemetryFrame> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file: {}", path.display()))?;
    let state: StateFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse state file: {}", path.display()))?;
    Ok(match state {
        StateFile::Frame(frame) => frame,
        StateFile::Flat(values) => TelemetryFrame {
            timestamp: Utc::now(),
            values,
        },
    })
}

fn print_recommendations(recs: &[Recommendation]) {
    if recs.is_empty() {
        println!("No recommendations.");
        return;
    }
    println!("{:<25} | {:<8} | {:<12} | Title", "Action", "Priority", "Category");
    println!("{:-<25}-|-{:-<8}-|-{:-<12}-|-{:-<40}", "", "", "", "");
    for rec in recs {
        println!(
            "{:<25} | {:<8} | {:<12} | {}",
            rec.action.to_string(),
            rec.priority,
            rec.category.to_string(),
            rec.title
        );
        println!("{:<25} | {:<8} | {:<12} |   -> {}", "", "", "", rec.reasoning);
    }
}

fn print_alerts(alerts: &[Alert]) {
    if alerts.is_empty() {
        println!("No alerts.");
        return;
    }
    println!("{:<25} | {:<8} | {:<10} | Message", "Timestamp", "Severity", "Metric");
    println!("{:-<25}-|-{:-<8}-|-{:-<10}-|-{:-<40}", "", "", "", "");
    for alert in alerts {
        println!(
            "{:<25} | {:<8} | {:<10} | {}",
            alert.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            alert.severity.to_string(),
            alert.metric.to_string(),
            alert.message
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve { scenario } => {
            tracing::info!(?scenario, "Starting habitat-sentinel daemon");
            habitat_sentinel::serve(config, scenario).await?;
        }
        Commands::Scenarios { json } => {
            let catalog = habitat_sentinel::scenario::catalog();
            if json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                println!("{:<25} | {:<10} | Description", "Scenario", "Duration");
                println!("{:-<25}-|-{:-<10}-|-{:-<40}", "", "", "");
                for info in &catalog {
                    println!(
                        "{:<25} | {:<10} | {}",
                        info.name,
                        format!("{}s", info.default_duration_secs),
                        info.description
                    );
                }
            }
        }
        Commands::Replay {
            scenario,
            duration,
            json,
        } => {
            tracing::info!(%scenario, ?duration, "Replaying scenario");
            let report = habitat_sentinel::replay::run(&config, &scenario, duration)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\n=== Scenario Replay: {} ===", report.scenario);
                println!("Duration: {}s", report.duration_secs);
                println!("Seed:     {}", report.seed);
                println!("Ticks:    {}", report.ticks);
                println!("\nAlerts:");
                print_alerts(&report.alerts);
                println!("\nRecommendations:");
                print_recommendations(&report.recommendations);
                println!();
            }
        }
        Commands::Evaluate { state, json } => {
            let frame = load_state(&state)?;
            let recs = DecisionEngine::new().evaluate(&frame);
            if json {
                println!("{}", serde_json::to_string_pretty(&recs)?);
            } else {
                print_recommendations(&recs);
            }
        }
    }

    Ok(())
}
