//! Smoke tests -- verify the binary runs and the offline subcommands work.

use assert_cmd::Command;
use predicates::str::contains;

fn sentinel() -> Command {
    let mut cmd = Command::cargo_bin("habitat-sentinel").unwrap();
    // Keep a developer's environment from leaking into the run.
    cmd.env_remove("HABITAT_SENTINEL_CONFIG").env("RUST_LOG", "error");
    cmd
}

#[test]
fn test_cli_help() {
    sentinel()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Settlement monitoring"));
}

#[test]
fn test_cli_version() {
    sentinel()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("habitat-sentinel"));
}

#[test]
fn test_serve_subcommand_exists() {
    sentinel().args(["serve", "--help"]).assert().success();
}

#[test]
fn test_scenarios_lists_catalog() {
    sentinel()
        .arg("scenarios")
        .assert()
        .success()
        .stdout(contains("radiation-storm"))
        .stdout(contains("pressure-leak"));
}

#[test]
fn test_scenarios_json() {
    let out = sentinel().args(["scenarios", "--json"]).output().unwrap();
    assert!(out.status.success());
    let catalog: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(catalog.as_array().unwrap().len(), 2);
    assert_eq!(catalog[0]["name"], "radiation-storm");
    assert_eq!(catalog[0]["default_duration_secs"], 300.0);
}

#[test]
fn test_evaluate_flat_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"oxygen": 19.5, "co2": 400.0, "pressure": 101.3, "temperature": 20.0,
            "humidity": 50.0, "crop_health": 90.0, "battery": 75.0,
            "solar": 1000.0, "load": 800.0}"#,
    )
    .unwrap();

    let out = sentinel()
        .args(["evaluate", "--json", "--state"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let recs: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let o2 = recs
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["action"] == "INCREASE_O2_GENERATION")
        .expect("oxygen recommendation");
    assert_eq!(o2["approval_state"], "none");
    assert_eq!(o2["action_required"], false);
    assert_eq!(o2["category"], "life_support");
}

#[test]
fn test_evaluate_frame_state_table() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("frame.json");
    std::fs::write(
        &path,
        r#"{"timestamp": "2026-01-01T00:00:00Z", "values": {"co2": 650.0}}"#,
    )
    .unwrap();

    sentinel()
        .args(["evaluate", "--state"])
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("INCREASE_CO2_SCRUBBING"));
}

#[test]
fn test_evaluate_missing_file_fails() {
    sentinel()
        .args(["evaluate", "--state", "/nonexistent/state.json"])
        .assert()
        .failure();
}

#[test]
fn test_replay_json() {
    let out = sentinel()
        .args(["replay", "--scenario", "radiation-storm", "--duration", "90", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["scenario"], "radiation-storm");
    let kinds: Vec<&str> = report["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"RADIATION_CRITICAL"));
}

#[test]
fn test_replay_unknown_scenario_fails() {
    sentinel()
        .args(["replay", "--scenario", "meteor-strike"])
        .assert()
        .failure()
        .stderr(contains("unknown scenario"));
}
