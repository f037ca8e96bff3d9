//! Append-only audit trail of operator and system actions.
//!
//! Approvals and scenario lifecycle events are kept in memory and, when a
//! path is configured, mirrored as one JSON line per entry to a file opened
//! in append mode. Reads return the newest entries first.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A fault scenario was put in front of live telemetry.
    ScenarioStart,
    /// An operator stopped a running scenario.
    ScenarioStop,
    /// A scenario ran to its configured duration.
    ScenarioEnd,
    /// A gated recommendation was approved.
    Approve,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Rejected,
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Operator name, or `system` for automatic transitions.
    pub actor: String,
    pub action: AuditAction,
    /// What was acted on: a recommendation id or a scenario name.
    pub resource: String,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
        action: AuditAction,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            actor: actor.into(),
            action,
            resource: resource.into(),
            status: AuditStatus::Success,
            details: None,
        }
    }

    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

struct Mirror {
    path: PathBuf,
    writer: Mutex<File>,
}

#[derive(Default)]
pub struct AuditTrail {
    entries: RwLock<Vec<AuditEntry>>,
    mirror: Option<Mirror>,
}

impl AuditTrail {
    /// Memory-only trail.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Trail mirrored to a JSON-lines file at `path`, created with its
    /// parent directories if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create audit log directory: {}", parent.display())
            })?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;

        debug!(path = %path.display(), "audit log opened");

        Ok(Self {
            entries: RwLock::new(Vec::new()),
            mirror: Some(Mirror {
                path,
                writer: Mutex::new(file),
            }),
        })
    }

    pub fn record(&self, entry: AuditEntry) {
        if let Some(mirror) = &self.mirror {
            // A failing disk must not block approvals or scenario control.
            if let Err(e) = write_line(mirror, &entry) {
                warn!(path = %mirror.path.display(), "audit mirror write failed: {:#}", e);
            }
        }
        debug!(action = ?entry.action, resource = %entry.resource, actor = %entry.actor, "audit");
        self.entries.write().push(entry);
    }

    /// Newest first, skipping `offset` entries.
    pub fn read(&self, limit: usize, offset: usize) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.mirror.as_ref().map(|m| m.path.as_path())
    }
}

fn write_line(mirror: &Mirror, entry: &AuditEntry) -> Result<()> {
    let mut line = serde_json::to_string(entry).context("failed to serialize audit entry")?;
    line.push('\n');

    let mut writer = mirror.writer.lock();
    writer
        .write_all(line.as_bytes())
        .with_context(|| format!("failed to write to audit log: {}", mirror.path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush audit log: {}", mirror.path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: AuditAction, resource: &str) -> AuditEntry {
        AuditEntry::new(Utc::now(), "system", action, resource)
    }

    #[test]
    fn test_read_is_newest_first_with_paging() {
        let trail = AuditTrail::in_memory();
        for name in ["a", "b", "c", "d"] {
            trail.record(entry(AuditAction::ScenarioStart, name));
        }

        let page: Vec<String> = trail.read(2, 0).into_iter().map(|e| e.resource).collect();
        assert_eq!(page, vec!["d", "c"]);
        let page: Vec<String> = trail.read(10, 3).into_iter().map(|e| e.resource).collect();
        assert_eq!(page, vec!["a"]);
        assert!(trail.read(10, 9).is_empty());
        assert_eq!(trail.len(), 4);
    }

    #[test]
    fn test_file_mirror_appends_json_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deep/nested/audit.jsonl");

        {
            let trail = AuditTrail::open(&path).unwrap();
            trail.record(
                AuditEntry::new(Utc::now(), "cmdr", AuditAction::Approve, "rec-1")
                    .with_details(serde_json::json!({"action": "ISOLATE_COMPARTMENTS"})),
            );
        }
        {
            // Re-opening keeps what is already on disk.
            let trail = AuditTrail::open(&path).unwrap();
            trail.record(
                entry(AuditAction::ScenarioEnd, "pressure-leak").with_status(AuditStatus::Success),
            );
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, AuditAction::Approve);
        assert_eq!(first.actor, "cmdr");
        assert_eq!(first.details.unwrap()["action"], "ISOLATE_COMPARTMENTS");

        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, AuditAction::ScenarioEnd);
    }

    #[test]
    fn test_none_details_omitted_in_json() {
        let json = serde_json::to_string(&entry(AuditAction::ScenarioStop, "x")).unwrap();
        assert!(!json.contains("\"details\""));
        assert!(json.contains("\"action\":\"scenario_stop\""));
        assert!(json.contains("\"status\":\"success\""));
    }
}
