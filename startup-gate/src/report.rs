//! Optional JSONL record of how the gate finished.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::Target;
use crate::error::GateError;
use crate::gate::WaitOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Skipped,
    Ready,
    Timeout,
    Interrupted,
    SetupFailed,
    ConfigError,
    HandoffFailed,
}

impl From<&GateError> for Outcome {
    fn from(err: &GateError) -> Self {
        match err {
            GateError::Config(_) | GateError::Signal(_) => Outcome::ConfigError,
            GateError::DependencyTimeout { .. } => Outcome::Timeout,
            GateError::Interrupted { .. } => Outcome::Interrupted,
            GateError::Setup { .. } => Outcome::SetupFailed,
            GateError::Handoff { .. } => Outcome::HandoffFailed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportEntry {
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub probes: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportEntry {
    pub fn opened(outcome: &WaitOutcome, target: Option<&Target>) -> Self {
        let (kind, probes, elapsed_ms) = match outcome {
            WaitOutcome::Skipped => (Outcome::Skipped, 0, 0),
            WaitOutcome::Ready { probes, elapsed } => {
                (Outcome::Ready, *probes, elapsed.as_millis() as u64)
            }
        };
        Self {
            outcome: kind,
            target: target.map(Target::to_string),
            probes,
            elapsed_ms,
            exit_code: None,
            error: None,
        }
    }

    pub fn failed(err: &GateError, target: Option<&Target>) -> Self {
        let (probes, elapsed_ms) = match err {
            GateError::DependencyTimeout {
                probes, elapsed, ..
            }
            | GateError::Interrupted {
                probes, elapsed, ..
            } => (*probes, elapsed.as_millis() as u64),
            _ => (0, 0),
        };
        Self {
            outcome: Outcome::from(err),
            target: target.map(Target::to_string),
            probes,
            elapsed_ms,
            exit_code: Some(err.exit_code()),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct Line<'a> {
    ts: String,
    #[serde(flatten)]
    entry: &'a ReportEntry,
}

/// Append `entry` to the report file at `path`.
///
/// Failures are logged and otherwise ignored: reporting never changes the
/// gate's outcome.
pub fn record(path: &Path, entry: &ReportEntry) {
    let line = Line {
        ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        entry,
    };
    let json = match serde_json::to_string(&line) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "serialize gate report");
            return;
        }
    };

    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{json}"));
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "write gate report");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn ready_entry_carries_probe_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.jsonl");
        let target = Target::new("db", 5432).unwrap();
        let outcome = WaitOutcome::Ready {
            probes: 4,
            elapsed: Duration::from_millis(320),
        };

        record(&path, &ReportEntry::opened(&outcome, Some(&target)));

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["outcome"], "ready");
        assert_eq!(line["target"], "db:5432");
        assert_eq!(line["probes"], 4);
        assert_eq!(line["elapsed_ms"], 320);
        assert!(line["ts"].as_str().unwrap().ends_with('Z'));
        assert!(line.get("error").is_none());
    }

    #[test]
    fn failure_entry_records_error_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.jsonl");
        let target = Target::new("db", 5432).unwrap();
        let err = GateError::DependencyTimeout {
            target: target.clone(),
            elapsed: Duration::from_secs(2),
            probes: 20,
        };

        record(&path, &ReportEntry::failed(&err, Some(&target)));

        let line = &read_lines(&path)[0];
        assert_eq!(line["outcome"], "timeout");
        assert_eq!(line["probes"], 20);
        assert_eq!(line["elapsed_ms"], 2000);
        assert_eq!(line["exit_code"], 69);
        assert!(line["error"].as_str().unwrap().contains("db:5432"));
    }

    #[test]
    fn interrupted_entry_keeps_wait_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.jsonl");
        let target = Target::new("db", 5432).unwrap();
        let err = GateError::Interrupted {
            signal: nix::sys::signal::Signal::SIGTERM,
            probes: 7,
            elapsed: Duration::from_millis(640),
        };

        record(&path, &ReportEntry::failed(&err, Some(&target)));

        let line = &read_lines(&path)[0];
        assert_eq!(line["outcome"], "interrupted");
        assert_eq!(line["probes"], 7);
        assert_eq!(line["elapsed_ms"], 640);
        assert_eq!(line["exit_code"], 143);
    }

    #[test]
    fn entries_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.jsonl");

        record(&path, &ReportEntry::opened(&WaitOutcome::Skipped, None));
        let err = GateError::Config("no command given to hand off to".into());
        record(&path, &ReportEntry::failed(&err, None));

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["outcome"], "skipped");
        assert!(lines[0].get("target").is_none());
        assert_eq!(lines[1]["outcome"], "config_error");
        assert_eq!(lines[1]["exit_code"], 2);
    }

    #[test]
    fn unwritable_path_is_ignored() {
        let entry = ReportEntry::opened(&WaitOutcome::Skipped, None);
        record(Path::new("/nonexistent/dir/gate.jsonl"), &entry);
    }
}
