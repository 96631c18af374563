//! Structured JSONL run logger.
//!
//! Machine-parseable record of one pipeline run: monotonic sequence
//! numbers, UTC timestamps with microsecond precision, run ID for
//! correlation, and structured event payloads. Raw stage output is saved
//! beside the event log so degraded extractions can be inspected later.

use crate::stage::StageKind;
use crate::state_machine::StateEvent;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A single entry in `events.jsonl`.
#[derive(Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number, unique within the run.
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds.
    pub ts: String,
    /// Run ID correlating entries with the coordinator's snapshots.
    pub run_id: String,
    /// Component that emitted the entry.
    pub component: String,
    /// Structured event data.
    pub event: Value,
}

pub struct RunLog {
    run_id: String,
    seq: AtomicU64,
    events_file: Mutex<File>,
    dir: PathBuf,
}

impl RunLog {
    /// Creates the log directory `.triad/<run-id>/` under the working
    /// directory and opens `events.jsonl` inside it.
    pub fn create(working_dir: &Path, run_id: &str) -> anyhow::Result<Self> {
        let dir = working_dir.join(".triad").join(run_id);
        std::fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("events.jsonl"))?;

        Ok(Self {
            run_id: run_id.to_string(),
            seq: AtomicU64::new(0),
            events_file: Mutex::new(file),
            dir,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Appends a structured event as one JSONL line. Thread-safe; write
    /// errors are swallowed so logging can never fail a run.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            run_id: self.run_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.events_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    /// Logs a state machine event with the machine's own sequence number.
    pub fn log_state_event(&self, machine_seq: u64, event: &StateEvent) {
        self.log(
            "state_machine",
            serde_json::json!({
                "machine_seq": machine_seq,
                "event": event,
            }),
        );
    }

    /// Logs a stage invocation outcome.
    pub fn log_stage_outcome(&self, stage: StageKind, success: bool, detail: Option<&str>) {
        self.log(
            "invoker",
            serde_json::json!({
                "type": "StageOutcome",
                "stage": stage,
                "success": success,
                "detail": detail,
            }),
        );
    }

    /// Saves the full raw output of a stage to `<stage>-output.log`.
    pub fn record_stage_output(&self, stage: StageKind, raw: &str) {
        let path = self.dir.join(format!("{}-output.log", stage.label()));
        let _ = std::fs::write(path, raw);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

#[cfg(test)]
#[path = "run_log_tests.rs"]
mod tests;
