//! Append-only execution log entry types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntryKind {
    TaskStateChange { task_id: String, from: String, to: String },
    TaskInterimResult { task_id: String, payload: serde_json::Value },
    TaskOutput { task_id: String, output: serde_json::Value },
    TaskFailure { task_id: String, error_kind: String, message: String },
    CompensationRequest { task_id: String },
    CompensationOutcome { task_id: String, succeeded: bool, message: Option<String> },
    OrchestrationStatusChange { from: String, to: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonically increasing, unique per orchestration; never reused.
    pub sequence: u64,
    pub orchestration_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub kind: LogEntryKind,
}

impl LogEntry {
    pub fn new(sequence: u64, orchestration_id: String, kind: LogEntryKind) -> Self {
        Self { sequence, orchestration_id, timestamp: chrono::Utc::now(), kind }
    }
}
