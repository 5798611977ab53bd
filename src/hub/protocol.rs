//! Bidirectional framed-JSON wire protocol between the control plane and workers.

use serde::{Deserialize, Serialize};

/// Soft per-frame limit; oversized inbound frames are rejected with
/// `message_too_large` and the sender is asked to resend as an interim result.
pub const FRAME_SOFT_LIMIT_BYTES: usize = 10 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Ping,
    Pong,
    TaskRequest {
        orchestration_id: String,
        task_id: String,
        idempotency_key: String,
        input: serde_json::Value,
        deadline: chrono::DateTime<chrono::Utc>,
    },
    TaskInterimResult {
        task_id: String,
        payload: serde_json::Value,
    },
    TaskResult {
        task_id: String,
        idempotency_key: String,
        output: serde_json::Value,
    },
    TaskFailure {
        task_id: String,
        idempotency_key: String,
        kind: FailureKind,
        message: String,
        compensation_context: Option<serde_json::Value>,
    },
    Abort {
        task_id: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Retryable,
    Permanent,
}

impl Frame {
    pub fn encoded_size(&self) -> Result<usize, serde_json::Error> {
        Ok(serde_json::to_vec(self)?.len())
    }
}
