//! Error kinds for the orchestration runtime.
//!
//! One enum carries every error kind named for the control plane: each
//! variant renders both a machine-readable `kind()` and a human message, so
//! HTTP handlers and webhook payloads can surface `{kind, message}` without
//! re-deriving it ad hoc.

use thiserror::Error;

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("orchestration {orchestration_id} is not actionable: {reason}")]
    NotActionable { orchestration_id: String, reason: String },

    #[error("retryable worker error on task {task_id}: {message}")]
    RetryableWorker { task_id: String, message: String },

    #[error("permanent worker error on task {task_id}: {message}")]
    PermanentWorker { task_id: String, message: String },

    #[error("worker {worker_id} did not recover within the health-check grace period")]
    HealthTimeout { worker_id: String },

    #[error("orchestration {orchestration_id} exceeded its overall timeout")]
    OrchestrationTimeout { orchestration_id: String },

    #[error("compensation failed for task {task_id}: {message}")]
    CompensationFailed { task_id: String, message: String },

    #[error("backpressure: outbound queue for worker {worker_id} is full")]
    Backpressure { worker_id: String },

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    #[error("orchestration not found: {0}")]
    OrchestrationNotFound(String),

    #[error("message too large: {size} bytes exceeds the {limit} byte soft limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ControlPlaneError {
    /// Machine-readable kind, as surfaced in webhook payloads and inspect output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotActionable { .. } => "not_actionable",
            Self::RetryableWorker { .. } => "retryable_worker",
            Self::PermanentWorker { .. } => "permanent_worker",
            Self::HealthTimeout { .. } => "health_timeout",
            Self::OrchestrationTimeout { .. } => "orchestration_timeout",
            Self::CompensationFailed { .. } => "compensation_failed",
            Self::Backpressure { .. } => "backpressure",
            Self::InvalidStateTransition { .. } => "validation",
            Self::WorkerNotFound(_) => "validation",
            Self::OrchestrationNotFound(_) => "validation",
            Self::MessageTooLarge { .. } => "backpressure",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Separates errors the Task Worker and Webhook Delivery retry loops should
/// absorb from ones that must bubble up as permanent failures.
pub trait Recoverable {
    fn is_retryable(&self) -> bool;
}

impl Recoverable for ControlPlaneError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RetryableWorker { .. } | Self::Backpressure { .. } | Self::HealthTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for ControlPlaneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal { message: format!("json error: {err}") }
    }
}

impl From<sled::Error> for ControlPlaneError {
    fn from(err: sled::Error) -> Self {
        Self::Internal { message: format!("store error: {err}") }
    }
}

impl From<reqwest::Error> for ControlPlaneError {
    fn from(err: reqwest::Error) -> Self {
        Self::RetryableWorker {
            task_id: "webhook".to_string(),
            message: format!("http error: {err}"),
        }
    }
}
