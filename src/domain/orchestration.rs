//! Orchestration identity and status state machine.
//!
//! Mirrors the Case/CaseState pattern: one state-transition method per
//! operation, each validated by a `match` on the current status.

use crate::error::ControlPlaneError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrchestrationId(pub Uuid);

impl OrchestrationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> Result<Self, ControlPlaneError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ControlPlaneError::Validation { message: format!("invalid orchestration id: {e}") })
    }
}

impl Default for OrchestrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrchestrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Registered,
    Pending,
    Processing,
    Completed,
    Failed,
    Paused,
    NotActionable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDataField {
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub id: OrchestrationId,
    pub project_id: String,
    pub action: String,
    pub action_data: Vec<ActionDataField>,
    pub webhook_url: String,
    pub health_check_grace_period_secs: u64,
    pub overall_timeout_secs: u64,
    pub status: OrchestrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when `paused`; the orchestration fails permanently if this elapses
    /// before the responsible worker recovers.
    pub paused_at: Option<DateTime<Utc>>,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
}

impl Orchestration {
    pub fn new(
        project_id: String,
        action: String,
        action_data: Vec<ActionDataField>,
        webhook_url: String,
        health_check_grace_period_secs: u64,
        overall_timeout_secs: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrchestrationId::new(),
            project_id,
            action,
            action_data,
            webhook_url,
            health_check_grace_period_secs,
            overall_timeout_secs,
            status: OrchestrationStatus::Registered,
            created_at: now,
            updated_at: now,
            paused_at: None,
            failure_kind: None,
            failure_message: None,
        }
    }

    fn invalid(&self, to: &str) -> ControlPlaneError {
        ControlPlaneError::InvalidStateTransition {
            from: format!("{:?}", self.status),
            to: to.to_string(),
        }
    }

    pub fn start_processing(&mut self) -> Result<(), ControlPlaneError> {
        match self.status {
            OrchestrationStatus::Registered | OrchestrationStatus::Pending => {
                self.status = OrchestrationStatus::Processing;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid("processing")),
        }
    }

    pub fn pause(&mut self) -> Result<(), ControlPlaneError> {
        match self.status {
            OrchestrationStatus::Processing => {
                self.status = OrchestrationStatus::Paused;
                self.paused_at = Some(Utc::now());
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid("paused")),
        }
    }

    pub fn resume(&mut self) -> Result<(), ControlPlaneError> {
        match self.status {
            OrchestrationStatus::Paused => {
                self.status = OrchestrationStatus::Processing;
                self.paused_at = None;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid("processing")),
        }
    }

    /// True once `paused_at` plus the grace period has elapsed.
    pub fn grace_period_expired(&self) -> bool {
        match self.paused_at {
            Some(paused_at) => {
                let elapsed = Utc::now().signed_duration_since(paused_at);
                elapsed.num_seconds() as u64 >= self.health_check_grace_period_secs
            }
            None => false,
        }
    }

    pub fn complete(&mut self) -> Result<(), ControlPlaneError> {
        match self.status {
            OrchestrationStatus::Processing => {
                self.status = OrchestrationStatus::Completed;
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid("completed")),
        }
    }

    pub fn fail(&mut self, kind: String, message: String) -> Result<(), ControlPlaneError> {
        match self.status {
            OrchestrationStatus::Processing | OrchestrationStatus::Paused => {
                self.status = OrchestrationStatus::Failed;
                self.failure_kind = Some(kind);
                self.failure_message = Some(message);
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid("failed")),
        }
    }

    pub fn mark_not_actionable(&mut self, message: String) -> Result<(), ControlPlaneError> {
        match self.status {
            OrchestrationStatus::Registered | OrchestrationStatus::Pending => {
                self.status = OrchestrationStatus::NotActionable;
                self.failure_kind = Some("not_actionable".to_string());
                self.failure_message = Some(message);
                self.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(self.invalid("not_actionable")),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OrchestrationStatus::Completed
                | OrchestrationStatus::Failed
                | OrchestrationStatus::NotActionable
        )
    }
}
