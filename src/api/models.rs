//! Request/response DTOs for the client HTTP surface (§6).

use crate::domain::{ActionDataField, OrchestrationStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ActionDataEntry {
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrchestrationRequest {
    pub action: String,
    #[serde(default)]
    pub data: Vec<ActionDataEntry>,
    pub webhook: String,
    pub timeout: Option<u64>,
    pub health_check_grace_period: Option<u64>,
}

impl CreateOrchestrationRequest {
    pub fn into_action_data(self) -> Vec<ActionDataField> {
        self.data.into_iter().map(|e| ActionDataField { field: e.field, value: e.value }).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct OrchestrationSummary {
    pub id: String,
    pub status: OrchestrationStatus,
}

#[derive(Debug, Serialize)]
pub struct OrchestrationDetail {
    pub id: String,
    pub status: OrchestrationStatus,
    pub action: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
    pub log: Vec<crate::domain::LogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
    pub kind: crate::domain::WorkerKind,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    #[serde(default)]
    pub revertible: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterWorkerResponse {
    pub id: String,
    pub version: u32,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub registered_workers: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct CompensationFailure {
    pub orchestration_id: String,
    pub task_id: String,
    pub message: String,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    pub resolved: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}
