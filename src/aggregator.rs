//! Result Aggregator: assembles the terminal payload handed to Webhook Delivery.

use crate::domain::{Orchestration, OrchestrationStatus};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    pub orchestration_id: String,
    pub status: String,
    pub results: Option<Vec<serde_json::Value>>,
    pub error: Option<WebhookError>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookError {
    pub kind: String,
    pub message: String,
}

/// Build the terminal payload for a completed or failed orchestration. The
/// final task's output, unless the plan names an explicit aggregator task,
/// has already been picked out by the Scheduler by the time this runs.
pub fn assemble(orchestration: &Orchestration, output: Option<serde_json::Value>) -> WebhookEnvelope {
    let timestamp = chrono::Utc::now();
    match orchestration.status {
        OrchestrationStatus::Completed => WebhookEnvelope {
            orchestration_id: orchestration.id.to_string(),
            status: "completed".to_string(),
            results: output.map(|o| vec![o]),
            error: None,
            timestamp,
        },
        OrchestrationStatus::Failed => WebhookEnvelope {
            orchestration_id: orchestration.id.to_string(),
            status: "failed".to_string(),
            results: None,
            error: Some(WebhookError {
                kind: orchestration.failure_kind.clone().unwrap_or_else(|| "internal".to_string()),
                message: orchestration.failure_message.clone().unwrap_or_default(),
            }),
            timestamp,
        },
        other => WebhookEnvelope {
            orchestration_id: orchestration.id.to_string(),
            status: format!("{other:?}").to_lowercase(),
            results: None,
            error: None,
            timestamp,
        },
    }
}
