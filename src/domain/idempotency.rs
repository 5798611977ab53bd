//! Idempotency record: lease-based at-most-one-concurrent-execution guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    InFlight,
    Succeeded,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub owner_token: Uuid,
    pub lease_expiry: DateTime<Utc>,
    pub status: IdempotencyStatus,
    pub cached_result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new_lease(key: String, lease_ttl_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            key,
            owner_token: Uuid::new_v4(),
            lease_expiry: now + chrono::Duration::seconds(lease_ttl_secs),
            status: IdempotencyStatus::InFlight,
            cached_result: None,
            created_at: now,
        }
    }

    pub fn lease_expired(&self) -> bool {
        Utc::now() >= self.lease_expiry
    }

    pub fn is_fresh_success(&self, ttl_secs: i64) -> bool {
        self.status == IdempotencyStatus::Succeeded
            && self.cached_result.is_some()
            && Utc::now().signed_duration_since(self.created_at).num_seconds() < ttl_secs
    }
}

/// A task that succeeded and declared itself `revertible`, recorded for
/// possible reverse-topological compensation on later unrecoverable failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationCandidate {
    pub task_id: String,
    pub worker_name: String,
    pub output: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}
