//! Idempotency Store: at-most-one-concurrent-execution lease contract.

use crate::domain::{IdempotencyRecord, IdempotencyStatus};
use crate::error::ControlPlaneError;
use crate::store::{idempotency_key, Store};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

pub enum AcquireOutcome {
    /// A fresh or expired-lease acquisition; proceed to dispatch.
    Acquired { owner_token: Uuid },
    /// A fresh cached result exists; do not dispatch.
    Cached { result: serde_json::Value },
    /// Another owner holds a live lease; caller should poll.
    Busy,
}

#[derive(Clone)]
pub struct IdempotencyStore {
    records: Arc<DashMap<String, IdempotencyRecord>>,
    store: Store,
    lease_ttl_secs: i64,
    result_ttl_secs: i64,
}

impl IdempotencyStore {
    pub fn new(store: Store, lease_ttl_secs: i64, result_ttl_secs: i64) -> Self {
        Self { records: Arc::new(DashMap::new()), store, lease_ttl_secs, result_ttl_secs }
    }

    #[tracing::instrument(skip(self))]
    pub fn acquire(&self, key: &str) -> Result<AcquireOutcome, ControlPlaneError> {
        if let Some(existing) = self.load(key)? {
            if existing.is_fresh_success(self.result_ttl_secs) {
                return Ok(AcquireOutcome::Cached {
                    result: existing.cached_result.clone().unwrap_or(serde_json::Value::Null),
                });
            }
            if existing.status == IdempotencyStatus::InFlight && !existing.lease_expired() {
                return Ok(AcquireOutcome::Busy);
            }
        }

        let record = IdempotencyRecord::new_lease(key.to_string(), self.lease_ttl_secs);
        let owner_token = record.owner_token;
        self.persist(&record)?;
        Ok(AcquireOutcome::Acquired { owner_token })
    }

    pub fn complete(
        &self,
        key: &str,
        owner_token: Uuid,
        result: serde_json::Value,
    ) -> Result<(), ControlPlaneError> {
        self.transition(key, owner_token, IdempotencyStatus::Succeeded, Some(result))
    }

    pub fn fail(&self, key: &str, owner_token: Uuid) -> Result<(), ControlPlaneError> {
        self.transition(key, owner_token, IdempotencyStatus::Failed, None)
    }

    pub fn abort(&self, key: &str, owner_token: Uuid) -> Result<(), ControlPlaneError> {
        self.transition(key, owner_token, IdempotencyStatus::Aborted, None)
    }

    fn transition(
        &self,
        key: &str,
        owner_token: Uuid,
        status: IdempotencyStatus,
        result: Option<serde_json::Value>,
    ) -> Result<(), ControlPlaneError> {
        let mut record = self.load(key)?.ok_or_else(|| ControlPlaneError::Internal {
            message: format!("no idempotency record for key {key}"),
        })?;
        if record.owner_token != owner_token {
            return Err(ControlPlaneError::Internal {
                message: format!("owner token mismatch for key {key}"),
            });
        }
        record.status = status;
        record.cached_result = result;
        self.persist(&record)
    }

    /// Evict records whose terminal status is older than the result TTL.
    pub fn garbage_collect(&self) -> Result<usize, ControlPlaneError> {
        let mut evicted = 0;
        let stored: Vec<(String, IdempotencyRecord)> = self.store.scan_prefix("idem/")?;
        for (store_key, record) in stored {
            let age = chrono::Utc::now().signed_duration_since(record.created_at).num_seconds();
            if record.status != IdempotencyStatus::InFlight && age >= self.result_ttl_secs {
                self.store.delete(&store_key)?;
                self.records.remove(&record.key);
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    fn load(&self, key: &str) -> Result<Option<IdempotencyRecord>, ControlPlaneError> {
        if let Some(cached) = self.records.get(key) {
            return Ok(Some(cached.clone()));
        }
        self.store.get(&idempotency_key(key))
    }

    fn persist(&self, record: &IdempotencyRecord) -> Result<(), ControlPlaneError> {
        self.records.insert(record.key.clone(), record.clone());
        self.store.put(&idempotency_key(&record.key), record)
    }
}
