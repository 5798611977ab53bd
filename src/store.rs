//! Durable key-value store: sled on disk, `DashMap` hot cache in front.
//!
//! Key prefixes: `orc/<id>`, `log/<id>/<seq>`, `worker/<id>`, `idem/<key>`,
//! `plancache/<embedding-bucket>`. Every value is a self-describing JSON
//! document (callers attach a schema-version field where it matters).

use crate::error::ControlPlaneError;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct Store {
    db: Db,
    hot: Arc<DashMap<String, Arc<serde_json::Value>>>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ControlPlaneError> {
        let db = sled::open(path)?;
        Ok(Self { db, hot: Arc::new(DashMap::new()) })
    }

    /// In-memory only, for tests: a tempdir-backed sled instance.
    pub fn open_temp() -> Result<(Self, tempfile::TempDir), ControlPlaneError> {
        let dir = tempfile::tempdir()
            .map_err(|e| ControlPlaneError::Internal { message: e.to_string() })?;
        let store = Self::open(dir.path())?;
        Ok((store, dir))
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ControlPlaneError> {
        let json = serde_json::to_value(value)?;
        self.hot.insert(key.to_string(), Arc::new(json.clone()));
        let bytes = serde_json::to_vec(&json)?;
        self.db.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ControlPlaneError> {
        if let Some(cached) = self.hot.get(key) {
            return Ok(Some(serde_json::from_value(cached.as_ref().clone())?));
        }
        match self.db.get(key.as_bytes())? {
            Some(bytes) => {
                let json: serde_json::Value = serde_json::from_slice(&bytes)?;
                self.hot.insert(key.to_string(), Arc::new(json.clone()));
                Ok(Some(serde_json::from_value(json)?))
            }
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> Result<(), ControlPlaneError> {
        self.hot.remove(key);
        self.db.remove(key.as_bytes())?;
        Ok(())
    }

    /// Scan every value whose key starts with `prefix`, in key order.
    pub fn scan_prefix<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, ControlPlaneError> {
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, bytes) = entry?;
            let key = String::from_utf8_lossy(&key).to_string();
            let value: T = serde_json::from_slice(&bytes)?;
            out.push((key, value));
        }
        Ok(out)
    }
}

pub fn worker_key(id: &str) -> String {
    format!("worker/{id}")
}

pub fn orchestration_key(id: &str) -> String {
    format!("orc/{id}")
}

pub fn log_key(orchestration_id: &str, sequence: u64) -> String {
    format!("log/{orchestration_id}/{sequence:020}")
}

pub fn log_prefix(orchestration_id: &str) -> String {
    format!("log/{orchestration_id}/")
}

pub fn idempotency_key(key: &str) -> String {
    format!("idem/{key}")
}

pub fn plan_cache_key(bucket: &str) -> String {
    format!("plancache/{bucket}")
}
