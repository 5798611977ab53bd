//! Plan Cache: embedding-based nearest-neighbor cache from action shape to a
//! reusable parameterized plan.

use crate::domain::Plan;
use crate::error::ControlPlaneError;
use crate::store::{plan_cache_key, Store};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Abstracts the embedding provider so a test double can stand in.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ControlPlaneError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPlan {
    pub embedding: Vec<f32>,
    pub action_shape: Vec<String>,
    pub plan: Plan,
    /// Worker name -> version as of insertion; a mismatch with the live
    /// registry invalidates the entry on lookup.
    pub worker_versions: std::collections::HashMap<String, u32>,
    pub inserted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct PlanCache {
    entries: Arc<DashMap<String, CachedPlan>>,
    store: Store,
    embedder: Arc<dyn Embedder>,
    similarity_threshold: f32,
    retention_secs: i64,
}

impl PlanCache {
    pub fn new(
        store: Store,
        embedder: Arc<dyn Embedder>,
        similarity_threshold: f32,
        retention_secs: i64,
    ) -> Self {
        Self { entries: Arc::new(DashMap::new()), store, embedder, similarity_threshold, retention_secs }
    }

    pub fn hydrate(&self) -> Result<(), ControlPlaneError> {
        for (_, entry) in self.store.scan_prefix::<CachedPlan>("plancache/")? {
            self.entries.insert(bucket_key(&entry.embedding), entry);
        }
        Ok(())
    }

    /// Nearest-neighbor lookup by cosine similarity; returns `None` on a
    /// miss or when the matched entry references a worker whose version has
    /// since advanced past what was cached (cache coherence, §8).
    pub async fn lookup(
        &self,
        action: &str,
        action_shape: &[String],
        live_worker_versions: &std::collections::HashMap<String, u32>,
    ) -> Result<Option<Plan>, ControlPlaneError> {
        let embedding = self.embedder.embed(action).await?;
        let mut best: Option<(f32, CachedPlan)> = None;

        for entry in self.entries.iter() {
            if entry.action_shape != action_shape {
                continue;
            }
            let age = chrono::Utc::now().signed_duration_since(entry.inserted_at).num_seconds();
            if age >= self.retention_secs {
                continue;
            }
            let sim = cosine_similarity(&embedding, &entry.embedding);
            if sim >= self.similarity_threshold && best.as_ref().map(|(s, _)| sim > *s).unwrap_or(true) {
                best = Some((sim, entry.clone()));
            }
        }

        match best {
            Some((_, cached)) => {
                let stale = cached.worker_versions.iter().any(|(name, version)| {
                    live_worker_versions.get(name).map(|v| v != version).unwrap_or(true)
                });
                if stale {
                    Ok(None)
                } else {
                    Ok(Some(cached.plan))
                }
            }
            None => Ok(None),
        }
    }

    pub async fn insert(
        &self,
        action: &str,
        action_shape: Vec<String>,
        plan: Plan,
    ) -> Result<(), ControlPlaneError> {
        let embedding = self.embedder.embed(action).await?;
        let worker_versions = plan.worker_versions.clone();
        let entry = CachedPlan {
            embedding: embedding.clone(),
            action_shape,
            plan,
            worker_versions,
            inserted_at: chrono::Utc::now(),
        };
        let key = bucket_key(&embedding);
        self.store.put(&plan_cache_key(&key), &entry)?;
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Invalidate every entry referencing `worker_name` at a version older
    /// than `new_version`.
    pub fn invalidate_worker(&self, worker_name: &str, new_version: u32) {
        self.entries.retain(|_, entry| {
            entry.worker_versions.get(worker_name).map(|v| *v >= new_version).unwrap_or(true)
        });
    }

    pub fn evict_expired(&self) -> usize {
        let retention = self.retention_secs;
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            chrono::Utc::now().signed_duration_since(entry.inserted_at).num_seconds() < retention
        });
        before - self.entries.len()
    }
}

fn bucket_key(embedding: &[f32]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for v in embedding {
        hasher.update(v.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
