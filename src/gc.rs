//! Background sweep: evicts expired Idempotency Records and aged-out Plan
//! Cache entries on an interval, matching their own stated TTL contracts.

use crate::idempotency_store::IdempotencyStore;
use crate::plan_cache::PlanCache;
use std::sync::Arc;
use std::time::Duration;

pub struct GarbageCollector {
    idempotency: Arc<IdempotencyStore>,
    plan_cache: Arc<PlanCache>,
    interval: Duration,
}

impl GarbageCollector {
    pub fn new(idempotency: Arc<IdempotencyStore>, plan_cache: Arc<PlanCache>, interval: Duration) -> Self {
        Self { idempotency, plan_cache, interval }
    }

    /// Spawn the sweep loop as a detached tokio task.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.sweep_once();
            }
        });
    }

    fn sweep_once(&self) {
        match self.idempotency.garbage_collect() {
            Ok(evicted) if evicted > 0 => tracing::info!(evicted, "garbage-collected idempotency records"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "idempotency garbage collection failed"),
        }
        let evicted = self.plan_cache.evict_expired();
        if evicted > 0 {
            tracing::info!(evicted, "evicted expired plan-cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_cache::Embedder;
    use crate::store::Store;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, crate::error::ControlPlaneError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn sweep_evicts_expired_idempotency_records_and_plan_cache_entries() {
        let (store, dir) = Store::open_temp().unwrap();
        std::mem::forget(dir);
        let idempotency = Arc::new(IdempotencyStore::new(store.clone(), -1, -1));
        let owner = match idempotency.acquire("k").unwrap() {
            crate::idempotency_store::AcquireOutcome::Acquired { owner_token } => owner_token,
            _ => panic!("expected acquired"),
        };
        idempotency.complete("k", owner, serde_json::json!(1)).unwrap();

        let plan_cache = Arc::new(PlanCache::new(store, Arc::new(FixedEmbedder), 0.95, -1));
        plan_cache
            .insert(
                "echo this",
                vec!["message".to_string()],
                crate::domain::Plan {
                    task_zero_input: serde_json::json!({}),
                    tasks: vec![],
                    parallel_groups: vec![],
                    aggregator_task_id: None,
                    worker_versions: HashMap::new(),
                },
            )
            .await
            .unwrap();

        let gc = GarbageCollector::new(idempotency.clone(), plan_cache.clone(), Duration::from_secs(60));
        gc.sweep_once();

        assert_eq!(idempotency.garbage_collect().unwrap(), 0);
        assert_eq!(plan_cache.evict_expired(), 0);
    }
}
