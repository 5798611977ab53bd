//! Worker Registry: registration, lookup, and capability search.
//!
//! Lock-free concurrent map with snapshot reads, per §5's shared-resource
//! policy; liveness fields are updated by the Connection Hub, never here.

use crate::domain::{Worker, WorkerId, WorkerKind};
use crate::error::ControlPlaneError;
use crate::store::{worker_key, Store};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct WorkerRegistry {
    by_id: Arc<DashMap<WorkerId, Worker>>,
    by_name: Arc<DashMap<String, WorkerId>>,
    store: Store,
}

impl WorkerRegistry {
    pub fn new(store: Store) -> Self {
        Self { by_id: Arc::new(DashMap::new()), by_name: Arc::new(DashMap::new()), store }
    }

    /// Load all persisted workers into the in-memory maps; called once at startup.
    pub fn hydrate(&self) -> Result<(), ControlPlaneError> {
        for (_, worker) in self.store.scan_prefix::<Worker>("worker/")? {
            self.by_name.insert(worker.name.clone(), worker.id);
            self.by_id.insert(worker.id, worker);
        }
        Ok(())
    }

    /// Register or re-register a worker by name. Returns `(id, version)` and,
    /// when the schema changed, also the new version number so callers can
    /// invalidate dependent plan-cache entries.
    #[tracing::instrument(skip(self, input_schema, output_schema))]
    pub fn register(
        &self,
        name: String,
        kind: WorkerKind,
        description: String,
        input_schema: serde_json::Value,
        output_schema: serde_json::Value,
        revertible: bool,
    ) -> Result<(WorkerId, u32, bool), ControlPlaneError> {
        if let Some(existing_id) = self.by_name.get(&name).map(|r| *r) {
            let mut schema_changed = false;
            let (id, version) = {
                let mut entry = self.by_id.get_mut(&existing_id).ok_or_else(|| {
                    ControlPlaneError::Internal { message: "registry inconsistency".to_string() }
                })?;
                schema_changed =
                    entry.re_register(description, input_schema, output_schema, revertible);
                (entry.id, entry.version)
            };
            let worker = self.by_id.get(&id).unwrap().clone();
            self.store.put(&worker_key(&id.to_string()), &worker)?;
            return Ok((id, version, schema_changed));
        }

        let worker = Worker::new(name.clone(), kind, description, input_schema, output_schema, revertible);
        let id = worker.id;
        let version = worker.version;
        self.store.put(&worker_key(&id.to_string()), &worker)?;
        self.by_name.insert(name, id);
        self.by_id.insert(id, worker);
        Ok((id, version, false))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Worker> {
        let id = self.by_name.get(name)?;
        self.by_id.get(&id).map(|w| w.clone())
    }

    pub fn lookup_by_id(&self, id: WorkerId) -> Option<Worker> {
        self.by_id.get(&id).map(|w| w.clone())
    }

    /// Naive capability search used by the Planner: substring match against
    /// each registered worker's declared description.
    pub fn find_by_capability(&self, description_query: &str) -> Vec<Worker> {
        let query = description_query.to_lowercase();
        self.by_id
            .iter()
            .filter(|entry| entry.description.to_lowercase().contains(&query))
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<Worker> {
        self.by_id.iter().map(|e| e.clone()).collect()
    }

    pub fn set_connection_state(&self, id: WorkerId, state: crate::domain::ConnectionState) {
        if let Some(mut worker) = self.by_id.get_mut(&id) {
            worker.connection_state = state;
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
