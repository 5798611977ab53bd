//! Worker identity, schema, and liveness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Service,
    Agent,
}

/// Connection liveness as tracked by the Connection Hub; read-only from the
/// Worker Registry's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Degraded,
    Unreachable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub kind: WorkerKind,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    /// Bumped every time a re-registration changes `input_schema`/`output_schema`.
    pub version: u32,
    pub connection_state: ConnectionState,
    pub last_seen: DateTime<Utc>,
    /// Declared by the worker at registration; gates compensation eligibility.
    pub revertible: bool,
}

impl Worker {
    pub fn new(
        name: String,
        kind: WorkerKind,
        description: String,
        input_schema: serde_json::Value,
        output_schema: serde_json::Value,
        revertible: bool,
    ) -> Self {
        Self {
            id: WorkerId::new(),
            name,
            kind,
            description,
            input_schema,
            output_schema,
            version: 1,
            connection_state: ConnectionState::Connected,
            last_seen: Utc::now(),
            revertible,
        }
    }

    /// Re-register with a possibly-updated schema. Returns `true` if the
    /// schema actually changed (version bumped, plan-cache entries referencing
    /// this worker must be invalidated).
    pub fn re_register(
        &mut self,
        description: String,
        input_schema: serde_json::Value,
        output_schema: serde_json::Value,
        revertible: bool,
    ) -> bool {
        let schema_changed =
            self.input_schema != input_schema || self.output_schema != output_schema;
        self.description = description;
        self.input_schema = input_schema;
        self.output_schema = output_schema;
        self.revertible = revertible;
        self.last_seen = Utc::now();
        if schema_changed {
            self.version += 1;
        }
        schema_changed
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
        self.connection_state = ConnectionState::Connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_register_with_same_schema_keeps_version() {
        let schema = serde_json::json!({"type": "object"});
        let mut w = Worker::new(
            "echo".into(),
            WorkerKind::Service,
            "echoes input".into(),
            schema.clone(),
            schema.clone(),
            false,
        );
        let changed = w.re_register("echoes input".into(), schema.clone(), schema.clone(), false);
        assert!(!changed);
        assert_eq!(w.version, 1);
    }

    #[test]
    fn re_register_with_new_schema_bumps_version() {
        let schema = serde_json::json!({"type": "object"});
        let mut w = Worker::new(
            "echo".into(),
            WorkerKind::Service,
            "echoes input".into(),
            schema.clone(),
            schema.clone(),
            false,
        );
        let new_schema = serde_json::json!({"type": "object", "properties": {"x": {}}});
        let changed = w.re_register("echoes input".into(), new_schema.clone(), schema, false);
        assert!(changed);
        assert_eq!(w.version, 2);
    }
}
