//! Plan, Task, and reference-token resolution.

use crate::error::ControlPlaneError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Registered,
    Pending,
    Processing,
    Completed,
    Failed,
    Paused,
}

/// Synthetic task id carrying action-data bindings; every reference token
/// either points at this or at an earlier real task.
pub const TASK_ZERO: &str = "task-zero";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub worker_name: String,
    pub input: serde_json::Value,
    pub state: TaskState,
    pub revertible: bool,
    pub interim_results: Vec<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
}

impl Task {
    pub fn new(id: String, worker_name: String, input: serde_json::Value) -> Self {
        Self {
            id,
            worker_name,
            input,
            state: TaskState::Registered,
            revertible: false,
            interim_results: Vec::new(),
            output: None,
            failure_reason: None,
            retry_count: 0,
        }
    }

    /// The idempotency key is a deterministic function of orchestration id,
    /// task id, and a hash of the (resolved) input, so it is stable across
    /// retries and control-plane restarts.
    pub fn idempotency_key(&self, orchestration_id: &str, resolved_input: &serde_json::Value) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(orchestration_id.as_bytes());
        hasher.update(self.id.as_bytes());
        hasher.update(resolved_input.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task_zero_input: serde_json::Value,
    pub tasks: Vec<Task>,
    /// Dispatch waves: each inner vec is a set of task ids ready together.
    pub parallel_groups: Vec<Vec<String>>,
    /// Declares which task's output is the orchestration's final result;
    /// defaults to the last plan-declared task if unset.
    pub aggregator_task_id: Option<String>,
    /// Worker name -> version, as of plan validation; used for cache invalidation.
    pub worker_versions: HashMap<String, u32>,
}

impl Plan {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn final_task_id(&self) -> Option<&str> {
        self.aggregator_task_id
            .as_deref()
            .or_else(|| self.tasks.last().map(|t| t.id.as_str()))
    }

    /// True if `graph` (task id -> its reference-token dependencies) is acyclic.
    pub fn is_acyclic(&self) -> bool {
        let deps = self.dependency_graph();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: HashSet<&str> = HashSet::new();

        fn visit<'a>(
            node: &'a str,
            deps: &'a HashMap<String, Vec<String>>,
            visited: &mut HashSet<&'a str>,
            stack: &mut HashSet<&'a str>,
        ) -> bool {
            if stack.contains(node) {
                return false;
            }
            if visited.contains(node) {
                return true;
            }
            visited.insert(node);
            stack.insert(node);
            if let Some(children) = deps.get(node) {
                for child in children {
                    if !visit(child, deps, visited, stack) {
                        return false;
                    }
                }
            }
            stack.remove(node);
            true
        }

        for task in &self.tasks {
            if !visit(&task.id, &deps, &mut visited, &mut stack) {
                return false;
            }
        }
        true
    }

    /// task id -> the task ids its reference tokens depend on (excludes Task Zero).
    pub fn dependency_graph(&self) -> HashMap<String, Vec<String>> {
        let mut graph = HashMap::new();
        for task in &self.tasks {
            let refs = extract_reference_tokens(&task.input)
                .into_iter()
                .filter_map(|token| token.task_id)
                .filter(|tid| tid != TASK_ZERO)
                .collect();
            graph.insert(task.id.clone(), refs);
        }
        graph
    }

    /// Reverse-topological order of succeeded revertible tasks, for compensation.
    pub fn reverse_topological_revertible(&self) -> Vec<&Task> {
        let graph = self.dependency_graph();
        let mut order = Vec::new();
        let mut visited = HashSet::new();

        fn visit<'a>(
            id: &str,
            plan: &'a Plan,
            graph: &HashMap<String, Vec<String>>,
            visited: &mut HashSet<String>,
            order: &mut Vec<&'a Task>,
        ) {
            if visited.contains(id) {
                return;
            }
            visited.insert(id.to_string());
            if let Some(deps) = graph.get(id) {
                for dep in deps {
                    visit(dep, plan, graph, visited, order);
                }
            }
            if let Some(task) = plan.task(id) {
                order.push(task);
            }
        }

        for task in &self.tasks {
            visit(&task.id, self, &graph, &mut visited, &mut order);
        }
        order.reverse();
        order
            .into_iter()
            .filter(|t| t.revertible && t.state == TaskState::Completed)
            .collect()
    }
}

/// A parsed `$<task-id>.<field-path>` reference token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToken {
    pub task_id: Option<String>,
    pub field_path: Vec<String>,
    pub raw: String,
}

pub fn parse_reference_token(s: &str) -> Option<ReferenceToken> {
    let rest = s.strip_prefix('$')?;
    let mut parts = rest.split('.');
    let task_id = parts.next()?.to_string();
    let field_path: Vec<String> = parts.map(|p| p.to_string()).collect();
    Some(ReferenceToken { task_id: Some(task_id), field_path, raw: s.to_string() })
}

/// Walk a JSON value collecting every string that looks like a reference token.
pub fn extract_reference_tokens(value: &serde_json::Value) -> Vec<ReferenceToken> {
    let mut tokens = Vec::new();
    walk(value, &mut tokens);
    return tokens;

    fn walk(value: &serde_json::Value, out: &mut Vec<ReferenceToken>) {
        match value {
            serde_json::Value::String(s) => {
                if let Some(tok) = parse_reference_token(s) {
                    out.push(tok);
                }
            }
            serde_json::Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            serde_json::Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
}

/// Resolve every reference token in `input` against already-produced task
/// outputs (and Task Zero's bindings). Errors if a token does not resolve.
pub fn resolve_input(
    input: &serde_json::Value,
    task_zero_input: &serde_json::Value,
    resolved_outputs: &HashMap<String, serde_json::Value>,
) -> Result<serde_json::Value, ControlPlaneError> {
    resolve_value(input, task_zero_input, resolved_outputs)
}

fn resolve_value(
    value: &serde_json::Value,
    task_zero_input: &serde_json::Value,
    resolved_outputs: &HashMap<String, serde_json::Value>,
) -> Result<serde_json::Value, ControlPlaneError> {
    match value {
        serde_json::Value::String(s) => {
            if let Some(token) = parse_reference_token(s) {
                resolve_token(&token, task_zero_input, resolved_outputs)
            } else {
                Ok(value.clone())
            }
        }
        serde_json::Value::Array(items) => {
            let resolved: Result<Vec<_>, _> = items
                .iter()
                .map(|v| resolve_value(v, task_zero_input, resolved_outputs))
                .collect();
            Ok(serde_json::Value::Array(resolved?))
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, task_zero_input, resolved_outputs)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_token(
    token: &ReferenceToken,
    task_zero_input: &serde_json::Value,
    resolved_outputs: &HashMap<String, serde_json::Value>,
) -> Result<serde_json::Value, ControlPlaneError> {
    let task_id = token.task_id.as_deref().unwrap_or_default();
    let root = if task_id == TASK_ZERO {
        task_zero_input
    } else {
        resolved_outputs.get(task_id).ok_or_else(|| ControlPlaneError::Validation {
            message: format!("reference token {} does not resolve: task {} has no output yet", token.raw, task_id),
        })?
    };

    let mut current = root;
    for field in &token.field_path {
        current = current.get(field).ok_or_else(|| ControlPlaneError::Validation {
            message: format!("reference token {} does not resolve: missing field {}", token.raw, field),
        })?;
    }
    Ok(current.clone())
}
