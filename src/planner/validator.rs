//! Static plan validation: capability grounding, reference integrity, Task
//! Zero completeness, reachability.

use crate::domain::plan::{extract_reference_tokens, TASK_ZERO};
use crate::domain::{Plan, Worker};
use crate::error::ControlPlaneError;
use std::collections::HashSet;

pub fn validate(plan: &Plan, workers: &[Worker], action_fields: &[String]) -> Result<(), ControlPlaneError> {
    capability_grounding(plan, workers)?;
    reference_integrity(plan)?;
    task_zero_completeness(plan, action_fields)?;
    no_self_reference_or_unreachable(plan)?;
    Ok(())
}

fn capability_grounding(plan: &Plan, workers: &[Worker]) -> Result<(), ControlPlaneError> {
    for task in &plan.tasks {
        let worker = workers.iter().find(|w| w.name == task.worker_name).ok_or_else(|| {
            ControlPlaneError::Validation {
                message: format!("task {} targets unknown worker {}", task.id, task.worker_name),
            }
        })?;
        if !schema_accepts(&worker.input_schema, &task.input) {
            return Err(ControlPlaneError::Validation {
                message: format!(
                    "task {} input does not match worker {}'s declared input schema",
                    task.id, task.worker_name
                ),
            });
        }
    }
    Ok(())
}

/// Minimal structural check: every required top-level property the schema
/// declares must be present in the task's input object (bound or reference).
fn schema_accepts(schema: &serde_json::Value, input: &serde_json::Value) -> bool {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return true;
    };
    let Some(input_obj) = input.as_object() else {
        return required.is_empty();
    };
    required.iter().all(|field| field.as_str().map(|f| input_obj.contains_key(f)).unwrap_or(true))
}

fn reference_integrity(plan: &Plan) -> Result<(), ControlPlaneError> {
    if !plan.is_acyclic() {
        return Err(ControlPlaneError::Validation { message: "plan dependency graph contains a cycle".to_string() });
    }

    let task_ids: HashSet<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
    for task in &plan.tasks {
        for token in extract_reference_tokens(&task.input) {
            let Some(target) = token.task_id.as_deref() else { continue };
            if target != TASK_ZERO && !task_ids.contains(target) {
                return Err(ControlPlaneError::Validation {
                    message: format!("task {} references unknown task {}", task.id, target),
                });
            }
        }
    }

    let declared: HashSet<&str> = plan.parallel_groups.iter().flatten().map(|s| s.as_str()).collect();
    if declared.len() != plan.tasks.len() || !task_ids.iter().all(|id| declared.contains(id)) {
        return Err(ControlPlaneError::Validation {
            message: "parallel_groups is not a valid partition of the plan's tasks".to_string(),
        });
    }

    let graph = plan.dependency_graph();
    let mut seen: HashSet<&str> = HashSet::new();
    for group in &plan.parallel_groups {
        for task_id in group {
            if let Some(deps) = graph.get(task_id) {
                for dep in deps {
                    if !seen.contains(dep.as_str()) {
                        return Err(ControlPlaneError::Validation {
                            message: format!(
                                "parallel_groups ordering violates dependency: {} depends on {} which has not dispatched yet",
                                task_id, dep
                            ),
                        });
                    }
                }
            }
        }
        for task_id in group {
            seen.insert(task_id.as_str());
        }
    }
    Ok(())
}

fn task_zero_completeness(plan: &Plan, action_fields: &[String]) -> Result<(), ControlPlaneError> {
    let Some(task_zero_obj) = plan.task_zero_input.as_object() else {
        return Err(ControlPlaneError::Validation { message: "task zero input must be an object".to_string() });
    };
    for field in action_fields {
        if !task_zero_obj.contains_key(field) {
            return Err(ControlPlaneError::Validation {
                message: format!("action-data field {field} is missing from task zero"),
            });
        }
    }

    Ok(())
}

fn no_self_reference_or_unreachable(plan: &Plan) -> Result<(), ControlPlaneError> {
    for task in &plan.tasks {
        for token in extract_reference_tokens(&task.input) {
            if token.task_id.as_deref() == Some(task.id.as_str()) {
                return Err(ControlPlaneError::Validation {
                    message: format!("task {} references itself", task.id),
                });
            }
        }
    }

    let graph = plan.dependency_graph();
    let mut reachable_from_zero: HashSet<&str> = HashSet::new();
    let mut frontier: Vec<&str> =
        plan.tasks.iter().filter(|t| graph.get(&t.id).map(|d| d.is_empty()).unwrap_or(true)).map(|t| t.id.as_str()).collect();
    while let Some(id) = frontier.pop() {
        if reachable_from_zero.insert(id) {
            for task in &plan.tasks {
                if graph.get(&task.id).map(|deps| deps.iter().any(|d| d == id)).unwrap_or(false) {
                    frontier.push(task.id.as_str());
                }
            }
        }
    }
    if reachable_from_zero.len() != plan.tasks.len() {
        return Err(ControlPlaneError::Validation { message: "plan contains an unreachable task".to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, WorkerKind};
    use std::collections::HashMap;

    fn worker(name: &str) -> Worker {
        Worker::new(name.into(), WorkerKind::Service, format!("{name} worker"), serde_json::json!({}), serde_json::json!({}), false)
    }

    fn plan_with(tasks: Vec<Task>, groups: Vec<Vec<String>>) -> Plan {
        Plan {
            task_zero_input: serde_json::json!({"message": "hi"}),
            tasks,
            parallel_groups: groups,
            aggregator_task_id: None,
            worker_versions: HashMap::new(),
        }
    }

    #[test]
    fn valid_single_task_plan_passes() {
        let task = Task::new("a".into(), "echo".into(), serde_json::json!({"message": "$task-zero.message"}));
        let plan = plan_with(vec![task], vec![vec!["a".into()]]);
        assert!(validate(&plan, &[worker("echo")], &["message".to_string()]).is_ok());
    }

    #[test]
    fn unknown_worker_is_rejected() {
        let task = Task::new("a".into(), "ghost".into(), serde_json::json!({}));
        let plan = plan_with(vec![task], vec![vec!["a".into()]]);
        assert!(validate(&plan, &[worker("echo")], &[]).is_err());
    }

    #[test]
    fn self_reference_is_rejected() {
        let task = Task::new("a".into(), "echo".into(), serde_json::json!({"x": "$a.y"}));
        let plan = plan_with(vec![task], vec![vec!["a".into()]]);
        assert!(validate(&plan, &[worker("echo")], &[]).is_err());
    }

    #[test]
    fn missing_action_field_in_task_zero_is_rejected() {
        let task = Task::new("a".into(), "echo".into(), serde_json::json!({}));
        let plan = plan_with(vec![task], vec![vec!["a".into()]]);
        assert!(validate(&plan, &[worker("echo")], &["missing_field".to_string()]).is_err());
    }

    #[test]
    fn multi_segment_reference_into_a_single_upstream_task_is_allowed() {
        let a = Task::new("a".into(), "echo".into(), serde_json::json!({"message": "$task-zero.message"}));
        let b = Task::new("b".into(), "echo".into(), serde_json::json!({"x": "$a.result.value"}));
        let plan = plan_with(vec![a, b], vec![vec!["a".into()], vec!["b".into()]]);
        assert!(validate(&plan, &[worker("echo")], &["message".to_string()]).is_ok());
    }
}
