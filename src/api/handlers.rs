//! HTTP handlers for the client surface (§6).

use super::models::*;
use super::AppState;
use crate::aggregator;
use crate::domain::{LogEntryKind, Orchestration, OrchestrationStatus};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Duration;

impl IntoResponse for crate::error::ControlPlaneError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            "validation" | "not_actionable" => StatusCode::BAD_REQUEST,
            "internal" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::CONFLICT,
        };
        (status, Json(ErrorResponse { kind: self.kind().to_string(), message: self.to_string() })).into_response()
    }
}

pub async fn create_orchestration(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrchestrationRequest>,
) -> Result<Json<OrchestrationSummary>, crate::error::ControlPlaneError> {
    let grace_period = req.health_check_grace_period.unwrap_or(state.config.raw.orchestration.health_check_grace_period_secs);
    let timeout = req.timeout.unwrap_or(state.config.raw.orchestration.overall_timeout_secs);
    let action = req.action.clone();
    let webhook = req.webhook.clone();
    let action_data = req.into_action_data();

    let orchestration = Orchestration::new(String::new(), action, action_data, webhook, grace_period, timeout);
    let id = orchestration.id.to_string();
    let summary = OrchestrationSummary { id: id.clone(), status: orchestration.status };
    state.store_orchestration(orchestration.clone());

    let state = state.clone();
    tokio::spawn(async move {
        state.run_pipeline(orchestration).await;
    });

    Ok(Json(summary))
}

pub async fn list_orchestrations(State(state): State<Arc<AppState>>) -> Json<Vec<OrchestrationSummary>> {
    Json(
        state
            .orchestrations
            .iter()
            .map(|e| OrchestrationSummary { id: e.key().clone(), status: e.value().status })
            .collect(),
    )
}

pub async fn get_orchestration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrchestrationDetail>, crate::error::ControlPlaneError> {
    let orchestration = state
        .orchestrations
        .get(&id)
        .map(|e| e.value().clone())
        .ok_or_else(|| crate::error::ControlPlaneError::OrchestrationNotFound(id.clone()))?;
    let log = state.log.entries(&id).unwrap_or_default();
    Ok(Json(OrchestrationDetail {
        id: orchestration.id.to_string(),
        status: orchestration.status,
        action: orchestration.action,
        created_at: orchestration.created_at,
        updated_at: orchestration.updated_at,
        failure_kind: orchestration.failure_kind,
        failure_message: orchestration.failure_message,
        log,
    }))
}

pub async fn register_worker(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterWorkerRequest>,
) -> Result<Json<RegisterWorkerResponse>, crate::error::ControlPlaneError> {
    let (id, version, schema_changed) = state.registry.register(
        req.name.clone(),
        req.kind,
        req.description,
        req.input_schema,
        req.output_schema,
        req.revertible,
    )?;
    if schema_changed {
        state.plan_cache.invalidate_worker(&req.name, version);
    }
    Ok(Json(RegisterWorkerResponse { id: id.to_string(), version }))
}

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", registered_workers: state.registry.len() })
}

pub async fn list_compensation_failures(State(state): State<Arc<AppState>>) -> Json<Vec<CompensationFailure>> {
    Json(state.compensation_failures.iter().map(|e| e.value().clone()).collect())
}

pub async fn inspect_compensation_failure(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CompensationFailure>, crate::error::ControlPlaneError> {
    state
        .compensation_failures
        .get(&key)
        .map(|e| Json(e.value().clone()))
        .ok_or_else(|| crate::error::ControlPlaneError::OrchestrationNotFound(key))
}

pub async fn resolve_compensation_failure(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> StatusCode {
    if let Some(mut entry) = state.compensation_failures.get_mut(&key) {
        entry.resolved = true;
        let _ = state.log.append(
            &entry.orchestration_id.clone(),
            LogEntryKind::CompensationOutcome {
                task_id: entry.task_id.clone(),
                succeeded: true,
                message: Some("resolved by operator".to_string()),
            },
        );
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn ignore_compensation_failure(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> StatusCode {
    if state.compensation_failures.remove(&key).is_some() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

impl AppState {
    pub fn store_orchestration(&self, orchestration: Orchestration) {
        let id = orchestration.id.to_string();
        let _ = self.store.put(&crate::store::orchestration_key(&id), &orchestration);
        self.orchestrations.insert(id, orchestration);
    }

    fn update_orchestration(&self, orchestration: &Orchestration) {
        let id = orchestration.id.to_string();
        let _ = self.store.put(&crate::store::orchestration_key(&id), orchestration);
        self.orchestrations.insert(id, orchestration.clone());
    }

    /// Plan (cache hit or Reasoner), schedule, aggregate, and deliver — the
    /// whole lifecycle of one submitted action, run off the request path.
    pub async fn run_pipeline(&self, mut orchestration: Orchestration) {
        let orchestration_id = orchestration.id.to_string();
        let action_fields: Vec<String> = orchestration.action_data.iter().map(|f| f.field.clone()).collect();
        let workers = self.registry.all();
        let worker_versions: std::collections::HashMap<String, u32> =
            workers.iter().map(|w| (w.name.clone(), w.version)).collect();

        let plan = match self.plan_cache.lookup(&orchestration.action, &action_fields, &worker_versions).await {
            Ok(Some(plan)) => plan,
            _ => match self.planner.plan(&orchestration.action, &action_fields, &workers).await {
                Ok(plan) => {
                    let _ = self.plan_cache.insert(&orchestration.action, action_fields.clone(), plan.clone()).await;
                    plan
                }
                Err(e) => {
                    let _ = orchestration.mark_not_actionable(e.to_string());
                    self.update_orchestration(&orchestration);
                    return;
                }
            },
        };

        let mut bound_plan = plan;
        bound_plan.task_zero_input = serde_json::to_value(
            orchestration.action_data.iter().map(|f| (f.field.clone(), f.value.clone())).collect::<serde_json::Map<_, _>>(),
        )
        .unwrap_or_default();

        let result = match tokio::time::timeout(
            Duration::from_secs(orchestration.overall_timeout_secs),
            self.scheduler.run(&mut orchestration, &bound_plan),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.abort_in_flight_tasks(&bound_plan, "orchestration exceeded its overall timeout").await;
                let err = crate::error::ControlPlaneError::OrchestrationTimeout { orchestration_id: orchestration_id.clone() };
                let _ = orchestration.fail(err.kind().to_string(), err.to_string());
                let _ = self.log.append(
                    &orchestration_id,
                    LogEntryKind::OrchestrationStatusChange { from: "processing".into(), to: "failed".into() },
                );
                Err(err)
            }
        };
        self.update_orchestration(&orchestration);

        if result.is_err() {
            self.collect_compensation_failures(&orchestration_id);
        }

        if orchestration.status == OrchestrationStatus::NotActionable {
            return;
        }

        let envelope = aggregator::assemble(&orchestration, result.ok());
        if let Err(e) = self.webhook.deliver(&orchestration.webhook_url, &envelope).await {
            tracing::warn!(orchestration_id = %orchestration_id, error = %e, "webhook delivery did not complete");
        }
    }

    /// Best-effort: ask every worker targeted by `plan` to abort whatever
    /// task of this orchestration it may still be holding. We don't track
    /// which tasks are in flight at the point the overall timeout fires, so
    /// this over-notifies rather than risk leaving a stuck task un-aborted;
    /// workers treat an abort for an unknown or already-finished task id as
    /// a no-op.
    async fn abort_in_flight_tasks(&self, plan: &crate::domain::Plan, reason: &str) {
        for task in &plan.tasks {
            if let Some(worker) = self.registry.lookup_by_name(&task.worker_name) {
                let _ = self.hub.abort(worker.id, task.id.clone(), reason.to_string()).await;
            }
        }
    }

    fn collect_compensation_failures(&self, orchestration_id: &str) {
        let Ok(entries) = self.log.entries(orchestration_id) else { return };
        for entry in entries {
            if let LogEntryKind::CompensationOutcome { task_id, succeeded: false, message } = entry.kind {
                let key = format!("{orchestration_id}:{task_id}");
                self.compensation_failures.insert(
                    key,
                    CompensationFailure {
                        orchestration_id: orchestration_id.to_string(),
                        task_id,
                        message: message.unwrap_or_default(),
                        recorded_at: entry.timestamp,
                        resolved: false,
                    },
                );
            }
        }
    }
}
