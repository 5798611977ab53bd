//! Scheduler: drives a validated Plan from `pending` to a terminal state.
//!
//! Each parallel group is one dispatch wave: every task in the wave is
//! spawned concurrently, the wave completes when every task reaches a
//! terminal outcome, and a permanent failure aborts the wave's remaining
//! siblings before compensation runs over previously-succeeded tasks.

use crate::domain::plan::resolve_input;
use crate::domain::{LogEntryKind, Orchestration, Plan, Task, TaskState};
use crate::error::ControlPlaneError;
use crate::execution_log::ExecutionLog;
use crate::hub::{ConnectionHub, Frame};
use crate::idempotency_store::IdempotencyStore;
use crate::registry::WorkerRegistry;
use crate::resilience::BackoffPolicy;
use crate::task_worker::{self, TaskOutcome, TaskWorkerContext};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct Scheduler {
    registry: Arc<WorkerRegistry>,
    hub: Arc<ConnectionHub>,
    idempotency: Arc<IdempotencyStore>,
    log: Arc<ExecutionLog>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    task_timeout: Duration,
    busy_poll_interval: Duration,
    pause_poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        registry: Arc<WorkerRegistry>,
        hub: Arc<ConnectionHub>,
        idempotency: Arc<IdempotencyStore>,
        log: Arc<ExecutionLog>,
        backoff: BackoffPolicy,
        max_attempts: u32,
        task_timeout: Duration,
        busy_poll_interval: Duration,
        pause_poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            hub,
            idempotency,
            log,
            backoff,
            max_attempts,
            task_timeout,
            busy_poll_interval,
            pause_poll_interval,
        }
    }

    fn task_ctx(&self) -> TaskWorkerContext {
        TaskWorkerContext {
            registry: self.registry.clone(),
            hub: self.hub.clone(),
            idempotency: self.idempotency.clone(),
            log: self.log.clone(),
            backoff: self.backoff,
            max_attempts: self.max_attempts,
            task_timeout: self.task_timeout,
            busy_poll_interval: self.busy_poll_interval,
        }
    }

    /// Drive `plan` to completion for `orchestration`, mutating its status in
    /// place, and return the aggregator's output on success.
    #[tracing::instrument(skip(self, orchestration, plan))]
    pub async fn run(
        &self,
        orchestration: &mut Orchestration,
        plan: &Plan,
    ) -> Result<serde_json::Value, ControlPlaneError> {
        let orchestration_id = orchestration.id.to_string();
        orchestration.start_processing()?;
        self.log.append(
            &orchestration_id,
            LogEntryKind::OrchestrationStatusChange { from: "registered".into(), to: "processing".into() },
        )?;

        let mut resolved_outputs: HashMap<String, serde_json::Value> = HashMap::new();
        let mut completed: Vec<Task> = Vec::new();

        for group in &plan.parallel_groups {
            match self.run_wave(orchestration, plan, group, &resolved_outputs).await {
                Ok(wave_outputs) => {
                    for (task_id, output) in wave_outputs {
                        if let Some(task) = plan.task(&task_id) {
                            let mut snapshot = task.clone();
                            snapshot.state = TaskState::Completed;
                            snapshot.output = Some(output.clone());
                            completed.push(snapshot);
                        }
                        resolved_outputs.insert(task_id, output);
                    }
                }
                Err(e) => {
                    self.compensate(orchestration, plan, &completed).await;
                    orchestration.fail(e.kind().to_string(), e.to_string())?;
                    self.log.append(
                        &orchestration_id,
                        LogEntryKind::OrchestrationStatusChange { from: "processing".into(), to: "failed".into() },
                    )?;
                    return Err(e);
                }
            }
        }

        let final_task_id = plan
            .final_task_id()
            .ok_or_else(|| ControlPlaneError::Internal { message: "plan has no tasks".to_string() })?;
        let output = resolved_outputs.get(final_task_id).cloned().ok_or_else(|| {
            ControlPlaneError::Internal { message: format!("final task {final_task_id} produced no output") }
        })?;

        orchestration.complete()?;
        self.log.append(
            &orchestration_id,
            LogEntryKind::OrchestrationStatusChange { from: "processing".into(), to: "completed".into() },
        )?;
        Ok(output)
    }

    /// Run one parallel group to completion. On the first permanent failure,
    /// abort the remaining in-flight siblings (tokio-cancel their task-worker
    /// future, and ask the Hub to notify whichever worker holds them) and
    /// surface the failure.
    async fn run_wave(
        &self,
        orchestration: &mut Orchestration,
        plan: &Plan,
        group: &[String],
        resolved_outputs: &HashMap<String, serde_json::Value>,
    ) -> Result<Vec<(String, serde_json::Value)>, ControlPlaneError> {
        let orchestration_id = orchestration.id.to_string();
        let mut abort_handles: HashMap<String, tokio::task::AbortHandle> = HashMap::new();
        let mut pending = FuturesUnordered::new();

        for task_id in group {
            let Some(task) = plan.task(task_id) else { continue };
            let resolved_input = resolve_input(&task.input, &plan.task_zero_input, resolved_outputs)?;
            let ctx = self.task_ctx();
            let task = task.clone();
            let oid = orchestration_id.clone();
            let handle = tokio::spawn(async move { task_worker::execute(&ctx, &oid, &task, resolved_input).await });
            abort_handles.insert(task_id.clone(), handle.abort_handle());
            let id = task_id.clone();
            pending.push(handle.map(move |r| (id.clone(), r)));
        }

        let mut outputs = Vec::new();
        let mut failure: Option<ControlPlaneError> = None;

        while let Some((task_id, joined)) = pending.next().await {
            abort_handles.remove(&task_id);
            match joined {
                Ok(TaskOutcome::Completed(output)) => outputs.push((task_id, output)),
                Ok(TaskOutcome::Unreachable) => {
                    match self.handle_pause(orchestration, plan, &task_id, resolved_outputs).await {
                        Ok(output) => outputs.push((task_id, output)),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                Ok(TaskOutcome::Permanent(e)) => {
                    failure = Some(e);
                    break;
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    failure =
                        Some(ControlPlaneError::Internal { message: format!("task {task_id} panicked: {join_err}") });
                    break;
                }
            }
        }

        if let Some(e) = failure {
            for (task_id, handle) in abort_handles.drain() {
                handle.abort();
                if let Some(task) = plan.task(&task_id) {
                    if let Some(worker) = self.registry.lookup_by_name(&task.worker_name) {
                        let _ = self
                            .hub
                            .abort(worker.id, task_id, "sibling task failed permanently".to_string())
                            .await;
                    }
                }
            }
            return Err(e);
        }

        Ok(outputs)
    }

    /// A worker went unreachable mid-task. Pause the orchestration, poll for
    /// recovery within the grace period, then resume and retry the same
    /// task (same idempotency key, so the worker is expected to dedup).
    async fn handle_pause(
        &self,
        orchestration: &mut Orchestration,
        plan: &Plan,
        task_id: &str,
        resolved_outputs: &HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ControlPlaneError> {
        let task = plan
            .task(task_id)
            .ok_or_else(|| ControlPlaneError::Internal { message: format!("unknown task {task_id}") })?;
        let orchestration_id = orchestration.id.to_string();
        let worker = self.registry.lookup_by_name(&task.worker_name);

        loop {
            orchestration.pause()?;
            self.log.append(
                &orchestration_id,
                LogEntryKind::OrchestrationStatusChange { from: "processing".into(), to: "paused".into() },
            )?;

            loop {
                if orchestration.grace_period_expired() {
                    return Err(ControlPlaneError::HealthTimeout { worker_id: task.worker_name.clone() });
                }
                let reachable = worker
                    .as_ref()
                    .and_then(|w| self.hub.connection(w.id))
                    .map(|c| !c.is_unreachable())
                    .unwrap_or(false);
                if reachable {
                    break;
                }
                tokio::time::sleep(self.pause_poll_interval).await;
            }

            orchestration.resume()?;
            self.log.append(
                &orchestration_id,
                LogEntryKind::OrchestrationStatusChange { from: "paused".into(), to: "processing".into() },
            )?;

            let resolved_input = resolve_input(&task.input, &plan.task_zero_input, resolved_outputs)?;
            let ctx = self.task_ctx();
            match task_worker::execute(&ctx, &orchestration_id, task, resolved_input).await {
                TaskOutcome::Completed(output) => return Ok(output),
                TaskOutcome::Permanent(e) => return Err(e),
                TaskOutcome::Unreachable => continue,
            }
        }
    }

    /// Walk succeeded revertible tasks in reverse topological order, asking
    /// each owning worker to undo its effect. A compensation failure is
    /// recorded and does not itself trigger further compensation.
    async fn compensate(&self, orchestration: &Orchestration, plan: &Plan, completed: &[Task]) {
        let orchestration_id = orchestration.id.to_string();
        let mut view = plan.clone();
        for task in completed {
            if let Some(t) = view.task_mut(&task.id) {
                t.state = task.state;
                t.output = task.output.clone();
            }
        }

        for task in view.reverse_topological_revertible() {
            let _ = self
                .log
                .append(&orchestration_id, LogEntryKind::CompensationRequest { task_id: task.id.clone() });

            let Some(worker) = self.registry.lookup_by_name(&task.worker_name) else {
                let _ = self.log.append(
                    &orchestration_id,
                    LogEntryKind::CompensationOutcome {
                        task_id: task.id.clone(),
                        succeeded: false,
                        message: Some("worker no longer registered".to_string()),
                    },
                );
                continue;
            };

            let outcome = self.dispatch_compensation(&orchestration_id, worker.id, task).await;
            let entry = match outcome {
                Ok(()) => LogEntryKind::CompensationOutcome { task_id: task.id.clone(), succeeded: true, message: None },
                Err(e) => LogEntryKind::CompensationOutcome {
                    task_id: task.id.clone(),
                    succeeded: false,
                    message: Some(e.to_string()),
                },
            };
            let _ = self.log.append(&orchestration_id, entry);
        }
    }

    async fn dispatch_compensation(
        &self,
        orchestration_id: &str,
        worker_id: crate::domain::WorkerId,
        task: &Task,
    ) -> Result<(), ControlPlaneError> {
        let compensation_input = serde_json::json!({
            "_compensate_for": task.id,
            "original_output": task.output,
        });
        let frame = Frame::TaskRequest {
            orchestration_id: orchestration_id.to_string(),
            task_id: format!("{}-compensation", task.id),
            idempotency_key: format!("compensate:{}:{}", orchestration_id, task.id),
            input: compensation_input,
            deadline: chrono::Utc::now() + chrono::Duration::from_std(self.task_timeout).unwrap_or_default(),
        };
        let task_id_for_waiter = format!("{}-compensation", task.id);
        let mut rx = self.hub.dispatch(worker_id, frame, task_id_for_waiter).await?;
        let outcome = tokio::time::timeout(self.task_timeout, rx.recv()).await;
        match outcome {
            Ok(Some(crate::hub::TaskEvent::Result(_))) => Ok(()),
            Ok(Some(crate::hub::TaskEvent::Failure { message, .. })) => {
                Err(ControlPlaneError::CompensationFailed { task_id: task.id.clone(), message })
            }
            Ok(Some(crate::hub::TaskEvent::Interim(_))) | Ok(None) => Err(ControlPlaneError::CompensationFailed {
                task_id: task.id.clone(),
                message: "worker closed the connection before compensating".to_string(),
            }),
            Err(_) => Err(ControlPlaneError::CompensationFailed {
                task_id: task.id.clone(),
                message: "compensation timed out".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionDataField, WorkerKind};
    use crate::hub::Transport;
    use crate::store::Store;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;
    use tokio::sync::{mpsc, Mutex};

    struct EchoTransport {
        inbound_tx: mpsc::Sender<Frame>,
        inbound_rx: Mutex<mpsc::Receiver<Frame>>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, frame: Frame) -> Result<(), ControlPlaneError> {
            if let Frame::TaskRequest { task_id, idempotency_key, input, .. } = frame {
                let _ = self
                    .inbound_tx
                    .send(Frame::TaskResult { task_id, idempotency_key, output: input })
                    .await;
            }
            Ok(())
        }
        async fn recv(&self) -> Result<Option<Frame>, ControlPlaneError> {
            Ok(self.inbound_rx.lock().await.recv().await)
        }
    }

    fn scheduler_with_echo_worker() -> (Scheduler, tempfile::TempDir) {
        let (store, dir) = Store::open_temp().unwrap();
        let registry = Arc::new(WorkerRegistry::new(store.clone()));
        registry
            .register("echo".into(), WorkerKind::Service, "echoes".into(), serde_json::json!({}), serde_json::json!({}), false)
            .unwrap();
        let hub = Arc::new(ConnectionHub::new(16, 2, Duration::from_secs(30)));
        let worker = registry.lookup_by_name("echo").unwrap();
        let (itx, irx) = mpsc::channel(16);
        let transport = Arc::new(EchoTransport { inbound_tx: itx, inbound_rx: Mutex::new(irx) });
        hub.connect(worker.id, transport);

        let scheduler = Scheduler::new(
            registry,
            hub,
            Arc::new(IdempotencyStore::new(store.clone(), 30, 86_400)),
            Arc::new(ExecutionLog::new(store)),
            BackoffPolicy::new(1, 2.0, 10, 0.0),
            3,
            Duration::from_secs(2),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        (scheduler, dir)
    }

    #[tokio::test]
    async fn single_task_plan_completes() {
        let (scheduler, _dir) = scheduler_with_echo_worker();
        let mut orchestration = Orchestration::new(
            "proj".into(),
            "echo this".into(),
            vec![ActionDataField { field: "message".into(), value: serde_json::json!("hi") }],
            "https://example.com/hook".into(),
            1800,
            3600,
        );
        let task = Task::new("a".into(), "echo".into(), serde_json::json!({"message": "$task-zero.message"}));
        let plan = Plan {
            task_zero_input: serde_json::json!({"message": "hi"}),
            tasks: vec![task],
            parallel_groups: vec![vec!["a".into()]],
            aggregator_task_id: None,
            worker_versions: Map::from([("echo".to_string(), 1)]),
        };

        let output = scheduler.run(&mut orchestration, &plan).await.unwrap();
        assert_eq!(output, serde_json::json!({"message": "hi"}));
        assert_eq!(orchestration.status, crate::domain::OrchestrationStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_worker_fails_orchestration() {
        let (scheduler, _dir) = scheduler_with_echo_worker();
        let mut orchestration = Orchestration::new(
            "proj".into(),
            "do something".into(),
            vec![],
            "https://example.com/hook".into(),
            1800,
            3600,
        );
        let task = Task::new("a".into(), "ghost".into(), serde_json::json!({}));
        let plan = Plan {
            task_zero_input: serde_json::json!({}),
            tasks: vec![task],
            parallel_groups: vec![vec!["a".into()]],
            aggregator_task_id: None,
            worker_versions: Map::new(),
        };

        let result = scheduler.run(&mut orchestration, &plan).await;
        assert!(result.is_err());
        assert_eq!(orchestration.status, crate::domain::OrchestrationStatus::Failed);
    }
}
