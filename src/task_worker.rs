//! Task Worker Loop: one per in-flight task. Resolves inputs, acquires the
//! idempotency lease, dispatches through the Connection Hub, classifies
//! worker responses, and retries per the configured backoff policy.

use crate::domain::{LogEntryKind, Task};
use crate::error::ControlPlaneError;
use crate::execution_log::ExecutionLog;
use crate::hub::{ConnectionHub, FailureKind, Frame, TaskEvent};
use crate::idempotency_store::{AcquireOutcome, IdempotencyStore};
use crate::registry::WorkerRegistry;
use crate::resilience::{retry_with_backoff, BackoffPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub struct TaskWorkerContext {
    pub registry: Arc<WorkerRegistry>,
    pub hub: Arc<ConnectionHub>,
    pub idempotency: Arc<IdempotencyStore>,
    pub log: Arc<ExecutionLog>,
    pub backoff: BackoffPolicy,
    pub max_attempts: u32,
    pub task_timeout: Duration,
    pub busy_poll_interval: Duration,
}

/// Outcome of running a task to completion; `Unreachable` tells the Scheduler
/// to pause the orchestration rather than fail it outright.
pub enum TaskOutcome {
    Completed(serde_json::Value),
    Permanent(ControlPlaneError),
    Unreachable,
}

#[tracing::instrument(skip(ctx, task, resolved_input))]
pub async fn execute(
    ctx: &TaskWorkerContext,
    orchestration_id: &str,
    task: &Task,
    resolved_input: serde_json::Value,
) -> TaskOutcome {
    let worker = match ctx.registry.lookup_by_name(&task.worker_name) {
        Some(w) => w,
        None => return TaskOutcome::Permanent(ControlPlaneError::WorkerNotFound(task.worker_name.clone())),
    };

    let idempotency_key = task.idempotency_key(orchestration_id, &resolved_input);

    let owner_token = match wait_for_lease(ctx, &idempotency_key).await {
        Ok(Some(cached)) => return TaskOutcome::Completed(cached),
        Ok(None) => None,
        Err(owner) => Some(owner),
    };
    let Some(owner_token) = owner_token else {
        return TaskOutcome::Permanent(ControlPlaneError::Internal {
            message: "idempotency lease acquisition produced no owner token".to_string(),
        });
    };

    let _ = ctx.log.append(
        orchestration_id,
        LogEntryKind::TaskStateChange { task_id: task.id.clone(), from: "pending".into(), to: "processing".into() },
    );

    let result = retry_with_backoff(&ctx.backoff, ctx.max_attempts, |_attempt| {
        dispatch_once(ctx, worker.id, orchestration_id, task, &idempotency_key, &resolved_input)
    })
    .await;

    match result {
        Ok(output) => {
            let _ = ctx.idempotency.complete(&idempotency_key, owner_token, output.clone());
            let _ = ctx
                .log
                .append(orchestration_id, LogEntryKind::TaskOutput { task_id: task.id.clone(), output: output.clone() });
            TaskOutcome::Completed(output)
        }
        Err(ControlPlaneError::HealthTimeout { .. }) => {
            let _ = ctx.idempotency.abort(&idempotency_key, owner_token);
            TaskOutcome::Unreachable
        }
        Err(e) => {
            let _ = ctx.idempotency.fail(&idempotency_key, owner_token);
            let _ = ctx.log.append(
                orchestration_id,
                LogEntryKind::TaskFailure { task_id: task.id.clone(), error_kind: e.kind().to_string(), message: e.to_string() },
            );
            TaskOutcome::Permanent(e)
        }
    }
}

/// Polls `Acquire` until the lease is ours, a cached result is returned, or
/// the task's own deadline elapses. `Ok(Some(result))` is a cache hit;
/// `Ok(None)` should not occur; `Err(owner_token)` is the acquired lease.
async fn wait_for_lease(
    ctx: &TaskWorkerContext,
    key: &str,
) -> Result<Option<serde_json::Value>, uuid::Uuid> {
    loop {
        match ctx.idempotency.acquire(key) {
            Ok(AcquireOutcome::Acquired { owner_token }) => return Err(owner_token),
            Ok(AcquireOutcome::Cached { result }) => return Ok(Some(result)),
            Ok(AcquireOutcome::Busy) => {
                tokio::time::sleep(ctx.busy_poll_interval).await;
            }
            Err(_) => {
                tokio::time::sleep(ctx.busy_poll_interval).await;
            }
        }
    }
}

async fn dispatch_once(
    ctx: &TaskWorkerContext,
    worker_id: crate::domain::WorkerId,
    orchestration_id: &str,
    task: &Task,
    idempotency_key: &str,
    resolved_input: &serde_json::Value,
) -> Result<serde_json::Value, ControlPlaneError> {
    let deadline = chrono::Utc::now() + chrono::Duration::from_std(ctx.task_timeout).unwrap_or_default();
    let frame = Frame::TaskRequest {
        orchestration_id: orchestration_id.to_string(),
        task_id: task.id.clone(),
        idempotency_key: idempotency_key.to_string(),
        input: resolved_input.clone(),
        deadline,
    };

    if ctx.hub.connection(worker_id).map(|c| c.is_unreachable()).unwrap_or(true) {
        return Err(ControlPlaneError::HealthTimeout { worker_id: worker_id.to_string() });
    }

    let mut rx = ctx.hub.dispatch(worker_id, frame, task.id.clone()).await.map_err(|e| match e {
        ControlPlaneError::WorkerNotFound(_) | ControlPlaneError::Backpressure { .. } => {
            ControlPlaneError::RetryableWorker { task_id: task.id.clone(), message: e.to_string() }
        }
        other => other,
    })?;

    let outcome = timeout(ctx.task_timeout, async {
        loop {
            match rx.recv().await {
                Some(TaskEvent::Interim(payload)) => {
                    let _ = ctx.log.append(
                        orchestration_id,
                        LogEntryKind::TaskInterimResult { task_id: task.id.clone(), payload },
                    );
                }
                Some(TaskEvent::Result(output)) => return Ok(output),
                Some(TaskEvent::Failure { kind, message, .. }) => {
                    return Err(match kind {
                        FailureKind::Retryable => {
                            ControlPlaneError::RetryableWorker { task_id: task.id.clone(), message }
                        }
                        FailureKind::Permanent => {
                            ControlPlaneError::PermanentWorker { task_id: task.id.clone(), message }
                        }
                    });
                }
                None => {
                    return Err(ControlPlaneError::RetryableWorker {
                        task_id: task.id.clone(),
                        message: "connection closed before a result arrived".to_string(),
                    })
                }
            }
        }
    })
    .await;

    match outcome {
        Ok(inner) => inner,
        Err(_) if ctx.hub.connection(worker_id).map(|c| c.is_unreachable()).unwrap_or(true) => {
            Err(ControlPlaneError::HealthTimeout { worker_id: worker_id.to_string() })
        }
        Err(_) => Err(ControlPlaneError::RetryableWorker {
            task_id: task.id.clone(),
            message: format!("task timed out after {:?}", ctx.task_timeout),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkerKind;
    use crate::hub::Transport;
    use crate::store::Store;
    use async_trait::async_trait;
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

    fn context() -> (TaskWorkerContext, tempfile::TempDir) {
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

        let ctx = TaskWorkerContext {
            registry,
            hub,
            idempotency: Arc::new(IdempotencyStore::new(store.clone(), 30, 86_400)),
            log: Arc::new(ExecutionLog::new(store)),
            backoff: BackoffPolicy::new(1, 2.0, 10, 0.0),
            max_attempts: 3,
            task_timeout: Duration::from_secs(2),
            busy_poll_interval: Duration::from_millis(10),
        };
        (ctx, dir)
    }

    #[tokio::test]
    async fn happy_path_task_completes() {
        let (ctx, _dir) = context();
        let task = Task::new("t1".into(), "echo".into(), serde_json::json!({"message": "hi"}));
        let outcome = execute(&ctx, "o1", &task, serde_json::json!({"message": "hi"})).await;
        match outcome {
            TaskOutcome::Completed(output) => assert_eq!(output, serde_json::json!({"message": "hi"})),
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn unknown_worker_fails_permanently() {
        let (ctx, _dir) = context();
        let task = Task::new("t1".into(), "ghost".into(), serde_json::json!({}));
        let outcome = execute(&ctx, "o1", &task, serde_json::json!({})).await;
        assert!(matches!(outcome, TaskOutcome::Permanent(_)));
    }
}
