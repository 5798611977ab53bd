//! Shared harness for end-to-end scenarios: a full in-process control plane
//! (tempdir-backed store, real Scheduler/Planner/Hub/IdempotencyStore/Log)
//! plus a scripted in-memory `Transport` standing in for a real worker.

use async_trait::async_trait;
use orchestra_runtime::domain::{Worker, WorkerId, WorkerKind};
use orchestra_runtime::error::ControlPlaneError;
use orchestra_runtime::execution_log::ExecutionLog;
use orchestra_runtime::hub::{ConnectionHub, FailureKind, Frame, Transport};
use orchestra_runtime::idempotency_store::IdempotencyStore;
use orchestra_runtime::plan_cache::Embedder;
use orchestra_runtime::planner::{Planner, Reasoner};
use orchestra_runtime::registry::WorkerRegistry;
use orchestra_runtime::resilience::BackoffPolicy;
use orchestra_runtime::scheduler::Scheduler;
use orchestra_runtime::store::Store;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// How a `ScriptedTransport` should answer each `TaskRequest` it receives.
pub enum Scripted {
    Succeed,
    Fail(FailureKind, String),
    /// Drop the request on the floor, simulating an unresponsive worker.
    Silent,
}

/// A worker double whose response to every request is decided by a closure,
/// so scenarios can vary behavior call-by-call (e.g. fail then recover).
pub struct ScriptedTransport {
    inbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<mpsc::Receiver<Frame>>,
    script: Box<dyn Fn(usize) -> Scripted + Send + Sync>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: impl Fn(usize) -> Scripted + Send + Sync + 'static) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(32);
        Arc::new(Self { inbound_tx: tx, inbound_rx: Mutex::new(rx), script: Box::new(script), calls: AtomicUsize::new(0) })
    }

    pub fn always(outcome: impl Fn() -> Scripted + Send + Sync + 'static) -> Arc<Self> {
        Self::new(move |_| outcome())
    }

    /// Push a frame directly onto the inbound side, as if the worker sent it
    /// unprompted (used to simulate a recovering connection's Pong).
    pub async fn inject(&self, frame: Frame) {
        let _ = self.inbound_tx.send(frame).await;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, frame: Frame) -> Result<(), ControlPlaneError> {
        if let Frame::TaskRequest { task_id, idempotency_key, input, .. } = frame {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match (self.script)(call) {
                Scripted::Succeed => {
                    let _ = self.inbound_tx.send(Frame::TaskResult { task_id, idempotency_key, output: input }).await;
                }
                Scripted::Fail(kind, message) => {
                    let _ = self
                        .inbound_tx
                        .send(Frame::TaskFailure { task_id, idempotency_key, kind, message, compensation_context: None })
                        .await;
                }
                Scripted::Silent => {}
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Frame>, ControlPlaneError> {
        Ok(self.inbound_rx.lock().await.recv().await)
    }
}

pub struct NeverPlansReasoner;

#[async_trait]
impl Reasoner for NeverPlansReasoner {
    async fn propose_plan(
        &self,
        _action: &str,
        _action_fields: &[String],
        workers: &[Worker],
        _feedback: Option<&str>,
    ) -> Result<orchestra_runtime::domain::Plan, ControlPlaneError> {
        // References a worker name nothing in the registry provides, so
        // validation fails on every attempt regardless of retries.
        let task = orchestra_runtime::domain::Task::new("a".into(), "nonexistent-worker".into(), serde_json::json!({}));
        Ok(orchestra_runtime::domain::Plan {
            task_zero_input: serde_json::json!({}),
            tasks: vec![task],
            parallel_groups: vec![vec!["a".into()]],
            aggregator_task_id: None,
            worker_versions: workers.iter().map(|w| (w.name.clone(), w.version)).collect(),
        })
    }
}

pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ControlPlaneError> {
        Ok(vec![1.0, 0.0])
    }
}

pub struct Harness {
    pub registry: Arc<WorkerRegistry>,
    pub hub: Arc<ConnectionHub>,
    pub idempotency: Arc<IdempotencyStore>,
    pub log: Arc<ExecutionLog>,
    pub scheduler: Arc<Scheduler>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let (store, dir) = Store::open_temp().expect("temp store");
        let registry = Arc::new(WorkerRegistry::new(store.clone()));
        let hub = Arc::new(ConnectionHub::new(32, 2, Duration::from_secs(30)));
        let idempotency = Arc::new(IdempotencyStore::new(store.clone(), 30, 86_400));
        let log = Arc::new(ExecutionLog::new(store));
        let scheduler = Arc::new(Scheduler::new(
            registry.clone(),
            hub.clone(),
            idempotency.clone(),
            log.clone(),
            BackoffPolicy::new(1, 2.0, 10, 0.0),
            3,
            Duration::from_millis(500),
            Duration::from_millis(10),
            Duration::from_millis(50),
        ));
        Self { registry, hub, idempotency, log, scheduler, _dir: dir }
    }

    /// Register a worker and connect it to a scripted transport; returns the id.
    pub fn register_worker(&self, name: &str, transport: Arc<ScriptedTransport>) -> WorkerId {
        let (id, _version, _changed) = self
            .registry
            .register(
                name.to_string(),
                WorkerKind::Service,
                format!("handles {name}"),
                serde_json::json!({"type": "object"}),
                serde_json::json!({"type": "object"}),
                true,
            )
            .expect("register worker");
        self.hub.connect(id, transport);
        id
    }

    pub fn planner(reasoner: Arc<dyn Reasoner>) -> Arc<Planner> {
        Arc::new(Planner::new(reasoner, 3))
    }
}
