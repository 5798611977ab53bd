//! Scheduler throughput under an always-succeeding worker: single task,
//! a short linear chain, and a fan-out/fan-in wave.

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use orchestra_runtime::domain::{Plan, Task, WorkerKind};
use orchestra_runtime::error::ControlPlaneError;
use orchestra_runtime::execution_log::ExecutionLog;
use orchestra_runtime::hub::{ConnectionHub, Frame, Transport};
use orchestra_runtime::idempotency_store::IdempotencyStore;
use orchestra_runtime::registry::WorkerRegistry;
use orchestra_runtime::resilience::BackoffPolicy;
use orchestra_runtime::scheduler::Scheduler;
use orchestra_runtime::store::Store;
use orchestra_runtime::Orchestration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

struct EchoTransport {
    inbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<mpsc::Receiver<Frame>>,
}

#[async_trait]
impl Transport for EchoTransport {
    async fn send(&self, frame: Frame) -> Result<(), ControlPlaneError> {
        if let Frame::TaskRequest { task_id, idempotency_key, input, .. } = frame {
            let _ = self.inbound_tx.send(Frame::TaskResult { task_id, idempotency_key, output: input }).await;
        }
        Ok(())
    }
    async fn recv(&self) -> Result<Option<Frame>, ControlPlaneError> {
        Ok(self.inbound_rx.lock().await.recv().await)
    }
}

/// A fresh scheduler with one registered, always-succeeding "echo" worker.
fn scheduler_with_echo_worker() -> (Arc<Scheduler>, tempfile::TempDir) {
    let (store, dir) = Store::open_temp().expect("temp store");
    let registry = Arc::new(WorkerRegistry::new(store.clone()));
    registry
        .register("echo".into(), WorkerKind::Service, "echoes".into(), serde_json::json!({}), serde_json::json!({}), false)
        .expect("register worker");
    let hub = Arc::new(ConnectionHub::new(64, 2, Duration::from_secs(30)));
    let worker = registry.lookup_by_name("echo").expect("worker present");
    let (tx, rx) = mpsc::channel(64);
    hub.connect(worker.id, Arc::new(EchoTransport { inbound_tx: tx, inbound_rx: Mutex::new(rx) }));

    let scheduler = Arc::new(Scheduler::new(
        registry,
        hub,
        Arc::new(IdempotencyStore::new(store.clone(), 30, 86_400)),
        Arc::new(ExecutionLog::new(store)),
        BackoffPolicy::new(1, 2.0, 10, 0.0),
        3,
        Duration::from_secs(2),
        Duration::from_millis(5),
        Duration::from_millis(50),
    ));
    (scheduler, dir)
}

fn chain_plan(depth: usize) -> Plan {
    let tasks: Vec<Task> = (0..depth)
        .map(|i| {
            let input = if i == 0 {
                serde_json::json!({"x": "$task-zero.seed"})
            } else {
                serde_json::json!({"x": format!("${}.x", format!("t{}", i - 1))})
            };
            Task::new(format!("t{i}"), "echo".into(), input)
        })
        .collect();
    Plan {
        task_zero_input: serde_json::json!({"seed": 1}),
        parallel_groups: tasks.iter().map(|t| vec![t.id.clone()]).collect(),
        tasks,
        aggregator_task_id: None,
        worker_versions: HashMap::new(),
    }
}

fn fan_out_plan(width: usize) -> Plan {
    let tasks: Vec<Task> = (0..width).map(|i| Task::new(format!("t{i}"), "echo".into(), serde_json::json!({"x": i}))).collect();
    let group = tasks.iter().map(|t| t.id.clone()).collect();
    Plan {
        task_zero_input: serde_json::json!({}),
        tasks,
        parallel_groups: vec![group],
        aggregator_task_id: None,
        worker_versions: HashMap::new(),
    }
}

fn bench_chain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("scheduler_chain");
    for depth in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.to_async(&runtime).iter(|| async move {
                let (scheduler, _dir) = scheduler_with_echo_worker();
                let plan = chain_plan(depth);
                let mut orchestration = Orchestration::new(
                    "bench".into(),
                    "chain".into(),
                    vec![],
                    "https://example.com/hook".into(),
                    1800,
                    3600,
                );
                scheduler.run(&mut orchestration, &plan).await.expect("scheduler run");
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("scheduler_fan_out");
    for width in [2usize, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.to_async(&runtime).iter(|| async move {
                let (scheduler, _dir) = scheduler_with_echo_worker();
                let plan = fan_out_plan(width);
                let mut orchestration = Orchestration::new(
                    "bench".into(),
                    "fan_out".into(),
                    vec![],
                    "https://example.com/hook".into(),
                    1800,
                    3600,
                );
                scheduler.run(&mut orchestration, &plan).await.expect("scheduler run");
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain, bench_fan_out);
criterion_main!(benches);
