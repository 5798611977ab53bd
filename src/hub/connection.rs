//! One bidirectional channel per worker: ping/pong liveness, bounded outbound
//! queue, single writer, fan-out of decoded inbound frames to per-task waiters.

use super::protocol::{Frame, FailureKind, FRAME_SOFT_LIMIT_BYTES};
use crate::domain::{ConnectionState, WorkerId};
use crate::error::ControlPlaneError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Abstracts the underlying socket so tests can substitute an in-memory pair.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: Frame) -> Result<(), ControlPlaneError>;
    async fn recv(&self) -> Result<Option<Frame>, ControlPlaneError>;
}

/// Inbound frames addressed to a single in-flight task.
pub enum TaskEvent {
    Interim(serde_json::Value),
    Result(serde_json::Value),
    Failure { kind: FailureKind, message: String, compensation_context: Option<serde_json::Value> },
}

pub struct WorkerConnection {
    pub worker_id: WorkerId,
    transport: Arc<dyn Transport>,
    outbound: Mutex<mpsc::Sender<Frame>>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    waiters: Arc<DashMap<String, mpsc::Sender<TaskEvent>>>,
    missed_pings: AtomicU32,
    missed_pings_threshold: u32,
}

impl WorkerConnection {
    pub fn new(
        worker_id: WorkerId,
        transport: Arc<dyn Transport>,
        outbound_queue_capacity: usize,
        missed_pings_threshold: u32,
    ) -> Self {
        let (tx, rx) = mpsc::channel(outbound_queue_capacity);
        Self {
            worker_id,
            transport,
            outbound: Mutex::new(tx),
            outbound_rx: Mutex::new(Some(rx)),
            waiters: Arc::new(DashMap::new()),
            missed_pings: AtomicU32::new(0),
            missed_pings_threshold,
        }
    }

    /// Enqueue a frame for the single writer task to flush. On overflow, fails
    /// the caller rather than the queue's existing contents (the oldest
    /// already-queued task fails separately when the writer observes backlog).
    pub async fn enqueue(&self, frame: Frame) -> Result<(), ControlPlaneError> {
        let size = frame.encoded_size().map_err(ControlPlaneError::from)?;
        if size > FRAME_SOFT_LIMIT_BYTES {
            return Err(ControlPlaneError::MessageTooLarge { size, limit: FRAME_SOFT_LIMIT_BYTES });
        }
        let sender = self.outbound.lock().await;
        sender.try_send(frame).map_err(|_| ControlPlaneError::Backpressure {
            worker_id: self.worker_id.to_string(),
        })
    }

    pub fn register_waiter(&self, task_id: String, capacity: usize) -> mpsc::Receiver<TaskEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.waiters.insert(task_id, tx);
        rx
    }

    pub fn unregister_waiter(&self, task_id: &str) {
        self.waiters.remove(task_id);
    }

    /// Single writer loop: drains the outbound queue to the transport. Run as
    /// one tokio task per connection.
    pub async fn run_writer(&self) {
        let mut rx = match self.outbound_rx.lock().await.take() {
            Some(rx) => rx,
            None => return,
        };
        while let Some(frame) = rx.recv().await {
            if let Err(e) = self.transport.send(frame).await {
                tracing::warn!(worker_id = %self.worker_id, error = %e, "failed to write frame");
            }
        }
    }

    /// Single reader loop: decodes inbound frames and routes them onto the
    /// waiter registered for their task id (or handles ping/pong directly).
    pub async fn run_reader(&self) {
        loop {
            match self.transport.recv().await {
                Ok(Some(frame)) => {
                    if let Err(e) = self.reject_if_oversized(&frame) {
                        tracing::warn!(worker_id = %self.worker_id, error = %e, "rejected oversized inbound frame");
                        continue;
                    }
                    match frame {
                        Frame::Pong => {
                            self.missed_pings.store(0, Ordering::SeqCst);
                        }
                        Frame::TaskInterimResult { task_id, payload } => {
                            self.route(&task_id, TaskEvent::Interim(payload)).await;
                        }
                        Frame::TaskResult { task_id, output, .. } => {
                            self.route(&task_id, TaskEvent::Result(output)).await;
                        }
                        Frame::TaskFailure { task_id, kind, message, compensation_context, .. } => {
                            self.route(&task_id, TaskEvent::Failure { kind, message, compensation_context }).await;
                        }
                        _ => {}
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(worker_id = %self.worker_id, error = %e, "transport read error");
                    break;
                }
            }
        }
    }

    /// Mirrors `enqueue`'s outbound soft-limit check for the inbound side.
    fn reject_if_oversized(&self, frame: &Frame) -> Result<(), ControlPlaneError> {
        let size = frame.encoded_size().map_err(ControlPlaneError::from)?;
        if size > FRAME_SOFT_LIMIT_BYTES {
            return Err(ControlPlaneError::MessageTooLarge { size, limit: FRAME_SOFT_LIMIT_BYTES });
        }
        Ok(())
    }

    async fn route(&self, task_id: &str, event: TaskEvent) {
        if let Some(sender) = self.waiters.get(task_id) {
            let _ = sender.send(event).await;
        }
    }

    pub async fn send_ping(&self) -> Result<(), ControlPlaneError> {
        self.missed_pings.fetch_add(1, Ordering::SeqCst);
        self.enqueue(Frame::Ping).await
    }

    /// `true` once two consecutive pings have gone unanswered.
    pub fn is_unreachable(&self) -> bool {
        self.missed_pings.load(Ordering::SeqCst) >= self.missed_pings_threshold
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.is_unreachable() {
            ConnectionState::Unreachable
        } else if self.missed_pings.load(Ordering::SeqCst) > 0 {
            ConnectionState::Degraded
        } else {
            ConnectionState::Connected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as TokioMutex;

    struct InMemoryTransport {
        inbound: TokioMutex<mpsc::Receiver<Frame>>,
        outbound: mpsc::Sender<Frame>,
    }

    #[async_trait]
    impl Transport for InMemoryTransport {
        async fn send(&self, frame: Frame) -> Result<(), ControlPlaneError> {
            self.outbound.send(frame).await.map_err(|_| ControlPlaneError::Internal {
                message: "channel closed".into(),
            })
        }
        async fn recv(&self) -> Result<Option<Frame>, ControlPlaneError> {
            Ok(self.inbound.lock().await.recv().await)
        }
    }

    #[tokio::test]
    async fn enqueue_rejects_oversized_frame() {
        let (_itx, irx) = mpsc::channel(8);
        let (otx, _orx) = mpsc::channel(8);
        let transport = Arc::new(InMemoryTransport { inbound: TokioMutex::new(irx), outbound: otx });
        let conn = WorkerConnection::new(WorkerId::new(), transport, 8, 2);
        let huge_input = serde_json::json!({"data": "x".repeat(20_000)});
        let frame = Frame::TaskRequest {
            orchestration_id: "o".into(),
            task_id: "t".into(),
            idempotency_key: "k".into(),
            input: huge_input,
            deadline: chrono::Utc::now(),
        };
        assert!(conn.enqueue(frame).await.is_err());
    }

    #[tokio::test]
    async fn missed_pings_mark_unreachable_after_threshold() {
        let (_itx, irx) = mpsc::channel(8);
        let (otx, mut orx) = mpsc::channel(8);
        let transport = Arc::new(InMemoryTransport { inbound: TokioMutex::new(irx), outbound: otx });
        let conn = WorkerConnection::new(WorkerId::new(), transport, 8, 2);
        conn.send_ping().await.unwrap();
        assert!(!conn.is_unreachable());
        conn.send_ping().await.unwrap();
        assert!(conn.is_unreachable());
        assert!(orx.recv().await.is_some());
    }

    #[tokio::test]
    async fn run_reader_drops_oversized_inbound_frame_without_routing_it() {
        let (itx, irx) = mpsc::channel(8);
        let (otx, _orx) = mpsc::channel(8);
        let transport = Arc::new(InMemoryTransport { inbound: TokioMutex::new(irx), outbound: otx });
        let conn = Arc::new(WorkerConnection::new(WorkerId::new(), transport, 8, 2));
        let mut rx = conn.register_waiter("t".into(), 8);

        let huge_output = serde_json::json!({"data": "x".repeat(20_000)});
        itx.send(Frame::TaskResult { task_id: "t".into(), idempotency_key: "k".into(), output: huge_output }).await.unwrap();
        drop(itx);
        conn.run_reader().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pong_resets_missed_ping_counter() {
        let (itx, irx) = mpsc::channel(8);
        let (otx, _orx) = mpsc::channel(8);
        let transport = Arc::new(InMemoryTransport { inbound: TokioMutex::new(irx), outbound: otx });
        let conn = Arc::new(WorkerConnection::new(WorkerId::new(), transport, 8, 2));
        conn.send_ping().await.unwrap();
        itx.send(Frame::Pong).await.unwrap();
        drop(itx);
        conn.run_reader().await;
        assert_eq!(conn.connection_state(), ConnectionState::Connected);
    }
}
