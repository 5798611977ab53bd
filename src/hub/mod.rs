//! Connection Hub: owns every worker's bidirectional channel.

pub mod connection;
pub mod protocol;

pub use connection::{TaskEvent, Transport, WorkerConnection};
pub use protocol::{FailureKind, Frame, FRAME_SOFT_LIMIT_BYTES};

use crate::domain::WorkerId;
use crate::error::ControlPlaneError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct ConnectionHub {
    connections: Arc<DashMap<WorkerId, Arc<WorkerConnection>>>,
    outbound_queue_capacity: usize,
    missed_pings_threshold: u32,
    ping_interval: Duration,
}

impl ConnectionHub {
    pub fn new(outbound_queue_capacity: usize, missed_pings_threshold: u32, ping_interval: Duration) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            outbound_queue_capacity,
            missed_pings_threshold,
            ping_interval,
        }
    }

    /// Register a worker's transport and spawn its reader/writer/heartbeat
    /// tasks. Replaces any prior connection for the same worker (reconnect).
    pub fn connect(&self, worker_id: WorkerId, transport: Arc<dyn Transport>) -> Arc<WorkerConnection> {
        let conn = Arc::new(WorkerConnection::new(
            worker_id,
            transport,
            self.outbound_queue_capacity,
            self.missed_pings_threshold,
        ));
        self.connections.insert(worker_id, conn.clone());

        let writer_conn = conn.clone();
        tokio::spawn(async move { writer_conn.run_writer().await });

        let reader_conn = conn.clone();
        tokio::spawn(async move { reader_conn.run_reader().await });

        let ping_conn = conn.clone();
        let interval = self.ping_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if ping_conn.send_ping().await.is_err() {
                    break;
                }
            }
        });

        conn
    }

    pub fn connection(&self, worker_id: WorkerId) -> Option<Arc<WorkerConnection>> {
        self.connections.get(&worker_id).map(|c| c.clone())
    }

    pub fn disconnect(&self, worker_id: WorkerId) {
        self.connections.remove(&worker_id);
    }

    /// Dispatch a task request and return a receiver of its lifecycle events
    /// (interim results, then exactly one terminal result or failure).
    pub async fn dispatch(
        &self,
        worker_id: WorkerId,
        frame: Frame,
        task_id: String,
    ) -> Result<mpsc::Receiver<TaskEvent>, ControlPlaneError> {
        let conn = self
            .connection(worker_id)
            .ok_or_else(|| ControlPlaneError::WorkerNotFound(worker_id.to_string()))?;
        let rx = conn.register_waiter(task_id.clone(), 16);
        if let Err(e) = conn.enqueue(frame).await {
            conn.unregister_waiter(&task_id);
            return Err(e);
        }
        Ok(rx)
    }

    pub async fn abort(&self, worker_id: WorkerId, task_id: String, reason: String) -> Result<(), ControlPlaneError> {
        let conn = self
            .connection(worker_id)
            .ok_or_else(|| ControlPlaneError::WorkerNotFound(worker_id.to_string()))?;
        conn.enqueue(Frame::Abort { task_id, reason }).await
    }
}
