//! Core domain types: Worker, Orchestration, Plan/Task, Log, Idempotency.

pub mod idempotency;
pub mod log;
pub mod orchestration;
pub mod plan;
pub mod worker;

pub use idempotency::{CompensationCandidate, IdempotencyRecord, IdempotencyStatus};
pub use log::{LogEntry, LogEntryKind};
pub use orchestration::{ActionDataField, Orchestration, OrchestrationId, OrchestrationStatus};
pub use plan::{Plan, ReferenceToken, Task, TaskState, TASK_ZERO};
pub use worker::{ConnectionState, Worker, WorkerId, WorkerKind};
