//! Execution Log: append-only, the sole recovery substrate.

use crate::domain::{LogEntry, LogEntryKind};
use crate::error::ControlPlaneError;
use crate::store::{log_key, log_prefix, Store};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Per-orchestration log writer. Serialized append: one sequence counter,
/// bumped under no lock wider than the atomic itself, since there is exactly
/// one writer per orchestration by construction (§5).
pub struct ExecutionLog {
    store: Store,
    next_sequence: Arc<DashMap<String, AtomicU64>>,
    /// Broadcast of newly appended entries, fanned out to the Aggregator and
    /// any inspector following progress via long-poll.
    subscribers: Arc<DashMap<String, broadcast::Sender<LogEntry>>>,
}

impl ExecutionLog {
    pub fn new(store: Store) -> Self {
        Self { store, next_sequence: Arc::new(DashMap::new()), subscribers: Arc::new(DashMap::new()) }
    }

    #[tracing::instrument(skip(self, kind))]
    pub fn append(
        &self,
        orchestration_id: &str,
        kind: LogEntryKind,
    ) -> Result<LogEntry, ControlPlaneError> {
        let counter = self
            .next_sequence
            .entry(orchestration_id.to_string())
            .or_insert_with(|| AtomicU64::new(self.highest_sequence(orchestration_id).map(|s| s + 1).unwrap_or(0)));
        let sequence = counter.fetch_add(1, Ordering::SeqCst);

        let entry = LogEntry::new(sequence, orchestration_id.to_string(), kind);
        self.store.put(&log_key(orchestration_id, sequence), &entry)?;

        if let Some(sender) = self.subscribers.get(orchestration_id) {
            let _ = sender.send(entry.clone());
        }
        Ok(entry)
    }

    fn highest_sequence(&self, orchestration_id: &str) -> Option<u64> {
        self.entries(orchestration_id).ok()?.last().map(|e| e.sequence)
    }

    /// All entries for an orchestration, in sequence order.
    pub fn entries(&self, orchestration_id: &str) -> Result<Vec<LogEntry>, ControlPlaneError> {
        let mut rows: Vec<(String, LogEntry)> = self.store.scan_prefix(&log_prefix(orchestration_id))?;
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows.into_iter().map(|(_, v)| v).collect())
    }

    pub fn entries_since(
        &self,
        orchestration_id: &str,
        after_sequence: u64,
    ) -> Result<Vec<LogEntry>, ControlPlaneError> {
        Ok(self
            .entries(orchestration_id)?
            .into_iter()
            .filter(|e| e.sequence > after_sequence)
            .collect())
    }

    /// Subscribe to future entries for an orchestration (change-feed for
    /// long-polling inspectors).
    pub fn subscribe(&self, orchestration_id: &str) -> broadcast::Receiver<LogEntry> {
        self.subscribers
            .entry(orchestration_id.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .subscribe()
    }

    /// Fold entries into task outputs keyed by task id, for reference-token
    /// resolution and for reconstructing live state on cold start.
    pub fn fold_task_outputs(
        &self,
        orchestration_id: &str,
    ) -> Result<std::collections::HashMap<String, serde_json::Value>, ControlPlaneError> {
        let mut outputs = std::collections::HashMap::new();
        for entry in self.entries(orchestration_id)? {
            if let LogEntryKind::TaskOutput { task_id, output } = entry.kind {
                outputs.insert(task_id, output);
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> ExecutionLog {
        let (store, dir) = Store::open_temp().unwrap();
        std::mem::forget(dir);
        ExecutionLog::new(store)
    }

    #[test]
    fn sequence_numbers_are_monotonic_and_never_reused() {
        let log = log();
        let e1 = log
            .append("o1", LogEntryKind::TaskStateChange { task_id: "a".into(), from: "pending".into(), to: "processing".into() })
            .unwrap();
        let e2 = log
            .append("o1", LogEntryKind::TaskStateChange { task_id: "a".into(), from: "processing".into(), to: "completed".into() })
            .unwrap();
        assert_eq!(e1.sequence, 0);
        assert_eq!(e2.sequence, 1);
    }

    #[test]
    fn entries_since_filters_by_sequence() {
        let log = log();
        log.append("o1", LogEntryKind::TaskOutput { task_id: "a".into(), output: serde_json::json!(1) }).unwrap();
        log.append("o1", LogEntryKind::TaskOutput { task_id: "b".into(), output: serde_json::json!(2) }).unwrap();
        let since = log.entries_since("o1", 0).unwrap();
        assert_eq!(since.len(), 1);
    }

    #[test]
    fn fold_task_outputs_reconstructs_latest_per_task() {
        let log = log();
        log.append("o1", LogEntryKind::TaskOutput { task_id: "a".into(), output: serde_json::json!(1) }).unwrap();
        log.append("o1", LogEntryKind::TaskOutput { task_id: "a".into(), output: serde_json::json!(2) }).unwrap();
        let outputs = log.fold_task_outputs("o1").unwrap();
        assert_eq!(outputs["a"], serde_json::json!(2));
    }

    #[test]
    fn independent_orchestrations_have_independent_sequences() {
        let log = log();
        let e1 = log.append("o1", LogEntryKind::TaskOutput { task_id: "a".into(), output: serde_json::json!(1) }).unwrap();
        let e2 = log.append("o2", LogEntryKind::TaskOutput { task_id: "a".into(), output: serde_json::json!(1) }).unwrap();
        assert_eq!(e1.sequence, 0);
        assert_eq!(e2.sequence, 0);
    }
}
