// sink.rs — The task store collaborator contract.
//
// Whatever owns task event logs implements TaskEventSink. The audit trail
// only appends through it and never reads back for decision-making.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::AuditError;
use crate::event::TaskEvent;

/// Accepts events for a task's log.
///
/// Implementations must tolerate concurrent callers: two appends to the same
/// task must both land, whole, in some order.
pub trait TaskEventSink: Send + Sync {
    /// Append `event` to the log of `task_id`. A chaining sink fills in
    /// `event.previous_hash` before storing it.
    fn append_task_event(&self, task_id: &str, event: &mut TaskEvent) -> Result<(), AuditError>;
}

/// In-memory sink, for embedding hosts that persist events themselves and
/// for tests.
#[derive(Debug, Default)]
pub struct MemoryTaskEvents {
    events: Mutex<HashMap<String, Vec<TaskEvent>>>,
}

impl MemoryTaskEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event appended for `task_id`, oldest first.
    pub fn events(&self, task_id: &str) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.get(task_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl TaskEventSink for MemoryTaskEvents {
    fn append_task_event(&self, task_id: &str, event: &mut TaskEvent) -> Result<(), AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| AuditError::SinkUnavailable(format!("event lock poisoned: {}", e)))?;
        events
            .entry(task_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }
}
