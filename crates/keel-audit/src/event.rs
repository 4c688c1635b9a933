// event.rs — Task event envelope.
//
// The task store keeps an ordered event log per task. This crate only ever
// appends `audit` events to it. Events in a file-backed log form a chain:
// each event carries `previous_hash`, the hash of the prior line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::AuditRecord;

/// The typed body of a task event. Serialized with a `type` tag so the task
/// store can dispatch on `event.type == "audit"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEventPayload {
    Audit { entry: AuditRecord },
}

/// One line in a task's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub event_id: Uuid,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: TaskEventPayload,
    /// Hash of the previous line in the same task log. `None` for the first
    /// event, and for sinks that do not chain.
    #[serde(default)]
    pub previous_hash: Option<String>,
}

impl TaskEvent {
    /// Wrap an audit record in a fresh event for `task_id`.
    pub fn audit(task_id: impl Into<String>, entry: AuditRecord) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            task_id: task_id.into(),
            timestamp: Utc::now(),
            event: TaskEventPayload::Audit { entry },
            previous_hash: None,
        }
    }

    pub fn event_type(&self) -> &str {
        match self.event {
            TaskEventPayload::Audit { .. } => "audit",
        }
    }

    /// The audit record carried by this event, if it is an audit event.
    pub fn audit_record(&self) -> Option<&AuditRecord> {
        match &self.event {
            TaskEventPayload::Audit { entry } => Some(entry),
        }
    }
}
