// writer.rs — AuditTrail: the one entry point for recording decisions.
//
// A caller makes its allow/approve/block decision first, then writes the
// audit entry. A failed write is returned to the caller; it never changes a
// decision that was already made.

use std::sync::Arc;

use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::event::TaskEvent;
use crate::sink::TaskEventSink;

/// Writes redacted audit entries to task event logs.
#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn TaskEventSink>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn TaskEventSink>) -> Self {
        Self { sink }
    }

    /// Append one immutable audit record to `task_id`'s event log.
    ///
    /// `entry.params` is redacted before anything leaves this function.
    /// Returns the event as stored (with its chain link, if the sink chains).
    pub fn write_audit_entry(&self, task_id: &str, entry: AuditEntry) -> Result<TaskEvent, AuditError> {
        let record = entry.into_record();
        let mut event = TaskEvent::audit(task_id, record);
        self.sink.append_task_event(task_id, &mut event).inspect_err(|e| {
            tracing::error!(task_id, error = %e, "failed to write audit entry");
        })?;
        tracing::debug!(
            task_id,
            tool = event.audit_record().map(|r| r.tool_name.as_str()).unwrap_or("-"),
            "audit entry written"
        );
        Ok(event)
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").finish_non_exhaustive()
    }
}
