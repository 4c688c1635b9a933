//! # keel-audit
//!
//! Append-only, redacted audit trail for Keel governance decisions.
//!
//! Every rule decision and credential checkout is recorded as an
//! [`AuditRecord`] inside a [`TaskEvent`] and appended to the event log of
//! the task it belongs to. Parameter maps are redacted before they are
//! stored, and the file-backed [`TaskEventLog`] links each event to the
//! previous one with a SHA-256 hash so tampering can be detected.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel_audit::{AuditCategory, AuditEntry, AuditOutcome, AuditTrail, TaskEventLog};
//!
//! let log = TaskEventLog::open("/tmp/keel-audit").unwrap();
//! let trail = AuditTrail::new(Arc::new(log));
//! let entry = AuditEntry::new(AuditCategory::PolicyCheck, "browser", AuditOutcome::Blocked)
//!     .with_triggered_rules(vec!["shopping-checkout".to_string()]);
//! trail.write_audit_entry("task-42", entry).unwrap();
//! ```

pub mod entry;
pub mod error;
pub mod event;
pub mod hasher;
pub mod log;
pub mod redact;
pub mod sink;
pub mod writer;

pub use entry::{AuditCategory, AuditEntry, AuditOutcome, AuditRecord};
pub use error::AuditError;
pub use event::{TaskEvent, TaskEventPayload};
pub use log::TaskEventLog;
pub use redact::{redact_params, REDACTED, TRUNCATION_MARKER};
pub use sink::{MemoryTaskEvents, TaskEventSink};
pub use writer::AuditTrail;
