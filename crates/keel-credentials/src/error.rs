// error.rs — Error types for credential access control.
//
// AccessDenied is a normal outcome for an agent (it should go on to request
// access). WrongMasterKey and StoreCorrupt are fatal for the store: the
// process must not keep operating on it.

use std::path::PathBuf;
use thiserror::Error;

use keel_audit::AuditError;

/// Errors that can occur during credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A required argument was missing or empty.
    #[error("missing required parameter '{field}'")]
    InvalidParameters { field: &'static str },

    /// The agent holds neither a grant nor an active lease. Deliberately the
    /// same whether or not the credential exists.
    #[error("access denied: agent '{agent_id}' cannot check out credential '{credential_id}'")]
    AccessDenied {
        credential_id: String,
        agent_id: String,
        /// Set when the Blocked audit entry for this denial could not be
        /// written. Not part of the message.
        audit_failure: Option<AuditError>,
    },

    /// The supplied master key does not decrypt the store's sentinel.
    #[error("wrong master key for credential store at {path}")]
    WrongMasterKey { path: PathBuf },

    /// The persisted store document is unreadable. Never reset silently.
    #[error("credential store at {path} is corrupt: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    /// Opening a store that has not been initialized.
    #[error("no credential store at {path}")]
    StoreNotFound { path: PathBuf },

    /// Initializing a store over an existing one.
    #[error("credential store already exists at {path}")]
    StoreExists { path: PathBuf },

    /// An operator operation named a credential that does not exist.
    #[error("credential '{credential_id}' not found")]
    NotFound { credential_id: String },

    /// An operator tried to add a credential whose id is taken.
    #[error("credential '{credential_id}' already exists")]
    AlreadyExists { credential_id: String },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Key derivation, encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Failed to serialize store data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller-supplied deadline passed before checkout finished.
    #[error("checkout timed out after {after_ms} ms")]
    Timeout { after_ms: u128 },

    /// The blocking checkout task panicked or was cancelled.
    #[error("checkout task failed: {0}")]
    CheckoutTask(String),

    /// The task system could not create the approval task.
    #[error("failed to create approval task: {0}")]
    TaskCreation(String),

    /// Writing the audit entry failed.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The store's internal lock was poisoned by a panicking writer.
    #[error("credential store lock poisoned")]
    LockPoisoned,
}

impl CredentialError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, CredentialError::AccessDenied { .. })
    }

    /// The audit write error attached to a denial, if recording it failed.
    pub fn denial_audit_failure(&self) -> Option<&AuditError> {
        match self {
            CredentialError::AccessDenied { audit_failure, .. } => audit_failure.as_ref(),
            _ => None,
        }
    }
}
