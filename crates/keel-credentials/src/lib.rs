//! # keel-credentials
//!
//! Encrypted credential storage and agent access control for Keel.
//!
//! Secrets are sealed with AES-256-GCM under a key derived from the
//! operator's master secret (scrypt). Agents reach a secret only through
//! [`CredentialAccess::checkout`], which requires a permanent grant or an
//! active lease. Agents without access call
//! [`CredentialAccess::request_access`], which files an approval task for a
//! human. The operator side ([`CredentialStore`]) adds credentials and
//! manages grants and leases; the [`LeaseMonitor`] marks expired leases in
//! the background.

pub mod access;
pub mod credential;
pub mod crypto;
pub mod error;
mod lock;
pub mod monitor;
pub mod store;
pub mod task;

pub use access::{
    AccessRequest, AccessRequestStatus, Checkout, CredentialAccess, CredentialSummary, CHECKOUT_TOOL,
};
pub use credential::{
    now_ms, AccessGrant, AccessStatus, Credential, Lease, UsageRecord, MAX_USAGE_HISTORY,
};
pub use crypto::{KdfParams, MasterKey, DEFAULT_LOG_N};
pub use error::CredentialError;
pub use monitor::{LeaseMonitor, LeaseMonitorHandle, SweepReport, DEFAULT_SWEEP_PERIOD};
pub use store::{CredentialStore, NewCredential, StoreOptions, DEFAULT_LEASE_TTL, SENTINEL_PLAINTEXT};
pub use task::{
    ApprovalTask, ApprovalTaskCreator, ApprovalTaskRef, ApprovalTaskRequest, ApprovalTaskStatus,
    TaskInbox, TaskType,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn shared_types_are_send_sync() {
        assert_send_sync::<CredentialStore>();
        assert_send_sync::<CredentialAccess>();
        assert_send_sync::<LeaseMonitor>();
        assert_send_sync::<TaskInbox>();
    }
}
