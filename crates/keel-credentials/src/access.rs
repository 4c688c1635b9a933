// access.rs — The agent-facing credential API: list, checkout, request access.
//
// Agents never see secrets except through a successful checkout, and a
// denied checkout never reveals whether the credential exists. Grants and
// leases are managed by the operator through CredentialStore; nothing here
// can change who has access.
//
// Checkout takes the store lock twice: once to check access and copy the
// sealed blob, once to commit the usage record (re-checking access, so a
// lease revoked in between still denies). The scrypt derivation and the
// decryption run between the two, with no lock held.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use zeroize::Zeroizing;

use keel_audit::{AuditCategory, AuditEntry, AuditError, AuditOutcome, AuditTrail};

use crate::credential::{now_ms, AccessStatus, UsageRecord};
use crate::crypto;
use crate::error::CredentialError;
use crate::store::{require, CredentialStore};
use crate::task::{ApprovalTaskCreator, ApprovalTaskRef, ApprovalTaskRequest, TaskType};

/// Tool name recorded in the audit log when the caller gives none.
pub const CHECKOUT_TOOL: &str = "credential.checkout";

/// What an agent sees when listing credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSummary {
    pub id: String,
    pub name: String,
    pub category: String,
    pub provider: String,
    pub access: AccessStatus,
    pub grant_count: usize,
    pub active_lease_count: usize,
    pub usage_count: u64,
}

/// A successful checkout. The secret is wiped from memory when dropped.
pub struct Checkout {
    pub credential_id: String,
    pub agent_id: String,
    /// Which kind of access authorized this checkout.
    pub via: AccessStatus,
    pub secret: Zeroizing<String>,
    /// Result of writing the audit entry. A failure here does not take
    /// back the secret; the caller decides what to do about it.
    pub audit: Result<(), AuditError>,
}

impl Checkout {
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("credential_id", &self.credential_id)
            .field("agent_id", &self.agent_id)
            .field("via", &self.via)
            .field("secret", &"[REDACTED]")
            .field("audit", &self.audit)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestStatus {
    Pending,
}

/// Returned by `request_access` as soon as the approval task exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessRequest {
    pub status: AccessRequestStatus,
    pub credential_id: String,
    pub credential_name: String,
    pub task: ApprovalTaskRef,
}

pub struct CredentialAccess {
    store: Arc<CredentialStore>,
    tasks: Arc<dyn ApprovalTaskCreator>,
    audit: Option<AuditTrail>,
}

impl CredentialAccess {
    pub fn new(store: Arc<CredentialStore>, tasks: Arc<dyn ApprovalTaskCreator>) -> Self {
        Self {
            store,
            tasks,
            audit: None,
        }
    }

    /// Record checkouts that carry a task id in this audit trail.
    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Every credential, with this agent's access status. No secrets.
    pub fn list(&self, agent_id: &str) -> Result<Vec<CredentialSummary>, CredentialError> {
        require("agent_id", agent_id)?;
        let now = now_ms();
        self.store.read(|creds| {
            creds
                .iter()
                .map(|c| CredentialSummary {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    category: c.category.clone(),
                    provider: c.provider.clone(),
                    access: c.access_status(agent_id, now),
                    grant_count: c.grants.len(),
                    active_lease_count: c.active_lease_count(now),
                    usage_count: c.usage_count,
                })
                .collect()
        })
    }

    /// Decrypt and return a secret if the agent holds a grant or an active
    /// lease. Each call decrypts afresh; nothing is cached.
    pub fn checkout(
        &self,
        credential_id: &str,
        agent_id: &str,
        task_id: Option<&str>,
        tool_name: Option<&str>,
    ) -> Result<Checkout, CredentialError> {
        require("credential_id", credential_id)?;
        require("agent_id", agent_id)?;
        let tool = tool_name.unwrap_or(CHECKOUT_TOOL);

        let sealed = self.store.read(|creds| {
            let now = now_ms();
            creds
                .iter()
                .find(|c| c.id == credential_id)
                .filter(|c| c.access_status(agent_id, now) != AccessStatus::NoAccess)
                .map(|c| c.encrypted_value.clone())
        })?;
        let Some(sealed) = sealed else {
            return Err(self.deny(credential_id, agent_id, task_id, tool, "no grant or active lease"));
        };

        let secret = {
            let key = self.store.derive_working_key()?;
            let plaintext = crypto::open(&key, &sealed)?;
            let text = std::str::from_utf8(&plaintext)
                .map_err(|_| CredentialError::Crypto("credential is not valid UTF-8".to_string()))?;
            Zeroizing::new(text.to_string())
        };

        let committed = self.store.update(|creds| {
            let now = now_ms();
            let credential = creds
                .iter_mut()
                .find(|c| c.id == credential_id)
                .ok_or_else(|| denied(credential_id, agent_id, None))?;
            let via = credential.access_status(agent_id, now);
            if via == AccessStatus::NoAccess {
                return Err(denied(credential_id, agent_id, None));
            }
            credential.record_usage(UsageRecord {
                agent_id: agent_id.to_string(),
                at_ms: now,
                task_id: task_id.map(str::to_string),
                tool_name: tool_name.map(str::to_string),
            });
            Ok(via)
        });
        let via = match committed {
            Ok(via) => via,
            Err(e) if e.is_access_denied() => {
                return Err(self.deny(
                    credential_id,
                    agent_id,
                    task_id,
                    tool,
                    "access revoked during checkout",
                ));
            }
            Err(e) => return Err(e),
        };

        let audit = self.record(task_id, tool, AuditOutcome::Allowed, credential_id, agent_id, None);
        tracing::info!(credential_id, agent_id, via = %via, "credential checked out");
        Ok(Checkout {
            credential_id: credential_id.to_string(),
            agent_id: agent_id.to_string(),
            via,
            secret,
            audit,
        })
    }

    /// `checkout` on tokio's blocking pool, bounded by `timeout`.
    ///
    /// On timeout the caller gets `Timeout`; a checkout already past its
    /// access check may still commit its usage record in the background.
    pub async fn checkout_with_timeout(
        self: &Arc<Self>,
        credential_id: &str,
        agent_id: &str,
        task_id: Option<&str>,
        tool_name: Option<&str>,
        timeout: Duration,
    ) -> Result<Checkout, CredentialError> {
        let access = Arc::clone(self);
        let credential_id = credential_id.to_string();
        let agent_id = agent_id.to_string();
        let task_id = task_id.map(str::to_string);
        let tool_name = tool_name.map(str::to_string);

        let handle = tokio::task::spawn_blocking(move || {
            access.checkout(&credential_id, &agent_id, task_id.as_deref(), tool_name.as_deref())
        });
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(CredentialError::CheckoutTask(join.to_string())),
            Err(_) => Err(CredentialError::Timeout {
                after_ms: timeout.as_millis(),
            }),
        }
    }

    /// Ask a human for access. Returns immediately with the pending task.
    pub fn request_access(
        &self,
        credential_id: &str,
        agent_id: &str,
        reason: Option<&str>,
    ) -> Result<AccessRequest, CredentialError> {
        require("credential_id", credential_id)?;
        require("agent_id", agent_id)?;

        let credential_name = self
            .store
            .get(credential_id)
            .ok()
            .flatten()
            .map(|c| c.name)
            .unwrap_or_else(|| credential_id.to_string());
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());

        let mut description = format!(
            "Agent '{}' requests access to credential '{}' ({}).",
            agent_id, credential_name, credential_id
        );
        if let Some(reason) = reason {
            description.push_str(&format!("\nReason: {}", reason));
        }

        let task = self.tasks.create_approval_task(ApprovalTaskRequest {
            title: format!("Credential access request: {}", credential_name),
            description,
            task_type: TaskType::ApprovalGate,
            metadata: json!({
                "kind": "credential_access",
                "credentialId": credential_id,
                "agentId": agent_id,
                "reason": reason,
            }),
        })?;

        tracing::info!(credential_id, agent_id, task_id = %task.task_id, "access requested");
        Ok(AccessRequest {
            status: AccessRequestStatus::Pending,
            credential_id: credential_id.to_string(),
            credential_name,
            task,
        })
    }

    fn deny(
        &self,
        credential_id: &str,
        agent_id: &str,
        task_id: Option<&str>,
        tool: &str,
        reason: &str,
    ) -> CredentialError {
        tracing::info!(credential_id, agent_id, reason, "checkout denied");
        let recorded =
            self.record(task_id, tool, AuditOutcome::Blocked, credential_id, agent_id, Some(reason));
        if let Err(e) = &recorded {
            tracing::warn!(credential_id, agent_id, error = %e, "denial not recorded in audit trail");
        }
        denied(credential_id, agent_id, recorded.err())
    }

    fn record(
        &self,
        task_id: Option<&str>,
        tool: &str,
        outcome: AuditOutcome,
        credential_id: &str,
        agent_id: &str,
        reason: Option<&str>,
    ) -> Result<(), AuditError> {
        let (Some(task_id), Some(trail)) = (task_id, self.audit.as_ref()) else {
            return Ok(());
        };
        let mut params = serde_json::Map::new();
        params.insert("credentialId".into(), json!(credential_id));
        params.insert("agentId".into(), json!(agent_id));

        let mut entry = AuditEntry::new(AuditCategory::ToolInvocation, tool, outcome).with_params(params);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        trail.write_audit_entry(task_id, entry).map(|_| ())
    }
}

fn denied(
    credential_id: &str,
    agent_id: &str,
    audit_failure: Option<AuditError>,
) -> CredentialError {
    CredentialError::AccessDenied {
        credential_id: credential_id.to_string(),
        agent_id: agent_id.to_string(),
        audit_failure,
    }
}
