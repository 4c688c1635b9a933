// credential.rs — Credential records, grants, leases and usage history.
//
// A Credential never holds plaintext. `encrypted_value` is the sealed blob
// produced by `crypto::seal`; only checkout opens it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Usage records kept per credential. Oldest are evicted first.
pub const MAX_USAGE_HISTORY: usize = 200;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A stored credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub name: String,
    pub category: String,
    pub provider: String,
    pub encrypted_value: String,
    #[serde(default)]
    pub grants: Vec<AccessGrant>,
    #[serde(default)]
    pub leases: Vec<Lease>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub usage_history: VecDeque<UsageRecord>,
    pub created_at_ms: i64,
}

impl Credential {
    pub fn has_grant(&self, agent_id: &str) -> bool {
        self.grants.iter().any(|g| g.agent_id == agent_id)
    }

    /// First lease for `agent_id` that is active at `now_ms`.
    pub fn active_lease(&self, agent_id: &str, now_ms: i64) -> Option<&Lease> {
        self.leases
            .iter()
            .find(|l| l.agent_id == agent_id && l.is_active_at(now_ms))
    }

    /// Grant is checked before leases.
    pub fn access_status(&self, agent_id: &str, now_ms: i64) -> AccessStatus {
        if self.has_grant(agent_id) {
            AccessStatus::HasGrant
        } else if self.active_lease(agent_id, now_ms).is_some() {
            AccessStatus::HasLease
        } else {
            AccessStatus::NoAccess
        }
    }

    pub fn active_lease_count(&self, now_ms: i64) -> usize {
        self.leases.iter().filter(|l| l.is_active_at(now_ms)).count()
    }

    /// Count one use and append it to the bounded history.
    pub fn record_usage(&mut self, record: UsageRecord) {
        self.usage_count += 1;
        self.usage_history.push_back(record);
        while self.usage_history.len() > MAX_USAGE_HISTORY {
            self.usage_history.pop_front();
        }
    }
}

/// Permanent access for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessGrant {
    pub agent_id: String,
    pub granted_at_ms: i64,
}

/// Time-bounded access for one agent, optionally scoped to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lease {
    pub lease_id: Uuid,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at_ms: Option<i64>,
    /// Set by the lease monitor once it has noticed expiry. Informational;
    /// activity is always computed from `expires_at_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_marked_at_ms: Option<i64>,
}

impl Lease {
    pub fn new(agent_id: impl Into<String>, task_id: Option<String>, issued_at_ms: i64, ttl_ms: i64) -> Self {
        Self {
            lease_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            task_id,
            issued_at_ms,
            expires_at_ms: issued_at_ms.saturating_add(ttl_ms),
            revoked_at_ms: None,
            expired_marked_at_ms: None,
        }
    }

    /// Active iff not revoked and `now_ms` is strictly before expiry.
    pub fn is_active_at(&self, now_ms: i64) -> bool {
        self.revoked_at_ms.is_none() && now_ms < self.expires_at_ms
    }
}

/// One successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageRecord {
    pub agent_id: String,
    pub at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// How (or whether) an agent can reach a credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    HasGrant,
    HasLease,
    NoAccess,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::HasGrant => "has_grant",
            AccessStatus::HasLease => "has_lease",
            AccessStatus::NoAccess => "no_access",
        }
    }
}

impl std::fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            id: "openai".into(),
            name: "OpenAI key".into(),
            category: "api_key".into(),
            provider: "openai".into(),
            encrypted_value: "sealed".into(),
            grants: vec![],
            leases: vec![],
            usage_count: 0,
            usage_history: VecDeque::new(),
            created_at_ms: 0,
        }
    }

    fn usage(at_ms: i64) -> UsageRecord {
        UsageRecord {
            agent_id: "agent-1".into(),
            at_ms,
            task_id: None,
            tool_name: None,
        }
    }

    #[test]
    fn no_grants_no_leases_means_no_access() {
        let c = credential();
        for agent in ["agent-1", "agent-2", ""] {
            assert_eq!(c.access_status(agent, 1_000), AccessStatus::NoAccess);
        }
    }

    #[test]
    fn grant_wins_over_lease() {
        let mut c = credential();
        c.grants.push(AccessGrant { agent_id: "a".into(), granted_at_ms: 0 });
        c.leases.push(Lease::new("a", None, 0, 10_000));
        assert_eq!(c.access_status("a", 5), AccessStatus::HasGrant);
        assert_eq!(c.access_status("b", 5), AccessStatus::NoAccess);
    }

    #[test]
    fn expired_lease_is_same_as_revoked() {
        let now = 1_000_000;
        let mut expired = credential();
        expired.leases.push(Lease::new("a", None, now - 10_000, 10_000 - 1));
        assert_eq!(expired.leases[0].expires_at_ms, now - 1);

        let mut revoked = credential();
        let mut lease = Lease::new("a", None, now, 60_000);
        lease.revoked_at_ms = Some(now);
        revoked.leases.push(lease);

        assert_eq!(expired.access_status("a", now), AccessStatus::NoAccess);
        assert_eq!(revoked.access_status("a", now), AccessStatus::NoAccess);
        assert_eq!(expired.active_lease_count(now), 0);
        assert_eq!(revoked.active_lease_count(now), 0);
    }

    #[test]
    fn lease_boundary_is_exclusive() {
        let lease = Lease::new("a", Some("task-1".into()), 100, 50);
        assert!(lease.is_active_at(149));
        assert!(!lease.is_active_at(150));
    }

    #[test]
    fn history_is_bounded_fifo() {
        let mut c = credential();
        for i in 0..201 {
            c.record_usage(usage(i));
        }
        assert_eq!(c.usage_count, 201);
        assert_eq!(c.usage_history.len(), MAX_USAGE_HISTORY);
        assert_eq!(c.usage_history.front().map(|u| u.at_ms), Some(1));
        assert_eq!(c.usage_history.back().map(|u| u.at_ms), Some(200));
    }

    #[test]
    fn access_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&AccessStatus::HasLease).unwrap(), "\"has_lease\"");
        assert_eq!(AccessStatus::NoAccess.to_string(), "no_access");
    }
}
