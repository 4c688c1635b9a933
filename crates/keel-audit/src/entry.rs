// entry.rs — Audit entry data model.
//
// An AuditEntry is what a caller hands to the audit trail: the raw decision
// plus the tool-call parameters. An AuditRecord is what gets stored: the
// same decision with the parameters redacted. Records are never updated or
// deleted once written.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::redact::redact_params;

/// Which kind of governance decision an entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// A tool was invoked (including credential checkout).
    ToolInvocation,
    /// The sensitivity rule engine evaluated a tool call.
    PolicyCheck,
    /// A human approval was requested or resolved.
    ApprovalFlow,
    /// A spend/usage budget was consulted.
    BudgetCheck,
    /// A spend/usage budget was exhausted.
    BudgetExceeded,
}

/// The result of the decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Blocked,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    BudgetExceeded,
}

/// A decision about to be written, with unredacted parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub category: AuditCategory,
    pub tool_name: String,
    pub outcome: AuditOutcome,
    pub reason: Option<String>,
    pub triggered_rules: Option<Vec<String>>,
    /// Budget consumption snapshot, shape owned by the budget collaborator.
    pub consumption: Option<Value>,
    pub params: Option<Map<String, Value>>,
}

impl AuditEntry {
    pub fn new(category: AuditCategory, tool_name: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            category,
            tool_name: tool_name.into(),
            outcome,
            reason: None,
            triggered_rules: None,
            consumption: None,
            params: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_triggered_rules(mut self, rules: Vec<String>) -> Self {
        self.triggered_rules = Some(rules);
        self
    }

    pub fn with_consumption(mut self, consumption: Value) -> Self {
        self.consumption = Some(consumption);
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    /// Redact the parameters and produce the record that gets stored.
    pub fn into_record(self) -> AuditRecord {
        AuditRecord {
            category: self.category,
            tool_name: self.tool_name,
            outcome: self.outcome,
            reason: self.reason,
            triggered_rules: self.triggered_rules,
            consumption: self.consumption,
            redacted_params: self.params.as_ref().map(redact_params),
        }
    }
}

/// The stored form of an audit entry. Only redacted parameters survive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub category: AuditCategory,
    pub tool_name: String,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_rules: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_params: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn into_record_redacts_params() {
        let params = json!({"token": "abc", "url": "https://example.com"});
        let record = AuditEntry::new(AuditCategory::ToolInvocation, "browser", AuditOutcome::Allowed)
            .with_params(params.as_object().cloned().unwrap())
            .into_record();

        let stored = record.redacted_params.unwrap();
        assert_eq!(stored["token"], "[REDACTED]");
        assert_eq!(stored["url"], "https://example.com");
    }

    #[test]
    fn record_without_params_omits_optional_fields() {
        let record =
            AuditEntry::new(AuditCategory::PolicyCheck, "exec", AuditOutcome::Blocked).into_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            json!({"category": "policy_check", "tool_name": "exec", "outcome": "blocked"})
        );
    }

    #[test]
    fn outcome_serializes_as_snake_case() {
        let json = serde_json::to_string(&AuditOutcome::ApprovalRequested).unwrap();
        assert_eq!(json, "\"approval_requested\"");
        let json = serde_json::to_string(&AuditCategory::BudgetExceeded).unwrap();
        assert_eq!(json, "\"budget_exceeded\"");
    }
}
