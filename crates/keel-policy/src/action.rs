// action.rs — What a rule asks the caller to do with a tool call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The action attached to a rule, and the final decision for a tool call.
///
/// Variants are declared in ascending severity, so the derived `Ord` gives
/// `Allow < RequireApproval < Block` and `max()` picks the most restrictive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Proceed.
    Allow,
    /// Pause until a human approves.
    RequireApproval,
    /// Refuse outright.
    Block,
}

impl RuleAction {
    /// Numeric severity: block 2, require_approval 1, allow 0.
    pub fn severity(self) -> u8 {
        match self {
            RuleAction::Allow => 0,
            RuleAction::RequireApproval => 1,
            RuleAction::Block => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::RequireApproval => "require_approval",
            RuleAction::Block => "block",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
