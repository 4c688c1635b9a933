// rule.rs — Sensitivity rule definitions.
//
// A rule is read-only configuration: an id, an action, and any number of
// matching criteria. Each criterion is optional. `None` means the rule does
// not constrain that dimension; an empty list is treated the same way, so a
// YAML `tool_names: []` does not silently disable a rule.

use serde::{Deserialize, Serialize};

use crate::action::RuleAction;

/// One rule in the sensitivity rule database.
///
/// Example (YAML):
/// ```yaml
/// id: prod-db-shell
/// name: Production database shell
/// category: infrastructure
/// action: block
/// command_patterns: ["psql .*prod"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensitivityRule {
    /// Stable identifier, recorded in audit entries when the rule triggers.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Free-form grouping label (e.g. "financial", "filesystem").
    pub category: String,
    pub action: RuleAction,

    /// Exact, case-sensitive tool names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_names: Option<Vec<String>>,
    /// The context must carry at least one of these domain categories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_categories: Option<Vec<String>>,
    /// Browser interactions this rule applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_actions: Option<Vec<String>>,
    /// Regexes tested against the raw command string; any one suffices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_patterns: Option<Vec<String>>,
    /// Regexes tested against the URL; any one suffices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_patterns: Option<Vec<String>>,
    /// Id of a registered custom predicate, evaluated last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl SensitivityRule {
    /// Create a rule with no criteria (matches every tool call).
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        action: RuleAction,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: category.into(),
            action,
            tool_names: None,
            domain_categories: None,
            browser_actions: None,
            command_patterns: None,
            url_patterns: None,
            predicate: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tool_names = Some(to_strings(tools));
        self
    }

    pub fn with_domain_categories(mut self, categories: &[&str]) -> Self {
        self.domain_categories = Some(to_strings(categories));
        self
    }

    pub fn with_browser_actions(mut self, actions: &[&str]) -> Self {
        self.browser_actions = Some(to_strings(actions));
        self
    }

    pub fn with_command_patterns(mut self, patterns: &[&str]) -> Self {
        self.command_patterns = Some(to_strings(patterns));
        self
    }

    pub fn with_url_patterns(mut self, patterns: &[&str]) -> Self {
        self.url_patterns = Some(to_strings(patterns));
        self
    }

    pub fn with_predicate(mut self, predicate_id: impl Into<String>) -> Self {
        self.predicate = Some(predicate_id.into());
        self
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
