// context.rs — Description of one attempted tool call.
//
// Built by the caller for each tool invocation and thrown away after the
// decision. Nothing here is persisted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Everything the rule engine may look at for a tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleMatchContext {
    /// Name of the tool being invoked (e.g. "browser", "exec").
    pub tool_name: String,
    /// Raw tool parameters, as the agent supplied them.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Target URL, for browser/HTTP tools.
    #[serde(default)]
    pub url: Option<String>,
    /// Raw shell command string, for shell tools.
    #[serde(default)]
    pub command: Option<String>,
    /// Browser interaction (e.g. "navigate", "click", "type").
    #[serde(default)]
    pub browser_action: Option<String>,
    /// Domain categories the URL belongs to (e.g. "financial", "shopping").
    #[serde(default)]
    pub domain_categories: BTreeSet<String>,
}

impl RuleMatchContext {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_browser_action(mut self, action: impl Into<String>) -> Self {
        self.browser_action = Some(action.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.domain_categories.insert(category.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }
}
