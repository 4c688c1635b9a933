// config.rs — Operator-supplied rule configuration.
//
// Rules come from two places: the built-in set and an optional YAML file.
// The file looks like:
//
//   include_builtins: true     # default
//   rules:
//     - id: prod-db-shell
//       name: Production database shell
//       category: infrastructure
//       action: block
//       command_patterns: ["psql .*prod"]
//
// Built-ins come first, configured rules follow in file order. Rules are
// loaded once at process start and never change while a task runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::builtin::builtin_rules;
use crate::error::RuleError;
use crate::rule::SensitivityRule;

fn default_true() -> bool {
    true
}

/// The parsed contents of a rule configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    /// Prepend the built-in rule set. Turning this off is for tests and for
    /// operators who replicate the built-ins themselves.
    #[serde(default = "default_true")]
    pub include_builtins: bool,
    #[serde(default)]
    pub rules: Vec<SensitivityRule>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            include_builtins: true,
            rules: Vec::new(),
        }
    }
}

impl RuleConfig {
    /// Parse a YAML rule configuration. `path` is only used in error messages.
    pub fn from_yaml_str(content: &str, path: &Path) -> Result<Self, RuleError> {
        // An empty file is a valid, empty config.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| RuleError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read a config file. A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| RuleError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, path)
    }

    /// The ordered rule list this config describes.
    pub fn into_rules(self) -> Vec<SensitivityRule> {
        let mut rules = if self.include_builtins {
            builtin_rules()
        } else {
            Vec::new()
        };
        rules.extend(self.rules);
        rules
    }
}

/// Load the full ordered rule list: built-ins plus whatever `path` adds.
pub fn load_rules(path: &Path) -> Result<Vec<SensitivityRule>, RuleError> {
    let config = RuleConfig::load(path)?;
    let configured = config.rules.len();
    let rules = config.into_rules();
    tracing::info!(
        path = %path.display(),
        configured,
        total = rules.len(),
        "sensitivity rules loaded"
    );
    Ok(rules)
}
