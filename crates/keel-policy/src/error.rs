// error.rs — Error types for the policy subsystem.
//
// Rule *evaluation* never fails. These errors come from building an engine
// out of configuration, and from custom predicates (which the evaluator
// catches and reports rather than propagating).

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading rules or constructing a rule engine.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule configuration file exists but could not be read.
    #[error("failed to read rule config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The rule configuration file is not valid YAML for a rule list.
    #[error("invalid rule config at {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    /// Two rules share an id. Ids are how decisions are audited, so they must be unique.
    #[error("duplicate rule id '{id}'")]
    DuplicateRule { id: String },

    /// A rule references a predicate that is not in the registry.
    #[error("rule '{rule_id}' references unknown predicate '{predicate}'")]
    UnknownPredicate { rule_id: String, predicate: String },
}

/// A custom predicate could not decide. Treated as "did not match".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PredicateError(pub String);

impl PredicateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
