//! # keel-policy
//!
//! Sensitivity rule engine for Keel.
//!
//! Every tool call an agent attempts is described by a [`RuleMatchContext`]
//! and evaluated against an ordered list of [`SensitivityRule`]s. The
//! [`RuleEngine`] returns the most restrictive action among all matching
//! rules plus the ids of every rule that matched.
//!
//! ## Key invariants
//!
//! - **AND within a rule**: a rule matches only if every criterion it
//!   declares is satisfied. Undeclared criteria match everything.
//! - **Most restrictive wins**: `block > require_approval > allow`.
//! - **Never fails**: no matching rule is a normal `allow`. A predicate that
//!   errors counts as "no match" for its own rule and is reported in
//!   [`RuleDecision::predicate_failures`].

pub mod action;
pub mod builtin;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod predicate;
pub mod rule;

pub use action::RuleAction;
pub use builtin::{builtin_rules, BROWSER_TOOL, MESSAGE_SEND_TOOL};
pub use config::{load_rules, RuleConfig};
pub use context::RuleMatchContext;
pub use engine::{
    evaluate_all_rules, evaluate_rule, CompiledRule, PredicateFailure, RuleDecision, RuleEngine,
    RuleEvalResult,
};
pub use error::{PredicateError, RuleError};
pub use predicate::{PredicateFn, PredicateRegistry};
pub use rule::SensitivityRule;
