// engine.rs — Sensitivity rule evaluation.
//
// The RuleEngine is built once from an explicit rule list and a predicate
// registry, then shared read-only across threads. For each tool call:
//
// 1. Every rule is evaluated independently (AND over its declared criteria,
//    cheapest checks first, custom predicate last).
// 2. Every matching rule id is recorded, even when its action is `allow`.
// 3. The decision is the most severe action among matches, `allow` if none.
//
// Evaluation has no failure path. Invalid regexes are dropped (with a
// warning) when the engine is built and can never match. A predicate that
// returns an error or panics makes only its own rule "not matched"; the
// failure is logged and carried on the decision.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::RuleAction;
use crate::builtin::builtin_rules;
use crate::context::RuleMatchContext;
use crate::error::{PredicateError, RuleError};
use crate::predicate::{PredicateFn, PredicateRegistry};
use crate::rule::SensitivityRule;

/// A rule with its regexes compiled and its predicate resolved.
pub struct CompiledRule {
    rule: SensitivityRule,
    /// `None` = criterion not declared. `Some(empty)` = declared, but every
    /// pattern was invalid, so the criterion can never be satisfied.
    command_regexes: Option<Vec<Regex>>,
    url_regexes: Option<Vec<Regex>>,
    predicate: Option<Arc<PredicateFn>>,
}

/// A predicate that could not decide during one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredicateFailure {
    pub rule_id: String,
    pub predicate: String,
    pub message: String,
}

/// Outcome of evaluating a single rule.
#[derive(Debug, Clone)]
pub struct RuleEvalResult<'r> {
    pub matched: bool,
    pub rule: &'r SensitivityRule,
    pub action: RuleAction,
    /// Set when the rule's predicate failed; `matched` is then false.
    pub predicate_failure: Option<PredicateFailure>,
}

/// Outcome of evaluating the whole rule set for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleDecision {
    /// Most restrictive action among matched rules (`allow` if none).
    pub action: RuleAction,
    /// Ids of every matched rule, in rule order.
    pub triggered_rules: Vec<String>,
    /// Predicates that failed and were treated as "no match".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicate_failures: Vec<PredicateFailure>,
}

impl RuleDecision {
    pub fn is_allowed(&self) -> bool {
        self.action == RuleAction::Allow
    }

    pub fn requires_approval(&self) -> bool {
        self.action == RuleAction::RequireApproval
    }

    pub fn is_blocked(&self) -> bool {
        self.action == RuleAction::Block
    }

    /// Short human-readable explanation, suitable for an audit `reason`.
    pub fn reason(&self) -> String {
        if self.triggered_rules.is_empty() {
            "no sensitivity rule matched".to_string()
        } else {
            format!(
                "{} (triggered: {})",
                self.action,
                self.triggered_rules.join(", ")
            )
        }
    }
}

impl CompiledRule {
    /// Compile one rule. Fails only if the rule names an unregistered predicate.
    pub fn compile(rule: SensitivityRule, registry: &PredicateRegistry) -> Result<Self, RuleError> {
        let predicate = match &rule.predicate {
            Some(id) => Some(registry.get(id).ok_or_else(|| RuleError::UnknownPredicate {
                rule_id: rule.id.clone(),
                predicate: id.clone(),
            })?),
            None => None,
        };
        let command_regexes = compile_patterns(&rule.id, declared(&rule.command_patterns));
        let url_regexes = compile_patterns(&rule.id, declared(&rule.url_patterns));
        Ok(Self {
            rule,
            command_regexes,
            url_regexes,
            predicate,
        })
    }

    pub fn rule(&self) -> &SensitivityRule {
        &self.rule
    }

    pub fn id(&self) -> &str {
        &self.rule.id
    }

    /// Evaluate this rule against a context.
    pub fn evaluate(&self, ctx: &RuleMatchContext) -> RuleEvalResult<'_> {
        let mut result = RuleEvalResult {
            matched: false,
            rule: &self.rule,
            action: self.rule.action,
            predicate_failure: None,
        };

        if !self.declarative_criteria_match(ctx) {
            return result;
        }

        match &self.predicate {
            None => result.matched = true,
            Some(predicate) => match run_predicate(predicate.as_ref(), ctx) {
                Ok(matched) => result.matched = matched,
                Err(err) => {
                    let predicate_id = self.rule.predicate.clone().unwrap_or_default();
                    tracing::warn!(
                        rule_id = %self.rule.id,
                        predicate = %predicate_id,
                        error = %err,
                        "rule predicate failed; treating rule as not matched"
                    );
                    result.predicate_failure = Some(PredicateFailure {
                        rule_id: self.rule.id.clone(),
                        predicate: predicate_id,
                        message: err.to_string(),
                    });
                }
            },
        }
        result
    }

    /// Criteria 1–5, in order, short-circuiting on the first miss.
    fn declarative_criteria_match(&self, ctx: &RuleMatchContext) -> bool {
        // 1. Tool name (exact, case-sensitive).
        if let Some(tools) = declared(&self.rule.tool_names) {
            if !tools.iter().any(|t| *t == ctx.tool_name) {
                return false;
            }
        }

        // 2. Domain category intersection.
        if let Some(categories) = declared(&self.rule.domain_categories) {
            if !categories.iter().any(|c| ctx.domain_categories.contains(c)) {
                return false;
            }
        }

        // 3. Browser action.
        if let Some(actions) = declared(&self.rule.browser_actions) {
            match &ctx.browser_action {
                Some(action) if actions.iter().any(|a| a == action) => {}
                _ => return false,
            }
        }

        // 4. Command regex (any one).
        if let Some(regexes) = &self.command_regexes {
            if !any_regex_matches(regexes, ctx.command.as_deref()) {
                return false;
            }
        }

        // 5. URL regex (any one).
        if let Some(regexes) = &self.url_regexes {
            if !any_regex_matches(regexes, ctx.url.as_deref()) {
                return false;
            }
        }

        true
    }
}

impl std::fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRule")
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

/// Evaluate a single compiled rule against a context.
pub fn evaluate_rule<'r>(rule: &'r CompiledRule, ctx: &RuleMatchContext) -> RuleEvalResult<'r> {
    rule.evaluate(ctx)
}

/// Evaluate every rule and combine: most severe action, all triggered ids.
pub fn evaluate_all_rules(rules: &[CompiledRule], ctx: &RuleMatchContext) -> RuleDecision {
    let mut decision = RuleDecision {
        action: RuleAction::Allow,
        triggered_rules: Vec::new(),
        predicate_failures: Vec::new(),
    };

    for rule in rules {
        let result = rule.evaluate(ctx);
        if let Some(failure) = result.predicate_failure {
            decision.predicate_failures.push(failure);
        }
        if result.matched {
            decision.triggered_rules.push(result.rule.id.clone());
            decision.action = decision.action.max(result.action);
        }
    }

    decision
}

/// An immutable, thread-safe set of compiled sensitivity rules.
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    /// Build an engine from an ordered rule list.
    ///
    /// Fails on duplicate rule ids or unregistered predicates.
    pub fn new(rules: Vec<SensitivityRule>, registry: &PredicateRegistry) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            if !seen.insert(rule.id.clone()) {
                return Err(RuleError::DuplicateRule { id: rule.id });
            }
            compiled.push(CompiledRule::compile(rule, registry)?);
        }
        tracing::debug!(rules = compiled.len(), "rule engine built");
        Ok(Self { rules: compiled })
    }

    /// The built-in default rule set with the built-in predicates.
    pub fn builtin() -> Result<Self, RuleError> {
        Self::new(builtin_rules(), &PredicateRegistry::with_builtins())
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Look up a rule by id.
    pub fn rule(&self, id: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.id() == id)
    }

    /// Evaluate one rule by id. `None` if no such rule.
    pub fn evaluate_rule(&self, id: &str, ctx: &RuleMatchContext) -> Option<RuleEvalResult<'_>> {
        self.rule(id).map(|r| r.evaluate(ctx))
    }

    /// Decide a tool call against every rule.
    pub fn evaluate(&self, ctx: &RuleMatchContext) -> RuleDecision {
        let decision = evaluate_all_rules(&self.rules, ctx);
        tracing::debug!(
            tool = %ctx.tool_name,
            action = %decision.action,
            triggered = ?decision.triggered_rules,
            "sensitivity rules evaluated"
        );
        decision
    }
}

/// Treat an empty list as "not declared".
fn declared(list: &Option<Vec<String>>) -> Option<&[String]> {
    match list {
        Some(items) if !items.is_empty() => Some(items.as_slice()),
        _ => None,
    }
}

fn compile_patterns(rule_id: &str, patterns: Option<&[String]>) -> Option<Vec<Regex>> {
    patterns.map(|patterns| {
        patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(rule_id, pattern = %p, error = %e, "invalid rule pattern ignored");
                    None
                }
            })
            .collect()
    })
}

fn any_regex_matches(regexes: &[Regex], haystack: Option<&str>) -> bool {
    match haystack {
        Some(text) => regexes.iter().any(|re| re.is_match(text)),
        None => false,
    }
}

/// Run a predicate, converting a panic into a PredicateError.
fn run_predicate(predicate: &PredicateFn, ctx: &RuleMatchContext) -> Result<bool, PredicateError> {
    match catch_unwind(AssertUnwindSafe(|| predicate(ctx))) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "predicate panicked".to_string());
            Err(PredicateError(format!("panicked: {}", message)))
        }
    }
}
