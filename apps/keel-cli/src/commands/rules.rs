// rules.rs — Rules subcommands: list, check.

use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use serde_json::{Map, Value};

use keel_audit::{AuditCategory, AuditEntry, AuditOutcome, AuditTrail, TaskEventLog};
use keel_policy::{load_rules, PredicateRegistry, RuleAction, RuleEngine, RuleMatchContext};

use crate::config::KeelConfig;

#[derive(Subcommand)]
pub enum RulesCommands {
    /// List the active rules (built-ins plus .keel/rules.yaml).
    List {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Evaluate one tool call against the rules.
    Check {
        /// Tool being invoked (e.g. "browser", "shell", "message_send").
        #[arg(long)]
        tool: String,
        /// Target URL.
        #[arg(long)]
        url: Option<String>,
        /// Shell command string.
        #[arg(long)]
        command: Option<String>,
        /// Browser action (navigate, click, type, ...).
        #[arg(long)]
        action: Option<String>,
        /// Domain category of the URL; repeatable.
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Tool parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,
        /// Record the decision in this task's audit log.
        #[arg(long)]
        task: Option<String>,
        /// Print the decision as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: &RulesCommands, config: &KeelConfig) -> anyhow::Result<()> {
    let engine = load_engine(config)?;

    match cmd {
        RulesCommands::List { json } => {
            if *json {
                let rules: Vec<_> = engine.rules().iter().map(|r| r.rule()).collect();
                println!("{}", serde_json::to_string_pretty(&rules)?);
                return Ok(());
            }
            println!("{:<28} {:<18} {:<14} NAME", "ID", "ACTION", "CATEGORY");
            println!("{}", "-".repeat(80));
            for compiled in engine.rules() {
                let rule = compiled.rule();
                println!(
                    "{:<28} {:<18} {:<14} {}",
                    rule.id,
                    rule.action.as_str(),
                    rule.category,
                    rule.name
                );
            }
        }

        RulesCommands::Check {
            tool,
            url,
            command,
            action,
            categories,
            params,
            task,
            json,
        } => {
            let mut ctx = RuleMatchContext::new(tool.as_str());
            if let Some(url) = url {
                ctx = ctx.with_url(url.as_str());
            }
            if let Some(command) = command {
                ctx = ctx.with_command(command.as_str());
            }
            if let Some(action) = action {
                ctx = ctx.with_browser_action(action.as_str());
            }
            for category in categories {
                ctx = ctx.with_category(category.as_str());
            }
            if let Some(params) = params {
                ctx = ctx.with_params(parse_params(params)?);
            }

            let decision = engine.evaluate(&ctx);

            if let Some(task_id) = task {
                let log = TaskEventLog::open(&config.audit_dir)?;
                let trail = AuditTrail::new(Arc::new(log));
                let entry = AuditEntry::new(
                    AuditCategory::PolicyCheck,
                    ctx.tool_name.as_str(),
                    outcome_for(decision.action),
                )
                .with_reason(decision.reason())
                .with_triggered_rules(decision.triggered_rules.clone())
                .with_params(ctx.params.clone());
                trail.write_audit_entry(task_id, entry)?;
            }

            if *json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                println!("Decision: {}", decision.action);
                if decision.triggered_rules.is_empty() {
                    println!("No rules matched.");
                } else {
                    println!("Triggered: {}", decision.triggered_rules.join(", "));
                }
                for failure in &decision.predicate_failures {
                    println!(
                        "Warning: predicate '{}' on rule '{}' failed: {}",
                        failure.predicate, failure.rule_id, failure.message
                    );
                }
            }
        }
    }

    Ok(())
}

fn load_engine(config: &KeelConfig) -> anyhow::Result<RuleEngine> {
    let rules = load_rules(&config.rules_file)?;
    RuleEngine::new(rules, &PredicateRegistry::with_builtins())
        .with_context(|| format!("invalid rules in {}", config.rules_file.display()))
}

/// Audit outcome recorded for a rule decision.
pub fn outcome_for(action: RuleAction) -> AuditOutcome {
    match action {
        RuleAction::Allow => AuditOutcome::Allowed,
        RuleAction::RequireApproval => AuditOutcome::ApprovalRequested,
        RuleAction::Block => AuditOutcome::Blocked,
    }
}

fn parse_params(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("--params must be valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--params must be a JSON object, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn outcomes_follow_actions() {
        assert_eq!(outcome_for(RuleAction::Allow), AuditOutcome::Allowed);
        assert_eq!(outcome_for(RuleAction::RequireApproval), AuditOutcome::ApprovalRequested);
        assert_eq!(outcome_for(RuleAction::Block), AuditOutcome::Blocked);
    }

    #[test]
    fn params_must_be_an_object() {
        assert_eq!(parse_params(r#"{"to": "a@b.c"}"#).unwrap()["to"], "a@b.c");
        assert!(parse_params("[1, 2]").is_err());
        assert!(parse_params("not json").is_err());
    }

    #[test]
    fn check_writes_policy_audit_entry() {
        let dir = tempdir().unwrap();
        let config = KeelConfig::for_project(dir.path());
        let cmd = RulesCommands::Check {
            tool: "shell".into(),
            url: None,
            command: Some("sudo reboot".into()),
            action: None,
            categories: vec![],
            params: Some(r#"{"password": "hunter2"}"#.into()),
            task: Some("task-1".into()),
            json: true,
        };
        execute(&cmd, &config).unwrap();

        let log = TaskEventLog::open(&config.audit_dir).unwrap();
        let events = log.read_task("task-1").unwrap();
        assert_eq!(events.len(), 1);
        let record = events[0].audit_record().unwrap();
        assert_eq!(record.category, AuditCategory::PolicyCheck);
        assert_eq!(record.outcome, AuditOutcome::Blocked);
        assert_eq!(
            record.triggered_rules.as_deref(),
            Some(&["dangerous-system-commands".to_string()][..])
        );
        assert_eq!(record.redacted_params.as_ref().unwrap()["password"], "[REDACTED]");
    }

    #[test]
    fn operator_rules_file_is_loaded() {
        let dir = tempdir().unwrap();
        let config = KeelConfig::for_project(dir.path());
        std::fs::create_dir_all(config.rules_file.parent().unwrap()).unwrap();
        std::fs::write(
            &config.rules_file,
            r#"
include_builtins: false
rules:
  - id: no-prod-deploys
    name: Production deploys
    category: deploy
    action: block
    command_patterns: ['\bdeploy\b.*--prod']
"#,
        )
        .unwrap();

        let engine = load_engine(&config).unwrap();
        assert_eq!(engine.rules().len(), 1);
        let decision = engine.evaluate(&RuleMatchContext::new("shell").with_command("make deploy --prod"));
        assert!(decision.is_blocked());
    }
}
