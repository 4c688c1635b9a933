// audit.rs — Audit subcommands: verify, tail.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use keel_audit::{AuditError, TaskEventLog};

use crate::config::KeelConfig;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify hash chain integrity of task audit logs.
    Verify {
        /// Only verify this task (defaults to every task log).
        #[arg(long)]
        task: Option<String>,
    },
    /// Show recent audit entries for a task.
    Tail {
        /// Task whose log to show.
        task: String,
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, config: &KeelConfig) -> anyhow::Result<()> {
    if !config.audit_dir.exists() {
        println!("No audit logs found at {}", config.audit_dir.display());
        return Ok(());
    }
    let log = TaskEventLog::open(&config.audit_dir)?;

    match cmd {
        AuditCommands::Verify { task } => {
            let paths = match task {
                Some(task_id) => vec![log.task_path(task_id)?],
                None => task_logs(log.dir())?,
            };

            let mut violations = 0;
            for path in paths.iter().filter(|p| p.exists()) {
                if !verify_one(path)? {
                    violations += 1;
                }
            }
            if violations > 0 {
                println!();
                println!("The audit log may have been tampered with.");
                anyhow::bail!("{} audit log(s) failed integrity check", violations);
            }
        }

        AuditCommands::Tail { task, n } => {
            let events = log.read_task(task)?;
            let start = events.len().saturating_sub(*n);
            let recent = &events[start..];

            if recent.is_empty() {
                println!("No audit events for task {}.", task);
                return Ok(());
            }

            println!(
                "{:<20} {:<16} {:<22} {:<20} REASON",
                "TIMESTAMP", "CATEGORY", "TOOL", "OUTCOME"
            );
            println!("{}", "-".repeat(100));

            for event in recent {
                let Some(record) = event.audit_record() else {
                    continue;
                };
                println!(
                    "{:<20} {:<16} {:<22} {:<20} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    to_label(&record.category),
                    record.tool_name,
                    to_label(&record.outcome),
                    record.reason.as_deref().unwrap_or("-"),
                );
            }
        }
    }

    Ok(())
}

/// Verify one log file, printing the result. Ok(false) on a chain break.
fn verify_one(path: &Path) -> anyhow::Result<bool> {
    match TaskEventLog::verify_chain(path) {
        Ok(_) => {
            let events = TaskEventLog::read_all(path)?;
            println!(
                "{}: {} event(s), hash chain intact.",
                path.display(),
                events.len()
            );
            Ok(true)
        }
        Err(AuditError::IntegrityViolation {
            line,
            expected,
            actual,
        }) => {
            println!("{}: INTEGRITY VIOLATION at line {}:", path.display(), line);
            println!("  Expected previous_hash: {}", expected);
            println!("  Actual previous_hash:   {}", actual);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn task_logs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort();
    Ok(paths)
}

/// snake_case label of a serde enum, for table output.
fn to_label<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_audit::{AuditCategory, AuditEntry, AuditOutcome, AuditTrail};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn seed(config: &KeelConfig) -> TaskEventLog {
        let log = TaskEventLog::open(&config.audit_dir).unwrap();
        let trail = AuditTrail::new(Arc::new(TaskEventLog::open(&config.audit_dir).unwrap()));
        for outcome in [AuditOutcome::Allowed, AuditOutcome::Blocked, AuditOutcome::Allowed] {
            trail
                .write_audit_entry(
                    "task-1",
                    AuditEntry::new(AuditCategory::ToolInvocation, "browser", outcome),
                )
                .unwrap();
        }
        log
    }

    #[test]
    fn verify_passes_on_intact_logs() {
        let dir = tempdir().unwrap();
        let config = KeelConfig::for_project(dir.path());
        seed(&config);
        execute(&AuditCommands::Verify { task: None }, &config).unwrap();
        execute(
            &AuditCommands::Verify {
                task: Some("task-1".into()),
            },
            &config,
        )
        .unwrap();
        execute(
            &AuditCommands::Tail {
                task: "task-1".into(),
                n: 2,
            },
            &config,
        )
        .unwrap();
    }

    #[test]
    fn verify_fails_on_tampered_log() {
        let dir = tempdir().unwrap();
        let config = KeelConfig::for_project(dir.path());
        let log = seed(&config);

        let path = log.task_path("task-1").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        lines.remove(1);
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        assert!(execute(&AuditCommands::Verify { task: None }, &config).is_err());
    }

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(to_label(&AuditOutcome::ApprovalRequested), "approval_requested");
        assert_eq!(to_label(&AuditCategory::PolicyCheck), "policy_check");
    }

    #[test]
    fn missing_audit_dir_is_not_an_error() {
        let dir = tempdir().unwrap();
        let config = KeelConfig::for_project(dir.path());
        execute(&AuditCommands::Verify { task: None }, &config).unwrap();
    }
}
