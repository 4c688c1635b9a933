// credential.rs — Credential subcommands: init, add, grant, revoke-grant,
// lease, revoke-lease, purge-leases, list, checkout, request-access.
//
// This is the operator surface for the credential store. `checkout`,
// `list --agent` and `request-access` go through the same agent-facing
// access layer agents use, so they are useful for testing grants.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use zeroize::Zeroizing;

use keel_audit::{AuditTrail, TaskEventLog};
use keel_credentials::{
    CredentialAccess, CredentialError, CredentialStore, MasterKey, NewCredential, TaskInbox,
};

use crate::config::KeelConfig;

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Create a new, empty credential store.
    Init,
    /// Add a credential. The secret is read from stdin unless --secret-env is given.
    Add {
        /// Credential id agents will refer to.
        id: String,
        /// Human-readable name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "api_key")]
        category: String,
        #[arg(long, default_value = "")]
        provider: String,
        /// Read the secret from this environment variable instead of stdin.
        #[arg(long)]
        secret_env: Option<String>,
    },
    /// Give an agent permanent access.
    Grant { id: String, agent: String },
    /// Remove an agent's permanent access.
    RevokeGrant { id: String, agent: String },
    /// Give an agent time-limited access.
    Lease {
        id: String,
        agent: String,
        /// Scope the lease to a task.
        #[arg(long)]
        task: Option<String>,
        /// Lease lifetime in seconds (defaults to the configured TTL).
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Revoke an agent's active leases.
    RevokeLease {
        id: String,
        agent: String,
        /// Only revoke leases scoped to this task.
        #[arg(long)]
        task: Option<String>,
    },
    /// Delete revoked and expired leases.
    PurgeLeases,
    /// List credentials. With --agent, show that agent's access.
    List {
        #[arg(long)]
        agent: Option<String>,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check out a secret as an agent and print it to stdout.
    Checkout {
        id: String,
        #[arg(long)]
        agent: String,
        /// Task to record the checkout against in the audit log.
        #[arg(long)]
        task: Option<String>,
        /// Tool name recorded in the audit log.
        #[arg(long)]
        tool: Option<String>,
    },
    /// File an approval task asking for access on behalf of an agent.
    RequestAccess {
        id: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

pub fn execute(cmd: &CredentialCommands, config: &KeelConfig) -> anyhow::Result<()> {
    let master = config.master_key()?;
    run(cmd, config, master)
}

fn run(cmd: &CredentialCommands, config: &KeelConfig, master: MasterKey) -> anyhow::Result<()> {
    if let CredentialCommands::Init = cmd {
        CredentialStore::create(&config.credential_store, master, config.store_options())?;
        println!(
            "Created credential store at {}",
            config.credential_store.display()
        );
        return Ok(());
    }

    let store = match CredentialStore::open(&config.credential_store, master, config.store_options()) {
        Err(e @ CredentialError::StoreNotFound { .. }) => {
            return Err(anyhow::Error::new(e).context("run `keel credential init` to create a store"));
        }
        opened => Arc::new(opened?),
    };

    match cmd {
        // Handled above.
        CredentialCommands::Init => {}

        CredentialCommands::Add {
            id,
            name,
            category,
            provider,
            secret_env,
        } => {
            let secret = read_secret(secret_env.as_deref())?;
            store.add_credential(NewCredential {
                id: id.clone(),
                name: name.clone().unwrap_or_else(|| id.clone()),
                category: category.clone(),
                provider: provider.clone(),
                secret,
            })?;
            println!("Added credential '{}'", id);
        }

        CredentialCommands::Grant { id, agent } => {
            if store.grant(id, agent)? {
                println!("Granted '{}' to {}", id, agent);
            } else {
                println!("{} already has a grant on '{}'", agent, id);
            }
        }

        CredentialCommands::RevokeGrant { id, agent } => {
            if store.revoke_grant(id, agent)? {
                println!("Revoked grant on '{}' from {}", id, agent);
            } else {
                println!("{} had no grant on '{}'", agent, id);
            }
        }

        CredentialCommands::Lease {
            id,
            agent,
            task,
            ttl_secs,
        } => {
            let lease = store.issue_lease(
                id,
                agent,
                task.as_deref(),
                ttl_secs.map(Duration::from_secs),
            )?;
            println!(
                "Leased '{}' to {} until {} (lease {})",
                id,
                agent,
                format_ms(lease.expires_at_ms),
                lease.lease_id
            );
        }

        CredentialCommands::RevokeLease { id, agent, task } => {
            let revoked = store.revoke_lease(id, agent, task.as_deref())?;
            println!("Revoked {} lease(s) on '{}' for {}", revoked, id, agent);
        }

        CredentialCommands::PurgeLeases => {
            let purged = store.purge_inactive_leases()?;
            println!("Purged {} inactive lease(s)", purged);
        }

        CredentialCommands::List { agent, json } => match agent {
            Some(agent) => {
                let summaries = access(config, store.clone())?.list(agent)?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&summaries)?);
                    return Ok(());
                }
                println!(
                    "{:<20} {:<24} {:<12} {:<7} {:<7} USES",
                    "ID", "NAME", "ACCESS", "GRANTS", "LEASES"
                );
                println!("{}", "-".repeat(80));
                for s in summaries {
                    println!(
                        "{:<20} {:<24} {:<12} {:<7} {:<7} {}",
                        s.id,
                        s.name,
                        s.access.as_str(),
                        s.grant_count,
                        s.active_lease_count,
                        s.usage_count
                    );
                }
            }
            None => {
                let now = keel_credentials::now_ms();
                let credentials = store.credentials()?;
                if credentials.is_empty() {
                    println!("No credentials.");
                    return Ok(());
                }
                println!(
                    "{:<20} {:<24} {:<12} {:<7} {:<7} USES",
                    "ID", "NAME", "PROVIDER", "GRANTS", "LEASES"
                );
                println!("{}", "-".repeat(80));
                for c in credentials {
                    println!(
                        "{:<20} {:<24} {:<12} {:<7} {:<7} {}",
                        c.id,
                        c.name,
                        c.provider,
                        c.grants.len(),
                        c.active_lease_count(now),
                        c.usage_count
                    );
                }
            }
        },

        CredentialCommands::Checkout {
            id,
            agent,
            task,
            tool,
        } => {
            let agent_access = Arc::new(access(config, store.clone())?);
            let rt = tokio::runtime::Runtime::new()?;
            let checkout = rt
                .block_on(agent_access.checkout_with_timeout(
                    id,
                    agent,
                    task.as_deref(),
                    tool.as_deref(),
                    config.checkout_timeout,
                ))
                .inspect_err(|e| {
                    if let Some(audit) = e.denial_audit_failure() {
                        tracing::warn!(error = %audit, "checkout denied and the audit entry was not written");
                    }
                })?;
            if let Err(e) = &checkout.audit {
                tracing::warn!(error = %e, "checkout succeeded but the audit entry was not written");
            }
            println!("{}", checkout.secret());
        }

        CredentialCommands::RequestAccess { id, agent, reason } => {
            let request = access(config, store.clone())?.request_access(id, agent, reason.as_deref())?;
            println!(
                "Access to '{}' requested for {}: approval task {} is pending",
                request.credential_name, agent, request.task.task_id
            );
        }
    }

    Ok(())
}

/// Agent-facing access layer wired to the project's inbox and audit log.
fn access(config: &KeelConfig, store: Arc<CredentialStore>) -> anyhow::Result<CredentialAccess> {
    let inbox = TaskInbox::new(&config.inbox_dir)?;
    let log = TaskEventLog::open(&config.audit_dir)?;
    Ok(CredentialAccess::new(store, Arc::new(inbox)).with_audit(AuditTrail::new(Arc::new(log))))
}

fn read_secret(secret_env: Option<&str>) -> anyhow::Result<Zeroizing<String>> {
    if let Some(var) = secret_env {
        let value = std::env::var(var).with_context(|| format!("{} is not set", var))?;
        return Ok(Zeroizing::new(value));
    }
    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read secret from stdin")?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_credentials::AccessStatus;
    use tempfile::tempdir;

    fn config(root: &std::path::Path) -> KeelConfig {
        let mut config = KeelConfig::for_project(root);
        config.kdf_log_n = 4;
        config
    }

    fn master() -> MasterKey {
        MasterKey::new("cli-test-master").unwrap()
    }

    fn open(config: &KeelConfig) -> CredentialStore {
        CredentialStore::open(&config.credential_store, master(), config.store_options()).unwrap()
    }

    #[test]
    fn operator_workflow() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        std::env::set_var("KEEL_CLI_TEST_SECRET_OPERATOR", "sk-from-env");

        run(&CredentialCommands::Init, &config, master()).unwrap();
        run(
            &CredentialCommands::Add {
                id: "openai".into(),
                name: None,
                category: "api_key".into(),
                provider: "openai".into(),
                secret_env: Some("KEEL_CLI_TEST_SECRET_OPERATOR".into()),
            },
            &config,
            master(),
        )
        .unwrap();
        run(
            &CredentialCommands::Grant {
                id: "openai".into(),
                agent: "agent-1".into(),
            },
            &config,
            master(),
        )
        .unwrap();
        run(
            &CredentialCommands::Lease {
                id: "openai".into(),
                agent: "agent-2".into(),
                task: Some("task-7".into()),
                ttl_secs: Some(60),
            },
            &config,
            master(),
        )
        .unwrap();

        let store = open(&config);
        let c = store.get("openai").unwrap().unwrap();
        assert_eq!(c.name, "openai");
        assert_eq!(c.access_status("agent-1", keel_credentials::now_ms()), AccessStatus::HasGrant);
        assert_eq!(c.access_status("agent-2", keel_credentials::now_ms()), AccessStatus::HasLease);
        drop(store);

        run(
            &CredentialCommands::Checkout {
                id: "openai".into(),
                agent: "agent-2".into(),
                task: Some("task-7".into()),
                tool: None,
            },
            &config,
            master(),
        )
        .unwrap();
        let log = TaskEventLog::open(&config.audit_dir).unwrap();
        assert_eq!(log.read_task("task-7").unwrap().len(), 1);

        run(
            &CredentialCommands::RevokeLease {
                id: "openai".into(),
                agent: "agent-2".into(),
                task: None,
            },
            &config,
            master(),
        )
        .unwrap();
        run(&CredentialCommands::PurgeLeases, &config, master()).unwrap();

        let c = open(&config).get("openai").unwrap().unwrap();
        assert!(c.leases.is_empty());
        assert_eq!(c.usage_count, 1);
    }

    #[test]
    fn checkout_without_access_fails() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        std::env::set_var("KEEL_CLI_TEST_SECRET_DENIED", "sk");
        run(&CredentialCommands::Init, &config, master()).unwrap();
        run(
            &CredentialCommands::Add {
                id: "github".into(),
                name: Some("GitHub token".into()),
                category: "token".into(),
                provider: "github".into(),
                secret_env: Some("KEEL_CLI_TEST_SECRET_DENIED".into()),
            },
            &config,
            master(),
        )
        .unwrap();

        let err = run(
            &CredentialCommands::Checkout {
                id: "github".into(),
                agent: "agent-1".into(),
                task: None,
                tool: None,
            },
            &config,
            master(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("access denied"));

        run(
            &CredentialCommands::RequestAccess {
                id: "github".into(),
                agent: "agent-1".into(),
                reason: Some("open a PR".into()),
            },
            &config,
            master(),
        )
        .unwrap();
        let tasks = TaskInbox::new(&config.inbox_dir).unwrap().list().unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].request.title.contains("GitHub token"));
    }

    #[test]
    fn wrong_master_key_is_refused() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        run(&CredentialCommands::Init, &config, master()).unwrap();
        let err = run(
            &CredentialCommands::PurgeLeases,
            &config,
            MasterKey::new("not-the-key").unwrap(),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("wrong master key"));
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        run(&CredentialCommands::Init, &config, master()).unwrap();
        assert!(run(&CredentialCommands::Init, &config, master()).is_err());
    }
}
