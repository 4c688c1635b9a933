//! # keel
//!
//! Operator command-line interface for Keel agent governance.
//!
//! - `keel rules list/check` — inspect the sensitivity rules and test a tool call
//! - `keel credential ...` — manage the encrypted credential store, grants and leases
//! - `keel audit verify/tail` — inspect per-task audit logs
//! - `keel monitor` — run the lease expiry monitor

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::KeelConfig;

/// Keel — governance for autonomous agents.
#[derive(Parser)]
#[command(name = "keel", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect sensitivity rules and evaluate tool calls against them.
    Rules {
        #[command(subcommand)]
        command: commands::rules::RulesCommands,
    },
    /// Manage credentials, grants and leases.
    Credential {
        #[command(subcommand)]
        command: commands::credential::CredentialCommands,
    },
    /// Inspect per-task audit logs.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Run the lease expiry monitor until interrupted.
    Monitor {
        /// Run a single sweep and exit.
        #[arg(long)]
        once: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("keel=info".parse()?)
                .add_directive("keel_audit=info".parse()?)
                .add_directive("keel_policy=info".parse()?)
                .add_directive("keel_credentials=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = KeelConfig::load(&project_root)?;

    match &cli.command {
        Commands::Rules { command } => commands::rules::execute(command, &config),
        Commands::Credential { command } => commands::credential::execute(command, &config),
        Commands::Audit { command } => commands::audit::execute(command, &config),
        Commands::Monitor { once } => commands::monitor::execute(&config, *once),
    }
}
