// config.rs — Keel project configuration.
//
// KeelConfig says where Keel keeps its state and how the credential layer is
// tuned. `for_project()` gives the standard `.keel/` layout; `load()` then
// applies any overrides from `.keel/config.toml`. Every key is optional.
// Relative paths in the file are resolved against the project root.
//
// The master secret is never read from this file, only from the
// KEEL_MASTER_KEY environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use keel_credentials::{MasterKey, StoreOptions, DEFAULT_LOG_N};

pub const CONFIG_FILE: &str = "config.toml";
pub const MASTER_KEY_ENV: &str = "KEEL_MASTER_KEY";

#[derive(Debug, Clone, PartialEq)]
pub struct KeelConfig {
    pub project_root: PathBuf,
    /// Encrypted credential store document.
    pub credential_store: PathBuf,
    /// One hash-chained JSONL file per task.
    pub audit_dir: PathBuf,
    /// Approval tasks raised by `request-access`.
    pub inbox_dir: PathBuf,
    /// Operator sensitivity rules (YAML). Missing means built-ins only.
    pub rules_file: PathBuf,
    pub lease_ttl: Duration,
    pub monitor_period: Duration,
    pub checkout_timeout: Duration,
    /// scrypt cost exponent for newly created stores.
    pub kdf_log_n: u8,
}

impl KeelConfig {
    /// Standard `.keel/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let keel_dir = root.join(".keel");
        Self {
            credential_store: keel_dir.join("credentials.json"),
            audit_dir: keel_dir.join("events"),
            inbox_dir: keel_dir.join("inbox"),
            rules_file: keel_dir.join("rules.yaml"),
            lease_ttl: Duration::from_secs(2 * 60 * 60),
            monitor_period: Duration::from_secs(60),
            checkout_timeout: Duration::from_secs(30),
            kdf_log_n: DEFAULT_LOG_N,
            project_root: root,
        }
    }

    /// `for_project()` plus overrides from `.keel/config.toml`, if present.
    pub fn load(project_root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = Self::for_project(project_root);
        let path = config.config_path();
        if !path.exists() {
            return Ok(config);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.apply(file);
        Ok(config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.project_root.join(".keel").join(CONFIG_FILE)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_log_n(self.kdf_log_n)
            .with_default_lease_ttl(self.lease_ttl)
    }

    /// The operator's master secret, from KEEL_MASTER_KEY.
    pub fn master_key(&self) -> anyhow::Result<MasterKey> {
        MasterKey::from_env(MASTER_KEY_ENV)
            .with_context(|| format!("set {} to the credential store master secret", MASTER_KEY_ENV))
    }

    fn apply(&mut self, file: ConfigFile) {
        let root = self.project_root.clone();
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { root.join(p) };

        if let Some(p) = file.paths.credential_store {
            self.credential_store = resolve(p);
        }
        if let Some(p) = file.paths.audit_dir {
            self.audit_dir = resolve(p);
        }
        if let Some(p) = file.paths.inbox_dir {
            self.inbox_dir = resolve(p);
        }
        if let Some(p) = file.paths.rules_file {
            self.rules_file = resolve(p);
        }
        if let Some(secs) = file.credentials.lease_ttl_secs {
            self.lease_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = file.credentials.checkout_timeout_secs {
            self.checkout_timeout = Duration::from_secs(secs);
        }
        if let Some(log_n) = file.credentials.kdf_log_n {
            self.kdf_log_n = log_n;
        }
        if let Some(secs) = file.monitor.period_secs {
            self.monitor_period = Duration::from_secs(secs);
        }
    }
}

/// On-disk shape of `.keel/config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    paths: PathsSection,
    credentials: CredentialsSection,
    monitor: MonitorSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PathsSection {
    credential_store: Option<PathBuf>,
    audit_dir: Option<PathBuf>,
    inbox_dir: Option<PathBuf>,
    rules_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CredentialsSection {
    lease_ttl_secs: Option<u64>,
    checkout_timeout_secs: Option<u64>,
    kdf_log_n: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MonitorSection {
    period_secs: Option<u64>,
}
