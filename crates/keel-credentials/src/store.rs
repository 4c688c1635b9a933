// store.rs — Encrypted, file-backed credential store.
//
// The store is a single pretty-printed JSON document:
//
//   { "version": 1, "kdf": {logN, r, p, salt}, "sentinel": "...", "credentials": [...] }
//
// The sentinel is a fixed plaintext sealed under the working key. Opening a
// store decrypts it first; a wrong master key is rejected before any
// credential is touched.
//
// Several handles (the CLI, a long-running lease monitor, an agent runtime)
// may have the same file open. Nothing in memory is trusted across calls:
// every read and every mutation first takes the lock file (shared or
// exclusive) and reloads the document from disk. A mutation then clones the
// credentials, mutates the clone, writes the new document to a temp file,
// fsyncs, renames over the target, and only then swaps the in-memory copy.
// A failed write leaves both disk and memory as they were.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::credential::{now_ms, AccessGrant, Credential, Lease};
use crate::crypto::{self, DerivedKey, KdfParams, MasterKey, DEFAULT_LOG_N};
use crate::error::CredentialError;
use crate::lock::StoreLock;

pub const STORE_VERSION: u32 = 1;

/// Plaintext sealed into every store to verify the master key.
pub const SENTINEL_PLAINTEXT: &str = "keel-credential-store:v1";

/// Leases last two hours unless the operator says otherwise.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Tunables for creating and operating a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// scrypt cost exponent used when creating a new store. Existing stores
    /// keep the parameters they were created with.
    pub log_n: u8,
    pub default_lease_ttl: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            log_n: DEFAULT_LOG_N,
            default_lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

impl StoreOptions {
    pub fn with_log_n(mut self, log_n: u8) -> Self {
        self.log_n = log_n;
        self
    }

    pub fn with_default_lease_ttl(mut self, ttl: Duration) -> Self {
        self.default_lease_ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoreDocument {
    version: u32,
    kdf: KdfParams,
    sentinel: String,
    #[serde(default)]
    credentials: Vec<Credential>,
}

/// Operator input for a new credential.
pub struct NewCredential {
    pub id: String,
    pub name: String,
    pub category: String,
    pub provider: String,
    pub secret: Zeroizing<String>,
}

impl std::fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewCredential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("provider", &self.provider)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

pub struct CredentialStore {
    path: PathBuf,
    master: MasterKey,
    kdf: KdfParams,
    default_lease_ttl: Duration,
    doc: Mutex<StoreDocument>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.path)
            .field("default_lease_ttl", &self.default_lease_ttl)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Initialize a new, empty store at `path`. Fails if one already exists.
    pub fn create(
        path: impl AsRef<Path>,
        master: MasterKey,
        options: StoreOptions,
    ) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(CredentialError::StoreExists { path });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CredentialError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let kdf = KdfParams::generate(options.log_n);
        kdf.validate()
            .map_err(|_| CredentialError::InvalidParameters { field: "log_n" })?;
        let key = crypto::derive_key(&master, &kdf)?;
        let sentinel = crypto::seal(&key, SENTINEL_PLAINTEXT.as_bytes())?;
        let doc = StoreDocument {
            version: STORE_VERSION,
            kdf: kdf.clone(),
            sentinel,
            credentials: Vec::new(),
        };
        {
            let _lock = StoreLock::exclusive(&path)?;
            if path.exists() {
                return Err(CredentialError::StoreExists { path });
            }
            write_atomic(&path, &serde_json::to_vec_pretty(&doc)?)?;
        }

        tracing::info!(path = %path.display(), log_n = kdf.log_n, "created credential store");
        Ok(Self {
            path,
            master,
            kdf,
            default_lease_ttl: options.default_lease_ttl,
            doc: Mutex::new(doc),
        })
    }

    /// Open an existing store, verifying the master key against the sentinel.
    pub fn open(
        path: impl AsRef<Path>,
        master: MasterKey,
        options: StoreOptions,
    ) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(CredentialError::StoreNotFound { path });
        }
        let doc = {
            let _lock = StoreLock::shared(&path)?;
            load_document(&path)?
        };
        verify_sentinel(&master, &doc, &path)?;

        tracing::info!(
            path = %path.display(),
            credentials = doc.credentials.len(),
            "opened credential store"
        );
        Ok(Self {
            path,
            master,
            kdf: doc.kdf.clone(),
            default_lease_ttl: options.default_lease_ttl,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_lease_ttl(&self) -> Duration {
        self.default_lease_ttl
    }

    /// Run the (slow) KDF. Never called with the store lock held.
    pub(crate) fn derive_working_key(&self) -> Result<DerivedKey, CredentialError> {
        crypto::derive_key(&self.master, &self.kdf)
    }

    /// Replace the in-memory document with what is on disk now. The caller
    /// holds the lock file.
    fn reload(&self, doc: &mut StoreDocument) -> Result<(), CredentialError> {
        let fresh = load_document(&self.path)?;
        if fresh.kdf != self.kdf {
            return Err(CredentialError::StoreCorrupt {
                path: self.path.clone(),
                reason: "store was re-initialized with new key parameters; reopen it".to_string(),
            });
        }
        if fresh.sentinel != doc.sentinel {
            verify_sentinel(&self.master, &fresh, &self.path)?;
        }
        *doc = fresh;
        Ok(())
    }

    /// Read-only access to the current credentials, as persisted.
    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&[Credential]) -> R,
    ) -> Result<R, CredentialError> {
        let mut doc = self.doc.lock().map_err(|_| CredentialError::LockPoisoned)?;
        {
            let _lock = StoreLock::shared(&self.path)?;
            self.reload(&mut doc)?;
        }
        Ok(f(&doc.credentials))
    }

    /// Read-modify-write under the exclusive lock, against the document as
    /// persisted. Writes only when the closure actually changed something.
    pub(crate) fn update<R>(
        &self,
        f: impl FnOnce(&mut Vec<Credential>) -> Result<R, CredentialError>,
    ) -> Result<R, CredentialError> {
        let mut doc = self.doc.lock().map_err(|_| CredentialError::LockPoisoned)?;
        let _lock = StoreLock::exclusive(&self.path)?;
        self.reload(&mut doc)?;
        let mut working = doc.credentials.clone();
        let out = f(&mut working)?;
        if working != doc.credentials {
            let next = StoreDocument {
                version: doc.version,
                kdf: doc.kdf.clone(),
                sentinel: doc.sentinel.clone(),
                credentials: working,
            };
            write_atomic(&self.path, &serde_json::to_vec_pretty(&next)?)?;
            *doc = next;
        }
        Ok(out)
    }

    /// Snapshot of every credential. Secrets stay sealed.
    pub fn credentials(&self) -> Result<Vec<Credential>, CredentialError> {
        self.read(|creds| creds.to_vec())
    }

    pub fn get(&self, credential_id: &str) -> Result<Option<Credential>, CredentialError> {
        self.read(|creds| creds.iter().find(|c| c.id == credential_id).cloned())
    }

    // ── Operator mutations ──────────────────────────────────────────

    pub fn add_credential(&self, new: NewCredential) -> Result<(), CredentialError> {
        require("credential_id", &new.id)?;
        require("secret", &new.secret)?;

        let key = self.derive_working_key()?;
        let encrypted_value = crypto::seal(&key, new.secret.as_bytes())?;
        let credential = Credential {
            id: new.id.clone(),
            name: new.name,
            category: new.category,
            provider: new.provider,
            encrypted_value,
            grants: Vec::new(),
            leases: Vec::new(),
            usage_count: 0,
            usage_history: Default::default(),
            created_at_ms: now_ms(),
        };

        self.update(|creds| {
            if creds.iter().any(|c| c.id == credential.id) {
                return Err(CredentialError::AlreadyExists {
                    credential_id: credential.id.clone(),
                });
            }
            creds.push(credential);
            Ok(())
        })?;
        tracing::info!(credential_id = %new.id, "added credential");
        Ok(())
    }

    /// Give `agent_id` permanent access. Returns false if it already had it.
    pub fn grant(&self, credential_id: &str, agent_id: &str) -> Result<bool, CredentialError> {
        require("agent_id", agent_id)?;
        let added = self.update(|creds| {
            let c = find_mut(creds, credential_id)?;
            if c.has_grant(agent_id) {
                return Ok(false);
            }
            c.grants.push(AccessGrant {
                agent_id: agent_id.to_string(),
                granted_at_ms: now_ms(),
            });
            Ok(true)
        })?;
        tracing::info!(credential_id, agent_id, added, "grant");
        Ok(added)
    }

    /// Remove a grant. Returns false if there was none.
    pub fn revoke_grant(&self, credential_id: &str, agent_id: &str) -> Result<bool, CredentialError> {
        require("agent_id", agent_id)?;
        let removed = self.update(|creds| {
            let c = find_mut(creds, credential_id)?;
            let before = c.grants.len();
            c.grants.retain(|g| g.agent_id != agent_id);
            Ok(c.grants.len() != before)
        })?;
        tracing::info!(credential_id, agent_id, removed, "revoke grant");
        Ok(removed)
    }

    /// Issue a lease; `ttl` defaults to the store's lease TTL.
    pub fn issue_lease(
        &self,
        credential_id: &str,
        agent_id: &str,
        task_id: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<Lease, CredentialError> {
        require("agent_id", agent_id)?;
        let ttl = ttl.unwrap_or(self.default_lease_ttl);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let lease = Lease::new(agent_id, task_id.map(str::to_string), now_ms(), ttl_ms);

        self.update(|creds| {
            find_mut(creds, credential_id)?.leases.push(lease.clone());
            Ok(())
        })?;
        tracing::info!(
            credential_id,
            agent_id,
            lease_id = %lease.lease_id,
            expires_at_ms = lease.expires_at_ms,
            "issued lease"
        );
        Ok(lease)
    }

    /// Revoke the agent's active leases on a credential, optionally only
    /// those scoped to `task_id`. Returns how many were revoked.
    pub fn revoke_lease(
        &self,
        credential_id: &str,
        agent_id: &str,
        task_id: Option<&str>,
    ) -> Result<usize, CredentialError> {
        require("agent_id", agent_id)?;
        let now = now_ms();
        let revoked = self.update(|creds| {
            let c = find_mut(creds, credential_id)?;
            let mut count = 0;
            for lease in c.leases.iter_mut().filter(|l| {
                l.agent_id == agent_id
                    && l.is_active_at(now)
                    && task_id.map_or(true, |t| l.task_id.as_deref() == Some(t))
            }) {
                lease.revoked_at_ms = Some(now);
                count += 1;
            }
            Ok(count)
        })?;
        tracing::info!(credential_id, agent_id, revoked, "revoke lease");
        Ok(revoked)
    }

    /// Delete leases that are no longer active (revoked or expired).
    pub fn purge_inactive_leases(&self) -> Result<usize, CredentialError> {
        let now = now_ms();
        let purged = self.update(|creds| {
            let mut count = 0;
            for c in creds.iter_mut() {
                let before = c.leases.len();
                c.leases.retain(|l| l.is_active_at(now));
                count += before - c.leases.len();
            }
            Ok(count)
        })?;
        tracing::info!(purged, "purged inactive leases");
        Ok(purged)
    }

    /// Stamp `expired_marked_at_ms` on leases that expired and are not yet
    /// marked. Nothing is deleted.
    pub fn mark_expired_leases(&self, now_ms: i64) -> Result<usize, CredentialError> {
        self.update(|creds| {
            let mut count = 0;
            for lease in creds.iter_mut().flat_map(|c| c.leases.iter_mut()) {
                if lease.revoked_at_ms.is_none()
                    && now_ms >= lease.expires_at_ms
                    && lease.expired_marked_at_ms.is_none()
                {
                    lease.expired_marked_at_ms = Some(now_ms);
                    count += 1;
                }
            }
            Ok(count)
        })
    }
}

/// Read, parse and sanity-check the document. Does not touch the key.
fn load_document(path: &Path) -> Result<StoreDocument, CredentialError> {
    let content = fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            CredentialError::StoreNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CredentialError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let corrupt = |reason: String| CredentialError::StoreCorrupt {
        path: path.to_path_buf(),
        reason,
    };
    let doc: StoreDocument =
        serde_json::from_slice(&content).map_err(|e| corrupt(e.to_string()))?;
    if doc.version != STORE_VERSION {
        return Err(corrupt(format!("unsupported store version {}", doc.version)));
    }
    // Bounded before any derivation: the cost parameters come from the file.
    doc.kdf.validate().map_err(|e| corrupt(e.to_string()))?;
    Ok(doc)
}

/// Derive the key from the document's parameters and open its sentinel.
fn verify_sentinel(
    master: &MasterKey,
    doc: &StoreDocument,
    path: &Path,
) -> Result<(), CredentialError> {
    let key = crypto::derive_key(master, &doc.kdf).map_err(|e| CredentialError::StoreCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let verified = crypto::open(&key, &doc.sentinel)
        .map(|plain| plain.as_slice() == SENTINEL_PLAINTEXT.as_bytes())
        .unwrap_or(false);
    if !verified {
        tracing::warn!(path = %path.display(), "master key rejected by store sentinel");
        return Err(CredentialError::WrongMasterKey {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), CredentialError> {
    if value.trim().is_empty() {
        return Err(CredentialError::InvalidParameters { field });
    }
    Ok(())
}

fn find_mut<'a>(
    creds: &'a mut [Credential],
    credential_id: &str,
) -> Result<&'a mut Credential, CredentialError> {
    creds
        .iter_mut()
        .find(|c| c.id == credential_id)
        .ok_or_else(|| CredentialError::NotFound {
            credential_id: credential_id.to_string(),
        })
}

/// Write to `.{name}.tmp` beside the target, fsync, rename. The temp file is
/// owner-only from the moment it exists.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CredentialError> {
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source: std::io::Error| CredentialError::Io { path: p, source }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials.json".to_string());
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    {
        let mut file = options.open(&temp_path).map_err(io_err(&temp_path))?;
        // `mode` only applies on creation; a stale temp file keeps its bits.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(io_err(&temp_path))?;
        }
        file.write_all(bytes).map_err(io_err(&temp_path))?;
        file.sync_all().map_err(io_err(&temp_path))?;
    }

    fs::rename(&temp_path, path).map_err(io_err(path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_LOG_N: u8 = 4;

    fn options() -> StoreOptions {
        StoreOptions::default().with_log_n(TEST_LOG_N)
    }

    fn master(s: &str) -> MasterKey {
        MasterKey::new(s).unwrap()
    }

    fn new_credential(id: &str, secret: &str) -> NewCredential {
        NewCredential {
            id: id.into(),
            name: format!("{} key", id),
            category: "api_key".into(),
            provider: id.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    #[test]
    fn create_then_open_with_correct_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault").join("credentials.json");
        let store = CredentialStore::create(&path, master("pw"), options()).unwrap();
        store.add_credential(new_credential("openai", "sk-live-abc")).unwrap();
        drop(store);

        let store = CredentialStore::open(&path, master("pw"), options()).unwrap();
        let creds = store.credentials().unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].id, "openai");
        assert_ne!(creds[0].encrypted_value, "sk-live-abc");
    }

    #[test]
    fn wrong_master_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::create(&path, master("right"), options()).unwrap();
        store.add_credential(new_credential("openai", "sk")).unwrap();
        drop(store);

        let err = CredentialStore::open(&path, master("wrong"), options()).unwrap_err();
        assert!(matches!(err, CredentialError::WrongMasterKey { .. }));
    }

    #[test]
    fn corrupt_store_fails_hard() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, b"{ not json").unwrap();
        let err = CredentialStore::open(&path, master("pw"), options()).unwrap_err();
        assert!(matches!(err, CredentialError::StoreCorrupt { .. }));
        // The damaged file is left as-is for the operator.
        assert_eq!(fs::read(&path).unwrap(), b"{ not json");
    }

    #[test]
    fn unsupported_version_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        CredentialStore::create(&path, master("pw"), options()).unwrap();
        let mut doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        doc["version"] = serde_json::json!(99);
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let err = CredentialStore::open(&path, master("pw"), options()).unwrap_err();
        assert!(matches!(err, CredentialError::StoreCorrupt { .. }));
    }

    #[test]
    fn create_refuses_existing_and_open_refuses_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        assert!(matches!(
            CredentialStore::open(&path, master("pw"), options()),
            Err(CredentialError::StoreNotFound { .. })
        ));
        CredentialStore::create(&path, master("pw"), options()).unwrap();
        assert!(matches!(
            CredentialStore::create(&path, master("pw"), options()),
            Err(CredentialError::StoreExists { .. })
        ));
    }

    #[test]
    fn document_layout_and_no_plaintext_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = CredentialStore::create(&path, master("pw"), options()).unwrap();
        store.add_credential(new_credential("github", "ghp_supersecret")).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("ghp_supersecret"));
        assert!(!raw.contains(SENTINEL_PLAINTEXT));
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["kdf"]["logN"], TEST_LOG_N);
        assert_eq!(doc["kdf"]["r"], 8);
        assert_eq!(doc["kdf"]["p"], 1);
        assert!(doc["sentinel"].is_string());
        assert_eq!(doc["credentials"][0]["id"], "github");
        // No temp file left behind.
        assert!(!dir.path().join(".credentials.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        CredentialStore::create(&path, master("pw"), options()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn duplicate_credential_rejected() {
        let dir = tempdir().unwrap();
        let store =
            CredentialStore::create(dir.path().join("c.json"), master("pw"), options()).unwrap();
        store.add_credential(new_credential("openai", "a")).unwrap();
        assert!(matches!(
            store.add_credential(new_credential("openai", "b")),
            Err(CredentialError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn grant_and_revoke_grant() {
        let dir = tempdir().unwrap();
        let store =
            CredentialStore::create(dir.path().join("c.json"), master("pw"), options()).unwrap();
        store.add_credential(new_credential("openai", "a")).unwrap();

        assert!(store.grant("openai", "agent-1").unwrap());
        assert!(!store.grant("openai", "agent-1").unwrap());
        assert_eq!(store.get("openai").unwrap().unwrap().grants.len(), 1);

        assert!(store.revoke_grant("openai", "agent-1").unwrap());
        assert!(!store.revoke_grant("openai", "agent-1").unwrap());
        assert!(matches!(
            store.grant("missing", "agent-1"),
            Err(CredentialError::NotFound { .. })
        ));
        assert!(matches!(
            store.grant("openai", " "),
            Err(CredentialError::InvalidParameters { field: "agent_id" })
        ));
    }

    #[test]
    fn lease_lifecycle() {
        let dir = tempdir().unwrap();
        let store =
            CredentialStore::create(dir.path().join("c.json"), master("pw"), options()).unwrap();
        store.add_credential(new_credential("openai", "a")).unwrap();

        let lease = store.issue_lease("openai", "agent-1", Some("task-1"), None).unwrap();
        assert_eq!(
            lease.expires_at_ms - lease.issued_at_ms,
            DEFAULT_LEASE_TTL.as_millis() as i64
        );
        store.issue_lease("openai", "agent-1", Some("task-2"), None).unwrap();

        // Task-scoped revocation only touches that task's lease.
        assert_eq!(store.revoke_lease("openai", "agent-1", Some("task-1")).unwrap(), 1);
        let c = store.get("openai").unwrap().unwrap();
        assert_eq!(c.active_lease_count(now_ms()), 1);

        assert_eq!(store.revoke_lease("openai", "agent-1", None).unwrap(), 1);
        assert_eq!(store.revoke_lease("openai", "agent-1", None).unwrap(), 0);

        assert_eq!(store.purge_inactive_leases().unwrap(), 2);
        assert!(store.get("openai").unwrap().unwrap().leases.is_empty());
    }

    #[test]
    fn mark_expired_never_deletes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let store = CredentialStore::create(&path, master("pw"), options()).unwrap();
        store.add_credential(new_credential("openai", "a")).unwrap();
        let lease = store
            .issue_lease("openai", "agent-1", None, Some(Duration::from_millis(10)))
            .unwrap();

        let later = lease.expires_at_ms + 1;
        assert_eq!(store.mark_expired_leases(later).unwrap(), 1);
        let c = store.get("openai").unwrap().unwrap();
        assert_eq!(c.leases.len(), 1);
        assert_eq!(c.leases[0].expired_marked_at_ms, Some(later));

        // Second sweep finds nothing new and leaves the file untouched.
        let before = fs::read(&path).unwrap();
        assert_eq!(store.mark_expired_leases(later + 1000).unwrap(), 0);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let store = CredentialStore::create(&path, master("pw"), options()).unwrap();
        store.add_credential(new_credential("openai", "a")).unwrap();

        // A directory squatting on the temp path makes the write fail.
        let temp = dir.path().join(".c.json.tmp");
        fs::create_dir(&temp).unwrap();
        let err = store.grant("openai", "agent-1").unwrap_err();
        assert!(matches!(err, CredentialError::Io { .. }));
        fs::remove_dir(&temp).unwrap();

        assert!(!store.get("openai").unwrap().unwrap().has_grant("agent-1"));
        let reopened = CredentialStore::open(&path, master("pw"), options()).unwrap();
        assert!(!reopened.get("openai").unwrap().unwrap().has_grant("agent-1"));
    }

    #[test]
    fn stale_handle_does_not_resurrect_revoked_lease() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let setup = CredentialStore::create(&path, master("pw"), options()).unwrap();
        setup.add_credential(new_credential("openai", "a")).unwrap();
        let evil = setup.issue_lease("openai", "evil", None, None).unwrap();
        drop(setup);

        // A long-lived handle (the lease monitor) opens first...
        let monitor = CredentialStore::open(&path, master("pw"), options()).unwrap();
        // ...then the operator revokes through another handle and a short
        // lease runs out.
        let operator = CredentialStore::open(&path, master("pw"), options()).unwrap();
        assert_eq!(operator.revoke_lease("openai", "evil", None).unwrap(), 1);
        let short = operator
            .issue_lease("openai", "agent-2", None, Some(Duration::from_millis(1)))
            .unwrap();

        assert_eq!(monitor.mark_expired_leases(short.expires_at_ms + 1).unwrap(), 1);

        let reopened = CredentialStore::open(&path, master("pw"), options()).unwrap();
        let c = reopened.get("openai").unwrap().unwrap();
        let lease = c.leases.iter().find(|l| l.lease_id == evil.lease_id).unwrap();
        assert!(lease.revoked_at_ms.is_some());
        assert!(c.active_lease("evil", now_ms()).is_none());
        let marked = c.leases.iter().find(|l| l.lease_id == short.lease_id).unwrap();
        assert!(marked.expired_marked_at_ms.is_some());
    }

    #[test]
    fn reads_see_other_handles_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let a = CredentialStore::create(&path, master("pw"), options()).unwrap();
        a.add_credential(new_credential("openai", "a")).unwrap();
        let b = CredentialStore::open(&path, master("pw"), options()).unwrap();

        b.grant("openai", "agent-1").unwrap();
        b.add_credential(new_credential("github", "g")).unwrap();
        assert!(a.get("openai").unwrap().unwrap().has_grant("agent-1"));
        assert_eq!(a.credentials().unwrap().len(), 2);

        // And A's next write keeps B's changes.
        a.grant("github", "agent-2").unwrap();
        let c = b.get("openai").unwrap().unwrap();
        assert!(c.has_grant("agent-1"));
        assert!(b.get("github").unwrap().unwrap().has_grant("agent-2"));
    }

    #[test]
    fn reinitialized_store_is_not_written_through_stale_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let stale = CredentialStore::create(&path, master("pw"), options()).unwrap();
        stale.add_credential(new_credential("openai", "a")).unwrap();

        fs::remove_file(&path).unwrap();
        CredentialStore::create(&path, master("other"), options()).unwrap();
        let before = fs::read(&path).unwrap();

        assert!(matches!(
            stale.grant("openai", "agent-1"),
            Err(CredentialError::StoreCorrupt { .. })
        ));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn oversized_kdf_parameters_are_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        CredentialStore::create(&path, master("pw"), options()).unwrap();
        for (field, value) in [("logN", 40u64), ("r", 1 << 24), ("p", 0)] {
            let mut doc: serde_json::Value =
                serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
            let original = doc["kdf"][field].clone();
            doc["kdf"][field] = serde_json::json!(value);
            fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

            let err = CredentialStore::open(&path, master("pw"), options()).unwrap_err();
            assert!(matches!(err, CredentialError::StoreCorrupt { .. }), "{}: {:?}", field, err);

            doc["kdf"][field] = original;
            fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        }
        CredentialStore::open(&path, master("pw"), options()).unwrap();
    }

    #[test]
    fn create_rejects_oversized_log_n() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        assert!(matches!(
            CredentialStore::create(&path, master("pw"), StoreOptions::default().with_log_n(40)),
            Err(CredentialError::InvalidParameters { field: "log_n" })
        ));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn stale_temp_file_is_restricted_before_write() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let store = CredentialStore::create(&path, master("pw"), options()).unwrap();

        let temp = dir.path().join(".c.json.tmp");
        fs::write(&temp, b"leftover").unwrap();
        fs::set_permissions(&temp, fs::Permissions::from_mode(0o644)).unwrap();

        store.add_credential(new_credential("openai", "a")).unwrap();
        assert!(!temp.exists());
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn changes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let store = CredentialStore::create(&path, master("pw"), options()).unwrap();
        store.add_credential(new_credential("openai", "a")).unwrap();
        store.grant("openai", "agent-1").unwrap();
        store.issue_lease("openai", "agent-2", None, None).unwrap();
        drop(store);

        let store = CredentialStore::open(&path, master("pw"), options()).unwrap();
        let c = store.get("openai").unwrap().unwrap();
        assert!(c.has_grant("agent-1"));
        assert!(c.active_lease("agent-2", now_ms()).is_some());
    }
}
