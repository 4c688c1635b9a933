// lock.rs — Advisory lock shared by every process that opens a store.
//
// The lock lives in `.{name}.lock` beside the store file rather than on the
// store itself, because the store is replaced by rename on every write and
// a lock on the old inode would guard nothing. Readers take it shared,
// writers exclusive. Dropping the guard closes the descriptor, which
// releases the lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::CredentialError;

#[derive(Debug)]
pub(crate) struct StoreLock {
    _file: File,
}

impl StoreLock {
    pub(crate) fn shared(store_path: &Path) -> Result<Self, CredentialError> {
        Self::acquire(store_path, false)
    }

    pub(crate) fn exclusive(store_path: &Path) -> Result<Self, CredentialError> {
        Self::acquire(store_path, true)
    }

    fn acquire(store_path: &Path, exclusive: bool) -> Result<Self, CredentialError> {
        let path = lock_path(store_path);
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path).map_err(|source| CredentialError::Io {
            path: path.clone(),
            source,
        })?;
        flock(&file, exclusive).map_err(|source| CredentialError::Io { path, source })?;
        Ok(Self { _file: file })
    }
}

pub(crate) fn lock_path(store_path: &Path) -> PathBuf {
    let file_name = store_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials.json".to_string());
    store_path.with_file_name(format!(".{}.lock", file_name))
}

#[cfg(unix)]
fn flock(file: &File, exclusive: bool) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let op = if exclusive { libc::LOCK_EX } else { libc::LOCK_SH };
    loop {
        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

// Other platforms rely on the per-handle mutex and the reload before every
// write.
#[cfg(not(unix))]
fn flock(_file: &File, _exclusive: bool) -> std::io::Result<()> {
    Ok(())
}
