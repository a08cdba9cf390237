//! Committing new container bytes to where the container lives.
//!
//! Local files go through a temp file and a backup copy, so a failure at
//! any step leaves a readable container behind. Provider-owned storage
//! (a document provider, a sync client) exposes no rename, so commits
//! there can only roll back on a best-effort basis: if restoring the
//! original bytes also fails the container may be left damaged.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::ExternalStoreError;

/// Filesystem operations used by the local commit.
pub trait FileSystem: Send + Sync {
    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Create or truncate a file with `bytes`.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
    /// Rename, replacing `to`.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Delete a file.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    fn remove(&self, path: &Path) -> io::Result<()>;
    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;
}

/// [`FileSystem`] over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// `target` with `suffix` appended to the file name.
fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(suffix);
    target.with_file_name(name)
}

/// Temp file used while committing `target`.
#[must_use]
pub fn temp_path(target: &Path) -> PathBuf {
    sibling(target, ".tmp")
}

/// Backup of the previous `target` kept during a commit.
#[must_use]
pub fn backup_path(target: &Path) -> PathBuf {
    sibling(target, ".bak")
}

fn commit_error(step: &str, err: &io::Error) -> ExternalStoreError {
    ExternalStoreError::Commit(format!("{step}: {err}"))
}

/// Replace `target` with `bytes`.
///
/// Steps: write `<target>.tmp`; move the current target to `<target>.bak`
/// (dropping a stale backup first); rename the temp file onto the target;
/// delete the backup. If the final rename fails the bytes are written to
/// the target directly, and if that fails too the backup is moved back.
///
/// # Errors
///
/// Returns [`ExternalStoreError::Commit`] naming the step that failed.
pub fn commit_local(fs: &dyn FileSystem, target: &Path, bytes: &[u8]) -> Result<(), ExternalStoreError> {
    let tmp = temp_path(target);
    let bak = backup_path(target);

    if let Err(e) = fs.write(&tmp, bytes) {
        discard(fs, &tmp);
        return Err(commit_error("write temp file", &e));
    }

    let had_original = fs.exists(target);
    if had_original {
        if fs.exists(&bak) {
            if let Err(e) = fs.remove(&bak) {
                discard(fs, &tmp);
                return Err(commit_error("remove stale backup", &e));
            }
        }
        if let Err(e) = fs.rename(target, &bak) {
            discard(fs, &tmp);
            return Err(commit_error("back up container", &e));
        }
    }

    if let Err(rename_err) = fs.rename(&tmp, target) {
        warn!(error = %rename_err, "temp rename failed, writing container directly");
        if let Err(write_err) = fs.write(target, bytes) {
            if had_original {
                if let Err(e) = fs.rename(&bak, target) {
                    warn!(error = %e, backup = %bak.display(), "could not restore container backup");
                }
            }
            discard(fs, &tmp);
            return Err(commit_error("write container", &write_err));
        }
        discard(fs, &tmp);
    }

    if had_original {
        discard(fs, &bak);
    }
    debug!(path = %target.display(), bytes = bytes.len(), "container committed");
    Ok(())
}

fn discard(fs: &dyn FileSystem, path: &Path) {
    if fs.exists(path) {
        if let Err(e) = fs.remove(path) {
            warn!(path = %path.display(), error = %e, "could not remove leftover file");
        }
    }
}

/// Storage owned by another application, addressed as a single document.
///
/// There is no rename or transaction primitive, so [`commit_provider`]
/// cannot be atomic.
pub trait ProviderStorage: Send + Sync {
    /// Read the whole document.
    ///
    /// # Errors
    ///
    /// `io::ErrorKind::NotFound` when the document does not exist.
    fn read(&self) -> io::Result<Vec<u8>>;

    /// Replace the whole document.
    ///
    /// # Errors
    ///
    /// Any I/O error.
    fn write(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Replace the provider document with `bytes`, writing the previous bytes
/// back if the write fails.
///
/// # Errors
///
/// Returns [`ExternalStoreError::Commit`] when the write fails, whether or
/// not the rollback succeeded.
pub fn commit_provider(storage: &dyn ProviderStorage, bytes: &[u8]) -> Result<(), ExternalStoreError> {
    let original = match storage.read() {
        Ok(original) => Some(original),
        Err(e) => {
            warn!(error = %e, "could not read provider document before writing");
            None
        }
    };

    if let Err(write_err) = storage.write(bytes) {
        let rolled_back = original.is_some_and(|original| match storage.write(&original) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "provider rollback failed");
                false
            }
        });
        return Err(ExternalStoreError::Commit(format!(
            "provider write failed ({}): {write_err}",
            if rolled_back { "rolled back" } else { "not rolled back" }
        )));
    }
    debug!(bytes = bytes.len(), "provider document committed");
    Ok(())
}
