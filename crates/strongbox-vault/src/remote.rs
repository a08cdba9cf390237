//! Remote file store the backup service uploads bundles to.
//!
//! The real transport (WebDAV or similar) lives outside this crate; the
//! engine only sees [`RemoteStore`]. Paths are `/`-separated and relative
//! to the store root.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use crate::clock::now_millis;
use crate::strategy::{first_success, Strategy};

/// Errors raised by a remote store. Surfaced to callers unmodified.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The path does not exist on the remote.
    #[error("remote path not found: {0}")]
    NotFound(String),

    /// The remote refused or could not complete the request.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// Local I/O failure while talking to the remote.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// File name without the directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification, epoch milliseconds.
    pub modified_millis: i64,
}

/// Transport collaborator contract.
pub trait RemoteStore: Send + Sync {
    /// Whether `path` exists (file or directory).
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the remote cannot be reached.
    fn exists(&self, path: &str) -> Result<bool, TransportError>;

    /// Files directly inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the remote cannot be reached.
    fn list(&self, dir: &str) -> Result<Vec<RemoteFile>, TransportError>;

    /// Create or replace the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the upload fails.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), TransportError>;

    /// Download the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] for a missing file.
    fn get(&self, path: &str) -> Result<Vec<u8>, TransportError>;

    /// Delete the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] for a missing file.
    fn delete(&self, path: &str) -> Result<(), TransportError>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] when `from` is missing.
    fn move_to(&self, from: &str, to: &str) -> Result<(), TransportError>;
}

/// Join a directory and a file name with exactly one `/`.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

// ---------------------------------------------------------------------------
// Connection probe
// ---------------------------------------------------------------------------

/// Marker written and removed by the last probe strategy.
pub const PROBE_FILE: &str = ".strongbox_test";

/// Input of the connection probe strategies.
pub struct Probe<'a> {
    /// Store under test.
    pub store: &'a dyn RemoteStore,
    /// Backup directory on the store.
    pub dir: &'a str,
}

fn probe_exists(probe: &Probe<'_>) -> Result<(), TransportError> {
    if probe.store.exists(probe.dir)? {
        Ok(())
    } else {
        Err(TransportError::NotFound(probe.dir.to_string()))
    }
}

fn probe_list(probe: &Probe<'_>) -> Result<(), TransportError> {
    probe.store.list(probe.dir).map(|_| ())
}

fn probe_write(probe: &Probe<'_>) -> Result<(), TransportError> {
    let path = join_path(probe.dir, PROBE_FILE);
    probe.store.put(&path, b"ok")?;
    probe.store.delete(&path)
}

/// Probe order: cheapest read first, a write round trip last.
#[must_use]
pub fn probe_strategies<'a>() -> [Strategy<Probe<'a>, (), TransportError>; 3] {
    [
        Strategy {
            name: "exists",
            run: probe_exists,
        },
        Strategy {
            name: "list",
            run: probe_list,
        },
        Strategy {
            name: "put-delete",
            run: probe_write,
        },
    ]
}

/// Check that `dir` on `store` is usable.
///
/// Returns the name of the strategy that succeeded.
///
/// # Errors
///
/// Returns the error of the last strategy when every strategy fails.
pub fn test_connection(store: &dyn RemoteStore, dir: &str) -> Result<&'static str, TransportError> {
    let probe = Probe { store, dir };
    match first_success(&probe, &probe_strategies()) {
        Ok((name, ())) => {
            debug!(strategy = name, "remote store reachable");
            Ok(name)
        }
        Err(attempts) => {
            for (name, err) in &attempts.failures {
                debug!(strategy = *name, error = %err, "connection probe failed");
            }
            Err(attempts
                .into_last()
                .unwrap_or_else(|| TransportError::Unavailable("no probe ran".into())))
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredFile {
    bytes: Vec<u8>,
    modified_millis: i64,
}

/// A [`RemoteStore`] kept in process memory.
///
/// Directories exist implicitly while they hold a file, or explicitly
/// after [`create_dir`](Self::create_dir).
#[derive(Debug)]
pub struct InMemoryRemoteStore {
    files: Mutex<BTreeMap<String, StoredFile>>,
    dirs: Mutex<Vec<String>>,
}

impl InMemoryRemoteStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty directory.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the store lock is poisoned.
    pub fn create_dir(&self, dir: &str) -> Result<(), TransportError> {
        let mut dirs = self.dirs.lock().map_err(|_| poisoned())?;
        let dir = dir.trim_end_matches('/').to_string();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
        Ok(())
    }

    /// Store a file with an explicit modification time.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the store lock is poisoned.
    pub fn put_at(&self, path: &str, bytes: &[u8], modified_millis: i64) -> Result<(), TransportError> {
        self.files.lock().map_err(|_| poisoned())?.insert(
            path.to_string(),
            StoredFile {
                bytes: bytes.to_vec(),
                modified_millis,
            },
        );
        Ok(())
    }

    /// Every stored path, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the store lock is poisoned.
    pub fn paths(&self) -> Result<Vec<String>, TransportError> {
        Ok(self
            .files
            .lock()
            .map_err(|_| poisoned())?
            .keys()
            .cloned()
            .collect())
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> TransportError {
    TransportError::Unavailable("mutex poisoned".to_string())
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

impl RemoteStore for InMemoryRemoteStore {
    fn exists(&self, path: &str) -> Result<bool, TransportError> {
        let path = path.trim_end_matches('/');
        let files = self.files.lock().map_err(|_| poisoned())?;
        if files.contains_key(path) || files.keys().any(|p| parent_of(p) == path) {
            return Ok(true);
        }
        drop(files);
        Ok(self
            .dirs
            .lock()
            .map_err(|_| poisoned())?
            .iter()
            .any(|d| d == path))
    }

    fn list(&self, dir: &str) -> Result<Vec<RemoteFile>, TransportError> {
        if !self.exists(dir)? {
            return Err(TransportError::NotFound(dir.to_string()));
        }
        let dir = dir.trim_end_matches('/');
        let files = self.files.lock().map_err(|_| poisoned())?;
        Ok(files
            .iter()
            .filter(|(path, _)| parent_of(path) == dir)
            .map(|(path, file)| RemoteFile {
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                size: u64::try_from(file.bytes.len()).unwrap_or(u64::MAX),
                modified_millis: file.modified_millis,
            })
            .collect())
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), TransportError> {
        self.put_at(path, bytes, now_millis())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.files
            .lock()
            .map_err(|_| poisoned())?
            .get(path)
            .map(|file| file.bytes.clone())
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.files
            .lock()
            .map_err(|_| poisoned())?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }

    fn move_to(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let mut files = self.files.lock().map_err(|_| poisoned())?;
        let file = files
            .remove(from)
            .ok_or_else(|| TransportError::NotFound(from.to_string()))?;
        files.insert(to.to_string(), file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = InMemoryRemoteStore::new();
        store.put("backups/a.zip", b"abc").unwrap();
        assert_eq!(store.get("backups/a.zip").unwrap(), b"abc");
        assert!(store.exists("backups").unwrap());
        assert!(store.exists("backups/a.zip").unwrap());

        store.delete("backups/a.zip").unwrap();
        assert!(matches!(store.get("backups/a.zip"), Err(TransportError::NotFound(_))));
        assert!(matches!(store.delete("backups/a.zip"), Err(TransportError::NotFound(_))));
    }

    #[test]
    fn list_only_returns_direct_children() {
        let store = InMemoryRemoteStore::new();
        store.put_at("backups/a.zip", b"12345", 10).unwrap();
        store.put_at("backups/old/b.zip", b"1", 20).unwrap();
        store.put_at("other/c.zip", b"1", 30).unwrap();

        let listed = store.list("backups").unwrap();
        assert_eq!(
            listed,
            vec![RemoteFile {
                name: "a.zip".into(),
                size: 5,
                modified_millis: 10,
            }]
        );
        assert!(matches!(store.list("missing"), Err(TransportError::NotFound(_))));
    }

    #[test]
    fn move_keeps_content_and_time() {
        let store = InMemoryRemoteStore::new();
        store.put_at("d/a.zip", b"x", 42).unwrap();
        store.move_to("d/a.zip", "d/b.zip").unwrap();
        assert_eq!(store.paths().unwrap(), vec!["d/b.zip".to_string()]);
        assert_eq!(store.list("d").unwrap()[0].modified_millis, 42);
        assert!(store.move_to("d/a.zip", "d/c.zip").is_err());
    }

    #[test]
    fn join_path_handles_slashes() {
        assert_eq!(join_path("dir/", "a"), "dir/a");
        assert_eq!(join_path("dir", "a"), "dir/a");
        assert_eq!(join_path("", "a"), "a");
    }

    #[test]
    fn probe_uses_cheapest_working_strategy() {
        let store = InMemoryRemoteStore::new();
        store.create_dir("Backups").unwrap();
        assert_eq!(test_connection(&store, "Backups").unwrap(), "exists");
    }

    #[test]
    fn probe_falls_back_to_a_write_round_trip() {
        // A missing directory fails `exists` and `list` but accepts writes.
        let store = InMemoryRemoteStore::new();
        assert_eq!(test_connection(&store, "Fresh").unwrap(), "put-delete");
        assert!(store.paths().unwrap().is_empty());
    }

    #[test]
    fn probe_order_is_fixed() {
        let names: Vec<_> = probe_strategies().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["exists", "list", "put-delete"]);
    }
}
