//! Load, edit, re-encode, verify and commit an external container.
//!
//! Each operation runs a fresh [`Transaction`] against whatever is on disk
//! now; nothing is cached between calls because another application may
//! have changed the container in the meantime. The transaction's state is
//! part of its type, so committing bytes that were never verified does not
//! compile.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::codec::{ContainerCodec, ContainerCredentials};
use super::kdbx::KdbxCodec;
use super::matcher::{
    credential_entry, matches_credential, matches_secure_item, read_credential, read_secure_item,
    secure_item_entry, ExternalCredential, ExternalSecureItem,
};
use super::storage::{commit_local, commit_provider, FileSystem, ProviderStorage, StdFileSystem};
use super::tree::{path_segments, rebuild, Container, Entry, Group};
use super::ExternalStoreError;
use crate::clock::now_millis;
use crate::entities::{Credential, SecureItem};

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Where a container lives.
pub enum Location {
    /// A file this process may rename and replace.
    Local {
        /// Container file.
        path: PathBuf,
        /// Filesystem access.
        fs: Box<dyn FileSystem>,
    },
    /// A document owned by another application.
    Provider(Box<dyn ProviderStorage>),
}

impl Location {
    /// A local file accessed through `std::fs`.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local {
            path: path.into(),
            fs: Box::new(StdFileSystem),
        }
    }

    /// A local file accessed through `fs`.
    pub fn local_with(path: impl Into<PathBuf>, fs: impl FileSystem + 'static) -> Self {
        Self::Local {
            path: path.into(),
            fs: Box::new(fs),
        }
    }

    /// A provider-owned document.
    pub fn provider(storage: impl ProviderStorage + 'static) -> Self {
        Self::Provider(Box::new(storage))
    }

    fn read(&self) -> Result<Vec<u8>, ExternalStoreError> {
        match self {
            Self::Local { path, fs } => {
                if !fs.exists(path) {
                    return Err(ExternalStoreError::DatabaseMissing(display(path)));
                }
                Ok(fs.read(path)?)
            }
            Self::Provider(storage) => storage.read().map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ExternalStoreError::DatabaseMissing("provider document".into())
                } else {
                    ExternalStoreError::Io(e)
                }
            }),
        }
    }

    fn commit(&self, bytes: &[u8]) -> Result<(), ExternalStoreError> {
        match self {
            Self::Local { path, fs } => commit_local(fs.as_ref(), path, bytes),
            Self::Provider(storage) => commit_provider(storage.as_ref(), bytes),
        }
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Container decoded from storage.
pub struct Loaded {
    container: Container,
}

/// Container edited in memory.
pub struct Mutated {
    container: Container,
}

/// Edited container encoded to bytes.
pub struct Encoded {
    container: Container,
    bytes: Vec<u8>,
}

/// Bytes shown to decode back under the same credentials.
pub struct Verified {
    container: Container,
    bytes: Vec<u8>,
}

/// One load-to-commit cycle; `S` is the current state.
pub struct Transaction<'s, S> {
    store: &'s ExternalStore,
    state: S,
}

impl<'s> Transaction<'s, Loaded> {
    /// The container as loaded.
    #[must_use]
    pub const fn container(&self) -> &Container {
        &self.state.container
    }

    /// Apply an edit. `edit` receives the loaded container and returns
    /// the edited copy plus a result for the caller.
    pub fn mutate<T>(self, edit: impl FnOnce(&Container) -> (Container, T)) -> (Transaction<'s, Mutated>, T) {
        let (container, result) = edit(&self.state.container);
        (
            Transaction {
                store: self.store,
                state: Mutated { container },
            },
            result,
        )
    }
}

impl<'s> Transaction<'s, Mutated> {
    /// Encode the edited container.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalStoreError::Encode`] if the codec fails.
    pub fn encode(self) -> Result<Transaction<'s, Encoded>, ExternalStoreError> {
        let bytes = self
            .store
            .codec
            .encode(&self.state.container, &self.store.credentials)?;
        debug!(bytes = bytes.len(), "container encoded");
        Ok(Transaction {
            store: self.store,
            state: Encoded {
                container: self.state.container,
                bytes,
            },
        })
    }
}

impl<'s> Transaction<'s, Encoded> {
    /// Decode the new bytes again before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalStoreError::VerificationFailed`] if the bytes do
    /// not decode or decode to a different number of entries.
    pub fn verify(self) -> Result<Transaction<'s, Verified>, ExternalStoreError> {
        let decoded = self
            .store
            .codec
            .decode(&self.state.bytes, &self.store.credentials)
            .map_err(|e| ExternalStoreError::VerificationFailed(e.to_string()))?;
        let expected = self.state.container.root.entry_count();
        let found = decoded.root.entry_count();
        if found != expected {
            return Err(ExternalStoreError::VerificationFailed(format!(
                "expected {expected} entries, decoded {found}"
            )));
        }
        debug!(entries = found, "container verified");
        Ok(Transaction {
            store: self.store,
            state: Verified {
                container: self.state.container,
                bytes: self.state.bytes,
            },
        })
    }
}

impl Transaction<'_, Verified> {
    /// Replace the stored container. Returns the committed tree.
    ///
    /// # Errors
    ///
    /// Returns [`ExternalStoreError::Commit`] if storage rejects the write.
    pub fn commit(self) -> Result<Container, ExternalStoreError> {
        self.store.location.commit(&self.state.bytes)?;
        Ok(self.state.container)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// How many entries an add-or-update call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Existing entries rewritten in place.
    pub updated: usize,
    /// New entries inserted.
    pub added: usize,
}

/// An external container plus the credentials that open it.
///
/// Callers must not run two operations against the same container at
/// once; nothing here coordinates concurrent writers.
pub struct ExternalStore {
    location: Location,
    codec: Box<dyn ContainerCodec>,
    credentials: ContainerCredentials,
}

impl ExternalStore {
    /// A store at `location` reading and writing KDBX.
    #[must_use]
    pub fn new(location: Location, credentials: ContainerCredentials) -> Self {
        Self {
            location,
            codec: Box::new(KdbxCodec::new()),
            credentials,
        }
    }

    /// Use `codec` instead of the default.
    #[must_use]
    pub fn with_codec(mut self, codec: impl ContainerCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    /// Read and decode the container.
    ///
    /// # Errors
    ///
    /// [`ExternalStoreError::DatabaseMissing`], [`ExternalStoreError::WrongPassword`]
    /// or [`ExternalStoreError::CorruptContainer`].
    pub fn load(&self) -> Result<Transaction<'_, Loaded>, ExternalStoreError> {
        let bytes = self.location.read()?;
        let container = self.codec.decode(&bytes, &self.credentials)?;
        debug!(entries = container.root.entry_count(), "container loaded");
        Ok(Transaction {
            store: self,
            state: Loaded { container },
        })
    }

    /// Write a new, empty container named `name`, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Encode, verification or commit failures.
    pub fn create(&self, name: &str) -> Result<(), ExternalStoreError> {
        Transaction {
            store: self,
            state: Mutated {
                container: Container::new(name),
            },
        }
        .encode()?
        .verify()?
        .commit()?;
        info!(name, "external container created");
        Ok(())
    }

    fn apply<T>(
        &self,
        operation: &'static str,
        edit: impl FnOnce(&Container) -> (Container, T),
    ) -> Result<T, ExternalStoreError> {
        let (tx, result) = self.load()?.mutate(edit);
        let committed = tx.encode()?.verify()?.commit()?;
        info!(operation, entries = committed.root.entry_count(), "external container updated");
        Ok(result)
    }

    /// Open the container and count its entries.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn verify(&self) -> Result<usize, ExternalStoreError> {
        Ok(self.load()?.container().root.entry_count())
    }

    /// Credentials stored in the container.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn read_entries(&self) -> Result<Vec<ExternalCredential>, ExternalStoreError> {
        let tx = self.load()?;
        Ok(tx
            .container()
            .root
            .entries_with_paths()
            .into_iter()
            .filter_map(|(path, entry)| read_credential(entry, path))
            .collect())
    }

    /// Secure items stored in the container.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn read_secure_items(&self) -> Result<Vec<ExternalSecureItem>, ExternalStoreError> {
        let tx = self.load()?;
        Ok(tx
            .container()
            .root
            .entries_with_paths()
            .into_iter()
            .filter_map(|(path, entry)| read_secure_item(entry, path))
            .collect())
    }

    /// Update each credential's first matching entry in place, or insert
    /// it under `group_path` (the root when `None`).
    ///
    /// # Errors
    ///
    /// Load, encode, verification or commit failures. Nothing is written
    /// unless the new container decodes.
    pub fn add_or_update_credentials(
        &self,
        credentials: &[Credential],
        group_path: Option<&str>,
    ) -> Result<SyncSummary, ExternalStoreError> {
        let now = now_millis();
        self.apply("add_or_update_credentials", |container| {
            let mut summary = SyncSummary::default();
            let root = credentials.iter().fold(container.root.clone(), |root, credential| {
                upsert(
                    &root,
                    |e| matches_credential(e, credential),
                    |existing| credential_entry(existing, credential, now),
                    group_path,
                    &mut summary,
                )
            });
            (container.with_root(root), summary)
        })
    }

    /// Remove every entry matching any of `credentials`. Returns the
    /// number removed.
    ///
    /// # Errors
    ///
    /// Same as [`add_or_update_credentials`](Self::add_or_update_credentials).
    pub fn delete_credentials(&self, credentials: &[Credential]) -> Result<usize, ExternalStoreError> {
        self.apply("delete_credentials", |container| {
            let mut removed = 0usize;
            let root = credentials.iter().fold(container.root.clone(), |root, credential| {
                let (root, n) = remove_matching(&root, |e| matches_credential(e, credential));
                removed = removed.saturating_add(n);
                root
            });
            (container.with_root(root), removed)
        })
    }

    /// Secure-item counterpart of
    /// [`add_or_update_credentials`](Self::add_or_update_credentials).
    ///
    /// # Errors
    ///
    /// Same as [`add_or_update_credentials`](Self::add_or_update_credentials).
    pub fn add_or_update_secure_items(
        &self,
        items: &[SecureItem],
        group_path: Option<&str>,
    ) -> Result<SyncSummary, ExternalStoreError> {
        let now = now_millis();
        self.apply("add_or_update_secure_items", |container| {
            let mut summary = SyncSummary::default();
            let root = items.iter().fold(container.root.clone(), |root, item| {
                upsert(
                    &root,
                    |e| matches_secure_item(e, item),
                    |existing| secure_item_entry(existing, item, now),
                    group_path,
                    &mut summary,
                )
            });
            (container.with_root(root), summary)
        })
    }

    /// Remove every entry matching any of `items`. Returns the number
    /// removed.
    ///
    /// # Errors
    ///
    /// Same as [`add_or_update_credentials`](Self::add_or_update_credentials).
    pub fn delete_secure_items(&self, items: &[SecureItem]) -> Result<usize, ExternalStoreError> {
        self.apply("delete_secure_items", |container| {
            let mut removed = 0usize;
            let root = items.iter().fold(container.root.clone(), |root, item| {
                let (root, n) = remove_matching(&root, |e| matches_secure_item(e, item));
                removed = removed.saturating_add(n);
                root
            });
            (container.with_root(root), removed)
        })
    }
}

fn upsert(
    root: &Group,
    matches: impl Fn(&Entry) -> bool,
    build: impl Fn(Option<&Entry>) -> Entry,
    group_path: Option<&str>,
    summary: &mut SyncSummary,
) -> Group {
    let Some(uuid) = root.find_first(&matches).map(|e| e.uuid) else {
        summary.added = summary.added.saturating_add(1);
        let path = path_segments(group_path.unwrap_or_default());
        return root.with_entry_at(&path, build(None));
    };
    let (rebuilt, _) = rebuild(root, &|e: &Entry| e.uuid == uuid, &mut |e: &Entry| {
        Some(build(Some(e)))
    });
    summary.updated = summary.updated.saturating_add(1);
    rebuilt
}

fn remove_matching(root: &Group, matches: impl Fn(&Entry) -> bool) -> (Group, usize) {
    rebuild(root, &matches, &mut |_: &Entry| None)
}
