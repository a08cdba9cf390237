//! `strongbox-vault`: backup, restore and external-store sync for Strongbox.
//!
//! Builds portable (optionally enveloped) backup bundles, restores them
//! while tolerating damaged members and older tabular exports, and writes
//! vault records into external password containers with a verified,
//! rollback-safe commit.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod clock;
pub mod error;
pub mod strategy;

pub mod codec;
pub mod entities;
pub mod report;

pub mod legacy;

pub mod bundle;

pub mod config;
pub mod guard;
pub mod remote;
pub mod service;

pub mod external;

pub use bundle::{
    build, restore, BackupSelection, BuildOptions, BuiltBundle, RestoreContext, RestoredBundle,
    VaultSnapshot,
};
pub use codec::{decode, encode, CodecError};
pub use config::{EncryptionSettings, EngineConfig};
pub use entities::{
    Category, CommonAccountInfo, Credential, EntityKind, GeneratedPassword, LoginType,
    OperationLogEntry, SecureItem, SecureItemKind, TrashedCredential, TrashedItem, VaultEntity,
};
pub use error::VaultError;
pub use external::{
    ContainerCodec, ContainerCredentials, ExternalStore, ExternalStoreError, KdbxCodec, Location,
    SealedContainerCodec, SyncSummary,
};
pub use guard::{BackupGuard, BackupPermit};
pub use legacy::{detect_format, import_credentials, import_secure_items, LegacyFormat};
pub use remote::{InMemoryRemoteStore, RemoteFile, RemoteStore, TransportError};
pub use report::{FailedItem, ItemClass, ItemCounts, ReconciliationReport};
pub use service::{BackupFile, BackupService, UploadRequest, UploadedBackup};
