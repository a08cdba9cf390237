//! Transactional writes into an external, password-protected container.
//!
//! Every operation is `load -> mutate -> encode -> verify -> commit`; the
//! stored container is only touched after the new bytes have been decoded
//! again under the same credentials.

pub mod codec;
pub mod kdbx;
pub mod matcher;
pub mod storage;
pub mod tree;
pub mod writer;

use strongbox_crypto_core::CryptoError;
use thiserror::Error;

pub use codec::{ContainerCodec, ContainerCredentials, SealedContainerCodec};
pub use kdbx::KdbxCodec;
pub use matcher::{ExternalCredential, ExternalSecureItem};
pub use storage::{FileSystem, ProviderStorage, StdFileSystem};
pub use tree::{Container, Entry, FieldValue, Group};
pub use writer::{ExternalStore, Location, SyncSummary, Transaction};

/// Errors produced by external-store operations.
#[derive(Debug, Error)]
pub enum ExternalStoreError {
    /// The container file or document does not exist.
    #[error("external database not found: {0}")]
    DatabaseMissing(String),

    /// The password or key file does not open the container.
    #[error("wrong password or key file for external database")]
    WrongPassword,

    /// The container could not be decoded.
    #[error("external database is corrupt: {0}")]
    CorruptContainer(String),

    /// The container could not be encoded.
    #[error("could not encode external database: {0}")]
    Encode(String),

    /// Re-encoded bytes failed to decode; nothing was written.
    #[error("re-encoded database failed verification: {0}")]
    VerificationFailed(String),

    /// Writing the new container failed.
    #[error("could not save external database: {0}")]
    Commit(String),

    /// Key derivation or secure memory failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// I/O error while reading the container.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExternalStoreError {
    /// Returns `true` for errors the user can fix by re-entering credentials.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(self, Self::WrongPassword)
    }
}
