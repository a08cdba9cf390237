//! Engine error types for `strongbox-vault`.

use strongbox_crypto_core::{CryptoError, EnvelopeError};
use thiserror::Error;

use crate::remote::TransportError;

/// Errors produced by backup and restore operations.
///
/// Partial-item failures never show up here: they are recorded in the
/// [`ReconciliationReport`](crate::report::ReconciliationReport) and the
/// operation carries on.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Every selection flag was off; nothing was read or written.
    #[error("no backup content selected")]
    NoSelection,

    /// A required collaborator (remote store, passphrase) is not configured.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Another backup-and-upload sequence holds the guard.
    #[error("a backup is already in progress")]
    BackupInProgress,

    /// The bundle is enveloped and no passphrase was supplied.
    #[error("backup is encrypted and a passphrase is required")]
    PassphraseRequired,

    /// The supplied passphrase does not open the bundle.
    #[error("wrong backup passphrase")]
    WrongPassphrase,

    /// The bundle bytes are not a readable archive.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// The archive could not be assembled.
    #[error("export error: {0}")]
    Export(String),

    /// Remote store failure, surfaced unmodified.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EnvelopeError> for VaultError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::WrongPassphrase => Self::WrongPassphrase,
            EnvelopeError::PassphraseRequired => Self::PassphraseRequired,
            EnvelopeError::Corrupt(msg) => Self::CorruptArchive(msg),
            EnvelopeError::Crypto(inner) => Self::Crypto(inner),
        }
    }
}

impl VaultError {
    /// Returns `true` for errors the user can fix by re-entering a passphrase.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(self, Self::PassphraseRequired | Self::WrongPassphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_errors_map_to_credential_errors() {
        let wrong = VaultError::from(EnvelopeError::WrongPassphrase);
        assert!(matches!(wrong, VaultError::WrongPassphrase));
        assert!(wrong.is_credential_error());

        let missing = VaultError::from(EnvelopeError::PassphraseRequired);
        assert!(missing.is_credential_error());

        let corrupt = VaultError::from(EnvelopeError::Corrupt("short".into()));
        assert!(matches!(corrupt, VaultError::CorruptArchive(_)));
        assert!(!corrupt.is_credential_error());
    }
}
