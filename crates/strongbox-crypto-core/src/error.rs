//! Cryptographic error types for `strongbox-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (bad parameters, salt too short, allocation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed: ciphertext tampered or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),

    /// Sealed container framing could not be parsed or produced.
    #[error("container format error: {0}")]
    ContainerFormat(String),

    /// The key-check value in a sealed container did not match the
    /// derived key: the password or key file is wrong.
    #[error("wrong password for sealed container")]
    WrongPassword,
}

/// Errors produced by the whole-file envelope codec.
///
/// A wrong passphrase is kept apart from structural corruption so callers
/// can prompt again instead of reporting data loss.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The payload failed authentication under the supplied passphrase.
    ///
    /// AES-GCM cannot tell a wrong key from a tampered ciphertext, so both
    /// surface here.
    #[error("wrong passphrase or tampered envelope")]
    WrongPassphrase,

    /// The envelope is truncated or structurally invalid.
    #[error("corrupt envelope: {0}")]
    Corrupt(String),

    /// The bytes are enveloped but no passphrase was supplied.
    #[error("envelope is encrypted and a passphrase is required")]
    PassphraseRequired,

    /// Key derivation or encryption failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
