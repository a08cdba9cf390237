//! Whole-file passphrase envelope for backup bundles.
//!
//! # Layout
//!
//! ```text
//! Magic "SBX_ENC_V1" (10 B) | Salt (32 B) | Nonce (12 B) | Ciphertext | Tag (16 B)
//! ```
//!
//! The key is PBKDF2-HMAC-SHA256(passphrase, salt, 100 000 iterations).
//! The magic doubles as AAD so the marker cannot be swapped onto another
//! payload. Detection only looks at the leading bytes and never needs the
//! passphrase.

use crate::error::EnvelopeError;
use crate::kdf::{self, PBKDF2_ITERATIONS};
use crate::memory::Passphrase;
use crate::symmetric::{self, SealedData, NONCE_LEN, TAG_LEN};
use crate::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;

/// Leading marker of an enveloped file.
pub const MAGIC: &[u8; 10] = b"SBX_ENC_V1";

/// Per-envelope random salt length.
pub const SALT_LEN: usize = 32;

/// File-name suffix used for enveloped bundles.
pub const ENCRYPTED_SUFFIX: &str = ".enc.zip";

const HEADER_LEN: usize = MAGIC.len() + SALT_LEN;

/// Smallest well-formed envelope: header, nonce and tag around an empty payload.
const MIN_ENVELOPE_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Returns `true` if `bytes` start with the envelope marker.
#[must_use]
pub fn is_enveloped(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

/// Returns `true` if a file name follows the encrypted-bundle convention.
#[must_use]
pub fn is_encrypted_file_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(ENCRYPTED_SUFFIX)
}

/// Envelope codec with a configurable PBKDF2 cost.
///
/// The iteration count is not stored in the envelope, so both sides must
/// agree on it. [`EnvelopeCodec::default`] uses the production count;
/// lower counts only make sense for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeCodec {
    iterations: u32,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

impl EnvelopeCodec {
    /// Codec with an explicit PBKDF2 iteration count.
    #[must_use]
    pub const fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Seal `plaintext` under `passphrase`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Crypto`] if key derivation or encryption fails.
    pub fn encrypt(&self, plaintext: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, EnvelopeError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;

        let key = kdf::derive_pbkdf2(passphrase.expose(), &salt, self.iterations)?;
        let sealed = symmetric::encrypt(plaintext, key.expose(), MAGIC)?;

        let body = sealed.to_bytes();
        let mut out = Vec::with_capacity(HEADER_LEN.saturating_add(body.len()));
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Open an envelope produced by [`EnvelopeCodec::encrypt`].
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::Corrupt`] if the marker is missing or the input is truncated
    /// - [`EnvelopeError::WrongPassphrase`] if authentication fails
    pub fn decrypt(&self, bytes: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, EnvelopeError> {
        if !is_enveloped(bytes) {
            return Err(EnvelopeError::Corrupt("missing envelope marker".into()));
        }
        if bytes.len() < MIN_ENVELOPE_LEN {
            return Err(EnvelopeError::Corrupt(format!(
                "envelope too short: {} bytes (minimum {MIN_ENVELOPE_LEN})",
                bytes.len()
            )));
        }

        let salt = &bytes[MAGIC.len()..HEADER_LEN];
        let sealed = SealedData::from_bytes(&bytes[HEADER_LEN..])
            .map_err(|e| EnvelopeError::Corrupt(e.to_string()))?;

        let key = kdf::derive_pbkdf2(passphrase.expose(), salt, self.iterations)?;
        let plaintext = symmetric::decrypt(&sealed, key.expose(), MAGIC).map_err(|e| match e {
            CryptoError::Decryption => EnvelopeError::WrongPassphrase,
            other => EnvelopeError::Crypto(other),
        })?;
        Ok(plaintext.expose().to_vec())
    }

    /// Pass plain bytes through untouched; open enveloped bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::PassphraseRequired`] when `bytes` are
    /// enveloped and `passphrase` is `None`, otherwise the errors of
    /// [`EnvelopeCodec::decrypt`].
    pub fn decrypt_if_needed(
        &self,
        bytes: Vec<u8>,
        passphrase: Option<&Passphrase>,
    ) -> Result<Vec<u8>, EnvelopeError> {
        if !is_enveloped(&bytes) {
            return Ok(bytes);
        }
        let passphrase = passphrase.ok_or(EnvelopeError::PassphraseRequired)?;
        self.decrypt(&bytes, passphrase)
    }

    /// Returns `true` if `passphrase` opens the envelope.
    #[must_use]
    pub fn test_passphrase(&self, bytes: &[u8], passphrase: &Passphrase) -> bool {
        self.decrypt(bytes, passphrase).is_ok()
    }
}

/// [`EnvelopeCodec::encrypt`] with the production iteration count.
///
/// # Errors
///
/// See [`EnvelopeCodec::encrypt`].
pub fn encrypt(plaintext: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, EnvelopeError> {
    EnvelopeCodec::default().encrypt(plaintext, passphrase)
}

/// [`EnvelopeCodec::decrypt`] with the production iteration count.
///
/// # Errors
///
/// See [`EnvelopeCodec::decrypt`].
pub fn decrypt(bytes: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, EnvelopeError> {
    EnvelopeCodec::default().decrypt(bytes, passphrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::with_iterations(1_000)
    }

    #[test]
    fn round_trip_under_correct_passphrase() {
        let pass = Passphrase::new("correct horse");
        let sealed = codec().encrypt(b"PK\x03\x04 zip bytes", &pass).expect("encrypt should succeed");
        assert!(is_enveloped(&sealed));
        let opened = codec().decrypt(&sealed, &pass).expect("decrypt should succeed");
        assert_eq!(opened, b"PK\x03\x04 zip bytes");
    }

    #[test]
    fn wrong_passphrase_is_distinguished() {
        let sealed = codec()
            .encrypt(b"data", &Passphrase::new("right"))
            .expect("encrypt should succeed");
        let result = codec().decrypt(&sealed, &Passphrase::new("wrong"));
        assert!(matches!(result, Err(EnvelopeError::WrongPassphrase)));
        assert!(!codec().test_passphrase(&sealed, &Passphrase::new("wrong")));
        assert!(codec().test_passphrase(&sealed, &Passphrase::new("right")));
    }

    #[test]
    fn truncated_envelope_is_corrupt() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 20]);
        let result = codec().decrypt(&bytes, &Passphrase::new("p"));
        assert!(matches!(result, Err(EnvelopeError::Corrupt(_))));
    }

    #[test]
    fn plain_bytes_pass_through() {
        let plain = b"PK\x03\x04plain archive".to_vec();
        assert!(!is_enveloped(&plain));
        let out = codec()
            .decrypt_if_needed(plain.clone(), None)
            .expect("plain bytes should pass through");
        assert_eq!(out, plain);
    }

    #[test]
    fn enveloped_bytes_without_passphrase_require_one() {
        let sealed = codec()
            .encrypt(b"data", &Passphrase::new("p"))
            .expect("encrypt should succeed");
        let result = codec().decrypt_if_needed(sealed, None);
        assert!(matches!(result, Err(EnvelopeError::PassphraseRequired)));
    }

    #[test]
    fn salt_makes_each_envelope_unique() {
        let pass = Passphrase::new("p");
        let a = codec().encrypt(b"same", &pass).expect("encrypt should succeed");
        let b = codec().encrypt(b"same", &pass).expect("encrypt should succeed");
        assert_ne!(a, b);
    }

    #[test]
    fn encrypted_file_name_convention() {
        assert!(is_encrypted_file_name("strongbox_backup_20240101_120000.enc.zip"));
        assert!(is_encrypted_file_name("BACKUP.ENC.ZIP"));
        assert!(!is_encrypted_file_name("strongbox_backup_20240101_120000.zip"));
    }
}
