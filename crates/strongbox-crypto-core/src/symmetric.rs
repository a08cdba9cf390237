//! AES-256-GCM authenticated encryption.
//!
//! - [`encrypt`] seals plaintext under a random nonce into [`SealedData`]
//! - [`decrypt`] authenticates and opens [`SealedData`] into a [`SecretBuffer`]
//!
//! Both the backup envelope and the sealed container format sit on top of
//! this module; neither touches `ring` directly.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum valid serialized length: nonce + empty ciphertext + tag.
const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Nonce, ciphertext and tag of one AES-256-GCM seal.
///
/// Wire format: `nonce (12 bytes) || ciphertext (variable) || tag (16 bytes)`.
#[must_use = "encrypted data must be stored or transmitted"]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedData {
    /// 96-bit random nonce, unique per encryption.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted data (same length as original plaintext).
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl SealedData {
    /// Serialize to wire format: `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = NONCE_LEN
            .saturating_add(self.ciphertext.len())
            .saturating_add(TAG_LEN);
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Deserialize from wire format: `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if the input is shorter than 28 bytes
    /// (12-byte nonce + 0-byte ciphertext + 16-byte tag).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SEALED_LEN {
            return Err(CryptoError::Encryption(format!(
                "sealed data too short: {} bytes (minimum {MIN_SEALED_LEN})",
                bytes.len()
            )));
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);

        let ct_len = bytes
            .len()
            .checked_sub(NONCE_LEN.saturating_add(TAG_LEN))
            .ok_or_else(|| CryptoError::Encryption("sealed data length underflow".into()))?;

        let ct_start = NONCE_LEN;
        let ct_end = ct_start.saturating_add(ct_len);
        let ciphertext = bytes[ct_start..ct_end].to_vec();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[ct_end..]);

        Ok(Self {
            nonce,
            ciphertext,
            tag,
        })
    }
}

// ---------------------------------------------------------------------------
// Core encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under a 32-byte `key` with a fresh `OsRng` nonce.
///
/// `aad` is authenticated but not encrypted and may be empty.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if:
/// - The key is not exactly 32 bytes
/// - The underlying encryption operation fails
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<SealedData, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }

    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let less_safe_key = aead::LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    let Ok(tag) =
        less_safe_key.seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedData {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Authenticate and decrypt `sealed`, returning the plaintext in a
/// [`SecretBuffer`]. `key` and `aad` must match the values used to seal.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is not exactly 32 bytes.
/// Returns `CryptoError::Decryption` if authentication fails (tampered data,
/// wrong key, or wrong AAD).
pub fn decrypt(sealed: &SealedData, key: &[u8], aad: &[u8]) -> Result<SecretBuffer, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }

    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let less_safe_key = aead::LessSafeKey::new(unbound);

    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    // Build ciphertext || tag buffer for open_in_place.
    let mut ct_tag = Vec::with_capacity(sealed.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&sealed.ciphertext);
    ct_tag.extend_from_slice(&sealed.tag);

    let plaintext_slice = less_safe_key
        .open_in_place(nonce, aead::Aad::from(aad), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext_slice)
        .map_err(|e| CryptoError::SecureMemory(format!("secure buffer allocation failed: {e}")))?;
    ct_tag.zeroize();
    Ok(result)
}
