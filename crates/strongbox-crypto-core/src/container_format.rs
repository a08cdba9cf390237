//! Sealed container framing for native external-store files.
//!
//! # File Layout
//!
//! ```text
//! Magic (4 B) | Header Len (u32 LE) | Header JSON | nonce || ciphertext || tag
//! ```
//!
//! - **Magic**: `b"SBXC"`
//! - **Header**: JSON [`ContainerHeader`] with the format version, Argon2id
//!   parameters, salt and a BLAKE3 key-check value
//! - **Body**: AES-256-GCM over the payload, AAD bound to the format version
//!
//! The key-check value lets [`open`] report a wrong password separately
//! from a damaged body, which plain AES-GCM cannot do.

use crate::error::CryptoError;
use crate::kdf::{self, Argon2idParams};
use crate::memory::SecretBuffer;
use crate::symmetric::{self, SealedData, KEY_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes identifying a sealed container.
pub const MAGIC: &[u8; 4] = b"SBXC";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

const MAGIC_LEN: usize = 4;
const LEN_PREFIX: usize = 4;
const SALT_LEN: usize = 32;
const PAYLOAD_AAD: &[u8] = b"strongbox-container-v1";
const KEY_CHECK_CONTEXT: &[u8] = b"strongbox-container-key-check";
const MIN_FILE_SIZE: usize = MAGIC_LEN + LEN_PREFIX;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Unencrypted container header. Holds no user data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerHeader {
    /// Format version.
    pub version: u8,
    /// Argon2id parameters used to stretch the composite key.
    pub kdf: Argon2idParams,
    /// Argon2id salt.
    pub salt: Vec<u8>,
    /// BLAKE3 keyed hash of a fixed context under the derived key.
    pub key_check: Vec<u8>,
}

/// Returns `true` if `data` starts with the container magic.
#[must_use]
pub fn is_container(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

// ---------------------------------------------------------------------------
// Sealing
// ---------------------------------------------------------------------------

/// Seal `payload` under `composite_key` (see [`kdf::composite_key`]).
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` for invalid Argon2id parameters,
/// `CryptoError::Encryption` if sealing fails, and
/// `CryptoError::ContainerFormat` if the header cannot be framed.
pub fn seal(
    payload: &[u8],
    composite_key: &[u8],
    params: &Argon2idParams,
) -> Result<Vec<u8>, CryptoError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;

    let key = kdf::derive_argon2id(composite_key, &salt, params)?;
    let header = ContainerHeader {
        version: FORMAT_VERSION,
        kdf: params.clone(),
        salt,
        key_check: key_check(&key)?.as_bytes().to_vec(),
    };

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| CryptoError::ContainerFormat(format!("header serialization failed: {e}")))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| CryptoError::ContainerFormat("header too large for u32 length".into()))?;

    let body = symmetric::encrypt(payload, key.expose(), PAYLOAD_AAD)?.to_bytes();

    let capacity = MIN_FILE_SIZE
        .saturating_add(header_json.len())
        .saturating_add(body.len());
    let mut out = Vec::with_capacity(capacity);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&body);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

/// Open a sealed container.
///
/// # Errors
///
/// - `CryptoError::ContainerFormat` for bad magic, framing or version
/// - `CryptoError::WrongPassword` if the key-check value does not match
/// - `CryptoError::Decryption` if the key is right but the body is damaged
pub fn open(data: &[u8], composite_key: &[u8]) -> Result<SecretBuffer, CryptoError> {
    if data.len() < MIN_FILE_SIZE {
        return Err(CryptoError::ContainerFormat(format!(
            "file too short: {} bytes (minimum {MIN_FILE_SIZE})",
            data.len()
        )));
    }
    if !is_container(data) {
        return Err(CryptoError::ContainerFormat("invalid magic bytes".into()));
    }

    let mut len_bytes = [0u8; LEN_PREFIX];
    len_bytes.copy_from_slice(&data[MAGIC_LEN..MIN_FILE_SIZE]);
    let header_len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|_| CryptoError::ContainerFormat("header length exceeds usize".into()))?;
    let header_end = MIN_FILE_SIZE
        .checked_add(header_len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| CryptoError::ContainerFormat("header extends beyond file".into()))?;

    let header: ContainerHeader = serde_json::from_slice(&data[MIN_FILE_SIZE..header_end])
        .map_err(|e| CryptoError::ContainerFormat(format!("invalid header: {e}")))?;
    if header.version > FORMAT_VERSION {
        return Err(CryptoError::ContainerFormat(format!(
            "container version {} is newer than supported version {FORMAT_VERSION}",
            header.version
        )));
    }

    let key = kdf::derive_argon2id(composite_key, &header.salt, &header.kdf)?;
    let stored: [u8; 32] = header
        .key_check
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::ContainerFormat("key-check value has wrong length".into()))?;
    // blake3::Hash equality is constant-time.
    if blake3::Hash::from(stored) != key_check(&key)? {
        return Err(CryptoError::WrongPassword);
    }

    let sealed = SealedData::from_bytes(&data[header_end..])
        .map_err(|e| CryptoError::ContainerFormat(e.to_string()))?;
    symmetric::decrypt(&sealed, key.expose(), PAYLOAD_AAD)
}

fn key_check(key: &SecretBuffer) -> Result<blake3::Hash, CryptoError> {
    let key: &[u8; KEY_LEN] = key
        .expose()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyMaterial("derived key is not 32 bytes".into()))?;
    Ok(blake3::keyed_hash(key, KEY_CHECK_CONTEXT))
}
