//! Passphrase-based key derivation.
//!
//! - [`derive_pbkdf2`]: PBKDF2-HMAC-SHA256, used by the backup envelope
//! - [`derive_argon2id`]: Argon2id, used by sealed external-store containers
//! - [`composite_key`]: folds a password and an optional key file into one
//!   32-byte input, the way KeePass-family containers combine credentials

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Output length of every KDF in this module (256 bits).
pub const OUTPUT_LEN: usize = 32;

/// PBKDF2 iteration count for backup envelopes.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Minimum salt length in bytes.
const MIN_SALT_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Argon2id parameter set, stored in the sealed container header.
///
/// `m_cost` is in KiB, `t_cost` is the iteration count, `p_cost` the lane count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2idParams {
    /// Memory cost in kibibytes.
    pub m_cost: u32,
    /// Number of iterations.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for Argon2idParams {
    /// 64 MiB, 3 passes, 2 lanes: the container default.
    fn default() -> Self {
        Self {
            m_cost: 65_536,
            t_cost: 3,
            p_cost: 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Derive a 256-bit key with PBKDF2-HMAC-SHA256.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if the salt is shorter than 16 bytes
/// or `iterations` is zero.
pub fn derive_pbkdf2(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<SecretBuffer, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }
    if iterations == 0 {
        return Err(CryptoError::KeyDerivation(
            "pbkdf2 iteration count must be non-zero".into(),
        ));
    }

    let mut output = [0u8; OUTPUT_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);

    let result = SecretBuffer::new(&output)
        .map_err(|e| CryptoError::KeyDerivation(format!("secure buffer allocation failed: {e}")));
    output.zeroize();
    result
}

/// Derive a 256-bit key with Argon2id (v0x13).
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if the salt is shorter than 16 bytes,
/// the parameters are rejected by `argon2`, or the derivation fails.
pub fn derive_argon2id(
    password: &[u8],
    salt: &[u8],
    params: &Argon2idParams,
) -> Result<SecretBuffer, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }

    let argon2_params = argon2::Params::new(
        params.m_cost,
        params.t_cost,
        params.p_cost,
        Some(OUTPUT_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = [0u8; OUTPUT_LEN];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2id derivation failed: {e}")))?;

    let result = SecretBuffer::new(&output)
        .map_err(|e| CryptoError::KeyDerivation(format!("secure buffer allocation failed: {e}")));
    output.zeroize();
    result
}

/// Combine a password and an optional key file into a composite key:
/// `SHA-256(SHA-256(password) || SHA-256(key_file))`.
///
/// The key-file component is omitted entirely when absent, so a
/// password-only credential differs from a password plus an empty key file.
///
/// # Errors
///
/// Returns `CryptoError::SecureMemory` if the result cannot be stored.
pub fn composite_key(password: &[u8], key_file: Option<&[u8]>) -> Result<SecretBuffer, CryptoError> {
    let mut outer = Sha256::new();
    outer.update(Sha256::digest(password));
    if let Some(file) = key_file {
        outer.update(Sha256::digest(file));
    }
    let mut digest: [u8; OUTPUT_LEN] = outer.finalize().into();
    let result = SecretBuffer::new(&digest);
    digest.zeroize();
    result
}
