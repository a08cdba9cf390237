//! Secure memory types for key material and passphrases.
//!
//! - [`SecretBuffer`] holds decrypted plaintext and derived keys. It zeroes
//!   on drop, `mlock`s its pages where the platform allows, and masks its
//!   `Debug`/`Display` output.
//! - [`Passphrase`] carries a user passphrase through the engine without it
//!   ever reaching a log line.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use std::fmt;
use zeroize::Zeroize;

// ---------------------------------------------------------------------------
// Page locking
// ---------------------------------------------------------------------------

/// Unlocks its region on drop. Locking is best effort: when `mlock` is
/// refused the region simply stays swappable.
struct LockedRegion {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: the pointer is only handed to mlock/munlock, never dereferenced.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

impl LockedRegion {
    fn try_lock(ptr: *const u8, len: usize) -> Self {
        let locked = platform::try_mlock(ptr, len);
        Self { ptr, len, locked }
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive bytes.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
    lock: LockedRegion,
}

impl SecretBuffer {
    /// Copy `data` into a new locked allocation.
    ///
    /// The caller should zeroize its own copy afterwards.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps allocation failures
    /// reportable without an API change.
    pub fn new(data: &[u8]) -> Result<Self, CryptoError> {
        let inner: SecretSlice<u8> = data.to_vec().into();
        let exposed = inner.expose_secret();
        let lock = LockedRegion::try_lock(exposed.as_ptr(), exposed.len());
        Ok(Self { inner, lock })
    }

    /// Create a buffer filled from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn random(len: usize) -> Result<Self, CryptoError> {
        let mut bytes = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        let result = Self::new(&bytes);
        bytes.zeroize();
        result
    }

    /// Borrow the secret bytes. Keep the borrow short.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Number of bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the pages backing the buffer are `mlock`'d.
    #[must_use]
    pub const fn is_mlocked(&self) -> bool {
        self.lock.locked
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// Passphrase
// ---------------------------------------------------------------------------

/// A user-supplied passphrase (backup encryption or external store).
#[derive(Clone)]
pub struct Passphrase(SecretString);

impl Passphrase {
    /// Wrap a passphrase.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Borrow the passphrase as UTF-8 bytes.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }

    /// Returns `true` for the empty passphrase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

// ---------------------------------------------------------------------------
// Platform-specific implementations
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod platform {
    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        // SAFETY: mlock only inspects the address range; an invalid range
        // yields ENOMEM, which is reported as `false`.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        // SAFETY: see `try_mlock`. Failure is not actionable.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }
}

#[cfg(not(unix))]
mod platform {
    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_buffer_round_trips_content() {
        let buf = SecretBuffer::new(b"derived key").expect("new should succeed");
        assert_eq!(buf.expose(), b"derived key");
        assert_eq!(buf.len(), 11);
        assert!(!buf.is_empty());
    }

    #[test]
    fn secret_buffer_random_has_requested_length() {
        let buf = SecretBuffer::random(32).expect("random should succeed");
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn debug_output_is_masked() {
        let buf = SecretBuffer::new(b"top secret").expect("new should succeed");
        assert_eq!(format!("{buf:?}"), "SecretBuffer(***)");
        assert_eq!(format!("{buf}"), "SecretBuffer(***)");

        let pass = Passphrase::new("hunter2");
        assert_eq!(format!("{pass:?}"), "Passphrase(***)");
    }

    #[test]
    fn passphrase_exposes_utf8_bytes() {
        let pass = Passphrase::from("päss");
        assert_eq!(pass.expose(), "päss".as_bytes());
        assert!(!pass.is_empty());
        assert!(Passphrase::new("").is_empty());
    }
}
