//! `strongbox-crypto-core`: cryptographic primitives for the Strongbox backup engine.
//!
//! No I/O, no threading: every function is a pure transform over bytes so the
//! crate stays small enough to audit on its own.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod kdf;
pub mod symmetric;

pub mod container_format;
pub mod envelope;

pub use envelope::{is_enveloped, EnvelopeCodec};
pub use error::{CryptoError, EnvelopeError};
pub use kdf::{composite_key, derive_argon2id, derive_pbkdf2, Argon2idParams};
pub use memory::{Passphrase, SecretBuffer};
pub use symmetric::{decrypt, encrypt, SealedData};
