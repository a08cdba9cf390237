#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for key derivation and composite keys.

use proptest::prelude::*;
use strongbox_crypto_core::kdf::{
    composite_key, derive_argon2id, derive_pbkdf2, Argon2idParams, OUTPUT_LEN,
};

/// Small params for fast property tests.
const PROP_PARAMS: Argon2idParams = Argon2idParams {
    m_cost: 32,
    t_cost: 1,
    p_cost: 1,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Argon2id output is always exactly 32 bytes.
    #[test]
    fn argon2id_always_32_bytes(
        password in proptest::collection::vec(any::<u8>(), 1..128),
        salt in proptest::collection::vec(any::<u8>(), 16..64),
    ) {
        let key = derive_argon2id(&password, &salt, &PROP_PARAMS)
            .expect("derive should succeed with valid inputs");
        prop_assert_eq!(key.len(), OUTPUT_LEN);
    }

    /// PBKDF2 is deterministic for the same inputs.
    #[test]
    fn pbkdf2_is_deterministic(
        password in proptest::collection::vec(any::<u8>(), 0..64),
        salt in proptest::collection::vec(any::<u8>(), 16..48),
        iterations in 1u32..64,
    ) {
        let a = derive_pbkdf2(&password, &salt, iterations).unwrap();
        let b = derive_pbkdf2(&password, &salt, iterations).unwrap();
        prop_assert_eq!(a.expose(), b.expose());
        prop_assert_eq!(a.len(), OUTPUT_LEN);
    }

    /// Salts under 16 bytes are always rejected.
    #[test]
    fn short_salt_rejected(
        password in proptest::collection::vec(any::<u8>(), 1..32),
        salt in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        prop_assert!(derive_argon2id(&password, &salt, &PROP_PARAMS).is_err());
        prop_assert!(derive_pbkdf2(&password, &salt, 1).is_err());
    }

    /// Adding a key file always changes the composite key.
    #[test]
    fn key_file_changes_composite_key(
        password in proptest::collection::vec(any::<u8>(), 0..64),
        key_file in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let plain = composite_key(&password, None).unwrap();
        let with_file = composite_key(&password, Some(&key_file)).unwrap();
        prop_assert_ne!(plain.expose(), with_file.expose());
    }
}
