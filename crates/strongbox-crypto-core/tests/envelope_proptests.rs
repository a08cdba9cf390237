#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for the backup envelope.

use proptest::prelude::*;
use strongbox_crypto_core::envelope::{is_enveloped, EnvelopeCodec};
use strongbox_crypto_core::{EnvelopeError, Passphrase};

/// Low PBKDF2 cost keeps each case fast; the format does not depend on it.
const CODEC: EnvelopeCodec = EnvelopeCodec::with_iterations(500);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// decrypt(encrypt(bytes, pass), pass) == bytes.
    #[test]
    fn round_trip_recovers_plaintext(
        plaintext in proptest::collection::vec(any::<u8>(), 0..4096),
        pass in ".{0,32}",
    ) {
        let pass = Passphrase::new(pass);
        let sealed = CODEC.encrypt(&plaintext, &pass).expect("encrypt should succeed");
        prop_assert!(is_enveloped(&sealed));
        let opened = CODEC.decrypt(&sealed, &pass).expect("decrypt should succeed");
        prop_assert_eq!(opened, plaintext);
    }

    /// A different passphrase never yields plaintext.
    #[test]
    fn other_passphrase_always_fails(
        plaintext in proptest::collection::vec(any::<u8>(), 0..1024),
        pass in "[a-z]{1,16}",
        other in "[A-Z]{1,16}",
    ) {
        let sealed = CODEC.encrypt(&plaintext, &Passphrase::new(pass)).expect("encrypt should succeed");
        let result = CODEC.decrypt(&sealed, &Passphrase::new(other));
        prop_assert!(matches!(result, Err(EnvelopeError::WrongPassphrase)));
    }

    /// Flipping any byte after the marker is detected.
    #[test]
    fn tampering_is_detected(
        plaintext in proptest::collection::vec(any::<u8>(), 1..512),
        position in any::<prop::sample::Index>(),
    ) {
        let pass = Passphrase::new("fixed");
        let mut sealed = CODEC.encrypt(&plaintext, &pass).expect("encrypt should succeed");
        let offset = 10 + position.index(sealed.len() - 10);
        sealed[offset] ^= 0x5A;
        prop_assert!(CODEC.decrypt(&sealed, &pass).is_err());
    }

    /// Cutting an envelope short anywhere after the marker never opens.
    #[test]
    fn truncation_is_rejected(
        plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        cut in any::<prop::sample::Index>(),
    ) {
        let pass = Passphrase::new("fixed");
        let sealed = CODEC.encrypt(&plaintext, &pass).expect("encrypt should succeed");
        let keep = 10 + cut.index(sealed.len() - 10);
        let truncated = &sealed[..keep];
        prop_assert!(is_enveloped(truncated));
        prop_assert!(CODEC.decrypt(truncated, &pass).is_err());
        prop_assert!(!CODEC.test_passphrase(truncated, &pass));
    }

    /// Bytes without the marker are passed through unchanged.
    #[test]
    fn plain_bytes_pass_through(
        plaintext in proptest::collection::vec(any::<u8>(), 0..1024)
            .prop_filter("must not start with the marker", |b| !is_enveloped(b)),
    ) {
        let out = CODEC.decrypt_if_needed(plaintext.clone(), None).expect("passthrough should succeed");
        prop_assert_eq!(out, plaintext);
    }
}
