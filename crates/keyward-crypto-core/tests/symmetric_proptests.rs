#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for AES-256-GCM symmetric encryption.

use proptest::prelude::*;
use keyward_crypto_core::symmetric::{decrypt, encrypt, SealedData, KEY_LEN};

/// Fixed key for property tests.
const PROP_KEY: [u8; KEY_LEN] = [0xCC; KEY_LEN];

proptest! {
    /// Encrypt→decrypt roundtrip with arbitrary AAD.
    #[test]
    fn encrypt_decrypt_roundtrip_with_aad(
        plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
        aad in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let sealed = encrypt(&plaintext, &PROP_KEY, &aad)
            .expect("encrypt should succeed");
        let decrypted = decrypt(&sealed, &PROP_KEY, &aad)
            .expect("decrypt should succeed");
        prop_assert_eq!(decrypted.expose(), plaintext.as_slice());
    }

    /// Flipping any single bit of the wire form is detected.
    #[test]
    fn any_bit_flip_is_rejected(
        plaintext in proptest::collection::vec(any::<u8>(), 1..256),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut wire = encrypt(&plaintext, &PROP_KEY, &[]).unwrap().to_bytes();
        let idx = position.index(wire.len());
        wire[idx] ^= 1 << bit;
        let tampered = SealedData::from_bytes(&wire).unwrap();
        prop_assert!(decrypt(&tampered, &PROP_KEY, &[]).is_err());
    }

    /// Wire parsing never panics on arbitrary input.
    #[test]
    fn from_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = SealedData::from_bytes(&bytes);
    }
}
