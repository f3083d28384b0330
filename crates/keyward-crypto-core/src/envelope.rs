//! Envelope encryption: wrap key material under the master key.
//!
//! ```text
//! master key ──AES-256-GCM("keyward-envelope-v1")──► wrapped DEK
//! ```
//!
//! Wrapped layout is the [`SealedData`] wire format
//! (`nonce(12) || ciphertext || tag(16)`), so a wrapped 32-byte DEK is
//! 60 bytes. Both functions are stateless: the master key is passed in.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use crate::symmetric::{self, SealedData, KEY_LEN, MIN_SEALED_LEN};

/// AAD label for envelope blobs.
const ENVELOPE_AAD: &[u8] = b"keyward-envelope-v1";

/// Length of a wrapped 32-byte key.
pub const WRAPPED_KEY_LEN: usize = MIN_SEALED_LEN + KEY_LEN;

/// Wrap `plain_key` under `master_key`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if `master_key` is not
/// 32 bytes, or [`CryptoError::Encryption`] if sealing fails.
pub fn wrap(master_key: &[u8], plain_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if master_key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid master key length: {} bytes (expected {KEY_LEN})",
            master_key.len()
        )));
    }
    let sealed = symmetric::encrypt(plain_key, master_key, ENVELOPE_AAD)?;
    Ok(sealed.to_bytes())
}

/// Unwrap a blob produced by [`wrap`].
///
/// Never yields partial plaintext: anything other than a blob wrapped by
/// this exact master key fails.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] for a foreign master key, altered
/// bytes, or a blob too short to parse, and
/// [`CryptoError::InvalidKeyMaterial`] if `master_key` is not 32 bytes.
pub fn unwrap(master_key: &[u8], wrapped: &[u8]) -> Result<SecretBuffer, CryptoError> {
    if master_key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid master key length: {} bytes (expected {KEY_LEN})",
            master_key.len()
        )));
    }
    let sealed = SealedData::from_bytes(wrapped).map_err(|_| CryptoError::Decryption)?;
    symmetric::decrypt(&sealed, master_key, ENVELOPE_AAD)
}
