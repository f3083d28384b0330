//! AES-256-GCM authenticated encryption.
//!
//! The single AEAD used everywhere in keyward:
//! - master key under the password-derived KEK ([`crate::backup`])
//! - master key under the machine scope key ([`crate::protect`])
//! - per-client DEKs under the master key ([`crate::envelope`])
//!
//! Each caller passes its own AAD label so a blob produced for one purpose
//! never authenticates under another.

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

/// Smallest valid wire encoding: nonce + empty ciphertext + tag.
pub const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Nonce, ciphertext and tag of one AES-256-GCM seal.
///
/// Wire format: `nonce (12) || ciphertext (variable) || tag (16)`.
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

    /// Parse the wire format produced by [`SealedData::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if `bytes` is shorter than
    /// [`MIN_SEALED_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let Some(ct_len) = bytes.len().checked_sub(MIN_SEALED_LEN) else {
            return Err(CryptoError::Encryption(format!(
                "sealed data too short: {} bytes (minimum {MIN_SEALED_LEN})",
                bytes.len()
            )));
        };

        let (nonce_part, rest) = bytes.split_at(NONCE_LEN);
        let (ct_part, tag_part) = rest.split_at(ct_len);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_part);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(tag_part);

        Ok(Self {
            nonce,
            ciphertext: ct_part.to_vec(),
            tag,
        })
    }
}

fn less_safe_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under a 32-byte `key` with a fresh random nonce.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the key is not 32 bytes or the
/// AEAD operation fails.
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<SealedData, CryptoError> {
    let sealing_key = less_safe_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    let Ok(tag) = sealing_key.seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut in_out)
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

/// Authenticate and decrypt `sealed`.
///
/// The plaintext is returned in a [`SecretBuffer`]; the scratch buffer used
/// by `ring` is zeroized on every path.
///
/// # Errors
///
/// - `CryptoError::Encryption` if the key is not 32 bytes
/// - `CryptoError::Decryption` if the tag does not verify (wrong key,
///   tampered nonce/ciphertext/tag, or different AAD)
pub fn decrypt(sealed: &SealedData, key: &[u8], aad: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let opening_key = less_safe_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    let mut ct_tag = Vec::with_capacity(sealed.ciphertext.len().saturating_add(TAG_LEN));
    ct_tag.extend_from_slice(&sealed.ciphertext);
    ct_tag.extend_from_slice(&sealed.tag);

    let result = match opening_key.open_in_place(nonce, aead::Aad::from(aad), &mut ct_tag) {
        Ok(plaintext) => SecretBuffer::new(plaintext),
        Err(_) => Err(CryptoError::Decryption),
    };
    ct_tag.zeroize();
    result
}
