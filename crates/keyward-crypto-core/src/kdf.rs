//! PBKDF2-HMAC-SHA256 password-based key derivation.
//!
//! Used only to turn a human-chosen backup password into the 256-bit KEK
//! that seals the master key backup. The round count is a deployment
//! constant: it is NOT stored in the backup blob, so a blob can only be
//! opened with the same [`Pbkdf2Params`] it was sealed with.

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Output length of the KDF in bytes (256 bits).
pub const OUTPUT_LEN: usize = 32;

/// Minimum salt length in bytes.
const MIN_SALT_LEN: usize = 16;

/// Production work factor for backup sealing.
pub const DEFAULT_ROUNDS: u32 = 100_000;

/// PBKDF2 parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pbkdf2Params {
    /// HMAC-SHA256 iteration count.
    pub rounds: u32,
}

impl Default for Pbkdf2Params {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
        }
    }
}

/// Derive a 256-bit key from `password` and `salt`.
///
/// Password policy is the caller's concern; any byte string is accepted.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if the salt is shorter than 16 bytes
/// or `rounds` is zero.
pub fn derive(
    password: &[u8],
    salt: &[u8],
    params: &Pbkdf2Params,
) -> Result<SecretBytes<OUTPUT_LEN>, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }
    if params.rounds == 0 {
        return Err(CryptoError::KeyDerivation(
            "PBKDF2 rounds must be non-zero".into(),
        ));
    }

    let mut output = [0u8; OUTPUT_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, params.rounds, &mut output);
    Ok(SecretBytes::take(&mut output))
}
