//! Password-recoverable master key backup.
//!
//! ```text
//! password ──PBKDF2-SHA256(salt)──► KEK ──AES-256-GCM──► master key
//! ```
//!
//! Backup file layout (92 bytes, no header, no version byte):
//!
//! ```text
//! [salt(32)][nonce(12)][tag(16)][ciphertext(32)]
//! ```
//!
//! Opening never distinguishes "wrong password" from "corrupted file": both
//! surface as [`CryptoError::BackupRecovery`].

use crate::error::CryptoError;
use crate::kdf::{self, Pbkdf2Params};
use crate::memory::SecretBytes;
use crate::symmetric::{self, SealedData, NONCE_LEN, TAG_LEN};
use data_encoding::HEXLOWER;
use rand::rngs::OsRng;
use rand::RngCore;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// Wrapped master key length in bytes.
pub const MASTER_KEY_LEN: usize = 32;

/// Total backup blob length: salt + nonce + tag + ciphertext.
pub const BACKUP_BLOB_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN + MASTER_KEY_LEN;

/// Minimum backup password length, in characters.
pub const MIN_PASSWORD_CHARS: usize = 8;

const TAG_OFFSET: usize = SALT_LEN + NONCE_LEN;
const CT_OFFSET: usize = TAG_OFFSET + TAG_LEN;

/// Parsed backup blob.
#[must_use = "a sealed backup must be written somewhere"]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupBlob {
    /// PBKDF2 salt.
    pub salt: [u8; SALT_LEN],
    /// AES-GCM nonce.
    pub nonce: [u8; NONCE_LEN],
    /// AES-GCM tag.
    pub tag: [u8; TAG_LEN],
    /// Encrypted master key.
    pub ciphertext: [u8; MASTER_KEY_LEN],
}

impl BackupBlob {
    /// Encode as `salt || nonce || tag || ciphertext`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BACKUP_BLOB_LEN);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a backup file.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::BackupRecovery`] for any length other than
    /// [`BACKUP_BLOB_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != BACKUP_BLOB_LEN {
            return Err(CryptoError::BackupRecovery);
        }
        let mut blob = Self {
            salt: [0u8; SALT_LEN],
            nonce: [0u8; NONCE_LEN],
            tag: [0u8; TAG_LEN],
            ciphertext: [0u8; MASTER_KEY_LEN],
        };
        blob.salt.copy_from_slice(&bytes[..SALT_LEN]);
        blob.nonce.copy_from_slice(&bytes[SALT_LEN..TAG_OFFSET]);
        blob.tag.copy_from_slice(&bytes[TAG_OFFSET..CT_OFFSET]);
        blob.ciphertext.copy_from_slice(&bytes[CT_OFFSET..]);
        Ok(blob)
    }
}

/// Seals and opens master key backups with a fixed PBKDF2 work factor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackupVault {
    params: Pbkdf2Params,
}

impl BackupVault {
    /// Vault with the production work factor (100,000 rounds).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Vault with an explicit work factor. Blobs only open under the same
    /// round count they were sealed with.
    #[must_use]
    pub const fn with_params(params: Pbkdf2Params) -> Self {
        Self { params }
    }

    /// The PBKDF2 parameters in use.
    #[must_use]
    pub const fn params(&self) -> Pbkdf2Params {
        self.params
    }

    /// Seal `master_key` under `password`.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::WeakPassword`] if `password` has fewer than
    ///   [`MIN_PASSWORD_CHARS`] characters
    /// - [`CryptoError::KeyDerivation`] / [`CryptoError::Encryption`] on
    ///   primitive failure
    pub fn seal(
        &self,
        master_key: &SecretBytes<MASTER_KEY_LEN>,
        password: &str,
    ) -> Result<BackupBlob, CryptoError> {
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(CryptoError::WeakPassword {
                min_len: MIN_PASSWORD_CHARS,
            });
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        // `kek` is SecretBytes: zeroized when it drops at the end of scope.
        let kek = kdf::derive(password.as_bytes(), &salt, &self.params)?;
        let sealed = symmetric::encrypt(master_key.expose(), kek.expose(), &[])?;

        let mut ciphertext = [0u8; MASTER_KEY_LEN];
        if sealed.ciphertext.len() != MASTER_KEY_LEN {
            return Err(CryptoError::Encryption(
                "backup ciphertext length mismatch".into(),
            ));
        }
        ciphertext.copy_from_slice(&sealed.ciphertext);

        Ok(BackupBlob {
            salt,
            nonce: sealed.nonce,
            tag: sealed.tag,
            ciphertext,
        })
    }

    /// Recover the master key from raw backup bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::BackupRecovery`] for a wrong password, a
    /// tampered blob, or a blob of the wrong length.
    pub fn open(
        &self,
        blob: &[u8],
        password: &str,
    ) -> Result<SecretBytes<MASTER_KEY_LEN>, CryptoError> {
        let blob = BackupBlob::from_bytes(blob)?;
        self.open_blob(&blob, password)
    }

    /// Recover the master key from a parsed [`BackupBlob`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::BackupRecovery`] on any failure.
    pub fn open_blob(
        &self,
        blob: &BackupBlob,
        password: &str,
    ) -> Result<SecretBytes<MASTER_KEY_LEN>, CryptoError> {
        let kek = kdf::derive(password.as_bytes(), &blob.salt, &self.params)
            .map_err(|_| CryptoError::BackupRecovery)?;

        let sealed = SealedData {
            nonce: blob.nonce,
            ciphertext: blob.ciphertext.to_vec(),
            tag: blob.tag,
        };
        let plaintext = symmetric::decrypt(&sealed, kek.expose(), &[])
            .map_err(|_| CryptoError::BackupRecovery)?;

        SecretBytes::from_slice(plaintext.expose()).map_err(|_| CryptoError::BackupRecovery)
    }
}

/// Short, stable identifier for a backup file: first 8 bytes of its BLAKE3
/// hash as 16 lowercase hex chars. Safe to display; reveals nothing about
/// the key.
#[must_use]
pub fn backup_fingerprint(blob: &[u8]) -> String {
    HEXLOWER.encode(&blake3::hash(blob).as_bytes()[..8])
}
