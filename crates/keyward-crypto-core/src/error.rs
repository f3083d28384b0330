//! Cryptographic error types for `keyward-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (PBKDF2 parameter validation, salt length).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure (AES-256-GCM), or malformed input.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication tag verification failed: ciphertext tampered or wrong key.
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation failure (mlock, CSPRNG fill).
    #[error("secure memory error: {0}")]
    SecureMemory(String),

    /// Backup password does not meet the minimum length policy.
    #[error("backup password must be at least {min_len} characters")]
    WeakPassword {
        /// Minimum number of characters required.
        min_len: usize,
    },

    /// Backup blob could not be opened.
    ///
    /// Wrong password, truncated file, and tampered bytes all map here:
    /// callers must not be able to tell them apart.
    #[error("backup recovery failed: wrong password or corrupted backup")]
    BackupRecovery,

    /// Machine-scoped protection failed: the blob belongs to another scope
    /// or was altered.
    #[error("platform protection failed")]
    Protection,

    /// The machine scope key file could not be read, created, or parsed.
    #[error("machine scope key unavailable: {0}")]
    ScopeKey(String),
}
