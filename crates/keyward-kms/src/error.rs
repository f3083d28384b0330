//! Error types for `keyward-kms`.

use keyward_crypto_core::CryptoError;
use thiserror::Error;
use uuid::Uuid;

use crate::store::{KeyVersion, StoreError};

/// Errors produced by master key, issuance, and setup operations.
///
/// `Display` strings are generic on purpose for the recovery, protection,
/// and unwrap cases: they go back to callers and never say which check
/// failed.
#[derive(Debug, Error)]
pub enum KmsError {
    /// A master key is already loaded; create/recover are one-shot.
    #[error("master key is already initialized")]
    AlreadyInitialized,

    /// No master key is loaded yet.
    #[error("master key is not initialized")]
    NotInitialized,

    /// Backup password is blank or below the length policy.
    #[error("backup password must be at least {min_len} characters")]
    WeakPassword {
        /// Minimum number of characters required.
        min_len: usize,
    },

    /// Wrong recovery password or corrupted backup file.
    #[error("recovery failed: wrong password or corrupted backup")]
    RecoveryFailure,

    /// No backup file exists to recover from.
    #[error("backup key file not found")]
    BackupNotFound,

    /// The primary key file could not be unprotected on this machine.
    #[error("master key file could not be unprotected")]
    ProtectionFailure,

    /// A wrapped key or encrypted setting could not be decrypted.
    #[error("decryption failed")]
    UnwrapFailure,

    /// The store has no such client, or no key of that version.
    #[error("no {version} key for client {client_id}")]
    NotFound {
        /// Client the lookup was for.
        client_id: Uuid,
        /// Requested version.
        version: KeyVersion,
    },

    /// The store refused the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Store settings are incomplete or unreadable.
    #[error("invalid store settings: {0}")]
    Settings(String),

    /// `keyward.json` holds values outside the accepted range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Cryptographic primitive failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
