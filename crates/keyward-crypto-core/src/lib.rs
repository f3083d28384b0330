//! `keyward-crypto-core`: pure cryptographic primitives for keyward.
//!
//! No network, no async, no storage backend. The only file this crate ever
//! touches is the machine scope key read by [`protect::MachineProtector`].

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod kdf;
pub mod symmetric;

pub mod backup;
pub mod envelope;

pub mod protect;

pub use backup::{
    backup_fingerprint, BackupBlob, BackupVault, BACKUP_BLOB_LEN, MASTER_KEY_LEN,
    MIN_PASSWORD_CHARS, SALT_LEN,
};
pub use envelope::WRAPPED_KEY_LEN;
pub use error::CryptoError;
pub use kdf::{derive, Pbkdf2Params, DEFAULT_ROUNDS};
pub use memory::{disable_core_dumps, LockedRegion, SecretBuffer, SecretBytes};
pub use protect::{machine_scope_id, MachineProtector, ProtectedStore, PROTECTED_MAGIC};
pub use symmetric::{decrypt, encrypt, SealedData};
