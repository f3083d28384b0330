//! `keyward-kms`: master key lifecycle and DEK issuance for keyward.
//!
//! Loads or creates the master key, escrows it into a password backup,
//! wraps per-client DEKs for an external store, and gates traffic until
//! setup is complete.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod config;
pub mod error;
mod fsutil;
pub mod gate;
pub mod issuance;
pub mod lifecycle;
pub mod settings;
pub mod store;

pub use config::{KmsConfig, CONFIG_FILE};
pub use error::KmsError;
pub use gate::{evaluate, GateDecision, InitializationGate};
pub use issuance::{KeyGenerationRequest, KeyIssuance, DEK_LEN};
pub use lifecycle::{InitializationStatus, MasterKeyLifecycle};
pub use settings::{EncryptedStoreSettings, SettingsFile, StoreSettings};
pub use store::{
    KeyRecord, KeyStatus, KeyStore, KeyVersion, MemoryKeyStore, RequestContext, RotationPolicy,
    StoreError, StoreKeyWrite, WrappedDek,
};
