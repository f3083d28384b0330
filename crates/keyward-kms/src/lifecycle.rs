//! Master key lifecycle: auto-load, create, recover.
//!
//! The master key has two at-rest forms in the config directory:
//!
//! - `master.key`: the machine-protected blob, opened on every start-up
//! - `backup.key`: the 92-byte password backup, opened only to recover
//!
//! Transitions are one-way (`Uninitialized → Initialized`). The key is
//! published into a [`OnceLock`] only after every file write succeeded, so
//! readers never lock and a failed create/recover leaves nothing behind in
//! memory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use keyward_crypto_core::backup::{backup_fingerprint, BackupVault, MASTER_KEY_LEN};
use keyward_crypto_core::memory::SecretBytes;
use keyward_crypto_core::protect::{MachineProtector, ProtectedStore};
use keyward_crypto_core::CryptoError;
use serde::{Deserialize, Serialize};

use crate::config::KmsConfig;
use crate::error::KmsError;
use crate::fsutil;

/// Initialization status, recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitializationStatus {
    /// A master key is loaded.
    Initialized,
    /// Neither key file exists: create a new master key.
    NeedNewKey,
    /// Only the backup exists: recover with the backup password.
    NeedBackupRecovery,
    /// The primary file exists but could not be opened on this machine.
    KeyFileCorrupted,
}

impl InitializationStatus {
    /// Operator-facing description.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Initialized => "master key loaded",
            Self::NeedNewKey => "no master key: create a new one",
            Self::NeedBackupRecovery => "primary key file missing: recover from backup",
            Self::KeyFileCorrupted => {
                "primary key file unreadable on this machine: recover from backup"
            }
        }
    }
}

/// Owner of the process-wide master key.
///
/// Share one instance per process behind an [`Arc`].
pub struct MasterKeyLifecycle {
    master_key_path: PathBuf,
    backup_key_path: PathBuf,
    min_password_len: usize,
    vault: BackupVault,
    protector: Arc<dyn ProtectedStore>,
    key: OnceLock<SecretBytes<MASTER_KEY_LEN>>,
    transition: Mutex<()>,
}

impl std::fmt::Debug for MasterKeyLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyLifecycle")
            .field("master_key_path", &self.master_key_path)
            .field("backup_key_path", &self.backup_key_path)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl MasterKeyLifecycle {
    /// Build a lifecycle over `config_dir` and try to auto-load the
    /// primary key file through `protector`.
    ///
    /// An unreadable primary file is logged and leaves the lifecycle
    /// uninitialized with status [`InitializationStatus::KeyFileCorrupted`].
    #[must_use]
    pub fn new(config_dir: &Path, config: &KmsConfig, protector: Arc<dyn ProtectedStore>) -> Self {
        let lifecycle = Self {
            master_key_path: config.master_key_path(config_dir),
            backup_key_path: config.backup_key_path(config_dir),
            min_password_len: config.min_password_len(),
            vault: BackupVault::with_params(config.backup_kdf()),
            protector,
            key: OnceLock::new(),
            transition: Mutex::new(()),
        };
        lifecycle.try_auto_load();
        lifecycle
    }

    /// [`MasterKeyLifecycle::new`] with the machine protector whose scope
    /// key lives at `config.protector_key_file`.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::Crypto`] if the scope key cannot be read or
    /// created.
    pub fn open(config_dir: &Path, config: &KmsConfig) -> Result<Self, KmsError> {
        let protector = MachineProtector::for_this_machine(&config.protector_key_path(config_dir))?;
        Ok(Self::new(config_dir, config, Arc::new(protector)))
    }

    fn try_auto_load(&self) {
        if !self.master_key_path.exists() {
            return;
        }
        match self.load_primary() {
            Ok(key) => {
                if self.key.set(key).is_ok() {
                    tracing::info!(path = %self.master_key_path.display(), "master key loaded");
                }
            }
            Err(e) => {
                tracing::error!(
                    path = %self.master_key_path.display(),
                    error = %e,
                    "master key file could not be loaded"
                );
            }
        }
    }

    fn load_primary(&self) -> Result<SecretBytes<MASTER_KEY_LEN>, KmsError> {
        let blob = fs::read(&self.master_key_path)?;
        let secret = self
            .protector
            .unprotect(&blob)
            .map_err(|_| KmsError::ProtectionFailure)?;
        SecretBytes::from_slice(secret.expose()).map_err(|_| KmsError::ProtectionFailure)
    }

    /// Whether a master key is loaded. Lock-free.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.key.get().is_some()
    }

    /// The loaded master key. Lock-free.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::NotInitialized`] before create/recover/auto-load.
    pub fn master_key(&self) -> Result<&SecretBytes<MASTER_KEY_LEN>, KmsError> {
        self.key.get().ok_or(KmsError::NotInitialized)
    }

    /// Current status: loaded key, then primary file, then backup file.
    #[must_use]
    pub fn status(&self) -> InitializationStatus {
        if self.is_initialized() {
            InitializationStatus::Initialized
        } else if self.master_key_path.exists() {
            InitializationStatus::KeyFileCorrupted
        } else if self.backup_key_path.exists() {
            InitializationStatus::NeedBackupRecovery
        } else {
            InitializationStatus::NeedNewKey
        }
    }

    /// Path of the machine-protected primary file.
    #[must_use]
    pub fn master_key_path(&self) -> &Path {
        &self.master_key_path
    }

    /// Path of the password backup, for the operator to collect.
    #[must_use]
    pub fn backup_key_path(&self) -> &Path {
        &self.backup_key_path
    }

    /// Fingerprint of the backup file currently on disk.
    ///
    /// # Errors
    ///
    /// [`KmsError::BackupNotFound`] if there is no backup file.
    pub fn backup_fingerprint(&self) -> Result<String, KmsError> {
        if !self.backup_key_path.exists() {
            return Err(KmsError::BackupNotFound);
        }
        let blob = fs::read(&self.backup_key_path)?;
        Ok(backup_fingerprint(&blob))
    }

    /// Generate a master key, write both at-rest forms, then publish it.
    ///
    /// If the backup write fails after the primary write, the primary file
    /// stays on disk and the key is not published.
    ///
    /// # Errors
    ///
    /// - [`KmsError::WeakPassword`] for a blank or too-short password
    /// - [`KmsError::AlreadyInitialized`] if a key is already loaded
    /// - [`KmsError::Io`] / [`KmsError::Crypto`] if a write or primitive fails
    pub fn create_new_master_key(&self, backup_password: &str) -> Result<(), KmsError> {
        if backup_password.trim().is_empty()
            || backup_password.chars().count() < self.min_password_len
        {
            return Err(KmsError::WeakPassword {
                min_len: self.min_password_len,
            });
        }

        let _guard = self
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_initialized() {
            return Err(KmsError::AlreadyInitialized);
        }

        let key = SecretBytes::<MASTER_KEY_LEN>::random()?;

        let protected = self.protector.protect(key.expose())?;
        fsutil::write_private_atomic(&self.master_key_path, &protected).inspect_err(|e| {
            tracing::error!(
                path = %self.master_key_path.display(),
                error = %e,
                "failed to write master key file"
            );
        })?;

        let backup = self.vault.seal(&key, backup_password).map_err(|e| match e {
            CryptoError::WeakPassword { min_len } => KmsError::WeakPassword { min_len },
            other => KmsError::Crypto(other),
        })?;
        fsutil::write_private_atomic(&self.backup_key_path, &backup.to_bytes()).inspect_err(
            |e| {
                tracing::error!(
                    path = %self.backup_key_path.display(),
                    error = %e,
                    "failed to write backup file; primary key file left on disk"
                );
            },
        )?;

        self.key.set(key).map_err(|_| KmsError::AlreadyInitialized)?;
        tracing::info!(
            master_key = %self.master_key_path.display(),
            backup = %self.backup_key_path.display(),
            "master key created"
        );
        Ok(())
    }

    /// Open the backup with `recovery_password`, re-protect the key for
    /// this machine, then publish it.
    ///
    /// Failed attempts leave the state unchanged and may be retried.
    ///
    /// # Errors
    ///
    /// - [`KmsError::RecoveryFailure`] for a blank or wrong password, or a
    ///   corrupted backup
    /// - [`KmsError::AlreadyInitialized`] if a key is already loaded
    /// - [`KmsError::BackupNotFound`] if there is no backup file
    /// - [`KmsError::Io`] / [`KmsError::Crypto`] if re-protecting fails
    pub fn recover_from_backup(&self, recovery_password: &str) -> Result<(), KmsError> {
        if recovery_password.trim().is_empty() {
            return Err(KmsError::RecoveryFailure);
        }

        let _guard = self
            .transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_initialized() {
            return Err(KmsError::AlreadyInitialized);
        }
        if !self.backup_key_path.exists() {
            return Err(KmsError::BackupNotFound);
        }

        let blob = fs::read(&self.backup_key_path)?;
        let key = self.vault.open(&blob, recovery_password).map_err(|_| {
            tracing::warn!(
                backup = %self.backup_key_path.display(),
                "master key recovery failed: wrong password or corrupted backup"
            );
            KmsError::RecoveryFailure
        })?;

        let protected = self.protector.protect(key.expose())?;
        fsutil::write_private_atomic(&self.master_key_path, &protected).inspect_err(|e| {
            tracing::error!(
                path = %self.master_key_path.display(),
                error = %e,
                "failed to write recovered master key file"
            );
        })?;

        self.key.set(key).map_err(|_| KmsError::AlreadyInitialized)?;
        tracing::info!(path = %self.master_key_path.display(), "master key recovered from backup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_crypto_core::memory::SecretBuffer;
    use tempfile::TempDir;

    /// Identity "protection" so unit tests can inspect blobs.
    struct PlainProtector;

    impl ProtectedStore for PlainProtector {
        fn protect(&self, secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(secret.to_vec())
        }

        fn unprotect(&self, blob: &[u8]) -> Result<SecretBuffer, CryptoError> {
            SecretBuffer::new(blob)
        }
    }

    fn fast_config() -> KmsConfig {
        KmsConfig {
            backup_kdf_rounds: 1_000,
            ..KmsConfig::default()
        }
    }

    fn lifecycle(dir: &Path) -> MasterKeyLifecycle {
        MasterKeyLifecycle::new(dir, &fast_config(), Arc::new(PlainProtector))
    }

    #[test]
    fn empty_dir_needs_new_key() {
        let dir = TempDir::new().unwrap();
        let lc = lifecycle(dir.path());
        assert!(!lc.is_initialized());
        assert_eq!(lc.status(), InitializationStatus::NeedNewKey);
        assert!(matches!(lc.master_key(), Err(KmsError::NotInitialized)));
    }

    #[test]
    fn weak_passwords_are_rejected_before_any_write() {
        let dir = TempDir::new().unwrap();
        let lc = lifecycle(dir.path());
        for pw in ["", "        ", "short", "1234567"] {
            assert!(matches!(
                lc.create_new_master_key(pw),
                Err(KmsError::WeakPassword { min_len: 8 })
            ));
        }
        assert!(!lc.master_key_path().exists());
        assert_eq!(lc.status(), InitializationStatus::NeedNewKey);
    }

    #[test]
    fn stricter_policy_from_config() {
        let dir = TempDir::new().unwrap();
        let config = KmsConfig {
            min_backup_password_len: 12,
            ..fast_config()
        };
        let lc = MasterKeyLifecycle::new(dir.path(), &config, Arc::new(PlainProtector));
        assert!(matches!(
            lc.create_new_master_key("elevenchars"),
            Err(KmsError::WeakPassword { min_len: 12 })
        ));
        lc.create_new_master_key("twelve-chars").unwrap();
    }

    #[test]
    fn create_writes_both_files_and_publishes() {
        let dir = TempDir::new().unwrap();
        let lc = lifecycle(dir.path());
        lc.create_new_master_key("correct-password").unwrap();

        assert!(lc.is_initialized());
        assert_eq!(lc.status(), InitializationStatus::Initialized);
        let primary = fs::read(lc.master_key_path()).unwrap();
        assert_eq!(primary.as_slice(), lc.master_key().unwrap().expose());
        assert_eq!(fs::read(lc.backup_key_path()).unwrap().len(), 92);
        assert_eq!(lc.backup_fingerprint().unwrap().len(), 16);
    }

    #[test]
    fn wrong_length_primary_is_corrupted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("master.key"), [0u8; 31]).unwrap();
        let lc = lifecycle(dir.path());
        assert!(!lc.is_initialized());
        assert_eq!(lc.status(), InitializationStatus::KeyFileCorrupted);
    }

    #[test]
    fn blank_recovery_password_fails_without_reading_files() {
        let dir = TempDir::new().unwrap();
        let lc = lifecycle(dir.path());
        assert!(matches!(
            lc.recover_from_backup("   "),
            Err(KmsError::RecoveryFailure)
        ));
        assert!(matches!(
            lc.recover_from_backup("correct-password"),
            Err(KmsError::BackupNotFound)
        ));
        assert!(matches!(lc.backup_fingerprint(), Err(KmsError::BackupNotFound)));
    }

    #[test]
    fn status_messages_are_distinct() {
        let all = [
            InitializationStatus::Initialized,
            InitializationStatus::NeedNewKey,
            InitializationStatus::NeedBackupRecovery,
            InitializationStatus::KeyFileCorrupted,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.message(), b.message());
            }
        }
    }

    #[test]
    fn debug_does_not_print_key() {
        let dir = TempDir::new().unwrap();
        let lc = lifecycle(dir.path());
        lc.create_new_master_key("correct-password").unwrap();
        let dbg = format!("{lc:?}");
        assert!(dbg.contains("initialized: true"));
        assert!(!dbg.contains("key:"));
    }
}
