//! Service configuration, stored as plain JSON in the config directory.
//!
//! Holds only file names and policy knobs, never secrets, so it can be
//! read before the master key is loaded.

use std::fs;
use std::path::{Path, PathBuf};

use keyward_crypto_core::{Pbkdf2Params, DEFAULT_ROUNDS, MIN_PASSWORD_CHARS};
use serde::{Deserialize, Serialize};

use crate::error::KmsError;
use crate::fsutil;

/// Configuration file name inside the config directory.
pub const CONFIG_FILE: &str = "keyward.json";

/// Lowest backup KDF work factor [`KmsConfig::validate`] accepts.
pub const MIN_BACKUP_KDF_ROUNDS: u32 = 10_000;

/// keyward service configuration.
///
/// Persisted to `{config_dir}/keyward.json`. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KmsConfig {
    /// Machine-protected master key file.
    #[serde(default = "default_master_key_file")]
    pub master_key_file: String,

    /// Password-protected backup file (92 bytes).
    #[serde(default = "default_backup_key_file")]
    pub backup_key_file: String,

    /// Scope key for the machine protector.
    #[serde(default = "default_protector_key_file")]
    pub protector_key_file: String,

    /// JSON file holding the `database` section.
    #[serde(default = "default_settings_file")]
    pub settings_file: String,

    /// Minimum backup password length in characters (never below 8).
    #[serde(default = "default_min_backup_password_len")]
    pub min_backup_password_len: usize,

    /// PBKDF2 rounds for the backup. Not stored in the backup itself:
    /// changing it makes existing backups unrecoverable.
    #[serde(default = "default_backup_kdf_rounds")]
    pub backup_kdf_rounds: u32,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            master_key_file: default_master_key_file(),
            backup_key_file: default_backup_key_file(),
            protector_key_file: default_protector_key_file(),
            settings_file: default_settings_file(),
            min_backup_password_len: default_min_backup_password_len(),
            backup_kdf_rounds: default_backup_kdf_rounds(),
        }
    }
}

fn default_master_key_file() -> String {
    "master.key".into()
}
fn default_backup_key_file() -> String {
    "backup.key".into()
}
fn default_protector_key_file() -> String {
    "machine.key".into()
}
fn default_settings_file() -> String {
    "appsettings.json".into()
}
const fn default_min_backup_password_len() -> usize {
    MIN_PASSWORD_CHARS
}
const fn default_backup_kdf_rounds() -> u32 {
    DEFAULT_ROUNDS
}

impl KmsConfig {
    /// Load from `{config_dir}/keyward.json`.
    ///
    /// A missing file yields the defaults. A corrupt file also yields the
    /// defaults, with a warning.
    #[must_use]
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join(CONFIG_FILE);
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "corrupt config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.min_backup_password_len = config.min_backup_password_len.max(MIN_PASSWORD_CHARS);
        config
    }

    /// Persist to `{config_dir}/keyward.json` (atomic, owner-only).
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the write or rename fails.
    pub fn save(&self, config_dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fsutil::write_private_atomic(&config_dir.join(CONFIG_FILE), json.as_bytes())
    }

    /// Reject values that would weaken the backup.
    ///
    /// # Errors
    ///
    /// Returns [`KmsError::Config`] if `backup_kdf_rounds` is below
    /// [`MIN_BACKUP_KDF_ROUNDS`] or a file name is empty.
    pub fn validate(&self) -> Result<(), KmsError> {
        if self.backup_kdf_rounds < MIN_BACKUP_KDF_ROUNDS {
            return Err(KmsError::Config(format!(
                "backupKdfRounds must be at least {MIN_BACKUP_KDF_ROUNDS}"
            )));
        }
        let names = [
            ("masterKeyFile", &self.master_key_file),
            ("backupKeyFile", &self.backup_key_file),
            ("protectorKeyFile", &self.protector_key_file),
            ("settingsFile", &self.settings_file),
        ];
        if let Some((field, _)) = names.iter().find(|(_, name)| name.trim().is_empty()) {
            return Err(KmsError::Config(format!("{field} must not be empty")));
        }
        Ok(())
    }

    /// PBKDF2 parameters for the backup.
    #[must_use]
    pub const fn backup_kdf(&self) -> Pbkdf2Params {
        Pbkdf2Params {
            rounds: self.backup_kdf_rounds,
        }
    }

    /// Effective password length policy.
    #[must_use]
    pub fn min_password_len(&self) -> usize {
        self.min_backup_password_len.max(MIN_PASSWORD_CHARS)
    }

    /// `{config_dir}/{master_key_file}`.
    #[must_use]
    pub fn master_key_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.master_key_file)
    }

    /// `{config_dir}/{backup_key_file}`.
    #[must_use]
    pub fn backup_key_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.backup_key_file)
    }

    /// `{config_dir}/{protector_key_file}`.
    #[must_use]
    pub fn protector_key_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.protector_key_file)
    }

    /// `{config_dir}/{settings_file}`.
    #[must_use]
    pub fn settings_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.settings_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_the_documented_files() {
        let config = KmsConfig::default();
        assert_eq!(config.master_key_file, "master.key");
        assert_eq!(config.backup_key_file, "backup.key");
        assert_eq!(config.protector_key_file, "machine.key");
        assert_eq!(config.settings_file, "appsettings.json");
        assert_eq!(config.min_backup_password_len, 8);
        assert_eq!(config.backup_kdf_rounds, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_returns_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(KmsConfig::load(dir.path()), KmsConfig::default());
    }

    #[test]
    fn load_returns_default_on_corrupt_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        assert_eq!(KmsConfig::load(dir.path()), KmsConfig::default());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"backupKeyFile":"escrow.bin","minBackupPasswordLen":12}"#,
        )
        .unwrap();
        let config = KmsConfig::load(dir.path());
        assert_eq!(config.backup_key_file, "escrow.bin");
        assert_eq!(config.min_backup_password_len, 12);
        assert_eq!(config.master_key_file, "master.key");
    }

    #[test]
    fn password_policy_is_never_below_eight() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"minBackupPasswordLen":4}"#,
        )
        .unwrap();
        assert_eq!(KmsConfig::load(dir.path()).min_backup_password_len, 8);

        let config = KmsConfig {
            min_backup_password_len: 2,
            ..KmsConfig::default()
        };
        assert_eq!(config.min_password_len(), 8);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = KmsConfig {
            settings_file: "store.json".into(),
            backup_kdf_rounds: 250_000,
            ..KmsConfig::default()
        };
        config.save(dir.path()).unwrap();
        assert_eq!(KmsConfig::load(dir.path()), config);

        let raw = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(raw.contains("backupKdfRounds"));
    }

    #[test]
    fn validate_rejects_weak_kdf_and_empty_names() {
        let weak = KmsConfig {
            backup_kdf_rounds: 1_000,
            ..KmsConfig::default()
        };
        assert!(matches!(weak.validate(), Err(KmsError::Config(_))));

        let unnamed = KmsConfig {
            backup_key_file: " ".into(),
            ..KmsConfig::default()
        };
        let err = unnamed.validate().unwrap_err();
        assert!(err.to_string().contains("backupKeyFile"));
    }
}
