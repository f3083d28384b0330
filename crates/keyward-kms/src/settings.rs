//! Store connection settings with envelope-encrypted credentials.
//!
//! Two shapes of the same data, mapped explicitly:
//!
//! - [`EncryptedStoreSettings`]: what sits on disk under the `database`
//!   section of `appsettings.json`; `userId` and `password` are base64 of
//!   the envelope-wrapped UTF-8 bytes
//! - [`StoreSettings`]: the decrypted form handed to the store driver
//!
//! The section existing at all is what marks the store as configured.

use std::fs;
use std::path::{Path, PathBuf};

use data_encoding::BASE64;
use keyward_crypto_core::envelope;
use keyward_crypto_core::memory::SecretBytes;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::KmsConfig;
use crate::error::KmsError;
use crate::fsutil;

/// Top-level section holding the store settings.
pub const SETTINGS_SECTION: &str = "database";

/// On-disk store settings. Credentials are wrapped under the master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedStoreSettings {
    /// Host name or address.
    pub server: String,
    /// TCP port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Use the service account instead of a user id and password.
    #[serde(default)]
    pub integrated_security: bool,
    /// Base64 wrapped user id; empty when unset.
    #[serde(default)]
    pub user_id: String,
    /// Base64 wrapped password; empty when unset.
    #[serde(default)]
    pub password: String,
}

/// Decrypted store settings.
#[derive(Debug)]
pub struct StoreSettings {
    /// Host name or address.
    pub server: String,
    /// TCP port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Use the service account instead of a user id and password.
    pub integrated_security: bool,
    /// Login name.
    pub user_id: String,
    /// Login password.
    pub password: SecretString,
}

impl StoreSettings {
    /// Check required fields.
    ///
    /// # Errors
    ///
    /// [`KmsError::Settings`] naming the first missing field.
    pub fn validate(&self) -> Result<(), KmsError> {
        if self.server.trim().is_empty() {
            return Err(KmsError::Settings("server is required".into()));
        }
        if self.port == 0 {
            return Err(KmsError::Settings("port must be non-zero".into()));
        }
        if self.database.trim().is_empty() {
            return Err(KmsError::Settings("database is required".into()));
        }
        if !self.integrated_security {
            if self.user_id.trim().is_empty() {
                return Err(KmsError::Settings(
                    "userId is required without integrated security".into(),
                ));
            }
            if self.password.expose_secret().is_empty() {
                return Err(KmsError::Settings(
                    "password is required without integrated security".into(),
                ));
            }
        }
        Ok(())
    }

    /// Validate, then wrap the credential fields under `master_key`.
    ///
    /// # Errors
    ///
    /// [`KmsError::Settings`] if validation fails, [`KmsError::Crypto`] if
    /// wrapping does.
    pub fn encrypt(
        &self,
        master_key: &SecretBytes<32>,
    ) -> Result<EncryptedStoreSettings, KmsError> {
        self.validate()?;
        Ok(EncryptedStoreSettings {
            server: self.server.trim().to_owned(),
            port: self.port,
            database: self.database.trim().to_owned(),
            integrated_security: self.integrated_security,
            user_id: wrap_field(master_key, self.user_id.as_bytes())?,
            password: wrap_field(master_key, self.password.expose_secret().as_bytes())?,
        })
    }
}

impl EncryptedStoreSettings {
    /// Unwrap the credential fields under `master_key`.
    ///
    /// # Errors
    ///
    /// [`KmsError::UnwrapFailure`] if a field is not valid base64, does not
    /// open under this master key, or is not UTF-8.
    pub fn decrypt(&self, master_key: &SecretBytes<32>) -> Result<StoreSettings, KmsError> {
        Ok(StoreSettings {
            server: self.server.clone(),
            port: self.port,
            database: self.database.clone(),
            integrated_security: self.integrated_security,
            user_id: unwrap_field(master_key, &self.user_id)?,
            password: SecretString::from(unwrap_field(master_key, &self.password)?),
        })
    }
}

fn wrap_field(master_key: &SecretBytes<32>, plain: &[u8]) -> Result<String, KmsError> {
    if plain.is_empty() {
        return Ok(String::new());
    }
    let wrapped = envelope::wrap(master_key.expose(), plain)?;
    Ok(BASE64.encode(&wrapped))
}

fn unwrap_field(master_key: &SecretBytes<32>, encoded: &str) -> Result<String, KmsError> {
    if encoded.is_empty() {
        return Ok(String::new());
    }
    let wrapped = BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| KmsError::UnwrapFailure)?;
    let plain =
        envelope::unwrap(master_key.expose(), &wrapped).map_err(|_| KmsError::UnwrapFailure)?;
    std::str::from_utf8(plain.expose())
        .map(str::to_owned)
        .map_err(|_| KmsError::UnwrapFailure)
}

/// The JSON file carrying the `database` section.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    /// Settings file at an explicit path.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Settings file named by `config` inside `config_dir`.
    #[must_use]
    pub fn from_config(config_dir: &Path, config: &KmsConfig) -> Self {
        Self::new(config.settings_path(config_dir))
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the `database` section exists. Unreadable files count as
    /// not configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self.read_document() {
            Ok(doc) => doc
                .get(SETTINGS_SECTION)
                .is_some_and(|section| !section.is_null()),
            Err(e) => {
                if self.path.exists() {
                    tracing::warn!(path = %self.path.display(), error = %e, "settings file unreadable");
                }
                false
            }
        }
    }

    /// Read the encrypted section, if present.
    ///
    /// # Errors
    ///
    /// [`KmsError::Settings`] if the file or section is malformed.
    pub fn load(&self) -> Result<Option<EncryptedStoreSettings>, KmsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut doc = self.read_document()?;
        match doc.get_mut(SETTINGS_SECTION).map(serde_json::Value::take) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(section) => serde_json::from_value(section)
                .map(Some)
                .map_err(|e| KmsError::Settings(format!("{SETTINGS_SECTION} section: {e}"))),
        }
    }

    /// Write the encrypted section, keeping every other top-level section.
    ///
    /// # Errors
    ///
    /// [`KmsError::Settings`] if an existing file is not a JSON object,
    /// [`KmsError::Io`] if the write fails.
    pub fn save(&self, settings: &EncryptedStoreSettings) -> Result<(), KmsError> {
        let mut doc = if self.path.exists() {
            self.read_document()?
        } else {
            serde_json::Map::new()
        };
        let section = serde_json::to_value(settings)
            .map_err(|e| KmsError::Settings(e.to_string()))?;
        doc.insert(SETTINGS_SECTION.to_owned(), section);

        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| KmsError::Settings(e.to_string()))?;
        fsutil::write_private_atomic(&self.path, json.as_bytes())?;
        tracing::info!(path = %self.path.display(), "store settings saved");
        Ok(())
    }

    fn read_document(&self) -> Result<serde_json::Map<String, serde_json::Value>, KmsError> {
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| {
            KmsError::Settings(format!("{} is not a JSON object: {e}", self.path.display()))
        })
    }
}
