//! Per-client DEK issuance.
//!
//! A DEK is generated, wrapped under the master key, and cleared before the
//! store ever sees the request. Plaintext only reappears on retrieval, as a
//! zeroizing base64 string.

use std::sync::Arc;

use data_encoding::BASE64;
use keyward_crypto_core::envelope;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use crate::error::KmsError;
use crate::lifecycle::MasterKeyLifecycle;
use crate::store::{
    KeyRecord, KeyStore, KeyVersion, RequestContext, RotationPolicy, StoreError, StoreKeyWrite,
    WrappedDek,
};

/// DEK length in bytes.
pub const DEK_LEN: usize = 32;

/// Parameters for a new DEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyGenerationRequest {
    /// Owning client.
    pub client_id: Uuid,
    /// Rotation settings.
    #[serde(flatten)]
    pub policy: RotationPolicy,
    /// Set for admin-originated requests; bypasses the client IP allow-list.
    #[serde(default)]
    pub skip_ip_validation: bool,
}

/// DEK generation and retrieval on top of a store.
pub struct KeyIssuance {
    lifecycle: Arc<MasterKeyLifecycle>,
    store: Arc<dyn KeyStore>,
}

impl KeyIssuance {
    /// Bind the process master key to a store.
    #[must_use]
    pub fn new(lifecycle: Arc<MasterKeyLifecycle>, store: Arc<dyn KeyStore>) -> Self {
        Self { lifecycle, store }
    }

    /// Wrap `dek` under the master key and clear it, whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`KmsError::NotInitialized`] without a master key, or
    /// [`KmsError::Crypto`] if wrapping fails. `dek` is zeroed either way.
    pub fn seal_dek(&self, dek: &mut [u8; DEK_LEN]) -> Result<Vec<u8>, KmsError> {
        let wrapped = self
            .lifecycle
            .master_key()
            .and_then(|mk| envelope::wrap(mk.expose(), &dek[..]).map_err(KmsError::from));
        dek.zeroize();
        wrapped
    }

    /// Generate a fresh DEK for `request.client_id` and store it wrapped.
    ///
    /// # Errors
    ///
    /// - [`KmsError::NotInitialized`] without a master key
    /// - [`KmsError::Store`] for policy validation (2002/2003) or any store
    ///   refusal
    pub fn generate(
        &self,
        request: &KeyGenerationRequest,
        ctx: &RequestContext,
    ) -> Result<KeyRecord, KmsError> {
        self.lifecycle.master_key()?;
        request.policy.validate()?;

        let mut dek = [0u8; DEK_LEN];
        OsRng.fill_bytes(&mut dek);
        let wrapped_key = self.seal_dek(&mut dek)?;

        let write = StoreKeyWrite {
            client_id: request.client_id,
            dek: WrappedDek {
                wrapped_key,
                policy: request.policy,
            },
            skip_ip_validation: request.skip_ip_validation,
        };

        let record = self.store.generate_key(&write, ctx).map_err(|e| {
            tracing::warn!(
                client_id = %request.client_id,
                code = e.code(),
                error = %e,
                "store refused key generation"
            );
            KmsError::Store(e)
        })?;

        tracing::info!(
            client_id = %record.client_id,
            key_id = %record.key_id,
            version = record.version,
            "data key generated"
        );
        Ok(record)
    }

    /// Fetch and unwrap a client's DEK, returned as standard base64.
    ///
    /// # Errors
    ///
    /// - [`KmsError::NotInitialized`] without a master key
    /// - [`KmsError::NotFound`] if the client or version does not exist
    /// - [`KmsError::UnwrapFailure`] if the stored blob does not open
    /// - [`KmsError::Store`] for any other store refusal
    pub fn retrieve(
        &self,
        client_id: Uuid,
        version: KeyVersion,
        ctx: &RequestContext,
    ) -> Result<Zeroizing<String>, KmsError> {
        let master_key = self.lifecycle.master_key()?;
        let record = self.fetch(client_id, version, ctx)?;

        let plain = envelope::unwrap(master_key.expose(), &record.wrapped_key).map_err(|_| {
            tracing::warn!(
                client_id = %client_id,
                key_id = %record.key_id,
                version = record.version,
                "stored key could not be unwrapped"
            );
            KmsError::UnwrapFailure
        })?;
        Ok(Zeroizing::new(BASE64.encode(plain.expose())))
    }

    /// Key metadata without decrypting it.
    ///
    /// # Errors
    ///
    /// Same as [`KeyIssuance::retrieve`], minus `UnwrapFailure`.
    pub fn key_info(
        &self,
        client_id: Uuid,
        version: KeyVersion,
        ctx: &RequestContext,
    ) -> Result<KeyRecord, KmsError> {
        self.lifecycle.master_key()?;
        self.fetch(client_id, version, ctx)
    }

    fn fetch(
        &self,
        client_id: Uuid,
        version: KeyVersion,
        ctx: &RequestContext,
    ) -> Result<KeyRecord, KmsError> {
        self.store
            .get_key(client_id, version, ctx)
            .map_err(|e| match e {
                StoreError::ClientNotFound | StoreError::NoActiveKey => {
                    let code = e.code();
                    tracing::warn!(client_id = %client_id, %version, code, "key not found");
                    KmsError::NotFound { client_id, version }
                }
                other => {
                    tracing::warn!(
                        client_id = %client_id,
                        %version,
                        code = other.code(),
                        error = %other,
                        "store refused key lookup"
                    );
                    KmsError::Store(other)
                }
            })
    }
}
