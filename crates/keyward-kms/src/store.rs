//! Persistent store boundary.
//!
//! The store owns client registration, IP allow-lists, rate limiting,
//! versioning, and rotation bookkeeping. This crate only hands it wrapped
//! key bytes and reads them back; it never interprets the metadata.
//!
//! [`MemoryKeyStore`] is an in-process reference store for tests and demos.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Store types
// ---------------------------------------------------------------------------

/// Which key version a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyVersion {
    /// The version the store flags as active.
    Current,
    /// The version immediately before the active one.
    Previous,
}

impl fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::Previous => f.write_str("previous"),
        }
    }
}

/// Ambient request metadata, passed through to the store untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Caller's IP address.
    pub ip_address: Option<IpAddr>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
    /// `Host` header.
    pub host: Option<String>,
    /// Request path.
    pub path: Option<String>,
}

impl RequestContext {
    /// Context carrying only a caller IP.
    #[must_use]
    pub fn from_ip(ip_address: IpAddr) -> Self {
        Self {
            ip_address: Some(ip_address),
            ..Self::default()
        }
    }
}

/// Lifecycle status of one stored key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyStatus {
    /// Served as the current key.
    Active,
    /// Superseded by a newer version.
    Rotated,
    /// Withdrawn by an operator.
    Revoked,
    /// Past `expires_at`.
    Expired,
}

/// Rotation settings requested with a new key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationPolicy {
    /// Whether the store should rotate this key on a schedule.
    pub is_auto_rotation: bool,
    /// Days until the key expires (1..=3650).
    pub expiration_days: Option<u32>,
    /// Days between automatic rotations (1..=365).
    pub rotation_schedule_days: Option<u32>,
}

/// Accepted range for [`RotationPolicy::expiration_days`].
pub const EXPIRATION_DAYS: std::ops::RangeInclusive<u32> = 1..=3650;

/// Accepted range for [`RotationPolicy::rotation_schedule_days`].
pub const ROTATION_SCHEDULE_DAYS: std::ops::RangeInclusive<u32> = 1..=365;

impl RotationPolicy {
    /// No expiry, no automatic rotation.
    #[must_use]
    pub const fn manual() -> Self {
        Self {
            is_auto_rotation: false,
            expiration_days: None,
            rotation_schedule_days: None,
        }
    }

    /// Automatic rotation with both day counts set.
    #[must_use]
    pub const fn auto(expiration_days: u32, rotation_schedule_days: u32) -> Self {
        Self {
            is_auto_rotation: true,
            expiration_days: Some(expiration_days),
            rotation_schedule_days: Some(rotation_schedule_days),
        }
    }

    /// Check the request before any key material is generated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ValidationFailed`] with code 2002 for a missing
    /// or out-of-range expiration and 2003 for the rotation schedule.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.is_auto_rotation && self.expiration_days.is_none() {
            return Err(StoreError::validation(
                2002,
                "expirationDays is required when isAutoRotation is true",
            ));
        }
        if self.is_auto_rotation && self.rotation_schedule_days.is_none() {
            return Err(StoreError::validation(
                2003,
                "rotationScheduleDays is required when isAutoRotation is true",
            ));
        }
        if self
            .expiration_days
            .is_some_and(|days| !EXPIRATION_DAYS.contains(&days))
        {
            return Err(StoreError::validation(
                2002,
                "expirationDays must be between 1 and 3650",
            ));
        }
        if self
            .rotation_schedule_days
            .is_some_and(|days| !ROTATION_SCHEDULE_DAYS.contains(&days))
        {
            return Err(StoreError::validation(
                2003,
                "rotationScheduleDays must be between 1 and 365",
            ));
        }
        Ok(())
    }
}

/// A freshly wrapped DEK plus the policy it was requested with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedDek {
    /// `nonce || ciphertext || tag` under the master key.
    pub wrapped_key: Vec<u8>,
    /// Rotation settings.
    #[serde(flatten)]
    pub policy: RotationPolicy,
}

/// Everything the store needs to persist a new key version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreKeyWrite {
    /// Owning client.
    pub client_id: Uuid,
    /// Wrapped key and policy.
    #[serde(flatten)]
    pub dek: WrappedDek,
    /// Admin-originated requests bypass the client IP allow-list.
    pub skip_ip_validation: bool,
}

/// The store's view of one key version. Holds only wrapped key bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// Unique id of this version.
    pub key_id: Uuid,
    /// Owning client.
    pub client_id: Uuid,
    /// Wrapped DEK bytes.
    pub wrapped_key: Vec<u8>,
    /// Monotonic per-client version, starting at 1.
    pub version: u32,
    /// Current status.
    pub status: KeyStatus,
    /// Whether the store rotates this key on a schedule.
    pub is_auto_rotation: bool,
    /// Days between automatic rotations.
    pub rotation_schedule_days: Option<u32>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiry, if the policy set one.
    pub expires_at: Option<DateTime<Utc>>,
    /// Revocation time.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Operator-supplied revocation reason.
    pub revoked_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Store-side refusals, carrying the numeric codes API clients see.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Unknown or inactive client (1001).
    #[error("client not found or inactive")]
    ClientNotFound,

    /// Caller IP is not on the client's allow-list (1002).
    #[error("ip address not allowed")]
    IpNotAllowed,

    /// Client has no active key (2001).
    #[error("no active key found")]
    NoActiveKey,

    /// Request failed policy validation (2002 or 2003).
    #[error("{message}")]
    ValidationFailed {
        /// 2002 for expiration, 2003 for rotation schedule.
        code: u16,
        /// Human-readable reason.
        message: String,
    },

    /// Too many requests (9999).
    #[error("rate limit exceeded")]
    RateLimited,

    /// Any other backend failure (9999).
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    fn validation(code: u16, message: &str) -> Self {
        Self::ValidationFailed {
            code,
            message: message.to_owned(),
        }
    }

    /// Numeric error code as exposed to API clients.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::ClientNotFound => 1001,
            Self::IpNotAllowed => 1002,
            Self::NoActiveKey => 2001,
            Self::ValidationFailed { code, .. } => *code,
            Self::RateLimited | Self::Backend(_) => 9999,
        }
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Persistent store for wrapped keys.
///
/// Implementations run their own authorization (IP allow-lists, rate
/// limits) using the [`RequestContext`].
pub trait KeyStore: Send + Sync {
    /// Persist a new key version and make it the client's active key.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`] the backend decides on.
    fn generate_key(
        &self,
        write: &StoreKeyWrite,
        ctx: &RequestContext,
    ) -> Result<KeyRecord, StoreError>;

    /// Fetch the current or previous key version of a client.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`] the backend decides on.
    fn get_key(
        &self,
        client_id: Uuid,
        version: KeyVersion,
        ctx: &RequestContext,
    ) -> Result<KeyRecord, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ClientEntry {
    name: String,
    active: bool,
    allowed_ips: Vec<IpAddr>,
    keys: Vec<KeyRecord>,
}

impl ClientEntry {
    fn check_ip(&self, ctx: &RequestContext) -> Result<(), StoreError> {
        if self.allowed_ips.is_empty() {
            return Ok(());
        }
        match ctx.ip_address {
            Some(ip) if self.allowed_ips.contains(&ip) => Ok(()),
            _ => Err(StoreError::IpNotAllowed),
        }
    }

    fn active_key(&self, now: DateTime<Utc>) -> Option<&KeyRecord> {
        self.keys.iter().rev().find(|k| {
            k.status == KeyStatus::Active && k.expires_at.is_none_or(|exp| exp > now)
        })
    }
}

/// Thread-safe in-process [`KeyStore`].
///
/// Clients are registered up front. An empty allow-list admits any caller;
/// a non-empty one pins the client to those IPs.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    clients: RwLock<HashMap<Uuid, ClientEntry>>,
}

impl MemoryKeyStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and return its generated id.
    pub fn register_client(&self, name: &str, allowed_ips: Vec<IpAddr>) -> Uuid {
        let client_id = Uuid::new_v4();
        self.register_client_with_id(client_id, name, allowed_ips);
        client_id
    }

    /// Register a client under a caller-chosen id, replacing any previous
    /// registration (and its keys).
    pub fn register_client_with_id(&self, client_id: Uuid, name: &str, allowed_ips: Vec<IpAddr>) {
        let entry = ClientEntry {
            name: name.to_owned(),
            active: true,
            allowed_ips,
            keys: Vec::new(),
        };
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id, entry);
    }

    /// Mark a client inactive. Later lookups fail with `ClientNotFound`.
    ///
    /// Returns `false` if the client was never registered.
    pub fn deactivate_client(&self, client_id: Uuid) -> bool {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        clients.get_mut(&client_id).is_some_and(|entry| {
            entry.active = false;
            true
        })
    }

    /// Revoke the client's active key. Returns the revoked version.
    ///
    /// # Errors
    ///
    /// `ClientNotFound` or `NoActiveKey`.
    pub fn revoke_active_key(&self, client_id: Uuid, reason: &str) -> Result<u32, StoreError> {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let entry = clients
            .get_mut(&client_id)
            .filter(|e| e.active)
            .ok_or(StoreError::ClientNotFound)?;
        let record = entry
            .keys
            .iter_mut()
            .rev()
            .find(|k| k.status == KeyStatus::Active)
            .ok_or(StoreError::NoActiveKey)?;
        record.status = KeyStatus::Revoked;
        record.revoked_at = Some(Utc::now());
        record.revoked_reason = Some(reason.to_owned());
        Ok(record.version)
    }

    /// Registered name of a client.
    #[must_use]
    pub fn client_name(&self, client_id: Uuid) -> Option<String> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client_id)
            .map(|e| e.name.clone())
    }

    /// Every stored version of a client, oldest first.
    #[must_use]
    pub fn keys(&self, client_id: Uuid) -> Vec<KeyRecord> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&client_id)
            .map(|e| e.keys.clone())
            .unwrap_or_default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn generate_key(
        &self,
        write: &StoreKeyWrite,
        ctx: &RequestContext,
    ) -> Result<KeyRecord, StoreError> {
        write.dek.policy.validate()?;

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let entry = clients
            .get_mut(&write.client_id)
            .filter(|e| e.active)
            .ok_or(StoreError::ClientNotFound)?;
        if !write.skip_ip_validation {
            entry.check_ip(ctx)?;
        }

        let now = Utc::now();
        let version = match entry.keys.last() {
            Some(latest) => latest
                .version
                .checked_add(1)
                .ok_or_else(|| StoreError::Backend("key version overflow".into()))?,
            None => 1,
        };

        for old in entry
            .keys
            .iter_mut()
            .filter(|k| k.status == KeyStatus::Active)
        {
            old.status = KeyStatus::Rotated;
        }

        let policy = write.dek.policy;
        let record = KeyRecord {
            key_id: Uuid::new_v4(),
            client_id: write.client_id,
            wrapped_key: write.dek.wrapped_key.clone(),
            version,
            status: KeyStatus::Active,
            is_auto_rotation: policy.is_auto_rotation,
            rotation_schedule_days: policy.rotation_schedule_days,
            created_at: now,
            expires_at: policy
                .expiration_days
                .and_then(|days| now.checked_add_signed(Duration::days(i64::from(days)))),
            revoked_at: None,
            revoked_reason: None,
        };
        entry.keys.push(record.clone());
        Ok(record)
    }

    fn get_key(
        &self,
        client_id: Uuid,
        version: KeyVersion,
        ctx: &RequestContext,
    ) -> Result<KeyRecord, StoreError> {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        let entry = clients
            .get(&client_id)
            .filter(|e| e.active)
            .ok_or(StoreError::ClientNotFound)?;
        entry.check_ip(ctx)?;

        let now = Utc::now();
        let active = entry.active_key(now).ok_or(StoreError::NoActiveKey)?;
        match version {
            KeyVersion::Current => Ok(active.clone()),
            KeyVersion::Previous => {
                let wanted = active.version.checked_sub(1).ok_or(StoreError::NoActiveKey)?;
                // Only a key retired by rotation is served; revoked ones stay dead.
                entry
                    .keys
                    .iter()
                    .find(|k| {
                        k.version == wanted
                            && k.status == KeyStatus::Rotated
                            && k.expires_at.is_none_or(|exp| exp > now)
                    })
                    .cloned()
                    .ok_or(StoreError::NoActiveKey)
            }
        }
    }
}
