//! Machine-scoped secret protection.
//!
//! [`ProtectedStore`] is the seam where a platform primitive (DPAPI, OS
//! keychain, HSM wrap, cloud KMS) plugs in. Implementations only transform
//! bytes; the caller owns file I/O for the resulting blob.
//!
//! [`MachineProtector`] is the portable default: a random scope key kept in
//! an owner-only file, bound to the machine identity through BLAKE3 key
//! derivation. A blob moved to another machine, or sealed under another
//! scope key, does not open.
//!
//! Blob layout: `"KWP1" || nonce(12) || ciphertext || tag(16)`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::error::CryptoError;
use crate::memory::{SecretBuffer, SecretBytes};
use crate::symmetric::{self, SealedData, KEY_LEN};
use zeroize::Zeroize;

/// Magic prefix of every protected blob.
pub const PROTECTED_MAGIC: &[u8; 4] = b"KWP1";

const PROTECT_AAD: &[u8] = b"keyward-protect-v1";

const DERIVE_CONTEXT: &str = "keyward machine protector v1";

/// Files consulted, in order, for the machine identity.
const MACHINE_ID_FILES: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Platform protection contract.
///
/// Both operations are scoped to "this machine, this class of principal".
/// `unprotect` must fail with [`CryptoError::Protection`] for blobs from a
/// different scope and for tampered blobs, without saying which.
pub trait ProtectedStore: Send + Sync {
    /// Seal `secret` for this scope.
    ///
    /// # Errors
    ///
    /// Implementation-defined; [`MachineProtector`] only fails if AES-GCM does.
    fn protect(&self, secret: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Open a blob produced by [`ProtectedStore::protect`] in the same scope.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Protection`] if the blob is foreign or altered.
    fn unprotect(&self, blob: &[u8]) -> Result<SecretBuffer, CryptoError>;
}

/// Scope-key based [`ProtectedStore`].
pub struct MachineProtector {
    wrapping_key: SecretBytes<KEY_LEN>,
}

impl std::fmt::Debug for MachineProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MachineProtector(***)")
    }
}

impl MachineProtector {
    /// Bind an in-memory scope key to `scope_id`.
    #[must_use]
    pub fn from_scope_key(scope_key: &SecretBytes<KEY_LEN>, scope_id: &str) -> Self {
        let mut material = Vec::with_capacity(KEY_LEN.saturating_add(scope_id.len()));
        material.extend_from_slice(scope_key.expose());
        material.extend_from_slice(scope_id.as_bytes());
        let mut derived = blake3::derive_key(DERIVE_CONTEXT, &material);
        let wrapping_key = SecretBytes::take(&mut derived);
        material.zeroize();
        Self { wrapping_key }
    }

    /// Load the scope key at `scope_key_path` (creating it on first use) and
    /// bind it to `scope_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ScopeKey`] if the file cannot be read or
    /// created, or does not hold exactly 32 bytes.
    pub fn open(scope_key_path: &Path, scope_id: &str) -> Result<Self, CryptoError> {
        let scope_key = load_or_create_scope_key(scope_key_path)?;
        Ok(Self::from_scope_key(&scope_key, scope_id))
    }

    /// [`MachineProtector::open`] bound to [`machine_scope_id`].
    ///
    /// # Errors
    ///
    /// Same as [`MachineProtector::open`].
    pub fn for_this_machine(scope_key_path: &Path) -> Result<Self, CryptoError> {
        Self::open(scope_key_path, &machine_scope_id())
    }
}

impl ProtectedStore for MachineProtector {
    fn protect(&self, secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sealed = symmetric::encrypt(secret, self.wrapping_key.expose(), PROTECT_AAD)?;
        let mut out = Vec::with_capacity(PROTECTED_MAGIC.len().saturating_add(secret.len()));
        out.extend_from_slice(PROTECTED_MAGIC);
        out.extend_from_slice(&sealed.to_bytes());
        Ok(out)
    }

    fn unprotect(&self, blob: &[u8]) -> Result<SecretBuffer, CryptoError> {
        let body = blob
            .strip_prefix(PROTECTED_MAGIC.as_slice())
            .ok_or(CryptoError::Protection)?;
        let sealed = SealedData::from_bytes(body).map_err(|_| CryptoError::Protection)?;
        symmetric::decrypt(&sealed, self.wrapping_key.expose(), PROTECT_AAD)
            .map_err(|_| CryptoError::Protection)
    }
}

/// Best-effort stable machine identity.
///
/// Tries the systemd/dbus machine-id files, then the kernel hostname, then
/// the `HOSTNAME`/`COMPUTERNAME` environment variables, then `"localhost"`.
#[must_use]
pub fn machine_scope_id() -> String {
    MACHINE_ID_FILES
        .iter()
        .chain(std::iter::once(&"/proc/sys/kernel/hostname"))
        .find_map(|path| read_trimmed(Path::new(path)))
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
        .or_else(|| std::env::var("COMPUTERNAME").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "localhost".to_owned())
}

fn read_trimmed(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn load_or_create_scope_key(path: &Path) -> Result<SecretBytes<KEY_LEN>, CryptoError> {
    match fs::read(path) {
        Ok(mut bytes) => {
            let key = SecretBytes::from_slice(&bytes).map_err(|_| {
                CryptoError::ScopeKey(format!(
                    "{} holds {} bytes (expected {KEY_LEN})",
                    path.display(),
                    bytes.len()
                ))
            });
            bytes.zeroize();
            key
        }
        Err(e) if e.kind() == ErrorKind::NotFound => create_scope_key(path),
        Err(e) => Err(CryptoError::ScopeKey(format!("{}: {e}", path.display()))),
    }
}

fn create_scope_key(path: &Path) -> Result<SecretBytes<KEY_LEN>, CryptoError> {
    let io_err = |e: std::io::Error| CryptoError::ScopeKey(format!("{}: {e}", path.display()));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let key = SecretBytes::<KEY_LEN>::random()?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        // Lost a creation race: use whatever the winner wrote.
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return load_or_create_scope_key(path),
        Err(e) => return Err(io_err(e)),
    };
    file.write_all(key.expose()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    Ok(key)
}
