//! Device identity: deterministic derivation and protected local storage
//!
//! [`DeviceIdentityProvider::device_id`] always yields a valid identifier.
//! Storage and keystore faults only cost a recomputation; they never change
//! the value, because the identifier is a pure function of the device
//! attributes. A random identifier is never substituted.

pub mod fingerprint;
pub mod keystore;
pub mod storage;

use crate::error::{Result, SealpostError};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub use fingerprint::{DeviceAttributes, DeviceInfoSource, HostDeviceInfo, StaticDeviceInfo};
pub use keystore::{FileKeyStore, MemoryKeyStore, SecureKeyStore, WrappedSecret};
pub use storage::{IdentityStore, MemoryIdentityStore, SledIdentityStore, StoredIdentity};

/// Fixed key of the wrapped identity blob
pub const IDENTITY_STORAGE_KEY: &str = "device-identity";

/// Keystore alias of the identity wrapping key
pub const IDENTITY_KEY_ALIAS: &str = "sealpost.device-identity";

/// 64 lower-case hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    pub const LEN: usize = 64;

    pub fn parse(value: &str) -> Option<Self> {
        Self::is_valid(value).then(|| Self(value.to_string()))
    }

    /// Matches `^[a-f0-9]{64}$`
    pub fn is_valid(value: &str) -> bool {
        value.len() == Self::LEN && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err("device id must be 64 lower-case hex characters".into())
        }
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Derives, caches and persists the device identifier
pub struct DeviceIdentityProvider<D, K, S> {
    source: D,
    keystore: K,
    store: S,
    cached: OnceLock<DeviceId>,
}

impl<D, K, S> DeviceIdentityProvider<D, K, S>
where
    D: DeviceInfoSource,
    K: SecureKeyStore,
    S: IdentityStore,
{
    pub fn new(source: D, keystore: K, store: S) -> Self {
        Self {
            source,
            keystore,
            store,
            cached: OnceLock::new(),
        }
    }

    /// The device identifier. Never fails.
    pub fn device_id(&self) -> DeviceId {
        self.cached.get_or_init(|| self.resolve()).clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn resolve(&self) -> DeviceId {
        match self.load_stored() {
            Ok(Some(id)) => {
                tracing::debug!("device identity restored from storage");
                return id;
            }
            Ok(None) => tracing::debug!("no stored device identity"),
            Err(e) => tracing::warn!(error = %e, "stored device identity unusable, recomputing"),
        }

        let id = self.source.attributes().derive_id();

        if let Err(e) = self.persist(&id) {
            tracing::warn!(error = %e, "failed to persist device identity");
        }
        id
    }

    fn load_stored(&self) -> Result<Option<DeviceId>> {
        let Some(blob) = self.store.load(IDENTITY_STORAGE_KEY)? else {
            return Ok(None);
        };
        let wrapped = StoredIdentity::from_bytes(&blob)?.to_wrapped()?;
        let plaintext = self.keystore.unwrap(IDENTITY_KEY_ALIAS, &wrapped)?;

        let value = std::str::from_utf8(&plaintext)
            .map_err(|_| SealpostError::IdentityStorage("stored identity is not UTF-8".into()))?;
        DeviceId::parse(value)
            .map(Some)
            .ok_or_else(|| SealpostError::IdentityStorage("stored identity has invalid format".into()))
    }

    fn persist(&self, id: &DeviceId) -> Result<()> {
        self.keystore.ensure_key(IDENTITY_KEY_ALIAS)?;
        let wrapped = self.keystore.wrap(IDENTITY_KEY_ALIAS, id.as_str().as_bytes())?;
        let blob = StoredIdentity::from_wrapped(&wrapped).to_bytes()?;
        self.store.store(IDENTITY_STORAGE_KEY, &blob)
    }
}
