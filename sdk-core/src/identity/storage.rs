//! Persistence of the wrapped device identity blob

use crate::error::{Result, SealpostError};
use super::keystore::WrappedSecret;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// Current layout of [`StoredIdentity`]
pub const STORED_IDENTITY_VERSION: u8 = 1;

/// Persisted, wrapped device identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub v: u8,
    /// base64 AES-GCM nonce
    pub nonce: String,
    /// base64 AES-GCM ciphertext of the device id
    pub ct: String,
    pub wrapped_at: DateTime<Utc>,
}

impl StoredIdentity {
    pub fn from_wrapped(wrapped: &WrappedSecret) -> Self {
        Self {
            v: STORED_IDENTITY_VERSION,
            nonce: STANDARD.encode(wrapped.nonce),
            ct: STANDARD.encode(&wrapped.ciphertext),
            wrapped_at: Utc::now(),
        }
    }

    pub fn to_wrapped(&self) -> Result<WrappedSecret> {
        if self.v != STORED_IDENTITY_VERSION {
            return Err(SealpostError::IdentityStorage(format!(
                "unsupported identity blob version {}",
                self.v
            )));
        }
        let corrupt = |_| SealpostError::IdentityStorage("corrupted identity blob".into());
        let nonce: [u8; 12] = STANDARD
            .decode(&self.nonce)
            .map_err(corrupt)?
            .try_into()
            .map_err(|_| SealpostError::IdentityStorage("corrupted identity blob".into()))?;
        let ciphertext = STANDARD.decode(&self.ct).map_err(corrupt)?;
        Ok(WrappedSecret { nonce, ciphertext })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SealpostError::IdentityStorage(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|_| SealpostError::IdentityStorage("corrupted identity blob".into()))
    }
}

/// Opaque blob storage local to one app instance
pub trait IdentityStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn store(&self, key: &str, blob: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| SealpostError::IdentityStorage("store lock poisoned".into()))?;
        Ok(blobs.get(key).cloned())
    }

    fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| SealpostError::IdentityStorage("store lock poisoned".into()))?;
        blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| SealpostError::IdentityStorage("store lock poisoned".into()))?;
        blobs.remove(key);
        Ok(())
    }
}

/// sled-backed store for the wrapped identity blob
pub struct SledIdentityStore {
    db: Db,
}

fn sled_err(e: sled::Error) -> SealpostError {
    SealpostError::IdentityStorage(e.to_string())
}

impl SledIdentityStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).map_err(sled_err)?;
        Ok(Self { db })
    }

    fn key(key: &str) -> String {
        format!("identity:{key}")
    }
}

impl IdentityStore for SledIdentityStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.db.get(Self::key(key).as_bytes()).map_err(sled_err)?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn store(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.db.insert(Self::key(key).as_bytes(), blob).map_err(sled_err)?;
        self.db.flush().map_err(sled_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(Self::key(key).as_bytes()).map_err(sled_err)?;
        self.db.flush().map_err(sled_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn wrapped() -> WrappedSecret {
        WrappedSecret {
            nonce: [3u8; 12],
            ciphertext: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn test_blob_encoding() {
        let stored = StoredIdentity::from_wrapped(&wrapped());
        let bytes = stored.to_bytes().unwrap();
        let parsed = StoredIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.to_wrapped().unwrap(), wrapped());
    }

    #[test]
    fn test_corrupt_blob() {
        assert!(StoredIdentity::from_bytes(b"{not json").is_err());

        let mut stored = StoredIdentity::from_wrapped(&wrapped());
        stored.nonce = STANDARD.encode([0u8; 5]);
        assert!(stored.to_wrapped().is_err());

        let mut stored = StoredIdentity::from_wrapped(&wrapped());
        stored.v = 9;
        assert!(stored.to_wrapped().is_err());
    }

    #[test]
    fn test_sled_persistence() {
        let dir = tempdir().unwrap();
        let store = SledIdentityStore::open(dir.path()).unwrap();
        assert_eq!(store.load("device-identity").unwrap(), None);

        store.store("device-identity", b"blob").unwrap();
        assert_eq!(store.load("device-identity").unwrap(), Some(b"blob".to_vec()));

        store.remove("device-identity").unwrap();
        assert_eq!(store.load("device-identity").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryIdentityStore::new();
        assert_eq!(store.load("k").unwrap(), None);
        store.store("k", b"v").unwrap();
        assert_eq!(store.load("k").unwrap(), Some(b"v".to_vec()));
    }
}
