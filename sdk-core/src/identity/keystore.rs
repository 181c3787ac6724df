//! Secure key store capability for wrapping data at rest
//!
//! A keystore owns non-exportable AES-256-GCM keys addressed by alias. Callers
//! never see key bytes; they only wrap and unwrap. Every wrap draws a fresh
//! random 96-bit nonce which travels with the ciphertext.

use crate::crypto::{self, aead, kdf};
use crate::error::{Result, SealpostError};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use zeroize::Zeroizing;

/// Ciphertext plus the nonce it was sealed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedSecret {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

pub trait SecureKeyStore: Send + Sync {
    /// Create the key for `alias` unless it already exists
    fn ensure_key(&self, alias: &str) -> Result<()>;

    /// Encrypt under the key for `alias`, generating it on first use
    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<WrappedSecret>;

    fn unwrap(&self, alias: &str, wrapped: &WrappedSecret) -> Result<Zeroizing<Vec<u8>>>;
}

fn seal_with(key: &[u8; 32], alias: &str, plaintext: &[u8]) -> Result<WrappedSecret> {
    let nonce = crypto::generate_nonce()?;
    let ciphertext = aead::aes_256_gcm_encrypt(key, &nonce, plaintext, alias.as_bytes())?;
    Ok(WrappedSecret { nonce, ciphertext })
}

fn open_with(key: &[u8; 32], alias: &str, wrapped: &WrappedSecret) -> Result<Zeroizing<Vec<u8>>> {
    aead::aes_256_gcm_decrypt(key, &wrapped.nonce, &wrapped.ciphertext, alias.as_bytes())
}

/// Process-local keystore. Keys vanish with the process.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, Zeroizing<[u8; 32]>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_for(&self, alias: &str) -> Result<Zeroizing<[u8; 32]>> {
        self.ensure_key(alias)?;
        let keys = self
            .keys
            .read()
            .map_err(|_| SealpostError::IdentityStorage("keystore lock poisoned".into()))?;
        keys.get(alias)
            .cloned()
            .ok_or_else(|| SealpostError::IdentityStorage(format!("no key for alias {alias}")))
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn ensure_key(&self, alias: &str) -> Result<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| SealpostError::IdentityStorage("keystore lock poisoned".into()))?;
        if !keys.contains_key(alias) {
            let mut key = Zeroizing::new([0u8; 32]);
            crypto::secure_random(&mut key[..])?;
            keys.insert(alias.to_string(), key);
        }
        Ok(())
    }

    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<WrappedSecret> {
        let key = self.key_for(alias)?;
        seal_with(&key, alias, plaintext)
    }

    fn unwrap(&self, alias: &str, wrapped: &WrappedSecret) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.key_for(alias)?;
        open_with(&key, alias, wrapped)
    }
}

/// Keystore backed by a master key file readable only by the owner.
///
/// Per-alias keys are derived from the master key with HKDF-SHA256, so the
/// file holds a single secret regardless of how many aliases are used.
pub struct FileKeyStore {
    path: PathBuf,
    master: Mutex<Option<Zeroizing<[u8; 32]>>>,
}

impl FileKeyStore {
    pub const MASTER_KEY_FILE: &'static str = "master.key";

    /// Keystore rooted at `dir`; the directory is created on first use
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            path: dir.as_ref().join(Self::MASTER_KEY_FILE),
            master: Mutex::new(None),
        }
    }

    fn master_key(&self) -> Result<Zeroizing<[u8; 32]>> {
        let mut cached = self
            .master
            .lock()
            .map_err(|_| SealpostError::IdentityStorage("keystore lock poisoned".into()))?;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = match self.read_master()? {
            Some(key) => key,
            None => self.create_master()?,
        };
        *cached = Some(key.clone());
        Ok(key)
    }

    fn read_master(&self) -> Result<Option<Zeroizing<[u8; 32]>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SealpostError::IdentityStorage(e.to_string())),
        };
        if bytes.len() != 32 {
            return Err(SealpostError::IdentityStorage(format!(
                "master key has invalid length: {} (expected 32)",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&bytes);
        Ok(Some(key))
    }

    fn create_master(&self) -> Result<Zeroizing<[u8; 32]>> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| SealpostError::IdentityStorage(e.to_string()))?;
        }

        let mut key = Zeroizing::new([0u8; 32]);
        crypto::secure_random(&mut key[..])?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        match options.open(&self.path) {
            Ok(mut file) => {
                file.write_all(&key[..])
                    .and_then(|_| file.sync_all())
                    .map_err(|e| SealpostError::IdentityStorage(e.to_string()))?;
                tracing::debug!(path = %self.path.display(), "created keystore master key");
                Ok(key)
            }
            // another instance won the race
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self
                .read_master()?
                .ok_or_else(|| SealpostError::IdentityStorage("master key vanished".into())),
            Err(e) => Err(SealpostError::IdentityStorage(e.to_string())),
        }
    }
}

impl SecureKeyStore for FileKeyStore {
    fn ensure_key(&self, _alias: &str) -> Result<()> {
        self.master_key().map(|_| ())
    }

    fn wrap(&self, alias: &str, plaintext: &[u8]) -> Result<WrappedSecret> {
        let key = kdf::derive_wrapping_key(&*self.master_key()?, alias)?;
        seal_with(&key, alias, plaintext)
    }

    fn unwrap(&self, alias: &str, wrapped: &WrappedSecret) -> Result<Zeroizing<Vec<u8>>> {
        let key = kdf::derive_wrapping_key(&*self.master_key()?, alias)?;
        open_with(&key, alias, wrapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_wrap_unwrap() {
        let ks = MemoryKeyStore::new();
        let wrapped = ks.wrap("alias", b"secret").unwrap();
        assert_eq!(ks.unwrap("alias", &wrapped).unwrap().as_slice(), b"secret");
    }

    #[test]
    fn test_fresh_nonce_per_wrap() {
        let ks = MemoryKeyStore::new();
        let a = ks.wrap("alias", b"same").unwrap();
        let b = ks.wrap("alias", b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_alias_binding() {
        let ks = MemoryKeyStore::new();
        let wrapped = ks.wrap("a", b"secret").unwrap();
        assert!(ks.unwrap("b", &wrapped).is_err());
    }

    #[test]
    fn test_file_keystore_survives_reopen() {
        let dir = tempdir().unwrap();
        let wrapped = FileKeyStore::new(dir.path()).wrap("alias", b"secret").unwrap();

        let reopened = FileKeyStore::new(dir.path());
        assert_eq!(reopened.unwrap("alias", &wrapped).unwrap().as_slice(), b"secret");
    }

    #[cfg(unix)]
    #[test]
    fn test_master_key_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let ks = FileKeyStore::new(dir.path().join("keys"));
        ks.ensure_key("alias").unwrap();

        let meta = fs::metadata(dir.path().join("keys").join(FileKeyStore::MASTER_KEY_FILE)).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(meta.len(), 32);
    }

    #[test]
    fn test_corrupt_master_key() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(FileKeyStore::MASTER_KEY_FILE), b"short").unwrap();

        let ks = FileKeyStore::new(dir.path());
        assert!(matches!(
            ks.wrap("alias", b"x"),
            Err(SealpostError::IdentityStorage(_))
        ));
    }
}
