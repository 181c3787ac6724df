//! RSA-OAEP (SHA-256, MGF1-SHA-256) key wrapping for envelope session keys

use crate::error::{Result, SealpostError};
use rand::rngs::OsRng;
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Smallest accepted modulus
pub const MIN_RSA_BITS: usize = 2048;

/// Server public key pinned in the client build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPublicKey(RsaPublicKey);

/// Server private key, held only by the router
#[derive(Clone)]
pub struct ServerPrivateKey(RsaPrivateKey);

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

fn check_size(bits: usize) -> Result<()> {
    if bits < MIN_RSA_BITS {
        return Err(SealpostError::KeyLoad(format!(
            "RSA key too small: {bits} bits (minimum {MIN_RSA_BITS})"
        )));
    }
    Ok(())
}

impl ServerPublicKey {
    /// Parse a pinned key.
    ///
    /// Accepts SPKI PEM (`BEGIN PUBLIC KEY`), PKCS#1 PEM (`BEGIN RSA PUBLIC
    /// KEY`) or the bare base64 DER body of an SPKI key.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        if pem.is_empty() {
            return Err(SealpostError::KeyLoad("server public key is empty".into()));
        }

        let key = if pem.contains("BEGIN RSA PUBLIC KEY") {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| SealpostError::KeyLoad(e.to_string()))?
        } else if pem.contains("-----BEGIN") {
            RsaPublicKey::from_public_key_pem(pem)
                .map_err(|e| SealpostError::KeyLoad(e.to_string()))?
        } else {
            use base64::Engine as _;
            let compact: String = pem.split_whitespace().collect();
            let der = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|_| SealpostError::KeyLoad("server public key is not valid base64".into()))?;
            RsaPublicKey::from_public_key_der(&der)
                .map_err(|e| SealpostError::KeyLoad(e.to_string()))?
        };

        check_size(key.size() * 8)?;
        Ok(Self(key))
    }

    pub fn to_pem(&self) -> Result<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SealpostError::KeyLoad(e.to_string()))
    }

    pub fn bits(&self) -> usize {
        self.0.size() * 8
    }

    /// Encrypt a session key under this public key
    pub fn wrap_session_key(&self, session_key: &[u8]) -> Result<Vec<u8>> {
        self.0
            .encrypt(&mut OsRng, oaep(), session_key)
            .map_err(|_| SealpostError::Encryption)
    }
}

impl ServerPrivateKey {
    /// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`) PEM
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let key = if pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| SealpostError::KeyLoad(e.to_string()))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| SealpostError::KeyLoad(e.to_string()))?
        };

        check_size(key.size() * 8)?;
        Ok(Self(key))
    }

    /// Generate a fresh key pair from the OS RNG
    pub fn generate(bits: usize) -> Result<Self> {
        check_size(bits)?;
        RsaPrivateKey::new(&mut OsRng, bits)
            .map(Self)
            .map_err(|e| SealpostError::KeyLoad(e.to_string()))
    }

    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SealpostError::KeyLoad(e.to_string()))
    }

    pub fn public_key(&self) -> ServerPublicKey {
        ServerPublicKey(self.0.to_public_key())
    }

    /// Recover a session key wrapped by [`ServerPublicKey::wrap_session_key`]
    pub fn unwrap_session_key(&self, encrypted: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.0
            .decrypt(oaep(), encrypted)
            .map(Zeroizing::new)
            .map_err(|_| SealpostError::Decode("decryption failed"))
    }
}

impl std::fmt::Debug for ServerPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerPrivateKey")
            .field("bits", &(self.0.size() * 8))
            .finish_non_exhaustive()
    }
}

/// One 2048-bit key pair shared by the crate's tests; generation is slow.
#[cfg(test)]
pub(crate) fn shared_test_key() -> &'static ServerPrivateKey {
    use std::sync::OnceLock;
    static KEY: OnceLock<ServerPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| ServerPrivateKey::generate(2048).unwrap())
}
