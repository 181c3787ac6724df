//! Cryptographic operations for Sealpost

pub mod aead;
pub mod cbc;
pub mod kdf;
pub mod rsa_oaep;

use crate::error::{Result, SealpostError};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-256 session key length
pub const SESSION_KEY_LEN: usize = 32;

/// AES-CBC initialization vector length
pub const IV_LEN: usize = 16;

/// Fill buffer with bytes from the operating system CSPRNG
pub fn secure_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| SealpostError::EntropyUnavailable)
}

/// Generate a random nonce for AEAD
pub fn generate_nonce() -> Result<[u8; 12]> {
    let mut nonce = [0u8; 12];
    secure_random(&mut nonce)?;
    Ok(nonce)
}

/// Ephemeral key material for a single envelope.
///
/// Generated immediately before one encryption and wiped on drop. Never
/// persisted, never logged (the `Debug` impl redacts both fields).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeyMaterial {
    pub session_key: [u8; SESSION_KEY_LEN],
    pub iv: [u8; IV_LEN],
}

impl SessionKeyMaterial {
    pub fn generate() -> Result<Self> {
        let mut material = Self {
            session_key: [0u8; SESSION_KEY_LEN],
            iv: [0u8; IV_LEN],
        };
        secure_random(&mut material.session_key)?;
        secure_random(&mut material.iv)?;
        Ok(material)
    }
}

impl std::fmt::Debug for SessionKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyMaterial")
            .field("session_key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}
