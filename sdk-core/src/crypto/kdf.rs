//! Key Derivation Functions

use crate::error::{Result, SealpostError};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Domain separation constants
pub const SEALPOST_KEYSTORE_V1: &[u8] = b"sealpost/keystore/v1";
pub const SEALPOST_WRAP_V1: &[u8] = b"sealpost/wrap/v1";

/// HKDF-SHA256 Extract and Expand
pub fn hkdf_sha256_derive(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);

    let mut output = Zeroizing::new(vec![0u8; output_len]);
    hk.expand(info, output.as_mut_slice())
        .map_err(|_| SealpostError::Encryption)?;

    Ok(output)
}

/// Derive the wrapping key for one keystore alias from the master key
pub fn derive_wrapping_key(master_key: &[u8; 32], alias: &str) -> Result<Zeroizing<[u8; 32]>> {
    let mut info = Vec::with_capacity(SEALPOST_WRAP_V1.len() + alias.len());
    info.extend_from_slice(SEALPOST_WRAP_V1);
    info.extend_from_slice(alias.as_bytes());

    let derived = hkdf_sha256_derive(master_key, Some(SEALPOST_KEYSTORE_V1), &info, 32)?;

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&derived);
    Ok(key)
}
