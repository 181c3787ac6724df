//! Hybrid request envelope and its wire codec
//!
//! Wire layout, innermost first:
//!
//! ```text
//! base64(RSA-OAEP(session_key)) | base64(iv) | base64(AES-256-CBC(body))
//! ```
//!
//! The joined string is base64-encoded once more with the URL-safe alphabet
//! and no padding. That outer string is the HTTP request body.

pub mod operations;

use crate::crypto::IV_LEN;
use crate::error::{Result, SealpostError};
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

pub use operations::EnvelopeCipher;

/// Segment separator inside the outer encoding
pub const SEGMENT_SEPARATOR: char = '|';

/// Inner segments: standard alphabet, padded on encode, lenient on decode
const SEGMENT_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Outer layer: URL-safe alphabet, no padding on encode, lenient on decode
const OUTER_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The three binary parts of an encrypted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Session key wrapped under the server RSA key
    pub encrypted_key: Vec<u8>,
    pub iv: [u8; IV_LEN],
    /// AES-256-CBC/PKCS#7 body
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Serialize to the outer base64url string sent on the wire
    pub fn to_wire(&self) -> String {
        let joined = [
            SEGMENT_B64.encode(&self.encrypted_key),
            SEGMENT_B64.encode(self.iv),
            SEGMENT_B64.encode(&self.ciphertext),
        ]
        .join("|");
        OUTER_B64.encode(joined.as_bytes())
    }

    /// Parse the outer base64url string
    pub fn from_wire(wire: &str) -> Result<Self> {
        let outer = OUTER_B64
            .decode(wire.trim())
            .map_err(|_| SealpostError::Decode("malformed envelope"))?;
        let joined =
            String::from_utf8(outer).map_err(|_| SealpostError::Decode("malformed envelope"))?;

        let parts: Vec<&str> = joined.split(SEGMENT_SEPARATOR).collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(SealpostError::Decode("malformed envelope"));
        }

        let decode = |segment: &str| {
            SEGMENT_B64
                .decode(segment)
                .map_err(|_| SealpostError::Decode("malformed envelope"))
        };
        let encrypted_key = decode(parts[0])?;
        let iv: [u8; IV_LEN] = decode(parts[1])?
            .try_into()
            .map_err(|_| SealpostError::Decode("malformed envelope"))?;
        let ciphertext = decode(parts[2])?;

        Ok(Self {
            encrypted_key,
            iv,
            ciphertext,
        })
    }
}

/// Wrap a pipe-joined string the way [`Envelope::to_wire`] does.
/// Test helper for building deliberately malformed envelopes.
#[cfg(test)]
pub(crate) fn outer_encode(joined: &str) -> String {
    OUTER_B64.encode(joined.as_bytes())
}

/// Standard padded base64 as used inside each segment
#[cfg(test)]
pub(crate) fn segment_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
