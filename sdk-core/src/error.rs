//! Sealpost error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SealpostError {
    /// Server public key (or router private key) missing or malformed.
    #[error("Key load error: {0}")]
    KeyLoad(String),

    /// Cipher initialization or finalization failed while sealing a request.
    #[error("Encryption failed")]
    Encryption,

    #[error("{0}")]
    Network(String),

    #[error("API Error ({status}): {body}")]
    Server { status: u16, body: String },

    /// Malformed envelope, failed decryption or a body that is not JSON.
    #[error("Decode error: {0}")]
    Decode(&'static str),

    #[error("Identity storage error: {0}")]
    IdentityStorage(String),

    #[error("Entropy unavailable")]
    EntropyUnavailable,
}

pub type Result<T> = std::result::Result<T, SealpostError>;
