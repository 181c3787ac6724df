//! Sealpost SDK Core Library
//!
//! Device identity, the hybrid RSA-OAEP + AES-256-CBC request envelope and
//! the encrypted action transport built on top of it.

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod transport;

// Re-exports
pub use crypto::rsa_oaep::{ServerPrivateKey, ServerPublicKey};
pub use envelope::{Envelope, EnvelopeCipher};
pub use error::{Result, SealpostError};
pub use identity::{DeviceAttributes, DeviceId, DeviceIdentityProvider};
pub use transport::{Action, ActionIdentity, ActionResponse, ActionStatus, ActionTransport, TransportConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
