//! High-level envelope operations

use crate::{
    crypto::{
        cbc,
        rsa_oaep::{ServerPrivateKey, ServerPublicKey},
        SessionKeyMaterial, SESSION_KEY_LEN,
    },
    envelope::Envelope,
    error::{Result, SealpostError},
};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

/// Envelope operations
pub struct EnvelopeCipher;

impl EnvelopeCipher {
    /// Seal a request body for the server.
    ///
    /// Fresh session key and IV are drawn for every call.
    pub fn encode(plaintext: &[u8], server_key: &ServerPublicKey) -> Result<String> {
        Ok(Self::seal(plaintext, server_key)?.to_wire())
    }

    /// Same as [`encode`](Self::encode) but returns the structured envelope
    pub fn seal(plaintext: &[u8], server_key: &ServerPublicKey) -> Result<Envelope> {
        let material = SessionKeyMaterial::generate()?;

        let ciphertext = cbc::aes_256_cbc_encrypt(&material.session_key, &material.iv, plaintext)?;
        let encrypted_key = server_key.wrap_session_key(&material.session_key)?;

        Ok(Envelope {
            encrypted_key,
            iv: material.iv,
            ciphertext,
        })
    }

    /// Reverse [`encode`](Self::encode) with the server private key
    pub fn decode(wire: &str, server_key: &ServerPrivateKey) -> Result<Zeroizing<Vec<u8>>> {
        let envelope = Envelope::from_wire(wire)?;
        Self::open(&envelope, server_key)
    }

    pub fn open(envelope: &Envelope, server_key: &ServerPrivateKey) -> Result<Zeroizing<Vec<u8>>> {
        let session_key = server_key.unwrap_session_key(&envelope.encrypted_key)?;
        if session_key.len() != SESSION_KEY_LEN {
            return Err(SealpostError::Decode("invalid session key"));
        }

        cbc::aes_256_cbc_decrypt(&session_key, &envelope.iv, &envelope.ciphertext)
    }

    /// Decode and parse the body as a JSON object.
    ///
    /// CBC has no authentication tag, so a tampered body that still unpads
    /// is only caught here when it no longer parses.
    pub fn decode_json(wire: &str, server_key: &ServerPrivateKey) -> Result<Map<String, Value>> {
        let plaintext = Self::decode(wire, server_key)?;
        match serde_json::from_slice::<Value>(&plaintext) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SealpostError::Decode("request body is not a JSON object")),
            Err(_) => Err(SealpostError::Decode("request body is not valid JSON")),
        }
    }
}
