//! Identity and session checks run before any business handler

use async_trait::async_trait;
use sealpost_sdk_core::identity::DeviceId;
use sealpost_sdk_core::transport::ActionIdentity;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid deviceID")]
    InvalidDeviceId,

    #[error("{0}")]
    Rejected(String),
}

/// Validates the identity fields of a decoded request.
///
/// Implementations may verify tokens against an identity provider; the
/// router only relies on the returned [`ActionIdentity`].
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, request: &Map<String, Value>) -> Result<ActionIdentity, SessionError>;
}

/// Shape-only validation: non-empty `idToken` and `deviceToken`, well formed
/// `deviceID`, optional boolean network flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralValidator;

fn non_empty_str<'a>(request: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, SessionError> {
    match request.get(field).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SessionError::Missing(field)),
    }
}

fn flag(request: &Map<String, Value>, field: &str) -> bool {
    request.get(field).and_then(Value::as_bool).unwrap_or(false)
}

#[async_trait]
impl SessionValidator for StructuralValidator {
    async fn validate(&self, request: &Map<String, Value>) -> Result<ActionIdentity, SessionError> {
        let id_token = non_empty_str(request, "idToken")?;
        let device_id = non_empty_str(request, "deviceID")?;
        let device_id = DeviceId::parse(device_id).ok_or(SessionError::InvalidDeviceId)?;
        let device_token = non_empty_str(request, "deviceToken")?;

        Ok(ActionIdentity::new(device_id)
            .with_id_token(id_token)
            .with_device_token(device_token)
            .with_network_flags(flag(request, "isVpn"), flag(request, "isSslProxy")))
    }
}
