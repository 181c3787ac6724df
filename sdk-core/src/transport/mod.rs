//! Encrypted action transport
//!
//! One HTTP POST per call, body sealed with [`EnvelopeCipher`]. Whatever
//! happens (bad pinned key, network failure, HTTP error, garbage body) the
//! caller receives an [`ActionResponse`]; nothing propagates past `send`.

pub mod action;
pub mod response;

use crate::crypto::rsa_oaep::ServerPublicKey;
use crate::envelope::EnvelopeCipher;
use crate::error::{Result, SealpostError};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

pub use action::{compose_request, Action, ActionIdentity, RESERVED_FIELDS};
pub use response::{ActionResponse, ActionStatus};

/// Transport configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub endpoint_url: String,
    /// Pinned server RSA public key, PEM
    pub server_public_key_pem: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:3000/api".to_string(),
            server_public_key_pem: String::new(),
            connect_timeout_secs: 30,
            read_timeout_secs: 30,
            user_agent: format!("sealpost/{}", crate::VERSION),
        }
    }
}

/// Client side of the action endpoint
pub struct ActionTransport {
    endpoint_url: String,
    server_key: Result<ServerPublicKey>,
    client: Result<reqwest::Client>,
}

impl ActionTransport {
    /// Build a transport. Never fails: key or client problems are reported by
    /// every subsequent [`send`](Self::send) instead.
    pub fn new(config: TransportConfig) -> Self {
        let server_key = ServerPublicKey::from_pem(&config.server_public_key_pem);
        if let Err(e) = &server_key {
            tracing::error!(error = %e, "pinned server public key unusable");
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| SealpostError::Network(e.to_string()));

        tracing::debug!(endpoint = %config.endpoint_url, "action transport ready");
        Self {
            endpoint_url: config.endpoint_url,
            server_key,
            client,
        }
    }

    /// Send one action. Always resolves to a response.
    pub async fn send(
        &self,
        action: &str,
        params: Map<String, Value>,
        identity: &ActionIdentity,
    ) -> ActionResponse {
        let request_id = Uuid::new_v4();
        let span = tracing::debug_span!("action", %request_id, action);

        async move {
            match self.try_send(action, params, identity).await {
                Ok(response) => {
                    tracing::debug!(status = response.status.as_str(), "action completed");
                    response
                }
                Err(e) => {
                    tracing::warn!(error = %e, "action failed");
                    ActionResponse::from_error(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn send_action(
        &self,
        action: Action,
        params: Map<String, Value>,
        identity: &ActionIdentity,
    ) -> ActionResponse {
        self.send(action.as_str(), params, identity).await
    }

    async fn try_send(
        &self,
        action: &str,
        params: Map<String, Value>,
        identity: &ActionIdentity,
    ) -> Result<ActionResponse> {
        let server_key = self.server_key.as_ref().map_err(Clone::clone)?;
        let client = self.client.as_ref().map_err(Clone::clone)?;

        let body = compose_request(action, params, identity)?;
        let envelope = EnvelopeCipher::encode(&body, server_key)?;

        let response = client
            .post(&self.endpoint_url)
            .header(CONTENT_TYPE, "text/plain")
            .body(envelope)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(network_error)?;
        tracing::debug!(http_status = status, "response received");

        Ok(ActionResponse::from_http(status, &text))
    }
}

/// Describe a reqwest failure including its source chain
fn network_error(err: reqwest::Error) -> SealpostError {
    let mut description = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }

    if err.is_timeout() {
        SealpostError::Network(format!("Request timed out: {description}"))
    } else {
        SealpostError::Network(description)
    }
}
