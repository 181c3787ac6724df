//! Business handlers and the action registry

use async_trait::async_trait;
use axum::http::StatusCode;
use sealpost_sdk_core::transport::{Action, ActionIdentity, RESERVED_FIELDS};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A decoded, validated request handed to a handler
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: String,
    pub identity: ActionIdentity,
    /// Full decoded request, identity fields included
    pub body: Map<String, Value>,
}

impl ActionRequest {
    /// Action parameter; identity fields are not reachable through here.
    pub fn param(&self, key: &str) -> Option<&Value> {
        if RESERVED_FIELDS.contains(&key) {
            return None;
        }
        self.body.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub status: StatusCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for HandlerError {}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// JSON object returned to the client. A missing `status` becomes `success`.
    async fn handle(&self, request: ActionRequest) -> Result<Map<String, Value>, HandlerError>;
}

/// Action name to handler
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn ActionHandler>) -> &mut Self {
        self.handlers.insert(action.into(), handler);
        self
    }

    /// One handler for every known [`Action`]
    pub fn register_all(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        for action in Action::ALL {
            self.register(action.as_str(), Arc::clone(&handler));
        }
        self
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Relays validated requests as plaintext JSON to `<upstream>/<action>`
pub struct ForwardingHandler {
    upstream_url: String,
    client: reqwest::Client,
}

impl ForwardingHandler {
    pub fn new(upstream_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            upstream_url: upstream_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn target(&self, action: &str) -> String {
        format!("{}/{}", self.upstream_url, action)
    }
}

#[async_trait]
impl ActionHandler for ForwardingHandler {
    async fn handle(&self, request: ActionRequest) -> Result<Map<String, Value>, HandlerError> {
        let target = self.target(&request.action);
        tracing::debug!(%target, "forwarding action upstream");

        let response = self
            .client
            .post(&target)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, %target, "upstream unreachable");
                HandlerError::new(StatusCode::BAD_GATEWAY, "upstream unavailable")
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|_| HandlerError::new(StatusCode::BAD_GATEWAY, "upstream response unreadable"))?;

        let object = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        };

        match (status.is_success(), object) {
            (true, Some(map)) => Ok(map),
            (true, None) => Err(HandlerError::new(
                StatusCode::BAD_GATEWAY,
                "upstream returned a non-JSON body",
            )),
            (false, object) => {
                let message = object
                    .as_ref()
                    .and_then(|map| map.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("API Error ({}): {}", status.as_u16(), body));
                Err(HandlerError::new(status, message))
            }
        }
    }
}
