//! Sealpost envelope router
//!
//! Owns the RSA private key. Every action arrives as one sealed envelope on a
//! single POST route; the router opens it, checks the identity fields and
//! dispatches by action name. Responses go back as plaintext JSON.

pub mod config;
pub mod handler;
pub mod limits;
pub mod session;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use sealpost_sdk_core::{EnvelopeCipher, SealpostError, ServerPrivateKey};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub use config::RouterConfig;
pub use handler::{ActionHandler, ActionRequest, ForwardingHandler, HandlerError, HandlerRegistry};
pub use limits::{RateLimitBucket, RateLimiter, ReplayCache};
pub use session::{SessionError, SessionValidator, StructuralValidator};

/// Rejections produced by the router pipeline
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("malformed envelope")]
    Envelope(#[source] SealpostError),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("unreadable request body")]
    Body(#[source] BytesRejection),

    #[error("request body is not a JSON object")]
    NotJson(#[source] SealpostError),

    #[error("missing action")]
    MissingAction,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] SessionError),

    #[error("replayed request")]
    Replay,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("{}", .0.message)]
    Handler(HandlerError),
}

impl RouterError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::Envelope(_)
            | RouterError::Body(_)
            | RouterError::NotJson(_)
            | RouterError::MissingAction
            | RouterError::UnknownAction(_) => StatusCode::BAD_REQUEST,
            RouterError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RouterError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RouterError::Replay => StatusCode::CONFLICT,
            RouterError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RouterError::Handler(e) => e.status,
        }
    }
}

impl From<BytesRejection> for RouterError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RouterError::PayloadTooLarge
        } else {
            RouterError::Body(rejection)
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "status": "error", "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    private_key: Arc<ServerPrivateKey>,
    registry: Arc<HandlerRegistry>,
    validator: Arc<dyn SessionValidator>,
    replay_cache: Arc<RwLock<ReplayCache>>,
    rate_limiter: Arc<RwLock<RateLimiter>>,
    config: Arc<RouterConfig>,
}

impl AppState {
    pub fn new(config: RouterConfig, private_key: ServerPrivateKey, registry: HandlerRegistry) -> Self {
        let replay_ttl = Duration::from_secs(config.replay_ttl_secs);
        let rate_limiter = RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_sec);
        Self {
            private_key: Arc::new(private_key),
            registry: Arc::new(registry),
            validator: Arc::new(StructuralValidator),
            replay_cache: Arc::new(RwLock::new(ReplayCache::new(replay_ttl))),
            rate_limiter: Arc::new(RwLock::new(rate_limiter)),
            config: Arc::new(config),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.validator = validator;
        self
    }

    async fn check_rate_limit(&self, device_id: &str) -> Result<(), RouterError> {
        if self.rate_limiter.write().await.check(device_id) {
            Ok(())
        } else {
            Err(RouterError::RateLimited)
        }
    }

    /// Devices currently holding a rate-limit bucket
    pub async fn tracked_devices(&self) -> usize {
        self.rate_limiter.read().await.len()
    }

    /// Decode, validate and dispatch one envelope body
    pub async fn process(&self, body: &str) -> Result<Map<String, Value>, RouterError> {
        let request = EnvelopeCipher::decode_json(body.trim(), &self.private_key).map_err(|e| {
            if matches!(e, SealpostError::Decode(msg) if msg.starts_with("request body")) {
                RouterError::NotJson(e)
            } else {
                RouterError::Envelope(e)
            }
        })?;

        if !self.replay_cache.write().await.check_and_insert(body.trim().as_bytes()) {
            return Err(RouterError::Replay);
        }

        let action = request
            .get("action")
            .and_then(Value::as_str)
            .ok_or(RouterError::MissingAction)?
            .to_string();
        let handler = self
            .registry
            .get(&action)
            .ok_or_else(|| RouterError::UnknownAction(action.clone()))?;

        let identity = self.validator.validate(&request).await?;
        self.check_rate_limit(identity.device_id.as_str()).await?;

        tracing::debug!(%action, device_id = %identity.device_id, "dispatching action");
        let mut response = handler
            .handle(ActionRequest {
                action,
                identity,
                body: request,
            })
            .await
            .map_err(RouterError::Handler)?;

        response
            .entry("status")
            .or_insert_with(|| Value::String("success".to_string()));
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: i64,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// Envelopes are base64 text; anything else is rejected before decoding.
fn body_text(body: &Bytes) -> Result<&str, RouterError> {
    std::str::from_utf8(body)
        .map_err(|_| RouterError::Envelope(SealpostError::Decode("envelope is not valid UTF-8")))
}

async fn dispatch(State(state): State<AppState>, body: Result<Bytes, BytesRejection>) -> Response {
    let result = match body {
        Ok(bytes) => match body_text(&bytes) {
            Ok(text) => state.process(text).await,
            Err(e) => Err(e),
        },
        Err(rejection) => Err(RouterError::from(rejection)),
    };

    match result {
        Ok(response) => (StatusCode::OK, Json(Value::Object(response))).into_response(),
        Err(e) => {
            match e.status() {
                status if status.is_server_error() => tracing::error!(error = %e, "action failed"),
                _ => tracing::info!(error = %e, "request rejected"),
            }
            e.into_response()
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let route_path = state.config.route_path.clone();
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route(&route_path, post(dispatch))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, build_router(state)).await
}
