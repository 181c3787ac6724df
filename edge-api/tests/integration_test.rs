use async_trait::async_trait;
use axum::{http::StatusCode, routing::post, Json, Router};
use sealpost_edge_api::{
    ActionHandler, ActionRequest, AppState, ForwardingHandler, HandlerError, HandlerRegistry, RouterConfig,
};
use sealpost_sdk_core::{
    Action, ActionIdentity, ActionStatus, ActionTransport, DeviceId, ServerPrivateKey, TransportConfig,
};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

fn server_key() -> &'static ServerPrivateKey {
    static KEY: OnceLock<ServerPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| ServerPrivateKey::generate(2048).unwrap())
}

struct DailyBonus;

#[async_trait]
impl ActionHandler for DailyBonus {
    async fn handle(&self, request: ActionRequest) -> Result<Map<String, Value>, HandlerError> {
        let day = request
            .param("day")
            .and_then(Value::as_u64)
            .ok_or_else(|| HandlerError::bad_request("day is required"))?;

        let mut out = Map::new();
        out.insert("coins".into(), json!(day * 10));
        out.insert("deviceID".into(), json!(request.identity.device_id.as_str()));
        out.insert("isVpn".into(), json!(request.identity.is_vpn));
        Ok(out)
    }
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    addr
}

async fn start_router(registry: HandlerRegistry) -> SocketAddr {
    let state = AppState::new(RouterConfig::default(), server_key().clone(), registry);
    spawn(sealpost_edge_api::build_router(state)).await
}

fn transport(addr: SocketAddr) -> ActionTransport {
    ActionTransport::new(TransportConfig {
        endpoint_url: format!("http://{addr}/api"),
        server_public_key_pem: server_key().public_key().to_pem().unwrap(),
        connect_timeout_secs: 5,
        read_timeout_secs: 5,
        ..Default::default()
    })
}

fn identity() -> ActionIdentity {
    ActionIdentity::new(DeviceId::parse(&"9a".repeat(32)).unwrap())
        .with_id_token("id-token")
        .with_device_token("push-token")
        .with_network_flags(true, false)
}

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_client_router_roundtrip() {
    let mut registry = HandlerRegistry::new();
    registry.register(Action::ClaimDailyBonus.as_str(), Arc::new(DailyBonus));
    let addr = start_router(registry).await;

    let response = transport(addr)
        .send_action(Action::ClaimDailyBonus, params(json!({"day": 4})), &identity())
        .await;

    assert_eq!(response.status, ActionStatus::Success);
    assert_eq!(response.get("coins"), Some(&json!(40)));
    assert_eq!(response.get("deviceID"), Some(&json!("9a".repeat(32))));
    assert_eq!(response.get("isVpn"), Some(&json!(true)));
}

#[tokio::test]
async fn test_handler_error_status_reaches_client() {
    let mut registry = HandlerRegistry::new();
    registry.register(Action::ClaimDailyBonus.as_str(), Arc::new(DailyBonus));
    let addr = start_router(registry).await;

    let response = transport(addr)
        .send_action(Action::ClaimDailyBonus, Map::new(), &identity())
        .await;

    assert_eq!(response.status, ActionStatus::Error);
    assert_eq!(response.message.as_deref(), Some("day is required"));
}

#[tokio::test]
async fn test_unknown_action() {
    let addr = start_router(HandlerRegistry::new()).await;

    let response = transport(addr).send("getTasks", Map::new(), &identity()).await;

    assert_eq!(response.status, ActionStatus::Error);
    assert_eq!(response.message.as_deref(), Some("unknown action: getTasks"));
}

#[tokio::test]
async fn test_invalid_identity_is_401() {
    let mut registry = HandlerRegistry::new();
    registry.register(Action::ClaimDailyBonus.as_str(), Arc::new(DailyBonus));
    let addr = start_router(registry).await;

    let no_token = ActionIdentity::new(DeviceId::parse(&"9a".repeat(32)).unwrap());
    let response = transport(addr)
        .send_action(Action::ClaimDailyBonus, params(json!({"day": 1})), &no_token)
        .await;

    assert_eq!(response.status, ActionStatus::Error);
    assert_eq!(response.message.as_deref(), Some("unauthorized: missing idToken"));
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let addr = start_router(HandlerRegistry::new()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api"))
        .header("Content-Type", "text/plain")
        .body("only|two")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "error", "message": "malformed envelope"}));
}

#[tokio::test]
async fn test_non_utf8_body_is_json_400() {
    let addr = start_router(HandlerRegistry::new()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api"))
        .body(vec![0xffu8, 0xfe, 0x00])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "error", "message": "malformed envelope"}));
}

#[tokio::test]
async fn test_oversized_body_is_json_413() {
    let config = RouterConfig {
        max_body_bytes: 1024,
        ..Default::default()
    };
    let state = AppState::new(config, server_key().clone(), HandlerRegistry::new());
    let addr = spawn(sealpost_edge_api::build_router(state)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api"))
        .body("A".repeat(4096))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "error", "message": "request body too large"}));
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_router(HandlerRegistry::new()).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_forwarding_to_upstream() {
    let upstream = Router::new()
        .route(
            "/getUserProfile",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"name": "Ada", "seenDevice": body["deviceID"]}))
            }),
        )
        .route(
            "/requestWithdrawal",
            post(|| async { (StatusCode::PAYMENT_REQUIRED, Json(json!({"message": "Insufficient balance"}))) }),
        );
    let upstream_addr = spawn(upstream).await;

    let mut registry = HandlerRegistry::new();
    registry.register_all(Arc::new(ForwardingHandler::new(format!("http://{upstream_addr}")).unwrap()));
    let addr = start_router(registry).await;
    let client = transport(addr);

    let profile = client
        .send_action(Action::GetUserProfile, Map::new(), &identity())
        .await;
    assert!(profile.is_success());
    assert_eq!(profile.get("name"), Some(&json!("Ada")));
    assert_eq!(profile.get("seenDevice"), Some(&json!("9a".repeat(32))));

    let withdrawal = client
        .send_action(Action::RequestWithdrawal, params(json!({"amount": 500})), &identity())
        .await;
    assert_eq!(withdrawal.status, ActionStatus::Error);
    assert_eq!(withdrawal.message.as_deref(), Some("Insufficient balance"));
}
