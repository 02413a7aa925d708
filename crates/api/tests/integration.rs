//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server,
//! backed by the in-memory store, the in-memory rate limiter and the debug transport.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use courier_api::middleware::auth::encode_jwt;
use courier_api::routes::create_router;
use courier_api::state::AppState;
use courier_common::config::AppConfig;
use courier_common::types::ChannelType;
use courier_engine::store::memory::MemoryStore;
use courier_engine::{DispatchEngine, DispatchSettings, EngineStores, RoutingPolicy};
use courier_notifier::SenderRegistry;
use courier_notifier::rate_limit::{MemoryRateLimiter, RateLimitSettings};
use courier_notifier::schema::DebugDefaults;
use courier_notifier::test_send::{TestSendLimits, TestSendService};

// ============================================================
// Helpers
// ============================================================

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "unused".to_string(),
        redis_url: "redis://localhost:6379".to_string(),
        db_max_connections: 5,
        bind_addr: "127.0.0.1:0".to_string(),
        jwt_secret: "test-jwt-secret-for-integration-tests".to_string(),
        default_language: "en".to_string(),
        default_channel_id: None,
        routing_rules: Vec::new(),
        dispatch_max_concurrency: 4,
        send_timeout_ms: 5_000,
        send_records_max_page_size: 10,
        channel_debug_enabled: false,
        channel_debug_min_sleep_ms: 0,
        channel_debug_max_sleep_ms: 2,
        test_send_max_requests: 2,
        test_send_window_secs: 60,
        test_send_max_target_length: 64,
        test_send_max_content_length: 256,
        property_secret: None,
        sensitive_property_keys: vec!["password".to_string()],
        json_logs: false,
    }
}

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
    token: String,
}

async fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    store.add_template("welcome", "en", "Hello {{name}}").await;

    let registry = Arc::new(SenderRegistry::builtin(
        reqwest::Client::new(),
        DebugDefaults {
            min_delay_ms: config.channel_debug_min_sleep_ms,
            max_delay_ms: config.channel_debug_max_sleep_ms,
        },
        false,
    ));
    let engine = DispatchEngine::new(
        EngineStores::shared(store.clone()),
        registry.clone(),
        RoutingPolicy::from_config(&config),
        DispatchSettings::from(&config),
        config.default_language.clone(),
    );
    let test_send = TestSendService::new(
        registry,
        Arc::new(MemoryRateLimiter::new(RateLimitSettings {
            max_requests: config.test_send_max_requests,
            window: Duration::from_secs(config.test_send_window_secs),
        })),
        TestSendLimits::from(&config),
    );

    let token = encode_jwt("user-1", &config.jwt_secret, 1).unwrap();
    let state = AppState::new(engine, test_send, config);
    TestApp {
        app: create_router(state),
        store,
        token,
    }
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.token));
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Poll until every record of `task_id` has left `pending`.
    async fn wait_for_task(&self, task_id: Uuid) {
        for _ in 0..100 {
            let records = self.store.records_for_task(task_id).await;
            if !records.is_empty() && records.iter().all(|r| r.status.is_terminal()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {task_id} did not finish");
    }
}

// ============================================================
// Routes
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_app().await;
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "courier-api");
}

#[tokio::test]
async fn test_request_id_is_generated_or_echoed() {
    let app = build_test_app().await;

    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(Uuid::parse_str(generated).is_ok());

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/channel/emailProtocolSchema")
                .header("x-request-id", "client-abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-request-id"], "client-abc-123");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let app = build_test_app().await;
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/channel/emailProtocolSchema")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_submit_then_query_records() {
    let app = build_test_app().await;
    let channel = app
        .store
        .add_channel(
            "debug",
            ChannelType::Email,
            json!({"protocol": "DEBUG", "minDelayMs": 0, "maxDelayMs": 2}),
        )
        .await;

    let (status, body) = app
        .call(
            "POST",
            "/api/submit",
            Some(json!({
                "templateCode": "welcome",
                "language": "en",
                "params": {"name": "Ann"},
                "recipients": ["a@x.com", "b@x.com"],
                "channelId": channel,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id: Uuid = body["taskId"].as_str().unwrap().parse().unwrap();

    app.wait_for_task(task_id).await;

    let (status, page) = app
        .call("GET", &format!("/api/sendRecords?taskId={task_id}&size=1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["size"], 1);
    let item = &page["items"][0];
    assert_eq!(item["success"], true);
    assert_eq!(item["renderedContent"], "Hello Ann");
    assert_eq!(item["channelType"], "EMAIL");
    assert!(item.get("properties").is_none());

    let id = item["id"].as_str().unwrap();
    let (status, record) = app.call("GET", &format!("/api/sendRecords/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["taskId"], task_id.to_string());

    let (status, _) = app
        .call("GET", &format!("/api/sendRecords/{}", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_validation_error() {
    let app = build_test_app().await;
    let (status, body) = app
        .call(
            "POST",
            "/api/submit",
            Some(json!({"templateCode": "", "language": "en", "recipients": []})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("templateCode"));
    assert!(message.contains("recipients"));
}

#[tokio::test]
async fn test_send_records_rejects_bad_filters() {
    let app = build_test_app().await;
    let (status, body) = app
        .call("GET", "/api/sendRecords?channelType=FAX&page=0", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("FAX"));
}

#[tokio::test]
async fn test_template_fill() {
    let app = build_test_app().await;
    let (status, body) = app
        .call(
            "POST",
            "/api/template/fill",
            Some(json!({"templateCode": "welcome", "language": "en-US", "params": {"name": "Bo"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "Hello Bo");

    let (status, _) = app
        .call(
            "POST",
            "/api/template/fill",
            Some(json!({"templateCode": "unknown", "language": "en"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_channel_test_send_reports_config_failure() {
    let app = build_test_app().await;
    let (status, body) = app
        .call(
            "POST",
            "/api/channel/testSend",
            Some(json!({
                "type": "EMAIL",
                "properties": {"protocol": "SMTP", "host": "smtp.example.com"},
                "target": "a@x.com",
                "content": "hi",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["errorCode"], "INVALID_CONFIG");
    assert!(body["errorMessage"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn test_sender_test_send_is_rate_limited() {
    let app = build_test_app().await;
    let request = json!({
        "type": "DEBUG",
        "properties": {"minDelayMs": 0, "maxDelayMs": 1},
        "target": "a@x.com",
        "content": "hi",
    });

    for _ in 0..2 {
        let (status, body) = app.call("POST", "/api/sender/testSend", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["messageId"].as_str().unwrap().starts_with("DEBUG-"));
    }

    let (status, _) = app.call("POST", "/api/sender/testSend", Some(request)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_schema_endpoints() {
    let app = build_test_app().await;

    let (status, body) = app.call("GET", "/api/channel/emailProtocolSchema", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["defaultProtocol"], "SMTP");
    let protocols: Vec<&str> = body["protocols"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["protocol"].as_str().unwrap())
        .collect();
    assert_eq!(protocols, vec!["SMTP", "HTTP_API", "DEBUG"]);

    let (status, body) = app.call("GET", "/api/channel/schema/im", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["defaultProtocol"], Value::Null);

    let (status, body) = app.call("GET", "/api/sender/schema/dingtalk", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["propertyKey"], "dingTalk");

    let (status, _) = app.call("GET", "/api/sender/schema/carrier-pigeon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
