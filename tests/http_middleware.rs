//! The guard middleware in front of a small storefront router.

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

use storefront_guard::config::GuardConfig;
use storefront_guard::http::GuardServer;
use storefront_guard::lifecycle::Shutdown;
use storefront_guard::observability::GuardMetrics;
use storefront_guard::security::{AttemptReporter, CspNonce};
use storefront_guard::store::MemoryStore;

mod common;

const SESSION: &str = "session_id=s-100";

async fn login(
    Extension(reporter): Extension<AttemptReporter>,
    Json(body): Json<Value>,
) -> StatusCode {
    if body["password"] == "hunter2" {
        reporter.success().await.unwrap();
        StatusCode::OK
    } else {
        reporter.failure().await.unwrap();
        StatusCode::UNAUTHORIZED
    }
}

async fn echo_json(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

async fn catalog(Extension(nonce): Extension<CspNonce>) -> Response {
    format!("<script nonce=\"{}\"></script>", nonce).into_response()
}

fn storefront() -> Router {
    Router::new()
        .route("/catalog", get(catalog))
        .route("/account/login", post(login))
        .route("/checkout/pay", post(echo_json))
        .route("/reviews", post(echo_json))
}

fn server(config: GuardConfig) -> GuardServer {
    GuardServer::with_store(
        config,
        storefront(),
        Arc::new(MemoryStore::new()),
        common::start_clock(),
        Arc::new(GuardMetrics::new()),
    )
    .unwrap()
}

fn with_peer(mut req: Request<Body>) -> Request<Body> {
    req.extensions_mut()
        .insert(ConnectInfo("198.51.100.7:40000".parse::<SocketAddr>().unwrap()));
    req
}

fn get_req(uri: &str) -> Request<Body> {
    with_peer(
        Request::get(uri)
            .header("cookie", SESSION)
            .body(Body::empty())
            .unwrap(),
    )
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri)
        .header("cookie", SESSION)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-csrf-token", token);
    }
    with_peer(builder.body(Body::from(body.to_string())).unwrap())
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn json_body(res: Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn csrf_token(app: &Router) -> String {
    let res = send(app, get_req("/security/csrf-token")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["header_name"], "x-csrf-token");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_security_headers_and_nonce_on_get() {
    let app = server(common::storefront_config()).router();
    let res = send(&app, get_req("/catalog")).await;

    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("x-request-id"));

    let csp = headers["content-security-policy"].to_str().unwrap().to_string();
    let page = String::from_utf8(
        to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec(),
    )
    .unwrap();
    let nonce = page.split('"').nth(1).unwrap();
    assert!(csp.contains(&format!("'nonce-{}'", nonce)));
}

#[tokio::test]
async fn test_checkout_token_flow_and_replay() {
    let app = server(common::storefront_config()).router();

    let res = send(&app, post_json("/checkout/pay", None, json!({}))).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(res).await["error"], "invalid_token");

    let token = csrf_token(&app).await;
    let res = send(&app, post_json("/checkout/pay", Some(&token), json!({ "sku": "A1" }))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await, json!({ "sku": "A1" }));

    let res = send(&app, post_json("/checkout/pay", Some(&token), json!({ "sku": "A1" }))).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body = json_body(res).await;
    assert_eq!(body["error"], "invalid_token");
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_development_exposes_token_reason() {
    let mut config = common::storefront_config();
    config.guard.environment = storefront_guard::config::Environment::Development;
    let app = server(config).router();

    let token = csrf_token(&app).await;
    send(&app, post_json("/checkout/pay", Some(&token), json!({}))).await;
    let res = send(&app, post_json("/checkout/pay", Some(&token), json!({}))).await;
    assert_eq!(json_body(res).await["error"], "token_already_used");
}

#[tokio::test]
async fn test_handler_receives_sanitized_review() {
    let app = server(common::storefront_config()).router();
    let review = json!({
        "title": "Warm",
        "rating": 4,
        "body": "<script>document.cookie</script>Cosy coat",
        "admin": true,
    });
    let res = send(&app, post_json("/reviews", None, review)).await;

    assert_eq!(res.status(), StatusCode::OK);
    let echoed = json_body(res).await;
    assert!(echoed.get("admin").is_none());
    assert!(!echoed["body"].as_str().unwrap().contains("<script"));
}

#[tokio::test]
async fn test_invalid_review_is_unprocessable() {
    let app = server(common::storefront_config()).router();
    let res = send(&app, post_json("/reviews", None, json!({ "title": "No rating" }))).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(res).await;
    assert_eq!(body["error"], "invalid_input");
    assert!(body.get("violations").is_none());
}

#[tokio::test]
async fn test_failed_logins_lock_out_with_retry_after() {
    let mut config = common::storefront_config();
    config.rate_limit.threshold = 2;
    config.rate_limit.lockout_base_secs = 45;
    let app = server(config).router();

    for _ in 0..2 {
        let token = csrf_token(&app).await;
        let res = send(
            &app,
            post_json("/account/login", Some(&token), json!({ "password": "guess" })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let token = csrf_token(&app).await;
    let res = send(
        &app,
        post_json("/account/login", Some(&token), json!({ "password": "hunter2" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()["retry-after"], "45");
    assert!(res.headers().contains_key("content-security-policy"));
}

#[tokio::test]
async fn test_repeated_request_id_still_locks_out() {
    let mut config = common::storefront_config();
    config.rate_limit.threshold = 2;
    let app = server(config).router();

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let token = csrf_token(&app).await;
        let mut req = post_json("/account/login", Some(&token), json!({ "password": "guess" }));
        req.headers_mut()
            .insert("x-request-id", "client-fixed".parse().unwrap());
        statuses.push(send(&app, req).await.status());
    }
    assert_eq!(&statuses[..2], &[StatusCode::UNAUTHORIZED; 2]);
    assert_eq!(statuses[2], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_repeated_request_id_counts_token_denials() {
    let mut config = common::storefront_config();
    config.rate_limit.threshold = 2;
    let app = server(config).router();

    for _ in 0..2 {
        let mut req = post_json("/account/login", None, json!({ "password": "guess" }));
        req.headers_mut()
            .insert("x-request-id", "client-fixed".parse().unwrap());
        assert_eq!(send(&app, req).await.status(), StatusCode::FORBIDDEN);
    }

    let token = csrf_token(&app).await;
    let mut req = post_json("/account/login", Some(&token), json!({ "password": "hunter2" }));
    req.headers_mut()
        .insert("x-request-id", "client-fixed".parse().unwrap());
    assert_eq!(send(&app, req).await.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = common::storefront_config();
    config.listener.max_body_size = 64;
    let app = server(config).router();

    let big = json!({ "title": "x".repeat(200), "rating": 3 });
    let res = send(&app, post_json("/reviews", None, big)).await;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
}

#[tokio::test]
async fn test_session_rotation_exchange() {
    let app = server(common::storefront_config()).router();

    let res = send(&app, get_req("/security/session/token")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let first = json_body(res).await["token"].as_str().unwrap().to_string();

    let csrf = csrf_token(&app).await;
    let res = send(
        &app,
        post_json("/security/session/rotate", Some(&csrf), json!({ "token": first })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let next = json_body(res).await["token"].as_str().unwrap().to_string();
    assert_ne!(next, first);

    let csrf = csrf_token(&app).await;
    let res = send(
        &app,
        post_json("/security/session/rotate", Some(&csrf), json!({ "token": first })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_server_serves_over_tcp_and_shuts_down() {
    let server = server(GuardConfig::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_updates_tx, config_updates) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, config_updates, server_shutdown).await
    });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .get(format!("http://{}/catalog", addr))
        .send()
        .await
        .expect("guard unreachable");
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-frame-options"], "DENY");

    let res = client
        .post(format!("http://{}/catalog", addr))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
