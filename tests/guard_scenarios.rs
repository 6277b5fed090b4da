//! End-to-end behaviour of the request guard against an in-memory store.

use axum::http::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use storefront_guard::config::{FailurePolicy, GuardConfig};
use storefront_guard::input::{self, ContentPolicy, FieldConfig, Schema, SchemaConfig};
use storefront_guard::security::{
    HeaderContext, IdentityKey, ReasonCode, TokenPurpose, TokenRejection,
};
use storefront_guard::store::MemoryStore;

mod common;
use common::{guard, guard_with_store, post, request, storefront_config, FlakyStore};

#[tokio::test]
async fn test_lockout_after_threshold_then_fresh_count() {
    let mut config = GuardConfig::default();
    config.rate_limit.threshold = 5;
    config.rate_limit.window_secs = 60;
    let t = guard(&config);
    let limiter = t.guard.limiter();
    let key = IdentityKey::from_raw("ip:1.2.3.4");

    for _ in 0..5 {
        limiter.record_failure(&key).await.unwrap();
        t.clock.advance(Duration::from_secs(2));
    }

    let decision = limiter.check(&key).await.unwrap();
    assert!(!decision.allowed, "6th attempt must be denied");
    assert!(decision.retry_after.unwrap() > Duration::ZERO);

    t.clock.advance(decision.retry_after.unwrap() + Duration::from_millis(1));
    assert!(limiter.check(&key).await.unwrap().allowed);

    limiter.record_success(&key).await.unwrap();
    let record = limiter.record_failure(&key).await.unwrap();
    assert_eq!(record.count, 1);
}

#[tokio::test]
async fn test_csrf_token_reuse_is_already_used() {
    let mut config = GuardConfig::default();
    config.tokens.csrf_ttl_secs = 300;
    let t = guard(&config);
    let tokens = t.guard.tokens();

    let token = tokens.issue(TokenPurpose::Csrf, "session-abc").await.unwrap();

    t.clock.advance(Duration::from_secs(10));
    let first = tokens
        .validate(&token.token_id, TokenPurpose::Csrf, "session-abc")
        .await
        .unwrap();
    assert!(first.valid);

    t.clock.advance(Duration::from_secs(10));
    let second = tokens
        .validate(&token.token_id, TokenPurpose::Csrf, "session-abc")
        .await
        .unwrap();
    assert!(!second.valid);
    assert_eq!(second.reason, Some(TokenRejection::AlreadyUsed));
}

#[tokio::test]
async fn test_revoked_token_is_not_found() {
    let t = guard(&GuardConfig::default());
    let tokens = t.guard.tokens();
    let token = tokens.issue(TokenPurpose::Csrf, "session-abc").await.unwrap();

    assert!(tokens.revoke(&token.token_id).await.unwrap());
    let result = tokens
        .validate(&token.token_id, TokenPurpose::Csrf, "session-abc")
        .await
        .unwrap();
    assert_eq!(result.reason, Some(TokenRejection::NotFound));
}

#[test]
fn test_script_input_strict_and_sanitized() {
    let strict = Schema::compile(
        "strict",
        &SchemaConfig::new().field(FieldConfig::string("comment")),
    )
    .unwrap();
    let lenient = Schema::compile(
        "lenient",
        &SchemaConfig::new()
            .field(FieldConfig::string("comment").policy(ContentPolicy::SanitizeAndContinue)),
    )
    .unwrap();
    let payload = json!({ "comment": "<script>alert(1)</script>" });

    let rejected = input::validate(&strict, &payload);
    assert!(!rejected.valid);
    assert!(rejected
        .violations
        .iter()
        .any(|v| v.rule_id.starts_with("xss")));

    let sanitized = input::validate(&lenient, &payload);
    assert!(sanitized.valid);
    let comment = sanitized.sanitized_value.unwrap()["comment"]
        .as_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(!comment.contains("<script"));
}

#[tokio::test]
async fn test_checkout_requires_token_bound_to_session() {
    let t = guard(&storefront_config());
    let token = t.guard.issue_csrf_token(&post("/checkout")).await.unwrap();

    let other_session = post("/checkout")
        .with_session("someone-else")
        .with_header("x-csrf-token", token.token_id.clone());
    let profile = t.guard.profile_for(&Method::POST, "/checkout/pay");
    let decision = t.guard.evaluate(&other_session, &profile).await;
    assert_eq!(decision.reason, ReasonCode::ContextMismatch);

    let own = post("/checkout/pay").with_header("x-csrf-token", token.token_id);
    assert!(t.guard.evaluate(&own, &profile).await.allow);
}

#[tokio::test]
async fn test_review_body_sanitized_without_csrf() {
    let t = guard(&storefront_config());
    let req = post("/reviews").with_body(json!({
        "title": "Fits well",
        "rating": 5,
        "body": "Great<script>steal()</script> jacket",
    }));
    let profile = t.guard.profile_for(&req.method, &req.path);
    let decision = t.guard.evaluate(&req, &profile).await;

    assert!(decision.allow);
    let body = decision.sanitized_body.unwrap();
    assert!(!body["body"].as_str().unwrap().contains("script"));
    assert_eq!(body["rating"], json!(5));
}

#[tokio::test]
async fn test_store_outage_follows_configured_policy() {
    let mut config = storefront_config();
    config.guard.failure_policy = FailurePolicy::FailOpen;
    config.guard.auth_failure_policy = FailurePolicy::FailClosed;
    let store = Arc::new(FlakyStore::default());
    let t = guard_with_store(&config, store.clone());

    let login_token = t.guard.issue_csrf_token(&post("/account/login")).await.unwrap();
    let checkout_token = t.guard.issue_csrf_token(&post("/checkout")).await.unwrap();
    store.set_down(true);

    let login = post("/account/login").with_header("x-csrf-token", login_token.token_id);
    let profile = t.guard.profile_for(&login.method, &login.path);
    let decision = t.guard.evaluate(&login, &profile).await;
    assert!(!decision.allow);
    assert_eq!(decision.reason, ReasonCode::BackendUnavailable);

    let checkout = post("/checkout").with_header("x-csrf-token", checkout_token.token_id);
    let profile = t.guard.profile_for(&checkout.method, &checkout.path);
    assert!(t.guard.evaluate(&checkout, &profile).await.allow);

    assert_eq!(t.metrics.snapshot().backend_errors, 2);
}

#[tokio::test]
async fn test_denials_count_toward_lockout() {
    let mut config = storefront_config();
    config.rate_limit.threshold = 2;
    let t = guard(&config);

    for i in 0..2 {
        let req = post("/account/login").with_attempt_id(format!("attempt-{i}"));
        let profile = t.guard.profile_for(&req.method, &req.path);
        assert_eq!(
            t.guard.evaluate(&req, &profile).await.reason,
            ReasonCode::TokenMissing
        );
    }

    let token = t.guard.issue_csrf_token(&post("/account/login")).await.unwrap();
    let req = post("/account/login").with_header("x-csrf-token", token.token_id);
    let profile = t.guard.profile_for(&req.method, &req.path);
    let decision = t.guard.evaluate(&req, &profile).await;
    assert_eq!(decision.reason, ReasonCode::RateLimited);
    assert!(decision.retry_after.is_some());

    let snap = t.metrics.snapshot();
    assert_eq!(snap.failures_recorded, 2);
    assert_eq!(snap.rate_limited, 1);
}

#[tokio::test]
async fn test_denied_request_still_gets_headers() {
    let t = guard(&storefront_config());
    let req = post("/checkout").secure(true);
    let profile = t.guard.profile_for(&req.method, &req.path);
    let decision = t.guard.evaluate(&req, &profile).await;

    assert!(!decision.allow);
    assert_eq!(decision.response_headers["x-frame-options"], "DENY");
    assert!(decision
        .response_headers
        .contains_key("strict-transport-security"));
}

#[test]
fn test_headers_pure_modulo_nonce() {
    let t = guard(&GuardConfig::default());
    let ctx = HeaderContext {
        secure: true,
        nonce: None,
    };
    assert_eq!(t.guard.headers_for(&ctx), t.guard.headers_for(&ctx));

    let plain = t.guard.headers_for(&HeaderContext::default());
    assert!(!plain.contains_key("strict-transport-security"));
}

#[tokio::test]
async fn test_get_requests_skip_token_checks() {
    let t = guard(&storefront_config());
    let req = request(Method::GET, "/checkout");
    let profile = t.guard.profile_for(&req.method, &req.path);
    assert!(t.guard.evaluate(&req, &profile).await.allow);
}

#[test]
fn test_memory_store_is_default_constructible() {
    let _ = guard_with_store(&GuardConfig::default(), Arc::new(MemoryStore::default()));
}
