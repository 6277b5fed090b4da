//! Stress tests with concurrent callers on a multi-threaded runtime.

use std::sync::Arc;

use storefront_guard::config::GuardConfig;
use storefront_guard::security::{IdentityKey, TokenPurpose, TokenRejection};

mod common;

const CALLERS: u32 = 64;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_failures_are_not_lost() {
    let mut config = GuardConfig::default();
    config.rate_limit.threshold = 1_000;
    let t = common::guard(&config);
    let limiter = t.guard.limiter().clone();
    let key = IdentityKey::from_raw("ip:203.0.113.9");

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let limiter = limiter.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            limiter.record_failure(&key).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let decision = limiter.check(&key).await.unwrap();
    assert_eq!(decision.attempts, CALLERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_one_time_token_has_single_winner() {
    let t = common::guard(&GuardConfig::default());
    let tokens = t.guard.tokens().clone();
    let token = tokens.issue(TokenPurpose::Csrf, "session-abc").await.unwrap();
    let token_id = Arc::new(token.token_id);

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let tokens = tokens.clone();
        let token_id = token_id.clone();
        handles.push(tokio::spawn(async move {
            tokens
                .validate(&token_id, TokenPurpose::Csrf, "session-abc")
                .await
                .unwrap()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        if result.valid {
            accepted += 1;
        } else {
            assert_eq!(result.reason, Some(TokenRejection::AlreadyUsed));
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_outcome_recorded_once_per_attempt() {
    let t = common::guard(&GuardConfig::default());
    let req = common::post("/account/login").with_attempt_id("attempt-fixed");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let reporter = t.guard.attempt_reporter(&req);
        handles.push(tokio::spawn(async move { reporter.failure().await.unwrap() }));
    }
    let mut recorded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            recorded += 1;
        }
    }

    assert_eq!(recorded, 1);
    let decision = t.guard.limiter().check(&req.identity_key()).await.unwrap();
    assert_eq!(decision.attempts, 1);
}
