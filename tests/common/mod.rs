//! Shared utilities for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::Method;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use storefront_guard::clock::{ManualClock, Timestamp};
use storefront_guard::config::{GuardConfig, RouteConfig};
use storefront_guard::error::{StoreError, StoreResult};
use storefront_guard::input::{ContentPolicy, FieldConfig, SchemaConfig};
use storefront_guard::observability::GuardMetrics;
use storefront_guard::security::{AttemptRecord, RequestDescriptor, RequestGuard, SecurityToken};
use storefront_guard::store::{MemoryStore, SecurityStore};

pub const CLIENT_IP: &str = "1.2.3.4";

/// A guard wired to a manual clock and an isolated metrics instance.
pub struct TestGuard {
    pub guard: RequestGuard,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<GuardMetrics>,
}

pub fn start_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)))
}

pub fn route(name: &str, prefix: &str) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        path_prefix: prefix.into(),
        methods: Vec::new(),
        track_attempts: false,
        csrf: true,
        auth_endpoint: false,
        schema: None,
    }
}

/// Login (tracked, auth), checkout (csrf) and reviews (schema, no csrf).
pub fn storefront_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.routes = vec![
        RouteConfig {
            track_attempts: true,
            auth_endpoint: true,
            ..route("login", "/account/login")
        },
        route("checkout", "/checkout"),
        RouteConfig {
            csrf: false,
            schema: Some("review".into()),
            ..route("reviews", "/reviews")
        },
    ];
    config.schemas.insert(
        "review".into(),
        SchemaConfig::new()
            .field(FieldConfig::string("title").required().length(Some(1), Some(120)))
            .field(FieldConfig::integer("rating", Some(1), Some(5)).required())
            .field(FieldConfig::string("body").policy(ContentPolicy::SanitizeAndContinue)),
    );
    config
}

pub fn guard_with_store(config: &GuardConfig, store: Arc<dyn SecurityStore>) -> TestGuard {
    let clock = start_clock();
    let metrics = Arc::new(GuardMetrics::new());
    let guard = RequestGuard::from_config(config, store, clock.clone(), metrics.clone())
        .expect("valid test configuration");
    TestGuard {
        guard,
        clock,
        metrics,
    }
}

pub fn guard(config: &GuardConfig) -> TestGuard {
    guard_with_store(config, Arc::new(MemoryStore::new()))
}

pub fn request(method: Method, path: &str) -> RequestDescriptor {
    RequestDescriptor::new(method, path, CLIENT_IP.parse::<IpAddr>().unwrap())
        .with_session("session-abc")
}

pub fn post(path: &str) -> RequestDescriptor {
    request(Method::POST, path)
}

/// Store that fails every call while `down` is set, otherwise delegates.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SecurityStore for FlakyStore {
    async fn get_attempts(&self, key: &str) -> StoreResult<Option<AttemptRecord>> {
        self.check()?;
        self.inner.get_attempts(key).await
    }

    async fn atomic_increment(
        &self,
        key: &str,
        window: Duration,
        now: Timestamp,
    ) -> StoreResult<AttemptRecord> {
        self.check()?;
        self.inner.atomic_increment(key, window, now).await
    }

    async fn extend_lockout(&self, key: &str, until: Timestamp) -> StoreResult<()> {
        self.check()?;
        self.inner.extend_lockout(key, until).await
    }

    async fn delete_attempts(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_attempts(key).await
    }

    async fn put_token(&self, token: SecurityToken) -> StoreResult<()> {
        self.check()?;
        self.inner.put_token(token).await
    }

    async fn get_token(&self, token_id: &str) -> StoreResult<Option<SecurityToken>> {
        self.check()?;
        self.inner.get_token(token_id).await
    }

    async fn delete_token(&self, token_id: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_token(token_id).await
    }

    async fn compare_and_swap_used(
        &self,
        token_id: &str,
        expected_used: bool,
        new_used: bool,
    ) -> StoreResult<bool> {
        self.check()?;
        self.inner
            .compare_and_swap_used(token_id, expected_used, new_used)
            .await
    }

    async fn insert_marker(
        &self,
        marker: &str,
        ttl: Duration,
        now: Timestamp,
    ) -> StoreResult<bool> {
        self.check()?;
        self.inner.insert_marker(marker, ttl, now).await
    }

    async fn purge_expired(&self, now: Timestamp) -> StoreResult<usize> {
        self.check()?;
        self.inner.purge_expired(now).await
    }
}
