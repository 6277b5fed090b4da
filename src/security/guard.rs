//! Per-request security pipeline.
//!
//! # Responsibilities
//! - Walk a request through rate, token and input checks in a fixed order
//! - Stop at the first denial and produce a `SecurityDecision`
//! - Apply the configured policy when the store is unavailable
//! - Feed the final outcome of state-changing requests back to the limiter
//!
//! # Data Flow
//! ```text
//! RequestDescriptor + RouteProfile
//!     → Received       ── rate stage (track_attempts profiles)
//!     → RateChecked    ── token stage (csrf profiles, state-changing methods)
//!     → TokenChecked   ── input stage (profiles with a schema)
//!     → InputValidated
//!     → Decided        ── headers, accounting, metrics
//! ```
//!
//! # Design Decisions
//! - Each stage is a plain async fn returning `StageOutcome`; there is no
//!   callback chain
//! - A rate-limited request never reaches token or input checks and is not
//!   counted again
//! - Token and input denials on tracked state-changing requests count as
//!   one failure, the same as a bad credential reported by the handler
//! - Accounting is keyed by request id so a retried request is not counted
//!   twice

use axum::http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::validation::validate_config;
use crate::config::{
    CsrfConfig, CsrfFailurePolicy, Environment, FailurePolicy, GuardConfig, GuardSettings,
};
use crate::error::{ConfigError, StoreError, StoreResult};
use crate::input::{self, Violation};
use crate::observability::GuardMetrics;
use crate::routing::{ProfileRouter, RouteProfile};
use crate::security::headers::{CspNonce, HeaderContext, HeaderPolicy, HeaderSet};
use crate::security::rate_limit::{AttemptOutcome, IdentityKey, RateLimiter};
use crate::security::tokens::{TokenRejection, TokenService};
use crate::security::types::{SecurityToken, TokenPurpose};
use crate::store::SecurityStore;

/// Normalized view of an inbound request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Correlation id; may come from the client.
    pub request_id: String,
    /// Server-minted id that attempt outcomes are deduplicated on.
    pub attempt_id: String,
    pub method: Method,
    pub path: String,
    pub client_addr: IpAddr,
    /// Header names are lower-case.
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON or form body; `Null` when absent or unparseable.
    pub body: Value,
    /// Authenticated account id, if any.
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub secure: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>, client_addr: IpAddr) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            attempt_id: uuid::Uuid::new_v4().to_string(),
            method,
            path: path.into(),
            client_addr,
            headers: BTreeMap::new(),
            body: Value::Null,
            user_id: None,
            session_id: None,
            secure: false,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = id.into();
        self
    }

    pub fn with_attempt_id(mut self, id: impl Into<String>) -> Self {
        self.attempt_id = id.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(self.client_addr, self.user_id.as_deref())
    }

    /// Context tokens are bound to: the session, or the client address
    /// for anonymous visitors.
    pub fn token_context(&self) -> String {
        match &self.session_id {
            Some(session) if !session.is_empty() => session.clone(),
            _ => format!("anon:{}", self.client_addr),
        }
    }

    pub fn is_state_changing(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

impl Default for RequestDescriptor {
    fn default() -> Self {
        Self::new(Method::GET, "/", IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

/// Why a request was allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    Allowed,
    RateLimited,
    TokenMissing,
    NotFound,
    AlreadyUsed,
    Expired,
    ContextMismatch,
    InvalidInput,
    BackendUnavailable,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Allowed => "ALLOWED",
            ReasonCode::RateLimited => "RATE_LIMITED",
            ReasonCode::TokenMissing => "TOKEN_MISSING",
            ReasonCode::NotFound => "NOT_FOUND",
            ReasonCode::AlreadyUsed => "ALREADY_USED",
            ReasonCode::Expired => "EXPIRED",
            ReasonCode::ContextMismatch => "CONTEXT_MISMATCH",
            ReasonCode::InvalidInput => "INVALID_INPUT",
            ReasonCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
        }
    }

    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            ReasonCode::TokenMissing
                | ReasonCode::NotFound
                | ReasonCode::AlreadyUsed
                | ReasonCode::Expired
                | ReasonCode::ContextMismatch
        )
    }

    /// Code shown to clients. Production collapses token failures.
    pub fn public_code(&self, environment: Environment) -> &'static str {
        match (self, environment) {
            (ReasonCode::Allowed, _) => "allowed",
            (ReasonCode::RateLimited, _) => "rate_limited",
            (ReasonCode::InvalidInput, _) => "invalid_input",
            (ReasonCode::BackendUnavailable, _) => "service_unavailable",
            (_, Environment::Production) => "invalid_token",
            (ReasonCode::TokenMissing, Environment::Development) => "token_missing",
            (ReasonCode::NotFound, Environment::Development) => "token_not_found",
            (ReasonCode::AlreadyUsed, Environment::Development) => "token_already_used",
            (ReasonCode::Expired, Environment::Development) => "token_expired",
            (ReasonCode::ContextMismatch, Environment::Development) => "token_context_mismatch",
        }
    }
}

impl From<TokenRejection> for ReasonCode {
    fn from(rejection: TokenRejection) -> Self {
        match rejection {
            TokenRejection::NotFound => ReasonCode::NotFound,
            TokenRejection::AlreadyUsed => ReasonCode::AlreadyUsed,
            TokenRejection::Expired => ReasonCode::Expired,
            TokenRejection::ContextMismatch => ReasonCode::ContextMismatch,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output of the guard for one request.
#[derive(Debug, Clone)]
pub struct SecurityDecision {
    pub allow: bool,
    pub reason: ReasonCode,
    pub response_headers: HeaderSet,
    /// Remaining lockout for rate-limited denials.
    pub retry_after: Option<Duration>,
    /// Body after schema validation and sanitization.
    pub sanitized_body: Option<Value>,
    /// Content or structural violations found (neutralized ones included).
    pub violations: Vec<Violation>,
    /// Nonce embedded in the content security policy.
    pub nonce: CspNonce,
}

/// Pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    Received,
    RateChecked,
    TokenChecked,
    InputValidated,
    Decided,
}

impl GuardStage {
    pub fn next(self) -> Self {
        match self {
            GuardStage::Received => GuardStage::RateChecked,
            GuardStage::RateChecked => GuardStage::TokenChecked,
            GuardStage::TokenChecked => GuardStage::InputValidated,
            GuardStage::InputValidated | GuardStage::Decided => GuardStage::Decided,
        }
    }
}

/// Result of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    Deny(ReasonCode),
}

/// Per-request scratch state shared by the stages.
#[derive(Default)]
struct Evaluation {
    retry_after: Option<Duration>,
    sanitized_body: Option<Value>,
    violations: Vec<Violation>,
}

/// Orchestrates the security components for each request.
pub struct RequestGuard {
    limiter: Arc<RateLimiter>,
    tokens: Arc<TokenService>,
    headers: HeaderPolicy,
    router: ProfileRouter,
    csrf: CsrfConfig,
    settings: GuardSettings,
    metrics: Arc<GuardMetrics>,
    store: Arc<dyn SecurityStore>,
}

impl RequestGuard {
    /// Build a guard from validated configuration.
    ///
    /// The store and clock are passed in so a reload can rebuild the guard
    /// without losing attempt and token state.
    pub fn from_config(
        config: &GuardConfig,
        store: Arc<dyn SecurityStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<GuardMetrics>,
    ) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let headers = HeaderPolicy::new(&config.headers)?;
        let router = ProfileRouter::from_config(&config.routes, &config.schemas)?;
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.clone(),
            store.clone(),
            clock.clone(),
        ));
        let tokens = Arc::new(TokenService::new(&config.tokens, store.clone(), clock));

        tracing::info!(
            routes = router.len(),
            environment = ?config.guard.environment,
            failure_policy = ?config.guard.failure_policy,
            auth_failure_policy = ?config.guard.auth_failure_policy,
            "Request guard configured"
        );

        Ok(Self {
            limiter,
            tokens,
            headers,
            router,
            csrf: config.csrf.clone(),
            settings: config.guard.clone(),
            metrics,
            store,
        })
    }

    pub fn profile_for(&self, method: &Method, path: &str) -> Arc<RouteProfile> {
        self.router.profile_for(method, path)
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    pub fn metrics(&self) -> &Arc<GuardMetrics> {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn SecurityStore> {
        &self.store
    }

    pub fn environment(&self) -> Environment {
        self.settings.environment
    }

    pub fn csrf_config(&self) -> &CsrfConfig {
        &self.csrf
    }

    /// Headers for a response the guard did not evaluate (e.g. 413).
    pub fn headers_for(&self, ctx: &HeaderContext) -> HeaderSet {
        self.headers.headers_for(ctx)
    }

    /// Run the pipeline for one request.
    pub async fn evaluate(
        &self,
        req: &RequestDescriptor,
        profile: &RouteProfile,
    ) -> SecurityDecision {
        let key = req.identity_key();
        let mut eval = Evaluation::default();
        let mut stage = GuardStage::Received;

        let outcome = loop {
            let result = match stage {
                GuardStage::Received => self.rate_stage(req, profile, &key, &mut eval).await,
                GuardStage::RateChecked => self.token_stage(req, profile).await,
                GuardStage::TokenChecked => self.input_stage(req, profile, &mut eval),
                GuardStage::InputValidated | GuardStage::Decided => break StageOutcome::Continue,
            };
            if let StageOutcome::Deny(reason) = result {
                break StageOutcome::Deny(reason);
            }
            stage = stage.next();
        };

        let nonce = CspNonce::generate();
        let response_headers = self.headers.headers_for(&HeaderContext {
            secure: req.secure,
            nonce: Some(nonce.clone()),
        });

        let (allow, reason) = match outcome {
            StageOutcome::Continue => (true, ReasonCode::Allowed),
            StageOutcome::Deny(reason) => (false, reason),
        };

        if allow {
            self.metrics.record_allowed(&profile.name);
            tracing::debug!(
                request_id = %req.request_id,
                profile = %profile.name,
                "Request allowed"
            );
        } else {
            self.metrics.record_denied(&profile.name, reason.as_str());
            tracing::warn!(
                request_id = %req.request_id,
                profile = %profile.name,
                identity = %key,
                reason = %reason,
                "Request denied"
            );
            self.account_denial(req, profile, &key, reason).await;
        }

        SecurityDecision {
            allow,
            reason,
            response_headers,
            retry_after: eval.retry_after,
            sanitized_body: eval.sanitized_body,
            violations: eval.violations,
            nonce,
        }
    }

    async fn rate_stage(
        &self,
        req: &RequestDescriptor,
        profile: &RouteProfile,
        key: &IdentityKey,
        eval: &mut Evaluation,
    ) -> StageOutcome {
        if !profile.track_attempts {
            return StageOutcome::Continue;
        }
        match self.limiter.check(key).await {
            Ok(decision) if decision.allowed => StageOutcome::Continue,
            Ok(decision) => {
                eval.retry_after = decision.retry_after;
                StageOutcome::Deny(ReasonCode::RateLimited)
            }
            Err(e) => self.on_backend_error(req, profile, "rate_check", &e),
        }
    }

    async fn token_stage(&self, req: &RequestDescriptor, profile: &RouteProfile) -> StageOutcome {
        if !profile.csrf || !req.is_state_changing() {
            return StageOutcome::Continue;
        }

        let failure = match self.presented_token(req) {
            None => ReasonCode::TokenMissing,
            Some(token) => {
                match self
                    .tokens
                    .validate(token, TokenPurpose::Csrf, &req.token_context())
                    .await
                {
                    Ok(validation) => match validation.reason {
                        None => return StageOutcome::Continue,
                        Some(rejection) => ReasonCode::from(rejection),
                    },
                    Err(e) => return self.on_backend_error(req, profile, "token_check", &e),
                }
            }
        };

        match self.csrf.failure_policy {
            CsrfFailurePolicy::Reject => StageOutcome::Deny(failure),
            CsrfFailurePolicy::LogOnly => {
                self.metrics.record_csrf_log_only();
                tracing::warn!(
                    request_id = %req.request_id,
                    profile = %profile.name,
                    reason = %failure,
                    "CSRF check failed, continuing under log-only policy"
                );
                StageOutcome::Continue
            }
        }
    }

    fn input_stage(
        &self,
        req: &RequestDescriptor,
        profile: &RouteProfile,
        eval: &mut Evaluation,
    ) -> StageOutcome {
        let Some(schema) = &profile.schema else {
            return StageOutcome::Continue;
        };
        if !req.is_state_changing() && req.body.is_null() {
            return StageOutcome::Continue;
        }

        let body = self.body_without_token(&req.body);
        let result = input::validate(schema, &body);
        eval.violations = result.violations;
        if !result.valid {
            return StageOutcome::Deny(ReasonCode::InvalidInput);
        }
        if !eval.violations.is_empty() {
            tracing::info!(
                request_id = %req.request_id,
                profile = %profile.name,
                neutralized = eval.violations.len(),
                "Input sanitized"
            );
        }
        eval.sanitized_body = result.sanitized_value;
        StageOutcome::Continue
    }

    /// CSRF token from the header, falling back to the body field.
    fn presented_token<'a>(&self, req: &'a RequestDescriptor) -> Option<&'a str> {
        req.header(&self.csrf.header_name)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                req.body
                    .get(self.csrf.form_field.as_str())
                    .and_then(Value::as_str)
            })
    }

    fn body_without_token(&self, body: &Value) -> Value {
        let mut body = body.clone();
        if let Value::Object(map) = &mut body {
            map.remove(&self.csrf.form_field);
        }
        body
    }

    fn on_backend_error(
        &self,
        req: &RequestDescriptor,
        profile: &RouteProfile,
        stage: &'static str,
        err: &StoreError,
    ) -> StageOutcome {
        let policy = if profile.auth_endpoint {
            self.settings.auth_failure_policy
        } else {
            self.settings.failure_policy
        };
        match policy {
            FailurePolicy::FailOpen => {
                self.metrics.record_backend_error("fail-open");
                tracing::error!(
                    request_id = %req.request_id,
                    profile = %profile.name,
                    stage,
                    error = %err,
                    "Security store unavailable, failing open"
                );
                StageOutcome::Continue
            }
            FailurePolicy::FailClosed => {
                self.metrics.record_backend_error("fail-closed");
                tracing::error!(
                    request_id = %req.request_id,
                    profile = %profile.name,
                    stage,
                    error = %err,
                    "Security store unavailable, failing closed"
                );
                StageOutcome::Deny(ReasonCode::BackendUnavailable)
            }
        }
    }

    async fn account_denial(
        &self,
        req: &RequestDescriptor,
        profile: &RouteProfile,
        key: &IdentityKey,
        reason: ReasonCode,
    ) {
        let counts = reason.is_token_failure() || reason == ReasonCode::InvalidInput;
        if !(counts && profile.track_attempts && req.is_state_changing()) {
            return;
        }
        match self
            .limiter
            .record_outcome(key, &req.attempt_id, AttemptOutcome::Failure)
            .await
        {
            Ok(true) => self.metrics.record_attempt(false),
            Ok(false) => {}
            Err(e) => {
                self.metrics.record_backend_error("accounting");
                tracing::error!(
                    request_id = %req.request_id,
                    identity = %key,
                    error = %e,
                    "Failed to record denied attempt"
                );
            }
        }
    }

    /// Reporter the route handler uses to record its own outcome.
    pub fn attempt_reporter(&self, req: &RequestDescriptor) -> AttemptReporter {
        AttemptReporter {
            inner: Arc::new(ReporterInner {
                limiter: self.limiter.clone(),
                metrics: self.metrics.clone(),
                key: req.identity_key(),
                attempt_id: req.attempt_id.clone(),
                reported: AtomicBool::new(false),
            }),
        }
    }

    /// Issue a CSRF token bound to the request's context.
    pub async fn issue_csrf_token(&self, req: &RequestDescriptor) -> StoreResult<SecurityToken> {
        let token = self
            .tokens
            .issue(TokenPurpose::Csrf, &req.token_context())
            .await?;
        self.metrics.record_token_issued("csrf");
        Ok(token)
    }

    /// Issue a session-rotation token bound to the request's context.
    pub async fn issue_rotation_token(
        &self,
        req: &RequestDescriptor,
    ) -> StoreResult<SecurityToken> {
        let token = self
            .tokens
            .issue(TokenPurpose::SessionRotation, &req.token_context())
            .await?;
        self.metrics.record_token_issued("session_rotation");
        Ok(token)
    }
}

struct ReporterInner {
    limiter: Arc<RateLimiter>,
    metrics: Arc<GuardMetrics>,
    key: IdentityKey,
    attempt_id: String,
    reported: AtomicBool,
}

/// Records the outcome of an allowed request exactly once.
#[derive(Clone)]
pub struct AttemptReporter {
    inner: Arc<ReporterInner>,
}

impl AttemptReporter {
    pub fn identity_key(&self) -> &IdentityKey {
        &self.inner.key
    }

    pub async fn success(&self) -> StoreResult<bool> {
        self.report(AttemptOutcome::Success).await
    }

    pub async fn failure(&self) -> StoreResult<bool> {
        self.report(AttemptOutcome::Failure).await
    }

    /// Returns false if an outcome was already reported.
    async fn report(&self, outcome: AttemptOutcome) -> StoreResult<bool> {
        if self.inner.reported.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let recorded = self
            .inner
            .limiter
            .record_outcome(&self.inner.key, &self.inner.attempt_id, outcome)
            .await?;
        if recorded {
            self.inner
                .metrics
                .record_attempt(outcome == AttemptOutcome::Success);
        }
        Ok(recorded)
    }
}

impl fmt::Debug for AttemptReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptReporter")
            .field("identity", &self.inner.key)
            .field("attempt_id", &self.inner.attempt_id)
            .finish()
    }
}
