use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::clock::{Clock, Timestamp};
use crate::config::{Environment, FailurePolicy};
use crate::error::StoreError;
use crate::http::server::AppState;
use crate::observability::MetricsSnapshot;
use crate::security::{AttemptRecord, IdentityKey};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub environment: Environment,
    pub failure_policy: FailurePolicy,
    pub auth_failure_policy: FailurePolicy,
    pub routes: usize,
}

#[derive(Serialize)]
pub struct LockoutStatus {
    pub identity_key: String,
    pub failures: u32,
    pub window_start: Timestamp,
    pub locked: bool,
    pub locked_until: Option<Timestamp>,
}

impl LockoutStatus {
    fn from_record(record: AttemptRecord, now: Timestamp) -> Self {
        Self {
            locked: record.is_locked(now),
            identity_key: record.identity_key,
            failures: record.count,
            window_start: record.window_start,
            locked_until: record.locked_until,
        }
    }
}

fn store_error(err: StoreError) -> Response {
    tracing::error!(error = %err, "Admin request failed against the security store");
    (StatusCode::SERVICE_UNAVAILABLE, err.to_string()).into_response()
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let runtime = state.load();
    let settings = &runtime.config.guard;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        environment: settings.environment,
        failure_policy: settings.failure_policy,
        auth_failure_policy: settings.auth_failure_policy,
        routes: runtime.config.routes.len(),
    })
}

pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

pub async fn get_lockout(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let runtime = state.load();
    match runtime
        .guard
        .limiter()
        .lockout_status(&IdentityKey::from_raw(key))
        .await
    {
        Ok(Some(record)) => {
            Json(LockoutStatus::from_record(record, state.clock.now())).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error(e),
    }
}

pub async fn clear_lockout(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let runtime = state.load();
    match runtime.guard.limiter().clear(&IdentityKey::from_raw(key.as_str())).await {
        Ok(()) => {
            tracing::info!(identity = %key, "Lockout cleared by operator");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_error(e),
    }
}

pub async fn revoke_token(State(state): State<AppState>, Path(token_id): Path<String>) -> Response {
    let runtime = state.load();
    match runtime.guard.tokens().revoke(&token_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error(e),
    }
}
