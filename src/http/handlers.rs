//! Token endpoints mounted next to the storefront routes.
//!
//! - `GET /security/csrf-token`: issue a CSRF token for the caller's session
//! - `GET /security/session/token`: issue a session-rotation token
//! - `POST /security/session/rotate`: consume a rotation token, get its successor
//!
//! These run behind the guard middleware like any other route, so the
//! rotate call needs a CSRF token of its own.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use crate::clock::Timestamp;
use crate::config::Environment;
use crate::error::StoreError;
use crate::http::response::ErrorBody;
use crate::http::server::AppState;
use crate::security::{AttemptReporter, ReasonCode, RequestDescriptor, Rotation};

/// Header a client may use instead of the `token` body field.
pub const ROTATION_TOKEN_HEADER: &str = "x-rotation-token";

#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub token: String,
    pub expires_at: Timestamp,
    pub header_name: String,
    pub form_field: String,
}

#[derive(Debug, Serialize)]
pub struct RotationTokenResponse {
    pub token: String,
    pub expires_at: Timestamp,
}

pub fn security_routes(state: AppState) -> Router {
    Router::new()
        .route("/security/csrf-token", get(issue_csrf_token))
        .route("/security/session/token", get(issue_rotation_token))
        .route("/security/session/rotate", post(rotate_session))
        .with_state(state)
}

fn error_response(status: StatusCode, error: &'static str, request_id: &str) -> Response {
    let body = ErrorBody {
        error,
        request_id: request_id.to_string(),
        violations: Vec::new(),
    };
    (status, Json(body)).into_response()
}

fn store_unavailable(request_id: &str, err: &StoreError) -> Response {
    tracing::error!(request_id = %request_id, error = %err, "Token store unavailable");
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        ReasonCode::BackendUnavailable.public_code(Environment::Production),
        request_id,
    )
}

fn descriptor(request: &Request) -> Result<RequestDescriptor, Response> {
    request
        .extensions()
        .get::<RequestDescriptor>()
        .cloned()
        .ok_or_else(|| {
            tracing::error!("Security route reached without the guard middleware");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

pub async fn issue_csrf_token(State(state): State<AppState>, request: Request) -> Response {
    let req = match descriptor(&request) {
        Ok(req) => req,
        Err(response) => return response,
    };
    let runtime = state.load();
    match runtime.guard.issue_csrf_token(&req).await {
        Ok(token) => {
            let csrf = runtime.guard.csrf_config();
            Json(CsrfTokenResponse {
                token: token.token_id,
                expires_at: token.expires_at,
                header_name: csrf.header_name.clone(),
                form_field: csrf.form_field.clone(),
            })
            .into_response()
        }
        Err(e) => store_unavailable(&req.request_id, &e),
    }
}

pub async fn issue_rotation_token(State(state): State<AppState>, request: Request) -> Response {
    let req = match descriptor(&request) {
        Ok(req) => req,
        Err(response) => return response,
    };
    match state.load().guard.issue_rotation_token(&req).await {
        Ok(token) => Json(RotationTokenResponse {
            token: token.token_id,
            expires_at: token.expires_at,
        })
        .into_response(),
        Err(e) => store_unavailable(&req.request_id, &e),
    }
}

pub async fn rotate_session(State(state): State<AppState>, request: Request) -> Response {
    let req = match descriptor(&request) {
        Ok(req) => req,
        Err(response) => return response,
    };
    let reporter = request.extensions().get::<AttemptReporter>().cloned();
    let runtime = state.load();
    let guard = &runtime.guard;
    let environment = guard.environment();

    let presented = req
        .header(ROTATION_TOKEN_HEADER)
        .map(str::to_string)
        .or_else(|| req.body.get("token").and_then(Value::as_str).map(str::to_string));
    let Some(presented) = presented else {
        return error_response(
            StatusCode::FORBIDDEN,
            ReasonCode::TokenMissing.public_code(environment),
            &req.request_id,
        );
    };

    let outcome = match guard.tokens().rotate(&presented, &req.token_context()).await {
        Ok(outcome) => outcome,
        Err(e) => return store_unavailable(&req.request_id, &e),
    };

    let success = matches!(outcome, Rotation::Rotated(_));
    if let Some(reporter) = reporter {
        let reported = if success {
            reporter.success().await
        } else {
            reporter.failure().await
        };
        if let Err(e) = reported {
            tracing::error!(request_id = %req.request_id, error = %e, "Failed to record rotation outcome");
        }
    }

    match outcome {
        Rotation::Rotated(token) => {
            guard.metrics().record_token_issued("session_rotation");
            tracing::info!(request_id = %req.request_id, "Session rotation token exchanged");
            Json(RotationTokenResponse {
                token: token.token_id,
                expires_at: token.expires_at,
            })
            .into_response()
        }
        Rotation::Rejected(rejection) => {
            let reason = ReasonCode::from(rejection);
            tracing::warn!(request_id = %req.request_id, reason = %reason, "Session rotation rejected");
            error_response(
                StatusCode::FORBIDDEN,
                reason.public_code(environment),
                &req.request_id,
            )
        }
    }
}
