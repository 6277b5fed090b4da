//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map guard denials to HTTP status codes and a JSON error body
//! - Apply the security header set to every response
//!
//! # Design Decisions
//! - The error body carries the public code only; internal reason codes
//!   stay in the logs
//! - Violations are listed in development so form authors can see which
//!   rule fired; production omits them
//! - `Retry-After` is whole seconds rounded up, never 0

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

use crate::config::Environment;
use crate::input::Violation;
use crate::security::{HeaderSet, ReasonCode, SecurityDecision};

/// JSON body of a rejected request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub request_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

/// HTTP status for a denial reason.
pub fn status_for(reason: ReasonCode) -> StatusCode {
    match reason {
        ReasonCode::Allowed => StatusCode::OK,
        ReasonCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ReasonCode::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
        ReasonCode::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ReasonCode::TokenMissing
        | ReasonCode::NotFound
        | ReasonCode::AlreadyUsed
        | ReasonCode::Expired
        | ReasonCode::ContextMismatch => StatusCode::FORBIDDEN,
    }
}

/// Seconds for a `Retry-After` header.
pub fn retry_after_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

/// Copy the security headers onto a response, replacing existing values.
pub fn apply_security_headers(target: &mut HeaderMap, headers: &HeaderSet) {
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                target.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping unrepresentable security header"),
        }
    }
}

/// Response for a denied request.
pub fn rejection_response(
    decision: &SecurityDecision,
    request_id: &str,
    environment: Environment,
) -> Response {
    let violations = match environment {
        Environment::Development => decision.violations.clone(),
        Environment::Production => Vec::new(),
    };
    let body = ErrorBody {
        error: decision.reason.public_code(environment),
        request_id: request_id.to_string(),
        violations,
    };

    let mut response = (status_for(decision.reason), Json(body)).into_response();
    apply_security_headers(response.headers_mut(), &decision.response_headers);
    if let Some(retry_after) = decision.retry_after {
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(retry_after_secs(retry_after)),
        );
    }
    response
}

/// Response for a body over the configured limit.
pub fn payload_too_large(request_id: &str, headers: &HeaderSet) -> Response {
    let body = ErrorBody {
        error: "payload_too_large",
        request_id: request_id.to_string(),
        violations: Vec::new(),
    };
    let mut response = (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response();
    apply_security_headers(response.headers_mut(), headers);
    response
}
