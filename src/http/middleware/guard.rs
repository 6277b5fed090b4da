//! Guard middleware.
//!
//! Runs every request through the `RequestGuard` before the storefront
//! handler sees it.
//!
//! # Data Flow
//! ```text
//! Request
//!     → buffer body (limit: listener.max_body_size)
//!     → build RequestDescriptor
//!     → RequestGuard::evaluate
//!         deny  → error response + security headers
//!         allow → sanitized body, extensions, handler
//!     → security headers on the handler's response
//! ```
//!
//! Handlers can read from the request extensions:
//! - `RequestDescriptor`: the normalized request
//! - `CspNonce`: nonce to put on inline `<script>` tags
//! - `AttemptReporter`: present on tracked routes; report the credential
//!   check outcome through it

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::http::request::{build_descriptor, is_secure, request_id};
use crate::http::response::{apply_security_headers, payload_too_large, rejection_response};
use crate::http::server::AppState;
use crate::security::HeaderContext;

pub async fn guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let runtime = state.load();
    let guard = &runtime.guard;
    let limit = runtime.config.listener.max_body_size;

    let (mut parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let id = request_id(&parts.headers);
            tracing::warn!(request_id = %id, limit, error = %e, "Request body rejected");
            let headers = guard.headers_for(&HeaderContext {
                secure: is_secure(&parts),
                nonce: None,
            });
            return payload_too_large(&id, &headers);
        }
    };

    let descriptor = build_descriptor(&parts, &bytes);
    let profile = guard.profile_for(&descriptor.method, &descriptor.path);
    let decision = guard.evaluate(&descriptor, &profile).await;

    if !decision.allow {
        return rejection_response(&decision, &descriptor.request_id, guard.environment());
    }

    let body = match &decision.sanitized_body {
        Some(sanitized) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            parts.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            Body::from(sanitized.to_string())
        }
        None => Body::from(bytes),
    };

    parts.extensions.insert(decision.nonce.clone());
    if profile.track_attempts {
        parts.extensions.insert(guard.attempt_reporter(&descriptor));
    }
    parts.extensions.insert(descriptor);

    let mut response = next.run(Request::from_parts(parts, body)).await;
    apply_security_headers(response.headers_mut(), &decision.response_headers);
    response
}
