use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::http::server::AppState;

/// Bearer-token check against the key of the active configuration.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let runtime = state.load();
    let expected = runtime.config.admin.api_key.as_bytes();

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(key) if bool::from(key.as_bytes().ct_eq(expected)) => Ok(next.run(request).await),
        _ => {
            tracing::warn!("Rejected admin request with missing or invalid key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
