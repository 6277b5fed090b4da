//! Operator API, served on its own listener.
//!
//! - `GET /admin/status`: version, environment and failure policies
//! - `GET /admin/metrics`: guard counters
//! - `GET|DELETE /admin/lockouts/{key}`: inspect or clear an identity's record
//! - `DELETE /admin/tokens/{id}`: revoke an outstanding token

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/metrics", get(get_metrics))
        .route("/admin/lockouts/{key}", get(get_lockout).delete(clear_lockout))
        .route("/admin/tokens/{id}", delete(revoke_token))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Timestamp};
    use crate::config::GuardConfig;
    use crate::observability::GuardMetrics;
    use crate::security::IdentityKey;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let mut config = GuardConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "operator-key".into();
        AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Timestamp::from_millis(0))),
            Arc::new(GuardMetrics::new()),
        )
        .unwrap()
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let app = setup_admin_router(state());
        let res = app
            .clone()
            .oneshot(request("GET", "/admin/status", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(request("GET", "/admin/status", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(request("GET", "/admin/status", Some("operator-key")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_lockout_inspect_and_clear() {
        let state = state();
        let key = IdentityKey::from_raw("ip:10.0.0.1");
        state.load().guard.limiter().record_failure(&key).await.unwrap();
        let app = setup_admin_router(state.clone());

        let res = app
            .clone()
            .oneshot(request("GET", "/admin/lockouts/ip:10.0.0.1", Some("operator-key")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(request("DELETE", "/admin/lockouts/ip:10.0.0.1", Some("operator-key")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = app
            .oneshot(request("GET", "/admin/lockouts/ip:10.0.0.1", Some("operator-key")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_revoke_unknown_token_is_not_found() {
        let app = setup_admin_router(state());
        let res = app
            .oneshot(request("DELETE", &format!("/admin/tokens/{}", "ab".repeat(32)), Some("operator-key")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
