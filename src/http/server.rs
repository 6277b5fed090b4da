//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the storefront's Axum router with the guard middleware
//! - Mount the token issuance endpoints under `/security`
//! - Wire up middleware (tracing, timeout, request ID)
//! - Swap in reloaded configuration without dropping store state
//! - Run the store sweeper alongside the server
//!
//! # Design Decisions
//! - The guard lives behind an `ArcSwap`; each request loads one snapshot
//!   and uses it for its whole evaluation
//! - Store, clock and metrics are owned by `AppState`, so a reload keeps
//!   lockouts and outstanding tokens
//! - Listener settings are read once at startup; a reload that changes
//!   them takes effect on restart

use arc_swap::ArcSwap;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::error::ConfigError;
use crate::http::handlers;
use crate::http::middleware::guard_middleware;
use crate::observability::GuardMetrics;
use crate::security::RequestGuard;
use crate::store::{MemoryStore, SecurityStore, StoreSweeper};

/// One configuration generation.
pub struct GuardRuntime {
    pub guard: RequestGuard,
    pub config: GuardConfig,
}

/// Application state injected into middleware and handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<GuardRuntime>>,
    pub store: Arc<dyn SecurityStore>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<GuardMetrics>,
}

impl AppState {
    /// Build the state for an initial configuration.
    pub fn new(
        config: GuardConfig,
        store: Arc<dyn SecurityStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<GuardMetrics>,
    ) -> Result<Self, ConfigError> {
        let guard =
            RequestGuard::from_config(&config, store.clone(), clock.clone(), metrics.clone())?;
        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(GuardRuntime { guard, config })),
            store,
            clock,
            metrics,
        })
    }

    /// Current configuration generation.
    pub fn load(&self) -> Arc<GuardRuntime> {
        self.inner.load_full()
    }

    /// Replace the guard. On error the previous generation stays active.
    pub fn reload(&self, config: GuardConfig) -> Result<(), ConfigError> {
        let guard = RequestGuard::from_config(
            &config,
            self.store.clone(),
            self.clock.clone(),
            self.metrics.clone(),
        )?;
        self.inner.store(Arc::new(GuardRuntime { guard, config }));
        Ok(())
    }
}

/// HTTP server that guards a storefront router.
pub struct GuardServer {
    router: Router,
    state: AppState,
}

impl GuardServer {
    /// Create a server with an in-memory store and the system clock.
    pub fn new(config: GuardConfig, app: Router) -> Result<Self, ConfigError> {
        Self::with_store(
            config,
            app,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Arc::new(GuardMetrics::new()),
        )
    }

    /// Create a server over an explicit store, clock and metrics instance.
    pub fn with_store(
        config: GuardConfig,
        app: Router,
        store: Arc<dyn SecurityStore>,
        clock: Arc<dyn Clock>,
        metrics: Arc<GuardMetrics>,
    ) -> Result<Self, ConfigError> {
        let timeout = Duration::from_secs(config.listener.request_timeout_secs);
        let state = AppState::new(config, store, clock, metrics)?;
        let router = Self::build_router(app, state.clone(), timeout);
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(app: Router, state: AppState, timeout: Duration) -> Router {
        Router::new()
            .merge(app)
            .merge(handlers::security_routes(state.clone()))
            .layer(middleware::from_fn_with_state(state, guard_middleware))
            .layer(TimeoutLayer::new(timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for tests and embedding.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` replace the active guard.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let interval = Duration::from_secs(self.state.load().config.listener.sweep_interval_secs);
        let sweeper = StoreSweeper::new(self.state.store.clone(), self.state.clock.clone(), interval);
        tokio::spawn(sweeper.run(shutdown.resubscribe()));

        let reload_state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match reload_state.reload(config) {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => tracing::error!(
                        error = %e,
                        "Rejected configuration reload, keeping current configuration"
                    ),
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
