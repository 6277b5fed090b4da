//! Standalone guard server.
//!
//! Runs the request guard in front of a placeholder echo application so a
//! configuration can be exercised end to end. Storefronts embed
//! `GuardServer` with their own router instead.

use axum::{
    extract::Request,
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use storefront_guard::admin::setup_admin_router;
use storefront_guard::config::{load_config, ConfigWatcher, GuardConfig};
use storefront_guard::lifecycle::{shutdown_signal, Shutdown};
use storefront_guard::observability::{init_tracing, metrics::init_metrics};
use storefront_guard::security::{CspNonce, RequestDescriptor};
use storefront_guard::GuardServer;

#[derive(Parser)]
#[command(name = "storefront-guard")]
#[command(about = "Request security layer for storefront applications", long_about = None)]
struct Args {
    /// Path to the TOML configuration file; defaults are used when omitted
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if args.check {
        println!("Configuration OK");
        return Ok(());
    }

    init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "storefront-guard starting");
    if args.config.is_none() {
        tracing::warn!("No configuration file given, running with defaults");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.guard.environment,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = GuardServer::new(config.clone(), echo_app())?;

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin = setup_admin_router(server.state().clone());
        let admin_shutdown = shutdown.signalled();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(admin_shutdown)
                .await
            {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    // The watcher must outlive the server for reloads to keep arriving.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, &config);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Echo handler: reports what the guard forwarded.
fn echo_app() -> Router {
    Router::new()
        .route("/", any(echo))
        .route("/{*path}", any(echo))
}

async fn echo(request: Request) -> impl IntoResponse {
    let extensions = request.extensions();
    let descriptor = extensions.get::<RequestDescriptor>();
    Json(serde_json::json!({
        "request_id": descriptor.map(|d| d.request_id.as_str()),
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "nonce": extensions.get::<CspNonce>().map(CspNonce::as_str),
    }))
}
