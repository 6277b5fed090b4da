//! Hot reload of the guard configuration file.
//!
//! # Responsibilities
//! - Watch the config file and hand validated configurations to the server
//! - Drop events that leave the file content unchanged
//! - Warn about settings that only take effect on restart
//!
//! # Data Flow
//! ```text
//! notify event → ReloadGate::on_change → load_config → mpsc → AppState::reload
//! ```

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::parse_config;
use crate::config::schema::GuardConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RestartOnly {
    bind_address: String,
    request_timeout_secs: u64,
    sweep_interval_secs: u64,
    admin_enabled: bool,
    admin_bind_address: String,
    metrics_address: String,
}

impl RestartOnly {
    fn of(config: &GuardConfig) -> Self {
        Self {
            bind_address: config.listener.bind_address.clone(),
            request_timeout_secs: config.listener.request_timeout_secs,
            sweep_interval_secs: config.listener.sweep_interval_secs,
            admin_enabled: config.admin.enabled,
            admin_bind_address: config.admin.bind_address.clone(),
            metrics_address: config.observability.metrics_address.clone(),
        }
    }
}

/// Decides which file changes become reloads.
#[derive(Debug)]
pub struct ReloadGate {
    path: PathBuf,
    last_content: Option<String>,
    startup: Option<RestartOnly>,
}

impl ReloadGate {
    pub fn new(path: &Path, running: Option<&GuardConfig>) -> Self {
        Self {
            path: path.to_path_buf(),
            last_content: fs::read_to_string(path).ok(),
            startup: running.map(RestartOnly::of),
        }
    }

    /// Re-read the file; returns a configuration worth applying.
    ///
    /// Invalid files keep the running configuration.
    pub fn on_change(&mut self) -> Option<GuardConfig> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Config file unreadable");
                return None;
            }
        };
        if self.last_content.as_deref() == Some(content.as_str()) {
            tracing::debug!(path = ?self.path, "Config file touched without changes");
            return None;
        }

        let config = match parse_config(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = ?self.path,
                    error = %e,
                    "Rejected config change, keeping current configuration"
                );
                return None;
            }
        };
        self.last_content = Some(content);

        if let Some(startup) = &self.startup {
            if *startup != RestartOnly::of(&config) {
                tracing::warn!(
                    path = ?self.path,
                    "Listener, admin or metrics settings changed; they apply after restart"
                );
            }
        }
        Some(config)
    }
}

/// Watches the configuration file and forwards validated updates.
pub struct ConfigWatcher {
    gate: ReloadGate,
    update_tx: mpsc::UnboundedSender<GuardConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiver `GuardServer::run` consumes.
    pub fn new(
        path: &Path,
        running: &GuardConfig,
    ) -> (Self, mpsc::UnboundedReceiver<GuardConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let gate = ReloadGate::new(path, Some(running));
        (Self { gate, update_tx }, update_rx)
    }

    /// Start watching; keep the returned handle alive for reloads to continue.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { mut gate, update_tx } = self;
        let path = gate.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(config) = gate.on_change() {
                        tracing::info!(path = ?gate.path, "Config change accepted");
                        if update_tx.send(config).is_err() {
                            tracing::debug!("Server gone, dropping config update");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
