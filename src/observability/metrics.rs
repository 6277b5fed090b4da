//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Count guard decisions, backend failures and attempt accounting
//! - Expose Prometheus-compatible metrics endpoint
//! - Provide a snapshot for the admin API
//!
//! # Metrics
//! - `guard_decisions_total` (counter): decisions by outcome and reason
//! - `guard_backend_errors_total` (counter): store failures by policy applied
//! - `guard_attempts_recorded_total` (counter): accounting events by outcome
//! - `guard_tokens_issued_total` (counter): tokens by purpose
//!
//! # Design Decisions
//! - `GuardMetrics` is an injected instance, not a global; tests create
//!   isolated copies
//! - Every update also goes through the `metrics` facade, which is a no-op
//!   until `init_metrics` installs the recorder
//! - Low-overhead metric updates (atomic operations)

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Counters for one guard instance.
#[derive(Debug, Default)]
pub struct GuardMetrics {
    allowed: AtomicU64,
    rate_limited: AtomicU64,
    invalid_token: AtomicU64,
    invalid_input: AtomicU64,
    backend_unavailable: AtomicU64,
    csrf_log_only: AtomicU64,
    backend_errors: AtomicU64,
    failures_recorded: AtomicU64,
    successes_recorded: AtomicU64,
    tokens_issued: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub allowed: u64,
    pub rate_limited: u64,
    pub invalid_token: u64,
    pub invalid_input: u64,
    pub backend_unavailable: u64,
    pub csrf_log_only: u64,
    pub backend_errors: u64,
    pub failures_recorded: u64,
    pub successes_recorded: u64,
    pub tokens_issued: u64,
}

impl MetricsSnapshot {
    pub fn denied(&self) -> u64 {
        self.rate_limited + self.invalid_token + self.invalid_input + self.backend_unavailable
    }
}

impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allowed(&self, profile: &str) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "guard_decisions_total",
            "decision" => "allow",
            "profile" => profile.to_string()
        )
        .increment(1);
    }

    /// Count a denial. `reason` is the internal reason code.
    pub fn record_denied(&self, profile: &str, reason: &'static str) {
        let counter = match reason {
            "RATE_LIMITED" => &self.rate_limited,
            "BACKEND_UNAVAILABLE" => &self.backend_unavailable,
            "INVALID_INPUT" => &self.invalid_input,
            _ => &self.invalid_token,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(
            "guard_decisions_total",
            "decision" => "deny",
            "reason" => reason,
            "profile" => profile.to_string()
        )
        .increment(1);
    }

    pub fn record_csrf_log_only(&self) {
        self.csrf_log_only.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("guard_csrf_log_only_total").increment(1);
    }

    /// Count a store failure and the policy that was applied to it.
    pub fn record_backend_error(&self, policy: &'static str) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("guard_backend_errors_total", "policy" => policy).increment(1);
    }

    pub fn record_attempt(&self, success: bool) {
        let (counter, outcome) = if success {
            (&self.successes_recorded, "success")
        } else {
            (&self.failures_recorded, "failure")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("guard_attempts_recorded_total", "outcome" => outcome).increment(1);
    }

    pub fn record_token_issued(&self, purpose: &'static str) {
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("guard_tokens_issued_total", "purpose" => purpose).increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            invalid_token: self.invalid_token.load(Ordering::Relaxed),
            invalid_input: self.invalid_input.load(Ordering::Relaxed),
            backend_unavailable: self.backend_unavailable.load(Ordering::Relaxed),
            csrf_log_only: self.csrf_log_only.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            failures_recorded: self.failures_recorded.load(Ordering::Relaxed),
            successes_recorded: self.successes_recorded.load(Ordering::Relaxed),
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.allowed,
            &self.rate_limited,
            &self.invalid_token,
            &self.invalid_input,
            &self.backend_unavailable,
            &self.csrf_log_only,
            &self.backend_errors,
            &self.failures_recorded,
            &self.successes_recorded,
            &self.tokens_issued,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Install the Prometheus recorder with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
