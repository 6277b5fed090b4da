//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::input::schema::SchemaConfig;

/// Root configuration for the request guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Failed-attempt counting and lockout.
    pub rate_limit: RateLimitConfig,

    /// Token lifetimes per purpose.
    pub tokens: TokenConfig,

    /// Where CSRF tokens are read from and what happens when they fail.
    pub csrf: CsrfConfig,

    /// Response security header policy.
    pub headers: HeaderPolicyConfig,

    /// Guard-wide behaviour (environment, backend failure policy).
    pub guard: GuardSettings,

    /// Route profiles, matched by path prefix.
    pub routes: Vec<RouteConfig>,

    /// Named input schemas referenced by routes.
    pub schemas: BTreeMap<String, SchemaConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes buffered for inspection.
    pub max_body_size: usize,

    /// Request timeout in seconds (enforced by the HTTP stack, not the guard).
    pub request_timeout_secs: u64,

    /// Interval between store sweeps for expired records.
    pub sweep_interval_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 64 * 1024,
            request_timeout_secs: 30,
            sweep_interval_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key shipped in defaults; refused when the admin API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Failed-attempt limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Failures within one window that trigger a lockout.
    pub threshold: u32,

    /// Counting window in seconds.
    pub window_secs: u64,

    /// Lockout for the first excess failure, in seconds.
    pub lockout_base_secs: u64,

    /// Upper bound on any single lockout, in seconds.
    pub lockout_max_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn lockout_base(&self) -> Duration {
        Duration::from_secs(self.lockout_base_secs)
    }

    pub fn lockout_max(&self) -> Duration {
        Duration::from_secs(self.lockout_max_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_secs: 60,
            lockout_base_secs: 30,
            lockout_max_secs: 15 * 60,
        }
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// CSRF token lifetime in seconds.
    pub csrf_ttl_secs: u64,

    /// CSRF tokens are consumed on first successful validation.
    pub csrf_one_time: bool,

    /// Session rotation token lifetime in seconds. Always one-time.
    pub session_rotation_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            csrf_ttl_secs: 3600,
            csrf_one_time: true,
            session_rotation_ttl_secs: 900,
        }
    }
}

/// What to do with a request whose CSRF token fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CsrfFailurePolicy {
    Reject,
    LogOnly,
}

/// CSRF token transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub failure_policy: CsrfFailurePolicy,

    /// Request header carrying the token.
    pub header_name: String,

    /// Body field carrying the token (form posts).
    pub form_field: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            failure_policy: CsrfFailurePolicy::Reject,
            header_name: "x-csrf-token".to_string(),
            form_field: "_csrf".to_string(),
        }
    }
}

/// Response header policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderPolicyConfig {
    /// `default-src` allow-list. Must not be empty.
    pub default_sources: Vec<String>,
    pub script_sources: Vec<String>,
    pub style_sources: Vec<String>,
    pub img_sources: Vec<String>,
    pub connect_sources: Vec<String>,
    /// Origins allowed in frames (payment processor widgets).
    pub frame_sources: Vec<String>,
    pub form_action: Vec<String>,
    /// Origins added to script, connect and frame directives.
    pub trusted_origins: Vec<String>,
    pub report_uri: Option<String>,

    pub hsts_enabled: bool,
    pub hsts_max_age_secs: u64,
    pub hsts_include_subdomains: bool,
    pub hsts_preload: bool,

    /// `cross-origin-embedder-policy`; `None` omits the header.
    pub cross_origin_embedder_policy: Option<String>,
    pub referrer_policy: String,
    pub permissions_policy: String,
}

impl Default for HeaderPolicyConfig {
    fn default() -> Self {
        let self_only = vec!["'self'".to_string()];
        Self {
            default_sources: self_only.clone(),
            script_sources: self_only.clone(),
            style_sources: self_only.clone(),
            img_sources: vec!["'self'".to_string(), "data:".to_string()],
            connect_sources: self_only.clone(),
            frame_sources: Vec::new(),
            form_action: self_only,
            trusted_origins: Vec::new(),
            report_uri: None,
            hsts_enabled: true,
            hsts_max_age_secs: 31_536_000,
            hsts_include_subdomains: true,
            hsts_preload: false,
            cross_origin_embedder_policy: Some("require-corp".to_string()),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: "camera=(), microphone=(), geolocation=(), payment=(self)"
                .to_string(),
        }
    }
}

/// Deployment environment; controls how much denial detail is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Behaviour when the store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    FailOpen,
    #[default]
    FailClosed,
}

/// Guard-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardSettings {
    pub environment: Environment,

    /// Store-failure policy for ordinary routes.
    pub failure_policy: FailurePolicy,

    /// Store-failure policy for authentication routes.
    pub auth_failure_policy: FailurePolicy,
}

/// A route profile: which protections apply under a path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Profile identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Restrict the profile to these methods (empty = any).
    #[serde(default)]
    pub methods: Vec<String>,

    /// Count failures and enforce lockouts.
    #[serde(default)]
    pub track_attempts: bool,

    /// Require a CSRF token on state-changing methods.
    #[serde(default = "default_true")]
    pub csrf: bool,

    /// Authentication endpoint (uses `auth_failure_policy`).
    #[serde(default)]
    pub auth_endpoint: bool,

    /// Name of the input schema to apply.
    #[serde(default)]
    pub schema: Option<String>,
}

fn default_true() -> bool {
    true
}
