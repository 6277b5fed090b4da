//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → GuardConfig (validated, immutable)
//!     → RequestGuard::from_config (compile schemas, routes, header policy)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server rebuilds the guard on the same store
//!     → atomic swap of Arc<RequestGuard>
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - An invalid reload is logged and ignored; the running guard stays

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config};
pub use schema::{
    AdminConfig, CsrfConfig, CsrfFailurePolicy, Environment, FailurePolicy, GuardConfig,
    GuardSettings, HeaderPolicyConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    RouteConfig, TokenConfig,
};
pub use watcher::ConfigWatcher;
