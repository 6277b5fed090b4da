//! Route profile subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path)
//!     → router.rs (profile lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: matched RouteProfile or the default profile
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[] + [schemas.*]
//!     → Compile schemas, resolve references
//!     → Compile matchers (path prefix, methods)
//!     → Sort by prefix length
//!     → Freeze as immutable ProfileRouter
//! ```
//!
//! # Design Decisions
//! - Profiles compiled up front, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same profile
//! - Unmatched requests get the default profile, which still requires CSRF
//!   tokens on state-changing methods

pub mod matcher;
pub mod router;

use std::sync::Arc;

use crate::input::Schema;

pub use router::ProfileRouter;

/// Protections that apply to a matched route.
#[derive(Debug, Clone)]
pub struct RouteProfile {
    pub name: String,
    /// Count failures and enforce lockouts.
    pub track_attempts: bool,
    /// Require a CSRF token on state-changing methods.
    pub csrf: bool,
    /// Authentication endpoint; backend failures follow the auth policy.
    pub auth_endpoint: bool,
    pub schema: Option<Arc<Schema>>,
}

impl Default for RouteProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            track_attempts: false,
            csrf: true,
            auth_endpoint: false,
            schema: None,
        }
    }
}
