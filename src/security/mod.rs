//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (via guard.rs):
//!     → rate_limit.rs (attempt counts, lockouts)
//!     → tokens.rs (CSRF validation, one-time consumption)
//!     → input::validator (schema + content rules)
//!     → headers.rs (response header set, per-request nonce)
//!     → SecurityDecision
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Policy denials are values; only store failures are errors
//! - Store failures follow an explicit fail-open / fail-closed setting
//! - No trust in client input

pub mod guard;
pub mod headers;
pub mod rate_limit;
pub mod tokens;
pub mod types;

pub use guard::{
    AttemptReporter, GuardStage, ReasonCode, RequestDescriptor, RequestGuard, SecurityDecision,
    StageOutcome,
};
pub use headers::{CspNonce, HeaderContext, HeaderPolicy, HeaderSet};
pub use rate_limit::{AttemptOutcome, IdentityKey, RateDecision, RateLimiter};
pub use tokens::{Rotation, TokenPolicy, TokenRejection, TokenService, TokenValidation};
pub use types::{AttemptRecord, SecurityToken, TokenPurpose};
