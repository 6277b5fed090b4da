//! HTTP adapter for the request guard.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → middleware/guard.rs (buffer body, evaluate, attach extensions)
//!         → request.rs (normalize into a RequestDescriptor)
//!     → storefront handler or handlers.rs (token endpoints)
//!     → response.rs (status mapping, security headers)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{AuthenticatedUser, X_REQUEST_ID};
pub use server::{AppState, GuardRuntime, GuardServer};
