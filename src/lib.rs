//! Storefront request guard.
//!
//! Security middleware for an e-commerce site built on Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                    REQUEST GUARD                     │
//!                          │                                                      │
//!                          │  ┌────────────┐   ┌──────────┐  ┌─────────────────┐  │
//!     ─────────────────────┼─▶│    http    │──▶│ routing  │─▶│ security::guard │  │
//!                          │  │ middleware │   │ profiles │  │   (pipeline)    │  │
//!                          │  └────────────┘   └──────────┘  └────────┬────────┘  │
//!                          │                                          │           │
//!                          │        ┌──────────────┬──────────────────┼────────┐  │
//!                          │        ▼              ▼                  ▼        │  │
//!                          │  ┌───────────┐  ┌───────────┐  ┌──────────────┐    │  │
//!                          │  │rate_limit │  │  tokens   │  │    input     │    │  │
//!                          │  └─────┬─────┘  └─────┬─────┘  │  sanitizer   │    │  │
//!                          │        └───────┬──────┘        └──────────────┘    │  │
//!                          │                ▼                                   │  │
//!                          │          ┌───────────┐        ┌──────────────┐     │  │
//!                          │          │   store   │        │   headers    │◀────┘  │
//!                          │          └───────────┘        └──────────────┘        │
//!     Client Response      │                                                      │
//!     ◀────────────────────┼── security headers + storefront handler response      │
//!                          │                                                      │
//!                          │  ┌────────────────────────────────────────────────┐  │
//!                          │  │             Cross-Cutting Concerns             │  │
//!                          │  │  config (+ hot reload) · observability · admin │  │
//!                          │  │  lifecycle (signals, shutdown)                 │  │
//!                          │  └────────────────────────────────────────────────┘  │
//!                          └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod clock;
pub mod error;
pub mod input;
pub mod routing;
pub mod security;
pub mod store;

// Adapters
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GuardConfig;
pub use http::GuardServer;
pub use lifecycle::Shutdown;
pub use security::RequestGuard;
