//! Input validation subsystem.
//!
//! # Data Flow
//! ```text
//! [schemas.*] config / SchemaConfig builder
//!     → schema.rs (compile once, reject contradictions)
//!     → Schema (immutable, shared via Arc)
//!
//! Request body (JSON or form):
//!     → validator.rs pass 1 (structure, types, ranges, formats)
//!     → validator.rs pass 2 (content rules on string fields)
//!         → sanitizer.rs (normalize, detect, sanitize)
//!     → ValidationResult
//! ```

pub mod sanitizer;
pub mod schema;
pub mod validator;

pub use sanitizer::{sanitize, ContentRule, Severity};
pub use schema::{ContentPolicy, FieldConfig, Schema, SchemaConfig, StringFormat};
pub use validator::{validate, ValidationResult, Violation};
