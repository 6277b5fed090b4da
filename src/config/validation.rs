//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing schemas)
//! - Validate value ranges (thresholds and lifetimes > 0, lockout base <= max)
//! - Check header source allow-lists and addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::{HeaderName, Method};
use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{GuardConfig, PLACEHOLDER_API_KEY};
use crate::error::ValidationError;
use crate::input::Schema;
use crate::security::headers::validate_sources;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_listener(config, &mut errors);
    check_observability(config, &mut errors);
    check_admin(config, &mut errors);
    check_rate_limit(config, &mut errors);
    check_tokens(config, &mut errors);
    check_csrf(config, &mut errors);
    errors.extend(validate_sources(&config.headers));
    check_schemas(config, &mut errors);
    check_routes(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a socket address", value),
        ));
    }
}

fn positive(field: &str, value: u64, errors: &mut Vec<ValidationError>) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than 0"));
    }
}

fn check_listener(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    let listener = &config.listener;
    check_address("listener.bind_address", &listener.bind_address, errors);
    positive("listener.max_body_size", listener.max_body_size as u64, errors);
    positive("listener.request_timeout_secs", listener.request_timeout_secs, errors);
    positive("listener.sweep_interval_secs", listener.sweep_interval_secs, errors);
}

fn check_observability(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_enabled {
        check_address("observability.metrics_address", &obs.metrics_address, errors);
    }
}

fn check_admin(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    let admin = &config.admin;
    if !admin.enabled {
        return;
    }
    if admin.api_key.is_empty() || admin.api_key == PLACEHOLDER_API_KEY {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a non-default value when the admin API is enabled",
        ));
    }
    check_address("admin.bind_address", &admin.bind_address, errors);
}

fn check_rate_limit(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    let rl = &config.rate_limit;
    positive("rate_limit.threshold", rl.threshold as u64, errors);
    positive("rate_limit.window_secs", rl.window_secs, errors);
    positive("rate_limit.lockout_base_secs", rl.lockout_base_secs, errors);
    if rl.lockout_base_secs > rl.lockout_max_secs {
        errors.push(ValidationError::new(
            "rate_limit.lockout_max_secs",
            format!(
                "must be at least lockout_base_secs ({})",
                rl.lockout_base_secs
            ),
        ));
    }
}

fn check_tokens(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    positive("tokens.csrf_ttl_secs", config.tokens.csrf_ttl_secs, errors);
    positive(
        "tokens.session_rotation_ttl_secs",
        config.tokens.session_rotation_ttl_secs,
        errors,
    );
}

fn check_csrf(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    if HeaderName::from_bytes(config.csrf.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "csrf.header_name",
            format!("'{}' is not a valid header name", config.csrf.header_name),
        ));
    }
    if config.csrf.form_field.trim().is_empty() {
        errors.push(ValidationError::new("csrf.form_field", "must not be empty"));
    }
}

fn check_schemas(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    for (name, schema) in &config.schemas {
        if let Err(e) = Schema::compile(name.as_str(), schema) {
            errors.push(ValidationError::new(format!("schemas.{}", name), e.to_string()));
        }
    }
}

fn check_routes(config: &GuardConfig, errors: &mut Vec<ValidationError>) {
    let mut names = HashSet::new();
    for (idx, route) in config.routes.iter().enumerate() {
        let field = |suffix: &str| format!("routes[{}].{}", idx, suffix);

        if route.name.trim().is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(
                field("name"),
                format!("duplicate route name '{}'", route.name),
            ));
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(
                field("path_prefix"),
                format!("'{}' must start with '/'", route.path_prefix),
            ));
        }
        for method in &route.methods {
            if Method::from_bytes(method.to_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::new(
                    field("methods"),
                    format!("unknown method '{}'", method),
                ));
            }
        }
        if let Some(schema) = &route.schema {
            if !config.schemas.contains_key(schema) {
                errors.push(ValidationError::new(
                    field("schema"),
                    format!("unknown schema '{}'", schema),
                ));
            }
        }
    }
}
