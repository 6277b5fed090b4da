//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GuardConfig;
use crate::config::validation::validate_config;
use crate::error::ConfigError;

/// Parse configuration from TOML text and validate it.
pub fn parse_config(content: &str) -> Result<GuardConfig, ConfigError> {
    let config: GuardConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[listener]
bind_address = "127.0.0.1:9000"

[rate_limit]
threshold = 5
window_secs = 60

[tokens]
csrf_ttl_secs = 300

[csrf]
failure_policy = "log-only"

[guard]
environment = "development"
auth_failure_policy = "fail-closed"
failure_policy = "fail-open"

[headers]
trusted_origins = ["https://js.pay.example"]

[[routes]]
name = "login"
path_prefix = "/account/login"
track_attempts = true
auth_endpoint = true

[[routes]]
name = "reviews"
path_prefix = "/reviews"
schema = "review"

[schemas.review]
deny_unknown_fields = true

[[schemas.review.fields]]
name = "rating"
type = "integer"
required = true
min = 1
max = 5

[[schemas.review.fields]]
name = "body"
type = "string"
max_len = 2000
policy = "sanitize-and-continue"
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.tokens.csrf_ttl_secs, 300);
        assert_eq!(config.routes.len(), 2);
        assert!(config.routes[0].csrf);
        assert!(config.schemas["review"].deny_unknown_fields);
        assert_eq!(config.schemas["review"].fields.len(), 2);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.rate_limit.threshold, 5);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/guard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = parse_config("[rate_limit\nthreshold = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_semantic_error_is_validation_error() {
        let err = parse_config("[rate_limit]\nthreshold = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }
}
