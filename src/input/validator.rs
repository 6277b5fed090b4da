//! Two-pass input validation.
//!
//! Pass 1 checks structure and types against the compiled schema and stops
//! at the first problem. Pass 2 scans string fields with the content rules
//! and rejects or sanitizes per field policy. Numeric, boolean and date
//! fields are parsed and bounds-checked only.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::input::sanitizer::{self, Severity};
use crate::input::schema::{
    ContentPolicy, FieldRule, FieldSpec, Schema, StringFormat, TextRule, DATE_FORMAT,
};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

static SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug pattern"));

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule_id: String,
    pub severity: Severity,
    /// Field the violation was found in, if any.
    pub field: Option<String>,
}

impl Violation {
    fn structural(rule_id: &str, field: Option<&str>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity: Severity::Medium,
            field: field.map(str::to_string),
        }
    }
}

/// Outcome of validating one request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Parsed and sanitized input; present only when `valid`.
    pub sanitized_value: Option<Value>,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    fn rejected(violations: Vec<Violation>) -> Self {
        Self {
            valid: false,
            sanitized_value: None,
            violations,
        }
    }

    /// True if any violation carries the given rule id.
    pub fn has_rule(&self, rule_id: &str) -> bool {
        self.violations.iter().any(|v| v.rule_id == rule_id)
    }
}

/// Parsed field value awaiting the content pass.
enum Parsed {
    Text(String),
    Other(Value),
}

/// Validate `raw` against `schema`.
pub fn validate(schema: &Schema, raw: &Value) -> ValidationResult {
    let object = match raw {
        Value::Object(map) => map,
        _ => return ValidationResult::rejected(vec![Violation::structural("not-an-object", None)]),
    };

    // Pass 1: structure
    if schema.deny_unknown_fields() {
        if let Some(unknown) = object.keys().find(|k| schema.field(k).is_none()) {
            return ValidationResult::rejected(vec![Violation::structural(
                "unknown-field",
                Some(unknown.as_str()),
            )]);
        }
    }

    let mut parsed = Vec::with_capacity(schema.fields().len());
    for field_spec in schema.fields() {
        match object.get(&field_spec.name) {
            None | Some(Value::Null) => {
                if field_spec.required {
                    return ValidationResult::rejected(vec![Violation::structural(
                        "required",
                        Some(field_spec.name.as_str()),
                    )]);
                }
            }
            Some(value) => match check_structure(field_spec, value) {
                Ok(p) => parsed.push((field_spec, p)),
                Err(rule_id) => {
                    return ValidationResult::rejected(vec![Violation::structural(
                        rule_id,
                        Some(field_spec.name.as_str()),
                    )]);
                }
            },
        }
    }

    // Pass 2: content
    let mut violations = Vec::new();
    let mut rejected = false;
    let mut output = Map::new();
    for (field_spec, value) in parsed {
        let value = match value {
            Parsed::Other(v) => v,
            Parsed::Text(text) => {
                let policy = match &field_spec.rule {
                    FieldRule::Text(rule) => rule.policy,
                    _ => ContentPolicy::StrictReject,
                };
                let hits = sanitizer::detect(&text);
                for rule in &hits {
                    violations.push(Violation {
                        rule_id: rule.id().to_string(),
                        severity: rule.severity(),
                        field: Some(field_spec.name.clone()),
                    });
                }
                let cleaned = match policy {
                    ContentPolicy::StrictReject if !hits.is_empty() => {
                        rejected = true;
                        continue;
                    }
                    ContentPolicy::StrictReject => sanitizer::normalize(&text),
                    ContentPolicy::SanitizeAndContinue => sanitizer::sanitize(&text),
                };
                // escaping and normalization change the length
                if let FieldRule::Text(rule) = &field_spec.rule {
                    if let Err(rule_id) = check_length(rule, &cleaned) {
                        violations.push(Violation::structural(rule_id, Some(&field_spec.name)));
                        rejected = true;
                        continue;
                    }
                }
                Value::String(cleaned)
            }
        };
        output.insert(field_spec.name.clone(), value);
    }

    if rejected {
        return ValidationResult::rejected(violations);
    }

    ValidationResult {
        valid: true,
        sanitized_value: Some(Value::Object(output)),
        violations,
    }
}

fn check_structure(field_spec: &FieldSpec, value: &Value) -> Result<Parsed, &'static str> {
    match &field_spec.rule {
        FieldRule::Text(rule) => {
            let text = value.as_str().ok_or("type")?;
            check_text(rule, text)?;
            Ok(Parsed::Text(text.to_string()))
        }
        FieldRule::Integer { min, max } => {
            let n = match value {
                Value::Number(n) => n.as_i64().ok_or("type")?,
                Value::String(s) => s.trim().parse::<i64>().map_err(|_| "type")?,
                _ => return Err("type"),
            };
            check_range(n, *min, *max)?;
            Ok(Parsed::Other(Value::from(n)))
        }
        FieldRule::Number { min, max } => {
            let n = match value {
                Value::Number(n) => n.as_f64().ok_or("type")?,
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| "type")?,
                _ => return Err("type"),
            };
            if !n.is_finite() {
                return Err("type");
            }
            check_range(n, *min, *max)?;
            let number = Number::from_f64(n).ok_or("type")?;
            Ok(Parsed::Other(Value::Number(number)))
        }
        FieldRule::Boolean => {
            let b = match value {
                Value::Bool(b) => *b,
                Value::String(s) => match s.trim() {
                    "true" | "on" | "1" => true,
                    "false" | "off" | "0" => false,
                    _ => return Err("type"),
                },
                _ => return Err("type"),
            };
            Ok(Parsed::Other(Value::Bool(b)))
        }
        FieldRule::Date { min, max } => {
            let s = value.as_str().ok_or("type")?;
            let date = NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| "format")?;
            check_range(date, *min, *max)?;
            Ok(Parsed::Other(Value::String(
                date.format(DATE_FORMAT).to_string(),
            )))
        }
    }
}

fn check_length(rule: &TextRule, text: &str) -> Result<(), &'static str> {
    let len = text.chars().count();
    if rule.min_len.is_some_and(|min| len < min) {
        return Err("min-length");
    }
    if rule.max_len.is_some_and(|max| len > max) {
        return Err("max-length");
    }
    Ok(())
}

fn check_text(rule: &TextRule, text: &str) -> Result<(), &'static str> {
    check_length(rule, text)?;
    if let Some(format) = rule.format {
        if !matches_format(format, text) {
            return Err("format");
        }
    }
    if let Some(pattern) = &rule.pattern {
        if !pattern.is_match(text) {
            return Err("pattern");
        }
    }
    Ok(())
}

fn check_range<T: PartialOrd>(value: T, min: Option<T>, max: Option<T>) -> Result<(), &'static str> {
    if min.is_some_and(|m| value < m) || max.is_some_and(|m| value > m) {
        return Err("range");
    }
    Ok(())
}

fn matches_format(format: StringFormat, text: &str) -> bool {
    match format {
        StringFormat::Email => EMAIL.is_match(text),
        StringFormat::Url => url::Url::parse(text)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false),
        StringFormat::Slug => SLUG.is_match(text),
        StringFormat::Alphanumeric => !text.is_empty() && text.chars().all(char::is_alphanumeric),
        StringFormat::Uuid => uuid::Uuid::parse_str(text).is_ok(),
    }
}
