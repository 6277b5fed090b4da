//! Declarative input schemas.
//!
//! # Responsibilities
//! - Describe expected request fields (type, bounds, format, content policy)
//! - Load descriptions from configuration or build them in code
//! - Compile them once into a typed `Schema`, rejecting contradictions early
//!
//! # Design Decisions
//! - No runtime shape inspection: a request is checked only against a
//!   compiled schema
//! - Custom patterns are compiled at construction, never per request

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::SchemaError;

/// Date format accepted by `date` fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How dangerous content in a string field is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContentPolicy {
    /// Any content-rule hit invalidates the input.
    #[default]
    StrictReject,
    /// Neutralize the content and keep going.
    SanitizeAndContinue,
}

/// Built-in string formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    Email,
    Url,
    Slug,
    Alphanumeric,
    Uuid,
}

/// Field type and constraints as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldKind {
    String {
        #[serde(default)]
        min_len: Option<usize>,
        #[serde(default)]
        max_len: Option<usize>,
        #[serde(default)]
        format: Option<StringFormat>,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        policy: ContentPolicy,
    },
    Integer {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
    },
    Number {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Boolean,
    Date {
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
    },
}

/// One field as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldConfig {
    /// An optional free-text field with strict content policy.
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: FieldKind::String {
                min_len: None,
                max_len: None,
                format: None,
                pattern: None,
                policy: ContentPolicy::StrictReject,
            },
        }
    }

    pub fn integer(name: impl Into<String>, min: Option<i64>, max: Option<i64>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: FieldKind::Integer { min, max },
        }
    }

    pub fn number(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: FieldKind::Number { min, max },
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: FieldKind::Boolean,
        }
    }

    pub fn date(name: impl Into<String>, min: Option<&str>, max: Option<&str>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: FieldKind::Date {
                min: min.map(str::to_string),
                max: max.map(str::to_string),
            },
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set character length bounds. No effect on non-string fields.
    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        if let FieldKind::String { min_len, max_len, .. } = &mut self.kind {
            *min_len = min;
            *max_len = max;
        }
        self
    }

    pub fn format(mut self, value: StringFormat) -> Self {
        if let FieldKind::String { format, .. } = &mut self.kind {
            *format = Some(value);
        }
        self
    }

    pub fn pattern(mut self, value: impl Into<String>) -> Self {
        if let FieldKind::String { pattern, .. } = &mut self.kind {
            *pattern = Some(value.into());
        }
        self
    }

    pub fn policy(mut self, value: ContentPolicy) -> Self {
        if let FieldKind::String { policy, .. } = &mut self.kind {
            *policy = value;
        }
        self
    }
}

/// A schema as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SchemaConfig {
    /// Reject fields the schema does not name instead of dropping them.
    pub deny_unknown_fields: bool,
    pub fields: Vec<FieldConfig>,
}

impl SchemaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    pub fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown_fields = true;
        self
    }
}

/// Compiled constraints for a string field.
#[derive(Debug, Clone)]
pub struct TextRule {
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub format: Option<StringFormat>,
    pub pattern: Option<Regex>,
    pub policy: ContentPolicy,
}

/// Compiled constraints for one field.
#[derive(Debug, Clone)]
pub enum FieldRule {
    Text(TextRule),
    Integer { min: Option<i64>, max: Option<i64> },
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Date {
        min: Option<NaiveDate>,
        max: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub rule: FieldRule,
}

/// A compiled, immutable input schema.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
    deny_unknown_fields: bool,
}

impl Schema {
    /// Compile a schema, rejecting contradictory or malformed definitions.
    pub fn compile(name: impl Into<String>, config: &SchemaConfig) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(config.fields.len());

        for field in &config.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName { schema: name });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: name,
                    field: field.name.clone(),
                });
            }
            let rule = compile_rule(&name, field)?;
            fields.push(FieldSpec {
                name: field.name.clone(),
                required: field.required,
                rule,
            });
        }

        Ok(Self {
            name,
            fields,
            deny_unknown_fields: config.deny_unknown_fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn deny_unknown_fields(&self) -> bool {
        self.deny_unknown_fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn compile_rule(schema: &str, field: &FieldConfig) -> Result<FieldRule, SchemaError> {
    let inverted = |min: String, max: String| SchemaError::InvertedRange {
        schema: schema.to_string(),
        field: field.name.clone(),
        min,
        max,
    };

    match &field.kind {
        FieldKind::String {
            min_len,
            max_len,
            format,
            pattern,
            policy,
        } => {
            if let (Some(min), Some(max)) = (min_len, max_len) {
                if min > max {
                    return Err(inverted(min.to_string(), max.to_string()));
                }
            }
            let pattern = match pattern {
                Some(p) => Some(Regex::new(p).map_err(|e| SchemaError::InvalidPattern {
                    schema: schema.to_string(),
                    field: field.name.clone(),
                    detail: e.to_string(),
                })?),
                None => None,
            };
            Ok(FieldRule::Text(TextRule {
                min_len: *min_len,
                max_len: *max_len,
                format: *format,
                pattern,
                policy: *policy,
            }))
        }
        FieldKind::Integer { min, max } => {
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(inverted(lo.to_string(), hi.to_string()));
                }
            }
            Ok(FieldRule::Integer {
                min: *min,
                max: *max,
            })
        }
        FieldKind::Number { min, max } => {
            for bound in [min, max].into_iter().flatten() {
                if !bound.is_finite() {
                    return Err(inverted(format!("{:?}", min), format!("{:?}", max)));
                }
            }
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(inverted(lo.to_string(), hi.to_string()));
                }
            }
            Ok(FieldRule::Number {
                min: *min,
                max: *max,
            })
        }
        FieldKind::Boolean => Ok(FieldRule::Boolean),
        FieldKind::Date { min, max } => {
            let parse = |value: &Option<String>| -> Result<Option<NaiveDate>, SchemaError> {
                value
                    .as_deref()
                    .map(|v| {
                        NaiveDate::parse_from_str(v, DATE_FORMAT).map_err(|_| {
                            SchemaError::InvalidDate {
                                schema: schema.to_string(),
                                field: field.name.clone(),
                                value: v.to_string(),
                            }
                        })
                    })
                    .transpose()
            };
            let (lo, hi) = (parse(min)?, parse(max)?);
            if let (Some(lo), Some(hi)) = (lo, hi) {
                if lo > hi {
                    return Err(inverted(lo.to_string(), hi.to_string()));
                }
            }
            Ok(FieldRule::Date { min: lo, max: hi })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_login_schema() {
        let config = SchemaConfig::new()
            .field(
                FieldConfig::string("email")
                    .required()
                    .length(None, Some(254))
                    .format(StringFormat::Email),
            )
            .field(FieldConfig::string("password").required().length(Some(8), Some(128)));

        let schema = Schema::compile("login", &config).unwrap();
        assert_eq!(schema.name(), "login");
        assert_eq!(schema.fields().len(), 2);
        assert!(schema.field("email").unwrap().required);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let config = SchemaConfig::new()
            .field(FieldConfig::string("sku"))
            .field(FieldConfig::integer("sku", None, None));

        let err = Schema::compile("cart", &config).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                schema: "cart".into(),
                field: "sku".into()
            }
        );
    }

    #[test]
    fn test_inverted_ranges_rejected() {
        let config = SchemaConfig::new().field(FieldConfig::integer("qty", Some(10), Some(1)));
        assert!(matches!(
            Schema::compile("cart", &config),
            Err(SchemaError::InvertedRange { .. })
        ));

        let config = SchemaConfig::new().field(FieldConfig::string("note").length(Some(5), Some(2)));
        assert!(matches!(
            Schema::compile("cart", &config),
            Err(SchemaError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_bad_pattern_and_date_rejected() {
        let config = SchemaConfig::new().field(FieldConfig::string("code").pattern("(unclosed"));
        assert!(matches!(
            Schema::compile("promo", &config),
            Err(SchemaError::InvalidPattern { .. })
        ));

        let config =
            SchemaConfig::new().field(FieldConfig::date("ship_on", Some("2024-13-01"), None));
        assert!(matches!(
            Schema::compile("shipping", &config),
            Err(SchemaError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_schema_from_toml() {
        let toml_src = r#"
            deny_unknown_fields = true

            [[fields]]
            name = "quantity"
            type = "integer"
            required = true
            min = 1
            max = 99

            [[fields]]
            name = "note"
            type = "string"
            max_len = 500
            policy = "sanitize-and-continue"
        "#;
        let config: SchemaConfig = toml::from_str(toml_src).unwrap();
        assert!(config.deny_unknown_fields);
        assert_eq!(
            config.fields[0].kind,
            FieldKind::Integer {
                min: Some(1),
                max: Some(99)
            }
        );

        let schema = Schema::compile("cart", &config).unwrap();
        match &schema.field("note").unwrap().rule {
            FieldRule::Text(rule) => {
                assert_eq!(rule.policy, ContentPolicy::SanitizeAndContinue);
                assert_eq!(rule.max_len, Some(500));
            }
            other => panic!("unexpected rule {:?}", other),
        }
    }
}
