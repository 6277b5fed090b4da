//! Response security headers.
//!
//! # Responsibilities
//! - Build the content security policy from configured source allow-lists
//! - Add transport security, framing, sniffing and cross-origin isolation
//!   headers
//! - Mix in the per-request script nonce
//!
//! # Design Decisions
//! - `headers_for` is a pure function of the policy and the context; only
//!   the nonce differs between two calls with equal contexts
//! - Sources are checked once at construction; a bad allow-list never
//!   reaches a response
//! - Output is a `BTreeMap` keyed by lower-case name, so names are unique
//!   and ordering is stable

use axum::http::HeaderValue;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::HeaderPolicyConfig;
use crate::error::{ConfigError, ValidationError};

/// Lower-case header name to value.
pub type HeaderSet = BTreeMap<String, String>;

const KEYWORD_SOURCES: [&str; 9] = [
    "'self'",
    "'none'",
    "'unsafe-inline'",
    "'unsafe-eval'",
    "'wasm-unsafe-eval'",
    "'strict-dynamic'",
    "'unsafe-hashes'",
    "'report-sample'",
    "'inline-speculation-rules'",
];

/// Per-request nonce for inline scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(String);

impl CspNonce {
    /// Generate a fresh 128-bit nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CspNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the header policy may depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderContext {
    /// Request arrived over TLS (directly or via a trusted proxy).
    pub secure: bool,
    pub nonce: Option<CspNonce>,
}

/// A checked header policy.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    /// `(directive, sources)` in output order; script-src is index 1.
    directives: Vec<(&'static str, Vec<String>)>,
    report_uri: Option<String>,
    hsts: Option<String>,
    fixed: HeaderSet,
}

impl HeaderPolicy {
    /// Create a new policy, rejecting empty or malformed allow-lists.
    pub fn new(config: &HeaderPolicyConfig) -> Result<Self, ConfigError> {
        let errors = validate_sources(config);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let with_trusted = |sources: &[String]| {
            dedup(sources.iter().chain(config.trusted_origins.iter()))
        };
        let directives = vec![
            ("default-src", dedup(config.default_sources.iter())),
            ("script-src", with_trusted(&config.script_sources)),
            ("style-src", dedup(config.style_sources.iter())),
            ("img-src", dedup(config.img_sources.iter())),
            ("connect-src", with_trusted(&config.connect_sources)),
            ("frame-src", with_trusted(&config.frame_sources)),
            ("form-action", dedup(config.form_action.iter())),
            ("frame-ancestors", vec!["'none'".to_string()]),
            ("base-uri", vec!["'self'".to_string()]),
            ("object-src", vec!["'none'".to_string()]),
        ];

        let hsts = config.hsts_enabled.then(|| {
            let mut value = format!("max-age={}", config.hsts_max_age_secs);
            if config.hsts_include_subdomains {
                value.push_str("; includeSubDomains");
            }
            if config.hsts_preload {
                value.push_str("; preload");
            }
            value
        });

        let mut fixed = HeaderSet::new();
        fixed.insert("x-frame-options".into(), "DENY".into());
        fixed.insert("x-content-type-options".into(), "nosniff".into());
        fixed.insert("referrer-policy".into(), config.referrer_policy.clone());
        fixed.insert("cross-origin-opener-policy".into(), "same-origin".into());
        fixed.insert("cross-origin-resource-policy".into(), "same-origin".into());
        if let Some(coep) = &config.cross_origin_embedder_policy {
            fixed.insert("cross-origin-embedder-policy".into(), coep.clone());
        }
        if !config.permissions_policy.is_empty() {
            fixed.insert("permissions-policy".into(), config.permissions_policy.clone());
        }

        Ok(Self {
            directives,
            report_uri: config.report_uri.clone(),
            hsts,
            fixed,
        })
    }

    /// Headers for one response.
    pub fn headers_for(&self, ctx: &HeaderContext) -> HeaderSet {
        let mut headers = self.fixed.clone();
        headers.insert("content-security-policy".into(), self.content_policy(ctx));
        if ctx.secure {
            if let Some(hsts) = &self.hsts {
                headers.insert("strict-transport-security".into(), hsts.clone());
            }
        }
        headers
    }

    fn content_policy(&self, ctx: &HeaderContext) -> String {
        let mut parts = Vec::with_capacity(self.directives.len() + 2);
        for (name, sources) in &self.directives {
            let mut sources = sources.clone();
            if *name == "script-src" {
                if let Some(nonce) = &ctx.nonce {
                    sources.push(format!("'nonce-{}'", nonce));
                }
            }
            if sources.is_empty() {
                continue;
            }
            parts.push(format!("{} {}", name, sources.join(" ")));
        }
        if ctx.secure {
            parts.push("upgrade-insecure-requests".to_string());
        }
        if let Some(uri) = &self.report_uri {
            parts.push(format!("report-uri {}", uri));
        }
        parts.join("; ")
    }
}

const REFERRER_POLICIES: &[&str] = &[
    "no-referrer",
    "no-referrer-when-downgrade",
    "origin",
    "origin-when-cross-origin",
    "same-origin",
    "strict-origin",
    "strict-origin-when-cross-origin",
    "unsafe-url",
];

fn dedup<'a>(sources: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for source in sources {
        if !out.contains(source) {
            out.push(source.clone());
        }
    }
    out
}

fn is_valid_source(source: &str) -> bool {
    if source.is_empty()
        || source
            .chars()
            .any(|c| c.is_whitespace() || c == ';' || c == ',')
    {
        return false;
    }
    if source.starts_with('\'') {
        return KEYWORD_SOURCES.contains(&source)
            || source.starts_with("'sha256-")
            || source.starts_with("'sha384-")
            || source.starts_with("'sha512-");
    }
    if source == "*" {
        return true;
    }
    // scheme source, e.g. `https:` or `data:`
    if let Some(scheme) = source.strip_suffix(':') {
        return !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.');
    }
    if source.contains("://") {
        return url::Url::parse(&source.replacen("*.", "wildcard.", 1))
            .map(|u| u.host_str().is_some())
            .unwrap_or(false);
    }
    // bare host, optionally with a leading wildcard label
    let host = source.strip_prefix("*.").unwrap_or(source);
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ':')
}

/// Every problem with the configured sources.
pub fn validate_sources(config: &HeaderPolicyConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.default_sources.is_empty() {
        errors.push(ValidationError::new(
            "headers.default_sources",
            "allow-list must not be empty",
        ));
    }

    let lists = [
        ("headers.default_sources", &config.default_sources),
        ("headers.script_sources", &config.script_sources),
        ("headers.style_sources", &config.style_sources),
        ("headers.img_sources", &config.img_sources),
        ("headers.connect_sources", &config.connect_sources),
        ("headers.frame_sources", &config.frame_sources),
        ("headers.form_action", &config.form_action),
        ("headers.trusted_origins", &config.trusted_origins),
    ];
    for (field, sources) in lists {
        for source in sources.iter().filter(|s| !is_valid_source(s)) {
            errors.push(ValidationError::new(
                field,
                format!("invalid source '{}'", source),
            ));
        }
    }

    if let Some(uri) = &config.report_uri {
        let splits_directive = uri
            .chars()
            .any(|c| c.is_whitespace() || c == ';' || c == ',');
        if uri.is_empty()
            || splits_directive
            || (!uri.starts_with('/') && url::Url::parse(uri).is_err())
        {
            errors.push(ValidationError::new(
                "headers.report_uri",
                format!("invalid report uri '{}'", uri),
            ));
        }
    }
    let referrer_ok = config
        .referrer_policy
        .split(',')
        .map(str::trim)
        .all(|token| REFERRER_POLICIES.contains(&token));
    if !referrer_ok {
        errors.push(ValidationError::new(
            "headers.referrer_policy",
            format!("invalid referrer policy '{}'", config.referrer_policy),
        ));
    }
    if HeaderValue::from_str(&config.permissions_policy).is_err() {
        errors.push(ValidationError::new(
            "headers.permissions_policy",
            "not a valid header value",
        ));
    }
    if config.hsts_enabled && config.hsts_max_age_secs == 0 {
        errors.push(ValidationError::new(
            "headers.hsts_max_age_secs",
            "must be greater than 0 when hsts is enabled",
        ));
    }
    errors
}
