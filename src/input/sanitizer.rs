//! Content defense for free-text fields.
//!
//! # Responsibilities
//! - Normalize text (NFKC) so look-alike encodings cannot slip past patterns
//! - Detect script injection, event handlers, dangerous URI schemes,
//!   SQL injection and control characters
//! - Neutralize such content for fields that sanitize instead of reject
//!
//! # Design Decisions
//! - Detection and sanitization both operate on normalized text
//! - `sanitize` is idempotent: removal runs to a fixed point, then entity
//!   escaping skips existing entity references
//! - The SQL rule needs a metacharacter AND a keyword; either alone is
//!   ordinary text in product reviews and addresses

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// How serious a rule hit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Pattern-based content rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRule {
    ScriptTag,
    EventHandler,
    DangerousUri,
    SqlInjection,
    ControlCharacters,
}

impl ContentRule {
    pub const ALL: [ContentRule; 5] = [
        ContentRule::ScriptTag,
        ContentRule::EventHandler,
        ContentRule::DangerousUri,
        ContentRule::SqlInjection,
        ContentRule::ControlCharacters,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ContentRule::ScriptTag => "xss-script-tag",
            ContentRule::EventHandler => "xss-event-handler",
            ContentRule::DangerousUri => "xss-dangerous-uri",
            ContentRule::SqlInjection => "sql-injection",
            ContentRule::ControlCharacters => "control-characters",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ContentRule::ScriptTag => Severity::Critical,
            ContentRule::EventHandler | ContentRule::DangerousUri | ContentRule::SqlInjection => {
                Severity::High
            }
            ContentRule::ControlCharacters => Severity::Medium,
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            ContentRule::ScriptTag => SCRIPT_TAG.is_match(text),
            ContentRule::EventHandler => EVENT_HANDLER.is_match(text),
            ContentRule::DangerousUri => DANGEROUS_URI.is_match(text),
            ContentRule::SqlInjection => SQL_META.is_match(text) && SQL_KEYWORD.is_match(text),
            ContentRule::ControlCharacters => CONTROL.is_match(text),
        }
    }
}

static SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)<\s*/?\s*(?:script|iframe|object|embed|applet|frameset|frame|svg|math|style|link|meta|base)\b",
    )
    .expect("script tag pattern")
});

static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon[a-z]{3,}\s*=").expect("event handler pattern"));

static DANGEROUS_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:javascript|vbscript|livescript)\s*:|\bdata\s*:\s*text/html")
        .expect("dangerous uri pattern")
});

static SQL_META: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'|--|;|/\*|\*/").expect("sql metacharacter pattern"));

static SQL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:union\s+(?:all\s+)?select|select\s+.+\s+from|insert\s+into|update\s+\w+\s+set|delete\s+from|drop\s+(?:table|database|schema)|truncate\s+table|alter\s+table|exec(?:ute)?\s*\(|xp_cmdshell|sleep\s*\(|benchmark\s*\(|waitfor\s+delay|or\s+'?\d+'?\s*=\s*'?\d+|or\s+'[^']*'\s*=\s*')",
    )
    .expect("sql keyword pattern")
});

static CONTROL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control character pattern")
});

/// Elements whose content is dropped along with the tags.
const BLOCK_ELEMENTS: [&str; 8] = [
    "script", "style", "iframe", "object", "embed", "applet", "noscript", "template",
];

static BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    BLOCK_ELEMENTS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<\s*{tag}\b[^>]*>.*?<\s*/\s*{tag}\s*>"))
                .expect("block element pattern")
        })
        .collect()
});

static HTML_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("html comment pattern"));

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*[/!?]?\s*[A-Za-z][^<>]*>").expect("tag pattern"));

static SQL_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"--|/\*|\*/").expect("sql comment pattern"));

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^&(?:[A-Za-z][A-Za-z0-9]{1,31}|#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6});")
        .expect("entity pattern")
});

/// Unicode NFKC normalization.
pub fn normalize(input: &str) -> String {
    input.nfkc().collect()
}

/// Rules the (normalized) input violates, in rule order.
pub fn detect(input: &str) -> Vec<ContentRule> {
    let normalized = normalize(input);
    ContentRule::ALL
        .into_iter()
        .filter(|rule| rule.matches(&normalized))
        .collect()
}

/// Neutralize markup, dangerous schemes, handlers and SQL comment markers.
pub fn sanitize(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = strip(&normalize(&current));
        if next == current {
            break;
        }
        current = next;
    }
    escape_html(&current).trim().to_string()
}

/// One removal pass.
fn strip(input: &str) -> String {
    let mut out = CONTROL.replace_all(input, "").into_owned();
    out = HTML_COMMENT.replace_all(&out, "").into_owned();
    for block in BLOCKS.iter() {
        out = block.replace_all(&out, "").into_owned();
    }
    out = TAG.replace_all(&out, "").into_owned();
    out = DANGEROUS_URI.replace_all(&out, "").into_owned();
    out = EVENT_HANDLER.replace_all(&out, "").into_owned();
    SQL_COMMENT.replace_all(&out, "").into_owned()
}

/// Escape HTML-significant characters, leaving entity references intact.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (idx, ch) in input.char_indices() {
        match ch {
            '&' if ENTITY.is_match(&input[idx..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}
