//! Route matching logic.
//!
//! # Responsibilities
//! - Match path prefix on segment boundaries (case-sensitive)
//! - Match request method
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - `/account` matches `/account` and `/account/login`, never `/accounts`
//! - Method names are compared case-insensitively after upper-casing at
//!   construction
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::Method;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, method: &Method, path: &str) -> bool;
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher. A trailing `/` is ignored.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: trimmed.to_string(),
        }
    }

    /// Length used to rank overlapping prefixes.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, _method: &Method, path: &str) -> bool {
        if self.prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Matches any of a set of methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    /// Create a new method matcher. Unparseable names are skipped.
    pub fn new<S: AsRef<str>>(methods: &[S]) -> Self {
        Self {
            methods: methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.as_ref().to_uppercase().as_bytes()).ok())
                .collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, method: &Method, _path: &str) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, method: &Method, path: &str) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(method, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher_segments() {
        let matcher = PathPrefixMatcher::new("/account/");

        assert!(matcher.matches(&Method::GET, "/account"));
        assert!(matcher.matches(&Method::GET, "/account/login"));
        assert!(!matcher.matches(&Method::GET, "/accounts"));
        assert!(!matcher.matches(&Method::GET, "/images"));
    }

    #[test]
    fn test_root_prefix_matches_everything() {
        let matcher = PathPrefixMatcher::new("/");
        assert!(matcher.is_empty());
        assert!(matcher.matches(&Method::POST, "/anything/at/all"));
    }

    #[test]
    fn test_method_matcher() {
        let matcher = MethodMatcher::new(&["post", "PUT"]);
        assert!(matcher.matches(&Method::POST, "/"));
        assert!(matcher.matches(&Method::PUT, "/"));
        assert!(!matcher.matches(&Method::GET, "/"));

        let any: MethodMatcher = MethodMatcher::new::<&str>(&[]);
        assert!(any.matches(&Method::DELETE, "/"));
    }

    #[test]
    fn test_and_matcher() {
        let matchers: Vec<Box<dyn Matcher>> = vec![
            Box::new(PathPrefixMatcher::new("/checkout")),
            Box::new(MethodMatcher::new(&["POST"])),
        ];
        let matcher = AndMatcher::new(matchers);
        assert!(matcher.matches(&Method::POST, "/checkout/pay"));
        assert!(!matcher.matches(&Method::GET, "/checkout/pay"));
        assert!(!matcher.matches(&Method::POST, "/cart"));
    }
}
