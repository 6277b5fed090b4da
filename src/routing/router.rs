//! Route profile lookup.
//!
//! # Responsibilities
//! - Store compiled route profiles
//! - Look up the profile for a request
//! - Fall back to the default profile when nothing matches
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest matching prefix wins; ties go to the route declared first
//! - O(n) prefix scan (acceptable for typical route counts)

use axum::http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RouteConfig;
use crate::error::{ConfigError, ValidationError};
use crate::input::{Schema, SchemaConfig};
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPrefixMatcher};
use crate::routing::RouteProfile;

#[derive(Debug)]
struct CompiledRoute {
    prefix_len: usize,
    matcher: AndMatcher,
    profile: Arc<RouteProfile>,
}

/// Maps requests to route profiles.
#[derive(Debug)]
pub struct ProfileRouter {
    routes: Vec<CompiledRoute>,
    default_profile: Arc<RouteProfile>,
}

impl ProfileRouter {
    /// Compile route configs, resolving schema references.
    pub fn from_config(
        routes: &[RouteConfig],
        schemas: &BTreeMap<String, SchemaConfig>,
    ) -> Result<Self, ConfigError> {
        let mut compiled_schemas: BTreeMap<&str, Arc<Schema>> = BTreeMap::new();
        for (name, config) in schemas {
            compiled_schemas.insert(name.as_str(), Arc::new(Schema::compile(name.as_str(), config)?));
        }

        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes {
            let schema = match &route.schema {
                Some(name) => match compiled_schemas.get(name.as_str()) {
                    Some(schema) => Some(schema.clone()),
                    None => {
                        return Err(ConfigError::Validation(vec![ValidationError::new(
                            format!("routes.{}.schema", route.name),
                            format!("unknown schema '{}'", name),
                        )]))
                    }
                },
                None => None,
            };

            let prefix = PathPrefixMatcher::new(route.path_prefix.as_str());
            let prefix_len = prefix.len();
            let matchers: Vec<Box<dyn Matcher>> = vec![
                Box::new(prefix),
                Box::new(MethodMatcher::new(&route.methods)),
            ];
            let matcher = AndMatcher::new(matchers);

            compiled.push(CompiledRoute {
                prefix_len,
                matcher,
                profile: Arc::new(RouteProfile {
                    name: route.name.clone(),
                    track_attempts: route.track_attempts,
                    csrf: route.csrf,
                    auth_endpoint: route.auth_endpoint,
                    schema,
                }),
            });
        }
        // stable sort keeps declaration order among equal prefixes
        compiled.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));

        Ok(Self {
            routes: compiled,
            default_profile: Arc::new(RouteProfile::default()),
        })
    }

    /// Profile for a request.
    pub fn profile_for(&self, method: &Method, path: &str) -> Arc<RouteProfile> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(method, path))
            .map(|route| route.profile.clone())
            .unwrap_or_else(|| self.default_profile.clone())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
