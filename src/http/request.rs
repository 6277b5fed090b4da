//! Request normalization.
//!
//! # Responsibilities
//! - Read the request ID assigned by the request-id layer
//! - Extract client address, session, authenticated user and TLS state
//! - Parse JSON and urlencoded bodies into a `serde_json::Value`
//!
//! # Design Decisions
//! - The user id comes only from an `AuthenticatedUser` extension set by
//!   the application's auth layer, never from a client header
//! - Unparseable bodies become `Null`; the schema stage rejects them if a
//!   schema applies
//! - Header names are lower-cased; non-UTF-8 values are dropped

use axum::extract::ConnectInfo;
use axum::http::{header, request::Parts, HeaderMap};
use serde_json::{Map, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::security::RequestDescriptor;

/// Request ID header name.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Cookie carrying the storefront session identifier.
pub const SESSION_COOKIE: &str = "session_id";

/// Account id of an authenticated caller, inserted by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Request ID from the headers, or a fresh one.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Client address from `ConnectInfo`, or the unspecified address.
pub fn client_addr(parts: &Parts) -> IpAddr {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Value of a cookie in the `Cookie` header(s).
pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// True if the request arrived over TLS, directly or via a proxy.
pub fn is_secure(parts: &Parts) -> bool {
    parts.uri.scheme_str() == Some("https")
        || parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("https"))
            .unwrap_or(false)
}

/// Parse a request body by content type.
pub fn parse_body(headers: &HeaderMap, body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        serde_json::from_slice(body).unwrap_or(Value::Null)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let map: Map<String, Value> = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
            .collect();
        Value::Object(map)
    } else {
        Value::Null
    }
}

/// Build the descriptor the guard evaluates.
pub fn build_descriptor(parts: &Parts, body: &[u8]) -> RequestDescriptor {
    let mut desc = RequestDescriptor::new(
        parts.method.clone(),
        parts.uri.path(),
        client_addr(parts),
    )
    .with_request_id(request_id(&parts.headers))
    .with_body(parse_body(&parts.headers, body))
    .secure(is_secure(parts));

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            desc.headers.insert(name.as_str().to_string(), value.to_string());
        }
    }
    if let Some(session) = cookie(&parts.headers, SESSION_COOKIE) {
        desc.session_id = Some(session.to_string());
    }
    if let Some(AuthenticatedUser(user)) = parts.extensions.get::<AuthenticatedUser>() {
        desc.user_id = Some(user.clone());
    }
    desc
}
