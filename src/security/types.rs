//! Records shared between the security components and the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::clock::Timestamp;

/// Failed-attempt state for one identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub identity_key: String,
    /// Failures recorded in the current window.
    pub count: u32,
    pub window_start: Timestamp,
    pub locked_until: Option<Timestamp>,
}

impl AttemptRecord {
    /// A fresh record for the first failure at `now`.
    pub fn first(identity_key: impl Into<String>, now: Timestamp) -> Self {
        Self {
            identity_key: identity_key.into(),
            count: 1,
            window_start: now,
            locked_until: None,
        }
    }

    /// True if the counting window has elapsed at `now`.
    pub fn window_elapsed(&self, window: Duration, now: Timestamp) -> bool {
        now > self.window_start.saturating_add(window)
    }

    /// True if a lockout is in force at `now`.
    pub fn is_locked(&self, now: Timestamp) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }

    /// True once neither the window nor a lockout keeps the record alive.
    pub fn is_expired(&self, window: Duration, now: Timestamp) -> bool {
        self.window_elapsed(window, now) && !self.is_locked(now)
    }
}

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Csrf,
    SessionRotation,
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenPurpose::Csrf => write!(f, "csrf"),
            TokenPurpose::SessionRotation => write!(f, "session_rotation"),
        }
    }
}

/// An issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityToken {
    pub token_id: String,
    pub purpose: TokenPurpose,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub used: bool,
    /// Context the token is bound to, usually the session identifier.
    pub bound_context: String,
}

impl SecurityToken {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self, now: Timestamp) -> Duration {
        self.expires_at.saturating_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_record_expiry_respects_lockout() {
        let start = Timestamp::from_millis(0);
        let mut record = AttemptRecord::first("ip:1.2.3.4", start);
        let window = Duration::from_secs(60);

        let after_window = Timestamp::from_millis(61_000);
        assert!(record.is_expired(window, after_window));

        record.locked_until = Some(Timestamp::from_millis(120_000));
        assert!(record.is_locked(after_window));
        assert!(!record.is_expired(window, after_window));
        assert!(record.is_expired(window, Timestamp::from_millis(120_000)));
    }

    #[test]
    fn test_token_expiry_boundary() {
        let token = SecurityToken {
            token_id: "ab".into(),
            purpose: TokenPurpose::Csrf,
            issued_at: Timestamp::from_millis(0),
            expires_at: Timestamp::from_millis(300_000),
            used: false,
            bound_context: "session-1".into(),
        };
        // now == expires_at is still valid
        assert!(!token.is_expired(Timestamp::from_millis(300_000)));
        assert!(token.is_expired(Timestamp::from_millis(300_001)));
        assert_eq!(token.remaining(Timestamp::from_millis(400_000)), Duration::ZERO);
    }
}
