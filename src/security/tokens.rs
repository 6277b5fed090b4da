//! CSRF and session-rotation tokens.
//!
//! # Responsibilities
//! - Issue tokens from the OS CSPRNG with a per-purpose lifetime
//! - Validate a presented token against purpose, bound context, expiry
//!   and prior use
//! - Consume one-time tokens atomically with the validation itself
//!
//! # Design Decisions
//! - Ids are 32 random bytes, hex encoded
//! - The store is looked up by id, then the id and context are compared in
//!   constant time against the stored record
//! - Consumption is a single `compare_and_swap_used`; the loser of a race
//!   sees `ALREADY_USED`
//! - A revoked token is deleted, so it reads as `NOT_FOUND` afterwards

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::error::StoreResult;
use crate::security::types::{SecurityToken, TokenPurpose};
use crate::store::SecurityStore;

const TOKEN_BYTES: usize = 32;

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenRejection {
    NotFound,
    AlreadyUsed,
    Expired,
    ContextMismatch,
}

impl TokenRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::NotFound => "NOT_FOUND",
            TokenRejection::AlreadyUsed => "ALREADY_USED",
            TokenRejection::Expired => "EXPIRED",
            TokenRejection::ContextMismatch => "CONTEXT_MISMATCH",
        }
    }
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenValidation {
    pub valid: bool,
    pub reason: Option<TokenRejection>,
}

impl TokenValidation {
    fn accepted() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: TokenRejection) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Lifetime rules for one purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub ttl: Duration,
    pub one_time: bool,
}

/// Outcome of `rotate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    Rotated(SecurityToken),
    Rejected(TokenRejection),
}

/// Generate a token id with 256 bits of entropy.
pub fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_well_formed(token_id: &str) -> bool {
    token_id.len() == TOKEN_BYTES * 2 && token_id.bytes().all(|b| b.is_ascii_hexdigit())
}

fn ct_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Issues, validates and revokes tokens.
pub struct TokenService {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
    csrf: TokenPolicy,
    session_rotation: TokenPolicy,
}

impl TokenService {
    /// Create a new token service.
    pub fn new(config: &TokenConfig, store: Arc<dyn SecurityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            csrf: TokenPolicy {
                ttl: Duration::from_secs(config.csrf_ttl_secs),
                one_time: config.csrf_one_time,
            },
            session_rotation: TokenPolicy {
                ttl: Duration::from_secs(config.session_rotation_ttl_secs),
                one_time: true,
            },
        }
    }

    pub fn policy(&self, purpose: TokenPurpose) -> TokenPolicy {
        match purpose {
            TokenPurpose::Csrf => self.csrf,
            TokenPurpose::SessionRotation => self.session_rotation,
        }
    }

    /// Issue a token bound to `bound_context`.
    pub async fn issue(
        &self,
        purpose: TokenPurpose,
        bound_context: &str,
    ) -> StoreResult<SecurityToken> {
        let now = self.clock.now();
        let token = SecurityToken {
            token_id: generate_token_id(),
            purpose,
            issued_at: now,
            expires_at: now.saturating_add(self.policy(purpose).ttl),
            used: false,
            bound_context: bound_context.to_string(),
        };
        self.store.put_token(token.clone()).await?;
        tracing::debug!(purpose = %purpose, "Token issued");
        Ok(token)
    }

    /// Validate a presented token, consuming it if its purpose is one-time.
    pub async fn validate(
        &self,
        token_id: &str,
        purpose: TokenPurpose,
        bound_context: &str,
    ) -> StoreResult<TokenValidation> {
        if !is_well_formed(token_id) {
            return Ok(TokenValidation::rejected(TokenRejection::NotFound));
        }

        let Some(stored) = self.store.get_token(token_id).await? else {
            return Ok(TokenValidation::rejected(TokenRejection::NotFound));
        };
        if !ct_str_eq(&stored.token_id, token_id) {
            return Ok(TokenValidation::rejected(TokenRejection::NotFound));
        }
        if stored.used {
            return Ok(TokenValidation::rejected(TokenRejection::AlreadyUsed));
        }
        if stored.is_expired(self.clock.now()) {
            return Ok(TokenValidation::rejected(TokenRejection::Expired));
        }
        // evaluate both so the comparison time does not reveal which differed
        let context_ok = ct_str_eq(&stored.bound_context, bound_context);
        let purpose_ok = stored.purpose == purpose;
        if !(context_ok & purpose_ok) {
            return Ok(TokenValidation::rejected(TokenRejection::ContextMismatch));
        }

        if self.policy(purpose).one_time
            && !self.store.compare_and_swap_used(token_id, false, true).await?
        {
            return Ok(TokenValidation::rejected(TokenRejection::AlreadyUsed));
        }

        Ok(TokenValidation::accepted())
    }

    /// Delete a token. Returns whether it existed.
    pub async fn revoke(&self, token_id: &str) -> StoreResult<bool> {
        if !is_well_formed(token_id) {
            return Ok(false);
        }
        let existed = self.store.get_token(token_id).await?.is_some();
        self.store.delete_token(token_id).await?;
        if existed {
            tracing::info!("Token revoked");
        }
        Ok(existed)
    }

    /// Consume a session-rotation token and issue its successor.
    pub async fn rotate(&self, token_id: &str, bound_context: &str) -> StoreResult<Rotation> {
        let validation = self
            .validate(token_id, TokenPurpose::SessionRotation, bound_context)
            .await?;
        match validation.reason {
            Some(reason) => Ok(Rotation::Rejected(reason)),
            None => {
                let next = self
                    .issue(TokenPurpose::SessionRotation, bound_context)
                    .await?;
                Ok(Rotation::Rotated(next))
            }
        }
    }
}
