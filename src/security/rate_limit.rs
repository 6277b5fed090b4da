//! Failed-attempt limiting with exponential lockout.
//!
//! # Responsibilities
//! - Count failures per identity key inside a fixed window
//! - Lock the key once the threshold is reached, doubling the lockout for
//!   every further failure up to a cap
//! - Answer `check` with the remaining lockout
//!
//! # Design Decisions
//! - The count lives in the store and is only changed through
//!   `atomic_increment`, so concurrent failures are never lost
//! - Lockouts only ever grow (`extend_lockout` keeps the later deadline)
//! - Denial is a value; only store failures are errors

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, Timestamp};
use crate::config::RateLimitConfig;
use crate::error::StoreResult;
use crate::security::types::AttemptRecord;
use crate::store::SecurityStore;

/// Key attempts are counted under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Derive the key from the client address and, if known, the account.
    pub fn new(addr: IpAddr, account: Option<&str>) -> Self {
        match account {
            Some(id) if !id.is_empty() => Self(format!("ip:{}|user:{}", addr, id)),
            _ => Self(format!("ip:{}", addr)),
        }
    }

    /// Use a pre-built key verbatim (admin lookups, tests).
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answer to `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Remaining lockout when denied.
    pub retry_after: Option<Duration>,
    /// Failures counted in the current window.
    pub attempts: u32,
}

/// Result of a guarded operation as reported back to the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Lockout length for the `excess`-th failure past the threshold.
pub fn lockout_duration(excess: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(excess);
    base.saturating_mul(factor).min(max)
}

/// Attempt counter and lockout enforcer.
pub struct RateLimiter {
    store: Arc<dyn SecurityStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn SecurityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, config }
    }

    /// Is the key allowed to attempt now?
    pub async fn check(&self, key: &IdentityKey) -> StoreResult<RateDecision> {
        let now = self.clock.now();
        let record = self.store.get_attempts(key.as_str()).await?;

        let decision = match record {
            Some(record) if record.is_locked(now) => RateDecision {
                allowed: false,
                retry_after: record.locked_until.map(|until| until.saturating_since(now)),
                attempts: record.count,
            },
            Some(record) if !record.window_elapsed(self.config.window(), now) => RateDecision {
                allowed: true,
                retry_after: None,
                attempts: record.count,
            },
            _ => RateDecision {
                allowed: true,
                retry_after: None,
                attempts: 0,
            },
        };
        Ok(decision)
    }

    /// Count a failure, engaging or extending a lockout past the threshold.
    pub async fn record_failure(&self, key: &IdentityKey) -> StoreResult<AttemptRecord> {
        let now = self.clock.now();
        let mut record = self
            .store
            .atomic_increment(key.as_str(), self.config.window(), now)
            .await?;

        if record.count >= self.config.threshold {
            let excess = record.count - self.config.threshold;
            let lockout = lockout_duration(
                excess,
                self.config.lockout_base(),
                self.config.lockout_max(),
            );
            let until = now.saturating_add(lockout);
            self.store.extend_lockout(key.as_str(), until).await?;
            record.locked_until = Some(record.locked_until.map_or(until, |t| t.max(until)));

            tracing::warn!(
                identity = %key,
                attempts = record.count,
                lockout_secs = lockout.as_secs(),
                "Lockout engaged"
            );
        } else {
            tracing::debug!(identity = %key, attempts = record.count, "Failure recorded");
        }

        Ok(record)
    }

    /// Clear the key's record.
    pub async fn record_success(&self, key: &IdentityKey) -> StoreResult<()> {
        self.store.delete_attempts(key.as_str()).await
    }

    /// Record an outcome at most once per attempt id.
    ///
    /// Returns false when the attempt was already accounted for. The id
    /// must be minted by the server, never taken from the client.
    pub async fn record_outcome(
        &self,
        key: &IdentityKey,
        attempt_id: &str,
        outcome: AttemptOutcome,
    ) -> StoreResult<bool> {
        let marker = format!("outcome:{}", attempt_id);
        let first = self
            .store
            .insert_marker(&marker, self.config.window(), self.clock.now())
            .await?;
        if !first {
            tracing::debug!(identity = %key, attempt_id, "Outcome already recorded");
            return Ok(false);
        }

        match outcome {
            AttemptOutcome::Success => self.record_success(key).await?,
            AttemptOutcome::Failure => {
                self.record_failure(key).await?;
            }
        }
        Ok(true)
    }

    /// Current record for a key, if it is still alive.
    pub async fn lockout_status(&self, key: &IdentityKey) -> StoreResult<Option<AttemptRecord>> {
        let now: Timestamp = self.clock.now();
        let record = self.store.get_attempts(key.as_str()).await?;
        Ok(record.filter(|r| !r.is_expired(self.config.window(), now)))
    }

    /// Operator override: drop the key's record and any lockout.
    pub async fn clear(&self, key: &IdentityKey) -> StoreResult<()> {
        tracing::info!(identity = %key, "Attempt record cleared");
        self.store.delete_attempts(key.as_str()).await
    }
}
