//! Persistence interface for attempt counters and tokens.
//!
//! # Data Flow
//! ```text
//! RateLimiter  → atomic_increment / extend_lockout / get_attempts
//! TokenService → put_token / get_token / compare_and_swap_used
//! RequestGuard → insert_marker (retry-safe accounting)
//! Sweeper      → purge_expired
//! ```
//!
//! # Design Decisions
//! - The two operations that race (increment, mark-as-used) are single
//!   atomic store calls; callers never read-modify-write
//! - Any backend failure surfaces as `StoreError`, never as a denial
//! - Backends may be in-process (`MemoryStore`) or networked; the trait is
//!   async so either fits

pub mod memory;
pub mod sweeper;

use async_trait::async_trait;
use std::time::Duration;

use crate::clock::Timestamp;
use crate::error::StoreResult;
use crate::security::types::{AttemptRecord, SecurityToken};

pub use memory::MemoryStore;
pub use sweeper::StoreSweeper;

/// Key-value store backing the security layer.
#[async_trait]
pub trait SecurityStore: Send + Sync {
    /// Read the attempt record for a key.
    async fn get_attempts(&self, key: &str) -> StoreResult<Option<AttemptRecord>>;

    /// Atomically count one failure and return the updated record.
    ///
    /// A record whose window has elapsed restarts at a count of 1 with
    /// `window_start = now`; a lockout still in force is kept.
    async fn atomic_increment(
        &self,
        key: &str,
        window: Duration,
        now: Timestamp,
    ) -> StoreResult<AttemptRecord>;

    /// Set `locked_until` to the later of the stored value and `until`.
    async fn extend_lockout(&self, key: &str, until: Timestamp) -> StoreResult<()>;

    async fn delete_attempts(&self, key: &str) -> StoreResult<()>;

    async fn put_token(&self, token: SecurityToken) -> StoreResult<()>;

    async fn get_token(&self, token_id: &str) -> StoreResult<Option<SecurityToken>>;

    async fn delete_token(&self, token_id: &str) -> StoreResult<()>;

    /// Atomically flip `used` from `expected_used` to `new_used`.
    ///
    /// Returns false if the token is missing or `used` did not match.
    async fn compare_and_swap_used(
        &self,
        token_id: &str,
        expected_used: bool,
        new_used: bool,
    ) -> StoreResult<bool>;

    /// Insert a marker unless one is already live. True for the first caller.
    async fn insert_marker(&self, marker: &str, ttl: Duration, now: Timestamp)
        -> StoreResult<bool>;

    /// Drop expired attempt records, tokens and markers. Returns the number removed.
    async fn purge_expired(&self, now: Timestamp) -> StoreResult<usize>;
}
