//! In-process store on sharded concurrent maps.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Timestamp;
use crate::error::StoreResult;
use crate::security::types::{AttemptRecord, SecurityToken};
use crate::store::SecurityStore;

#[derive(Debug, Clone)]
struct AttemptEntry {
    record: AttemptRecord,
    /// Window the record was last counted under, needed for expiry sweeps.
    window: Duration,
}

/// A single-instance store.
///
/// DashMap entry guards hold the shard lock for the duration of each
/// mutation, which is what makes increment and compare-and-swap atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    attempts: Arc<DashMap<String, AttemptEntry>>,
    tokens: Arc<DashMap<String, SecurityToken>>,
    markers: Arc<DashMap<String, Timestamp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked identity keys.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Number of stored tokens (used or not).
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl SecurityStore for MemoryStore {
    async fn get_attempts(&self, key: &str) -> StoreResult<Option<AttemptRecord>> {
        Ok(self.attempts.get(key).map(|r| r.value().record.clone()))
    }

    async fn atomic_increment(
        &self,
        key: &str,
        window: Duration,
        now: Timestamp,
    ) -> StoreResult<AttemptRecord> {
        match self.attempts.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.window = window;
                let record = &mut entry.record;
                if record.window_elapsed(window, now) {
                    record.count = 0;
                    record.window_start = now;
                    if !record.is_locked(now) {
                        record.locked_until = None;
                    }
                }
                record.count = record.count.saturating_add(1);
                Ok(record.clone())
            }
            Entry::Vacant(vacant) => {
                let record = AttemptRecord::first(key, now);
                vacant.insert(AttemptEntry {
                    record: record.clone(),
                    window,
                });
                Ok(record)
            }
        }
    }

    async fn extend_lockout(&self, key: &str, until: Timestamp) -> StoreResult<()> {
        if let Some(mut entry) = self.attempts.get_mut(key) {
            let record = &mut entry.record;
            record.locked_until = Some(match record.locked_until {
                Some(existing) => existing.max(until),
                None => until,
            });
        }
        Ok(())
    }

    async fn delete_attempts(&self, key: &str) -> StoreResult<()> {
        self.attempts.remove(key);
        Ok(())
    }

    async fn put_token(&self, token: SecurityToken) -> StoreResult<()> {
        self.tokens.insert(token.token_id.clone(), token);
        Ok(())
    }

    async fn get_token(&self, token_id: &str) -> StoreResult<Option<SecurityToken>> {
        Ok(self.tokens.get(token_id).map(|r| r.value().clone()))
    }

    async fn delete_token(&self, token_id: &str) -> StoreResult<()> {
        self.tokens.remove(token_id);
        Ok(())
    }

    async fn compare_and_swap_used(
        &self,
        token_id: &str,
        expected_used: bool,
        new_used: bool,
    ) -> StoreResult<bool> {
        match self.tokens.get_mut(token_id) {
            Some(mut token) if token.used == expected_used => {
                token.used = new_used;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_marker(
        &self,
        marker: &str,
        ttl: Duration,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let expires = now.saturating_add(ttl);
        match self.markers.entry(marker.to_string()) {
            Entry::Occupied(mut occupied) => {
                if now > *occupied.get() {
                    occupied.insert(expires);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires);
                Ok(true)
            }
        }
    }

    async fn purge_expired(&self, now: Timestamp) -> StoreResult<usize> {
        let before = self.attempts.len() + self.tokens.len() + self.markers.len();
        self.attempts
            .retain(|_, entry| !entry.record.is_expired(entry.window, now));
        self.tokens.retain(|_, token| !token.is_expired(now));
        self.markers.retain(|_, expires| now <= *expires);
        let after = self.attempts.len() + self.tokens.len() + self.markers.len();
        Ok(before.saturating_sub(after))
    }
}
