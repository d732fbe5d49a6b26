//! Per-user daily quota counters.
//!
//! Counters live under `parlo:quota:eval:{user}:{YYYYMMDD}` and expire at
//! the next local midnight, so a new day always starts from zero.
//!
//! Enforcement is approximate by design: the read and the increment are
//! separate store operations, so two concurrent callers can both pass the
//! pre-check. The post-increment re-check narrows that window but cannot
//! close it without a store-side transaction.

use std::sync::Arc;

use super::keys;
use super::store::{CacheStore, StoreError};

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Usage as observed by this call (post-increment when allowed).
    pub usage: i64,
}

/// TTL-scoped daily usage counter.
#[derive(Clone)]
pub struct DailyQuota {
    store: Arc<dyn CacheStore>,
}

impl DailyQuota {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Check the user's usage against `limit` and claim one unit if room
    /// remains.
    ///
    /// At the limit the counter is not mutated. The first increment of a
    /// day pins the counter's expiry to the remaining time until local
    /// midnight.
    pub async fn check_and_increment(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<QuotaDecision, StoreError> {
        let key = keys::daily_quota(user_id, &keys::local_day_stamp());

        let current = self
            .store
            .get(&key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);
        if current >= limit {
            return Ok(QuotaDecision {
                allowed: false,
                usage: current,
            });
        }

        let usage = self.store.incr_by(&key, 1).await?;
        if usage == 1 {
            self.store
                .expire(&key, keys::ttl_until_local_midnight())
                .await?;
        }

        // A concurrent increment may have slipped between the read and the
        // increment; the unit stays claimed but the request is denied.
        Ok(QuotaDecision {
            allowed: usage <= limit,
            usage,
        })
    }

    /// Current usage for today without mutating the counter.
    pub async fn usage(&self, user_id: &str) -> Result<i64, StoreError> {
        let key = keys::daily_quota(user_id, &keys::local_day_stamp());
        Ok(self
            .store
            .get(&key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0))
    }
}
