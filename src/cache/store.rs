//! Low-level TTL key-value store trait.
//!
//! [`CacheStore`] is the seam between the typed cache wrappers and the
//! concrete storage engine. Backends are dumb KV stores: key naming, TTL
//! policy, serialization, and quota/lock semantics all live in the layers
//! above ([`wrappers`](crate::cache::wrappers), [`quota`](crate::cache::quota),
//! [`lock`](crate::cache::lock)).
//!
//! Two implementations ship with the crate:
//! [`MemoryStore`](crate::cache::memory::MemoryStore) for tests and
//! single-process deployments, and
//! [`RedisStore`](crate::cache::redis::RedisStore) for production.

use std::time::Duration;

use async_trait::async_trait;

/// Errors surfaced by a storage backend.
///
/// The cache-aside wrappers never escalate these on the read path; callers
/// of the raw store (quota, lock) decide per operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {message}")]
    Backend { message: String },

    #[error("value at key {key} has the wrong type for this operation")]
    WrongType { key: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}

/// A TTL-keyed key-value store with the primitives the cache layer needs.
///
/// All operations are safe for concurrent use. `ttl: None` means the key
/// does not expire.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the string value at `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a string value, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically add `delta` to the integer at `key` (missing keys count
    /// as 0) and return the new value. Does not touch the key's TTL.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Set or replace the TTL of an existing key. Returns false if the key
    /// does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Set a field in the hash at `key`, creating the hash if needed.
    /// A TTL, when given, applies to the whole hash.
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Fetch a single hash field.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Add a member to the set at `key`. Returns whether the member was
    /// newly added. A TTL, when given, applies to the whole set.
    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Membership test against the set at `key`.
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Set `key` to `value` with `ttl` only if the key is absent.
    /// Returns whether the write happened. This is the lock-acquire
    /// primitive.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Atomically delete `key` only if its current value equals `value`.
    /// Returns whether a deletion happened. This is the lock-release
    /// primitive.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError>;
}
