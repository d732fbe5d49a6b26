//! Distributed advisory lock.
//!
//! Mutual exclusion among cooperating callers checking the same key,
//! enforced by the store's set-if-absent primitive. Release is an atomic
//! compare-and-delete against the caller's token, so a holder whose lock
//! already expired can never release the next holder's lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::keys;
use super::store::{CacheStore, StoreError};

/// Attempts made by [`DistributedLock::with_lock`] before giving up.
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// All acquisition attempts were exhausted. The caller decides the
    /// fallback: skip, wait, or fail the request.
    #[error("lock not acquired: {key}")]
    NotAcquired { key: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Advisory lock over a [`CacheStore`].
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CacheStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Fresh opaque token; one per acquisition attempt.
    pub fn new_token() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Try to take the lock, making `max_retries + 1` set-if-absent
    /// attempts with `retry_wait` between them. Exhausting the attempts is
    /// a `false` return, not an error.
    pub async fn acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
        max_retries: u32,
        retry_wait: Duration,
    ) -> Result<bool, StoreError> {
        let lock_key = keys::lock(key);
        for attempt in 0..=max_retries {
            if self.store.set_nx(&lock_key, token, ttl).await? {
                return Ok(true);
            }
            if attempt < max_retries {
                tokio::time::sleep(retry_wait).await;
            }
        }
        Ok(false)
    }

    /// Release the lock if and only if `token` still holds it.
    pub async fn release(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        self.store
            .delete_if_equals(&keys::lock(key), token)
            .await
    }

    /// Run `work` while holding the lock, releasing on every exit path.
    ///
    /// Returns [`LockError::NotAcquired`] without running `work` when the
    /// lock cannot be taken.
    pub async fn with_lock<F, Fut, T>(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
        work: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let acquired = self
            .acquire(key, token, ttl, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_WAIT)
            .await?;
        if !acquired {
            return Err(LockError::NotAcquired {
                key: key.to_string(),
            });
        }

        let output = work().await;

        if let Err(error) = self.release(key, token).await {
            warn!(key, %error, "failed to release lock, ttl will reclaim it");
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryStore;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn only_one_of_two_contenders_wins() {
        let lock = lock();
        let ttl = Duration::from_secs(30);

        let a = lock
            .acquire("eval:42", "token-a", ttl, 0, Duration::ZERO)
            .await
            .unwrap();
        let b = lock
            .acquire("eval:42", "token-b", ttl, 0, Duration::ZERO)
            .await
            .unwrap();
        assert!(a);
        assert!(!b);

        // The loser's release is a no-op; the winner still holds the key.
        assert!(!lock.release("eval:42", "token-b").await.unwrap());
        assert!(lock.release("eval:42", "token-a").await.unwrap());
    }

    #[tokio::test]
    async fn released_lock_can_be_reacquired() {
        let lock = lock();
        let ttl = Duration::from_secs(30);

        assert!(lock
            .acquire("eval:1", "token-a", ttl, 0, Duration::ZERO)
            .await
            .unwrap());
        assert!(lock.release("eval:1", "token-a").await.unwrap());
        assert!(lock
            .acquire("eval:1", "token-b", ttl, 0, Duration::ZERO)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn with_lock_releases_on_the_error_path() {
        let lock = lock();
        let ttl = Duration::from_secs(30);

        let outcome: Result<std::result::Result<(), &str>, LockError> = lock
            .with_lock("eval:7", "token-a", ttl, || async { Err("handler blew up") })
            .await;
        assert_eq!(outcome.unwrap(), Err("handler blew up"));

        // Lock was released despite the inner failure.
        assert!(lock
            .acquire("eval:7", "token-b", ttl, 0, Duration::ZERO)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn with_lock_surfaces_not_acquired() {
        let lock = lock();
        let ttl = Duration::from_secs(30);
        assert!(lock
            .acquire("eval:9", "holder", ttl, 0, Duration::ZERO)
            .await
            .unwrap());

        let outcome = lock
            .with_lock("eval:9", "contender", ttl, || async { 1 })
            .await;
        assert!(matches!(outcome, Err(LockError::NotAcquired { .. })));
    }
}
