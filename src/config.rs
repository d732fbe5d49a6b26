//! Configuration for the async execution and caching core.
//!
//! Environment-driven with typed defaults. The embedding process may also
//! build a [`CoreConfig`] directly and hand it to the components it wires
//! up; `from_env` exists for standalone deployments.

use std::time::Duration;

use crate::error::{CoreError, Result};

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of parallel workers pulling from the shared queues.
    pub worker_count: usize,

    /// Capacity of each bounded task queue (high and normal priority).
    pub queue_capacity: usize,

    /// How long `submit` blocks waiting for queue room before erroring.
    pub submit_timeout: Duration,

    /// How long `shutdown` waits for in-flight work before forcing exit.
    pub shutdown_timeout: Duration,

    /// Base delay for exponential retry backoff. The nth retry is delayed
    /// by `backoff_base * 2^n`, capped at `backoff_max`.
    pub backoff_base: Duration,

    /// Upper bound on any single retry delay.
    pub backoff_max: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            queue_capacity: 1000,
            submit_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

/// TTL policy for the typed caches.
///
/// These values encode assumed access patterns of already-persisted keys;
/// change them only together with a key-namespace migration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub evaluation_result_ttl: Duration,
    pub feedback_text_ttl: Duration,
    pub demo_audio_ttl: Duration,
    pub upload_token_ttl: Duration,
    pub user_profile_ttl: Duration,
    pub user_stats_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            evaluation_result_ttl: Duration::from_secs(7 * 24 * 3600),
            feedback_text_ttl: Duration::from_secs(7 * 24 * 3600),
            demo_audio_ttl: Duration::from_secs(30 * 24 * 3600),
            upload_token_ttl: Duration::from_secs(5 * 60),
            user_profile_ttl: Duration::from_secs(3600),
            user_stats_ttl: Duration::from_secs(5 * 60),
            session_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Top-level configuration consumed by the core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub pool: PoolConfig,
    pub cache: CacheConfig,

    /// Demo audio is only generated for evaluations scoring below this.
    pub demo_score_threshold: u32,

    /// Default per-user daily evaluation quota.
    pub daily_quota: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            cache: CacheConfig::default(),
            demo_score_threshold: 60,
            daily_quota: 20,
        }
    }
}

impl CoreConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(n) = parse_env::<usize>("PARLO_WORKER_COUNT")? {
            config.pool.worker_count = n;
        }
        if let Some(n) = parse_env::<usize>("PARLO_QUEUE_CAPACITY")? {
            config.pool.queue_capacity = n;
        }
        if let Some(ms) = parse_env::<u64>("PARLO_SUBMIT_TIMEOUT_MS")? {
            config.pool.submit_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("PARLO_SHUTDOWN_TIMEOUT_MS")? {
            config.pool.shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("PARLO_BACKOFF_BASE_MS")? {
            config.pool.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64>("PARLO_BACKOFF_MAX_MS")? {
            config.pool.backoff_max = Duration::from_millis(ms);
        }
        if let Some(n) = parse_env::<u32>("PARLO_DEMO_SCORE_THRESHOLD")? {
            config.demo_score_threshold = n;
        }
        if let Some(n) = parse_env::<i64>("PARLO_DAILY_QUOTA")? {
            config.daily_quota = n;
        }

        if config.pool.worker_count == 0 {
            return Err(CoreError::Configuration(
                "worker count must be greater than 0".to_string(),
            ));
        }
        if config.pool.queue_capacity == 0 {
            return Err(CoreError::Configuration(
                "queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| CoreError::Configuration(format!("invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
