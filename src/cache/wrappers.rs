//! Typed cache-aside wrappers.
//!
//! Each wrapper maps a business key to a serialized value with a fixed TTL
//! (see [`CacheConfig`](crate::config::CacheConfig) for the policy table).
//! Cached values are never authoritative: a read-path store failure is
//! logged and treated as a miss, and a write failure after successful
//! generation never takes the freshly generated value away from the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CacheConfig;
use crate::tasks::DemoType;

use super::keys;
use super::store::{CacheStore, StoreError};

/// Whether a value came out of the cache or was freshly generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Generated,
}

impl CacheOutcome {
    pub fn from_cache(&self) -> bool {
        matches!(self, CacheOutcome::Hit)
    }
}

/// Shared cache-aside read path: hit wins, store failure degrades to a
/// miss, generator success is written back best-effort.
async fn get_or_generate<F, Fut, E>(
    store: &Arc<dyn CacheStore>,
    key: &str,
    ttl: Duration,
    generate: F,
) -> Result<(String, CacheOutcome), E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, E>>,
{
    match store.get(key).await {
        Ok(Some(cached)) => return Ok((cached, CacheOutcome::Hit)),
        Ok(None) => {}
        Err(error) => warn!(key, %error, "cache read failed, falling back to generation"),
    }

    let value = generate().await?;
    if let Err(error) = store.set(key, &value, Some(ttl)).await {
        warn!(key, %error, "cache write failed after generation, returning fresh value");
    }
    Ok((value, CacheOutcome::Generated))
}

/// Read a string key, degrading store failures to a miss.
async fn read_lenient(store: &Arc<dyn CacheStore>, key: &str) -> Option<String> {
    match store.get(key).await {
        Ok(value) => value,
        Err(error) => {
            warn!(key, %error, "cache read failed, treating as miss");
            None
        }
    }
}

/// Evaluation result snapshots keyed by evaluation ID, 7-day TTL.
///
/// The snapshot type is owned by the evaluation pipeline, so this wrapper
/// is generic over any serde-serializable record.
#[derive(Clone)]
pub struct EvaluationResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl EvaluationResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, evaluation_id: &str) -> Option<T> {
        let key = keys::evaluation_result(evaluation_id);
        let raw = read_lenient(&self.store, &key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, %error, "cached evaluation result is unreadable, treating as miss");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        evaluation_id: &str,
        result: &T,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(result)
            .map_err(|e| StoreError::backend(format!("serialize evaluation result: {e}")))?;
        self.store
            .set(&keys::evaluation_result(evaluation_id), &raw, Some(self.ttl))
            .await
    }

    pub async fn invalidate(&self, evaluation_id: &str) -> Result<bool, StoreError> {
        self.store.delete(&keys::evaluation_result(evaluation_id)).await
    }
}

/// Generated feedback text keyed by `score:normalized-word:level`, 7-day
/// TTL. Memoizes the LLM call across users hitting the same problem.
#[derive(Clone)]
pub struct FeedbackTextCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl FeedbackTextCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, score: u32, problem_word: &str, level: &str) -> Option<String> {
        let key = keys::feedback_text(score, problem_word, level);
        read_lenient(&self.store, &key).await
    }

    pub async fn set(
        &self,
        score: u32,
        problem_word: &str,
        level: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        self.store
            .set(
                &keys::feedback_text(score, problem_word, level),
                text,
                Some(self.ttl),
            )
            .await
    }

    pub async fn get_or_generate<F, Fut, E>(
        &self,
        score: u32,
        problem_word: &str,
        level: &str,
        generate: F,
    ) -> Result<(String, CacheOutcome), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let key = keys::feedback_text(score, problem_word, level);
        get_or_generate(&self.store, &key, self.ttl, generate).await
    }
}

/// Demo audio URLs keyed by normalized text under the word/sentence
/// sub-namespace, 30-day TTL. Memoizes TTS synthesis plus upload.
#[derive(Clone)]
pub struct DemoAudioCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DemoAudioCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, demo_type: DemoType, demo_text: &str) -> Option<String> {
        let key = keys::demo_audio(demo_type, demo_text);
        read_lenient(&self.store, &key).await
    }

    pub async fn set(
        &self,
        demo_type: DemoType,
        demo_text: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        self.store
            .set(&keys::demo_audio(demo_type, demo_text), url, Some(self.ttl))
            .await
    }

    pub async fn get_or_generate<F, Fut, E>(
        &self,
        demo_type: DemoType,
        demo_text: &str,
        generate: F,
    ) -> Result<(String, CacheOutcome), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let key = keys::demo_audio(demo_type, demo_text);
        get_or_generate(&self.store, &key, self.ttl, generate).await
    }
}

/// One-time upload tokens, 5-minute TTL.
///
/// `consume` is single-use: the token value is deleted on first read and
/// the token is also recorded in a day-scoped used set so a replay after
/// expiry is still rejected.
#[derive(Clone)]
pub struct UploadTokenCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl UploadTokenCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a fresh token bound to `user_id`.
    pub async fn issue(&self, user_id: &str) -> Result<String, StoreError> {
        let token = uuid::Uuid::new_v4().to_string();
        self.store
            .set(&keys::upload_token(&token), user_id, Some(self.ttl))
            .await?;
        Ok(token)
    }

    /// Redeem a token, returning the user it was issued to. Subsequent
    /// calls with the same token return `None`.
    pub async fn consume(&self, token: &str) -> Result<Option<String>, StoreError> {
        let used_key = keys::upload_tokens_used(&keys::local_day_stamp());
        if self.store.set_contains(&used_key, token).await? {
            return Ok(None);
        }

        let key = keys::upload_token(token);
        let Some(user_id) = self.store.get(&key).await? else {
            return Ok(None);
        };

        self.store.delete(&key).await?;
        self.store
            .set_add(&used_key, token, Some(keys::ttl_until_local_midnight()))
            .await?;
        Ok(Some(user_id))
    }
}

/// User profile snapshots, 1-hour TTL, explicitly invalidated when the
/// profile changes.
#[derive(Clone)]
pub struct UserProfileCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl UserProfileCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, user_id: &str) -> Option<T> {
        let key = keys::user_profile(user_id);
        let raw = read_lenient(&self.store, &key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, %error, "cached profile is unreadable, treating as miss");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, user_id: &str, profile: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(profile)
            .map_err(|e| StoreError::backend(format!("serialize profile: {e}")))?;
        self.store
            .set(&keys::user_profile(user_id), &raw, Some(self.ttl))
            .await
    }

    /// Drop the cached snapshot after a profile update.
    pub async fn invalidate(&self, user_id: &str) -> Result<bool, StoreError> {
        self.store.delete(&keys::user_profile(user_id)).await
    }
}

/// Aggregate practice statistics for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_evaluations: i64,
    pub average_score: f64,
    pub streak_days: i64,
}

/// User stats snapshots stored as hash fields, 5-minute TTL.
#[derive(Clone)]
pub struct UserStatsCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl UserStatsCache {
    const FIELD_TOTAL: &'static str = "total_evaluations";
    const FIELD_AVERAGE: &'static str = "average_score";
    const FIELD_STREAK: &'static str = "streak_days";

    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, user_id: &str) -> Option<UserStats> {
        let key = keys::user_stats(user_id);
        let total = self.store.hash_get(&key, Self::FIELD_TOTAL).await.ok()??;
        let average = self.store.hash_get(&key, Self::FIELD_AVERAGE).await.ok()??;
        let streak = self.store.hash_get(&key, Self::FIELD_STREAK).await.ok()??;
        Some(UserStats {
            total_evaluations: total.parse().ok()?,
            average_score: average.parse().ok()?,
            streak_days: streak.parse().ok()?,
        })
    }

    pub async fn set(&self, user_id: &str, stats: &UserStats) -> Result<(), StoreError> {
        let key = keys::user_stats(user_id);
        // TTL goes on the first write: a failure partway through may leave
        // a partial hash, but never one that outlives the expiry.
        self.store
            .hash_set(
                &key,
                Self::FIELD_TOTAL,
                &stats.total_evaluations.to_string(),
                Some(self.ttl),
            )
            .await?;
        self.store
            .hash_set(&key, Self::FIELD_AVERAGE, &stats.average_score.to_string(), None)
            .await?;
        self.store
            .hash_set(&key, Self::FIELD_STREAK, &stats.streak_days.to_string(), None)
            .await
    }

    pub async fn invalidate(&self, user_id: &str) -> Result<bool, StoreError> {
        self.store.delete(&keys::user_stats(user_id)).await
    }
}

/// Session snapshots, 24-hour TTL unless the caller overrides it.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
}

impl SessionCache {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, session_id: &str) -> Option<T> {
        let key = keys::session(session_id);
        let raw = read_lenient(&self.store, &key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, %error, "cached session is unreadable, treating as miss");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(
        &self,
        session_id: &str,
        session: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session)
            .map_err(|e| StoreError::backend(format!("serialize session: {e}")))?;
        self.store
            .set(
                &keys::session(session_id),
                &raw,
                Some(ttl.unwrap_or(self.default_ttl)),
            )
            .await
    }

    /// Extend a live session's TTL without rewriting it.
    pub async fn refresh(&self, session_id: &str) -> Result<bool, StoreError> {
        self.store
            .expire(&keys::session(session_id), self.default_ttl)
            .await
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        self.store.delete(&keys::session(session_id)).await
    }
}

/// All typed caches wired against one store with one TTL policy.
#[derive(Clone)]
pub struct Caches {
    pub evaluation_result: EvaluationResultCache,
    pub feedback_text: FeedbackTextCache,
    pub demo_audio: DemoAudioCache,
    pub upload_token: UploadTokenCache,
    pub user_profile: UserProfileCache,
    pub user_stats: UserStatsCache,
    pub session: SessionCache,
}

impl Caches {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            evaluation_result: EvaluationResultCache::new(
                store.clone(),
                config.evaluation_result_ttl,
            ),
            feedback_text: FeedbackTextCache::new(store.clone(), config.feedback_text_ttl),
            demo_audio: DemoAudioCache::new(store.clone(), config.demo_audio_ttl),
            upload_token: UploadTokenCache::new(store.clone(), config.upload_token_ttl),
            user_profile: UserProfileCache::new(store.clone(), config.user_profile_ttl),
            user_stats: UserStatsCache::new(store.clone(), config.user_stats_ttl),
            session: SessionCache::new(store, config.session_ttl),
        }
    }
}
