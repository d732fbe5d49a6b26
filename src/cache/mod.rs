//! Cache-aside memoization layer.
//!
//! Layered like a store/domain split: [`store`] defines the dumb TTL
//! key-value seam with [`memory`] and [`redis`] backends; [`wrappers`],
//! [`quota`], and [`lock`] hold the business semantics (key shapes, TTL
//! policy, quota windows, advisory locking) on top of it.

pub mod keys;
pub mod lock;
pub mod memory;
pub mod quota;
pub mod redis;
pub mod store;
pub mod wrappers;

pub use lock::{DistributedLock, LockError};
pub use memory::MemoryStore;
pub use quota::{DailyQuota, QuotaDecision};
pub use redis::RedisStore;
pub use store::{CacheStore, StoreError};
pub use wrappers::{
    CacheOutcome, Caches, DemoAudioCache, EvaluationResultCache, FeedbackTextCache, SessionCache,
    UploadTokenCache, UserProfileCache, UserStats, UserStatsCache,
};
