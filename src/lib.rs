//! # Parlo Core
//!
//! Async execution core for the Parlo pronunciation coaching backend.
//! The API layer scores a recording synchronously and hands everything
//! slow to this crate: feedback text generation, feedback speech
//! synthesis, and demo pronunciation audio all run as background tasks
//! so the scoring response never waits on an LLM or TTS round trip.
//!
//! ## Architecture
//!
//! - [`pool`] — bounded worker pool with two priority queues, a handler
//!   registry, a delayed-requeue retry scheduler with exponential
//!   backoff, and graceful shutdown.
//! - [`tasks`] — task model: typed payloads, priorities, results.
//! - [`handlers`] — the built-in handlers for the three task kinds.
//! - [`submitter`] — facade the evaluation endpoint calls to fan out the
//!   follow-up tasks for one scored attempt.
//! - [`cache`] — cache-aside memoization layer: typed TTL caches over a
//!   swappable key-value store (in-memory or Redis), daily quota
//!   counters, and a token-fenced distributed lock.
//! - [`providers`] — traits for the external services (LLM, TTS, object
//!   storage) the handlers depend on.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parlo_core::cache::{Caches, MemoryStore};
//! use parlo_core::config::CoreConfig;
//! use parlo_core::pool::{HandlerRegistry, WorkerPool};
//!
//! # async fn example() -> parlo_core::Result<()> {
//! let config = CoreConfig::from_env()?;
//! let caches = Caches::new(Arc::new(MemoryStore::new()), &config.cache);
//! let pool = WorkerPool::new(config.pool.clone(), Arc::new(HandlerRegistry::new()));
//! // register handlers, then:
//! pool.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod pool;
pub mod providers;
pub mod submitter;
pub mod tasks;

pub use config::{CacheConfig, CoreConfig, PoolConfig};
pub use error::{CoreError, Result};
pub use logging::init_logging;
pub use pool::{PoolStats, SubmitError, WorkerPool};
pub use submitter::{EvaluationTaskParams, EvaluationTaskSubmitter};
pub use tasks::{Task, TaskKind, TaskOutput, TaskPayload, TaskPriority, TaskResult};
