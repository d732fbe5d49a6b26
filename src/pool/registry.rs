//! Handler contract and the injected handler registry.
//!
//! The registry is an explicitly owned object constructed at startup and
//! passed into the pool, not process-wide mutable state. Registration is
//! safe while workers are running: dispatches take the read side of the
//! lock, registration takes the write side, and the last registration for
//! a kind wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::providers::ProviderError;
use crate::tasks::{Task, TaskKind, TaskOutput};

/// A handler failure, classified for the retry path.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cancelled")]
    Cancelled,

    /// A required external dependency is not wired into this deployment.
    #[error("missing dependency: {0}")]
    MissingDependency(String),
}

impl HandlerError {
    /// Whether the pool should schedule a retry for this failure.
    pub fn is_retriable(&self) -> bool {
        match self {
            HandlerError::Unavailable(_) | HandlerError::Network(_) => true,
            HandlerError::Upstream { status, .. } => *status >= 500,
            HandlerError::InvalidPayload(_)
            | HandlerError::Validation(_)
            | HandlerError::Cancelled
            | HandlerError::MissingDependency(_) => false,
        }
    }
}

impl From<ProviderError> for HandlerError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => HandlerError::Unavailable(msg),
            ProviderError::Network(msg) => HandlerError::Network(msg),
            ProviderError::Upstream { status, message } => {
                HandlerError::Upstream { status, message }
            }
            ProviderError::InvalidInput(msg) => HandlerError::InvalidPayload(msg),
            ProviderError::Cancelled => HandlerError::Cancelled,
            ProviderError::NotConfigured(msg) => HandlerError::MissingDependency(msg),
        }
    }
}

/// A unit of task execution, implemented per task kind.
///
/// Side effects performed before returning an error must be idempotent or
/// tolerant of at-most-N retries; the pool re-dispatches retriable
/// failures with backoff.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<TaskOutput, HandlerError>;
}

/// Kind-to-handler map guarded by a read/write lock.
///
/// ```
/// use parlo_core::pool::HandlerRegistry;
///
/// let registry = HandlerRegistry::new();
/// assert!(tokio_test::block_on(registry.kinds()).is_empty());
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<TaskKind, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a handler with a task kind. The last registration for a
    /// kind wins.
    pub async fn register(&self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        let mut handlers = self.handlers.write().await;
        if handlers.insert(kind, handler).is_some() {
            info!(kind = %kind, "handler replaced for task kind");
        } else {
            debug!(kind = %kind, "handler registered for task kind");
        }
    }

    pub async fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().await.get(&kind).cloned()
    }

    /// Registered task kinds, for stats snapshots.
    pub async fn kinds(&self) -> Vec<TaskKind> {
        self.handlers.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskPayload, TaskPriority};

    struct StaticHandler(&'static str);

    #[async_trait]
    impl TaskHandler for StaticHandler {
        async fn handle(&self, _task: &Task) -> Result<TaskOutput, HandlerError> {
            Ok(TaskOutput::FeedbackText {
                text: self.0.to_string(),
                from_cache: false,
            })
        }
    }

    fn text_task() -> Task {
        Task::new(
            "eval-1",
            TaskPayload::FeedbackText {
                evaluation_id: "eval-1".to_string(),
                score: 70,
                problem_word: "rhythm".to_string(),
                level: "A".to_string(),
                target_text: "rhythm".to_string(),
            },
            TaskPriority::High,
            3,
        )
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let registry = HandlerRegistry::new();
        registry
            .register(TaskKind::GenerateFeedbackText, Arc::new(StaticHandler("first")))
            .await;
        registry
            .register(TaskKind::GenerateFeedbackText, Arc::new(StaticHandler("second")))
            .await;

        let handler = registry.get(TaskKind::GenerateFeedbackText).await.unwrap();
        let output = handler.handle(&text_task()).await.unwrap();
        assert_eq!(
            output,
            TaskOutput::FeedbackText {
                text: "second".to_string(),
                from_cache: false
            }
        );
        assert_eq!(registry.kinds().await, vec![TaskKind::GenerateFeedbackText]);
    }

    #[tokio::test]
    async fn unregistered_kind_resolves_to_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get(TaskKind::GenerateDemoAudio).await.is_none());
    }

    #[test]
    fn handler_error_retriability() {
        assert!(HandlerError::Unavailable("llm down".into()).is_retriable());
        assert!(HandlerError::Upstream {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retriable());
        assert!(!HandlerError::Upstream {
            status: 422,
            message: "unprocessable".into()
        }
        .is_retriable());
        assert!(!HandlerError::InvalidPayload("missing word".into()).is_retriable());
        assert!(!HandlerError::MissingDependency("tts".into()).is_retriable());
    }
}
