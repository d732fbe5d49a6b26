//! Provider adapter interfaces.
//!
//! The concrete AI and storage integrations (speech recognition, LLM,
//! text-to-speech, object storage) live outside this crate; the core only
//! consumes these traits. Error classification here drives the pool's
//! retry decisions: transient transport and 5xx-pattern failures are
//! retriable, everything the provider rejected outright is not.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request cancelled")]
    Cancelled,

    /// The deployment has no adapter wired for this provider.
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub fn is_retriable(&self) -> bool {
        match self {
            ProviderError::Unavailable(_) | ProviderError::Network(_) => true,
            ProviderError::Upstream { status, .. } => *status >= 500,
            ProviderError::InvalidInput(_)
            | ProviderError::Cancelled
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Structured evaluation data handed to the feedback-text generator.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRequest {
    pub evaluation_id: String,
    pub score: u32,
    pub problem_word: String,
    pub level: String,
    pub target_text: String,
}

/// Feedback-text generation (typically an LLM adapter).
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate_feedback(&self, request: &FeedbackRequest) -> Result<String, ProviderError>;
}

/// Text-to-speech synthesis returning encoded audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Object storage upload returning a retrievable URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriability_classification() {
        assert!(ProviderError::Unavailable("tts down".into()).is_retriable());
        assert!(ProviderError::Network("reset".into()).is_retriable());
        assert!(ProviderError::Upstream {
            status: 503,
            message: "overloaded".into()
        }
        .is_retriable());
        assert!(!ProviderError::Upstream {
            status: 400,
            message: "bad request".into()
        }
        .is_retriable());
        assert!(!ProviderError::InvalidInput("empty text".into()).is_retriable());
        assert!(!ProviderError::Cancelled.is_retriable());
        assert!(!ProviderError::NotConfigured("object store".into()).is_retriable());
    }
}
