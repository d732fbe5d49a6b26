//! Feedback text generation handler.
//!
//! Cache-aside over the feedback-text cache: identical (score, word,
//! level) combinations pay for the LLM call once per TTL window. A
//! generator failure never hard-fails the task; the user gets a
//! deterministic score-banded template instead, since degraded feedback
//! beats no feedback on a latency-bounded path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::cache::FeedbackTextCache;
use crate::pool::{HandlerError, TaskHandler};
use crate::providers::{FeedbackGenerator, FeedbackRequest};
use crate::tasks::{Task, TaskOutput, TaskPayload};

pub struct FeedbackTextHandler {
    cache: FeedbackTextCache,
    generator: Arc<dyn FeedbackGenerator>,
}

impl FeedbackTextHandler {
    pub fn new(cache: FeedbackTextCache, generator: Arc<dyn FeedbackGenerator>) -> Self {
        Self { cache, generator }
    }
}

/// Score-banded template used when the generator is unavailable.
fn fallback_feedback(score: u32, problem_word: &str) -> String {
    if score >= 90 {
        format!("Excellent work! Your pronunciation of \"{problem_word}\" is nearly flawless.")
    } else if score >= 75 {
        format!("Good job! Keep practicing \"{problem_word}\" to smooth out the rough edges.")
    } else if score >= 60 {
        format!("You're getting there. Say \"{problem_word}\" slowly and listen closely.")
    } else {
        format!("Let's keep practicing. Break \"{problem_word}\" into syllables and try again.")
    }
}

#[async_trait]
impl TaskHandler for FeedbackTextHandler {
    async fn handle(&self, task: &Task) -> Result<TaskOutput, HandlerError> {
        let TaskPayload::FeedbackText {
            evaluation_id,
            score,
            problem_word,
            level,
            target_text,
        } = &task.payload
        else {
            return Err(HandlerError::InvalidPayload(format!(
                "feedback text handler got {} payload",
                task.kind()
            )));
        };

        if let Some(text) = self.cache.get(*score, problem_word, level).await {
            return Ok(TaskOutput::FeedbackText {
                text,
                from_cache: true,
            });
        }

        let request = FeedbackRequest {
            evaluation_id: evaluation_id.clone(),
            score: *score,
            problem_word: problem_word.clone(),
            level: level.clone(),
            target_text: target_text.clone(),
        };

        match self.generator.generate_feedback(&request).await {
            Ok(text) => {
                if let Err(error) = self.cache.set(*score, problem_word, level, &text).await {
                    warn!(evaluation_id = %evaluation_id, %error, "feedback text not cached");
                }
                Ok(TaskOutput::FeedbackText {
                    text,
                    from_cache: false,
                })
            }
            Err(error) => {
                // Fallback templates are never cached: the next request
                // should try the generator again.
                warn!(
                    evaluation_id = %evaluation_id,
                    %error,
                    "feedback generation failed, using fallback template"
                );
                Ok(TaskOutput::FeedbackText {
                    text: fallback_feedback(*score, problem_word),
                    from_cache: false,
                })
            }
        }
    }
}
