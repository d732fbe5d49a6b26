//! Submission facade for the evaluation domain.
//!
//! Translates a finished evaluation into well-formed tasks with the right
//! priorities and retry budgets, and submits them to the pool. Feedback
//! audio is not chained from the text task's completion: the caller
//! coordinates the dependency and supplies the generated text itself.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::pool::{SubmitError, WorkerPool};
use crate::tasks::{DemoType, Task, TaskPayload, TaskPriority};

/// Retry budget for the feedback text/audio tasks.
const FEEDBACK_MAX_RETRIES: u32 = 3;

/// Retry budget for demo audio generation.
const DEMO_MAX_RETRIES: u32 = 2;

/// Everything known about a completed evaluation that the async tasks
/// need.
#[derive(Debug, Clone)]
pub struct EvaluationTaskParams {
    pub evaluation_id: String,
    pub overall_score: u32,
    pub problem_word: String,
    pub feedback_level: String,
    pub target_text: String,

    /// Present when feedback text was already generated synchronously;
    /// enables the audio task without waiting on the text task.
    pub feedback_text: Option<String>,

    pub demo_text: Option<String>,
    pub demo_type: DemoType,
}

/// Builds and submits post-evaluation side-effect tasks.
#[derive(Clone)]
pub struct EvaluationTaskSubmitter {
    pool: Arc<WorkerPool>,

    /// Demo audio is only worth generating for scores below this.
    demo_score_threshold: u32,
}

impl EvaluationTaskSubmitter {
    pub fn new(pool: Arc<WorkerPool>, demo_score_threshold: u32) -> Self {
        Self {
            pool,
            demo_score_threshold,
        }
    }

    pub async fn submit_feedback_text_task(
        &self,
        evaluation_id: &str,
        score: u32,
        problem_word: &str,
        level: &str,
        target_text: &str,
    ) -> Result<(), SubmitError> {
        let task = Task::new(
            evaluation_id,
            TaskPayload::FeedbackText {
                evaluation_id: evaluation_id.to_string(),
                score,
                problem_word: problem_word.to_string(),
                level: level.to_string(),
                target_text: target_text.to_string(),
            },
            TaskPriority::High,
            FEEDBACK_MAX_RETRIES,
        );
        self.pool.submit(task).await
    }

    pub async fn submit_feedback_audio_task(
        &self,
        evaluation_id: &str,
        feedback_text: &str,
    ) -> Result<(), SubmitError> {
        let task = Task::new(
            evaluation_id,
            TaskPayload::FeedbackAudio {
                evaluation_id: evaluation_id.to_string(),
                feedback_text: feedback_text.to_string(),
            },
            TaskPriority::High,
            FEEDBACK_MAX_RETRIES,
        );
        self.pool.submit(task).await
    }

    pub async fn submit_demo_audio_task(
        &self,
        evaluation_id: &str,
        demo_text: &str,
        demo_type: DemoType,
    ) -> Result<(), SubmitError> {
        let task = Task::new(
            evaluation_id,
            TaskPayload::DemoAudio {
                evaluation_id: evaluation_id.to_string(),
                demo_text: demo_text.to_string(),
                demo_type,
            },
            TaskPriority::Normal,
            DEMO_MAX_RETRIES,
        );
        self.pool.submit(task).await
    }

    /// Fan out the async tasks for a completed evaluation.
    ///
    /// The feedback-text task is mandatory and its submission error
    /// surfaces to the caller. Demo audio is optional: it is only
    /// submitted for low scores, and a submission failure is logged and
    /// swallowed.
    pub async fn submit_evaluation_async_tasks(
        &self,
        params: &EvaluationTaskParams,
    ) -> Result<(), SubmitError> {
        self.submit_feedback_text_task(
            &params.evaluation_id,
            params.overall_score,
            &params.problem_word,
            &params.feedback_level,
            &params.target_text,
        )
        .await?;

        if let Some(feedback_text) = &params.feedback_text {
            self.submit_feedback_audio_task(&params.evaluation_id, feedback_text)
                .await?;
        }

        if params.overall_score < self.demo_score_threshold {
            if let Some(demo_text) = &params.demo_text {
                if let Err(error) = self
                    .submit_demo_audio_task(&params.evaluation_id, demo_text, params.demo_type)
                    .await
                {
                    warn!(
                        evaluation_id = %params.evaluation_id,
                        %error,
                        "demo audio task not submitted, continuing without it"
                    );
                }
            }
        } else {
            debug!(
                evaluation_id = %params.evaluation_id,
                score = params.overall_score,
                "score above demo threshold, skipping demo audio"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::HandlerRegistry;
    use std::time::Duration;

    fn submitter(queue_capacity: usize) -> EvaluationTaskSubmitter {
        let config = PoolConfig {
            worker_count: 1,
            queue_capacity,
            submit_timeout: Duration::from_millis(100),
            ..PoolConfig::default()
        };
        let pool = Arc::new(WorkerPool::new(config, Arc::new(HandlerRegistry::new())));
        EvaluationTaskSubmitter::new(pool, 60)
    }

    fn params(score: u32) -> EvaluationTaskParams {
        EvaluationTaskParams {
            evaluation_id: "eval-1".to_string(),
            overall_score: score,
            problem_word: "pronunciation".to_string(),
            feedback_level: "A".to_string(),
            target_text: "the quick brown fox".to_string(),
            feedback_text: None,
            demo_text: Some("the quick brown fox".to_string()),
            demo_type: DemoType::Sentence,
        }
    }

    #[tokio::test]
    async fn low_score_fans_out_text_and_demo() {
        let submitter = submitter(8);
        submitter
            .submit_evaluation_async_tasks(&params(45))
            .await
            .unwrap();
        assert_eq!(submitter.pool.stats().await.pending_tasks, 2);
    }

    #[tokio::test]
    async fn high_score_skips_demo_audio() {
        let submitter = submitter(8);
        submitter
            .submit_evaluation_async_tasks(&params(90))
            .await
            .unwrap();
        assert_eq!(submitter.pool.stats().await.pending_tasks, 1);
    }

    #[tokio::test]
    async fn known_feedback_text_adds_the_audio_task() {
        let submitter = submitter(8);
        let mut p = params(90);
        p.feedback_text = Some("Great work on the vowels.".to_string());
        submitter.submit_evaluation_async_tasks(&p).await.unwrap();
        assert_eq!(submitter.pool.stats().await.pending_tasks, 2);
    }

    #[tokio::test]
    async fn demo_submit_failure_is_swallowed() {
        // Fill the normal-priority queue so the demo task cannot fit; the
        // fan-out still succeeds because demo audio is optional.
        let submitter = submitter(1);
        submitter
            .submit_demo_audio_task("eval-0", "occupies the only slot", DemoType::Word)
            .await
            .unwrap();

        submitter
            .submit_evaluation_async_tasks(&params(30))
            .await
            .unwrap();
        assert_eq!(submitter.pool.stats().await.pending_tasks, 2);
    }

    #[tokio::test]
    async fn mandatory_text_task_failure_surfaces() {
        let submitter = submitter(1);
        // Fill the high-priority queue so the text task cannot fit.
        submitter
            .submit_feedback_audio_task("eval-0", "occupies the only slot")
            .await
            .unwrap();

        let err = submitter
            .submit_evaluation_async_tasks(&params(30))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::QueueTimeout { .. }));
    }
}
