//! Task and result model for the async execution core.
//!
//! Each task kind carries an explicit payload variant with named, typed
//! fields. Payloads and outputs are serde-serializable (internally tagged)
//! so an untyped wire format can be adapted at the boundary without the
//! core ever passing loose maps around.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// The kinds of post-evaluation side-effect work the pool executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateFeedbackText,
    GenerateFeedbackAudio,
    GenerateDemoAudio,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::GenerateFeedbackText => "generate_feedback_text",
            TaskKind::GenerateFeedbackAudio => "generate_feedback_audio",
            TaskKind::GenerateDemoAudio => "generate_demo_audio",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue priority. High-priority tasks are drained before normal ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Normal,
}

/// Whether a demo recording covers a single word or a full sentence.
///
/// Also the sub-namespace under which demo audio URLs are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoType {
    Word,
    Sentence,
}

impl DemoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoType::Word => "word",
            DemoType::Sentence => "sentence",
        }
    }
}

/// Typed task payload, one variant per task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Generate feedback text for a finished evaluation.
    #[serde(rename = "generate_feedback_text")]
    FeedbackText {
        evaluation_id: String,
        score: u32,
        problem_word: String,
        level: String,
        target_text: String,
    },

    /// Synthesize audio for already-generated feedback text.
    #[serde(rename = "generate_feedback_audio")]
    FeedbackAudio {
        evaluation_id: String,
        feedback_text: String,
    },

    /// Generate a demo pronunciation recording for low-scoring evaluations.
    #[serde(rename = "generate_demo_audio")]
    DemoAudio {
        evaluation_id: String,
        demo_text: String,
        demo_type: DemoType,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::FeedbackText { .. } => TaskKind::GenerateFeedbackText,
            TaskPayload::FeedbackAudio { .. } => TaskKind::GenerateFeedbackAudio,
            TaskPayload::DemoAudio { .. } => TaskKind::GenerateDemoAudio,
        }
    }

    pub fn evaluation_id(&self) -> &str {
        match self {
            TaskPayload::FeedbackText { evaluation_id, .. }
            | TaskPayload::FeedbackAudio { evaluation_id, .. }
            | TaskPayload::DemoAudio { evaluation_id, .. } => evaluation_id,
        }
    }
}

/// A unit of asynchronous work.
///
/// Lives only in process memory: created by the submission facade, mutated
/// by the pool on retry (`retry_count`, `not_before`), discarded after
/// terminal success or failure.
#[derive(Debug, Clone)]
pub struct Task {
    /// Task identity, typically the evaluation identifier.
    pub id: String,

    /// Typed payload; the task kind is derived from it.
    pub payload: TaskPayload,

    pub priority: TaskPriority,

    /// Retries consumed so far. Eligible for re-submission only while
    /// `retry_count < max_retries`.
    pub retry_count: u32,

    pub max_retries: u32,

    pub created_at: DateTime<Utc>,

    /// Earliest instant the task may be dispatched. Set by the retry
    /// scheduler to implement delayed retry.
    pub not_before: Option<Instant>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        payload: TaskPayload,
        priority: TaskPriority,
        max_retries: u32,
    ) -> Self {
        Self {
            id: id.into(),
            payload,
            priority,
            retry_count: 0,
            max_retries,
            created_at: Utc::now(),
            not_before: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    /// Whether another retry may be scheduled after a failure.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Delay before the nth retry: `base * 2^n`, capped at `max`.
///
/// With the default 1s base this reproduces the 2s/4s/8s ladder for
/// retries 1..3.
pub fn backoff_delay(retry_number: u32, base: Duration, max: Duration) -> Duration {
    // Exponent clamp keeps the multiplication well away from overflow;
    // anything this large is capped by `max` anyway.
    let exp = retry_number.min(20);
    let delay = base.saturating_mul(1u32 << exp);
    delay.min(max)
}

/// Typed task output, one variant per task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    #[serde(rename = "generate_feedback_text")]
    FeedbackText { text: String, from_cache: bool },

    #[serde(rename = "generate_feedback_audio")]
    FeedbackAudio { audio_url: String },

    #[serde(rename = "generate_demo_audio")]
    DemoAudio { audio_url: String, from_cache: bool },
}

/// Outcome of a single task attempt, published to the result pipeline.
///
/// Immutable once published. Failed attempts that will be retried still
/// produce a result for observability.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub kind: TaskKind,
    pub success: bool,
    pub output: Option<TaskOutput>,
    pub error: Option<String>,

    /// Retry count of the attempt that produced this result.
    pub retry_count: u32,

    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(task: &Task, output: TaskOutput, duration: Duration) -> Self {
        Self {
            task_id: task.id.clone(),
            kind: task.kind(),
            success: true,
            output: Some(output),
            error: None,
            retry_count: task.retry_count,
            duration,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(task: &Task, error: impl std::fmt::Display, duration: Duration) -> Self {
        Self {
            task_id: task.id.clone(),
            kind: task.kind(),
            success: false,
            output: None,
            error: Some(error.to_string()),
            retry_count: task.retry_count,
            duration,
            completed_at: Utc::now(),
        }
    }
}
