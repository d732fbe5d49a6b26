//! Feedback audio synthesis handler.
//!
//! Turns already-generated feedback text into speech and uploads the
//! bytes under a deterministic per-evaluation key. Re-running the task
//! overwrites the same object, so retries are idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::pool::{HandlerError, TaskHandler};
use crate::providers::{ObjectStore, SpeechSynthesizer};
use crate::tasks::{Task, TaskOutput, TaskPayload};

pub struct FeedbackAudioHandler {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    object_store: Arc<dyn ObjectStore>,
}

impl FeedbackAudioHandler {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            synthesizer,
            object_store,
        }
    }
}

#[async_trait]
impl TaskHandler for FeedbackAudioHandler {
    async fn handle(&self, task: &Task) -> Result<TaskOutput, HandlerError> {
        let TaskPayload::FeedbackAudio {
            evaluation_id,
            feedback_text,
        } = &task.payload
        else {
            return Err(HandlerError::InvalidPayload(format!(
                "feedback audio handler got {} payload",
                task.kind()
            )));
        };

        if feedback_text.trim().is_empty() {
            return Err(HandlerError::Validation(
                "feedback text is empty, nothing to synthesize".to_string(),
            ));
        }

        let audio = self.synthesizer.synthesize(feedback_text).await?;
        let object_key = format!("feedback_audio/{evaluation_id}.mp3");
        let audio_url = self
            .object_store
            .upload(&object_key, audio, "audio/mpeg")
            .await?;

        debug!(evaluation_id = %evaluation_id, %audio_url, "feedback audio uploaded");
        Ok(TaskOutput::FeedbackAudio { audio_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::tasks::TaskPriority;
    use std::sync::Mutex;

    struct FakeSynthesizer {
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynthesizer {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
            if self.fail {
                Err(ProviderError::Upstream {
                    status: 503,
                    message: "tts overloaded".to_string(),
                })
            } else {
                Ok(text.as_bytes().to_vec())
            }
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        uploads: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn upload(
            &self,
            key: &str,
            bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, ProviderError> {
            self.uploads
                .lock()
                .unwrap()
                .push((key.to_string(), bytes.len()));
            Ok(format!("https://cdn.example.com/{key}"))
        }
    }

    fn task(feedback_text: &str) -> Task {
        Task::new(
            "eval-7",
            TaskPayload::FeedbackAudio {
                evaluation_id: "eval-7".to_string(),
                feedback_text: feedback_text.to_string(),
            },
            TaskPriority::High,
            3,
        )
    }

    #[tokio::test]
    async fn synthesizes_and_uploads_under_the_evaluation_key() {
        let store = Arc::new(RecordingStore::default());
        let handler =
            FeedbackAudioHandler::new(Arc::new(FakeSynthesizer { fail: false }), store.clone());

        let output = handler.handle(&task("Nice work!")).await.unwrap();
        assert_eq!(
            output,
            TaskOutput::FeedbackAudio {
                audio_url: "https://cdn.example.com/feedback_audio/eval-7.mp3".to_string()
            }
        );
        let uploads = store.uploads.lock().unwrap();
        assert_eq!(
            uploads.as_slice(),
            &[("feedback_audio/eval-7.mp3".to_string(), "Nice work!".len())]
        );
    }

    #[tokio::test]
    async fn empty_text_is_a_validation_error() {
        let handler = FeedbackAudioHandler::new(
            Arc::new(FakeSynthesizer { fail: false }),
            Arc::new(RecordingStore::default()),
        );
        let error = handler.handle(&task("   ")).await.unwrap_err();
        assert!(matches!(error, HandlerError::Validation(_)));
        assert!(!error.is_retriable());
    }

    #[tokio::test]
    async fn upstream_overload_stays_retriable() {
        let handler = FeedbackAudioHandler::new(
            Arc::new(FakeSynthesizer { fail: true }),
            Arc::new(RecordingStore::default()),
        );
        let error = handler.handle(&task("Nice work!")).await.unwrap_err();
        assert!(error.is_retriable());
    }
}
