//! Demo audio handler.
//!
//! Demo pronunciations depend only on the spoken text, not the user or
//! the evaluation, so the URL is memoized for 30 days keyed by the
//! normalized text. Synthesis and upload run only on a miss.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{keys, DemoAudioCache};
use crate::pool::{HandlerError, TaskHandler};
use crate::providers::{ObjectStore, SpeechSynthesizer};
use crate::tasks::{Task, TaskOutput, TaskPayload};

pub struct DemoAudioHandler {
    cache: DemoAudioCache,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    object_store: Arc<dyn ObjectStore>,
}

impl DemoAudioHandler {
    pub fn new(
        cache: DemoAudioCache,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            cache,
            synthesizer,
            object_store,
        }
    }
}

#[async_trait]
impl TaskHandler for DemoAudioHandler {
    async fn handle(&self, task: &Task) -> Result<TaskOutput, HandlerError> {
        let TaskPayload::DemoAudio {
            evaluation_id,
            demo_text,
            demo_type,
        } = &task.payload
        else {
            return Err(HandlerError::InvalidPayload(format!(
                "demo audio handler got {} payload",
                task.kind()
            )));
        };

        if demo_text.trim().is_empty() {
            return Err(HandlerError::Validation(
                "demo text is empty, nothing to synthesize".to_string(),
            ));
        }

        let (audio_url, outcome) = self
            .cache
            .get_or_generate(*demo_type, demo_text, || async {
                let audio = self
                    .synthesizer
                    .synthesize(demo_text)
                    .await
                    .map_err(HandlerError::from)?;
                let object_key = format!(
                    "demo_audio/{}/{}.mp3",
                    demo_type.as_str(),
                    keys::normalize_text(demo_text)
                );
                self.object_store
                    .upload(&object_key, audio, "audio/mpeg")
                    .await
                    .map_err(HandlerError::from)
            })
            .await?;

        debug!(
            evaluation_id = %evaluation_id,
            %audio_url,
            from_cache = outcome.from_cache(),
            "demo audio ready"
        );
        Ok(TaskOutput::DemoAudio {
            audio_url,
            from_cache: outcome.from_cache(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MemoryStore};
    use crate::providers::ProviderError;
    use crate::tasks::{DemoType, TaskPriority};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSynthesizer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynthesizer {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProviderError::Network("connection reset".to_string()))
            } else {
                Ok(text.as_bytes().to_vec())
            }
        }
    }

    struct EchoStore;

    #[async_trait]
    impl ObjectStore for EchoStore {
        async fn upload(
            &self,
            key: &str,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<String, ProviderError> {
            Ok(format!("https://cdn.example.com/{key}"))
        }
    }

    fn handler(fail: bool) -> (DemoAudioHandler, Arc<CountingSynthesizer>) {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let synthesizer = Arc::new(CountingSynthesizer {
            calls: AtomicUsize::new(0),
            fail,
        });
        (
            DemoAudioHandler::new(
                DemoAudioCache::new(store, Duration::from_secs(600)),
                synthesizer.clone(),
                Arc::new(EchoStore),
            ),
            synthesizer,
        )
    }

    fn task(demo_text: &str) -> Task {
        Task::new(
            "eval-3",
            TaskPayload::DemoAudio {
                evaluation_id: "eval-3".to_string(),
                demo_text: demo_text.to_string(),
                demo_type: DemoType::Word,
            },
            TaskPriority::Normal,
            2,
        )
    }

    #[tokio::test]
    async fn second_request_for_the_same_text_hits_the_cache() {
        let (handler, synthesizer) = handler(false);

        let first = handler.handle(&task("Hello World")).await.unwrap();
        assert_eq!(
            first,
            TaskOutput::DemoAudio {
                audio_url: "https://cdn.example.com/demo_audio/word/hello_world.mp3".to_string(),
                from_cache: false,
            }
        );

        let second = handler.handle(&task("Hello World")).await.unwrap();
        let TaskOutput::DemoAudio { from_cache, .. } = second else {
            panic!("wrong output variant");
        };
        assert!(from_cache);
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn synthesis_failure_propagates_as_retriable() {
        let (handler, _) = handler(true);
        let error = handler.handle(&task("Hello")).await.unwrap_err();
        assert!(error.is_retriable());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_synthesis() {
        let (handler, synthesizer) = handler(false);
        let error = handler.handle(&task("  ")).await.unwrap_err();
        assert!(matches!(error, HandlerError::Validation(_)));
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 0);
    }
}
