//! Synthesizer worker: one text chunk in, one audio fragment out. This is
//! the stage where prefetch=1 matters most - synthesis latency varies
//! widely with chunk length, so a single outstanding delivery per consumer
//! is the backpressure mechanism (see concurrency model).

use crate::broker::{decode_json, publish_json, MessageBroker};
use crate::error::PipelineError;
use crate::messages::{SynthesizeJob, TrackerOperation, TRACKER_QUEUE};
use crate::model::{object_keys, ChunkStatus};
use crate::object_store::ObjectStore;
use crate::retry::with_backoff;
use crate::tts::{SynthesisRequest, TtsClient};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Synthesizer {
    object_store: Arc<dyn ObjectStore>,
    broker: Arc<dyn MessageBroker>,
    tts: Arc<dyn TtsClient>,
    retry_max_attempts: u32,
}

impl Synthesizer {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        broker: Arc<dyn MessageBroker>,
        tts: Arc<dyn TtsClient>,
        retry_max_attempts: u32,
    ) -> Self {
        Self { object_store, broker, tts, retry_max_attempts }
    }

    pub async fn run(&self) -> Result<(), PipelineError> {
        use futures::StreamExt;
        let mut stream = self.broker.consume(crate::messages::TTS_QUEUE).await?;

        while let Some(delivery) = stream.next().await {
            let job: SynthesizeJob = match decode_json(delivery.as_ref()) {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "malformed synthesis job");
                    delivery.nack_drop().await?;
                    continue;
                }
            };

            match self.process(job).await {
                Ok(()) => delivery.ack().await?,
                Err(e) => {
                    error!(error = %e, "synthesis job failed, requeuing");
                    delivery.nack_requeue().await?;
                }
            }
        }
        Ok(())
    }

    pub async fn process(&self, job: SynthesizeJob) -> Result<(), PipelineError> {
        let (book, chapter, index) = (job.book_uuid, job.chapter_uuid, job.chunk_index);

        self.notify(TrackerOperation::UpdateChunkStatus {
            book_uuid: book,
            chapter_uuid: chapter,
            chunk_index: index,
            status: ChunkStatus::InProgress,
        })
        .await?;

        let text_bytes = with_backoff(self.retry_max_attempts, || {
            self.object_store.get(&object_keys::chunk_text(book, chapter, index))
        })
        .await?;
        let text = String::from_utf8_lossy(&text_bytes).to_string();

        if text.trim().is_empty() {
            warn!(%book, %chapter, index, "empty chunk text, marking failed without synthesizing");
            self.notify(TrackerOperation::UpdateChunkStatus {
                book_uuid: book,
                chapter_uuid: chapter,
                chunk_index: index,
                status: ChunkStatus::Failed,
            })
            .await?;
            return Ok(());
        }

        let request = SynthesisRequest::new(text);
        let audio = with_backoff(self.retry_max_attempts, || self.tts.synthesize(request.clone())).await?;

        let audio_key = object_keys::chunk_audio(book, chapter, index);
        with_backoff(self.retry_max_attempts, || self.object_store.put(&audio_key, audio.clone())).await?;

        self.notify(TrackerOperation::RemoveChunk { book_uuid: book, chapter_uuid: chapter, chunk_index: index })
            .await?;

        info!(%book, %chapter, index, "chunk synthesized");
        Ok(())
    }

    async fn notify(&self, op: TrackerOperation) -> Result<(), PipelineError> {
        publish_json(self.broker.as_ref(), TRACKER_QUEUE, &op).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::object_store::InMemoryObjectStore;
    use crate::tts::EchoTtsClient;
    use uuid::Uuid;

    #[tokio::test]
    async fn chunk_text_is_synthesized_and_uploaded() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let tts = Arc::new(EchoTtsClient);
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();

        object_store
            .put(&object_keys::chunk_text(book, chapter, 1), b"hello there".to_vec())
            .await
            .unwrap();

        let synthesizer = Synthesizer::new(object_store.clone(), broker, tts, 3);
        synthesizer
            .process(SynthesizeJob { book_uuid: book, chapter_uuid: chapter, chunk_index: 1 })
            .await
            .unwrap();

        let audio = object_store.get(&object_keys::chunk_audio(book, chapter, 1)).await.unwrap();
        assert_eq!(audio, b"hello there");
    }

    #[tokio::test]
    async fn empty_chunk_text_is_not_sent_to_tts() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let tts = Arc::new(EchoTtsClient);
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();

        object_store.put(&object_keys::chunk_text(book, chapter, 1), Vec::new()).await.unwrap();

        let synthesizer = Synthesizer::new(object_store.clone(), broker, tts, 3);
        synthesizer
            .process(SynthesizeJob { book_uuid: book, chapter_uuid: chapter, chunk_index: 1 })
            .await
            .unwrap();

        let result = object_store.get(&object_keys::chunk_audio(book, chapter, 1)).await;
        assert!(result.is_err());
    }
}
