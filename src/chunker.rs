//! Chunker worker: one chapter's text in, size-bounded text chunks out.

use crate::broker::{decode_json, publish_json, MessageBroker};
use crate::error::PipelineError;
use crate::messages::{ChunkJob, SynthesizeJob, TrackerOperation, TRACKER_QUEUE, TTS_QUEUE};
use crate::model::{object_keys, ChapterStatus};
use crate::object_store::ObjectStore;
use crate::retry::with_backoff;
use crate::text::{split_into_chunks, MAX_CHUNK_BYTES};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct Chunker {
    object_store: Arc<dyn ObjectStore>,
    broker: Arc<dyn MessageBroker>,
    retry_max_attempts: u32,
}

impl Chunker {
    pub fn new(object_store: Arc<dyn ObjectStore>, broker: Arc<dyn MessageBroker>, retry_max_attempts: u32) -> Self {
        Self { object_store, broker, retry_max_attempts }
    }

    pub async fn run(&self) -> Result<(), PipelineError> {
        use futures::StreamExt;
        let mut stream = self.broker.consume(crate::messages::CHUNK_QUEUE).await?;

        while let Some(delivery) = stream.next().await {
            let job: ChunkJob = match decode_json(delivery.as_ref()) {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "malformed chunk job");
                    delivery.nack_drop().await?;
                    continue;
                }
            };

            match self.process(job).await {
                Ok(()) => delivery.ack().await?,
                Err(e) => {
                    error!(error = %e, "chunk job failed, requeuing");
                    delivery.nack_requeue().await?;
                }
            }
        }
        Ok(())
    }

    pub async fn process(&self, job: ChunkJob) -> Result<(), PipelineError> {
        let (book, chapter) = (job.book_uuid, job.chapter_uuid);

        self.notify(TrackerOperation::UpdateChapterStatus {
            book_uuid: book,
            chapter_uuid: chapter,
            status: ChapterStatus::InProgress,
        })
        .await?;

        let text_bytes =
            with_backoff(self.retry_max_attempts, || self.object_store.get(&object_keys::chapter_text(book, chapter)))
                .await?;
        let text = String::from_utf8_lossy(&text_bytes);
        let chunks = split_into_chunks(&text, MAX_CHUNK_BYTES);

        if chunks.is_empty() {
            warn!(%book, %chapter, "chapter produced zero chunks");
            self.notify(TrackerOperation::UpdateChapterStatus {
                book_uuid: book,
                chapter_uuid: chapter,
                status: ChapterStatus::Failed,
            })
            .await?;
            return Ok(());
        }

        for (i, chunk_text) in chunks.into_iter().enumerate() {
            let index = (i + 1) as u32;
            let key = object_keys::chunk_text(book, chapter, index);
            let bytes = chunk_text.into_bytes();
            with_backoff(self.retry_max_attempts, || self.object_store.put(&key, bytes.clone())).await?;

            self.notify(TrackerOperation::AddChunk { book_uuid: book, chapter_uuid: chapter, chunk_index: index })
                .await?;

            publish_json(
                self.broker.as_ref(),
                TTS_QUEUE,
                &SynthesizeJob { book_uuid: book, chapter_uuid: chapter, chunk_index: index },
            )
            .await?;
        }

        info!(%book, %chapter, "chapter chunked and enqueued for synthesis");
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
    use uuid::Uuid;

    #[tokio::test]
    async fn chapter_text_is_split_uploaded_and_enqueued_for_synthesis() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();

        let text = "This is a sentence. ".repeat(400);
        object_store
            .put(&object_keys::chapter_text(book, chapter), text.into_bytes())
            .await
            .unwrap();

        let chunker = Chunker::new(object_store.clone(), broker.clone(), 3);
        chunker.process(ChunkJob { book_uuid: book, chapter_uuid: chapter }).await.unwrap();

        let uploaded = object_store.list(&format!("{book}/chunks/{chapter}/")).await.unwrap();
        assert!(!uploaded.is_empty());
    }

    #[tokio::test]
    async fn empty_chapter_is_marked_failed_instead_of_enqueued() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();

        object_store
            .put(&object_keys::chapter_text(book, chapter), Vec::new())
            .await
            .unwrap();

        let chunker = Chunker::new(object_store.clone(), broker.clone(), 3);
        chunker.process(ChunkJob { book_uuid: book, chapter_uuid: chapter }).await.unwrap();

        let uploaded = object_store.list(&format!("{book}/chunks/{chapter}/")).await.unwrap();
        assert!(uploaded.is_empty());
    }
}
