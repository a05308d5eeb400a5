//! Splitter worker: EPUB in, per-chapter text out. Reads one book from the
//! object store, extracts and filters chapters, and fans out one chunker
//! job plus one `AddChapter` tracker notification per surviving chapter.

use crate::broker::{decode_json, publish_json, MessageBroker};
use crate::epub_text::extract_chapters;
use crate::error::PipelineError;
use crate::messages::{ChunkJob, SplitJob, TrackerOperation, CHUNK_QUEUE, TRACKER_QUEUE};
use crate::model::{object_keys, BookId, BookStatus};
use crate::object_store::ObjectStore;
use crate::retry::with_backoff;
use crate::text::is_metadata;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct Splitter {
    object_store: Arc<dyn ObjectStore>,
    broker: Arc<dyn MessageBroker>,
    retry_max_attempts: u32,
}

impl Splitter {
    pub fn new(object_store: Arc<dyn ObjectStore>, broker: Arc<dyn MessageBroker>, retry_max_attempts: u32) -> Self {
        Self { object_store, broker, retry_max_attempts }
    }

    pub async fn run(&self) -> Result<(), PipelineError> {
        use futures::StreamExt;
        let mut stream = self.broker.consume(crate::messages::SPLIT_QUEUE).await?;

        while let Some(delivery) = stream.next().await {
            let job: SplitJob = match decode_json(delivery.as_ref()) {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "malformed split job");
                    delivery.nack_drop().await?;
                    continue;
                }
            };

            match self.process(job).await {
                Ok(()) => delivery.ack().await?,
                Err(e) => {
                    error!(error = %e, "split job failed, requeuing");
                    delivery.nack_requeue().await?;
                }
            }
        }
        Ok(())
    }

    pub async fn process(&self, job: SplitJob) -> Result<(), PipelineError> {
        let book = job.book_uuid;

        self.notify(TrackerOperation::UpdateBookStatus { book_uuid: book, status: BookStatus::InProgress })
            .await?;

        let epub_bytes =
            with_backoff(self.retry_max_attempts, || self.object_store.get(&object_keys::book_epub(book))).await?;
        let candidates = extract_chapters(&epub_bytes)?;

        let mut survived = 0usize;
        for candidate in candidates {
            if is_metadata(&candidate.title, &candidate.text) {
                continue;
            }

            let chapter: BookId = Uuid::new_v4();
            let key = object_keys::chapter_text(book, chapter);
            let bytes = candidate.text.into_bytes();
            with_backoff(self.retry_max_attempts, || self.object_store.put(&key, bytes.clone())).await?;

            self.notify(TrackerOperation::AddChapter {
                book_uuid: book,
                chapter_uuid: chapter,
                title: candidate.title.clone(),
            })
            .await?;

            publish_json(self.broker.as_ref(), CHUNK_QUEUE, &ChunkJob { book_uuid: book, chapter_uuid: chapter })
                .await?;

            survived += 1;
            info!(%book, %chapter, title = %candidate.title, "chapter split and enqueued");
        }

        if survived == 0 {
            warn!(%book, "no chapters survived metadata filtering");
            self.notify(TrackerOperation::UpdateBookStatus { book_uuid: book, status: BookStatus::Failed })
                .await?;
            // Permanent content failure, not a transient one: acknowledge
            // the job instead of requeuing it forever.
            return Ok(());
        }

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

    fn minimal_epub() -> Vec<u8> {
        // A minimal but structurally valid EPUB would require a full OCF
        // container; chapter-extraction logic itself is covered directly
        // in `epub_text` and `text` unit tests. Here we only assert that
        // an invalid EPUB surfaces as an `EpubError` rather than a panic.
        b"not an epub".to_vec()
    }

    #[tokio::test]
    async fn malformed_epub_surfaces_as_epub_error_not_a_panic() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let book = Uuid::new_v4();
        object_store
            .put(&object_keys::book_epub(book), minimal_epub())
            .await
            .unwrap();

        let splitter = Splitter::new(object_store, broker, 3);
        let result = splitter.process(SplitJob { book_uuid: book }).await;
        assert!(result.is_err());
    }
}
