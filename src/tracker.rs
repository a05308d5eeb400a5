//! The event tracker: the single writer of aggregate state. Every other
//! worker only ever sends it `TrackerOperation` messages; this module is
//! the only place that mutates `AggregateStore` state, which is what
//! replaces locking for completion detection (see concurrency notes).

use crate::aggregate_store::AggregateStore;
use crate::broker::{publish_json, MessageBroker};
use crate::error::{AggregateStoreError, PipelineError};
use crate::messages::{StitchJob, TrackerOperation, STITCH_QUEUE};
use crate::model::{agg_keys, BookId, BookStatus, ChapterId, ChapterStatus, ChunkStatus};
use std::sync::Arc;
use tracing::{info, warn};

pub struct EventTracker {
    store: Arc<dyn AggregateStore>,
    broker: Arc<dyn MessageBroker>,
}

impl EventTracker {
    pub fn new(store: Arc<dyn AggregateStore>, broker: Arc<dyn MessageBroker>) -> Self {
        Self { store, broker }
    }

    /// Consume the tracker queue. This loop is meant to run as a single
    /// instance: the tracker's sequential processing is what replaces
    /// locking for completion detection (see concurrency notes).
    pub async fn run(&self) -> Result<(), PipelineError> {
        use crate::broker::decode_json;
        use futures::StreamExt;

        let mut stream = self.broker.consume(crate::messages::TRACKER_QUEUE).await?;

        while let Some(delivery) = stream.next().await {
            let op: TrackerOperation = match decode_json(delivery.as_ref()) {
                Ok(op) => op,
                Err(e) => {
                    tracing::error!(error = %e, "malformed tracker operation");
                    delivery.nack_drop().await?;
                    continue;
                }
            };

            match self.apply(op).await {
                Ok(()) => delivery.ack().await?,
                Err(e) => {
                    tracing::error!(error = %e, "tracker operation failed, dropping to avoid a tight loop");
                    delivery.nack_drop().await?;
                }
            }
        }
        Ok(())
    }

    pub async fn apply(&self, op: TrackerOperation) -> Result<(), PipelineError> {
        match op {
            TrackerOperation::AddBook { book_uuid } => self.add_book(book_uuid).await,
            TrackerOperation::AddChapter { book_uuid, chapter_uuid, title } => {
                self.add_chapter(book_uuid, chapter_uuid, title).await
            }
            TrackerOperation::AddChunk { book_uuid: _, chapter_uuid, chunk_index } => {
                self.add_chunk(chapter_uuid, chunk_index).await
            }
            TrackerOperation::UpdateBookStatus { book_uuid, status } => {
                self.update_book_status(book_uuid, status).await
            }
            TrackerOperation::UpdateChapterStatus { book_uuid, chapter_uuid, status } => {
                self.update_chapter_status(book_uuid, chapter_uuid, status).await
            }
            TrackerOperation::UpdateChunkStatus { book_uuid: _, chapter_uuid, chunk_index, status } => {
                self.update_chunk_status(chapter_uuid, chunk_index, status).await
            }
            TrackerOperation::RemoveChunk { book_uuid, chapter_uuid, chunk_index } => {
                self.remove_chunk(book_uuid, chapter_uuid, chunk_index).await
            }
            TrackerOperation::RemoveChapter { book_uuid, chapter_uuid } => {
                self.remove_chapter(book_uuid, chapter_uuid).await
            }
        }
    }

    async fn add_book(&self, book: BookId) -> Result<(), PipelineError> {
        self.store.set(&agg_keys::book_status(book), &BookStatus::Uploaded.to_string()).await?;
        Ok(())
    }

    async fn add_chapter(&self, book: BookId, chapter: ChapterId, title: String) -> Result<(), PipelineError> {
        self.store.hset(&agg_keys::chapter_hash(chapter), "title", &title).await?;
        self.store
            .set(&agg_keys::chapter_status(chapter), &ChapterStatus::Uploaded.to_string())
            .await?;
        self.store.sadd(&agg_keys::book_chapters(book), &chapter.to_string()).await?;
        self.store.incr(&agg_keys::book_total_chapters(book)).await?;
        Ok(())
    }

    async fn add_chunk(&self, chapter: ChapterId, index: u32) -> Result<(), PipelineError> {
        self.store
            .set(&agg_keys::chunk_status(chapter, index), &ChunkStatus::Queued.to_string())
            .await?;
        self.store
            .sadd(&agg_keys::chapter_chunks(chapter), &agg_keys::chunk_member(index))
            .await?;
        Ok(())
    }

    async fn update_book_status(&self, book: BookId, status: BookStatus) -> Result<(), PipelineError> {
        if self.is_book_terminal(book).await? {
            warn!(%book, "ignoring status update on terminal book");
            return Ok(());
        }
        self.store.set(&agg_keys::book_status(book), &status.to_string()).await?;
        Ok(())
    }

    async fn update_chapter_status(
        &self,
        book: BookId,
        chapter: ChapterId,
        status: ChapterStatus,
    ) -> Result<(), PipelineError> {
        if self.is_chapter_terminal(chapter).await? {
            warn!(%chapter, "ignoring status update on terminal chapter");
            return Ok(());
        }
        self.store.set(&agg_keys::chapter_status(chapter), &status.to_string()).await?;

        if status.is_terminal() {
            self.finalize_chapter(book, chapter).await?;
        }
        Ok(())
    }

    async fn update_chunk_status(
        &self,
        chapter: ChapterId,
        index: u32,
        status: ChunkStatus,
    ) -> Result<(), PipelineError> {
        if self.is_chunk_terminal(chapter, index).await? {
            warn!(%chapter, index, "ignoring status update on terminal chunk");
            return Ok(());
        }
        self.store
            .set(&agg_keys::chunk_status(chapter, index), &status.to_string())
            .await?;
        Ok(())
    }

    async fn remove_chunk(&self, book: BookId, chapter: ChapterId, index: u32) -> Result<(), PipelineError> {
        if self.is_chunk_terminal(chapter, index).await? {
            return Ok(());
        }
        self.store
            .set(&agg_keys::chunk_status(chapter, index), &ChunkStatus::Completed.to_string())
            .await?;
        self.store
            .srem(&agg_keys::chapter_chunks(chapter), &agg_keys::chunk_member(index))
            .await?;

        let remaining = self.store.scard(&agg_keys::chapter_chunks(chapter)).await?;
        if remaining == 0 {
            info!(%chapter, "all chunks complete, enqueuing stitch job");
            publish_json(
                self.broker.as_ref(),
                STITCH_QUEUE,
                &StitchJob { book_uuid: book, chapter_uuid: chapter },
            )
            .await?;
        }
        Ok(())
    }

    async fn remove_chapter(&self, book: BookId, chapter: ChapterId) -> Result<(), PipelineError> {
        if self.is_chapter_terminal(chapter).await? {
            return Ok(());
        }
        self.store
            .set(&agg_keys::chapter_status(chapter), &ChapterStatus::Completed.to_string())
            .await?;
        self.finalize_chapter(book, chapter).await
    }

    /// Removes a chapter from its book's open set once the chapter has
    /// reached a terminal status (completed or failed), and marks the book
    /// completed once every chapter has. Shared by `remove_chapter` and by
    /// `update_chapter_status` for a chapter that fails without ever going
    /// through the chunk-removal path (e.g. zero surviving chunks).
    async fn finalize_chapter(&self, book: BookId, chapter: ChapterId) -> Result<(), PipelineError> {
        self.store.srem(&agg_keys::book_chapters(book), &chapter.to_string()).await?;
        self.bump_completed_chapters(book).await?;

        let remaining = self.store.scard(&agg_keys::book_chapters(book)).await?;
        if remaining == 0 {
            info!(%book, "all chapters complete, marking book completed");
            self.store.set(&agg_keys::book_status(book), &BookStatus::Completed.to_string()).await?;
        }
        Ok(())
    }

    /// Increments the completed-chapter counter and, if it now matches the
    /// total, marks the book completed. Idempotent: if the chapter whose
    /// completion triggered this was already terminal the caller never
    /// reaches here, so a chapter cannot double-count.
    async fn bump_completed_chapters(&self, book: BookId) -> Result<(), PipelineError> {
        let completed = self.store.incr(&agg_keys::book_completed_chapters(book)).await?;
        let total = self
            .store
            .get(&agg_keys::book_total_chapters(book))
            .await?
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        if total > 0 && completed >= total {
            self.store.set(&agg_keys::book_status(book), &BookStatus::Completed.to_string()).await?;
        }
        Ok(())
    }

    async fn is_book_terminal(&self, book: BookId) -> Result<bool, AggregateStoreError> {
        Ok(self
            .store
            .get(&agg_keys::book_status(book))
            .await?
            .and_then(|s| s.parse::<BookStatus>().ok())
            .is_some_and(BookStatus::is_terminal))
    }

    async fn is_chapter_terminal(&self, chapter: ChapterId) -> Result<bool, AggregateStoreError> {
        Ok(self
            .store
            .get(&agg_keys::chapter_status(chapter))
            .await?
            .and_then(|s| s.parse::<ChapterStatus>().ok())
            .is_some_and(ChapterStatus::is_terminal))
    }

    async fn is_chunk_terminal(&self, chapter: ChapterId, index: u32) -> Result<bool, AggregateStoreError> {
        Ok(self
            .store
            .get(&agg_keys::chunk_status(chapter, index))
            .await?
            .and_then(|s| s.parse::<ChunkStatus>().ok())
            .is_some_and(ChunkStatus::is_terminal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate_store::InMemoryAggregateStore;
    use crate::broker::InMemoryBroker;
    use futures::StreamExt;
    use uuid::Uuid;

    fn tracker() -> (EventTracker, Arc<InMemoryBroker>) {
        let store = Arc::new(InMemoryAggregateStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        (EventTracker::new(store, broker.clone()), broker)
    }

    #[tokio::test]
    async fn last_chunk_removed_enqueues_exactly_one_stitch_job() {
        let (tracker, broker) = tracker();
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();

        tracker.apply(TrackerOperation::AddBook { book_uuid: book }).await.unwrap();
        tracker
            .apply(TrackerOperation::AddChapter { book_uuid: book, chapter_uuid: chapter, title: "One".into() })
            .await
            .unwrap();
        for i in 1..=3u32 {
            tracker
                .apply(TrackerOperation::AddChunk { book_uuid: book, chapter_uuid: chapter, chunk_index: i })
                .await
                .unwrap();
        }

        let mut stream = broker.consume(crate::messages::STITCH_QUEUE).await.unwrap();

        for i in 1..=3u32 {
            tracker
                .apply(TrackerOperation::RemoveChunk { book_uuid: book, chapter_uuid: chapter, chunk_index: i })
                .await
                .unwrap();
        }

        let delivery = tokio::time::timeout(std::time::Duration::from_millis(200), stream.next())
            .await
            .expect("expected a stitch job")
            .unwrap();
        let job: StitchJob = crate::broker::decode_json(delivery.as_ref()).unwrap();
        assert_eq!(job.chapter_uuid, chapter);

        let no_second = tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await;
        assert!(no_second.is_err(), "expected exactly one stitch job");
    }

    #[tokio::test]
    async fn book_completes_only_after_every_chapter_completes() {
        let (tracker, _broker) = tracker();
        let book = Uuid::new_v4();
        let chapters: Vec<_> = (0..3).map(|_| Uuid::new_v4()).collect();

        tracker.apply(TrackerOperation::AddBook { book_uuid: book }).await.unwrap();
        for c in &chapters {
            tracker
                .apply(TrackerOperation::AddChapter { book_uuid: book, chapter_uuid: *c, title: "T".into() })
                .await
                .unwrap();
        }

        for c in &chapters[..2] {
            tracker
                .apply(TrackerOperation::RemoveChapter { book_uuid: book, chapter_uuid: *c })
                .await
                .unwrap();
        }

        let store_status = |tracker: &EventTracker| async {
            tracker.store.get(&agg_keys::book_status(book)).await.unwrap()
        };
        assert_ne!(store_status(&tracker).await, Some(BookStatus::Completed.to_string()));

        tracker
            .apply(TrackerOperation::RemoveChapter { book_uuid: book, chapter_uuid: chapters[2] })
            .await
            .unwrap();
        assert_eq!(store_status(&tracker).await, Some(BookStatus::Completed.to_string()));
    }

    #[tokio::test]
    async fn status_updates_on_a_terminal_chunk_are_ignored() {
        let (tracker, _broker) = tracker();
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();
        tracker
            .apply(TrackerOperation::AddChunk { book_uuid: book, chapter_uuid: chapter, chunk_index: 1 })
            .await
            .unwrap();
        tracker
            .apply(TrackerOperation::RemoveChunk { book_uuid: book, chapter_uuid: chapter, chunk_index: 1 })
            .await
            .unwrap();

        // replay: should not panic, re-remove, or double count
        tracker
            .apply(TrackerOperation::UpdateChunkStatus {
                book_uuid: book,
                chapter_uuid: chapter,
                chunk_index: 1,
                status: ChunkStatus::InProgress,
            })
            .await
            .unwrap();

        let status = tracker.store.get(&agg_keys::chunk_status(chapter, 1)).await.unwrap();
        assert_eq!(status, Some(ChunkStatus::Completed.to_string()));
    }
}
