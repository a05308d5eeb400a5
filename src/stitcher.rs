//! Stitcher worker: every audio fragment for one chapter in, one chapter
//! audio file out. Enqueued only by the event tracker when a chapter's
//! open-chunk set becomes empty, so at most one stitch job is ever issued
//! per chapter - but the worker stays idempotent on its output key in
//! case of requeue.

use crate::audio::AudioConcatenator;
use crate::broker::{decode_json, publish_json, MessageBroker};
use crate::error::{AudioError, PipelineError};
use crate::messages::{StitchJob, TrackerOperation, TRACKER_QUEUE};
use crate::model::object_keys;
use crate::object_store::ObjectStore;
use crate::retry::with_backoff;
use std::sync::Arc;
use tracing::{error, info};

pub struct Stitcher {
    object_store: Arc<dyn ObjectStore>,
    broker: Arc<dyn MessageBroker>,
    concatenator: Arc<dyn AudioConcatenator>,
    retry_max_attempts: u32,
}

impl Stitcher {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        broker: Arc<dyn MessageBroker>,
        concatenator: Arc<dyn AudioConcatenator>,
        retry_max_attempts: u32,
    ) -> Self {
        Self { object_store, broker, concatenator, retry_max_attempts }
    }

    pub async fn run(&self) -> Result<(), PipelineError> {
        use futures::StreamExt;
        let mut stream = self.broker.consume(crate::messages::STITCH_QUEUE).await?;

        while let Some(delivery) = stream.next().await {
            let job: StitchJob = match decode_json(delivery.as_ref()) {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "malformed stitch job");
                    delivery.nack_drop().await?;
                    continue;
                }
            };

            match self.process(job).await {
                Ok(()) => delivery.ack().await?,
                Err(e) => {
                    error!(error = %e, "stitch job failed, requeuing");
                    delivery.nack_requeue().await?;
                }
            }
        }
        Ok(())
    }

    pub async fn process(&self, job: StitchJob) -> Result<(), PipelineError> {
        let (book, chapter) = (job.book_uuid, job.chapter_uuid);

        let mut keys = with_backoff(self.retry_max_attempts, || {
            self.object_store.list(&object_keys::chunk_audio_prefix(book, chapter))
        })
        .await?;
        keys.sort_by_key(|k| object_keys::chunk_index_from_audio_key(k).unwrap_or(u32::MAX));

        if keys.is_empty() {
            return Err(AudioError::NoFragments.into());
        }

        let mut fragments = Vec::with_capacity(keys.len());
        for key in &keys {
            fragments.push(with_backoff(self.retry_max_attempts, || self.object_store.get(key)).await?);
        }

        let audio = self.concatenator.concatenate(fragments)?;
        let chapter_audio_key = object_keys::chapter_audio(book, chapter);
        with_backoff(self.retry_max_attempts, || self.object_store.put(&chapter_audio_key, audio.clone())).await?;

        publish_json(
            self.broker.as_ref(),
            TRACKER_QUEUE,
            &TrackerOperation::RemoveChapter { book_uuid: book, chapter_uuid: chapter },
        )
        .await?;

        info!(%book, %chapter, fragments = keys.len(), "chapter stitched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ByteConcatenator;
    use crate::broker::InMemoryBroker;
    use crate::object_store::InMemoryObjectStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn fragments_are_concatenated_in_ascending_index_order() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let concatenator = Arc::new(ByteConcatenator);
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();

        // Upload out of order to prove the stitcher re-sorts by index.
        for i in [3u32, 1, 2] {
            object_store
                .put(&object_keys::chunk_audio(book, chapter, i), format!("frag{i}").into_bytes())
                .await
                .unwrap();
        }

        let stitcher = Stitcher::new(object_store.clone(), broker, concatenator, 3);
        stitcher.process(StitchJob { book_uuid: book, chapter_uuid: chapter }).await.unwrap();

        let stitched = object_store.get(&object_keys::chapter_audio(book, chapter)).await.unwrap();
        assert_eq!(stitched, b"frag1frag2frag3");
    }

    #[tokio::test]
    async fn no_fragments_is_an_error() {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let concatenator = Arc::new(ByteConcatenator);
        let book = Uuid::new_v4();
        let chapter = Uuid::new_v4();

        let stitcher = Stitcher::new(object_store, broker, concatenator, 3);
        let result = stitcher.process(StitchJob { book_uuid: book, chapter_uuid: chapter }).await;
        assert!(result.is_err());
    }
}
