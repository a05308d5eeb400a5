//! Wire payloads for each queue. Job payloads are plain structs; tracker
//! payloads are a single sealed enum (`TrackerOperation`) so a handler can
//! never be routed a payload tagged for a different operation - there is no
//! string to mislabel.

use crate::model::{BookId, ChapterId, ChunkIndex};
use serde::{Deserialize, Serialize};

pub const SPLIT_QUEUE: &str = "splitter_queue";
pub const CHUNK_QUEUE: &str = "chunker_queue";
pub const TTS_QUEUE: &str = "tts_queue";
pub const STITCH_QUEUE: &str = "stitch_queue";
pub const TRACKER_QUEUE: &str = "event_tracker_queue";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitJob {
    pub book_uuid: BookId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkJob {
    pub book_uuid: BookId,
    pub chapter_uuid: ChapterId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizeJob {
    pub book_uuid: BookId,
    pub chapter_uuid: ChapterId,
    pub chunk_index: ChunkIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchJob {
    pub book_uuid: BookId,
    pub chapter_uuid: ChapterId,
}

/// Every mutation the event tracker is willing to apply to aggregate state.
/// One variant per row of the operation table; exhaustively matched by the
/// tracker, never dispatched through a string tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation")]
pub enum TrackerOperation {
    AddBook {
        book_uuid: BookId,
    },
    AddChapter {
        book_uuid: BookId,
        chapter_uuid: ChapterId,
        title: String,
    },
    AddChunk {
        book_uuid: BookId,
        chapter_uuid: ChapterId,
        chunk_index: ChunkIndex,
    },
    UpdateBookStatus {
        book_uuid: BookId,
        status: crate::model::BookStatus,
    },
    UpdateChapterStatus {
        book_uuid: BookId,
        chapter_uuid: ChapterId,
        status: crate::model::ChapterStatus,
    },
    UpdateChunkStatus {
        book_uuid: BookId,
        chapter_uuid: ChapterId,
        chunk_index: ChunkIndex,
        status: crate::model::ChunkStatus,
    },
    RemoveChunk {
        book_uuid: BookId,
        chapter_uuid: ChapterId,
        chunk_index: ChunkIndex,
    },
    RemoveChapter {
        book_uuid: BookId,
        chapter_uuid: ChapterId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_operation_round_trips_through_json() {
        let op = TrackerOperation::AddChunk {
            book_uuid: BookId::nil(),
            chapter_uuid: ChapterId::nil(),
            chunk_index: 3,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"operation\":\"AddChunk\""));
        let back: TrackerOperation = serde_json::from_str(&json).unwrap();
        matches!(back, TrackerOperation::AddChunk { chunk_index: 3, .. });
    }
}
