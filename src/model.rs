//! Entity identifiers, status enums, and the single source of truth for
//! object-store and aggregate-store key layouts.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type BookId = Uuid;
pub type ChapterId = Uuid;
pub type ChunkIndex = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Uploaded,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Uploaded,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl BookStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookStatus::Completed | BookStatus::Failed)
    }
}

impl ChapterStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChapterStatus::Completed | ChapterStatus::Failed)
    }
}

impl ChunkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }
}

macro_rules! status_str {
    ($ty:ty, $($variant:ident => $s:literal),+ $(,)?) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $(<$ty>::$variant => $s),+
                };
                f.write_str(s)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::error::ModelError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(<$ty>::$variant)),+,
                    other => Err(crate::error::ModelError::UnknownStatus(other.to_string())),
                }
            }
        }
    };
}

status_str!(BookStatus,
    Uploaded => "uploaded",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
);
status_str!(ChapterStatus,
    Uploaded => "uploaded",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
);
status_str!(ChunkStatus,
    Queued => "queued",
    InProgress => "in_progress",
    Completed => "completed",
    Failed => "failed",
);

/// Object-store key layout. The only place `format!` is used to build a key
/// that must match what another stage reads.
pub mod object_keys {
    use super::*;

    pub fn book_epub(book: BookId) -> String {
        format!("{book}/books/{book}.epub")
    }

    pub fn chapter_text(book: BookId, chapter: ChapterId) -> String {
        format!("{book}/chapters/{chapter}.txt")
    }

    pub fn chunk_text(book: BookId, chapter: ChapterId, index: ChunkIndex) -> String {
        format!("{book}/chunks/{chapter}/chunk_{index}.txt")
    }

    pub fn chunk_audio(book: BookId, chapter: ChapterId, index: ChunkIndex) -> String {
        format!("{book}/chunks/{chapter}/audio/chunk_{index}.mp3")
    }

    pub fn chunk_audio_prefix(book: BookId, chapter: ChapterId) -> String {
        format!("{book}/chunks/{chapter}/audio/")
    }

    pub fn chapter_audio(book: BookId, chapter: ChapterId) -> String {
        format!("{book}/audio/{chapter}.mp3")
    }

    /// Parse the `N` out of a `chunk_N.mp3` object key's final path segment.
    pub fn chunk_index_from_audio_key(key: &str) -> Option<ChunkIndex> {
        let name = key.rsplit('/').next()?;
        let stem = name.strip_prefix("chunk_")?.strip_suffix(".mp3")?;
        stem.parse().ok()
    }
}

/// Aggregate-store key layout (Redis-shaped: strings, sets, hashes, counters).
pub mod agg_keys {
    use super::*;

    pub fn book_status(book: BookId) -> String {
        format!("status:book:{book}")
    }

    pub fn chapter_status(chapter: ChapterId) -> String {
        format!("status:chapter:{chapter}")
    }

    pub fn chunk_status(chapter: ChapterId, index: ChunkIndex) -> String {
        format!("status:chunk:{chapter}:chunk_{index}")
    }

    pub fn book_chapters(book: BookId) -> String {
        format!("book:{book}:chapters")
    }

    pub fn book_total_chapters(book: BookId) -> String {
        format!("book:{book}:total_chapters")
    }

    pub fn book_completed_chapters(book: BookId) -> String {
        format!("book:{book}:completed_chapters")
    }

    pub fn chapter_chunks(chapter: ChapterId) -> String {
        format!("chapter:{chapter}:chunks")
    }

    pub fn chapter_hash(chapter: ChapterId) -> String {
        format!("chapter:{chapter}")
    }

    pub fn chunk_member(index: ChunkIndex) -> String {
        format!("chunk_{index}")
    }

    pub fn chunk_member_index(member: &str) -> Option<ChunkIndex> {
        member.strip_prefix("chunk_")?.parse().ok()
    }

    pub fn errors(entity: &str, id: impl fmt::Display) -> String {
        format!("errors:{entity}:{id}")
    }
}
