//! Manga and chapter catalog
//!
//! The catalog owns committed chapter records. Upload jobs only hold the chapter
//! id once a unit is committed. Access goes through the [`Catalog`] trait so the
//! coordinator can be exercised against doubles (unreachable, write-counting).
//!
//! Key layout of the Fjall implementation:
//! - `manga`: manga:{slug} -> MangaRecord (JSON)
//! - `chapters`: chapter:{manga_id}:{main:010}:{sub:010} -> ChapterRecord (JSON)

pub mod error;
pub mod store;

pub use error::{CatalogError, Result};
pub use store::FjallCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(chapter_main, chapter_sub)`; `sub = 0` means no sub-index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChapterKey {
    pub main: u32,
    pub sub: u32,
}

impl ChapterKey {
    pub fn new(main: u32, sub: u32) -> Self {
        Self { main, sub }
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub == 0 {
            write!(f, "{}", self.main)
        } else {
            write!(f, "{}.{}", self.main, self.sub)
        }
    }
}

/// Manga attributes supplied by a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaDraft {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl MangaDraft {
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            description: None,
            type_hint: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaRecord {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub type_hint: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One page of a committed chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPage {
    pub ordinal: u32,
    /// Blob key inside the chapter's storage target
    pub key: String,
    pub byte_size: u64,
    pub content_checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: String,
    pub manga_id: String,
    pub manga_slug: String,
    pub chapter_main: u32,
    pub chapter_sub: u32,
    #[serde(default)]
    pub label: Option<String>,
    pub folder_name: String,
    pub pages: Vec<StoredPage>,
    pub storage_target: String,
    /// Job that last wrote this chapter
    pub source_job: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChapterRecord {
    pub fn key(&self) -> ChapterKey {
        ChapterKey::new(self.chapter_main, self.chapter_sub)
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find_manga(&self, slug: &str) -> Result<Option<MangaRecord>>;

    /// Return the manga for `draft.slug`, creating it from the draft if absent
    async fn ensure_manga(&self, draft: &MangaDraft) -> Result<MangaRecord>;

    async fn find_chapter(&self, manga_id: &str, key: ChapterKey) -> Result<Option<ChapterRecord>>;

    /// Insert or replace the chapter with the same manga and key
    async fn put_chapter(&self, record: ChapterRecord) -> Result<()>;
}
