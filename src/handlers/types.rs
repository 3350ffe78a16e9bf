use bytes::Bytes;

use crate::catalog::MangaDraft;
use crate::ingest::archive::DecodedChapter;
use crate::ingest::model::{ChapterPolicy, ConflictPolicy, MangaPolicy, SubmissionKind};
use crate::ingest::validator::{MetadataDocument, MultiTitleDocument};

/// One chapter with individually attached pages
#[derive(Debug, Clone)]
pub struct ChapterSubmission {
    pub manga_slug: String,
    pub chapter_main: i64,
    pub chapter_sub: i64,
    pub label: Option<String>,
    pub folder_name: String,
    pub chapter_policy: ChapterPolicy,
    /// `(file name, bytes)` in upload order
    pub pages: Vec<(String, Bytes)>,
}

/// Archive of many chapters for one manga
#[derive(Debug, Clone)]
pub struct BulkSubmission {
    pub manga_slug: String,
    pub archive: Bytes,
    pub start_chapter: Option<u32>,
    pub end_chapter: Option<u32>,
    pub naming_pattern: Option<String>,
    pub chapter_policy: ChapterPolicy,
}

/// Archive described by a metadata document
#[derive(Debug, Clone)]
pub struct MetadataSubmission {
    pub document: MetadataDocument,
    pub archive: Bytes,
    pub manga_policy: MangaPolicy,
    pub chapter_policy: ChapterPolicy,
}

/// Archive holding several titles, one document per title
#[derive(Debug, Clone)]
pub struct MultiSubmission {
    pub document: MultiTitleDocument,
    pub archive: Bytes,
    pub manga_policy: MangaPolicy,
    pub chapter_policy: ChapterPolicy,
}

/// Archive whose manga and chapters are inferred from its layout
#[derive(Debug, Clone)]
pub struct SmartSubmission {
    pub archive: Bytes,
    pub type_hint: Option<String>,
    pub default_status: Option<String>,
    pub chapter_policy: ChapterPolicy,
}

#[derive(Debug, Clone)]
pub enum Submission {
    Chapter(ChapterSubmission),
    Bulk(BulkSubmission),
    Metadata(MetadataSubmission),
    Multi(MultiSubmission),
    Smart(SmartSubmission),
}

impl Submission {
    pub fn kind(&self) -> SubmissionKind {
        match self {
            Submission::Chapter(_) => SubmissionKind::Chapter,
            Submission::Bulk(_) => SubmissionKind::Bulk,
            Submission::Metadata(_) => SubmissionKind::Metadata,
            Submission::Multi(_) => SubmissionKind::Multi,
            Submission::Smart(_) => SubmissionKind::Smart,
        }
    }

    /// Conflict policy the submission runs under. Shapes without a manga-level
    /// strategy attach to an existing manga.
    pub fn policy(&self) -> ConflictPolicy {
        match self {
            Submission::Chapter(s) => ConflictPolicy::attach(s.chapter_policy),
            Submission::Bulk(s) => ConflictPolicy::attach(s.chapter_policy),
            Submission::Smart(s) => ConflictPolicy::attach(s.chapter_policy),
            Submission::Metadata(s) => ConflictPolicy::new(Some(s.manga_policy), s.chapter_policy),
            Submission::Multi(s) => ConflictPolicy::new(Some(s.manga_policy), s.chapter_policy),
        }
    }

    /// Bytes of uploaded content, for the archive size limit
    pub fn payload_bytes(&self) -> u64 {
        match self {
            Submission::Chapter(s) => s.pages.iter().map(|(_, data)| data.len() as u64).sum(),
            Submission::Bulk(s) => s.archive.len() as u64,
            Submission::Metadata(s) => s.archive.len() as u64,
            Submission::Multi(s) => s.archive.len() as u64,
            Submission::Smart(s) => s.archive.len() as u64,
        }
    }
}

/// Result of decoding a submission: the manga it writes to and its chapters
#[derive(Debug, Clone, Default)]
pub struct PlannedSubmission {
    pub targets: Vec<MangaDraft>,
    pub chapters: Vec<DecodedChapter>,
    pub warnings: Vec<String>,
}
