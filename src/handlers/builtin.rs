//! Built-in handlers, one per submission shape

use async_trait::async_trait;

use super::traits::{HandlerError, SubmissionHandler};
use super::types::{PlannedSubmission, Submission};
use crate::catalog::{ChapterKey, MangaDraft};
use crate::config::UploadLimits;
use crate::ingest::archive::{self, ArchiveError, DecodedChapter};
use crate::ingest::model::{SubmissionKind, ValidationReport};
use crate::ingest::naming::NamingPattern;
use crate::ingest::validator::{is_safe_folder, is_valid_slug};

fn wrong_kind(expected: SubmissionKind, submission: &Submission) -> HandlerError {
    HandlerError::WrongKind {
        expected,
        actual: submission.kind(),
    }
}

fn check_slug(slug: &str, report: &mut ValidationReport) {
    if !is_valid_slug(slug) {
        report.error(format!(
            "manga_slug '{slug}' must be lowercase letters, digits and single hyphens"
        ));
    }
}

fn non_empty(chapters: Vec<DecodedChapter>) -> Result<Vec<DecodedChapter>, HandlerError> {
    if chapters.is_empty() {
        return Err(ArchiveError::Empty.into());
    }
    Ok(chapters)
}

#[derive(Debug, Default, Clone)]
pub struct ChapterHandler;

#[async_trait]
impl SubmissionHandler for ChapterHandler {
    fn kind(&self) -> SubmissionKind {
        SubmissionKind::Chapter
    }

    fn validate(&self, submission: &Submission) -> Result<ValidationReport, HandlerError> {
        let Submission::Chapter(s) = submission else {
            return Err(wrong_kind(self.kind(), submission));
        };
        let mut report = ValidationReport::default();
        check_slug(&s.manga_slug, &mut report);
        if s.chapter_main < 1 || s.chapter_main > i64::from(u32::MAX) {
            report.error("chapter_main must be >= 1");
        }
        if s.chapter_sub < 0 || s.chapter_sub > i64::from(u32::MAX) {
            report.error("chapter_sub must be >= 0");
        }
        if !is_safe_folder(&s.folder_name) {
            report.error(format!("folder_name '{}' is not a safe path token", s.folder_name));
        }
        if s.pages.is_empty() {
            report.error("no pages attached");
        }
        if s.label.as_deref().is_none_or(|l| l.trim().is_empty()) {
            report.warn("no label");
        }
        Ok(report)
    }

    async fn plan(
        &self,
        submission: Submission,
        limits: &UploadLimits,
    ) -> Result<PlannedSubmission, HandlerError> {
        let Submission::Chapter(s) = submission else {
            return Err(wrong_kind(self.kind(), &submission));
        };
        let key = match (u32::try_from(s.chapter_main), u32::try_from(s.chapter_sub)) {
            (Ok(main), Ok(sub)) if main >= 1 => ChapterKey::new(main, sub),
            _ => return Err(HandlerError::Schema("chapter number out of range".to_string())),
        };

        let mut warnings = Vec::new();
        let pages = archive::decode_loose_pages(s.pages, &s.folder_name, limits, &mut warnings)?;
        if pages.is_empty() {
            return Err(ArchiveError::Empty.into());
        }

        Ok(PlannedSubmission {
            targets: vec![MangaDraft::new(&s.manga_slug, &s.manga_slug)],
            chapters: vec![DecodedChapter {
                manga_slug: s.manga_slug,
                key,
                label: s.label,
                folder_name: s.folder_name,
                pages,
            }],
            warnings,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct BulkHandler;

#[async_trait]
impl SubmissionHandler for BulkHandler {
    fn kind(&self) -> SubmissionKind {
        SubmissionKind::Bulk
    }

    fn validate(&self, submission: &Submission) -> Result<ValidationReport, HandlerError> {
        let Submission::Bulk(s) = submission else {
            return Err(wrong_kind(self.kind(), submission));
        };
        let mut report = ValidationReport::default();
        check_slug(&s.manga_slug, &mut report);
        if let Some(template) = &s.naming_pattern {
            if let Err(e) = NamingPattern::parse(template) {
                report.error(e);
            }
        }
        if let (Some(start), Some(end)) = (s.start_chapter, s.end_chapter) {
            if start > end {
                report.error(format!("start_chapter {start} is after end_chapter {end}"));
            }
        }
        Ok(report)
    }

    async fn plan(
        &self,
        submission: Submission,
        limits: &UploadLimits,
    ) -> Result<PlannedSubmission, HandlerError> {
        let Submission::Bulk(s) = submission else {
            return Err(wrong_kind(self.kind(), &submission));
        };
        let pattern = s
            .naming_pattern
            .as_deref()
            .map(NamingPattern::parse)
            .transpose()
            .map_err(HandlerError::Schema)?;

        let contents = archive::read_archive(s.archive, limits.clone()).await?;
        let mut warnings = contents.warnings.clone();
        let chapters = contents.map_inferred(
            &s.manga_slug,
            pattern.as_ref(),
            (s.start_chapter, s.end_chapter),
            &mut warnings,
        )?;

        Ok(PlannedSubmission {
            targets: vec![MangaDraft::new(&s.manga_slug, &s.manga_slug)],
            chapters: non_empty(chapters)?,
            warnings,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MetadataHandler;

#[async_trait]
impl SubmissionHandler for MetadataHandler {
    fn kind(&self) -> SubmissionKind {
        SubmissionKind::Metadata
    }

    fn validate(&self, submission: &Submission) -> Result<ValidationReport, HandlerError> {
        match submission {
            Submission::Metadata(s) => Ok(s.document.validate()),
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    async fn plan(
        &self,
        submission: Submission,
        limits: &UploadLimits,
    ) -> Result<PlannedSubmission, HandlerError> {
        let Submission::Metadata(s) = submission else {
            return Err(wrong_kind(self.kind(), &submission));
        };
        let contents = archive::read_archive(s.archive, limits.clone()).await?;
        let requests = s.document.folder_requests().map_err(HandlerError::Schema)?;
        let chapters = contents.map_explicit(&requests)?;

        Ok(PlannedSubmission {
            targets: vec![s.document.draft()],
            chapters,
            warnings: contents.warnings,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct MultiTitleHandler;

#[async_trait]
impl SubmissionHandler for MultiTitleHandler {
    fn kind(&self) -> SubmissionKind {
        SubmissionKind::Multi
    }

    fn validate(&self, submission: &Submission) -> Result<ValidationReport, HandlerError> {
        match submission {
            Submission::Multi(s) => Ok(s.document.validate()),
            other => Err(wrong_kind(self.kind(), other)),
        }
    }

    async fn plan(
        &self,
        submission: Submission,
        limits: &UploadLimits,
    ) -> Result<PlannedSubmission, HandlerError> {
        let Submission::Multi(s) = submission else {
            return Err(wrong_kind(self.kind(), &submission));
        };
        let contents = archive::read_archive(s.archive, limits.clone()).await?;
        let mut requests = Vec::new();
        for title in &s.document.titles {
            requests.extend(title.folder_requests().map_err(HandlerError::Schema)?);
        }
        let chapters = contents.map_explicit(&requests)?;

        Ok(PlannedSubmission {
            targets: s.document.titles.iter().map(|t| t.draft()).collect(),
            chapters,
            warnings: contents.warnings,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct SmartHandler;

#[async_trait]
impl SubmissionHandler for SmartHandler {
    fn kind(&self) -> SubmissionKind {
        SubmissionKind::Smart
    }

    fn validate(&self, submission: &Submission) -> Result<ValidationReport, HandlerError> {
        let Submission::Smart(s) = submission else {
            return Err(wrong_kind(self.kind(), submission));
        };
        let mut report = ValidationReport::default();
        if s.archive.is_empty() {
            report.error("archive is empty");
        }
        Ok(report)
    }

    async fn plan(
        &self,
        submission: Submission,
        limits: &UploadLimits,
    ) -> Result<PlannedSubmission, HandlerError> {
        let Submission::Smart(s) = submission else {
            return Err(wrong_kind(self.kind(), &submission));
        };
        let contents = archive::read_archive(s.archive, limits.clone()).await?;

        let mut manga = contents.infer_manga()?;
        manga.type_hint = manga.type_hint.or(s.type_hint);
        manga.status = manga.status.or(s.default_status);

        let mut warnings = contents.warnings.clone();
        let chapters = contents.map_inferred(&manga.slug, None, (None, None), &mut warnings)?;

        Ok(PlannedSubmission {
            targets: vec![manga],
            chapters: non_empty(chapters)?,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::types::{BulkSubmission, ChapterSubmission, SmartSubmission};
    use crate::ingest::model::ChapterPolicy;
    use bytes::Bytes;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[&str]) -> Bytes {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for name in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(name.as_bytes()).unwrap();
        }
        Bytes::from(writer.finish().unwrap().into_inner())
    }

    fn chapter(main: i64, pages: usize) -> Submission {
        Submission::Chapter(ChapterSubmission {
            manga_slug: "berserk".to_string(),
            chapter_main: main,
            chapter_sub: 0,
            label: Some("Black Swordsman".to_string()),
            folder_name: "ch1".to_string(),
            chapter_policy: ChapterPolicy::Error,
            pages: (1..=pages)
                .map(|i| (format!("{i}.jpg"), Bytes::from(vec![i as u8])))
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_chapter_handler() {
        let handler = ChapterHandler;
        assert!(handler.validate(&chapter(1, 2)).unwrap().is_ok());
        assert_eq!(handler.validate(&chapter(0, 0)).unwrap().errors.len(), 2);

        let planned = handler.plan(chapter(1, 3), &UploadLimits::default()).await.unwrap();
        assert_eq!(planned.chapters.len(), 1);
        assert_eq!(planned.chapters[0].pages.len(), 3);
        assert_eq!(planned.targets[0].slug, "berserk");
    }

    #[tokio::test]
    async fn test_handler_rejects_other_kind() {
        let result = BulkHandler.validate(&chapter(1, 1));
        assert!(matches!(result, Err(HandlerError::WrongKind { .. })));
    }

    #[tokio::test]
    async fn test_bulk_handler_validates_pattern_and_range() {
        let submission = Submission::Bulk(BulkSubmission {
            manga_slug: "berserk".to_string(),
            archive: build_zip(&["Chapter 1/1.jpg"]),
            start_chapter: Some(5),
            end_chapter: Some(2),
            naming_pattern: Some("Chapter".to_string()),
            chapter_policy: ChapterPolicy::Skip,
        });
        assert_eq!(BulkHandler.validate(&submission).unwrap().errors.len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_handler_plans_range() {
        let submission = Submission::Bulk(BulkSubmission {
            manga_slug: "berserk".to_string(),
            archive: build_zip(&["Chapter 1/1.jpg", "Chapter 2/1.jpg", "Chapter 3/1.jpg"]),
            start_chapter: Some(2),
            end_chapter: None,
            naming_pattern: Some("Chapter {main}".to_string()),
            chapter_policy: ChapterPolicy::Skip,
        });
        let planned = BulkHandler
            .plan(submission, &UploadLimits::default())
            .await
            .unwrap();
        let mains: Vec<u32> = planned.chapters.iter().map(|c| c.key.main).collect();
        assert_eq!(mains, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_smart_handler_infers_identity() {
        let submission = Submission::Smart(SmartSubmission {
            archive: build_zip(&["Vinland Saga/Ch 1/1.png", "Vinland Saga/Ch 2/1.png"]),
            type_hint: Some("manga".to_string()),
            default_status: Some("ongoing".to_string()),
            chapter_policy: ChapterPolicy::Skip,
        });
        let planned = SmartHandler
            .plan(submission, &UploadLimits::default())
            .await
            .unwrap();
        assert_eq!(planned.targets[0].slug, "vinland-saga");
        assert_eq!(planned.targets[0].status.as_deref(), Some("ongoing"));
        assert_eq!(planned.chapters.len(), 2);
    }
}
