//! Multipart submission forms
//!
//! Each upload route reads its form into an [`UploadForm`] and turns it into a
//! [`Submission`] plus the shared [`ExecutionOptions`]. Missing or malformed
//! fields are `SCHEMA_ERROR`s.

use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use bytes::Bytes;
use tracing::debug;

use super::error::ApiError;
use super::utils::{parse_chapter_policy, parse_flag, parse_manga_policy};
use crate::handlers::{
    BulkSubmission, ChapterSubmission, MetadataSubmission, MultiSubmission, SmartSubmission, Submission,
};
use crate::ingest::validator::{parse_metadata, parse_multi};
use crate::ingest::{ExecutionOptions, SubmissionKind};

#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Bytes>,
    /// `pages` / `pages[]` parts in upload order
    pages: Vec<(String, Bytes)>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await?;

            match (name.as_str(), file_name) {
                ("pages" | "pages[]", Some(file_name)) => form.pages.push((file_name, data)),
                ("pages" | "pages[]", None) => {
                    return Err(ApiError::InvalidPayload("page parts need a file name".into()));
                }
                (_, Some(_)) => {
                    form.files.insert(name, data);
                }
                (_, None) => {
                    let text = String::from_utf8(data.to_vec())
                        .map_err(|_| ApiError::InvalidPayload(format!("{name}: not valid UTF-8")))?;
                    form.fields.insert(name, text);
                }
            }
        }

        debug!(
            fields = form.fields.len(),
            files = form.files.len(),
            pages = form.pages.len(),
            "Read multipart form"
        );
        Ok(form)
    }

    /// Trimmed, non-empty text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn require(&self, name: &str) -> Result<&str, ApiError> {
        self.text(name)
            .ok_or_else(|| ApiError::InvalidPayload(format!("{name} is required")))
    }

    pub fn flag(&self, name: &str) -> Result<bool, ApiError> {
        match self.text(name) {
            Some(value) => parse_flag(name, value),
            None => Ok(false),
        }
    }

    pub fn number<T: FromStr>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.text(name)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ApiError::InvalidPayload(format!("{name}: '{value}' is not a number")))
            })
            .transpose()
    }

    /// A field that may be sent either as a file part or as text
    pub fn content(&self, name: &str) -> Option<Bytes> {
        self.files
            .get(name)
            .cloned()
            .or_else(|| self.fields.get(name).map(|text| Bytes::from(text.clone())))
    }

    pub fn archive(&self) -> Result<Bytes, ApiError> {
        self.files
            .get("archive")
            .cloned()
            .ok_or_else(|| ApiError::InvalidPayload("archive is required".into()))
    }

    pub fn options(&self, job_id: Option<String>) -> Result<ExecutionOptions, ApiError> {
        Ok(ExecutionOptions::builder()
            .dry_run(self.flag("dry_run")?)
            .parallel(self.flag("parallel")?)
            .continue_on_error(self.flag("continue_on_error")?)
            .preserve_filenames(self.flag("preserve_filenames")?)
            .maybe_job_id(job_id)
            .maybe_storage_target(self.text("storage_target").map(str::to_string))
            .build())
    }

    /// Build the submission for `kind` from this form
    pub fn submission(self, kind: SubmissionKind) -> Result<Submission, ApiError> {
        let submission = match kind {
            SubmissionKind::Chapter => {
                let chapter_main: i64 = self
                    .number("chapter_main")?
                    .ok_or_else(|| ApiError::InvalidPayload("chapter_main is required".into()))?;
                let chapter_sub: i64 = self.number("chapter_sub")?.unwrap_or(0);
                let folder_name = match self.text("folder_name") {
                    Some(name) => name.to_string(),
                    None if chapter_sub > 0 => format!("chapter-{chapter_main}.{chapter_sub}"),
                    None => format!("chapter-{chapter_main}"),
                };
                Submission::Chapter(ChapterSubmission {
                    manga_slug: self.require("manga_slug")?.to_string(),
                    chapter_main,
                    chapter_sub,
                    label: self.text("label").map(str::to_string),
                    folder_name,
                    chapter_policy: parse_chapter_policy(self.text("conflict_strategy"))?,
                    pages: self.pages,
                })
            }
            SubmissionKind::Bulk => Submission::Bulk(BulkSubmission {
                manga_slug: self.require("manga_slug")?.to_string(),
                archive: self.archive()?,
                start_chapter: self.number("start_chapter")?,
                end_chapter: self.number("end_chapter")?,
                naming_pattern: self.text("naming_pattern").map(str::to_string),
                chapter_policy: parse_chapter_policy(self.text("conflict_strategy"))?,
            }),
            SubmissionKind::Metadata => {
                let raw = self
                    .content("metadata")
                    .ok_or_else(|| ApiError::InvalidPayload("metadata is required".into()))?;
                Submission::Metadata(MetadataSubmission {
                    document: parse_metadata(&raw)?,
                    archive: self.archive()?,
                    manga_policy: parse_manga_policy(self.text("manga_conflict"))?,
                    chapter_policy: parse_chapter_policy(self.text("chapter_conflict"))?,
                })
            }
            SubmissionKind::Multi => {
                let raw = self
                    .content("config")
                    .ok_or_else(|| ApiError::InvalidPayload("config is required".into()))?;
                Submission::Multi(MultiSubmission {
                    document: parse_multi(&raw)?,
                    archive: self.archive()?,
                    manga_policy: parse_manga_policy(self.text("manga_conflict"))?,
                    chapter_policy: parse_chapter_policy(self.text("chapter_conflict"))?,
                })
            }
            SubmissionKind::Smart => Submission::Smart(SmartSubmission {
                archive: self.archive()?,
                type_hint: self.text("type_hint").map(str::to_string),
                default_status: self.text("default_status").map(str::to_string),
                chapter_policy: parse_chapter_policy(self.text("conflict_strategy"))?,
            }),
        };
        Ok(submission)
    }
}
