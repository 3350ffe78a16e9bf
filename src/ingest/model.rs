//! Upload job data model
//!
//! Everything here is serialized into the job ledger or returned to callers, so
//! the shapes double as the API response bodies.

use crate::catalog::{ChapterKey, MangaDraft};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Submission shape that created a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Chapter,
    Bulk,
    Metadata,
    Multi,
    Smart,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Chapter => "chapter",
            SubmissionKind::Bulk => "bulk",
            SubmissionKind::Metadata => "metadata",
            SubmissionKind::Multi => "multi",
            SubmissionKind::Smart => "smart",
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Validating,
    Planning,
    Executing,
    Completed,
    Failed,
    Interrupted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Forward-only lifecycle plus the `Interrupted -> Executing` resume edge
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Validating)
                | (Pending, Failed)
                | (Validating, Planning)
                | (Validating, Failed)
                | (Planning, Executing)
                | (Planning, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
                | (Executing, Interrupted)
                | (Interrupted, Executing)
                | (Interrupted, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Validating => "validating",
            JobStatus::Planning => "planning",
            JobStatus::Executing => "executing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFile {
    pub ordinal: u32,
    pub file_name: String,
    pub byte_size: u64,
    /// SHA-256 hex
    pub content_checksum: String,
}

/// One chapter to create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterUnit {
    pub manga_slug: String,
    pub chapter_main: u32,
    pub chapter_sub: u32,
    #[serde(default)]
    pub label: Option<String>,
    pub folder_name: String,
    pub pages: Vec<PageFile>,
}

impl ChapterUnit {
    pub fn key(&self) -> ChapterKey {
        ChapterKey::new(self.chapter_main, self.chapter_sub)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitAction {
    Create,
    Replace,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Skipped,
    Created,
    Replaced,
    Errored,
}

impl UnitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UnitState::Pending)
    }

    /// State a unit reaches once its action is carried out
    pub fn committed(action: UnitAction) -> Self {
        match action {
            UnitAction::Create => UnitState::Created,
            UnitAction::Replace => UnitState::Replaced,
            UnitAction::Skip => UnitState::Skipped,
        }
    }
}

/// Unit as planned for a job, with its execution state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUnit {
    pub index: u32,
    #[serde(flatten)]
    pub unit: ChapterUnit,
    pub action: UnitAction,
    pub state: UnitState,
    #[serde(default)]
    pub chapter_id: Option<String>,
}

/// Manga-level conflict disposition; overwriting a whole title is not offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MangaPolicy {
    Skip,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterPolicy {
    Skip,
    Overwrite,
    Error,
}

impl MangaPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MangaPolicy::Skip => "skip",
            MangaPolicy::Error => "error",
        }
    }
}

impl ChapterPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterPolicy::Skip => "skip",
            ChapterPolicy::Overwrite => "overwrite",
            ChapterPolicy::Error => "error",
        }
    }
}

impl FromStr for MangaPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(MangaPolicy::Skip),
            "error" => Ok(MangaPolicy::Error),
            "overwrite" => Err("manga conflict policy cannot be 'overwrite'".to_string()),
            other => Err(format!("unknown manga conflict policy '{other}'")),
        }
    }
}

impl FromStr for ChapterPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ChapterPolicy::Skip),
            "overwrite" => Ok(ChapterPolicy::Overwrite),
            "error" => Ok(ChapterPolicy::Error),
            other => Err(format!("unknown chapter conflict policy '{other}'")),
        }
    }
}

/// `manga = None` attaches to an existing manga or creates it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    pub manga: Option<MangaPolicy>,
    pub chapter: ChapterPolicy,
}

impl ConflictPolicy {
    pub fn new(manga: Option<MangaPolicy>, chapter: ChapterPolicy) -> Self {
        Self { manga, chapter }
    }

    pub fn attach(chapter: ChapterPolicy) -> Self {
        Self::new(None, chapter)
    }
}

/// An existing catalog entity the submission collides with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub manga_slug: String,
    /// `None` for a manga-level conflict
    #[serde(default)]
    pub chapter: Option<ChapterKey>,
    /// Policy that applies: skip, overwrite, error or attach
    pub policy: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub conflicts: Vec<Conflict>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.conflicts.extend(other.conflicts);
    }
}

/// Unit-scoped failure recorded on a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    pub unit_index: u32,
    pub manga_slug: String,
    pub chapter: ChapterKey,
    pub message: String,
    /// Whether a resume can retry the unit
    pub retryable: bool,
    pub at: DateTime<Utc>,
}

/// One ingestion attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: String,
    pub kind: SubmissionKind,
    pub status: JobStatus,
    pub dry_run: bool,
    pub parallel: bool,
    pub continue_on_error: bool,
    pub preserve_filenames: bool,
    pub storage_target: String,
    pub targets: Vec<MangaDraft>,
    pub units: Vec<PlannedUnit>,
    pub total_units: u32,
    pub processed_units: u32,
    pub current_unit: Option<u32>,
    /// Lowest unit index below which every unit is terminal
    pub checkpoint: u32,
    pub resume_token: Option<String>,
    pub errors: Vec<UnitError>,
    pub report: ValidationReport,
    #[serde(default)]
    pub interrupt_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn new(id: String, kind: SubmissionKind, options: &ExecutionOptions, storage_target: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            dry_run: options.dry_run,
            parallel: options.parallel,
            continue_on_error: options.continue_on_error,
            preserve_filenames: options.preserve_filenames,
            storage_target,
            targets: Vec::new(),
            units: Vec::new(),
            total_units: 0,
            processed_units: 0,
            current_unit: None,
            checkpoint: 0,
            resume_token: None,
            errors: Vec::new(),
            report: ValidationReport::default(),
            interrupt_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`; returns false and leaves the job untouched on an illegal edge
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    pub fn set_units(&mut self, units: Vec<PlannedUnit>) {
        self.total_units = units.len() as u32;
        self.units = units;
        self.refresh_counters();
    }

    /// Recompute the watermark and processed count from unit states.
    /// Neither value ever moves backwards.
    pub fn refresh_counters(&mut self) {
        let watermark = self
            .units
            .iter()
            .position(|u| !u.state.is_terminal())
            .unwrap_or(self.units.len()) as u32;
        let processed = self.units.iter().filter(|u| u.state.is_terminal()).count() as u32;

        self.checkpoint = self.checkpoint.max(watermark);
        self.processed_units = self.processed_units.max(processed);
        self.updated_at = Utc::now();
    }

    pub fn all_terminal(&self) -> bool {
        self.units.iter().all(|u| u.state.is_terminal())
    }

    pub fn total_files(&self) -> u32 {
        self.units.iter().map(|u| u.unit.pages.len() as u32).sum()
    }

    pub fn processed_files(&self) -> u32 {
        self.units
            .iter()
            .filter(|u| u.state.is_terminal())
            .map(|u| u.unit.pages.len() as u32)
            .sum()
    }
}

/// Per-unit entry of an [`UploadResponse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub index: u32,
    pub manga_slug: String,
    pub chapter_main: u32,
    pub chapter_sub: u32,
    #[serde(default)]
    pub label: Option<String>,
    pub folder_name: String,
    pub page_count: u32,
    pub action: UnitAction,
    pub state: UnitState,
    #[serde(default)]
    pub chapter_id: Option<String>,
}

impl From<&PlannedUnit> for UnitReport {
    fn from(planned: &PlannedUnit) -> Self {
        Self {
            index: planned.index,
            manga_slug: planned.unit.manga_slug.clone(),
            chapter_main: planned.unit.chapter_main,
            chapter_sub: planned.unit.chapter_sub,
            label: planned.unit.label.clone(),
            folder_name: planned.unit.folder_name.clone(),
            page_count: planned.unit.pages.len() as u32,
            action: planned.action,
            state: planned.state,
            chapter_id: planned.chapter_id.clone(),
        }
    }
}

/// Response for every submission, dry run and resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub kind: SubmissionKind,
    pub status: JobStatus,
    pub dry_run: bool,
    pub total_units: u32,
    pub processed_units: u32,
    pub checkpoint: u32,
    #[serde(default)]
    pub resume_token: Option<String>,
    pub units: Vec<UnitReport>,
    pub report: ValidationReport,
    pub errors: Vec<UnitError>,
}

impl From<&UploadJob> for UploadResponse {
    fn from(job: &UploadJob) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            status: job.status,
            dry_run: job.dry_run,
            total_units: job.total_units,
            processed_units: job.processed_units,
            checkpoint: job.checkpoint,
            resume_token: job.resume_token.clone(),
            units: job.units.iter().map(UnitReport::from).collect(),
            report: job.report.clone(),
            errors: job.errors.clone(),
        }
    }
}

impl UploadResponse {
    /// Units with the given state
    pub fn count_state(&self, state: UnitState) -> usize {
        self.units.iter().filter(|u| u.state == state).count()
    }

    pub fn actions(&self) -> Vec<UnitAction> {
        self.units.iter().map(|u| u.action).collect()
    }
}

/// Live view of a job for pollers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    #[serde(default)]
    pub current_file: Option<String>,
    pub processed_units: u32,
    pub total_units: u32,
    pub processed_files: u32,
    pub total_files: u32,
    pub checkpoint: u32,
}

impl ProgressSnapshot {
    pub fn from_job(job: &UploadJob, current_file: Option<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: percent(job.processed_units, job.total_units, job.status),
            current_file,
            processed_units: job.processed_units,
            total_units: job.total_units,
            processed_files: job.processed_files(),
            total_files: job.total_files(),
            checkpoint: job.checkpoint,
        }
    }
}

/// A completed job with no units is 100%
pub fn percent(processed: u32, total: u32, status: JobStatus) -> u8 {
    if total == 0 {
        return if status == JobStatus::Completed { 100 } else { 0 };
    }
    ((processed.min(total) as u64 * 100) / total as u64) as u8
}

/// Execution flags shared by every entry point
#[derive(Debug, Clone, Default, Builder)]
pub struct ExecutionOptions {
    #[builder(default)]
    pub dry_run: bool,
    #[builder(default)]
    pub parallel: bool,
    #[builder(default)]
    pub continue_on_error: bool,
    #[builder(default)]
    pub preserve_filenames: bool,
    /// Caller-chosen job id, so progress can be polled while the call is in flight
    pub job_id: Option<String>,
    pub storage_target: Option<String>,
}
