//! Upload ingestion
//!
//! A submission becomes an [`UploadJob`] made of chapter units. The
//! coordinator validates it, decodes the archive into units, resolves them
//! against the catalog, stages page bytes and then executes the units on a
//! worker pool. Jobs that stop early are `Interrupted` and carry a resume
//! token; redeeming it continues from the checkpoint.

pub mod archive;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod naming;
pub mod progress;
pub mod resume;
pub mod validator;

pub use coordinator::{CancelReceipt, UploadCoordinator, UploadHealth};
pub use error::{Result, UploadError};
pub use model::{
    ChapterPolicy, ConflictPolicy, ExecutionOptions, JobStatus, MangaPolicy, ProgressSnapshot,
    SubmissionKind, UnitAction, UnitState, UploadJob, UploadResponse, ValidationReport,
};
pub use resume::RecoveryStats;
pub use validator::{MetadataDocument, MultiTitleDocument};
