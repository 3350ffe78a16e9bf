use async_trait::async_trait;
use thiserror::Error;

use super::types::{PlannedSubmission, Submission};
use crate::config::UploadLimits;
use crate::ingest::archive::ArchiveError;
use crate::ingest::model::{SubmissionKind, ValidationReport};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed submission: {0}")]
    Schema(String),
    #[error(transparent)]
    Mapping(#[from] ArchiveError),
    #[error("handler for {expected} received a {actual} submission")]
    WrongKind {
        expected: SubmissionKind,
        actual: SubmissionKind,
    },
}

/// One handler per submission shape.
///
/// `validate` is offline: it never reads the catalog or storage. `plan` decodes
/// the submitted content into chapters with ordered pages.
#[async_trait]
pub trait SubmissionHandler: Send + Sync {
    fn kind(&self) -> SubmissionKind;

    fn validate(&self, submission: &Submission) -> Result<ValidationReport, HandlerError>;

    async fn plan(
        &self,
        submission: Submission,
        limits: &UploadLimits,
    ) -> Result<PlannedSubmission, HandlerError>;
}
