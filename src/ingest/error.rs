use super::archive::ArchiveError;
use super::model::{JobStatus, UploadResponse};
use crate::auth::AuthError;
use crate::handlers::{HandlerError, RegistryError};
use crate::catalog::CatalogError;
use crate::ledger::LedgerError;
use crate::staging::StagingError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    /// Malformed or incomplete submission document
    #[error("Schema error: {0}")]
    Schema(String),

    /// Validation produced errors; the report is in the response
    #[error("Validation failed with {} error(s)", .0.report.errors.len())]
    Rejected(Box<UploadResponse>),

    /// An existing manga or chapter collides under an `error` policy
    #[error("Conflict with existing catalog entries ({} reported)", .0.report.conflicts.len())]
    Conflict(Box<UploadResponse>),

    #[error("Archive mapping error: {message}")]
    ArchiveMapping {
        message: String,
        response: Option<Box<UploadResponse>>,
    },

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Forbidden: {0}")]
    Forbidden(#[from] AuthError),

    #[error("Invalid resume token")]
    InvalidResumeToken,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job id already in use: {0}")]
    DuplicateJobId(String),

    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Illegal job transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, UploadError>;

impl From<ArchiveError> for UploadError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::PageTooLarge { size, limit, .. } => UploadError::PayloadTooLarge { size, limit },
            ArchiveError::Unreadable(_) | ArchiveError::UnsafePath(_) | ArchiveError::Sidecar { .. } => {
                UploadError::Schema(err.to_string())
            }
            ArchiveError::Io(e) => UploadError::Storage(StorageError::Io(e)),
            ArchiveError::Join(message) => UploadError::Storage(StorageError::Io(std::io::Error::other(message))),
            ArchiveError::MissingFolders(_)
            | ArchiveError::AmbiguousFolder { .. }
            | ArchiveError::Ordinals { .. }
            | ArchiveError::DuplicateChapter { .. }
            | ArchiveError::NoIdentity
            | ArchiveError::Empty => UploadError::archive_mapping(err.to_string()),
        }
    }
}

impl From<HandlerError> for UploadError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Mapping(e) => e.into(),
            other => UploadError::Schema(other.to_string()),
        }
    }
}

impl From<RegistryError> for UploadError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(kind) => UploadError::FeatureDisabled(kind.as_str()),
        }
    }
}

impl UploadError {
    pub fn schema(message: impl Into<String>) -> Self {
        UploadError::Schema(message.into())
    }

    pub fn archive_mapping(message: impl Into<String>) -> Self {
        UploadError::ArchiveMapping {
            message: message.into(),
            response: None,
        }
    }

    /// Attach the job response to an archive mapping error
    pub fn with_response(self, job: UploadResponse) -> Self {
        match self {
            UploadError::ArchiveMapping { message, .. } => UploadError::ArchiveMapping {
                message,
                response: Some(Box::new(job)),
            },
            other => other,
        }
    }

    /// The job response carried by pre-execution rejections
    pub fn response(&self) -> Option<&UploadResponse> {
        match self {
            UploadError::Rejected(response) | UploadError::Conflict(response) => Some(response),
            UploadError::ArchiveMapping {
                response: Some(response),
                ..
            } => Some(response),
            _ => None,
        }
    }
}
