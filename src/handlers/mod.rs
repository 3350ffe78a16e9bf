//! Submission handlers
//!
//! Every submission shape (single chapter, bulk archive, metadata + archive,
//! multi-title, smart import) has a handler that validates it offline and
//! decodes it into chapters. The coordinator owns everything after that:
//! conflict resolution, staging and execution.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mangabox::handlers::HandlerRegistry;
//!
//! let registry = HandlerRegistry::with_defaults();
//! let handler = registry.get(submission.kind())?;
//!
//! let report = handler.validate(&submission)?;
//! let planned = handler.plan(submission, &config.upload).await?;
//! ```

mod builtin;
mod registry;
mod traits;
pub mod types;

pub use builtin::{BulkHandler, ChapterHandler, MetadataHandler, MultiTitleHandler, SmartHandler};
pub use registry::{HandlerRegistry, RegistryError};
pub use traits::{HandlerError, SubmissionHandler};
pub use types::{
    BulkSubmission, ChapterSubmission, MetadataSubmission, MultiSubmission, PlannedSubmission,
    SmartSubmission, Submission,
};
