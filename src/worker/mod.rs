//! Unit execution
//!
//! A job's units run on a per-job worker pool fed by [`UnitBroker`]. Each worker
//! persists a unit through [`UnitRunner`] and reports an outcome back to the
//! coordinator over an mpsc channel. Storage and catalog calls go through
//! [`TransferPolicy`] for timeouts and retries.

pub mod broker;
pub mod runner;
pub mod transfer;

pub use broker::UnitBroker;
pub use runner::{JobContext, UnitFailure, UnitOutcome, UnitResult, UnitRunner, chapter_prefix, page_key, version_prefix};
pub use transfer::{TransferError, TransferPolicy};
