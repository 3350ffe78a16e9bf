//! Fjall-based job ledger
//!
//! Durable home of every [`UploadJob`](crate::ingest::model::UploadJob):
//! status, planned units with their states, checkpoint, errors and the live
//! resume token. The coordinator commits a job here before it publishes any
//! progress, so a poller can never observe work the ledger would lose on a crash.
//!
//! ## Retention
//!
//! Completed, failed and interrupted jobs older than `retention.job_ttl_days`
//! are removed by [`JobLedger::prune_expired`], which the server runs on an
//! interval.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mangabox::ledger::JobLedger;
//!
//! let ledger = JobLedger::open("data/ledger")?;
//! ledger.commit(&job)?;
//! let job = ledger.get(&job.id)?;
//! ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::PruneStats;
pub use store::{JobLedger, LedgerStats};
