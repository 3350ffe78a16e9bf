//! Resume tokens
//!
//! A token exists only while its job is `Interrupted`. Redeeming it removes it
//! from the ledger in the same batch that moves the job back to `Executing`,
//! so a token can be redeemed at most once.

use super::error::{Result, UploadError};
use super::model::{JobStatus, UploadJob};
use crate::ledger::JobLedger;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub const TOKEN_PREFIX: &str = "rt_";

pub fn mint_token() -> String {
    format!("{TOKEN_PREFIX}{}", Uuid::new_v4().simple())
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RecoveryStats {
    pub interrupted: usize,
    pub failed: usize,
    /// Jobs failed before execution, whose staged pages can go
    #[serde(skip)]
    pub failed_job_ids: Vec<String>,
}

pub struct ResumeManager {
    ledger: JobLedger,
    redeem_lock: Mutex<()>,
}

impl ResumeManager {
    pub fn new(ledger: JobLedger) -> Self {
        Self {
            ledger,
            redeem_lock: Mutex::new(()),
        }
    }

    /// Move an executing job to `Interrupted` with a fresh token and commit it
    pub fn interrupt(&self, job: &mut UploadJob, reason: impl Into<String>) -> Result<()> {
        if !job.transition(JobStatus::Interrupted) {
            return Err(UploadError::IllegalTransition {
                from: job.status,
                to: JobStatus::Interrupted,
            });
        }
        let previous = job.resume_token.replace(mint_token());
        job.interrupt_reason = Some(reason.into());
        self.ledger.commit_with_token(job, previous.as_deref())?;

        info!(
            job_id = %job.id,
            checkpoint = job.checkpoint,
            reason = job.interrupt_reason.as_deref().unwrap_or_default(),
            "Job interrupted"
        );
        Ok(())
    }

    /// Exchange a token for its job, now `Executing` and without a token
    pub async fn redeem(&self, token: &str) -> Result<UploadJob> {
        let _guard = self.redeem_lock.lock().await;

        let job_id = self
            .ledger
            .lookup_token(token)?
            .ok_or(UploadError::InvalidResumeToken)?;
        let mut job = self
            .ledger
            .get(&job_id)?
            .ok_or(UploadError::InvalidResumeToken)?;

        if job.status != JobStatus::Interrupted || job.resume_token.as_deref() != Some(token) {
            warn!(job_id = %job.id, status = %job.status, "Stale resume token");
            return Err(UploadError::InvalidResumeToken);
        }

        job.resume_token = None;
        job.interrupt_reason = None;
        job.transition(JobStatus::Executing);
        self.ledger.commit_with_token(&job, Some(token))?;

        info!(job_id = %job.id, checkpoint = job.checkpoint, "Resume token redeemed");
        Ok(job)
    }

    /// Settle jobs a previous process left mid-flight: executing jobs become
    /// resumable, jobs that never reached execution fail
    pub fn recover_orphans(&self) -> Result<RecoveryStats> {
        let mut stats = RecoveryStats::default();

        for mut job in self.ledger.list()? {
            match job.status {
                JobStatus::Executing => {
                    job.current_unit = None;
                    self.interrupt(&mut job, "process restarted during execution")?;
                    stats.interrupted += 1;
                }
                JobStatus::Pending | JobStatus::Validating | JobStatus::Planning => {
                    job.transition(JobStatus::Failed);
                    self.ledger.upsert(&job)?;
                    stats.failed += 1;
                    stats.failed_job_ids.push(job.id);
                }
                _ => {}
            }
        }

        if stats.failed > 0 {
            self.ledger.persist()?;
        }
        if stats != RecoveryStats::default() {
            info!(
                interrupted = stats.interrupted,
                failed = stats.failed,
                "Recovered orphaned jobs"
            );
        }
        Ok(stats)
    }
}
