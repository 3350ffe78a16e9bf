use std::path::Path;

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use crate::ingest::model::UploadJob;

use super::error::{LedgerError, Result};
use super::partitions::{encode_job_key, encode_token_key};
use super::pruning::{PruneStats, prune_expired};

/// Fjall-backed durable record of upload jobs and their resume tokens
#[derive(Clone)]
pub struct JobLedger {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    tokens: PartitionHandle,
    metadata: PartitionHandle,
}

impl JobLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening job ledger at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let tokens = keyspace.open_partition("resume_tokens", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            jobs,
            tokens,
            metadata,
        })
    }

    /// Store or update a job
    pub fn upsert(&self, job: &UploadJob) -> Result<()> {
        let key = encode_job_key(&job.id);
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %job.id, status = %job.status, "Upserted job");
        Ok(())
    }

    /// Upsert and sync to disk; used wherever a checkpoint must survive a crash
    pub fn commit(&self, job: &UploadJob) -> Result<()> {
        self.upsert(job)?;
        self.persist()
    }

    pub fn get(&self, job_id: &str) -> Result<Option<UploadJob>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, job_id: &str) -> Result<bool> {
        Ok(self.jobs.get(encode_job_key(job_id))?.is_some())
    }

    pub fn list(&self) -> Result<Vec<UploadJob>> {
        let mut jobs = Vec::new();
        for item in self.jobs.iter() {
            let (_, value) = item?;
            jobs.push(serde_json::from_slice(&value)?);
        }
        Ok(jobs)
    }

    /// Write the job and swap its resume token in one batch.
    /// `previous` is removed; `job.resume_token`, if set, is indexed.
    pub fn commit_with_token(&self, job: &UploadJob, previous: Option<&str>) -> Result<()> {
        let mut batch = self.keyspace.batch();

        if let Some(old) = previous {
            batch.remove(&self.tokens, encode_token_key(old));
        }
        if let Some(token) = &job.resume_token {
            batch.insert(&self.tokens, encode_token_key(token), job.id.as_bytes());
        }
        batch.insert(&self.jobs, encode_job_key(&job.id), serde_json::to_vec(job)?);

        batch.commit()?;
        self.persist()?;
        debug!(job_id = %job.id, has_token = job.resume_token.is_some(), "Committed job with token");
        Ok(())
    }

    /// Job id a live token belongs to
    pub fn lookup_token(&self, token: &str) -> Result<Option<String>> {
        match self.tokens.get(encode_token_key(token))? {
            Some(value) => String::from_utf8(value.to_vec())
                .map(Some)
                .map_err(|_| LedgerError::Corrupt(format!("resume token {token} maps to a non UTF-8 job id"))),
            None => Ok(None),
        }
    }

    /// Remove jobs that finished (or were abandoned) before `cutoff`
    pub fn prune_expired(&self, cutoff: DateTime<Utc>) -> Result<PruneStats> {
        prune_expired(
            &self.keyspace,
            &self.jobs,
            &self.tokens,
            &self.metadata,
            cutoff,
        )
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<LedgerStats> {
        let mut job_count = 0;
        let mut token_count = 0;

        for item in self.jobs.iter() {
            item?;
            job_count += 1;
        }

        for item in self.tokens.iter() {
            item?;
            token_count += 1;
        }

        Ok(LedgerStats {
            job_count,
            token_count,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerStats {
    pub job_count: usize,
    pub token_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::model::{ExecutionOptions, JobStatus, SubmissionKind};
    use tempfile::TempDir;

    fn create_test_ledger() -> (JobLedger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let ledger = JobLedger::open(temp_dir.path().join("test_ledger")).unwrap();
        (ledger, temp_dir)
    }

    fn create_test_job(job_id: &str, status: JobStatus) -> UploadJob {
        let mut job = UploadJob::new(
            job_id.to_string(),
            SubmissionKind::Bulk,
            &ExecutionOptions::default(),
            "primary".to_string(),
        );
        job.status = status;
        job
    }

    #[test]
    fn test_upsert_and_get_job() {
        let (ledger, _temp) = create_test_ledger();
        ledger
            .upsert(&create_test_job("job_123", JobStatus::Executing))
            .unwrap();

        let retrieved = ledger.get("job_123").unwrap().unwrap();
        assert_eq!(retrieved.id, "job_123");
        assert_eq!(retrieved.status, JobStatus::Executing);
        assert!(ledger.contains("job_123").unwrap());
        assert!(ledger.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_token_rotation() {
        let (ledger, _temp) = create_test_ledger();
        let mut job = create_test_job("job_1", JobStatus::Interrupted);

        job.resume_token = Some("rt_first".to_string());
        ledger.commit_with_token(&job, None).unwrap();
        assert_eq!(ledger.lookup_token("rt_first").unwrap().as_deref(), Some("job_1"));

        job.resume_token = Some("rt_second".to_string());
        ledger.commit_with_token(&job, Some("rt_first")).unwrap();
        assert!(ledger.lookup_token("rt_first").unwrap().is_none());
        assert_eq!(ledger.lookup_token("rt_second").unwrap().as_deref(), Some("job_1"));

        job.resume_token = None;
        ledger.commit_with_token(&job, Some("rt_second")).unwrap();
        assert_eq!(ledger.stats().unwrap().token_count, 0);
    }

    #[test]
    fn test_prune_expired_keeps_recent_and_running() {
        let (ledger, _temp) = create_test_ledger();
        let old = Utc::now() - chrono::Duration::days(30);

        let mut finished = create_test_job("old_done", JobStatus::Completed);
        finished.updated_at = old;
        let mut abandoned = create_test_job("old_interrupted", JobStatus::Interrupted);
        abandoned.updated_at = old;
        abandoned.resume_token = Some("rt_old".to_string());
        let mut running = create_test_job("old_running", JobStatus::Executing);
        running.updated_at = old;
        let recent = create_test_job("recent_done", JobStatus::Completed);

        ledger.upsert(&finished).unwrap();
        ledger.commit_with_token(&abandoned, None).unwrap();
        ledger.upsert(&running).unwrap();
        ledger.upsert(&recent).unwrap();

        let stats = ledger
            .prune_expired(Utc::now() - chrono::Duration::days(14))
            .unwrap();

        assert_eq!(stats.jobs_pruned, 2);
        assert_eq!(stats.tokens_pruned, 1);
        assert!(ledger.get("old_done").unwrap().is_none());
        assert!(ledger.lookup_token("rt_old").unwrap().is_none());
        assert!(ledger.get("old_running").unwrap().is_some());
        assert!(ledger.get("recent_done").unwrap().is_some());
    }

    #[test]
    fn test_list_and_stats() {
        let (ledger, _temp) = create_test_ledger();
        ledger.upsert(&create_test_job("a", JobStatus::Completed)).unwrap();
        ledger.upsert(&create_test_job("b", JobStatus::Failed)).unwrap();

        assert_eq!(ledger.list().unwrap().len(), 2);
        assert_eq!(ledger.stats().unwrap().job_count, 2);
        ledger.persist().unwrap();
    }
}
