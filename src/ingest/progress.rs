use super::model::{ProgressSnapshot, UploadJob};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// In-memory progress of jobs this process is running.
///
/// The coordinator is the only writer and publishes only after the job's state
/// has been committed to the ledger. Readers fall back to the ledger for jobs
/// that are not here.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    snapshots: RwLock<HashMap<String, ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, job: &UploadJob, current_file: Option<String>) {
        let snapshot = ProgressSnapshot::from_job(job, current_file);
        debug!(
            job_id = %snapshot.job_id,
            status = %snapshot.status,
            progress = snapshot.progress,
            "Progress published"
        );
        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        snapshots.insert(snapshot.job_id.clone(), snapshot);
    }

    pub fn get(&self, job_id: &str) -> Option<ProgressSnapshot> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.get(job_id).cloned()
    }

    /// Drop a finished job; later reads come from the ledger
    pub fn forget(&self, job_id: &str) {
        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        snapshots.remove(job_id);
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::model::{ExecutionOptions, JobStatus, SubmissionKind};

    #[test]
    fn test_publish_and_forget() {
        let tracker = ProgressTracker::new();
        let mut job = UploadJob::new(
            "job1".to_string(),
            SubmissionKind::Chapter,
            &ExecutionOptions::default(),
            "primary".to_string(),
        );
        job.transition(JobStatus::Validating);

        tracker.publish(&job, Some("ch1".to_string()));
        let snapshot = tracker.get("job1").unwrap();
        assert_eq!(snapshot.status, JobStatus::Validating);
        assert_eq!(snapshot.current_file.as_deref(), Some("ch1"));
        assert_eq!(tracker.len(), 1);

        tracker.forget("job1");
        assert!(tracker.get("job1").is_none());
        assert!(tracker.is_empty());
    }
}
