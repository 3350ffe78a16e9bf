//! Retention for finished and abandoned jobs

use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionHandle};
use tracing::{debug, info};

use super::error::Result;
use super::partitions::{decode_job_key, encode_job_key, encode_meta_key, encode_token_key};
use crate::ingest::model::{JobStatus, UploadJob};

const META_LAST_PRUNE: &str = "last_prune";

/// Pruning statistics
#[derive(Debug, Default)]
pub struct PruneStats {
    pub jobs_pruned: usize,
    pub tokens_pruned: usize,
    /// Ids of removed jobs, so their staged pages can be purged too
    pub pruned_job_ids: Vec<String>,
}

fn is_prunable(job: &UploadJob, cutoff: DateTime<Utc>) -> bool {
    matches!(
        job.status,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Interrupted
    ) && job.updated_at < cutoff
}

/// Remove completed, failed and interrupted jobs last touched before `cutoff`,
/// together with any resume token they still hold.
pub fn prune_expired(
    keyspace: &Keyspace,
    jobs_partition: &PartitionHandle,
    tokens_partition: &PartitionHandle,
    metadata_partition: &PartitionHandle,
    cutoff: DateTime<Utc>,
) -> Result<PruneStats> {
    let mut stats = PruneStats::default();
    let mut expired = Vec::new();

    for item in jobs_partition.iter() {
        let (key, value) = item?;
        let job: UploadJob = match serde_json::from_slice(&value) {
            Ok(job) => job,
            Err(e) => {
                debug!(key = ?decode_job_key(&key), error = %e, "Skipping unreadable job record");
                continue;
            }
        };
        if is_prunable(&job, cutoff) {
            expired.push(job);
        }
    }

    if !expired.is_empty() {
        let mut batch = keyspace.batch();
        for job in &expired {
            batch.remove(jobs_partition, encode_job_key(&job.id));
            if let Some(token) = &job.resume_token {
                batch.remove(tokens_partition, encode_token_key(token));
                stats.tokens_pruned += 1;
            }
        }
        batch.commit()?;
    }

    stats.jobs_pruned = expired.len();
    stats.pruned_job_ids = expired.into_iter().map(|job| job.id).collect();

    metadata_partition.insert(
        encode_meta_key(META_LAST_PRUNE),
        Utc::now().to_rfc3339().as_bytes(),
    )?;
    keyspace.persist(fjall::PersistMode::SyncAll)?;

    info!(
        jobs = stats.jobs_pruned,
        tokens = stats.tokens_pruned,
        %cutoff,
        "Pruning complete"
    );
    Ok(stats)
}
