//! Upload coordinator
//!
//! Drives a submission through `Validating -> Planning -> Executing` and owns
//! the job from then on. It is the single writer of job state: workers report
//! unit outcomes over a channel, and every change is committed to the ledger
//! before progress is published.

use super::conflict::{CatalogSnapshot, resolve};
use super::error::{Result, UploadError};
use super::model::{
    ChapterUnit, ConflictPolicy, ExecutionOptions, JobStatus, PageFile, PlannedUnit,
    ProgressSnapshot, SubmissionKind, UnitAction, UnitError, UnitState, UploadJob, UploadResponse,
    ValidationReport,
};
use super::progress::ProgressTracker;
use super::resume::{RecoveryStats, ResumeManager};
use super::archive::DecodedPage;
use super::validator::{self, MetadataDocument};
use crate::auth::{Credential, OperatorAuth};
use crate::catalog::{Catalog, ChapterKey, MangaDraft};
use crate::config::{Config, FeatureFlags, ThumbnailPolicy, TransferConfig, UploadLimits, WorkerConfig};
use crate::handlers::{HandlerRegistry, Submission};
use crate::ledger::{JobLedger, LedgerStats, PruneStats};
use crate::observability::{Metrics, MetricsSnapshot};
use crate::staging::{PageBlob, StagingStats, StagingStore};
use crate::storage::{BlobStore, StorageRegistry};
use crate::worker::{JobContext, TransferPolicy, UnitBroker, UnitOutcome, UnitResult, UnitRunner};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

static JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,128}$").expect("job id regex"));

/// Answer to a cancellation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelReceipt {
    pub job_id: String,
    /// False when the job is not running in this process
    pub accepted: bool,
    pub status: JobStatus,
}

/// Storage target, limits and policies reported by the health query
#[derive(Debug, Clone, Serialize)]
pub struct UploadHealth {
    pub storage_target: String,
    pub backups: Vec<String>,
    pub limits: UploadLimits,
    pub thumbnails: ThumbnailPolicy,
    pub features: FeatureFlags,
    pub workers: WorkerConfig,
    pub transfer: TransferConfig,
    pub available_storage_permits: usize,
    pub submission_kinds: Vec<&'static str>,
    pub metrics: MetricsSnapshot,
    pub ledger: LedgerStats,
    pub staging: StagingStats,
}

pub struct UploadCoordinator {
    config: Arc<Config>,
    auth: OperatorAuth,
    catalog: Arc<dyn Catalog>,
    ledger: JobLedger,
    staging: Arc<StagingStore>,
    storage: StorageRegistry,
    handlers: HandlerRegistry,
    runner: Arc<UnitRunner>,
    transfer: TransferPolicy,
    progress: ProgressTracker,
    resume: ResumeManager,
    metrics: Arc<Metrics>,
    /// Stop flags of jobs running in this process
    active: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

#[bon::bon]
impl UploadCoordinator {
    #[builder]
    pub fn new(
        config: Config,
        catalog: Arc<dyn Catalog>,
        ledger: JobLedger,
        staging: Arc<StagingStore>,
        storage: StorageRegistry,
        #[builder(default)] handlers: HandlerRegistry,
        #[builder(default)] metrics: Arc<Metrics>,
    ) -> Self {
        let transfer = TransferPolicy::from_config(&config.transfer);
        let runner = Arc::new(UnitRunner::new(catalog.clone(), staging.clone(), transfer.clone()));

        Self {
            auth: OperatorAuth::from_config(&config.auth),
            config: Arc::new(config),
            catalog,
            resume: ResumeManager::new(ledger.clone()),
            ledger,
            staging,
            storage,
            handlers,
            runner,
            transfer,
            progress: ProgressTracker::new(),
            metrics,
            active: Mutex::new(HashMap::new()),
        }
    }
}

impl UploadCoordinator {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Reject callers without a valid operator credential
    pub fn authorize(&self, credential: &Credential) -> Result<()> {
        self.auth.authorize(credential)?;
        Ok(())
    }

    /// Run a submission to completion, interruption or rejection
    pub async fn submit(
        &self,
        credential: &Credential,
        submission: Submission,
        mut options: ExecutionOptions,
    ) -> Result<UploadResponse> {
        self.authorize(credential)?;

        let kind = submission.kind();
        self.check_feature(kind)?;

        let size = submission.payload_bytes();
        let limit = self.config.upload.max_archive_bytes.as_u64();
        if size > limit {
            return Err(UploadError::PayloadTooLarge { size, limit });
        }

        let job_id = match options.job_id.take() {
            Some(id) => {
                if !JOB_ID.is_match(&id) {
                    return Err(UploadError::schema(format!(
                        "job id '{id}' must be 1-128 letters, digits, '.', '_' or '-'"
                    )));
                }
                if self.is_active(&id) || self.ledger.contains(&id)? {
                    return Err(UploadError::DuplicateJobId(id));
                }
                id
            }
            None => Uuid::now_v7().to_string(),
        };

        let (target, store) = self
            .storage
            .target(options.storage_target.as_deref())
            .map_err(|e| UploadError::schema(e.to_string()))?;

        let mut notes = ValidationReport::default();
        if options.parallel && !self.config.features.parallel_execution {
            options.parallel = false;
            notes.warn("parallel execution is disabled; running sequentially");
        }

        let mut job = UploadJob::new(job_id, kind, &options, target);
        self.metrics.job_submitted();
        info!(job_id = %job.id, kind = %kind, dry_run = job.dry_run, "Submission received");

        let stop = self.register(&job.id);
        let result = self.run_submission(&mut job, submission, store, notes, stop).await;
        self.unregister(&job.id);
        result
    }

    async fn run_submission(
        &self,
        job: &mut UploadJob,
        submission: Submission,
        store: Arc<dyn BlobStore>,
        notes: ValidationReport,
        stop: Arc<AtomicBool>,
    ) -> Result<UploadResponse> {
        let handler = self.handlers.get(job.kind)?;
        let policy = submission.policy();

        self.advance(job, JobStatus::Validating)?;
        let mut report = notes;
        match handler.validate(&submission) {
            Ok(found) => report.merge(found),
            Err(e) => {
                let err = UploadError::from(e);
                job.report.error(err.to_string());
                self.fail(job);
                return Err(err);
            }
        }
        if !report.is_ok() {
            job.report = report;
            return Err(UploadError::Rejected(Box::new(self.fail(job))));
        }

        self.advance(job, JobStatus::Planning)?;
        let planned = match handler.plan(submission, &self.config.upload).await {
            Ok(planned) => planned,
            Err(e) => {
                let err = UploadError::from(e);
                report.error(err.to_string());
                job.report = report;
                let response = self.fail(job);
                return Err(err.with_response(response));
            }
        };
        report.warnings.extend(planned.warnings);

        let max_chapters = self.config.upload.max_chapters_per_job;
        if planned.chapters.len() > max_chapters {
            report.error(format!(
                "archive holds {} chapters, more than the {max_chapters} allowed per job",
                planned.chapters.len()
            ));
            job.report = report;
            return Err(UploadError::Rejected(Box::new(self.fail(job))));
        }

        let items: Vec<(String, ChapterKey)> = planned
            .chapters
            .iter()
            .map(|chapter| (chapter.manga_slug.clone(), chapter.key))
            .collect();
        let snapshot = match CatalogSnapshot::load(self.catalog.as_ref(), &items).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                job.report = report;
                job.report.error(format!("catalog unavailable: {e}"));
                self.fail(job);
                return Err(e.into());
            }
        };
        let resolution = resolve(&items, &snapshot, policy);
        report.conflicts = resolution.conflicts;

        let mut units = Vec::with_capacity(planned.chapters.len());
        let mut blobs = Vec::with_capacity(planned.chapters.len());
        for (index, (chapter, action)) in planned.chapters.into_iter().zip(resolution.actions).enumerate() {
            let pages = chapter
                .pages
                .iter()
                .map(|page| PageFile {
                    ordinal: page.ordinal,
                    file_name: page.file_name.clone(),
                    byte_size: page.byte_size(),
                    content_checksum: page.checksum.clone(),
                })
                .collect();
            units.push(PlannedUnit {
                index: index as u32,
                unit: ChapterUnit {
                    manga_slug: chapter.manga_slug,
                    chapter_main: chapter.key.main,
                    chapter_sub: chapter.key.sub,
                    label: chapter.label,
                    folder_name: chapter.folder_name,
                    pages,
                },
                action,
                state: if action == UnitAction::Skip {
                    UnitState::Skipped
                } else {
                    UnitState::Pending
                },
                chapter_id: None,
            });
            blobs.push(chapter.pages);
        }

        job.targets = planned.targets;
        job.report = report;
        job.set_units(units);

        if resolution.blocking {
            return Err(UploadError::Conflict(Box::new(self.fail(job))));
        }
        if job.dry_run {
            info!(job_id = %job.id, units = job.total_units, "Dry run planned");
            return Ok(UploadResponse::from(&*job));
        }

        if let Err(e) = self.stage(job, blobs) {
            job.report.error(format!("staging failed: {e}"));
            self.fail(job);
            return Err(e);
        }

        self.advance(job, JobStatus::Executing)?;
        self.execute(job, stop).await
    }

    fn stage(&self, job: &UploadJob, blobs: Vec<Vec<DecodedPage>>) -> Result<()> {
        for (unit, pages) in job.units.iter().zip(blobs) {
            if unit.action == UnitAction::Skip {
                continue;
            }
            let pages: Vec<PageBlob> = pages
                .into_iter()
                .map(|page| PageBlob {
                    ordinal: page.ordinal,
                    file_name: page.file_name,
                    content_checksum: page.checksum,
                    data: page.data,
                })
                .collect();
            self.staging.stage_unit(&job.id, unit.index, &pages)?;
        }
        self.staging.flush()?;
        Ok(())
    }

    /// Execute every non-terminal unit and settle the job
    async fn execute(&self, job: &mut UploadJob, stop: Arc<AtomicBool>) -> Result<UploadResponse> {
        let pending: Vec<PlannedUnit> = job
            .units
            .iter()
            .filter(|unit| !unit.state.is_terminal())
            .cloned()
            .collect();

        if !pending.is_empty() {
            let needed: HashSet<&str> = pending.iter().map(|u| u.unit.manga_slug.as_str()).collect();
            let drafts: Vec<MangaDraft> = job
                .targets
                .iter()
                .filter(|d| needed.contains(d.slug.as_str()))
                .cloned()
                .collect();
            let mut manga = HashMap::new();
            for draft in &drafts {
                match self
                    .transfer
                    .run("ensure manga", || self.catalog.ensure_manga(draft))
                    .await
                {
                    Ok(record) => {
                        manga.insert(draft.slug.clone(), record);
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "Cannot prepare manga");
                        return self.interrupt(job, format!("catalog unavailable: {e}"));
                    }
                }
            }

            let ctx = Arc::new(JobContext {
                job_id: job.id.clone(),
                storage_target: job.storage_target.clone(),
                store: self.store_for(job)?,
                storage: self.storage.clone(),
                preserve_filenames: job.preserve_filenames,
                continue_on_error: job.continue_on_error,
                manga,
                stop,
            });
            let workers = if job.parallel { self.config.workers.pool_size } else { 1 };
            let (broker, mut outcomes) = UnitBroker::spawn(
                self.runner.clone(),
                ctx.clone(),
                workers,
                self.config.workers.channel_size,
            );
            tokio::spawn(async move {
                for unit in pending {
                    if !broker.dispatch(unit).await {
                        break;
                    }
                }
            });

            let mut fatal = None;
            let mut transfer_failed = false;
            while let Some(outcome) = outcomes.recv().await {
                if let Err(e) = self.apply(job, outcome, &mut fatal, &mut transfer_failed) {
                    ctx.halt();
                    error!(job_id = %job.id, error = %e, "Cannot record unit outcome");
                    return Err(e);
                }
            }

            job.current_unit = None;
            if let Some(message) = fatal {
                job.report.error(message);
                return Ok(self.fail(job));
            }
            if !job.all_terminal() {
                let reason = if transfer_failed {
                    "unit transfer failed"
                } else {
                    "cancelled"
                };
                return self.interrupt(job, reason.to_string());
            }
        }

        job.current_unit = None;
        self.advance(job, JobStatus::Completed)?;
        self.settle(job);
        self.metrics.job_completed();
        info!(
            job_id = %job.id,
            units = job.total_units,
            errors = job.errors.len(),
            "Job completed"
        );
        Ok(UploadResponse::from(&*job))
    }

    fn apply(
        &self,
        job: &mut UploadJob,
        outcome: UnitOutcome,
        fatal: &mut Option<String>,
        transfer_failed: &mut bool,
    ) -> Result<()> {
        let continue_on_error = job.continue_on_error;
        let Some(unit) = job.units.get_mut(outcome.index as usize) else {
            warn!(job_id = %job.id, unit = outcome.index, "Outcome for unknown unit");
            return Ok(());
        };
        let error = UnitError {
            unit_index: unit.index,
            manga_slug: unit.unit.manga_slug.clone(),
            chapter: unit.unit.key(),
            message: String::new(),
            retryable: false,
            at: Utc::now(),
        };

        match outcome.result {
            UnitResult::NotStarted => return Ok(()),
            UnitResult::Committed { chapter_id, pages } => {
                unit.state = UnitState::committed(unit.action);
                unit.chapter_id = Some(chapter_id);
                self.metrics.unit_committed(pages);
            }
            UnitResult::Failed { message } => {
                let record = UnitError {
                    message,
                    retryable: !continue_on_error,
                    ..error
                };
                if continue_on_error {
                    unit.state = UnitState::Errored;
                } else {
                    *transfer_failed = true;
                }
                job.errors.push(record);
            }
            UnitResult::Fatal { message } => {
                let record = UnitError {
                    message: message.clone(),
                    ..error
                };
                unit.state = UnitState::Errored;
                job.errors.push(record);
                fatal.get_or_insert(message);
            }
        }

        job.current_unit = Some(outcome.index);
        job.refresh_counters();
        self.ledger.commit(job)?;
        self.progress.publish(job, Some(outcome.folder_name));
        Ok(())
    }

    fn store_for(&self, job: &UploadJob) -> Result<Arc<dyn BlobStore>> {
        let (_, store) = self.storage.target(Some(&job.storage_target))?;
        Ok(store)
    }

    /// Move the job to `next`, committing and publishing unless it is a dry run
    fn advance(&self, job: &mut UploadJob, next: JobStatus) -> Result<()> {
        if !job.transition(next) {
            return Err(UploadError::IllegalTransition {
                from: job.status,
                to: next,
            });
        }
        if !job.dry_run {
            self.ledger.commit(job)?;
            self.progress.publish(job, None);
        }
        Ok(())
    }

    /// Fail the job and record it; the caller decides what to return
    fn fail(&self, job: &mut UploadJob) -> UploadResponse {
        let from = job.status;
        job.current_unit = None;
        if !job.transition(JobStatus::Failed) {
            warn!(job_id = %job.id, status = %from, "Job cannot move to failed");
        }
        if !job.dry_run {
            if let Err(e) = self.ledger.commit(job) {
                error!(job_id = %job.id, error = %e, "Failed to record failed job");
            }
            self.settle(job);
        }
        self.metrics.job_failed();
        info!(job_id = %job.id, from = %from, errors = job.report.errors.len(), "Job failed");
        UploadResponse::from(&*job)
    }

    fn interrupt(&self, job: &mut UploadJob, reason: String) -> Result<UploadResponse> {
        job.current_unit = None;
        self.resume.interrupt(job, reason)?;
        self.progress.forget(&job.id);
        self.metrics.job_interrupted();
        Ok(UploadResponse::from(&*job))
    }

    /// Release per-job resources once the job can no longer run
    fn settle(&self, job: &UploadJob) {
        if let Err(e) = self.staging.purge_job(&job.id) {
            warn!(job_id = %job.id, error = %e, "Failed to purge staged pages");
        }
        self.progress.forget(&job.id);
    }

    fn check_feature(&self, kind: SubmissionKind) -> Result<()> {
        let features = &self.config.features;
        match kind {
            SubmissionKind::Smart if !features.smart_import => Err(UploadError::FeatureDisabled("smart import")),
            SubmissionKind::Multi if !features.multi_title => Err(UploadError::FeatureDisabled("multi-title import")),
            _ => Ok(()),
        }
    }

    fn register(&self, job_id: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.insert(job_id.to_string(), flag.clone());
        flag
    }

    fn unregister(&self, job_id: &str) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(job_id);
    }

    fn is_active(&self, job_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.contains_key(job_id)
    }

    /// Continue an interrupted job from its checkpoint
    pub async fn resume(&self, credential: &Credential, token: &str) -> Result<UploadResponse> {
        self.authorize(credential)?;

        let mut job = self.resume.redeem(token).await?;
        self.metrics.job_resumed();
        self.progress.publish(&job, None);
        info!(job_id = %job.id, checkpoint = job.checkpoint, "Resuming job");

        let stop = self.register(&job.id);
        let result = self.execute(&mut job, stop).await;
        self.unregister(&job.id);
        result
    }

    /// Live progress, or the ledger's view for jobs not running here
    pub fn progress(&self, credential: &Credential, job_id: &str) -> Result<ProgressSnapshot> {
        self.authorize(credential)?;

        if let Some(snapshot) = self.progress.get(job_id) {
            return Ok(snapshot);
        }
        match self.ledger.get(job_id)? {
            Some(job) => Ok(ProgressSnapshot::from_job(&job, None)),
            None => Err(UploadError::JobNotFound(job_id.to_string())),
        }
    }

    /// Ask a running job to stop at the next unit boundary
    pub fn cancel(&self, credential: &Credential, job_id: &str) -> Result<CancelReceipt> {
        self.authorize(credential)?;

        let flag = {
            let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            active.get(job_id).cloned()
        };
        let accepted = flag.is_some();
        if let Some(flag) = flag {
            flag.store(true, Ordering::SeqCst);
            info!(job_id, "Cancellation requested");
        }

        let status = match self.progress.get(job_id) {
            Some(snapshot) => snapshot.status,
            None => match self.ledger.get(job_id)? {
                Some(job) => job.status,
                None if accepted => JobStatus::Pending,
                None => return Err(UploadError::JobNotFound(job_id.to_string())),
            },
        };

        Ok(CancelReceipt {
            job_id: job_id.to_string(),
            accepted,
            status,
        })
    }

    /// Validate metadata documents without running anything
    pub async fn validate_documents(
        &self,
        credential: &Credential,
        documents: &[MetadataDocument],
        check_existing: bool,
        policy: ConflictPolicy,
    ) -> Result<ValidationReport> {
        self.authorize(credential)?;
        Ok(validator::validate_documents(documents, check_existing, self.catalog.as_ref(), policy).await)
    }

    pub fn health(&self, credential: &Credential) -> Result<UploadHealth> {
        self.authorize(credential)?;

        Ok(UploadHealth {
            storage_target: self.storage.active().to_string(),
            backups: self.storage.backups().to_vec(),
            limits: self.config.upload.clone(),
            thumbnails: self.config.thumbnails.clone(),
            features: self.config.features.clone(),
            workers: self.config.workers.clone(),
            transfer: self.config.transfer.clone(),
            available_storage_permits: self.storage.available_permits(),
            submission_kinds: self.handlers.kinds(),
            metrics: self.metrics.snapshot(),
            ledger: self.ledger.stats()?,
            staging: self.staging.stats()?,
        })
    }

    /// Settle jobs left mid-flight by a previous process. Jobs that never
    /// reached execution cannot resume, so their staged pages are dropped.
    pub fn recover_orphans(&self) -> Result<RecoveryStats> {
        let stats = self.resume.recover_orphans()?;
        for job_id in &stats.failed_job_ids {
            let purged = self.staging.purge_job(job_id)?;
            if purged > 0 {
                debug!(job_id, purged, "Purged staging of orphaned job");
            }
        }
        Ok(stats)
    }

    /// Remove expired jobs and whatever they still have staged
    pub fn prune_expired(&self) -> Result<PruneStats> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.config.retention.job_ttl_days));
        let stats = self.ledger.prune_expired(cutoff)?;
        for job_id in &stats.pruned_job_ids {
            self.staging.purge_job(job_id)?;
        }
        if stats.jobs_pruned > 0 {
            info!(jobs = stats.jobs_pruned, tokens = stats.tokens_pruned, "Pruned expired jobs");
        }
        Ok(stats)
    }
}
