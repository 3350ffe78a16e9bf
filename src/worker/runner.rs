//! Unit runner - persists one planned chapter
//!
//! Every job writes a chapter's pages under its own version prefix
//! (`{slug}/chapters/c0001-00/{job_id}`), so the pages an existing record points
//! at are never touched before the new record is committed. Order of writes for
//! a unit: clear this job's version prefix, store every staged page, commit the
//! chapter record, then delete the pages of the version it replaced. A unit
//! interrupted anywhere before the commit leaves the previous version intact
//! and is safe to run again.

use super::transfer::{TransferError, TransferPolicy};
use crate::catalog::{Catalog, ChapterKey, ChapterRecord, MangaRecord, StoredPage};
use crate::ingest::model::{PlannedUnit, UnitAction};
use crate::staging::StagingStore;
use crate::storage::{BlobStore, StorageRegistry};
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UnitFailure {
    /// Retry budget spent; a resume may try again
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The unit can never succeed as planned
    #[error("{0}")]
    Fatal(String),
}

/// What a worker reports for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitResult {
    Committed { chapter_id: String, pages: u64 },
    Failed { message: String },
    Fatal { message: String },
    /// Stop was requested before the unit started
    NotStarted,
}

#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub index: u32,
    pub folder_name: String,
    pub result: UnitResult,
}

/// Everything a worker needs about the job it runs units for
pub struct JobContext {
    pub job_id: String,
    pub storage_target: String,
    pub store: Arc<dyn BlobStore>,
    /// Every target, for pages of replaced versions stored elsewhere
    pub storage: StorageRegistry,
    pub preserve_filenames: bool,
    pub continue_on_error: bool,
    /// Manga records by slug, ensured before execution
    pub manga: HashMap<String, MangaRecord>,
    /// Shared with the coordinator's cancel registry
    pub stop: Arc<AtomicBool>,
}

impl JobContext {
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn halt(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// `{slug}/chapters/c0012-05`
pub fn chapter_prefix(manga_slug: &str, key: ChapterKey) -> String {
    format!("{}/chapters/c{:04}-{:02}", manga_slug, key.main, key.sub)
}

/// `{slug}/chapters/c0012-05/{job_id}`, the pages one job wrote for a chapter
pub fn version_prefix(manga_slug: &str, key: ChapterKey, job_id: &str) -> String {
    format!("{}/{}", chapter_prefix(manga_slug, key), job_id)
}

/// Blob key of one page under its version prefix
pub fn page_key(prefix: &str, ordinal: u32, file_name: &str, preserve_filenames: bool) -> String {
    if preserve_filenames {
        return format!("{prefix}/{ordinal:04}_{file_name}");
    }
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "bin".to_string());
    format!("{prefix}/{ordinal:04}.{ext}")
}

pub struct UnitRunner {
    catalog: Arc<dyn Catalog>,
    staging: Arc<StagingStore>,
    transfer: TransferPolicy,
}

impl UnitRunner {
    pub fn new(catalog: Arc<dyn Catalog>, staging: Arc<StagingStore>, transfer: TransferPolicy) -> Self {
        Self {
            catalog,
            staging,
            transfer,
        }
    }

    /// Run one unit unless the job was told to stop. A failure the job does
    /// not tolerate stops the job so no further units start.
    pub async fn run(&self, ctx: &JobContext, planned: &PlannedUnit) -> UnitOutcome {
        let outcome = |result| UnitOutcome {
            index: planned.index,
            folder_name: planned.unit.folder_name.clone(),
            result,
        };

        if ctx.should_stop() {
            debug!(job_id = %ctx.job_id, unit = planned.index, "Stop requested, unit not started");
            return outcome(UnitResult::NotStarted);
        }

        match self.execute(ctx, planned).await {
            Ok((chapter_id, pages)) => outcome(UnitResult::Committed { chapter_id, pages }),
            Err(UnitFailure::Transfer(e)) => {
                if !ctx.continue_on_error {
                    ctx.halt();
                }
                outcome(UnitResult::Failed {
                    message: e.to_string(),
                })
            }
            Err(UnitFailure::Fatal(message)) => {
                error!(job_id = %ctx.job_id, unit = planned.index, %message, "Unit cannot proceed");
                ctx.halt();
                outcome(UnitResult::Fatal { message })
            }
        }
    }

    async fn execute(&self, ctx: &JobContext, planned: &PlannedUnit) -> Result<(String, u64), UnitFailure> {
        let unit = &planned.unit;
        let key = unit.key();
        let manga = ctx.manga.get(&unit.manga_slug).ok_or_else(|| {
            UnitFailure::Fatal(format!("manga '{}' was not prepared", unit.manga_slug))
        })?;

        let existing = self
            .transfer
            .run("find chapter", || self.catalog.find_chapter(&manga.id, key))
            .await?;
        self.check_drift(ctx, planned, existing.as_ref())?;

        let staged = self
            .staging
            .load_unit(&ctx.job_id, planned.index)
            .map_err(|e| UnitFailure::Fatal(e.to_string()))?;

        let prefix = version_prefix(&unit.manga_slug, key, &ctx.job_id);
        let cleared = self
            .transfer
            .run("clear version", || ctx.store.delete_prefix(&prefix))
            .await?;
        if cleared > 0 {
            debug!(job_id = %ctx.job_id, unit = planned.index, cleared, "Cleared pages of an earlier attempt");
        }

        let mut pages = Vec::with_capacity(staged.len());
        for page in staged {
            let blob_key = page_key(&prefix, page.ordinal, &page.file_name, ctx.preserve_filenames);
            let data = Bytes::from(page.data);
            let byte_size = data.len() as u64;
            self.transfer
                .run("store page", || ctx.store.put(&blob_key, data.clone()))
                .await?;
            pages.push(StoredPage {
                ordinal: page.ordinal,
                key: blob_key,
                byte_size,
                content_checksum: page.content_checksum,
            });
        }

        // another job may have committed this chapter while our pages uploaded
        let current = self
            .transfer
            .run("find chapter", || self.catalog.find_chapter(&manga.id, key))
            .await?;
        if let Err(drift) = self.check_drift(ctx, planned, current.as_ref()) {
            self.discard(ctx, &prefix).await;
            return Err(drift);
        }

        let now = Utc::now();
        let record = ChapterRecord {
            id: current
                .as_ref()
                .map(|r| r.id.clone())
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            manga_id: manga.id.clone(),
            manga_slug: unit.manga_slug.clone(),
            chapter_main: key.main,
            chapter_sub: key.sub,
            label: unit.label.clone(),
            folder_name: unit.folder_name.clone(),
            pages,
            storage_target: ctx.storage_target.clone(),
            source_job: ctx.job_id.clone(),
            created_at: current.as_ref().map_or(now, |r| r.created_at),
            updated_at: now,
        };
        let chapter_id = record.id.clone();
        let page_count = record.pages.len() as u64;

        self.transfer
            .run("commit chapter", || self.catalog.put_chapter(record.clone()))
            .await?;

        if let Some(previous) = &current {
            self.retire(ctx, previous, &record).await;
        }

        info!(
            job_id = %ctx.job_id,
            unit = planned.index,
            chapter = %key,
            pages = page_count,
            "Unit committed"
        );
        Ok((chapter_id, page_count))
    }

    /// A chapter planned as `create` must not have been written by another job
    fn check_drift(
        &self,
        ctx: &JobContext,
        planned: &PlannedUnit,
        record: Option<&ChapterRecord>,
    ) -> Result<(), UnitFailure> {
        match record {
            Some(record) if planned.action == UnitAction::Create && record.source_job != ctx.job_id => {
                Err(UnitFailure::Fatal(format!(
                    "chapter {} of '{}' was written by job {} after planning",
                    planned.unit.key(),
                    planned.unit.manga_slug,
                    record.source_job
                )))
            }
            _ => Ok(()),
        }
    }

    /// Drop pages this job uploaded for a unit it will not commit
    async fn discard(&self, ctx: &JobContext, prefix: &str) {
        if let Err(e) = ctx.store.delete_prefix(prefix).await {
            warn!(job_id = %ctx.job_id, prefix, error = %e, "Cannot discard uncommitted pages");
        }
    }

    /// Delete the pages of a replaced version from the target that holds them.
    /// The new record is already committed, so failures only leave orphans.
    async fn retire(&self, ctx: &JobContext, previous: &ChapterRecord, current: &ChapterRecord) {
        let keep: HashSet<&str> = if previous.storage_target == current.storage_target {
            current.pages.iter().map(|p| p.key.as_str()).collect()
        } else {
            HashSet::new()
        };

        let store = match ctx.storage.target(Some(&previous.storage_target)) {
            Ok((_, store)) => store,
            Err(e) => {
                warn!(job_id = %ctx.job_id, target = %previous.storage_target, error = %e, "Replaced pages left in place");
                return;
            }
        };

        let mut removed = 0usize;
        for page in previous.pages.iter().filter(|p| !keep.contains(p.key.as_str())) {
            match self.transfer.run("delete replaced page", || store.delete(&page.key)).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(job_id = %ctx.job_id, key = %page.key, error = %e, "Cannot delete replaced page"),
            }
        }
        if removed > 0 {
            debug!(
                job_id = %ctx.job_id,
                chapter = %current.key(),
                removed,
                target = %previous.storage_target,
                "Deleted pages of replaced version"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FjallCatalog, MangaDraft};
    use crate::config::{Config, StorageProvider, StorageTargetConfig};
    use crate::ingest::model::{ChapterUnit, PageFile, UnitState};
    use crate::staging::PageBlob;
    use tempfile::TempDir;

    fn replace_unit() -> PlannedUnit {
        let pages = (1..=2)
            .map(|ordinal| PageFile {
                ordinal,
                file_name: format!("{ordinal}.jpg"),
                byte_size: 3,
                content_checksum: "sum".to_string(),
            })
            .collect();
        PlannedUnit {
            index: 0,
            unit: ChapterUnit {
                manga_slug: "m".to_string(),
                chapter_main: 1,
                chapter_sub: 0,
                label: None,
                folder_name: "c1".to_string(),
                pages,
            },
            action: UnitAction::Replace,
            state: UnitState::Pending,
            chapter_id: None,
        }
    }

    #[tokio::test]
    async fn test_replaced_pages_are_deleted_from_their_own_target() {
        let temp = TempDir::new().unwrap();
        let catalog = Arc::new(FjallCatalog::open(temp.path().join("catalog")).unwrap());
        let staging = Arc::new(StagingStore::open(temp.path().join("staging")).unwrap());
        let blobs: Vec<PageBlob> = (1..=2)
            .map(|ordinal| PageBlob {
                ordinal,
                file_name: format!("{ordinal}.jpg"),
                content_checksum: "sum".to_string(),
                data: Bytes::from_static(b"new"),
            })
            .collect();
        staging.stage_unit("job-2", 0, &blobs).unwrap();

        let mut config = Config::default();
        config.storage.targets.insert(
            "archive".to_string(),
            StorageTargetConfig {
                provider: StorageProvider::Memory,
                root: None,
                backups: Vec::new(),
            },
        );
        let storage = StorageRegistry::from_config(&config).unwrap();
        let (_, primary) = storage.target(Some("primary")).unwrap();
        let (_, archive) = storage.target(Some("archive")).unwrap();

        let manga = catalog.ensure_manga(&MangaDraft::new("m", "M")).await.unwrap();
        let old_key = "m/chapters/c0001-00/job-1/0001.jpg";
        archive.put(old_key, Bytes::from_static(b"old")).await.unwrap();
        // same key on the job's own target must survive
        primary.put(old_key, Bytes::from_static(b"old")).await.unwrap();
        let now = Utc::now();
        catalog
            .put_chapter(ChapterRecord {
                id: "chapter-1".to_string(),
                manga_id: manga.id.clone(),
                manga_slug: "m".to_string(),
                chapter_main: 1,
                chapter_sub: 0,
                label: None,
                folder_name: "c1".to_string(),
                pages: vec![StoredPage {
                    ordinal: 1,
                    key: old_key.to_string(),
                    byte_size: 3,
                    content_checksum: "sum".to_string(),
                }],
                storage_target: "archive".to_string(),
                source_job: "job-1".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let ctx = JobContext {
            job_id: "job-2".to_string(),
            storage_target: "primary".to_string(),
            store: primary.clone(),
            storage: storage.clone(),
            preserve_filenames: false,
            continue_on_error: false,
            manga: HashMap::from([("m".to_string(), manga.clone())]),
            stop: Arc::new(AtomicBool::new(false)),
        };
        let runner = UnitRunner::new(catalog.clone(), staging, TransferPolicy::default());

        let outcome = runner.run(&ctx, &replace_unit()).await;
        assert_eq!(
            outcome.result,
            UnitResult::Committed {
                chapter_id: "chapter-1".to_string(),
                pages: 2
            }
        );

        assert!(archive.list("m/chapters").await.unwrap().is_empty());
        assert_eq!(
            primary.list("m/chapters/c0001-00").await.unwrap(),
            vec![
                old_key.to_string(),
                "m/chapters/c0001-00/job-2/0001.jpg".to_string(),
                "m/chapters/c0001-00/job-2/0002.jpg".to_string(),
            ]
        );
        let record = catalog
            .find_chapter(&manga.id, ChapterKey::new(1, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.storage_target, "primary");
        assert_eq!(record.source_job, "job-2");
    }

    #[test]
    fn test_chapter_prefix() {
        assert_eq!(chapter_prefix("berserk", ChapterKey::new(12, 5)), "berserk/chapters/c0012-05");
        assert_eq!(chapter_prefix("berserk", ChapterKey::new(1, 0)), "berserk/chapters/c0001-00");
    }

    #[test]
    fn test_version_prefix() {
        assert_eq!(
            version_prefix("berserk", ChapterKey::new(3, 0), "job-7"),
            "berserk/chapters/c0003-00/job-7"
        );
    }

    #[test]
    fn test_page_key() {
        let prefix = "m/chapters/c0001-00";
        assert_eq!(page_key(prefix, 3, "Scan_03.JPG", false), "m/chapters/c0001-00/0003.jpg");
        assert_eq!(page_key(prefix, 3, "Scan_03.JPG", true), "m/chapters/c0001-00/0003_Scan_03.JPG");
        assert_eq!(page_key(prefix, 1, "noext", false), "m/chapters/c0001-00/0001.bin");
    }
}
