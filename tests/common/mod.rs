//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};
use zip::write::SimpleFileOptions;

use mangabox::auth::Credential;
use mangabox::catalog::{
    Catalog, CatalogError, ChapterKey, ChapterRecord, FjallCatalog, MangaDraft, MangaRecord,
};
use mangabox::config::{Config, TransferConfig};
use mangabox::ingest::UploadCoordinator;
use mangabox::ledger::JobLedger;
use mangabox::staging::StagingStore;
use mangabox::storage::{BlobStore, StorageClient, StorageError, StorageRegistry};

pub const OPERATOR_TOKEN: &str = "test-operator-token";

pub fn operator() -> Credential {
    Credential::bearer(OPERATOR_TOKEN)
}

/// Build a zip archive from `(path, bytes)` entries
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, data) in entries {
        writer
            .start_file(*path, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    Bytes::from(writer.finish().expect("finish zip").into_inner())
}

/// Archive with one folder per `(folder, page count)` and pages `1.jpg..n.jpg`
pub fn chapter_archive(chapters: &[(&str, usize)]) -> Bytes {
    let mut paths = Vec::new();
    for (folder, pages) in chapters {
        for page in 1..=*pages {
            paths.push((format!("{folder}/{page}.jpg"), format!("{folder}-page-{page}").into_bytes()));
        }
    }
    let entries: Vec<(&str, &[u8])> = paths.iter().map(|(p, d)| (p.as_str(), d.as_slice())).collect();
    zip_archive(&entries)
}

/// Catalog that fails every call
pub struct UnreachableCatalog;

#[async_trait]
impl Catalog for UnreachableCatalog {
    async fn find_manga(&self, _slug: &str) -> mangabox::catalog::Result<Option<MangaRecord>> {
        Err(CatalogError::Unavailable("unreachable".into()))
    }

    async fn ensure_manga(&self, _draft: &MangaDraft) -> mangabox::catalog::Result<MangaRecord> {
        Err(CatalogError::Unavailable("unreachable".into()))
    }

    async fn find_chapter(
        &self,
        _manga_id: &str,
        _key: ChapterKey,
    ) -> mangabox::catalog::Result<Option<ChapterRecord>> {
        Err(CatalogError::Unavailable("unreachable".into()))
    }

    async fn put_chapter(&self, _record: ChapterRecord) -> mangabox::catalog::Result<()> {
        Err(CatalogError::Unavailable("unreachable".into()))
    }
}

/// Fjall catalog that counts writes
pub struct CountingCatalog {
    inner: FjallCatalog,
    pub manga_writes: AtomicUsize,
    pub chapter_writes: AtomicUsize,
}

impl CountingCatalog {
    pub fn new(inner: FjallCatalog) -> Self {
        Self {
            inner,
            manga_writes: AtomicUsize::new(0),
            chapter_writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.manga_writes.load(Ordering::SeqCst) + self.chapter_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for CountingCatalog {
    async fn find_manga(&self, slug: &str) -> mangabox::catalog::Result<Option<MangaRecord>> {
        self.inner.find_manga(slug).await
    }

    async fn ensure_manga(&self, draft: &MangaDraft) -> mangabox::catalog::Result<MangaRecord> {
        if let Some(existing) = self.inner.find_manga(&draft.slug).await? {
            return Ok(existing);
        }
        self.manga_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.ensure_manga(draft).await
    }

    async fn find_chapter(
        &self,
        manga_id: &str,
        key: ChapterKey,
    ) -> mangabox::catalog::Result<Option<ChapterRecord>> {
        self.inner.find_chapter(manga_id, key).await
    }

    async fn put_chapter(&self, record: ChapterRecord) -> mangabox::catalog::Result<()> {
        self.chapter_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_chapter(record).await
    }
}

/// In-memory store that can be told to fail puts under a key prefix, or to
/// park every put until released
pub struct FlakyStore {
    inner: StorageClient,
    failing_prefix: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    blocked: Notify,
    pub puts: AtomicUsize,
    pub put_keys: Mutex<Vec<String>>,
    pub broken: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: StorageClient::in_memory(),
            failing_prefix: Mutex::new(None),
            gate: Mutex::new(None),
            blocked: Notify::new(),
            puts: AtomicUsize::new(0),
            put_keys: Mutex::new(Vec::new()),
            broken: AtomicBool::new(false),
        }
    }

    pub fn fail_under(&self, prefix: &str) {
        *self.failing_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        *self.failing_prefix.lock().unwrap() = None;
        self.broken.store(false, Ordering::SeqCst);
    }

    /// Park every put until `release`
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let parked and future puts through
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.close();
        }
    }

    /// Resolves once a put is parked on the gate
    pub async fn wait_blocked(&self) {
        self.blocked.notified().await;
    }

    pub fn successful_puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Keys stored so far, in write order
    pub fn written(&self) -> Vec<String> {
        self.put_keys.lock().unwrap().clone()
    }

    fn should_fail(&self, key: &str) -> bool {
        if self.broken.load(Ordering::SeqCst) {
            return true;
        }
        self.failing_prefix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix))
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put(&self, key: &str, data: Bytes) -> mangabox::storage::Result<()> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.blocked.notify_one();
            // closed on release
            let _ = gate.acquire().await;
        }
        if self.should_fail(key) {
            return Err(StorageError::Config(format!("injected failure for {key}")));
        }
        self.inner.put(key, data).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.put_keys.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> mangabox::storage::Result<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> mangabox::storage::Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> mangabox::storage::Result<usize> {
        self.inner.delete_prefix(prefix).await
    }
}

/// Config with fast transfers and a known operator token
pub fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.server.ledger_path = temp.path().join("ledger");
    config.server.staging_path = temp.path().join("staging");
    config.server.catalog_path = temp.path().join("catalog");
    config.auth.operator_token = Some(OPERATOR_TOKEN.to_string());
    config.transfer = TransferConfig {
        timeout_ms: 2_000,
        max_attempts: 2,
        backoff_ms: 1,
    };
    config.workers.pool_size = 3;
    config.workers.channel_size = 2;
    config
}

/// A coordinator over a counting catalog and a flaky store
pub struct Harness {
    pub coordinator: UploadCoordinator,
    pub catalog: Arc<CountingCatalog>,
    pub store: Arc<FlakyStore>,
    pub temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let mut config = test_config(&temp);
        adjust(&mut config);

        let catalog = Arc::new(CountingCatalog::new(
            FjallCatalog::open(&config.server.catalog_path).expect("open catalog"),
        ));
        let store = Arc::new(FlakyStore::new());
        let coordinator = build_coordinator(config, catalog.clone(), store.clone());

        Self {
            coordinator,
            catalog,
            store,
            temp,
        }
    }
}

pub fn build_coordinator(config: Config, catalog: Arc<dyn Catalog>, store: Arc<dyn BlobStore>) -> UploadCoordinator {
    let ledger = JobLedger::open(&config.server.ledger_path).expect("open ledger");
    let staging = Arc::new(StagingStore::open(&config.server.staging_path).expect("open staging"));
    let storage = StorageRegistry::single("primary", store, config.workers.storage_concurrency);

    UploadCoordinator::builder()
        .config(config)
        .catalog(catalog)
        .ledger(ledger)
        .staging(staging)
        .storage(storage)
        .build()
}
