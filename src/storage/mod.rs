//! Page blob storage
//!
//! Pages go to named storage targets backed by `object_store`. Every target is
//! wrapped in a [`GatedStore`] that shares one semaphore across all jobs, so the
//! number of storage operations in flight stays bounded no matter how many jobs
//! run or how wide their worker pools are.

use crate::config::{Config, ConfigError, StorageProvider, StorageTargetConfig};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unknown storage target: {0}")]
    UnknownTarget(String),

    #[error("Storage gate closed")]
    GateClosed,

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Minimal blob interface the unit runner needs
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Remove one key; a key that is already gone is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// All keys under `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every key under `prefix`; returns how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub target: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, target: impl Into<String>) -> Self {
        Self {
            store,
            target: target.into(),
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    pub fn from_target(name: &str, config: &StorageTargetConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::new(Arc::new(InMemory::new()), name)),
            StorageProvider::Local => {
                let root = config.root.as_ref().ok_or_else(|| {
                    StorageError::Config(format!("local target '{name}' has no root"))
                })?;
                std::fs::create_dir_all(root)?;
                let store = LocalFileSystem::new_with_prefix(root)?;
                tracing::info!(target_name = name, root = %root.display(), "Opened local page storage");
                Ok(Self::new(Arc::new(store), name))
            }
        }
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = StoragePath::from(key);
        let size = data.len();

        self.store.put(&path, data.into()).await?;

        tracing::debug!(key, size, target_name = %self.target, "Stored page");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.store.delete(&StoragePath::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![StoragePath::from(prefix)];

        while let Some(dir) = pending.pop() {
            let listing = self.store.list_with_delimiter(Some(&dir)).await?;
            keys.extend(listing.objects.into_iter().map(|meta| meta.location.to_string()));
            pending.extend(listing.common_prefixes);
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let keys = self.list(prefix).await?;

        for key in &keys {
            self.delete(key).await?;
        }

        if !keys.is_empty() {
            tracing::debug!(prefix, removed = keys.len(), target_name = %self.target, "Deleted prefix");
        }
        Ok(keys.len())
    }
}

/// Blob store behind a shared concurrency gate
#[derive(Clone)]
pub struct GatedStore {
    inner: Arc<dyn BlobStore>,
    gate: Arc<Semaphore>,
}

impl GatedStore {
    pub fn new(inner: Arc<dyn BlobStore>, gate: Arc<Semaphore>) -> Self {
        Self { inner, gate }
    }
}

#[async_trait]
impl BlobStore for GatedStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let _permit = self.gate.acquire().await.map_err(|_| StorageError::GateClosed)?;
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _permit = self.gate.acquire().await.map_err(|_| StorageError::GateClosed)?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let _permit = self.gate.acquire().await.map_err(|_| StorageError::GateClosed)?;
        self.inner.list(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let _permit = self.gate.acquire().await.map_err(|_| StorageError::GateClosed)?;
        self.inner.delete_prefix(prefix).await
    }
}

/// Named storage targets sharing one gate
#[derive(Clone)]
pub struct StorageRegistry {
    targets: HashMap<String, Arc<dyn BlobStore>>,
    active: String,
    backups: Vec<String>,
    gate: Arc<Semaphore>,
}

impl StorageRegistry {
    /// Open every configured target
    pub fn from_config(config: &Config) -> Result<Self> {
        let resolved = config
            .active_target()
            .map_err(|e: ConfigError| StorageError::Config(e.to_string()))?;

        let gate = Arc::new(Semaphore::new(config.workers.storage_concurrency));
        let mut targets: HashMap<String, Arc<dyn BlobStore>> = HashMap::new();
        for (name, target) in &config.storage.targets {
            let client: Arc<dyn BlobStore> = Arc::new(StorageClient::from_target(name, target)?);
            targets.insert(name.clone(), Arc::new(GatedStore::new(client, gate.clone())));
        }

        tracing::info!(
            active = %resolved.name,
            backups = ?resolved.backups,
            concurrency = config.workers.storage_concurrency,
            "Storage targets ready"
        );

        Ok(Self {
            targets,
            active: resolved.name,
            backups: resolved.backups,
            gate,
        })
    }

    /// One target named `name` wrapping `store`
    pub fn single(name: &str, store: Arc<dyn BlobStore>, concurrency: usize) -> Self {
        let gate = Arc::new(Semaphore::new(concurrency));
        let gated: Arc<dyn BlobStore> = Arc::new(GatedStore::new(store, gate.clone()));
        Self {
            targets: HashMap::from([(name.to_string(), gated)]),
            active: name.to_string(),
            backups: Vec::new(),
            gate,
        }
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn backups(&self) -> &[String] {
        &self.backups
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Resolve a requested target name, falling back to the active target
    pub fn target(&self, name: Option<&str>) -> Result<(String, Arc<dyn BlobStore>)> {
        let name = name.unwrap_or(&self.active);
        self.targets
            .get(name)
            .map(|store| (name.to_string(), store.clone()))
            .ok_or_else(|| StorageError::UnknownTarget(name.to_string()))
    }

    /// Permits currently free on the shared gate
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }
}
