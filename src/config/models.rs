use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadLimits,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailPolicy,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_staging_path")]
    pub staging_path: PathBuf,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Upper bound on requests served concurrently by the HTTP layer
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            ledger_path: default_ledger_path(),
            staging_path: default_staging_path(),
            catalog_path: default_catalog_path(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

fn default_staging_path() -> PathBuf {
    PathBuf::from("data/staging")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/catalog")
}

fn default_max_concurrent_requests() -> usize {
    64
}

/// Size and content limits applied to every submission
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: ByteSize,
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: ByteSize,
    #[serde(default = "default_max_chapters_per_job")]
    pub max_chapters_per_job: usize,
    /// Lowercase file extensions accepted as pages
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: default_max_archive_bytes(),
            max_page_bytes: default_max_page_bytes(),
            max_chapters_per_job: default_max_chapters_per_job(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl UploadLimits {
    pub fn allows_extension(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }
}

fn default_max_archive_bytes() -> ByteSize {
    ByteSize::mib(1024)
}

fn default_max_page_bytes() -> ByteSize {
    ByteSize::mib(20)
}

fn default_max_chapters_per_job() -> usize {
    2000
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "gif", "avif"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
    Local,
}

/// One named page storage target
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageTargetConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Filesystem root for `local` targets
    pub root: Option<PathBuf>,
    /// Names of targets that mirror this one (reported by the health query)
    #[serde(default)]
    pub backups: Vec<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_active_target")]
    pub active: String,
    #[serde(default = "default_targets")]
    pub targets: HashMap<String, StorageTargetConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            active: default_active_target(),
            targets: default_targets(),
        }
    }
}

fn default_active_target() -> String {
    "primary".to_string()
}

fn default_targets() -> HashMap<String, StorageTargetConfig> {
    HashMap::from([(
        default_active_target(),
        StorageTargetConfig {
            provider: StorageProvider::Memory,
            root: None,
            backups: Vec::new(),
        },
    )])
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Workers per job when a submission asks for parallel execution
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    /// Storage operations in flight across all jobs
    #[serde(default = "default_storage_concurrency")]
    pub storage_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            channel_size: default_channel_size(),
            storage_concurrency: default_storage_concurrency(),
        }
    }
}

fn default_pool_size() -> usize {
    4
}

fn default_channel_size() -> usize {
    2
}

fn default_storage_concurrency() -> usize {
    16
}

/// Per page-transfer timeout and retry budget
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl TransferConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

/// Thumbnail metadata policy; thumbnails themselves are produced elsewhere
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThumbnailPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_thumbnail_width")]
    pub width: u32,
    #[serde(default = "default_thumbnail_height")]
    pub height: u32,
    /// Aspect ratio as `W:H`
    #[serde(default = "default_thumbnail_aspect")]
    pub aspect: String,
}

impl Default for ThumbnailPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            width: default_thumbnail_width(),
            height: default_thumbnail_height(),
            aspect: default_thumbnail_aspect(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_thumbnail_width() -> u32 {
    300
}

fn default_thumbnail_height() -> u32 {
    450
}

fn default_thumbnail_aspect() -> String {
    "2:3".to_string()
}

/// Feature switches exposed through the health query
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub smart_import: bool,
    #[serde(default = "default_true")]
    pub multi_title: bool,
    #[serde(default = "default_true")]
    pub parallel_execution: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            smart_import: true,
            multi_title: true,
            parallel_execution: true,
        }
    }
}

/// Operator credential verification
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    /// Hex SHA-256 digests of accepted operator bearer tokens
    #[serde(default)]
    pub operator_token_sha256: Vec<String>,
    /// Plaintext token from `MANGABOX_OPERATOR_TOKEN` (never read from files)
    #[serde(skip)]
    pub operator_token: Option<String>,
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_job_ttl_days")]
    pub job_ttl_days: u32,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_ttl_days: default_job_ttl_days(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

fn default_job_ttl_days() -> u32 {
    14
}

fn default_prune_interval_secs() -> u64 {
    3600
}

/// Storage target with its backup chain flattened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub name: String,
    /// Backup target names in fallback order, without the target itself
    pub backups: Vec<String>,
}
