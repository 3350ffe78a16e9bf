//! Configuration management for mangabox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use mangabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `MANGABOX__<section>__<key>`
//!
//! Examples:
//! - `MANGABOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `MANGABOX__UPLOAD__MAX_PAGE_BYTES=10MB`
//! - `MANGABOX__STORAGE__ACTIVE=disk`
//!
//! The operator token is read from `MANGABOX_OPERATOR_TOKEN` only.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/mangabox.toml`.
//! This can be overridden using the `MANGABOX_CONFIG` environment variable.

mod models;
mod resolver;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    AuthConfig, Config, FeatureFlags, ResolvedTarget, RetentionConfig, ServerConfig,
    StorageConfig, StorageProvider, StorageTargetConfig, ThumbnailPolicy, TransferConfig,
    UploadLimits, WorkerConfig,
};
pub use resolver::{BackupGraph, ResolverError};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Storage target resolution failed: {0}")]
    ResolverError(#[from] ResolverError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (backup cycles, unknown targets, zero limits)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Check an already assembled configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }

    pub fn backup_graph(&self) -> BackupGraph<'_> {
        BackupGraph::new(&self.storage)
    }

    /// Active storage target with its flattened backups
    pub fn active_target(&self) -> Result<ResolvedTarget, ConfigError> {
        Ok(self.backup_graph().resolve(&self.storage.active)?)
    }
}
