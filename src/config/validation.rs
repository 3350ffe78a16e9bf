use super::models::{Config, StorageProvider, StorageTargetConfig};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Active storage target '{0}' is not defined")]
    UnknownActiveTarget(String),

    #[error("Storage target '{target}' references non-existent backup '{backup}'")]
    InvalidBackupReference { target: String, backup: String },

    #[error("Storage backup cycle detected: {path}")]
    BackupCycle { path: String },

    #[error("Local storage target '{0}' has no root directory")]
    MissingLocalRoot(String),

    #[error("Upload limit must be positive: {0}")]
    ZeroLimit(&'static str),

    #[error("Page limit ({page}) exceeds archive limit ({archive})")]
    PageLimitExceedsArchive { page: String, archive: String },

    #[error("No page file extensions allowed")]
    NoAllowedExtensions,

    #[error("Worker setting must be positive: {0}")]
    ZeroWorkers(&'static str),

    #[error("Transfer max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("Invalid thumbnail aspect '{0}', expected W:H")]
    InvalidThumbnailAspect(String),

    #[error("Operator token digest is not 64 hex characters: '{0}'")]
    InvalidTokenDigest(String),

    #[error("Retention TTL must be positive: {field} = {value}")]
    InvalidRetentionTTL { field: String, value: u64 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_storage(config)?;
    validate_upload_limits(config)?;
    validate_workers(config)?;
    validate_thumbnails(config)?;
    validate_auth(config)?;
    validate_retention(config)?;
    Ok(())
}

/// Active target exists, backups resolve, no cycles, local targets have a root
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let targets = &config.storage.targets;

    if !targets.contains_key(&config.storage.active) {
        return Err(ValidationError::UnknownActiveTarget(
            config.storage.active.clone(),
        ));
    }

    for (name, target) in targets {
        if target.provider == StorageProvider::Local && target.root.is_none() {
            return Err(ValidationError::MissingLocalRoot(name.clone()));
        }
        for backup in &target.backups {
            if !targets.contains_key(backup) {
                return Err(ValidationError::InvalidBackupReference {
                    target: name.clone(),
                    backup: backup.clone(),
                });
            }
        }
    }

    for name in targets.keys() {
        detect_cycles(name, targets, &mut HashSet::new(), &mut Vec::new())?;
    }

    Ok(())
}

/// DFS-based cycle detection in backup chains
fn detect_cycles(
    current: &str,
    targets: &HashMap<String, StorageTargetConfig>,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Result<(), ValidationError> {
    if path.iter().any(|seen| seen == current) {
        path.push(current.to_string());
        return Err(ValidationError::BackupCycle {
            path: path.join(" -> "),
        });
    }

    if visited.contains(current) {
        return Ok(());
    }

    visited.insert(current.to_string());
    path.push(current.to_string());

    if let Some(target) = targets.get(current) {
        for backup in &target.backups {
            detect_cycles(backup, targets, visited, path)?;
        }
    }

    path.pop();
    Ok(())
}

fn validate_upload_limits(config: &Config) -> Result<(), ValidationError> {
    let upload = &config.upload;

    if upload.max_archive_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroLimit("max_archive_bytes"));
    }
    if upload.max_page_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroLimit("max_page_bytes"));
    }
    if upload.max_chapters_per_job == 0 {
        return Err(ValidationError::ZeroLimit("max_chapters_per_job"));
    }
    if upload.max_page_bytes > upload.max_archive_bytes {
        return Err(ValidationError::PageLimitExceedsArchive {
            page: upload.max_page_bytes.to_string(),
            archive: upload.max_archive_bytes.to_string(),
        });
    }
    if upload
        .allowed_extensions
        .iter()
        .all(|ext| ext.trim().is_empty())
    {
        return Err(ValidationError::NoAllowedExtensions);
    }

    Ok(())
}

fn validate_workers(config: &Config) -> Result<(), ValidationError> {
    if config.workers.pool_size == 0 {
        return Err(ValidationError::ZeroWorkers("pool_size"));
    }
    if config.workers.channel_size == 0 {
        return Err(ValidationError::ZeroWorkers("channel_size"));
    }
    if config.workers.storage_concurrency == 0 {
        return Err(ValidationError::ZeroWorkers("storage_concurrency"));
    }
    if config.server.max_concurrent_requests == 0 {
        return Err(ValidationError::ZeroWorkers("max_concurrent_requests"));
    }
    if config.transfer.max_attempts == 0 {
        return Err(ValidationError::ZeroAttempts);
    }
    Ok(())
}

fn validate_thumbnails(config: &Config) -> Result<(), ValidationError> {
    let aspect = &config.thumbnails.aspect;
    let valid = match aspect.split_once(':') {
        Some((w, h)) => matches!(
            (w.trim().parse::<u32>(), h.trim().parse::<u32>()),
            (Ok(w), Ok(h)) if w > 0 && h > 0
        ),
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidThumbnailAspect(aspect.clone()));
    }
    Ok(())
}

fn validate_auth(config: &Config) -> Result<(), ValidationError> {
    for digest in &config.auth.operator_token_sha256 {
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidTokenDigest(digest.clone()));
        }
    }
    Ok(())
}

/// Validate retention configuration
fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.job_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "job_ttl_days".to_string(),
            value: 0,
        });
    }

    if config.retention.prune_interval_secs == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "prune_interval_secs".to_string(),
            value: 0,
        });
    }

    Ok(())
}
