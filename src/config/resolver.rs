use super::models::{ResolvedTarget, StorageConfig, StorageTargetConfig};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Storage target '{0}' not found")]
    TargetNotFound(String),

    #[error("Cycle detected in storage backup chain: {0}")]
    CycleDetected(String),
}

/// Backup graph over the configured storage targets
pub struct BackupGraph<'a> {
    targets: &'a HashMap<String, StorageTargetConfig>,
}

impl<'a> BackupGraph<'a> {
    pub fn new(config: &'a StorageConfig) -> Self {
        Self {
            targets: &config.targets,
        }
    }

    /// Flatten the backup chain of `name` depth-first.
    /// A target shared by two branches is listed once, at its first position.
    pub fn resolve(&self, name: &str) -> Result<ResolvedTarget, ResolverError> {
        if !self.targets.contains_key(name) {
            return Err(ResolverError::TargetNotFound(name.to_string()));
        }

        let mut path = Vec::new();
        let mut backups = Vec::new();
        self.resolve_recursive(name, &mut path, &mut backups)?;

        Ok(ResolvedTarget {
            name: name.to_string(),
            backups,
        })
    }

    fn resolve_recursive(
        &self,
        current: &str,
        path: &mut Vec<String>,
        backups: &mut Vec<String>,
    ) -> Result<(), ResolverError> {
        if path.iter().any(|seen| seen == current) {
            path.push(current.to_string());
            return Err(ResolverError::CycleDetected(path.join(" -> ")));
        }

        let target = self
            .targets
            .get(current)
            .ok_or_else(|| ResolverError::TargetNotFound(current.to_string()))?;

        path.push(current.to_string());
        for backup in &target.backups {
            if !backups.contains(backup) && Some(backup.as_str()) != path.first().map(String::as_str) {
                backups.push(backup.clone());
            }
            self.resolve_recursive(backup, path, backups)?;
        }
        path.pop();

        Ok(())
    }

    /// Resolve every configured target
    pub fn resolve_all(&self) -> Result<HashMap<String, ResolvedTarget>, ResolverError> {
        let mut resolved = HashMap::new();

        for name in self.targets.keys() {
            resolved.insert(name.clone(), self.resolve(name)?);
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::super::models::*;
    use super::*;

    fn target(backups: &[&str]) -> StorageTargetConfig {
        StorageTargetConfig {
            provider: StorageProvider::Memory,
            root: None,
            backups: backups.iter().map(|b| b.to_string()).collect(),
        }
    }

    fn storage(targets: &[(&str, &[&str])]) -> StorageConfig {
        StorageConfig {
            active: targets[0].0.to_string(),
            targets: targets
                .iter()
                .map(|(name, backups)| (name.to_string(), target(backups)))
                .collect(),
        }
    }

    #[test]
    fn test_resolve_without_backups() {
        let config = storage(&[("primary", &[])]);
        let resolved = BackupGraph::new(&config).resolve("primary").unwrap();

        assert_eq!(resolved.name, "primary");
        assert!(resolved.backups.is_empty());
    }

    #[test]
    fn test_resolve_chain_in_order() {
        let config = storage(&[
            ("primary", &["mirror"]),
            ("mirror", &["cold"]),
            ("cold", &[]),
        ]);
        let resolved = BackupGraph::new(&config).resolve("primary").unwrap();

        assert_eq!(resolved.backups, vec!["mirror", "cold"]);
    }

    #[test]
    fn test_shared_backup_listed_once() {
        let config = storage(&[
            ("primary", &["a", "b"]),
            ("a", &["cold"]),
            ("b", &["cold"]),
            ("cold", &[]),
        ]);
        let resolved = BackupGraph::new(&config).resolve("primary").unwrap();

        assert_eq!(resolved.backups, vec!["a", "cold", "b"]);
    }

    #[test]
    fn test_cycle_detected() {
        let config = storage(&[("primary", &["mirror"]), ("mirror", &["primary"])]);
        let result = BackupGraph::new(&config).resolve("primary");

        assert!(matches!(result, Err(ResolverError::CycleDetected(_))));
    }

    #[test]
    fn test_unknown_target() {
        let config = storage(&[("primary", &[])]);
        let result = BackupGraph::new(&config).resolve("nonexistent");

        assert!(matches!(result, Err(ResolverError::TargetNotFound(_))));
    }

    #[test]
    fn test_resolve_all() {
        let config = storage(&[("primary", &["mirror"]), ("mirror", &[])]);
        let resolved = BackupGraph::new(&config).resolve_all().unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved["primary"].backups, vec!["mirror"]);
        assert!(resolved["mirror"].backups.is_empty());
    }
}
