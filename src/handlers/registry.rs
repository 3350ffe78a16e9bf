use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::builtin::{BulkHandler, ChapterHandler, MetadataHandler, MultiTitleHandler, SmartHandler};
use super::traits::SubmissionHandler;
use crate::ingest::model::SubmissionKind;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no handler registered for {0} submissions")]
    NotFound(SubmissionKind),
}

/// Maps submission shapes to handler instances
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn SubmissionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register `handler` for the kind it reports, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn SubmissionHandler>) {
        self.handlers.insert(handler.kind().as_str(), handler);
    }

    pub fn get(&self, kind: SubmissionKind) -> Result<Arc<dyn SubmissionHandler>, RegistryError> {
        self.handlers
            .get(kind.as_str())
            .cloned()
            .ok_or(RegistryError::NotFound(kind))
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Registry with the built-in handler for every submission shape
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ChapterHandler));
        registry.register(Arc::new(BulkHandler));
        registry.register(Arc::new(MetadataHandler));
        registry.register(Arc::new(MultiTitleHandler));
        registry.register(Arc::new(SmartHandler));
        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_kind() {
        let registry = HandlerRegistry::with_defaults();
        for kind in [
            SubmissionKind::Chapter,
            SubmissionKind::Bulk,
            SubmissionKind::Metadata,
            SubmissionKind::Multi,
            SubmissionKind::Smart,
        ] {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
        assert_eq!(registry.kinds().len(), 5);
    }

    #[test]
    fn test_empty_registry() {
        let registry = HandlerRegistry::new();
        assert!(registry.kinds().is_empty());
        assert!(matches!(
            registry.get(SubmissionKind::Smart),
            Err(RegistryError::NotFound(SubmissionKind::Smart))
        ));
    }
}
