//! Conflict resolution
//!
//! [`resolve`] is pure: the coordinator loads a [`CatalogSnapshot`] for exactly
//! the manga and chapter keys a plan touches, then decides one action per unit.

use super::model::{ChapterPolicy, Conflict, ConflictPolicy, MangaPolicy, UnitAction};
use crate::catalog::{self, Catalog, ChapterKey};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct MangaState {
    chapters: HashSet<ChapterKey>,
}

/// Existing catalog entries relevant to one plan
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    manga: HashMap<String, MangaState>,
}

impl CatalogSnapshot {
    /// Query the catalog for each manga and each chapter key in `items`
    pub async fn load(catalog: &dyn Catalog, items: &[(String, ChapterKey)]) -> catalog::Result<Self> {
        let mut snapshot = Self::default();
        let mut missing: HashSet<&str> = HashSet::new();
        let mut ids: HashMap<&str, String> = HashMap::new();

        for (slug, key) in items {
            if missing.contains(slug.as_str()) {
                continue;
            }
            let manga_id = match ids.get(slug.as_str()) {
                Some(id) => id.clone(),
                None => match catalog.find_manga(slug).await? {
                    Some(record) => {
                        snapshot.manga.entry(slug.clone()).or_default();
                        ids.insert(slug.as_str(), record.id.clone());
                        record.id
                    }
                    None => {
                        missing.insert(slug.as_str());
                        continue;
                    }
                },
            };

            if catalog.find_chapter(&manga_id, *key).await?.is_some() {
                snapshot
                    .manga
                    .entry(slug.clone())
                    .or_default()
                    .chapters
                    .insert(*key);
            }
        }
        Ok(snapshot)
    }

    pub fn with_manga(mut self, slug: &str, chapters: impl IntoIterator<Item = ChapterKey>) -> Self {
        self.manga
            .entry(slug.to_string())
            .or_default()
            .chapters
            .extend(chapters);
        self
    }

    pub fn manga_exists(&self, slug: &str) -> bool {
        self.manga.contains_key(slug)
    }

    pub fn chapter_exists(&self, slug: &str, key: ChapterKey) -> bool {
        self.manga
            .get(slug)
            .is_some_and(|state| state.chapters.contains(&key))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// One action per input item, same order
    pub actions: Vec<UnitAction>,
    pub conflicts: Vec<Conflict>,
    /// An `error` policy was hit; nothing may execute
    pub blocking: bool,
}

/// Decide an action per `(manga_slug, chapter)` item
pub fn resolve(
    items: &[(String, ChapterKey)],
    snapshot: &CatalogSnapshot,
    policy: ConflictPolicy,
) -> Resolution {
    let mut resolution = Resolution::default();
    let mut reported: HashSet<&str> = HashSet::new();

    for (slug, key) in items {
        let manga_exists = snapshot.manga_exists(slug);

        if manga_exists && reported.insert(slug.as_str()) {
            let label = policy.manga.map_or("attach", |p| p.as_str());
            resolution.conflicts.push(Conflict {
                manga_slug: slug.clone(),
                chapter: None,
                policy: label.to_string(),
            });
            if policy.manga == Some(MangaPolicy::Error) {
                resolution.blocking = true;
            }
        }

        if manga_exists && policy.manga.is_some() {
            // skip or error at manga level decides every chapter
            resolution.actions.push(UnitAction::Skip);
            continue;
        }

        let action = if snapshot.chapter_exists(slug, *key) {
            resolution.conflicts.push(Conflict {
                manga_slug: slug.clone(),
                chapter: Some(*key),
                policy: policy.chapter.as_str().to_string(),
            });
            match policy.chapter {
                ChapterPolicy::Skip => UnitAction::Skip,
                ChapterPolicy::Overwrite => UnitAction::Replace,
                ChapterPolicy::Error => {
                    resolution.blocking = true;
                    UnitAction::Skip
                }
            }
        } else {
            UnitAction::Create
        };
        resolution.actions.push(action);
    }

    resolution
}
