use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::Result;
use super::{Catalog, ChapterKey, ChapterRecord, MangaDraft, MangaRecord};

fn encode_manga_key(slug: &str) -> Vec<u8> {
    format!("manga:{}", slug).into_bytes()
}

fn encode_chapter_key(manga_id: &str, key: ChapterKey) -> Vec<u8> {
    format!("chapter:{}:{:010}:{:010}", manga_id, key.main, key.sub).into_bytes()
}

/// Fjall-backed catalog
pub struct FjallCatalog {
    keyspace: Keyspace,
    manga: PartitionHandle,
    chapters: PartitionHandle,
    /// Serializes find-or-create of manga records
    create_lock: Mutex<()>,
}

impl FjallCatalog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening catalog at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let manga = keyspace.open_partition("manga", PartitionCreateOptions::default())?;
        let chapters = keyspace.open_partition("chapters", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            manga,
            chapters,
            create_lock: Mutex::new(()),
        })
    }

    fn read_manga(&self, slug: &str) -> Result<Option<MangaRecord>> {
        match self.manga.get(encode_manga_key(slug))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for FjallCatalog {
    async fn find_manga(&self, slug: &str) -> Result<Option<MangaRecord>> {
        self.read_manga(slug)
    }

    async fn ensure_manga(&self, draft: &MangaDraft) -> Result<MangaRecord> {
        let _guard = self
            .create_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = self.read_manga(&draft.slug)? {
            return Ok(existing);
        }

        let record = MangaRecord {
            id: Uuid::now_v7().to_string(),
            slug: draft.slug.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            type_hint: draft.type_hint.clone(),
            status: draft.status.clone(),
            created_at: Utc::now(),
        };
        self.manga
            .insert(encode_manga_key(&record.slug), serde_json::to_vec(&record)?)?;
        self.persist()?;

        info!(slug = %record.slug, manga_id = %record.id, "Created manga");
        Ok(record)
    }

    async fn find_chapter(&self, manga_id: &str, key: ChapterKey) -> Result<Option<ChapterRecord>> {
        match self.chapters.get(encode_chapter_key(manga_id, key))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn put_chapter(&self, record: ChapterRecord) -> Result<()> {
        let key = encode_chapter_key(&record.manga_id, record.key());
        self.chapters.insert(key, serde_json::to_vec(&record)?)?;
        self.persist()?;
        debug!(
            manga = %record.manga_slug,
            chapter = %record.key(),
            pages = record.pages.len(),
            "Stored chapter record"
        );
        Ok(())
    }
}
