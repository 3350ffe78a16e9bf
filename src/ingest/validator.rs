//! Metadata document validation
//!
//! Offline checks never touch the catalog. Cross-checking against existing
//! entries is a separate, explicit step.

use super::archive::FolderRequest;
use super::conflict::{CatalogSnapshot, resolve};
use super::error::{Result, UploadError};
use super::model::{ConflictPolicy, ValidationReport};
use crate::catalog::{Catalog, ChapterKey, MangaDraft};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug regex"));

static FOLDER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 ._\-()\[\]]*$").expect("folder token regex")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDescriptor {
    pub chapter_main: i64,
    #[serde(default)]
    pub chapter_sub: Option<i64>,
    #[serde(default)]
    pub label: Option<String>,
    pub folder_name: String,
}

/// One manga and the chapters an archive provides for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub manga_slug: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub type_hint: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Directory holding this title's chapter folders (multi-title archives)
    #[serde(default)]
    pub title_folder: Option<String>,
    pub chapters: Vec<ChapterDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTitleDocument {
    pub titles: Vec<MetadataDocument>,
}

pub fn parse_metadata(raw: &[u8]) -> Result<MetadataDocument> {
    serde_json::from_slice(raw).map_err(|e| UploadError::schema(format!("metadata: {e}")))
}

pub fn parse_multi(raw: &[u8]) -> Result<MultiTitleDocument> {
    serde_json::from_slice(raw).map_err(|e| UploadError::schema(format!("config: {e}")))
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG.is_match(slug)
}

/// A path token usable as one directory name inside an archive
pub fn is_safe_folder(name: &str) -> bool {
    FOLDER_TOKEN.is_match(name) && !name.contains("..")
}

/// A chapter number within `min..=u32::MAX`
fn chapter_number(value: i64, min: i64, field: &str) -> std::result::Result<u32, String> {
    if value < min {
        return Err(format!("{field} must be >= {min}"));
    }
    u32::try_from(value).map_err(|_| format!("{field} must be <= {}", u32::MAX))
}

fn descriptor_key(descriptor: &ChapterDescriptor) -> std::result::Result<ChapterKey, String> {
    let main = chapter_number(descriptor.chapter_main, 1, "chapter_main")?;
    let sub = chapter_number(descriptor.chapter_sub.unwrap_or(0), 0, "chapter_sub")?;
    Ok(ChapterKey::new(main, sub))
}

impl MetadataDocument {
    pub fn draft(&self) -> MangaDraft {
        MangaDraft {
            slug: self.manga_slug.clone(),
            title: self.title.clone().unwrap_or_else(|| self.manga_slug.clone()),
            description: self.description.clone(),
            type_hint: self.type_hint.clone(),
            status: self.status.clone(),
        }
    }

    /// Chapter keys of every well-formed descriptor
    pub fn keys(&self) -> Vec<ChapterKey> {
        self.chapters.iter().filter_map(|d| descriptor_key(d).ok()).collect()
    }

    /// Folder requests for the archive decoder. Fails on the first descriptor
    /// without a usable chapter number, so no declared chapter is dropped.
    pub fn folder_requests(&self) -> std::result::Result<Vec<FolderRequest>, String> {
        self.chapters
            .iter()
            .enumerate()
            .map(|(position, descriptor)| -> std::result::Result<FolderRequest, String> {
                let key = descriptor_key(descriptor)
                    .map_err(|problem| format!("{}: chapters[{position}]: {problem}", self.manga_slug))?;
                Ok(FolderRequest {
                    manga_slug: self.manga_slug.clone(),
                    key,
                    label: descriptor.label.clone(),
                    folder_name: descriptor.folder_name.clone(),
                    title_folder: self.title_folder.clone(),
                })
            })
            .collect()
    }

    /// Offline validation
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let slug = &self.manga_slug;

        if !is_valid_slug(slug) {
            report.error(format!(
                "manga_slug '{slug}' must be lowercase letters, digits and single hyphens"
            ));
        }
        if let Some(folder) = &self.title_folder {
            if !is_safe_folder(folder) {
                report.error(format!("{slug}: title_folder '{folder}' is not a safe path token"));
            }
        }
        if self.chapters.is_empty() {
            report.error(format!("{slug}: no chapters declared"));
        }

        let mut keys: HashSet<ChapterKey> = HashSet::new();
        let mut folders: HashSet<&str> = HashSet::new();
        let mut previous: Option<ChapterKey> = None;
        let mut out_of_order = false;

        for (position, descriptor) in self.chapters.iter().enumerate() {
            let at = format!("{slug}: chapters[{position}]");

            if let Err(problem) = chapter_number(descriptor.chapter_main, 1, "chapter_main") {
                report.error(format!("{at}: {problem}"));
            }
            if let Some(Err(problem)) = descriptor.chapter_sub.map(|sub| chapter_number(sub, 0, "chapter_sub")) {
                report.error(format!("{at}: {problem}"));
            }
            if !is_safe_folder(&descriptor.folder_name) {
                report.error(format!(
                    "{at}: folder_name '{}' is not a safe path token",
                    descriptor.folder_name
                ));
            }
            if !folders.insert(descriptor.folder_name.as_str()) {
                report.error(format!(
                    "{at}: folder_name '{}' is declared twice",
                    descriptor.folder_name
                ));
            }
            if descriptor.label.as_deref().is_none_or(|l| l.trim().is_empty()) {
                report.warn(format!("{at}: no label"));
            }

            if let Ok(key) = descriptor_key(descriptor) {
                if !keys.insert(key) {
                    report.error(format!("{at}: chapter {key} is declared twice"));
                }
                if previous.is_some_and(|p| key < p) {
                    out_of_order = true;
                }
                previous = Some(key);
            }
        }

        if out_of_order {
            report.warn(format!("{slug}: chapters are not in ascending order"));
        }
        report
    }
}

impl MultiTitleDocument {
    pub fn validate(&self) -> ValidationReport {
        validate_titles(&self.titles)
    }
}

/// Per-title checks plus slug uniqueness across titles
fn validate_titles(titles: &[MetadataDocument]) -> ValidationReport {
    let mut report = ValidationReport::default();
    if titles.is_empty() {
        report.error("config declares no titles");
    }

    let mut slugs: HashMap<&str, usize> = HashMap::new();
    for (position, title) in titles.iter().enumerate() {
        if let Some(first) = slugs.insert(title.manga_slug.as_str(), position) {
            report.error(format!(
                "titles[{position}]: manga_slug '{}' already used by titles[{first}]",
                title.manga_slug
            ));
        }
        report.merge(title.validate());
    }
    report
}

/// Validate documents and, when `check_existing` is set, report the conflicts the
/// given policy would raise. Only a catalog consulted here can fail, and such a
/// failure is reported as an error in the report.
pub async fn validate_documents(
    documents: &[MetadataDocument],
    check_existing: bool,
    catalog: &dyn Catalog,
    policy: ConflictPolicy,
) -> ValidationReport {
    let mut report = match documents {
        [single] => single.validate(),
        titles => validate_titles(titles),
    };
    if !check_existing {
        debug!(documents = documents.len(), "Validated offline");
        return report;
    }

    let items: Vec<(String, ChapterKey)> = documents
        .iter()
        .flat_map(|doc| doc.keys().into_iter().map(|key| (doc.manga_slug.clone(), key)))
        .collect();

    match CatalogSnapshot::load(catalog, &items).await {
        Ok(snapshot) => {
            let resolution = resolve(&items, &snapshot, policy);
            report.conflicts.extend(resolution.conflicts);
        }
        Err(e) => {
            warn!(error = %e, "Catalog unavailable during validation");
            report.error(format!("catalog unavailable, existing entries not checked: {e}"));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(main: i64, folder: &str) -> ChapterDescriptor {
        ChapterDescriptor {
            chapter_main: main,
            chapter_sub: None,
            label: Some(format!("Chapter {main}")),
            folder_name: folder.to_string(),
        }
    }

    fn document(chapters: Vec<ChapterDescriptor>) -> MetadataDocument {
        MetadataDocument {
            manga_slug: "berserk".to_string(),
            title: Some("Berserk".to_string()),
            description: None,
            type_hint: None,
            status: None,
            title_folder: None,
            chapters,
        }
    }

    #[test]
    fn test_parse_reports_schema_errors() {
        assert!(matches!(
            parse_metadata(br#"{"manga_slug": "x"}"#),
            Err(UploadError::Schema(_))
        ));
        assert!(matches!(parse_metadata(b"not json"), Err(UploadError::Schema(_))));

        let doc = parse_metadata(
            br#"{"manga_slug": "x", "chapters": [{"chapter_main": 1, "folder_name": "ch1"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.keys(), vec![ChapterKey::new(1, 0)]);
    }

    #[test]
    fn test_valid_document() {
        let report = document(vec![descriptor(1, "ch1"), descriptor(2, "ch2")]).validate();
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_field_constraints() {
        let mut bad_sub = descriptor(3, "ch3");
        bad_sub.chapter_sub = Some(-1);
        let report = document(vec![
            descriptor(0, "ch0"),
            descriptor(1, "../etc"),
            bad_sub,
        ])
        .validate();

        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);
    }

    #[test]
    fn test_duplicates_and_ordering() {
        let mut unlabeled = descriptor(1, "ch1b");
        unlabeled.label = None;
        let report = document(vec![
            descriptor(2, "ch2"),
            descriptor(1, "ch1"),
            unlabeled,
            descriptor(3, "ch2"),
        ])
        .validate();

        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("chapter 1 is declared twice")));
        assert!(report.errors.iter().any(|e| e.contains("'ch2' is declared twice")));
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_slug_and_folder_tokens() {
        assert!(is_valid_slug("one-piece"));
        assert!(!is_valid_slug("One Piece"));
        assert!(!is_valid_slug("one--piece"));
        assert!(is_safe_folder("Chapter 12.5 [v2]"));
        assert!(!is_safe_folder("a/b"));
        assert!(!is_safe_folder(".hidden"));
        assert!(!is_safe_folder("x..y"));
    }

    #[test]
    fn test_multi_title_slug_uniqueness() {
        let doc = MultiTitleDocument {
            titles: vec![document(vec![descriptor(1, "ch1")]), document(vec![descriptor(1, "ch1")])],
        };
        let report = doc.validate();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("already used"));
    }

    #[test]
    fn test_folder_requests_carry_title_folder() {
        let mut doc = document(vec![descriptor(1, "ch1")]);
        doc.title_folder = Some("Berserk".to_string());
        let requests = doc.folder_requests().unwrap();
        assert_eq!(requests[0].title_folder.as_deref(), Some("Berserk"));
        assert_eq!(doc.draft().title, "Berserk");
    }

    #[test]
    fn test_chapter_numbers_beyond_u32_are_rejected() {
        let mut huge_sub = descriptor(3, "ch3");
        huge_sub.chapter_sub = Some(i64::from(u32::MAX) + 1);
        let doc = document(vec![descriptor(1, "ch1"), descriptor(5_000_000_000, "ch2"), huge_sub]);

        let report = doc.validate();
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors[0].contains("chapters[1]: chapter_main must be <= 4294967295"));
        assert!(report.errors[1].contains("chapters[2]: chapter_sub must be <= 4294967295"));

        let err = doc.folder_requests().unwrap_err();
        assert!(err.contains("chapters[1]"), "{err}");
        assert_eq!(doc.keys(), vec![ChapterKey::new(1, 0)]);
    }
}
