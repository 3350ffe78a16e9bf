//! Archive decoding
//!
//! A zip archive is read once, on the blocking pool, into page entries grouped by
//! directory. The grouped entries are then mapped to chapters in one of three ways:
//! explicit (declared folder names), inferred (smart import) or pattern-driven
//! (bulk archives).

use super::naming::{NamingPattern, assign_ordinals, natural_cmp, parse_chapter_number, slugify};
use crate::catalog::{ChapterKey, MangaDraft};
use crate::config::UploadLimits;
use bytes::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

const SIDECAR_NAMES: &[&str] = &["manga.json", "info.json"];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive is not a readable zip: {0}")]
    Unreadable(#[from] zip::result::ZipError),

    #[error("Unsafe entry path '{0}'")]
    UnsafePath(String),

    #[error("Page '{name}' is {size} bytes, over the {limit} byte page limit")]
    PageTooLarge { name: String, size: u64, limit: u64 },

    #[error("No archive entries for declared folder(s): {}", .0.join(", "))]
    MissingFolders(Vec<String>),

    #[error("Folder '{folder}' matches several directories: {}", .candidates.join(", "))]
    AmbiguousFolder {
        folder: String,
        candidates: Vec<String>,
    },

    #[error("Folder '{folder}': {message}")]
    Ordinals { folder: String, message: String },

    #[error("Chapter {key} of '{manga}' appears in both '{first}' and '{second}'")]
    DuplicateChapter {
        manga: String,
        key: ChapterKey,
        first: String,
        second: String,
    },

    #[error("Cannot determine the manga: add manga.json or wrap chapters in one top-level folder")]
    NoIdentity,

    #[error("Archive contains no usable pages")]
    Empty,

    #[error("Invalid sidecar '{path}': {message}")]
    Sidecar { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// A page file read from an archive or a form upload
#[derive(Debug, Clone)]
pub struct RawPage {
    /// Directory inside the archive, `""` at the root
    pub dir: String,
    pub file_name: String,
    pub checksum: String,
    pub data: Bytes,
}

impl RawPage {
    pub fn new(dir: impl Into<String>, file_name: impl Into<String>, data: Bytes) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            checksum: checksum(&data),
            data,
        }
    }
}

pub fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Everything usable in an archive
#[derive(Debug, Default)]
pub struct ArchiveContents {
    pages: Vec<RawPage>,
    /// Sidecar descriptors by path
    sidecars: BTreeMap<String, Bytes>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DecodedPage {
    pub ordinal: u32,
    pub file_name: String,
    pub checksum: String,
    pub data: Bytes,
}

impl DecodedPage {
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A chapter recovered from an archive, pages in ordinal order
#[derive(Debug, Clone)]
pub struct DecodedChapter {
    pub manga_slug: String,
    pub key: ChapterKey,
    pub label: Option<String>,
    pub folder_name: String,
    pub pages: Vec<DecodedPage>,
}

/// A folder a metadata document declares
#[derive(Debug, Clone)]
pub struct FolderRequest {
    pub manga_slug: String,
    pub key: ChapterKey,
    pub label: Option<String>,
    pub folder_name: String,
    /// Title folder the chapter folder must sit under (multi-title imports)
    pub title_folder: Option<String>,
}

/// Sidecar `manga.json` / `info.json`
#[derive(Debug, Clone, Deserialize)]
struct Sidecar {
    #[serde(default)]
    slug: Option<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "type")]
    type_hint: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn is_ignored(path: &str) -> bool {
    path.split('/')
        .any(|part| part.starts_with('.') || part.eq_ignore_ascii_case("__MACOSX"))
}

fn is_safe(path: &str) -> bool {
    !path.starts_with('/')
        && !path.contains(':')
        && path.split('/').all(|part| part != "..")
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", path),
    }
}

/// Read a zip archive on the blocking pool
pub async fn read_archive(data: Bytes, limits: UploadLimits) -> Result<ArchiveContents> {
    tokio::task::spawn_blocking(move || read_archive_blocking(&data, &limits))
        .await
        .map_err(|e| ArchiveError::Join(e.to_string()))?
}

fn read_archive_blocking(data: &[u8], limits: &UploadLimits) -> Result<ArchiveContents> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let page_limit = limits.max_page_bytes.as_u64();
    let mut contents = ArchiveContents::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let path = entry.name().replace('\\', "/");
        let path = path.trim_start_matches("./").to_string();
        if path.is_empty() || is_ignored(&path) {
            continue;
        }
        if !is_safe(&path) {
            return Err(ArchiveError::UnsafePath(path));
        }

        let (dir, file_name) = split_path(&path);
        let lower = file_name.to_ascii_lowercase();
        let is_sidecar = SIDECAR_NAMES.contains(&lower.as_str()) && dir.matches('/').count() == 0;

        if !is_sidecar && !limits.allows_extension(file_name) {
            contents
                .warnings
                .push(format!("Ignored '{path}': extension not allowed"));
            continue;
        }
        if entry.size() > page_limit {
            return Err(ArchiveError::PageTooLarge {
                name: path,
                size: entry.size(),
                limit: page_limit,
            });
        }

        let mut buf = Vec::with_capacity(entry.size() as usize);
        (&mut entry).take(page_limit + 1).read_to_end(&mut buf)?;
        if buf.len() as u64 > page_limit {
            return Err(ArchiveError::PageTooLarge {
                name: path,
                size: buf.len() as u64,
                limit: page_limit,
            });
        }

        if is_sidecar {
            contents.sidecars.insert(path, Bytes::from(buf));
        } else {
            contents.pages.push(RawPage::new(dir, file_name, Bytes::from(buf)));
        }
    }

    debug!(
        pages = contents.pages.len(),
        sidecars = contents.sidecars.len(),
        ignored = contents.warnings.len(),
        "Archive read"
    );
    Ok(contents)
}

impl ArchiveContents {
    fn by_dir(&self) -> BTreeMap<&str, Vec<&RawPage>> {
        let mut groups: BTreeMap<&str, Vec<&RawPage>> = BTreeMap::new();
        for page in &self.pages {
            groups.entry(page.dir.as_str()).or_default().push(page);
        }
        groups
    }

    /// Map each declared folder to its directory. Every missing folder is
    /// reported at once, so nothing runs until the archive matches the document.
    pub fn map_explicit(&self, requests: &[FolderRequest]) -> Result<Vec<DecodedChapter>> {
        let groups = self.by_dir();
        let mut missing = Vec::new();
        let mut chapters = Vec::with_capacity(requests.len());

        for request in requests {
            let wanted = match &request.title_folder {
                Some(title) => format!("{}/{}", title.trim_matches('/'), request.folder_name),
                None => request.folder_name.clone(),
            };
            let suffix = format!("/{wanted}");
            let candidates: Vec<&str> = groups
                .keys()
                .copied()
                .filter(|dir| *dir == wanted || dir.ends_with(&suffix))
                .collect();

            match candidates.as_slice() {
                [] => missing.push(wanted),
                [dir] => {
                    let pages = order_pages(&groups[dir], &request.folder_name)?;
                    chapters.push(DecodedChapter {
                        manga_slug: request.manga_slug.clone(),
                        key: request.key,
                        label: request.label.clone(),
                        folder_name: request.folder_name.clone(),
                        pages,
                    });
                }
                _ => {
                    return Err(ArchiveError::AmbiguousFolder {
                        folder: wanted,
                        candidates: candidates.iter().map(|c| c.to_string()).collect(),
                    });
                }
            }
        }

        if !missing.is_empty() {
            return Err(ArchiveError::MissingFolders(missing));
        }
        Ok(chapters)
    }

    /// Manga identity from a sidecar, else from the single top-level directory
    pub fn infer_manga(&self) -> Result<MangaDraft> {
        if let Some((path, bytes)) = self.sidecars.iter().next() {
            let sidecar: Sidecar =
                serde_json::from_slice(bytes).map_err(|e| ArchiveError::Sidecar {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            let slug = sidecar
                .slug
                .clone()
                .unwrap_or_else(|| slugify(&sidecar.title));
            if slug.is_empty() {
                return Err(ArchiveError::Sidecar {
                    path: path.clone(),
                    message: "title yields an empty slug".to_string(),
                });
            }
            return Ok(MangaDraft {
                slug,
                title: sidecar.title,
                description: sidecar.description,
                type_hint: sidecar.type_hint,
                status: sidecar.status,
            });
        }

        let mut tops = self
            .pages
            .iter()
            .map(|page| page.dir.split('/').next().unwrap_or(""));
        let first = tops.next().ok_or(ArchiveError::Empty)?;
        let shared = !first.is_empty()
            && tops.all(|top| top == first)
            && self.pages.iter().all(|page| page.dir.contains('/'));
        if !shared || slugify(first).is_empty() {
            return Err(ArchiveError::NoIdentity);
        }
        Ok(MangaDraft::new(slugify(first), first))
    }

    /// Group directories into chapters by their names.
    ///
    /// With a pattern only matching directory names are used; without one the
    /// first number in the name decides. Directories that yield no chapter
    /// number are skipped with a warning. `range` filters by inclusive main number.
    pub fn map_inferred(
        &self,
        manga_slug: &str,
        pattern: Option<&NamingPattern>,
        range: (Option<u32>, Option<u32>),
        warnings: &mut Vec<String>,
    ) -> Result<Vec<DecodedChapter>> {
        let mut seen: HashMap<ChapterKey, String> = HashMap::new();
        let mut chapters = Vec::new();

        for (dir, pages) in self.by_dir() {
            let folder_name = dir.rsplit('/').next().unwrap_or(dir).to_string();
            if dir.is_empty() {
                warnings.push(format!(
                    "Skipped {} page(s) at the archive root: not inside a chapter folder",
                    pages.len()
                ));
                continue;
            }

            let parsed = match pattern {
                Some(pattern) => pattern.match_name(&folder_name),
                None => parse_chapter_number(&folder_name).map(|key| (key, None)),
            };
            let Some((key, label)) = parsed else {
                let reason = match pattern {
                    Some(p) => format!("does not match naming pattern '{}'", p.template()),
                    None => "has no chapter number".to_string(),
                };
                warnings.push(format!("Skipped folder '{dir}': {reason}"));
                continue;
            };

            let (start, end) = range;
            if start.is_some_and(|s| key.main < s) || end.is_some_and(|e| key.main > e) {
                debug!(folder = dir, chapter = %key, "Outside requested chapter range");
                continue;
            }

            if let Some(first) = seen.insert(key, dir.to_string()) {
                return Err(ArchiveError::DuplicateChapter {
                    manga: manga_slug.to_string(),
                    key,
                    first,
                    second: dir.to_string(),
                });
            }

            chapters.push(DecodedChapter {
                manga_slug: manga_slug.to_string(),
                key,
                label: label.or_else(|| Some(folder_name.clone())),
                pages: order_pages(&pages, &folder_name)?,
                folder_name,
            });
        }

        chapters.sort_by_key(|chapter| chapter.key);
        Ok(chapters)
    }
}

/// Assign ordinals to loose pages and return them in ordinal order
pub fn order_pages(pages: &[&RawPage], folder: &str) -> Result<Vec<DecodedPage>> {
    let names: Vec<&str> = pages.iter().map(|p| p.file_name.as_str()).collect();
    let ordinals = assign_ordinals(&names).map_err(|message| ArchiveError::Ordinals {
        folder: folder.to_string(),
        message,
    })?;

    let mut decoded: Vec<DecodedPage> = pages
        .iter()
        .zip(ordinals)
        .map(|(page, ordinal)| DecodedPage {
            ordinal,
            file_name: page.file_name.clone(),
            checksum: page.checksum.clone(),
            data: page.data.clone(),
        })
        .collect();
    decoded.sort_by_key(|page| page.ordinal);
    Ok(decoded)
}

/// Validate and order pages uploaded individually (single-chapter submissions)
pub fn decode_loose_pages(
    files: Vec<(String, Bytes)>,
    folder: &str,
    limits: &UploadLimits,
    warnings: &mut Vec<String>,
) -> Result<Vec<DecodedPage>> {
    let page_limit = limits.max_page_bytes.as_u64();
    let mut pages = Vec::with_capacity(files.len());

    for (name, data) in files {
        let file_name = split_path(&name.replace('\\', "/")).1.to_string();
        if !limits.allows_extension(&file_name) {
            warnings.push(format!("Ignored '{file_name}': extension not allowed"));
            continue;
        }
        if data.len() as u64 > page_limit {
            return Err(ArchiveError::PageTooLarge {
                name: file_name,
                size: data.len() as u64,
                limit: page_limit,
            });
        }
        pages.push(RawPage::new("", file_name, data));
    }

    let mut refs: Vec<&RawPage> = pages.iter().collect();
    refs.sort_by(|a, b| natural_cmp(&a.file_name, &b.file_name));
    order_pages(&refs, folder)
}
