//! Durable staging of decoded page bytes
//!
//! A non-dry-run job stages every page of every executable unit before any unit
//! runs. Workers read pages back from here, and so does a resumed job, which
//! therefore never needs the original archive again.
//!
//! Architecture:
//! - `pages` partition: page:{job_id}:{unit:06}:{ordinal:06} -> StagedPage (protobuf)
//! - `units` partition: unit:{job_id}:{unit:06} -> StagedUnit (protobuf)

use crate::proto::{StagedPage, StagedUnit};
use bytes::Bytes;
use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use prost::Message;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(#[from] prost::DecodeError),

    #[error("Unit {unit_index} of job {job_id} is not staged")]
    UnitMissing { job_id: String, unit_index: u32 },

    #[error("Staged unit {unit_index} of job {job_id} is incomplete: expected {expected} pages, found {found}")]
    UnitIncomplete {
        job_id: String,
        unit_index: u32,
        expected: u32,
        found: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StagingError>;

fn encode_page_key(job_id: &str, unit_index: u32, ordinal: u32) -> Vec<u8> {
    format!("page:{}:{:06}:{:06}", job_id, unit_index, ordinal).into_bytes()
}

fn encode_unit_pages_prefix(job_id: &str, unit_index: u32) -> Vec<u8> {
    format!("page:{}:{:06}:", job_id, unit_index).into_bytes()
}

fn encode_job_pages_prefix(job_id: &str) -> Vec<u8> {
    format!("page:{}:", job_id).into_bytes()
}

fn encode_unit_key(job_id: &str, unit_index: u32) -> Vec<u8> {
    format!("unit:{}:{:06}", job_id, unit_index).into_bytes()
}

fn encode_job_units_prefix(job_id: &str) -> Vec<u8> {
    format!("unit:{}:", job_id).into_bytes()
}

/// Page bytes ready to be staged
#[derive(Debug, Clone)]
pub struct PageBlob {
    pub ordinal: u32,
    pub file_name: String,
    pub content_checksum: String,
    pub data: Bytes,
}

pub struct StagingStore {
    keyspace: Keyspace,
    pages: PartitionHandle,
    units: PartitionHandle,
}

impl StagingStore {
    /// Open or create a staging store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening staging store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let pages = keyspace.open_partition("pages", PartitionCreateOptions::default())?;
        let units = keyspace.open_partition("units", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            pages,
            units,
        })
    }

    /// Stage all pages of one unit in a single batch; call [`flush`](Self::flush)
    /// before relying on them. Re-staging a unit replaces what was there.
    pub fn stage_unit(&self, job_id: &str, unit_index: u32, pages: &[PageBlob]) -> Result<()> {
        let mut batch = self.keyspace.batch();

        for item in self.pages.prefix(encode_unit_pages_prefix(job_id, unit_index)) {
            let (key, _) = item?;
            batch.remove(&self.pages, key);
        }

        let mut total_bytes = 0u64;
        for page in pages {
            let envelope = StagedPage {
                job_id: job_id.to_string(),
                unit_index,
                ordinal: page.ordinal,
                file_name: page.file_name.clone(),
                content_checksum: page.content_checksum.clone(),
                data: page.data.to_vec(),
            };
            total_bytes += page.data.len() as u64;
            batch.insert(
                &self.pages,
                encode_page_key(job_id, unit_index, page.ordinal),
                envelope.encode_to_vec(),
            );
        }

        let manifest = StagedUnit {
            job_id: job_id.to_string(),
            unit_index,
            page_count: pages.len() as u32,
            total_bytes,
            staged_at_ms: Utc::now().timestamp_millis(),
        };
        batch.insert(
            &self.units,
            encode_unit_key(job_id, unit_index),
            manifest.encode_to_vec(),
        );

        batch.commit()?;
        debug!(job_id, unit_index, pages = pages.len(), total_bytes, "Staged unit");
        Ok(())
    }

    /// Sync staged data to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn has_unit(&self, job_id: &str, unit_index: u32) -> Result<bool> {
        Ok(self.units.get(encode_unit_key(job_id, unit_index))?.is_some())
    }

    /// Pages of a staged unit in ordinal order
    pub fn load_unit(&self, job_id: &str, unit_index: u32) -> Result<Vec<StagedPage>> {
        let manifest = match self.units.get(encode_unit_key(job_id, unit_index))? {
            Some(bytes) => StagedUnit::decode(&*bytes)?,
            None => {
                return Err(StagingError::UnitMissing {
                    job_id: job_id.to_string(),
                    unit_index,
                });
            }
        };

        let mut pages = Vec::with_capacity(manifest.page_count as usize);
        for item in self.pages.prefix(encode_unit_pages_prefix(job_id, unit_index)) {
            let (_, value) = item?;
            pages.push(StagedPage::decode(&*value)?);
        }

        if pages.len() as u32 != manifest.page_count {
            return Err(StagingError::UnitIncomplete {
                job_id: job_id.to_string(),
                unit_index,
                expected: manifest.page_count,
                found: pages.len() as u32,
            });
        }

        Ok(pages)
    }

    /// Drop everything staged for a job; returns the number of pages removed
    pub fn purge_job(&self, job_id: &str) -> Result<usize> {
        let mut batch = self.keyspace.batch();
        let mut removed = 0;

        for item in self.pages.prefix(encode_job_pages_prefix(job_id)) {
            let (key, _) = item?;
            batch.remove(&self.pages, key);
            removed += 1;
        }
        for item in self.units.prefix(encode_job_units_prefix(job_id)) {
            let (key, _) = item?;
            batch.remove(&self.units, key);
        }

        batch.commit()?;
        self.flush()?;
        if removed > 0 {
            info!(job_id, pages = removed, "Purged staged pages");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StagingStats> {
        let mut unit_count = 0;
        let mut staged_bytes = 0u64;

        for item in self.units.iter() {
            let (_, value) = item?;
            staged_bytes += StagedUnit::decode(&*value)?.total_bytes;
            unit_count += 1;
        }

        Ok(StagingStats {
            unit_count,
            staged_bytes,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StagingStats {
    pub unit_count: usize,
    pub staged_bytes: u64,
}
