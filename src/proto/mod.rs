//! Protobuf envelopes for staged page bytes
//!
//! Staged pages live in the staging keyspace between planning and commit so that
//! workers and resumed runs can read them without the original archive:
//! - `StagedPage` - one page file with its bytes and checksum
//! - `StagedUnit` - per-unit manifest written after all pages of a unit are staged
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mangabox::proto::StagedPage;
//! use prost::Message;
//!
//! let page = StagedPage {
//!     job_id: "job-123".to_string(),
//!     unit_index: 0,
//!     ordinal: 1,
//!     ..Default::default()
//! };
//!
//! let bytes = page.encode_to_vec();
//! let decoded = StagedPage::decode(&bytes[..])?;
//! ```

/// One page file staged for a unit
#[derive(Clone, PartialEq, prost::Message)]
pub struct StagedPage {
    #[prost(string, tag = "1")]
    pub job_id: String,
    #[prost(uint32, tag = "2")]
    pub unit_index: u32,
    #[prost(uint32, tag = "3")]
    pub ordinal: u32,
    #[prost(string, tag = "4")]
    pub file_name: String,
    /// SHA-256 hex of `data`
    #[prost(string, tag = "5")]
    pub content_checksum: String,
    #[prost(bytes = "vec", tag = "6")]
    pub data: Vec<u8>,
}

/// Marks a unit whose pages are all staged
#[derive(Clone, PartialEq, prost::Message)]
pub struct StagedUnit {
    #[prost(string, tag = "1")]
    pub job_id: String,
    #[prost(uint32, tag = "2")]
    pub unit_index: u32,
    #[prost(uint32, tag = "3")]
    pub page_count: u32,
    #[prost(uint64, tag = "4")]
    pub total_bytes: u64,
    #[prost(int64, tag = "5")]
    pub staged_at_ms: i64,
}
