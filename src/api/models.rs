//! Request and response bodies of the upload API
//!
//! Submissions are multipart forms (see [`super::form`]); the JSON bodies here
//! cover validation, resume and health. Every submission answers with an
//! [`UploadResponse`], and every error with an [`ErrorResponse`]:
//!
//! ```json
//! {
//!   "code": "ARCHIVE_MAPPING_ERROR",
//!   "message": "Archive mapping error: folder 'ch02' not found in archive",
//!   "job": { "job_id": "0193...", "status": "failed", "...": "..." }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::ingest::UploadResponse;

/// Header carrying a caller-chosen job id
pub const JOB_ID_HEADER: &str = "X-Mangabox-Job-Id";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<UploadResponse>,
}

/// `POST /uploads/validate`
///
/// `metadata` is either one metadata document or a multi-title config
/// (`{"titles": [...]}`).
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub metadata: Value,
    #[serde(default)]
    pub check_existing: bool,
    #[serde(default)]
    pub manga_conflict: Option<String>,
    #[serde(default)]
    pub chapter_conflict: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub resume_token: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
