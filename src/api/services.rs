use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::collections::HashMap;
use tracing::debug;

use super::{
    form::UploadForm,
    models::{HealthResponse, JOB_ID_HEADER, ResumeRequest, ValidateRequest},
    state::AppState,
    utils::{MAX_JSON_BYTES, credential, header_value, parse_chapter_policy, parse_manga_policy, read_json_body},
};
use crate::api::error::ApiError;
use crate::ingest::validator::{MetadataDocument, MultiTitleDocument};
use crate::ingest::{ConflictPolicy, JobStatus, SubmissionKind, UploadResponse};

/// HTTP status for a submission that ran to a settled state
fn submission_status(response: &UploadResponse) -> StatusCode {
    match response.status {
        JobStatus::Interrupted => StatusCode::ACCEPTED,
        JobStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    }
}

/// Shared flow of every multipart upload route
///
/// ## Flow:
/// 1. Authorize the `Authorization` bearer token (403 before the body is read)
/// 2. Read the multipart form; oversized bodies are 413
/// 3. Build the submission and execution flags from the form
/// 4. Hand both to the coordinator and map the settled job to a status code
async fn submit(state: AppState, kind: SubmissionKind, request: Request) -> Result<impl IntoResponse, ApiError> {
    let credential = credential(request.headers());
    state.coordinator.authorize(&credential)?;
    let job_id = header_value(request.headers(), JOB_ID_HEADER);

    let multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|e| ApiError::InvalidPayload(e.body_text()))?;
    let form = UploadForm::read(multipart).await?;
    let options = form.options(job_id)?;
    let submission = form.submission(kind)?;
    debug!(kind = %kind, dry_run = options.dry_run, "Dispatching submission");

    let response = state.coordinator.submit(&credential, submission, options).await?;
    Ok((submission_status(&response), Json(response)))
}

/// Single chapter with attached pages (POST /uploads/chapter)
pub async fn upload_chapter(State(state): State<AppState>, request: Request) -> Result<impl IntoResponse, ApiError> {
    submit(state, SubmissionKind::Chapter, request).await
}

/// Archive of chapters for one manga (POST /uploads/bulk)
pub async fn upload_bulk(State(state): State<AppState>, request: Request) -> Result<impl IntoResponse, ApiError> {
    submit(state, SubmissionKind::Bulk, request).await
}

/// Metadata document plus archive (POST /uploads/metadata)
pub async fn upload_metadata(State(state): State<AppState>, request: Request) -> Result<impl IntoResponse, ApiError> {
    submit(state, SubmissionKind::Metadata, request).await
}

/// Multi-title config plus archive (POST /uploads/multi)
pub async fn upload_multi(State(state): State<AppState>, request: Request) -> Result<impl IntoResponse, ApiError> {
    submit(state, SubmissionKind::Multi, request).await
}

/// Archive with inferred layout (POST /uploads/smart)
pub async fn upload_smart(State(state): State<AppState>, request: Request) -> Result<impl IntoResponse, ApiError> {
    submit(state, SubmissionKind::Smart, request).await
}

/// Validation only (POST /uploads/validate)
///
/// Never creates a job. `check_existing` adds the conflicts the given
/// strategies would raise against the live catalog.
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let credential = credential(&headers);
    state.coordinator.authorize(&credential)?;

    let raw = read_json_body(&headers, body, MAX_JSON_BYTES).await?;
    let request: ValidateRequest = serde_json::from_slice(&raw)?;

    let documents = if request.metadata.get("titles").is_some() {
        serde_json::from_value::<MultiTitleDocument>(request.metadata)?.titles
    } else {
        vec![serde_json::from_value::<MetadataDocument>(request.metadata)?]
    };
    let policy = ConflictPolicy::new(
        Some(parse_manga_policy(request.manga_conflict.as_deref())?),
        parse_chapter_policy(request.chapter_conflict.as_deref())?,
    );

    let report = state
        .coordinator
        .validate_documents(&credential, &documents, request.check_existing, policy)
        .await?;
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(report)))
}

/// Progress query (GET /uploads/{job_id}/progress)
pub async fn progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.coordinator.progress(&credential(&headers), &job_id)?;
    Ok(Json(snapshot))
}

/// Resume an interrupted job (POST /uploads/resume)
pub async fn resume(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let credential = credential(&headers);
    state.coordinator.authorize(&credential)?;

    let raw = read_json_body(&headers, body, MAX_JSON_BYTES).await?;
    let request: ResumeRequest = serde_json::from_slice(&raw)?;

    let response = state.coordinator.resume(&credential, &request.resume_token).await?;
    Ok((submission_status(&response), Json(response)))
}

/// Request cancellation (POST /uploads/{job_id}/cancel)
pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.coordinator.cancel(&credential(&headers), &job_id)?;
    let status = if receipt.accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(receipt)))
}

/// Upload configuration and counters (GET /uploads/health)
pub async fn upload_health(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let health = state.coordinator.health(&credential(&headers))?;
    Ok(Json(health))
}

/// Liveness (GET /health)
pub async fn health() -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let response = HealthResponse {
        status: "healthy".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Fallback for unknown routes
pub async fn not_found(request: Request) -> ApiError {
    ApiError::NotFound(request.uri().path().to_string())
}
