use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::ingest::UploadError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upload(err) => match err {
                UploadError::Schema(_) | UploadError::InvalidResumeToken => StatusCode::BAD_REQUEST,
                UploadError::Forbidden(_) => StatusCode::FORBIDDEN,
                UploadError::Rejected(_) | UploadError::ArchiveMapping { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                UploadError::Conflict(_)
                | UploadError::DuplicateJobId(_)
                | UploadError::IllegalTransition { .. } => StatusCode::CONFLICT,
                UploadError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::JobNotFound(_) | UploadError::FeatureDisabled(_) => StatusCode::NOT_FOUND,
                UploadError::Ledger(_)
                | UploadError::Staging(_)
                | UploadError::Catalog(_)
                | UploadError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "SCHEMA_ERROR",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Upload(err) => match err {
                UploadError::Schema(_) => "SCHEMA_ERROR",
                UploadError::Rejected(_) => "VALIDATION_FAILED",
                UploadError::Conflict(_) => "CONFLICT",
                UploadError::ArchiveMapping { .. } => "ARCHIVE_MAPPING_ERROR",
                UploadError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
                UploadError::Forbidden(_) => "FORBIDDEN",
                UploadError::InvalidResumeToken => "INVALID_RESUME_TOKEN",
                UploadError::JobNotFound(_) => "NOT_FOUND",
                UploadError::DuplicateJobId(_) => "DUPLICATE_JOB_ID",
                UploadError::FeatureDisabled(_) => "FEATURE_DISABLED",
                UploadError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
                UploadError::Ledger(_)
                | UploadError::Staging(_)
                | UploadError::Catalog(_)
                | UploadError::Storage(_) => "STORAGE_ERROR",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let job = match &self {
            ApiError::Upload(err) => err.response().cloned(),
            _ => None,
        };
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
            job,
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::InvalidPayload(err.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::catalog::CatalogError;
    use crate::ingest::JobStatus;

    #[test]
    fn test_upload_errors_keep_distinct_codes() {
        let cases = [
            (UploadError::Forbidden(AuthError::Missing), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (UploadError::schema("bad"), StatusCode::BAD_REQUEST, "SCHEMA_ERROR"),
            (UploadError::archive_mapping("c2"), StatusCode::UNPROCESSABLE_ENTITY, "ARCHIVE_MAPPING_ERROR"),
            (UploadError::InvalidResumeToken, StatusCode::BAD_REQUEST, "INVALID_RESUME_TOKEN"),
            (UploadError::JobNotFound("j".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (UploadError::FeatureDisabled("smart"), StatusCode::NOT_FOUND, "FEATURE_DISABLED"),
            (UploadError::DuplicateJobId("j".into()), StatusCode::CONFLICT, "DUPLICATE_JOB_ID"),
            (
                UploadError::PayloadTooLarge { size: 2, limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
            ),
            (
                UploadError::Catalog(CatalogError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
                "STORAGE_ERROR",
            ),
            (
                UploadError::IllegalTransition {
                    from: JobStatus::Completed,
                    to: JobStatus::Executing,
                },
                StatusCode::CONFLICT,
                "ILLEGAL_TRANSITION",
            ),
        ];

        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status, "{api}");
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn test_payload_errors() {
        assert_eq!(ApiError::InvalidPayload("x".into()).code(), "SCHEMA_ERROR");
        assert_eq!(
            ApiError::PayloadTooLarge("x".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );

        let err: ApiError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
