//! API utility functions
//!
//! Pure, stateless helpers for request parsing, kept out of the handlers so
//! they can be unit tested.

use axum::http::{HeaderMap, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::api::error::ApiError;
use crate::auth::Credential;
use crate::ingest::{ChapterPolicy, MangaPolicy};

/// Upper bound for JSON request bodies
pub const MAX_JSON_BYTES: usize = 2 * 1024 * 1024;

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects:
/// - `application/jsonp`
/// - `application/json-patch+json`
/// - `text/json`
/// - Malformed media types
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type)))?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Operator credential from the `Authorization` header
pub fn credential(headers: &HeaderMap) -> Credential {
    Credential::from_authorization(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()))
}

/// Non-empty header value
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Read a JSON body of at most `limit` bytes
pub async fn read_json_body(headers: &HeaderMap, body: axum::body::Body, limit: usize) -> Result<Vec<u8>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(format!("body exceeds {limit} bytes"))
        } else {
            ApiError::InvalidPayload(err.to_string())
        }
    })?;

    Ok(collected.to_bytes().to_vec())
}

/// Form flag: `true/false`, `1/0`, `yes/no`, `on/off`
pub fn parse_flag(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ApiError::InvalidPayload(format!("{name}: '{other}' is not a boolean"))),
    }
}

pub fn parse_chapter_policy(value: Option<&str>) -> Result<ChapterPolicy, ApiError> {
    match value {
        Some(raw) => raw.parse().map_err(ApiError::InvalidPayload),
        None => Ok(ChapterPolicy::Skip),
    }
}

pub fn parse_manga_policy(value: Option<&str>) -> Result<MangaPolicy, ApiError> {
    match value {
        Some(raw) => raw.parse().map_err(ApiError::InvalidPayload),
        None => Ok(MangaPolicy::Skip),
    }
}
