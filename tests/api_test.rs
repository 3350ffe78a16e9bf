mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use common::{FlakyStore, OPERATOR_TOKEN, build_coordinator, chapter_archive, test_config};
use mangabox::api::{AppState, router};
use mangabox::catalog::FjallCatalog;

const BOUNDARY: &str = "mangabox-test-boundary";

/// Builds the full router over an isolated catalog, ledger and staging area
fn build_test_app() -> (Router, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&temp_dir);
    let catalog = Arc::new(FjallCatalog::open(&config.server.catalog_path).expect("Failed to open test catalog"));
    let coordinator = build_coordinator(config, catalog, Arc::new(FlakyStore::new()));

    (router(AppState::new(coordinator)), temp_dir)
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, Bytes),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(path: &str, parts: &[Part<'_>], token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

fn json_request(method: &str, path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&body).expect("Failed to parse JSON")
}

#[tokio::test]
async fn test_upload_without_token_is_forbidden() {
    let (app, _temp) = build_test_app();
    let parts = [
        Part::Text("manga_slug", "berserk"),
        Part::File("archive", "ch.zip", chapter_archive(&[("ch1", 1)])),
    ];

    let response = app.oneshot(upload_request("/uploads/bulk", &parts, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_bulk_upload_success() {
    let (app, _temp) = build_test_app();
    let parts = [
        Part::Text("manga_slug", "berserk"),
        Part::Text("parallel", "true"),
        Part::File("archive", "chapters.zip", chapter_archive(&[("ch1", 2), ("ch2", 3)])),
    ];

    let response = app
        .oneshot(upload_request("/uploads/bulk", &parts, Some(OPERATOR_TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["total_units"], 2);
    assert_eq!(json["units"][1]["page_count"], 3);
}

#[tokio::test]
async fn test_job_id_header_is_used_and_progress_is_queryable() {
    let (app, _temp) = build_test_app();
    let parts = [
        Part::Text("manga_slug", "berserk"),
        Part::File("archive", "chapters.zip", chapter_archive(&[("ch1", 1)])),
    ];
    let mut request = upload_request("/uploads/bulk", &parts, Some(OPERATOR_TOKEN));
    request
        .headers_mut()
        .insert("X-Mangabox-Job-Id", "nightly-import".parse().unwrap());

    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["job_id"], "nightly-import");

    let response = ServiceExt::<Request<Body>>::oneshot(app, get_request("/uploads/nightly-import/progress"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["progress"], 100);
}

#[tokio::test]
async fn test_metadata_upload_with_missing_folder() {
    let (app, _temp) = build_test_app();
    let metadata = json!({
        "manga_slug": "vagabond",
        "title": "Vagabond",
        "chapters": [
            {"chapter_main": 1, "folder_name": "c1"},
            {"chapter_main": 2, "folder_name": "c2"}
        ]
    })
    .to_string();
    let parts = [
        Part::Text("metadata", &metadata),
        Part::File("archive", "vagabond.zip", chapter_archive(&[("c1", 2)])),
    ];

    let response = app
        .oneshot(upload_request("/uploads/metadata", &parts, Some(OPERATOR_TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "ARCHIVE_MAPPING_ERROR");
    assert!(json["message"].as_str().unwrap().contains("c2"));
    assert_eq!(json["job"]["status"], "failed");
}

#[tokio::test]
async fn test_upload_with_malformed_metadata() {
    let (app, _temp) = build_test_app();
    let parts = [
        Part::Text("metadata", "{not json"),
        Part::File("archive", "a.zip", chapter_archive(&[("c1", 1)])),
    ];

    let response = app
        .oneshot(upload_request("/uploads/metadata", &parts, Some(OPERATOR_TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "SCHEMA_ERROR");
}

#[tokio::test]
async fn test_validate_endpoint() {
    let (app, _temp) = build_test_app();
    let valid = json!({
        "metadata": {
            "manga_slug": "berserk",
            "chapters": [{"chapter_main": 1, "folder_name": "c1"}]
        },
        "check_existing": true
    });

    let response = ServiceExt::<Request<Body>>::oneshot(app.clone(), json_request("POST", "/uploads/validate", valid))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["errors"], json!([]));

    let invalid = json!({
        "metadata": {
            "titles": [
                {"manga_slug": "dup", "chapters": [{"chapter_main": 1, "folder_name": "a"}]},
                {"manga_slug": "dup", "chapters": [{"chapter_main": 1, "folder_name": "b"}]}
            ]
        }
    });
    let response = ServiceExt::<Request<Body>>::oneshot(app, json_request("POST", "/uploads/validate", invalid))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert!(!json["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_validate_requires_json_content_type() {
    let (app, _temp) = build_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/uploads/validate")
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"))
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_progress_not_found() {
    let (app, _temp) = build_test_app();

    let response = app.oneshot(get_request("/uploads/missing-job/progress")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_resume_with_unknown_token() {
    let (app, _temp) = build_test_app();

    let response = app
        .oneshot(json_request("POST", "/uploads/resume", json!({"resume_token": "nope"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_RESUME_TOKEN");
}

#[tokio::test]
async fn test_upload_health_reports_target() {
    let (app, _temp) = build_test_app();

    let response = app.oneshot(get_request("/uploads/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["storage_target"], "primary");
    assert!(json["submission_kinds"].as_array().unwrap().len() >= 5);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _temp) = build_test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _temp) = build_test_app();

    let response = app.oneshot(get_request("/jobs")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
