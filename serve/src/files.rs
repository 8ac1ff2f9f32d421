//! `/files*` handlers (§6): attachment upload, upload download, and generated-artifact download.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app::AppState;
use crate::auth::AuthUser;

const ATTACHMENTS_BUCKET: &str = "attachments";

#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

/// `POST /files/upload` — stores each part of a multipart body under the project's workdir.
/// The project id travels as a regular form field (`project_id`) alongside the file parts,
/// matching a plain multipart upload rather than a path-scoped one.
pub async fn upload(State(state): State<Arc<AppState>>, _auth: AuthUser, mut multipart: Multipart) -> impl IntoResponse {
    let mut project_id: Option<String> = None;
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
            }
        };

        let name = field.name().unwrap_or("").to_string();
        if name == "project_id" {
            project_id = field.text().await.ok();
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let Ok(bytes) = field.bytes().await else {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "could not read upload bytes" })))
                .into_response();
        };

        let Some(project_id) = project_id.clone() else {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "project_id field must precede file parts" })),
            )
                .into_response();
        };

        match state
            .uploads
            .store(&project_id, ATTACHMENTS_BUCKET, &filename, content_type.clone(), &bytes, chrono::Utc::now())
        {
            Ok(file_id) => files.push(UploadedFile {
                file_id,
                filename,
                content_type,
                size_bytes: bytes.len() as u64,
            }),
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response();
            }
        }
    }

    Json(json!({ "files": files })).into_response()
}

/// `GET /files/{project_id}/{file_id}` — serves back an uploaded attachment's bytes.
pub async fn download_upload(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path((project_id, file_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let meta = match state.uploads.read_meta(&project_id, &file_id) {
        Ok(meta) => meta,
        Err(_) => return (StatusCode::NOT_FOUND, Json(json!({ "error": "file not found" }))).into_response(),
    };
    let path = state.uploads.content_path(&meta);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(
                axum::http::header::CONTENT_TYPE,
                meta.content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            )],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Json(json!({ "error": "file not found" }))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub path: String,
}

/// `GET /files/generated/{project_id}/download?path=` — serves a file produced during a turn,
/// constrained to the project's own workdir (§6) so a caller can't read arbitrary host files.
pub async fn download_generated(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(project_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> impl IntoResponse {
    let candidate = std::path::PathBuf::from(&query.path);
    if !state.workdir.contains(&project_id, &candidate) {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "path escapes project workdir" }))).into_response();
    }
    match tokio::fs::read(&candidate).await {
        Ok(bytes) => bytes.into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Json(json!({ "error": "file not found" }))).into_response(),
    }
}
