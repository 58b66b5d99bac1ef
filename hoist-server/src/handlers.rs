use crate::auth::ClientIdentity;
use crate::AppState;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct UploadReply {
    pub success: bool,
    pub s3_key: String,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct PathParams {
    pub path: String,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(ClientIdentity(client_id)): Extension<ClientIdentity>,
    mut multipart: Multipart,
) -> Result<Json<UploadReply>, (StatusCode, String)> {
    let mut data = None;
    let mut remote_path = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("failed to parse multipart form: {e}"),
        )
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                data = Some(field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("failed to read file field: {e}"),
                    )
                })?);
            }
            Some("path") => {
                remote_path = Some(field.text().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("failed to read path field: {e}"),
                    )
                })?);
            }
            _ => {}
        }
    }

    let data = data.ok_or((StatusCode::BAD_REQUEST, "missing file field".to_string()))?;
    let remote_path =
        remote_path.ok_or((StatusCode::BAD_REQUEST, "missing path field".to_string()))?;
    if !is_valid_remote_path(&remote_path) {
        return Err((StatusCode::BAD_REQUEST, "invalid path".to_string()));
    }

    let size = data.len() as i64;
    let s3_key = state
        .storage
        .put(&client_id, &remote_path, data)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("upload failed: {e}"),
            )
        })?;

    info!(client = %client_id, path = %remote_path, size, "stored upload");
    Ok(Json(UploadReply {
        success: true,
        s3_key,
        size,
    }))
}

pub async fn exists(
    State(state): State<AppState>,
    Extension(ClientIdentity(client_id)): Extension<ClientIdentity>,
    Query(params): Query<PathParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if !is_valid_remote_path(&params.path) {
        return Err((StatusCode::BAD_REQUEST, "invalid path".to_string()));
    }
    let exists = state
        .storage
        .exists(&client_id, &params.path)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("check failed: {e}"),
            )
        })?;
    Ok(Json(json!({ "exists": exists })))
}

pub async fn download(
    State(state): State<AppState>,
    Extension(ClientIdentity(client_id)): Extension<ClientIdentity>,
    Query(params): Query<PathParams>,
) -> Result<Response, (StatusCode, String)> {
    if !is_valid_remote_path(&params.path) {
        return Err((StatusCode::BAD_REQUEST, "invalid path".to_string()));
    }
    let data = state
        .storage
        .read(&client_id, &params.path)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("download failed: {e}"),
            )
        })?
        .ok_or((StatusCode::NOT_FOUND, "file not found".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response())
}

/// Remote paths are relative keys; anything that could escape the
/// client's prefix is rejected.
fn is_valid_remote_path(path: &str) -> bool {
    !path.is_empty() && !path.starts_with('/') && !path.split('/').any(|part| part == "..")
}
