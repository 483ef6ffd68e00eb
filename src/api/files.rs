//! Workspace file API endpoints
//!
//! Nested under `/workspaces/{workspaceId}/files`. Uploads send the raw
//! bytes as the request body with `?fileName=`; the `Content-Type` header
//! becomes the stored MIME type.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    middleware::{Guard, RequestContext},
    models::{FileRecord, ListFilesQuery, UploadFileQuery},
    require_guard,
    services::{storage::sanitize_file_name, FileService, Upload},
    utils::AppError,
    AppState,
};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
struct FilePath {
    #[serde(rename = "fileId")]
    file_id: String,
}

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(state.config.storage.max_upload_bytes)),
        )
        .route("/", get(list_files))
        .route("/{fileId}/download", get(download_file))
        .route("/{fileId}", delete(delete_file))
        .route_layer(require_guard!(state, Guard::WorkspaceMember))
}

fn file_service(state: AppState) -> FileService {
    FileService::new(state.db, state.storage)
}

async fn upload_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<UploadFileQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<FileRecord>), AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());

    let upload = Upload {
        file_name: query.file_name.as_deref().unwrap_or_default(),
        mime_type,
        content: &body,
    };
    let file = file_service(state)
        .upload(workspace_id, ctx.user_id(), &upload)
        .await?;
    Ok((StatusCode::CREATED, Json(file)))
}

async fn list_files(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<Vec<FileRecord>>, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    Ok(Json(
        file_service(state)
            .list(workspace_id, ctx.user_id(), query.limit)
            .await?,
    ))
}

async fn download_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(path): Path<FilePath>,
) -> Result<impl IntoResponse, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    let download = file_service(state)
        .download(workspace_id, &path.file_id, ctx.user_id())
        .await?;

    let content_type = download
        .file
        .mime_type
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(&download.file.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.content,
    ))
}

async fn delete_file(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(path): Path<FilePath>,
) -> Result<StatusCode, AppError> {
    let workspace_id = ctx.require_workspace_id()?;
    let is_workspace_admin = ctx
        .membership
        .as_ref()
        .is_some_and(|m| m.role.is_privileged());
    file_service(state)
        .delete(workspace_id, &path.file_id, ctx.user_id(), is_workspace_admin)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
