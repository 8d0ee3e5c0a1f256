//! File API endpoints.
//!
//! - GET `/` - List the caller's files, newest first
//! - POST `/upload-url` - Issue an upload grant
//! - POST `/complete-upload` - Record a finished upload
//! - GET `/{id}` - Signed download URL for an owned file
//! - DELETE `/{id}` - Delete an owned file and its stored object

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Serialize;

use super::error::{ApiError, ApiJson};
use crate::auth::Session;
use crate::broker::{CompleteUpload, DownloadLink, UploadBroker, UploadGrant, UploadRequest};
use crate::db::FileRecord;

#[derive(Clone)]
pub struct FilesState {
    pub broker: UploadBroker,
}

pub fn router(state: FilesState) -> Router {
    Router::new()
        .route("/", get(list_files))
        .route("/upload-url", post(upload_url))
        .route("/complete-upload", post(complete_upload))
        .route("/{id}", get(download_url).delete(delete_file))
        .with_state(state)
}

#[derive(Serialize)]
struct ListFilesResponse {
    files: Vec<FileRecord>,
}

#[derive(Serialize)]
struct FileResponse {
    file: FileRecord,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn list_files(
    State(state): State<FilesState>,
    Session(identity): Session,
) -> Result<Json<ListFilesResponse>, ApiError> {
    let files = state.broker.list_files(&identity.user_id).await?;
    Ok(Json(ListFilesResponse { files }))
}

async fn upload_url(
    State(state): State<FilesState>,
    Session(identity): Session,
    ApiJson(req): ApiJson<UploadRequest>,
) -> Result<Json<UploadGrant>, ApiError> {
    let grant = state.broker.request_upload(&identity.user_id, &req).await?;
    Ok(Json(grant))
}

async fn complete_upload(
    State(state): State<FilesState>,
    Session(identity): Session,
    ApiJson(req): ApiJson<CompleteUpload>,
) -> Result<Json<FileResponse>, ApiError> {
    let file = state
        .broker
        .complete_upload(&identity.user_id, &req)
        .await?;
    Ok(Json(FileResponse { file }))
}

async fn download_url(
    State(state): State<FilesState>,
    Session(identity): Session,
    Path(id): Path<String>,
) -> Result<Json<DownloadLink>, ApiError> {
    let link = state
        .broker
        .presign_download(&id, &identity.user_id)
        .await?;
    Ok(Json(link))
}

async fn delete_file(
    State(state): State<FilesState>,
    Session(identity): Session,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.broker.delete_file(&id, &identity.user_id).await?;
    Ok(Json(MessageResponse {
        message: "File deleted successfully",
    }))
}
