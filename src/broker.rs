//! Direct-to-storage upload protocol and owner-scoped file operations.
//!
//! Uploads happen in three steps: the client asks for a grant, PUTs the bytes
//! straight to storage with it, then asks the server to commit the metadata.
//! The server only signs URLs and records rows.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::{Database, FileRecord, NewFile, UploadStatus};
use crate::error::{AppError, DependencyExt, Validator};
use crate::storage::ObjectStore;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_UPLOAD_GRANT_SECS: u64 = 600;
pub const DEFAULT_DOWNLOAD_URL_SECS: u64 = 3600;

const MAX_EXTENSION_LENGTH: usize = 16;
const MAX_FILENAME_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy)]
pub struct BrokerLimits {
    pub max_upload_bytes: u64,
    pub upload_grant: Duration,
    pub download_url: Duration,
}

impl Default for BrokerLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_grant: Duration::from_secs(DEFAULT_UPLOAD_GRANT_SECS),
            download_url: Duration::from_secs(DEFAULT_DOWNLOAD_URL_SECS),
        }
    }
}

/// Request-phase input. Fields are optional so absence is reported per field.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub filename: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
}

/// Commit-phase input.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUpload {
    pub filename: Option<String>,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    #[serde(alias = "s3Key")]
    pub storage_key: Option<String>,
}

/// Scoped, short-lived permission to write one object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadGrant {
    pub upload_url: String,
    pub method: String,
    /// Headers the client must send with the upload.
    pub fields: BTreeMap<String, String>,
    pub storage_key: String,
    pub unique_filename: String,
    pub content_type: String,
    pub max_size: u64,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub download_url: String,
    pub filename: String,
}

/// Lowercased alphanumeric extension of `filename`, if it has a usable one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() && !filename.starts_with('.') {
        return None;
    }
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    (!ext.is_empty() && ext.len() <= MAX_EXTENSION_LENGTH).then_some(ext)
}

/// Random object name carrying the original extension.
pub fn unique_filename(original: &str) -> String {
    let id = uuid::Uuid::new_v4();
    match file_extension(original) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// Storage key namespaced by owner.
pub fn storage_key(owner_id: &str, unique_filename: &str) -> String {
    format!("{}/{}", owner_id, unique_filename)
}

/// True when `key` is a single object directly under the owner's namespace.
pub fn key_belongs_to(owner_id: &str, key: &str) -> bool {
    key.strip_prefix(owner_id)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|name| !name.is_empty() && !name.contains('/') && name != "." && name != "..")
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn rfc3339_in(duration: Duration) -> String {
    let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    (Utc::now() + delta).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone)]
pub struct UploadBroker {
    db: Database,
    store: Arc<dyn ObjectStore>,
    limits: BrokerLimits,
}

impl UploadBroker {
    pub fn new(db: Database, store: Arc<dyn ObjectStore>, limits: BrokerLimits) -> Self {
        Self { db, store, limits }
    }

    pub fn limits(&self) -> BrokerLimits {
        self.limits
    }

    fn check_size(&self, v: &mut Validator, size: Option<i64>) {
        match size {
            None => {
                v.check(false, "fileSize", "File size is required");
            }
            Some(size) => {
                v.check(size > 0, "fileSize", "File size must be positive")
                    .check(
                        size <= 0 || (size as u64) <= self.limits.max_upload_bytes,
                        "fileSize",
                        "File exceeds the maximum upload size",
                    );
            }
        }
    }

    /// Request phase: derive a key in the owner's namespace and sign a PUT for it.
    pub async fn request_upload(
        &self,
        owner_id: &str,
        req: &UploadRequest,
    ) -> Result<UploadGrant, AppError> {
        let filename = present(&req.filename);
        let mime_type = present(&req.mime_type);

        let mut v = Validator::new();
        v.check(filename.is_some(), "filename", "Filename is required")
            .check(
                filename.is_none_or(|f| f.len() <= MAX_FILENAME_LENGTH),
                "filename",
                "Filename is too long",
            )
            .check(mime_type.is_some(), "mimeType", "MIME type is required");
        self.check_size(&mut v, req.file_size);
        v.finish()?;

        let (Some(filename), Some(mime_type), Some(size)) = (filename, mime_type, req.file_size)
        else {
            return Err(AppError::invalid("body", "Missing required fields"));
        };

        let unique = unique_filename(filename);
        let key = storage_key(owner_id, &unique);

        let presigned = self
            .store
            .presign_upload(&key, mime_type, size as u64, self.limits.upload_grant)
            .await
            .dependency("Failed to sign upload")?;

        info!(user_id = %owner_id, key = %key, size, "Issued upload grant");

        Ok(UploadGrant {
            upload_url: presigned.url,
            method: presigned.method,
            fields: presigned.headers,
            storage_key: key,
            unique_filename: unique,
            content_type: mime_type.to_string(),
            max_size: self.limits.max_upload_bytes,
            expires_at: rfc3339_in(self.limits.upload_grant),
        })
    }

    /// Commit phase: confirm the object landed, then record it as completed.
    pub async fn complete_upload(
        &self,
        owner_id: &str,
        req: &CompleteUpload,
    ) -> Result<FileRecord, AppError> {
        let filename = present(&req.filename);
        let original_filename = present(&req.original_filename);
        let mime_type = present(&req.mime_type);
        let key = present(&req.storage_key);

        let mut v = Validator::new();
        v.check(filename.is_some(), "filename", "Filename is required")
            .check(
                original_filename.is_some(),
                "originalFilename",
                "Original filename is required",
            )
            .check(mime_type.is_some(), "mimeType", "MIME type is required")
            .check(key.is_some(), "storageKey", "Storage key is required")
            .check(
                key.is_none_or(|k| key_belongs_to(owner_id, k)),
                "storageKey",
                "Storage key does not belong to this user",
            );
        self.check_size(&mut v, req.file_size);
        v.finish()?;

        let (Some(filename), Some(original_filename), Some(mime_type), Some(key), Some(size)) =
            (filename, original_filename, mime_type, key, req.file_size)
        else {
            return Err(AppError::invalid("body", "Missing required fields"));
        };

        let Some(head) = self
            .store
            .head(key)
            .await
            .dependency("Failed to check uploaded object")?
        else {
            warn!(user_id = %owner_id, key = %key, "Commit for missing object");
            return Err(AppError::invalid("storageKey", "Upload not found in storage"));
        };

        if head.size != size as u64 {
            warn!(
                user_id = %owner_id,
                key = %key,
                asserted = size,
                stored = head.size,
                "Commit size mismatch"
            );
            return Err(AppError::invalid(
                "fileSize",
                "File size does not match the uploaded object",
            ));
        }

        let record = self
            .db
            .files()
            .insert(&NewFile {
                user_id: owner_id,
                filename,
                original_filename,
                file_size: size,
                mime_type,
                storage_key: key,
                storage_bucket: self.store.bucket(),
                status: UploadStatus::Completed,
            })
            .await
            .map_err(|e| {
                if crate::db::is_unique_violation(&e) {
                    AppError::invalid("storageKey", "Upload already recorded")
                } else {
                    AppError::dependency("Failed to record file", e)
                }
            })?;

        info!(user_id = %owner_id, file_id = %record.id, "Upload committed");
        Ok(record)
    }

    /// The owner's files, newest first.
    pub async fn list_files(&self, owner_id: &str) -> Result<Vec<FileRecord>, AppError> {
        self.db
            .files()
            .list_by_owner(owner_id)
            .await
            .dependency("Failed to list files")
    }

    async fn owned(&self, file_id: &str, owner_id: &str) -> Result<FileRecord, AppError> {
        if uuid::Uuid::parse_str(file_id).is_err() {
            return Err(AppError::NotFound);
        }
        self.db
            .files()
            .get_owned(file_id, owner_id)
            .await
            .dependency("Failed to load file")?
            .ok_or(AppError::NotFound)
    }

    /// Signed read-only URL for an owned file.
    pub async fn presign_download(
        &self,
        file_id: &str,
        owner_id: &str,
    ) -> Result<DownloadLink, AppError> {
        let file = self.owned(file_id, owner_id).await?;

        let download_url = self
            .store
            .presign_download(
                &file.storage_key,
                &file.original_filename,
                self.limits.download_url,
            )
            .await
            .dependency("Failed to sign download")?;

        Ok(DownloadLink {
            download_url,
            filename: file.original_filename,
        })
    }

    /// Remove the stored object, then the row. The row survives a storage failure.
    pub async fn delete_file(&self, file_id: &str, owner_id: &str) -> Result<(), AppError> {
        let file = self.owned(file_id, owner_id).await?;

        self.store
            .delete(&file.storage_key)
            .await
            .dependency("Failed to delete stored object")?;

        if !self
            .db
            .files()
            .delete_owned(&file.id, owner_id)
            .await
            .dependency("Failed to delete file record")?
        {
            return Err(AppError::NotFound);
        }

        info!(user_id = %owner_id, file_id = %file.id, "File deleted");
        Ok(())
    }
}
